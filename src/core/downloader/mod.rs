mod attempt;
mod client;
mod retry;

pub use attempt::{AttemptOutcome, FetchMachine, FetchState, Step, Verdict};
pub use client::{DownloadResult, Downloader};
pub use retry::RetryPolicy;
