pub mod core;

use tracing_subscriber::EnvFilter;

pub use crate::core::config::InstallConfig;
pub use crate::core::error::{InstallerError, InstallerResult};
pub use crate::core::events::{InstallEvent, Phase, ProgressBus};
pub use crate::core::installer::{uninstall, InstallOutcome, Installer, RollbackPolicy};
pub use crate::core::launch::LaunchDescriptor;
pub use crate::core::plan::{InstallPlan, InstallationTarget};
pub use crate::core::version::LoaderRequest;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter. Calling this twice is harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,silk_installer_lib=debug")),
        )
        .try_init();
}
