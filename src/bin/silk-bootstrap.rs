// Minimal launcher: reads the committed launch descriptor and starts the
// loader. Arguments before `--` are JVM flags, the rest go to the loader.

use std::path::PathBuf;
use std::process::ExitCode;

use silk_installer_lib::core::launch::{launch, resolve_java_binary};

const ROOT_ENV: &str = "SILK_INSTALL_ROOT";

fn main() -> ExitCode {
    silk_installer_lib::init_tracing();

    let root = match std::env::var_os(ROOT_ENV) {
        Some(root) => PathBuf::from(root),
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                tracing::error!("Cannot determine install root: {}", e);
                return ExitCode::FAILURE;
            }
        },
    };
    let java = resolve_java_binary(|key| std::env::var(key).ok());
    let args: Vec<String> = std::env::args().skip(1).collect();

    match launch(&root, args, &java) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
