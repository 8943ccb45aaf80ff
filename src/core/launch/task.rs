// ─── Launch Task ───
// Runtime bootstrap: reads the committed descriptor and hands control to
// the loader entry point. No network, no resolution.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use super::descriptor::LaunchDescriptor;
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::plan::InstallationTarget;

/// Explicit Java binary override.
pub const JAVA_ENV: &str = "SILK_JAVA";

/// Split bootstrap arguments: everything before a literal `--` is a JVM
/// flag, everything after it goes to the loader. Without `--` all
/// arguments go to the loader.
pub fn split_forwarded_args(args: Vec<String>) -> (Vec<String>, Vec<String>) {
    match args.iter().position(|a| a == "--") {
        Some(idx) => {
            let mut jvm = args;
            let app = jvm.split_off(idx + 1);
            jvm.pop();
            (jvm, app)
        }
        None => (Vec::new(), args),
    }
}

/// Java binary: `SILK_JAVA`, else `JAVA_HOME/bin/java`, else `java` on PATH.
pub fn resolve_java_binary(env: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(explicit) = env(JAVA_ENV).filter(|v| !v.trim().is_empty()) {
        return PathBuf::from(explicit);
    }
    if let Some(home) = env("JAVA_HOME").filter(|v| !v.trim().is_empty()) {
        let exe = if cfg!(target_os = "windows") {
            "java.exe"
        } else {
            "java"
        };
        return Path::new(&home).join("bin").join(exe);
    }
    PathBuf::from("java")
}

/// `java [jvm flags] [descriptor jvm args] -cp <classpath> <entry> [args]`.
pub fn build_command(
    descriptor: &LaunchDescriptor,
    root: &Path,
    java: &Path,
    jvm_flags: &[String],
    app_args: &[String],
) -> Command {
    let mut cmd = Command::new(java);
    cmd.args(jvm_flags);
    cmd.args(&descriptor.jvm_args);
    cmd.arg("-cp").arg(descriptor.classpath_string(root));
    cmd.arg(&descriptor.entry_point);
    cmd.args(app_args);
    cmd.current_dir(root);
    cmd
}

/// Validate the descriptor under `root` and run the loader.
///
/// On Unix the current process is replaced and this only returns on
/// failure; elsewhere the child is awaited and its exit code returned.
pub fn launch(root: &Path, args: Vec<String>, java: &Path) -> InstallerResult<i32> {
    let target = InstallationTarget::new(root, "");
    let descriptor = LaunchDescriptor::load_validated(&target.launch_descriptor_path(), root)?;
    let (jvm_flags, app_args) = split_forwarded_args(args);

    let mut cmd = build_command(&descriptor, root, java, &jvm_flags, &app_args);
    info!(
        "Starting loader {} ({}) with {:?}",
        descriptor.loader_version, descriptor.entry_point, java
    );
    debug!("Command (copy/paste): {}", format_command_for_logs(&cmd));

    run(&mut cmd)
}

#[cfg(unix)]
fn run(cmd: &mut Command) -> InstallerResult<i32> {
    use std::os::unix::process::CommandExt;
    // exec only returns on error.
    let err = cmd.exec();
    Err(InstallerError::Launch(err.to_string()))
}

#[cfg(not(unix))]
fn run(cmd: &mut Command) -> InstallerResult<i32> {
    let status = cmd
        .status()
        .map_err(|e| InstallerError::Launch(e.to_string()))?;
    Ok(status.code().unwrap_or(1))
}

fn format_command_for_logs(cmd: &Command) -> String {
    let program = shell_escape(&cmd.get_program().to_string_lossy());
    let args = cmd
        .get_args()
        .map(|arg| shell_escape(&arg.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ");

    if args.is_empty() {
        program
    } else {
        format!("{} {}", program, args)
    }
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }

    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=')
    }) {
        return raw.to_string();
    }

    format!("\"{}\"", raw.replace('"', "\\\""))
}
