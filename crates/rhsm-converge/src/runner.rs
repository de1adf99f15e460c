use std::env;
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

// Seam over the external commands the engine drives (subscription-manager,
// rpm, update-ca-trust, hostname). Tests substitute a scripted fake.
pub trait HostCommands {
    // PATH lookup without spawning, the `type -P` check.
    fn resolves(&self, program: &str) -> bool;

    fn run(&self, program: &str, args: &[&str]) -> Result<CmdOutput>;
}

pub struct SystemCommands;

impl HostCommands for SystemCommands {
    fn resolves(&self, program: &str) -> bool {
        let Some(path_var) = env::var_os("PATH") else {
            return false;
        };
        env::split_paths(&path_var).any(|dir| is_executable(&dir.join(program)))
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<CmdOutput> {
        let output = Command::new(program)
            .args(args)
            // No command the engine runs reads from the terminal.
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::msg(format!("failed to run {program}: {e}")))?;
        Ok(CmdOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
