use std::fs;
use std::path::Path;

use crate::desired::DesiredState;
use crate::error::{Error, Result};
use crate::host::HostPaths;
use crate::runner::HostCommands;

use super::{StepStatus, require_success};

// Certificate content is fully determined by the desired state, so both
// files are rewritten on every run.
pub(crate) fn install(desired: &DesiredState, paths: &HostPaths) -> Result<StepStatus> {
    write_cert(
        &paths.ca_cert_dir.join(desired.server_ca_file()),
        &desired.server_ca_pem,
    )?;
    write_cert(
        &paths.ca_cert_dir.join(desired.default_ca_file()),
        &desired.default_ca_pem,
    )?;
    Ok(StepStatus::Done)
}

fn write_cert(path: &Path, pem: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::msg(format!("failed to create dir {}: {e}", parent.display())))?;
    }
    let mut body = pem.trim_end().to_string();
    body.push('\n');
    fs::write(path, body)
        .map_err(|e| Error::msg(format!("failed to write {}: {e}", path.display())))?;
    set_mode(path, 0o644)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| Error::msg(format!("failed to set mode on {}: {e}", path.display())))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

// Register the server CA with the OS-level trust store where the host has
// one. Hosts without the anchor directory skip the whole step.
pub(crate) fn mirror_trust_anchor(
    desired: &DesiredState,
    paths: &HostPaths,
    runner: &dyn HostCommands,
) -> Result<StepStatus> {
    if !paths.trust_anchor_dir.is_dir() {
        return Ok(StepStatus::Skipped("no trust-anchor directory".into()));
    }

    let out = runner.run("update-ca-trust", &["enable"])?;
    require_success("update-ca-trust enable", &out)?;

    let cert_name = desired.server_ca_file();
    let src = paths.ca_cert_dir.join(&cert_name);
    let dst = paths.trust_anchor_dir.join(&cert_name);
    fs::copy(&src, &dst).map_err(|e| {
        Error::msg(format!(
            "failed to copy {} -> {}: {e}",
            src.display(),
            dst.display()
        ))
    })?;

    let out = runner.run("update-ca-trust", &[])?;
    require_success("update-ca-trust", &out)?;
    Ok(StepStatus::Done)
}
