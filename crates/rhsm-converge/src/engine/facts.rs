use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::host::{AgentVersion, HostPaths};
use crate::runner::HostCommands;

use super::StepStatus;

const FALLBACK_HOSTNAME: &str = "localhost";

// EL5 hosts and old agents never report the network.fqdn fact, so the
// reported hostname is pinned through a facts override instead.
pub(crate) fn override_hostname(
    version: AgentVersion,
    paths: &HostPaths,
    runner: &dyn HostCommands,
) -> Result<StepStatus> {
    if !needs_override(version, paths) {
        return Ok(StepStatus::Skipped("agent reports network.fqdn".into()));
    }

    let out = runner.run("hostname", &["-f"])?;
    if !out.success {
        return Ok(StepStatus::Skipped("fqdn lookup failed".into()));
    }
    let fqdn = out.stdout.trim();
    if fqdn.is_empty() || fqdn == FALLBACK_HOSTNAME {
        return Ok(StepStatus::Skipped(
            "fqdn did not resolve past localhost".into(),
        ));
    }
    if !paths.facts_dir.is_dir() {
        return Ok(StepStatus::Skipped("no facts directory".into()));
    }

    let doc = serde_json::json!({ "network.hostname-override": fqdn });
    let mut body = serde_json::to_string(&doc)?;
    body.push('\n');
    let path = paths.facts_file();
    fs::write(&path, body)
        .map_err(|e| Error::msg(format!("failed to write {}: {e}", path.display())))?;
    Ok(StepStatus::Done)
}

fn needs_override(version: AgentVersion, paths: &HostPaths) -> bool {
    release_file_matches(
        &paths.redhat_release,
        "red hat enterprise linux server release 5",
    ) || release_file_matches(&paths.centos_release, "centos linux release 5")
        || version.predates_fqdn_fact()
}

fn release_file_matches(path: &Path, marker: &str) -> bool {
    fs::read_to_string(path)
        .map(|text| text.to_ascii_lowercase().contains(marker))
        .unwrap_or(false)
}
