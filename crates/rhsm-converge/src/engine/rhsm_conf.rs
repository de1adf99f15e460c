use std::fs;
use std::path::Path;

use regex::{NoExpand, Regex};

use crate::desired::DesiredState;
use crate::error::{Error, Result};
use crate::host::HostPaths;

use super::{SERVER_PREFIX, StepStatus};

const FULL_REFRESH_KEY: &str = "full_refresh_on_yum";

// Fallback for agents without the `config` subcommand: rewrite the managed
// lines of rhsm.conf directly, leaving every other line byte-for-byte alone.
pub(crate) fn rewrite_legacy(desired: &DesiredState, paths: &HostPaths) -> Result<StepStatus> {
    let content = read(&paths.rhsm_conf)?;
    let updated = legacy_substitutions(&content, desired)?;
    write_if_changed(&paths.rhsm_conf, &content, updated)
}

fn legacy_substitutions(content: &str, desired: &DesiredState) -> Result<String> {
    let mut out = replace_key_line(
        content,
        "hostname",
        &format!("hostname = {}", desired.server_hostname),
    )?;
    out = replace_key_line(&out, "port", &format!("port = {}", desired.server_port))?;
    out = replace_key_line(&out, "prefix", &format!("prefix = {SERVER_PREFIX}"))?;
    out = replace_key_line(
        &out,
        "repo_ca_cert",
        &format!("repo_ca_cert = %(ca_cert_dir)s{}", desired.server_ca_file()),
    )?;
    // This one has always been written without spaces around '='.
    out = replace_key_line(
        &out,
        "baseurl",
        &format!("baseurl={}", desired.rhel_base_url()),
    )?;
    Ok(out)
}

fn replace_key_line(content: &str, key: &str, replacement: &str) -> Result<String> {
    let re = Regex::new(&format!(r"(?m)^{}\s*=.*$", regex::escape(key)))?;
    Ok(re.replace_all(content, NoExpand(replacement)).into_owned())
}

// Turn on full_refresh_on_yum wherever the key already appears, otherwise
// add it right after the baseurl line. Works after either the config-command
// or the direct-substitution path.
pub(crate) fn ensure_full_refresh(paths: &HostPaths) -> Result<StepStatus> {
    let content = read(&paths.rhsm_conf)?;
    let updated = ensure_full_refresh_text(&content)?;
    write_if_changed(&paths.rhsm_conf, &content, updated)
}

fn ensure_full_refresh_text(content: &str) -> Result<String> {
    if content.contains(FULL_REFRESH_KEY) {
        let re = Regex::new(&format!(r"(?m){FULL_REFRESH_KEY}\s*=.*$"))?;
        return Ok(re
            .replace_all(content, NoExpand("full_refresh_on_yum = 1"))
            .into_owned());
    }

    let mut out = String::with_capacity(content.len() + 64);
    let mut inserted = false;
    for line in content.split_inclusive('\n') {
        out.push_str(line);
        if !inserted && line.contains("baseurl") {
            if !line.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("#config for on-premise management\n");
            out.push_str("full_refresh_on_yum = 1\n");
            inserted = true;
        }
    }
    Ok(out)
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| Error::msg(format!("failed to read {}: {e}", path.display())))
}

fn write_if_changed(path: &Path, before: &str, after: String) -> Result<StepStatus> {
    if *before == after {
        return Ok(StepStatus::Skipped("already up to date".into()));
    }
    fs::write(path, after)
        .map_err(|e| Error::msg(format!("failed to write {}: {e}", path.display())))?;
    Ok(StepStatus::Done)
}
