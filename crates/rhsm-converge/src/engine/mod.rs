use std::fs;

use tracing::{debug, info, warn};

use crate::desired::DesiredState;
use crate::error::{Error, Result};
use crate::host::{self, AgentVersion, HostPaths, OsRelease, Platform};
use crate::runner::{CmdOutput, HostCommands};

mod certs;
mod facts;
mod rhsm_conf;

pub(crate) const AGENT_BIN: &str = "subscription-manager";
const AGENT_BIN_FALLBACK: &str = "subscription-manager-cli";
pub(crate) const SERVER_PREFIX: &str = "/rhsm";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPolicy {
    // A failure aborts the run with nonzero status.
    Fatal,
    // A failure is recorded and logged, never propagated.
    BestEffort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Done,
    Skipped(String),
    Suppressed(String),
}

#[derive(Debug, Clone)]
pub struct StepRecord {
    pub name: &'static str,
    pub policy: StepPolicy,
    pub status: StepStatus,
}

#[derive(Debug)]
pub struct ConvergeReport {
    pub platform: Platform,
    pub agent_version: Option<AgentVersion>,
    pub steps: Vec<StepRecord>,
}

impl ConvergeReport {
    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name == name)
    }
}

#[derive(Debug)]
pub enum Outcome {
    // The host does not run the targeted agent; nothing was touched.
    NotApplicable { reason: String },
    Converged(ConvergeReport),
}

// One linear convergence pass. Host identity and agent version are probed
// once up front and handed through; every mutation goes through run_step so
// the fatal/best-effort split stays in one place.
pub fn converge(
    desired: &DesiredState,
    paths: &HostPaths,
    runner: &dyn HostCommands,
) -> Result<Outcome> {
    desired.validate()?;

    if !paths.rhsm_conf.is_file() {
        return Ok(Outcome::NotApplicable {
            reason: format!("{} not present", paths.rhsm_conf.display()),
        });
    }
    if !runner.resolves(AGENT_BIN) && !runner.resolves(AGENT_BIN_FALLBACK) {
        return Ok(Outcome::NotApplicable {
            reason: format!("{AGENT_BIN} is not installed"),
        });
    }

    let os = OsRelease::read(&paths.os_release);
    let platform = os.classify();
    debug!(
        ?platform,
        id = os.id.as_deref(),
        id_like = os.id_like.as_deref(),
        "probed host platform"
    );

    let mut steps = Vec::new();
    run_step(
        &mut steps,
        "backup-config",
        StepPolicy::Fatal,
        backup_config(paths),
    )?;
    run_step(
        &mut steps,
        "install-ca-certs",
        StepPolicy::Fatal,
        certs::install(desired, paths),
    )?;
    run_step(
        &mut steps,
        "mirror-trust-anchor",
        StepPolicy::BestEffort,
        certs::mirror_trust_anchor(desired, paths, runner),
    )?;

    let agent_version = match platform {
        Platform::DebianFamily => {
            run_step(
                &mut steps,
                "configure-agent",
                StepPolicy::Fatal,
                configure_agent(runner, desired, &desired.debian_base_url()),
            )?;
            None
        }
        // Everything that is not Debian-family converges down the rhel path.
        Platform::RhelFamily | Platform::Unsupported => {
            let version = host::probe_agent_version(runner);
            debug!(%version, "installed agent version");
            if version.supports_config_command() {
                run_step(
                    &mut steps,
                    "configure-agent",
                    StepPolicy::Fatal,
                    configure_agent(runner, desired, &desired.rhel_base_url()),
                )?;
                run_step(
                    &mut steps,
                    "report-package-profile",
                    StepPolicy::BestEffort,
                    enable_profile_reporting(runner),
                )?;
            } else {
                run_step(
                    &mut steps,
                    "configure-agent",
                    StepPolicy::Fatal,
                    rhsm_conf::rewrite_legacy(desired, paths),
                )?;
            }
            run_step(
                &mut steps,
                "full-refresh-on-yum",
                StepPolicy::Fatal,
                rhsm_conf::ensure_full_refresh(paths),
            )?;
            run_step(
                &mut steps,
                "hostname-fact-override",
                StepPolicy::BestEffort,
                facts::override_hostname(version, paths, runner),
            )?;
            Some(version)
        }
    };

    info!(steps = steps.len(), "subscription configuration converged");
    Ok(Outcome::Converged(ConvergeReport {
        platform,
        agent_version,
        steps,
    }))
}

fn run_step(
    steps: &mut Vec<StepRecord>,
    name: &'static str,
    policy: StepPolicy,
    outcome: Result<StepStatus>,
) -> Result<()> {
    match outcome {
        Ok(status) => {
            match &status {
                StepStatus::Done => debug!(step = name, "done"),
                StepStatus::Skipped(reason) => debug!(step = name, reason = %reason, "skipped"),
                StepStatus::Suppressed(_) => {}
            }
            steps.push(StepRecord {
                name,
                policy,
                status,
            });
            Ok(())
        }
        Err(e) => match policy {
            StepPolicy::Fatal => Err(Error::msg(format!("step '{name}' failed: {e}"))),
            StepPolicy::BestEffort => {
                warn!(step = name, error = %e, "suppressed step failure");
                steps.push(StepRecord {
                    name,
                    policy,
                    status: StepStatus::Suppressed(e.to_string()),
                });
                Ok(())
            }
        },
    }
}

fn backup_config(paths: &HostPaths) -> Result<StepStatus> {
    // One-shot reference point: created on the first run, never clobbered
    // with already-managed content afterwards.
    if paths.rhsm_conf_backup.exists() {
        return Ok(StepStatus::Skipped("backup already exists".into()));
    }
    fs::copy(&paths.rhsm_conf, &paths.rhsm_conf_backup).map_err(|e| {
        Error::msg(format!(
            "failed to back up {} to {}: {e}",
            paths.rhsm_conf.display(),
            paths.rhsm_conf_backup.display()
        ))
    })?;
    Ok(StepStatus::Done)
}

fn configure_agent(
    runner: &dyn HostCommands,
    desired: &DesiredState,
    base_url: &str,
) -> Result<StepStatus> {
    let args = [
        "config".to_string(),
        format!("--server.hostname={}", desired.server_hostname),
        format!("--server.prefix={SERVER_PREFIX}"),
        format!("--server.port={}", desired.server_port),
        format!(
            "--rhsm.repo_ca_cert=%(ca_cert_dir)s{}",
            desired.server_ca_file()
        ),
        format!("--rhsm.baseurl={base_url}"),
    ];
    let argv: Vec<&str> = args.iter().map(String::as_str).collect();
    let out = runner.run(AGENT_BIN, &argv)?;
    require_success("subscription-manager config", &out)?;
    Ok(StepStatus::Done)
}

// Older agents do not know these options; each is attempted on its own so
// one rejection does not keep the other flag from being set.
fn enable_profile_reporting(runner: &dyn HostCommands) -> Result<StepStatus> {
    let mut failures = Vec::new();
    for flag in [
        "--rhsm.package_profile_on_trans=1",
        "--rhsm.report_package_profile=1",
    ] {
        match runner.run(AGENT_BIN, &["config", flag]) {
            Ok(out) if out.success => {}
            Ok(out) => failures.push(format!("{flag}: {}", out.stderr.trim())),
            Err(e) => failures.push(format!("{flag}: {e}")),
        }
    }
    if failures.is_empty() {
        Ok(StepStatus::Done)
    } else {
        Err(Error::msg(failures.join("; ")))
    }
}

pub(crate) fn require_success(what: &str, out: &CmdOutput) -> Result<()> {
    if out.success {
        return Ok(());
    }
    let detail = out.stderr.trim();
    if detail.is_empty() {
        Err(Error::msg(format!("{what} failed")))
    } else {
        Err(Error::msg(format!("{what} failed: {detail}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_step_failure_aborts_with_context() {
        let mut steps = Vec::new();
        let err = run_step(
            &mut steps,
            "configure-agent",
            StepPolicy::Fatal,
            Err(Error::msg("boom")),
        )
        .unwrap_err()
        .to_string();
        assert!(err.contains("configure-agent"), "unexpected err: {err}");
        assert!(err.contains("boom"), "unexpected err: {err}");
        assert!(steps.is_empty());
    }

    #[test]
    fn best_effort_step_failure_is_recorded_not_raised() {
        let mut steps = Vec::new();
        run_step(
            &mut steps,
            "mirror-trust-anchor",
            StepPolicy::BestEffort,
            Err(Error::msg("broken trust store")),
        )
        .unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(
            steps[0].status,
            StepStatus::Suppressed("broken trust store".into())
        );
    }

    #[test]
    fn successful_step_keeps_its_status() {
        let mut steps = Vec::new();
        run_step(
            &mut steps,
            "backup-config",
            StepPolicy::Fatal,
            Ok(StepStatus::Skipped("backup already exists".into())),
        )
        .unwrap();
        assert_eq!(
            steps[0].status,
            StepStatus::Skipped("backup already exists".into())
        );
    }

    #[test]
    fn require_success_reports_stderr() {
        let out = CmdOutput {
            success: false,
            stdout: String::new(),
            stderr: "no such option\n".into(),
        };
        let err = require_success("subscription-manager config", &out)
            .unwrap_err()
            .to_string();
        assert!(err.contains("no such option"), "unexpected err: {err}");

        let ok = CmdOutput {
            success: true,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert!(require_success("anything", &ok).is_ok());
    }
}
