use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use rhsm_converge::engine::{self, Outcome};
use rhsm_converge::host::HostPaths;
use rhsm_converge::runner::SystemCommands;
use rhsm_converge::{Error, Result, desired, profile};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render the executable convergence profile for a desired state
    Render {
        /// Path to a desired-state TOML
        desired: PathBuf,
        /// Write the profile here (with execute permission) instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Apply a rendered profile to this host
    Apply {
        /// Path to a rendered profile
        profile: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    match args.cmd {
        Command::Render { desired, out } => cmd_render(&desired, out.as_deref()),
        Command::Apply { profile } => cmd_apply(&profile),
    }
}

fn cmd_render(path: &Path, out: Option<&Path>) -> Result<()> {
    let state = desired::load(path)?;
    let text = profile::render(&state)?;
    match out {
        Some(dest) => {
            fs::write(dest, &text)
                .map_err(|e| Error::msg(format!("failed to write {}: {e}", dest.display())))?;
            set_executable(dest)?;
            info!(profile = %dest.display(), "profile rendered");
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn cmd_apply(path: &Path) -> Result<()> {
    let raw = fs::read_to_string(path)
        .map_err(|e| Error::msg(format!("failed to read {}: {e}", path.display())))?;
    let state = profile::parse(&raw)?;

    match engine::converge(&state, &HostPaths::system(), &SystemCommands)? {
        Outcome::NotApplicable { reason } => debug!(reason = %reason, "nothing to do"),
        Outcome::Converged(report) => info!(
            platform = ?report.platform,
            steps = report.steps.len(),
            "converged"
        ),
    }
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|e| Error::msg(format!("failed to set mode on {}: {e}", path.display())))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}
