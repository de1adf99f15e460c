use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::runner::HostCommands;

// Every path the engine reads or writes on the target host. Fixed well-known
// locations in production; tests re-root the whole set under a scratch dir.
#[derive(Debug, Clone)]
pub struct HostPaths {
    pub rhsm_conf: PathBuf,
    pub rhsm_conf_backup: PathBuf,
    pub ca_cert_dir: PathBuf,
    pub trust_anchor_dir: PathBuf,
    pub facts_dir: PathBuf,
    pub os_release: PathBuf,
    pub redhat_release: PathBuf,
    pub centos_release: PathBuf,
}

impl HostPaths {
    pub fn system() -> Self {
        Self::under_root(Path::new("/"))
    }

    pub fn under_root(root: &Path) -> Self {
        let rhsm_conf = root.join("etc/rhsm/rhsm.conf");
        let rhsm_conf_backup = backup_sibling(&rhsm_conf);
        Self {
            rhsm_conf,
            rhsm_conf_backup,
            ca_cert_dir: root.join("etc/rhsm/ca"),
            trust_anchor_dir: root.join("etc/pki/ca-trust/source/anchors"),
            facts_dir: root.join("etc/rhsm/facts"),
            os_release: root.join("etc/os-release"),
            redhat_release: root.join("etc/redhat-release"),
            centos_release: root.join("etc/centos-release"),
        }
    }

    pub fn facts_file(&self) -> PathBuf {
        self.facts_dir.join("katello.facts")
    }
}

fn backup_sibling(conf: &Path) -> PathBuf {
    let name = conf
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("rhsm.conf");
    conf.with_file_name(format!("{name}.kat-backup"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    DebianFamily,
    RhelFamily,
    Unsupported,
}

#[derive(Debug, Clone, Default)]
pub struct OsRelease {
    pub id: Option<String>,
    pub id_like: Option<String>,
}

impl OsRelease {
    // Missing or unreadable os-release degrades to an empty identity, which
    // classifies as Unsupported and takes the default branch.
    pub fn read(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(_) => Self::default(),
        }
    }

    pub fn parse(text: &str) -> Self {
        let mut out = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = unquote(value.trim()).to_string();
            match key.trim() {
                "ID" => out.id = Some(value),
                "ID_LIKE" => out.id_like = Some(value),
                _ => {}
            }
        }
        out
    }

    // Whole-value matching against the known Debian-derived identifiers;
    // anything else converges down the rhel path.
    pub fn classify(&self) -> Platform {
        let id = self.id.as_deref().unwrap_or("");
        let id_like = self.id_like.as_deref().unwrap_or("");
        if id == "debian" || id_like == "debian" || id_like == "ubuntu" {
            return Platform::DebianFamily;
        }
        if matches!(id, "rhel" | "centos" | "fedora" | "rocky" | "almalinux")
            || id_like
                .split_whitespace()
                .any(|w| matches!(w, "rhel" | "centos" | "fedora"))
        {
            return Platform::RhelFamily;
        }
        Platform::Unsupported
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl AgentVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    // Last non-empty line of the package manager output, split on dots; any
    // component that fails to parse counts as 0, which routes the host down
    // the legacy branches.
    pub fn parse(raw: &str) -> Self {
        let line = raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .unwrap_or("");
        let mut parts = line.split('.');
        let mut component = || {
            parts
                .next()
                .and_then(|p| p.trim().parse::<u32>().ok())
                .unwrap_or(0)
        };
        Self {
            major: component(),
            minor: component(),
            patch: component(),
        }
    }

    // The unified `config` subcommand arrived in 0.96.6.
    pub fn supports_config_command(&self) -> bool {
        self.major > 0 || self.minor > 96 || (self.minor == 96 && self.patch > 6)
    }

    // Agents before 1.18.2 do not report the network.fqdn fact. Not the
    // complement of the gate above: any minor below 18 qualifies here, no
    // matter the major.
    pub fn predates_fqdn_fact(&self) -> bool {
        self.major < 1 || self.minor < 18 || (self.minor == 18 && self.patch < 2)
    }
}

impl fmt::Display for AgentVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

pub fn probe_agent_version(runner: &dyn HostCommands) -> AgentVersion {
    let query = runner.run(
        "rpm",
        &["-q", "--queryformat", "%{VERSION}", "subscription-manager"],
    );
    match query {
        Ok(out) if out.success => AgentVersion::parse(&out.stdout),
        Ok(_) | Err(_) => {
            debug!("could not determine subscription-manager version, assuming 0.0.0");
            AgentVersion::default()
        }
    }
}
