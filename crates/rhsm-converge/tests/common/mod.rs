#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use tempfile::TempDir;

use rhsm_converge::Result;
use rhsm_converge::desired::DesiredState;
use rhsm_converge::host::HostPaths;
use rhsm_converge::runner::{CmdOutput, HostCommands};

pub const SERVER_CA_PEM: &str =
    "-----BEGIN CERTIFICATE-----\nc2VydmVyLWNh\n-----END CERTIFICATE-----\n";
pub const DEFAULT_CA_PEM: &str =
    "-----BEGIN CERTIFICATE-----\nZGVmYXVsdC1jYQ==\n-----END CERTIFICATE-----\n";

pub const STOCK_RHSM_CONF: &str = "\
# Red Hat Subscription Manager Configuration File:

[server]
hostname = subscription.rhsm.redhat.com
prefix = /subscription
port = 443
insecure = 0

[rhsm]
baseurl = https://cdn.redhat.com
repo_ca_cert = %(ca_cert_dir)sredhat-uep.pem
productCertDir = /etc/pki/product
entitlementCertDir = /etc/pki/entitlement

[rhsmcertd]
certCheckInterval = 240
";

pub fn desired_state() -> DesiredState {
    DesiredState {
        server_hostname: "sat.example.com".into(),
        server_port: "8443".into(),
        server_ca_name: "katello-server-ca".into(),
        default_ca_name: "katello-default-ca".into(),
        server_ca_pem: SERVER_CA_PEM.into(),
        default_ca_pem: DEFAULT_CA_PEM.into(),
    }
}

// A host rooted in a scratch directory. Tests lay down exactly the files a
// scenario calls for and inspect what convergence left behind.
pub struct HostFixture {
    pub root: TempDir,
    pub paths: HostPaths,
}

impl HostFixture {
    pub fn new() -> Self {
        let root = TempDir::new().expect("tempdir");
        let paths = HostPaths::under_root(root.path());
        Self { root, paths }
    }

    pub fn write_rhsm_conf(&self, content: &str) {
        write(&self.paths.rhsm_conf, content);
    }

    pub fn write_os_release(&self, content: &str) {
        write(&self.paths.os_release, content);
    }

    pub fn write_redhat_release(&self, content: &str) {
        write(&self.paths.redhat_release, content);
    }

    pub fn write_centos_release(&self, content: &str) {
        write(&self.paths.centos_release, content);
    }

    pub fn create_facts_dir(&self) {
        fs::create_dir_all(&self.paths.facts_dir).expect("create facts dir");
    }

    pub fn create_trust_anchor_dir(&self) {
        fs::create_dir_all(&self.paths.trust_anchor_dir).expect("create trust anchor dir");
    }

    pub fn read(&self, path: &Path) -> String {
        fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("failed to read {}: {e}", path.display()))
    }
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, content).expect("write fixture file");
}

pub enum FakeOutcome {
    Succeed(String),
    Fail(String),
}

// Scripted stand-in for the host's commands. Rules match on a substring of
// the joined command line, first match wins; anything unmatched succeeds
// with empty output.
pub struct FakeCommands {
    available: BTreeSet<String>,
    rules: Vec<(String, FakeOutcome)>,
    calls: RefCell<Vec<String>>,
}

impl FakeCommands {
    pub fn new(available: &[&str]) -> Self {
        Self {
            available: available.iter().map(|s| s.to_string()).collect(),
            rules: Vec::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn on(mut self, needle: &str, outcome: FakeOutcome) -> Self {
        self.rules.push((needle.to_string(), outcome));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.calls.borrow().iter().any(|c| c.contains(needle))
    }
}

impl HostCommands for FakeCommands {
    fn resolves(&self, program: &str) -> bool {
        self.available.contains(program)
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<CmdOutput> {
        let mut line = program.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.calls.borrow_mut().push(line.clone());

        for (needle, outcome) in &self.rules {
            if line.contains(needle.as_str()) {
                return Ok(match outcome {
                    FakeOutcome::Succeed(stdout) => CmdOutput {
                        success: true,
                        stdout: stdout.clone(),
                        stderr: String::new(),
                    },
                    FakeOutcome::Fail(stderr) => CmdOutput {
                        success: false,
                        stdout: String::new(),
                        stderr: stderr.clone(),
                    },
                });
            }
        }
        Ok(CmdOutput {
            success: true,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}
