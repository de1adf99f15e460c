use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

// Everything the engine needs to know about the target configuration.
// Fixed once rendered into a profile; the engine never mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    pub server_hostname: String,
    pub server_port: String,
    pub server_ca_name: String,
    pub default_ca_name: String,
    pub server_ca_pem: String,
    pub default_ca_pem: String,
}

impl DesiredState {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("server.hostname", &self.server_hostname),
            ("server.port", &self.server_port),
            ("ca.server_name", &self.server_ca_name),
            ("ca.default_name", &self.default_ca_name),
            ("ca.server_pem", &self.server_ca_pem),
            ("ca.default_pem", &self.default_ca_pem),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(Error::msg(format!("desired state field '{name}' is empty")));
            }
        }
        Ok(())
    }

    pub fn server_ca_file(&self) -> String {
        format!("{}.pem", self.server_ca_name)
    }

    pub fn default_ca_file(&self) -> String {
        format!("{}.pem", self.default_ca_name)
    }

    pub fn rhel_base_url(&self) -> String {
        format!("https://{}/pulp/content/", self.server_hostname)
    }

    pub fn debian_base_url(&self) -> String {
        format!("https://{}/pulp/deb", self.server_hostname)
    }
}

#[derive(Debug, Deserialize)]
struct DesiredDoc {
    server: ServerSection,
    ca: CaSection,
}

#[derive(Debug, Deserialize)]
struct ServerSection {
    hostname: String,
    port: PortValue,
}

// Declarative callers write the port either way; the agent takes it as text.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(u16),
    Text(String),
}

impl PortValue {
    fn into_string(self) -> String {
        match self {
            PortValue::Number(n) => n.to_string(),
            PortValue::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CaSection {
    server_name: String,
    server_cert: String,
    default_name: String,
    default_cert: String,
}

// Load a desired-state TOML and pull in the two CA certificate bodies it
// points at. Cert paths resolve relative to the document's own directory.
pub fn load(path: &Path) -> Result<DesiredState> {
    let raw = fs::read_to_string(path)
        .map_err(|e| Error::msg(format!("failed to read {}: {e}", path.display())))?;
    let doc: DesiredDoc = toml::from_str(&raw)
        .map_err(|e| Error::msg(format!("invalid desired state {}: {e}", path.display())))?;

    let server_ca_pem = read_cert(path, &doc.ca.server_cert)?;
    let default_ca_pem = read_cert(path, &doc.ca.default_cert)?;

    let state = DesiredState {
        server_hostname: doc.server.hostname,
        server_port: doc.server.port.into_string(),
        server_ca_name: doc.ca.server_name,
        default_ca_name: doc.ca.default_name,
        server_ca_pem,
        default_ca_pem,
    };
    state.validate()?;
    Ok(state)
}

fn read_cert(doc_path: &Path, reference: &str) -> Result<String> {
    let path = resolve_ref_path(doc_path, reference);
    fs::read_to_string(&path)
        .map_err(|e| Error::msg(format!("failed to read certificate {}: {e}", path.display())))
}

fn resolve_ref_path(from_file: &Path, reference: &str) -> PathBuf {
    let p = PathBuf::from(reference);
    if p.is_absolute() {
        p
    } else {
        from_file.parent().unwrap_or_else(|| Path::new(".")).join(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIBdGVzdA==\n-----END CERTIFICATE-----\n";

    fn write_doc(dir: &Path, port: &str) -> PathBuf {
        fs::write(dir.join("server-ca.pem"), PEM).unwrap();
        fs::write(dir.join("default-ca.pem"), PEM).unwrap();
        let doc = format!(
            r#"
[server]
hostname = "sat.example.com"
port = {port}

[ca]
server_name = "katello-server-ca"
server_cert = "server-ca.pem"
default_name = "katello-default-ca"
default_cert = "default-ca.pem"
"#
        );
        let path = dir.join("desired.toml");
        fs::write(&path, doc).unwrap();
        path
    }

    #[test]
    fn loads_state_and_certificate_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(dir.path(), "\"443\"");

        let state = load(&path).expect("desired state should load");
        assert_eq!(state.server_hostname, "sat.example.com");
        assert_eq!(state.server_port, "443");
        assert_eq!(state.server_ca_pem, PEM);
        assert_eq!(state.server_ca_file(), "katello-server-ca.pem");
        assert_eq!(state.rhel_base_url(), "https://sat.example.com/pulp/content/");
        assert_eq!(state.debian_base_url(), "https://sat.example.com/pulp/deb");
    }

    #[test]
    fn accepts_integer_port() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(dir.path(), "8443");

        let state = load(&path).expect("integer port should load");
        assert_eq!(state.server_port, "8443");
    }

    #[test]
    fn rejects_missing_certificate_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(dir.path(), "443");
        fs::remove_file(dir.path().join("default-ca.pem")).unwrap();

        let err = load(&path).unwrap_err().to_string();
        assert!(err.contains("default-ca.pem"), "unexpected err: {err}");
    }

    #[test]
    fn rejects_empty_fields() {
        let state = DesiredState {
            server_hostname: "sat.example.com".into(),
            server_port: "443".into(),
            server_ca_name: "  ".into(),
            default_ca_name: "default-ca".into(),
            server_ca_pem: PEM.into(),
            default_ca_pem: PEM.into(),
        };
        let err = state.validate().unwrap_err().to_string();
        assert!(err.contains("ca.server_name"), "unexpected err: {err}");
    }
}
