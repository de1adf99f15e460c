use serde::Deserialize;

use crate::desired::DesiredState;
use crate::error::{Error, Result};

// First line of every rendered profile. `env -S` splits it back into
// `rhsm-converge apply <profile>` when the installed artifact is executed,
// and `#` keeps the line a comment for the TOML parser below it.
pub const INTERPRETER_LINE: &str = "#!/usr/bin/env -S rhsm-converge apply";

// Render the executable profile artifact for a desired state. Pure text
// assembly: equal input produces byte-identical output, which is what the
// calling provider compares against the installed artifact.
pub fn render(state: &DesiredState) -> Result<String> {
    state.validate()?;

    let scalars = [
        ("server.hostname", &state.server_hostname),
        ("server.port", &state.server_port),
        ("ca.server_name", &state.server_ca_name),
        ("ca.default_name", &state.default_ca_name),
    ];
    for (name, value) in scalars {
        if value.contains(['"', '\\', '\n', '\r']) {
            return Err(Error::msg(format!(
                "desired state field '{name}' cannot be embedded in a profile: {value:?}"
            )));
        }
    }
    for (name, pem) in [
        ("ca.server_pem", &state.server_ca_pem),
        ("ca.default_pem", &state.default_ca_pem),
    ] {
        if pem.contains("'''") {
            return Err(Error::msg(format!(
                "certificate body '{name}' cannot be embedded in a profile"
            )));
        }
    }

    let mut out = String::new();
    out.push_str(INTERPRETER_LINE);
    out.push('\n');
    out.push_str("# Rendered subscription convergence profile; regenerate instead of editing.\n\n");
    out.push_str("[server]\n");
    out.push_str(&format!("hostname = \"{}\"\n", state.server_hostname));
    out.push_str(&format!("port = \"{}\"\n\n", state.server_port));
    out.push_str("[ca]\n");
    out.push_str(&format!("server_name = \"{}\"\n", state.server_ca_name));
    out.push_str(&format!("default_name = \"{}\"\n", state.default_ca_name));
    out.push_str(&format!(
        "server_pem = '''\n{}\n'''\n",
        state.server_ca_pem.trim_end()
    ));
    out.push_str(&format!(
        "default_pem = '''\n{}\n'''\n",
        state.default_ca_pem.trim_end()
    ));
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct ProfileDoc {
    server: ServerTable,
    ca: CaTable,
}

#[derive(Debug, Deserialize)]
struct ServerTable {
    hostname: String,
    port: String,
}

#[derive(Debug, Deserialize)]
struct CaTable {
    server_name: String,
    default_name: String,
    server_pem: String,
    default_pem: String,
}

// Inverse of render, used when an installed artifact executes itself.
pub fn parse(text: &str) -> Result<DesiredState> {
    let doc: ProfileDoc =
        toml::from_str(text).map_err(|e| Error::msg(format!("invalid profile: {e}")))?;
    let state = DesiredState {
        server_hostname: doc.server.hostname,
        server_port: doc.server.port,
        server_ca_name: doc.ca.server_name,
        default_ca_name: doc.ca.default_name,
        server_ca_pem: doc.ca.server_pem,
        default_ca_pem: doc.ca.default_pem,
    };
    state.validate()?;
    Ok(state)
}
