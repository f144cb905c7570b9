//! XML configuration: server identity, endpoint and the machine layout.
//!
//! ```xml
//! <config>
//!   <server name="Valve Simulator">
//!     <ip>127.0.0.1</ip>
//!     <port>4840</port>
//!     <domain>valves.example.org</domain>
//!   </server>
//!   <machine factory="Factory" name="Machine" percent_policy="clamp">
//!     <valve kind="discrete" name="DiscreteValve"/>
//!     <valve kind="analog" name="AnalogValve"/>
//!   </machine>
//! </config>
//! ```
//!
//! The `machine` element is optional; without it the default layout is used.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};
use crate::simulator::devices::{PercentPolicy, ValveKind};
use crate::simulator::machine::{MachineLayout, ValveSpec};

pub const DEFAULT_CONFIG_PATH: &str = "config.xml";

/// Environment variable overriding [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_PATH_ENV: &str = "VALVE_SIM_CONFIG";

pub const DEFAULT_PKI_DIR: &str = "./pki";

#[derive(Debug, Deserialize)]
struct ConfigDocument {
    server: ServerElement,
    #[serde(default)]
    machine: Option<MachineElement>,
}

#[derive(Debug, Deserialize)]
struct ServerElement {
    #[serde(rename = "@name")]
    name: String,
    ip: String,
    port: String,
    domain: String,
    #[serde(default)]
    pki_dir: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MachineElement {
    #[serde(rename = "@factory", default)]
    factory: Option<String>,
    #[serde(rename = "@name", default)]
    name: Option<String>,
    #[serde(rename = "@percent_policy", default)]
    percent_policy: PercentPolicy,
    #[serde(rename = "valve", default)]
    valves: Vec<ValveElement>,
}

#[derive(Debug, Deserialize)]
struct ValveElement {
    #[serde(rename = "@kind")]
    kind: ValveKind,
    #[serde(rename = "@name")]
    name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub domain: String,
    pub pki_dir: String,
}

impl ServerSettings {
    pub fn endpoint_url(&self) -> String {
        format!("opc.tcp://{}:{}", self.ip, self.port)
    }

    pub fn namespace_uri(&self) -> String {
        format!("http://{}", self.domain)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatorConfig {
    pub server: ServerSettings,
    pub machine: MachineLayout,
}

impl SimulatorConfig {
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_xml(&text)
    }

    pub fn from_xml(text: &str) -> ConfigResult<Self> {
        let document: ConfigDocument = quick_xml::de::from_str(text)?;

        let server = document.server;
        let port = server.port.trim();
        let port = port.parse::<u16>().map_err(|_| ConfigError::Invalid {
            what: format!("server port {:?} is not a valid TCP port", port),
        })?;

        let settings = ServerSettings {
            name: required("server name", server.name)?,
            ip: required("server ip", server.ip)?,
            port,
            domain: required("server domain", server.domain)?,
            pki_dir: server
                .pki_dir
                .map(|dir| dir.trim().to_string())
                .filter(|dir| !dir.is_empty())
                .unwrap_or_else(|| DEFAULT_PKI_DIR.to_string()),
        };

        let machine = match document.machine {
            Some(element) => machine_layout(element)?,
            None => MachineLayout::default(),
        };

        Ok(Self {
            server: settings,
            machine,
        })
    }
}

fn required(what: &str, value: String) -> ConfigResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Invalid {
            what: format!("{what} must not be empty"),
        });
    }
    Ok(value.to_string())
}

fn machine_layout(element: MachineElement) -> ConfigResult<MachineLayout> {
    let defaults = MachineLayout::default();
    if element.valves.is_empty() {
        return Err(ConfigError::Invalid {
            what: "machine must declare at least one valve".to_string(),
        });
    }

    let valves = element
        .valves
        .into_iter()
        .map(|valve| Ok(ValveSpec::new(valve.kind, required("valve name", valve.name)?)))
        .collect::<ConfigResult<Vec<_>>>()?;

    Ok(MachineLayout {
        factory: match element.factory {
            Some(factory) => required("machine factory", factory)?,
            None => defaults.factory,
        },
        name: match element.name {
            Some(name) => required("machine name", name)?,
            None => defaults.name,
        },
        percent_policy: element.percent_policy,
        valves,
    })
}

/// Config file location: `$VALVE_SIM_CONFIG`, else `config.xml`.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
