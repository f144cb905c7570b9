use std::sync::Arc;

use opcua::sync::RwLock;

use super::devices::{PercentPolicy, Valve, ValveKind, ValveSnapshot};

/// Valve shared between its owning machine and the method callbacks that
/// route remote invocations to it.
pub type SharedValve = Arc<RwLock<Valve>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValveSpec {
    pub kind: ValveKind,
    pub name: String,
}

impl ValveSpec {
    pub fn new(kind: ValveKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// Object hierarchy and valves to expose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineLayout {
    pub factory: String,
    pub name: String,
    pub percent_policy: PercentPolicy,
    pub valves: Vec<ValveSpec>,
}

impl Default for MachineLayout {
    fn default() -> Self {
        Self {
            factory: "Factory".to_string(),
            name: "Machine".to_string(),
            percent_policy: PercentPolicy::Clamp,
            valves: vec![
                ValveSpec::new(ValveKind::Discrete, "DiscreteValve"),
                ValveSpec::new(ValveKind::Analog, "AnalogValve"),
            ],
        }
    }
}

/// Owns every valve for the lifetime of the process.
pub struct Machine {
    pub factory: String,
    pub name: String,
    valves: Vec<(String, SharedValve)>,
}

impl Machine {
    pub fn from_layout(layout: &MachineLayout) -> Self {
        let valves = layout
            .valves
            .iter()
            .map(|spec| {
                let valve = Valve::new(spec.kind, layout.percent_policy);
                (spec.name.clone(), Arc::new(RwLock::new(valve)))
            })
            .collect();

        Self {
            factory: layout.factory.clone(),
            name: layout.name.clone(),
            valves,
        }
    }

    pub fn valves(&self) -> impl Iterator<Item = (&str, &SharedValve)> {
        self.valves.iter().map(|(name, valve)| (name.as_str(), valve))
    }

    pub fn valve(&self, name: &str) -> Option<SharedValve> {
        self.valves
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, valve)| valve.clone())
    }

    pub fn snapshots(&self) -> Vec<(String, ValveSnapshot)> {
        self.valves
            .iter()
            .map(|(name, valve)| (name.clone(), valve.read().snapshot()))
            .collect()
    }
}
