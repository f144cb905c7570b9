pub mod devices;
pub mod machine;

pub use devices::{
    AnalogValve, Command, ControlSurface, DiscreteValve, Operation, PercentPolicy, Valve,
    ValveKind, ValveSnapshot, ValveState,
};
pub use machine::{Machine, MachineLayout, SharedValve, ValveSpec};
