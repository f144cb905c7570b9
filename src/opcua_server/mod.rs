pub mod address_space;
pub mod binding;
pub mod memory;
pub mod server;

pub use address_space::{AddressSpace, ArgValue, AttributeValue, NodeHandle};
pub use binding::{BoundMachine, BoundValve};
pub use memory::MemoryAddressSpace;
pub use server::{create_server, start_valve_server, wait_for_stop, OpcUaAddressSpace, StopReason};
