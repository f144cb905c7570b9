//! OPC UA valve simulator.
//!
//! Discrete and analog valves are modelled in [`simulator`] and exposed as
//! objects with invokable `open`/`close` methods by [`opcua_server`].

pub mod config;
pub mod error;
pub mod opcua_server;
pub mod simulator;
