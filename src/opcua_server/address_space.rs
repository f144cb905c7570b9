//! Protocol-neutral view of an OPC UA address space.
//!
//! Valve bindings talk to this trait only, so the same code populates the real
//! `opcua` server and the in-memory tree used by tests.

use crate::error::{BindingResult, InvocationResult};

/// Opaque reference to a node, addressed by its dotted browse path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    path: String,
}

impl NodeHandle {
    /// The root Objects folder.
    pub fn objects() -> Self {
        Self {
            path: String::new(),
        }
    }

    pub fn is_objects(&self) -> bool {
        self.path.is_empty()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn child(&self, name: &str) -> Self {
        let path = if self.is_objects() {
            name.to_string()
        } else {
            format!("{}.{}", self.path, name)
        };
        Self { path }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeValue {
    Boolean(bool),
    UInt32(u32),
}

impl AttributeValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            AttributeValue::UInt32(v) => Some(*v),
            _ => None,
        }
    }
}

/// A positional argument received from a remote caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Unsigned(u64),
    Signed(i64),
    /// Any non-integer value, described by its type.
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    UInt32,
}

/// Declared input argument of a method node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgumentSpec {
    pub name: &'static str,
    pub data_type: ArgType,
    pub description: &'static str,
}

/// Callback run when a remote client invokes a method node.
pub type MethodHandler = Box<dyn Fn(&[ArgValue]) -> InvocationResult<()> + Send + Sync>;

/// Hierarchical namespace of objects, variables and methods.
pub trait AddressSpace {
    fn objects(&self) -> NodeHandle {
        NodeHandle::objects()
    }

    fn add_object(&mut self, parent: &NodeHandle, name: &str) -> BindingResult<NodeHandle>;

    fn add_variable(
        &mut self,
        parent: &NodeHandle,
        name: &str,
        initial: AttributeValue,
    ) -> BindingResult<NodeHandle>;

    fn set_value(&mut self, variable: &NodeHandle, value: AttributeValue) -> BindingResult<()>;

    fn value(&self, variable: &NodeHandle) -> BindingResult<AttributeValue>;

    fn add_method(
        &mut self,
        parent: &NodeHandle,
        name: &str,
        arguments: &[ArgumentSpec],
        handler: MethodHandler,
    ) -> BindingResult<NodeHandle>;
}
