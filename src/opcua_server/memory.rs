//! In-memory address space, used to exercise valve bindings without a
//! network server.

use std::collections::HashMap;

use super::address_space::{
    AddressSpace, ArgValue, ArgumentSpec, AttributeValue, MethodHandler, NodeHandle,
};
use crate::error::{BindingError, BindingResult, InvocationResult};

enum MemoryNode {
    Object,
    Variable(AttributeValue),
    Method {
        arguments: Vec<ArgumentSpec>,
        handler: MethodHandler,
    },
}

#[derive(Default)]
pub struct MemoryAddressSpace {
    nodes: HashMap<NodeHandle, MemoryNode>,
    children: HashMap<NodeHandle, Vec<String>>,
}

impl MemoryAddressSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Browse names of the direct children of `parent`, in insertion order.
    pub fn browse(&self, parent: &NodeHandle) -> Vec<String> {
        self.children.get(parent).cloned().unwrap_or_default()
    }

    /// Declared input arguments of a method node.
    pub fn arguments(&self, method: &NodeHandle) -> BindingResult<&[ArgumentSpec]> {
        match self.nodes.get(method) {
            Some(MemoryNode::Method { arguments, .. }) => Ok(arguments.as_slice()),
            _ => Err(unknown(method)),
        }
    }

    /// Invokes a method node the way a remote client would.
    pub fn call(
        &self,
        method: &NodeHandle,
        args: &[ArgValue],
    ) -> BindingResult<InvocationResult<()>> {
        match self.nodes.get(method) {
            Some(MemoryNode::Method { handler, .. }) => Ok(handler(args)),
            _ => Err(unknown(method)),
        }
    }

    fn insert(
        &mut self,
        parent: &NodeHandle,
        name: &str,
        node: MemoryNode,
    ) -> BindingResult<NodeHandle> {
        if !parent.is_objects() && !matches!(self.nodes.get(parent), Some(MemoryNode::Object)) {
            return Err(unknown(parent));
        }
        let handle = parent.child(name);
        if self.nodes.contains_key(&handle) {
            return Err(BindingError::DuplicateNode {
                path: handle.path().to_string(),
            });
        }
        self.nodes.insert(handle.clone(), node);
        self.children
            .entry(parent.clone())
            .or_default()
            .push(name.to_string());
        Ok(handle)
    }
}

fn unknown(node: &NodeHandle) -> BindingError {
    BindingError::UnknownNode {
        path: node.path().to_string(),
    }
}

impl AddressSpace for MemoryAddressSpace {
    fn add_object(&mut self, parent: &NodeHandle, name: &str) -> BindingResult<NodeHandle> {
        self.insert(parent, name, MemoryNode::Object)
    }

    fn add_variable(
        &mut self,
        parent: &NodeHandle,
        name: &str,
        initial: AttributeValue,
    ) -> BindingResult<NodeHandle> {
        self.insert(parent, name, MemoryNode::Variable(initial))
    }

    fn set_value(&mut self, variable: &NodeHandle, value: AttributeValue) -> BindingResult<()> {
        match self.nodes.get_mut(variable) {
            Some(MemoryNode::Variable(current)) => {
                *current = value;
                Ok(())
            }
            _ => Err(unknown(variable)),
        }
    }

    fn value(&self, variable: &NodeHandle) -> BindingResult<AttributeValue> {
        match self.nodes.get(variable) {
            Some(MemoryNode::Variable(value)) => Ok(*value),
            _ => Err(unknown(variable)),
        }
    }

    fn add_method(
        &mut self,
        parent: &NodeHandle,
        name: &str,
        arguments: &[ArgumentSpec],
        handler: MethodHandler,
    ) -> BindingResult<NodeHandle> {
        self.insert(
            parent,
            name,
            MemoryNode::Method {
                arguments: arguments.to_vec(),
                handler,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_children_are_rejected() {
        let mut space = MemoryAddressSpace::new();
        let root = space.objects();
        space.add_object(&root, "Factory").unwrap();

        let err = space.add_object(&root, "Factory").unwrap_err();
        assert_eq!(
            err,
            BindingError::DuplicateNode {
                path: "Factory".into()
            }
        );
    }

    #[test]
    fn children_require_an_object_parent() {
        let mut space = MemoryAddressSpace::new();
        let root = space.objects();
        let flag = space
            .add_variable(&root, "flag", AttributeValue::Boolean(false))
            .unwrap();

        assert!(space.add_object(&flag, "nested").is_err());
        assert!(space.add_object(&root.child("missing"), "nested").is_err());
    }

    #[test]
    fn values_round_trip_and_methods_dispatch() {
        let mut space = MemoryAddressSpace::new();
        let root = space.objects();
        let flag = space
            .add_variable(&root, "flag", AttributeValue::Boolean(false))
            .unwrap();
        space.set_value(&flag, AttributeValue::Boolean(true)).unwrap();
        assert_eq!(space.value(&flag).unwrap(), AttributeValue::Boolean(true));

        let ping = space
            .add_method(
                &root,
                "ping",
                &[],
                Box::new(|args: &[ArgValue]| {
                    assert!(args.is_empty());
                    Ok(())
                }),
            )
            .unwrap();
        assert_eq!(space.call(&ping, &[]).unwrap(), Ok(()));
        assert!(space.call(&flag, &[]).is_err());
        assert_eq!(space.browse(&root), vec!["flag", "ping"]);
    }
}
