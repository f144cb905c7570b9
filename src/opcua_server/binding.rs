//! Exposes valves as objects, variables and methods in an [`AddressSpace`].

use super::address_space::{
    AddressSpace, ArgType, ArgValue, ArgumentSpec, AttributeValue, MethodHandler, NodeHandle,
};
use crate::error::{BindingResult, InvocationError, InvocationResult};
use crate::simulator::devices::Operation;
use crate::simulator::machine::{Machine, SharedValve};

pub const PERCENT_ARGUMENT: ArgumentSpec = ArgumentSpec {
    name: "Percent",
    data_type: ArgType::UInt32,
    description: "Percent (0 - 100)",
};

/// A valve together with the nodes created for it.
pub struct BoundValve {
    name: String,
    valve: SharedValve,
    object: NodeHandle,
    opened: NodeHandle,
    closed: NodeHandle,
    position: Option<NodeHandle>,
    methods: Vec<(&'static str, NodeHandle)>,
}

impl BoundValve {
    /// Creates the valve object and its common state variables under
    /// `parent`, then registers the variant's control interface.
    pub fn construct<S: AddressSpace + ?Sized>(
        space: &mut S,
        parent: &NodeHandle,
        name: &str,
        valve: SharedValve,
    ) -> BindingResult<Self> {
        let object = space.add_object(parent, name)?;
        let snapshot = valve.read().snapshot();
        let opened = space.add_variable(
            &object,
            &format!("{name}_opened"),
            AttributeValue::Boolean(snapshot.opened),
        )?;
        let closed = space.add_variable(
            &object,
            &format!("{name}_closed"),
            AttributeValue::Boolean(snapshot.closed),
        )?;

        let mut bound = Self {
            name: name.to_string(),
            valve,
            object,
            opened,
            closed,
            position: None,
            methods: Vec::new(),
        };
        bound.register_interface(space)?;
        Ok(bound)
    }

    fn register_interface<S: AddressSpace + ?Sized>(
        &mut self,
        space: &mut S,
    ) -> BindingResult<()> {
        let (operations, position) = {
            let valve = self.valve.read();
            (valve.operations(), valve.snapshot().position)
        };

        if let Some(position) = position {
            self.position = Some(space.add_variable(
                &self.object,
                &format!("{}_state", self.name),
                AttributeValue::UInt32(u32::from(position)),
            )?);
        }

        for operation in operations {
            let arguments: &[ArgumentSpec] = if operation.takes_percent {
                &[PERCENT_ARGUMENT]
            } else {
                &[]
            };
            let handler = method_handler(self.name.clone(), self.valve.clone(), *operation);
            let node = space.add_method(&self.object, operation.method, arguments, handler)?;
            self.methods.push((operation.method, node));
        }

        tracing::debug!(
            "Registered {} methods for valve {}",
            self.methods.len(),
            self.name
        );
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn valve(&self) -> &SharedValve {
        &self.valve
    }

    pub fn object(&self) -> &NodeHandle {
        &self.object
    }

    pub fn opened_node(&self) -> &NodeHandle {
        &self.opened
    }

    pub fn closed_node(&self) -> &NodeHandle {
        &self.closed
    }

    pub fn position_node(&self) -> Option<&NodeHandle> {
        self.position.as_ref()
    }

    pub fn method(&self, name: &str) -> Option<&NodeHandle> {
        self.methods
            .iter()
            .find(|(method, _)| *method == name)
            .map(|(_, node)| node)
    }

    /// Mirrors the valve's current state into its variables.
    pub fn publish<S: AddressSpace + ?Sized>(&self, space: &mut S) -> BindingResult<()> {
        let snapshot = self.valve.read().snapshot();
        space.set_value(&self.opened, AttributeValue::Boolean(snapshot.opened))?;
        space.set_value(&self.closed, AttributeValue::Boolean(snapshot.closed))?;
        if let (Some(node), Some(position)) = (&self.position, snapshot.position) {
            space.set_value(node, AttributeValue::UInt32(u32::from(position)))?;
        }
        Ok(())
    }
}

/// The factory and machine objects plus every bound valve.
pub struct BoundMachine {
    pub factory: NodeHandle,
    pub machine: NodeHandle,
    valves: Vec<BoundValve>,
}

impl BoundMachine {
    /// Creates `{factory}/{machine}` under the Objects folder and binds every
    /// valve beneath it.
    pub fn bind<S: AddressSpace + ?Sized>(
        space: &mut S,
        machine: &Machine,
    ) -> BindingResult<Self> {
        let root = space.objects();
        let factory = space.add_object(&root, &machine.factory)?;
        let machine_node = space.add_object(&factory, &machine.name)?;

        let mut valves = Vec::new();
        for (name, valve) in machine.valves() {
            let bound = BoundValve::construct(space, &machine_node, name, valve.clone())?;
            tracing::info!("Valve {} bound at {}", name, bound.object().path());
            valves.push(bound);
        }

        Ok(Self {
            factory,
            machine: machine_node,
            valves,
        })
    }

    pub fn valves(&self) -> &[BoundValve] {
        &self.valves
    }

    pub fn valve(&self, name: &str) -> Option<&BoundValve> {
        self.valves.iter().find(|valve| valve.name() == name)
    }

    pub fn publish<S: AddressSpace + ?Sized>(&self, space: &mut S) -> BindingResult<()> {
        for valve in &self.valves {
            valve.publish(space)?;
        }
        Ok(())
    }
}

pub(crate) fn method_handler(name: String, valve: SharedValve, operation: Operation) -> MethodHandler {
    Box::new(move |args: &[ArgValue]| {
        let percent = if operation.takes_percent {
            decode_percent(args)?
        } else {
            expect_no_arguments(args)?;
            0
        };
        let command = operation.command(percent);

        // The write lock spans the whole read-modify-write of the valve.
        let result = valve.write().apply(command);
        match result {
            Ok(snapshot) => {
                tracing::info!(
                    "{} {:?}: opened={} closed={} position={:?}",
                    name,
                    command,
                    snapshot.opened,
                    snapshot.closed,
                    snapshot.position
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!("{} rejected {:?}: {}", name, command, e);
                Err(e)
            }
        }
    })
}

fn expect_no_arguments(args: &[ArgValue]) -> InvocationResult<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(InvocationError::TooManyArguments {
            expected: 0,
            got: args.len(),
        })
    }
}

/// Decodes the single `Percent` argument. The value is kept whole so the
/// valve's percent policy sees exactly what the client sent.
pub fn decode_percent(args: &[ArgValue]) -> InvocationResult<u64> {
    let name = PERCENT_ARGUMENT.name;
    match args {
        [] => Err(InvocationError::MissingArgument { name }),
        [ArgValue::Unsigned(value)] => Ok(*value),
        [ArgValue::Signed(value)] if *value < 0 => {
            Err(InvocationError::Negative { name, value: *value })
        }
        [ArgValue::Signed(value)] => Ok(value.unsigned_abs()),
        [ArgValue::Other(found)] => Err(InvocationError::TypeMismatch {
            name,
            found: found.clone(),
        }),
        _ => Err(InvocationError::TooManyArguments {
            expected: 1,
            got: args.len(),
        }),
    }
}
