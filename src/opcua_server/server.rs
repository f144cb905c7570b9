use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use opcua::server::{
    address_space::method::MethodBuilder, callbacks, prelude::*, session::SessionManager,
};
use opcua::types::service_types::Argument;
use opcua::sync::RwLock;
use tokio::sync::oneshot;

use super::address_space::{
    self as nodes, ArgType, ArgValue, ArgumentSpec, AttributeValue, MethodHandler, NodeHandle,
};
use super::binding::BoundMachine;
use crate::config::SimulatorConfig;
use crate::error::{BindingError, BindingResult, InvocationError, SimulatorError};
use crate::simulator::machine::Machine;

/// How often valve state is copied into the address space.
pub const PUBLISH_INTERVAL: Duration = Duration::from_millis(100);

/// How long to wait for the server loop to wind down after an abort.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// [`nodes::AddressSpace`] backed by the `opcua` server address space.
///
/// Node ids are string ids in the registered namespace, derived from the
/// dotted browse path of each node.
pub struct OpcUaAddressSpace<'a> {
    space: &'a mut AddressSpace,
    namespace: u16,
}

impl<'a> OpcUaAddressSpace<'a> {
    pub fn new(space: &'a mut AddressSpace, namespace: u16) -> Self {
        Self { space, namespace }
    }

    fn node_id(&self, handle: &NodeHandle) -> NodeId {
        if handle.is_objects() {
            NodeId::objects_folder_id()
        } else {
            NodeId::new(self.namespace, handle.path().to_string())
        }
    }

    /// Resolves `parent` and reserves the id of its new child `name`.
    fn claim(
        &self,
        parent: &NodeHandle,
        name: &str,
    ) -> BindingResult<(NodeHandle, NodeId, NodeId)> {
        let parent_id = self.node_id(parent);
        if !self.space.node_exists(&parent_id) {
            return Err(BindingError::UnknownNode {
                path: parent.path().to_string(),
            });
        }

        let handle = parent.child(name);
        let node_id = self.node_id(&handle);
        if self.space.node_exists(&node_id) {
            return Err(BindingError::DuplicateNode {
                path: handle.path().to_string(),
            });
        }
        Ok((handle, node_id, parent_id))
    }
}

fn inserted(ok: bool, handle: NodeHandle) -> BindingResult<NodeHandle> {
    if ok {
        Ok(handle)
    } else {
        Err(BindingError::Insert {
            path: handle.path().to_string(),
        })
    }
}

fn to_variant(value: AttributeValue) -> Variant {
    match value {
        AttributeValue::Boolean(v) => Variant::Boolean(v),
        AttributeValue::UInt32(v) => Variant::UInt32(v),
    }
}

fn to_argument(spec: &ArgumentSpec) -> Argument {
    let data_type = match spec.data_type {
        ArgType::UInt32 => DataTypeId::UInt32,
    };
    Argument {
        name: UAString::from(spec.name),
        data_type: data_type.into(),
        value_rank: -1,
        array_dimensions: None,
        description: LocalizedText::new("", spec.description),
    }
}

impl nodes::AddressSpace for OpcUaAddressSpace<'_> {
    fn add_object(&mut self, parent: &NodeHandle, name: &str) -> BindingResult<NodeHandle> {
        let (handle, node_id, parent_id) = self.claim(parent, name)?;
        let builder = ObjectBuilder::new(&node_id, name, name);
        let builder = if parent.is_objects() {
            builder.organized_by(parent_id)
        } else {
            builder.component_of(parent_id)
        };
        inserted(builder.insert(self.space), handle)
    }

    fn add_variable(
        &mut self,
        parent: &NodeHandle,
        name: &str,
        initial: AttributeValue,
    ) -> BindingResult<NodeHandle> {
        let (handle, node_id, parent_id) = self.claim(parent, name)?;
        let variable = Variable::new(&node_id, name, name, to_variant(initial));
        let ok = self
            .space
            .add_variables(vec![variable], &parent_id)
            .into_iter()
            .all(|ok| ok);
        inserted(ok, handle)
    }

    fn set_value(&mut self, variable: &NodeHandle, value: AttributeValue) -> BindingResult<()> {
        let node_id = self.node_id(variable);
        let now = DateTime::now();
        if self
            .space
            .set_variable_value(node_id, to_variant(value), &now, &now)
        {
            Ok(())
        } else {
            Err(BindingError::UnknownNode {
                path: variable.path().to_string(),
            })
        }
    }

    fn value(&self, variable: &NodeHandle) -> BindingResult<AttributeValue> {
        let unknown = || BindingError::UnknownNode {
            path: variable.path().to_string(),
        };
        let data_value = self
            .space
            .get_variable_value(self.node_id(variable))
            .map_err(|_| unknown())?;
        match data_value.value {
            Some(Variant::Boolean(v)) => Ok(AttributeValue::Boolean(v)),
            Some(Variant::UInt32(v)) => Ok(AttributeValue::UInt32(v)),
            _ => Err(unknown()),
        }
    }

    fn add_method(
        &mut self,
        parent: &NodeHandle,
        name: &str,
        arguments: &[ArgumentSpec],
        handler: MethodHandler,
    ) -> BindingResult<NodeHandle> {
        let (handle, node_id, parent_id) = self.claim(parent, name)?;
        let mut builder = MethodBuilder::new(&node_id, name, name).component_of(parent_id);
        if !arguments.is_empty() {
            let arguments: Vec<Argument> = arguments.iter().map(to_argument).collect();
            builder = builder.input_args(self.space, &arguments);
        }
        let callback = ValveMethod {
            path: handle.path().to_string(),
            handler,
        };
        inserted(builder.callback(Box::new(callback)).insert(self.space), handle)
    }
}

/// Routes an OPC UA method call to a valve handler.
struct ValveMethod {
    path: String,
    handler: MethodHandler,
}

impl ValveMethod {
    fn invoke(&self, input: &[Variant]) -> Result<CallMethodResult, StatusCode> {
        let args: Vec<ArgValue> = input.iter().map(arg_value).collect();

        tracing::debug!("Method {} called with {:?}", self.path, args);
        (self.handler)(&args).map_err(|e| status_code(&e))?;

        Ok(CallMethodResult {
            status_code: StatusCode::Good,
            input_argument_results: if args.is_empty() {
                None
            } else {
                Some(vec![StatusCode::Good; args.len()])
            },
            input_argument_diagnostic_infos: None,
            output_arguments: None,
        })
    }
}

impl callbacks::Method for ValveMethod {
    fn call(
        &mut self,
        _session_id: &NodeId,
        _session_manager: Arc<RwLock<SessionManager>>,
        request: &CallMethodRequest,
    ) -> Result<CallMethodResult, StatusCode> {
        self.invoke(request.input_arguments.as_deref().unwrap_or(&[]))
    }
}

fn arg_value(variant: &Variant) -> ArgValue {
    match variant {
        Variant::Byte(v) => ArgValue::Unsigned(u64::from(*v)),
        Variant::UInt16(v) => ArgValue::Unsigned(u64::from(*v)),
        Variant::UInt32(v) => ArgValue::Unsigned(u64::from(*v)),
        Variant::UInt64(v) => ArgValue::Unsigned(*v),
        Variant::SByte(v) => ArgValue::Signed(i64::from(*v)),
        Variant::Int16(v) => ArgValue::Signed(i64::from(*v)),
        Variant::Int32(v) => ArgValue::Signed(i64::from(*v)),
        Variant::Int64(v) => ArgValue::Signed(*v),
        other => ArgValue::Other(format!("{:?}", other)),
    }
}

pub fn status_code(error: &InvocationError) -> StatusCode {
    match error {
        InvocationError::MissingArgument { .. } => StatusCode::BadArgumentsMissing,
        InvocationError::TooManyArguments { .. } => StatusCode::BadTooManyArguments,
        InvocationError::TypeMismatch { .. } => StatusCode::BadTypeMismatch,
        InvocationError::Negative { .. } | InvocationError::OutOfRange { .. } => {
            StatusCode::BadOutOfRange
        }
        InvocationError::Unsupported { .. } => StatusCode::BadNotSupported,
    }
}

/// A built server with the machine bound into its address space.
pub struct ValveServer {
    pub server: Server,
    pub namespace: u16,
    pub bound: BoundMachine,
}

pub fn create_server(
    config: &SimulatorConfig,
    machine: &Machine,
) -> Result<ValveServer, SimulatorError> {
    let settings = &config.server;
    let server = ServerBuilder::new_anonymous(settings.name.as_str())
        .application_uri(format!("urn:{}", settings.domain))
        .create_sample_keypair(true)
        .pki_dir(settings.pki_dir.as_str())
        .discovery_server_url(None)
        .host_and_port(settings.ip.as_str(), settings.port)
        .server()
        .ok_or_else(|| SimulatorError::Server {
            what: format!("invalid server configuration for {}", settings.endpoint_url()),
        })?;

    let (namespace, bound) = {
        let address_space = server.address_space();
        let mut address_space = address_space.write();

        let uri = settings.namespace_uri();
        let namespace = address_space
            .register_namespace(&uri)
            .map_err(|_| BindingError::Namespace { uri: uri.clone() })?;
        tracing::info!("Registered namespace {} as ns={}", uri, namespace);

        let mut nodes = OpcUaAddressSpace::new(&mut address_space, namespace);
        let bound = BoundMachine::bind(&mut nodes, machine)?;
        (namespace, bound)
    };

    Ok(ValveServer {
        server,
        namespace,
        bound,
    })
}

/// Why the server loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Interrupted,
    Operator,
    ServerExited,
}

/// Resolves once the operator enters a line on stdin or stdin closes.
///
/// The blocking read runs on a detached thread that is never joined, so a
/// pending read cannot hold up runtime shutdown.
fn operator_stop() -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        if let Err(e) = std::io::stdin().read_line(&mut line) {
            tracing::warn!("Failed to read stdin: {}", e);
        }
        let _ = tx.send(());
    });
    rx
}

/// Waits for Ctrl+C, the `operator` future or the server task, whichever
/// comes first.
pub async fn wait_for_stop<O, S>(operator: O, server_task: S) -> StopReason
where
    O: Future,
    S: Future,
{
    tokio::select! {
        _ = tokio::signal::ctrl_c() => StopReason::Interrupted,
        _ = operator => StopReason::Operator,
        _ = server_task => StopReason::ServerExited,
    }
}

/// Runs the valve server until the operator presses Enter or Ctrl+C.
pub async fn start_valve_server(config: SimulatorConfig) -> Result<(), SimulatorError> {
    let machine = Machine::from_layout(&config.machine);
    let ValveServer {
        server,
        namespace,
        bound,
    } = create_server(&config, &machine)?;

    // Spawn update task
    let address_space = server.address_space();
    let publisher = tokio::spawn(async move {
        let mut interval = tokio::time::interval(PUBLISH_INTERVAL);

        loop {
            interval.tick().await;

            let mut address_space = address_space.write();
            let mut nodes = OpcUaAddressSpace::new(&mut address_space, namespace);
            if let Err(e) = bound.publish(&mut nodes) {
                tracing::error!("Failed to publish valve state: {}", e);
            }
        }
    });

    tracing::info!("START server");
    let server = Arc::new(RwLock::new(server));
    let mut server_task = tokio::spawn(Server::new_server_task(server.clone()));
    tracing::info!("Server started on {}", config.server.endpoint_url());
    tracing::info!("Press Enter to STOP server");

    let reason = wait_for_stop(operator_stop(), &mut server_task).await;
    match reason {
        StopReason::Interrupted => tracing::info!("Received Ctrl+C, shutting down"),
        StopReason::Operator => tracing::info!("Stop requested by operator"),
        StopReason::ServerExited => tracing::warn!("OPC UA server terminated"),
    }

    publisher.abort();
    if reason != StopReason::ServerExited {
        server.write().abort();
        if tokio::time::timeout(SHUTDOWN_GRACE, server_task).await.is_err() {
            tracing::warn!("Server did not stop within {:?}", SHUTDOWN_GRACE);
        }
    }

    for (name, snapshot) in machine.snapshots() {
        tracing::debug!("Final state of {}: {:?}", name, snapshot);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcua_server::address_space::AddressSpace as _;
    use crate::opcua_server::binding::{method_handler, PERCENT_ARGUMENT};
    use crate::simulator::devices::Command;
    use crate::simulator::machine::MachineLayout;

    const TEST_NAMESPACE: &str = "http://valves.test";

    fn node(namespace: u16, path: &str) -> NodeId {
        NodeId::new(namespace, path.to_string())
    }

    fn bound_default_machine() -> (AddressSpace, u16, Machine, BoundMachine) {
        let mut space = AddressSpace::new();
        let namespace = space.register_namespace(TEST_NAMESPACE).unwrap();
        let machine = Machine::from_layout(&MachineLayout::default());
        let bound = {
            let mut nodes = OpcUaAddressSpace::new(&mut space, namespace);
            BoundMachine::bind(&mut nodes, &machine).unwrap()
        };
        (space, namespace, machine, bound)
    }

    #[test]
    fn machine_is_bound_under_objects_folder() {
        let (space, ns, _machine, _bound) = bound_default_machine();

        for path in [
            "Factory",
            "Factory.Machine",
            "Factory.Machine.DiscreteValve.DiscreteValve_opened",
            "Factory.Machine.DiscreteValve.open",
            "Factory.Machine.AnalogValve.AnalogValve_state",
            "Factory.Machine.AnalogValve.Open valve",
        ] {
            assert!(space.node_exists(&node(ns, path)), "missing {path}");
        }

        assert!(space.has_reference(
            &NodeId::objects_folder_id(),
            &node(ns, "Factory"),
            ReferenceTypeId::Organizes
        ));
        assert!(space.has_reference(
            &node(ns, "Factory"),
            &node(ns, "Factory.Machine"),
            ReferenceTypeId::HasComponent
        ));
        assert!(space.has_reference(
            &node(ns, "Factory.Machine.AnalogValve"),
            &node(ns, "Factory.Machine.AnalogValve.Close valve"),
            ReferenceTypeId::HasComponent
        ));
    }

    #[test]
    fn rebinding_reports_duplicate_nodes() {
        let (mut space, ns, machine, _bound) = bound_default_machine();
        let mut nodes = OpcUaAddressSpace::new(&mut space, ns);

        assert_eq!(
            BoundMachine::bind(&mut nodes, &machine).err(),
            Some(BindingError::DuplicateNode {
                path: "Factory".to_string()
            })
        );
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let (mut space, ns, _machine, _bound) = bound_default_machine();
        let mut nodes = OpcUaAddressSpace::new(&mut space, ns);
        let missing = NodeHandle::objects().child("Nowhere");

        assert_eq!(
            nodes.add_object(&missing, "Valve").err(),
            Some(BindingError::UnknownNode {
                path: "Nowhere".to_string()
            })
        );
    }

    #[test]
    fn publish_writes_valve_state_into_variables() {
        let (mut space, ns, machine, bound) = bound_default_machine();
        let analog = bound.valve("AnalogValve").unwrap();
        let position = analog.position_node().unwrap().clone();

        machine
            .valve("AnalogValve")
            .unwrap()
            .write()
            .apply(Command::OpenBy(30))
            .unwrap();

        let mut nodes = OpcUaAddressSpace::new(&mut space, ns);
        assert_eq!(nodes.value(&position).unwrap(), AttributeValue::UInt32(0));

        bound.publish(&mut nodes).unwrap();
        assert_eq!(nodes.value(&position).unwrap(), AttributeValue::UInt32(30));
        assert_eq!(
            nodes.value(analog.opened_node()).unwrap(),
            AttributeValue::Boolean(true)
        );
        assert_eq!(
            nodes.value(analog.closed_node()).unwrap(),
            AttributeValue::Boolean(false)
        );
    }

    #[test]
    fn valve_method_maps_results_to_status_codes() {
        let machine = Machine::from_layout(&MachineLayout::default());
        let valve = machine.valve("AnalogValve").unwrap();
        let open = valve.read().operations()[0];
        let method = ValveMethod {
            path: "Factory.Machine.AnalogValve.Open valve".to_string(),
            handler: method_handler("AnalogValve".to_string(), valve.clone(), open),
        };

        assert_eq!(
            method.invoke(&[Variant::Int32(-1)]).err(),
            Some(StatusCode::BadOutOfRange)
        );
        assert_eq!(method.invoke(&[]).err(), Some(StatusCode::BadArgumentsMissing));
        assert_eq!(
            method.invoke(&[Variant::from("ten")]).err(),
            Some(StatusCode::BadTypeMismatch)
        );
        assert_eq!(valve.read().snapshot().position, Some(0));

        let result = method.invoke(&[Variant::UInt32(30)]).unwrap();
        assert_eq!(result.status_code, StatusCode::Good);
        assert_eq!(result.input_argument_results, Some(vec![StatusCode::Good]));
        assert_eq!(valve.read().snapshot().position, Some(30));
    }

    #[tokio::test]
    async fn operator_line_stops_the_wait() {
        let (tx, rx) = oneshot::channel::<()>();
        tx.send(()).unwrap();

        let reason = wait_for_stop(rx, std::future::pending::<()>()).await;
        assert_eq!(reason, StopReason::Operator);
    }

    #[tokio::test]
    async fn closed_operator_channel_stops_the_wait() {
        let (tx, rx) = oneshot::channel::<()>();
        drop(tx);

        let reason = wait_for_stop(rx, std::future::pending::<()>()).await;
        assert_eq!(reason, StopReason::Operator);
    }

    #[tokio::test]
    async fn finished_server_task_ends_the_wait() {
        let (_tx, rx) = oneshot::channel::<()>();
        let mut server_task = tokio::spawn(async {});

        let reason = wait_for_stop(rx, &mut server_task).await;
        assert_eq!(reason, StopReason::ServerExited);
    }

    #[test]
    fn invocation_errors_map_to_status_codes() {
        assert_eq!(
            status_code(&InvocationError::MissingArgument { name: "Percent" }),
            StatusCode::BadArgumentsMissing
        );
        assert_eq!(
            status_code(&InvocationError::Negative {
                name: "Percent",
                value: -1
            }),
            StatusCode::BadOutOfRange
        );
        assert_eq!(
            status_code(&InvocationError::Unsupported {
                kind: "Discrete",
                operation: "open(percent)"
            }),
            StatusCode::BadNotSupported
        );
    }

    #[test]
    fn variants_decode_to_argument_values() {
        assert_eq!(arg_value(&Variant::UInt32(40)), ArgValue::Unsigned(40));
        assert_eq!(arg_value(&Variant::Int32(-3)), ArgValue::Signed(-3));
        assert!(matches!(
            arg_value(&Variant::from("forty")),
            ArgValue::Other(_)
        ));
    }

    #[test]
    fn percent_argument_descriptor() {
        let argument = to_argument(&PERCENT_ARGUMENT);
        assert_eq!(argument.value_rank, -1);
        assert_eq!(argument.data_type, <DataTypeId as Into<NodeId>>::into(DataTypeId::UInt32));
        assert_eq!(argument.name, UAString::from("Percent"));
    }
}
