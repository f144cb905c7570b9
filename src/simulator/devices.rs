use serde::Deserialize;

use crate::error::{InvocationError, InvocationResult};

/// Fully open position of an analog valve.
pub const MAX_POSITION: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValveKind {
    Discrete,
    Analog,
}

impl ValveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValveKind::Discrete => "Discrete",
            ValveKind::Analog => "Analog",
        }
    }
}

/// How an analog valve treats a percent argument above [`MAX_POSITION`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PercentPolicy {
    /// Accept any value and saturate the position at its bounds.
    #[default]
    Clamp,
    /// Refuse values above 100 without touching the valve.
    Reject,
}

/// The two observable flags every valve carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValveState {
    pub opened: bool,
    pub closed: bool,
}

impl Default for ValveState {
    fn default() -> Self {
        Self {
            opened: false,
            closed: true,
        }
    }
}

impl ValveState {
    fn mark_opened(&mut self) {
        self.opened = true;
        self.closed = false;
    }

    fn mark_closed(&mut self) {
        self.opened = false;
        self.closed = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Open,
    Close,
}

/// A typed request against a valve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Open,
    Close,
    OpenBy(u64),
    CloseBy(u64),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Open => "open",
            Command::Close => "close",
            Command::OpenBy(_) => "open(percent)",
            Command::CloseBy(_) => "close(percent)",
        }
    }
}

/// One remotely invokable operation offered by a valve variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    /// Browse name of the method node.
    pub method: &'static str,
    pub direction: Direction,
    /// Whether the method takes a single `Percent` argument.
    pub takes_percent: bool,
}

impl Operation {
    /// Builds the command for this operation. `percent` is ignored by
    /// operations without arguments.
    pub fn command(&self, percent: u64) -> Command {
        match (self.direction, self.takes_percent) {
            (Direction::Open, false) => Command::Open,
            (Direction::Close, false) => Command::Close,
            (Direction::Open, true) => Command::OpenBy(percent),
            (Direction::Close, true) => Command::CloseBy(percent),
        }
    }
}

/// Control interface each valve variant must provide so it can be bound
/// into an address space.
pub trait ControlSurface {
    fn kind(&self) -> ValveKind;

    /// Every operation a remote client may invoke on this variant.
    fn operations(&self) -> &'static [Operation];

    fn state(&self) -> ValveState;

    /// Numeric aperture, for variants that have one.
    fn position(&self) -> Option<u8> {
        None
    }

    fn apply(&mut self, command: Command) -> InvocationResult<()>;
}

const DISCRETE_OPERATIONS: &[Operation] = &[
    Operation {
        method: "open",
        direction: Direction::Open,
        takes_percent: false,
    },
    Operation {
        method: "close",
        direction: Direction::Close,
        takes_percent: false,
    },
];

const ANALOG_OPERATIONS: &[Operation] = &[
    Operation {
        method: "Open valve",
        direction: Direction::Open,
        takes_percent: true,
    },
    Operation {
        method: "Close valve",
        direction: Direction::Close,
        takes_percent: true,
    },
];

/// Binary on/off valve.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscreteValve {
    state: ValveState,
}

impl DiscreteValve {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self) {
        self.state.mark_opened();
    }

    pub fn close(&mut self) {
        self.state.mark_closed();
    }
}

impl ControlSurface for DiscreteValve {
    fn kind(&self) -> ValveKind {
        ValveKind::Discrete
    }

    fn operations(&self) -> &'static [Operation] {
        DISCRETE_OPERATIONS
    }

    fn state(&self) -> ValveState {
        self.state
    }

    fn apply(&mut self, command: Command) -> InvocationResult<()> {
        match command {
            Command::Open => self.open(),
            Command::Close => self.close(),
            other => {
                return Err(InvocationError::Unsupported {
                    kind: self.kind().as_str(),
                    operation: other.name(),
                })
            }
        }
        Ok(())
    }
}

/// Proportional valve with an integer position in `0..=100`.
///
/// `closed` means fully closed: any non-zero position reports
/// `opened == true` and `closed == false`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalogValve {
    state: ValveState,
    position: u8,
    policy: PercentPolicy,
}

impl AnalogValve {
    pub fn new(policy: PercentPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn position(&self) -> u8 {
        self.position
    }

    /// Moves the valve open by `percent`, saturating at [`MAX_POSITION`].
    /// Returns the new position.
    pub fn open(&mut self, percent: u64) -> InvocationResult<u8> {
        self.check(percent)?;
        let current = self.position;
        let result = u64::from(current)
            .saturating_add(percent)
            .min(u64::from(MAX_POSITION));

        if current == 0 && result > 0 {
            self.state.mark_opened();
        }

        self.position = result as u8;
        Ok(self.position)
    }

    /// Moves the valve closed by `percent`. Reaching zero (or below) clamps to
    /// zero and marks the valve closed. Returns the new position.
    pub fn close(&mut self, percent: u64) -> InvocationResult<u8> {
        self.check(percent)?;
        let current = u64::from(self.position);

        if percent >= current {
            self.position = 0;
            self.state.mark_closed();
        } else {
            self.position = (current - percent) as u8;
        }
        Ok(self.position)
    }

    fn check(&self, percent: u64) -> InvocationResult<()> {
        if self.policy == PercentPolicy::Reject && percent > u64::from(MAX_POSITION) {
            return Err(InvocationError::OutOfRange {
                name: "Percent",
                value: percent,
                max: u32::from(MAX_POSITION),
            });
        }
        Ok(())
    }
}

impl ControlSurface for AnalogValve {
    fn kind(&self) -> ValveKind {
        ValveKind::Analog
    }

    fn operations(&self) -> &'static [Operation] {
        ANALOG_OPERATIONS
    }

    fn state(&self) -> ValveState {
        self.state
    }

    fn position(&self) -> Option<u8> {
        Some(self.position)
    }

    fn apply(&mut self, command: Command) -> InvocationResult<()> {
        match command {
            Command::OpenBy(percent) => self.open(percent).map(|_| ()),
            Command::CloseBy(percent) => self.close(percent).map(|_| ()),
            other => Err(InvocationError::Unsupported {
                kind: self.kind().as_str(),
                operation: other.name(),
            }),
        }
    }
}

/// Observable state of a valve at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValveSnapshot {
    pub opened: bool,
    pub closed: bool,
    pub position: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Valve {
    Discrete(DiscreteValve),
    Analog(AnalogValve),
}

impl Valve {
    pub fn new(kind: ValveKind, policy: PercentPolicy) -> Self {
        match kind {
            ValveKind::Discrete => Valve::Discrete(DiscreteValve::new()),
            ValveKind::Analog => Valve::Analog(AnalogValve::new(policy)),
        }
    }

    pub fn kind(&self) -> ValveKind {
        match self {
            Valve::Discrete(valve) => valve.kind(),
            Valve::Analog(valve) => valve.kind(),
        }
    }

    pub fn operations(&self) -> &'static [Operation] {
        match self {
            Valve::Discrete(valve) => valve.operations(),
            Valve::Analog(valve) => valve.operations(),
        }
    }

    pub fn snapshot(&self) -> ValveSnapshot {
        let (state, position) = match self {
            Valve::Discrete(valve) => (valve.state(), ControlSurface::position(valve)),
            Valve::Analog(valve) => (valve.state(), ControlSurface::position(valve)),
        };
        ValveSnapshot {
            opened: state.opened,
            closed: state.closed,
            position,
        }
    }

    /// Applies `command` and returns the resulting snapshot. Failed commands
    /// leave the valve untouched.
    pub fn apply(&mut self, command: Command) -> InvocationResult<ValveSnapshot> {
        match self {
            Valve::Discrete(valve) => valve.apply(command)?,
            Valve::Analog(valve) => valve.apply(command)?,
        }
        Ok(self.snapshot())
    }
}
