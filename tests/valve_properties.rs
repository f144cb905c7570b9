use proptest::prelude::*;
use valve_simulator::simulator::{
    AnalogValve, Command, ControlSurface, DiscreteValve, PercentPolicy, Valve, ValveKind,
};

proptest! {
    #[test]
    fn discrete_flags_follow_last_command(ops in prop::collection::vec(any::<bool>(), 1..40)) {
        let mut valve = DiscreteValve::new();
        for open in ops {
            if open {
                valve.open();
            } else {
                valve.close();
            }
            let state = valve.state();
            prop_assert!(state.opened != state.closed);
            prop_assert_eq!(state.opened, open);
        }
    }

    #[test]
    fn analog_open_accumulates_and_saturates(p1 in 0u64..=300, p2 in 0u64..=300) {
        let mut valve = AnalogValve::new(PercentPolicy::Clamp);
        valve.open(p1).unwrap();
        let position = valve.open(p2).unwrap();

        prop_assert_eq!(u64::from(position), (p1 + p2).min(100));
        prop_assert_eq!(valve.state().opened, position > 0);
        prop_assert_eq!(valve.state().closed, position == 0);
    }

    #[test]
    fn analog_close_from_full_by_at_least_full_closes(p in 100u64..=u64::MAX) {
        let mut valve = AnalogValve::new(PercentPolicy::Clamp);
        valve.open(100).unwrap();
        prop_assert_eq!(valve.close(p).unwrap(), 0);
        prop_assert!(valve.state().closed);
        prop_assert!(!valve.state().opened);
    }

    #[test]
    fn analog_position_stays_in_bounds(
        ops in prop::collection::vec((any::<bool>(), 0u64..=150), 1..60)
    ) {
        let mut valve = Valve::new(ValveKind::Analog, PercentPolicy::Clamp);
        for (open, percent) in ops {
            let command = if open { Command::OpenBy(percent) } else { Command::CloseBy(percent) };
            let snapshot = valve.apply(command).unwrap();
            let position = snapshot.position.unwrap();

            prop_assert!(position <= 100);
            prop_assert_eq!(snapshot.closed, position == 0);
            prop_assert_eq!(snapshot.opened, position > 0);
        }
    }
}

#[test]
fn open_zero_from_closed_changes_nothing() {
    let mut valve = Valve::new(ValveKind::Analog, PercentPolicy::Clamp);
    let before = valve.snapshot();
    let after = valve.apply(Command::OpenBy(0)).unwrap();
    assert_eq!(before, after);
    assert_eq!(after.position, Some(0));
    assert!(after.closed);
}

#[test]
fn analog_reference_scenario() {
    let mut valve = Valve::new(ValveKind::Analog, PercentPolicy::Clamp);

    let s = valve.apply(Command::OpenBy(30)).unwrap();
    assert_eq!((s.position, s.opened, s.closed), (Some(30), true, false));

    let s = valve.apply(Command::OpenBy(80)).unwrap();
    assert_eq!((s.position, s.opened, s.closed), (Some(100), true, false));

    let s = valve.apply(Command::CloseBy(100)).unwrap();
    assert_eq!((s.position, s.opened, s.closed), (Some(0), false, true));
}

#[test]
fn discrete_reference_scenario() {
    let mut valve = Valve::new(ValveKind::Discrete, PercentPolicy::Clamp);
    let initial = valve.snapshot();
    assert!(initial.closed && !initial.opened);

    let opened = valve.apply(Command::Open).unwrap();
    assert!(opened.opened && !opened.closed);
    assert_eq!(valve.apply(Command::Open).unwrap(), opened);

    assert_eq!(valve.apply(Command::Close).unwrap(), initial);
}
