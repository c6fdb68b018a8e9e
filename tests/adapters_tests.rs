mod common;

use common::count_warnings;
use pinsim::adapters::{AdapterKind, SignalAdapter};
use pinsim::kernel::{ComponentId, DriverId, NetId, SimDuration, Simulator};
use pinsim::signal::{Level, Logic, SignalKind, SignalValue};

struct AdapterRig {
    sim: Simulator,
    adapter: ComponentId,
    stimulus: DriverId,
    output: NetId,
}

fn adapter_rig(kind: AdapterKind) -> AdapterRig {
    let mut sim = Simulator::new();
    let input = sim.add_net("in", kind.input_kind()).unwrap();
    let output = sim.add_net("out", kind.output_kind()).unwrap();
    let stimulus = sim.add_driver(input, "bench").unwrap();
    let out_drv = sim.add_driver(output, "adapter").unwrap();
    let adapter = sim
        .add_component("adapter", SignalAdapter::new(kind, input, out_drv))
        .unwrap();
    AdapterRig {
        sim,
        adapter,
        stimulus,
        output,
    }
}

impl AdapterRig {
    fn apply(&mut self, value: impl Into<SignalValue>) -> SignalValue {
        self.sim.drive(self.stimulus, value);
        self.sim.settle().unwrap();
        self.sim.read(self.output)
    }

    fn adapter(&self) -> &SignalAdapter {
        self.sim.component::<SignalAdapter>(self.adapter).unwrap()
    }
}

#[cfg(test)]
mod digital_tests {
    use super::*;

    #[test]
    fn test_bool_to_logic_follows_input() {
        let mut rig = adapter_rig(AdapterKind::BoolToLogic);
        rig.sim.settle().unwrap();
        assert_eq!(rig.sim.read(rig.output), SignalValue::LOW);

        assert_eq!(rig.apply(true), SignalValue::HIGH);
        assert_eq!(rig.apply(false), SignalValue::LOW);
    }

    #[test]
    fn test_logic_to_bool_reads_invalid_levels_false() {
        let mut rig = adapter_rig(AdapterKind::LogicToBool);
        assert_eq!(rig.apply(Logic::One), SignalValue::Bool(true));

        rig.sim.release(rig.stimulus);
        rig.sim.run_for(SimDuration::from_us(1)).unwrap();
        assert_eq!(rig.sim.read(rig.output), SignalValue::Bool(false));

        assert_eq!(rig.apply(Logic::One), SignalValue::Bool(true));
        assert_eq!(rig.apply(Logic::Conflict), SignalValue::Bool(false));
    }

    #[test]
    fn test_invalid_read_warns_once_after_start() {
        let mut rig = adapter_rig(AdapterKind::LogicToBool);

        // The input floats at start-up without a warning
        let at_start = count_warnings(|| rig.sim.settle().unwrap());
        assert_eq!(at_start, 0);
        assert_eq!(rig.adapter().invalid_reads(), 1);
        assert!(!rig.adapter().warned_invalid());

        let later = count_warnings(|| {
            rig.sim.run_for(SimDuration::from_us(1)).unwrap();
            rig.apply(Logic::Conflict);
            rig.apply(Logic::One);
            rig.apply(Logic::Floating);
            rig.apply(Logic::Conflict);
        });
        assert_eq!(later, 1);
        assert_eq!(rig.adapter().invalid_reads(), 4);
        assert!(rig.adapter().warned_invalid());
    }

    #[test]
    fn test_logic_to_mixed_keeps_every_level() {
        let mut rig = adapter_rig(AdapterKind::LogicToMixed);
        for level in [Logic::Zero, Logic::One, Logic::Conflict] {
            assert_eq!(rig.apply(level), SignalValue::Mixed(Level::Digital(level)));
        }
        // A released input releases the output as well
        rig.sim.release(rig.stimulus);
        rig.sim.settle().unwrap();
        assert_eq!(rig.sim.read(rig.output).as_logic(), Logic::Floating);
        assert_eq!(rig.adapter().last_output(), None);
    }
}

#[cfg(test)]
mod analog_tests {
    use super::*;

    #[test]
    fn test_mixed_to_analog_passes_levels() {
        let mut rig = adapter_rig(AdapterKind::MixedToAnalog);
        let out = rig.apply(SignalValue::Mixed(Level::Analog(2.2)));
        assert_eq!(out, SignalValue::Analog(2.2));
        assert_eq!(rig.adapter().last_output(), Some(SignalValue::Analog(2.2)));
    }

    #[test]
    fn test_mixed_to_analog_releases_on_digital_input() {
        let mut rig = adapter_rig(AdapterKind::MixedToAnalog);
        rig.apply(SignalValue::Mixed(Level::Analog(0.9)));
        let out = rig.apply(SignalValue::Mixed(Level::Digital(Logic::One)));
        assert_eq!(out, SignalValue::Analog(0.0));
        assert_eq!(rig.adapter().last_output(), None);
    }

    #[test]
    fn test_analog_to_mixed_and_back_to_logic() {
        let mut sim = Simulator::new();
        let volts = sim.add_net("volts", SignalKind::Analog).unwrap();
        let pad = sim.add_net("pad", SignalKind::Mixed).unwrap();
        let logic = sim.add_net("logic", SignalKind::Logic).unwrap();
        let source = sim.add_driver(volts, "bench").unwrap();
        let pad_drv = sim.add_driver(pad, "to_mixed").unwrap();
        let logic_drv = sim.add_driver(logic, "to_logic").unwrap();
        sim.add_component(
            "to_mixed",
            SignalAdapter::new(AdapterKind::AnalogToMixed, volts, pad_drv),
        )
        .unwrap();
        sim.add_component(
            "to_logic",
            SignalAdapter::new(AdapterKind::MixedToLogic, pad, logic_drv),
        )
        .unwrap();

        sim.drive(source, SignalValue::Analog(1.5));
        sim.settle().unwrap();

        assert_eq!(sim.read(pad), SignalValue::Mixed(Level::Analog(1.5)));
        // An analog level has no digital reading
        assert_eq!(sim.read(logic), SignalValue::CONFLICT);
    }
}
