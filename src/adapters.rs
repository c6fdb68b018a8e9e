//! Translators between signal representations.
//!
//! The free functions are pure conversions. [`SignalAdapter`] wraps one of them
//! in a process that republishes its input onto an output net whenever the
//! input changes, so components speaking different representations can be
//! wired together.

use crate::kernel::{Component, DriverId, NetId, SimContext, SimTime, Wait};
use crate::signal::{Level, Logic, SignalKind, SignalValue};
use serde::{Deserialize, Serialize};
use std::any::Any;
use tracing::warn;

pub fn bool_to_logic(bit: bool) -> Logic {
    Logic::from_bit(bit)
}

/// `Zero`/`One` map to the bit. `Floating`/`Conflict` read as `false`; the
/// error carries the offending level so callers can report it.
pub fn logic_to_bool(level: Logic) -> Result<bool, Logic> {
    level.to_bit().ok_or(level)
}

pub fn logic_to_mixed(level: Logic) -> Level {
    Level::Digital(level)
}

/// Digital levels pass through; an analog level has no digital reading.
pub fn mixed_to_logic(level: Level) -> Logic {
    match level {
        Level::Digital(l) => l,
        Level::Analog(_) => Logic::Conflict,
    }
}

pub fn mixed_to_analog(level: Level) -> Option<f64> {
    match level {
        Level::Analog(v) => Some(v),
        Level::Digital(_) => None,
    }
}

pub fn analog_to_mixed(volts: f64) -> Level {
    Level::Analog(volts)
}

/// Re-expresses `value` as a value of `kind`, or `None` when the two
/// representations share nothing (an analog level onto a logic net).
pub fn convert(kind: SignalKind, value: SignalValue) -> Option<SignalValue> {
    let converted = match (kind, value) {
        (k, v) if v.kind() == k => v,
        (SignalKind::Logic, SignalValue::Bool(bit)) => SignalValue::Logic(bool_to_logic(bit)),
        (SignalKind::Logic, SignalValue::Mixed(level @ Level::Digital(_))) => {
            SignalValue::Logic(mixed_to_logic(level))
        }
        (SignalKind::Mixed, SignalValue::Bool(bit)) => {
            SignalValue::Mixed(logic_to_mixed(bool_to_logic(bit)))
        }
        (SignalKind::Mixed, SignalValue::Logic(level)) => SignalValue::Mixed(logic_to_mixed(level)),
        (SignalKind::Mixed, SignalValue::Analog(v)) => SignalValue::Mixed(analog_to_mixed(v)),
        (SignalKind::Analog, SignalValue::Mixed(level)) => SignalValue::Analog(mixed_to_analog(level)?),
        (SignalKind::Bool, SignalValue::Logic(level)) => SignalValue::Bool(logic_to_bool(level).ok()?),
        (SignalKind::Bool, SignalValue::Mixed(Level::Digital(level))) => {
            SignalValue::Bool(logic_to_bool(level).ok()?)
        }
        _ => return None,
    };
    Some(converted)
}

/// Which translation an adapter performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdapterKind {
    BoolToLogic,
    LogicToBool,
    LogicToMixed,
    MixedToLogic,
    MixedToAnalog,
    AnalogToMixed,
}

impl AdapterKind {
    pub fn input_kind(self) -> SignalKind {
        match self {
            AdapterKind::BoolToLogic => SignalKind::Bool,
            AdapterKind::LogicToBool | AdapterKind::LogicToMixed => SignalKind::Logic,
            AdapterKind::MixedToLogic | AdapterKind::MixedToAnalog => SignalKind::Mixed,
            AdapterKind::AnalogToMixed => SignalKind::Analog,
        }
    }

    pub fn output_kind(self) -> SignalKind {
        match self {
            AdapterKind::LogicToBool => SignalKind::Bool,
            AdapterKind::BoolToLogic | AdapterKind::MixedToLogic => SignalKind::Logic,
            AdapterKind::LogicToMixed | AdapterKind::AnalogToMixed => SignalKind::Mixed,
            AdapterKind::MixedToAnalog => SignalKind::Analog,
        }
    }
}

/// A stateless, continuously republishing translator between two nets.
#[derive(Debug)]
pub struct SignalAdapter {
    kind: AdapterKind,
    input: NetId,
    output: DriverId,
    invalid_reads: u32,
    warned_invalid: bool,
    last_output: Option<SignalValue>,
}

impl SignalAdapter {
    pub fn new(kind: AdapterKind, input: NetId, output: DriverId) -> Self {
        Self {
            kind,
            input,
            output,
            invalid_reads: 0,
            warned_invalid: false,
            last_output: None,
        }
    }

    pub fn adapter_kind(&self) -> AdapterKind {
        self.kind
    }

    /// Last value published, `None` while the output is released.
    pub fn last_output(&self) -> Option<SignalValue> {
        self.last_output
    }

    /// Non-binary levels read by a logic-to-bool adapter so far.
    pub fn invalid_reads(&self) -> u32 {
        self.invalid_reads
    }

    /// Whether the invalid-read warning has been logged. It is logged at most
    /// once, and never for reads at time zero.
    pub fn warned_invalid(&self) -> bool {
        self.warned_invalid
    }

    fn translate(&mut self, ctx: &SimContext<'_>, input: SignalValue) -> Option<SignalValue> {
        match self.kind {
            AdapterKind::BoolToLogic => Some(SignalValue::Logic(bool_to_logic(
                input.as_logic() == Logic::One,
            ))),
            AdapterKind::LogicToBool => match logic_to_bool(input.as_logic()) {
                Ok(bit) => Some(SignalValue::Bool(bit)),
                Err(level) => {
                    self.invalid_reads = self.invalid_reads.saturating_add(1);
                    // Nets start out floating; only complain once the design has had a
                    // chance to drive them.
                    if !self.warned_invalid && ctx.now() > SimTime::ZERO {
                        self.warned_invalid = true;
                        warn!(
                            net = %ctx.net(self.input).name(),
                            level = %level,
                            "non-binary level read as boolean false"
                        );
                    }
                    Some(SignalValue::Bool(false))
                }
            },
            AdapterKind::LogicToMixed => Some(SignalValue::Mixed(logic_to_mixed(input.as_logic()))),
            AdapterKind::MixedToLogic => match input {
                SignalValue::Mixed(level) => Some(SignalValue::Logic(mixed_to_logic(level))),
                other => Some(SignalValue::Logic(other.as_logic())),
            },
            AdapterKind::MixedToAnalog => match input {
                SignalValue::Mixed(level) => mixed_to_analog(level).map(SignalValue::Analog),
                other => other.as_analog().map(SignalValue::Analog),
            },
            AdapterKind::AnalogToMixed => input
                .as_analog()
                .map(|v| SignalValue::Mixed(analog_to_mixed(v))),
        }
    }
}

impl Component for SignalAdapter {
    fn kind(&self) -> &'static str {
        "adapter"
    }

    fn resume(&mut self, _process: usize, ctx: &mut SimContext<'_>) -> Wait {
        let input = ctx.read(self.input);
        let output = self.translate(ctx, input).filter(|v| !v.is_floating());
        match output {
            Some(value) => ctx.drive(self.output, value),
            None => ctx.release(self.output),
        }
        self.last_output = output;
        Wait::change(&[self.input])
    }

    fn state_label(&self) -> String {
        match self.last_output {
            Some(value) => format!("{:?} -> {}", self.kind, value),
            None => format!("{:?} -> released", self.kind),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
