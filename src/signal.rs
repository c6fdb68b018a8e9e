//! Wire value domain and multi-driver resolution.
//!
//! Every net carries a [`SignalValue`] of a fixed [`SignalKind`]. When several
//! drivers assert values on one net, [`resolve`] folds them into the single
//! value every reader observes and reports whether the drivers disagreed.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Four-state digital level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Logic {
    Zero,
    One,
    /// No active driver (high impedance).
    #[default]
    Floating,
    /// Active drivers disagree.
    Conflict,
}

impl Logic {
    pub fn from_bit(bit: bool) -> Self {
        if bit {
            Logic::One
        } else {
            Logic::Zero
        }
    }

    /// `Some(bit)` for `Zero`/`One`, `None` for `Floating`/`Conflict`.
    pub fn to_bit(self) -> Option<bool> {
        match self {
            Logic::Zero => Some(false),
            Logic::One => Some(true),
            Logic::Floating | Logic::Conflict => None,
        }
    }

    pub fn is_binary(self) -> bool {
        matches!(self, Logic::Zero | Logic::One)
    }

    pub fn as_char(self) -> char {
        match self {
            Logic::Zero => '0',
            Logic::One => '1',
            Logic::Floating => 'Z',
            Logic::Conflict => 'X',
        }
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Level of a mixed net: either a digital state or an analog reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Level {
    Digital(Logic),
    Analog(f64),
}

impl Default for Level {
    fn default() -> Self {
        Level::Digital(Logic::Floating)
    }
}

/// Representation carried by a net. Fixed when the net is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    Bool,
    Logic,
    Analog,
    Mixed,
}

impl SignalKind {
    /// Value of a net of this kind with no active driver.
    pub fn undriven(self) -> SignalValue {
        match self {
            SignalKind::Bool => SignalValue::Bool(false),
            SignalKind::Logic => SignalValue::Logic(Logic::Floating),
            SignalKind::Analog => SignalValue::Analog(0.0),
            SignalKind::Mixed => SignalValue::Mixed(Level::Digital(Logic::Floating)),
        }
    }

    /// Whether nets of this kind can carry more than one writer.
    pub fn is_resolved(self) -> bool {
        matches!(self, SignalKind::Logic | SignalKind::Mixed)
    }

    /// Value reported for a net whose drivers disagree.
    pub fn conflict(self) -> SignalValue {
        match self {
            SignalKind::Bool => SignalValue::Bool(false),
            SignalKind::Logic => SignalValue::Logic(Logic::Conflict),
            SignalKind::Analog => SignalValue::Analog(0.0),
            SignalKind::Mixed => SignalValue::Mixed(Level::Digital(Logic::Conflict)),
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalKind::Bool => "bool",
            SignalKind::Logic => "logic",
            SignalKind::Analog => "analog",
            SignalKind::Mixed => "mixed",
        };
        f.write_str(name)
    }
}

/// A value observed on, or asserted onto, a net.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SignalValue {
    Bool(bool),
    Logic(Logic),
    Analog(f64),
    Mixed(Level),
}

impl SignalValue {
    pub const FLOATING: SignalValue = SignalValue::Logic(Logic::Floating);
    pub const CONFLICT: SignalValue = SignalValue::Logic(Logic::Conflict);
    pub const LOW: SignalValue = SignalValue::Logic(Logic::Zero);
    pub const HIGH: SignalValue = SignalValue::Logic(Logic::One);

    pub fn kind(&self) -> SignalKind {
        match self {
            SignalValue::Bool(_) => SignalKind::Bool,
            SignalValue::Logic(_) => SignalKind::Logic,
            SignalValue::Analog(_) => SignalKind::Analog,
            SignalValue::Mixed(_) => SignalKind::Mixed,
        }
    }

    /// Digital view of the value. Analog levels have no digital meaning and
    /// read as `Conflict`.
    pub fn as_logic(&self) -> Logic {
        match *self {
            SignalValue::Bool(bit) => Logic::from_bit(bit),
            SignalValue::Logic(level) => level,
            SignalValue::Mixed(Level::Digital(level)) => level,
            SignalValue::Analog(_) | SignalValue::Mixed(Level::Analog(_)) => Logic::Conflict,
        }
    }

    /// Numeric level, if the value has one.
    pub fn as_analog(&self) -> Option<f64> {
        match *self {
            SignalValue::Analog(v) | SignalValue::Mixed(Level::Analog(v)) => Some(v),
            _ => None,
        }
    }

    /// True when the value would release a driver rather than assert anything.
    pub fn is_floating(&self) -> bool {
        matches!(
            self,
            SignalValue::Logic(Logic::Floating) | SignalValue::Mixed(Level::Digital(Logic::Floating))
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            SignalValue::Logic(Logic::Conflict) | SignalValue::Mixed(Level::Digital(Logic::Conflict))
        )
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Bool(bit) => write!(f, "{bit}"),
            SignalValue::Logic(level) | SignalValue::Mixed(Level::Digital(level)) => {
                write!(f, "{level}")
            }
            SignalValue::Analog(v) | SignalValue::Mixed(Level::Analog(v)) => write!(f, "{v:.4}"),
        }
    }
}

impl From<Logic> for SignalValue {
    fn from(level: Logic) -> Self {
        SignalValue::Logic(level)
    }
}

impl From<bool> for SignalValue {
    fn from(bit: bool) -> Self {
        SignalValue::Bool(bit)
    }
}

/// Transition classes a process can suspend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Edge {
    /// The digital view becomes `One`.
    Rising,
    /// The digital view becomes `Zero`.
    Falling,
    /// Any change of value.
    Any,
}

impl Edge {
    pub fn matches(self, previous: &SignalValue, current: &SignalValue) -> bool {
        if previous == current {
            return false;
        }
        match self {
            Edge::Rising => previous.as_logic() != Logic::One && current.as_logic() == Logic::One,
            Edge::Falling => previous.as_logic() != Logic::Zero && current.as_logic() == Logic::Zero,
            Edge::Any => true,
        }
    }
}

/// Outcome of folding a net's active drivers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub value: SignalValue,
    /// Two or more active drivers disagreed.
    pub conflict: bool,
    pub active_drivers: usize,
}

/// Resolves the values of a net's active drivers.
///
/// * no driver: the kind's undriven value (`Floating` for logic and mixed)
/// * one driver, or several that agree exactly: that value
/// * disagreement: the kind's conflict value and `conflict = true`
///
/// The fold only compares every value against the first, so the result does
/// not depend on the order the drivers are visited in.
pub fn resolve<'a, I>(kind: SignalKind, drivers: I) -> Resolution
where
    I: IntoIterator<Item = &'a SignalValue>,
{
    let mut first: Option<SignalValue> = None;
    let mut conflict = false;
    let mut active_drivers = 0;

    for value in drivers {
        if value.is_floating() {
            continue;
        }
        active_drivers += 1;
        match first {
            None => first = Some(*value),
            Some(seen) if seen != *value => conflict = true,
            Some(_) => {}
        }
    }

    let value = if conflict {
        kind.conflict()
    } else {
        first.unwrap_or_else(|| kind.undriven())
    };

    Resolution {
        value,
        conflict,
        active_drivers,
    }
}
