use crate::kernel::SimTime;
use crate::signal::SignalKind;
use thiserror::Error;

/// Assembly and addressing failures.
///
/// Protocol anomalies, FIFO overruns and bus contention are not errors: they
/// are logged and surface as counters or `Conflict` values on the wire.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("unknown pin {0}")]
    UnknownPin(u16),
    #[error("pin {0} declared twice")]
    DuplicatePin(u16),
    #[error("name `{0}` already in use")]
    DuplicateName(String),
    #[error("unknown component `{0}`")]
    UnknownComponent(String),
    #[error("net `{net}` is a single-writer {kind} net and already has a driver")]
    DriverLimit { net: String, kind: SignalKind },
    #[error("net `{net}` carries {found} values, expected {expected}")]
    KindMismatch {
        net: String,
        expected: SignalKind,
        found: SignalKind,
    },
    #[error("two-wire address {0:#04x} is outside the 7-bit range")]
    InvalidAddress(u8),
    #[error("channel `{channel}` capacity {capacity} outside 1..={max}")]
    InvalidCapacity {
        channel: String,
        capacity: usize,
        max: usize,
    },
    #[error("multiplexer `{name}`: {reason}")]
    InvalidMux { name: String, reason: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("delta cycle limit exceeded at {time}; combinational loop?")]
    DeltaOverflow { time: SimTime },
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
}
