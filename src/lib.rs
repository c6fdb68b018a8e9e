//! # Pin-level hardware simulator
//!
//! An event-driven simulation of the wires around a microcontroller, precise
//! enough to run serial protocols bit by bit against simulated peripherals.
//!
//! ## Features
//!
//! - **Shared-wire signals**: several drivers per net, resolved to a single
//!   four-state value with contention detection
//! - **Deterministic kernel**: delta-cycle scheduling of cooperative processes
//!   over integer-picosecond time
//! - **UART engine**: 8N1 transceiver with 1/1.5/2 stop bits and baud autodetect
//! - **Two-wire slave**: address matching, acknowledges, status byte and
//!   buffered reads and writes
//! - **Bus multiplexer**: select/inhibit controlled bidirectional switch
//!
//! ## Quick Start
//!
//! ```rust
//! use pinsim::{Logic, SignalKind, SimDuration, Simulator};
//!
//! let mut sim = Simulator::new();
//! let net = sim.add_net("led", SignalKind::Logic).unwrap();
//! let driver = sim.add_driver(net, "firmware").unwrap();
//!
//! sim.drive(driver, Logic::One);
//! sim.run_for(SimDuration::from_us(1)).unwrap();
//! assert_eq!(sim.read_logic(net), Logic::One);
//! ```
//!
//! ## Architecture
//!
//! - [`signal`] - value domain and resolution
//! - [`adapters`] - conversions between signal representations
//! - [`kernel`] - scheduler, time and snapshots
//! - [`channel`] - bounded byte FIFOs
//! - [`uart`], [`two_wire`], [`mux`] - protocol engines
//! - [`config`], [`board`] - assembly from a board description
//! - [`bench`] - scripted bus stimulus

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod adapters;
pub mod bench;
pub mod board;
pub mod channel;
pub mod config;
pub mod error;
pub mod kernel;
pub mod mux;
pub mod signal;
pub mod two_wire;
pub mod uart;

// Re-export main public types for convenience
pub use adapters::{AdapterKind, SignalAdapter};
pub use bench::{BusOp, TwoWireController};
pub use board::{Board, Registry};
pub use channel::{ByteChannel, ChannelStats};
pub use config::BoardConfig;
pub use error::SimError;
pub use kernel::snapshot::SimSnapshot;
pub use kernel::{
    ChannelId, Component, ComponentId, DriverId, NetId, SimContext, SimDuration, SimTime, Simulator,
    Wait, Wake,
};
pub use mux::{Mux, MuxState, Owner};
pub use signal::{resolve, Edge, Level, Logic, SignalKind, SignalValue};
pub use two_wire::{TwoWireConfig, TwoWireSlave, TwoWireState};
pub use uart::{StopBits, Uart, UartConfig, UartState};
