//! Clocked two-wire slave device.
//!
//! A [`TwoWireSlave`] watches an open-drain data/clock pair and answers one
//! 7-bit address, the way a PN532-style NFC front end sits on its host bus.
//! Writes addressed to it land in the inbound channel. Reads first return a
//! status byte (data ready or not) and then stream the outbound channel, padding
//! with a filler byte once it runs dry.
//!
//! The engine samples data on the rising clock edge and changes its own data
//! output on the falling edge. It never drives the clock.

use crate::channel::DEFAULT_CHANNEL_DEPTH;
use crate::error::SimError;
use crate::kernel::{ChannelId, Component, DriverId, NetId, SimContext, Wait};
use crate::signal::Logic;
use core::fmt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use tracing::{debug, trace, warn};

pub const DEFAULT_ADDRESS: u8 = 0x24;
pub const MAX_ADDRESS: u8 = 0x7F;

/// Status byte sent first in every read: outbound data is waiting.
pub const STATUS_READY: u8 = 0x01;
/// Status byte sent first in every read: nothing queued.
pub const STATUS_EMPTY: u8 = 0x00;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwoWireConfig {
    /// 7-bit device address.
    pub address: u8,
    /// Byte clocked out when a read continues past the queued data.
    pub filler: u8,
    pub inbound_capacity: usize,
    pub outbound_capacity: usize,
}

impl Default for TwoWireConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            filler: 0x00,
            inbound_capacity: DEFAULT_CHANNEL_DEPTH,
            outbound_capacity: DEFAULT_CHANNEL_DEPTH,
        }
    }
}

impl TwoWireConfig {
    pub fn validate(&self) -> Result<(), SimError> {
        if self.address > MAX_ADDRESS {
            return Err(SimError::InvalidAddress(self.address));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TwoWireState {
    #[default]
    Idle,
    AddressPhase,
    /// Addressed to another device; silent until the next START or STOP.
    AddressMismatch,
    AckWrite,
    WriteByte,
    AckWriteByte,
    AckRead,
    ReadByte,
    /// Waiting for the controller's acknowledge after a byte we sent.
    AckOrNack,
}

impl fmt::Display for TwoWireState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TwoWireState::Idle => "idle",
            TwoWireState::AddressPhase => "address",
            TwoWireState::AddressMismatch => "mismatch",
            TwoWireState::AckWrite => "ack-write",
            TwoWireState::WriteByte => "write",
            TwoWireState::AckWriteByte => "ack-write-byte",
            TwoWireState::AckRead => "ack-read",
            TwoWireState::ReadByte => "read",
            TwoWireState::AckOrNack => "ack-or-nack",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TwoWireStats {
    /// Address phases that matched this device.
    pub transactions: u32,
    pub bytes_in: u32,
    /// Data bytes sent, status bytes excluded.
    pub bytes_out: u32,
    pub filler_bytes: u32,
    pub address_mismatches: u32,
    /// Outbound bytes discarded by a write, NACK or STOP.
    pub flushed: u32,
    /// Inbound bytes lost because the inbound channel was full.
    pub dropped: u32,
    pub anomalies: u32,
}

#[derive(Debug)]
pub struct TwoWireSlave {
    config: TwoWireConfig,
    sda: DriverId,
    scl: NetId,
    inbound: ChannelId,
    outbound: ChannelId,

    state: TwoWireState,
    /// Line levels seen at the previous wake, pulled up when undriven.
    sda_high: bool,
    scl_high: bool,
    /// Lines that read Conflict at the previous wake.
    sda_contended: bool,
    scl_contended: bool,
    shift: u8,
    bits: u8,
    /// The acknowledge slot's low level has been asserted.
    ack_driven: bool,
    /// The controller acknowledged the last byte we sent.
    acked: bool,
    read_active: bool,
    status: u8,

    stats: TwoWireStats,
}

impl TwoWireSlave {
    pub fn new(
        config: TwoWireConfig,
        sda: DriverId,
        scl: NetId,
        inbound: ChannelId,
        outbound: ChannelId,
    ) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self {
            config,
            sda,
            scl,
            inbound,
            outbound,
            state: TwoWireState::Idle,
            sda_high: true,
            scl_high: true,
            sda_contended: false,
            scl_contended: false,
            shift: 0,
            bits: 0,
            ack_driven: false,
            acked: false,
            read_active: false,
            status: STATUS_EMPTY,
            stats: TwoWireStats::default(),
        })
    }

    pub fn address(&self) -> u8 {
        self.config.address
    }

    pub fn config(&self) -> &TwoWireConfig {
        &self.config
    }

    pub fn state(&self) -> TwoWireState {
        self.state
    }

    pub fn stats(&self) -> &TwoWireStats {
        &self.stats
    }

    pub fn is_read_active(&self) -> bool {
        self.read_active
    }

    pub fn inbound(&self) -> ChannelId {
        self.inbound
    }

    pub fn outbound(&self) -> ChannelId {
        self.outbound
    }

    fn sda_net(&self) -> NetId {
        self.sda.net()
    }

    /// Open-drain view of a line: undriven is pulled high, contention reads low.
    /// Entering contention counts one anomaly however long it lasts.
    fn sample(
        ctx: &SimContext<'_>,
        net: NetId,
        contended: &mut bool,
        anomalies: &mut u32,
    ) -> bool {
        let level = ctx.read_logic(net);
        let conflict = level == Logic::Conflict;
        if conflict && !*contended {
            *anomalies += 1;
            warn!(
                line = %ctx.net(net).name(),
                time = %ctx.now(),
                "contention on two-wire line, reading low"
            );
        }
        *contended = conflict;
        matches!(level, Logic::One | Logic::Floating)
    }

    fn drive_bit(&self, ctx: &mut SimContext<'_>, bit: bool) {
        if bit {
            ctx.release(self.sda);
        } else {
            ctx.drive(self.sda, Logic::Zero);
        }
    }

    fn flush_outbound(&mut self, ctx: &mut SimContext<'_>) {
        let flushed = ctx.clear_channel(self.outbound);
        if flushed > 0 {
            debug!(device = self.config.address, flushed, "outbound data discarded");
            self.stats.flushed += flushed as u32;
        }
    }

    fn on_start(&mut self, ctx: &mut SimContext<'_>) {
        if !matches!(self.state, TwoWireState::Idle | TwoWireState::AddressMismatch) {
            trace!(device = self.config.address, from = %self.state, "repeated start");
        }
        ctx.release(self.sda);
        self.state = TwoWireState::AddressPhase;
        self.shift = 0;
        self.bits = 0;
    }

    fn on_stop(&mut self, ctx: &mut SimContext<'_>) {
        // The clock pulse that sets up a STOP always shifts in one bit.
        let mid_byte = matches!(
            self.state,
            TwoWireState::AddressPhase | TwoWireState::WriteByte | TwoWireState::ReadByte
        ) && self.bits > 1;
        if mid_byte {
            self.stats.anomalies += 1;
            warn!(
                device = self.config.address,
                state = %self.state,
                bits = self.bits,
                "stop condition in the middle of a byte"
            );
        }
        if self.read_active {
            self.flush_outbound(ctx);
            self.read_active = false;
        }
        ctx.release(self.sda);
        self.state = TwoWireState::Idle;
        self.bits = 0;
    }

    fn on_clock_rise(&mut self, ctx: &mut SimContext<'_>, sda: bool) {
        match self.state {
            TwoWireState::AddressPhase => {
                self.shift = self.shift << 1 | u8::from(sda);
                self.bits += 1;
                if self.bits < 8 {
                    return;
                }
                let address = self.shift >> 1;
                let read = self.shift & 1 == 1;
                if address != self.config.address {
                    trace!(device = self.config.address, address, "not addressed");
                    self.stats.address_mismatches += 1;
                    self.state = TwoWireState::AddressMismatch;
                    return;
                }
                self.stats.transactions += 1;
                self.ack_driven = false;
                if read {
                    self.status = if ctx.channel(self.outbound).is_empty() {
                        STATUS_EMPTY
                    } else {
                        STATUS_READY
                    };
                    self.read_active = true;
                    self.state = TwoWireState::AckRead;
                    debug!(device = address, status = self.status, "read addressed");
                } else {
                    self.flush_outbound(ctx);
                    self.state = TwoWireState::AckWrite;
                    debug!(device = address, "write addressed");
                }
            }
            TwoWireState::WriteByte => {
                self.shift = self.shift << 1 | u8::from(sda);
                self.bits += 1;
                if self.bits < 8 {
                    return;
                }
                let byte = self.shift;
                trace!(device = self.config.address, byte, "byte written");
                if ctx.push_byte(self.inbound, byte) {
                    self.stats.bytes_in += 1;
                } else {
                    self.stats.dropped += 1;
                }
                self.ack_driven = false;
                self.state = TwoWireState::AckWriteByte;
            }
            TwoWireState::ReadByte => {
                self.bits += 1;
            }
            TwoWireState::AckOrNack => {
                if sda {
                    debug!(device = self.config.address, "controller NACK, read finished");
                    self.flush_outbound(ctx);
                    self.read_active = false;
                    self.acked = false;
                    self.state = TwoWireState::Idle;
                } else {
                    self.acked = true;
                }
            }
            TwoWireState::Idle
            | TwoWireState::AddressMismatch
            | TwoWireState::AckWrite
            | TwoWireState::AckWriteByte
            | TwoWireState::AckRead => {}
        }
    }

    fn load_byte(&mut self, ctx: &mut SimContext<'_>, byte: u8) {
        self.shift = byte;
        self.bits = 0;
        self.state = TwoWireState::ReadByte;
        self.drive_bit(ctx, byte & 0x80 != 0);
    }

    fn on_clock_fall(&mut self, ctx: &mut SimContext<'_>) {
        match self.state {
            TwoWireState::AckWrite | TwoWireState::AckWriteByte | TwoWireState::AckRead => {
                if !self.ack_driven {
                    ctx.drive(self.sda, Logic::Zero);
                    self.ack_driven = true;
                    return;
                }
                self.ack_driven = false;
                if self.state == TwoWireState::AckRead {
                    let status = self.status;
                    self.load_byte(ctx, status);
                } else {
                    ctx.release(self.sda);
                    self.shift = 0;
                    self.bits = 0;
                    self.state = TwoWireState::WriteByte;
                }
            }
            TwoWireState::ReadByte => {
                if self.bits >= 8 {
                    ctx.release(self.sda);
                    self.acked = false;
                    self.state = TwoWireState::AckOrNack;
                } else {
                    let bit = self.shift >> (7 - self.bits) & 1 == 1;
                    self.drive_bit(ctx, bit);
                }
            }
            TwoWireState::AckOrNack if self.acked => {
                self.acked = false;
                let byte = match ctx.pop_byte(self.outbound) {
                    Some(byte) => {
                        self.stats.bytes_out += 1;
                        byte
                    }
                    None => {
                        self.stats.filler_bytes += 1;
                        self.config.filler
                    }
                };
                trace!(device = self.config.address, byte, "byte read");
                self.load_byte(ctx, byte);
            }
            _ => {}
        }
    }
}

impl Component for TwoWireSlave {
    fn kind(&self) -> &'static str {
        "two-wire"
    }

    fn resume(&mut self, _process: usize, ctx: &mut SimContext<'_>) -> Wait {
        let sda_net = self.sda_net();
        let sda = Self::sample(ctx, sda_net, &mut self.sda_contended, &mut self.stats.anomalies);
        let scl = Self::sample(ctx, self.scl, &mut self.scl_contended, &mut self.stats.anomalies);
        let (was_sda, was_scl) = (self.sda_high, self.scl_high);
        self.sda_high = sda;
        self.scl_high = scl;

        if was_scl && scl && was_sda != sda {
            if sda {
                self.on_stop(ctx);
            } else {
                self.on_start(ctx);
            }
        } else if !was_scl && scl {
            self.on_clock_rise(ctx, sda);
        } else if was_scl && !scl {
            self.on_clock_fall(ctx);
        }

        Wait::change(&[sda_net, self.scl])
    }

    fn state_label(&self) -> String {
        self.state.to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
