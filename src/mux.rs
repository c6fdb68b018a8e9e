//! Bidirectional bus multiplexer.
//!
//! Connects a common port to one of up to 16 channel ports chosen by binary
//! select lines (LSB first). Whichever side starts driving first owns the
//! connection and is mirrored onto the other side. Switching channels or
//! raising the inhibit line disconnects both sides.

use crate::error::SimError;
use crate::kernel::{Component, ComponentId, DriverId, NetId, SimContext, Simulator, Wait, WaitSet};
use crate::signal::{Logic, SignalKind, SignalValue};
use arrayvec::ArrayVec;
use core::fmt;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use std::any::Any;
use tracing::{debug, warn};

pub const MAX_MUX_CHANNELS: usize = 16;
pub const MAX_SELECT_LINES: usize = 4;

const_assert!(MAX_MUX_CHANNELS == 1 << MAX_SELECT_LINES);
// select lines + inhibit + common + active channel
const_assert!(MAX_SELECT_LINES + 3 <= crate::kernel::MAX_WAIT_NETS);

/// Which side is currently mirrored onto the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Owner {
    #[default]
    None,
    Common,
    Channel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MuxState {
    /// Connected channel, `None` while inhibited or the select lines are invalid.
    pub selector: Option<usize>,
    pub owner: Owner,
    pub inhibited: bool,
    /// Both sides drove different values; latched until the next control change.
    pub contention: bool,
    /// Released after a control change, arbitration resumes next delta.
    pub settling: bool,
}

impl fmt::Display for MuxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.selector {
            Some(ch) => write!(f, "ch{ch} owner={:?}", self.owner)?,
            None if self.inhibited => write!(f, "inhibited")?,
            None => write!(f, "disconnected")?,
        }
        if self.contention {
            write!(f, " contention")?;
        }
        if self.settling {
            write!(f, " settling")?;
        }
        Ok(())
    }
}

/// Assembly-time sizing of a multiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuxConfig {
    pub channels: usize,
    pub select_lines: usize,
}

impl MuxConfig {
    pub fn validate(&self, name: &str) -> Result<(), SimError> {
        let invalid = |reason: String| SimError::InvalidMux {
            name: name.to_string(),
            reason,
        };
        if self.channels == 0 || self.channels > MAX_MUX_CHANNELS {
            return Err(invalid(format!(
                "{} channels, expected 1..={MAX_MUX_CHANNELS}",
                self.channels
            )));
        }
        if self.select_lines > MAX_SELECT_LINES {
            return Err(invalid(format!(
                "{} select lines, at most {MAX_SELECT_LINES}",
                self.select_lines
            )));
        }
        if self.channels > 1 << self.select_lines {
            return Err(invalid(format!(
                "{} select lines cannot address {} channels",
                self.select_lines, self.channels
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Mux {
    name: String,
    common: DriverId,
    channels: ArrayVec<DriverId, MAX_MUX_CHANNELS>,
    select: ArrayVec<NetId, MAX_SELECT_LINES>,
    inhibit: Option<NetId>,
    conflict: SignalValue,
    state: MuxState,
    started: bool,
}

impl Mux {
    /// Builds a multiplexer from drivers already attached to its port nets.
    /// `kind` is the signal kind shared by every port.
    pub fn new(
        name: &str,
        kind: SignalKind,
        common: DriverId,
        channels: &[DriverId],
        select: &[NetId],
        inhibit: Option<NetId>,
    ) -> Result<Self, SimError> {
        let config = MuxConfig {
            channels: channels.len(),
            select_lines: select.len(),
        };
        config.validate(name)?;
        if !kind.is_resolved() {
            return Err(SimError::InvalidMux {
                name: name.to_string(),
                reason: format!("{kind} nets cannot take a second driver"),
            });
        }
        Ok(Self {
            name: name.to_string(),
            common,
            channels: channels.iter().copied().collect(),
            select: select.iter().copied().collect(),
            inhibit,
            conflict: kind.conflict(),
            state: MuxState::default(),
            started: false,
        })
    }

    /// Attaches drivers to every port and registers the component.
    pub fn attach(
        sim: &mut Simulator,
        name: &str,
        common: NetId,
        channels: &[NetId],
        select: &[NetId],
        inhibit: Option<NetId>,
    ) -> Result<ComponentId, SimError> {
        let kind = sim.net(common).kind();
        for &net in channels {
            let found = sim.net(net).kind();
            if found != kind {
                return Err(SimError::KindMismatch {
                    net: sim.net(net).name().to_string(),
                    expected: kind,
                    found,
                });
            }
        }
        MuxConfig {
            channels: channels.len(),
            select_lines: select.len(),
        }
        .validate(name)?;
        if !kind.is_resolved() {
            return Err(SimError::InvalidMux {
                name: name.to_string(),
                reason: format!("{kind} nets cannot take a second driver"),
            });
        }

        let common_driver = sim.add_driver(common, name)?;
        let channel_drivers = channels
            .iter()
            .map(|&net| sim.add_driver(net, name))
            .collect::<Result<Vec<_>, _>>()?;
        let mux = Mux::new(name, kind, common_driver, &channel_drivers, select, inhibit)?;
        sim.add_component(name, mux)
    }

    pub fn state(&self) -> MuxState {
        self.state
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Channel the control lines currently select, or why none is.
    fn decode_selector(&self, ctx: &SimContext<'_>) -> (Option<usize>, bool) {
        if let Some(inhibit) = self.inhibit {
            match ctx.read_logic(inhibit) {
                Logic::One => return (None, true),
                Logic::Conflict => return (None, false),
                Logic::Zero | Logic::Floating => {}
            }
        }
        let mut selector = 0usize;
        for (bit, &line) in self.select.iter().enumerate() {
            match ctx.read_logic(line).to_bit() {
                Some(true) => selector |= 1 << bit,
                Some(false) => {}
                None => return (None, false),
            }
        }
        if selector < self.channels.len() {
            (Some(selector), false)
        } else {
            (None, false)
        }
    }

    fn release_all(&self, ctx: &mut SimContext<'_>) {
        ctx.release(self.common);
        for &driver in &self.channels {
            ctx.release(driver);
        }
    }

    fn sensitivity(&self) -> Wait {
        let mut nets = WaitSet::new();
        for &line in &self.select {
            let _ = nets.push(line);
        }
        if let Some(inhibit) = self.inhibit {
            let _ = nets.push(inhibit);
        }
        let _ = nets.push(self.common.net());
        if let Some(ch) = self.state.selector {
            let _ = nets.push(self.channels[ch].net());
        }
        Wait::Change(nets)
    }

    fn arbitrate(&mut self, ctx: &mut SimContext<'_>, ch: usize) {
        if self.state.contention {
            return;
        }
        let channel = self.channels[ch];
        let common_ext = ctx.read_excluding(self.common.net(), self.common);
        let channel_ext = ctx.read_excluding(channel.net(), channel);

        match (common_ext.is_floating(), channel_ext.is_floating()) {
            (true, true) => {
                self.state.owner = Owner::None;
                ctx.release(self.common);
                ctx.release(channel);
            }
            (false, true) => {
                self.state.owner = Owner::Common;
                ctx.release(self.common);
                ctx.drive(channel, common_ext);
            }
            (true, false) => {
                self.state.owner = Owner::Channel;
                ctx.release(channel);
                ctx.drive(self.common, channel_ext);
            }
            (false, false) if common_ext == channel_ext => {}
            (false, false) => {
                // Contention already reported by a net is the same episode.
                let reported = ctx.net(self.common.net()).in_conflict()
                    || ctx.net(channel.net()).in_conflict();
                if reported {
                    debug!(mux = %self.name, channel = ch, "both sides driven, forcing conflict");
                } else {
                    warn!(
                        mux = %self.name,
                        channel = ch,
                        common = %common_ext,
                        other = %channel_ext,
                        time = %ctx.now(),
                        "both sides driven, forcing conflict"
                    );
                }
                self.state.contention = true;
                ctx.drive(self.common, self.conflict);
                ctx.drive(channel, self.conflict);
            }
        }
    }
}

impl Component for Mux {
    fn kind(&self) -> &'static str {
        "mux"
    }

    fn resume(&mut self, _process: usize, ctx: &mut SimContext<'_>) -> Wait {
        let (selector, inhibited) = self.decode_selector(ctx);
        let control_changed =
            selector != self.state.selector || inhibited != self.state.inhibited;

        if !self.started || control_changed {
            self.started = true;
            debug!(
                mux = %self.name,
                from = ?self.state.selector,
                to = ?selector,
                inhibited,
                "selection changed"
            );
            self.state = MuxState {
                selector,
                owner: Owner::None,
                inhibited,
                contention: false,
                settling: selector.is_some(),
            };
            self.release_all(ctx);
            // Both sides stay released for one delta before the new channel is
            // arbitrated.
            if selector.is_some() {
                return Wait::yield_now();
            }
            return self.sensitivity();
        }

        self.state.settling = false;
        if let Some(ch) = selector {
            self.arbitrate(ctx, ch);
        }
        self.sensitivity()
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
