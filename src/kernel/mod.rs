//! # Discrete-event kernel
//!
//! A single-threaded, deterministic scheduler for cooperative processes.
//!
//! Components own one or more processes. Each process is an explicit state
//! machine: the kernel resumes it with a [`SimContext`] and the process answers
//! with the [`Wait`] condition it suspends on (a delay, a value change, an edge,
//! a channel becoming readable or writable).
//!
//! Time advances in two dimensions. Within one instant, processes run in delta
//! cycles: every runnable process runs, the driver writes they made are
//! buffered, and only after the whole round are nets re-resolved and the
//! processes sensitive to the changes made runnable for the next delta. A reader
//! therefore never observes a half-updated instant. When no process is runnable
//! the clock jumps to the earliest timed wake.

pub mod event_queue;
pub mod snapshot;
pub mod time;

pub use time::{SimDuration, SimTime};

use crate::adapters;
use crate::channel::ByteChannel;
use crate::error::SimError;
use crate::signal::{resolve, Edge, Logic, SignalKind, SignalValue};
use event_queue::{TimedWake, TimerQueue};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use tracing::{trace, warn};

/// Most nets a single `Wait::Change` can name.
pub const MAX_WAIT_NETS: usize = 8;
/// Delta cycles allowed within one instant before the run is aborted.
pub const MAX_DELTA_CYCLES: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NetId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProcessId(u32);

/// One writer endpoint on a net.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DriverId {
    net: NetId,
    slot: u16,
}

impl NetId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl ChannelId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl ComponentId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl ProcessId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl DriverId {
    pub fn net(self) -> NetId {
        self.net
    }
}

pub type WaitSet = heapless::Vec<NetId, MAX_WAIT_NETS>;

/// Suspension condition returned by a process.
#[derive(Debug, Clone, PartialEq)]
pub enum Wait {
    /// Resume after a delay. A zero delay resumes in the next delta cycle.
    For(SimDuration),
    /// Resume when any of the nets changes value.
    Change(WaitSet),
    /// Resume on a transition of one net.
    Edge(NetId, Edge),
    /// Like `Edge`, but give up after the timeout ([`SimContext::timed_out`]).
    EdgeWithin(NetId, Edge, SimDuration),
    /// Resume once the channel holds at least one byte.
    Readable(ChannelId),
    /// Resume once the channel has room for one more byte.
    Writable(ChannelId),
    /// Never resume.
    Forever,
}

impl Wait {
    /// Sensitivity to a list of nets. Nets beyond [`MAX_WAIT_NETS`] are ignored.
    pub fn change(nets: &[NetId]) -> Self {
        debug_assert!(
            nets.len() <= MAX_WAIT_NETS,
            "wait set of {} nets exceeds {}",
            nets.len(),
            MAX_WAIT_NETS
        );
        let set = WaitSet::from_slice(&nets[..nets.len().min(MAX_WAIT_NETS)]).unwrap_or_default();
        Wait::Change(set)
    }

    /// Next delta cycle of the current instant.
    pub fn yield_now() -> Self {
        Wait::For(SimDuration::ZERO)
    }
}

/// Why a process was resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// First activation.
    Start,
    /// A delay or timeout elapsed.
    Time,
    /// A net it was sensitive to changed.
    Signal(NetId),
    /// A channel it waited on became readable/writable.
    Channel(ChannelId),
    /// Zero-delay yield.
    Delta,
}

/// A simulated hardware block made of one or more processes.
pub trait Component: Any {
    /// Short type label used in traces and snapshots.
    fn kind(&self) -> &'static str;

    /// Number of concurrent processes. Indices `0..processes()` are passed to
    /// [`Component::resume`].
    fn processes(&self) -> usize {
        1
    }

    /// Runs `process` until its next suspension point.
    fn resume(&mut self, process: usize, ctx: &mut SimContext<'_>) -> Wait;

    /// Current internal state for trace capture.
    fn state_label(&self) -> String;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[derive(Debug)]
struct DriverSlot {
    owner: String,
    value: Option<SignalValue>,
}

/// A resolved conductor.
#[derive(Debug)]
pub struct Net {
    name: String,
    kind: SignalKind,
    drivers: Vec<DriverSlot>,
    value: SignalValue,
    previous: SignalValue,
    last_change: SimTime,
    in_conflict: bool,
    conflict_episodes: u32,
}

impl Net {
    fn new(name: String, kind: SignalKind) -> Self {
        Self {
            name,
            kind,
            drivers: Vec::new(),
            value: kind.undriven(),
            previous: kind.undriven(),
            last_change: SimTime::ZERO,
            in_conflict: false,
            conflict_episodes: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    pub fn value(&self) -> SignalValue {
        self.value
    }

    /// Value before the most recent change.
    pub fn previous(&self) -> SignalValue {
        self.previous
    }

    pub fn last_change(&self) -> SimTime {
        self.last_change
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }

    pub fn active_drivers(&self) -> usize {
        self.drivers.iter().filter(|d| d.value.is_some()).count()
    }

    /// True while independent drivers disagree on the net.
    pub fn in_conflict(&self) -> bool {
        self.in_conflict
    }

    /// Number of times the net went from agreeing drivers into contention.
    pub fn conflict_episodes(&self) -> u32 {
        self.conflict_episodes
    }

    /// Value the net would carry without driver `slot`.
    fn resolve_excluding(&self, slot: u16) -> SignalValue {
        let others = self
            .drivers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != slot as usize)
            .filter_map(|(_, d)| d.value.as_ref());
        resolve(self.kind, others).value
    }

    fn describe_drivers(&self) -> String {
        self.drivers
            .iter()
            .filter_map(|d| d.value.map(|v| format!("{}={}", d.owner, v)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelNeed {
    Readable,
    Writable,
}

#[derive(Debug, Clone, PartialEq)]
enum Pending {
    Ready,
    Sleeping,
    Nets { nets: WaitSet, edge: Option<Edge> },
    Channel { channel: ChannelId, need: ChannelNeed },
    Forever,
}

#[derive(Debug)]
struct ProcessSlot {
    component: ComponentId,
    index: usize,
    pending: Pending,
    generation: u64,
    wake: Wake,
    started: bool,
    activations: u64,
}

struct ComponentEntry {
    name: String,
    component: Box<dyn Component>,
    processes: Vec<ProcessId>,
}

/// Everything a running process may touch.
#[derive(Debug, Default)]
struct Core {
    now: SimTime,
    delta: u32,
    nets: Vec<Net>,
    channels: Vec<ByteChannel>,
    processes: Vec<ProcessSlot>,
    timers: TimerQueue,
    runnable: Vec<ProcessId>,
    writes: Vec<(DriverId, Option<SignalValue>)>,
    dirty_channels: Vec<ChannelId>,
}

impl Core {
    fn queue_write(&mut self, driver: DriverId, value: SignalValue) {
        // Floating is never an active output: asserting it releases the driver.
        if value.is_floating() {
            self.writes.push((driver, None));
            return;
        }
        let net = &self.nets[driver.net.index()];
        let value = if value.kind() == net.kind {
            value
        } else if let Some(converted) = adapters::convert(net.kind, value) {
            converted
        } else {
            warn!(
                net = %net.name,
                value = %value,
                kind = %net.kind,
                "value cannot be represented on net, driving conflict"
            );
            net.kind.conflict()
        };
        self.writes.push((driver, Some(value)));
    }

    fn queue_release(&mut self, driver: DriverId) {
        self.writes.push((driver, None));
    }

    /// Commits buffered driver writes and returns the nets whose value changed.
    fn apply_writes(&mut self) -> Vec<NetId> {
        if self.writes.is_empty() {
            return Vec::new();
        }
        let mut touched: Vec<NetId> = Vec::new();
        for (driver, value) in std::mem::take(&mut self.writes) {
            let net = &mut self.nets[driver.net.index()];
            net.drivers[driver.slot as usize].value = value;
            if !touched.contains(&driver.net) {
                touched.push(driver.net);
            }
        }

        let mut changed = Vec::new();
        for id in touched {
            let now = self.now;
            let net = &mut self.nets[id.index()];
            let resolution = resolve(net.kind, net.drivers.iter().filter_map(|d| d.value.as_ref()));
            // A driver asserting Conflict reports contention found elsewhere;
            // only disagreement among the remaining drivers opens an episode.
            let contended = resolution.conflict
                && resolve(
                    net.kind,
                    net.drivers
                        .iter()
                        .filter_map(|d| d.value.as_ref())
                        .filter(|v| !v.is_conflict()),
                )
                .conflict;

            if contended && !net.in_conflict {
                net.in_conflict = true;
                net.conflict_episodes = net.conflict_episodes.saturating_add(1);
                warn!(
                    net = %net.name,
                    drivers = %net.describe_drivers(),
                    time = %now,
                    "bus contention"
                );
            } else if !contended && net.in_conflict {
                net.in_conflict = false;
            }

            if resolution.value != net.value {
                trace!(net = %net.name, from = %net.value, to = %resolution.value, time = %now, "net changed");
                net.previous = net.value;
                net.value = resolution.value;
                net.last_change = now;
                changed.push(id);
            }
        }
        changed
    }

    fn make_ready(&mut self, process: ProcessId, wake: Wake) {
        let slot = &mut self.processes[process.index()];
        slot.pending = Pending::Ready;
        slot.generation = slot.generation.wrapping_add(1);
        slot.wake = wake;
        self.runnable.push(process);
    }

    fn wake_signal_waiters(&mut self, changed: &[NetId]) {
        if changed.is_empty() {
            return;
        }
        for index in 0..self.processes.len() {
            let hit = match &self.processes[index].pending {
                Pending::Nets { nets, edge } => nets.iter().copied().find(|id| {
                    if !changed.contains(id) {
                        return false;
                    }
                    let net = &self.nets[id.index()];
                    edge.map_or(true, |e| e.matches(&net.previous, &net.value))
                }),
                _ => None,
            };
            if let Some(net) = hit {
                self.make_ready(ProcessId(index as u32), Wake::Signal(net));
            }
        }
    }

    fn wake_channel_waiters(&mut self) {
        if self.dirty_channels.is_empty() {
            return;
        }
        let dirty = std::mem::take(&mut self.dirty_channels);
        for index in 0..self.processes.len() {
            let ready = match self.processes[index].pending {
                Pending::Channel { channel, need } if dirty.contains(&channel) => {
                    let ch = &self.channels[channel.index()];
                    let satisfied = match need {
                        ChannelNeed::Readable => !ch.is_empty(),
                        ChannelNeed::Writable => !ch.is_full(),
                    };
                    satisfied.then_some(channel)
                }
                _ => None,
            };
            if let Some(channel) = ready {
                self.make_ready(ProcessId(index as u32), Wake::Channel(channel));
            }
        }
    }

    fn fire_timer(&mut self, wake: TimedWake) {
        let slot = &self.processes[wake.process.index()];
        let waiting = matches!(slot.pending, Pending::Sleeping | Pending::Nets { .. });
        if waiting && slot.generation == wake.generation {
            self.make_ready(wake.process, Wake::Time);
        }
    }

    fn register_wait(&mut self, process: ProcessId, wait: Wait) {
        let now = self.now;
        let generation = self.processes[process.index()].generation;
        let pending = match wait {
            Wait::For(delay) if delay.is_zero() => {
                self.make_ready(process, Wake::Delta);
                return;
            }
            Wait::For(delay) => {
                self.timers.schedule(now + delay, process, generation);
                Pending::Sleeping
            }
            Wait::Change(nets) => {
                if nets.is_empty() {
                    warn!(process = process.0, "empty sensitivity list, process suspended forever");
                    Pending::Forever
                } else {
                    Pending::Nets { nets, edge: None }
                }
            }
            Wait::Edge(net, edge) => Pending::Nets {
                nets: single(net),
                edge: Some(edge),
            },
            Wait::EdgeWithin(net, edge, timeout) => {
                self.timers.schedule(now + timeout, process, generation);
                Pending::Nets {
                    nets: single(net),
                    edge: Some(edge),
                }
            }
            Wait::Readable(channel) => {
                if !self.channels[channel.index()].is_empty() {
                    self.make_ready(process, Wake::Channel(channel));
                    return;
                }
                Pending::Channel {
                    channel,
                    need: ChannelNeed::Readable,
                }
            }
            Wait::Writable(channel) => {
                if !self.channels[channel.index()].is_full() {
                    self.make_ready(process, Wake::Channel(channel));
                    return;
                }
                Pending::Channel {
                    channel,
                    need: ChannelNeed::Writable,
                }
            }
            Wait::Forever => Pending::Forever,
        };
        self.processes[process.index()].pending = pending;
    }

    fn mark_dirty(&mut self, channel: ChannelId) {
        if !self.dirty_channels.contains(&channel) {
            self.dirty_channels.push(channel);
        }
    }
}

fn single(net: NetId) -> WaitSet {
    let mut set = WaitSet::new();
    let _ = set.push(net);
    set
}

/// A process's view of the simulation while it runs.
pub struct SimContext<'a> {
    core: &'a mut Core,
    wake: Wake,
    component: ComponentId,
}

impl SimContext<'_> {
    pub fn now(&self) -> SimTime {
        self.core.now
    }

    pub fn wake(&self) -> Wake {
        self.wake
    }

    /// The process was resumed because its delay or timeout elapsed.
    pub fn timed_out(&self) -> bool {
        self.wake == Wake::Time
    }

    pub fn component(&self) -> ComponentId {
        self.component
    }

    pub fn net(&self, net: NetId) -> &Net {
        &self.core.nets[net.index()]
    }

    /// Resolved value as of the end of the previous delta cycle.
    pub fn read(&self, net: NetId) -> SignalValue {
        self.core.nets[net.index()].value
    }

    pub fn read_logic(&self, net: NetId) -> Logic {
        self.read(net).as_logic()
    }

    /// What the net resolves to from every driver except `driver`.
    pub fn read_excluding(&self, net: NetId, driver: DriverId) -> SignalValue {
        debug_assert_eq!(driver.net, net, "driver belongs to another net");
        self.core.nets[net.index()].resolve_excluding(driver.slot)
    }

    /// Asserts `value` through `driver`. Visible to readers after this delta.
    pub fn drive(&mut self, driver: DriverId, value: impl Into<SignalValue>) {
        self.core.queue_write(driver, value.into());
    }

    pub fn release(&mut self, driver: DriverId) {
        self.core.queue_release(driver);
    }

    pub fn channel(&self, channel: ChannelId) -> &ByteChannel {
        &self.core.channels[channel.index()]
    }

    /// Enqueues a byte, dropping it with a warning if the channel is full.
    pub fn push_byte(&mut self, channel: ChannelId, byte: u8) -> bool {
        self.core.mark_dirty(channel);
        self.core.channels[channel.index()].push(byte)
    }

    pub fn pop_byte(&mut self, channel: ChannelId) -> Option<u8> {
        let byte = self.core.channels[channel.index()].pop()?;
        self.core.mark_dirty(channel);
        Some(byte)
    }

    pub fn clear_channel(&mut self, channel: ChannelId) -> usize {
        let removed = self.core.channels[channel.index()].clear();
        if removed > 0 {
            self.core.mark_dirty(channel);
        }
        removed
    }
}

/// The simulation: nets, channels, components and the scheduler driving them.
#[derive(Default)]
pub struct Simulator {
    core: Core,
    components: Vec<ComponentEntry>,
    net_names: BTreeMap<String, NetId>,
    channel_names: BTreeMap<String, ChannelId>,
    component_names: BTreeMap<String, ComponentId>,
}

impl Simulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> SimTime {
        self.core.now
    }

    /// Delta cycles run so far at the current instant.
    pub fn delta(&self) -> u32 {
        self.core.delta
    }

    pub fn add_net(&mut self, name: &str, kind: SignalKind) -> Result<NetId, SimError> {
        if self.net_names.contains_key(name) {
            return Err(SimError::DuplicateName(name.to_string()));
        }
        let id = NetId(self.core.nets.len() as u32);
        self.core.nets.push(Net::new(name.to_string(), kind));
        self.net_names.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn net_id(&self, name: &str) -> Option<NetId> {
        self.net_names.get(name).copied()
    }

    /// # Panics
    ///
    /// If `net` was not created by this simulator.
    pub fn net(&self, net: NetId) -> &Net {
        &self.core.nets[net.index()]
    }

    pub fn nets(&self) -> impl Iterator<Item = (NetId, &Net)> {
        self.core
            .nets
            .iter()
            .enumerate()
            .map(|(i, net)| (NetId(i as u32), net))
    }

    /// Adds a writer endpoint to `net`. Bool and analog nets take one writer.
    pub fn add_driver(&mut self, net: NetId, owner: &str) -> Result<DriverId, SimError> {
        let entry = &mut self.core.nets[net.index()];
        if !entry.kind.is_resolved() && !entry.drivers.is_empty() {
            return Err(SimError::DriverLimit {
                net: entry.name.clone(),
                kind: entry.kind,
            });
        }
        let slot = u16::try_from(entry.drivers.len())
            .map_err(|_| SimError::InvalidConfig(format!("too many drivers on `{}`", entry.name)))?;
        entry.drivers.push(DriverSlot {
            owner: owner.to_string(),
            value: None,
        });
        Ok(DriverId { net, slot })
    }

    pub fn add_channel(&mut self, name: &str, capacity: usize) -> Result<ChannelId, SimError> {
        if self.channel_names.contains_key(name) {
            return Err(SimError::DuplicateName(name.to_string()));
        }
        let channel = ByteChannel::new(name, capacity)?;
        let id = ChannelId(self.core.channels.len() as u32);
        self.core.channels.push(channel);
        self.channel_names.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn channel_id(&self, name: &str) -> Option<ChannelId> {
        self.channel_names.get(name).copied()
    }

    pub fn channel(&self, channel: ChannelId) -> &ByteChannel {
        &self.core.channels[channel.index()]
    }

    pub fn channels(&self) -> impl Iterator<Item = (ChannelId, &ByteChannel)> {
        self.core
            .channels
            .iter()
            .enumerate()
            .map(|(i, ch)| (ChannelId(i as u32), ch))
    }

    /// Enqueues a byte from outside the simulation; waiting processes resume on
    /// the next run.
    pub fn push_byte(&mut self, channel: ChannelId, byte: u8) -> bool {
        self.core.mark_dirty(channel);
        self.core.channels[channel.index()].push(byte)
    }

    /// Enqueues each byte in turn; returns how many were accepted.
    pub fn push_bytes(&mut self, channel: ChannelId, bytes: &[u8]) -> usize {
        bytes.iter().filter(|&&b| self.push_byte(channel, b)).count()
    }

    pub fn pop_byte(&mut self, channel: ChannelId) -> Option<u8> {
        let byte = self.core.channels[channel.index()].pop()?;
        self.core.mark_dirty(channel);
        Some(byte)
    }

    pub fn drain_channel(&mut self, channel: ChannelId) -> Vec<u8> {
        let mut bytes = Vec::new();
        while let Some(b) = self.pop_byte(channel) {
            bytes.push(b);
        }
        bytes
    }

    pub fn add_component<C: Component>(&mut self, name: &str, component: C) -> Result<ComponentId, SimError> {
        if self.component_names.contains_key(name) {
            return Err(SimError::DuplicateName(name.to_string()));
        }
        let id = ComponentId(self.components.len() as u32);
        let mut processes = Vec::with_capacity(component.processes());
        for index in 0..component.processes() {
            let pid = ProcessId(self.core.processes.len() as u32);
            self.core.processes.push(ProcessSlot {
                component: id,
                index,
                pending: Pending::Forever,
                generation: 0,
                wake: Wake::Start,
                started: false,
                activations: 0,
            });
            processes.push(pid);
        }
        self.components.push(ComponentEntry {
            name: name.to_string(),
            component: Box::new(component),
            processes,
        });
        self.component_names.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn component_id(&self, name: &str) -> Option<ComponentId> {
        self.component_names.get(name).copied()
    }

    pub fn component<C: Component>(&self, id: ComponentId) -> Option<&C> {
        self.components
            .get(id.index())?
            .component
            .as_any()
            .downcast_ref::<C>()
    }

    pub fn component_mut<C: Component>(&mut self, id: ComponentId) -> Option<&mut C> {
        self.components
            .get_mut(id.index())?
            .component
            .as_any_mut()
            .downcast_mut::<C>()
    }

    pub fn component_state(&self, id: ComponentId) -> Option<String> {
        self.components.get(id.index()).map(|c| c.component.state_label())
    }

    /// Times the component's processes have been resumed.
    pub fn activations(&self, id: ComponentId) -> u64 {
        self.components.get(id.index()).map_or(0, |c| {
            c.processes
                .iter()
                .map(|p| self.core.processes[p.index()].activations)
                .sum()
        })
    }

    /// Drives a value from outside the simulation, applied at the current
    /// instant on the next run.
    pub fn drive(&mut self, driver: DriverId, value: impl Into<SignalValue>) {
        self.core.queue_write(driver, value.into());
    }

    pub fn release(&mut self, driver: DriverId) {
        self.core.queue_release(driver);
    }

    pub fn read(&self, net: NetId) -> SignalValue {
        self.core.nets[net.index()].value
    }

    pub fn read_logic(&self, net: NetId) -> Logic {
        self.read(net).as_logic()
    }

    pub fn run_for(&mut self, duration: SimDuration) -> Result<(), SimError> {
        let end = self.core.now + duration;
        self.run_until(end)
    }

    /// Runs every event up to and including `end`, then parks the clock at `end`.
    pub fn run_until(&mut self, end: SimTime) -> Result<(), SimError> {
        self.settle()?;
        while let Some(at) = self.core.timers.next_time() {
            if at > end {
                break;
            }
            if at > self.core.now {
                self.core.now = at;
                self.core.delta = 0;
            }
            while let Some(wake) = self.core.timers.pop_due(at) {
                self.core.fire_timer(wake);
            }
            self.settle()?;
        }
        if end > self.core.now {
            self.core.now = end;
            self.core.delta = 0;
        }
        Ok(())
    }

    /// Runs delta cycles at the current instant until nothing is runnable.
    pub fn settle(&mut self) -> Result<(), SimError> {
        self.start_new_processes();
        let mut deltas = 0u32;
        loop {
            let changed = self.core.apply_writes();
            self.core.wake_signal_waiters(&changed);
            self.core.wake_channel_waiters();
            if self.core.runnable.is_empty() {
                return Ok(());
            }
            deltas += 1;
            if deltas > MAX_DELTA_CYCLES {
                self.core.runnable.clear();
                warn!(time = %self.core.now, "delta cycle limit reached");
                return Err(SimError::DeltaOverflow { time: self.core.now });
            }
            self.core.delta = self.core.delta.wrapping_add(1);
            for process in std::mem::take(&mut self.core.runnable) {
                self.run_process(process);
            }
        }
    }

    fn start_new_processes(&mut self) {
        for index in 0..self.core.processes.len() {
            if !self.core.processes[index].started {
                self.core.processes[index].started = true;
                self.core.make_ready(ProcessId(index as u32), Wake::Start);
            }
        }
    }

    fn run_process(&mut self, process: ProcessId) {
        let slot = &mut self.core.processes[process.index()];
        slot.activations += 1;
        let (component, index, wake) = (slot.component, slot.index, slot.wake);

        let entry = &mut self.components[component.index()];
        let mut ctx = SimContext {
            core: &mut self.core,
            wake,
            component,
        };
        let wait = entry.component.resume(index, &mut ctx);
        trace!(
            component = %entry.name,
            process = index,
            wait = ?wait,
            "process suspended"
        );
        self.core.register_wait(process, wait);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Toggles its output every `half_period`.
    struct Clock {
        out: DriverId,
        half_period: SimDuration,
        level: bool,
    }

    impl Component for Clock {
        fn kind(&self) -> &'static str {
            "clock"
        }
        fn resume(&mut self, _process: usize, ctx: &mut SimContext<'_>) -> Wait {
            ctx.drive(self.out, Logic::from_bit(self.level));
            self.level = !self.level;
            Wait::For(self.half_period)
        }
        fn state_label(&self) -> String {
            format!("level={}", self.level)
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    /// Counts rising edges and records what it read in the same delta as the
    /// edge was produced.
    struct EdgeCounter {
        net: NetId,
        rising: u32,
    }

    impl Component for EdgeCounter {
        fn kind(&self) -> &'static str {
            "counter"
        }
        fn resume(&mut self, _process: usize, ctx: &mut SimContext<'_>) -> Wait {
            if matches!(ctx.wake(), Wake::Signal(_)) {
                self.rising += 1;
            }
            Wait::Edge(self.net, Edge::Rising)
        }
        fn state_label(&self) -> String {
            self.rising.to_string()
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn test_clock_edges_counted() {
        let mut sim = Simulator::new();
        let clk = sim.add_net("clk", SignalKind::Logic).unwrap();
        let out = sim.add_driver(clk, "clock").unwrap();
        sim.add_component(
            "clock",
            Clock {
                out,
                half_period: SimDuration::from_us(5),
                level: false,
            },
        )
        .unwrap();
        let counter = sim
            .add_component("counter", EdgeCounter { net: clk, rising: 0 })
            .unwrap();

        // Rising edges at 5, 15, 25, 35, 45 us
        sim.run_for(SimDuration::from_us(50)).unwrap();
        assert_eq!(sim.component::<EdgeCounter>(counter).unwrap().rising, 5);
    }

    #[test]
    fn test_external_writes_deferred_until_run() {
        let mut sim = Simulator::new();
        let net = sim.add_net("a", SignalKind::Logic).unwrap();
        let d = sim.add_driver(net, "tb").unwrap();
        sim.drive(d, Logic::One);
        assert_eq!(sim.read(net), SignalValue::FLOATING);
        sim.settle().unwrap();
        assert_eq!(sim.read(net), SignalValue::HIGH);
        sim.drive(d, Logic::Floating);
        sim.settle().unwrap();
        assert_eq!(sim.read(net), SignalValue::FLOATING);
        assert_eq!(sim.net(net).active_drivers(), 0);
    }

    #[test]
    fn test_single_writer_nets() {
        let mut sim = Simulator::new();
        let net = sim.add_net("en", SignalKind::Bool).unwrap();
        sim.add_driver(net, "a").unwrap();
        assert!(matches!(sim.add_driver(net, "b"), Err(SimError::DriverLimit { .. })));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut sim = Simulator::new();
        sim.add_net("sda", SignalKind::Logic).unwrap();
        assert!(sim.add_net("sda", SignalKind::Logic).is_err());
        sim.add_channel("rx", 4).unwrap();
        assert!(sim.add_channel("rx", 4).is_err());
    }

    #[test]
    fn test_run_until_parks_clock() {
        let mut sim = Simulator::new();
        sim.run_until(SimTime::from_ps(1234)).unwrap();
        assert_eq!(sim.now(), SimTime::from_ps(1234));
    }
}
