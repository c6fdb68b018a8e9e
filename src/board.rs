//! Assembly of a simulator from a [`BoardConfig`].
//!
//! [`Board::assemble`] creates one net per declared pin, wires every device in
//! the configuration onto those nets and records the resulting handles in a
//! [`Registry`]. The registry is built once and passed around explicitly;
//! nothing looks pins up through global state.

use crate::adapters::SignalAdapter;
use crate::config::BoardConfig;
use crate::error::SimError;
use crate::kernel::snapshot::SimSnapshot;
use crate::kernel::{ChannelId, ComponentId, DriverId, NetId, SimDuration, Simulator};
use crate::mux::Mux;
use crate::signal::SignalKind;
use crate::two_wire::TwoWireSlave;
use crate::uart::Uart;
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartHandle {
    pub component: ComponentId,
    pub tx_line: NetId,
    pub rx_line: NetId,
    /// Bytes decoded from `rx_line`.
    pub rx_channel: ChannelId,
    /// Bytes queued for transmission on `tx_line`.
    pub tx_channel: ChannelId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwoWireHandle {
    pub component: ComponentId,
    pub sda: NetId,
    pub scl: NetId,
    /// Bytes written by the controller.
    pub inbound: ChannelId,
    /// Bytes returned to the controller on reads.
    pub outbound: ChannelId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxHandle {
    pub component: ComponentId,
    pub common: NetId,
    pub channels: Vec<NetId>,
}

/// Pin and device lookup for an assembled board.
#[derive(Debug, Default)]
pub struct Registry {
    pins: BTreeMap<u16, NetId>,
    uarts: BTreeMap<String, UartHandle>,
    two_wire: BTreeMap<String, TwoWireHandle>,
    muxes: BTreeMap<String, MuxHandle>,
    adapters: BTreeMap<String, ComponentId>,
}

impl Registry {
    pub fn pin(&self, pin: u16) -> Result<NetId, SimError> {
        self.pins.get(&pin).copied().ok_or(SimError::UnknownPin(pin))
    }

    pub fn pins(&self) -> impl Iterator<Item = (u16, NetId)> + '_ {
        self.pins.iter().map(|(&pin, &net)| (pin, net))
    }

    pub fn uart(&self, name: &str) -> Result<UartHandle, SimError> {
        self.uarts
            .get(name)
            .copied()
            .ok_or_else(|| SimError::UnknownComponent(name.to_string()))
    }

    pub fn two_wire(&self, name: &str) -> Result<TwoWireHandle, SimError> {
        self.two_wire
            .get(name)
            .copied()
            .ok_or_else(|| SimError::UnknownComponent(name.to_string()))
    }

    pub fn mux(&self, name: &str) -> Result<&MuxHandle, SimError> {
        self.muxes
            .get(name)
            .ok_or_else(|| SimError::UnknownComponent(name.to_string()))
    }

    pub fn adapter(&self, name: &str) -> Result<ComponentId, SimError> {
        self.adapters
            .get(name)
            .copied()
            .ok_or_else(|| SimError::UnknownComponent(name.to_string()))
    }
}

/// A simulator together with the registry describing what is wired where.
pub struct Board {
    name: String,
    sim: Simulator,
    registry: Registry,
}

impl Board {
    /// Builds the board, or refuses the whole configuration on the first
    /// error.
    pub fn assemble(config: &BoardConfig) -> Result<Self, SimError> {
        Self::wire(config).map_err(|error| {
            warn!(board = %config.name, %error, "board configuration refused");
            error
        })
    }

    fn wire(config: &BoardConfig) -> Result<Self, SimError> {
        let mut sim = Simulator::new();
        let mut registry = Registry::default();

        for pin in &config.pins {
            if registry.pins.contains_key(&pin.pin) {
                return Err(SimError::DuplicatePin(pin.pin));
            }
            let net = sim.add_net(&pin.name, pin.kind)?;
            registry.pins.insert(pin.pin, net);
        }

        for binding in &config.uarts {
            let tx_line = registry.pin(binding.tx_pin)?;
            let rx_line = registry.pin(binding.rx_pin)?;
            expect_digital(&sim, tx_line)?;
            expect_digital(&sim, rx_line)?;

            let tx_driver = sim.add_driver(tx_line, &binding.name)?;
            let rx_channel =
                sim.add_channel(&format!("{}.rx", binding.name), binding.config.rx_capacity)?;
            let tx_channel =
                sim.add_channel(&format!("{}.tx", binding.name), binding.config.tx_capacity)?;
            let uart = Uart::new(binding.config.clone(), rx_line, tx_driver, rx_channel, tx_channel);
            let component = sim.add_component(&binding.name, uart)?;
            registry.uarts.insert(
                binding.name.clone(),
                UartHandle {
                    component,
                    tx_line,
                    rx_line,
                    rx_channel,
                    tx_channel,
                },
            );
        }

        for binding in &config.two_wire {
            binding.config.validate()?;
            let sda = registry.pin(binding.sda_pin)?;
            let scl = registry.pin(binding.scl_pin)?;
            expect_open_drain(&sim, sda)?;
            expect_open_drain(&sim, scl)?;

            let sda_driver = sim.add_driver(sda, &binding.name)?;
            let inbound =
                sim.add_channel(&format!("{}.in", binding.name), binding.config.inbound_capacity)?;
            let outbound =
                sim.add_channel(&format!("{}.out", binding.name), binding.config.outbound_capacity)?;
            let slave = TwoWireSlave::new(binding.config.clone(), sda_driver, scl, inbound, outbound)?;
            let component = sim.add_component(&binding.name, slave)?;
            registry.two_wire.insert(
                binding.name.clone(),
                TwoWireHandle {
                    component,
                    sda,
                    scl,
                    inbound,
                    outbound,
                },
            );
        }

        for binding in &config.muxes {
            let common = registry.pin(binding.common_pin)?;
            let channels = binding
                .channel_pins
                .iter()
                .map(|&pin| registry.pin(pin))
                .collect::<Result<Vec<_>, _>>()?;
            let select = binding
                .select_pins
                .iter()
                .map(|&pin| registry.pin(pin))
                .collect::<Result<Vec<_>, _>>()?;
            let inhibit = binding.inhibit_pin.map(|pin| registry.pin(pin)).transpose()?;

            let component = Mux::attach(&mut sim, &binding.name, common, &channels, &select, inhibit)?;
            registry.muxes.insert(
                binding.name.clone(),
                MuxHandle {
                    component,
                    common,
                    channels,
                },
            );
        }

        for binding in &config.adapters {
            let input = registry.pin(binding.input_pin)?;
            let output = registry.pin(binding.output_pin)?;
            expect_kind(&sim, input, binding.kind.input_kind())?;
            expect_kind(&sim, output, binding.kind.output_kind())?;

            let driver = sim.add_driver(output, &binding.name)?;
            let adapter = SignalAdapter::new(binding.kind, input, driver);
            let component = sim.add_component(&binding.name, adapter)?;
            registry.adapters.insert(binding.name.clone(), component);
        }

        debug!(
            board = %config.name,
            pins = config.pins.len(),
            uarts = config.uarts.len(),
            two_wire = config.two_wire.len(),
            muxes = config.muxes.len(),
            adapters = config.adapters.len(),
            "board assembled"
        );

        Ok(Self {
            name: config.name.clone(),
            sim,
            registry,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sim(&self) -> &Simulator {
        &self.sim
    }

    pub fn sim_mut(&mut self) -> &mut Simulator {
        &mut self.sim
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn pin(&self, pin: u16) -> Result<NetId, SimError> {
        self.registry.pin(pin)
    }

    /// Adds an external writer (firmware shim, test bench) on a pin's net.
    pub fn attach_driver(&mut self, pin: u16, owner: &str) -> Result<DriverId, SimError> {
        let net = self.registry.pin(pin)?;
        self.sim.add_driver(net, owner)
    }

    pub fn run_for(&mut self, duration: SimDuration) -> Result<(), SimError> {
        self.sim.run_for(duration)
    }

    pub fn snapshot(&self) -> SimSnapshot {
        self.sim.snapshot()
    }
}

fn expect_kind(sim: &Simulator, net: NetId, expected: SignalKind) -> Result<(), SimError> {
    let found = sim.net(net).kind();
    if found == expected {
        Ok(())
    } else {
        Err(SimError::KindMismatch {
            net: sim.net(net).name().to_string(),
            expected,
            found,
        })
    }
}

/// UART lines carry digital levels; an analog net has none.
fn expect_digital(sim: &Simulator, net: NetId) -> Result<(), SimError> {
    match sim.net(net).kind() {
        SignalKind::Analog => expect_kind(sim, net, SignalKind::Logic),
        _ => Ok(()),
    }
}

/// Open-drain lines need more than one writer.
fn expect_open_drain(sim: &Simulator, net: NetId) -> Result<(), SimError> {
    if sim.net(net).kind().is_resolved() {
        Ok(())
    } else {
        expect_kind(sim, net, SignalKind::Logic)
    }
}
