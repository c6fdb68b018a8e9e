//! Board description loaded once before a run.
//!
//! A [`BoardConfig`] names the pins of a board and the devices wired to them.
//! It is plain data: [`crate::board::Board::assemble`] turns it into nets,
//! drivers, channels and components.

use crate::adapters::AdapterKind;
use crate::error::SimError;
use crate::signal::SignalKind;
use crate::two_wire::TwoWireConfig;
use crate::uart::UartConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_kind() -> SignalKind {
    SignalKind::Logic
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinConfig {
    pub pin: u16,
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: SignalKind,
}

/// A transceiver. `tx_pin` is driven by the device, `rx_pin` is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UartBinding {
    pub name: String,
    pub tx_pin: u16,
    pub rx_pin: u16,
    #[serde(flatten)]
    pub config: UartConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwoWireBinding {
    pub name: String,
    pub sda_pin: u16,
    pub scl_pin: u16,
    #[serde(flatten)]
    pub config: TwoWireConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuxBinding {
    pub name: String,
    pub common_pin: u16,
    pub channel_pins: Vec<u16>,
    /// Least significant select line first.
    #[serde(default)]
    pub select_pins: Vec<u16>,
    #[serde(default)]
    pub inhibit_pin: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterBinding {
    pub name: String,
    pub kind: AdapterKind,
    pub input_pin: u16,
    pub output_pin: u16,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub name: String,
    pub pins: Vec<PinConfig>,
    pub uarts: Vec<UartBinding>,
    pub two_wire: Vec<TwoWireBinding>,
    pub muxes: Vec<MuxBinding>,
    pub adapters: Vec<AdapterBinding>,
}

impl BoardConfig {
    pub fn from_json(text: &str) -> Result<Self, SimError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Pin numbers named by the devices but missing from `pins`.
    pub fn undeclared_pins(&self) -> Vec<u16> {
        let mut used: Vec<u16> = Vec::new();
        for uart in &self.uarts {
            used.extend([uart.tx_pin, uart.rx_pin]);
        }
        for bus in &self.two_wire {
            used.extend([bus.sda_pin, bus.scl_pin]);
        }
        for mux in &self.muxes {
            used.push(mux.common_pin);
            used.extend(&mux.channel_pins);
            used.extend(&mux.select_pins);
            used.extend(mux.inhibit_pin);
        }
        for adapter in &self.adapters {
            used.extend([adapter.input_pin, adapter.output_pin]);
        }
        used.sort_unstable();
        used.dedup();
        used.retain(|pin| !self.pins.iter().any(|p| p.pin == *pin));
        used
    }
}
