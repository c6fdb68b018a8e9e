//! Asynchronous serial transceiver.
//!
//! One [`Uart`] component runs two processes over its pair of lines: a
//! receiver that decodes frames from the RX net into the RX channel, and a
//! transmitter that serializes bytes from the TX channel onto the TX net.
//!
//! Frames are 8N1 with a configurable stop length. The receiver samples in the
//! middle of each bit, timed from the falling edge of the start bit. In
//! autodetect mode the first start pulse is measured instead of decoded and the
//! nearest standard rate is adopted.

use crate::channel::DEFAULT_CHANNEL_DEPTH;
use crate::kernel::{ChannelId, Component, DriverId, NetId, SimContext, SimDuration, SimTime, Wait};
use crate::signal::{Edge, Logic};
use core::fmt;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use std::any::Any;
use tracing::{debug, trace, warn};

/// Rates the autodetector can lock onto, slowest first.
pub const STANDARD_BAUD_RATES: [u32; 22] = [
    300, 600, 1_200, 2_400, 4_800, 9_600, 14_400, 19_200, 28_800, 38_400, 57_600, 74_880,
    115_200, 230_400, 250_000, 460_800, 500_000, 921_600, 1_000_000, 1_843_200, 2_000_000,
    3_686_400,
];

const fn strictly_ascending(rates: &[u32]) -> bool {
    let mut i = 1;
    while i < rates.len() {
        if rates[i] <= rates[i - 1] {
            return false;
        }
        i += 1;
    }
    true
}

const_assert!(strictly_ascending(&STANDARD_BAUD_RATES));

pub const SLOWEST_BAUD: u32 = STANDARD_BAUD_RATES[0];
pub const FASTEST_BAUD: u32 = STANDARD_BAUD_RATES[STANDARD_BAUD_RATES.len() - 1];
pub const DEFAULT_BAUD: u32 = 115_200;

/// Longest start pulse the autodetector waits for before giving up.
pub const AUTOBAUD_TIMEOUT: SimDuration = SimDuration::from_ms(2);
/// Bit periods assumed for the frame carrying the detection pulse.
const AUTOBAUD_FRAME_BITS: u64 = 10;
/// Measured rates up to this far above the fastest entry still count as a match.
const AUTOBAUD_TOLERANCE: f64 = 0.05;

const RX: usize = 0;
const TX: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StopBits {
    #[default]
    One,
    OneAndHalf,
    Two,
}

impl StopBits {
    /// Length of the stop condition for the given bit period.
    pub fn duration(self, bit: SimDuration) -> SimDuration {
        match self {
            StopBits::One => bit,
            StopBits::OneAndHalf => bit.scale(3, 2),
            StopBits::Two => bit * 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UartConfig {
    /// Initial rate. With `autodetect` set it is used until a rate is measured.
    pub baud: u32,
    pub autodetect: bool,
    pub stop_bits: StopBits,
    pub rx_capacity: usize,
    pub tx_capacity: usize,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            baud: DEFAULT_BAUD,
            autodetect: false,
            stop_bits: StopBits::One,
            rx_capacity: DEFAULT_CHANNEL_DEPTH,
            tx_capacity: DEFAULT_CHANNEL_DEPTH,
        }
    }
}

/// Externally visible state of either direction of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UartState {
    #[default]
    Idle,
    Detecting,
    ReceivingBit(u8),
    SendingStart,
    SendingBit(u8),
    SendingStop,
}

impl fmt::Display for UartState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UartState::Idle => write!(f, "idle"),
            UartState::Detecting => write!(f, "detecting"),
            UartState::ReceivingBit(n) => write!(f, "rx-bit{n}"),
            UartState::SendingStart => write!(f, "tx-start"),
            UartState::SendingBit(n) => write!(f, "tx-bit{n}"),
            UartState::SendingStop => write!(f, "tx-stop"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UartStats {
    pub rx_bytes: u32,
    pub tx_bytes: u32,
    /// Received bytes lost because the RX channel was full.
    pub rx_overruns: u32,
    /// Samples that were neither 0 nor 1.
    pub rx_anomalies: u32,
    /// Detections that ended in a fallback rate.
    pub autobaud_fallbacks: u32,
    pub detected_baud: Option<u32>,
    pub last_rx_at: Option<SimTime>,
    pub last_tx_done_at: Option<SimTime>,
}

/// Nearest standard rate to `measured` bits per second.
pub fn nearest_standard_rate(measured: f64) -> u32 {
    let mut best = SLOWEST_BAUD;
    let mut best_error = f64::INFINITY;
    for &rate in &STANDARD_BAUD_RATES {
        let error = (f64::from(rate) - measured).abs();
        if error < best_error {
            best = rate;
            best_error = error;
        }
    }
    best
}

/// Classifies a start-pulse width. `None` when the pulse is shorter than the
/// fastest table entry can produce.
pub fn classify_pulse(width: SimDuration) -> Option<u32> {
    if width.is_zero() {
        return None;
    }
    let measured = 1.0 / width.as_secs_f64();
    if measured > f64::from(FASTEST_BAUD) * (1.0 + AUTOBAUD_TOLERANCE) {
        return None;
    }
    Some(nearest_standard_rate(measured))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxStep {
    Boot,
    AwaitIdle,
    AwaitStart,
    Measuring { since: SimTime },
    FrameTail,
    StartMid,
    Data(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxStep {
    Boot,
    AwaitByte,
    Data(u8),
    Stop,
    Done,
}

#[derive(Debug)]
pub struct Uart {
    config: UartConfig,
    baud: u32,
    autodetect: bool,

    rx_line: NetId,
    tx_line: DriverId,
    rx_channel: ChannelId,
    tx_channel: ChannelId,

    rx_state: UartState,
    rx_step: RxStep,
    rx_period: SimDuration,
    rx_shift: u8,

    tx_state: UartState,
    tx_step: TxStep,
    tx_period: SimDuration,
    tx_shift: u8,
    /// Flips on every data bit sent; exists only for waveform traces.
    bit_marker: bool,

    stats: UartStats,
}

impl Uart {
    pub fn new(
        config: UartConfig,
        rx_line: NetId,
        tx_line: DriverId,
        rx_channel: ChannelId,
        tx_channel: ChannelId,
    ) -> Self {
        let baud = config.baud.max(1);
        Self {
            baud,
            autodetect: config.autodetect,
            config,
            rx_line,
            tx_line,
            rx_channel,
            tx_channel,
            rx_state: UartState::Idle,
            rx_step: RxStep::Boot,
            rx_period: SimDuration::bit_period(baud),
            rx_shift: 0,
            tx_state: UartState::Idle,
            tx_step: TxStep::Boot,
            tx_period: SimDuration::bit_period(baud),
            tx_shift: 0,
            bit_marker: false,
            stats: UartStats::default(),
        }
    }

    pub fn config(&self) -> &UartConfig {
        &self.config
    }

    /// Rate currently used for new frames in both directions.
    pub fn baud(&self) -> u32 {
        self.baud
    }

    pub fn bit_period(&self) -> SimDuration {
        SimDuration::bit_period(self.baud)
    }

    /// Changes the rate. Frames already in flight keep their latched period.
    pub fn set_baud(&mut self, baud: u32) {
        self.baud = baud.max(1);
        self.autodetect = false;
    }

    /// Measures the next start pulse instead of decoding it.
    pub fn request_autodetect(&mut self) {
        self.autodetect = true;
    }

    pub fn is_autodetecting(&self) -> bool {
        self.autodetect
    }

    pub fn rx_state(&self) -> UartState {
        self.rx_state
    }

    pub fn tx_state(&self) -> UartState {
        self.tx_state
    }

    pub fn bit_marker(&self) -> bool {
        self.bit_marker
    }

    pub fn stats(&self) -> &UartStats {
        &self.stats
    }

    pub fn rx_channel(&self) -> ChannelId {
        self.rx_channel
    }

    pub fn tx_channel(&self) -> ChannelId {
        self.tx_channel
    }

    fn await_start(&mut self) -> Wait {
        self.rx_state = UartState::Idle;
        self.rx_step = RxStep::AwaitStart;
        Wait::Edge(self.rx_line, Edge::Falling)
    }

    fn adopt_rate(&mut self, baud: u32, ctx: &SimContext<'_>) {
        debug!(
            line = %ctx.net(self.rx_line).name(),
            baud,
            time = %ctx.now(),
            "autobaud locked"
        );
        self.baud = baud;
        self.stats.detected_baud = Some(baud);
    }

    fn resume_rx(&mut self, ctx: &mut SimContext<'_>) -> Wait {
        match self.rx_step {
            RxStep::Boot => {
                if ctx.read_logic(self.rx_line) == Logic::One {
                    self.await_start()
                } else {
                    self.rx_step = RxStep::AwaitIdle;
                    Wait::Edge(self.rx_line, Edge::Rising)
                }
            }
            RxStep::AwaitIdle => self.await_start(),
            RxStep::AwaitStart => {
                if self.autodetect {
                    self.rx_state = UartState::Detecting;
                    self.rx_step = RxStep::Measuring { since: ctx.now() };
                    Wait::EdgeWithin(self.rx_line, Edge::Rising, AUTOBAUD_TIMEOUT)
                } else {
                    self.rx_period = SimDuration::bit_period(self.baud);
                    self.rx_shift = 0;
                    self.rx_state = UartState::ReceivingBit(0);
                    self.rx_step = RxStep::StartMid;
                    Wait::For(self.rx_period / 2)
                }
            }
            RxStep::Measuring { since } => {
                self.autodetect = false;
                if ctx.timed_out() {
                    warn!(
                        line = %ctx.net(self.rx_line).name(),
                        fallback = SLOWEST_BAUD,
                        "no edge within autobaud window, using slowest rate"
                    );
                    self.stats.autobaud_fallbacks += 1;
                    self.adopt_rate(SLOWEST_BAUD, ctx);
                    // The line is still low: let the pulse finish before hunting again.
                    self.rx_state = UartState::Idle;
                    self.rx_step = RxStep::AwaitIdle;
                    return Wait::Edge(self.rx_line, Edge::Rising);
                }

                let width = ctx.now() - since;
                let baud = classify_pulse(width).unwrap_or_else(|| {
                    warn!(
                        line = %ctx.net(self.rx_line).name(),
                        width = %width,
                        fallback = FASTEST_BAUD,
                        "start pulse shorter than fastest standard rate"
                    );
                    self.stats.autobaud_fallbacks += 1;
                    FASTEST_BAUD
                });
                self.adopt_rate(baud, ctx);
                let frame = SimDuration::bit_period(baud) * AUTOBAUD_FRAME_BITS;
                self.rx_step = RxStep::FrameTail;
                Wait::For(frame - width)
            }
            RxStep::FrameTail => self.await_start(),
            RxStep::StartMid => {
                self.rx_step = RxStep::Data(0);
                Wait::For(self.rx_period)
            }
            RxStep::Data(bit) => {
                let level = ctx.read_logic(self.rx_line);
                let sample = match level {
                    Logic::One => 1,
                    Logic::Zero => 0,
                    other => {
                        self.stats.rx_anomalies += 1;
                        warn!(
                            line = %ctx.net(self.rx_line).name(),
                            bit,
                            level = %other,
                            time = %ctx.now(),
                            "non-binary sample read as 0"
                        );
                        0
                    }
                };
                self.rx_shift |= sample << bit;

                if bit < 7 {
                    self.rx_state = UartState::ReceivingBit(bit + 1);
                    self.rx_step = RxStep::Data(bit + 1);
                    return Wait::For(self.rx_period);
                }

                let byte = self.rx_shift;
                trace!(line = %ctx.net(self.rx_line).name(), byte, "frame received");
                if ctx.push_byte(self.rx_channel, byte) {
                    self.stats.rx_bytes += 1;
                } else {
                    self.stats.rx_overruns += 1;
                }
                self.stats.last_rx_at = Some(ctx.now());
                self.await_start()
            }
        }
    }

    fn begin_frame(&mut self, ctx: &mut SimContext<'_>, byte: u8) -> Wait {
        self.tx_period = SimDuration::bit_period(self.baud);
        self.tx_shift = byte;
        self.tx_state = UartState::SendingStart;
        self.tx_step = TxStep::Data(0);
        ctx.drive(self.tx_line, Logic::Zero);
        Wait::For(self.tx_period)
    }

    fn next_frame(&mut self, ctx: &mut SimContext<'_>) -> Wait {
        match ctx.pop_byte(self.tx_channel) {
            Some(byte) => self.begin_frame(ctx, byte),
            None => {
                self.tx_state = UartState::Idle;
                self.tx_step = TxStep::AwaitByte;
                Wait::Readable(self.tx_channel)
            }
        }
    }

    fn resume_tx(&mut self, ctx: &mut SimContext<'_>) -> Wait {
        match self.tx_step {
            TxStep::Boot => {
                ctx.drive(self.tx_line, Logic::One);
                self.tx_state = UartState::Idle;
                self.tx_step = TxStep::AwaitByte;
                Wait::Readable(self.tx_channel)
            }
            TxStep::AwaitByte => self.next_frame(ctx),
            TxStep::Data(bit) => {
                let level = Logic::from_bit(self.tx_shift >> bit & 1 == 1);
                ctx.drive(self.tx_line, level);
                self.bit_marker = !self.bit_marker;
                self.tx_state = UartState::SendingBit(bit);
                self.tx_step = if bit < 7 { TxStep::Data(bit + 1) } else { TxStep::Stop };
                Wait::For(self.tx_period)
            }
            TxStep::Stop => {
                ctx.drive(self.tx_line, Logic::One);
                self.tx_state = UartState::SendingStop;
                self.tx_step = TxStep::Done;
                Wait::For(self.config.stop_bits.duration(self.tx_period))
            }
            TxStep::Done => {
                self.stats.tx_bytes += 1;
                self.stats.last_tx_done_at = Some(ctx.now());
                self.next_frame(ctx)
            }
        }
    }
}

impl Component for Uart {
    fn kind(&self) -> &'static str {
        "uart"
    }

    fn processes(&self) -> usize {
        2
    }

    fn resume(&mut self, process: usize, ctx: &mut SimContext<'_>) -> Wait {
        match process {
            RX => self.resume_rx(ctx),
            TX => self.resume_tx(ctx),
            _ => Wait::Forever,
        }
    }

    fn state_label(&self) -> String {
        format!("rx={} tx={} baud={}", self.rx_state, self.tx_state, self.baud)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_bit_durations() {
        let bit = SimDuration::from_us(100);
        assert_eq!(StopBits::One.duration(bit), SimDuration::from_us(100));
        assert_eq!(StopBits::OneAndHalf.duration(bit), SimDuration::from_us(150));
        assert_eq!(StopBits::Two.duration(bit), SimDuration::from_us(200));
    }

    #[test]
    fn test_nearest_rate() {
        assert_eq!(nearest_standard_rate(9_500.0), 9_600);
        assert_eq!(nearest_standard_rate(120_000.0), 115_200);
        assert_eq!(nearest_standard_rate(10.0), 300);
        assert_eq!(nearest_standard_rate(5.0e6), FASTEST_BAUD);
    }

    #[test]
    fn test_classify_exact_periods() {
        for &rate in &STANDARD_BAUD_RATES {
            assert_eq!(classify_pulse(SimDuration::bit_period(rate)), Some(rate));
        }
    }

    #[test]
    fn test_classify_too_short() {
        assert_eq!(classify_pulse(SimDuration::from_ns(100)), None);
        assert_eq!(classify_pulse(SimDuration::ZERO), None);
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config: UartConfig = serde_json::from_str(r#"{"stop_bits":"Two"}"#).unwrap();
        assert_eq!(config.baud, DEFAULT_BAUD);
        assert_eq!(config.stop_bits, StopBits::Two);
        assert!(!config.autodetect);
    }
}
