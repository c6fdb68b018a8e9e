#![allow(dead_code)]

use pinsim::bench::{BusOp, TwoWireController};
use pinsim::kernel::{ChannelId, ComponentId, DriverId, NetId, SimDuration, Simulator};
use pinsim::signal::SignalKind;
use pinsim::two_wire::{TwoWireConfig, TwoWireSlave};
use pinsim::uart::{Uart, UartConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Two transceivers wired back to back: `a` transmits on `a_to_b`, `b` on `b_to_a`.
pub struct UartLink {
    pub sim: Simulator,
    pub a: ComponentId,
    pub b: ComponentId,
    pub a_to_b: NetId,
    pub b_to_a: NetId,
    pub a_tx: ChannelId,
    pub a_rx: ChannelId,
    pub b_tx: ChannelId,
    pub b_rx: ChannelId,
}

pub fn uart_link(a_config: UartConfig, b_config: UartConfig) -> UartLink {
    let mut sim = Simulator::new();
    let a_to_b = sim.add_net("a_to_b", SignalKind::Logic).unwrap();
    let b_to_a = sim.add_net("b_to_a", SignalKind::Logic).unwrap();
    let a_drv = sim.add_driver(a_to_b, "a").unwrap();
    let b_drv = sim.add_driver(b_to_a, "b").unwrap();

    let a_rx = sim.add_channel("a.rx", a_config.rx_capacity).unwrap();
    let a_tx = sim.add_channel("a.tx", a_config.tx_capacity).unwrap();
    let b_rx = sim.add_channel("b.rx", b_config.rx_capacity).unwrap();
    let b_tx = sim.add_channel("b.tx", b_config.tx_capacity).unwrap();

    let a = sim
        .add_component("a", Uart::new(a_config, b_to_a, a_drv, a_rx, a_tx))
        .unwrap();
    let b = sim
        .add_component("b", Uart::new(b_config, a_to_b, b_drv, b_rx, b_tx))
        .unwrap();

    UartLink {
        sim,
        a,
        b,
        a_to_b,
        b_to_a,
        a_tx,
        a_rx,
        b_tx,
        b_rx,
    }
}

/// A receiver whose RX line is driven directly by the test.
pub struct UartRig {
    pub sim: Simulator,
    pub uart: ComponentId,
    pub line: NetId,
    pub stimulus: DriverId,
    pub rx: ChannelId,
}

pub fn uart_rig(config: UartConfig) -> UartRig {
    let mut sim = Simulator::new();
    let line = sim.add_net("rx", SignalKind::Logic).unwrap();
    let tx_line = sim.add_net("tx", SignalKind::Logic).unwrap();
    let stimulus = sim.add_driver(line, "bench").unwrap();
    let tx_drv = sim.add_driver(tx_line, "uart").unwrap();
    let rx = sim.add_channel("uart.rx", config.rx_capacity).unwrap();
    let tx = sim.add_channel("uart.tx", config.tx_capacity).unwrap();
    let uart = sim
        .add_component("uart", Uart::new(config, line, tx_drv, rx, tx))
        .unwrap();
    UartRig {
        sim,
        uart,
        line,
        stimulus,
        rx,
    }
}

pub fn uart(sim: &Simulator, id: ComponentId) -> &Uart {
    sim.component::<Uart>(id).unwrap()
}

/// Runs in `step` increments until `done` holds or `limit` of simulated time
/// has passed. Returns whether `done` was reached.
pub fn run_until<F>(sim: &mut Simulator, step: SimDuration, limit: SimDuration, done: F) -> bool
where
    F: Fn(&Simulator) -> bool,
{
    let end = sim.now() + limit;
    while sim.now() < end {
        if done(sim) {
            return true;
        }
        sim.run_for(step).unwrap();
    }
    done(sim)
}

/// A two-wire slave and a scripted controller on one bus.
pub struct TwoWireBench {
    pub sim: Simulator,
    pub slave: ComponentId,
    pub host: ComponentId,
    pub sda: NetId,
    pub scl: NetId,
    pub inbound: ChannelId,
    pub outbound: ChannelId,
}

pub const BUS_CLOCK: SimDuration = SimDuration::from_us(10);

/// Builds the bus, queues `outbound` for the slave to return, and loads the
/// controller script. Nothing has run yet.
pub fn two_wire_bench(config: TwoWireConfig, outbound: &[u8], ops: &[BusOp]) -> TwoWireBench {
    let mut sim = Simulator::new();
    let sda = sim.add_net("sda", SignalKind::Logic).unwrap();
    let scl = sim.add_net("scl", SignalKind::Logic).unwrap();
    let slave_sda = sim.add_driver(sda, "slave").unwrap();
    let host_sda = sim.add_driver(sda, "host").unwrap();
    let host_scl = sim.add_driver(scl, "host").unwrap();

    let inbound_ch = sim.add_channel("slave.in", config.inbound_capacity).unwrap();
    let outbound_ch = sim.add_channel("slave.out", config.outbound_capacity).unwrap();
    sim.push_bytes(outbound_ch, outbound);

    let slave = sim
        .add_component(
            "slave",
            TwoWireSlave::new(config, slave_sda, scl, inbound_ch, outbound_ch).unwrap(),
        )
        .unwrap();
    let host = sim
        .add_component(
            "host",
            TwoWireController::new(host_sda, host_scl, BUS_CLOCK).with_ops(ops),
        )
        .unwrap();

    TwoWireBench {
        sim,
        slave,
        host,
        sda,
        scl,
        inbound: inbound_ch,
        outbound: outbound_ch,
    }
}

impl TwoWireBench {
    pub fn slave(&self) -> &TwoWireSlave {
        self.sim.component::<TwoWireSlave>(self.slave).unwrap()
    }

    pub fn host(&self) -> &TwoWireController {
        self.sim.component::<TwoWireController>(self.host).unwrap()
    }

    /// Runs until the controller script is exhausted.
    pub fn run_script(&mut self) {
        let host = self.host;
        let finished = run_until(
            &mut self.sim,
            BUS_CLOCK,
            SimDuration::from_ms(20),
            |sim| sim.component::<TwoWireController>(host).unwrap().is_done(),
        );
        assert!(finished, "controller script did not finish");
        // Let the final edges settle.
        self.sim.run_for(BUS_CLOCK).unwrap();
    }
}

struct WarnCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Runs `f` and returns how many WARN events it logged on this thread.
pub fn count_warnings(f: impl FnOnce()) -> usize {
    let count = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(WarnCounter(Arc::clone(&count)));
    tracing::subscriber::with_default(subscriber, f);
    count.load(Ordering::SeqCst)
}
