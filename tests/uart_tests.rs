mod common;

use common::{run_until, uart, uart_link, uart_rig};
use pinsim::kernel::{SimDuration, SimTime};
use pinsim::signal::Logic;
use pinsim::uart::{
    classify_pulse, nearest_standard_rate, StopBits, UartConfig, UartState, AUTOBAUD_TIMEOUT,
    SLOWEST_BAUD,
};

fn config(baud: u32, stop_bits: StopBits) -> UartConfig {
    UartConfig {
        baud,
        stop_bits,
        ..UartConfig::default()
    }
}

/// Picoseconds between `a` and `b`, either order.
fn gap(a: SimTime, b: SimTime) -> u64 {
    a.as_ps().abs_diff(b.as_ps())
}

#[cfg(test)]
mod round_trip_tests {
    use super::*;

    fn check_frame_timing(stop_bits: StopBits, expected_bits_x2: u64) {
        let baud = 115_200;
        let mut link = uart_link(config(baud, stop_bits), config(baud, stop_bits));
        let period = SimDuration::bit_period(baud);
        link.sim.push_bytes(link.a_tx, &[0x3C, 0xA5, 0x00]);

        let b = link.b;
        let mut arrivals = Vec::new();
        for count in 1..=3 {
            assert!(run_until(&mut link.sim, period, period * 40, |sim| {
                uart(sim, b).stats().rx_bytes >= count
            }));
            arrivals.push(uart(&link.sim, b).stats().last_rx_at.unwrap());
        }

        assert_eq!(link.sim.drain_channel(link.b_rx), vec![0x3C, 0xA5, 0x00]);

        // Back-to-back frames arrive one frame length apart
        let frame = period.as_ps() * expected_bits_x2 / 2;
        for pair in arrivals.windows(2) {
            assert!(
                gap(pair[1], pair[0]).abs_diff(frame) <= 2,
                "frame spacing {} ps, expected {} ps",
                gap(pair[1], pair[0]),
                frame
            );
        }
    }

    #[test]
    fn test_one_stop_bit_frame_is_ten_periods() {
        check_frame_timing(StopBits::One, 20);
    }

    #[test]
    fn test_one_and_half_stop_bits_frame() {
        check_frame_timing(StopBits::OneAndHalf, 21);
    }

    #[test]
    fn test_two_stop_bits_frame() {
        check_frame_timing(StopBits::Two, 22);
    }

    #[test]
    fn test_single_byte_transmit_duration() {
        let baud = 9_600;
        let mut link = uart_link(config(baud, StopBits::One), config(baud, StopBits::One));
        link.sim.push_byte(link.a_tx, b'Z');
        link.sim.run_for(SimDuration::from_ms(2)).unwrap();

        let stats = *uart(&link.sim, link.a).stats();
        assert_eq!(stats.tx_bytes, 1);
        let done = stats.last_tx_done_at.unwrap();
        assert!(gap(done, SimTime::ZERO) <= 2 + SimDuration::bit_period(baud).as_ps() * 10);
        assert!(gap(done, SimTime::ZERO) + 2 >= SimDuration::bit_period(baud).as_ps() * 10);
        assert_eq!(link.sim.drain_channel(link.b_rx), b"Z".to_vec());

        // Transmitter returns to idle high
        assert_eq!(link.sim.read_logic(link.a_to_b), Logic::One);
        assert_eq!(uart(&link.sim, link.a).tx_state(), UartState::Idle);
    }

    #[test]
    fn test_full_duplex() {
        let mut link = uart_link(UartConfig::default(), UartConfig::default());
        link.sim.push_bytes(link.a_tx, b"ping");
        link.sim.push_bytes(link.b_tx, b"pong");
        link.sim.run_for(SimDuration::from_ms(1)).unwrap();

        assert_eq!(link.sim.drain_channel(link.b_rx), b"ping".to_vec());
        assert_eq!(link.sim.drain_channel(link.a_rx), b"pong".to_vec());
    }

    #[test]
    fn test_baud_change_between_runs() {
        let mut link = uart_link(UartConfig::default(), UartConfig::default());
        link.sim.push_byte(link.a_tx, 0x11);
        link.sim.run_for(SimDuration::from_ms(1)).unwrap();

        for id in [link.a, link.b] {
            link.sim.component_mut::<pinsim::Uart>(id).unwrap().set_baud(19_200);
        }
        link.sim.push_byte(link.a_tx, 0x22);
        link.sim.run_for(SimDuration::from_ms(2)).unwrap();

        assert_eq!(link.sim.drain_channel(link.b_rx), vec![0x11, 0x22]);
        assert_eq!(uart(&link.sim, link.b).baud(), 19_200);
    }

    #[test]
    fn test_mismatched_rates_do_not_hang() {
        let mut link = uart_link(config(115_200, StopBits::One), config(9_600, StopBits::One));
        link.sim.push_bytes(link.a_tx, b"garbage");
        link.sim.run_for(SimDuration::from_ms(5)).unwrap();

        // Whatever was decoded, the receiver keeps running and stays consistent
        assert_eq!(link.sim.now(), SimTime::ZERO + SimDuration::from_ms(5));
        let stats = *uart(&link.sim, link.b).stats();
        assert_eq!(stats.rx_bytes as usize, link.sim.channel(link.b_rx).len());
    }
}

#[cfg(test)]
mod receiver_tests {
    use super::*;

    #[test]
    fn test_overrun_drops_newest_byte() {
        let rx_config = UartConfig {
            rx_capacity: 2,
            ..UartConfig::default()
        };
        let mut link = uart_link(UartConfig::default(), rx_config);
        link.sim.push_bytes(link.a_tx, &[1, 2, 3]);
        link.sim.run_for(SimDuration::from_ms(1)).unwrap();

        let stats = *uart(&link.sim, link.b).stats();
        assert_eq!(stats.rx_bytes, 2);
        assert_eq!(stats.rx_overruns, 1);
        assert_eq!(link.sim.channel(link.b_rx).stats().dropped, 1);
        assert_eq!(link.sim.drain_channel(link.b_rx), vec![1, 2]);
    }

    #[test]
    fn test_floating_samples_read_as_zero() {
        let baud = 9_600;
        let period = SimDuration::bit_period(baud);
        let mut rig = uart_rig(config(baud, StopBits::One));

        rig.sim.drive(rig.stimulus, Logic::One);
        rig.sim.run_for(SimDuration::from_us(10)).unwrap();

        // Start bit, then let the line float through all eight data bits
        rig.sim.drive(rig.stimulus, Logic::Zero);
        rig.sim.run_for(period).unwrap();
        rig.sim.release(rig.stimulus);
        rig.sim.run_for(period * 9).unwrap();
        rig.sim.drive(rig.stimulus, Logic::One);
        rig.sim.run_for(period * 2).unwrap();

        let stats = *uart(&rig.sim, rig.uart).stats();
        assert_eq!(stats.rx_anomalies, 8);
        assert_eq!(rig.sim.drain_channel(rig.rx), vec![0x00]);
    }

    #[test]
    fn test_receiver_waits_for_idle_before_first_frame() {
        let baud = 9_600;
        let period = SimDuration::bit_period(baud);
        let mut rig = uart_rig(config(baud, StopBits::One));

        // Line held low from power-up is not a start bit
        rig.sim.drive(rig.stimulus, Logic::Zero);
        rig.sim.run_for(period * 20).unwrap();
        assert!(rig.sim.channel(rig.rx).is_empty());
        assert_eq!(uart(&rig.sim, rig.uart).rx_state(), UartState::Idle);

        rig.sim.drive(rig.stimulus, Logic::One);
        rig.sim.run_for(period * 2).unwrap();
        assert!(rig.sim.channel(rig.rx).is_empty());
    }
}

#[cfg(test)]
mod autodetect_tests {
    use super::*;

    #[test]
    fn test_detects_rate_from_sync_byte() {
        let rx_config = UartConfig {
            baud: 9_600,
            autodetect: true,
            ..UartConfig::default()
        };
        let mut link = uart_link(config(115_200, StopBits::One), rx_config);
        link.sim.push_bytes(link.a_tx, &[0x55, b'O', b'K']);
        link.sim.run_for(SimDuration::from_ms(1)).unwrap();

        let receiver = uart(&link.sim, link.b);
        assert_eq!(receiver.stats().detected_baud, Some(115_200));
        assert_eq!(receiver.baud(), 115_200);
        assert!(!receiver.is_autodetecting());
        // The sync byte is consumed by the measurement
        assert_eq!(link.sim.drain_channel(link.b_rx), b"OK".to_vec());
    }

    #[test]
    fn test_pulse_width_matches_nearest_rate() {
        for width_ns in [104_167u64, 8_681, 17_000, 3_300, 1_000_000] {
            let width = SimDuration::from_ns(width_ns);
            let mut rig = uart_rig(UartConfig {
                autodetect: true,
                ..UartConfig::default()
            });

            rig.sim.drive(rig.stimulus, Logic::One);
            rig.sim.run_for(SimDuration::from_us(5)).unwrap();
            rig.sim.drive(rig.stimulus, Logic::Zero);
            rig.sim.run_for(width).unwrap();
            rig.sim.drive(rig.stimulus, Logic::One);
            rig.sim.run_for(SimDuration::from_us(1)).unwrap();

            let expected = nearest_standard_rate(1.0 / width.as_secs_f64());
            assert_eq!(classify_pulse(width), Some(expected));
            assert_eq!(
                uart(&rig.sim, rig.uart).stats().detected_baud,
                Some(expected),
                "pulse of {width_ns} ns"
            );
        }
    }

    #[test]
    fn test_timeout_falls_back_to_slowest_rate() {
        let mut rig = uart_rig(UartConfig {
            autodetect: true,
            ..UartConfig::default()
        });

        rig.sim.drive(rig.stimulus, Logic::One);
        rig.sim.run_for(SimDuration::from_us(5)).unwrap();
        rig.sim.drive(rig.stimulus, Logic::Zero);
        rig.sim.run_for(AUTOBAUD_TIMEOUT + SimDuration::from_ms(1)).unwrap();

        let receiver = uart(&rig.sim, rig.uart);
        assert_eq!(receiver.stats().detected_baud, Some(SLOWEST_BAUD));
        assert_eq!(receiver.stats().autobaud_fallbacks, 1);
        assert_eq!(receiver.baud(), SLOWEST_BAUD);

        // Releasing the line puts the receiver back on the hunt for a start bit
        rig.sim.drive(rig.stimulus, Logic::One);
        rig.sim.run_for(SimDuration::from_us(5)).unwrap();
        assert_eq!(uart(&rig.sim, rig.uart).rx_state(), UartState::Idle);
        assert!(rig.sim.channel(rig.rx).is_empty());
    }

    #[test]
    fn test_pulse_shorter_than_fastest_rate() {
        let mut rig = uart_rig(UartConfig {
            autodetect: true,
            ..UartConfig::default()
        });

        rig.sim.drive(rig.stimulus, Logic::One);
        rig.sim.run_for(SimDuration::from_us(5)).unwrap();
        rig.sim.drive(rig.stimulus, Logic::Zero);
        rig.sim.run_for(SimDuration::from_ns(50)).unwrap();
        rig.sim.drive(rig.stimulus, Logic::One);
        rig.sim.run_for(SimDuration::from_us(5)).unwrap();

        let stats = *uart(&rig.sim, rig.uart).stats();
        assert_eq!(stats.detected_baud, Some(pinsim::uart::FASTEST_BAUD));
        assert_eq!(stats.autobaud_fallbacks, 1);
    }

    #[test]
    fn test_request_autodetect_after_start() {
        let mut link = uart_link(config(57_600, StopBits::One), UartConfig::default());
        link.sim.run_for(SimDuration::from_us(100)).unwrap();

        link.sim
            .component_mut::<pinsim::Uart>(link.b)
            .unwrap()
            .request_autodetect();
        link.sim.push_bytes(link.a_tx, &[0x55, 0x7E]);
        link.sim.run_for(SimDuration::from_ms(1)).unwrap();

        assert_eq!(uart(&link.sim, link.b).stats().detected_baud, Some(57_600));
        assert_eq!(link.sim.drain_channel(link.b_rx), vec![0x7E]);
    }
}
