use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use pinsim::bench::{BusOp, TwoWireController};
use pinsim::board::{Board, MuxHandle};
use pinsim::config::BoardConfig;
use pinsim::kernel::snapshot::SimSnapshot;
use pinsim::mux::Mux;
use pinsim::signal::{Logic, SignalValue};
use pinsim::two_wire::TwoWireSlave;
use pinsim::uart::Uart;
use pinsim::{SimDuration, SimError};

const DEFAULT_DURATION_US: &str = "1000";

const UART_DEMO_BOARD: &str = r#"{
    "name": "uart-demo",
    "pins": [
        {"pin": 1, "name": "left_to_right"},
        {"pin": 2, "name": "right_to_left"}
    ],
    "uarts": [
        {"name": "left", "tx_pin": 1, "rx_pin": 2, "baud": 115200},
        {"name": "right", "tx_pin": 2, "rx_pin": 1, "baud": 9600, "autodetect": true}
    ]
}"#;

const TWO_WIRE_DEMO_BOARD: &str = r#"{
    "name": "two-wire-demo",
    "pins": [
        {"pin": 1, "name": "sda"},
        {"pin": 2, "name": "scl"}
    ],
    "two_wire": [
        {"name": "nfc", "sda_pin": 1, "scl_pin": 2, "address": 36, "filler": 255}
    ]
}"#;

const MUX_DEMO_BOARD: &str = r#"{
    "name": "mux-demo",
    "pins": [
        {"pin": 1, "name": "common"},
        {"pin": 2, "name": "ch0"},
        {"pin": 3, "name": "ch1"},
        {"pin": 4, "name": "sel0"},
        {"pin": 5, "name": "inhibit"}
    ],
    "muxes": [
        {"name": "mux", "common_pin": 1, "channel_pins": [2, 3], "select_pins": [4], "inhibit_pin": 5}
    ]
}"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("pinsim")
        .version("0.1.0")
        .author("Embedded Systems Engineering Team")
        .about("Event-driven pin and protocol simulator")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table"])
                .default_value("table")
                .global(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Log protocol milestones")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Assemble a board description and run it")
                .arg(
                    Arg::with_name("config")
                        .short("c")
                        .long("config")
                        .value_name("FILE")
                        .help("Board description (JSON)")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::with_name("duration-us")
                        .short("d")
                        .long("duration-us")
                        .value_name("MICROSECONDS")
                        .help("Simulated time to run")
                        .takes_value(true)
                        .default_value(DEFAULT_DURATION_US)
                        .validator(|v| match v.parse::<u64>() {
                            Ok(_) => Ok(()),
                            Err(_) => Err("Duration must be a whole number of microseconds".into()),
                        }),
                )
                .arg(
                    Arg::with_name("send")
                        .short("s")
                        .long("send")
                        .value_name("UART=TEXT")
                        .help("Queue text on a UART's transmitter before running")
                        .takes_value(true)
                        .multiple(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("demo")
                .about("Run a built-in scenario")
                .arg(
                    Arg::with_name("scenario")
                        .help("Scenario to run")
                        .required(true)
                        .possible_values(&["uart", "two-wire", "mux"]),
                ),
        )
        .get_matches();

    let verbose = matches.is_present("verbose");
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let format = matches.value_of("format").unwrap_or("table");

    match matches.subcommand() {
        ("run", Some(sub_matches)) => handle_run(sub_matches, format)?,
        ("demo", Some(sub_matches)) => match sub_matches.value_of("scenario") {
            Some("uart") => demo_uart(format)?,
            Some("two-wire") => demo_two_wire(format)?,
            Some("mux") => demo_mux(format)?,
            _ => println!("{}", "Unknown scenario. Use --help for options.".yellow()),
        },
        _ => println!("{}", "No command specified. Use --help for usage information.".yellow()),
    }

    Ok(())
}

fn handle_run(matches: &ArgMatches<'_>, format: &str) -> Result<(), SimError> {
    let path = matches.value_of("config").unwrap_or_default();
    let duration_us = matches
        .value_of("duration-us")
        .unwrap_or(DEFAULT_DURATION_US)
        .parse::<u64>()
        .map_err(|e| SimError::InvalidConfig(format!("duration: {e}")))?;

    let config = BoardConfig::load(path)?;
    let undeclared = config.undeclared_pins();
    if !undeclared.is_empty() {
        return Err(SimError::UnknownPin(undeclared[0]));
    }
    let mut board = Board::assemble(&config)?;

    for entry in matches.values_of("send").into_iter().flatten() {
        let (uart, text) = entry
            .split_once('=')
            .ok_or_else(|| SimError::InvalidConfig(format!("expected UART=TEXT, got `{entry}`")))?;
        let handle = board.registry().uart(uart)?;
        let accepted = board.sim_mut().push_bytes(handle.tx_channel, text.as_bytes());
        if accepted < text.len() {
            eprintln!(
                "{} {} of {} bytes queued on {}",
                "warning:".yellow(),
                accepted,
                text.len(),
                uart
            );
        }
    }

    board.run_for(SimDuration::from_us(duration_us))?;
    print_snapshot(&board.snapshot(), format);
    Ok(())
}

fn demo_uart(format: &str) -> Result<(), SimError> {
    let mut board = Board::assemble(&BoardConfig::from_json(UART_DEMO_BOARD)?)?;
    let left = board.registry().uart("left")?;
    let right = board.registry().uart("right")?;

    // 0x55 gives the autodetector a one-bit start pulse to measure.
    board.sim_mut().push_byte(left.tx_channel, 0x55);
    board.sim_mut().push_bytes(left.tx_channel, b"hello");
    board.run_for(SimDuration::from_ms(2))?;

    let received = board.sim_mut().drain_channel(right.rx_channel);
    let detected = board
        .sim()
        .component::<Uart>(right.component)
        .and_then(|uart| uart.stats().detected_baud);

    if format == "json" {
        let report = serde_json::json!({
            "detected_baud": detected,
            "received": received,
            "snapshot": board.snapshot(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "UART loopback".bright_blue().bold());
    match detected {
        Some(baud) => println!("{} {}", "Detected baud:".bright_white(), baud.to_string().bright_green()),
        None => println!("{} {}", "Detected baud:".bright_white(), "none".bright_red()),
    }
    println!(
        "{} {} {}",
        "Received:".bright_white(),
        hex(&received),
        format!("({:?})", String::from_utf8_lossy(&received)).dimmed()
    );
    Ok(())
}

fn demo_two_wire(format: &str) -> Result<(), SimError> {
    let mut board = Board::assemble(&BoardConfig::from_json(TWO_WIRE_DEMO_BOARD)?)?;
    let nfc = board.registry().two_wire("nfc")?;
    let sda = board.attach_driver(1, "host")?;
    let scl = board.attach_driver(2, "host")?;

    board.sim_mut().push_bytes(nfc.outbound, &[0xD5, 0x03]);
    let controller = TwoWireController::new(sda, scl, SimDuration::from_us(10)).with_ops(&[
        BusOp::Start,
        BusOp::Write(0x24 << 1 | 1),
        BusOp::Read { ack: true },
        BusOp::Read { ack: true },
        BusOp::Read { ack: false },
        BusOp::Stop,
        BusOp::Start,
        BusOp::Write(0x24 << 1),
        BusOp::Write(0xD4),
        BusOp::Write(0x02),
        BusOp::Stop,
    ]);
    let host = board.sim_mut().add_component("host", controller)?;
    board.run_for(SimDuration::from_ms(1))?;

    let written = board.sim_mut().drain_channel(nfc.inbound);
    let (acks, reads) = board
        .sim()
        .component::<TwoWireController>(host)
        .map(|c| (c.acks().to_vec(), c.reads().to_vec()))
        .unwrap_or_default();
    let stats = board
        .sim()
        .component::<TwoWireSlave>(nfc.component)
        .map(|slave| *slave.stats())
        .unwrap_or_default();

    if format == "json" {
        let report = serde_json::json!({
            "acks": acks,
            "read": reads,
            "written": written,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "Two-wire transactions at 0x24".bright_blue().bold());
    let ack_text: Vec<String> = acks
        .iter()
        .map(|&a| if a { "ACK".green().to_string() } else { "NACK".red().to_string() })
        .collect();
    println!("{} {}", "Acknowledges:".bright_white(), ack_text.join(" "));
    println!("{} {}", "Read (status first):".bright_white(), hex(&reads));
    println!("{} {}", "Written to device:".bright_white(), hex(&written));
    println!(
        "{} {} transactions, {} in, {} out",
        "Stats:".bright_white(),
        stats.transactions,
        stats.bytes_in,
        stats.bytes_out
    );
    Ok(())
}

fn demo_mux(format: &str) -> Result<(), SimError> {
    let mut board = Board::assemble(&BoardConfig::from_json(MUX_DEMO_BOARD)?)?;
    let mux = board.registry().mux("mux")?.clone();
    let common = board.attach_driver(1, "host")?;
    let select = board.attach_driver(4, "host")?;
    let inhibit = board.attach_driver(5, "host")?;

    let mut rows = Vec::new();

    board.sim_mut().drive(inhibit, Logic::Zero);
    board.sim_mut().drive(select, Logic::One);
    board.sim_mut().drive(common, Logic::One);
    rows.push(mux_step(&mut board, &mux, "select ch1, drive common high")?);

    board.sim_mut().drive(common, Logic::Zero);
    rows.push(mux_step(&mut board, &mux, "drive common low")?);

    board.sim_mut().drive(select, Logic::Zero);
    rows.push(mux_step(&mut board, &mux, "select ch0")?);

    board.sim_mut().drive(inhibit, Logic::One);
    rows.push(mux_step(&mut board, &mux, "inhibit")?);

    if format == "json" {
        let report: Vec<_> = rows
            .iter()
            .map(|(label, common, channels, state)| {
                serde_json::json!({
                    "step": label,
                    "common": common.to_string(),
                    "channels": channels.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "state": state,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "Multiplexer".bright_blue().bold());
    println!(
        "{:<32} {:>6} {:>4} {:>4}  {}",
        "Step".bright_white(),
        "common".bright_white(),
        "ch0".bright_white(),
        "ch1".bright_white(),
        "state".bright_white()
    );
    for (label, common, channels, state) in &rows {
        println!(
            "{:<32} {:>6} {:>4} {:>4}  {}",
            label,
            colorize(*common),
            colorize(channels[0]),
            colorize(channels[1]),
            state.dimmed()
        );
    }
    Ok(())
}

type MuxRow = (&'static str, SignalValue, Vec<SignalValue>, String);

fn mux_step(board: &mut Board, mux: &MuxHandle, label: &'static str) -> Result<MuxRow, SimError> {
    board.run_for(SimDuration::from_us(1))?;
    let channels = mux.channels.iter().map(|&ch| board.sim().read(ch)).collect();
    let state = board
        .sim()
        .component::<Mux>(mux.component)
        .map(|m| m.state().to_string())
        .unwrap_or_default();
    Ok((label, board.sim().read(mux.common), channels, state))
}

fn print_snapshot(snapshot: &SimSnapshot, format: &str) {
    if format == "json" {
        match serde_json::to_string_pretty(snapshot) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("{} {}", "error:".red(), e),
        }
        return;
    }

    println!("{} {}", "Simulated time:".bright_blue().bold(), snapshot.time);

    println!("\n{}", "Nets".bright_white().bold());
    for net in &snapshot.nets {
        let conflicts = if net.conflict_episodes > 0 {
            format!("{} conflicts", net.conflict_episodes).red().to_string()
        } else {
            String::new()
        };
        println!(
            "  {:<20} {:<7} {:>8}  {}/{} drivers  {}",
            net.name,
            net.kind.to_string(),
            colorize(net.value),
            net.active_drivers,
            net.drivers,
            conflicts
        );
    }

    if !snapshot.channels.is_empty() {
        println!("\n{}", "Channels".bright_white().bold());
        for ch in &snapshot.channels {
            let dropped = if ch.stats.dropped > 0 {
                format!("{} dropped", ch.stats.dropped).red().to_string()
            } else {
                String::new()
            };
            println!(
                "  {:<20} {:>3}/{:<3} [{}] {}",
                ch.name,
                ch.pending.len(),
                ch.capacity,
                hex(&ch.pending),
                dropped
            );
        }
    }

    println!("\n{}", "Components".bright_white().bold());
    for c in &snapshot.components {
        println!(
            "  {:<20} {:<20} {} {}",
            c.name,
            c.kind.dimmed(),
            c.state,
            format!("({} activations)", c.activations).dimmed()
        );
    }
}

fn colorize(value: SignalValue) -> ColoredString {
    let text = value.to_string();
    match value.as_logic() {
        _ if value.as_analog().is_some() => text.bright_cyan(),
        Logic::One => text.bright_green(),
        Logic::Zero => text.normal(),
        Logic::Floating => text.yellow(),
        Logic::Conflict => text.bright_red(),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
