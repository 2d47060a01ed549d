//! Host CLI that drives a `fitterbap-datalink` instance for manual
//! soak testing, directly modeled on `dxkb-split-link-tester/src/main.rs`:
//! open a real serial port (or, for `loopback`, wire two in-process
//! peers through `fitterbap-testkit`'s `LossyLink`), poll it in a loop,
//! and log every connection event and delivered message through a
//! `LoggingPort`.

mod clock;
mod handler;
mod serial_link;

use std::time::Duration;

use clap::{Parser, Subcommand};

use fitterbap_common::time::Clock;
use fitterbap_datalink::{DatalinkConfig, NullDatalink, WindowSize};
use fitterbap_testkit::{LossConfig, LossyLink};
use fitterbap_transport::{PortData, PortId, Seq, Transport};

use clock::LinuxMonotonicClock;
use handler::LoggingPort;
use serial_link::SerialLink;

const TXN: usize = 16;
const RXN: usize = 16;
const RING: usize = 16;
const EVN: usize = 8;

type HarnessTransport = Transport<LoggingPort>;

#[derive(Parser, Debug)]
#[command(about = "Soak-test harness for the fitterbap comm core")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Retransmit timeout, in milliseconds, passed to `DatalinkConfig`.
    #[clap(long, default_value_t = 50)]
    tx_timeout_ms: i64,

    /// Negotiated TX/RX window size (rounded up to a power of two).
    #[clap(long, default_value_t = 8)]
    window: u16,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Talk to a real peer over a serial port.
    Serial {
        port: String,
        #[clap(default_value_t = 115_200)]
        baud_rate: u32,
        /// Send a counter-valued message on port 0 every this many
        /// milliseconds; omit to only receive.
        #[clap(long)]
        send_interval_ms: Option<u64>,
    },
    /// Wire two datalink instances together in-process through a
    /// configurable lossy channel and run a bounded soak test.
    Loopback {
        #[clap(long, default_value_t = 200)]
        messages: u32,
        #[clap(long, default_value_t = 0)]
        seed: u64,
        #[clap(long, default_value_t = 0.0)]
        drop_probability: f64,
        #[clap(long, default_value_t = 0.0)]
        duplicate_probability: f64,
        #[clap(long, default_value_t = 0.0)]
        corrupt_probability: f64,
    },
}

fn make_config(args: &Args) -> DatalinkConfig {
    DatalinkConfig::new(
        WindowSize::from_requested(args.window),
        WindowSize::from_requested(args.window),
        args.tx_timeout_ms,
    )
}

fn make_transport(label: &'static str) -> HarnessTransport {
    let mut transport = Transport::new();
    transport.port_register_default(LoggingPort::new(label), "default");
    transport
}

fn run_serial(args: &Args, port: String, baud_rate: u32, send_interval_ms: Option<u64>) {
    use serial2::{CharSize, FlowControl, Parity, SerialPort, Settings, StopBits};

    let mut raw = SerialPort::open(&port, |mut settings: Settings| {
        settings.set_raw();
        settings.set_baud_rate(baud_rate)?;
        settings.set_char_size(CharSize::Bits8);
        settings.set_parity(Parity::None);
        settings.set_stop_bits(StopBits::One);
        settings.set_flow_control(FlowControl::None);
        Ok(settings)
    })
    .unwrap_or_else(|e| panic!("failed to open {port}: {e}"));
    raw.set_read_timeout(Duration::ZERO).unwrap();

    let link = SerialLink::new(raw);
    let reader = link.clone();
    let clock = LinuxMonotonicClock;
    let mut dl: NullDatalink<SerialLink, LinuxMonotonicClock, HarnessTransport, TXN, RXN, RING, EVN> =
        NullDatalink::new(make_config(args), clock, link);
    dl.register_upper_layer(make_transport("serial"));

    let mut last_sent = clock.now();
    let mut next_value: u8 = 0;
    let mut read_buf = [0u8; 4096];

    log::info!("fitterbap-harness: polling {port} at {baud_rate} baud");
    loop {
        dl.process(clock.now());

        let n = reader.read_available(&mut read_buf);
        if n > 0 {
            dl.ll_recv(&read_buf[..n]);
        }

        if let Some(interval) = send_interval_ms {
            if clock.now() - last_sent >= interval as i64 {
                let metadata = fitterbap_transport::metadata::pack_metadata(
                    PortId::new(0).unwrap(),
                    Seq::Single,
                    PortData(0),
                );
                match dl.send(metadata, &[next_value], 0) {
                    Ok(()) => {
                        next_value = next_value.wrapping_add(1);
                        last_sent = clock.now();
                    }
                    Err(e) => log::debug!("fitterbap-harness: send skipped: {e:?}"),
                }
            }
        }

        std::thread::sleep(Duration::from_millis(1));
    }
}

fn run_loopback(
    args: &Args,
    messages: u32,
    seed: u64,
    drop_probability: f64,
    duplicate_probability: f64,
    corrupt_probability: f64,
) {
    let clock = LinuxMonotonicClock;
    let loss = LossConfig {
        drop_probability,
        duplicate_probability,
        corrupt_probability,
    };
    let link_a_to_b = LossyLink::new(seed, loss);
    let link_b_to_a = LossyLink::new(seed.wrapping_add(1), loss);

    let mut dl_a: NullDatalink<LossyLink, LinuxMonotonicClock, HarnessTransport, TXN, RXN, RING, EVN> =
        NullDatalink::new(make_config(args), clock, link_a_to_b.clone());
    let mut dl_b: NullDatalink<LossyLink, LinuxMonotonicClock, HarnessTransport, TXN, RXN, RING, EVN> =
        NullDatalink::new(make_config(args), clock, link_b_to_a.clone());
    dl_a.register_upper_layer(make_transport("peer-a"));
    dl_b.register_upper_layer(make_transport("peer-b"));

    let mut sent = 0u32;
    let mut last_sent = clock.now();
    let start = clock.now();

    loop {
        dl_a.process(clock.now());
        dl_b.process(clock.now());

        let a_to_b = link_a_to_b.drain();
        let b_to_a = link_b_to_a.drain();
        if !a_to_b.is_empty() {
            dl_b.ll_recv(&a_to_b);
        }
        if !b_to_a.is_empty() {
            dl_a.ll_recv(&b_to_a);
        }

        if sent < messages && dl_a.is_connected() && clock.now() - last_sent >= 5 {
            let metadata =
                fitterbap_transport::metadata::pack_metadata(PortId::new(0).unwrap(), Seq::Single, PortData(0));
            if dl_a.send(metadata, &sent.to_le_bytes(), 0).is_ok() {
                sent += 1;
                last_sent = clock.now();
            }
        }

        if sent == messages && clock.now() - last_sent > args.tx_timeout_ms.saturating_mul(4) {
            break;
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    log::info!(
        "fitterbap-harness: loopback soak test done in {} ms: tx={:?} rx={:?}",
        clock.now() - start,
        dl_a.status_get(),
        dl_b.status_get(),
    );
}

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    match &args.command {
        Command::Serial { port, baud_rate, send_interval_ms } => {
            run_serial(&args, port.clone(), *baud_rate, *send_interval_ms);
        }
        Command::Loopback {
            messages,
            seed,
            drop_probability,
            duplicate_probability,
            corrupt_probability,
        } => {
            run_loopback(&args, *messages, *seed, *drop_probability, *duplicate_probability, *corrupt_probability);
        }
    }
}
