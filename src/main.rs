// sofi-cli — stdin/stdout front end for the So-Fi acoustic modem.
//
// With --sender, each newline-terminated line of stdin becomes one packet.
// With --receiver, each received packet's payload is written to stdout
// followed by a newline. Grounded on the original's `sofinc.c` front end
// (getopt flag surface, Ctrl+C via a signal handler) translated to `clap`
// and `ctrlc`.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use clap::Parser;

use sofi::{Config, Modem, Packet, SofiError};

#[derive(Parser, Debug)]
#[command(name = "sofi-cli", about = "Acoustic M-FSK packet modem")]
struct Args {
    /// Enable the sender (plays packets read from stdin). Defaults to on if
    /// neither -S nor -R is given.
    #[arg(short = 'S', long)]
    sender: bool,

    /// Enable the receiver (prints decoded packets to stdout). Defaults to
    /// on if neither -S nor -R is given.
    #[arg(short = 'R', long)]
    receiver: bool,

    /// Symbols per second.
    #[arg(short = 'b', long, default_value_t = Config::default().baud)]
    baud: f32,

    /// Comma-separated symbol frequencies in Hz; count must be 2^symbol_width.
    #[arg(short = 'f', long, value_delimiter = ',')]
    frequencies: Option<Vec<f32>>,

    /// Audio sample rate in Hz.
    #[arg(short = 's', long, default_value_t = Config::default().sample_rate)]
    sample_rate: u32,

    /// Carrier-detect window length as a fraction of one symbol period.
    #[arg(short = 'w', long, default_value_t = Config::default().recv_window_factor)]
    window: f32,

    /// Interpacket silence gap, as a multiple of one symbol period.
    #[arg(short = 'g', long, default_value_t = Config::default().interpacket_gap_factor)]
    gap: f32,

    /// Largest payload accepted from a single stdin line, in bytes.
    #[arg(short = 'l', long, default_value_t = Config::default().max_message_length)]
    max_length: usize,

    /// Keep running (reading stdin / waiting on recv) after stdin EOF.
    #[arg(short = 'k', long)]
    keep_open: bool,

    /// Internal log verbosity, 0 (quiet) upward.
    #[arg(short = 'd', long, default_value_t = 0)]
    debug_level: u8,

    /// Bits per symbol; one of {1, 2, 4, 8}.
    #[arg(long, default_value_t = Config::default().symbol_width)]
    symbol_width: u32,
}

fn init_logging(debug_level: u8) {
    let level = match debug_level {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();
}

fn build_config(args: &Args) -> Result<Config> {
    let (sender, receiver) = if !args.sender && !args.receiver {
        (true, true)
    } else {
        (args.sender, args.receiver)
    };

    let symbol_freqs = match &args.frequencies {
        Some(freqs) => freqs.clone(),
        None => {
            let default = Config::default();
            if default.symbol_freqs.len() == (1usize << args.symbol_width) {
                default.symbol_freqs
            } else {
                bail!(
                    "no --frequencies given and the default table doesn't match --symbol-width {}",
                    args.symbol_width
                );
            }
        }
    };

    let config = Config {
        sample_rate: args.sample_rate,
        baud: args.baud,
        symbol_width: args.symbol_width,
        symbol_freqs,
        recv_window_factor: args.window,
        interpacket_gap_factor: args.gap,
        max_message_length: args.max_length,
        sender,
        receiver,
        debug_level: args.debug_level,
        ..Config::default()
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug_level);

    let config = build_config(&args)?;
    let max_length = config.max_message_length;
    let sender = config.sender;
    let receiver = config.receiver;

    let modem = Arc::new(Modem::init(config).context("failed to initialize modem")?);

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        let modem = modem.clone();
        ctrlc::set_handler(move || {
            log::info!("received interrupt, shutting down");
            shutdown.store(true, Ordering::Release);
            modem.request_shutdown();
        })
        .context("failed to install Ctrl+C handler")?;
    }

    let receiver_handle = if receiver {
        Some(spawn_receiver_loop(modem.clone(), shutdown.clone()))
    } else {
        None
    };

    if sender {
        run_sender_loop(&modem, max_length, args.keep_open, &shutdown)?;
    } else {
        // Receiver-only: block on the shutdown signal.
        while !shutdown.load(Ordering::Acquire) {
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
    }

    modem.request_shutdown();
    if let Some(handle) = receiver_handle {
        let _ = handle.join();
    }

    match Arc::try_unwrap(modem) {
        Ok(modem) => modem.destroy(),
        Err(_) => log::warn!("modem still has outstanding references at shutdown"),
    }
    Ok(())
}

/// Write each line of stdin as one packet, truncating oversized lines to
/// `max_length` before the `Packet` is constructed (spec.md §9: the length
/// byte and the transmitted payload must always agree).
fn run_sender_loop(modem: &Modem, max_length: usize, keep_open: bool, shutdown: &AtomicBool) -> Result<()> {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        if shutdown.load(Ordering::Acquire) {
            break;
        }
        let mut line = line.context("failed to read stdin")?;
        line.truncate(max_length);
        let packet = Packet::new(line.into_bytes());
        match modem.send(&packet) {
            Ok(()) => {}
            Err(SofiError::Cancelled) => break,
            Err(SofiError::ResourceUnavailable(msg)) => {
                log::warn!("send unavailable: {msg}");
            }
            Err(e) => return Err(e.into()),
        }
    }
    if keep_open {
        while !shutdown.load(Ordering::Acquire) {
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
    }
    Ok(())
}

/// Spawn a thread that prints every received packet's payload to stdout
/// until `Modem::recv` returns `Cancelled` (after `request_shutdown`) or an
/// unexpected error.
fn spawn_receiver_loop(modem: Arc<Modem>, shutdown: Arc<AtomicBool>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let stdout = io::stdout();
        loop {
            match modem.recv() {
                Ok(packet) => {
                    let mut out = stdout.lock();
                    let _ = out.write_all(packet.payload());
                    let _ = out.write_all(b"\n");
                    let _ = out.flush();
                }
                Err(SofiError::Cancelled) => return,
                Err(e) => {
                    log::error!("recv error: {e}");
                    return;
                }
            }
            if shutdown.load(Ordering::Acquire) {
                return;
            }
        }
    })
}
