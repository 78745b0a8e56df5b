use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, ensure, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::info;

use acia_link::{loopback, port, Attach, HostDriver, Link, PeerWire, PortAcia, PortWriter};
use drv_acia::{BusyWaiting, DriverStats, Interrupt, BUFFER_SIZE};

#[derive(Parser)]
#[command(name = "acia-link", version, about = "Line-oriented serial link over an ACIA driver")]
struct Cli {
    /// Serial port device (e.g. /dev/ttyUSB0)
    #[arg(short, long, global = true)]
    port: Option<String>,

    #[arg(short, long, default_value_t = 115_200, global = true)]
    baud: u32,

    /// How the driver waits on the device
    #[arg(short, long, value_enum, default_value_t = Mode::Interrupt, global = true)]
    mode: Mode,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Busy,
    Interrupt,
}

#[derive(Subcommand)]
enum Command {
    /// List serial ports
    Ports,
    /// Send one message
    Send { message: String },
    /// Print received lines
    Receive {
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },
    /// Send PING and wait for the reply
    Ping,
    /// Print received lines until interrupted
    Listen,
    /// Send every received line back
    Echo,
    /// Exchange messages between two loopback drivers
    Selftest,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    match cli.mode {
        Mode::Busy => run::<BusyWaiting>(&cli),
        Mode::Interrupt => run::<Interrupt>(&cli),
    }
}

fn run<D: Attach>(cli: &Cli) -> Result<()> {
    let mut line = [0u8; BUFFER_SIZE];
    match &cli.command {
        Command::Ports => {
            let ports = port::list_ports()?;
            if ports.is_empty() {
                println!("No serial ports found");
            }
            for name in ports {
                println!("{}", name);
            }
            Ok(())
        }
        Command::Send { message } => with_port::<D>(cli, |link| {
            let sent = link
                .driver()
                .try_send(message.as_bytes())
                .map_err(anyhow::Error::msg)?;
            println!("sent {} bytes", sent);
            Ok(())
        }),
        Command::Receive { count } => with_port::<D>(cli, |link| {
            for _ in 0..*count {
                let n = link.receive(&mut line);
                println!("{}", String::from_utf8_lossy(&line[..n]));
            }
            Ok(())
        }),
        Command::Ping => with_port::<D>(cli, |link| {
            let start = Instant::now();
            link.send(b"PING");
            let n = link.receive(&mut line);
            println!("{} in {:?}", String::from_utf8_lossy(&line[..n]), start.elapsed());
            Ok(())
        }),
        Command::Listen => with_port::<D>(cli, |link| loop {
            let n = link.receive(&mut line);
            println!("{}", String::from_utf8_lossy(&line[..n]));
        }),
        Command::Echo => with_port::<D>(cli, |link| loop {
            let n = link.receive(&mut line);
            link.send(&line[..n]);
        }),
        Command::Selftest => selftest::<D>(),
    }
}

/// Open the port named on the command line, run `session` on it and tear the
/// link down again.
fn with_port<D: Attach>(
    cli: &Cli,
    session: impl FnOnce(&Link<PortWriter, D>) -> Result<()>,
) -> Result<()> {
    let path = cli.port.as_deref().context("--port is required for this command")?;
    let (acia, events, pump) = port::open_port(path, cli.baud)?;
    let link = Link::<PortWriter, D>::open((acia, events))?;
    on_ctrlc(Arc::clone(link.driver()))?;

    let result = session(&link);
    let stats = link.close();
    pump.stop();
    report("port", &stats);
    result
}

fn on_ctrlc<D: Attach>(driver: Arc<HostDriver<PortAcia, D>>) -> Result<()> {
    ctrlc::set_handler(move || {
        report("port", &driver.stats());
        process::exit(130);
    })
    .context("Failed to set Ctrl-C handler")
}

fn report(name: &str, stats: &DriverStats) {
    println!(
        "{}: sent {} ({} truncated), received {} lines, dropped {} chars",
        name, stats.messages_sent, stats.truncated_sends, stats.lines_received, stats.dropped_chars
    );
}

fn selftest<D: Attach>() -> Result<()> {
    let (a, b) = loopback::pair();
    let left = Link::<PeerWire, D>::open(a)?;
    let right = Link::<PeerWire, D>::open(b)?;
    info!("selftest in {:?} mode", D::MODE);

    let got = exchange(&left, &right, b"PING")?;
    ensure!(got == b"PING", "expected PING, got {:?}", String::from_utf8_lossy(&got));
    println!("ping: ok");

    let got = exchange(&right, &left, b"PONG")?;
    ensure!(got == b"PONG", "expected PONG, got {:?}", String::from_utf8_lossy(&got));
    println!("reply: ok");

    let got = exchange(&left, &right, b"")?;
    ensure!(got.is_empty(), "expected an empty line, got {} bytes", got.len());
    println!("empty line: ok");

    let long = [b'x'; BUFFER_SIZE + 44];
    let got = exchange(&left, &right, &long)?;
    ensure!(
        got.len() == BUFFER_SIZE - 1,
        "expected truncation to {} bytes, got {}",
        BUFFER_SIZE - 1,
        got.len()
    );
    println!("truncation: ok");

    right.driver().hardware().registers().deliver(b"OK\n");
    let mut line = [0u8; 32];
    let n = right.receive(&mut line);
    ensure!(&line[..n] == b"OK", "expected OK, got {:?}", String::from_utf8_lossy(&line[..n]));
    println!("raw line: ok");

    report("left", &left.close());
    report("right", &right.close());
    Ok(())
}

/// Send `message` from one end and return the line the other end receives.
fn exchange<D: Attach>(
    from: &Link<PeerWire, D>,
    to: &Link<PeerWire, D>,
    message: &[u8],
) -> Result<Vec<u8>> {
    thread::scope(|s| {
        let receiver = s.spawn(|| {
            let mut line = [0u8; BUFFER_SIZE];
            let n = to.receive(&mut line);
            line[..n].to_vec()
        });
        from.send(message);
        receiver.join().map_err(|_| anyhow!("receiver thread panicked"))
    })
}
