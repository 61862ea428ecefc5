//! Command-line baudrate detection.

use baudscan::{
    parse_hex_bytes, BaudSweeper, ConfigError, ConsoleReporter, ControlLine, ControlLineReset,
    RateSource, ResetPolarity, ResetPolicy, SerialUart, SweepConfig, TriggerPolicy,
};
use clap::{Parser, ValueEnum};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Sweep from --min to --max in steps of --step.
    Incremental,
    /// Try the rates given with --rates, in order.
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ResetLineArg {
    Rts,
    Dtr,
}

/// Detect the baudrate of an unknown UART target by entropy analysis.
#[derive(Debug, Parser)]
#[command(name = "baudscan", version, about)]
struct Args {
    /// Serial device, e.g. /dev/ttyUSB0
    #[arg(short, long)]
    port: String,

    /// Sweep strategy
    #[arg(short, long, value_enum, default_value = "incremental")]
    mode: Mode,

    /// Minimum baudrate (incremental mode)
    #[arg(long, default_value_t = 300)]
    min: u32,

    /// Maximum baudrate, excluded (incremental mode)
    #[arg(long, default_value_t = 115_200)]
    max: u32,

    /// Baudrate increment (incremental mode)
    #[arg(long, default_value_t = 300)]
    step: u32,

    /// Comma-separated baudrates (list mode)
    #[arg(long, default_value = "9600,19200,38400,57600,115200")]
    rates: String,

    /// Bytes to sample per candidate rate
    #[arg(long, default_value_t = 10)]
    sample_size: usize,

    /// Only print results with at least this entropy
    #[arg(long)]
    min_entropy: Option<f64>,

    /// Let the entropy filter also gate acceptance, so a low-entropy sample
    /// does not end the sweep
    #[arg(long, requires = "min_entropy")]
    require_min_entropy: bool,

    /// Send trigger bytes when the target stays silent
    #[arg(long)]
    trigger: bool,

    /// Trigger bytes as raw hex without 0x, e.g. 0D0A
    #[arg(long, default_value = "0D0A")]
    trigger_bytes: String,

    /// Control line wired to the target's reset input
    #[arg(long, value_enum)]
    reset_line: Option<ResetLineArg>,

    /// Reset polarity: low (active-low) or high
    #[arg(long, default_value = "low")]
    reset_pol: String,

    /// Reset hold time in seconds
    #[arg(long, default_value_t = 0.1)]
    reset_hold: f64,

    /// Wait after reset release in seconds
    #[arg(long, default_value_t = 0.5)]
    reset_delay: f64,
}

fn build_config(args: &Args) -> Result<SweepConfig, ConfigError> {
    let rates = match args.mode {
        Mode::Incremental => RateSource::incremental(args.min, args.max, args.step)?,
        Mode::List => RateSource::parse_list(&args.rates)?,
    };

    let mut config = SweepConfig::new(rates);
    config.sample_size = args.sample_size;
    config.min_entropy = args.min_entropy;
    config.require_min_entropy = args.require_min_entropy;

    if args.trigger {
        config.trigger = Some(TriggerPolicy {
            bytes: parse_hex_bytes(&args.trigger_bytes)?,
            ..TriggerPolicy::default()
        });
    }

    if args.reset_line.is_some() {
        config.reset = Some(ResetPolicy {
            polarity: args.reset_pol.parse::<ResetPolarity>()?,
            hold: Duration::from_secs_f64(args.reset_hold),
            delay: Duration::from_secs_f64(args.reset_delay),
        });
    }

    Ok(config)
}

fn run(args: &Args) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = match build_config(args) {
        Ok(config) => config,
        Err(err) => {
            log::error!("{err}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let port = SerialUart::open(&args.port, 9600)?;

    // Clone the control-line handle before the sweeper takes the port.
    let reset = match args.reset_line {
        Some(ResetLineArg::Rts) => Some(ControlLineReset::new(&port, ControlLine::Rts)?),
        Some(ResetLineArg::Dtr) => Some(ControlLineReset::new(&port, ControlLine::Dtr)?),
        None => None,
    };

    let mut sweeper = BaudSweeper::new(Box::new(port), config);
    if let Some(reset) = reset {
        sweeper = sweeper.with_reset(Box::new(reset));
    }

    let cancel = sweeper.cancel_token();
    ctrlc::set_handler(move || cancel.cancel())?;

    println!("Starting baudrate detection, turn on your target device now");
    println!("Press Ctrl+C to cancel");

    let outcome = sweeper.run(&mut ConsoleReporter::new())?;

    if outcome.cancelled {
        println!("Sweep cancelled");
    } else {
        match outcome.detected {
            Some(rate) => println!("Detected baudrate: {rate}"),
            None => println!("No candidate baudrate produced data"),
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(code) => code,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
