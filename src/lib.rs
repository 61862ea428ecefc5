//! # baudscan
//!
//! A Rust library for detecting the baudrate of an unknown UART target.
//!
//! The library sweeps a set of candidate baudrates, reads a small sample of
//! bytes at each rate and scores the sample's Shannon entropy. A matching
//! rate yields structured, low-entropy data; a mismatched rate yields
//! framing garbage whose entropy approaches 8 bits per byte.
//!
//! ## Features
//!
//! - **Cross-platform transport**: Uses `serialport` for the UART side
//! - **Two sweep strategies**: Incremental range or an explicit rate list
//! - **Target stimulation**: Optional trigger bytes for silent targets and
//!   an optional reset pulse over RTS/DTR before each candidate
//! - **Entropy filtering**: Hide noisy results below a threshold
//! - **Type safety**: Strong typing and error handling throughout
//!
//! ## Examples
//!
//! ### Sweeping a rate list
//!
//! ```rust,no_run
//! use baudscan::{BaudSweeper, ConsoleReporter, RateSource, SerialUart, SweepConfig};
//!
//! let port = SerialUart::open("/dev/ttyUSB0", 9600)?;
//! let config = SweepConfig::new(RateSource::parse_list("9600,19200,38400,57600,115200")?);
//!
//! let mut sweeper = BaudSweeper::new(Box::new(port), config);
//! let outcome = sweeper.run(&mut ConsoleReporter::new())?;
//!
//! match outcome.detected {
//!     Some(rate) => println!("Target talks at {rate} baud"),
//!     None => println!("No candidate produced data"),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Incremental sweep with trigger and reset
//!
//! ```rust,no_run
//! use baudscan::{
//!     BaudSweeper, ConsoleReporter, ControlLine, ControlLineReset, RateSource, ResetPolicy,
//!     SerialUart, SweepConfig, TriggerPolicy,
//! };
//!
//! let port = SerialUart::open("/dev/ttyUSB0", 9600)?;
//! let reset = ControlLineReset::new(&port, ControlLine::Dtr)?;
//!
//! let mut config = SweepConfig::new(RateSource::incremental(300, 115_200, 300)?);
//! config.trigger = Some(TriggerPolicy::default()); // CR LF on stall
//! config.reset = Some(ResetPolicy::default());     // active-low, 100ms hold
//! config.min_entropy = Some(1.0);
//!
//! let mut sweeper = BaudSweeper::new(Box::new(port), config).with_reset(Box::new(reset));
//! let outcome = sweeper.run(&mut ConsoleReporter::new())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Cancelling from a signal handler
//!
//! ```rust,no_run
//! use baudscan::{BaudSweeper, ConsoleReporter, RateSource, SerialUart, SweepConfig};
//!
//! let port = SerialUart::open("/dev/ttyUSB0", 9600)?;
//! let config = SweepConfig::new(RateSource::parse_list("9600,115200")?);
//! let mut sweeper = BaudSweeper::new(Box::new(port), config);
//!
//! let cancel = sweeper.cancel_token();
//! ctrlc::set_handler(move || cancel.cancel())?;
//!
//! let outcome = sweeper.run(&mut ConsoleReporter::new())?;
//! if outcome.cancelled {
//!     println!("Sweep interrupted");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod collector;
pub mod entropy;
pub mod port;
pub mod report;
pub mod sweep;

// Re-export the main types for convenience
pub use collector::{CancelToken, Collection, SampleCollector, TriggerPolicy};

pub use entropy::shannon_entropy;

pub use port::{ControlLine, ControlLineReset, Level, ResetLine, SerialUart, UartError, UartPort};

pub use report::{byte_glyph, format_result, hex_escape, ConsoleReporter, Reporter};

pub use sweep::{
    BaudSweeper, ConfigError, parse_hex_bytes, RateSource, ResetPolarity, ResetPolicy,
    SweepConfig, SweepOutcome, SweepResult, SweepStatus,
};
