//! Baudrate sweep engine.
//!
//! Walks a sequence of candidate rates, reconfiguring the port, optionally
//! pulsing the target's reset line, collecting a fixed-size sample and
//! scoring its entropy. The sweep stops at the first candidate that yields
//! a complete sample.

use crate::collector::{CancelToken, Collection, SampleCollector, TriggerPolicy};
use crate::entropy::shannon_entropy;
use crate::port::{Level, ResetLine, UartError, UartPort};
use crate::report::{format_result, Reporter};
use std::str::FromStr;
use std::thread;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid incremental range: min {min} must be below max {max}")]
    InvalidRange { min: u32, max: u32 },

    #[error("Invalid increment: step must be greater than zero")]
    InvalidStep,

    #[error("Baudrate must be greater than zero")]
    ZeroBaudrate,

    #[error("Empty or invalid baudrate list")]
    EmptyList,

    #[error("Invalid baudrate list entry: '{0}'")]
    InvalidListEntry(String),

    #[error("Invalid reset polarity '{0}'. Please use 'low' or 'high'")]
    InvalidPolarity(String),

    #[error("Invalid hex byte string: '{0}'")]
    InvalidHexBytes(String),
}

/// Where candidate rates come from.
///
/// Only obtainable through the validating constructors, so a source in
/// hand always generates a well-formed rate sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateSource {
    kind: RateKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RateKind {
    /// `min, min+step, min+2*step, ...` while below `max` (max excluded).
    Incremental { min: u32, max: u32, step: u32 },
    /// Explicit rates, tried in order.
    List(Vec<u32>),
}

impl RateSource {
    pub fn incremental(min: u32, max: u32, step: u32) -> Result<Self, ConfigError> {
        if step == 0 {
            return Err(ConfigError::InvalidStep);
        }
        if min == 0 {
            return Err(ConfigError::ZeroBaudrate);
        }
        if min >= max {
            return Err(ConfigError::InvalidRange { min, max });
        }
        Ok(Self {
            kind: RateKind::Incremental { min, max, step },
        })
    }

    /// Parse a comma-separated rate list, trimming whitespace per entry.
    pub fn parse_list(list: &str) -> Result<Self, ConfigError> {
        let entries: Vec<&str> = list
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .collect();
        if entries.is_empty() {
            return Err(ConfigError::EmptyList);
        }

        let mut rates = Vec::with_capacity(entries.len());
        for entry in entries {
            let rate: u32 = entry
                .parse()
                .map_err(|_| ConfigError::InvalidListEntry(entry.to_string()))?;
            if rate == 0 {
                return Err(ConfigError::ZeroBaudrate);
            }
            rates.push(rate);
        }
        Ok(Self {
            kind: RateKind::List(rates),
        })
    }

    /// Candidate rates in sweep order.
    pub fn rates(&self) -> Vec<u32> {
        match &self.kind {
            RateKind::Incremental { min, max, step } => {
                (*min..*max).step_by(*step as usize).collect()
            }
            RateKind::List(rates) => rates.clone(),
        }
    }
}

/// Which logic level resets the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPolarity {
    ActiveLow,
    ActiveHigh,
}

impl ResetPolarity {
    pub fn active_level(self) -> Level {
        match self {
            Self::ActiveLow => Level::Low,
            Self::ActiveHigh => Level::High,
        }
    }

    pub fn idle_level(self) -> Level {
        self.active_level().inverted()
    }
}

impl FromStr for ResetPolarity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::ActiveLow),
            "high" => Ok(Self::ActiveHigh),
            other => Err(ConfigError::InvalidPolarity(other.to_string())),
        }
    }
}

/// How to pulse the target's reset line before sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetPolicy {
    pub polarity: ResetPolarity,
    /// How long the active level is held.
    pub hold: Duration,
    /// Wait after release, giving the target time to boot and start talking.
    pub delay: Duration,
}

impl Default for ResetPolicy {
    fn default() -> Self {
        Self {
            polarity: ResetPolarity::ActiveLow,
            hold: Duration::from_millis(100),
            delay: Duration::from_millis(500),
        }
    }
}

/// Parse a raw hex string (no `0x` prefix) into bytes, e.g. "0D0A".
pub fn parse_hex_bytes(hex: &str) -> Result<Vec<u8>, ConfigError> {
    let hex = hex.trim();
    // The slicing below indexes by byte, so non-ASCII input must be
    // rejected here rather than left for `from_str_radix`.
    if hex.is_empty() || hex.len() % 2 != 0 || !hex.is_ascii() {
        return Err(ConfigError::InvalidHexBytes(hex.to_string()));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| ConfigError::InvalidHexBytes(hex.to_string()))
        })
        .collect()
}

/// Read-only sweep parameters, fixed before the sweep starts.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub rates: RateSource,
    /// Bytes to collect per candidate before scoring.
    pub sample_size: usize,
    /// Per-byte wait inside the collector.
    pub byte_timeout: Duration,
    pub trigger: Option<TriggerPolicy>,
    pub reset: Option<ResetPolicy>,
    /// When set, only results scoring at least this entropy are printed.
    pub min_entropy: Option<f64>,
    /// When true, the entropy filter also gates acceptance: a sample below
    /// `min_entropy` does not stop the sweep. The default matches the
    /// historical behavior, where the filter affects printing only and the
    /// first candidate yielding any data ends the sweep.
    pub require_min_entropy: bool,
}

impl SweepConfig {
    pub fn new(rates: RateSource) -> Self {
        Self {
            rates,
            sample_size: 10,
            byte_timeout: Duration::from_secs(1),
            trigger: None,
            reset: None,
            min_entropy: None,
            require_min_entropy: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepStatus {
    /// A full sample was collected at this rate.
    Success,
    /// The candidate timed out without producing data.
    NoData,
}

/// Per-candidate outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepResult {
    pub rate: u32,
    pub sample: Option<Vec<u8>>,
    pub entropy: Option<f64>,
    pub status: SweepStatus,
}

impl SweepResult {
    fn no_data(rate: u32) -> Self {
        Self {
            rate,
            sample: None,
            entropy: None,
            status: SweepStatus::NoData,
        }
    }
}

/// Outcome of a whole sweep.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SweepOutcome {
    /// One entry per candidate actually tried, in order.
    pub results: Vec<SweepResult>,
    /// The rate the sweep stopped on, if any produced a sample.
    pub detected: Option<u32>,
    /// True when an external interrupt cut the sweep short.
    pub cancelled: bool,
}

/// Drives the sweep. Owns the port and the reset line for its whole
/// lifetime; the flush-before-reconfigure ordering makes shared access
/// unsafe.
pub struct BaudSweeper {
    port: Box<dyn UartPort>,
    reset: Option<Box<dyn ResetLine>>,
    config: SweepConfig,
    cancel: CancelToken,
}

impl BaudSweeper {
    pub fn new(port: Box<dyn UartPort>, config: SweepConfig) -> Self {
        Self {
            port,
            reset: None,
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_reset(mut self, reset: Box<dyn ResetLine>) -> Self {
        self.reset = Some(reset);
        self
    }

    /// Token to cancel the sweep from a signal handler.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the sweep to completion, cancellation or the first candidate
    /// that yields a full sample.
    ///
    /// Reconfiguration failures are fatal and abort the sweep; timeouts are
    /// per-candidate and merely advance it.
    pub fn run(&mut self, reporter: &mut dyn Reporter) -> Result<SweepOutcome, UartError> {
        let collector = SampleCollector {
            threshold: self.config.sample_size,
            byte_timeout: self.config.byte_timeout,
            trigger: self.config.trigger.clone(),
        };

        if let (Some(reset), Some(policy)) = (self.reset.as_mut(), self.config.reset) {
            // Park the line at its idle level before the first candidate.
            reset.set_level(policy.polarity.idle_level())?;
        }

        let mut outcome = SweepOutcome::default();

        for rate in self.config.rates.rates() {
            if self.cancel.is_cancelled() {
                return self.cancel_cleanly(outcome);
            }

            log::debug!("Trying baudrate {rate}");
            if let Err(err) = self.port.configure(rate) {
                log::error!("Failed to reconfigure the port at {rate} baud: {err}");
                return Err(err);
            }

            self.pulse_reset()?;

            match collector.collect(self.port.as_mut(), reporter, &self.cancel)? {
                Collection::Cancelled => return self.cancel_cleanly(outcome),
                Collection::TimedOut => {
                    log::warn!("No data received using the following baudrate value: {rate}...");
                    outcome.results.push(SweepResult::no_data(rate));
                }
                Collection::Sample(sample) => {
                    let entropy = shannon_entropy(&sample);
                    let passes_filter = self.config.min_entropy.map_or(true, |min| entropy >= min);
                    if passes_filter {
                        reporter.result(&format_result(rate, entropy, &sample));
                    }

                    outcome.results.push(SweepResult {
                        rate,
                        sample: Some(sample),
                        entropy: Some(entropy),
                        status: SweepStatus::Success,
                    });

                    // First rate yielding any data ends the sweep; the
                    // entropy filter only gates printing unless acceptance
                    // gating was asked for explicitly.
                    if passes_filter || !self.config.require_min_entropy {
                        outcome.detected = Some(rate);
                        break;
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// Pulse the reset line per policy: active for `hold`, back to idle,
    /// then wait `delay` before sampling.
    fn pulse_reset(&mut self) -> Result<(), UartError> {
        let (Some(reset), Some(policy)) = (self.reset.as_mut(), self.config.reset) else {
            return Ok(());
        };

        log::info!("Attempting to reset the target..");
        reset.set_level(policy.polarity.active_level())?;
        thread::sleep(policy.hold);
        reset.set_level(policy.polarity.idle_level())?;
        thread::sleep(policy.delay);
        Ok(())
    }

    /// Leave the port flushed on interruption.
    fn cancel_cleanly(&mut self, mut outcome: SweepOutcome) -> Result<SweepOutcome, UartError> {
        log::info!("Sweep cancelled");
        self.port.flush_input()?;
        outcome.cancelled = true;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Reporter;
    use std::collections::HashMap;

    #[derive(Default)]
    struct PortStats {
        configured: Vec<u32>,
        flushes: usize,
    }

    /// Port serving a canned byte stream per configured baudrate. Activity
    /// is recorded through a shared handle since the sweeper takes the port
    /// by value.
    struct RatePort {
        streams: HashMap<u32, Vec<u8>>,
        current: Vec<u8>,
        stats: std::sync::Arc<std::sync::Mutex<PortStats>>,
    }

    impl RatePort {
        fn new(streams: HashMap<u32, Vec<u8>>) -> Self {
            Self {
                streams,
                current: Vec::new(),
                stats: std::sync::Arc::default(),
            }
        }

        fn silent() -> Self {
            Self::new(HashMap::new())
        }

        fn stats(&self) -> std::sync::Arc<std::sync::Mutex<PortStats>> {
            self.stats.clone()
        }
    }

    impl UartPort for RatePort {
        fn configure(&mut self, baudrate: u32) -> Result<(), UartError> {
            self.stats.lock().unwrap().configured.push(baudrate);
            self.current = self.streams.get(&baudrate).cloned().unwrap_or_default();
            Ok(())
        }

        fn bytes_available(&mut self) -> Result<usize, UartError> {
            Ok(self.current.len())
        }

        fn receive(&mut self, n: usize) -> Result<Vec<u8>, UartError> {
            let n = n.min(self.current.len());
            Ok(self.current.drain(..n).collect())
        }

        fn transmit(&mut self, _bytes: &[u8]) -> Result<(), UartError> {
            Ok(())
        }

        fn flush_input(&mut self) -> Result<(), UartError> {
            self.stats.lock().unwrap().flushes += 1;
            self.current.clear();
            Ok(())
        }
    }

    /// Port whose reconfiguration always fails.
    struct BrokenPort;

    impl UartPort for BrokenPort {
        fn configure(&mut self, _baudrate: u32) -> Result<(), UartError> {
            Err(UartError::Io(std::io::Error::other("line stuck")))
        }

        fn bytes_available(&mut self) -> Result<usize, UartError> {
            Ok(0)
        }

        fn receive(&mut self, _n: usize) -> Result<Vec<u8>, UartError> {
            Ok(Vec::new())
        }

        fn transmit(&mut self, _bytes: &[u8]) -> Result<(), UartError> {
            Ok(())
        }

        fn flush_input(&mut self) -> Result<(), UartError> {
            Ok(())
        }
    }

    /// Reset line recording every level transition through a shared handle.
    #[derive(Clone, Default)]
    struct SharedReset(std::sync::Arc<std::sync::Mutex<Vec<Level>>>);

    impl SharedReset {
        fn levels(&self) -> Vec<Level> {
            self.0.lock().unwrap().clone()
        }
    }

    impl ResetLine for SharedReset {
        fn set_level(&mut self, level: Level) -> Result<(), UartError> {
            self.0.lock().unwrap().push(level);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingReporter {
        results: Vec<String>,
    }

    impl Reporter for RecordingReporter {
        fn result(&mut self, line: &str) {
            self.results.push(line.to_string());
        }

        fn progress(&mut self, _glyph: &str) {}
    }

    fn fast_config(rates: RateSource) -> SweepConfig {
        let mut config = SweepConfig::new(rates);
        config.byte_timeout = Duration::from_millis(5);
        config
    }

    #[test]
    fn test_incremental_rates_exclude_max() {
        let rates = RateSource::incremental(300, 1200, 300).unwrap().rates();
        assert_eq!(rates, vec![300, 600, 900]);
    }

    #[test]
    fn test_incremental_rejects_bad_ranges() {
        assert!(matches!(
            RateSource::incremental(1200, 300, 300),
            Err(ConfigError::InvalidRange { .. })
        ));
        assert!(matches!(
            RateSource::incremental(300, 1200, 0),
            Err(ConfigError::InvalidStep)
        ));
        assert!(matches!(
            RateSource::incremental(0, 1200, 300),
            Err(ConfigError::ZeroBaudrate)
        ));
    }

    #[test]
    fn test_list_parsing_trims_whitespace() {
        let rates = RateSource::parse_list("9600, 19200,38400").unwrap().rates();
        assert_eq!(rates, vec![9600, 19200, 38400]);
    }

    #[test]
    fn test_list_parsing_rejects_garbage() {
        assert!(matches!(
            RateSource::parse_list(""),
            Err(ConfigError::EmptyList)
        ));
        assert!(matches!(
            RateSource::parse_list("9600,fast"),
            Err(ConfigError::InvalidListEntry(_))
        ));
        assert!(matches!(
            RateSource::parse_list("9600,0"),
            Err(ConfigError::ZeroBaudrate)
        ));
    }

    #[test]
    fn test_reset_polarity_from_str() {
        assert_eq!("low".parse::<ResetPolarity>().unwrap(), ResetPolarity::ActiveLow);
        assert_eq!("HIGH".parse::<ResetPolarity>().unwrap(), ResetPolarity::ActiveHigh);
        assert!(matches!(
            "both".parse::<ResetPolarity>(),
            Err(ConfigError::InvalidPolarity(_))
        ));
    }

    #[test]
    fn test_parse_hex_bytes() {
        assert_eq!(parse_hex_bytes("0D0A").unwrap(), vec![0x0d, 0x0a]);
        assert_eq!(parse_hex_bytes("41").unwrap(), vec![0x41]);
        assert!(parse_hex_bytes("0D0").is_err());
        assert!(parse_hex_bytes("zz").is_err());
        assert!(parse_hex_bytes("").is_err());
    }

    #[test]
    fn test_parse_hex_bytes_rejects_non_ascii() {
        // "0α0" is four bytes but three chars; slicing by byte index must
        // not be reachable for it.
        assert!(matches!(
            parse_hex_bytes("0α0"),
            Err(ConfigError::InvalidHexBytes(_))
        ));
        assert!(parse_hex_bytes("αβ").is_err());
    }

    #[test]
    fn test_sweep_halts_on_first_rate_with_data() {
        let mut streams = HashMap::new();
        streams.insert(9600, b"AAAAAAAAAA".to_vec());
        streams.insert(19200, b"BBBBBBBBBB".to_vec());
        let port = RatePort::new(streams);

        let config = fast_config(RateSource::parse_list("4800,9600,19200,38400").unwrap());
        let mut sweeper = BaudSweeper::new(Box::new(port), config);
        let mut reporter = RecordingReporter::default();

        let outcome = sweeper.run(&mut reporter).unwrap();

        assert_eq!(outcome.detected, Some(9600));
        assert!(!outcome.cancelled);
        // 4800 timed out, 9600 succeeded, later rates never tried.
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].status, SweepStatus::NoData);
        assert_eq!(outcome.results[1].status, SweepStatus::Success);
        assert_eq!(outcome.results[1].entropy, Some(0.0));
        assert_eq!(
            reporter.results,
            vec![
                "Baudrate value: 9600 - Entropy: 0.000 \
                 (Got: \\x41\\x41\\x41\\x41\\x41\\x41\\x41\\x41\\x41\\x41)"
            ]
        );
    }

    #[test]
    fn test_silent_port_exhausts_all_candidates() {
        let port = RatePort::silent();
        let stats = port.stats();
        let config = fast_config(RateSource::incremental(300, 1200, 300).unwrap());
        let mut sweeper = BaudSweeper::new(Box::new(port), config);
        let mut reporter = RecordingReporter::default();

        let outcome = sweeper.run(&mut reporter).unwrap();

        assert_eq!(stats.lock().unwrap().configured, vec![300, 600, 900]);
        assert_eq!(outcome.detected, None);
        assert_eq!(outcome.results.len(), 3);
        assert!(outcome
            .results
            .iter()
            .all(|r| r.status == SweepStatus::NoData));
        assert!(reporter.results.is_empty());
    }

    #[test]
    fn test_filtered_result_is_not_printed_but_still_halts() {
        let mut streams = HashMap::new();
        // Two distinct values, entropy 1.0, below the 3.0 filter.
        streams.insert(9600, b"ABABABABAB".to_vec());
        let port = RatePort::new(streams);

        let mut config = fast_config(RateSource::parse_list("9600,19200").unwrap());
        config.min_entropy = Some(3.0);
        let mut sweeper = BaudSweeper::new(Box::new(port), config);
        let mut reporter = RecordingReporter::default();

        let outcome = sweeper.run(&mut reporter).unwrap();

        assert!(reporter.results.is_empty());
        assert_eq!(outcome.detected, Some(9600));
        assert_eq!(outcome.results.len(), 1);
    }

    #[test]
    fn test_entropy_gating_keeps_sweeping_when_required() {
        let mut streams = HashMap::new();
        streams.insert(9600, b"ABABABABAB".to_vec());
        streams.insert(19200, b"qwertzuiop".to_vec());
        let port = RatePort::new(streams);

        let mut config = fast_config(RateSource::parse_list("9600,19200").unwrap());
        config.min_entropy = Some(3.0);
        config.require_min_entropy = true;
        let mut sweeper = BaudSweeper::new(Box::new(port), config);
        let mut reporter = RecordingReporter::default();

        let outcome = sweeper.run(&mut reporter).unwrap();

        // 9600 scored below the gate, so the sweep moved on to 19200.
        assert_eq!(outcome.detected, Some(19200));
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(reporter.results.len(), 1);
        assert!(reporter.results[0].starts_with("Baudrate value: 19200"));
    }

    #[test]
    fn test_reconfiguration_failure_aborts_sweep() {
        let config = fast_config(RateSource::parse_list("9600,19200").unwrap());
        let mut sweeper = BaudSweeper::new(Box::new(BrokenPort), config);
        let mut reporter = RecordingReporter::default();

        assert!(sweeper.run(&mut reporter).is_err());
    }

    #[test]
    fn test_active_low_reset_pulse_sequence() {
        let recorder = SharedReset::default();
        let mut config = fast_config(RateSource::parse_list("9600").unwrap());
        config.reset = Some(ResetPolicy {
            polarity: ResetPolarity::ActiveLow,
            hold: Duration::from_millis(1),
            delay: Duration::from_millis(1),
        });

        let mut sweeper = BaudSweeper::new(Box::new(RatePort::silent()), config)
            .with_reset(Box::new(recorder.clone()));
        let mut reporter = RecordingReporter::default();
        sweeper.run(&mut reporter).unwrap();

        // Parked high before the sweep, then pulsed low and released.
        assert_eq!(recorder.levels(), vec![Level::High, Level::Low, Level::High]);
    }

    #[test]
    fn test_active_high_reset_pulse_sequence() {
        let recorder = SharedReset::default();
        let mut config = fast_config(RateSource::parse_list("9600").unwrap());
        config.reset = Some(ResetPolicy {
            polarity: ResetPolarity::ActiveHigh,
            hold: Duration::from_millis(1),
            delay: Duration::from_millis(1),
        });

        let mut sweeper = BaudSweeper::new(Box::new(RatePort::silent()), config)
            .with_reset(Box::new(recorder.clone()));
        let mut reporter = RecordingReporter::default();
        sweeper.run(&mut reporter).unwrap();

        assert_eq!(recorder.levels(), vec![Level::Low, Level::High, Level::Low]);
    }

    #[test]
    fn test_cancelled_sweep_flushes_and_reports_partial_results() {
        let port = RatePort::silent();
        let stats = port.stats();
        let config = fast_config(RateSource::incremental(300, 1200, 300).unwrap());
        let mut sweeper = BaudSweeper::new(Box::new(port), config);
        let cancel = sweeper.cancel_token();
        cancel.cancel();
        let mut reporter = RecordingReporter::default();

        let outcome = sweeper.run(&mut reporter).unwrap();
        assert!(outcome.cancelled);
        assert!(outcome.results.is_empty());
        // The port is left flushed on interruption.
        assert!(stats.lock().unwrap().flushes >= 1);
    }
}
