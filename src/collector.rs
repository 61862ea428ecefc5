//! Fixed-size sample collection with trigger-on-stall retries.

use crate::port::{UartError, UartPort};
use crate::report::{byte_glyph, Reporter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Cooperative cancellation flag, shared with e.g. a Ctrl+C handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Stimulus sent to a silent target to provoke output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerPolicy {
    /// Bytes transmitted on each trigger attempt.
    pub bytes: Vec<u8>,
    /// Trigger attempts allowed per candidate rate.
    pub max_retries: u32,
    /// Wait after transmitting, before polling again.
    pub settle: Duration,
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        Self {
            bytes: vec![0x0d, 0x0a],
            max_retries: 3,
            settle: Duration::from_millis(200),
        }
    }
}

/// Outcome of collecting one sample at one candidate rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collection {
    /// The full sample was read.
    Sample(Vec<u8>),
    /// No byte arrived within the timeout and the retry budget is spent.
    TimedOut,
    /// An external interrupt stopped the collection.
    Cancelled,
}

/// Reads a fixed-size sample from a port, one byte at a time.
///
/// Bytes are read individually because framing at a wrong baudrate is
/// unpredictable; a bulk read could swallow a burst containing framing
/// artifacts and skew the sample.
#[derive(Debug, Clone)]
pub struct SampleCollector {
    /// Bytes required before the sample is scored.
    pub threshold: usize,
    /// How long to wait for each byte before declaring a stall.
    pub byte_timeout: Duration,
    /// Stimulus to send on stall, if any.
    pub trigger: Option<TriggerPolicy>,
}

impl Default for SampleCollector {
    fn default() -> Self {
        Self {
            threshold: 10,
            byte_timeout: Duration::from_secs(1),
            trigger: None,
        }
    }
}

impl SampleCollector {
    const POLL_INTERVAL: Duration = Duration::from_millis(1);

    /// Collect `threshold` bytes from `port`.
    ///
    /// Each received byte resets the stall counter and is echoed to the
    /// reporter's progress line. A stall transmits the trigger bytes while
    /// the retry budget lasts, then the collection times out. Timeouts are
    /// per-candidate events, not errors; only transport failures are.
    pub fn collect(
        &self,
        port: &mut dyn UartPort,
        reporter: &mut dyn Reporter,
        cancel: &CancelToken,
    ) -> Result<Collection, UartError> {
        let mut sample = Vec::with_capacity(self.threshold);
        let mut retries = 0u32;

        while sample.len() < self.threshold {
            if cancel.is_cancelled() {
                return Ok(Collection::Cancelled);
            }
            if self.wait_for_byte(port, cancel)? {
                let bytes = port.receive(1)?;
                let Some(&byte) = bytes.first() else {
                    // Reported byte vanished before the read; poll again.
                    continue;
                };
                reporter.progress(&byte_glyph(byte));
                sample.push(byte);
                retries = 0;
            } else if cancel.is_cancelled() {
                return Ok(Collection::Cancelled);
            } else if let Some(trigger) = self.trigger.as_ref().filter(|t| retries < t.max_retries)
            {
                retries += 1;
                log::info!("Triggering the device");
                port.transmit(&trigger.bytes)?;
                thread::sleep(trigger.settle);
            } else {
                return Ok(Collection::TimedOut);
            }
        }

        Ok(Collection::Sample(sample))
    }

    /// Poll availability for up to `byte_timeout`.
    fn wait_for_byte(
        &self,
        port: &mut dyn UartPort,
        cancel: &CancelToken,
    ) -> Result<bool, UartError> {
        let start = Instant::now();
        loop {
            if port.bytes_available()? > 0 {
                return Ok(true);
            }
            if cancel.is_cancelled() || start.elapsed() >= self.byte_timeout {
                return Ok(false);
            }
            thread::sleep(Self::POLL_INTERVAL);
        }
    }
}
