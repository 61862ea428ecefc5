use serialport::{ClearBuffer, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;

/// Logic level on a digital output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn inverted(self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UartError {
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Byte-level UART access as the sweep engine sees it.
///
/// Reads may return fewer bytes than requested; the collector relies on
/// single-byte reads anyway because framing at a wrong baudrate is
/// unpredictable.
pub trait UartPort {
    /// Reconfigure the line speed. Must leave no stale bytes behind.
    fn configure(&mut self, baudrate: u32) -> Result<(), UartError>;

    /// Number of bytes waiting in the receive buffer.
    fn bytes_available(&mut self) -> Result<usize, UartError>;

    /// Read up to `n` bytes without blocking on more.
    fn receive(&mut self, n: usize) -> Result<Vec<u8>, UartError>;

    fn transmit(&mut self, bytes: &[u8]) -> Result<(), UartError>;

    /// Discard everything buffered on the receive side.
    fn flush_input(&mut self) -> Result<(), UartError>;
}

/// Digital output driving the target's reset line.
pub trait ResetLine {
    fn set_level(&mut self, level: Level) -> Result<(), UartError>;
}

/// `UartPort` backed by a real serial device.
#[derive(Debug)]
pub struct SerialUart {
    serial: Box<dyn SerialPort>,
}

impl SerialUart {
    /// Open a serial device at an initial baudrate.
    pub fn open(path: &str, baudrate: u32) -> Result<Self, UartError> {
        let serial = serialport::new(path, baudrate)
            .timeout(Duration::from_millis(10))
            .open()?;

        let mut port = Self { serial };
        port.flush_input()?;
        Ok(port)
    }

    /// Clone the underlying handle, e.g. to drive its control lines.
    pub fn try_clone_handle(&self) -> Result<Box<dyn SerialPort>, UartError> {
        Ok(self.serial.try_clone()?)
    }
}

impl UartPort for SerialUart {
    fn configure(&mut self, baudrate: u32) -> Result<(), UartError> {
        // Drain before switching speed, then clear whatever the driver
        // buffered during the switch. Stale bytes from the previous rate
        // would corrupt the entropy of the next sample.
        self.flush_input()?;
        self.serial.set_baud_rate(baudrate)?;
        self.flush_input()?;
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize, UartError> {
        Ok(self.serial.bytes_to_read()? as usize)
    }

    fn receive(&mut self, n: usize) -> Result<Vec<u8>, UartError> {
        let pending = self.bytes_available()?.min(n);
        let mut buf = vec![0u8; pending];
        if pending > 0 {
            self.serial.read_exact(&mut buf)?;
        }
        Ok(buf)
    }

    fn transmit(&mut self, bytes: &[u8]) -> Result<(), UartError> {
        self.serial.write_all(bytes)?;
        Ok(())
    }

    fn flush_input(&mut self) -> Result<(), UartError> {
        self.serial.clear(ClearBuffer::Input)?;
        let pending = self.serial.bytes_to_read()? as usize;
        if pending > 0 {
            let mut sink = vec![0u8; pending];
            self.serial.read_exact(&mut sink)?;
        }
        Ok(())
    }
}

/// Which modem control line drives the target's reset input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlLine {
    Rts,
    Dtr,
}

/// `ResetLine` driving RTS or DTR on a cloned handle of the data port.
///
/// Most USB-serial adapters break these out, and many dev boards wire one
/// of them to the MCU reset input.
pub struct ControlLineReset {
    serial: Box<dyn SerialPort>,
    line: ControlLine,
}

impl ControlLineReset {
    pub fn new(port: &SerialUart, line: ControlLine) -> Result<Self, UartError> {
        Ok(Self {
            serial: port.try_clone_handle()?,
            line,
        })
    }
}

impl ResetLine for ControlLineReset {
    fn set_level(&mut self, level: Level) -> Result<(), UartError> {
        let asserted = level == Level::High;
        match self.line {
            ControlLine::Rts => self.serial.write_request_to_send(asserted)?,
            ControlLine::Dtr => self.serial.write_data_terminal_ready(asserted)?,
        }
        Ok(())
    }
}
