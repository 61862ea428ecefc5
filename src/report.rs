//! Result formatting and the reporting seam.

use std::io::Write;

/// Render every byte as a `\xNN` escape, e.g. `0x0D` becomes `\x0d`.
pub fn hex_escape(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 4);
    for b in bytes {
        out.push_str(&format!("\\x{b:02x}"));
    }
    out
}

/// Single-character rendering of a received byte for live progress.
///
/// Printable ASCII is shown as-is, everything else as a hex escape.
pub fn byte_glyph(b: u8) -> String {
    if b.is_ascii() && !b.is_ascii_control() {
        (b as char).to_string()
    } else {
        format!("0x{b:02x}")
    }
}

/// The per-candidate result line.
pub fn format_result(baudrate: u32, entropy: f64, sample: &[u8]) -> String {
    format!(
        "Baudrate value: {} - Entropy: {:.3} (Got: {})",
        baudrate,
        entropy,
        hex_escape(sample)
    )
}

/// Sink for sweep output: accepted result lines and live per-byte progress.
pub trait Reporter {
    /// Emit an accepted result line.
    fn result(&mut self, line: &str);

    /// Update the live progress display with the latest received byte.
    fn progress(&mut self, glyph: &str);
}

/// Reporter writing results to stdout and progress as an in-place line.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    progress_active: bool,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn end_progress_line(&mut self) {
        if self.progress_active {
            println!();
            self.progress_active = false;
        }
    }
}

impl Reporter for ConsoleReporter {
    fn result(&mut self, line: &str) {
        self.end_progress_line();
        println!("{line}");
    }

    fn progress(&mut self, glyph: &str) {
        print!("\rReading bytes: {glyph}   ");
        let _ = std::io::stdout().flush();
        self.progress_active = true;
    }
}

impl Drop for ConsoleReporter {
    fn drop(&mut self) {
        self.end_progress_line();
    }
}
