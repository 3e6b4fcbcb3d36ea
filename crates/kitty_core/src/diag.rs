//! # Diagnostic Sinks
//!
//! `stat` and `dump_addresses` style reports are written line by line to a
//! [`DiagnosticSink`]. On the board this is the serial port; on the host it is
//! the tracing pipeline or a plain vector in tests.

/// A line-oriented diagnostic output.
pub trait DiagnosticSink {
    /// Writes one complete line (without trailing newline).
    fn line(&mut self, line: &str);
}

/// Sink that forwards every line to `tracing` at info level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn line(&mut self, line: &str) {
        tracing::info!(target: "kitty::diag", "{line}");
    }
}

impl DiagnosticSink for Vec<String> {
    fn line(&mut self, line: &str) {
        self.push(line.to_owned());
    }
}
