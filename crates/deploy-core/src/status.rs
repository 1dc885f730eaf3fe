//! Operator-facing status lines.

/// Receives human-readable progress while a deployment is being requested.
pub trait StatusSink: Send + Sync {
    fn line(&self, message: &str);
}

/// Prints each line to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl StatusSink for StdoutSink {
    fn line(&self, message: &str) {
        println!("{}", message);
    }
}

/// Discards everything; used when stdout is reserved for machine-readable output.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSink;

impl StatusSink for SilentSink {
    fn line(&self, _message: &str) {}
}
