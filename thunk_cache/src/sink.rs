//! Line-oriented diagnostic output.

/// Receives diagnostic text one line at a time.
pub trait DiagnosticSink {
    /// Emit one line (without a trailing newline).
    fn line(&mut self, text: &str);
}

impl DiagnosticSink for Vec<String> {
    fn line(&mut self, text: &str) {
        self.push(text.to_string());
    }
}

impl DiagnosticSink for String {
    fn line(&mut self, text: &str) {
        self.push_str(text);
        self.push('\n');
    }
}

/// Forwards each line to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn line(&mut self, text: &str) {
        tracing::debug!(target: "thunk_cache::dump", "{}", text);
    }
}
