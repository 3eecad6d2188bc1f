/// Abstraction over user-facing output.
///
/// Command modules use this trait instead of `println!`/`eprintln!` so that
/// output can be captured in tests.
pub trait UserOutput: Send + Sync {
    /// Informational status message (e.g., "Starting topology 'shop'...")
    fn status(&self, message: &str);

    /// Success message (e.g., "Topology is ready")
    fn success(&self, message: &str);

    /// Warning message (e.g., "Service 'api' will not start")
    fn warning(&self, message: &str);

    /// Error message
    fn error(&self, message: &str);

    /// A blank line separator.
    fn blank(&self);
}

/// Standard CLI output: writes to stdout/stderr with ANSI colors.
pub struct CliOutput;

impl UserOutput for CliOutput {
    fn status(&self, message: &str) {
        println!("{}", message);
    }

    fn success(&self, message: &str) {
        println!("\x1b[32m{}\x1b[0m", message);
    }

    fn warning(&self, message: &str) {
        eprintln!("\x1b[33m{}\x1b[0m", message);
    }

    fn error(&self, message: &str) {
        eprintln!("\x1b[31m{}\x1b[0m", message);
    }

    fn blank(&self) {
        println!();
    }
}

/// Collects every message; for tests.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingOutput {
    lines: parking_lot::Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingOutput {
    pub fn text(&self) -> String {
        self.lines.lock().join("\n")
    }

    fn push(&self, message: &str) {
        self.lines.lock().push(message.to_string());
    }
}

#[cfg(test)]
impl UserOutput for RecordingOutput {
    fn status(&self, message: &str) {
        self.push(message);
    }
    fn success(&self, message: &str) {
        self.push(message);
    }
    fn warning(&self, message: &str) {
        self.push(message);
    }
    fn error(&self, message: &str) {
        self.push(message);
    }
    fn blank(&self) {
        self.push("");
    }
}
