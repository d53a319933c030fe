//! Output channel adapter: buffered capture around engine evaluation.
//!
//! The engine writes command output into a caller-managed byte buffer and
//! guarantees no terminator, so the adapter must pre-zero the buffer before
//! every evaluation and detect truncation byte-exactly afterwards: output was
//! truncated iff the last byte of the buffer is nonzero once the engine
//! returns (the zero run never arrived before the buffer was exhausted).
//!
//! After a successful evaluation the adapter can optionally issue a
//! `lasterror` diagnostic query. The evaluation status code only reports
//! *protocol* failure; a forwarded command with a script-level fault still
//! returns status 0, and the fault is only visible in the engine's own
//! diagnostic state. When the extracted diagnostic message is non-empty it
//! replaces the captured output and flags it as an error.

use regex::Regex;

use crate::config::Settings;
use crate::engine::Engine;

// ── EvalOutcome ───────────────────────────────────────────────────────────────

/// The result of one buffered evaluation.
#[derive(Debug, Clone, Default)]
pub struct EvalOutcome {
    /// Protocol-level success. `false` means the engine itself failed or is
    /// gone, which is fatal to the session.
    pub success: bool,
    /// Captured textual output (or the extracted diagnostic message).
    pub output: String,
    /// `true` when `output` is an error message rather than command output.
    pub output_is_error: bool,
    /// `true` when the capture buffer filled before the output ended.
    pub output_truncated: bool,
}

// ── OutputChannel ─────────────────────────────────────────────────────────────

/// Fixed-capacity capture buffer bound to the engine for each evaluation.
///
/// The buffer is owned here rather than allocated per call so that repeated
/// commands do not churn the allocator; it is resized lazily when the
/// configured capacity changes between commands.
pub struct OutputChannel {
    buffer: Vec<u8>,
    /// Matches the diagnostic report's `message: '…'` field. The quoted text
    /// is the first quote-delimited run after the `message:` tag.
    message_re: Regex,
}

impl Default for OutputChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputChannel {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            // The pattern cannot fail to compile; panicking here would be a
            // programming error caught by every test.
            message_re: Regex::new(r"message:[^']*'([^']*)'").unwrap(),
        }
    }

    /// Evaluate `command` with buffered capture according to `settings`.
    ///
    /// Buffer allocation failures are reported through `alerts` and disable
    /// capture for this call only; they do not fail the evaluation.
    pub fn evaluate(
        &mut self,
        engine: &mut dyn Engine,
        settings: &Settings,
        command: &str,
        alerts: &mut Vec<String>,
    ) -> EvalOutcome {
        // Check the configured size before every command so a settings change
        // does not require restarting the session.
        let mut capacity = settings.output_buffer_size;
        if capacity > 0 && self.buffer.len() != capacity {
            if resize_zeroed(&mut self.buffer, capacity).is_err() {
                capacity = 0;
                alerts.push(format!(
                    "Unable to allocate buffer of {} bytes",
                    settings.output_buffer_size
                ));
            }
        }

        let status = if capacity == 0 {
            self.buffer.clear();
            engine.evaluate(command, None)
        } else {
            zero(&mut self.buffer);
            engine.evaluate(command, Some(&mut self.buffer))
        };

        let (output, output_truncated) = take_output(&mut self.buffer);
        let mut outcome = EvalOutcome {
            success: status == 0,
            output,
            output_is_error: false,
            output_truncated,
        };

        // The status code does not reflect script-level faults; ask the
        // engine's diagnostic state when configured to.
        if status == 0 && !self.buffer.is_empty() && settings.check_errors {
            zero(&mut self.buffer);
            if engine.evaluate("lasterror", Some(&mut self.buffer)) == 0 {
                let (report, report_truncated) = take_output(&mut self.buffer);
                if let Some(message) = self.extract_message(&report) {
                    outcome.output = message;
                    outcome.output_is_error = true;
                    outcome.output_truncated = report_truncated;
                }
            }
        }

        if status == 0 && settings.clear_errors {
            engine.evaluate("lasterror('reset');", None);
        }

        outcome
    }

    /// Evaluate without any output capture. Returns protocol success.
    pub fn evaluate_quiet(&mut self, engine: &mut dyn Engine, command: &str) -> bool {
        engine.evaluate(command, None) == 0
    }

    /// Pull the quoted `message:` text out of a diagnostic report.
    /// `None` when the field is missing or its trimmed text is empty; the
    /// field may be absent entirely if the user reassigned the diagnostic
    /// variable.
    fn extract_message(&self, report: &str) -> Option<String> {
        let text = self.message_re.captures(report)?.get(1)?.as_str().trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_owned())
        }
    }
}

// ── Buffer helpers ────────────────────────────────────────────────────────────

/// Resize `buf` to exactly `capacity` zero bytes, without aborting on
/// allocation failure.
fn resize_zeroed(buf: &mut Vec<u8>, capacity: usize) -> Result<(), std::collections::TryReserveError> {
    buf.clear();
    buf.try_reserve_exact(capacity)?;
    buf.resize(capacity, 0);
    Ok(())
}

fn zero(buf: &mut [u8]) {
    for b in buf.iter_mut() {
        *b = 0;
    }
}

/// Extract the captured output and the truncation flag.
///
/// An empty buffer or a zero first byte means no output. A nonzero last byte
/// means the engine exhausted the buffer: force it to zero (losing one byte)
/// and flag truncation, since no terminator ever arrived.
fn take_output(buf: &mut Vec<u8>) -> (String, bool) {
    if buf.is_empty() || buf[0] == 0 {
        return (String::new(), false);
    }

    let truncated = match buf.last_mut() {
        Some(last) if *last != 0 => {
            *last = 0;
            true
        }
        _ => false,
    };

    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    (String::from_utf8_lossy(&buf[..end]).into_owned(), truncated)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
