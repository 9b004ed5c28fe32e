//! Diagnostics
//!
//! Debugging helpers shared by the other subsystems:
//! - Stack trace capture (bounded to [`TRACE_DEPTH`] frames)
//! - CRC-32 checksum (ISO-HDLC, zlib compatible)
//! - [`DiagnosticSink`], the injected output collaborator for non-fatal reports

use std::backtrace::{Backtrace, BacktraceStatus};

use tracing::{debug, warn};

use crate::error::IntegrityWarning;

/// Maximum number of frames captured by [`stack_trace`]
pub const TRACE_DEPTH: usize = 16;

/// Non-fatal diagnostic report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// An allocator was torn down with objects still outstanding
    Leak(IntegrityWarning),
    /// Captured call stack, innermost frame first
    StackTrace(Vec<String>),
}

/// Destination for diagnostics.
///
/// Components take an `Arc<dyn DiagnosticSink>` instead of writing to a
/// process-wide output, so tests and embedders decide where reports go.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, diagnostic: Diagnostic);
}

/// Default sink: forwards every diagnostic to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::Leak(warning) => {
                warn!(
                    allocator = %warning.allocator,
                    outstanding = warning.outstanding,
                    "{}",
                    warning
                );
            }
            Diagnostic::StackTrace(frames) => {
                debug!("[stack trace]>>>");
                for frame in &frames {
                    debug!("{}", frame);
                }
                debug!("<<<[stack trace]");
            }
        }
    }
}

/// Capture the caller's stack, at most [`TRACE_DEPTH`] frames.
///
/// Each entry is one frame; the source location, when known, is appended
/// after the symbol. Returns an empty list when the platform cannot unwind.
pub fn capture_stack_trace() -> Vec<String> {
    let trace = Backtrace::force_capture();
    if trace.status() != BacktraceStatus::Captured {
        return Vec::new();
    }
    parse_frames(&trace.to_string(), TRACE_DEPTH)
}

/// Capture the caller's stack and emit it to `sink`
pub fn stack_trace(sink: &dyn DiagnosticSink) {
    sink.emit(Diagnostic::StackTrace(capture_stack_trace()));
}

/// Split a rendered backtrace into frames.
///
/// Frame headers look like `  3: symbol`; continuation lines (`at file:line`)
/// belong to the preceding frame.
fn parse_frames(rendered: &str, limit: usize) -> Vec<String> {
    let mut frames: Vec<String> = Vec::new();

    for line in rendered.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let header = line
            .split_once(": ")
            .filter(|(index, _)| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()));

        match header {
            Some((_, symbol)) => {
                if frames.len() == limit {
                    break;
                }
                frames.push(symbol.to_string());
            }
            None => {
                if let Some(frame) = frames.last_mut() {
                    frame.push_str(" (");
                    frame.push_str(line);
                    frame.push(')');
                }
            }
        }
    }

    frames
}

/// Standard CRC-32 (ISO-HDLC) of `data`, continuing from `seed`.
///
/// Chaining matches zlib: `crc32(crc32(0, a), b) == crc32(0, a ++ b)`.
pub fn crc32(seed: u32, data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(seed);
    hasher.update(data);
    hasher.finalize()
}
