//! Internal utilities for capturing command output.
//!
//! Each pipe is drained on its own thread so a chatty process cannot block
//! on a full stderr buffer while stdout is still being read.

use std::io::{BufRead, BufReader, Read};

/// Type of output stream for logging purposes.
#[derive(Clone, Copy)]
pub(super) enum StreamType {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// Extracts a human-readable message from a thread panic.
pub(super) fn panic_message(err: &(dyn std::any::Any + Send)) -> &str {
    err.downcast_ref::<&str>()
        .copied()
        .or_else(|| err.downcast_ref::<String>().map(|s| s.as_str()))
        .unwrap_or("unknown panic")
}

/// Reads a pipe to EOF, logging each line and returning the full text.
///
/// - stdout lines are logged at TRACE, stderr lines at DEBUG
/// - Binary data uses lossy UTF-8 conversion
/// - I/O errors stop reading but keep what was captured so far
/// - `None` pipe returns an empty string
pub(super) fn capture_pipe<R: Read>(pipe: Option<R>, stream_type: StreamType) -> String {
    let Some(pipe) = pipe else {
        return String::new();
    };

    let mut reader = BufReader::new(pipe);
    let mut line_buf = Vec::new();
    let mut captured = String::new();

    loop {
        line_buf.clear();
        match reader.read_until(b'\n', &mut line_buf) {
            Ok(0) => break, // EOF
            Ok(_) => {
                let text = String::from_utf8_lossy(&line_buf);
                log_line(text.trim_end_matches(['\n', '\r']), stream_type);
                captured.push_str(&text);
            }
            Err(e) => {
                tracing::error!(stream = %stream_type, error = %e, "I/O error, stopping read");
                break;
            }
        }
    }

    captured
}

fn log_line(line: &str, stream_type: StreamType) {
    match stream_type {
        StreamType::Stdout => tracing::trace!(stream = %stream_type, "{}", line),
        StreamType::Stderr => tracing::debug!(stream = %stream_type, "{}", line),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_pipe_keeps_all_lines() {
        let input: &[u8] = b"first\r\nsecond\nthird";
        let captured = capture_pipe(Some(input), StreamType::Stdout);
        assert_eq!(captured, "first\r\nsecond\nthird");
    }

    #[test]
    fn capture_pipe_none_is_empty() {
        assert_eq!(capture_pipe::<&[u8]>(None, StreamType::Stderr), "");
    }

    #[test]
    fn capture_pipe_lossy_utf8() {
        let input: &[u8] = b"ok \xff\n";
        let captured = capture_pipe(Some(input), StreamType::Stdout);
        assert!(captured.starts_with("ok "));
    }

    #[test]
    fn panic_message_handles_str_and_string() {
        let a: Box<dyn std::any::Any + Send> = Box::new("static");
        let b: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        let c: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(&*a), "static");
        assert_eq!(panic_message(&*b), "owned");
        assert_eq!(panic_message(&*c), "unknown panic");
    }
}
