//! Log records from the helper and the low-level runtime.
//!
//! Both write newline-delimited JSON onto the log pipe. Each record's
//! message is re-emitted at debug level under the
//! [`RUNTIME_LOG`](crate::runtime::constants::targets::RUNTIME_LOG) target.
//! When a launch fails, the same records explain why.

use std::{
    io::{self, BufRead, BufReader, PipeReader, Read},
    thread::{self, JoinHandle},
};

use crate::process::fifo;
use crate::runtime::constants::{targets, threads};
use procshim_shared::errors::{ShimError, ShimResult};
use serde_json::Value;

/// One decoded log line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct LogRecord {
    pub(crate) level: Option<String>,
    pub(crate) message: Option<String>,
}

impl LogRecord {
    /// Decode a line. Anything that is not a JSON object is ignored.
    ///
    /// The message comes from `msg` (runtime style), `message`, or
    /// `fields.message` (tracing-subscriber JSON style).
    pub(crate) fn parse(line: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(line.trim()).ok()?;
        let object = value.as_object()?;

        let message = ["msg", "message"]
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_str))
            .or_else(|| {
                object
                    .get("fields")
                    .and_then(|fields| fields.get("message"))
                    .and_then(Value::as_str)
            })
            .map(str::to_owned);
        let level = object
            .get("level")
            .and_then(Value::as_str)
            .map(str::to_ascii_lowercase);

        Some(Self { level, message })
    }

    fn is_error(&self) -> bool {
        matches!(self.level.as_deref(), Some("error" | "fatal" | "panic"))
    }

    fn forward(&self) {
        if let Some(message) = &self.message {
            tracing::debug!(
                target: targets::RUNTIME_LOG,
                runtime_level = self.level.as_deref().unwrap_or("unknown"),
                "{}",
                message
            );
        }
    }
}

/// Pick the message that best explains a failed launch: the last error
/// record, or else the last record with any message.
pub(crate) fn failure_message(records: &[LogRecord]) -> String {
    records
        .iter()
        .rev()
        .find(|r| r.is_error() && r.message.is_some())
        .or_else(|| records.iter().rev().find(|r| r.message.is_some()))
        .and_then(|r| r.message.clone())
        .unwrap_or_default()
}

/// Read whatever is buffered on the log pipe without waiting for writers,
/// forward it, and build the failure message.
pub(crate) fn drain_failure_message(mut reader: PipeReader) -> String {
    if let Err(e) = fifo::set_nonblocking(&reader, true) {
        tracing::debug!(error = %e, "Cannot make log pipe non-blocking");
        return String::new();
    }

    let mut bytes = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => bytes.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }

    let records: Vec<LogRecord> = String::from_utf8_lossy(&bytes)
        .lines()
        .filter_map(LogRecord::parse)
        .collect();
    for record in &records {
        record.forward();
    }
    failure_message(&records)
}

/// Background forwarding of the log pipe after a successful launch.
///
/// The thread ends on its own once every writer (the helper and the runtime
/// processes it started) has closed the pipe. It is never joined, since that
/// can take as long as the supervised process lives.
#[derive(Debug)]
pub struct LogForwarder {
    thread: JoinHandle<()>,
}

impl LogForwarder {
    pub(crate) fn spawn(reader: PipeReader) -> ShimResult<Self> {
        let thread = thread::Builder::new()
            .name(threads::LOG_FORWARDER.to_string())
            .spawn(move || {
                for line in BufReader::new(reader).lines() {
                    match line {
                        Ok(line) => {
                            if let Some(record) = LogRecord::parse(&line) {
                                record.forward();
                            }
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "Log pipe read failed");
                            break;
                        }
                    }
                }
                tracing::trace!("Log pipe closed, forwarder exiting");
            })
            .map_err(|e| ShimError::Internal(format!("Failed to spawn log forwarder: {}", e)))?;
        Ok(Self { thread })
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_runtime_record() {
        let record =
            LogRecord::parse(r#"{"level":"error","msg":"exec failed: potato","time":"now"}"#)
                .unwrap();
        assert_eq!(record.level.as_deref(), Some("error"));
        assert_eq!(record.message.as_deref(), Some("exec failed: potato"));
    }

    #[test]
    fn test_parse_tracing_record() {
        let record = LogRecord::parse(
            r#"{"timestamp":"t","level":"WARN","fields":{"message":"no pidfile"},"target":"x"}"#,
        )
        .unwrap();
        assert_eq!(record.level.as_deref(), Some("warn"));
        assert_eq!(record.message.as_deref(), Some("no pidfile"));
    }

    #[test]
    fn test_parse_ignores_garbage() {
        assert!(LogRecord::parse("not json").is_none());
        assert!(LogRecord::parse("[1,2]").is_none());
        assert_eq!(LogRecord::parse("{}").unwrap(), LogRecord::default());
    }

    #[test]
    fn test_failure_message_prefers_last_error() {
        let records = vec![
            LogRecord::parse(r#"{"level":"error","msg":"first"}"#).unwrap(),
            LogRecord::parse(r#"{"level":"error","msg":"second"}"#).unwrap(),
            LogRecord::parse(r#"{"level":"info","msg":"exiting"}"#).unwrap(),
        ];
        assert_eq!(failure_message(&records), "second");
    }

    #[test]
    fn test_failure_message_falls_back_to_last_message() {
        let records = vec![
            LogRecord::parse(r#"{"level":"info","msg":"starting"}"#).unwrap(),
            LogRecord::parse(r#"{"level":"warn","msg":"giving up"}"#).unwrap(),
        ];
        assert_eq!(failure_message(&records), "giving up");
        assert_eq!(failure_message(&[]), "");
    }

    #[test]
    fn test_drain_does_not_wait_for_writers() {
        let (reader, mut writer) = std::io::pipe().unwrap();
        writeln!(writer, r#"{{"level":"error","msg":"boom"}}"#).unwrap();
        writeln!(writer, "garbage").unwrap();
        // writer stays open
        assert_eq!(drain_failure_message(reader), "boom");
        drop(writer);
    }

    #[test]
    fn test_forwarder_ends_with_writers() {
        let (reader, mut writer) = std::io::pipe().unwrap();
        let forwarder = LogForwarder::spawn(reader).unwrap();
        writeln!(writer, r#"{{"level":"info","msg":"hello"}}"#).unwrap();
        drop(writer);
        for _ in 0..200 {
            if forwarder.is_finished() {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        panic!("forwarder did not finish");
    }
}
