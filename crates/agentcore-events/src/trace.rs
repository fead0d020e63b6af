// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::io::{self, BufRead, Write};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{AgentEvent, EventKind, TRACE_VERSION};
use crate::redact::{DefaultRedactor, Redactor};
use crate::sink::Sink;

/// The first line of a trace file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceHeader {
    pub version: u32,
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Writes a durable JSONL trace: a header line followed by one JSON object
/// per event. Writes are serialized by an internal mutex so the writer can
/// be shared across concurrent emitters.
pub struct TraceWriter<W: Write + Send> {
    inner: Mutex<W>,
    redactor: Box<dyn Redactor>,
    header_written: Mutex<bool>,
}

impl<W: Write + Send> TraceWriter<W> {
    pub fn new(writer: W, header: TraceHeader) -> io::Result<Self> {
        Self::with_redactor(writer, header, Box::new(DefaultRedactor))
    }

    pub fn with_redactor(writer: W, header: TraceHeader, redactor: Box<dyn Redactor>) -> io::Result<Self> {
        let w = Self { inner: Mutex::new(writer), redactor, header_written: Mutex::new(false) };
        w.write_header(&header)?;
        Ok(w)
    }

    fn write_header(&self, header: &TraceHeader) -> io::Result<()> {
        let mut written = self.header_written.lock().unwrap();
        if *written {
            return Ok(());
        }
        let line = serde_json::to_string(header).map_err(io::Error::other)?;
        let mut inner = self.inner.lock().unwrap();
        writeln!(inner, "{line}")?;
        *written = true;
        Ok(())
    }

    pub fn write_event(&self, event: &AgentEvent) -> io::Result<()> {
        let mut redacted = event.clone();
        self.redactor.redact(&mut redacted);
        let line = serde_json::to_string(&redacted).map_err(io::Error::other)?;
        let mut inner = self.inner.lock().unwrap();
        writeln!(inner, "{line}")
    }
}

impl<W: Write + Send> Sink for TraceWriter<W> {
    fn emit(&self, event: AgentEvent) {
        if let Err(err) = self.write_event(&event) {
            tracing::warn!(%err, "failed to write trace event");
        }
    }
}

/// Reads and validates a trace written by [`TraceWriter`].
pub struct TraceReader<R: BufRead> {
    lines: std::io::Lines<R>,
    pub header: TraceHeader,
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(reader: R) -> anyhow::Result<Self> {
        let mut lines = reader.lines();
        let first =
            lines.next().ok_or_else(|| anyhow::anyhow!("empty trace: missing header"))??;
        let header: TraceHeader = serde_json::from_str(&first)?;
        if header.version != TRACE_VERSION {
            anyhow::bail!("unsupported trace version {}", header.version);
        }
        Ok(Self { lines, header })
    }

    /// Returns the next event, or `None` on clean EOF.
    pub fn read_event(&mut self) -> anyhow::Result<Option<AgentEvent>> {
        match self.lines.next() {
            None => Ok(None),
            Some(line) => {
                let line = line?;
                if line.trim().is_empty() {
                    return self.read_event();
                }
                Ok(Some(serde_json::from_str(&line)?))
            }
        }
    }

    pub fn read_all(mut self) -> anyhow::Result<Vec<AgentEvent>> {
        let mut events = Vec::new();
        while let Some(event) = self.read_event()? {
            events.push(event);
        }
        Ok(events)
    }
}

/// Derived statistics from replaying a trace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayStats {
    pub valid: bool,
    pub iters: u32,
    pub tool_calls: u32,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Feeds recorded events into a sink, optionally restricted to a sequence
/// range, and derives [`ReplayStats`] along the way.
pub struct Replayer;

impl Replayer {
    /// Replay `events` into `sink`, honoring an optional inclusive
    /// `[lo, hi]` sequence filter, and return the derived statistics.
    pub fn replay_to_stats(
        events: &[AgentEvent],
        sink: &dyn Sink,
        range: Option<(u64, u64)>,
    ) -> ReplayStats {
        let mut stats = ReplayStats::default();
        let mut saw_run_started = false;
        let mut ended_cleanly = false;
        let mut last_sequence: Option<u64> = None;
        let mut monotonic = true;

        for event in events {
            if let Some(last) = last_sequence {
                if event.sequence <= last {
                    monotonic = false;
                }
            }
            last_sequence = Some(event.sequence);

            match &event.kind {
                EventKind::RunStarted => saw_run_started = true,
                EventKind::RunFinished | EventKind::RunError { .. } => ended_cleanly = true,
                EventKind::IterStarted => stats.iters += 1,
                EventKind::ToolStarted { .. } => stats.tool_calls += 1,
                EventKind::ModelCompleted { stats: s } => {
                    stats.input_tokens += s.input_tokens;
                    stats.output_tokens += s.output_tokens;
                }
                _ => {}
            }

            let in_range = match range {
                Some((lo, hi)) => event.sequence >= lo && event.sequence <= hi,
                None => true,
            };
            if in_range {
                sink.emit(event.clone());
            }
        }

        stats.valid = saw_run_started && ended_cleanly && monotonic;
        stats
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{StatsPayload, ToolPayload};
    use crate::sink::NopSink;
    use std::io::Cursor;

    fn header() -> TraceHeader {
        TraceHeader { version: 1, run_id: "run-1".into(), app_version: None, environment: None, started_at: Utc::now() }
    }

    fn scenario_events() -> Vec<AgentEvent> {
        vec![
            AgentEvent::new("run-1", 0, 0, EventKind::RunStarted),
            AgentEvent::new("run-1", 1, 0, EventKind::IterStarted),
            AgentEvent::new(
                "run-1",
                2,
                0,
                EventKind::ModelCompleted { stats: StatsPayload { input_tokens: 100, output_tokens: 50, ..Default::default() } },
            ),
            AgentEvent::new(
                "run-1",
                3,
                0,
                EventKind::ToolStarted { tool: ToolPayload { call_id: "c1".into(), tool_name: "echo".into(), ..Default::default() } },
            ),
            AgentEvent::new(
                "run-1",
                4,
                0,
                EventKind::ToolFinished { tool: ToolPayload { call_id: "c1".into(), tool_name: "echo".into(), ..Default::default() } },
            ),
            AgentEvent::new(
                "run-1",
                5,
                0,
                EventKind::IterFinished { stats: StatsPayload::default() },
            ),
            AgentEvent::new("run-1", 6, 0, EventKind::RunFinished),
        ]
    }

    #[test]
    fn write_then_read_round_trips_header_and_events() {
        let buf: Vec<u8> = Vec::new();
        let writer = TraceWriter::new(buf, header()).unwrap();
        for e in scenario_events() {
            writer.write_event(&e).unwrap();
        }
        let bytes = writer.inner.into_inner().unwrap();

        let reader = TraceReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.header.run_id, "run-1");
        let events = reader.read_all().unwrap();
        assert_eq!(events.len(), 7);
        assert_eq!(events[0].kind, EventKind::RunStarted);
    }

    #[test]
    fn reader_rejects_unsupported_version() {
        let mut bad_header = header();
        bad_header.version = 2;
        let line = serde_json::to_string(&bad_header).unwrap();
        let result = TraceReader::new(Cursor::new(line.into_bytes()));
        assert!(result.is_err());
    }

    #[test]
    fn reader_rejects_empty_trace() {
        let result = TraceReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(result.is_err());
    }

    #[test]
    fn default_redactor_applied_on_write() {
        let buf: Vec<u8> = Vec::new();
        let writer = TraceWriter::new(buf, header()).unwrap();
        let event = AgentEvent::new(
            "run-1",
            0,
            0,
            EventKind::ToolFinished {
                tool: ToolPayload {
                    call_id: "c1".into(),
                    tool_name: "shell".into(),
                    args_json: "{\"command\":\"secret\"}".into(),
                    result_json: "secret output".into(),
                    ..Default::default()
                },
            },
        );
        writer.write_event(&event).unwrap();
        let bytes = writer.inner.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains("secret"));
        assert!(text.contains("[REDACTED]"));
    }

    #[test]
    fn trace_roundtrip_scenario_reports_expected_stats() {
        let stats = Replayer::replay_to_stats(&scenario_events(), &NopSink, None);
        assert!(stats.valid);
        assert_eq!(stats.iters, 1);
        assert_eq!(stats.tool_calls, 1);
        assert_eq!(stats.input_tokens, 100);
        assert_eq!(stats.output_tokens, 50);
    }

    #[test]
    fn replay_detects_missing_run_started() {
        let events = scenario_events()[1..].to_vec();
        let stats = Replayer::replay_to_stats(&events, &NopSink, None);
        assert!(!stats.valid);
    }

    #[test]
    fn replay_detects_non_monotonic_sequence() {
        let mut events = scenario_events();
        events[2].sequence = 1; // duplicate of iter.started's sequence
        let stats = Replayer::replay_to_stats(&events, &NopSink, None);
        assert!(!stats.valid);
    }

    #[test]
    fn replay_detects_missing_terminal_event() {
        let events = scenario_events()[..6].to_vec(); // drop run.finished
        let stats = Replayer::replay_to_stats(&events, &NopSink, None);
        assert!(!stats.valid);
    }

    #[test]
    fn write_then_read_round_trips_through_a_real_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let writer = TraceWriter::new(file.reopen().unwrap(), header()).unwrap();
        for e in scenario_events() {
            writer.write_event(&e).unwrap();
        }
        drop(writer);

        let reader = TraceReader::new(std::io::BufReader::new(std::fs::File::open(file.path()).unwrap())).unwrap();
        assert_eq!(reader.header.run_id, "run-1");
        let events = reader.read_all().unwrap();
        assert_eq!(events.len(), 7);
        assert_eq!(events.last().map(|e| &e.kind), Some(&EventKind::RunFinished));
    }

    #[test]
    fn replay_range_filters_sink_delivery_but_not_stats() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        struct CountingSink(AtomicUsize);
        impl Sink for CountingSink {
            fn emit(&self, _e: AgentEvent) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        let sink = CountingSink(AtomicUsize::new(0));
        let stats = Replayer::replay_to_stats(&scenario_events(), &sink, Some((2, 4)));
        assert_eq!(sink.0.load(Ordering::SeqCst), 3);
        assert!(stats.valid);
    }
}
