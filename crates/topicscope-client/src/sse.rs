//! Incremental `text/event-stream` parsing.
//!
//! Bytes arrive in arbitrary chunks; [`SseParser::push`] buffers partial lines
//! and yields a [`SseFrame`] each time a blank line terminates an event.

use topicscope_core::{SearchProgressBody, normalize_records};
use tracing::{debug, warn};

use crate::transport::TransportEvent;

/// Event names that carry a progress body.
pub const PROGRESS_EVENTS: [&str; 2] = ["searchBody", "progress"];

/// Event names that terminate a search.
pub const END_EVENTS: [&str; 2] = ["searchEnd", "end"];

/// One dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// `event:` field; `message` when the frame named none.
    pub event: String,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush an event left unterminated when the stream closed.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest);
            let line = line.trim_end_matches('\r').to_string();
            if let Some(frame) = self.process_line(&line) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if event.is_none() && self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

/// Interpret a frame from the search endpoint.
///
/// Unknown event names and unparsable progress bodies are skipped.
#[must_use]
pub fn frame_to_event(frame: &SseFrame) -> Option<TransportEvent> {
    let name = frame.event.as_str();
    if PROGRESS_EVENTS.contains(&name) {
        match serde_json::from_str::<SearchProgressBody>(&frame.data) {
            Ok(body) => Some(TransportEvent::Progress {
                percent: body.percent,
                records: normalize_records(body.records.unwrap_or_default()),
            }),
            Err(err) => {
                warn!(error = %err, event = name, "skipping unparsable progress body");
                None
            }
        }
    } else if END_EVENTS.contains(&name) {
        Some(TransportEvent::End)
    } else if name == "error" {
        Some(TransportEvent::Error(frame.data.clone()))
    } else {
        debug!(event = name, "ignoring unrecognized event");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"event: search").is_empty());
        assert!(parser.push(b"Body\ndata: {\"perc").is_empty());
        let frames = parser.push(b"ent\": 10}\n\n");
        assert_eq!(
            frames,
            vec![SseFrame {
                event: "searchBody".into(),
                data: "{\"percent\": 10}".into(),
            }]
        );
    }

    #[test]
    fn crlf_comments_and_multiline_data() {
        let mut parser = SseParser::new();
        let frames =
            parser.push(b": keep-alive\r\n\r\ndata: a\r\ndata:b\r\n\r\nevent: end\r\n\r\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event, "message");
        assert_eq!(frames[0].data, "a\nb");
        assert_eq!(frames[1].event, "end");
        assert_eq!(frames[1].data, "");
    }

    #[test]
    fn finish_flushes_unterminated_frame() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"event: searchEnd\ndata: {}").is_empty());
        let frame = parser.finish().unwrap();
        assert_eq!(frame.event, "searchEnd");
        assert_eq!(frame.data, "{}");
        assert!(parser.finish().is_none());
    }

    #[test]
    fn progress_frames_normalize_records() {
        let frame = SseFrame {
            event: "searchBody".into(),
            data: r#"{"percent": 12.345, "records": [{"partition": 0, "offset": 4}]}"#.into(),
        };
        let Some(TransportEvent::Progress { percent, records }) = frame_to_event(&frame) else {
            panic!("expected progress");
        };
        assert!((percent - 12.345).abs() < f64::EPSILON);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, "null");
    }

    #[test]
    fn event_name_aliases() {
        let progress = SseFrame {
            event: "progress".into(),
            data: r#"{"percent": 1}"#.into(),
        };
        assert!(matches!(
            frame_to_event(&progress),
            Some(TransportEvent::Progress { ref records, .. }) if records.is_empty()
        ));
        for name in END_EVENTS {
            let frame = SseFrame {
                event: name.into(),
                data: String::new(),
            };
            assert_eq!(frame_to_event(&frame), Some(TransportEvent::End));
        }
    }

    #[test]
    fn bad_bodies_and_unknown_events_are_skipped() {
        let bad = SseFrame {
            event: "searchBody".into(),
            data: "not json".into(),
        };
        assert_eq!(frame_to_event(&bad), None);
        let other = SseFrame {
            event: "message".into(),
            data: "hello".into(),
        };
        assert_eq!(frame_to_event(&other), None);
        let err = SseFrame {
            event: "error".into(),
            data: "boom".into(),
        };
        assert_eq!(frame_to_event(&err), Some(TransportEvent::Error("boom".into())));
    }
}
