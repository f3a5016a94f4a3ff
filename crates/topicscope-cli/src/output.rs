//! Terminal rendering for records, page status, and history.

use std::io::{self, Write};

use serde::Serialize;

use topicscope_core::MessageRecord;
use topicscope_session::MessagePageState;
use topicscope_session::history::HistoryStack;

/// One record per line: JSON when `json`, otherwise tab-separated
/// `partition offset timestamp key value` plus any known schema subjects.
pub fn write_records<W: Write>(
    out: &mut W,
    state: &MessagePageState,
    records: &[MessageRecord],
    json: bool,
) -> io::Result<()> {
    for record in records {
        if json {
            serde_json::to_writer(&mut *out, record).map_err(io::Error::from)?;
            writeln!(out)?;
            continue;
        }
        write!(
            out,
            "{}\t{}\t{}\t{}\t{}",
            record.partition, record.offset, record.timestamp, record.key, record.value
        )?;
        let subjects = [
            ("key-schema", record.schema.key_schema_id),
            ("value-schema", record.schema.value_schema_id),
        ];
        for (label, id) in subjects {
            if let Some(subject) = id.and_then(|id| state.schema_subject(id)) {
                write!(out, "\t{label}={subject}")?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Page position, the offsets panel, and the cursor to resume from.
pub fn write_page_summary<W: Write>(out: &mut W, state: &MessagePageState) -> io::Result<()> {
    let page = state.page();
    writeln!(
        out,
        "page {}: {} records shown, {} total",
        page.page_number,
        page.records.len(),
        page.total_size
    )?;
    for (label, offset) in state.offset_labels() {
        let offset = if offset.is_empty() { "-" } else { offset.as_str() };
        writeln!(out, "  {label}: {offset}")?;
    }
    if state.is_last_page() {
        writeln!(out, "no more records")?;
    } else if let Some(after) = page.next.as_ref().and_then(|next| next.after()) {
        writeln!(out, "resume with --after {after}")?;
    }
    Ok(())
}

#[derive(Serialize)]
struct HistoryView<'a> {
    path: &'a str,
    index: usize,
    entries: &'a [String],
}

/// The history stack of `path`, marking the current entry with `*`.
pub fn write_history<W: Write>(
    out: &mut W,
    path: &str,
    stack: &HistoryStack,
    json: bool,
) -> io::Result<()> {
    if json {
        let view = HistoryView {
            path,
            index: stack.index(),
            entries: stack.entries(),
        };
        serde_json::to_writer_pretty(&mut *out, &view).map_err(io::Error::from)?;
        return writeln!(out);
    }
    writeln!(out, "{path}")?;
    for (i, query) in stack.entries().iter().enumerate() {
        let marker = if i == stack.index() { '*' } else { ' ' };
        let query = if query.is_empty() { "(default)" } else { query };
        writeln!(out, "{marker} {query}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use topicscope_core::{Capabilities, RawRecord};

    fn record(key: &str, partition: u32, offset: u64) -> MessageRecord {
        MessageRecord::from(RawRecord {
            key: Some(key.to_string()),
            value: Some("{\"ok\":true}".to_string()),
            timestamp: Some("2023-01-01T00:00:00Z".to_string()),
            partition,
            offset,
            ..RawRecord::default()
        })
    }

    fn render(records: &[MessageRecord], json: bool) -> String {
        let state = MessagePageState::new("local", "orders", Capabilities::default());
        let mut buf = Vec::new();
        write_records(&mut buf, &state, records, json).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn text_records_are_tab_separated() {
        let text = render(&[record("a", 0, 5), record("b", 2, 9)], false);
        assert_eq!(
            text,
            "0\t5\t2023-01-01T00:00:00Z\ta\t{\"ok\":true}\n2\t9\t2023-01-01T00:00:00Z\tb\t{\"ok\":true}\n"
        );
    }

    #[test]
    fn json_records_are_one_object_per_line() {
        let text = render(&[record("a", 0, 5), record("b", 2, 9)], true);
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["key"], "b");
        assert_eq!(lines[1]["partition"], 2);
    }

    #[test]
    fn empty_page_summary() {
        let state = MessagePageState::new("local", "orders", Capabilities::default());
        let mut buf = Vec::new();
        write_page_summary(&mut buf, &state).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "page 1: 0 records shown, 0 total\nno more records\n"
        );
    }

    #[test]
    fn history_marks_current_entry() {
        let mut stack = HistoryStack::default();
        stack.push("");
        stack.push("sort=Newest");
        stack.push("sort=Newest&partition=1");
        stack.back();

        let mut buf = Vec::new();
        write_history(&mut buf, "/ui/local/topic/orders/data", &stack, false).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "/ui/local/topic/orders/data\n  (default)\n* sort=Newest\n  sort=Newest&partition=1\n"
        );

        let mut buf = Vec::new();
        write_history(&mut buf, "/ui/local/topic/orders/data", &stack, true).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["index"], 1);
        assert_eq!(value["entries"][2], "sort=Newest&partition=1");
    }
}
