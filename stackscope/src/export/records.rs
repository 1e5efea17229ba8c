//! Raw record dump (JSON Lines)
//!
//! One JSON object per line, discriminated by `type`:
//!
//! ```text
//! {"type":"header","generation":1,"event":"cpu",...,"failures":[0,0,...]}
//! {"type":"trace","samples":2,"counter":8,"sequence":0,"frames":[...]}
//! {"type":"method","samples":2,"counter":8,"sequence":0,"frame":{...}}
//! ```
//!
//! The header comes first and exactly once. Frames keep both the raw
//! identity and the resolved name, so a dump can be re-rendered offline
//! without the process that produced it.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::domain::ExportError;
use crate::report::{MethodEntry, SessionInfo, Snapshot, TraceSample};

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RecordRef<'a> {
    Header(&'a SessionInfo),
    Trace(&'a TraceSample),
    Method(&'a MethodEntry),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Record {
    Header(SessionInfo),
    Trace(TraceSample),
    Method(MethodEntry),
}

/// Write `snapshot` as a record stream
///
/// # Errors
/// Returns an error if serialization or writing fails
pub fn write_records(snapshot: &Snapshot, out: &mut dyn Write) -> Result<(), ExportError> {
    let mut emit = |record: RecordRef<'_>| -> Result<(), ExportError> {
        serde_json::to_writer(&mut *out, &record)?;
        out.write_all(b"\n")?;
        Ok(())
    };

    emit(RecordRef::Header(&snapshot.info))?;
    for trace in &snapshot.traces {
        emit(RecordRef::Trace(trace))?;
    }
    for method in &snapshot.methods {
        emit(RecordRef::Method(method))?;
    }
    Ok(())
}

/// Rebuild a snapshot from a record stream
///
/// Blank lines are ignored.
///
/// # Errors
/// Returns [`ExportError::MissingHeader`] if the stream does not start with
/// a header, [`ExportError::UnexpectedRecord`] for a second header, and
/// JSON or I/O errors otherwise.
pub fn read_records<R: BufRead>(reader: R) -> Result<Snapshot, ExportError> {
    let mut info = None;
    let mut traces = Vec::new();
    let mut methods = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match (serde_json::from_str::<Record>(&line)?, info.is_some()) {
            (Record::Header(header), false) => info = Some(header),
            (Record::Header(_), true) => {
                return Err(ExportError::UnexpectedRecord { line: index + 1 })
            }
            (_, false) => return Err(ExportError::MissingHeader),
            (Record::Trace(trace), true) => traces.push(trace),
            (Record::Method(method), true) => methods.push(method),
        }
    }

    let info = info.ok_or(ExportError::MissingHeader)?;
    Ok(Snapshot { info, traces, methods })
}

/// Write a record dump to `path`
///
/// # Errors
/// Returns an error if the file cannot be created or written
pub fn save_records(snapshot: &Snapshot, path: &Path) -> Result<(), ExportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_records(snapshot, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Read a record dump from `path`
///
/// # Errors
/// Returns an error if the file cannot be read or is not a valid dump
pub fn load_records(path: &Path) -> Result<Snapshot, ExportError> {
    read_records(BufReader::new(File::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::testing::{method, snapshot_of, trace, with_methods};

    #[test]
    fn test_stream_layout() {
        let snapshot = with_methods(
            snapshot_of(vec![trace(&["main", "run"], 2, 8)]),
            vec![method("run", 2, 8)],
        );
        let mut out = Vec::new();
        write_records(&snapshot, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with(r#"{"type":"header","#));
        assert!(lines[1].starts_with(r#"{"type":"trace","#));
        assert!(lines[2].starts_with(r#"{"type":"method","#));

        let back = read_records(text.as_bytes()).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_missing_header() {
        let snapshot = snapshot_of(vec![trace(&["main"], 1, 1)]);
        let mut out = Vec::new();
        write_records(&snapshot, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let without_header: String = text.lines().skip(1).collect::<Vec<_>>().join("\n");

        assert!(matches!(
            read_records(without_header.as_bytes()),
            Err(ExportError::MissingHeader)
        ));
        assert!(matches!(read_records(&b""[..]), Err(ExportError::MissingHeader)));
    }

    #[test]
    fn test_second_header_rejected() {
        let snapshot = snapshot_of(Vec::new());
        let mut out = Vec::new();
        write_records(&snapshot, &mut out).unwrap();
        write_records(&snapshot, &mut out).unwrap();

        assert!(matches!(
            read_records(&out[..]),
            Err(ExportError::UnexpectedRecord { line: 2 })
        ));
    }

    #[test]
    fn test_malformed_line() {
        assert!(matches!(read_records(&b"{not json}\n"[..]), Err(ExportError::Json(_))));
    }
}
