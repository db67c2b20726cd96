//! Model response reconciliation.
//!
//! Turns a streamed completion into records. While the stream runs, every
//! increment is appended to a buffer and a direct parse is attempted for
//! live display. When it ends, a fixed fallback ladder decides the result:
//!
//! 1. buffer starts with `[`: parse as an array;
//! 2. buffer starts with a code fence: extract embedded objects;
//! 3. otherwise: parse as a single object.
//!
//! Any failure along the way resolves to the standard error record.

use std::time::Duration;

use futures::Stream;
use observa_chat::StreamChunk;
use serde_json::Value;
use thiserror::Error;
use tokio_stream::StreamExt;
use tracing::debug;

use crate::extract::{extract_json_objects, normalize_newlines};
use crate::record::Record;

const CODE_FENCE: &str = "```";

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("empty response")]
    Empty,

    #[error("invalid JSON array: {0}")]
    InvalidArray(#[source] serde_json::Error),

    #[error("no JSON objects in fenced output")]
    NoObjects,

    #[error("invalid JSON object: {0}")]
    InvalidObject(#[source] serde_json::Error),

    #[error("expected a JSON object")]
    NotAnObject,

    #[error("no schema-conformant records in response")]
    NoConformantRecords,

    #[error("completion stream failed: {0}")]
    Stream(String),

    #[error("cancelled")]
    Cancelled,

    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

/// Intermediate view of the response while it is still streaming.
#[derive(Debug, Clone, PartialEq)]
pub enum PartialRender<'a> {
    /// The buffer so far parses as JSON.
    Structured(Vec<Value>),
    /// Not parseable yet; the raw text received so far.
    Raw(&'a str),
}

/// Running buffer for one section's response.
#[derive(Debug, Default)]
pub struct Reconciler {
    buffer: String,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an increment and try to parse everything received so far.
    pub fn push(&mut self, chunk: &str) -> PartialRender<'_> {
        self.buffer.push_str(chunk);
        let normalized = normalize_newlines(&self.buffer);
        match serde_json::from_str::<Value>(normalized.trim()) {
            Ok(Value::Array(items)) => PartialRender::Structured(items),
            Ok(obj @ Value::Object(_)) => PartialRender::Structured(vec![obj]),
            _ => PartialRender::Raw(&self.buffer),
        }
    }

    /// Run the fallback ladder over the complete buffer.
    pub fn finalize(&self) -> Result<Vec<Record>, ReconcileError> {
        parse_final(&self.buffer)
    }

    /// Like [`finalize`](Self::finalize), but never fails: an unusable
    /// response becomes the standard error record.
    pub fn finish(&self) -> Vec<Record> {
        or_error_record(self.finalize())
    }
}

/// Apply the fallback ladder to a complete response text.
pub fn parse_final(text: &str) -> Result<Vec<Record>, ReconcileError> {
    let normalized = normalize_newlines(text);
    let text = normalized.trim();
    if text.is_empty() {
        return Err(ReconcileError::Empty);
    }

    let values = if text.starts_with('[') {
        serde_json::from_str::<Vec<Value>>(text).map_err(ReconcileError::InvalidArray)?
    } else if text.starts_with(CODE_FENCE) {
        let objects = extract_json_objects(text);
        if objects.is_empty() {
            return Err(ReconcileError::NoObjects);
        }
        objects
    } else {
        match serde_json::from_str::<Value>(text).map_err(ReconcileError::InvalidObject)? {
            obj @ Value::Object(_) => vec![obj],
            _ => return Err(ReconcileError::NotAnObject),
        }
    };

    into_records(values)
}

/// Keep the schema-conformant values; fail if none are.
fn into_records(values: Vec<Value>) -> Result<Vec<Record>, ReconcileError> {
    let total = values.len();
    let records: Vec<Record> = values
        .into_iter()
        .filter_map(|v| match Record::from_value(v) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("Discarding non-conformant element: {}", e);
                None
            }
        })
        .collect();

    if records.is_empty() {
        return Err(ReconcileError::NoConformantRecords);
    }
    if records.len() < total {
        debug!("Kept {} of {} elements", records.len(), total);
    }
    Ok(records)
}

/// Collapse a reconciliation result into a non-empty record list.
pub fn or_error_record(result: Result<Vec<Record>, ReconcileError>) -> Vec<Record> {
    match result {
        Ok(records) if !records.is_empty() => records,
        Ok(_) => vec![Record::error()],
        Err(e) => {
            debug!("Falling back to error record: {}", e);
            vec![Record::error()]
        }
    }
}

/// Consume a completion stream in arrival order, reporting a partial render
/// after each text increment, then finalize.
pub async fn reconcile_stream<S, F>(mut stream: S, mut on_partial: F) -> Result<Vec<Record>, ReconcileError>
where
    S: Stream<Item = StreamChunk> + Unpin,
    F: FnMut(&PartialRender<'_>),
{
    let mut reconciler = Reconciler::new();

    while let Some(chunk) = stream.next().await {
        match chunk {
            StreamChunk::Token(text) => {
                let partial = reconciler.push(&text);
                on_partial(&partial);
            }
            StreamChunk::Done { tokens_used } => {
                debug!("Stream done after {} tokens", tokens_used);
                break;
            }
            StreamChunk::Error(e) => return Err(ReconcileError::Stream(e)),
        }
    }

    reconciler.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE: &str = r#"{"Numero_de_observacion":"1.1","Descripcion":"foo","Informacion_Complementaria":null,"Respuesta":null,"Estado":"Absuelta"}"#;

    fn tokens(parts: &[&str]) -> impl Stream<Item = StreamChunk> + Unpin {
        let mut chunks: Vec<StreamChunk> =
            parts.iter().map(|p| StreamChunk::Token(p.to_string())).collect();
        chunks.push(StreamChunk::Done { tokens_used: parts.len() });
        tokio_stream::iter(chunks)
    }

    #[test]
    fn test_array_takes_precedence() {
        let records = parse_final(&format!("[{}]", ONE)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].estado, crate::record::Estado::Absuelta);
        assert_eq!(records[0].descripcion, "foo");
    }

    #[test]
    fn test_malformed_array_does_not_fall_through() {
        let err = parse_final(&format!("[{}", ONE)).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidArray(_)));
    }

    #[test]
    fn test_code_fence_uses_extractor() {
        let text = format!("```json\n{}\n{}\n```", ONE, ONE.replace("1.1", "1.2"));
        let records = parse_final(&text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].numero_de_observacion, "1.2");

        assert!(matches!(
            parse_final("```\nno hay json\n```"),
            Err(ReconcileError::NoObjects)
        ));
    }

    #[test]
    fn test_single_object_wrapped() {
        let records = parse_final(&format!("  \n{}\n", ONE)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].numero_de_observacion, "1.1");
    }

    #[test]
    fn test_garbage_and_non_objects() {
        assert!(matches!(parse_final(""), Err(ReconcileError::Empty)));
        assert!(matches!(
            parse_final("Lo siento, no puedo ayudar."),
            Err(ReconcileError::InvalidObject(_))
        ));
        assert!(matches!(parse_final("\"texto\""), Err(ReconcileError::NotAnObject)));
        assert!(matches!(parse_final("[]"), Err(ReconcileError::NoConformantRecords)));
        assert!(matches!(
            parse_final(r#"[{"Estado": "Absuelta"}]"#),
            Err(ReconcileError::NoConformantRecords)
        ));
    }

    #[test]
    fn test_finish_is_total() {
        let inputs = [
            format!("[{}]", ONE),
            ONE.to_string(),
            format!("```\n{}\n```", ONE),
            "basura {".to_string(),
            String::new(),
            "[]".to_string(),
        ];
        for input in inputs {
            let mut reconciler = Reconciler::new();
            reconciler.push(&input);
            let records = reconciler.finish();
            assert!(!records.is_empty(), "empty result for {:?}", input);
        }
    }

    #[test]
    fn test_push_partial_renders() {
        let mut reconciler = Reconciler::new();
        assert!(matches!(reconciler.push("[{\"Numero_de_observacion\":"), PartialRender::Raw(_)));
        assert!(matches!(reconciler.push(" \"1.1\"}"), PartialRender::Raw(_)));
        match reconciler.push("]") {
            PartialRender::Structured(items) => assert_eq!(items.len(), 1),
            other => panic!("expected structured render, got {:?}", other),
        }
    }

    #[test]
    fn test_newlines_inside_strings() {
        let text = "{\"Numero_de_observacion\": \"4.1\",\n\"Descripcion\": \"primera\nsegunda\"}";
        let records = parse_final(text).unwrap();
        assert_eq!(records[0].descripcion, "primera segunda");
    }

    #[tokio::test]
    async fn test_reconcile_stream_reports_partials() {
        let (head, tail) = ONE.split_at(40);
        let mut renders = Vec::new();
        let records = reconcile_stream(tokens(&["[", head, tail, "]"]), |p| {
            renders.push(matches!(p, PartialRender::Structured(_)))
        })
        .await
        .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(renders, vec![false, false, false, true]);
    }

    #[tokio::test]
    async fn test_reconcile_stream_error_chunk() {
        let stream = tokio_stream::iter(vec![
            StreamChunk::Token("[{".into()),
            StreamChunk::Error("connection reset".into()),
        ]);
        let err = reconcile_stream(stream, |_| {}).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Stream(ref m) if m == "connection reset"));
    }

    #[tokio::test]
    async fn test_reconcile_stream_without_done_marker() {
        let stream = tokio_stream::iter(vec![StreamChunk::Token(ONE.into())]);
        let records = reconcile_stream(stream, |_| {}).await.unwrap();
        assert_eq!(records[0].numero_de_observacion, "1.1");
    }
}
