//! End-to-end: split a document, process every section against a scripted
//! backend, export the result.

use std::sync::Arc;

use observa_chat::{BoxedStream, CompletionBackend, GenerationConfig, PromptTemplate, StreamChunk};
use observa_ingest::{extract_region_text, split_sections, BoundingBox, ExtractMode, PlainTextDocument};
use observa_runtime::{
    export, BatchSummary, Estado, ProcessObserver, Record, SectionProcessor,
};
use parking_lot::Mutex;

/// Answers each prompt with a record echoing the observation number it finds.
struct EchoBackend {
    fail_on: Option<&'static str>,
    calls: Mutex<usize>,
}

impl CompletionBackend for EchoBackend {
    fn stream(&self, prompt: &str, _generation: &GenerationConfig) -> BoxedStream {
        *self.calls.lock() += 1;

        if self.fail_on.is_some_and(|marker| prompt.contains(marker)) {
            return Box::pin(tokio_stream::iter(vec![StreamChunk::Error(
                "503 Service Unavailable".into(),
            )]));
        }

        let number = if prompt.contains("1.2. OBSERVACIÓN") { "1.2" } else { "1.1" };
        let body = format!(
            r#"{{"Numero_de_observacion": "{}", "Descripcion": "desc", "Informacion_Complementaria": null, "Respuesta": null, "Estado": "Absuelta"}}"#,
            number
        );
        let (head, tail) = body.split_at(body.len() / 2);
        Box::pin(tokio_stream::iter(vec![
            StreamChunk::Token(head.to_string()),
            StreamChunk::Token(tail.to_string()),
            StreamChunk::Done { tokens_used: 2 },
        ]))
    }

    fn describe(&self) -> String {
        "echo".into()
    }
}

#[derive(Default)]
struct Progress(Vec<f64>);

impl ProcessObserver for Progress {
    fn on_progress(&mut self, fraction: f64) {
        self.0.push(fraction);
    }
}

fn backend(fail_on: Option<&'static str>) -> Arc<EchoBackend> {
    Arc::new(EchoBackend {
        fail_on,
        calls: Mutex::new(0),
    })
}

#[tokio::test]
async fn test_two_sections_one_record_each() {
    let sections = split_sections("1.1. OBSERVACIÓN foo bar baz 1.2. OBSERVACIÓN qux");
    assert_eq!(sections.len(), 2);

    let backend = backend(None);
    let processor = SectionProcessor::new(backend.clone());
    let mut progress = Progress::default();
    let out = processor
        .process_sections(&sections, &PromptTemplate::default(), &mut progress)
        .await;

    assert_eq!(*backend.calls.lock(), 2);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].display_title, "1.1.");
    assert_eq!(out[0].source_text, "1.1. OBSERVACIÓN foo bar baz");
    assert_eq!(out[0].record.numero_de_observacion, "1.1");
    assert_eq!(out[1].display_title, "1.2.");
    assert_eq!(out[1].source_text, "1.2. OBSERVACIÓN qux");
    assert_eq!(out[1].record.estado, Estado::Absuelta);

    assert_eq!(progress.0, vec![0.5, 1.0]);
}

#[tokio::test]
async fn test_service_failure_stays_in_its_section() {
    let text = "Informe\n1.1. OBSERVACIÓN primera\n2.1. Observacion segunda\n3.1. OBSERVACION tercera";
    let sections = split_sections(text);
    assert_eq!(sections.len(), 3);

    let processor = SectionProcessor::new(backend(Some("segunda")));
    let mut progress = Progress::default();
    let out = processor
        .process_sections(&sections, &PromptTemplate::default(), &mut progress)
        .await;

    assert_eq!(out.len(), 3);
    assert!(!out[0].record.is_error());
    assert_eq!(out[1].record, Record::error());
    assert_eq!(out[1].display_title, "2.1.");
    assert!(!out[2].record.is_error());

    let summary = BatchSummary::from_sections(&out);
    assert_eq!(summary.records, 3);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.count(Estado::Absuelta), 2);
    assert_eq!(summary.count(Estado::NoAbsuelta), 1);

    assert!(progress.0.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress.0.last().copied(), Some(1.0));
}

#[tokio::test]
async fn test_paged_document_to_exports() {
    let doc = PlainTextDocument::new("1.1. OBSERVACIÓN foo bar baz\n\x0c1.2. OBSERVACIÓN qux\n");
    let text = extract_region_text(&doc, BoundingBox::new(0.0, 0.0, 612.0, 792.0), ExtractMode::AllPages);
    let sections = split_sections(&text);
    assert_eq!(sections.len(), 2);

    let processor = SectionProcessor::new(backend(None));
    let out = processor
        .process_sections(&sections, &PromptTemplate::default(), &mut Progress::default())
        .await;

    let dir = tempfile::tempdir().unwrap();
    let written = export::write_all(dir.path(), "informe", &out).unwrap();
    assert_eq!(written.len(), 4);

    let csv = std::fs::read_to_string(dir.path().join("extracted_sections_informe.csv")).unwrap();
    assert_eq!(csv.lines().count(), 3);
    assert!(csv.lines().nth(2).unwrap().starts_with("1.2,desc,,,,Absuelta"));
}
