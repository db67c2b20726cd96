//! Section processor. Drives one completion call per section and flattens
//! the reconciled records into the batch output.

use std::sync::Arc;
use std::time::Duration;

use observa_chat::{CompletionBackend, GenerationConfig, PromptTemplate};
use observa_ingest::Section;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::reconcile::{or_error_record, reconcile_stream, ReconcileError};
use crate::record::Record;
use crate::types::{ProcessObserver, ProcessedSection};

/// Processes observation sections one at a time against a completion backend.
pub struct SectionProcessor {
    backend: Arc<dyn CompletionBackend>,
    generation: GenerationConfig,
    section_timeout: Option<Duration>,
    cancel: Option<watch::Receiver<bool>>,
}

impl SectionProcessor {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            generation: GenerationConfig::default(),
            section_timeout: None,
            cancel: None,
        }
    }

    /// Give up on a section whose stream runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.section_timeout = timeout;
        self
    }

    /// Stop when the watched flag turns `true`. The in-flight section and all
    /// later ones resolve to the error record.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Process every section in order.
    ///
    /// Always returns at least one entry per section; a failing section
    /// contributes a single error record and the batch carries on.
    pub async fn process_sections(
        &self,
        sections: &[Section],
        prompt: &PromptTemplate,
        observer: &mut dyn ProcessObserver,
    ) -> Vec<ProcessedSection> {
        let total = sections.len();
        let mut processed = Vec::with_capacity(total);

        info!(
            "Processing {} sections with {}",
            total,
            self.backend.describe()
        );

        for (idx, section) in sections.iter().enumerate() {
            observer.on_section_start(idx, total, &section.title);

            let records = self.process_section(section, prompt, observer).await;
            observer.on_section_done(&section.title, &records);
            processed.extend(expand_records(section, records));

            observer.on_progress((idx + 1) as f64 / total as f64);
        }

        processed
    }

    /// Process one section. Never fails: errors become the error record.
    pub async fn process_section(
        &self,
        section: &Section,
        prompt: &PromptTemplate,
        observer: &mut dyn ProcessObserver,
    ) -> Vec<Record> {
        let result = self.run_section(section, prompt, observer).await;
        if let Err(e) = &result {
            warn!("Section {} failed: {}", section.title, e);
        }
        or_error_record(result)
    }

    async fn run_section(
        &self,
        section: &Section,
        prompt: &PromptTemplate,
        observer: &mut dyn ProcessObserver,
    ) -> Result<Vec<Record>, ReconcileError> {
        if self.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }

        let rendered = prompt.render(&section.raw_text);
        debug!(
            "Section {}: prompt {} chars",
            section.title,
            rendered.chars().count()
        );

        let stream = self.backend.stream(&rendered, &self.generation);
        let title = section.title.as_str();
        let work = reconcile_stream(stream, |partial| observer.on_partial(title, partial));

        let bounded = async {
            match self.section_timeout {
                Some(limit) => match tokio::time::timeout(limit, work).await {
                    Ok(result) => result,
                    Err(_) => Err(ReconcileError::TimedOut(limit)),
                },
                None => work.await,
            }
        };

        match self.cancel.clone() {
            Some(mut rx) => tokio::select! {
                result = bounded => result,
                _ = cancelled(&mut rx) => Err(ReconcileError::Cancelled),
            },
            None => bounded.await,
        }
    }
}

/// Resolves once the flag is set; pends forever if the sender goes away first.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|flag| *flag).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Fan a section's records out into output entries.
///
/// A single record keeps the section title; several are numbered `title.1`,
/// `title.2`, … in the order returned.
pub fn expand_records(section: &Section, records: Vec<Record>) -> Vec<ProcessedSection> {
    let numbered = records.len() > 1;
    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| ProcessedSection {
            display_title: if numbered {
                format!("{}.{}", section.title, i + 1)
            } else {
                section.title.clone()
            },
            source_text: section.raw_text.clone(),
            record,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use observa_chat::{BoxedStream, StreamChunk};
    use parking_lot::Mutex;

    use crate::record::Estado;
    use crate::types::NoopObserver;

    /// Replays scripted chunk lists, one per call, and records the prompts it saw.
    struct ScriptedBackend {
        scripts: Mutex<Vec<Vec<StreamChunk>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(scripts: Vec<Vec<StreamChunk>>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into_iter().rev().collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    impl CompletionBackend for ScriptedBackend {
        fn stream(&self, prompt: &str, _generation: &GenerationConfig) -> BoxedStream {
            self.prompts.lock().push(prompt.to_string());
            let chunks = self.scripts.lock().pop().unwrap_or_default();
            Box::pin(tokio_stream::iter(chunks))
        }

        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    /// Never yields anything.
    struct HangingBackend;

    impl CompletionBackend for HangingBackend {
        fn stream(&self, _prompt: &str, _generation: &GenerationConfig) -> BoxedStream {
            Box::pin(futures::stream::pending())
        }

        fn describe(&self) -> String {
            "hanging".into()
        }
    }

    #[derive(Default)]
    struct Recorder {
        progress: Vec<f64>,
        started: Vec<String>,
        partials: usize,
    }

    impl ProcessObserver for Recorder {
        fn on_section_start(&mut self, _index: usize, _total: usize, title: &str) {
            self.started.push(title.to_string());
        }

        fn on_partial(&mut self, _title: &str, _partial: &crate::reconcile::PartialRender<'_>) {
            self.partials += 1;
        }

        fn on_progress(&mut self, fraction: f64) {
            self.progress.push(fraction);
        }
    }

    fn section(title: &str, text: &str) -> Section {
        Section {
            title: title.into(),
            raw_text: text.into(),
        }
    }

    fn answer(json: &str) -> Vec<StreamChunk> {
        vec![
            StreamChunk::Token(json.into()),
            StreamChunk::Done { tokens_used: 1 },
        ]
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let backend = ScriptedBackend::new(vec![
            answer(r#"[{"Numero_de_observacion":"1.1","Descripcion":"uno","Estado":"Absuelta"}]"#),
            vec![
                StreamChunk::Token("[{\"Numero_de_obs".into()),
                StreamChunk::Error("stream reset".into()),
            ],
            answer(r#"{"Numero_de_observacion":"1.3","Descripcion":"tres"}"#),
        ]);
        let processor = SectionProcessor::new(backend);
        let sections = vec![
            section("1.1.", "1.1. OBSERVACIÓN uno"),
            section("1.2.", "1.2. OBSERVACIÓN dos"),
            section("1.3.", "1.3. OBSERVACIÓN tres"),
        ];

        let mut recorder = Recorder::default();
        let out = processor
            .process_sections(&sections, &PromptTemplate::default(), &mut recorder)
            .await;

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].record.estado, Estado::Absuelta);
        assert_eq!(out[1].display_title, "1.2.");
        assert!(out[1].record.is_error());
        assert_eq!(out[2].record.numero_de_observacion, "1.3");
        assert_eq!(recorder.started, vec!["1.1.", "1.2.", "1.3."]);
        assert_eq!(recorder.progress.last().copied(), Some(1.0));
        assert!(recorder.progress.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_multiple_records_are_numbered() {
        let backend = ScriptedBackend::new(vec![answer(
            r#"[{"Numero_de_observacion":"2.1","Descripcion":"d","Literal":"a"},
                {"Numero_de_observacion":"2.1","Descripcion":"d","Literal":"b"}]"#,
        )]);
        let processor = SectionProcessor::new(backend);
        let out = processor
            .process_sections(
                &[section("2.1.", "2.1. OBSERVACIÓN a) uno b) dos")],
                &PromptTemplate::default(),
                &mut NoopObserver,
            )
            .await;

        let titles: Vec<_> = out.iter().map(|p| p.display_title.as_str()).collect();
        assert_eq!(titles, vec!["2.1..1", "2.1..2"]);
        assert_eq!(out[1].record.literal.as_deref(), Some("b"));
        assert!(out.iter().all(|p| p.source_text == "2.1. OBSERVACIÓN a) uno b) dos"));
    }

    #[tokio::test]
    async fn test_prompt_carries_section_text() {
        let backend = ScriptedBackend::new(vec![answer("{}")]);
        let processor = SectionProcessor::new(backend.clone());
        let prompt = PromptTemplate::new("Analiza <<{text}>>").unwrap();
        let records = processor
            .process_section(&section("5.1.", "5.1. Observación x"), &prompt, &mut NoopObserver)
            .await;

        assert_eq!(backend.prompts.lock().as_slice(), ["Analiza <<5.1. Observación x>>"]);
        // `{}` has no required fields
        assert!(records[0].is_error());
    }

    #[tokio::test]
    async fn test_partials_reported() {
        let backend = ScriptedBackend::new(vec![vec![
            StreamChunk::Token("[".into()),
            StreamChunk::Token(r#"{"Numero_de_observacion":"1","Descripcion":"d"}"#.into()),
            StreamChunk::Token("]".into()),
        ]]);
        let processor = SectionProcessor::new(backend);
        let mut recorder = Recorder::default();
        let records = processor
            .process_section(&section("1.1.", "x"), &PromptTemplate::default(), &mut recorder)
            .await;
        assert_eq!(recorder.partials, 3);
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_resolves_to_error_record() {
        let processor = SectionProcessor::new(Arc::new(HangingBackend))
            .with_timeout(Some(Duration::from_millis(30)));
        let out = processor
            .process_sections(
                &[section("1.1.", "a"), section("1.2.", "b")],
                &PromptTemplate::default(),
                &mut NoopObserver,
            )
            .await;
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|p| p.record.is_error()));
    }

    #[tokio::test]
    async fn test_cancellation_stops_batch() {
        let (tx, rx) = watch::channel(false);
        let processor = SectionProcessor::new(Arc::new(HangingBackend)).with_cancellation(rx);
        let sections = vec![section("1.1.", "a"), section("1.2.", "b"), section("1.3.", "c")];

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send(true).unwrap();
        });

        let mut recorder = Recorder::default();
        let out = processor
            .process_sections(&sections, &PromptTemplate::default(), &mut recorder)
            .await;
        canceller.await.unwrap();

        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|p| p.record.is_error()));
        assert_eq!(recorder.progress.last().copied(), Some(1.0));
    }

    #[test]
    fn test_expand_single_record_keeps_title() {
        let out = expand_records(&section("1.1.", "t"), vec![Record::error()]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].display_title, "1.1.");
    }
}
