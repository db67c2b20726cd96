//! Runtime types.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::reconcile::PartialRender;
use crate::record::{Estado, Record};

/// One record paired with the section it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedSection {
    /// Section title, suffixed `.1`, `.2`, … when the section produced several records.
    #[serde(rename = "section")]
    pub display_title: String,
    #[serde(rename = "content")]
    pub source_text: String,
    #[serde(rename = "structured_data")]
    pub record: Record,
}

/// Callbacks for following a batch as it runs. All methods default to no-ops.
pub trait ProcessObserver: Send {
    fn on_section_start(&mut self, _index: usize, _total: usize, _title: &str) {}

    fn on_partial(&mut self, _title: &str, _partial: &PartialRender<'_>) {}

    fn on_section_done(&mut self, _title: &str, _records: &[Record]) {}

    /// Fraction of sections completed, in `[0, 1]`.
    fn on_progress(&mut self, _fraction: f64) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProcessObserver for NoopObserver {}

/// Record counts by status, plus how many records are error placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub records: usize,
    pub errors: usize,
    #[serde(rename = "byEstado")]
    pub by_estado: BTreeMap<&'static str, usize>,
}

impl BatchSummary {
    pub fn from_sections(sections: &[ProcessedSection]) -> Self {
        let mut summary = Self::default();
        for section in sections {
            summary.records += 1;
            if section.record.is_error() {
                summary.errors += 1;
            }
            *summary
                .by_estado
                .entry(section.record.estado.label())
                .or_insert(0) += 1;
        }
        summary
    }

    pub fn count(&self, estado: Estado) -> usize {
        self.by_estado.get(estado.label()).copied().unwrap_or(0)
    }
}
