//! Observation section splitting.
//!
//! Audit reports number their observations with a two-level heading such as
//! `1.2. OBSERVACIÓN`. Every heading starts a new section that runs until the
//! next heading or the end of the text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A contiguous span of source text introduced by an observation heading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Heading number, e.g. `"1.2."`. Not unique within a document.
    pub title: String,
    /// Trimmed text from the heading up to the next heading.
    pub raw_text: String,
}

// Heading number followed by the keyword, accented or not, any case.
static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\d+\.+\d+\.\s*OBSERVACI[OÓ]N").unwrap());
static TITLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.+\d+\.").unwrap());

/// Split extracted text into observation sections, in source order.
///
/// Text before the first heading is discarded. Returns an empty list when no
/// heading is found.
pub fn split_sections(text: &str) -> Vec<Section> {
    let starts: Vec<usize> = HEADING_RE.find_iter(text).map(|m| m.start()).collect();
    if starts.is_empty() {
        return Vec::new();
    }

    let mut sections = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());
        let raw_text = text[start..end].trim();

        match TITLE_RE.find(raw_text) {
            Some(title) => sections.push(Section {
                title: title.as_str().to_string(),
                raw_text: raw_text.to_string(),
            }),
            None => warn!("Dropping section at byte {}: no heading number", start),
        }
    }

    debug!("Split text into {} sections", sections.len());
    sections
}
