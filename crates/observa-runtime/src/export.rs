//! Export writers for processed sections.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use observa_core::{Error, Result};
use serde::Serialize;
use tracing::info;

use crate::types::ProcessedSection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Text,
    Markdown,
    Json,
    Csv,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [Self::Text, Self::Markdown, Self::Json, Self::Csv];

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Markdown => "md",
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    pub fn render(&self, sections: &[ProcessedSection]) -> Result<String> {
        match self {
            Self::Text => to_text(sections),
            Self::Markdown => to_markdown(sections),
            Self::Json => to_json(sections),
            Self::Csv => to_csv(sections),
        }
    }
}

/// One CSV row, columns in record schema order.
#[derive(Serialize)]
struct Row<'a> {
    #[serde(rename = "Numero_de_observacion")]
    numero_de_observacion: &'a str,
    #[serde(rename = "Descripcion")]
    descripcion: &'a str,
    #[serde(rename = "Informacion_Complementaria")]
    informacion_complementaria: Option<&'a str>,
    #[serde(rename = "Literal")]
    literal: Option<&'a str>,
    #[serde(rename = "Respuesta")]
    respuesta: Option<&'a str>,
    #[serde(rename = "Estado")]
    estado: &'static str,
}

pub fn to_text(sections: &[ProcessedSection]) -> Result<String> {
    let mut out = String::new();
    for section in sections {
        let record = serde_json::to_string_pretty(&section.record)?;
        let _ = write!(
            out,
            "Section {}\n{}\n\n{}\n\n",
            section.display_title, section.source_text, record
        );
    }
    Ok(out)
}

pub fn to_markdown(sections: &[ProcessedSection]) -> Result<String> {
    let mut out = String::new();
    for section in sections {
        let record = serde_json::to_string_pretty(&section.record)?;
        let _ = write!(
            out,
            "### Section {}\n\n```\n{}\n```\n\n```json\n{}\n```\n\n",
            section.display_title, section.source_text, record
        );
    }
    Ok(out)
}

/// Flat array of `{section, content, structured_data}`.
pub fn to_json(sections: &[ProcessedSection]) -> Result<String> {
    Ok(serde_json::to_string_pretty(sections)?)
}

pub fn to_csv(sections: &[ProcessedSection]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for section in sections {
        let r = &section.record;
        writer.serialize(Row {
            numero_de_observacion: &r.numero_de_observacion,
            descripcion: &r.descripcion,
            informacion_complementaria: r.informacion_complementaria.as_deref(),
            literal: r.literal.as_deref(),
            respuesta: r.respuesta.as_deref(),
            estado: r.estado.label(),
        })?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Export(e.error().to_string()))?;
    String::from_utf8(bytes).map_err(|e| Error::Export(e.to_string()))
}

pub fn export_file_name(doc_name: &str, format: ExportFormat) -> String {
    format!("extracted_sections_{}.{}", doc_name, format.extension())
}

/// Write every export format for a document into `dir`.
pub fn write_all(dir: &Path, doc_name: &str, sections: &[ProcessedSection]) -> Result<Vec<PathBuf>> {
    if sections.is_empty() {
        return Err(Error::Export("no processed sections to export".into()));
    }
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(ExportFormat::ALL.len());
    for format in ExportFormat::ALL {
        let path = dir.join(export_file_name(doc_name, format));
        std::fs::write(&path, format.render(sections)?)?;
        written.push(path);
    }
    info!("Exported {} entries to {}", sections.len(), dir.display());
    Ok(written)
}
