//! Observa Ingest: region text extraction and observation section splitting.

pub mod region;
pub mod sections;

pub use region::{
    canvas_rect_to_bbox, extract_region_text, scale_bbox_to_pdf, BoundingBox, Dimensions,
    ExtractMode, PageTextSource, PlainTextDocument,
};
pub use sections::{split_sections, Section};
