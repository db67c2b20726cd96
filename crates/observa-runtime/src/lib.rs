//! Observation processing runtime.
//!
//! Drives one completion per section, reconciles the streamed reply into
//! structured records and flattens them into the batch output. Also holds the
//! per-session context and the export writers.

pub mod export;
pub mod extract;
pub mod orchestrator;
pub mod reconcile;
pub mod record;
pub mod session;
pub mod types;

pub use export::{write_all, ExportFormat};
pub use extract::extract_json_objects;
pub use orchestrator::SectionProcessor;
pub use reconcile::{parse_final, reconcile_stream, PartialRender, ReconcileError, Reconciler};
pub use record::{Estado, Record};
pub use session::{CredentialsStatus, Session};
pub use types::*;
