/// Document layer: what the converter hands to a writer and gets back from
/// a reader.
///
/// ```text
///   EntityGraph + Calibration + FeatureDeclarations
///        │
///        ▼
///   ┌──────────────┐            ┌──────────────┐
///   │DocumentWriter│  ──XML──▶  │DocumentReader│
///   └──────────────┘            └──────────────┘
///                                      │
///                                      ▼
///                      spots + Calibration + FeatureDeclarations
/// ```
///
/// The converter only sees the two traits; `trackmate` is the concrete
/// TrackMate XML implementation.
pub mod calibration;
pub mod features;
pub mod trackmate;

use thiserror::Error;

use crate::data::model::{EntityGraph, Spot};

pub use calibration::Calibration;
pub use features::{Dimension, FeatureDeclaration, FeatureDeclarations};

/// Failure reported by a document writer or reader. The message is passed
/// to the caller untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DocumentError(pub String);

impl DocumentError {
    pub fn new(message: impl Into<String>) -> Self {
        DocumentError(message.into())
    }
}

/// Everything a writer needs to produce one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub graph: EntityGraph,
    pub calibration: Calibration,
    pub features: FeatureDeclarations,
    /// Free text provenance note.
    pub log: String,
}

/// What a reader recovers from a document, before grouping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocumentParts {
    pub spots: Vec<Spot>,
    pub calibration: Calibration,
    pub features: FeatureDeclarations,
    pub log: String,
}

/// Sink for an exported document.
pub trait DocumentWriter {
    fn write(&mut self, document: &Document) -> Result<(), DocumentError>;
}

/// Source of a document to import.
pub trait DocumentReader {
    fn read(&mut self) -> Result<DocumentParts, DocumentError>;
}
