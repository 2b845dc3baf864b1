//! Convert CSV spot tables to TrackMate trajectory documents and back.
//!
//! A [`ColumnMapping`] says which column holds which spot attribute. Export
//! validates it, assembles one [`Spot`](data::model::Spot) per row, groups
//! spots into frames and tracks, and hands the graph to a
//! [`DocumentWriter`](document::DocumentWriter). Import reads a document and
//! flattens it back into rows that [`ColumnMapping::canonical`] understands.

pub mod convert;
pub mod data;
pub mod document;
pub mod error;

pub use convert::{export, export_file, flatten, import, import_file, ExportSummary};
pub use data::mapping::{validate, ColumnMapping, Slot, ValidatedMapping};
pub use document::Calibration;
pub use error::{ConvertError, Result};
