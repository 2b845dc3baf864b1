//! Export (CSV → document) and import (document → CSV) pipelines.
//!
//! ```text
//!  export:  CsvTable ─validate─▶ RowAssembler ─▶ group ─▶ Document ─▶ DocumentWriter
//!  import:  DocumentReader ─▶ spots ─▶ group ─▶ flatten ─▶ CsvTable
//! ```
//!
//! Both directions are all-or-nothing: the first defect aborts the run and
//! nothing is handed to the writer.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::Local;
use log::{debug, info};

use crate::data::assembler::RowAssembler;
use crate::data::grouper::group;
use crate::data::loader::{read_csv, write_csv_file, CsvOptions, CsvTable};
use crate::data::mapping::{validate, ColumnMapping, ValidatedMapping};
use crate::data::model::{EntityGraph, Spot};
use crate::document::trackmate::{TmXmlReader, TmXmlWriter};
use crate::document::{
    Calibration, Document, DocumentReader, DocumentWriter, FeatureDeclarations,
};
use crate::error::Result;

/// Column headers of a flattened table, before any feature columns.
pub const CANONICAL_HEADERS: [&str; 9] = [
    "id", "x", "y", "z", "frame", "quality", "name", "track", "radius",
];

/// Counts reported after a successful export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    pub n_rows: usize,
    pub n_spots: usize,
    pub n_frames: usize,
    pub n_tracks: usize,
    pub n_ungrouped: usize,
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Build the entity graph of `table`, plus the names of the column features
/// carried on its spots.
pub fn build_graph(table: &CsvTable, mapping: &ValidatedMapping) -> Result<(EntityGraph, Vec<String>)> {
    let mut assembler = RowAssembler::new(mapping);
    if let Some(headers) = &table.headers {
        assembler = assembler.with_headers(headers);
    }

    info!("Parsing {} records", table.len());
    let spots = assembler.assemble_all(&table.rows)?;
    let extras = assembler.extra_features().map(str::to_string).collect();

    let graph = group(spots)?;
    info!("Found {} spots", graph.len());
    for frame in graph.frames() {
        debug!("- frame {:4}, n spots = {}", frame.frame, frame.spots.len());
    }
    if mapping.mapping().track_col.is_some() {
        info!(
            "Found {} tracks, {} spots outside tracks",
            graph.tracks().len(),
            graph.ungrouped().len()
        );
    }
    Ok((graph, extras))
}

/// Convert `table` to a document and hand it to `writer`.
///
/// The mapping is validated before any row is looked at. `source` names the
/// input in the document log.
pub fn export<W: DocumentWriter + ?Sized>(
    table: &CsvTable,
    mapping: &ColumnMapping,
    calibration: Calibration,
    source: &str,
    writer: &mut W,
) -> Result<ExportSummary> {
    let mapping = validate(mapping)?;
    let (graph, extras) = build_graph(table, &mapping)?;

    let features = FeatureDeclarations::for_export(
        mapping.declare_all_features(),
        extras.iter().map(String::as_str),
    );
    debug!("Declaring {} features", features.total());

    let summary = ExportSummary {
        n_rows: table.len(),
        n_spots: graph.len(),
        n_frames: graph.frames().len(),
        n_tracks: graph.tracks().len(),
        n_ungrouped: graph.ungrouped().len(),
    };

    let document = Document {
        calibration: calibration.with_frames_from(&graph),
        graph,
        features,
        log: provenance(source),
    };
    writer.write(&document)?;
    Ok(summary)
}

/// Read a CSV file and write the TrackMate XML document to `target`.
pub fn export_file(
    csv_path: &Path,
    options: CsvOptions,
    mapping: &ColumnMapping,
    calibration: Calibration,
    target: &Path,
) -> Result<ExportSummary> {
    // Configuration defects must surface before the file is touched.
    validate(mapping)?;
    let table = read_csv(csv_path, options)?;
    // Rendered in memory so a failed export never leaves a partial file.
    let mut writer = TmXmlWriter::new(Vec::new());
    let summary = export(
        &table,
        mapping,
        calibration,
        &csv_path.display().to_string(),
        &mut writer,
    )?;
    std::fs::write(target, writer.into_inner())?;
    info!("Data saved to: {}", target.display());
    Ok(summary)
}

fn provenance(source: &str) -> String {
    format!(
        "Exported to TrackMate from CSV file {source}\nOn the {}\nBy {} v{}\n",
        Local::now().format("%Y-%m-%d --- %H:%M:%S"),
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    )
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

/// Read a document and flatten it to one row per spot.
pub fn import<R: DocumentReader + ?Sized>(reader: &mut R) -> Result<CsvTable> {
    let parts = reader.read()?;
    let graph = group(parts.spots)?;
    info!(
        "Read {} spots in {} frames, {} tracks",
        graph.len(),
        graph.frames().len(),
        graph.tracks().len()
    );
    Ok(flatten(&graph))
}

/// Read a TrackMate XML file and write its spots as CSV to `target`.
pub fn import_file(source: &Path, target: &Path) -> Result<CsvTable> {
    let mut reader = TmXmlReader::open(source)?;
    let table = import(&mut reader)?;
    write_csv_file(target, &table)?;
    Ok(table)
}

/// One row per spot, frames ascending, with the columns
/// `id, x, y, z, frame, quality, name, track, radius` followed by every
/// spot feature in name order. Absent values are empty cells.
///
/// [`ColumnMapping::canonical`] reads the result back.
pub fn flatten(graph: &EntityGraph) -> CsvTable {
    let feature_names: BTreeSet<&str> = graph
        .spots()
        .iter()
        .flat_map(|s| s.features.keys().map(String::as_str))
        .collect();

    let headers = CANONICAL_HEADERS
        .iter()
        .copied()
        .chain(feature_names.iter().copied())
        .map(str::to_string)
        .collect();

    let rows = graph
        .frames()
        .iter()
        .flat_map(|frame| graph.resolve(&frame.spots))
        .map(|spot| flatten_spot(spot, &feature_names))
        .collect();

    CsvTable {
        headers: Some(headers),
        rows,
        metadata: Default::default(),
    }
}

fn flatten_spot(spot: &Spot, feature_names: &BTreeSet<&str>) -> Vec<String> {
    let mut row = vec![
        spot.id.to_string(),
        spot.x.to_string(),
        spot.y.to_string(),
        spot.z.to_string(),
        spot.frame.to_string(),
        spot.quality.map(|q| q.to_string()).unwrap_or_default(),
        spot.name.clone(),
        spot.track_index.map(|t| t.to_string()).unwrap_or_default(),
        spot.radius.to_string(),
    ];
    row.extend(feature_names.iter().map(|name| {
        spot.features
            .get(*name)
            .map(|v| v.to_string())
            .unwrap_or_default()
    }));
    row
}
