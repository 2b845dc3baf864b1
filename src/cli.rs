use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;

use trackcsv::data::loader::CsvOptions;
use trackcsv::{export_file, import_file, Calibration, ColumnMapping};

/// Convert CSV spot tables to TrackMate XML and back.
#[derive(Debug, Parser)]
#[command(name = "trackcsv")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Export a CSV table of detections to a TrackMate XML file.
    Export(ExportArgs),
    /// Import a TrackMate XML file into a CSV table.
    Import(ImportArgs),
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// CSV file with one detection per row.
    #[arg(long)]
    pub csv: PathBuf,

    /// Image the detections were made on. Only its header is read.
    #[arg(long)]
    pub image: PathBuf,

    /// Output TrackMate XML file.
    #[arg(long)]
    pub target: PathBuf,

    /// JSON column mapping. Column flags override its fields.
    #[arg(long, env = "TRACKCSV_MAPPING")]
    pub mapping: Option<PathBuf>,

    #[command(flatten)]
    pub columns: ColumnArgs,

    /// The CSV file has no header row.
    #[arg(long)]
    pub no_header: bool,

    /// Field delimiter.
    #[arg(long, default_value_t = ',')]
    pub delimiter: char,

    #[command(flatten)]
    pub calibration: CalibrationArgs,
}

/// Zero-based column indices.
#[derive(Debug, Default, Args)]
pub struct ColumnArgs {
    #[arg(long)]
    pub x_col: Option<usize>,
    #[arg(long)]
    pub y_col: Option<usize>,
    #[arg(long)]
    pub frame_col: Option<usize>,
    #[arg(long)]
    pub z_col: Option<usize>,
    #[arg(long)]
    pub id_col: Option<usize>,
    #[arg(long)]
    pub quality_col: Option<usize>,
    #[arg(long)]
    pub name_col: Option<usize>,
    #[arg(long)]
    pub track_col: Option<usize>,
    #[arg(long)]
    pub radius_col: Option<usize>,

    /// Radius used for rows without a radius column value.
    #[arg(long)]
    pub radius: Option<f64>,

    /// Declare every spot, edge and track feature, and carry unmapped
    /// columns as spot features.
    #[arg(long)]
    pub declare_all_features: bool,
}

#[derive(Debug, Default, Args)]
pub struct CalibrationArgs {
    #[arg(long)]
    pub pixel_width: Option<f64>,
    #[arg(long)]
    pub pixel_height: Option<f64>,
    #[arg(long)]
    pub voxel_depth: Option<f64>,
    /// Time between two frames, in time units.
    #[arg(long)]
    pub frame_interval: Option<f64>,
    #[arg(long)]
    pub space_units: Option<String>,
    #[arg(long)]
    pub time_units: Option<String>,
    /// Number of frames. Defaults to the last frame in the CSV plus one.
    #[arg(long)]
    pub n_frames: Option<u32>,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// TrackMate XML file to read.
    #[arg(long)]
    pub source: PathBuf,

    /// Output CSV file.
    #[arg(long)]
    pub target: PathBuf,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub fn run_export(args: &ExportArgs) -> Result<()> {
    let mapping = resolve_mapping(args.mapping.as_deref(), &args.columns)?;
    if mapping.radius_col.is_none() && mapping.default_radius.is_none() {
        bail!("No spot radius given: pass --radius <value> or --radius-col <index>");
    }
    if !args.delimiter.is_ascii() {
        bail!("Delimiter must be a single ASCII character, got {:?}", args.delimiter);
    }

    let calibration = Calibration::from_image(&args.image)
        .with_context(|| format!("Failed to read image header of {}", args.image.display()))?;
    let calibration = args.calibration.apply(calibration);

    let options = CsvOptions {
        has_header: !args.no_header,
        delimiter: args.delimiter as u8,
    };

    let summary = export_file(&args.csv, options, &mapping, calibration, &args.target)
        .with_context(|| format!("Failed to export {}", args.csv.display()))?;
    info!(
        "Exported {} rows: {} spots in {} frames, {} tracks, {} untracked spots",
        summary.n_rows, summary.n_spots, summary.n_frames, summary.n_tracks, summary.n_ungrouped
    );
    Ok(())
}

pub fn run_import(args: &ImportArgs) -> Result<()> {
    let table = import_file(&args.source, &args.target)
        .with_context(|| format!("Failed to import {}", args.source.display()))?;
    info!("Wrote {} rows to {}", table.len(), args.target.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Load the mapping file, if any, then apply the column flags on top.
pub fn resolve_mapping(path: Option<&Path>, columns: &ColumnArgs) -> Result<ColumnMapping> {
    let base = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read mapping file: {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid mapping file: {}", path.display()))?
        }
        None => ColumnMapping::default(),
    };
    Ok(columns.apply(base))
}

impl ColumnArgs {
    fn apply(&self, mut mapping: ColumnMapping) -> ColumnMapping {
        let overrides = [
            (&mut mapping.x_col, self.x_col),
            (&mut mapping.y_col, self.y_col),
            (&mut mapping.frame_col, self.frame_col),
            (&mut mapping.z_col, self.z_col),
            (&mut mapping.id_col, self.id_col),
            (&mut mapping.quality_col, self.quality_col),
            (&mut mapping.name_col, self.name_col),
            (&mut mapping.track_col, self.track_col),
            (&mut mapping.radius_col, self.radius_col),
        ];
        for (field, value) in overrides {
            if value.is_some() {
                *field = value;
            }
        }
        if self.radius.is_some() {
            mapping.default_radius = self.radius;
        }
        mapping.declare_all_features |= self.declare_all_features;
        mapping
    }
}

impl CalibrationArgs {
    fn apply(&self, mut cal: Calibration) -> Calibration {
        if let Some(v) = self.pixel_width {
            cal.pixel_width = v;
        }
        if let Some(v) = self.pixel_height {
            cal.pixel_height = v;
        }
        if let Some(v) = self.voxel_depth {
            cal.voxel_depth = v;
        }
        if let Some(v) = self.frame_interval {
            cal.frame_interval = v;
        }
        if let Some(units) = &self.space_units {
            cal.space_units = units.clone();
        }
        if let Some(units) = &self.time_units {
            cal.time_units = units.clone();
        }
        if let Some(n) = self.n_frames {
            cal.n_frames = n;
        }
        cal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ExportArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Export(args) => args,
            other => panic!("expected export, got {other:?}"),
        }
    }

    #[test]
    fn export_flags_build_mapping() {
        let args = parse(&[
            "trackcsv", "export", "--csv", "a.csv", "--image", "a.png", "--target", "a.xml",
            "--x-col", "1", "--y-col", "2", "--frame-col", "4", "--radius", "2.5",
        ]);
        let mapping = resolve_mapping(None, &args.columns).unwrap();
        assert_eq!(mapping.x_col, Some(1));
        assert_eq!(mapping.y_col, Some(2));
        assert_eq!(mapping.frame_col, Some(4));
        assert_eq!(mapping.default_radius, Some(2.5));
        assert_eq!(mapping.radius_col, None);
        assert!(!mapping.declare_all_features);
        assert!(!args.no_header);
        assert_eq!(args.delimiter, ',');
    }

    #[test]
    fn flags_override_mapping_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        std::fs::write(&path, r#"{"xCol": 0, "yCol": 1, "frameCol": 2, "radiusCol": 5}"#).unwrap();

        let columns = ColumnArgs {
            frame_col: Some(3),
            ..Default::default()
        };
        let mapping = resolve_mapping(Some(&path), &columns).unwrap();
        assert_eq!(mapping.x_col, Some(0));
        assert_eq!(mapping.frame_col, Some(3));
        assert_eq!(mapping.radius_col, Some(5));
    }

    #[test]
    fn bad_mapping_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = resolve_mapping(Some(&path), &ColumnArgs::default()).unwrap_err();
        assert!(err.to_string().contains("Invalid mapping file"));
    }

    #[test]
    fn export_without_radius_is_rejected() {
        let args = parse(&[
            "trackcsv", "export", "--csv", "a.csv", "--image", "a.png", "--target", "a.xml",
            "--x-col", "0", "--y-col", "1", "--frame-col", "2",
        ]);
        let err = run_export(&args).unwrap_err();
        assert!(err.to_string().contains("--radius"));
    }

    #[test]
    fn calibration_flags() {
        let args = CalibrationArgs {
            frame_interval: Some(0.5),
            space_units: Some("µm".to_string()),
            ..Default::default()
        };
        let cal = args.apply(Calibration::default());
        assert_eq!(cal.frame_interval, 0.5);
        assert_eq!(cal.space_units, "µm");
        assert_eq!(cal.pixel_width, 1.0);
        assert_eq!(cal.time_units, "frame");
    }
}
