use thiserror::Error;

use crate::data::mapping::Slot;
use crate::document::DocumentError;

/// Result alias used throughout the conversion pipeline.
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Every way a conversion can fail.
///
/// Configuration defects are raised before any row is read, row-level and
/// structural defects abort the whole conversion, and document failures carry
/// the writer/reader message verbatim.
#[derive(Debug, Error)]
pub enum ConvertError {
    // -- configuration --
    #[error("required column for {0} is not set")]
    MissingRequiredColumn(Slot),

    #[error("no radius source: set a radius column or a default radius")]
    MissingRadiusSource,

    #[error("column {column} is assigned to both {first} and {second}")]
    DuplicateColumnAssignment {
        column: usize,
        first: Slot,
        second: Slot,
    },

    #[error("default radius must be a positive number, got {0}")]
    InvalidDefaultRadius(f64),

    // -- row level --
    #[error("row {row}: column {column} for {slot} is out of range (row has {width} columns)")]
    ColumnOutOfRange {
        row: usize,
        slot: Slot,
        column: usize,
        width: usize,
    },

    #[error("row {row}: cannot parse {slot} from '{value}'")]
    UnparsableValue {
        row: usize,
        slot: Slot,
        value: String,
    },

    // -- structural --
    #[error("track {track} has more than one spot in frame {frame}")]
    DuplicateFrameInTrack { track: i64, frame: u32 },

    #[error("spot id {0} is used by more than one spot")]
    DuplicateSpotId(u64),

    // -- collaborators --
    #[error("{0}")]
    Document(#[from] DocumentError),

    #[error("problem reading image metadata: {0}")]
    Image(#[from] image::ImageError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
