//! TrackMate XML documents.
//!
//! Only the subset needed to carry spots, tracks, feature declarations and
//! image calibration is written and read back.

mod reader;
mod writer;

pub use reader::TmXmlReader;
pub use writer::TmXmlWriter;

use std::fmt;

use super::DocumentError;

/// Value of the `version` attribute on the root element.
pub const FORMAT_VERSION: &str = "7.0.0";

/// GUI state that opens on the track view.
pub const GUI_STATE_TRACKS: &str = "ConfigureViews";

/// GUI state that opens on the spot filter.
pub const GUI_STATE_SPOTS: &str = "SpotFilter";

fn xml_error<E: fmt::Display>(e: E) -> DocumentError {
    DocumentError::new(format!("Input/Output error: {e}"))
}
