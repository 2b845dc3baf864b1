use std::fmt;
use std::str::FromStr;

use super::Calibration;
use crate::data::model::{EntityGraph, Spot, Track};

// ---------------------------------------------------------------------------
// Feature declarations
// ---------------------------------------------------------------------------

/// Physical dimension of a feature, as spelled in TrackMate documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    None,
    Quality,
    Position,
    Length,
    Time,
    Velocity,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Dimension::None => "NONE",
            Dimension::Quality => "QUALITY",
            Dimension::Position => "POSITION",
            Dimension::Length => "LENGTH",
            Dimension::Time => "TIME",
            Dimension::Velocity => "VELOCITY",
        };
        f.write_str(s)
    }
}

impl FromStr for Dimension {
    type Err = std::convert::Infallible;

    /// Unknown spellings read as [`Dimension::None`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "QUALITY" => Dimension::Quality,
            "POSITION" => Dimension::Position,
            "LENGTH" => Dimension::Length,
            "TIME" => Dimension::Time,
            "VELOCITY" => Dimension::Velocity,
            _ => Dimension::None,
        })
    }
}

/// A named scalar attribute announced in the document header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureDeclaration {
    pub key: String,
    pub name: String,
    pub short_name: String,
    pub dimension: Dimension,
    pub is_int: bool,
}

impl FeatureDeclaration {
    fn new(key: &str, name: &str, short_name: &str, dimension: Dimension, is_int: bool) -> Self {
        FeatureDeclaration {
            key: key.to_string(),
            name: name.to_string(),
            short_name: short_name.to_string(),
            dimension,
            is_int,
        }
    }

    /// Declaration for a feature carried over from an unbound CSV column.
    pub fn custom(key: &str) -> Self {
        Self::new(key, key, key, Dimension::None, false)
    }
}

/// Spot, edge and track features declared by a document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeatureDeclarations {
    pub spot: Vec<FeatureDeclaration>,
    pub edge: Vec<FeatureDeclaration>,
    pub track: Vec<FeatureDeclaration>,
}

impl FeatureDeclarations {
    /// Declarations for an export. The minimal set covers what every spot,
    /// link and track carries; `all` adds the derived edge/track statistics
    /// and one declaration per carried column feature.
    pub fn for_export<'a>(all: bool, extra_spot_features: impl IntoIterator<Item = &'a str>) -> Self {
        use Dimension as D;

        let mut spot = vec![
            FeatureDeclaration::new("QUALITY", "Quality", "Quality", D::Quality, false),
            FeatureDeclaration::new("POSITION_X", "X", "X", D::Position, false),
            FeatureDeclaration::new("POSITION_Y", "Y", "Y", D::Position, false),
            FeatureDeclaration::new("POSITION_Z", "Z", "Z", D::Position, false),
            FeatureDeclaration::new("POSITION_T", "T", "T", D::Time, false),
            FeatureDeclaration::new("FRAME", "Frame", "Frame", D::None, true),
            FeatureDeclaration::new("RADIUS", "Radius", "R", D::Length, false),
            FeatureDeclaration::new("VISIBILITY", "Visibility", "Visibility", D::None, true),
        ];
        let mut edge = vec![
            FeatureDeclaration::new("SPOT_SOURCE_ID", "Source spot ID", "Source ID", D::None, true),
            FeatureDeclaration::new("SPOT_TARGET_ID", "Target spot ID", "Target ID", D::None, true),
            FeatureDeclaration::new("LINK_COST", "Edge cost", "Cost", D::None, false),
        ];
        let mut track = vec![
            FeatureDeclaration::new("TRACK_INDEX", "Track index", "Index", D::None, true),
            FeatureDeclaration::new("TRACK_ID", "Track ID", "ID", D::None, true),
        ];

        if all {
            spot.extend(extra_spot_features.into_iter().map(FeatureDeclaration::custom));
            edge.extend([
                FeatureDeclaration::new("EDGE_TIME", "Edge time", "Edge T", D::Time, false),
                FeatureDeclaration::new("DISPLACEMENT", "Displacement", "Disp.", D::Length, false),
                FeatureDeclaration::new("SPEED", "Speed", "Speed", D::Velocity, false),
            ]);
            track.extend([
                FeatureDeclaration::new("NUMBER_SPOTS", "Number of spots in track", "N spots", D::None, true),
                FeatureDeclaration::new("TRACK_DURATION", "Track duration", "Duration", D::Time, false),
                FeatureDeclaration::new("TRACK_START", "Track start", "Track start", D::Time, false),
                FeatureDeclaration::new("TRACK_STOP", "Track stop", "Track stop", D::Time, false),
                FeatureDeclaration::new("TRACK_MEAN_QUALITY", "Track mean quality", "Mean Q", D::Quality, false),
            ]);
        }

        FeatureDeclarations { spot, edge, track }
    }

    pub fn total(&self) -> usize {
        self.spot.len() + self.edge.len() + self.track.len()
    }
}

// ---------------------------------------------------------------------------
// Derived edge / track values
// ---------------------------------------------------------------------------

/// Value of a derived edge feature for the link `source → target`. The
/// spot id features are not derived and give `None`.
pub fn edge_feature(key: &str, source: &Spot, target: &Spot, cal: &Calibration) -> Option<f64> {
    let value = match key {
        "LINK_COST" => source.square_distance_to(target),
        "EDGE_TIME" => 0.5 * (cal.time_of(source.frame) + cal.time_of(target.frame)),
        "DISPLACEMENT" => source.square_distance_to(target).sqrt(),
        "SPEED" => {
            let dt = cal.time_of(target.frame) - cal.time_of(source.frame);
            if dt == 0.0 {
                return None;
            }
            source.square_distance_to(target).sqrt() / dt
        }
        _ => return None,
    };
    Some(value)
}

/// Value of a derived track feature. `position` is the rank of the track
/// among all tracks of the graph. `TRACK_ID` is not derived and gives `None`.
pub fn track_feature(
    key: &str,
    graph: &EntityGraph,
    track: &Track,
    position: usize,
    cal: &Calibration,
) -> Option<f64> {
    let first = graph.spot(*track.spots.first()?);
    let last = graph.spot(*track.spots.last()?);
    let value = match key {
        "TRACK_INDEX" => position as f64,
        "NUMBER_SPOTS" => track.spots.len() as f64,
        "TRACK_START" => cal.time_of(first.frame),
        "TRACK_STOP" => cal.time_of(last.frame),
        "TRACK_DURATION" => cal.time_of(last.frame) - cal.time_of(first.frame),
        "TRACK_MEAN_QUALITY" => {
            let qualities: Vec<f64> = graph.resolve(&track.spots).filter_map(|s| s.quality).collect();
            if qualities.is_empty() {
                return None;
            }
            qualities.iter().sum::<f64>() / qualities.len() as f64
        }
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::grouper::group;
    use crate::data::model::default_name;

    fn spot(id: u64, frame: u32, x: f64, quality: Option<f64>) -> Spot {
        Spot {
            id,
            x,
            y: 0.0,
            z: 0.0,
            frame,
            radius: 1.0,
            quality,
            name: default_name(id),
            track_index: Some(3),
            features: Default::default(),
        }
    }

    #[test]
    fn minimal_declarations_skip_statistics_and_extras() {
        let decl = FeatureDeclarations::for_export(false, ["AREA"]);
        assert!(decl.spot.iter().all(|f| f.key != "AREA"));
        assert_eq!(decl.edge.len(), 3);
        assert_eq!(decl.track.len(), 2);
    }

    #[test]
    fn full_declarations_include_extras() {
        let decl = FeatureDeclarations::for_export(true, ["AREA"]);
        assert!(decl.spot.iter().any(|f| f.key == "AREA"));
        assert!(decl.track.iter().any(|f| f.key == "TRACK_DURATION"));
        assert_eq!(decl.total(), 9 + 6 + 7);
    }

    #[test]
    fn dimension_round_trips_through_text() {
        for d in [Dimension::Position, Dimension::Time, Dimension::Velocity] {
            assert_eq!(d.to_string().parse::<Dimension>().unwrap(), d);
        }
        assert_eq!("INTENSITY".parse::<Dimension>().unwrap(), Dimension::None);
    }

    #[test]
    fn track_statistics_use_frame_interval() {
        let graph = group(vec![
            spot(0, 2, 0.0, Some(1.0)),
            spot(1, 6, 3.0, None),
            spot(2, 4, 1.0, Some(3.0)),
        ])
        .unwrap();
        let cal = Calibration {
            frame_interval: 0.5,
            ..Default::default()
        };
        let track = &graph.tracks()[&3];
        let value = |key| track_feature(key, &graph, track, 0, &cal).unwrap();
        assert_eq!(value("NUMBER_SPOTS"), 3.0);
        assert_eq!(value("TRACK_START"), 1.0);
        assert_eq!(value("TRACK_STOP"), 3.0);
        assert_eq!(value("TRACK_DURATION"), 2.0);
        assert_eq!(value("TRACK_MEAN_QUALITY"), 2.0);
        assert_eq!(value("TRACK_INDEX"), 0.0);
    }

    #[test]
    fn edge_speed_is_displacement_over_time() {
        let cal = Calibration {
            frame_interval: 2.0,
            ..Default::default()
        };
        let a = spot(0, 1, 0.0, None);
        let b = spot(1, 2, 4.0, None);
        assert_eq!(edge_feature("LINK_COST", &a, &b, &cal), Some(16.0));
        assert_eq!(edge_feature("DISPLACEMENT", &a, &b, &cal), Some(4.0));
        assert_eq!(edge_feature("SPEED", &a, &b, &cal), Some(2.0));
        assert_eq!(edge_feature("EDGE_TIME", &a, &b, &cal), Some(3.0));
        assert_eq!(edge_feature("UNKNOWN", &a, &b, &cal), None);
    }
}
