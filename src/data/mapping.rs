use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

// ---------------------------------------------------------------------------
// Slot – a semantic spot attribute a column can be bound to
// ---------------------------------------------------------------------------

/// The semantic attributes a CSV column can supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Slot {
    X,
    Y,
    Z,
    Frame,
    Id,
    Quality,
    Name,
    Track,
    Radius,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Slot::X => "x",
            Slot::Y => "y",
            Slot::Z => "z",
            Slot::Frame => "frame",
            Slot::Id => "id",
            Slot::Quality => "quality",
            Slot::Name => "name",
            Slot::Track => "track",
            Slot::Radius => "radius",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// ColumnMapping – declarative column → attribute binding
// ---------------------------------------------------------------------------

/// Which CSV column (0-based) supplies each spot attribute.
///
/// Built once as a plain value (struct literal, JSON file or CLI flags) and
/// checked with [`validate`] before any row is read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ColumnMapping {
    pub x_col: Option<usize>,
    pub y_col: Option<usize>,
    pub frame_col: Option<usize>,
    pub z_col: Option<usize>,
    pub id_col: Option<usize>,
    pub quality_col: Option<usize>,
    pub name_col: Option<usize>,
    pub track_col: Option<usize>,
    pub radius_col: Option<usize>,
    /// Radius used for every spot when `radius_col` is not set.
    pub default_radius: Option<f64>,
    /// Carry unbound columns as spot features and declare the full feature set.
    pub declare_all_features: bool,
}

impl ColumnMapping {
    /// Mapping matching the column layout produced by an import:
    /// `id, x, y, z, frame, quality, name, track, radius, …features`.
    pub fn canonical() -> Self {
        ColumnMapping {
            id_col: Some(0),
            x_col: Some(1),
            y_col: Some(2),
            z_col: Some(3),
            frame_col: Some(4),
            quality_col: Some(5),
            name_col: Some(6),
            track_col: Some(7),
            radius_col: Some(8),
            default_radius: None,
            declare_all_features: true,
        }
    }

    /// Column bound to `slot`, if any.
    pub fn column(&self, slot: Slot) -> Option<usize> {
        match slot {
            Slot::X => self.x_col,
            Slot::Y => self.y_col,
            Slot::Z => self.z_col,
            Slot::Frame => self.frame_col,
            Slot::Id => self.id_col,
            Slot::Quality => self.quality_col,
            Slot::Name => self.name_col,
            Slot::Track => self.track_col,
            Slot::Radius => self.radius_col,
        }
    }

    /// All bound `(slot, column)` pairs in a fixed slot order.
    pub fn bound_columns(&self) -> Vec<(Slot, usize)> {
        const ORDER: [Slot; 9] = [
            Slot::X,
            Slot::Y,
            Slot::Frame,
            Slot::Z,
            Slot::Id,
            Slot::Quality,
            Slot::Name,
            Slot::Track,
            Slot::Radius,
        ];
        ORDER
            .iter()
            .filter_map(|&slot| self.column(slot).map(|col| (slot, col)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A mapping that passed [`validate`].
///
/// Row assembly only accepts this type, so a conversion cannot skip
/// validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedMapping {
    mapping: ColumnMapping,
    x_col: usize,
    y_col: usize,
    frame_col: usize,
}

impl ValidatedMapping {
    /// The mapping as it was given.
    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    pub fn x_col(&self) -> usize {
        self.x_col
    }

    pub fn y_col(&self) -> usize {
        self.y_col
    }

    pub fn frame_col(&self) -> usize {
        self.frame_col
    }

    pub fn declare_all_features(&self) -> bool {
        self.mapping.declare_all_features
    }
}

/// Check that `mapping` is sufficient to build spots.
///
/// Pure check: the returned mapping is the input, unchanged.
pub fn validate(mapping: &ColumnMapping) -> Result<ValidatedMapping> {
    let x_col = mapping
        .x_col
        .ok_or(ConvertError::MissingRequiredColumn(Slot::X))?;
    let y_col = mapping
        .y_col
        .ok_or(ConvertError::MissingRequiredColumn(Slot::Y))?;
    let frame_col = mapping
        .frame_col
        .ok_or(ConvertError::MissingRequiredColumn(Slot::Frame))?;

    match (mapping.radius_col, mapping.default_radius) {
        (None, None) => return Err(ConvertError::MissingRadiusSource),
        (_, Some(r)) if !(r.is_finite() && r > 0.0) => {
            return Err(ConvertError::InvalidDefaultRadius(r))
        }
        _ => {}
    }

    let mut seen: BTreeMap<usize, Slot> = BTreeMap::new();
    for (slot, column) in mapping.bound_columns() {
        if let Some(&first) = seen.get(&column) {
            return Err(ConvertError::DuplicateColumnAssignment {
                column,
                first,
                second: slot,
            });
        }
        seen.insert(column, slot);
    }

    Ok(ValidatedMapping {
        mapping: mapping.clone(),
        x_col,
        y_col,
        frame_col,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> ColumnMapping {
        ColumnMapping {
            x_col: Some(1),
            y_col: Some(2),
            frame_col: Some(0),
            default_radius: Some(1.0),
            ..Default::default()
        }
    }

    #[test]
    fn minimal_mapping_is_valid_and_unchanged() {
        let mapping = minimal();
        let valid = validate(&mapping).unwrap();
        assert_eq!(valid.mapping(), &mapping);
        assert_eq!((valid.x_col(), valid.y_col(), valid.frame_col()), (1, 2, 0));
    }

    #[test]
    fn missing_frame_column_is_reported() {
        let mapping = ColumnMapping {
            frame_col: None,
            ..minimal()
        };
        assert!(matches!(
            validate(&mapping),
            Err(ConvertError::MissingRequiredColumn(Slot::Frame))
        ));
    }

    #[test]
    fn missing_radius_source_is_reported() {
        let mapping = ColumnMapping {
            default_radius: None,
            ..minimal()
        };
        assert!(matches!(
            validate(&mapping),
            Err(ConvertError::MissingRadiusSource)
        ));
    }

    #[test]
    fn radius_column_alone_is_enough() {
        let mapping = ColumnMapping {
            default_radius: None,
            radius_col: Some(3),
            ..minimal()
        };
        assert!(validate(&mapping).is_ok());
    }

    #[test]
    fn non_positive_default_radius_is_rejected() {
        for r in [0.0, -2.0, f64::NAN] {
            let mapping = ColumnMapping {
                default_radius: Some(r),
                ..minimal()
            };
            assert!(matches!(
                validate(&mapping),
                Err(ConvertError::InvalidDefaultRadius(_))
            ));
        }
    }

    #[test]
    fn shared_column_is_reported_with_both_slots() {
        let mapping = ColumnMapping {
            track_col: Some(2),
            ..minimal()
        };
        match validate(&mapping) {
            Err(ConvertError::DuplicateColumnAssignment {
                column,
                first,
                second,
            }) => {
                assert_eq!(column, 2);
                assert_eq!(first, Slot::Y);
                assert_eq!(second, Slot::Track);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn canonical_mapping_validates() {
        assert!(validate(&ColumnMapping::canonical()).is_ok());
    }

    #[test]
    fn mapping_loads_from_camel_case_json() {
        let json = r#"{ "xCol": 1, "yCol": 2, "frameCol": 0, "trackCol": 4, "defaultRadius": 2.5 }"#;
        let mapping: ColumnMapping = serde_json::from_str(json).unwrap();
        assert_eq!(mapping.track_col, Some(4));
        assert_eq!(mapping.default_radius, Some(2.5));
        assert!(!mapping.declare_all_features);
    }
}
