use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use log::debug;

use super::mapping::{Slot, ValidatedMapping};
use super::model::{default_name, Spot, CORE_SPOT_KEYS};
use crate::error::{ConvertError, Result};

// ---------------------------------------------------------------------------
// RowAssembler – one CSV row → one Spot
// ---------------------------------------------------------------------------

/// Turns rows into spots according to a validated mapping.
///
/// One assembler serves one conversion run: it owns the counter used to
/// synthesize spot ids when the mapping has no id column, and it checks the
/// mapped columns against the width of the first row it sees.
#[derive(Debug)]
pub struct RowAssembler<'m> {
    mapping: &'m ValidatedMapping,
    headers: Option<Vec<String>>,
    /// `(column, feature name)` for unbound columns carried as features.
    extra_columns: Vec<(usize, String)>,
    next_id: u64,
    first_row_seen: bool,
}

impl<'m> RowAssembler<'m> {
    pub fn new(mapping: &'m ValidatedMapping) -> Self {
        RowAssembler {
            mapping,
            headers: None,
            extra_columns: Vec::new(),
            next_id: 0,
            first_row_seen: false,
        }
    }

    /// Use header names to name the extra feature columns.
    pub fn with_headers(mut self, headers: &[String]) -> Self {
        self.headers = Some(headers.to_vec());
        self
    }

    /// Feature names of the unbound columns carried on each spot, in column
    /// order. Empty until the first row has been assembled.
    pub fn extra_features(&self) -> impl Iterator<Item = &str> {
        self.extra_columns.iter().map(|(_, name)| name.as_str())
    }

    /// Assemble every row, stopping at the first defect.
    ///
    /// Rows without a usable id get ids above every id present in `rows`.
    pub fn assemble_all<S: AsRef<str>>(&mut self, rows: &[Vec<S>]) -> Result<Vec<Spot>> {
        self.reserve_ids(rows);
        rows.iter()
            .enumerate()
            .map(|(i, row)| self.assemble(row, i))
            .collect()
    }

    /// Build the spot described by `row`.
    ///
    /// `row_index` is only used in error messages and logs. Synthesized ids
    /// only avoid ids seen by [`assemble_all`](Self::assemble_all).
    pub fn assemble<S: AsRef<str>>(&mut self, row: &[S], row_index: usize) -> Result<Spot> {
        if !self.first_row_seen {
            self.inspect_first_row(row.len(), row_index)?;
        }
        let mapping = self.mapping;
        let m = mapping.mapping();

        let x: f64 = required(row, mapping.x_col(), Slot::X, row_index)?;
        let y: f64 = required(row, mapping.y_col(), Slot::Y, row_index)?;
        let frame: u32 = required(row, mapping.frame_col(), Slot::Frame, row_index)?;

        let z = optional::<f64, S>(row, m.z_col, Slot::Z, row_index).unwrap_or(0.0);
        let quality = optional(row, m.quality_col, Slot::Quality, row_index);
        let track_index = optional(row, m.track_col, Slot::Track, row_index);

        let radius = match optional::<f64, S>(row, m.radius_col, Slot::Radius, row_index)
            .or(m.default_radius)
        {
            Some(r) => r,
            None => {
                return Err(ConvertError::UnparsableValue {
                    row: row_index,
                    slot: Slot::Radius,
                    value: raw_cell(row, m.radius_col).unwrap_or_default().to_string(),
                })
            }
        };

        let id = match optional(row, m.id_col, Slot::Id, row_index) {
            Some(id) => id,
            None => {
                let id = self.next_id;
                self.next_id += 1;
                id
            }
        };

        let name = raw_cell(row, m.name_col)
            .map(str::to_string)
            .unwrap_or_else(|| default_name(id));

        let mut features = BTreeMap::new();
        for (col, feature) in &self.extra_columns {
            if let Some(raw) = raw_cell(row, Some(*col)) {
                match raw.parse::<f64>() {
                    Ok(v) => {
                        features.insert(feature.clone(), v);
                    }
                    Err(_) => debug!("row {row_index}: feature {feature} is not numeric ('{raw}')"),
                }
            }
        }

        Ok(Spot {
            id,
            x,
            y,
            z,
            frame,
            radius,
            quality,
            name,
            track_index,
            features,
        })
    }

    /// Move the id counter past the largest id found in the id column.
    fn reserve_ids<S: AsRef<str>>(&mut self, rows: &[Vec<S>]) {
        let id_col = self.mapping.mapping().id_col;
        let largest = rows
            .iter()
            .filter_map(|row| raw_cell(row, id_col)?.parse::<u64>().ok())
            .max();
        if let Some(largest) = largest {
            self.next_id = self.next_id.max(largest.saturating_add(1));
        }
    }

    /// Range-check every bound column against the first row and work out
    /// which unbound columns become features.
    fn inspect_first_row(&mut self, width: usize, row_index: usize) -> Result<()> {
        let bound = self.mapping.mapping().bound_columns();
        if let Some(&(slot, column)) = bound.iter().find(|(_, col)| *col >= width) {
            return Err(ConvertError::ColumnOutOfRange {
                row: row_index,
                slot,
                column,
                width,
            });
        }

        if self.mapping.declare_all_features() {
            // Core keys and earlier columns keep their names; a clash gets
            // the column index appended.
            let mut taken: BTreeSet<String> =
                CORE_SPOT_KEYS.iter().map(|k| k.to_string()).collect();
            self.extra_columns = (0..width)
                .filter(|col| !bound.iter().any(|(_, b)| b == col))
                .map(|col| {
                    let key = self
                        .headers
                        .as_ref()
                        .and_then(|h| h.get(col))
                        .map(|h| feature_key(h))
                        .filter(|k| !k.is_empty())
                        .unwrap_or_else(|| format!("COL_{col}"));
                    let mut name = key.clone();
                    while taken.contains(&name) {
                        name = format!("{name}_{col}");
                    }
                    if name != key {
                        debug!("column {col}: feature {key} already exists, using {name}");
                    }
                    taken.insert(name.clone());
                    (col, name)
                })
                .collect();
        }
        self.first_row_seen = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cell helpers
// ---------------------------------------------------------------------------

/// Trimmed, non-empty cell at `col`, if the column is bound and present.
fn raw_cell<S: AsRef<str>>(row: &[S], col: Option<usize>) -> Option<&str> {
    let cell = row.get(col?)?.as_ref().trim();
    (!cell.is_empty()).then_some(cell)
}

fn required<T, S>(row: &[S], col: usize, slot: Slot, row_index: usize) -> Result<T>
where
    T: FromStr + Finite,
    S: AsRef<str>,
{
    let cell = row
        .get(col)
        .ok_or(ConvertError::ColumnOutOfRange {
            row: row_index,
            slot,
            column: col,
            width: row.len(),
        })?
        .as_ref()
        .trim();

    cell.parse::<T>()
        .ok()
        .filter(Finite::is_finite_value)
        .ok_or_else(|| ConvertError::UnparsableValue {
            row: row_index,
            slot,
            value: cell.to_string(),
        })
}

/// Optional attributes degrade to `None` when missing or malformed.
fn optional<T, S>(row: &[S], col: Option<usize>, slot: Slot, row_index: usize) -> Option<T>
where
    T: FromStr + Finite,
    S: AsRef<str>,
{
    let raw = raw_cell(row, col)?;
    let parsed = raw.parse::<T>().ok().filter(Finite::is_finite_value);
    if parsed.is_none() {
        debug!("row {row_index}: ignoring unparsable {slot} value '{raw}'");
    }
    parsed
}

/// Rejects NaN / infinite reals; integers always pass.
trait Finite {
    fn is_finite_value(&self) -> bool;
}

impl Finite for f64 {
    fn is_finite_value(&self) -> bool {
        self.is_finite()
    }
}

macro_rules! finite_int {
    ($($t:ty),*) => {
        $(impl Finite for $t {
            fn is_finite_value(&self) -> bool {
                true
            }
        })*
    };
}

finite_int!(u32, u64, i64);

/// Feature name derived from a column header: upper case, with anything
/// outside `[A-Z0-9_]` replaced by `_`.
pub fn feature_key(header: &str) -> String {
    header
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
