/// Data layer: column mapping, row assembly and grouping.
///
/// Architecture:
/// ```text
///   .csv
///     │
///     ▼
///   ┌──────────┐
///   │  loader   │  parse file → CsvTable (rows of cells)
///   └──────────┘
///     │            ┌──────────┐
///     │  ◀──────── │ mapping   │  ColumnMapping → validate → ValidatedMapping
///     ▼            └──────────┘
///   ┌───────────┐
///   │ assembler  │  one row → one Spot
///   └───────────┘
///     │
///     ▼
///   ┌──────────┐
///   │ grouper   │  Vec<Spot> → EntityGraph (frames, tracks, ungrouped)
///   └──────────┘
/// ```

pub mod assembler;
pub mod grouper;
pub mod loader;
pub mod mapping;
pub mod model;
