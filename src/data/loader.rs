use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;

use log::{debug, info};

use crate::error::Result;

// ---------------------------------------------------------------------------
// CsvTable – rows of string cells, positional
// ---------------------------------------------------------------------------

/// A CSV file loaded into memory. Columns are addressed by position only;
/// header names, when present, just name feature columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvTable {
    pub headers: Option<Vec<String>>,
    pub rows: Vec<Vec<String>>,
    pub metadata: CsvMetadata,
}

impl CsvTable {
    /// Number of data rows (header excluded).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// How to read a CSV file.
#[derive(Debug, Clone, Copy)]
pub struct CsvOptions {
    /// Treat the first non-comment line as a header.
    pub has_header: bool,
    pub delimiter: u8,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            has_header: true,
            delimiter: b',',
        }
    }
}

// ---------------------------------------------------------------------------
// CsvMetadata – leading `# key, value` lines
// ---------------------------------------------------------------------------

/// Key/value pairs found in the comment block at the top of a CSV file,
/// e.g. `# pixel size, 0.2`. Keys are lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvMetadata(pub BTreeMap<String, String>);

impl CsvMetadata {
    /// Collect metadata from the leading comment lines of `text`.
    pub fn parse(text: &str) -> Self {
        let mut map = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim();
            if !line.starts_with('#') {
                break;
            }
            let mut parts = line.trim_start_matches('#').splitn(2, ',');
            let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
                continue;
            };
            map.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
        CsvMetadata(map)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CsvMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No metadata");
        }
        for (key, value) in &self.0 {
            writeln!(f, " - {key} = {value}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Load a CSV file from disk.
pub fn read_csv(path: &Path, options: CsvOptions) -> Result<CsvTable> {
    let text = std::fs::read_to_string(path)?;
    let table = parse_csv(&text, options)?;
    info!(
        "Read {} records from {}",
        table.len(),
        path.display()
    );
    Ok(table)
}

/// Parse CSV text. Rows may have different widths; `#` lines are skipped.
pub fn parse_csv(text: &str, options: CsvOptions) -> Result<CsvTable> {
    let metadata = CsvMetadata::parse(text);
    if !metadata.is_empty() {
        debug!("CSV metadata:\n{metadata}");
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(options.has_header)
        .delimiter(options.delimiter)
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = if options.has_header {
        Some(reader.headers()?.iter().map(|h| h.trim().to_string()).collect())
    } else {
        None
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(CsvTable {
        headers,
        rows,
        metadata,
    })
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Write a table (header first, if any) as comma-separated text.
pub fn write_csv<W: io::Write>(sink: W, table: &CsvTable) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(sink);
    if let Some(headers) = &table.headers {
        writer.write_record(headers)?;
    }
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a table to `path`, replacing any existing file.
pub fn write_csv_file(path: &Path, table: &CsvTable) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_csv(io::BufWriter::new(file), table)?;
    info!("Wrote {} rows to {}", table.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# Pixel size, 0.25
# units, um
#no comma here
frame,x,y
0,1.0,2.0
1,1.5
# trailing comment
2,3.0,4.0,extra
";

    #[test]
    fn metadata_comes_from_leading_comments() {
        let table = parse_csv(SAMPLE, CsvOptions::default()).unwrap();
        assert_eq!(table.metadata.get("pixel size"), Some("0.25"));
        assert_eq!(table.metadata.get("units"), Some("um"));
        assert_eq!(table.metadata.0.len(), 2);
    }

    #[test]
    fn ragged_rows_and_comments_are_tolerated() {
        let table = parse_csv(SAMPLE, CsvOptions::default()).unwrap();
        assert_eq!(
            table.headers,
            Some(vec!["frame".to_string(), "x".to_string(), "y".to_string()])
        );
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows[1], vec!["1", "1.5"]);
        assert_eq!(table.rows[2].len(), 4);
    }

    #[test]
    fn headerless_files_keep_first_row_as_data() {
        let options = CsvOptions {
            has_header: false,
            ..Default::default()
        };
        let table = parse_csv("0,1,2\n1,2,3\n", options).unwrap();
        assert!(table.headers.is_none());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn written_table_parses_back() {
        let table = CsvTable {
            headers: Some(vec!["id".into(), "name".into()]),
            rows: vec![vec!["0".into(), "a, b".into()], vec!["1".into(), "".into()]],
            metadata: CsvMetadata::default(),
        };
        let mut buf = Vec::new();
        write_csv(&mut buf, &table).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let back = parse_csv(&text, CsvOptions::default()).unwrap();
        assert_eq!(back.headers, table.headers);
        assert_eq!(back.rows, table.rows);
    }

    #[test]
    fn empty_metadata_displays_placeholder() {
        assert_eq!(CsvMetadata::default().to_string(), "No metadata\n");
    }
}
