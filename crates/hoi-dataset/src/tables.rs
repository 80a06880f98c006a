//! CSV frequency tables.
//!
//! Readers locate columns by header name and trim every cell. Any missing or
//! non-integer cell is an error naming its line and column; nothing is
//! defaulted here.

use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim, Writer};
use hoi_types::{Action, FrequencyRecord, GroundTruthInteraction, MergedRow, Rarity, TermFrequency};
use thiserror::Error;

pub const MERGED_HEADER: [&str; 10] = [
    "Interaction",
    "Verb",
    "Object",
    "Interaction_freq_ngrams",
    "Verb_freq_ngrams",
    "Object_freq_ngrams",
    "Interaction_freq_hoi",
    "Verb_freq_hoi",
    "Object_freq_hoi",
    "IsRare_hoi",
];

#[derive(Debug, Error)]
pub enum TableError {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("missing column `{0}`")]
    MissingColumn(&'static str),
    #[error("line {line}: empty `{column}` cell")]
    MissingCell { line: usize, column: &'static str },
    #[error("line {line}: `{column}` must be a whole number, got {value:?}")]
    InvalidNumber {
        line: usize,
        column: &'static str,
        value: String,
    },
    #[error("line {line}: `IsRare` must be -1, 0 or 1, got {value:?}")]
    InvalidRarity { line: usize, value: String },
    #[error("line {line}: `{column}` cell {value:?} contains a comma")]
    CommaInLabel {
        line: usize,
        column: &'static str,
        value: String,
    },
}

/// Which term a single-column frequency table describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TermColumn {
    Verb,
    Object,
}

impl TermColumn {
    pub fn header(self) -> &'static str {
        match self {
            TermColumn::Verb => "Verb",
            TermColumn::Object => "Object",
        }
    }
}

struct Columns {
    headers: StringRecord,
}

impl Columns {
    fn index(&self, name: &'static str) -> Result<usize, TableError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or(TableError::MissingColumn(name))
    }
}

struct Cells<'a> {
    record: &'a StringRecord,
    line: usize,
}

impl Cells<'_> {
    fn text(&self, idx: usize, column: &'static str) -> Result<String, TableError> {
        match self.record.get(idx) {
            Some(cell) if !cell.is_empty() => Ok(cell.to_string()),
            _ => Err(TableError::MissingCell {
                line: self.line,
                column,
            }),
        }
    }

    /// A verb or object cell. Commas are rejected: the join key is
    /// `verb,object`, so they would make distinct pairs collide.
    fn label(&self, idx: usize, column: &'static str) -> Result<String, TableError> {
        let value = self.text(idx, column)?;
        if value.contains(',') {
            return Err(TableError::CommaInLabel {
                line: self.line,
                column,
                value,
            });
        }
        Ok(value)
    }

    fn count(&self, idx: usize, column: &'static str) -> Result<u64, TableError> {
        let raw = self.text(idx, column)?;
        parse_whole(&raw).ok_or(TableError::InvalidNumber {
            line: self.line,
            column,
            value: raw,
        })
    }

    fn rarity(&self, idx: usize) -> Result<Rarity, TableError> {
        let raw = self.text(idx, "IsRare")?;
        raw.parse::<i64>()
            .ok()
            .and_then(Rarity::from_code)
            .ok_or(TableError::InvalidRarity {
                line: self.line,
                value: raw,
            })
    }
}

// Accepts `12` and the `12.0` a float-typed writer may emit.
fn parse_whole(raw: &str) -> Option<u64> {
    if let Ok(value) = raw.parse::<u64>() {
        return Some(value);
    }
    let float = raw.parse::<f64>().ok()?;
    (float.is_finite() && float >= 0.0 && float.fract() == 0.0).then_some(float as u64)
}

fn read_rows<R, T, F>(reader: R, mut parse: F) -> Result<Vec<T>, TableError>
where
    R: Read,
    F: FnMut(&Columns, &Cells<'_>) -> Result<T, TableError>,
{
    let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    let columns = Columns {
        headers: rdr.headers()?.clone(),
    };
    let mut rows = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record?;
        // Quoted cells may span lines, so take the line from the reader.
        let line = record
            .position()
            .map_or(idx + 2, |pos| pos.line() as usize);
        let cells = Cells {
            record: &record,
            line,
        };
        rows.push(parse(&columns, &cells)?);
    }
    Ok(rows)
}

/// Read a `Verb,Object,Frequency` table.
pub fn read_frequency_table<R: Read>(reader: R) -> Result<Vec<FrequencyRecord>, TableError> {
    read_rows(reader, |cols, cells| {
        Ok(FrequencyRecord {
            label: Action::new(
                cells.label(cols.index("Verb")?, "Verb")?,
                cells.label(cols.index("Object")?, "Object")?,
            ),
            frequency: cells.count(cols.index("Frequency")?, "Frequency")?,
        })
    })
}

/// Read a `Verb,Object,Frequency,IsRare` table.
pub fn read_ground_truth_table<R: Read>(
    reader: R,
) -> Result<Vec<GroundTruthInteraction>, TableError> {
    read_rows(reader, |cols, cells| {
        Ok(GroundTruthInteraction {
            verb: cells.label(cols.index("Verb")?, "Verb")?,
            object: cells.label(cols.index("Object")?, "Object")?,
            frequency: cells.count(cols.index("Frequency")?, "Frequency")?,
            rarity: cells.rarity(cols.index("IsRare")?)?,
        })
    })
}

/// Read a `Verb,Frequency` or `Object,Frequency` table.
pub fn read_term_table<R: Read>(
    reader: R,
    column: TermColumn,
) -> Result<Vec<TermFrequency>, TableError> {
    read_rows(reader, |cols, cells| {
        Ok(TermFrequency {
            term: cells.label(cols.index(column.header())?, column.header())?,
            frequency: cells.count(cols.index("Frequency")?, "Frequency")?,
        })
    })
}

pub fn write_frequency_table<W: Write>(
    writer: W,
    rows: &[FrequencyRecord],
) -> Result<(), TableError> {
    write_rows(
        writer,
        &["Verb", "Object", "Frequency"],
        rows.iter().map(|row| {
            vec![
                row.label.verb.clone(),
                row.label.object.clone(),
                row.frequency.to_string(),
            ]
        }),
    )
}

pub fn write_ground_truth_table<W: Write>(
    writer: W,
    rows: &[GroundTruthInteraction],
) -> Result<(), TableError> {
    write_rows(
        writer,
        &["Verb", "Object", "Frequency", "IsRare"],
        rows.iter().map(|row| {
            vec![
                row.verb.clone(),
                row.object.clone(),
                row.frequency.to_string(),
                row.rarity.code().to_string(),
            ]
        }),
    )
}

pub fn write_term_table<W: Write>(
    writer: W,
    column: TermColumn,
    rows: &[TermFrequency],
) -> Result<(), TableError> {
    write_rows(
        writer,
        &[column.header(), "Frequency"],
        rows.iter()
            .map(|row| vec![row.term.clone(), row.frequency.to_string()]),
    )
}

/// Write the reconciled table in [`MERGED_HEADER`] column order.
pub fn write_merged_table<W: Write>(writer: W, rows: &[MergedRow]) -> Result<(), TableError> {
    write_rows(
        writer,
        &MERGED_HEADER,
        rows.iter().map(|row| {
            vec![
                row.key.to_string(),
                row.verb.clone(),
                row.object.clone(),
                row.corpus.interaction.to_string(),
                row.corpus.verb.to_string(),
                row.corpus.object.to_string(),
                row.ground_truth.interaction.to_string(),
                row.ground_truth.verb.to_string(),
                row.ground_truth.object.to_string(),
                row.rarity.code().to_string(),
            ]
        }),
    )
}

fn write_rows<W, I>(writer: W, header: &[&str], rows: I) -> Result<(), TableError>
where
    W: Write,
    I: IntoIterator<Item = Vec<String>>,
{
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(header)?;
    for row in rows {
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Open `path` for reading and apply one of the readers above.
pub fn read_path<T, F>(path: &Path, read: F) -> Result<T, TableError>
where
    F: FnOnce(std::fs::File) -> Result<T, TableError>,
{
    read(std::fs::File::open(path)?)
}

/// Create `path` and apply one of the writers above.
pub fn write_path<F>(path: &Path, write: F) -> Result<(), TableError>
where
    F: FnOnce(std::io::BufWriter<std::fs::File>) -> Result<(), TableError>,
{
    write(std::io::BufWriter::new(std::fs::File::create(path)?))
}
