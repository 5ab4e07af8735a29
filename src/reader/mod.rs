//! Chunked reading of the delimited source file.
//!
//! The reader resolves the header row into an explicit column map once,
//! then yields bounded-size chunks of raw rows. All demographic
//! derivation happens later, inside the workers.

use crate::error::{DemostatError, Result};
use crate::models::RawRow;
use csv::ReaderBuilder;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

/// Canonical names of the required columns.
pub const COL_ORIGIN: &str = "CP ORIGEN";
pub const COL_DESTINATION: &str = "CP DESTINO";
pub const COL_BIRTH_DATE: &str = "FECHA NACIMIENTO";
pub const COL_SPECIES: &str = "ESPECIE";
pub const COL_GENDER: &str = "GENERO";

/// The gender column sometimes ships under its accented spelling.
const COL_GENDER_ACCENTED: &str = "GÉNERO";

/// Default field separator of the source format.
pub const DEFAULT_DELIMITER: u8 = b';';

/// Resolved header positions of the required columns.
#[derive(Debug, Clone, Copy)]
pub struct ColumnMap {
    pub origin: usize,
    pub destination: usize,
    pub birth_date: usize,
    pub species: usize,
    pub gender: usize,
}

impl ColumnMap {
    /// Resolve the required columns from a header row.
    ///
    /// The gender column is accepted under either spelling and always
    /// reported under its canonical name afterwards. Any column entirely
    /// absent is a fatal error listing every missing name.
    pub fn resolve(headers: &csv::StringRecord) -> Result<Self> {
        let find = |candidates: &[&str]| {
            headers
                .iter()
                .position(|header| candidates.iter().any(|name| header.trim() == *name))
        };

        let origin = find(&[COL_ORIGIN]);
        let destination = find(&[COL_DESTINATION]);
        let birth_date = find(&[COL_BIRTH_DATE]);
        let species = find(&[COL_SPECIES]);
        let gender = find(&[COL_GENDER, COL_GENDER_ACCENTED]);

        let mut missing = Vec::new();
        for (name, position) in [
            (COL_ORIGIN, origin),
            (COL_DESTINATION, destination),
            (COL_BIRTH_DATE, birth_date),
            (COL_SPECIES, species),
            (COL_GENDER, gender),
        ] {
            if position.is_none() {
                missing.push(name.to_string());
            }
        }

        if !missing.is_empty() {
            return Err(DemostatError::MissingColumns { missing });
        }

        Ok(Self {
            origin: origin.unwrap(),
            destination: destination.unwrap(),
            birth_date: birth_date.unwrap(),
            species: species.unwrap(),
            gender: gender.unwrap(),
        })
    }

    /// Extract the required fields from one record.
    ///
    /// Short rows yield empty fields, which downstream normalization
    /// treats like any other missing value.
    pub fn extract(&self, record: &csv::StringRecord) -> RawRow {
        let field = |index: usize| record.get(index).unwrap_or("").to_string();

        RawRow {
            origin: field(self.origin),
            destination: field(self.destination),
            birth_date: field(self.birth_date),
            species: field(self.species),
            gender: field(self.gender),
        }
    }
}

/// A delimited source file read as bounded-size chunks.
pub struct ChunkedSource {
    path: String,
    reader: csv::Reader<File>,
    columns: ColumnMap,
    chunk_size: usize,
}

impl std::fmt::Debug for ChunkedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedSource")
            .field("path", &self.path)
            .field("columns", &self.columns)
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

impl ChunkedSource {
    /// Open the source and resolve its header.
    pub fn open(path: &Path, chunk_size: usize, delimiter: u8) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .quote(b'"')
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|err| DemostatError::Source {
                path: path.display().to_string(),
                reason: err.to_string(),
            })?;

        let headers = reader
            .headers()
            .map_err(|err| DemostatError::Source {
                path: path.display().to_string(),
                reason: err.to_string(),
            })?
            .clone();

        let columns = ColumnMap::resolve(&headers)?;
        debug!("Resolved columns: {:?}", columns);

        Ok(Self {
            path: path.display().to_string(),
            reader,
            columns,
            chunk_size,
        })
    }

    /// The source path as given.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The resolved column map.
    pub fn columns(&self) -> ColumnMap {
        self.columns
    }

    /// Iterate the remaining rows as chunks of at most `chunk_size`.
    pub fn chunks(&mut self) -> Chunks<'_> {
        Chunks {
            records: self.reader.records(),
            columns: self.columns,
            chunk_size: self.chunk_size,
            index: 0,
        }
    }

    /// Count the remaining rows without aggregating (dry-run support).
    pub fn count_rows(&mut self) -> Result<u64> {
        let mut rows = 0u64;
        for chunk in self.chunks() {
            rows += chunk?.len() as u64;
        }
        info!("Source holds {} data rows", rows);
        Ok(rows)
    }
}

/// Iterator over the chunks of a [`ChunkedSource`].
pub struct Chunks<'r> {
    records: csv::StringRecordsIter<'r, File>,
    columns: ColumnMap,
    chunk_size: usize,
    index: usize,
}

impl Iterator for Chunks<'_> {
    type Item = Result<Vec<RawRow>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut rows = Vec::with_capacity(self.chunk_size.min(1024));

        while rows.len() < self.chunk_size {
            match self.records.next() {
                Some(Ok(record)) => rows.push(self.columns.extract(&record)),
                Some(Err(err)) => {
                    return Some(Err(DemostatError::ChunkFailed {
                        index: self.index,
                        reason: err.to_string(),
                    }))
                }
                None => break,
            }
        }

        if rows.is_empty() {
            return None;
        }

        self.index += 1;
        Some(Ok(rows))
    }
}
