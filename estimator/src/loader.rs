//! Delimited-file ingestion into a [`Dataset`].
//!
//! Files are memory-mapped and parsed with the `csv` crate. The first record
//! is the header. Cells are kept verbatim unless [`LoadOptions::trim`] is set,
//! since padded values (`"NEW YORK       "`) are distinct cells.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Instant;

use csv::{ReaderBuilder, Trim};
use memmap2::Mmap;
use tracing::info;

use crate::dataset::{Dataset, DatasetBuilder};
use crate::error::DatasetError;

/// Parsing options for [`load_csv`] and [`read_csv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    pub delimiter: u8,
    /// Strip leading/trailing whitespace from headers and cells.
    pub trim: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            trim: false,
        }
    }
}

/// Memory-map `path` and parse it as delimited text.
pub fn load_csv(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Dataset, DatasetError> {
    let path = path.as_ref();
    let start = Instant::now();

    let file = File::open(path).map_err(|e| DatasetError::io(path, e))?;
    let len = file.metadata().map_err(|e| DatasetError::io(path, e))?.len();
    if len == 0 {
        return Err(DatasetError::MissingHeader);
    }
    // The map is read-only and dropped before returning.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| DatasetError::io(path, e))?;
    let dataset = read_csv(&mmap[..], options)?;

    info!(
        path = %path.display(),
        rows = dataset.num_rows(),
        columns = dataset.num_columns(),
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "loaded dataset"
    );
    Ok(dataset)
}

/// Parse delimited text from any reader.
pub fn read_csv<R: Read>(reader: R, options: &LoadOptions) -> Result<Dataset, DatasetError> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(options.delimiter)
        .trim(if options.trim { Trim::All } else { Trim::None })
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    if headers.is_empty() {
        return Err(DatasetError::MissingHeader);
    }

    let mut builder = DatasetBuilder::new(headers.iter())?;
    for record in rdr.records() {
        let record = record?;
        builder.push_row(record.iter())?;
    }
    Ok(builder.finish())
}
