use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::output::{OutputError, OutputStream};
use crate::value::Fields;

type TableWriter = ::csv::Writer<CountingWriter<BufWriter<File>>>;

struct CsvTable {
    path: PathBuf,
    columns: Vec<String>,
    writer: TableWriter,
    rows: u64,
}

/// One `<entity_type>.csv` per entity type; the first row of a type fixes its header.
pub struct CsvOutputStream {
    dir: PathBuf,
    tables: BTreeMap<String, CsvTable>,
}

impl CsvOutputStream {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, OutputError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            tables: BTreeMap::new(),
        })
    }

    /// Files written so far, by entity type.
    pub fn files(&self) -> BTreeMap<String, PathBuf> {
        self.tables
            .iter()
            .map(|(entity_type, table)| (entity_type.clone(), table.path.clone()))
            .collect()
    }

    pub fn rows_written(&self, entity_type: &str) -> u64 {
        self.tables.get(entity_type).map_or(0, |table| table.rows)
    }

    /// Bytes handed to the files; exact once the stream is closed.
    pub fn bytes_written(&self) -> u64 {
        self.tables
            .values()
            .map(|table| table.writer.get_ref().bytes_written())
            .sum()
    }
}

impl OutputStream for CsvOutputStream {
    fn write_row(&mut self, entity_type: &str, fields: &Fields) -> Result<(), OutputError> {
        let table = match self.tables.entry(entity_type.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(open_table(&self.dir, entity_type, fields)?),
        };

        if let Some(extra) = fields.keys().find(|name| !table.columns.contains(*name)) {
            return Err(OutputError::ShapeMismatch {
                entity_type: entity_type.to_string(),
                field: extra.clone(),
            });
        }

        let record: Vec<String> = table
            .columns
            .iter()
            .map(|column| {
                fields
                    .get(column)
                    .map(|value| value.to_string())
                    .unwrap_or_default()
            })
            .collect();
        table.writer.write_record(&record)?;
        table.rows += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        for table in self.tables.values_mut() {
            table.writer.flush()?;
        }
        Ok(())
    }
}

fn open_table(dir: &Path, entity_type: &str, fields: &Fields) -> Result<CsvTable, OutputError> {
    let path = dir.join(format!("{entity_type}.csv"));
    let counting = CountingWriter::new(BufWriter::new(File::create(&path)?));
    let mut writer = ::csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(counting);

    let columns: Vec<String> = fields.keys().cloned().collect();
    writer.write_record(&columns)?;
    debug!(entity_type, path = %path.display(), columns = columns.len(), "csv file opened");

    Ok(CsvTable {
        path,
        columns,
        writer,
        rows: 0,
    })
}

struct CountingWriter<W: Write> {
    inner: W,
    bytes: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, bytes: 0 }
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let size = self.inner.write(buf)?;
        self.bytes = self.bytes.saturating_add(size as u64);
        Ok(size)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
