use std::io::Write;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::output::{OutputError, OutputStream};
use crate::value::Fields;

/// One JSON object per line: `_type` followed by the row's fields.
#[derive(Debug)]
pub struct JsonLinesOutputStream<W: Write> {
    writer: W,
    rows_written: u64,
}

impl<W: Write> JsonLinesOutputStream<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            rows_written: 0,
        }
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

struct JsonRow<'a> {
    entity_type: &'a str,
    fields: &'a Fields,
}

impl Serialize for JsonRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry("_type", self.entity_type)?;
        for (name, value) in self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<W: Write> OutputStream for JsonLinesOutputStream<W> {
    fn write_row(&mut self, entity_type: &str, fields: &Fields) -> Result<(), OutputError> {
        serde_json::to_writer(&mut self.writer, &JsonRow { entity_type, fields })?;
        self.writer.write_all(b"\n")?;
        self.rows_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}
