use tracing::debug;

use crate::output::{OutputError, OutputStream};
use crate::value::{Fields, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct EmittedRow {
    pub entity_type: String,
    pub fields: Fields,
}

impl EmittedRow {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Keeps every row in memory.
#[derive(Debug, Default)]
pub struct DebugOutputStream {
    rows: Vec<EmittedRow>,
    closed: bool,
}

impl DebugOutputStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[EmittedRow] {
        &self.rows
    }

    pub fn rows_of<'a>(&'a self, entity_type: &'a str) -> impl Iterator<Item = &'a EmittedRow> {
        self.rows
            .iter()
            .filter(move |row| row.entity_type == entity_type)
    }

    /// First row of `entity_type` whose fields include every pair in `expected`.
    pub fn find_row<'a>(
        &'a self,
        entity_type: &'a str,
        expected: &[(&str, Value)],
    ) -> Option<&'a EmittedRow> {
        self.rows_of(entity_type).find(|row| {
            expected
                .iter()
                .all(|(name, value)| row.fields.get(*name) == Some(value))
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn into_rows(self) -> Vec<EmittedRow> {
        self.rows
    }
}

impl OutputStream for DebugOutputStream {
    fn write_row(&mut self, entity_type: &str, fields: &Fields) -> Result<(), OutputError> {
        debug!(entity_type, ?fields, "row emitted");
        self.rows.push(EmittedRow {
            entity_type: entity_type.to_string(),
            fields: fields.clone(),
        });
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        self.closed = true;
        Ok(())
    }
}
