use indexmap::IndexMap;
use tracing::debug;

use crate::output::{OutputError, OutputStream};
use crate::value::Fields;

/// Receives full batches of rows of one entity type, e.g. a remote bulk API client.
pub trait BatchLoader {
    fn load_batch(&mut self, entity_type: &str, rows: Vec<Fields>) -> Result<(), OutputError>;
}

/// Buffers rows per entity type and hands them to a [`BatchLoader`] in batches.
pub struct BatchOutputStream<L: BatchLoader> {
    loader: L,
    batch_size: usize,
    /// Entity types in first-seen order so parents flush before children.
    pending: IndexMap<String, Vec<Fields>>,
    batches_sent: u64,
}

impl<L: BatchLoader> BatchOutputStream<L> {
    pub fn new(loader: L, batch_size: usize) -> Self {
        Self {
            loader,
            batch_size: batch_size.max(1),
            pending: IndexMap::new(),
            batches_sent: 0,
        }
    }

    pub fn batches_sent(&self) -> u64 {
        self.batches_sent
    }

    pub fn into_loader(self) -> L {
        self.loader
    }

    fn send(&mut self, entity_type: &str, rows: Vec<Fields>) -> Result<(), OutputError> {
        debug!(entity_type, rows = rows.len(), "loading batch");
        self.loader.load_batch(entity_type, rows)?;
        self.batches_sent += 1;
        Ok(())
    }
}

impl<L: BatchLoader> OutputStream for BatchOutputStream<L> {
    fn write_row(&mut self, entity_type: &str, fields: &Fields) -> Result<(), OutputError> {
        let buffer = self.pending.entry(entity_type.to_string()).or_default();
        buffer.push(fields.clone());
        if buffer.len() >= self.batch_size {
            let rows = std::mem::take(buffer);
            self.send(entity_type, rows)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        let pending: Vec<(String, Vec<Fields>)> = self
            .pending
            .iter_mut()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(entity_type, rows)| (entity_type.clone(), std::mem::take(rows)))
            .collect();
        for (entity_type, rows) in pending {
            self.send(&entity_type, rows)?;
        }
        Ok(())
    }
}
