//! Output streams: where generated rows go.

pub mod batch;
pub mod csv;
pub mod debug;
pub mod jsonl;

use thiserror::Error;

use crate::value::Fields;

pub use batch::{BatchLoader, BatchOutputStream};
pub use csv::CsvOutputStream;
pub use debug::{DebugOutputStream, EmittedRow};
pub use jsonl::JsonLinesOutputStream;

/// Errors raised by output streams.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("row for '{entity_type}' has field '{field}' outside the established columns")]
    ShapeMismatch { entity_type: String, field: String },
    #[error("batch loader error: {0}")]
    Loader(String),
}

/// Destination for rows. Rows arrive complete and in emission order.
pub trait OutputStream {
    fn write_row(&mut self, entity_type: &str, fields: &Fields) -> Result<(), OutputError>;

    /// Flush anything buffered. Called once after a successful run.
    fn close(&mut self) -> Result<(), OutputError> {
        Ok(())
    }
}
