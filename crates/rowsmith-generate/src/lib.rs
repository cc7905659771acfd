//! Row generation for rowsmith recipes.
//!
//! A parsed [`Recipe`](rowsmith_recipe::Recipe) is expanded template by template
//! into rows, which are handed to an [`OutputStream`] as soon as they are complete.

pub mod context;
pub mod engine;
pub mod errors;
pub mod evaluator;
pub mod faker;
pub mod model;
pub mod output;
pub mod params;
pub mod value;

pub use context::{Ancestor, GenerationContext};
pub use engine::{GenerationEngine, generate};
pub use errors::GenerationError;
pub use evaluator::{RowScope, evaluate};
pub use faker::LocaleKey;
pub use model::{GenerateOptions, GenerationReport, TemplateReport, TemplateState};
pub use output::{
    BatchLoader, BatchOutputStream, CsvOutputStream, DebugOutputStream, EmittedRow,
    JsonLinesOutputStream, OutputError, OutputStream,
};
pub use params::{Params, parse_param_assignment, parse_param_value, resolve_params};
pub use value::{Fields, Value};
