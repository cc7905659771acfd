use rowsmith_recipe::RecipeError;
use thiserror::Error;

use crate::output::OutputError;

/// Errors emitted by the generation engine. Any of them aborts the run.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Recipe(#[from] RecipeError),
    #[error("missing parameter '{name}': not supplied and no default declared")]
    MissingParameter { name: String },
    #[error("count for template '{template}' must be a non-negative integer, got '{value}'")]
    InvalidCount { template: String, value: String },
    #[error("unresolved reference to '{target}': {detail}")]
    UnresolvedReference { target: String, detail: String },
    #[error("invalid formula: {0}")]
    InvalidFormula(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error(transparent)]
    Output(#[from] OutputError),
}
