//! Recipe model, parsing and validation for rowsmith.

pub mod errors;
pub mod formula;
pub mod model;
pub mod parse;
pub mod schema;
pub mod validate;

pub use errors::{
    IssueSeverity, RecipeError, RecipeSyntaxError, Result, ValidationIssue, ValidationReport,
};
pub use formula::{
    CompareOp, Conditional, FakeKind, FakerCall, Formula, Guard, LiteralValue, Operand,
    Placeholder, ReferenceSpec, Segment, Selector, StringTemplate, WeightedChoice,
};
pub use model::{CountExpr, FieldSpec, ParamDecl, Recipe, Template};
pub use parse::{load_recipe, parse_recipe, read_recipe_text};
pub use schema::recipe_json_schema;
pub use validate::{ValidationMode, check_recipe, validate_recipe, validate_recipe_document};
