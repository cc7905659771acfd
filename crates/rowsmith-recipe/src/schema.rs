use schemars::schema::RootSchema;
use schemars::schema_for;

use crate::model::StatementDoc;

/// Emit the JSON Schema for recipe documents.
pub fn recipe_json_schema() -> RootSchema {
    schema_for!(Vec<StatementDoc>)
}
