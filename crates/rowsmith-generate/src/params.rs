use std::collections::BTreeMap;

use rowsmith_recipe::{LiteralValue, Recipe};

use crate::errors::GenerationError;
use crate::value::Value;

/// Caller-supplied parameters by name.
pub type Params = BTreeMap<String, Value>;

/// Parse a `name=value` assignment; the value is read as a YAML scalar.
pub fn parse_param_assignment(raw: &str) -> Result<(String, Value), GenerationError> {
    let (name, value) = raw.split_once('=').ok_or_else(|| {
        GenerationError::InvalidParameter(format!("expected name=value, got '{raw}'"))
    })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(GenerationError::InvalidParameter(format!(
            "parameter name is empty in '{raw}'"
        )));
    }
    Ok((name.to_string(), parse_param_value(value)))
}

/// `3` is an integer, `true` a bool, `abc` text. Anything else stays text.
pub fn parse_param_value(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Text(raw.to_string());
    }
    match serde_yaml::from_str::<LiteralValue>(raw) {
        Ok(literal) => Value::from(&literal),
        Err(_) => Value::Text(raw.to_string()),
    }
}

/// Option defaults overlaid with the supplied values.
pub fn resolve_params(recipe: &Recipe, supplied: &Params) -> Params {
    let mut resolved: Params = recipe
        .params
        .iter()
        .filter_map(|param| {
            param
                .default
                .as_ref()
                .map(|default| (param.name.clone(), Value::from(default)))
        })
        .collect();
    resolved.extend(supplied.iter().map(|(name, value)| (name.clone(), value.clone())));
    resolved
}
