use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use schemars::r#gen::SchemaGenerator;
use schemars::schema::Schema;
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::formula::{Formula, LiteralValue};

/// Parsed recipe: declared options plus top-level templates in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    /// File path or caller-supplied label, used in diagnostics.
    pub source_name: String,
    pub params: Vec<ParamDecl>,
    pub templates: Vec<Template>,
    /// Statement index in the document of each entry of `params`.
    pub param_positions: Vec<usize>,
    /// Statement index in the document of each entry of `templates`.
    pub template_positions: Vec<usize>,
}

impl Recipe {
    pub fn param(&self, name: &str) -> Option<&ParamDecl> {
        self.params.iter().find(|param| param.name == name)
    }

    /// JSON pointer of the `idx`-th option statement.
    pub fn option_path(&self, idx: usize) -> String {
        format!("/{}", self.param_positions.get(idx).copied().unwrap_or(idx))
    }

    /// JSON pointer of the `idx`-th top-level template.
    pub fn template_path(&self, idx: usize) -> String {
        format!("/{}", self.template_positions.get(idx).copied().unwrap_or(idx))
    }

    /// Every template with its path, parents before children.
    pub fn templates_preorder(&self) -> Vec<(String, &Template)> {
        let mut out = Vec::new();
        for (idx, template) in self.templates.iter().enumerate() {
            collect_preorder(template, self.template_path(idx), &mut out);
        }
        out
    }
}

fn collect_preorder<'a>(template: &'a Template, path: String, out: &mut Vec<(String, &'a Template)>) {
    let friends_path = format!("{path}/friends");
    out.push((path, template));
    for (idx, friend) in template.friends.iter().enumerate() {
        collect_preorder(friend, format!("{friends_path}/{idx}"), out);
    }
}

/// `option:` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    /// `None` makes the parameter required.
    pub default: Option<LiteralValue>,
}

/// Entity template: how to build rows of one object type.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub object: String,
    pub nickname: Option<String>,
    pub count: CountExpr,
    pub fields: Vec<FieldSpec>,
    /// Child templates expanded once per emitted row of this template.
    pub friends: Vec<Template>,
}

impl Template {
    /// Name used in diagnostics and reports: nickname when set.
    pub fn name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.object)
    }

    pub fn declares_field(&self, name: &str) -> bool {
        self.fields.iter().any(|field| field.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub formula: Formula,
}

/// How many rows a template emits.
#[derive(Debug, Clone, PartialEq)]
pub enum CountExpr {
    Constant(i64),
    Param(String),
    Formula(Formula),
}

impl Default for CountExpr {
    fn default() -> Self {
        CountExpr::Constant(1)
    }
}

impl From<Formula> for CountExpr {
    fn from(formula: Formula) -> Self {
        match formula {
            Formula::Literal(LiteralValue::Int(count)) => CountExpr::Constant(count),
            Formula::Literal(LiteralValue::Text(name)) if is_identifier(&name) => {
                CountExpr::Param(name)
            }
            Formula::Template(template) => {
                let param = template.single_identifier().map(str::to_string);
                match param {
                    Some(name) => CountExpr::Param(name),
                    None => CountExpr::Formula(Formula::Template(template)),
                }
            }
            other => CountExpr::Formula(other),
        }
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// One entry of the top-level recipe sequence, as written in YAML.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StatementDoc {
    /// Object type for a template statement.
    #[serde(default)]
    pub object: Option<String>,
    /// Parameter name for an option statement.
    #[serde(default)]
    pub option: Option<String>,
    /// Default value of an option.
    #[serde(default)]
    pub default: Option<LiteralValue>,
    #[serde(default)]
    pub nickname: Option<String>,
    /// Integer, parameter name, `"{param}"` or formula.
    #[serde(default)]
    pub count: Option<Formula>,
    #[serde(default)]
    pub fields: FieldList,
    /// Nested templates generated once per parent row.
    #[serde(default)]
    pub friends: Vec<StatementDoc>,
}

/// Ordered `fields:` mapping that keeps duplicate names for validation.
#[derive(Debug, Default)]
pub struct FieldList(pub Vec<FieldSpec>);

impl<'de> Deserialize<'de> for FieldList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldsVisitor;

        impl<'de> Visitor<'de> for FieldsVisitor {
            type Value = FieldList;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of field name to formula")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(FieldList::default())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut fields = Vec::new();
                while let Some((name, formula)) = map.next_entry::<String, Formula>()? {
                    fields.push(FieldSpec { name, formula });
                }
                Ok(FieldList(fields))
            }
        }

        deserializer.deserialize_any(FieldsVisitor)
    }
}

impl JsonSchema for FieldList {
    fn schema_name() -> String {
        "FieldList".to_string()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        generator.subschema_for::<BTreeMap<String, Formula>>()
    }
}

/// Typed top-level statement.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "StatementDoc")]
pub enum Statement {
    Option(ParamDecl),
    Template(Template),
}

impl TryFrom<StatementDoc> for Statement {
    type Error = String;

    fn try_from(doc: StatementDoc) -> Result<Self, Self::Error> {
        match (doc.object.is_some(), doc.option.is_some()) {
            (true, true) => {
                Err("a statement cannot declare both 'object' and 'option'".to_string())
            }
            (false, false) => {
                Err("a statement must declare either 'object' or 'option'".to_string())
            }
            (false, true) => param_from_doc(doc).map(Statement::Option),
            (true, false) => template_from_doc(doc).map(Statement::Template),
        }
    }
}

fn param_from_doc(doc: StatementDoc) -> Result<ParamDecl, String> {
    let name = doc.option.unwrap_or_default();
    if doc.nickname.is_some()
        || doc.count.is_some()
        || !doc.fields.0.is_empty()
        || !doc.friends.is_empty()
    {
        return Err(format!(
            "option '{name}' only accepts a 'default'; nickname, count, fields and friends belong to objects"
        ));
    }
    if name.trim().is_empty() {
        return Err("option name must not be empty".to_string());
    }
    Ok(ParamDecl {
        name,
        default: doc.default,
    })
}

fn template_from_doc(doc: StatementDoc) -> Result<Template, String> {
    let object = doc.object.unwrap_or_default();
    if object.trim().is_empty() {
        return Err("object type must not be empty".to_string());
    }
    if doc.default.is_some() {
        return Err(format!(
            "object '{object}' has a 'default'; defaults belong to option statements"
        ));
    }

    let friends = doc
        .friends
        .into_iter()
        .map(|friend| {
            if friend.option.is_some() {
                return Err(format!(
                    "options must be declared at the top level, not among the friends of '{object}'"
                ));
            }
            match Statement::try_from(friend)? {
                Statement::Template(template) => Ok(template),
                Statement::Option(param) => Err(format!(
                    "option '{}' cannot be nested under '{object}'",
                    param.name
                )),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Template {
        count: doc.count.map(CountExpr::from).unwrap_or_default(),
        object,
        nickname: doc.nickname,
        fields: doc.fields.0,
        friends,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_classification() {
        assert_eq!(
            CountExpr::from(Formula::Literal(LiteralValue::Int(3))),
            CountExpr::Constant(3)
        );
        assert_eq!(
            CountExpr::from(Formula::from_text("num_widgets").expect("text")),
            CountExpr::Param("num_widgets".to_string())
        );
        assert_eq!(
            CountExpr::from(Formula::from_text("{num_widgets}").expect("text")),
            CountExpr::Param("num_widgets".to_string())
        );
        assert!(matches!(
            CountExpr::from(Formula::from_text("{a}{b}").expect("text")),
            CountExpr::Formula(Formula::Template(_))
        ));
        assert_eq!(
            CountExpr::from(Formula::Literal(LiteralValue::Int(-2))),
            CountExpr::Constant(-2)
        );
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("num_fighters"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("3"));
        assert!(!is_identifier("two words"));
        assert!(!is_identifier(""));
    }
}
