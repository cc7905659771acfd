use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};

use crate::errors::{RecipeError, RecipeSyntaxError, Result, ValidationIssue, ValidationReport};
use crate::formula::{FakerCall, Formula, LiteralValue};
use crate::model::{CountExpr, Recipe, Template};
use crate::schema::recipe_json_schema;

/// What to do with a report that contains errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Errors fail the check.
    #[default]
    Raise,
    /// Every issue is logged and the recipe is accepted.
    Warn,
}

impl ValidationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationMode::Raise => "raise",
            ValidationMode::Warn => "warn",
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationMode {
    type Err = RecipeError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "raise" => Ok(ValidationMode::Raise),
            "warn" => Ok(ValidationMode::Warn),
            _ => Err(RecipeError::UnknownValidationMode(value.to_string())),
        }
    }
}

/// Validate raw recipe text against the recipe JSON Schema, reporting every violation.
pub fn validate_recipe_document(text: &str, source_name: &str) -> Result<ValidationReport> {
    let instance: serde_json::Value = serde_yaml::from_str(text)
        .map_err(|err| RecipeSyntaxError::from_yaml(source_name, &err))?;
    let schema = serde_json::to_value(recipe_json_schema())?;
    let compiled = JSONSchema::compile(&schema).map_err(|err| RecipeError::Schema(err.to_string()))?;

    let mut report = ValidationReport::default();
    if let Err(errors) = compiled.validate(&instance) {
        for error in errors {
            let path = normalized_json_pointer(&error.instance_path.to_string());
            report.push(ValidationIssue::error(
                "schema_violation",
                path,
                error.to_string(),
                None,
            ));
        }
    }

    Ok(report)
}

/// Semantic checks over a parsed recipe. `declared` holds parameter names the
/// caller will supply.
pub fn validate_recipe(recipe: &Recipe, declared: &BTreeSet<String>) -> ValidationReport {
    let mut report = ValidationReport::default();

    let known_params = validate_options(recipe, declared, &mut report);
    let names = TemplateNames::collect(recipe, &mut report);

    let mut walker = RecipeWalker {
        recipe,
        declared,
        names: &names,
        known_params: &known_params,
        used_params: BTreeSet::new(),
        emitted: BTreeSet::new(),
        ancestors: Vec::new(),
        report: &mut report,
    };
    for (idx, template) in recipe.templates.iter().enumerate() {
        walker.template(template, &recipe.template_path(idx));
    }
    let used_params = walker.used_params;

    for (idx, param) in recipe.params.iter().enumerate() {
        if !used_params.contains(param.name.as_str()) {
            report.push(ValidationIssue::warning(
                "unused_option",
                recipe.option_path(idx),
                format!("option '{}' is declared but never used", param.name),
                Some("remove the option or reference it in a count or template"),
            ));
        }
    }

    report
}

/// Validate and apply `mode`: `Raise` fails on errors, `Warn` only logs.
pub fn check_recipe(
    recipe: &Recipe,
    declared: &BTreeSet<String>,
    mode: ValidationMode,
) -> Result<ValidationReport> {
    let report = validate_recipe(recipe, declared);

    if mode == ValidationMode::Raise && !report.is_ok() {
        return Err(RecipeError::Invalid {
            source_name: recipe.source_name.clone(),
            report,
        });
    }

    for issue in report.issues() {
        tracing::warn!(
            source = %recipe.source_name,
            severity = issue.severity.as_str(),
            code = %issue.code,
            path = %issue.path,
            hint = issue.hint.as_deref().unwrap_or(""),
            "{}",
            issue.message
        );
    }

    Ok(report)
}

fn validate_options(
    recipe: &Recipe,
    declared: &BTreeSet<String>,
    report: &mut ValidationReport,
) -> BTreeSet<String> {
    let mut known: BTreeSet<String> = declared.clone();
    let mut seen = BTreeSet::new();

    for (idx, param) in recipe.params.iter().enumerate() {
        let path = recipe.option_path(idx);
        if !seen.insert(param.name.as_str()) {
            report.push(ValidationIssue::error(
                "duplicate_option",
                &path,
                format!("option '{}' is declared more than once", param.name),
                Some("keep a single option statement per name"),
            ));
        }
        if param.default.is_none() && !declared.contains(&param.name) {
            report.push(ValidationIssue::error(
                "required_parameter",
                &path,
                format!("option '{}' has no default and was not supplied", param.name),
                Some("pass the parameter or give the option a default"),
            ));
        }
        known.insert(param.name.clone());
    }

    known
}

/// Object types and nicknames across the whole recipe.
struct TemplateNames {
    objects: BTreeSet<String>,
    all: BTreeSet<String>,
}

impl TemplateNames {
    fn collect(recipe: &Recipe, report: &mut ValidationReport) -> Self {
        let templates = recipe.templates_preorder();
        let objects: BTreeSet<String> = templates
            .iter()
            .map(|(_, template)| template.object.clone())
            .collect();

        let mut nicknames: BTreeMap<&str, &str> = BTreeMap::new();
        for (path, template) in &templates {
            let Some(nickname) = template.nickname.as_deref() else {
                continue;
            };
            if let Some(first) = nicknames.get(nickname) {
                report.push(ValidationIssue::error(
                    "duplicate_template_name",
                    format!("{path}/nickname"),
                    format!("nickname '{nickname}' is already used by the template at {first}"),
                    Some("nicknames must be unique within a recipe"),
                ));
                continue;
            }
            if nickname != template.object && objects.contains(nickname) {
                report.push(ValidationIssue::error(
                    "ambiguous_template_name",
                    format!("{path}/nickname"),
                    format!("nickname '{nickname}' is also the object type of another template"),
                    Some("pick a nickname that is not an object type"),
                ));
            }
            nicknames.insert(nickname, path.as_str());
        }

        let mut all = objects.clone();
        all.extend(nicknames.keys().map(|name| name.to_string()));
        Self { objects, all }
    }
}

struct FieldScope<'a> {
    earlier: &'a BTreeSet<&'a str>,
    later: &'a [&'a str],
}

struct RecipeWalker<'a> {
    recipe: &'a Recipe,
    declared: &'a BTreeSet<String>,
    names: &'a TemplateNames,
    known_params: &'a BTreeSet<String>,
    used_params: BTreeSet<String>,
    /// Names whose rows exist by the time the current template runs.
    emitted: BTreeSet<String>,
    ancestors: Vec<String>,
    report: &'a mut ValidationReport,
}

impl RecipeWalker<'_> {
    fn template(&mut self, template: &Template, path: &str) {
        self.count(template, path);

        let names: Vec<&str> = template.fields.iter().map(|f| f.name.as_str()).collect();
        let mut earlier: BTreeSet<&str> = BTreeSet::new();
        for (idx, field) in template.fields.iter().enumerate() {
            let field_path = format!("{path}/fields/{}", field.name);
            if earlier.contains(field.name.as_str()) {
                self.report.push(ValidationIssue::error(
                    "duplicate_field",
                    &field_path,
                    format!(
                        "field '{}' is declared more than once in '{}'",
                        field.name,
                        template.name()
                    ),
                    None,
                ));
            }
            let scope = FieldScope {
                earlier: &earlier,
                later: &names[idx + 1..],
            };
            self.formula(&field.formula, &field_path, Some(&scope));
            earlier.insert(field.name.as_str());
        }

        let own_names: Vec<String> = std::iter::once(template.object.clone())
            .chain(template.nickname.clone())
            .collect();
        self.emitted.extend(own_names.iter().cloned());

        let depth = self.ancestors.len();
        self.ancestors.extend(own_names);
        for (idx, friend) in template.friends.iter().enumerate() {
            self.template(friend, &format!("{path}/friends/{idx}"));
        }
        self.ancestors.truncate(depth);
    }

    fn count(&mut self, template: &Template, path: &str) {
        let count_path = format!("{path}/count");
        match &template.count {
            CountExpr::Constant(count) if *count < 0 => {
                self.report.push(ValidationIssue::error(
                    "negative_count",
                    count_path,
                    format!("count for '{}' is negative ({count})", template.name()),
                    Some("use zero or a positive integer"),
                ));
            }
            CountExpr::Constant(0) if !template.friends.is_empty() => {
                self.report.push(ValidationIssue::warning(
                    "children_never_generated",
                    count_path,
                    format!(
                        "count for '{}' is zero so its friends never produce rows",
                        template.name()
                    ),
                    None,
                ));
            }
            CountExpr::Constant(_) => {}
            CountExpr::Param(name) => {
                if self.known_params.contains(name) {
                    self.used_params.insert(name.clone());
                    if !self.declared.contains(name) {
                        let default = self
                            .recipe
                            .param(name)
                            .and_then(|param| param.default.as_ref());
                        if let Some(default) = default {
                            self.literal_count(template, default, &count_path);
                        }
                    }
                } else {
                    self.report.push(ValidationIssue::error(
                        "missing_parameter",
                        count_path,
                        format!(
                            "count for '{}' uses parameter '{name}', which is neither declared nor supplied",
                            template.name()
                        ),
                        Some("add an option statement with a default or pass the parameter"),
                    ));
                }
            }
            CountExpr::Formula(Formula::Literal(literal)) => {
                self.literal_count(template, literal, &count_path);
            }
            CountExpr::Formula(formula) => self.formula(formula, &count_path, None),
        }
    }

    fn literal_count(&mut self, template: &Template, literal: &LiteralValue, path: &str) {
        match classify_count(literal) {
            CountCheck::Valid => {}
            CountCheck::Negative => self.report.push(ValidationIssue::error(
                "negative_count",
                path,
                format!("count for '{}' is negative ({literal})", template.name()),
                Some("use zero or a positive integer"),
            )),
            CountCheck::NotInteger => self.report.push(ValidationIssue::error(
                "invalid_count",
                path,
                format!(
                    "count for '{}' is not a non-negative integer ({literal})",
                    template.name()
                ),
                Some("use zero or a positive integer"),
            )),
        }
    }

    fn formula(&mut self, formula: &Formula, path: &str, scope: Option<&FieldScope<'_>>) {
        let mut nodes = Vec::new();
        formula.walk(&mut |node| nodes.push(node));

        for node in nodes {
            match node {
                Formula::Literal(_) | Formula::Faker(FakerCall::Fake(_)) => {}
                Formula::Faker(FakerCall::RandomNumber { min, max }) if min > max => {
                    self.report.push(ValidationIssue::error(
                        "invalid_random_number_range",
                        path,
                        format!("random_number min {min} is greater than max {max}"),
                        None,
                    ));
                }
                Formula::Faker(FakerCall::RandomNumber { .. }) => {}
                Formula::Faker(FakerCall::DateBetween { start, end }) if start > end => {
                    self.report.push(ValidationIssue::error(
                        "invalid_date_range",
                        path,
                        format!("date_between start {start} is after end {end}"),
                        None,
                    ));
                }
                Formula::Faker(FakerCall::DateBetween { .. }) => {}
                Formula::Faker(FakerCall::RandomChoice(choices)) => {
                    if choices.is_empty() {
                        self.report.push(ValidationIssue::error(
                            "empty_choices",
                            path,
                            "random_choice needs at least one choice",
                            None,
                        ));
                    } else if choices.iter().all(|choice| choice.weight == 0.0) {
                        self.report.push(ValidationIssue::error(
                            "empty_choices",
                            path,
                            "every random_choice weight is zero",
                            Some("give at least one choice a positive weight"),
                        ));
                    }
                }
                Formula::Counter { object: Some(object) } => {
                    if !self.names.objects.contains(object) {
                        self.report.push(ValidationIssue::warning(
                            "unknown_counter_object",
                            path,
                            format!("counter refers to '{object}', which no template creates"),
                            Some("the counter will always read 0"),
                        ));
                    }
                }
                Formula::Counter { object: None } => {
                    if scope.is_none() {
                        self.report.push(ValidationIssue::error(
                            "counter_without_object",
                            path,
                            "a bare counter has no row to count outside of fields",
                            Some("write {counter: <Object>}"),
                        ));
                    }
                }
                Formula::Reference(spec) => self.reference_target(&spec.target, path),
                Formula::Template(template) => {
                    for placeholder in template.placeholders() {
                        match placeholder.field {
                            Some(_) => self.reference_target(&placeholder.name, path),
                            None => self.identifier(&placeholder.name, path, scope),
                        }
                    }
                }
                Formula::Conditional(conditional) => {
                    for name in conditional.guard.identifiers() {
                        self.identifier(name, path, scope);
                    }
                }
            }
        }
    }

    fn identifier(&mut self, name: &str, path: &str, scope: Option<&FieldScope<'_>>) {
        if let Some(scope) = scope {
            if name == "id" || scope.earlier.contains(name) {
                return;
            }
        }
        if self.known_params.contains(name) {
            self.used_params.insert(name.to_string());
            return;
        }
        if scope.is_some_and(|scope| scope.later.contains(&name)) {
            self.report.push(ValidationIssue::error(
                "forward_field_reference",
                path,
                format!("'{name}' refers to a field declared later in the same template"),
                Some("move the field above the one that uses it"),
            ));
            return;
        }
        self.report.push(ValidationIssue::error(
            "missing_parameter",
            path,
            format!("'{name}' is neither an earlier field nor a known parameter"),
            Some("declare it with an option statement or pass it as a parameter"),
        ));
    }

    fn reference_target(&mut self, target: &str, path: &str) {
        if self.emitted.contains(target) || self.ancestors.iter().any(|name| name == target) {
            return;
        }
        if self.names.all.contains(target) {
            self.report.push(ValidationIssue::error(
                "forward_reference",
                path,
                format!("'{target}' has no rows yet when this template runs"),
                Some("declare the referenced template earlier in the recipe"),
            ));
        } else {
            self.report.push(ValidationIssue::error(
                "unknown_reference_target",
                path,
                format!("no template creates or nicknames '{target}'"),
                None,
            ));
        }
    }
}

enum CountCheck {
    Valid,
    Negative,
    NotInteger,
}

/// Mirrors what the engine accepts as a count.
fn classify_count(literal: &LiteralValue) -> CountCheck {
    match literal {
        LiteralValue::Int(count) if *count < 0 => CountCheck::Negative,
        LiteralValue::Int(_) => CountCheck::Valid,
        LiteralValue::Float(count) if count.fract() != 0.0 || !count.is_finite() => {
            CountCheck::NotInteger
        }
        LiteralValue::Float(count) if *count < 0.0 => CountCheck::Negative,
        LiteralValue::Float(count) if *count >= u64::MAX as f64 => CountCheck::NotInteger,
        LiteralValue::Float(_) => CountCheck::Valid,
        LiteralValue::Text(text) => {
            let text = text.trim();
            if text.parse::<u64>().is_ok() {
                CountCheck::Valid
            } else if text.parse::<i64>().is_ok_and(|count| count < 0) {
                CountCheck::Negative
            } else {
                CountCheck::NotInteger
            }
        }
        LiteralValue::Null | LiteralValue::Bool(_) => CountCheck::NotInteger,
    }
}

fn normalized_json_pointer(pointer: &str) -> String {
    if pointer.is_empty() {
        "/".to_string()
    } else {
        pointer.to_string()
    }
}
