use chrono::Duration;
use rand::Rng;
use rowsmith_recipe::{
    FakerCall, Formula, Guard, Operand, Placeholder, Segment, Selector, StringTemplate,
    WeightedChoice,
};

use crate::context::GenerationContext;
use crate::errors::GenerationError;
use crate::faker::fake_value;
use crate::value::{Fields, Value};

/// The row under construction: its entity type, id and fields evaluated so far.
#[derive(Debug, Clone, Copy)]
pub struct RowScope<'a> {
    pub object: &'a str,
    pub id: u64,
    pub fields: &'a Fields,
}

/// Evaluate one formula. `scope` is `None` for count expressions.
pub fn evaluate(
    formula: &Formula,
    ctx: &mut GenerationContext,
    scope: Option<RowScope<'_>>,
) -> Result<Value, GenerationError> {
    match formula {
        Formula::Literal(literal) => Ok(Value::from(literal)),
        Formula::Faker(call) => evaluate_faker(call, ctx, scope),
        Formula::Counter { object } => {
            let object = object
                .as_deref()
                .or(scope.map(|scope| scope.object))
                .ok_or_else(|| {
                    GenerationError::InvalidFormula(
                        "a counter without an object is only valid inside fields".to_string(),
                    )
                })?;
            Ok(Value::Int(ctx.counter(object) as i64))
        }
        Formula::Reference(spec) => resolve_reference(&spec.target, spec.selector, &spec.field, ctx),
        Formula::Template(template) => render_template(template, ctx, scope),
        Formula::Conditional(conditional) => {
            if guard_holds(&conditional.guard, ctx, scope)? {
                evaluate(&conditional.then, ctx, scope)
            } else {
                evaluate(&conditional.otherwise, ctx, scope)
            }
        }
    }
}

fn evaluate_faker(
    call: &FakerCall,
    ctx: &mut GenerationContext,
    scope: Option<RowScope<'_>>,
) -> Result<Value, GenerationError> {
    match call {
        FakerCall::Fake(kind) => {
            let locale = ctx.locale();
            Ok(fake_value(*kind, locale, ctx.rng()))
        }
        FakerCall::RandomNumber { min, max } => {
            if min > max {
                return Err(GenerationError::InvalidFormula(format!(
                    "random_number min {min} is greater than max {max}"
                )));
            }
            Ok(Value::Int(ctx.rng().random_range(*min..=*max)))
        }
        FakerCall::DateBetween { start, end } => {
            if start > end {
                return Err(GenerationError::InvalidFormula(format!(
                    "date_between start {start} is after end {end}"
                )));
            }
            let span = (*end - *start).num_days();
            let offset = ctx.rng().random_range(0..=span);
            Ok(Value::Date(*start + Duration::days(offset)))
        }
        FakerCall::RandomChoice(choices) => {
            let choice = pick_weighted(choices, ctx)?;
            evaluate(&choice.value, ctx, scope)
        }
    }
}

fn pick_weighted<'a>(
    choices: &'a [WeightedChoice],
    ctx: &mut GenerationContext,
) -> Result<&'a WeightedChoice, GenerationError> {
    let total: f64 = choices.iter().map(|choice| choice.weight).sum();
    if choices.is_empty() || total <= 0.0 {
        return Err(GenerationError::InvalidFormula(
            "random_choice needs at least one choice with a positive weight".to_string(),
        ));
    }
    if !total.is_finite() {
        return Err(GenerationError::InvalidFormula(format!(
            "random_choice weights add up to {total}"
        )));
    }

    let mut remaining = ctx.rng().random_range(0.0..total);
    for choice in choices {
        if remaining < choice.weight {
            return Ok(choice);
        }
        remaining -= choice.weight;
    }
    // Rounding can leave a sliver past the last bucket.
    choices
        .iter()
        .rev()
        .find(|choice| choice.weight > 0.0)
        .ok_or_else(|| GenerationError::InvalidFormula("random_choice has no weight".to_string()))
}

fn resolve_reference(
    target: &str,
    selector: Selector,
    field: &str,
    ctx: &mut GenerationContext,
) -> Result<Value, GenerationError> {
    let unresolved = |detail: String| GenerationError::UnresolvedReference {
        target: target.to_string(),
        detail,
    };

    let (object, id) = match selector {
        Selector::Latest => ctx
            .resolve_latest(target)
            .ok_or_else(|| unresolved("no row has been emitted yet".to_string()))?,
        Selector::Id(id) => {
            let object = ctx.object_for(target).to_string();
            if ctx.row(&object, id).is_none() {
                return Err(unresolved(format!("no emitted row with id {id}")));
            }
            (object, id)
        }
        Selector::Random => {
            let object = ctx.object_for(target).to_string();
            let count = ctx.rows_emitted(&object);
            if count == 0 {
                return Err(unresolved("no row has been emitted yet".to_string()));
            }
            let index = ctx.rng().random_range(0..count);
            let id = ctx.emitted_ids(&object)[index];
            (object, id)
        }
    };

    let row = ctx
        .row(&object, id)
        .ok_or_else(|| unresolved(format!("no emitted row with id {id}")))?;
    match row.get(field) {
        Some(value) => Ok(value.clone()),
        None if field == "id" => Ok(Value::Int(id as i64)),
        None => Err(unresolved(format!("row {object} {id} has no field '{field}'"))),
    }
}

fn render_template(
    template: &StringTemplate,
    ctx: &mut GenerationContext,
    scope: Option<RowScope<'_>>,
) -> Result<Value, GenerationError> {
    let mut out = String::with_capacity(template.source.len());
    for segment in &template.segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Placeholder(placeholder) => {
                let value = resolve_placeholder(placeholder, ctx, scope)?;
                out.push_str(&value.to_string());
            }
        }
    }
    Ok(Value::Text(out))
}

fn resolve_placeholder(
    placeholder: &Placeholder,
    ctx: &mut GenerationContext,
    scope: Option<RowScope<'_>>,
) -> Result<Value, GenerationError> {
    match &placeholder.field {
        Some(field) => resolve_reference(&placeholder.name, Selector::Latest, field, ctx),
        None => lookup_identifier(&placeholder.name, ctx, scope),
    }
}

/// Current-row field, then `id`, then parameter.
fn lookup_identifier(
    name: &str,
    ctx: &GenerationContext,
    scope: Option<RowScope<'_>>,
) -> Result<Value, GenerationError> {
    if let Some(scope) = scope {
        if let Some(value) = scope.fields.get(name) {
            return Ok(value.clone());
        }
        if name == "id" {
            return Ok(Value::Int(scope.id as i64));
        }
    }
    ctx.param(name)
        .cloned()
        .ok_or_else(|| GenerationError::MissingParameter {
            name: name.to_string(),
        })
}

fn guard_holds(
    guard: &Guard,
    ctx: &GenerationContext,
    scope: Option<RowScope<'_>>,
) -> Result<bool, GenerationError> {
    let left = operand_value(&guard.left, ctx, scope)?;
    let right = operand_value(&guard.right, ctx, scope)?;
    let ordering = match (left.as_f64(), right.as_f64()) {
        (Some(left), Some(right)) => left.partial_cmp(&right),
        _ => Some(left.to_string().cmp(&right.to_string())),
    };
    Ok(guard.op.holds(ordering))
}

fn operand_value(
    operand: &Operand,
    ctx: &GenerationContext,
    scope: Option<RowScope<'_>>,
) -> Result<Value, GenerationError> {
    match operand {
        Operand::Identifier(name) => lookup_identifier(name, ctx, scope),
        Operand::Number(number) => Ok(Value::Float(*number)),
        Operand::Text(text) => Ok(Value::Text(text.clone())),
    }
}
