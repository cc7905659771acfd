use std::time::Instant;

use rand::Rng;
use rowsmith_recipe::{CountExpr, Recipe, Template, parse_recipe};
use tracing::{debug, info, warn};

use crate::context::{Ancestor, GenerationContext};
use crate::errors::GenerationError;
use crate::evaluator::{RowScope, evaluate};
use crate::model::{GenerateOptions, GenerationReport, TemplateReport, TemplateState};
use crate::output::OutputStream;
use crate::params::{Params, resolve_params};
use crate::value::{Fields, Value};

/// Expands a recipe into rows written to an output stream.
pub struct GenerationEngine<'a> {
    options: GenerateOptions,
    output: &'a mut dyn OutputStream,
}

impl<'a> GenerationEngine<'a> {
    pub fn new(options: GenerateOptions, output: &'a mut dyn OutputStream) -> Self {
        Self { options, output }
    }

    /// Run every template in recipe order, `iterations` times, then close the output.
    pub fn run(
        &mut self,
        recipe: &Recipe,
        params: &Params,
    ) -> Result<GenerationReport, GenerationError> {
        let start = Instant::now();
        let seed = self
            .options
            .seed
            .unwrap_or_else(|| rand::rng().random::<u64>());
        let seed_source = if self.options.seed.is_some() { "fixed" } else { "random" };
        let iterations = self.options.iterations;

        let mut ctx = GenerationContext::new(
            resolve_params(recipe, params),
            seed,
            self.options.locale,
        );
        let mut report = GenerationReport::new(
            recipe.source_name.clone(),
            seed,
            iterations,
            self.options.locale,
        );
        for (path, template) in recipe.templates_preorder() {
            if let Some(nickname) = &template.nickname {
                ctx.register_nickname(nickname, &template.object);
            }
            report.templates.push(TemplateReport {
                path,
                name: template.name().to_string(),
                object: template.object.clone(),
                rows_emitted: 0,
                state: TemplateState::NotStarted,
            });
        }

        info!(
            recipe = %recipe.source_name,
            seed,
            seed_source,
            iterations,
            locale = %self.options.locale,
            templates = report.templates.len(),
            "generation started"
        );

        let outcome = self.run_iterations(recipe, &mut ctx, &mut report);
        report.duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => {
                info!(
                    recipe = %recipe.source_name,
                    seed,
                    rows_total = report.rows_total,
                    duration_ms = report.duration_ms,
                    "generation completed"
                );
                Ok(report)
            }
            Err(err) => {
                warn!(
                    recipe = %recipe.source_name,
                    seed,
                    rows_emitted = report.rows_total,
                    error = %err,
                    "generation failed"
                );
                Err(err)
            }
        }
    }

    fn run_iterations(
        &mut self,
        recipe: &Recipe,
        ctx: &mut GenerationContext,
        report: &mut GenerationReport,
    ) -> Result<(), GenerationError> {
        for iteration in 0..self.options.iterations {
            debug!(iteration, "iteration started");
            for (idx, template) in recipe.templates.iter().enumerate() {
                self.expand(template, &recipe.template_path(idx), ctx, report)?;
            }
        }
        self.output.close()?;
        Ok(())
    }

    fn expand(
        &mut self,
        template: &Template,
        path: &str,
        ctx: &mut GenerationContext,
        report: &mut GenerationReport,
    ) -> Result<(), GenerationError> {
        let count = evaluate_count(template, ctx)?;
        report.set_state(path, TemplateState::Expanding);
        debug!(template = template.name(), path, count, "expanding template");

        let friend_paths: Vec<String> = (0..template.friends.len())
            .map(|idx| format!("{path}/friends/{idx}"))
            .collect();

        for _ in 0..count {
            let id = ctx.next_id(&template.object);
            let fields = build_row(template, id, ctx)?;
            self.output.write_row(&template.object, &fields)?;
            ctx.record_row(&template.object, template.nickname.as_deref(), id, fields);
            report.record_row(path, &template.object);

            if template.friends.is_empty() {
                continue;
            }
            ctx.push_ancestor(Ancestor {
                object: template.object.clone(),
                nickname: template.nickname.clone(),
                id,
            });
            for (friend, friend_path) in template.friends.iter().zip(&friend_paths) {
                self.expand(friend, friend_path, ctx, report)?;
            }
            ctx.pop_ancestor();
        }

        report.set_state(path, TemplateState::Done);
        Ok(())
    }
}

fn evaluate_count(template: &Template, ctx: &mut GenerationContext) -> Result<u64, GenerationError> {
    let value = match &template.count {
        CountExpr::Constant(count) => Value::Int(*count),
        CountExpr::Param(name) => ctx
            .param(name)
            .cloned()
            .ok_or_else(|| GenerationError::MissingParameter { name: name.clone() })?,
        CountExpr::Formula(formula) => evaluate(formula, ctx, None)?,
    };
    value.as_count().ok_or_else(|| GenerationError::InvalidCount {
        template: template.name().to_string(),
        value: value.to_string(),
    })
}

/// Evaluate fields in declaration order. The engine id goes first unless the
/// template declares its own `id`.
fn build_row(
    template: &Template,
    id: u64,
    ctx: &mut GenerationContext,
) -> Result<Fields, GenerationError> {
    let mut fields = Fields::with_capacity(template.fields.len() + 1);
    if !template.declares_field("id") {
        fields.insert("id".to_string(), Value::Int(id as i64));
    }
    for field in &template.fields {
        let scope = RowScope {
            object: &template.object,
            id,
            fields: &fields,
        };
        let value = evaluate(&field.formula, ctx, Some(scope))?;
        fields.insert(field.name.clone(), value);
    }
    Ok(fields)
}

/// Parse `source` and run it against `output`.
pub fn generate(
    source: &str,
    source_name: &str,
    iterations: u32,
    params: &Params,
    output: &mut dyn OutputStream,
    seed: Option<u64>,
) -> Result<GenerationReport, GenerationError> {
    let recipe = parse_recipe(source, source_name)?;
    let options = GenerateOptions {
        seed,
        iterations,
        ..GenerateOptions::default()
    };
    GenerationEngine::new(options, output).run(&recipe, params)
}
