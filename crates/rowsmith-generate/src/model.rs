use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::faker::LocaleKey;

/// Options for the generation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Seed for the run's rng; a fresh one is drawn and reported when unset.
    pub seed: Option<u64>,
    /// Number of times the whole recipe is executed against one context.
    pub iterations: u32,
    /// Locale used by faker providers.
    pub locale: LocaleKey,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            seed: None,
            iterations: 1,
            locale: LocaleKey::EnUs,
        }
    }
}

/// Expansion state of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateState {
    NotStarted,
    Expanding,
    Done,
}

/// Summary of one template of the recipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateReport {
    /// Position in the recipe, e.g. `/2/friends/0`.
    pub path: String,
    pub name: String,
    pub object: String,
    pub rows_emitted: u64,
    pub state: TemplateState,
}

/// Report for a generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub recipe: String,
    pub seed: u64,
    pub iterations: u32,
    pub locale: LocaleKey,
    pub templates: Vec<TemplateReport>,
    pub rows_by_type: BTreeMap<String, u64>,
    pub rows_total: u64,
    pub duration_ms: u64,
}

impl GenerationReport {
    pub fn new(recipe: String, seed: u64, iterations: u32, locale: LocaleKey) -> Self {
        Self {
            recipe,
            seed,
            iterations,
            locale,
            templates: Vec::new(),
            rows_by_type: BTreeMap::new(),
            rows_total: 0,
            duration_ms: 0,
        }
    }

    pub fn template(&self, path: &str) -> Option<&TemplateReport> {
        self.templates.iter().find(|template| template.path == path)
    }

    pub fn rows_of(&self, object: &str) -> u64 {
        self.rows_by_type.get(object).copied().unwrap_or(0)
    }

    pub(crate) fn set_state(&mut self, path: &str, state: TemplateState) {
        if let Some(template) = self.templates.iter_mut().find(|t| t.path == path) {
            template.state = state;
        }
    }

    pub(crate) fn record_row(&mut self, path: &str, object: &str) {
        if let Some(template) = self.templates.iter_mut().find(|t| t.path == path) {
            template.rows_emitted += 1;
        }
        *self.rows_by_type.entry(object.to_string()).or_insert(0) += 1;
        self.rows_total += 1;
    }
}
