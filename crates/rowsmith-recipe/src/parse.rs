use std::path::Path;

use crate::errors::{RecipeError, RecipeSyntaxError, Result};
use crate::model::{Recipe, Statement};

/// Parse recipe text. Nothing is returned unless the whole document parses.
pub fn parse_recipe(text: &str, source_name: &str) -> Result<Recipe> {
    if text.trim().is_empty() {
        return Err(RecipeSyntaxError::new(source_name, "recipe is empty").into());
    }

    let statements: Vec<Statement> = serde_yaml::from_str(text)
        .map_err(|err| RecipeSyntaxError::from_yaml(source_name, &err))?;

    let mut recipe = Recipe {
        source_name: source_name.to_string(),
        params: Vec::new(),
        templates: Vec::new(),
        param_positions: Vec::new(),
        template_positions: Vec::new(),
    };
    for (position, statement) in statements.into_iter().enumerate() {
        match statement {
            Statement::Option(param) => {
                recipe.params.push(param);
                recipe.param_positions.push(position);
            }
            Statement::Template(template) => {
                recipe.templates.push(template);
                recipe.template_positions.push(position);
            }
        }
    }

    tracing::debug!(
        source = source_name,
        params = recipe.params.len(),
        templates = recipe.templates.len(),
        "recipe parsed"
    );
    Ok(recipe)
}

/// Read and parse a recipe file; the path becomes the source name.
pub fn load_recipe(path: &Path) -> Result<Recipe> {
    let text = read_recipe_text(path)?;
    parse_recipe(&text, &path.display().to_string())
}

pub fn read_recipe_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| RecipeError::Io {
        path: path.display().to_string(),
        source,
    })
}
