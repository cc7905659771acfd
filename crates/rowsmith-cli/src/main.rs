mod config;
mod registry;

use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use config::{CliConfig, ConfigError, OutputFormat, load_config};
use registry::{RunContext, RunPaths, RunSettings, init_logging, start_run, write_report};
use rowsmith_generate::{
    CsvOutputStream, DebugOutputStream, GenerateOptions, GenerationEngine, GenerationError,
    JsonLinesOutputStream, LocaleKey, OutputError, OutputStream, Params, Value,
    parse_param_assignment,
};
use rowsmith_recipe::{
    RecipeError, ValidationMode, ValidationReport, check_recipe, parse_recipe, read_recipe_text,
    recipe_json_schema, validate_recipe, validate_recipe_document,
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Recipe(#[from] RecipeError),
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),
    #[error("output error: {0}")]
    Output(#[from] OutputError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("recipe '{source_name}' has {errors} validation error(s)")]
    ValidationFailed { source_name: String, errors: usize },
}

#[derive(Parser, Debug)]
#[command(name = "rowsmith", version, about = "Generate synthetic rows from YAML recipes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a recipe and write its rows.
    Generate(GenerateArgs),
    /// Check a recipe without generating anything.
    Validate(ValidateArgs),
    /// Print the recipe JSON Schema.
    Schema,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Recipe file (YAML).
    recipe: PathBuf,
    /// Parameter value, e.g. `--param num_accounts=10`. Repeatable.
    #[arg(long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
    params: Vec<(String, Value)>,
    /// Seed for reproducible output; a random seed is reported when omitted.
    #[arg(long)]
    seed: Option<u64>,
    /// Number of times the whole recipe is executed.
    #[arg(long)]
    iterations: Option<u32>,
    /// Output format.
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,
    /// Output directory (csv) or file (jsonl). Defaults to the run directory.
    #[arg(long)]
    out: Option<PathBuf>,
    /// What to do when validation finds errors.
    #[arg(long, value_parser = parse_validation_mode)]
    validation: Option<ValidationMode>,
    /// Locale for faker providers.
    #[arg(long, value_parser = parse_locale)]
    locale: Option<LocaleKey>,
    /// Config file; `rowsmith.toml` in the working directory is used when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output directory for runs.
    #[arg(long)]
    run_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Recipe file (YAML).
    recipe: PathBuf,
    /// Parameter the caller will supply. Repeatable.
    #[arg(long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
    params: Vec<(String, Value)>,
    /// Config file; `rowsmith.toml` in the working directory is used when present.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Validate(args) => run_validate(args),
        Command::Schema => run_schema(),
    }
}

fn run_generate(args: GenerateArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;
    let run_dir = args
        .run_dir
        .clone()
        .or_else(|| config.run_dir.clone())
        .unwrap_or_else(|| PathBuf::from("runs"));
    let settings = resolve_settings(&args, &config)?;

    let run_id = Uuid::new_v4().to_string();
    let run_ctx = RunContext {
        run_id: run_id.clone(),
        started_at: chrono::Utc::now(),
        run_dir,
        recipe: args.recipe.clone(),
        settings: settings.clone(),
    };

    let run_paths = start_run(&run_ctx)?;
    init_logging(Some(&run_paths.logs_path))?;

    tracing::info!(event = "run_started", run_id = %run_id, recipe = %args.recipe.display());
    let timer = Instant::now();

    let source_name = args.recipe.display().to_string();
    let text = read_recipe_text(&args.recipe)?;

    let structural = validate_recipe_document(&text, &source_name)?;
    if !structural.is_ok() {
        if settings.validation == ValidationMode::Raise {
            return Err(RecipeError::Invalid {
                source_name,
                report: structural,
            }
            .into());
        }
        log_issues(&source_name, &structural);
    }

    let recipe = parse_recipe(&text, &source_name)?;
    let declared: BTreeSet<String> = settings.params.keys().cloned().collect();
    check_recipe(&recipe, &declared, settings.validation)?;
    tracing::info!(event = "recipe_validated", templates = recipe.templates.len());

    let mut output = SelectedOutput::open(&settings, &run_paths)?;
    let options = GenerateOptions {
        seed: settings.seed,
        iterations: settings.iterations,
        locale: settings.locale,
    };
    let report = GenerationEngine::new(options, output.stream()).run(&recipe, &settings.params)?;
    output.finish()?;

    write_report(&run_paths, &report)?;
    tracing::info!(event = "report_written", path = %run_paths.report_path.display());

    let duration_ms = timer.elapsed().as_millis();
    tracing::info!(
        event = "run_finished",
        status = "success",
        seed = report.seed,
        rows_total = report.rows_total,
        duration_ms = duration_ms
    );

    Ok(())
}

fn run_validate(args: ValidateArgs) -> Result<(), CliError> {
    init_logging(None)?;
    let config = load_config(args.config.as_deref())?;
    let mut params = config.params()?;
    params.extend(args.params);

    let source_name = args.recipe.display().to_string();
    let text = read_recipe_text(&args.recipe)?;

    let mut report = validate_recipe_document(&text, &source_name)?;
    if report.is_ok() {
        let recipe = parse_recipe(&text, &source_name)?;
        let declared: BTreeSet<String> = params.into_keys().collect();
        report.merge(validate_recipe(&recipe, &declared));
    }

    for issue in report.issues() {
        println!("{source_name}: {issue}");
    }

    if !report.is_ok() {
        return Err(CliError::ValidationFailed {
            source_name,
            errors: report.errors.len(),
        });
    }

    println!("{source_name}: ok ({} warning(s))", report.warnings.len());
    Ok(())
}

fn run_schema() -> Result<(), CliError> {
    let schema = recipe_json_schema();
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

/// Flags win over the config file; config params are overridden per name.
fn resolve_settings(args: &GenerateArgs, config: &CliConfig) -> Result<RunSettings, CliError> {
    let mut params: Params = config.params()?;
    params.extend(args.params.iter().cloned());

    Ok(RunSettings {
        seed: args.seed.or(config.seed),
        iterations: args.iterations.or(config.iterations).unwrap_or(1),
        locale: args.locale.or(config.locale).unwrap_or_default(),
        validation: args.validation.or(config.validation).unwrap_or_default(),
        format: args.format.or(config.output.format).unwrap_or_default(),
        out: args.out.clone().or_else(|| config.output.path.clone()),
        params,
    })
}

fn log_issues(source_name: &str, report: &ValidationReport) {
    for issue in report.issues() {
        tracing::warn!(
            source = %source_name,
            severity = issue.severity.as_str(),
            code = %issue.code,
            path = %issue.path,
            "{}",
            issue.message
        );
    }
}

enum SelectedOutput {
    Debug(DebugOutputStream),
    Csv(CsvOutputStream),
    Jsonl(JsonLinesOutputStream<BufWriter<File>>, PathBuf),
}

impl SelectedOutput {
    fn open(settings: &RunSettings, paths: &RunPaths) -> Result<Self, CliError> {
        let target = settings
            .out
            .clone()
            .unwrap_or_else(|| paths.default_output(settings.format));

        match settings.format {
            OutputFormat::Debug => Ok(SelectedOutput::Debug(DebugOutputStream::new())),
            OutputFormat::Csv => Ok(SelectedOutput::Csv(CsvOutputStream::create(target)?)),
            OutputFormat::Jsonl => {
                ensure_parent(&target)?;
                let file = File::create(&target)?;
                Ok(SelectedOutput::Jsonl(
                    JsonLinesOutputStream::new(BufWriter::new(file)),
                    target,
                ))
            }
        }
    }

    fn stream(&mut self) -> &mut dyn OutputStream {
        match self {
            SelectedOutput::Debug(stream) => stream,
            SelectedOutput::Csv(stream) => stream,
            SelectedOutput::Jsonl(stream, _) => stream,
        }
    }

    fn finish(self) -> Result<(), CliError> {
        match self {
            SelectedOutput::Debug(stream) => {
                for row in stream.into_rows() {
                    let fields: Vec<String> = row
                        .fields
                        .iter()
                        .map(|(name, value)| format!("{name}={value}"))
                        .collect();
                    println!("{}({})", row.entity_type, fields.join(", "));
                }
            }
            SelectedOutput::Csv(stream) => {
                for (entity_type, path) in stream.files() {
                    tracing::info!(
                        event = "output_written",
                        entity_type = %entity_type,
                        rows = stream.rows_written(&entity_type),
                        path = %path.display()
                    );
                }
            }
            SelectedOutput::Jsonl(stream, path) => {
                tracing::info!(
                    event = "output_written",
                    rows = stream.rows_written(),
                    path = %path.display()
                );
            }
        }
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    parse_param_assignment(raw).map_err(|err| err.to_string())
}

fn parse_validation_mode(raw: &str) -> Result<ValidationMode, String> {
    raw.parse().map_err(|err: RecipeError| err.to_string())
}

fn parse_locale(raw: &str) -> Result<LocaleKey, String> {
    raw.parse().map_err(|err: GenerationError| err.to_string())
}
