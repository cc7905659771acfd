use std::env;
use std::path::PathBuf;

use rowsmith_generate::{
    CsvOutputStream, GenerateOptions, GenerationEngine, Params, parse_param_assignment,
};
use rowsmith_recipe::load_recipe;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = env::args().skip(1);
    let mut recipe_path: Option<PathBuf> = None;
    let mut out_dir = PathBuf::from("out");
    let mut seed: Option<u64> = None;
    let mut params = Params::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--out" => out_dir = args.next().map(PathBuf::from).ok_or("missing --out value")?,
            "--seed" => seed = Some(args.next().ok_or("missing --seed value")?.parse()?),
            "--param" => {
                let assignment = args.next().ok_or("missing --param value")?;
                let (name, value) = parse_param_assignment(&assignment)?;
                params.insert(name, value);
            }
            _ => {
                if recipe_path.is_none() {
                    recipe_path = Some(PathBuf::from(arg));
                } else {
                    return Err("unexpected argument".into());
                }
            }
        }
    }

    let recipe_path = recipe_path.ok_or("missing recipe path")?;
    let recipe = load_recipe(&recipe_path)?;

    let mut output = CsvOutputStream::create(&out_dir)?;
    let options = GenerateOptions {
        seed,
        ..GenerateOptions::default()
    };
    let report = GenerationEngine::new(options, &mut output).run(&recipe, &params)?;

    for (entity_type, path) in output.files() {
        println!(
            "{entity_type}: {} rows -> {}",
            report.rows_of(&entity_type),
            path.display()
        );
    }
    println!("seed={}", report.seed);
    Ok(())
}
