//! rre-validate: compile a model (and optionally a scenario) and report problems
//!
//! ```text
//! rre-validate <model.json> [scenario.json] [--config engine.json]
//! ```
//!
//! Exit status is 0 when everything compiles and every requirement can be met
//! with the configured capacities, 1 otherwise.

use anyhow::{bail, Context, Result};
use resource_requirement_engine::models::{ModelDef, ScenarioDef};
use resource_requirement_engine::requirement::CompiledModel;
use resource_requirement_engine::scenario::{compile_scenario, ScenarioError};
use resource_requirement_engine::EngineConfig;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};

struct Args {
    model: PathBuf,
    scenario: Option<PathBuf>,
    config: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut positional = Vec::new();
    let mut config = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                config = Some(PathBuf::from(path));
            }
            "-h" | "--help" => {
                bail!("usage: rre-validate <model.json> [scenario.json] [--config engine.json]")
            }
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    let mut positional = positional.into_iter();
    let model = positional
        .next()
        .context("usage: rre-validate <model.json> [scenario.json] [--config engine.json]")?;
    let scenario = positional.next();
    if positional.next().is_some() {
        bail!("too many arguments");
    }

    Ok(Args {
        model,
        scenario,
        config,
    })
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Returns the number of problems found
fn run(args: &Args) -> Result<usize> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_json(&read(path)?)
            .with_context(|| format!("Invalid engine config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    debug!(?config, "engine config");

    let model = ModelDef::from_json(&read(&args.model)?)
        .with_context(|| format!("Invalid model definition {}", args.model.display()))?;

    let compiled = match CompiledModel::compile(&model, &config) {
        Ok(compiled) => compiled,
        Err(errors) => {
            for error in &errors {
                eprintln!("error: {}", error);
            }
            return Ok(errors.len());
        }
    };
    info!(
        model_id = %model.model_id,
        resources = compiled.catalog().len(),
        requirements = compiled.requirements().len(),
        "model compiled"
    );

    let scenario = match &args.scenario {
        Some(path) => ScenarioDef::from_json(&read(path)?)
            .with_context(|| format!("Invalid scenario definition {}", path.display()))?,
        // the base model is checked as an empty scenario
        None => ScenarioDef::from_json(r#"{"scenario_id": "base"}"#)?,
    };

    let compiled_scenario = match compile_scenario(&compiled, &scenario, &config) {
        Ok(compiled_scenario) => compiled_scenario,
        Err(ScenarioError::InvalidOverrides(errors)) => {
            for error in &errors {
                eprintln!("error: {}", error);
            }
            return Ok(errors.len());
        }
        Err(e) => return Err(e.into()),
    };

    let warnings = compiled_scenario.validate();
    for warning in &warnings {
        eprintln!("warning: {}", warning);
    }

    println!(
        "{} {} {}",
        compiled_scenario.scenario_id(),
        compiled_scenario.fingerprint(),
        if warnings.is_empty() { "ok" } else { "never-satisfiable" }
    );
    Ok(warnings.len())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = parse_args().and_then(|args| run(&args));
    match result {
        Ok(0) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
