use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use docql::{telemetry, EngineConfig, Schema};

#[derive(Parser, Debug)]
#[command(name = "docql-lint")]
#[command(about = "Check a docql schema for structural problems", long_about = None)]
struct Args {
    /// Config file (defaults to $DOCQL_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Lint this schema file instead of the configured types
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// Print findings as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::from_env().context("loading config from DOCQL_CONFIG")?,
    };
    telemetry::init_logging(&config.log_filter);

    let schema = match &args.schema {
        Some(path) => Schema::from_file(path)
            .with_context(|| format!("loading schema {}", path.display()))?,
        None => config.schema().context("loading configured schema")?,
    };

    let issues = schema.lint();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&issues)?);
    } else {
        for issue in &issues {
            println!("{}", issue);
        }
        println!("{} types checked, {} issues", schema.len(), issues.len());
    }

    if issues.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
