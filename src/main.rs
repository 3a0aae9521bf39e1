use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use harnessgen::catalog::extract::{extract_file, extract_project};
use harnessgen::catalog::Catalog;
use harnessgen::config::Config;
use harnessgen::fuzzer::{
    Combination, Engine, HarnessCandidate, HarnessStatus, HarnessStore, RepairLoop, Validator,
};
use harnessgen::llm::client::configure;
use harnessgen::llm::{Assistant, GenerationRequest, HarnessGenerator, LlmClient, ProviderConfig};

const GENERATE_LIMIT: usize = 5;

#[derive(Parser)]
#[command(
    name = "harnessgen",
    version,
    about = "Generates libFuzzer harnesses for C/C++ APIs with an LLM, repairs them against the compiler, and steers by coverage."
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the generate/repair/coverage loop over a catalog JSON or a source tree
    Analyze(AnalyzeArgs),
    /// Generate and validate single-function harnesses for one source file
    Generate(GenerateArgs),
    /// Save the text service provider, model and key
    Configure(ConfigureArgs),
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    #[arg(help = "Catalog .json, project directory, or a single source file")]
    path: PathBuf,

    #[arg(long, help = "Iteration cap (defaults to the configured ceiling)")]
    iterations: Option<usize>,

    #[arg(long, help = "Line coverage percentage that ends the run")]
    threshold: Option<f64>,

    #[arg(long, help = "Output directory (overrides config)")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[arg(help = "C or C++ source file")]
    file: PathBuf,

    #[arg(long, help = "Output directory (overrides config)")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ConfigureArgs {
    #[arg(help = "openai | anthropic | ollama")]
    provider: String,

    model: String,

    #[arg(default_value = "", help = "API key (may be empty for ollama)")]
    api_key: String,

    #[arg(long, help = "Override the provider endpoint")]
    base_url: Option<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("harnessgen=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        CliCommand::Analyze(args) => analyze(args),
        CliCommand::Generate(args) => generate(args),
        CliCommand::Configure(args) => {
            let cfg = configure(&args.provider, args.model, args.api_key, args.base_url)?;
            println!("Saved {:?} / {}", cfg.provider, cfg.model);
            Ok(())
        }
    }
}

fn load_config(output: Option<PathBuf>) -> Result<Config, Box<dyn Error>> {
    let mut config = Config::load()?;
    if let Some(dir) = output {
        config.output.output_dir = dir;
    }
    Ok(config)
}

fn assistant(config: &Config) -> Result<Assistant<LlmClient>, Box<dyn Error>> {
    let client = LlmClient::new(ProviderConfig::load(), config.llm_timeout())?;
    info!(
        provider = ?client.config().provider,
        model = %client.config().model,
        "text service ready"
    );
    Ok(Assistant::new(client))
}

fn analyze(args: AnalyzeArgs) -> Result<(), Box<dyn Error>> {
    let path = args.path.as_path();

    let catalog = if path.is_dir() {
        extract_project(path)?
    } else if path.extension().is_some_and(|e| e == "json") {
        Catalog::from_json_file(path)?
    } else {
        // A lone source file is only listed; the loop needs a whole project.
        print_functions(&extract_file(path)?);
        return Ok(());
    };

    let mut config = load_config(args.output)?;
    if let Some(t) = args.threshold {
        config.fuzzer.coverage_threshold = t;
    }

    info!(
        project = %catalog.project_name,
        language = %catalog.language,
        functions = catalog.functions.len(),
        "catalog loaded"
    );

    let validator = Validator::new(&config)?;
    let mut engine = Engine::new(config.clone(), assistant(&config)?, validator)?;
    let result = engine.run(&catalog, args.iterations)?;

    println!("{}", result.summary);
    println!("Harnesses: {}", config.output.harness_dir().display());
    println!(
        "Summary:   {}",
        config.output.output_dir.join("summary.json").display()
    );

    engine.into_validator().close()?;
    Ok(())
}

fn generate(args: GenerateArgs) -> Result<(), Box<dyn Error>> {
    let catalog = extract_file(&args.file)?;
    let config = load_config(args.output)?;

    let targets: Vec<&str> = catalog
        .public_names()
        .into_iter()
        .take(GENERATE_LIMIT)
        .collect();
    if targets.is_empty() {
        println!("No public functions found in {}", args.file.display());
        return Ok(());
    }

    let assistant = assistant(&config)?;
    let validator = Validator::new(&config)?;
    let repair = RepairLoop::new(config.fuzzer.max_repair_attempts);
    let store = HarnessStore::new(&config.output)?;

    for name in targets {
        let request = GenerationRequest {
            language: catalog.language,
            includes: &catalog.includes,
            targets: catalog.function(name).into_iter().collect(),
        };

        let code = match assistant.generate(&request) {
            Ok(code) if !code.trim().is_empty() => code,
            Ok(_) => {
                warn!(function = name, "no code generated");
                continue;
            }
            Err(e) => {
                warn!(function = name, error = %e, "generation failed");
                if e.is_configuration() {
                    return Err(e.into());
                }
                continue;
            }
        };

        let candidate = repair.repair_until_valid(
            HarnessCandidate::new(code, Combination::new([name])),
            &validator,
            &assistant,
            catalog.language,
        );

        let status = if candidate.compiled {
            HarnessStatus::Success
        } else {
            HarnessStatus::Failed
        };
        let saved = store.save(&candidate, status, catalog.language)?;
        println!("{:<32} {:<8} {}", name, status, saved.display());
    }

    validator.close()?;
    Ok(())
}

fn print_functions(catalog: &Catalog) {
    let origin = catalog
        .source_files
        .first()
        .map(String::as_str)
        .unwrap_or("<unknown>");
    println!("{} function(s) in {}", catalog.functions.len(), origin);

    for f in &catalog.functions {
        let visibility = if f.is_public { "" } else { " (static)" };
        println!("  {}:{}  {}{}", display(&f.file_path), f.line, f.prototype(), visibility);
    }
}

fn display(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}
