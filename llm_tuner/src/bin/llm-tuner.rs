//! llm-tuner: rewrites a llama-swap registry with tuned llama-server flags.
//!
//! ```text
//! # Tune every model in ./llama-swap.yaml for balanced use, keeping a backup
//! $ llm-tuner --config llama-swap.yaml --preset balanced
//!
//! # Print the tuned command for one model, plus a KV-cache footprint table
//! $ llm-tuner --model qwen3-30b --preset moe --estimate
//!
//! # Show what the hardware probe found
//! $ llm-tuner --specs
//! ```

// cargo run --bin llm-tuner -- --specs

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use colorful::Colorful;
use llm_devices::{ComputeBackend, HardwareProfiler, HostProbe, LoggingConfig, LoggingConfigTrait};
use llm_models::{FootprintEstimate, DEFAULT_RUNTIME_OVERHEAD_GIB};
use llm_tuner::*;

#[derive(Debug, Parser)]
#[command(name = "llm-tuner", version, about = "Tune llama-server flags for this machine")]
struct Cli {
    /// Registry file to read
    #[arg(long, value_name = "PATH", default_value = "llama-swap.yaml")]
    config: PathBuf,

    /// speed, context, balanced, system-safe, ultra or moe (aliases accepted)
    #[arg(long, default_value = "balanced")]
    preset: String,

    /// Where to write the rewritten registry; defaults to --config
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Tune only this model and print its command instead of rewriting the file
    #[arg(long, value_name = "NAME")]
    model: Option<String>,

    /// Print the detected hardware and exit
    #[arg(long)]
    specs: bool,

    #[arg(long, short)]
    verbose: bool,

    /// Copy the registry to <config>.backup_<timestamp> before overwriting it
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    backup: bool,

    /// Force the compute backend instead of inferring it
    #[arg(long)]
    backend: Option<ComputeBackend>,

    /// TOML file with reserve and overhead constants; created with defaults if missing
    #[arg(long, value_name = "PATH")]
    tuning: Option<PathBuf>,

    /// With --model, also print estimated memory per context size
    #[arg(long, requires = "model")]
    estimate: bool,
}

fn main() -> TunerResult<()> {
    let cli = Cli::parse();

    let logging = LoggingConfig::new().logger_name("llm_tuner");
    let mut logging = if cli.verbose {
        logging.log_level_debug()
    } else {
        logging.log_level_info()
    };
    logging.load_logger()?;

    let tuning = match &cli.tuning {
        Some(path) => TuningConfig::load(path)?,
        None => TuningConfig::default(),
    };

    let registry = match Registry::load(&cli.config) {
        Ok(registry) => registry,
        // Hardware can be shown without a registry; only the backend guess suffers.
        Err(e) if cli.specs => {
            tracing::warn!("{e}");
            Registry::default()
        }
        Err(e) => return Err(e),
    };

    let specs = HardwareProfiler::new(HostProbe)
        .server_path(registry.server_path())
        .backend_override(cli.backend)
        .profile();
    if cli.specs {
        println!("{specs}");
        return Ok(());
    }

    let preset = Preset::from_name_or_default(&cli.preset);
    let optimizer = Optimizer::builder().specs(specs).tuning(tuning).build();
    let session = TuningSession::new(optimizer, preset);

    if let Some(name) = &cli.model {
        let tuned = session.tune_model(&registry, name)?;
        if cli.estimate {
            println!(
                "{}",
                FootprintEstimate::new(&tuned.metadata, DEFAULT_RUNTIME_OVERHEAD_GIB)
            );
        }
        println!("{}", tuned.command);
        return Ok(());
    }

    let mut registry = registry;
    let tuned = session.tune_all(&mut registry);
    if cli.backup {
        backup(&cli.config)?;
    }
    let output = cli.output.unwrap_or(cli.config);
    registry.save(&output)?;

    println!(
        "{}",
        format!("Wrote {}", output.display())
            .color(colorful::RGB::new(0, 139, 248))
            .bold()
    );
    print!("{}", summary(&tuned));
    Ok(())
}
