use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::{Parser, ValueEnum};
use eval::{EvalSettings, run_eval};
use gpu_runtime::{Context, ContextDescriptor};

#[derive(Parser)]
#[command(name = "avalanche_eval", version, about = "Simulate avalanche trajectories for a region")]
struct Arguments {
    /// Settings JSON; relative paths inside it are resolved against its directory.
    settings_file_path: PathBuf,
    /// GPU adapter to request.
    #[arg(long, value_enum, default_value = "high")]
    adapter_power: AdapterPower,
    /// Only read and validate the settings.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum AdapterPower {
    Low,
    High,
}

impl AdapterPower {
    fn preference(self) -> wgpu::PowerPreference {
        match self {
            AdapterPower::Low => wgpu::PowerPreference::LowPower,
            AdapterPower::High => wgpu::PowerPreference::HighPerformance,
        }
    }
}

fn run(arguments: &Arguments) -> Result<()> {
    let path = &arguments.settings_file_path;
    if !path.exists() {
        anyhow::bail!("settings file {} does not exist", path.display());
    }
    let settings = EvalSettings::read_from_json_file(path)?;
    settings
        .validate()
        .with_context(|| format!("validate {}", path.display()))?;
    if arguments.dry_run {
        settings.graph_settings()?;
        log::info!("settings in {} are valid", path.display());
        return Ok(());
    }

    let context = Context::new(ContextDescriptor {
        power_preference: arguments.adapter_power.preference(),
        relaxed_limits: false,
    })
    .context("create GPU context")?;
    run_eval(&context, &settings)
}

fn main() -> ExitCode {
    // stderr carries only the final error line
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stdout)
        .init();
    let arguments = Arguments::parse();
    match run(&arguments) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let message = format!("{error:#}");
            let message: Vec<&str> = message.lines().map(str::trim).collect();
            eprintln!("error: {}", message.join(" "));
            ExitCode::FAILURE
        }
    }
}
