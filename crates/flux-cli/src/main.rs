mod config;
mod console;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use flux_engine::{
    devices, AudioPath, ChainPreset, EffectContext, Engine, PathSettings, TempoContext, REGISTRY,
};

use config::{FileConfig, Overrides};
use console::Console;

#[derive(Parser)]
#[command(name = "flux", version, about = "Real-time guitar effect chain")]
struct Cli {
    /// Debug-level logging (RUST_LOG still wins)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List audio devices
    Devices,
    /// List available effects and their parameters
    Effects,
    /// Start the engine and read control commands from stdin
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Chain preset (JSON) to load before starting
    #[arg(long)]
    preset: Option<PathBuf>,
    /// Input device, by name substring
    #[arg(long)]
    input: Option<String>,
    /// Output device, by name substring
    #[arg(long)]
    output: Option<String>,
    /// Input device, by index from `flux devices`
    #[arg(long)]
    input_index: Option<usize>,
    /// Output device, by index from `flux devices`
    #[arg(long)]
    output_index: Option<usize>,
    /// Frames per buffer, if the backend supports it
    #[arg(long)]
    block_size: Option<u32>,
    #[arg(long)]
    bpm: Option<f64>,
    /// Longest loop that can be recorded
    #[arg(long)]
    max_loop_seconds: Option<f64>,
}

impl RunArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            input: self.input.clone(),
            output: self.output.clone(),
            input_index: self.input_index,
            output_index: self.output_index,
            block_size: self.block_size,
            bpm: self.bpm,
            max_loop_seconds: self.max_loop_seconds,
            preset: self.preset.clone(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.cmd {
        Command::Devices => devices::print_devices().context("listing devices")?,
        Command::Effects => list_effects(),
        Command::Run(args) => run(&args)?,
    }
    Ok(())
}

fn list_effects() {
    let ctx = EffectContext::default();
    for desc in REGISTRY.iter() {
        println!("{} - {}", desc.name, desc.description);
        let fx = desc.build(&ctx);
        for (name, p) in fx.parameters().iter() {
            println!(
                "    {:<16} {:<32} default {}",
                name.replace(' ', "_"),
                console::describe_range(p),
                p.get()
            );
        }
    }
}

fn run(args: &RunArgs) -> Result<()> {
    let mut file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    args.overrides().apply(&mut file);
    let cfg = file.engine;

    let tempo = Arc::new(TempoContext::new(cfg.bpm));
    let (path, ctl) = AudioPath::new(&PathSettings::from(&cfg), tempo);
    let mut engine = Engine::new(cfg);
    let mut console = Console::new(ctl, Arc::clone(engine.stats()), io::stdout());

    if let Some(preset_path) = &file.preset {
        let preset = ChainPreset::load(preset_path)
            .with_context(|| format!("loading preset {}", preset_path.display()))?;
        console.controller_mut().load_preset(&preset)?;
        log::info!("preset {}: {} effects", preset_path.display(), preset.effects.len());
    }

    engine.start(path).context("starting audio engine")?;
    println!("type `help` for commands");
    console.run(io::stdin().lock())?;
    engine.stop();
    Ok(())
}
