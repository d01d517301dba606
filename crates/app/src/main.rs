use std::path::PathBuf;

use algoviz_core::{AppConfig, Distribution, Recorder, SceneDescriptor, SceneKind, SceneRunner};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> algoviz_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => {
            run_list();
            Ok(())
        }
        Commands::Run(args) => run_scene(args),
    }
}

fn run_list() {
    for kind in SceneKind::ALL {
        println!("{:<12} {}", kind.name(), kind.summary());
    }
}

fn run_scene(args: RunArgs) -> algoviz_core::Result<()> {
    let kind: SceneKind = args.scene.parse()?;
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    if let Some(seed) = args.seed {
        config.input.seed = seed;
    }
    if let Some(count) = args.count {
        config.input.count = count;
    }
    if args.uniform {
        config.input.distribution = Distribution::Uniform;
    }
    if let Some(output) = args.output {
        config.output.output_path = output.display().to_string();
    }
    config.output.pretty |= args.pretty;
    config.validate()?;

    tracing::info!(scene = %kind, seed = config.input.seed, "running scene");

    let descriptor = SceneDescriptor::from_config(kind, &config)?;
    let script = SceneRunner::run(&descriptor, &config)?;
    let mut recorder = Recorder::new(config.output.clone());
    recorder.record(&script)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Traced data-structure algorithms for animation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the available scenes.
    List,
    /// Run a scene and write its event trace as JSON.
    Run(RunArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Scene name, e.g. `red-black` or `quickhull`.
    scene: String,
    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Seed for generated inputs.
    #[arg(long)]
    seed: Option<u64>,
    /// Number of keys or points to use.
    #[arg(long)]
    count: Option<usize>,
    /// Draw a seeded uniform sample instead of the fixed list.
    #[arg(long)]
    uniform: bool,
    /// Output file; stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Pretty-print the JSON.
    #[arg(long)]
    pretty: bool,
}
