use clap::Parser;
use halotrack::config::PipelineConfig;
use halotrack::json_source::{JsonCatalogReader, JsonParticleReader, JsonTreeReader};
use halotrack::pipeline::{Pipeline, Stages};
use halotrack::store::CheckpointLayout;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "halotrack")]
#[command(about = "Assemble, link and enrich halo catalogs across snapshots", long_about = None)]
struct Cli {
    /// Run configuration (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Directory for checkpoints and job logs
    #[arg(long, default_value = ".")]
    state_dir: PathBuf,

    /// Override the configured worker count
    #[arg(short, long)]
    workers: Option<usize>,

    #[arg(long)]
    assemble: bool,

    #[arg(long)]
    enrich: bool,

    #[arg(long)]
    collate: bool,

    #[arg(long)]
    compress: bool,

    /// Write per-snapshot particle lists
    #[arg(long)]
    dump_particles: bool,
}

impl Cli {
    /// Every stage but the particle dump when no stage flag is given.
    fn stages(&self) -> Stages {
        let stages = Stages {
            assemble: self.assemble,
            enrich: self.enrich,
            collate: self.collate,
            compress: self.compress,
            dump_particles: self.dump_particles,
        };
        if stages.is_empty() {
            Stages::all()
        } else {
            stages
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = match PipelineConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("cannot load {}: {}", cli.config.display(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Err(e) = config.validate() {
        error!("{}", e);
        return ExitCode::FAILURE;
    }

    info!(
        outname = %config.outname,
        snapshots = config.snapshot_count(),
        workers = config.workers,
        state_dir = %cli.state_dir.display(),
        "starting halotrack"
    );

    let layout = CheckpointLayout::new(&cli.state_dir, &config.outname);
    let pipeline = Pipeline::new(config, layout, JsonCatalogReader, JsonTreeReader)
        .with_particles(JsonParticleReader);

    match pipeline.run(cli.stages()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(failure) => {
            error!(stage = %failure.stage, "{}", failure);
            ExitCode::FAILURE
        }
    }
}
