//! Stage driver. Runs the selected stages in order, resuming from the previous
//! stage's checkpoint when that stage is not part of this run.

use std::fmt;
use tracing::info;

use crate::assemble::assemble;
use crate::collate::collate;
use crate::compress::compress_and_save;
use crate::config::PipelineConfig;
use crate::enrich::enrich;
use crate::particles::{dump_snapshot, ParticleOptions};
use crate::pool::WorkerPool;
use crate::record::SnapshotSet;
use crate::sources::{CatalogReader, Cosmology, ParticleReader, TreeReader};
use crate::store::{self, CheckpointLayout};
use crate::HaloError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Assemble,
    Enrich,
    Collate,
    Compress,
    DumpParticles,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Assemble => "assemble",
            Stage::Enrich => "enrich",
            Stage::Collate => "collate",
            Stage::Compress => "compress",
            Stage::DumpParticles => "dump-particles",
        };
        f.write_str(name)
    }
}

/// Which stages to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stages {
    pub assemble: bool,
    pub enrich: bool,
    pub collate: bool,
    pub compress: bool,
    pub dump_particles: bool,
}

impl Stages {
    pub fn all() -> Self {
        Stages {
            assemble: true,
            enrich: true,
            collate: true,
            compress: true,
            dump_particles: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Stages::default()
    }
}

/// A stage error together with the stage that raised it.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: HaloError,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stage failed: {}", self.stage, self.error)
    }
}

impl std::error::Error for StageFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Checkpoints written by a run, by stage.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub assembled: Option<usize>,
    pub enriched: Option<usize>,
    pub collated: Option<usize>,
    pub compressed: Option<usize>,
    pub particle_files: Option<usize>,
}

/// Configuration, checkpoint layout and the external readers for one run.
pub struct Pipeline<T: TreeReader> {
    config: PipelineConfig,
    layout: CheckpointLayout,
    catalogs: Box<dyn CatalogReader>,
    trees: T,
    particles: Option<Box<dyn ParticleReader>>,
    cosmology: Option<Box<dyn Cosmology>>,
}

impl<T: TreeReader> Pipeline<T> {
    pub fn new<C: CatalogReader + 'static>(
        config: PipelineConfig,
        layout: CheckpointLayout,
        catalogs: C,
        trees: T,
    ) -> Self {
        Pipeline {
            config,
            layout,
            catalogs: Box::new(catalogs),
            trees,
            particles: None,
            cosmology: None,
        }
    }

    pub fn with_particles<P: ParticleReader + 'static>(mut self, particles: P) -> Self {
        self.particles = Some(Box::new(particles));
        self
    }

    pub fn with_cosmology<K: Cosmology + 'static>(mut self, cosmology: K) -> Self {
        self.cosmology = Some(Box::new(cosmology));
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &CheckpointLayout {
        &self.layout
    }

    pub fn assemble(&self) -> Result<SnapshotSet, HaloError> {
        assemble(
            &self.config,
            self.catalogs.as_ref(),
            &self.trees,
            self.cosmology.as_deref(),
            &self.layout,
        )
    }

    pub fn enrich(&self, set: &SnapshotSet) -> Result<usize, HaloError> {
        let pool = WorkerPool::new(self.config.workers)?;
        enrich(set, self.catalogs.as_ref(), &self.config, &self.layout, &pool)
    }

    pub fn collate(&self) -> Result<SnapshotSet, HaloError> {
        collate(&self.layout, Some(self.config.snapshot_count()))
    }

    pub fn compress(&self, collated: &SnapshotSet) -> Result<SnapshotSet, HaloError> {
        compress_and_save(collated, &self.config.extra_export_fields, &self.layout)
    }

    /// Write one particle file per available snapshot. Returns the number written.
    pub fn dump_particles(&self, set: &SnapshotSet) -> Result<usize, HaloError> {
        let reader = self
            .particles
            .as_deref()
            .ok_or_else(|| HaloError::Config("no particle reader configured".to_string()))?;
        let options = ParticleOptions {
            include_unbound: self.config.include_unbound,
            add_subparts_to_fofs: self.config.add_subparts_to_fofs,
        };
        let mut written = 0;
        for record in set {
            if dump_snapshot(reader, record, &self.layout, options)?.is_some() {
                written += 1;
            }
        }
        Ok(written)
    }

    fn base_set(&self, assembled: &mut Option<SnapshotSet>, stage: Stage) -> Result<SnapshotSet, StageFailure> {
        if let Some(set) = assembled.take() {
            return Ok(set);
        }
        info!(path = %self.layout.full().display(), "loading base halo data");
        store::load_set(&self.layout.full()).map_err(|error| StageFailure { stage, error })
    }

    /// Run the selected stages in pipeline order. A stage that is skipped is
    /// replaced by its checkpoint when a later stage needs its output.
    pub fn run(&self, stages: Stages) -> Result<RunSummary, StageFailure> {
        let fail = |stage: Stage| move |error: HaloError| StageFailure { stage, error };
        let mut summary = RunSummary::default();
        let mut base: Option<SnapshotSet> = None;

        if stages.assemble {
            let set = self.assemble().map_err(fail(Stage::Assemble))?;
            summary.assembled = Some(set.len());
            base = Some(set);
        }

        if stages.enrich {
            let set = self.base_set(&mut base, Stage::Enrich)?;
            summary.enriched = Some(self.enrich(&set).map_err(fail(Stage::Enrich))?);
            base = Some(set);
        }

        let mut collated = None;
        if stages.collate {
            let set = self.collate().map_err(fail(Stage::Collate))?;
            summary.collated = Some(set.len());
            collated = Some(set);
        }

        if stages.compress {
            let set = match collated {
                Some(set) => set,
                None => store::load_set(&self.layout.collated()).map_err(fail(Stage::Compress))?,
            };
            summary.compressed = Some(self.compress(&set).map_err(fail(Stage::Compress))?.len());
        }

        if stages.dump_particles {
            let set = self.base_set(&mut base, Stage::DumpParticles)?;
            summary.particle_files = Some(self.dump_particles(&set).map_err(fail(Stage::DumpParticles))?);
        }

        info!(?summary, "pipeline finished");
        Ok(summary)
    }
}
