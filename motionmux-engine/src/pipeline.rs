//! Batch pipeline: resolve, then transcode → mux → annotate per pair
//!
//! Output paths are planned for the whole batch before any pair runs. Pairs
//! are then independent, so they run on a rayon pool bounded by the
//! configured worker count; each task folds into its own [`BatchReport`] and
//! the partial reports are reduced into one. Steps within one pair stay
//! sequential.

use crate::annotator;
use crate::housekeeping::{self, OTHER_FILES_DIR};
use crate::metadata::MetadataStore;
use crate::progress::{BatchProgress, Outcome};
use crate::report::{BatchReport, ProcessedPair, Stage};
use crate::transcode::StillConverter;
use crate::{Muxer, OutputPlan, PipelineConfig, Result};
use motionmux_core::{media, MediaKind, MediaPair, PairResolver, Unmatched};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

/// Scratch directory under `converted/` for stills transcoded only to be muxed
const WORK_DIR: &str = ".work";

/// A pair together with the output path reserved for it
#[derive(Debug, Clone)]
struct PlannedPair {
    pair: MediaPair,
    output_path: PathBuf,
}

/// Runs the motion photo pipeline over directories or single pairs
pub struct Pipeline<'a> {
    config: PipelineConfig,
    resolver: PairResolver,
    muxer: Muxer,
    store: &'a dyn MetadataStore,
    converter: &'a dyn StillConverter,
}

impl<'a> Pipeline<'a> {
    /// Creates a pipeline using the given collaborators
    pub fn new(
        config: PipelineConfig,
        store: &'a dyn MetadataStore,
        converter: &'a dyn StillConverter,
    ) -> Self {
        Self {
            resolver: PairResolver::new(config.match_mode),
            muxer: Muxer::new(config.collision),
            config,
            store,
            converter,
        }
    }

    /// Returns the pipeline configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Processes every pair found in `dir`.
    ///
    /// Fails only if `dir` is unusable; per-pair failures end up in the
    /// returned report and in the problem report file.
    pub fn run_directory(&self, dir: &Path) -> Result<BatchReport> {
        let scan = self.resolver.scan(dir)?;
        fs::create_dir_all(&self.config.output_root)?;

        let mut report = BatchReport::default();
        let planned = self.plan(scan.pairs, &mut report);
        report.merge(self.process_pairs(&planned)?);
        for unmatched in scan.unmatched {
            self.handle_unmatched(unmatched, &mut report);
        }

        self.finish(report)
    }

    /// Processes a single user-supplied pair
    pub fn run_pair(&self, still: &Path, video: &Path) -> Result<BatchReport> {
        let pair = self.resolver.resolve_explicit(still, video)?;
        fs::create_dir_all(&self.config.output_root)?;

        let mut report = BatchReport::default();
        let planned = self.plan(vec![pair], &mut report);
        report.merge(self.process_pairs(&planned)?);
        self.finish(report)
    }

    fn finish(&self, mut report: BatchReport) -> Result<BatchReport> {
        let work_dir = self.config.converted_dir().join(WORK_DIR);
        if work_dir.is_dir() {
            remove_dir_quietly(&work_dir);
        }

        report.sort();
        report.write_problem_report(&self.config.output_root)?;
        tracing::info!(
            "Done: {} motion photos, {} problems, {} unmatched",
            report.processed.len(),
            report.problems.len(),
            report.unmatched.len()
        );
        Ok(report)
    }

    /// Reserves an output path for each pair, in scan order.
    ///
    /// A pair whose output is already claimed by an earlier pair (possible
    /// only under `CollisionPolicy::Overwrite`) is recorded as a mux problem
    /// and never runs.
    fn plan(&self, pairs: Vec<MediaPair>, report: &mut BatchReport) -> Vec<PlannedPair> {
        let mut outputs = OutputPlan::new(self.config.collision, &self.config.output_root);
        let mut planned = Vec::with_capacity(pairs.len());

        for pair in pairs {
            match outputs.claim(pair.still()) {
                Ok(output_path) => planned.push(PlannedPair { pair, output_path }),
                Err(e) => report.problem(pair.still(), Stage::Mux, e),
            }
        }
        planned
    }

    /// Runs all planned pairs on at most `workers` threads
    fn process_pairs(&self, planned: &[PlannedPair]) -> Result<BatchReport> {
        if planned.is_empty() {
            return Ok(BatchReport::default());
        }

        let workers = self.config.workers.clamp(1, planned.len());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("motionmux-worker-{}", i))
            .build()?;
        let progress = BatchProgress::new(planned.len());
        tracing::info!("Processing {} pairs on {} workers", planned.len(), workers);

        Ok(pool.install(|| {
            planned
                .par_iter()
                .fold(BatchReport::default, |mut report, pair| {
                    progress.record(self.process_pair(pair, &mut report));
                    report
                })
                .reduce(BatchReport::default, |mut merged, partial| {
                    merged.merge(partial);
                    merged
                })
        }))
    }

    fn process_pair(&self, planned: &PlannedPair, report: &mut BatchReport) -> Outcome {
        let pair = &planned.pair;
        let span = tracing::info_span!("pair", still = %pair.still().display());
        let _entered = span.enter();

        // Each transcoded still gets its own scratch directory, named after
        // its planned output, so same-stem stills never meet
        let scratch = planned
            .output_path
            .file_name()
            .map(|name| self.config.converted_dir().join(WORK_DIR).join(name));

        let (still, converted_from) = match &scratch {
            Some(scratch) if media::is_native_still(pair.still()) => {
                match self.converter.convert(pair.still(), scratch) {
                    Ok(converted) => (converted, Some(pair.still().to_path_buf())),
                    Err(e) => {
                        report.problem(pair.still(), Stage::Transcode, e);
                        remove_dir_quietly(scratch);
                        return Outcome::Failed;
                    }
                }
            }
            _ => (pair.still().to_path_buf(), None),
        };

        let mux_pair = MediaPair::new(&still, pair.video());
        let muxed = self.muxer.mux_to(&mux_pair, &planned.output_path);

        // The intermediate JPEG is only needed as mux input
        if let (Some(scratch), Some(_)) = (&scratch, &converted_from) {
            remove_quietly(&still);
            remove_dir_quietly(scratch);
        }

        let artifact = match muxed {
            Ok(artifact) => artifact,
            Err(e) => {
                report.problem(pair.still(), Stage::Mux, e);
                return Outcome::Failed;
            }
        };

        let metadata = match annotator::annotate(self.store, &artifact.output_path, artifact.still_len) {
            Ok(metadata) => metadata,
            Err(e) => {
                report.problem(&artifact.output_path, Stage::Annotate, e);
                return Outcome::Failed;
            }
        };

        if self.config.delete_sources {
            if let Err(e) = fs::remove_file(pair.still()) {
                report.problem(pair.still(), Stage::Cleanup, e);
            }
        }

        report.processed.push(ProcessedPair {
            pair: pair.clone(),
            artifact,
            metadata,
            converted_from,
        });
        Outcome::Succeeded
    }

    fn handle_unmatched(&self, unmatched: Unmatched, report: &mut BatchReport) {
        let path = unmatched.path.as_path();

        if self.config.convert_all
            && unmatched.kind == MediaKind::Still
            && media::is_native_still(path)
        {
            match self.converter.convert(path, &self.config.converted_dir()) {
                Ok(converted) => report.converted_only.push(converted),
                Err(e) => report.problem(path, Stage::Transcode, e),
            }
        }

        if self.config.move_unmatched {
            let dir = self.config.output_root.join(OTHER_FILES_DIR);
            match housekeeping::move_into(path, &dir) {
                Ok(target) => report.moved.push(target),
                Err(e) => report.problem(path, Stage::Housekeeping, e),
            }
        } else if self.config.copy_unmatched {
            match housekeeping::copy_into(path, &self.config.output_root) {
                Ok(target) => report.copied.push(target),
                Err(e) => report.problem(path, Stage::Housekeeping, e),
            }
        }

        report.unmatched.push(unmatched);
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!("Could not remove {}: {}", path.display(), e);
    }
}

fn remove_dir_quietly(path: &Path) {
    if let Err(e) = fs::remove_dir(path) {
        tracing::debug!("Left {} in place: {}", path.display(), e);
    }
}
