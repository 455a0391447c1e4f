// THEORY:
// The batch driver augments a folder of generated documents on several workers.
// It follows the same shape as a frame worker pool: one unbounded task channel,
// a dispatcher that deals tasks round-robin to per-worker channels, and a
// `oneshot` per task for the result.
//
// Images are independent, so there is no ordering to restore and no state that
// flows between tasks. Each task carries its own seed; a worker builds a fresh
// RNG from it and runs the shared, immutable `AugmentationPipeline` inside
// `spawn_blocking`, since every augmentation is CPU-bound. With a base seed set,
// the output of a run does not depend on which worker picked up which image.

use crate::core_modules::ground_truth::GroundTruthSet;
use crate::core_modules::raster::RasterImage;
use crate::error::{AugmentError, Result};
use crate::pipeline::{AugmentationPipeline, draw_ground_truth};
use futures::future::join_all;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];
const DEFAULT_OUTPUT_DIR: &str = "augmented";

/// Counts of what happened to every (image, epoch) pair of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    /// Images without ground truth.
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: &ImageOutcome) {
        match outcome {
            ImageOutcome::Processed => self.processed += 1,
            ImageOutcome::Skipped => self.skipped += 1,
            ImageOutcome::Failed => self.failed += 1,
        }
    }

    /// Records every delivered outcome, then reports the first pool error if any.
    fn tally(&mut self, outcomes: Vec<Result<ImageOutcome>>) -> Result<()> {
        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(outcome) => self.record(&outcome),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// One image of one epoch, with everything a worker needs to handle it alone.
#[derive(Debug, Clone)]
pub struct ImageJob {
    pub image_path: PathBuf,
    pub ground_truth_path: PathBuf,
    pub output_image_path: PathBuf,
    pub output_ground_truth_path: PathBuf,
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOutcome {
    Processed,
    Skipped,
    Failed,
}

struct ImageTask {
    job: ImageJob,
    result_sender: oneshot::Sender<ImageOutcome>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<ImageTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(pipeline: Arc<AugmentationPipeline>, num_workers: usize) -> Self {
        let num_workers = num_workers.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<ImageTask>();
        let mut workers = Vec::new();

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..num_workers)
            .map(|_| mpsc::unbounded_channel::<ImageTask>())
            .unzip();

        // Dispatcher
        workers.push(tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                let _ = worker_senders[worker_idx].send(task);
                worker_idx = (worker_idx + 1) % num_workers;
            }
        }));

        for mut worker_receiver in worker_receivers {
            let worker_pipeline = Arc::clone(&pipeline);
            let worker = tokio::spawn(async move {
                while let Some(ImageTask { job, result_sender }) = worker_receiver.recv().await {
                    let pipeline = Arc::clone(&worker_pipeline);
                    let outcome = tokio::task::spawn_blocking(move || augment_one(&pipeline, &job))
                        .await
                        .unwrap_or_else(|e| {
                            error!("Worker task panicked: {}", e);
                            ImageOutcome::Failed
                        });
                    let _ = result_sender.send(outcome);
                }
            });
            workers.push(worker);
        }

        Self { task_sender, workers }
    }

    pub async fn submit(&self, job: ImageJob) -> Result<ImageOutcome> {
        let (result_sender, result_receiver) = oneshot::channel();
        self.task_sender
            .send(ImageTask { job, result_sender })
            .map_err(|_| AugmentError::Worker("Failed to send task to worker pool".into()))?;
        result_receiver
            .await
            .map_err(|_| AugmentError::Worker("Failed to receive result from worker".into()))
    }

    /// Closes the task channel and waits for the dispatcher and every worker to drain.
    pub async fn shutdown(self) {
        drop(self.task_sender);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// Augments every document in a folder for a number of epochs.
pub struct ParallelAugmentor {
    pipeline: Arc<AugmentationPipeline>,
    num_workers: usize,
    base_seed: Option<u64>,
}

impl ParallelAugmentor {
    pub fn new(pipeline: Arc<AugmentationPipeline>, num_workers: usize) -> Self {
        Self {
            pipeline,
            num_workers: num_workers.max(1),
            base_seed: None,
        }
    }

    /// Makes runs reproducible: every image gets a seed derived from `seed`.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.base_seed = seed;
        self
    }

    pub async fn run(&self, input_folder: &Path, epochs: u32, output_folder: Option<&Path>) -> Result<BatchSummary> {
        let images = discover_images(input_folder)?;
        if images.is_empty() {
            return Err(AugmentError::NoImages(input_folder.to_path_buf()));
        }
        let output_folder = output_folder
            .map(Path::to_path_buf)
            .unwrap_or_else(|| input_folder.join(DEFAULT_OUTPUT_DIR));
        std::fs::create_dir_all(&output_folder)?;

        info!(
            "Augmenting {} image(s) for {} epoch(s) on {} worker(s)",
            images.len(),
            epochs,
            self.num_workers
        );

        let pool = WorkerPool::new(Arc::clone(&self.pipeline), self.num_workers);
        let result = self.run_epochs(&pool, &images, epochs, &output_folder).await;
        pool.shutdown().await;
        result
    }

    async fn run_epochs(
        &self,
        pool: &WorkerPool,
        images: &[PathBuf],
        epochs: u32,
        output_folder: &Path,
    ) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();
        for epoch in 1..=epochs {
            let jobs = images
                .iter()
                .enumerate()
                .map(|(index, path)| self.job_for(path, output_folder, epoch, index));
            let outcomes = join_all(jobs.map(|job| pool.submit(job))).await;
            summary.tally(outcomes)?;
            info!("Epoch {} done: {:?}", epoch, summary);
        }
        Ok(summary)
    }

    fn job_for(&self, image_path: &Path, output_folder: &Path, epoch: u32, index: usize) -> ImageJob {
        let file_name = image_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = image_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let seed = match self.base_seed {
            Some(base) => derive_seed(base, epoch, index),
            None => rand::random(),
        };
        ImageJob {
            image_path: image_path.to_path_buf(),
            ground_truth_path: image_path.with_extension("json"),
            output_image_path: output_folder.join(format!("{epoch}-{file_name}")),
            output_ground_truth_path: output_folder.join(format!("{epoch}-{stem}.json")),
            seed,
        }
    }
}

/// Image files directly inside `folder`, sorted by path.
pub fn discover_images(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        let is_image = path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if is_image {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Seed for image `index` of `epoch`, independent of scheduling.
pub fn derive_seed(base: u64, epoch: u32, index: usize) -> u64 {
    let mut z = base ^ ((epoch as u64) << 40) ^ index as u64;
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn augment_one(pipeline: &AugmentationPipeline, job: &ImageJob) -> ImageOutcome {
    match try_augment_one(pipeline, job) {
        Ok(()) => ImageOutcome::Processed,
        Err(AugmentError::MissingGroundTruth(path)) => {
            warn!("Skipping {}: no ground truth at {}", job.image_path.display(), path.display());
            ImageOutcome::Skipped
        }
        Err(e) => {
            error!("Failed to augment {}: {}", job.image_path.display(), e);
            ImageOutcome::Failed
        }
    }
}

fn try_augment_one(pipeline: &AugmentationPipeline, job: &ImageJob) -> Result<()> {
    if !job.ground_truth_path.is_file() {
        return Err(AugmentError::MissingGroundTruth(job.ground_truth_path.clone()));
    }
    let ground_truth = GroundTruthSet::from_json_file(&job.ground_truth_path)?;
    let image = RasterImage::from(image::open(&job.image_path)?);

    let mut rng = StdRng::seed_from_u64(job.seed);
    let (image, ground_truth) = pipeline.process(image, ground_truth, &mut rng)?;

    let image = if pipeline.debug() {
        draw_ground_truth(&image, &ground_truth)
    } else {
        image
    };
    image.into_dynamic().save(&job.output_image_path)?;
    ground_truth.to_json_file(&job.output_ground_truth_path)?;
    Ok(())
}
