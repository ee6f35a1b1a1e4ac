//! Phase-aware dataloader construction
//!
//! Training loaders shuffle and batch, dropping any final partial batch;
//! validation and test loaders walk samples one at a time. Worker seeds
//! follow `num_workers * rank + worker_id + seed`, so a fixed topology
//! reproduces identical per-worker randomness across runs.
//!
//! Workers are logical shards of one process: worker `w` prepares batches
//! `w, w + num_workers, ...` with its own seeded RNG, and batches are
//! emitted in global order. Background overlap comes from the cpu
//! prefetch wrapper, not from the workers themselves.

use crate::config::DatasetOptions;
use crate::data::dataset::{Batch, ImageDataset};
use crate::data::prefetch::PrefetchLoader;
use crate::error::{Error, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Loader phase, parsed from the dataset options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Train,
    Val,
    Test,
}

impl Phase {
    pub fn parse(phase: &str) -> Result<Self> {
        match phase {
            "train" => Ok(Phase::Train),
            "val" => Ok(Phase::Val),
            "test" => Ok(Phase::Test),
            other => Err(Error::InvalidPhase(other.to_string())),
        }
    }
}

/// Resolved batching policy for one loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderPolicy {
    pub batch_size: usize,
    pub num_workers: usize,
    pub shuffle: bool,
    pub drop_last: bool,
    pub worker_seeds: Vec<u64>,
}

/// Derive the phase policy from the dataset options.
///
/// Train: per-GPU batch size and worker count, shuffle unless an external
/// sampler supplies the order, drop the final partial batch. Val/test:
/// batch size 1, no workers, optional shuffle, keep every sample.
pub fn loader_policy(
    opts: &DatasetOptions,
    seed: u64,
    rank: usize,
    has_sampler: bool,
) -> Result<(Phase, LoaderPolicy)> {
    let phase = Phase::parse(&opts.phase)?;
    let policy = match phase {
        Phase::Train => {
            let num_workers = opts.num_worker_per_gpu;
            LoaderPolicy {
                batch_size: opts.batch_size_per_gpu,
                num_workers,
                shuffle: !has_sampler,
                drop_last: true,
                worker_seeds: (0..num_workers)
                    .map(|w| (num_workers as u64) * (rank as u64) + w as u64 + seed)
                    .collect(),
            }
        }
        Phase::Val | Phase::Test => LoaderPolicy {
            batch_size: 1,
            num_workers: 0,
            shuffle: opts.use_shuffle,
            drop_last: false,
            worker_seeds: Vec::new(),
        },
    };
    Ok((phase, policy))
}

/// Iterates a dataset in batches under a fixed policy.
#[derive(Debug)]
pub struct DataLoader {
    dataset: Box<dyn ImageDataset>,
    phase: Phase,
    policy: LoaderPolicy,
    sampler: Option<Vec<usize>>,
    order: Vec<usize>,
    cursor: usize,
    batch_index: usize,
    epoch_rng: StdRng,
    worker_rngs: Vec<StdRng>,
}

impl DataLoader {
    pub fn new(
        dataset: Box<dyn ImageDataset>,
        phase: Phase,
        policy: LoaderPolicy,
        seed: u64,
        sampler: Option<Vec<usize>>,
    ) -> Self {
        let worker_rngs = policy
            .worker_seeds
            .iter()
            .map(|&s| StdRng::seed_from_u64(s))
            .collect();
        let mut loader = Self {
            dataset,
            phase,
            policy,
            sampler,
            order: Vec::new(),
            cursor: 0,
            batch_index: 0,
            epoch_rng: StdRng::seed_from_u64(seed),
            worker_rngs,
        };
        loader.begin_epoch();
        loader
    }

    /// Rebuild the sample order and rewind to the first batch.
    pub fn begin_epoch(&mut self) {
        self.order = match &self.sampler {
            Some(order) => order.clone(),
            None => (0..self.dataset.len()).collect(),
        };
        if self.policy.shuffle {
            self.order.shuffle(&mut self.epoch_rng);
        }
        self.cursor = 0;
        self.batch_index = 0;
    }

    /// Next batch of the current epoch, or `None` when exhausted.
    pub fn next_batch(&mut self) -> Option<Result<Batch>> {
        let limit = if self.policy.drop_last {
            self.order.len() - self.order.len() % self.policy.batch_size
        } else {
            self.order.len()
        };
        if self.cursor >= limit {
            return None;
        }
        let end = (self.cursor + self.policy.batch_size).min(limit);
        let chunk: Vec<usize> = self.order[self.cursor..end].to_vec();
        self.cursor = end;

        let worker = if self.policy.num_workers > 0 {
            self.batch_index % self.policy.num_workers
        } else {
            0
        };
        self.batch_index += 1;
        Some(self.collate(&chunk, worker))
    }

    fn collate(&mut self, chunk: &[usize], worker: usize) -> Result<Batch> {
        let use_worker_rng = self.phase == Phase::Train && self.policy.num_workers > 0;
        let mut samples = Vec::with_capacity(chunk.len());
        for &index in chunk {
            let sample = if use_worker_rng {
                self.dataset.fetch(index, Some(&mut self.worker_rngs[worker]))?
            } else {
                self.dataset.fetch(index, None)?
            };
            samples.push(sample);
        }
        Batch::collate(samples)
    }

    /// Ask the dataset to regenerate its sample index. Training phase
    /// only; a no-op in val/test.
    pub fn reset(&mut self) {
        if self.phase == Phase::Train {
            self.dataset.reset();
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn policy(&self) -> &LoaderPolicy {
        &self.policy
    }

    pub fn dataset_name(&self) -> &str {
        self.dataset.name()
    }

    pub fn num_samples(&self) -> usize {
        self.dataset.len()
    }

    /// Batches per epoch under the current policy
    pub fn num_batches(&self) -> usize {
        let n = self
            .sampler
            .as_ref()
            .map_or(self.dataset.len(), Vec::len);
        if self.policy.drop_last {
            n / self.policy.batch_size
        } else {
            n.div_ceil(self.policy.batch_size)
        }
    }
}

/// A loader, optionally wrapped in background prefetching.
#[derive(Debug)]
pub enum Loader {
    Plain(DataLoader),
    Prefetch(PrefetchLoader),
}

impl Loader {
    pub fn begin_epoch(&mut self) {
        match self {
            Loader::Plain(l) => l.begin_epoch(),
            Loader::Prefetch(l) => l.begin_epoch(),
        }
    }

    pub fn next_batch(&mut self) -> Option<Result<Batch>> {
        match self {
            Loader::Plain(l) => l.next_batch(),
            Loader::Prefetch(l) => l.next_batch(),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Loader::Plain(l) => l.reset(),
            Loader::Prefetch(l) => l.reset(),
        }
    }

    pub fn dataset_name(&self) -> &str {
        match self {
            Loader::Plain(l) => l.dataset_name(),
            Loader::Prefetch(l) => l.dataset_name(),
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Loader::Plain(l) => l.phase(),
            Loader::Prefetch(l) => l.phase(),
        }
    }

    pub fn policy(&self) -> &LoaderPolicy {
        match self {
            Loader::Plain(l) => l.policy(),
            Loader::Prefetch(l) => l.policy(),
        }
    }
}

/// Wrap a dataset in the loader the options describe.
///
/// `sampler`, when given, fixes the iteration order and disables
/// shuffling. `prefetch_mode: cpu` adds the bounded-queue background
/// wrapper with `num_prefetch_queue` depth.
pub fn build_dataloader(
    dataset: Box<dyn ImageDataset>,
    opts: &DatasetOptions,
    seed: u64,
    rank: usize,
    sampler: Option<Vec<usize>>,
) -> Result<Loader> {
    let (phase, policy) = loader_policy(opts, seed, rank, sampler.is_some())?;
    let loader = DataLoader::new(dataset, phase, policy, seed, sampler);
    match opts.prefetch_mode.as_deref() {
        None | Some("none") => Ok(Loader::Plain(loader)),
        Some("cpu") => Ok(Loader::Prefetch(PrefetchLoader::new(
            loader,
            opts.num_prefetch_queue,
        ))),
        Some(other) => Err(Error::InvalidArgument(format!(
            "unsupported prefetch_mode: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::Sample;
    use crate::data::synthetic::SyntheticBlendDataset;
    use ndarray::Array3;
    use proptest::prelude::*;

    #[derive(Debug)]
    struct IndexDataset {
        n: usize,
    }

    impl ImageDataset for IndexDataset {
        fn name(&self) -> &str {
            "index"
        }

        fn len(&self) -> usize {
            self.n
        }

        fn fetch(&self, index: usize, _rng: Option<&mut StdRng>) -> Result<Sample> {
            Ok(Sample {
                input: Some(Array3::from_elem((3, 2, 2), index as f32)),
                gt: Some(Array3::from_elem((3, 2, 2), index as f32)),
                input_path: None,
            })
        }
    }

    fn train_options(batch: usize, workers: usize) -> DatasetOptions {
        DatasetOptions {
            phase: "train".to_string(),
            batch_size_per_gpu: batch,
            num_worker_per_gpu: workers,
            ..DatasetOptions::default()
        }
    }

    fn first_values(loader: &mut DataLoader) -> Vec<f32> {
        let mut values = Vec::new();
        while let Some(batch) = loader.next_batch() {
            let batch = batch.unwrap();
            values.push(batch.input.unwrap()[[0, 0, 0, 0]]);
        }
        values
    }

    #[test]
    fn test_train_policy() {
        let opts = train_options(4, 2);
        let (phase, policy) = loader_policy(&opts, 7, 0, false).unwrap();

        assert_eq!(phase, Phase::Train);
        assert_eq!(policy.batch_size, 4);
        assert_eq!(policy.num_workers, 2);
        assert!(policy.shuffle);
        assert!(policy.drop_last);
        assert_eq!(policy.worker_seeds, vec![7, 8]);
    }

    #[test]
    fn test_worker_seeds_scale_with_rank() {
        let opts = train_options(4, 2);
        let (_, policy) = loader_policy(&opts, 5, 3, false).unwrap();
        assert_eq!(policy.worker_seeds, vec![11, 12]);
    }

    #[test]
    fn test_sampler_disables_shuffle() {
        let opts = train_options(4, 0);
        let (_, policy) = loader_policy(&opts, 0, 0, true).unwrap();
        assert!(!policy.shuffle);
    }

    #[test]
    fn test_val_and_test_policy() {
        for phase in ["val", "test"] {
            let opts = DatasetOptions {
                phase: phase.to_string(),
                batch_size_per_gpu: 8,
                num_worker_per_gpu: 4,
                ..DatasetOptions::default()
            };
            let (_, policy) = loader_policy(&opts, 0, 0, false).unwrap();
            assert_eq!(policy.batch_size, 1);
            assert_eq!(policy.num_workers, 0);
            assert!(!policy.shuffle);
            assert!(!policy.drop_last);
        }
    }

    #[test]
    fn test_val_shuffle_flag_respected() {
        let opts = DatasetOptions {
            phase: "val".to_string(),
            use_shuffle: true,
            ..DatasetOptions::default()
        };
        let (_, policy) = loader_policy(&opts, 0, 0, false).unwrap();
        assert!(policy.shuffle);
    }

    #[test]
    fn test_unknown_phase_rejected() {
        let opts = DatasetOptions {
            phase: "predict".to_string(),
            ..DatasetOptions::default()
        };
        let err = loader_policy(&opts, 0, 0, false).unwrap_err();
        assert!(matches!(err, Error::InvalidPhase(_)));
        assert!(err.to_string().contains("predict"));
    }

    #[test]
    fn test_drop_last_in_train() {
        let opts = train_options(4, 0);
        let (phase, policy) = loader_policy(&opts, 1, 0, false).unwrap();
        let mut loader =
            DataLoader::new(Box::new(IndexDataset { n: 10 }), phase, policy, 1, None);

        let mut lens = Vec::new();
        while let Some(batch) = loader.next_batch() {
            lens.push(batch.unwrap().len());
        }
        assert_eq!(lens, vec![4, 4]);
        assert_eq!(loader.num_batches(), 2);
    }

    #[test]
    fn test_partial_batch_kept_without_drop_last() {
        let policy = LoaderPolicy {
            batch_size: 4,
            num_workers: 0,
            shuffle: false,
            drop_last: false,
            worker_seeds: Vec::new(),
        };
        let mut loader =
            DataLoader::new(Box::new(IndexDataset { n: 10 }), Phase::Val, policy, 0, None);

        let mut lens = Vec::new();
        while let Some(batch) = loader.next_batch() {
            lens.push(batch.unwrap().len());
        }
        assert_eq!(lens, vec![4, 4, 2]);
        assert_eq!(loader.num_batches(), 3);
    }

    #[test]
    fn test_shuffle_reproducible_for_same_seed() {
        let opts = train_options(1, 0);
        let make = |seed| {
            let (phase, policy) = loader_policy(&opts, seed, 0, false).unwrap();
            DataLoader::new(Box::new(IndexDataset { n: 16 }), phase, policy, seed, None)
        };

        let a = first_values(&mut make(9));
        let b = first_values(&mut make(9));
        let c = first_values(&mut make(10));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_sampler_order_respected() {
        let opts = train_options(1, 0);
        let sampler = vec![2, 0, 1];
        let (phase, policy) = loader_policy(&opts, 0, 0, true).unwrap();
        let mut loader = DataLoader::new(
            Box::new(IndexDataset { n: 3 }),
            phase,
            policy,
            0,
            Some(sampler),
        );
        assert_eq!(first_values(&mut loader), vec![2.0, 0.0, 1.0]);
    }

    #[test]
    fn test_reset_regenerates_only_in_train() {
        let make_dataset = || {
            let mut opts = DatasetOptions {
                name: "syn".to_string(),
                num_samples: 4,
                patch_size: 4,
                ..DatasetOptions::default()
            };
            opts.extra.insert("seed".to_string(), serde_json::json!(5));
            Box::new(SyntheticBlendDataset::new(opts))
        };
        let policy = LoaderPolicy {
            batch_size: 1,
            num_workers: 0,
            shuffle: false,
            drop_last: false,
            worker_seeds: Vec::new(),
        };

        let mut train =
            DataLoader::new(make_dataset(), Phase::Train, policy.clone(), 0, None);
        let before = first_values(&mut train);
        train.reset();
        train.begin_epoch();
        assert_ne!(first_values(&mut train), before);

        let mut val = DataLoader::new(make_dataset(), Phase::Val, policy, 0, None);
        let before = first_values(&mut val);
        val.reset();
        val.begin_epoch();
        assert_eq!(first_values(&mut val), before);
    }

    #[test]
    fn test_build_dataloader_rejects_unknown_prefetch_mode() {
        let mut opts = train_options(1, 0);
        opts.prefetch_mode = Some("cuda".to_string());
        let err =
            build_dataloader(Box::new(IndexDataset { n: 2 }), &opts, 0, 0, None).unwrap_err();
        assert!(err.to_string().contains("prefetch_mode"));
    }

    #[test]
    fn test_build_dataloader_plain_by_default() {
        let opts = train_options(2, 0);
        let loader = build_dataloader(Box::new(IndexDataset { n: 4 }), &opts, 0, 0, None).unwrap();
        assert!(matches!(loader, Loader::Plain(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_worker_seeds_follow_formula(
            workers in 1usize..8,
            rank in 0usize..4,
            seed in 0u64..1000,
        ) {
            let mut opts = train_options(2, workers);
            opts.num_worker_per_gpu = workers;
            let (_, policy) = loader_policy(&opts, seed, rank, false).unwrap();
            let (_, again) = loader_policy(&opts, seed, rank, false).unwrap();

            prop_assert_eq!(&policy.worker_seeds, &again.worker_seeds);
            for (w, &s) in policy.worker_seeds.iter().enumerate() {
                prop_assert_eq!(s, (workers as u64) * (rank as u64) + w as u64 + seed);
            }
        }
    }
}
