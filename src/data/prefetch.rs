//! Bounded-queue background prefetching
//!
//! A producer thread pulls batches from the wrapped loader into a bounded
//! channel, blocking when the queue is full; `next_batch` blocks when it
//! is empty. Dropping the wrapper disconnects the channel and the
//! producer winds down on its next send.

use crate::data::dataset::Batch;
use crate::data::loader::{DataLoader, LoaderPolicy, Phase};
use crate::error::Result;
use crossbeam_channel::{bounded, Receiver};
use std::thread::{self, JoinHandle};

#[derive(Debug)]
pub struct PrefetchLoader {
    inner: Option<DataLoader>,
    depth: usize,
    name: String,
    phase: Phase,
    policy: LoaderPolicy,
    rx: Option<Receiver<Result<Batch>>>,
    handle: Option<JoinHandle<DataLoader>>,
}

impl PrefetchLoader {
    /// Wrap a loader with a prefetch queue of the given depth.
    pub fn new(loader: DataLoader, depth: usize) -> Self {
        let mut wrapper = Self {
            name: loader.dataset_name().to_string(),
            phase: loader.phase(),
            policy: loader.policy().clone(),
            inner: Some(loader),
            depth: depth.max(1),
            rx: None,
            handle: None,
        };
        wrapper.spawn();
        wrapper
    }

    fn spawn(&mut self) {
        let Some(mut loader) = self.inner.take() else {
            return;
        };
        let (tx, rx) = bounded(self.depth);
        let handle = thread::spawn(move || {
            while let Some(batch) = loader.next_batch() {
                if tx.send(batch).is_err() {
                    break;
                }
            }
            loader
        });
        self.rx = Some(rx);
        self.handle = Some(handle);
    }

    /// Stop the producer and take the loader back.
    fn reclaim(&mut self) {
        self.rx = None;
        if let Some(handle) = self.handle.take() {
            if let Ok(loader) = handle.join() {
                self.inner = Some(loader);
            }
        }
    }

    /// Restart the stream from a fresh epoch.
    pub fn begin_epoch(&mut self) {
        self.reclaim();
        if let Some(loader) = &mut self.inner {
            loader.begin_epoch();
        }
        self.spawn();
    }

    /// Next prefetched batch, blocking until one is ready.
    pub fn next_batch(&mut self) -> Option<Result<Batch>> {
        let rx = self.rx.as_ref()?;
        match rx.recv() {
            Ok(batch) => Some(batch),
            Err(_) => {
                self.reclaim();
                None
            }
        }
    }

    /// Regenerate the dataset index (training phase only).
    pub fn reset(&mut self) {
        self.reclaim();
        if let Some(loader) = &mut self.inner {
            loader.reset();
        }
    }

    pub fn dataset_name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn policy(&self) -> &LoaderPolicy {
        &self.policy
    }
}
