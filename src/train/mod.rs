//! Epoch-driven training loop
//!
//! [`Runner`] wires the model and its dataloaders to the reporter:
//! per-batch optimizer steps with EMA updates, a scheduled learning
//! rate applied at epoch boundaries, periodic validation and periodic
//! checkpoints with best-metric tracking.

pub mod loss;

use crate::data::Loader;
use crate::error::{Error, Result};
use crate::io::save_checkpoint;
use crate::model::{BaseModel, OptimizerBundle, ScheduleInterval};
use crate::report::Reporter;
use std::collections::HashMap;
use std::path::PathBuf;

pub struct Runner {
    model: BaseModel,
    train_loader: Option<Loader>,
    val_loaders: Vec<Loader>,
    reporter: Reporter,
    iter: u64,
    best_monitored: Option<f64>,
}

impl Runner {
    pub fn new(
        model: BaseModel,
        train_loader: Option<Loader>,
        val_loaders: Vec<Loader>,
        reporter: Reporter,
    ) -> Self {
        Self {
            model,
            train_loader,
            val_loaders,
            reporter,
            iter: 0,
            best_monitored: None,
        }
    }

    pub fn model(&self) -> &BaseModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut BaseModel {
        &mut self.model
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Run the full training schedule from `train.epochs`.
    ///
    /// Each epoch trains every batch. Validation runs every `val_freq`
    /// epochs and a checkpoint lands every `save_freq` epochs; the
    /// train dataset regenerates its samples between epochs.
    pub fn fit(&mut self) -> Result<()> {
        if self.train_loader.is_none() {
            return Err(Error::InvalidArgument(
                "training requires a train dataloader".to_string(),
            ));
        }

        let mut bundle = self.model.configure_optimizers()?;
        let epochs = self.model.options().train.epochs;
        self.reporter.info(format!(
            "Starting training: {epochs} epochs, monitoring {}",
            bundle.monitor
        ));

        for epoch in 0..epochs {
            self.train_epoch(epoch, &mut bundle)?;

            let val_freq = self.model.options().val.val_freq;
            if !self.val_loaders.is_empty() && val_freq > 0 && (epoch + 1) % val_freq == 0 {
                let averages = self.validate(epoch)?;
                self.track_best(&bundle.monitor, &averages, epoch)?;
            }

            let save_freq = self.model.options().train.save_freq;
            if save_freq > 0 && (epoch + 1) % save_freq == 0 {
                self.save(epoch)?;
            }

            if let Some(loader) = self.train_loader.as_mut() {
                loader.reset();
            }
        }

        self.reporter.info("Training finished");
        Ok(())
    }

    /// One validation pass over every validation loader. Returns the
    /// sample-weighted metric means, keyed by metric name.
    pub fn validate(&mut self, epoch: usize) -> Result<HashMap<String, f64>> {
        let names: Vec<&str> = self.val_loaders.iter().map(Loader::dataset_name).collect();
        self.model.validation_begin(&names);

        for loader_idx in 0..self.val_loaders.len() {
            self.val_loaders[loader_idx].begin_epoch();
            let mut batch_idx = 0;
            while let Some(batch) = self.val_loaders[loader_idx].next_batch() {
                let batch = batch?;
                self.model
                    .validation_step(&batch, batch_idx, loader_idx, self.iter, &self.reporter)?;
                batch_idx += 1;
            }
        }

        Ok(self.model.validation_end(epoch, &self.reporter))
    }

    fn train_epoch(&mut self, epoch: usize, bundle: &mut OptimizerBundle) -> Result<()> {
        bundle.scheduler.apply(bundle.optimizer.as_mut());
        let lr = bundle.optimizer.lr();
        self.reporter.scalar("train/lr", epoch as u64, f64::from(lr));

        let print_freq = self.model.options().train.print_freq as u64;
        let mut epoch_loss = 0.0f64;
        let mut batches = 0u64;

        let loader = self.train_loader.as_mut().ok_or_else(|| {
            Error::InvalidArgument("training requires a train dataloader".to_string())
        })?;
        loader.begin_epoch();
        while let Some(batch) = loader.next_batch() {
            let batch = batch?;

            {
                let mut params = self.model.net_mut().params_mut();
                bundle.optimizer.zero_grad(&mut params);
            }
            let loss = self.model.train_step(&batch)?;
            {
                let mut params = self.model.net_mut().params_mut();
                bundle.optimizer.step(&mut params);
            }
            self.model.update_ema();

            self.iter += 1;
            epoch_loss += f64::from(loss);
            batches += 1;
            if print_freq > 0 && self.iter % print_freq == 0 {
                self.reporter.info(format!(
                    "[epoch {epoch}] iter {iter} loss {loss:.4} lr {lr:.2e}",
                    iter = self.iter
                ));
                self.reporter.scalar("train/loss", self.iter, f64::from(loss));
            }
        }

        if batches > 0 {
            self.reporter.verbose(format!(
                "Epoch {epoch} mean loss {:.4}",
                epoch_loss / batches as f64
            ));
        }

        match bundle.interval {
            ScheduleInterval::Epoch => {
                for _ in 0..bundle.frequency {
                    bundle.scheduler.step();
                }
            }
        }
        Ok(())
    }

    /// Save a fresh best checkpoint when the monitored metric improves.
    fn track_best(
        &mut self,
        monitor: &str,
        averages: &HashMap<String, f64>,
        epoch: usize,
    ) -> Result<()> {
        let metric = monitor.rsplit('/').next().unwrap_or(monitor);
        let Some(&value) = averages.get(metric) else {
            return Ok(());
        };
        if self.best_monitored.map_or(true, |best| value > best) {
            self.best_monitored = Some(value);
            let path = self.checkpoint_path("best");
            save_checkpoint(&path, &self.model.checkpoint_groups(), epoch as u64 + 1, self.iter)?;
            self.reporter.info(format!(
                "New best {monitor}: {value:.4}, saved {}",
                path.display()
            ));
        }
        Ok(())
    }

    fn save(&self, epoch: usize) -> Result<()> {
        let path = self.checkpoint_path(&format!("epoch_{epoch}"));
        save_checkpoint(&path, &self.model.checkpoint_groups(), epoch as u64 + 1, self.iter)?;
        self.reporter
            .info(format!("Saved checkpoint {}", path.display()));
        Ok(())
    }

    fn checkpoint_path(&self, stem: &str) -> PathBuf {
        self.model
            .options()
            .path
            .checkpoints
            .join(format!("{stem}.safetensors"))
    }
}
