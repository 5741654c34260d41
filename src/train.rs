use std::path::Path;

use burn::{
    module::{AutodiffModule, Module},
    optim::{GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion},
};

use crate::error::{Error, Result};
use crate::executor::ParallelExecutor;
use crate::loader::SignalLoader;
use crate::loss::Criterion;
use crate::model::{
    load::{save_checkpoint, EpochTag},
    ResNet1d,
};

#[derive(Debug, Clone, PartialEq)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub valid_loss: f64,
}

/// Loss history of a training run.
#[derive(Debug, Clone, Default)]
pub struct TrainSummary {
    pub epochs: Vec<EpochRecord>,
    pub best_epoch: Option<usize>,
}

impl TrainSummary {
    pub fn best(&self) -> Option<&EpochRecord> {
        let best = self.best_epoch?;
        self.epochs.iter().find(|record| record.epoch == best)
    }
}

/// Epoch loop shared by every optimizer: train on shuffled batches, score the
/// validation split, and checkpoint `latest`, every `n_epoch_saved`-th epoch,
/// and the best validation loss so far.
pub struct Trainer<'a, B: AutodiffBackend> {
    pub criterion: &'a Criterion,
    pub executor: &'a ParallelExecutor<B>,
    pub checkpoint_dir: &'a Path,
    pub n_epoch: usize,
    pub n_epoch_saved: usize,
    pub learning_rate: f64,
}

impl<'a, B: AutodiffBackend> Trainer<'a, B> {
    pub fn fit<O>(
        &self,
        mut model: ResNet1d<B>,
        mut optim: O,
        train: &SignalLoader,
        valid: &SignalLoader,
    ) -> Result<(ResNet1d<B>, TrainSummary)>
    where
        O: Optimizer<ResNet1d<B>, B>,
    {
        let mut summary = TrainSummary::default();
        let mut best_loss = f64::INFINITY;

        for epoch in 1..=self.n_epoch {
            let mut total = 0.0;
            let mut n_batch = 0;

            for batch in train.iter::<B>(epoch, self.executor.primary()) {
                let batch = batch?;

                let logits = self.executor.forward(&model, batch.signals);
                let loss = self.criterion.forward(logits, batch.targets);
                let value = loss.clone().into_scalar().elem::<f64>();
                log::debug!("epoch {epoch} batch {n_batch}: loss {value:.5}");

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optim.step(self.learning_rate, model, grads);

                total += value;
                n_batch += 1;
            }

            let train_loss = total / n_batch.max(1) as f64;
            let valid_loss = self.evaluate(&model.valid(), valid)?;
            log::info!(
                "epoch {epoch}/{}: train loss {train_loss:.5}, valid loss {valid_loss:.5}",
                self.n_epoch
            );

            save_checkpoint(&model, self.checkpoint_dir, EpochTag::Latest)?;
            if epoch % self.n_epoch_saved == 0 {
                save_checkpoint(&model, self.checkpoint_dir, EpochTag::Epoch(epoch))?;
            }
            if valid_loss < best_loss {
                best_loss = valid_loss;
                summary.best_epoch = Some(epoch);
                save_checkpoint(&model, self.checkpoint_dir, EpochTag::Best)?;
            }

            summary.epochs.push(EpochRecord {
                epoch,
                train_loss,
                valid_loss,
            });
        }

        Ok((model, summary))
    }

    /// Mean criterion value over the loader, with batch norm in inference mode.
    pub fn evaluate(
        &self,
        model: &ResNet1d<B::InnerBackend>,
        loader: &SignalLoader,
    ) -> Result<f64> {
        let device = model.devices().into_iter().next().ok_or(Error::NotBuilt)?;

        let mut total = 0.0;
        let mut n_batch = 0;
        for batch in loader.iter::<B::InnerBackend>(0, &device) {
            let batch = batch?;
            let logits = model.forward(batch.signals);
            total += self
                .criterion
                .forward(logits, batch.targets)
                .into_scalar()
                .elem::<f64>();
            n_batch += 1;
        }

        Ok(total / n_batch.max(1) as f64)
    }
}
