use burn::tensor::{backend::Backend, Tensor, TensorData};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::error::{Error, Result};
use crate::reader::{Sample, SignalReader};

#[derive(Debug, Clone)]
pub struct SignalBatch<B: Backend> {
    /// `[batch, n_channel, length]`
    pub signals: Tensor<B, 3>,
    /// `[batch, label_size]`
    pub targets: Tensor<B, 2>,
}

/// Groups the samples of a [`SignalReader`] into fixed-size batches.
#[derive(Debug, Clone)]
pub struct SignalLoader {
    reader: SignalReader,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    seed: u64,
}

impl SignalLoader {
    pub fn new(
        reader: SignalReader,
        batch_size: usize,
        shuffle: bool,
        drop_last: bool,
        seed: u64,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::config("n_batchsize", "int, >0"));
        }
        if drop_last && reader.len() < batch_size {
            return Err(Error::data(format!(
                "{} samples cannot fill a batch of {batch_size}",
                reader.len()
            )));
        }

        Ok(Self {
            reader,
            batch_size,
            shuffle,
            drop_last,
            seed,
        })
    }

    pub fn reader(&self) -> &SignalReader {
        &self.reader
    }

    pub fn num_batches(&self) -> usize {
        if self.drop_last {
            self.reader.len() / self.batch_size
        } else {
            self.reader.len().div_ceil(self.batch_size)
        }
    }

    /// Sample order for `epoch`. Shuffling is reproducible for a given seed.
    pub fn order(&self, epoch: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.reader.len()).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(epoch as u64));
            indices.shuffle(&mut rng);
        }

        let n_kept = if self.drop_last {
            self.num_batches() * self.batch_size
        } else {
            indices.len()
        };
        indices.truncate(n_kept);
        indices
    }

    pub fn iter<'a, B: Backend>(
        &'a self,
        epoch: usize,
        device: &'a B::Device,
    ) -> impl Iterator<Item = Result<SignalBatch<B>>> + 'a {
        let order = self.order(epoch);

        (0..self.num_batches()).map(move |i| {
            let end = ((i + 1) * self.batch_size).min(order.len());
            let samples = order[i * self.batch_size..end]
                .iter()
                .map(|&index| self.reader.read(index))
                .collect::<Result<Vec<_>>>()?;

            Ok(collate(&samples, self.reader.n_channel(), self.reader.label_size(), device))
        })
    }
}

/// Stacks samples into channel-major tensors, zero-padding every signal to
/// the longest one in the batch.
pub fn collate<B: Backend>(
    samples: &[Sample],
    n_channel: usize,
    label_size: usize,
    device: &B::Device,
) -> SignalBatch<B> {
    let n_batch = samples.len();
    let max_len = samples.iter().map(|s| s.length).max().unwrap_or(0);

    let mut signals = vec![0.0f32; n_batch * n_channel * max_len];
    for (b, sample) in samples.iter().enumerate() {
        for (t, frame) in sample.signal.chunks(n_channel).enumerate() {
            for (c, &v) in frame.iter().enumerate() {
                signals[(b * n_channel + c) * max_len + t] = v;
            }
        }
    }

    let targets: Vec<f32> = samples.iter().flat_map(|s| s.label.iter().copied()).collect();

    SignalBatch {
        signals: Tensor::from_data(TensorData::new(signals, [n_batch, n_channel, max_len]), device),
        targets: Tensor::from_data(TensorData::new(targets, [n_batch, label_size]), device),
    }
}
