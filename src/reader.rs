use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
};

use npy::NpyData;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::MIN_SIGNAL_LENGTH;

/// A label as written in a descriptor: a class index or scalar target, or a
/// full label vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Scalar(f32),
    Vector(Vec<f32>),
}

impl Label {
    /// Expands the label into a vector of `label_n` entries. A scalar with
    /// `label_n > 1` is a class index and becomes one-hot.
    pub fn normalize(&self, label_n: usize) -> Result<Vec<f32>> {
        match self {
            Label::Vector(v) if v.len() == label_n => Ok(v.clone()),
            Label::Vector(v) => Err(Error::data(format!(
                "label vector has {} entries, label_n is {label_n}",
                v.len()
            ))),
            Label::Scalar(v) if label_n == 1 => Ok(vec![*v]),
            Label::Scalar(v) => {
                if v.fract() != 0.0 || *v < 0.0 || *v as usize >= label_n {
                    return Err(Error::data(format!(
                        "class index {v} outside 0..{label_n}"
                    )));
                }
                let mut one_hot = vec![0.0; label_n];
                one_hot[*v as usize] = 1.0;
                Ok(one_hot)
            }
        }
    }
}

/// Describes one train/valid/test split. `x[i]` is a sample file holding
/// `l[i] * feat_n` time-major `f32` values, labelled by `y[i]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub x: Vec<PathBuf>,
    pub y: Vec<Label>,
    pub l: Vec<usize>,
    pub feat_n: usize,
    pub label_n: usize,
}

impl DatasetDescriptor {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Structural checks that need no file access. Returns the normalized
    /// labels.
    pub fn check(&self) -> Result<Vec<Vec<f32>>> {
        if self.x.is_empty() {
            return Err(Error::data("descriptor lists no samples"));
        }
        if self.y.len() != self.x.len() || self.l.len() != self.x.len() {
            return Err(Error::data(format!(
                "x, y and l must have equal lengths, got {}, {} and {}",
                self.x.len(),
                self.y.len(),
                self.l.len()
            )));
        }
        if self.feat_n == 0 || self.label_n == 0 {
            return Err(Error::data("feat_n and label_n must be positive"));
        }
        if let Some((i, l)) = self.l.iter().enumerate().find(|(_, &l)| l < MIN_SIGNAL_LENGTH) {
            return Err(Error::data(format!(
                "sample {i} has length {l}, shorter than {MIN_SIGNAL_LENGTH}"
            )));
        }

        self.y.iter().map(|y| y.normalize(self.label_n)).collect()
    }
}

#[derive(Debug, Clone)]
pub struct Sample {
    /// `[length * n_channel]`, time-major.
    pub signal: Vec<f32>,
    pub length: usize,
    pub label: Vec<f32>,
}

/// Resolves a descriptor into samples, reading each `.npy` file on demand.
#[derive(Debug, Clone)]
pub struct SignalReader {
    paths: Vec<PathBuf>,
    lengths: Vec<usize>,
    labels: Vec<Vec<f32>>,
    n_channel: usize,
    label_size: usize,
}

impl SignalReader {
    pub fn new(descriptor: &DatasetDescriptor) -> Result<Self> {
        let labels = descriptor.check()?;

        Ok(Self {
            paths: descriptor.x.clone(),
            lengths: descriptor.l.clone(),
            labels,
            n_channel: descriptor.feat_n,
            label_size: descriptor.label_n,
        })
    }

    pub fn n_channel(&self) -> usize {
        self.n_channel
    }

    pub fn label_size(&self) -> usize {
        self.label_size
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn labels(&self) -> &[Vec<f32>] {
        &self.labels
    }

    pub fn length(&self, index: usize) -> usize {
        self.lengths[index]
    }

    pub fn read(&self, index: usize) -> Result<Sample> {
        let path = &self.paths[index];
        let length = self.lengths[index];

        let mut buf = vec![];
        fs::File::open(path)?.read_to_end(&mut buf)?;
        let data: NpyData<f32> = NpyData::from_bytes(&buf)?;
        let signal = data.to_vec();

        if signal.len() != length * self.n_channel {
            return Err(Error::data(format!(
                "{} holds {} values, expected {length} x {} channels",
                path.display(),
                signal.len(),
                self.n_channel
            )));
        }

        Ok(Sample {
            signal,
            length,
            label: self.labels[index].clone(),
        })
    }
}
