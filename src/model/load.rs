use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use burn::{
    config::Config,
    module::Module,
    record::{DefaultRecorder, Recorder},
    tensor::backend::Backend,
};

use super::*;
use crate::error::{Error, Result};

const CHECKPOINT_DIR: &str = "checkpoint";
const CONFIG_FILE: &str = "predictor.cfg";

/// Name of a saved set of weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochTag {
    Epoch(usize),
    Latest,
    Best,
}

impl fmt::Display for EpochTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpochTag::Epoch(n) => write!(f, "{n}"),
            EpochTag::Latest => write!(f, "latest"),
            EpochTag::Best => write!(f, "best"),
        }
    }
}

impl FromStr for EpochTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "latest" => Ok(EpochTag::Latest),
            "best" => Ok(EpochTag::Best),
            s => s.parse().map(EpochTag::Epoch).map_err(|_| {
                Error::config("loaded_epoch", "epoch number, 'latest' or 'best'")
            }),
        }
    }
}

/// On-disk layout of one experiment:
/// `<root>/<expmodel_id>/checkpoint/{predictor.cfg, <tag>.mpk}`.
#[derive(Debug, Clone)]
pub struct ExperimentPaths {
    checkpoint_dir: PathBuf,
}

impl ExperimentPaths {
    pub fn new(root: impl AsRef<Path>, expmodel_id: &str) -> Self {
        Self {
            checkpoint_dir: root.as_ref().join(expmodel_id).join(CHECKPOINT_DIR),
        }
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.checkpoint_dir.join(CONFIG_FILE)
    }

    pub fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.checkpoint_dir)?;
        Ok(())
    }
}

/// Weight file stem for `tag` inside `dir`; the recorder appends its extension.
pub fn checkpoint_path(dir: &Path, tag: EpochTag) -> PathBuf {
    dir.join(tag.to_string())
}

pub fn save_predictor_config(config: &ResNet1dConfig, path: &Path) -> Result<()> {
    config.save(path)?;
    Ok(())
}

pub fn load_predictor_config(path: &Path) -> Result<ResNet1dConfig> {
    Ok(ResNet1dConfig::load(path)?)
}

pub fn save_checkpoint<B: Backend>(model: &ResNet1d<B>, dir: &Path, tag: EpochTag) -> Result<()> {
    DefaultRecorder::new().record(model.clone().into_record(), checkpoint_path(dir, tag))?;
    Ok(())
}

/// Rebuilds a predictor from `config` and restores the weights saved under
/// `tag`. Weights recorded for a different architecture are rejected.
pub fn load_predictor<B: Backend>(
    config: &ResNet1dConfig,
    dir: &Path,
    tag: EpochTag,
    device: &B::Device,
) -> Result<ResNet1d<B>> {
    let path = checkpoint_path(dir, tag);
    let record: ResNet1dRecord<B> = DefaultRecorder::new().load(path, device)?;

    if record.fc_layers.len() != config.fc_size.len() {
        return Err(Error::Load(format!(
            "checkpoint {tag} has {} fully-connected layers, config expects {}",
            record.fc_layers.len(),
            config.fc_size.len()
        )));
    }

    let model = config.init::<B>(device);
    let expected = model.signature();
    let model = model.load_record(record);

    let found = model.signature();
    if let Some((want, got)) = expected.iter().zip(&found).find(|(want, got)| want != got) {
        return Err(Error::Load(format!(
            "checkpoint {tag} holds a weight of shape {got:?} where config expects {want:?}"
        )));
    }

    Ok(model)
}
