use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use burn::{
    config::Config,
    module::{AutodiffModule, Module},
    optim::{decay::WeightDecayConfig, AdamConfig, SgdConfig},
    tensor::backend::AutodiffBackend,
};

use crate::device::Placement;
use crate::error::{self, Error};
use crate::executor::ParallelExecutor;
use crate::helper::{argmax_rows, tensor_rows};
use crate::loader::SignalLoader;
use crate::loss::{Aggregate, Criterion, TaskType};
use crate::model::{
    load::{load_predictor, load_predictor_config, save_predictor_config, EpochTag, ExperimentPaths},
    ResNet1d, ResNet1dConfig,
};
use crate::reader::{DatasetDescriptor, SignalReader};
use crate::train::{TrainSummary, Trainer};

/// User-facing hyperparameters. Strings are checked when the controller is
/// constructed, see [`Hyperparameters::from_config`].
#[derive(Config, Debug)]
pub struct DeepRes1dConfig {
    /// Name of the experiment, also its directory under `root_dir`.
    #[config(default = "String::from(\"test.new\")")]
    pub expmodel_id: String,
    #[config(default = 100)]
    pub n_epoch: usize,
    #[config(default = 5)]
    pub n_batchsize: usize,
    /// Widths of the hidden fully-connected layers.
    #[config(default = "vec![64, 16]")]
    pub fc_size: Vec<usize>,
    #[config(default = 1e-4)]
    pub learn_ratio: f64,
    /// L2 penalty.
    #[config(default = 1e-4)]
    pub weight_decay: f64,
    /// Save a numbered checkpoint every `n_epoch_saved` epochs.
    #[config(default = 1)]
    pub n_epoch_saved: usize,
    #[config(default = "String::from(\"L1LossSoftmax\")")]
    pub loss_name: String,
    /// `sum` or `avg`.
    #[config(default = "String::from(\"sum\")")]
    pub aggregate: String,
    /// `adam` or `sgd`.
    #[config(default = "String::from(\"adam\")")]
    pub optimizer_name: String,
    #[config(default = false)]
    pub use_gpu: bool,
    /// Comma separated device ordinals, e.g. `0,2,6`.
    #[config(default = "String::from(\"0\")")]
    pub gpu_ids: String,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = "PathBuf::from(\"experiments_records\")")]
    pub root_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Adam,
    Sgd,
}

impl FromStr for OptimizerKind {
    type Err = Error;

    fn from_str(s: &str) -> error::Result<Self> {
        match s {
            "adam" => Ok(OptimizerKind::Adam),
            "sgd" => Ok(OptimizerKind::Sgd),
            _ => Err(Error::config("optimizer_name", "str, ['adam','sgd']")),
        }
    }
}

/// Validated form of [`DeepRes1dConfig`].
#[derive(Debug, Clone)]
pub struct Hyperparameters {
    pub expmodel_id: String,
    pub n_epoch: usize,
    pub n_batchsize: usize,
    pub fc_size: Vec<usize>,
    pub learn_ratio: f64,
    pub weight_decay: f64,
    pub n_epoch_saved: usize,
    pub loss_name: String,
    pub aggregate: Aggregate,
    pub optimizer: OptimizerKind,
    pub use_gpu: bool,
    pub gpu_ids: Vec<usize>,
    pub seed: u64,
    pub root_dir: PathBuf,
}

impl Hyperparameters {
    pub fn from_config(config: &DeepRes1dConfig) -> error::Result<Self> {
        if config.n_batchsize == 0 {
            return Err(Error::config("n_batchsize", "int, >0"));
        }
        if config.n_epoch == 0 {
            return Err(Error::config("n_epoch", "int, >0"));
        }
        if !(config.weight_decay.is_finite() && config.weight_decay >= 0.0) {
            return Err(Error::config("weight_decay", "float, >=0."));
        }
        if !(config.learn_ratio.is_finite() && config.learn_ratio > 0.0) {
            return Err(Error::config("learn_ratio", "float, >0."));
        }
        if config.n_epoch_saved == 0 || config.n_epoch_saved >= config.n_epoch {
            return Err(Error::config(
                "n_epoch_saved",
                format!("int, >0 and <{}", config.n_epoch),
            ));
        }
        if config.fc_size.contains(&0) {
            return Err(Error::config("fc_size", "list of positive ints, e.g. [64, 16]"));
        }
        let aggregate = config.aggregate.parse()?;
        let optimizer = config.optimizer_name.parse()?;
        let gpu_ids = parse_gpu_ids(&config.gpu_ids)?;

        Ok(Self {
            expmodel_id: config.expmodel_id.clone(),
            n_epoch: config.n_epoch,
            n_batchsize: config.n_batchsize,
            fc_size: config.fc_size.clone(),
            learn_ratio: config.learn_ratio,
            weight_decay: config.weight_decay,
            n_epoch_saved: config.n_epoch_saved,
            loss_name: config.loss_name.clone(),
            aggregate,
            optimizer,
            use_gpu: config.use_gpu,
            gpu_ids,
            seed: config.seed,
            root_dir: config.root_dir.clone(),
        })
    }

    fn weight_decay(&self) -> Option<WeightDecayConfig> {
        (self.weight_decay > 0.0).then(|| WeightDecayConfig::new(self.weight_decay as f32))
    }
}

fn parse_gpu_ids(ids: &str) -> error::Result<Vec<usize>> {
    let parsed = ids
        .split(',')
        .map(|id| id.trim().parse::<usize>())
        .collect::<std::result::Result<Vec<_>, _>>();

    match parsed {
        Ok(ids) if !ids.is_empty() => Ok(ids),
        _ => Err(Error::config("gpu_ids", "str of device ordinals such as '0,2,6'")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Configured,
    Built,
    Loaded,
    Trained,
}

/// Probabilities and true labels for every sample of a split.
#[derive(Debug, Clone)]
pub struct Inference {
    pub task: TaskType,
    pub y_hat: Vec<Vec<f32>>,
    pub y: Vec<Vec<f32>>,
}

impl Inference {
    pub fn predicted_classes(&self) -> Vec<usize> {
        argmax_rows(&self.y_hat)
    }
}

/// Trains, restores and runs the [`ResNet1d`] predictor for one experiment.
pub struct DeepRes1d<B: AutodiffBackend + Placement> {
    hyper: Hyperparameters,
    paths: ExperimentPaths,
    executor: ParallelExecutor<B>,
    state: ControllerState,
    task: Option<TaskType>,
    predictor: Option<ResNet1d<B>>,
    predictor_config: Option<ResNet1dConfig>,
    criterion: Option<Criterion>,
    summary: Option<TrainSummary>,
}

impl<B: AutodiffBackend + Placement> DeepRes1d<B> {
    pub fn new(config: DeepRes1dConfig) -> error::Result<Self> {
        let hyper = Hyperparameters::from_config(&config)?;
        let paths = ExperimentPaths::new(&hyper.root_dir, &hyper.expmodel_id);
        let executor = ParallelExecutor::new(B::devices(hyper.use_gpu, &hyper.gpu_ids))?;

        Ok(Self {
            hyper,
            paths,
            executor,
            state: ControllerState::Configured,
            task: None,
            predictor: None,
            predictor_config: None,
            criterion: None,
            summary: None,
        })
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyper
    }

    pub fn paths(&self) -> &ExperimentPaths {
        &self.paths
    }

    pub fn task(&self) -> Option<TaskType> {
        self.task
    }

    pub fn predictor(&self) -> Option<&ResNet1d<B>> {
        self.predictor.as_ref()
    }

    pub fn predictor_config(&self) -> Option<&ResNet1dConfig> {
        self.predictor_config.as_ref()
    }

    pub fn summary(&self) -> Option<&TrainSummary> {
        self.summary.as_ref()
    }

    /// Trains on `train_data`, validating on `valid_data` after every epoch.
    /// The task is inferred from the training labels when not given.
    pub fn fit(
        &mut self,
        train_data: &DatasetDescriptor,
        valid_data: &DatasetDescriptor,
        task: Option<TaskType>,
    ) -> error::Result<&TrainSummary> {
        let train_reader = SignalReader::new(train_data)?;
        let valid_reader = SignalReader::new(valid_data)?;
        if train_reader.n_channel() != valid_reader.n_channel()
            || train_reader.label_size() != valid_reader.label_size()
        {
            return Err(Error::data(
                "train and valid descriptors disagree on feat_n or label_n",
            ));
        }

        let task = task.unwrap_or_else(|| TaskType::infer(train_reader.labels()));
        log::info!(
            "{}: {task} task, {} train / {} valid samples",
            self.hyper.expmodel_id,
            train_reader.len(),
            valid_reader.len()
        );

        let n_channel = train_reader.n_channel();
        let label_size = train_reader.label_size();
        let batch = self.hyper.n_batchsize;
        let train = SignalLoader::new(train_reader, batch, true, true, self.hyper.seed)?;
        let valid = SignalLoader::new(valid_reader, batch, false, true, self.hyper.seed)?;

        self.build_model(n_channel, label_size, task)?;

        // the stored predictor stays untouched until training succeeds
        let model = self.predictor.clone().ok_or(Error::NotBuilt)?;
        let criterion = self.criterion.as_ref().ok_or(Error::NotBuilt)?;
        let trainer = Trainer {
            criterion,
            executor: &self.executor,
            checkpoint_dir: self.paths.checkpoint_dir(),
            n_epoch: self.hyper.n_epoch,
            n_epoch_saved: self.hyper.n_epoch_saved,
            learning_rate: self.hyper.learn_ratio,
        };

        let decay = self.hyper.weight_decay();
        let (model, summary) = match self.hyper.optimizer {
            OptimizerKind::Adam => {
                let optim = AdamConfig::new().with_weight_decay(decay).init();
                trainer.fit(model, optim, &train, &valid)?
            }
            OptimizerKind::Sgd => {
                let optim = SgdConfig::new().with_weight_decay(decay).init();
                trainer.fit(model, optim, &train, &valid)?
            }
        };

        self.predictor = Some(model);
        self.task = Some(task);
        self.state = ControllerState::Trained;
        Ok(self.summary.insert(summary))
    }

    /// Restores the predictor saved under `tag`. Paths default to the
    /// experiment's own config file and checkpoint directory.
    pub fn load_model(
        &mut self,
        tag: EpochTag,
        config_path: Option<&Path>,
        model_dir: Option<&Path>,
    ) -> error::Result<()> {
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.paths.config_file());
        let model_dir = model_dir.unwrap_or(self.paths.checkpoint_dir());

        let config = load_predictor_config(&config_path)?;
        let predictor = load_predictor::<B>(&config, model_dir, tag, self.executor.primary())?;
        log::info!("loaded predictor {tag} from {}", model_dir.display());

        self.task = config.task;
        self.predictor = Some(predictor);
        self.predictor_config = Some(config);
        self.state = ControllerState::Loaded;
        Ok(())
    }

    /// Scores every sample of `test_data`; no trailing batch is dropped.
    /// The output activation follows `task`, then the task the predictor was
    /// trained or saved with, and only then a guess from the test labels.
    pub fn inference(
        &self,
        test_data: &DatasetDescriptor,
        task: Option<TaskType>,
    ) -> error::Result<Inference> {
        let predictor = self.predictor.as_ref().ok_or(Error::NotBuilt)?;
        let reader = SignalReader::new(test_data)?;
        if let Some(config) = &self.predictor_config {
            if config.in_channel != reader.n_channel() || config.label_size != reader.label_size() {
                return Err(Error::data(format!(
                    "predictor expects {} channels and {} labels, test data has {} and {}",
                    config.in_channel,
                    config.label_size,
                    reader.n_channel(),
                    reader.label_size()
                )));
            }
        }
        let task = task
            .or(self.task)
            .unwrap_or_else(|| TaskType::infer(reader.labels()));

        let loader = SignalLoader::new(reader, self.hyper.n_batchsize, false, false, self.hyper.seed)?;
        let model = predictor.valid();
        let device = model.devices().into_iter().next().ok_or(Error::NotBuilt)?;

        let mut y_hat = Vec::with_capacity(loader.reader().len());
        let mut y = Vec::with_capacity(loader.reader().len());
        for batch in loader.iter::<B::InnerBackend>(0, &device) {
            let batch = batch?;
            y_hat.extend(tensor_rows(task.activate(model.forward(batch.signals)))?);
            y.extend(tensor_rows(batch.targets)?);
        }

        Ok(Inference { task, y_hat, y })
    }

    fn build_model(&mut self, n_channel: usize, label_size: usize, task: TaskType) -> error::Result<()> {
        let criterion = Criterion::new(task, &self.hyper.loss_name, self.hyper.aggregate)?;

        let config = match (&self.predictor, &self.predictor_config) {
            (Some(_), Some(config)) => {
                if config.in_channel != n_channel || config.label_size != label_size {
                    return Err(Error::data(format!(
                        "loaded predictor expects {} channels and {} labels, data has {n_channel} and {label_size}",
                        config.in_channel, config.label_size
                    )));
                }
                config.clone().with_task(Some(task))
            }
            _ => ResNet1dConfig::new(n_channel)
                .with_fc_size(self.hyper.fc_size.clone())
                .with_label_size(label_size)
                .with_task(Some(task)),
        };

        self.paths.create()?;
        save_predictor_config(&config, &self.paths.config_file())?;

        if self.predictor.is_none() {
            B::seed(self.hyper.seed);
            self.predictor = Some(config.init(self.executor.primary()));
            self.state = ControllerState::Built;
        }
        if self.executor.is_parallel() {
            log::info!("running data parallel over {:?}", B::devices(self.hyper.use_gpu, &self.hyper.gpu_ids));
        }

        self.predictor_config = Some(config);
        self.criterion = Some(criterion);
        Ok(())
    }
}
