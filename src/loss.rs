use std::{fmt, str::FromStr};

use burn::{
    nn::loss::{MseLoss, Reduction},
    tensor::{
        activation::{log_softmax, sigmoid, softmax},
        backend::Backend,
        Tensor,
    },
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::helper::softplus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Binary,
    Multiclass,
    Multilabel,
    Regression,
}

impl TaskType {
    /// Guesses the task from normalized label rows: 0/1 entries make a
    /// classification task, anything else a regression.
    pub fn infer(labels: &[Vec<f32>]) -> Self {
        let binary_entries = labels.iter().flatten().all(|&v| v == 0.0 || v == 1.0);
        if !binary_entries {
            return TaskType::Regression;
        }

        let label_size = labels.first().map_or(0, Vec::len);
        if label_size == 1 {
            TaskType::Binary
        } else if labels.iter().all(|row| row.iter().sum::<f32>() == 1.0) {
            TaskType::Multiclass
        } else {
            TaskType::Multilabel
        }
    }

    /// Maps logits to the task's output space.
    pub fn activate<B: Backend>(&self, logits: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            TaskType::Binary | TaskType::Multilabel => sigmoid(logits),
            TaskType::Multiclass => softmax(logits, 1),
            TaskType::Regression => logits,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskType::Binary => "binary",
            TaskType::Multiclass => "multiclass",
            TaskType::Multilabel => "multilabel",
            TaskType::Regression => "regression",
        };
        f.write_str(name)
    }
}

impl FromStr for TaskType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "binary" => Ok(TaskType::Binary),
            "multiclass" => Ok(TaskType::Multiclass),
            "multilabel" => Ok(TaskType::Multilabel),
            "regression" => Ok(TaskType::Regression),
            _ => Err(Error::config(
                "assign_task_type",
                "str, ['binary','multiclass','multilabel','regression']",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Sum,
    Avg,
}

impl FromStr for Aggregate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sum" => Ok(Aggregate::Sum),
            "avg" => Ok(Aggregate::Avg),
            _ => Err(Error::config("aggregate", "str, ['sum','avg']")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Distance {
    L1,
    L2,
    CrossEntropy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Normalization {
    Softmax,
    Sigmoid,
    Identity,
}

/// Loss over logits, resolved from a name such as `L1LossSoftmax` or
/// `CELossSigmoid`.
#[derive(Debug, Clone)]
pub struct Criterion {
    distance: Distance,
    normalization: Normalization,
    aggregate: Aggregate,
}

impl Criterion {
    pub fn new(task: TaskType, loss_name: &str, aggregate: Aggregate) -> Result<Self> {
        let unsupported = || Error::Loss {
            name: loss_name.to_string(),
            task,
        };

        let (distance, suffix) = ["L1Loss", "L2Loss", "CELoss"]
            .iter()
            .zip([Distance::L1, Distance::L2, Distance::CrossEntropy])
            .find_map(|(prefix, distance)| {
                loss_name.strip_prefix(prefix).map(|rest| (distance, rest))
            })
            .ok_or_else(unsupported)?;

        let normalization = match suffix {
            "Softmax" => Normalization::Softmax,
            "Sigmoid" => Normalization::Sigmoid,
            "" => Normalization::Identity,
            _ => return Err(unsupported()),
        };

        let compatible = match (task, distance, normalization) {
            (_, Distance::CrossEntropy, Normalization::Identity) => false,
            (TaskType::Regression, _, norm) => norm == Normalization::Identity,
            (TaskType::Binary | TaskType::Multilabel, _, norm) => norm != Normalization::Softmax,
            (TaskType::Multiclass, _, _) => true,
        };
        if !compatible {
            return Err(unsupported());
        }

        Ok(Self {
            distance,
            normalization,
            aggregate,
        })
    }

    /// `logits` and `targets` are both `[batch, label_size]`.
    pub fn forward<B: Backend>(&self, logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
        let elementwise = match self.distance {
            Distance::L1 => (self.normalize(logits) - targets).abs(),
            Distance::L2 => {
                return MseLoss::new().forward(self.normalize(logits), targets, self.reduction());
            }
            Distance::CrossEntropy => match self.normalization {
                Normalization::Softmax => -(targets * log_softmax(logits, 1)),
                // max(x, 0) - x * y + log(1 + exp(-|x|))
                _ => softplus(logits.clone()) - logits * targets,
            },
        };

        match self.aggregate {
            Aggregate::Sum => elementwise.sum(),
            Aggregate::Avg => elementwise.mean(),
        }
    }

    fn reduction(&self) -> Reduction {
        match self.aggregate {
            Aggregate::Sum => Reduction::Sum,
            Aggregate::Avg => Reduction::Mean,
        }
    }

    fn normalize<B: Backend>(&self, logits: Tensor<B, 2>) -> Tensor<B, 2> {
        match self.normalization {
            Normalization::Softmax => softmax(logits, 1),
            Normalization::Sigmoid => sigmoid(logits),
            Normalization::Identity => logits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{ElementConversion, TensorData};

    type TestBackend = NdArray<f32>;

    fn tensor(values: Vec<f32>, shape: [usize; 2]) -> Tensor<TestBackend, 2> {
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar().elem::<f32>()
    }

    #[test]
    fn infers_task_from_labels() {
        assert_eq!(TaskType::infer(&[vec![1.0], vec![0.0]]), TaskType::Binary);
        assert_eq!(
            TaskType::infer(&[vec![0.0, 1.0, 0.0], vec![1.0, 0.0, 0.0]]),
            TaskType::Multiclass
        );
        assert_eq!(
            TaskType::infer(&[vec![1.0, 1.0, 0.0], vec![0.0, 0.0, 0.0]]),
            TaskType::Multilabel
        );
        assert_eq!(TaskType::infer(&[vec![0.5], vec![2.0]]), TaskType::Regression);
    }

    #[test]
    fn task_names_round_trip() {
        for task in [
            TaskType::Binary,
            TaskType::Multiclass,
            TaskType::Multilabel,
            TaskType::Regression,
        ] {
            assert_eq!(task.to_string().parse::<TaskType>().unwrap(), task);
        }
        assert!("ranking".parse::<TaskType>().is_err());
    }

    #[test]
    fn aggregate_accepts_sum_and_avg_only() {
        assert_eq!("sum".parse::<Aggregate>().unwrap(), Aggregate::Sum);
        assert_eq!("avg".parse::<Aggregate>().unwrap(), Aggregate::Avg);
        assert!(matches!(
            "max".parse::<Aggregate>(),
            Err(Error::Config { field: "aggregate", .. })
        ));
    }

    #[test]
    fn resolves_loss_names_per_task() {
        let ok = |task, name| Criterion::new(task, name, Aggregate::Sum).is_ok();

        assert!(ok(TaskType::Multiclass, "L1LossSoftmax"));
        assert!(ok(TaskType::Multiclass, "CELossSoftmax"));
        assert!(ok(TaskType::Multilabel, "CELossSigmoid"));
        assert!(ok(TaskType::Binary, "L2LossSigmoid"));
        assert!(ok(TaskType::Regression, "L2Loss"));

        assert!(!ok(TaskType::Multilabel, "L1LossSoftmax"));
        assert!(!ok(TaskType::Regression, "L1LossSigmoid"));
        assert!(!ok(TaskType::Multiclass, "CELoss"));
        assert!(!ok(TaskType::Multiclass, "HingeLoss"));
        assert!(!ok(TaskType::Multiclass, "L1LossTanh"));
    }

    #[test]
    fn l1_softmax_sums_absolute_error() {
        let criterion = Criterion::new(TaskType::Multiclass, "L1LossSoftmax", Aggregate::Sum).unwrap();
        // equal logits give a uniform distribution
        let logits = tensor(vec![0.0, 0.0], [1, 2]);
        let targets = tensor(vec![1.0, 0.0], [1, 2]);

        let loss = scalar(criterion.forward(logits, targets));
        assert!((loss - 1.0).abs() < 1e-6);
    }

    #[test]
    fn l2_avg_averages_squared_error() {
        let criterion = Criterion::new(TaskType::Regression, "L2Loss", Aggregate::Avg).unwrap();
        let logits = tensor(vec![1.0, 3.0], [2, 1]);
        let targets = tensor(vec![0.0, 1.0], [2, 1]);

        let loss = scalar(criterion.forward(logits, targets));
        assert!((loss - 2.5).abs() < 1e-6);
    }

    #[test]
    fn l2_sum_over_normalized_outputs() {
        let criterion = Criterion::new(TaskType::Binary, "L2LossSigmoid", Aggregate::Sum).unwrap();
        // sigmoid(0) = 0.5 against targets 1 and 0
        let logits = tensor(vec![0.0, 0.0], [2, 1]);
        let targets = tensor(vec![1.0, 0.0], [2, 1]);

        let loss = scalar(criterion.forward(logits, targets));
        assert!((loss - 0.5).abs() < 1e-6);
    }

    #[test]
    fn softmax_cross_entropy() {
        let criterion = Criterion::new(TaskType::Multiclass, "CELossSoftmax", Aggregate::Sum).unwrap();
        let logits = tensor(vec![0.0, 0.0, 0.0, 0.0], [1, 4]);
        let targets = tensor(vec![0.0, 0.0, 1.0, 0.0], [1, 4]);

        let loss = scalar(criterion.forward(logits, targets));
        assert!((loss - 4.0f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn sigmoid_cross_entropy_is_stable() {
        let criterion = Criterion::new(TaskType::Binary, "CELossSigmoid", Aggregate::Avg).unwrap();
        let logits = tensor(vec![0.0, 100.0, -100.0], [3, 1]);
        let targets = tensor(vec![1.0, 1.0, 0.0], [3, 1]);

        let loss = scalar(criterion.forward(logits, targets));
        let expected = 2.0f32.ln() / 3.0;
        assert!(loss.is_finite());
        assert!((loss - expected).abs() < 1e-5);
    }
}
