pub mod controller;
pub mod device;
pub mod error;
pub mod executor;
pub mod helper;
pub mod loader;
pub mod loss;
pub mod model;
pub mod reader;
pub mod train;

pub use controller::{DeepRes1d, DeepRes1dConfig, Inference};
pub use error::{Error, Result};
pub use loss::TaskType;
pub use model::load::EpochTag;
pub use reader::DatasetDescriptor;
