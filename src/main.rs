use std::{env, process};

use burn::config::Config;

use deepres1d::{DatasetDescriptor, DeepRes1d, DeepRes1dConfig, TaskType};

#[cfg(not(feature = "tch"))]
type Backend = burn::backend::Autodiff<burn::backend::NdArray>;
#[cfg(feature = "tch")]
type Backend = burn::backend::Autodiff<burn::backend::LibTorch>;

fn load_descriptor(path: &str) -> DatasetDescriptor {
    match DatasetDescriptor::load(path) {
        Ok(descriptor) => descriptor,
        Err(e) => {
            eprintln!("Failed to load dataset descriptor {}: {}", path, e);
            process::exit(1);
        }
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!(
            "Usage: {} <train.json> <valid.json> [controller config] [task]",
            args[0]
        );
        process::exit(1);
    }

    let train = load_descriptor(&args[1]);
    let valid = load_descriptor(&args[2]);

    let config = match args.get(3) {
        Some(path) => match DeepRes1dConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load controller config: {}", e);
                process::exit(1);
            }
        },
        None => DeepRes1dConfig::new(),
    };

    let task = match args.get(4).map(|task| task.parse::<TaskType>()).transpose() {
        Ok(task) => task,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    let mut deep: DeepRes1d<Backend> = match DeepRes1d::new(config) {
        Ok(deep) => deep,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    let summary = match deep.fit(&train, &valid, task) {
        Ok(summary) => summary.clone(),
        Err(e) => {
            eprintln!("Training failed: {}", e);
            process::exit(1);
        }
    };

    if let Some(best) = summary.best() {
        println!(
            "Best epoch {}: train loss {:.5}, valid loss {:.5}",
            best.epoch, best.train_loss, best.valid_loss
        );
    }
    println!("Checkpoints saved to {}", deep.paths().checkpoint_dir().display());
}
