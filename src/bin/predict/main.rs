use std::{env, path::PathBuf, process};

use deepres1d::{DatasetDescriptor, DeepRes1d, DeepRes1dConfig, EpochTag, TaskType};

#[cfg(not(feature = "tch"))]
type Backend = burn::backend::Autodiff<burn::backend::NdArray>;
#[cfg(feature = "tch")]
type Backend = burn::backend::Autodiff<burn::backend::LibTorch>;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!(
            "Usage: {} <test.json> <experiment id> [best|latest|<epoch>] [root dir] [task]",
            args[0]
        );
        process::exit(1);
    }

    let test = match DatasetDescriptor::load(&args[1]) {
        Ok(descriptor) => descriptor,
        Err(e) => {
            eprintln!("Failed to load dataset descriptor: {}", e);
            process::exit(1);
        }
    };

    let tag = match args.get(3).map(String::as_str).unwrap_or("best").parse::<EpochTag>() {
        Ok(tag) => tag,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    let task = match args.get(5).map(|task| task.parse::<TaskType>()).transpose() {
        Ok(task) => task,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    let mut config = DeepRes1dConfig::new().with_expmodel_id(args[2].clone());
    if let Some(root) = args.get(4) {
        config = config.with_root_dir(PathBuf::from(root));
    }

    let mut deep: DeepRes1d<Backend> = match DeepRes1d::new(config) {
        Ok(deep) => deep,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    println!("Loading model...");
    if let Err(e) = deep.load_model(tag, None, None) {
        eprintln!("Failed to load predictor: {}", e);
        process::exit(1);
    }

    let result = match deep.inference(&test, task) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Inference failed: {}", e);
            process::exit(1);
        }
    };

    let classes = result.predicted_classes();
    for (i, (y_hat, y)) in result.y_hat.iter().zip(&result.y).enumerate() {
        println!("{}\t{:?}\t{:?}\t{}", i, y, y_hat, classes[i]);
    }
}
