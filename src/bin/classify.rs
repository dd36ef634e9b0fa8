//! Command-line image classification driver.
//!
//! Collects image files from the input path, builds the classifier once,
//! and prints the top-k predictions per image. Failures on individual
//! images are logged and skipped; construction failures abort the run.

use clap::Parser;
use googlenet::core::{init_tracing, ClassifierResult};
use googlenet::models::{PretrainedConfig, PretrainedSource};
use googlenet::predictor::ImageClassifier;
use googlenet::utils::{collect_image_files, load_class_names};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "classify", about = "GoogLeNet image classification")]
struct Args {
    /// Image file or directory of images to classify.
    #[arg(short = 'i', long = "image-file")]
    image_file: PathBuf,

    /// Local checkpoint file to load weights from.
    #[arg(short = 'd', long = "model-dir")]
    model_dir: Option<PathBuf>,

    /// Download the default pretrained checkpoint.
    #[arg(long, conflicts_with = "model_dir")]
    pretrained: bool,

    /// Use the self-distilled checkpoint variant when downloading.
    #[arg(long, requires = "pretrained")]
    distilled: bool,

    /// Compute device.
    #[arg(long, value_parser = parse_device, default_value = "cpu")]
    device: candle_core::Device,

    /// Number of predictions to report per image.
    #[arg(long, default_value_t = 5)]
    topk: usize,

    /// Number of output classes.
    #[arg(long, default_value_t = 1000)]
    class_num: usize,

    /// Label file with one class name per line.
    #[arg(long)]
    labels: Option<PathBuf>,
}

fn parse_device(s: &str) -> Result<candle_core::Device, String> {
    match s {
        "cpu" => Ok(candle_core::Device::Cpu),
        "cuda" => candle_core::Device::new_cuda(0).map_err(|e| e.to_string()),
        other => Err(format!("unknown device '{other}', expected cpu or cuda")),
    }
}

fn build_classifier(args: &Args) -> ClassifierResult<ImageClassifier> {
    let source = match (&args.model_dir, args.pretrained) {
        (Some(path), _) => PretrainedSource::Path(path.clone()),
        (None, true) => PretrainedSource::Download {
            distilled: args.distilled,
        },
        (None, false) => PretrainedSource::Absent,
    };

    let mut builder = ImageClassifier::builder()
        .class_num(args.class_num)
        .topk(args.topk)
        .device(args.device.clone())
        .pretrained(source)
        .pretrained_config(PretrainedConfig::default());

    if let Some(labels) = &args.labels {
        builder = builder.class_names(load_class_names(labels)?);
    }

    builder.build()
}

fn run(args: &Args) -> ClassifierResult<()> {
    let files = collect_image_files(&args.image_file)?;
    info!(count = files.len(), "collected input images");

    let classifier = build_classifier(args)?;

    for file in &files {
        let predictions = match classifier.classify_path(file) {
            Ok(predictions) => predictions,
            Err(err) => {
                error!(path = %file.display(), error = %err, "skipping image");
                continue;
            }
        };

        println!("Current image file: {}", file.display());
        for p in &predictions {
            match &p.label {
                Some(label) => {
                    println!("\tclass id: {}, probability: {:.4}, label: {label}", p.class_id, p.score)
                }
                None => println!("\tclass id: {}, probability: {:.4}", p.class_id, p.score),
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "classification failed");
            ExitCode::FAILURE
        }
    }
}
