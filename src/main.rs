//! Image Classification Service
//!
//! Trains an image classifier from a folder-per-label dataset, evaluates it,
//! and serves predictions over REST through a bounded engine pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use imgclass::api::rest::{create_rest_router, AppState};
use imgclass::config::Config;
use imgclass::dataset::{DatasetScanner, ImageSource};
use imgclass::engine::{CentroidModel, CentroidTrainer, EnginePool, PoolConfig, TrainedModel};
use imgclass::evaluation::{log_fold_summary, log_metrics};
use imgclass::service::{PredictionService, TrainingPipeline};

/// Image classification: training, evaluation and serving
#[derive(Parser, Debug)]
#[command(name = "imgclass")]
#[command(version)]
#[command(about = "Folder-labelled image classification with pooled inference", long_about = None)]
struct Cli {
    /// Configuration file; defaults apply when it does not exist
    #[arg(short, long, default_value = Config::default_path())]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train on a split of the dataset, evaluate and save the model
    Train {
        /// Dataset root with one folder per label
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Where to write the model
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Seed for the train/test shuffle
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Report mean, spread and 95% interval of metrics across k folds
    CrossValidate {
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Number of folds
        #[arg(short, long)]
        folds: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Classify every image in a folder with a saved model
    Predict {
        /// Folder of images to classify
        #[arg(short, long)]
        input_dir: Option<PathBuf>,

        #[arg(short, long)]
        model: Option<PathBuf>,
    },

    /// Serve the REST API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(short, long)]
        model: Option<PathBuf>,
    },
}

fn load_config(path: &Path) -> Result<(Config, bool)> {
    if path.exists() {
        let config = Config::load(&path.to_string_lossy())
            .with_context(|| format!("loading {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((Config::default(), false))
    }
}

fn init_logging(config: &Config, verbose: bool) {
    let level = if verbose {
        Level::DEBUG
    } else {
        config.logging.level.parse().unwrap_or(Level::INFO)
    };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(config.logging.with_target)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (mut config, from_file) = load_config(&cli.config)?;
    init_logging(&config, cli.verbose);

    info!("Image Classification Service v{}", env!("CARGO_PKG_VERSION"));
    if from_file {
        info!("Configuration loaded from {}", cli.config.display());
    } else {
        info!("Using default config ({} not found)", cli.config.display());
    }

    match cli.command {
        Commands::Train { data_dir, output, seed } => {
            if let Some(dir) = data_dir {
                config.dataset.root = dir;
            }
            if let Some(path) = output {
                config.model.path = path;
            }
            config.dataset.seed = seed.or(config.dataset.seed);
            train(config).await
        }
        Commands::CrossValidate { data_dir, folds, seed } => {
            if let Some(dir) = data_dir {
                config.dataset.root = dir;
            }
            config.dataset.seed = seed.or(config.dataset.seed);
            let folds = folds.unwrap_or(config.dataset.cv_folds);
            cross_validate(config, folds).await
        }
        Commands::Predict { input_dir, model } => {
            if let Some(path) = model {
                config.model.path = path;
            }
            let dir = input_dir.unwrap_or_else(|| config.model.predictions_dir.clone());
            #[cfg(feature = "openvino")]
            if is_openvino_model(&config.model.path) {
                return predict(openvino_service(&config)?, &dir).await;
            }
            let pool = EnginePool::new(load_model(&config)?, PoolConfig::from(&config.inference));
            predict(PredictionService::new(pool), &dir).await
        }
        Commands::Serve { port, model } => {
            if let Some(port) = port {
                config.server.rest_port = port;
            }
            if let Some(path) = model {
                config.model.path = path;
            }
            #[cfg(feature = "openvino")]
            if is_openvino_model(&config.model.path) {
                return serve(openvino_service(&config)?, &config).await;
            }
            let pool = EnginePool::new(load_model(&config)?, PoolConfig::from(&config.inference));
            serve(PredictionService::new(pool), &config).await
        }
    }
}

fn load_model(config: &Config) -> Result<Arc<CentroidModel>> {
    let model = CentroidModel::load(&config.model.path)
        .with_context(|| format!("loading model {}", config.model.path.display()))?;
    info!(
        "Model ready: {} labels, input {}x{}x{}",
        model.schema().num_classes(),
        model.schema().input_width,
        model.schema().input_height,
        model.schema().channels
    );
    Ok(Arc::new(model))
}

#[cfg(feature = "openvino")]
fn is_openvino_model(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "xml" || ext == "onnx")
}

#[cfg(feature = "openvino")]
fn openvino_service(config: &Config) -> Result<PredictionService<imgclass::engine::OpenVinoModel>> {
    let model = imgclass::engine::OpenVinoModel::load(&config.model.path, &config.inference.device)?;
    let pool = EnginePool::new(Arc::new(model), PoolConfig::from(&config.inference));
    Ok(PredictionService::new(pool))
}

async fn train(config: Config) -> Result<()> {
    let trainer = CentroidTrainer::new(config.model.temperature);
    let pipeline = TrainingPipeline::new(trainer, config.dataset.clone(), &config.model);

    let report = tokio::task::spawn_blocking(move || pipeline.run()).await??;

    info!(
        "Trained on {} images, evaluated on {} ({} skipped) in {:?}",
        report.train_count, report.test_count, report.skipped, report.elapsed
    );
    log_metrics("Centroid", &report.metrics, &report.model.schema().labels);

    report.model.save(&config.model.path)?;
    Ok(())
}

async fn cross_validate(config: Config, folds: usize) -> Result<()> {
    let trainer = CentroidTrainer::new(config.model.temperature);
    let pipeline = TrainingPipeline::new(trainer, config.dataset.clone(), &config.model);

    let report = tokio::task::spawn_blocking(move || pipeline.cross_validate(folds)).await??;

    if report.skipped > 0 {
        info!("{} images could not be preprocessed and were skipped", report.skipped);
    }
    for (i, metrics) in report.folds.iter().enumerate() {
        info!(
            "Fold {}: MicroAccuracy {:.4}, MacroAccuracy {:.4}, LogLoss {:.4}",
            i + 1,
            metrics.micro_accuracy,
            metrics.macro_accuracy,
            metrics.log_loss
        );
    }
    log_fold_summary("Centroid", &report.summary);
    Ok(())
}

async fn predict<M: TrainedModel>(service: PredictionService<M>, dir: &Path) -> Result<()> {
    let images = DatasetScanner::list_images(dir)?;
    info!("Classifying {} images in {:?}", images.len(), dir);

    let mut images = images.into_iter();
    let Some(first) = images.next() else {
        return Ok(());
    };

    // The first call builds an engine; the second reuses it
    let first = ImageSource::FilePath(first);
    for attempt in ["cold", "warm"] {
        let start = Instant::now();
        let summary = service.classify_source(&first).await?;
        info!(
            "{} ({} engine): {} ({:.4}) in {:?}",
            summary.image_id,
            attempt,
            summary.predicted_label,
            summary.probability,
            start.elapsed()
        );
    }

    for path in images {
        match service.classify_source(&ImageSource::FilePath(path.clone())).await {
            Ok(summary) => {
                info!(
                    "{}: {} ({:.4}) in {} ms",
                    summary.image_id, summary.predicted_label, summary.probability, summary.execution_time_ms
                );
                for score in &summary.scores {
                    info!("    {:<20} {:.4}", score.label, score.score);
                }
            }
            Err(e) => warn!("Failed to classify {:?}: {}", path, e),
        }
    }
    Ok(())
}

async fn serve<M: TrainedModel>(service: PredictionService<M>, config: &Config) -> Result<()> {
    info!("Configuration:");
    info!("  REST port: {}", config.server.rest_port);
    info!("  Max engines: {}", config.inference.max_engines);
    info!("  Upload dir: {:?}", config.server.upload_dir);

    let pool = service.pool().clone();
    let app_state = Arc::new(AppState {
        service,
        upload_dir: config.server.upload_dir.clone(),
        start_time: Instant::now(),
    });
    let rest_router = create_rest_router(app_state, config.server.max_upload_bytes);

    let addr = format!("0.0.0.0:{}", config.server.rest_port);
    let listener = TcpListener::bind(&addr).await?;
    info!("REST API listening on http://{}", addr);
    info!("Classify: POST http://localhost:{}/api/ImageClassification/classifyImage", config.server.rest_port);

    axum::serve(listener, rest_router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received, cleaning up...");
        })
        .await?;

    pool.close();
    info!("Goodbye!");
    Ok(())
}
