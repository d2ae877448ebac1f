//! Media RS Worker
//!
//! Runs queued conversion jobs until interrupted.
//!
//! The binary composes the worker from in-memory media and job stores, so on its
//! own it only drains jobs enqueued within the same process. Deployments with
//! persistent backends pass their own `MediaStore` and `JobQueue` to
//! [`build_worker`]; the disks, converters, and scratch directory come from the
//! environment either way.

use std::sync::Arc;

use media_core::config::MediaConfig;
use media_jobs::{
    JobQueue, JobWorker, MemoryJobQueue, PerformConversionsHandler, PERFORM_CONVERSIONS,
};
use media_library::{
    ConverterRegistry, DefaultPathGenerator, ImageConverter, MediaManipulator, MediaResult,
    MediaStore, MemoryMediaStore,
};
use media_storage::DiskManager;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize structured logging
    init_tracing();

    let config = MediaConfig::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        queue = %config.queue.name,
        default_disk = %config.storage.default_disk,
        "Starting media worker"
    );

    let disks = Arc::new(DiskManager::from_config(&config)?);
    tokio::fs::create_dir_all(config.scratch_dir()).await?;

    let store: Arc<dyn MediaStore> = Arc::new(MemoryMediaStore::new());
    let queue: Arc<dyn JobQueue> = Arc::new(MemoryJobQueue::new());
    let worker = build_worker(&config, disks, store, queue)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    shutdown_signal().await;
    // The worker may already have exited
    let _ = shutdown_tx.send(true);
    handle.await?;

    info!("Worker shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,media_worker=debug,media_jobs=debug,media_library=debug".into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

/// Wire the conversion handler onto a worker for the configured queue
fn build_worker(
    config: &MediaConfig,
    disks: Arc<DiskManager>,
    store: Arc<dyn MediaStore>,
    queue: Arc<dyn JobQueue>,
) -> MediaResult<JobWorker> {
    let registry = Arc::new(build_registry(config)?);
    info!(conversions = ?registry.names(), "Converters registered");

    let manipulator = Arc::new(
        MediaManipulator::new(disks, registry, Arc::new(DefaultPathGenerator))
            .with_scratch_dir(config.scratch_dir()),
    );

    let mut worker = JobWorker::from_config(queue, &config.queue);
    worker.register(
        PERFORM_CONVERSIONS,
        PerformConversionsHandler::new(store, manipulator),
    );
    Ok(worker)
}

/// Register one image converter per configured preset
fn build_registry(config: &MediaConfig) -> MediaResult<ConverterRegistry> {
    let mut registry = ConverterRegistry::new();
    for preset in &config.conversions.images {
        registry.register(preset.name.clone(), ImageConverter::from_config(preset))?;
    }
    Ok(registry)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use media_core::config::ImageConversionConfig;
    use media_jobs::{ConversionDispatcher, ConversionTask, JobStatus, QueueDispatcher};
    use media_library::NewMedia;

    use super::*;

    #[test]
    fn test_build_registry_from_presets() {
        let mut config = MediaConfig::default();
        config.conversions.images = vec![
            ImageConversionConfig::parse("thumb:150x150:jpg").unwrap(),
            ImageConversionConfig::parse("preview:800x600").unwrap(),
        ];

        let registry = build_registry(&config).unwrap();
        assert_eq!(registry.names(), vec!["preview", "thumb"]);
    }

    #[test]
    fn test_build_registry_rejects_duplicate_presets() {
        let mut config = MediaConfig::default();
        config.conversions.images = vec![
            ImageConversionConfig::parse("thumb:150x150").unwrap(),
            ImageConversionConfig::parse("thumb:300x300").unwrap(),
        ];

        assert!(build_registry(&config).is_err());
    }

    #[tokio::test]
    async fn test_worker_converts_queued_media() {
        let root = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let config = MediaConfig::from_lookup(|key| match key {
            "MEDIA_LOCAL_ROOT" => Some(root.path().display().to_string()),
            "MEDIA_SCRATCH_DIR" => Some(scratch.path().display().to_string()),
            "MEDIA_IMAGE_CONVERSIONS" => Some("thumb:16x16:jpg".to_string()),
            _ => None,
        })
        .unwrap();

        let store = Arc::new(MemoryMediaStore::new());
        let media = store
            .create(NewMedia {
                name: "photo".to_string(),
                file_name: "photo.png".to_string(),
                mime_type: "image/png".to_string(),
                size: 0,
                disk: config.storage.default_disk.clone(),
            })
            .await
            .unwrap();

        let original = root.path().join(media.id.to_string());
        std::fs::create_dir_all(&original).unwrap();
        image::RgbaImage::from_pixel(64, 32, image::Rgba([0, 128, 255, 255]))
            .save(original.join("photo.png"))
            .unwrap();

        let queue: Arc<dyn JobQueue> = Arc::new(MemoryJobQueue::new());
        let disks = Arc::new(DiskManager::from_config(&config).unwrap());
        let worker = build_worker(&config, disks, store, queue.clone()).unwrap();

        QueueDispatcher::from_config(queue.clone(), &config.queue)
            .dispatch(ConversionTask::new(media.id, ["thumb"]))
            .await
            .unwrap();
        assert!(worker.process_one().await.unwrap());

        let thumb = image::open(original.join("thumb").join("photo.jpg")).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (16, 8));

        let done = queue
            .list(&config.queue.name, Some(JobStatus::Completed))
            .await
            .unwrap();
        assert_eq!(done.len(), 1);
        assert!(std::fs::read_dir(scratch.path()).unwrap().next().is_none());
    }
}
