//! TuneStream - 流式音乐生成服务
//!
//! 组装生成器、存储、会话登记与 HTTP 服务

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use tunestream::application::{
    BlobStoragePort, MusicGeneratorPort, PersistenceSink, PipelineSettings, StreamPipeline,
};
use tunestream::application::pipeline::ForwarderConfig;
use tunestream::config::{load_config, print_config, AppConfig, GeneratorBackend, StorageBackend};
use tunestream::infrastructure::adapters::{
    GcsBlobStorage, GcsBlobStorageConfig, HttpMusicGenClient, HttpMusicGenClientConfig,
    LocalBlobStorage, SyntheticGeneratorConfig, SyntheticMusicGenerator,
};
use tunestream::infrastructure::events::EventPublisher;
use tunestream::infrastructure::http::{AppState, HttpServer, StreamOptions};
use tunestream::infrastructure::memory::InMemorySessionRegistry;

fn init_tracing(config: &AppConfig) {
    let log_filter = format!(
        "{},tunestream={},tower_http=debug",
        config.log.level, config.log.level
    );
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    if config.log.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_generator(config: &AppConfig) -> anyhow::Result<Arc<dyn MusicGeneratorPort>> {
    let generator = &config.generator;
    Ok(match generator.backend {
        GeneratorBackend::Synthetic => Arc::new(SyntheticMusicGenerator::new(
            SyntheticGeneratorConfig {
                sample_rate: generator.sample_rate,
                frame_rate: generator.frame_rate,
                segment_delay: Duration::from_millis(generator.synthetic_delay_ms),
            },
        )),
        GeneratorBackend::Http => {
            let mut client_config = HttpMusicGenClientConfig::new(&generator.url)
                .with_timeout(generator.timeout_secs)
                .with_rates(generator.sample_rate, generator.frame_rate);
            client_config.model_name = generator.model_name.clone();
            Arc::new(HttpMusicGenClient::new(client_config)?)
        }
    })
}

async fn build_storage(config: &AppConfig) -> anyhow::Result<Arc<dyn BlobStoragePort>> {
    let storage = &config.storage;
    Ok(match storage.backend {
        StorageBackend::Local => Arc::new(
            LocalBlobStorage::new(&storage.local_dir, storage.public_base_url.clone()).await?,
        ),
        StorageBackend::Gcs => {
            let mut gcs_config =
                GcsBlobStorageConfig::new(&storage.bucket, &storage.access_token)
                    .with_endpoint(&storage.gcs_endpoint);
            if let Some(url) = &storage.public_base_url {
                gcs_config.public_base_url = url.clone();
            }
            Arc::new(GcsBlobStorage::new(gcs_config)?)
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config);

    tracing::info!("TuneStream - streaming music generation service");
    print_config(&config);

    tokio::fs::create_dir_all(&config.storage.staging_dir).await?;

    let generator = build_generator(&config)?;
    let storage = build_storage(&config).await?;

    let event_publisher = Arc::new(EventPublisher::new());
    let registry = Arc::new(InMemorySessionRegistry::new(
        event_publisher.clone(),
        Duration::from_secs(config.pipeline.status_retention_secs),
    ));

    let persistence = Arc::new(PersistenceSink::new(
        storage,
        &config.storage.staging_dir,
        config.pipeline.header_policy,
    ));
    let settings = PipelineSettings {
        queue_capacity: config.pipeline.queue_capacity,
        forwarder: ForwarderConfig {
            live_send_timeout: Duration::from_secs(config.pipeline.live_send_timeout_secs),
            request_timeout: config.pipeline.request_timeout(),
        },
        abort_policy: config.pipeline.abort_policy,
    };
    let pipeline = Arc::new(StreamPipeline::new(
        generator.clone(),
        persistence,
        registry.clone(),
        settings,
    ));

    // 关闭信号会取消所有进行中的生成
    let shutdown = CancellationToken::new();
    let options = StreamOptions {
        segment_duration_secs: config.generator.segment_duration_secs,
        live_buffer_chunks: config.pipeline.live_buffer_chunks,
        default_seed: config.generator.default_seed,
    };
    let tasks = TaskTracker::new();
    let state = AppState::new(
        generator,
        pipeline,
        registry,
        event_publisher,
        options,
        shutdown.clone(),
        tasks.clone(),
    );

    let server = HttpServer::new(config.server.clone(), state);

    tracing::info!("Starting HTTP server...");

    let signal_token = shutdown.clone();
    server
        .run_with_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
            }
            tracing::info!("Received shutdown signal");
            signal_token.cancel();
        })
        .await?;

    // 连接已关闭，等待后台管线完成持久化
    tasks.close();
    let grace = Duration::from_secs(config.pipeline.shutdown_grace_secs);
    if !tasks.is_empty() {
        tracing::info!(pending = tasks.len(), "Waiting for in-flight generations");
    }
    if tokio::time::timeout(grace, tasks.wait()).await.is_err() {
        tracing::warn!(
            pending = tasks.len(),
            grace_secs = grace.as_secs(),
            "In-flight generations did not finish before shutdown"
        );
    }

    tracing::info!("Server shutdown complete");

    Ok(())
}
