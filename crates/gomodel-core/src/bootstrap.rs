use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use gomodel_common::{AuditEntry, parse_body_size_limit};
use gomodel_guardrails::{
    Guardrail, GuardrailPipeline, SystemPromptGuardrail, SystemPromptMode,
};
use gomodel_provider::{AnthropicProvider, ModelRegistry, OpenAiProvider, ProviderAdapter};
use gomodel_resilience::{ResilienceEngine, SharedHttpClient};
use gomodel_storage::{
    BufferedLogger, DEFAULT_CLEANUP_INTERVAL, LogStore, LoggerConfig, SqlStore, spawn_retention,
};
use gomodel_usage::UsageEntry;

use crate::config::Config;
use crate::router::ModelRouter;
use crate::state::{GatewayState, SharedState};

/// A fully wired gateway plus the handles needed to stop it cleanly.
pub struct Gateway {
    pub state: SharedState,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Gateway {
    /// Stops the refresh/retention loops, then drains and closes both
    /// loggers. Idempotence is inherited from the loggers.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        self.state.usage_logger.close().await;
        self.state.audit_logger.close().await;
    }
}

pub async fn bootstrap(config: Config) -> anyhow::Result<Gateway> {
    config.validate()?;
    let body_limit = parse_body_size_limit(&config.server.body_size_limit)
        .map_err(|err| anyhow::anyhow!(err.message))?;

    // One dialer per process; providers share its connection pool.
    let http = SharedHttpClient::new(&config.resilience.http_client())
        .context("building shared HTTP client")?;
    let resilience = Arc::new(ResilienceEngine::new());

    let mut providers: Vec<Arc<dyn ProviderAdapter>> = Vec::new();
    for settings in &config.providers {
        resilience.register(
            &settings.name,
            config.resilience.merged_with(settings.resilience.as_ref()),
        );
        let adapter: Arc<dyn ProviderAdapter> = match settings.provider_type.as_str() {
            "openai" => Arc::new(OpenAiProvider::new(
                settings.name.clone(),
                settings.api_key.clone(),
                settings.base_url.clone(),
                http.clone(),
                resilience.clone(),
            )),
            "anthropic" => Arc::new(AnthropicProvider::new(
                settings.name.clone(),
                settings.api_key.clone(),
                settings.base_url.clone(),
                http.clone(),
                resilience.clone(),
            )),
            other => anyhow::bail!("unknown provider type: {other}"),
        };
        providers.push(adapter);
    }

    let registry = ModelRegistry::new(providers);
    registry.init().await;
    info!(models = registry.snapshot().len(), "model registry initialized");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = vec![registry.spawn_refresh(
        Duration::from_secs(config.registry.refresh_interval_secs.max(1)),
        shutdown_rx.clone(),
    )];

    let db = gomodel_storage::connect(&config.logging.database_url)
        .await
        .with_context(|| format!("opening storage backend {}", config.logging.database_url))?;
    let store = Arc::new(SqlStore::new(db));
    let logger_config = LoggerConfig {
        buffer_size: config.logging.buffer_size,
        batch_flush_threshold: config.logging.batch_flush_threshold,
        flush_interval: Duration::from_secs(config.logging.flush_interval_secs.max(1)),
    };
    let usage_store: Arc<dyn LogStore<UsageEntry>> = store.clone();
    let audit_store: Arc<dyn LogStore<AuditEntry>> = store.clone();
    let usage_logger = Arc::new(BufferedLogger::spawn(
        "usage",
        usage_store.clone(),
        logger_config.clone(),
    ));
    let audit_logger = Arc::new(BufferedLogger::spawn(
        "audit",
        audit_store.clone(),
        logger_config,
    ));

    if config.logging.retention_days > 0 {
        tasks.push(spawn_retention(
            "usage",
            usage_store,
            config.logging.retention_days,
            DEFAULT_CLEANUP_INTERVAL,
            shutdown_rx.clone(),
        ));
        tasks.push(spawn_retention(
            "audit",
            audit_store,
            config.logging.retention_days,
            DEFAULT_CLEANUP_INTERVAL,
            shutdown_rx.clone(),
        ));
    }

    let guardrails = Arc::new(GuardrailPipeline::new(build_guardrails(&config)?));
    let router = ModelRouter::new(registry.clone());

    let state = Arc::new(GatewayState {
        config: Arc::new(config),
        registry,
        router,
        guardrails,
        usage_logger,
        audit_logger,
        body_limit,
    });

    Ok(Gateway {
        state,
        shutdown: shutdown_tx,
        tasks,
    })
}

fn build_guardrails(config: &Config) -> anyhow::Result<Vec<Arc<dyn Guardrail>>> {
    let mut guardrails: Vec<Arc<dyn Guardrail>> = Vec::new();
    for settings in &config.guardrails {
        match settings.kind.as_str() {
            "system_prompt" => {
                let mode = match settings.mode.as_str() {
                    "inject" => SystemPromptMode::Inject,
                    "override" => SystemPromptMode::Override,
                    "decorator" => SystemPromptMode::Decorator,
                    other => anyhow::bail!(
                        "unknown system_prompt mode {other:?} for guardrail {}",
                        settings.name
                    ),
                };
                guardrails.push(Arc::new(SystemPromptGuardrail::new(
                    settings.name.clone(),
                    settings.order,
                    mode,
                    settings.content.clone(),
                )));
            }
            other => anyhow::bail!("unknown guardrail type {other:?} for {}", settings.name),
        }
    }
    Ok(guardrails)
}
