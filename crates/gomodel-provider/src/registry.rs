use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use gomodel_protocol::{ModelCategory, ModelInfo};

use crate::adapter::{DiscoveredModel, ProviderAdapter, RequestContext};

/// One catalog entry plus its owner.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub info: ModelInfo,
    pub category: ModelCategory,
    pub provider: String,
}

/// An immutable registry snapshot. Reads observe one epoch fully or not at
/// all; a refresh builds a new epoch and publishes it with a pointer swap.
pub struct RegistryEpoch {
    pub epoch: u64,
    owners: HashMap<String, Arc<dyn ProviderAdapter>>,
    entries: HashMap<String, RegistryEntry>,
    categories: HashMap<ModelCategory, Vec<String>>,
}

impl RegistryEpoch {
    fn empty() -> Self {
        Self {
            epoch: 0,
            owners: HashMap::new(),
            entries: HashMap::new(),
            categories: HashMap::new(),
        }
    }

    pub fn resolve(&self, model: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.owners.get(model).cloned()
    }

    pub fn entry(&self, model: &str) -> Option<&RegistryEntry> {
        self.entries.get(model)
    }

    pub fn models(&self) -> Vec<ModelInfo> {
        let mut models: Vec<ModelInfo> =
            self.entries.values().map(|entry| entry.info.clone()).collect();
        models.sort_by(|a, b| a.id.cmp(&b.id));
        models
    }

    pub fn models_in_category(&self, category: ModelCategory) -> &[String] {
        self.categories
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Process-wide index from model id to owning provider.
pub struct ModelRegistry {
    providers: Vec<Arc<dyn ProviderAdapter>>,
    current: ArcSwap<RegistryEpoch>,
    refresh_gate: tokio::sync::Mutex<()>,
    epoch_counter: AtomicU64,
}

impl ModelRegistry {
    pub fn new(providers: Vec<Arc<dyn ProviderAdapter>>) -> Arc<Self> {
        Arc::new(Self {
            providers,
            current: ArcSwap::from_pointee(RegistryEpoch::empty()),
            refresh_gate: tokio::sync::Mutex::new(()),
            epoch_counter: AtomicU64::new(0),
        })
    }

    /// Builds and publishes the first epoch. Individual provider failures
    /// are non-fatal; they contribute zero models.
    pub async fn init(self: &Arc<Self>) {
        self.refresh().await;
    }

    pub fn snapshot(&self) -> Arc<RegistryEpoch> {
        self.current.load_full()
    }

    /// O(1) model → provider lookup against the current epoch.
    pub fn resolve(&self, model: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.current.load().resolve(model)
    }

    pub fn supports(&self, model: &str) -> bool {
        self.current.load().owners.contains_key(model)
    }

    pub fn provider_type(&self, model: &str) -> Option<&'static str> {
        self.current.load().resolve(model).map(|p| p.provider_type())
    }

    /// Repeats the catalog pipeline into a new epoch and swaps it in.
    ///
    /// At most one refresh runs at a time; a second caller simply piggybacks
    /// on the current epoch. If every provider fails while the registry
    /// already holds models, the current epoch is retained.
    pub async fn refresh(self: &Arc<Self>) {
        let Ok(_gate) = self.refresh_gate.try_lock() else {
            return;
        };

        let ctx = RequestContext::new(
            uuid::Uuid::new_v4().to_string(),
            "/internal/registry-refresh",
        );
        let calls = self.providers.iter().map(|provider| {
            let provider = provider.clone();
            let ctx = ctx.clone();
            async move {
                let result = provider.list_models(&ctx).await;
                (provider, result)
            }
        });
        let results = join_all(calls).await;

        let mut owners: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
        let mut entries: HashMap<String, RegistryEntry> = HashMap::new();
        let mut categories: HashMap<ModelCategory, Vec<String>> = HashMap::new();
        let mut any_succeeded = false;

        for (provider, result) in results {
            let models: Vec<DiscoveredModel> = match result {
                Ok(models) => {
                    any_succeeded = true;
                    models
                }
                Err(err) => {
                    warn!(provider = provider.name(), error = %err, "model list failed");
                    continue;
                }
            };
            for model in models {
                if let Some(existing) = entries.get(&model.id) {
                    // First-registered wins.
                    warn!(
                        model = %model.id,
                        first = %existing.provider,
                        duplicate = provider.name(),
                        "duplicate model id; keeping first registration"
                    );
                    continue;
                }
                owners.insert(model.id.clone(), provider.clone());
                categories
                    .entry(model.category)
                    .or_default()
                    .push(model.id.clone());
                entries.insert(
                    model.id.clone(),
                    RegistryEntry {
                        info: ModelInfo::new(model.id.clone(), model.owned_by, model.created),
                        category: model.category,
                        provider: provider.name().to_string(),
                    },
                );
            }
        }

        if !any_succeeded && !self.current.load().is_empty() {
            warn!("registry refresh failed completely; retaining current epoch");
            return;
        }

        for ids in categories.values_mut() {
            ids.sort();
        }

        let epoch = self.epoch_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let next = RegistryEpoch {
            epoch,
            owners,
            entries,
            categories,
        };
        info!(epoch, models = next.len(), "registry epoch published");
        self.current.store(Arc::new(next));
    }

    /// Background refresh loop; wakes every `interval` until `shutdown`
    /// flips. The handle finishes after observing the shutdown signal.
    pub fn spawn_refresh(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; init already built epoch 1.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => registry.refresh().await,
                    _ = shutdown.changed() => break,
                }
            }
        })
    }
}
