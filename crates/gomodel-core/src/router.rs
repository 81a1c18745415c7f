use std::sync::Arc;

use gomodel_common::GatewayError;
use gomodel_protocol::ModelList;
use gomodel_provider::{ModelRegistry, ProviderAdapter};

/// Thin dispatcher: resolve the model against the current registry epoch
/// and hand the (untouched) request to the owning provider. Resilience
/// lives inside the provider; guardrails already ran.
#[derive(Clone)]
pub struct ModelRouter {
    registry: Arc<ModelRegistry>,
}

impl ModelRouter {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn route(&self, model: &str) -> Result<Arc<dyn ProviderAdapter>, GatewayError> {
        self.registry
            .resolve(model)
            .ok_or_else(|| GatewayError::model_not_found(model))
    }

    pub fn models(&self) -> ModelList {
        ModelList::new(self.registry.snapshot().models())
    }
}
