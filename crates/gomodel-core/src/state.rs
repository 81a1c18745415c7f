use std::sync::Arc;

use gomodel_common::AuditEntry;
use gomodel_guardrails::GuardrailPipeline;
use gomodel_provider::ModelRegistry;
use gomodel_storage::BufferedLogger;
use gomodel_usage::{ModelPricing, UsageEntry};

use crate::config::Config;
use crate::router::ModelRouter;

/// Everything a request handler needs, built once at bootstrap and shared.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub registry: Arc<ModelRegistry>,
    pub router: ModelRouter,
    pub guardrails: Arc<GuardrailPipeline>,
    pub usage_logger: Arc<BufferedLogger<UsageEntry>>,
    pub audit_logger: Arc<BufferedLogger<AuditEntry>>,
    pub body_limit: usize,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn pricing_for(&self, model: &str) -> Option<&ModelPricing> {
        self.config.pricing.get(model)
    }
}
