use serde::{Deserialize, Serialize};

/// Per-model rates. Base rates are per million tokens; typed surcharges
/// price the extended token classes some providers report. A missing field
/// means the base rate covers it (or the model has no such cost), never
/// "unknown".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_per_mtok: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_per_mtok: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_input_per_mtok: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_output_per_mtok: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_input_per_mtok: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_output_per_mtok: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_input_per_mtok: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_output_per_mtok: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_write_per_mtok: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_image: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_request: Option<f64>,
}

impl ModelPricing {
    /// Batch endpoints price against the batch rates where configured; all
    /// other fields inherit.
    pub fn for_endpoint(&self, endpoint: &str) -> ModelPricing {
        let mut pricing = self.clone();
        if endpoint == "/v1/batches" || endpoint.starts_with("/v1/batches/") {
            if pricing.batch_input_per_mtok.is_some() {
                pricing.input_per_mtok = pricing.batch_input_per_mtok;
            }
            if pricing.batch_output_per_mtok.is_some() {
                pricing.output_per_mtok = pricing.batch_output_per_mtok;
            }
        }
        pricing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_endpoint_overrides_base_rates() {
        let pricing = ModelPricing {
            input_per_mtok: Some(3.0),
            output_per_mtok: Some(15.0),
            batch_input_per_mtok: Some(1.5),
            ..ModelPricing::default()
        };
        let batch = pricing.for_endpoint("/v1/batches/abc");
        assert_eq!(batch.input_per_mtok, Some(1.5));
        // No batch output rate configured: the base rate inherits.
        assert_eq!(batch.output_per_mtok, Some(15.0));

        let plain = pricing.for_endpoint("/v1/chat/completions");
        assert_eq!(plain.input_per_mtok, Some(3.0));
    }
}
