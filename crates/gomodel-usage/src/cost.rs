use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use crate::pricing::ModelPricing;

/// Fields that are token-shaped but carry no separate price: they are
/// detail breakdowns of quantities the base rate already covers, so they
/// never produce a caveat.
const INFORMATIONAL_FIELDS: &[&str] = &[
    "prompt_text_tokens",
    "prompt_image_tokens",
    "completion_accepted_prediction_tokens",
    "completion_rejected_prediction_tokens",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostSide {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    CachedInput,
    ReasoningOutput,
    AudioInput,
    AudioOutput,
    CacheWrite,
    PerImage,
}

impl PriceField {
    fn rate(&self, pricing: &ModelPricing) -> Option<f64> {
        match self {
            PriceField::CachedInput => pricing.cached_input_per_mtok,
            PriceField::ReasoningOutput => pricing.reasoning_output_per_mtok,
            PriceField::AudioInput => pricing.audio_input_per_mtok,
            PriceField::AudioOutput => pricing.audio_output_per_mtok,
            PriceField::CacheWrite => pricing.cache_write_per_mtok,
            PriceField::PerImage => pricing.per_image,
        }
    }

    fn per_item(&self) -> bool {
        matches!(self, PriceField::PerImage)
    }
}

/// One raw-data field to priced-unit binding for a provider. A field absent
/// from a provider's table is either informational or covered by the base
/// rate; it must not be read as unknown.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub field: &'static str,
    pub price: PriceField,
    pub side: CostSide,
}

const fn mapping(field: &'static str, price: PriceField, side: CostSide) -> FieldMapping {
    FieldMapping { field, price, side }
}

const OPENAI_MAPPINGS: &[FieldMapping] = &[
    mapping("cached_tokens", PriceField::CachedInput, CostSide::Input),
    mapping("prompt_cached_tokens", PriceField::CachedInput, CostSide::Input),
    mapping("prompt_audio_tokens", PriceField::AudioInput, CostSide::Input),
    mapping("reasoning_tokens", PriceField::ReasoningOutput, CostSide::Output),
    mapping(
        "completion_reasoning_tokens",
        PriceField::ReasoningOutput,
        CostSide::Output,
    ),
    mapping(
        "completion_audio_tokens",
        PriceField::AudioOutput,
        CostSide::Output,
    ),
];

const ANTHROPIC_MAPPINGS: &[FieldMapping] = &[
    mapping(
        "cache_read_input_tokens",
        PriceField::CachedInput,
        CostSide::Input,
    ),
    mapping(
        "cache_creation_input_tokens",
        PriceField::CacheWrite,
        CostSide::Input,
    ),
    mapping("prompt_cached_tokens", PriceField::CachedInput, CostSide::Input),
];

pub fn provider_mappings(provider_type: &str) -> &'static [FieldMapping] {
    match provider_type {
        "openai" => OPENAI_MAPPINGS,
        "anthropic" => ANTHROPIC_MAPPINGS,
        _ => &[],
    }
}

/// The set of extended usage field names the streaming extractor harvests.
/// Derived once from the mapping tables plus the informational allow-list so
/// the cost tables stay the single source of truth.
pub fn extended_usage_fields() -> &'static BTreeSet<&'static str> {
    static FIELDS: OnceLock<BTreeSet<&'static str>> = OnceLock::new();
    FIELDS.get_or_init(|| {
        let mut fields = BTreeSet::new();
        for mappings in [OPENAI_MAPPINGS, ANTHROPIC_MAPPINGS] {
            for mapping in mappings {
                fields.insert(mapping.field);
            }
        }
        for field in INFORMATIONAL_FIELDS {
            fields.insert(field);
        }
        fields
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostBreakdown {
    pub input_cost: Option<f64>,
    pub output_cost: Option<f64>,
    pub total_cost: Option<f64>,
    pub caveat: String,
}

/// Prices one completed call.
///
/// Caveats are emitted for mapped fields with no configured rate and for
/// token-shaped raw fields no table covers; they are sorted and joined with
/// `"; "` so the output is deterministic.
pub fn compute_cost(
    input_tokens: i64,
    output_tokens: i64,
    raw_data: &BTreeMap<String, i64>,
    provider_type: &str,
    pricing: Option<&ModelPricing>,
) -> CostBreakdown {
    let Some(pricing) = pricing else {
        return CostBreakdown::default();
    };

    let mut caveats: Vec<String> = Vec::new();
    let mut input_cost = 0.0;
    let mut has_input = false;
    let mut output_cost = 0.0;
    let mut has_output = false;

    if let Some(rate) = pricing.input_per_mtok {
        input_cost += input_tokens as f64 * rate / 1e6;
        has_input = true;
    }
    if let Some(rate) = pricing.output_per_mtok {
        output_cost += output_tokens as f64 * rate / 1e6;
        has_output = true;
    }

    let mappings = provider_mappings(provider_type);
    let mut mapped: BTreeSet<&str> = BTreeSet::new();
    for entry in mappings {
        mapped.insert(entry.field);
        let Some(value) = raw_data.get(entry.field).copied() else {
            continue;
        };
        if value == 0 {
            continue;
        }
        match entry.price.rate(pricing) {
            Some(rate) => {
                let contribution = if entry.price.per_item() {
                    value as f64 * rate
                } else {
                    value as f64 * rate / 1e6
                };
                match entry.side {
                    CostSide::Input => {
                        input_cost += contribution;
                        has_input = true;
                    }
                    CostSide::Output => {
                        output_cost += contribution;
                        has_output = true;
                    }
                }
            }
            None => caveats.push(format!("no pricing for {}", entry.field)),
        }
    }

    for (key, value) in raw_data {
        if *value == 0 || mapped.contains(key.as_str()) {
            continue;
        }
        if INFORMATIONAL_FIELDS.contains(&key.as_str()) {
            continue;
        }
        if key.ends_with("_tokens") || key.ends_with("_count") {
            caveats.push(format!("unmapped token field: {key}"));
        }
    }

    if let Some(fee) = pricing.per_request {
        output_cost += fee;
        has_output = true;
    }

    caveats.sort();

    let input_cost = has_input.then_some(input_cost);
    let output_cost = has_output.then_some(output_cost);
    let total_cost = match (input_cost, output_cost) {
        (Some(input), Some(output)) => Some(input + output),
        _ => None,
    };

    CostBreakdown {
        input_cost,
        output_cost,
        total_cost,
        caveat: caveats.join("; "),
    }
}
