use std::collections::BTreeMap;

use gomodel_usage::{ModelPricing, UsageEntry, compute_cost};
use gomodel_usage::extract::ExtractedUsage;

fn raw(pairs: &[(&str, i64)]) -> BTreeMap<String, i64> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), *value))
        .collect()
}

fn close(actual: Option<f64>, expected: f64) -> bool {
    actual.map(|v| (v - expected).abs() < 1e-9).unwrap_or(false)
}

#[test]
fn base_cost_no_extensions() {
    let pricing = ModelPricing {
        input_per_mtok: Some(3.0),
        output_per_mtok: Some(15.0),
        ..ModelPricing::default()
    };
    let cost = compute_cost(1_000_000, 500_000, &raw(&[]), "openai", Some(&pricing));
    assert!(close(cost.input_cost, 3.0));
    assert!(close(cost.output_cost, 7.5));
    assert!(close(cost.total_cost, 10.5));
    assert_eq!(cost.caveat, "");
}

#[test]
fn openai_cached_and_reasoning() {
    let pricing = ModelPricing {
        input_per_mtok: Some(2.50),
        output_per_mtok: Some(10.0),
        cached_input_per_mtok: Some(1.25),
        reasoning_output_per_mtok: Some(15.0),
        ..ModelPricing::default()
    };
    let cost = compute_cost(
        500_000,
        300_000,
        &raw(&[("cached_tokens", 200_000), ("reasoning_tokens", 100_000)]),
        "openai",
        Some(&pricing),
    );
    assert!(close(cost.input_cost, 1.50));
    assert!(close(cost.output_cost, 4.5));
    assert!(close(cost.total_cost, 6.0));
    assert_eq!(cost.caveat, "");
}

#[test]
fn unmapped_token_field_produces_caveat() {
    let pricing = ModelPricing {
        input_per_mtok: Some(2.50),
        output_per_mtok: Some(10.0),
        cached_input_per_mtok: Some(1.25),
        reasoning_output_per_mtok: Some(15.0),
        ..ModelPricing::default()
    };
    let cost = compute_cost(
        1000,
        1000,
        &raw(&[("some_new_tokens", 100)]),
        "openai",
        Some(&pricing),
    );
    assert_eq!(cost.caveat, "unmapped token field: some_new_tokens");
}

#[test]
fn anthropic_cache_read_and_write() {
    let pricing = ModelPricing {
        input_per_mtok: Some(3.0),
        output_per_mtok: Some(15.0),
        cached_input_per_mtok: Some(0.30),
        cache_write_per_mtok: Some(3.75),
        ..ModelPricing::default()
    };
    let cost = compute_cost(
        200_000,
        100_000,
        &raw(&[
            ("cache_read_input_tokens", 100_000),
            ("cache_creation_input_tokens", 50_000),
        ]),
        "anthropic",
        Some(&pricing),
    );
    assert!(close(cost.input_cost, 0.8175));
    assert!(close(cost.output_cost, 1.5));
    assert_eq!(cost.caveat, "");
}

#[test]
fn mapped_field_without_rate_caveats() {
    let pricing = ModelPricing {
        input_per_mtok: Some(3.0),
        output_per_mtok: Some(15.0),
        ..ModelPricing::default()
    };
    let cost = compute_cost(
        1000,
        1000,
        &raw(&[("cache_read_input_tokens", 500)]),
        "anthropic",
        Some(&pricing),
    );
    assert_eq!(cost.caveat, "no pricing for cache_read_input_tokens");
}

#[test]
fn informational_fields_never_caveat() {
    let pricing = ModelPricing {
        input_per_mtok: Some(1.0),
        output_per_mtok: Some(1.0),
        ..ModelPricing::default()
    };
    let cost = compute_cost(
        10,
        10,
        &raw(&[
            ("prompt_text_tokens", 8),
            ("prompt_image_tokens", 2),
            ("completion_accepted_prediction_tokens", 3),
            ("completion_rejected_prediction_tokens", 1),
        ]),
        "openai",
        Some(&pricing),
    );
    assert_eq!(cost.caveat, "");
}

#[test]
fn zero_values_never_caveat() {
    let pricing = ModelPricing {
        input_per_mtok: Some(1.0),
        output_per_mtok: Some(1.0),
        ..ModelPricing::default()
    };
    let cost = compute_cost(
        10,
        10,
        &raw(&[("mystery_tokens", 0)]),
        "openai",
        Some(&pricing),
    );
    assert_eq!(cost.caveat, "");
}

#[test]
fn caveats_are_sorted_and_joined() {
    let pricing = ModelPricing {
        input_per_mtok: Some(1.0),
        output_per_mtok: Some(1.0),
        ..ModelPricing::default()
    };
    let cost = compute_cost(
        10,
        10,
        &raw(&[("zz_tokens", 1), ("aa_tokens", 1)]),
        "openai",
        Some(&pricing),
    );
    assert_eq!(
        cost.caveat,
        "unmapped token field: aa_tokens; unmapped token field: zz_tokens"
    );
}

#[test]
fn nil_pricing_returns_nil_costs() {
    let cost = compute_cost(1_000_000, 1_000_000, &raw(&[("x_tokens", 5)]), "openai", None);
    assert_eq!(cost.input_cost, None);
    assert_eq!(cost.output_cost, None);
    assert_eq!(cost.total_cost, None);
    assert_eq!(cost.caveat, "");
}

#[test]
fn per_request_fee_lands_on_output() {
    let pricing = ModelPricing {
        input_per_mtok: Some(1.0),
        output_per_mtok: Some(1.0),
        per_request: Some(0.01),
        ..ModelPricing::default()
    };
    let cost = compute_cost(0, 0, &raw(&[]), "openai", Some(&pricing));
    assert!(close(cost.output_cost, 0.01));
    assert!(close(cost.total_cost, 0.01));
}

#[test]
fn total_cost_invariant_holds() {
    let pricing = ModelPricing {
        input_per_mtok: Some(2.7),
        output_per_mtok: Some(13.1),
        cached_input_per_mtok: Some(0.9),
        ..ModelPricing::default()
    };
    let cost = compute_cost(
        123_456,
        654_321,
        &raw(&[("cached_tokens", 11_111)]),
        "openai",
        Some(&pricing),
    );
    let (input, output, total) = (
        cost.input_cost.unwrap(),
        cost.output_cost.unwrap(),
        cost.total_cost.unwrap(),
    );
    assert!((total - (input + output)).abs() < 1e-9);
}

#[test]
fn batch_endpoint_entries_use_batch_rates() {
    let pricing = ModelPricing {
        input_per_mtok: Some(3.0),
        output_per_mtok: Some(15.0),
        batch_input_per_mtok: Some(1.5),
        batch_output_per_mtok: Some(7.5),
        ..ModelPricing::default()
    };
    let extracted = ExtractedUsage {
        input_tokens: 1_000_000,
        output_tokens: 1_000_000,
        total_tokens: 2_000_000,
        ..ExtractedUsage::default()
    };
    let entry = UsageEntry::from_extracted(
        "req-1",
        "openai-main",
        "openai",
        "/v1/batches/batch_abc",
        "gpt-4o",
        extracted,
        Some(&pricing),
    );
    assert!(close(entry.input_cost, 1.5));
    assert!(close(entry.output_cost, 7.5));
    assert_eq!(entry.total_tokens, entry.input_tokens + entry.output_tokens);
}
