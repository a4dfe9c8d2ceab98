//! Property-based tests for feature calculators using proptest.

use proptest::prelude::*;
use serde_json::{Value, json};

use geoenrich_core::Feature;
use geoenrich_core::calc::{Aggregation, FeatureCalc};

const KEY: &str = "straight_line_distance_miles";

fn records(distances: &[f64]) -> Value {
    json!({
        "bars": distances
            .iter()
            .map(|d| json!({ KEY: d }))
            .collect::<Vec<_>>()
    })
}

fn calc(aggregation: Aggregation) -> FeatureCalc {
    FeatureCalc::new(["bars", KEY], aggregation).unwrap()
}

// --- Aggregation properties ---

proptest! {
    #[test]
    fn count_matches_record_count(distances in prop::collection::vec(0.0f64..50.0, 1..40)) {
        let result = calc(Aggregation::Count).evaluate(&records(&distances)).unwrap();
        prop_assert_eq!(result, Some(json!(distances.len())));
    }

    #[test]
    fn min_and_max_bound_every_value(distances in prop::collection::vec(0.0f64..50.0, 1..40)) {
        let response = records(&distances);
        let min = calc(Aggregation::Min).evaluate(&response).unwrap().unwrap();
        let max = calc(Aggregation::Max).evaluate(&response).unwrap().unwrap();
        let (min, max) = (min.as_f64().unwrap(), max.as_f64().unwrap());

        prop_assert!(min <= max);
        for d in &distances {
            prop_assert!(min <= *d && *d <= max);
        }
        prop_assert!(distances.contains(&min));
        prop_assert!(distances.contains(&max));
    }

    #[test]
    fn missing_keys_are_skipped(
        distances in prop::collection::vec(0.0f64..50.0, 1..20),
        gaps in 0usize..10,
    ) {
        let mut response = records(&distances);
        if let Some(items) = response["bars"].as_array_mut() {
            for _ in 0..gaps {
                items.push(json!({"name": "no distance"}));
            }
        }
        let count = calc(Aggregation::Count).evaluate(&response).unwrap();
        prop_assert_eq!(count, Some(json!(distances.len())));
    }

    #[test]
    fn evaluation_is_pure(distances in prop::collection::vec(0.0f64..50.0, 0..20)) {
        let response = records(&distances);
        let before = response.clone();
        let first = calc(Aggregation::Min).evaluate(&response).unwrap();
        let second = calc(Aggregation::Min).evaluate(&response).unwrap();
        prop_assert_eq!(first, second);
        prop_assert_eq!(response, before);
    }

    #[test]
    fn value_returns_leaf_unchanged(value in any::<i64>()) {
        let response = json!({"population_density_per_km": {"value": value}});
        let result = FeatureCalc::new(["population_density_per_km", "value"], Aggregation::Value)
            .unwrap()
            .evaluate(&response)
            .unwrap();
        prop_assert_eq!(result, Some(json!(value)));
    }
}

// --- Feature naming properties ---

proptest! {
    #[test]
    fn poi_name_is_derived_from_label(label in "[a-z_]{1,20}") {
        let feature = Feature::points_of_interest(Aggregation::Max)
            .label(label.clone())
            .within_miles(1.0)
            .build()
            .unwrap();
        prop_assert_eq!(feature.name(), format!("poi_{label}_max"));
    }

    #[test]
    fn integral_limits_render_without_fraction(minutes in 1u32..240) {
        let feature = Feature::amenities_score()
            .within_minutes_walking(f64::from(minutes))
            .build()
            .unwrap();
        prop_assert_eq!(feature.name(), format!("amenities_minutes_walking_{minutes}"));
    }

    #[test]
    fn non_positive_limits_are_rejected(limit in -100.0f64..=0.0) {
        prop_assert!(Feature::amenities_score().within_miles(limit).build().is_err());
    }
}
