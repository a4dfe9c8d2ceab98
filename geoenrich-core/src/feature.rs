//! Feature definitions: a named scalar derived from one endpoint at one point.
//!
//! A [`Feature`] is plain data (name, endpoint, query template, calculator)
//! and is reused across many coordinates. The specialised kinds (lookup,
//! points of interest, amenities score) only differ in how they are built:
//! their constructors validate the inputs and derive the name, query and
//! result path, so an invalid feature can never exist.

use crate::calc::{Aggregation, FeatureCalc};
use crate::client::{EnrichmentClient, Endpoint, Query, error_message};
use crate::error::{FeatureError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

/// Result key carrying the distance of each point of interest.
pub const POI_DISTANCE_KEY: &str = "straight_line_distance_miles";

/// A location feature computed from the enrichment service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFeature")]
pub struct Feature {
    name: String,
    endpoint: Endpoint,
    params: Query,
    calc: FeatureCalc,
}

#[derive(Deserialize)]
struct RawFeature {
    name: String,
    endpoint: Endpoint,
    #[serde(default)]
    params: Query,
    calc: FeatureCalc,
}

impl TryFrom<RawFeature> for Feature {
    type Error = FeatureError;

    fn try_from(raw: RawFeature) -> std::result::Result<Self, Self::Error> {
        Self::new(raw.name, raw.endpoint, raw.params, raw.calc)
    }
}

impl Feature {
    /// Build a feature from its parts.
    ///
    /// `params` must not contain the coordinate; `latitude` and `longitude`
    /// are filled in per call.
    pub fn new(
        name: impl Into<String>,
        endpoint: Endpoint,
        params: Query,
        calc: FeatureCalc,
    ) -> std::result::Result<Self, FeatureError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(FeatureError::validation(name, "feature name must not be empty"));
        }
        if let Some(key) = ["latitude", "longitude"]
            .into_iter()
            .find(|k| params.contains_key(*k))
        {
            return Err(FeatureError::validation(
                name,
                format!("'{key}' is supplied per point and must not be a fixed parameter"),
            ));
        }
        Ok(Self {
            name,
            endpoint,
            params,
            calc,
        })
    }

    /// Feature over a single `lookup` label, read from `[label, "value"]`.
    pub fn lookup(
        label: &str,
        aggregation: Aggregation,
    ) -> std::result::Result<Self, FeatureError> {
        let label = single_valued("lookup", "label", label)?;
        let mut params = Query::new();
        params.insert("labels".into(), Value::from(label));
        Self::new(
            format!("lookup_{label}_{aggregation}"),
            Endpoint::Lookup,
            params,
            FeatureCalc::new([label, "value"], aggregation)?,
        )
    }

    /// Feature over a summary statistic of a `lookup` label within a radius,
    /// read from `[label, "summary", statistic]` (e.g. `average`, `p50`).
    pub fn lookup_summary(
        label: &str,
        summary_radius_km: f64,
        statistic: &str,
    ) -> std::result::Result<Self, FeatureError> {
        let label = single_valued("lookup", "label", label)?;
        let statistic = single_valued("lookup", "statistic", statistic)?;
        let radius = positive_magnitude("lookup", "summary_radius_km", summary_radius_km)?;
        let mut params = Query::new();
        params.insert("labels".into(), Value::from(label));
        params.insert("summary_radius_km".into(), number_value(radius));
        Self::new(
            format!("lookup_{label}_{statistic}_{}km", format_magnitude(radius)),
            Endpoint::Lookup,
            params,
            FeatureCalc::new([label, "summary", statistic], Aggregation::Value)?,
        )
    }

    /// Start building a points-of-interest feature.
    pub fn points_of_interest(aggregation: Aggregation) -> PoiFeatureBuilder {
        PoiFeatureBuilder::new(aggregation)
    }

    /// Start building an amenities-score feature.
    pub fn amenities_score() -> AmenitiesFeatureBuilder {
        AmenitiesFeatureBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Query template, without the coordinate.
    pub fn params(&self) -> &Query {
        &self.params
    }

    pub fn calc(&self) -> &FeatureCalc {
        &self.calc
    }

    /// The per-call query: a copy of the template plus the coordinate.
    pub fn query_for(&self, longitude: f64, latitude: f64) -> Query {
        let mut query = self.params.clone();
        query.insert("latitude".into(), number_value(latitude));
        query.insert("longitude".into(), number_value(longitude));
        query
    }

    /// Calculate the feature value at a point.
    ///
    /// Returns `Ok(None)` when the service rejects the coordinate (an in-band
    /// `message` response) or when the response holds no data for this
    /// feature. Transport, traversal and configuration failures are errors.
    pub async fn calculate(
        &self,
        client: &dyn EnrichmentClient,
        longitude: f64,
        latitude: f64,
    ) -> Result<Option<Value>> {
        let query = self.query_for(longitude, latitude);
        let response = client.invoke(self.endpoint, &query, None).await?;

        if let Some(message) = error_message(&response) {
            warn!(
                feature = %self.name,
                longitude,
                latitude,
                reason = message,
                "Enrichment service rejected location"
            );
            return Ok(None);
        }

        let value = self.calc.evaluate(&response)?;
        debug!(feature = %self.name, longitude, latitude, found = value.is_some(), "Calculated feature");
        Ok(value)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} -> {} of {})",
            self.name,
            self.endpoint,
            self.calc.aggregation(),
            self.calc.path().join(".")
        )
    }
}

/// How far around a point the service searches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelLimit {
    MinutesDriving(f64),
    MinutesBiking(f64),
    MinutesWalking(f64),
    Miles(f64),
}

impl TravelLimit {
    /// Resolve exactly one limit from the four optional qualifiers.
    pub fn from_options(
        feature: &str,
        within_minutes_driving: Option<f64>,
        within_minutes_biking: Option<f64>,
        within_minutes_walking: Option<f64>,
        within_miles: Option<f64>,
    ) -> std::result::Result<Self, FeatureError> {
        let supplied: Vec<TravelLimit> = [
            within_minutes_driving.map(TravelLimit::MinutesDriving),
            within_minutes_biking.map(TravelLimit::MinutesBiking),
            within_minutes_walking.map(TravelLimit::MinutesWalking),
            within_miles.map(TravelLimit::Miles),
        ]
        .into_iter()
        .flatten()
        .collect();

        match supplied.as_slice() {
            [limit] => {
                positive_magnitude(feature, limit.param_name(), limit.magnitude())?;
                Ok(*limit)
            }
            _ => Err(FeatureError::validation(
                feature,
                "must specify exactly one of within_minutes_driving, within_minutes_biking, \
                 within_minutes_walking or within_miles",
            )),
        }
    }

    /// The unit part of the qualifier, e.g. `minutes_walking`.
    pub fn qualifier(&self) -> &'static str {
        match self {
            TravelLimit::MinutesDriving(_) => "minutes_driving",
            TravelLimit::MinutesBiking(_) => "minutes_biking",
            TravelLimit::MinutesWalking(_) => "minutes_walking",
            TravelLimit::Miles(_) => "miles",
        }
    }

    /// Query parameter name, e.g. `within_minutes_walking`.
    pub fn param_name(&self) -> &'static str {
        match self {
            TravelLimit::MinutesDriving(_) => "within_minutes_driving",
            TravelLimit::MinutesBiking(_) => "within_minutes_biking",
            TravelLimit::MinutesWalking(_) => "within_minutes_walking",
            TravelLimit::Miles(_) => "within_miles",
        }
    }

    pub fn magnitude(&self) -> f64 {
        match *self {
            TravelLimit::MinutesDriving(v)
            | TravelLimit::MinutesBiking(v)
            | TravelLimit::MinutesWalking(v)
            | TravelLimit::Miles(v) => v,
        }
    }

    fn insert_into(&self, params: &mut Query) {
        params.insert(self.param_name().into(), number_value(self.magnitude()));
    }
}

/// Builder for points-of-interest features.
///
/// Exactly one of `label`/`brand` and exactly one travel limit must be set.
/// The feature is named `poi_<label or brand>_<aggregation>` and reads
/// `[<label or brand>, "straight_line_distance_miles"]`.
#[derive(Debug, Clone, Default)]
pub struct PoiFeatureBuilder {
    aggregation: Aggregation,
    label: Option<String>,
    brand: Option<String>,
    within_minutes_driving: Option<f64>,
    within_minutes_biking: Option<f64>,
    within_minutes_walking: Option<f64>,
    within_miles: Option<f64>,
}

impl PoiFeatureBuilder {
    pub fn new(aggregation: Aggregation) -> Self {
        Self {
            aggregation,
            ..Default::default()
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn within_minutes_driving(mut self, minutes: f64) -> Self {
        self.within_minutes_driving = Some(minutes);
        self
    }

    pub fn within_minutes_biking(mut self, minutes: f64) -> Self {
        self.within_minutes_biking = Some(minutes);
        self
    }

    pub fn within_minutes_walking(mut self, minutes: f64) -> Self {
        self.within_minutes_walking = Some(minutes);
        self
    }

    pub fn within_miles(mut self, miles: f64) -> Self {
        self.within_miles = Some(miles);
        self
    }

    /// Validate the inputs and build the feature.
    pub fn build(self) -> std::result::Result<Feature, FeatureError> {
        const KIND: &str = "points_of_interest";

        let (param, target) = match (self.label.as_deref(), self.brand.as_deref()) {
            (Some(label), None) => ("labels", single_valued(KIND, "label", label)?),
            (None, Some(brand)) => ("brands", single_valued(KIND, "brand", brand)?),
            _ => {
                return Err(FeatureError::validation(
                    KIND,
                    "must specify either brand or label, not both",
                ));
            }
        };
        let limit = TravelLimit::from_options(
            KIND,
            self.within_minutes_driving,
            self.within_minutes_biking,
            self.within_minutes_walking,
            self.within_miles,
        )?;

        let mut params = Query::new();
        params.insert(param.into(), Value::from(target));
        limit.insert_into(&mut params);

        Feature::new(
            format!("poi_{target}_{}", self.aggregation),
            Endpoint::PointsOfInterest,
            params,
            FeatureCalc::new([target, POI_DISTANCE_KEY], self.aggregation)?,
        )
    }
}

/// Builder for amenities-score features.
///
/// Exactly one travel limit must be set. The feature is named
/// `amenities_<qualifier>_<magnitude>` and reads `["score"]`.
#[derive(Debug, Clone, Default)]
pub struct AmenitiesFeatureBuilder {
    within_minutes_driving: Option<f64>,
    within_minutes_biking: Option<f64>,
    within_minutes_walking: Option<f64>,
    within_miles: Option<f64>,
}

impl AmenitiesFeatureBuilder {
    pub fn within_minutes_driving(mut self, minutes: f64) -> Self {
        self.within_minutes_driving = Some(minutes);
        self
    }

    pub fn within_minutes_biking(mut self, minutes: f64) -> Self {
        self.within_minutes_biking = Some(minutes);
        self
    }

    pub fn within_minutes_walking(mut self, minutes: f64) -> Self {
        self.within_minutes_walking = Some(minutes);
        self
    }

    pub fn within_miles(mut self, miles: f64) -> Self {
        self.within_miles = Some(miles);
        self
    }

    pub fn build(self) -> std::result::Result<Feature, FeatureError> {
        let limit = TravelLimit::from_options(
            "amenities_score",
            self.within_minutes_driving,
            self.within_minutes_biking,
            self.within_minutes_walking,
            self.within_miles,
        )?;

        let mut params = Query::new();
        limit.insert_into(&mut params);

        Feature::new(
            format!(
                "amenities_{}_{}",
                limit.qualifier(),
                format_magnitude(limit.magnitude())
            ),
            Endpoint::AmenitiesScore,
            params,
            FeatureCalc::new(["score"], Aggregation::Value)?,
        )
    }
}

/// Declarative feature definition, as loaded from a TOML or JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureDefinition {
    /// Any endpoint, any result path.
    Custom {
        name: String,
        endpoint: Endpoint,
        #[serde(default)]
        params: Query,
        result_keys: Vec<String>,
        #[serde(default = "default_calc_method")]
        calc_method: String,
    },
    Lookup {
        label: String,
        /// Defaults to `value`; a summary feature only accepts `value`.
        #[serde(default)]
        calc_method: Option<String>,
        /// With a radius, the feature reads `summary.<statistic>` instead of `value`.
        #[serde(default)]
        summary_radius_km: Option<f64>,
        #[serde(default)]
        statistic: Option<String>,
    },
    PointsOfInterest {
        calc_method: String,
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        brand: Option<String>,
        #[serde(default)]
        within_minutes_driving: Option<f64>,
        #[serde(default)]
        within_minutes_biking: Option<f64>,
        #[serde(default)]
        within_minutes_walking: Option<f64>,
        #[serde(default)]
        within_miles: Option<f64>,
    },
    AmenitiesScore {
        #[serde(default)]
        within_minutes_driving: Option<f64>,
        #[serde(default)]
        within_minutes_biking: Option<f64>,
        #[serde(default)]
        within_minutes_walking: Option<f64>,
        #[serde(default)]
        within_miles: Option<f64>,
    },
}

fn default_calc_method() -> String {
    Aggregation::Value.to_string()
}

impl TryFrom<FeatureDefinition> for Feature {
    type Error = FeatureError;

    fn try_from(def: FeatureDefinition) -> std::result::Result<Self, Self::Error> {
        match def {
            FeatureDefinition::Custom {
                name,
                endpoint,
                params,
                result_keys,
                calc_method,
            } => {
                let calc = FeatureCalc::parse(result_keys, &calc_method)?;
                Feature::new(name, endpoint, params, calc)
            }
            FeatureDefinition::Lookup {
                label,
                calc_method,
                summary_radius_km,
                statistic,
            } => {
                let aggregation = match calc_method.as_deref() {
                    Some(method) => method.parse()?,
                    None => Aggregation::Value,
                };
                match (summary_radius_km, statistic) {
                    (None, None) => Feature::lookup(&label, aggregation),
                    (Some(_), Some(_)) if aggregation != Aggregation::Value => {
                        Err(FeatureError::validation(
                            "lookup",
                            format!(
                                "calc_method '{aggregation}' cannot be combined with a summary statistic"
                            ),
                        ))
                    }
                    (Some(radius), Some(statistic)) => {
                        Feature::lookup_summary(&label, radius, &statistic)
                    }
                    _ => Err(FeatureError::validation(
                        "lookup",
                        "summary_radius_km and statistic must be given together",
                    )),
                }
            }
            FeatureDefinition::PointsOfInterest {
                calc_method,
                label,
                brand,
                within_minutes_driving,
                within_minutes_biking,
                within_minutes_walking,
                within_miles,
            } => PoiFeatureBuilder {
                aggregation: calc_method.parse()?,
                label,
                brand,
                within_minutes_driving,
                within_minutes_biking,
                within_minutes_walking,
                within_miles,
            }
            .build(),
            FeatureDefinition::AmenitiesScore {
                within_minutes_driving,
                within_minutes_biking,
                within_minutes_walking,
                within_miles,
            } => AmenitiesFeatureBuilder {
                within_minutes_driving,
                within_minutes_biking,
                within_minutes_walking,
                within_miles,
            }
            .build(),
        }
    }
}

/// Reject empty and comma-separated (multi-valued) inputs.
fn single_valued<'a>(
    feature: &str,
    field: &str,
    value: &'a str,
) -> std::result::Result<&'a str, FeatureError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(FeatureError::validation(
            feature,
            format!("{field} must not be empty"),
        ));
    }
    if value.contains(',') {
        return Err(FeatureError::validation(
            feature,
            format!("supports only a single {field}, got '{value}'"),
        ));
    }
    Ok(value)
}

fn positive_magnitude(
    feature: &str,
    field: &str,
    value: f64,
) -> std::result::Result<f64, FeatureError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(FeatureError::validation(
            feature,
            format!("{field} must be a positive number, got {value}"),
        ))
    }
}

/// JSON number for a magnitude; integral values stay integers so they render
/// as `5`, not `5.0`, in query strings.
pub(crate) fn number_value(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Value::from(v as i64)
    } else {
        Value::from(v)
    }
}

fn format_magnitude(v: f64) -> String {
    number_value(v).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockEnrichmentClient;
    use serde_json::json;

    const LAT: f64 = 44.976469;
    const LON: f64 = -93.271205;

    fn lookup_response() -> Value {
        json!({"population_density_per_km": {"value": 1601}})
    }

    fn poi_response() -> Value {
        json!({"bars": [
            {"name": "The Living Room", "straight_line_distance_miles": 0.13},
            {"name": "The Saloon", "straight_line_distance_miles": 0.28},
            {"name": "The News Room", "straight_line_distance_miles": 0.24},
            {"name": "Union Rooftop", "straight_line_distance_miles": 0.21}
        ]})
    }

    #[tokio::test]
    async fn test_generic_feature_lookup_value() {
        let client = MockEnrichmentClient::new().with_fallback(lookup_response());
        let mut params = Query::new();
        params.insert("labels".into(), json!("population_density_per_km"));
        let feature = Feature::new(
            "poi_popdensity_value",
            Endpoint::Lookup,
            params,
            FeatureCalc::new(["population_density_per_km", "value"], Aggregation::Value)
                .unwrap(),
        )
        .unwrap();

        let result = feature.calculate(&client, LON, LAT).await.unwrap();
        assert_eq!(result, Some(json!(1601)));

        let calls = client.calls();
        assert_eq!(calls[0].endpoint, Endpoint::Lookup);
        assert_eq!(calls[0].query["latitude"], json!(LAT));
        assert_eq!(calls[0].query["longitude"], json!(LON));
        assert_eq!(calls[0].query["labels"], json!("population_density_per_km"));
    }

    #[tokio::test]
    async fn test_rejected_location_is_none() {
        let client = MockEnrichmentClient::new().with_fallback(json!({
            "message": "Invalid location. Ensure your location is close to a road."
        }));
        let feature = Feature::lookup("population_density_per_km", Aggregation::Value).unwrap();
        let result = feature.calculate(&client, -LON, LAT).await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_calculate_does_not_touch_template() {
        let client = MockEnrichmentClient::new().with_fallback(lookup_response());
        let feature = Feature::lookup("population_density_per_km", Aggregation::Value).unwrap();
        let before = feature.params().clone();
        feature.calculate(&client, LON, LAT).await.unwrap();
        feature.calculate(&client, LON + 1.0, LAT + 1.0).await.unwrap();
        assert_eq!(feature.params(), &before);
        assert!(!feature.params().contains_key("latitude"));
        assert_eq!(client.calls()[1].query["latitude"], json!(LAT + 1.0));
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let client = MockEnrichmentClient::new().failing("connection reset");
        let feature = Feature::amenities_score()
            .within_minutes_biking(10.0)
            .build()
            .unwrap();
        let err = feature.calculate(&client, LON, LAT).await.unwrap_err();
        assert!(matches!(err, crate::error::EnrichError::Client(_)));
    }

    #[tokio::test]
    async fn test_traversal_error_propagates() {
        let client = MockEnrichmentClient::new().with_fallback(json!({"unexpected": {}}));
        let feature = Feature::lookup("population_density_per_km", Aggregation::Value).unwrap();
        let err = feature.calculate(&client, LON, LAT).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::EnrichError::Feature(FeatureError::KeyPath { .. })
        ));
    }

    #[test]
    fn test_lookup_variant() {
        let feature = Feature::lookup("population_density_per_km", Aggregation::Value).unwrap();
        assert_eq!(feature.name(), "lookup_population_density_per_km_value");
        assert_eq!(feature.endpoint(), Endpoint::Lookup);
        assert_eq!(feature.params()["labels"], json!("population_density_per_km"));
        assert_eq!(
            feature.calc().path(),
            ["population_density_per_km", "value"]
        );
    }

    #[test]
    fn test_lookup_rejects_multiple_labels() {
        let err = Feature::lookup("population_density_per_km,median_age", Aggregation::Value)
            .unwrap_err();
        assert!(matches!(err, FeatureError::Validation { .. }));
    }

    #[test]
    fn test_lookup_summary_variant() {
        let feature = Feature::lookup_summary("population_density_per_km", 5.0, "average").unwrap();
        assert_eq!(feature.name(), "lookup_population_density_per_km_average_5km");
        assert_eq!(feature.params()["summary_radius_km"], json!(5));
        assert_eq!(
            feature.calc().path(),
            ["population_density_per_km", "summary", "average"]
        );
    }

    #[tokio::test]
    async fn test_poi_variant_min_and_count() {
        let client = MockEnrichmentClient::new().with_fallback(poi_response());
        let min = Feature::points_of_interest(Aggregation::Min)
            .label("bars")
            .within_minutes_walking(5.0)
            .build()
            .unwrap();
        assert_eq!(min.name(), "poi_bars_min");
        assert_eq!(
            min.calculate(&client, LON, LAT).await.unwrap(),
            Some(json!(0.13))
        );

        let count = Feature::points_of_interest(Aggregation::Count)
            .label("bars")
            .within_minutes_walking(5.0)
            .build()
            .unwrap();
        assert_eq!(count.name(), "poi_bars_count");
        assert_eq!(
            count.calculate(&client, LON, LAT).await.unwrap(),
            Some(json!(4))
        );

        let query = &client.calls()[0].query;
        assert_eq!(query["labels"], json!("bars"));
        assert_eq!(query["within_minutes_walking"], json!(5));
        assert_eq!(client.calls()[0].endpoint, Endpoint::PointsOfInterest);
    }

    #[test]
    fn test_poi_brand_variant() {
        let feature = Feature::points_of_interest(Aggregation::Max)
            .brand("Starbucks")
            .within_miles(1.5)
            .build()
            .unwrap();
        assert_eq!(feature.name(), "poi_Starbucks_max");
        assert_eq!(feature.params()["brands"], json!("Starbucks"));
        assert_eq!(feature.params()["within_miles"], json!(1.5));
        assert!(!feature.params().contains_key("labels"));
        assert_eq!(feature.calc().path(), ["Starbucks", POI_DISTANCE_KEY]);
    }

    #[test]
    fn test_poi_rejects_label_and_brand() {
        let err = Feature::points_of_interest(Aggregation::Min)
            .label("bars")
            .brand("some brand")
            .within_minutes_walking(5.0)
            .build()
            .unwrap_err();
        assert!(matches!(err, FeatureError::Validation { .. }));
    }

    #[test]
    fn test_poi_rejects_neither_label_nor_brand() {
        let err = Feature::points_of_interest(Aggregation::Min)
            .within_minutes_walking(5.0)
            .build()
            .unwrap_err();
        assert!(matches!(err, FeatureError::Validation { .. }));
    }

    #[test]
    fn test_poi_rejects_two_limits() {
        let err = Feature::points_of_interest(Aggregation::Min)
            .label("bars")
            .within_minutes_walking(5.0)
            .within_minutes_driving(30.0)
            .build()
            .unwrap_err();
        assert!(matches!(err, FeatureError::Validation { .. }));
    }

    #[test]
    fn test_poi_rejects_no_limit() {
        assert!(
            Feature::points_of_interest(Aggregation::Count)
                .label("bars")
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_poi_rejects_multi_valued_brand() {
        assert!(
            Feature::points_of_interest(Aggregation::Count)
                .brand("Target,Walmart")
                .within_miles(2.0)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_limit_must_be_positive() {
        assert!(Feature::amenities_score().within_miles(0.0).build().is_err());
        assert!(
            Feature::amenities_score()
                .within_miles(f64::NAN)
                .build()
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_amenities_variant() {
        let client = MockEnrichmentClient::new().with_fallback(json!({"score": 0.5}));
        let feature = Feature::amenities_score()
            .within_minutes_biking(10.0)
            .build()
            .unwrap();
        assert_eq!(feature.name(), "amenities_minutes_biking_10");
        assert_eq!(feature.endpoint(), Endpoint::AmenitiesScore);
        assert_eq!(feature.params()["within_minutes_biking"], json!(10));
        assert_eq!(
            feature.calculate(&client, LON, LAT).await.unwrap(),
            Some(json!(0.5))
        );
    }

    #[test]
    fn test_amenities_fractional_name() {
        let feature = Feature::amenities_score().within_miles(2.5).build().unwrap();
        assert_eq!(feature.name(), "amenities_miles_2.5");
    }

    #[test]
    fn test_names_are_stable() {
        let a = Feature::points_of_interest(Aggregation::Min)
            .label("bars")
            .within_minutes_walking(5.0)
            .build()
            .unwrap();
        let b = Feature::points_of_interest(Aggregation::Min)
            .label("bars")
            .within_minutes_walking(5.0)
            .build()
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_coordinate_params_rejected() {
        let mut params = Query::new();
        params.insert("latitude".into(), json!(1.0));
        let err = Feature::new(
            "bad",
            Endpoint::Lookup,
            params,
            FeatureCalc::new(["x"], Aggregation::Value).unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, FeatureError::Validation { .. }));
    }

    #[test]
    fn test_definition_custom_from_toml() {
        let def: FeatureDefinition = toml::from_str(
            r#"
kind = "custom"
name = "pop_density"
endpoint = "lookup"
result_keys = ["population_density_per_km", "value"]

[params]
labels = "population_density_per_km"
"#,
        )
        .unwrap();
        let feature = Feature::try_from(def).unwrap();
        assert_eq!(feature.name(), "pop_density");
        assert_eq!(feature.calc().aggregation(), Aggregation::Value);
    }

    #[test]
    fn test_definition_unknown_calc_method() {
        let def = FeatureDefinition::Custom {
            name: "x".into(),
            endpoint: Endpoint::PointsOfInterest,
            params: Query::new(),
            result_keys: vec!["bars".into(), POI_DISTANCE_KEY.into()],
            calc_method: "median".into(),
        };
        assert!(matches!(
            Feature::try_from(def).unwrap_err(),
            FeatureError::UnsupportedAggregation { .. }
        ));
    }

    #[test]
    fn test_definition_variants_match_constructors() {
        let def: FeatureDefinition = serde_json::from_value(json!({
            "kind": "points_of_interest",
            "calc_method": "count",
            "brand": "Target",
            "within_minutes_driving": 15
        }))
        .unwrap();
        let from_def = Feature::try_from(def).unwrap();
        let built = Feature::points_of_interest(Aggregation::Count)
            .brand("Target")
            .within_minutes_driving(15.0)
            .build()
            .unwrap();
        assert_eq!(from_def, built);

        let def: FeatureDefinition =
            serde_json::from_value(json!({"kind": "amenities_score", "within_miles": 3}))
                .unwrap();
        assert_eq!(Feature::try_from(def).unwrap().name(), "amenities_miles_3");
    }

    #[test]
    fn test_definition_lookup_summary_requires_both() {
        let def: FeatureDefinition = serde_json::from_value(json!({
            "kind": "lookup",
            "label": "population_density_per_km",
            "summary_radius_km": 5
        }))
        .unwrap();
        assert!(Feature::try_from(def).is_err());
    }

    #[test]
    fn test_definition_lookup_summary_rejects_aggregation() {
        let def: FeatureDefinition = serde_json::from_value(json!({
            "kind": "lookup",
            "label": "median_age",
            "calc_method": "max",
            "summary_radius_km": 5,
            "statistic": "average"
        }))
        .unwrap();
        let err = Feature::try_from(def).unwrap_err();
        assert!(matches!(err, FeatureError::Validation { .. }));

        let def: FeatureDefinition = serde_json::from_value(json!({
            "kind": "lookup",
            "label": "median_age",
            "calc_method": "value",
            "summary_radius_km": 5,
            "statistic": "average"
        }))
        .unwrap();
        let feature = Feature::try_from(def).unwrap();
        assert_eq!(feature.calc().aggregation(), Aggregation::Value);
    }

    #[test]
    fn test_deserialize_validates_feature() {
        let res: std::result::Result<Feature, _> = serde_json::from_value(json!({
            "name": "",
            "endpoint": "lookup",
            "params": {"latitude": 1.0},
            "calc": {"path": []}
        }));
        assert!(res.is_err());

        let res: std::result::Result<Feature, _> = serde_json::from_value(json!({
            "name": "density",
            "endpoint": "lookup",
            "params": {"latitude": 1.0},
            "calc": {"path": ["population_density_per_km", "value"]}
        }));
        assert!(res.is_err());

        let feature = Feature::lookup("population_density_per_km", Aggregation::Value).unwrap();
        let back: Feature = serde_json::from_value(serde_json::to_value(&feature).unwrap()).unwrap();
        assert_eq!(back, feature);
    }

    #[test]
    fn test_display() {
        let feature = Feature::points_of_interest(Aggregation::Min)
            .label("bars")
            .within_minutes_walking(5.0)
            .build()
            .unwrap();
        assert_eq!(
            feature.to_string(),
            "poi_bars_min (points_of_interest -> min of bars.straight_line_distance_miles)"
        );
    }
}
