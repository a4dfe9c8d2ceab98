//! Remote enrichment client abstraction.
//!
//! Defines the `EnrichmentClient` trait that every transport implements, the
//! set of known service endpoints, and an in-memory `MockEnrichmentClient`.
//! The HTTP implementation lives in [`crate::http`].

use crate::error::ClientError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

/// Query parameters for a single call. Values are JSON scalars.
pub type Query = Map<String, Value>;

/// Resources exposed by the enrichment service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Lookup,
    PointsOfInterest,
    AmenitiesScore,
    Isochrone,
    Clusters,
    PointsOfInterestOptions,
}

impl Endpoint {
    pub const ALL: [Endpoint; 6] = [
        Endpoint::Lookup,
        Endpoint::PointsOfInterest,
        Endpoint::AmenitiesScore,
        Endpoint::Isochrone,
        Endpoint::Clusters,
        Endpoint::PointsOfInterestOptions,
    ];

    /// Path segment of this resource, relative to the service base URL.
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Lookup => "lookup",
            Endpoint::PointsOfInterest => "points_of_interest",
            Endpoint::AmenitiesScore => "amenities_score",
            Endpoint::Isochrone => "isochrone",
            Endpoint::Clusters => "clusters",
            Endpoint::PointsOfInterestOptions => "points_of_interest_options",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Endpoint {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| ClientError::UnknownEndpoint {
                name: s.to_string(),
            })
    }
}

/// Returns the service's error message if `response` is an in-band error.
///
/// The service rejects a coordinate (e.g. one that is not close to a road) by
/// answering with an object carrying a `message` key. This is a heuristic: a
/// legitimate payload with a top-level `message` field would be misread.
pub fn error_message(response: &Value) -> Option<&str> {
    let message = response.as_object()?.get("message")?;
    Some(message.as_str().unwrap_or("<non-string message>"))
}

/// Trait for enrichment service transports.
///
/// Implementations must be safe to share across concurrent calls; features
/// and feature sets only ever borrow the client immutably.
#[async_trait]
pub trait EnrichmentClient: Send + Sync {
    /// Call `endpoint` with `query`. A `body` turns the call into a POST with
    /// that JSON body; otherwise it is a GET.
    ///
    /// The returned value is the decoded response object, which may itself be
    /// an in-band error (see [`error_message`]).
    async fn invoke(
        &self,
        endpoint: Endpoint,
        query: &Query,
        body: Option<&Value>,
    ) -> Result<Value, ClientError>;

    /// Attribute lookup (`labels` comma-joined, optional `summary_radius_km`).
    async fn lookup(&self, query: &Query) -> Result<Value, ClientError> {
        self.invoke(Endpoint::Lookup, query, None).await
    }

    /// Travel-time isochrone around a point.
    async fn isochrone(&self, query: &Query) -> Result<Value, ClientError> {
        self.invoke(Endpoint::Isochrone, query, None).await
    }

    /// Points of interest around a point, limited by distance or travel time.
    async fn points_of_interest(&self, query: &Query) -> Result<Value, ClientError> {
        self.invoke(Endpoint::PointsOfInterest, query, None).await
    }

    /// Points of interest inside a polygon.
    async fn points_of_interest_within(
        &self,
        search: &PolygonSearch,
    ) -> Result<Value, ClientError> {
        let body = search.to_body().map_err(|e| ClientError::Request {
            endpoint: Endpoint::PointsOfInterest.to_string(),
            message: format!("invalid polygon body: {e}"),
        })?;
        self.invoke(Endpoint::PointsOfInterest, &Query::new(), Some(&body))
            .await
    }

    /// Amenities score around a point.
    async fn amenities_score(&self, query: &Query) -> Result<Value, ClientError> {
        self.invoke(Endpoint::AmenitiesScore, query, None).await
    }

    /// Venue clusters around a point.
    async fn clusters(&self, query: &Query) -> Result<Value, ClientError> {
        self.invoke(Endpoint::Clusters, query, None).await
    }

    /// Labels and brands accepted by the points-of-interest endpoint.
    async fn points_of_interest_options(&self) -> Result<Value, ClientError> {
        self.invoke(Endpoint::PointsOfInterestOptions, &Query::new(), None)
            .await
    }
}

/// What a polygon search filters on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoiFilter {
    Labels(Vec<String>),
    Brands(Vec<String>),
}

/// Body of a points-of-interest search inside a GeoJSON polygon.
#[derive(Debug, Clone)]
pub struct PolygonSearch {
    pub filter: PoiFilter,
    pub polygon: geojson::Geometry,
}

impl PolygonSearch {
    pub fn labels<I, S>(labels: I, polygon: geojson::Geometry) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            filter: PoiFilter::Labels(labels.into_iter().map(Into::into).collect()),
            polygon,
        }
    }

    pub fn brands<I, S>(brands: I, polygon: geojson::Geometry) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            filter: PoiFilter::Brands(brands.into_iter().map(Into::into).collect()),
            polygon,
        }
    }

    /// JSON body accepted by the POST form of the points-of-interest endpoint.
    pub fn to_body(&self) -> Result<Value, serde_json::Error> {
        let (key, values) = match &self.filter {
            PoiFilter::Labels(v) => ("labels", v),
            PoiFilter::Brands(v) => ("brands", v),
        };
        let mut body = Map::new();
        body.insert(key.to_string(), json!(values));
        body.insert("geojson".to_string(), serde_json::to_value(&self.polygon)?);
        Ok(Value::Object(body))
    }
}

/// A call observed by [`MockEnrichmentClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub endpoint: Endpoint,
    pub query: Query,
    pub body: Option<Value>,
}

/// In-memory client returning canned responses per endpoint.
///
/// Every call is recorded, so tests can assert on the exact query a feature
/// built. Endpoints without a canned response fall back to `fallback`, or
/// fail with `ClientError::Request` when no fallback is set.
#[derive(Debug, Default)]
pub struct MockEnrichmentClient {
    responses: HashMap<Endpoint, Value>,
    fallback: Option<Value>,
    failure: Option<String>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockEnrichmentClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to every call on `endpoint` with `response`.
    pub fn with_response(mut self, endpoint: Endpoint, response: Value) -> Self {
        self.responses.insert(endpoint, response);
        self
    }

    /// Respond to calls on endpoints without a specific response.
    pub fn with_fallback(mut self, response: Value) -> Self {
        self.fallback = Some(response);
        self
    }

    /// Fail every call with a transport error.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Snapshot of all calls received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }
}

#[async_trait]
impl EnrichmentClient for MockEnrichmentClient {
    async fn invoke(
        &self,
        endpoint: Endpoint,
        query: &Query,
        body: Option<&Value>,
    ) -> Result<Value, ClientError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                endpoint,
                query: query.clone(),
                body: body.cloned(),
            });
        }

        if let Some(message) = &self.failure {
            return Err(ClientError::Request {
                endpoint: endpoint.to_string(),
                message: message.clone(),
            });
        }

        self.responses
            .get(&endpoint)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| ClientError::Request {
                endpoint: endpoint.to_string(),
                message: "no mock response configured".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn polygon() -> geojson::Geometry {
        geojson::Geometry::new(geojson::Value::Polygon(vec![vec![
            vec![-122.1781826019287, 47.54003487204064],
            vec![-122.17363357543947, 47.54003487204064],
            vec![-122.17363357543947, 47.542642203571745],
            vec![-122.1781826019287, 47.542642203571745],
            vec![-122.1781826019287, 47.54003487204064],
        ]]))
    }

    #[test]
    fn test_endpoint_names() {
        assert_eq!(Endpoint::Lookup.as_str(), "lookup");
        assert_eq!(Endpoint::PointsOfInterest.to_string(), "points_of_interest");
        assert_eq!(
            "amenities_score".parse::<Endpoint>().unwrap(),
            Endpoint::AmenitiesScore
        );
        assert!("weather".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_endpoint_serde_matches_path() {
        for endpoint in Endpoint::ALL {
            let json = serde_json::to_value(endpoint).unwrap();
            assert_eq!(json, Value::String(endpoint.as_str().to_string()));
        }
    }

    #[test]
    fn test_error_message_detection() {
        let err = json!({"message": "Invalid location. Ensure your location is close to a road."});
        assert_eq!(
            error_message(&err),
            Some("Invalid location. Ensure your location is close to a road.")
        );
        assert_eq!(error_message(&json!({"score": 4})), None);
        assert_eq!(error_message(&json!([1, 2])), None);
    }

    #[test]
    fn test_polygon_search_body() {
        let body = PolygonSearch::labels(["warehouses"], polygon())
            .to_body()
            .unwrap();
        assert_eq!(body["labels"], json!(["warehouses"]));
        assert_eq!(body["geojson"]["type"], "Polygon");
        assert_eq!(body["geojson"]["coordinates"][0][0][0], -122.1781826019287);

        let body = PolygonSearch::brands(["Target"], polygon())
            .to_body()
            .unwrap();
        assert_eq!(body["brands"], json!(["Target"]));
        assert!(body.get("labels").is_none());
    }

    #[tokio::test]
    async fn test_mock_records_calls() {
        let mock = MockEnrichmentClient::new()
            .with_response(Endpoint::AmenitiesScore, json!({"score": 4}));
        let mut query = Query::new();
        query.insert("latitude".into(), json!(44.976469));
        query.insert("within_minutes_driving".into(), json!(3));

        let resp = mock.amenities_score(&query).await.unwrap();
        assert_eq!(resp, json!({"score": 4}));

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].endpoint, Endpoint::AmenitiesScore);
        assert_eq!(calls[0].query["within_minutes_driving"], json!(3));
        assert!(calls[0].body.is_none());
    }

    #[tokio::test]
    async fn test_mock_polygon_search_is_post() {
        let mock = MockEnrichmentClient::new().with_fallback(json!({"warehouses": []}));
        let search = PolygonSearch::labels(["warehouses"], polygon());
        let resp = mock.points_of_interest_within(&search).await.unwrap();
        assert_eq!(resp, json!({"warehouses": []}));
        let calls = mock.calls();
        assert_eq!(calls[0].endpoint, Endpoint::PointsOfInterest);
        assert!(calls[0].body.is_some());
    }

    #[tokio::test]
    async fn test_mock_without_response_errors() {
        let mock = MockEnrichmentClient::new();
        let err = mock.clusters(&Query::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::Request { .. }));
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let mock = MockEnrichmentClient::new()
            .with_fallback(json!({}))
            .failing("connection refused");
        let err = mock.points_of_interest_options().await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(mock.call_count(), 1);
    }
}
