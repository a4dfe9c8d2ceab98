//! # Geoenrich Core
//!
//! Core library for geoenrich: turns latitude/longitude points into
//! location features by querying a remote enrichment service.
//! Provides the service client (trait, HTTP transport and mock), feature
//! calculators, feature definitions, feature sets applied over tables,
//! configuration and error types.

pub mod calc;
pub mod client;
pub mod config;
pub mod error;
pub mod feature;
pub mod feature_set;
pub mod http;
pub mod table;

// Re-export commonly used types at the crate root.
pub use calc::{Aggregation, FeatureCalc};
pub use client::{
    EnrichmentClient, Endpoint, MockEnrichmentClient, PoiFilter, PolygonSearch, Query,
    RecordedCall, error_message,
};
pub use config::{BatchConfig, ClientConfig, EnrichConfig, LoggingConfig, load_config};
pub use error::{ClientError, ConfigError, EnrichError, FeatureError, Result, TableError};
pub use feature::{
    AmenitiesFeatureBuilder, Feature, FeatureDefinition, PoiFeatureBuilder, TravelLimit,
};
pub use feature_set::{FeatureFile, FeatureSet};
pub use http::HttpEnrichmentClient;
pub use table::Table;
