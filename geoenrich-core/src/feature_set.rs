//! Feature sets: apply many features to every row of a table.

use crate::client::EnrichmentClient;
use crate::config::BatchConfig;
use crate::error::{ConfigError, Result};
use crate::feature::{Feature, FeatureDefinition};
use crate::table::Table;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// On-disk list of feature definitions.
///
/// TOML files use `[[features]]` tables; JSON files an object with a
/// `features` array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureFile {
    #[serde(default)]
    pub features: Vec<FeatureDefinition>,
}

impl FeatureFile {
    /// Load definitions from a `.json` file, or TOML for any other extension.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let parsed: std::result::Result<Self, String> = if is_json {
            serde_json::from_str(&text).map_err(|e| e.to_string())
        } else {
            toml::from_str(&text).map_err(|e| e.to_string())
        };
        parsed.map_err(|message| {
            ConfigError::ParseError {
                message: format!("{}: {message}", path.display()),
            }
            .into()
        })
    }
}

/// An ordered collection of features applied together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    features: Vec<Feature>,
}

impl FeatureSet {
    /// Features sharing a name would write to the same output column, the
    /// later one winning; this is logged, not rejected.
    pub fn new(features: Vec<Feature>) -> Self {
        let mut seen = HashSet::new();
        for feature in &features {
            if !seen.insert(feature.name()) {
                warn!(
                    feature = feature.name(),
                    "Duplicate feature name; later values overwrite earlier ones"
                );
            }
        }
        Self { features }
    }

    /// Build every definition, failing on the first invalid one.
    pub fn from_definitions<I>(definitions: I) -> Result<Self>
    where
        I: IntoIterator<Item = FeatureDefinition>,
    {
        let features = definitions
            .into_iter()
            .map(Feature::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self::new(features))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_definitions(FeatureFile::load(path)?.features)
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Output column names, in application order.
    pub fn names(&self) -> Vec<&str> {
        self.features.iter().map(Feature::name).collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Enrich `table` with one column per feature, one request per row at a time.
    ///
    /// See [`FeatureSet::apply_with`].
    pub async fn apply(
        &self,
        client: &dyn EnrichmentClient,
        table: &Table,
        latitude_column: Option<&str>,
        longitude_column: Option<&str>,
    ) -> Result<Table> {
        self.apply_with(
            client,
            table,
            latitude_column,
            longitude_column,
            &BatchConfig::default(),
        )
        .await
    }

    /// Enrich a copy of `table` with one column per feature.
    ///
    /// Coordinates come from the table's point geometry when it has one,
    /// otherwise from the two named columns. Rows with no data get `null`.
    /// Any other failure aborts the whole batch; `table` is left untouched.
    pub async fn apply_with(
        &self,
        client: &dyn EnrichmentClient,
        table: &Table,
        latitude_column: Option<&str>,
        longitude_column: Option<&str>,
        batch: &BatchConfig,
    ) -> Result<Table> {
        batch.validate()?;
        let points = table.points(latitude_column, longitude_column)?;
        let mut enriched = table.clone();

        for feature in &self.features {
            info!(
                feature = feature.name(),
                rows = points.len(),
                concurrency = batch.concurrency,
                "Applying feature"
            );
            let values: Vec<Value> = stream::iter(&points)
                .map(|point| async move {
                    feature
                        .calculate(client, point.x(), point.y())
                        .await
                        .map(|value| value.unwrap_or(Value::Null))
                })
                .buffered(batch.concurrency)
                .try_collect()
                .await?;

            let missing = values.iter().filter(|v| v.is_null()).count();
            debug!(feature = feature.name(), missing, "Feature applied");
            enriched.set_column(feature.name(), values)?;
        }

        Ok(enriched)
    }
}

impl FromIterator<Feature> for FeatureSet {
    fn from_iter<T: IntoIterator<Item = Feature>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
