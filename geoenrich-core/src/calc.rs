//! Feature calculators: reduce a nested API response to a single scalar.
//!
//! A [`FeatureCalc`] walks a response along an ordered list of keys and then
//! applies an [`Aggregation`] at the last key. Descent is untyped and trusts
//! the caller: a key that is not there is a [`FeatureError`], not missing
//! data, because it means the feature was configured for a different
//! response shape.
//!
//! Evaluation only borrows the response; it is never modified.

use crate::error::FeatureError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// How the value(s) found at the end of a path become one scalar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Aggregation {
    /// The value under the last key, as is.
    #[default]
    Value,
    /// Number of records carrying the last key.
    Count,
    /// Smallest value of the last key across records.
    Min,
    /// Largest value of the last key across records.
    Max,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Value => "value",
            Aggregation::Count => "count",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregation {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "value" => Ok(Aggregation::Value),
            "count" => Ok(Aggregation::Count),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            other => Err(FeatureError::UnsupportedAggregation {
                mode: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Aggregation {
    type Error = FeatureError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Aggregation> for String {
    fn from(a: Aggregation) -> Self {
        a.as_str().to_string()
    }
}

/// Derives one feature value from an enrichment response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFeatureCalc")]
pub struct FeatureCalc {
    path: Vec<String>,
    aggregation: Aggregation,
}

#[derive(Deserialize)]
struct RawFeatureCalc {
    path: Vec<String>,
    #[serde(default)]
    aggregation: Aggregation,
}

impl TryFrom<RawFeatureCalc> for FeatureCalc {
    type Error = FeatureError;

    fn try_from(raw: RawFeatureCalc) -> Result<Self, Self::Error> {
        Self::new(raw.path, raw.aggregation)
    }
}

impl FeatureCalc {
    /// Build a calculator. The path must contain at least one key.
    pub fn new<I, S>(path: I, aggregation: Aggregation) -> Result<Self, FeatureError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path: Vec<String> = path.into_iter().map(Into::into).collect();
        if path.is_empty() {
            return Err(FeatureError::validation(
                "<calculator>",
                "traversal path must contain at least one key",
            ));
        }
        Ok(Self { path, aggregation })
    }

    /// Build a calculator from an aggregation tag such as `"min"`.
    ///
    /// Unknown tags fail here with `UnsupportedAggregation`, before any
    /// response is seen.
    pub fn parse<I, S>(path: I, mode: &str) -> Result<Self, FeatureError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(path, mode.parse()?)
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    /// Evaluate against a response. `Ok(None)` means the response holds no data
    /// for this feature (an empty list under an aggregating path).
    pub fn evaluate(&self, response: &Value) -> Result<Option<Value>, FeatureError> {
        let Some((last, parents)) = self.path.split_last() else {
            return Err(FeatureError::validation(
                "<calculator>",
                "traversal path must contain at least one key",
            ));
        };

        let contents = self.descend(response, parents)?;

        match self.aggregation {
            Aggregation::Value => {
                let map = contents
                    .as_object()
                    .ok_or_else(|| FeatureError::NotIndexable {
                        key: last.clone(),
                        found: kind_of(contents).to_string(),
                    })?;
                map.get(last)
                    .cloned()
                    .map(Some)
                    .ok_or_else(|| FeatureError::KeyPath {
                        path: self.path.clone(),
                        key: last.clone(),
                    })
            }
            Aggregation::Count => {
                let extracted = extract(contents, last)?;
                Ok((!extracted.is_empty()).then(|| Value::from(extracted.len())))
            }
            Aggregation::Min => extreme(&extract(contents, last)?, last, Ordering::Less),
            Aggregation::Max => extreme(&extract(contents, last)?, last, Ordering::Greater),
        }
    }

    fn descend<'a>(&self, root: &'a Value, keys: &[String]) -> Result<&'a Value, FeatureError> {
        keys.iter().try_fold(root, |node, key| match node {
            Value::Object(map) => map.get(key).ok_or_else(|| FeatureError::KeyPath {
                path: self.path.clone(),
                key: key.clone(),
            }),
            Value::Array(items) => key
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i))
                .ok_or_else(|| FeatureError::KeyPath {
                    path: self.path.clone(),
                    key: key.clone(),
                }),
            other => Err(FeatureError::NotIndexable {
                key: key.clone(),
                found: kind_of(other).to_string(),
            }),
        })
    }
}

/// Pull `key` out of every record of a list. Records without the key (or with
/// a `null` under it) contribute nothing.
fn extract<'a>(contents: &'a Value, key: &str) -> Result<Vec<&'a Value>, FeatureError> {
    let items = contents
        .as_array()
        .ok_or_else(|| FeatureError::NotASequence {
            key: key.to_string(),
        })?;

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let record = item.as_object().ok_or_else(|| FeatureError::NotIndexable {
            key: key.to_string(),
            found: kind_of(item).to_string(),
        })?;
        if let Some(v) = record.get(key).filter(|v| !v.is_null()) {
            out.push(v);
        }
    }
    Ok(out)
}

/// Minimum (`Ordering::Less`) or maximum (`Ordering::Greater`) of `values`.
fn extreme(values: &[&Value], key: &str, wanted: Ordering) -> Result<Option<Value>, FeatureError> {
    let mut best: Option<&Value> = None;
    for &v in values {
        best = match best {
            None => {
                // Reject kinds without an ordering even for a single element.
                natural_cmp(v, v, key)?;
                Some(v)
            }
            Some(current) if natural_cmp(v, current, key)? == wanted => Some(v),
            keep => keep,
        };
    }
    Ok(best.cloned())
}

/// Natural ordering: numbers numerically, strings lexicographically.
fn natural_cmp(a: &Value, b: &Value, key: &str) -> Result<Ordering, FeatureError> {
    let incomparable = || FeatureError::Incomparable {
        key: key.to_string(),
    };
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (
                x.as_f64().ok_or_else(incomparable)?,
                y.as_f64().ok_or_else(incomparable)?,
            );
            x.partial_cmp(&y).ok_or_else(incomparable)
        }
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        _ => Err(incomparable()),
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
