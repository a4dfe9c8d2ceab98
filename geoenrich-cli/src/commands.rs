//! CLI subcommand handlers.

use crate::{Commands, ConfigAction, OptionalPointArgs, PointArgs, WithinArgs};
use geoenrich_core::client::{EnrichmentClient, PolygonSearch, Query};
use geoenrich_core::config::EnrichConfig;
use geoenrich_core::{FeatureSet, HttpEnrichmentClient, Table};
use serde_json::Value;
use std::path::Path;
use tracing::info;

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    config: &EnrichConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    match command {
        Commands::Enrich {
            input,
            features,
            output,
            lat_col,
            lon_col,
            concurrency,
        } => {
            let set = FeatureSet::from_file(&features)?;
            let table = Table::read_csv_path(&input)?;

            let mut batch = config.batch.clone();
            if let Some(n) = concurrency {
                batch.concurrency = n;
            }

            info!(
                input = %input.display(),
                rows = table.row_count(),
                features = set.len(),
                "Enriching table"
            );
            let client = HttpEnrichmentClient::new(&config.client)?;
            let enriched = set
                .apply_with(
                    &client,
                    &table,
                    lat_col.as_deref(),
                    lon_col.as_deref(),
                    &batch,
                )
                .await?;

            match output {
                Some(path) => {
                    enriched.write_csv_path(&path)?;
                    info!(output = %path.display(), "Wrote enriched table");
                }
                None => enriched.write_csv(std::io::stdout().lock())?,
            }
            Ok(())
        }
        Commands::Features { file } => {
            let set = FeatureSet::from_file(&file)?;
            if set.is_empty() {
                println!("No features defined in {}", file.display());
            }
            for feature in set.features() {
                println!("{feature}");
            }
            Ok(())
        }
        Commands::Lookup {
            point,
            labels,
            summary_radius_km,
        } => {
            let mut query = point_query(&point)?;
            insert_opt(&mut query, "labels", labels.map(Value::from));
            insert_opt(&mut query, "summary_radius_km", summary_radius_km.map(Value::from));
            let client = HttpEnrichmentClient::new(&config.client)?;
            print_json(&client.lookup(&query).await?)
        }
        Commands::Poi {
            point,
            labels,
            brands,
            within,
            polygon,
        } => {
            let client = HttpEnrichmentClient::new(&config.client)?;
            let response = match polygon {
                Some(path) => {
                    let search = polygon_search(&path, labels, brands)?;
                    client.points_of_interest_within(&search).await?
                }
                None => {
                    let mut query = optional_point_query(&point)?;
                    insert_opt(&mut query, "labels", labels.map(Value::from));
                    insert_opt(&mut query, "brands", brands.map(Value::from));
                    within_params(&mut query, &within);
                    client.points_of_interest(&query).await?
                }
            };
            print_json(&response)
        }
        Commands::Amenities { point, within } => {
            let mut query = point_query(&point)?;
            within_params(&mut query, &within);
            let client = HttpEnrichmentClient::new(&config.client)?;
            print_json(&client.amenities_score(&query).await?)
        }
        Commands::Isochrone { point, within } => {
            let mut query = point_query(&point)?;
            within_params(&mut query, &within);
            let client = HttpEnrichmentClient::new(&config.client)?;
            print_json(&client.isochrone(&query).await?)
        }
        Commands::Clusters { point } => {
            let query = point_query(&point)?;
            let client = HttpEnrichmentClient::new(&config.client)?;
            print_json(&client.clusters(&query).await?)
        }
        Commands::PoiOptions => {
            let client = HttpEnrichmentClient::new(&config.client)?;
            print_json(&client.points_of_interest_options().await?)
        }
        Commands::Config { action } => handle_config(action, config, workspace),
    }
}

fn handle_config(
    action: ConfigAction,
    config: &EnrichConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".geoenrich");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&EnrichConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            println!("{}", toml::to_string_pretty(&redacted(config))?);
            Ok(())
        }
    }
}

/// Copy of `config` safe to print.
fn redacted(config: &EnrichConfig) -> EnrichConfig {
    let mut shown = config.clone();
    if shown.client.api_token.is_some() {
        shown.client.api_token = Some("<redacted>".to_string());
    }
    shown
}

fn point_query(point: &PointArgs) -> anyhow::Result<Query> {
    let mut query = parse_params(&point.params)?;
    query.insert("latitude".into(), Value::from(point.latitude));
    query.insert("longitude".into(), Value::from(point.longitude));
    Ok(query)
}

fn optional_point_query(point: &OptionalPointArgs) -> anyhow::Result<Query> {
    let mut query = parse_params(&point.params)?;
    insert_opt(&mut query, "latitude", point.latitude.map(Value::from));
    insert_opt(&mut query, "longitude", point.longitude.map(Value::from));
    Ok(query)
}

fn within_params(query: &mut Query, within: &WithinArgs) {
    for (key, value) in [
        ("within_minutes_driving", within.within_minutes_driving),
        ("within_minutes_biking", within.within_minutes_biking),
        ("within_minutes_walking", within.within_minutes_walking),
        ("within_miles", within.within_miles),
    ] {
        insert_opt(query, key, value.map(Value::from));
    }
}

fn insert_opt(query: &mut Query, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        query.insert(key.to_string(), value);
    }
}

/// Parse `key=value` pairs. Values that read as JSON scalars (numbers,
/// booleans) keep their type; anything else is a string.
fn parse_params(raw: &[String]) -> anyhow::Result<Query> {
    raw.iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| anyhow::anyhow!("Invalid parameter '{}': expected key=value", pair))?;
            let value = match serde_json::from_str::<Value>(value) {
                Ok(v @ (Value::Number(_) | Value::Bool(_))) => v,
                _ => Value::from(value),
            };
            Ok((key.to_string(), value))
        })
        .collect()
}

fn polygon_search(
    path: &Path,
    labels: Option<String>,
    brands: Option<String>,
) -> anyhow::Result<PolygonSearch> {
    let text = std::fs::read_to_string(path)?;
    let polygon = match text.parse::<geojson::GeoJson>()? {
        geojson::GeoJson::Geometry(geometry) => geometry,
        geojson::GeoJson::Feature(feature) => feature
            .geometry
            .ok_or_else(|| anyhow::anyhow!("{}: feature has no geometry", path.display()))?,
        geojson::GeoJson::FeatureCollection(_) => {
            anyhow::bail!("{}: expected a single polygon, got a collection", path.display())
        }
    };

    let split = |s: String| -> Vec<String> {
        s.split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .collect()
    };
    match (labels, brands) {
        (Some(labels), None) => Ok(PolygonSearch::labels(split(labels), polygon)),
        (None, Some(brands)) => Ok(PolygonSearch::brands(split(brands), polygon)),
        _ => anyhow::bail!("Polygon search needs exactly one of --labels or --brands"),
    }
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
