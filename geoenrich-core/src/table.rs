//! Row-oriented tables of JSON cells, optionally carrying point geometry.
//!
//! This is the tabular input and output of a feature set: named columns,
//! rows of [`serde_json::Value`] cells and, for geometry tables, one
//! [`geo::Point`] per row (x = longitude, y = latitude). CSV is the only
//! file format; a `geometry` column in WKT `POINT(x y)` form round-trips
//! to the point geometry.

use crate::error::TableError;
use geo::Point;
use serde_json::Value;
use std::io::{Read, Write};
use std::path::Path;

/// Name of the CSV column holding WKT point geometry.
pub const GEOMETRY_COLUMN: &str = "geometry";

/// A row-oriented table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    geometry: Option<Vec<Point<f64>>>,
}

impl Table {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            geometry: None,
        }
    }

    /// Append a row; it must have one cell per column.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::RowWidth {
                row: self.rows.len(),
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Attach point geometry, one point per row.
    pub fn with_geometry(mut self, points: Vec<Point<f64>>) -> Result<Self, TableError> {
        if points.len() != self.rows.len() {
            return Err(TableError::GeometryLength {
                expected: self.rows.len(),
                found: points.len(),
            });
        }
        self.geometry = Some(points);
        Ok(self)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn geometry(&self) -> Option<&[Point<f64>]> {
        self.geometry.as_deref()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns, counting the geometry as one.
    pub fn column_count(&self) -> usize {
        self.columns.len() + usize::from(self.geometry.is_some())
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cells of column `name`, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Set column `name` to `values`, one per row.
    ///
    /// An existing column of the same name is overwritten in place; otherwise
    /// the column is appended.
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) -> Result<(), TableError> {
        if values.len() != self.rows.len() {
            return Err(TableError::ColumnLength {
                column: name.to_string(),
                expected: self.rows.len(),
                found: values.len(),
            });
        }
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    /// One point per row: the native geometry if present, otherwise built
    /// from the named latitude and longitude columns.
    pub fn points(
        &self,
        latitude_column: Option<&str>,
        longitude_column: Option<&str>,
    ) -> Result<Vec<Point<f64>>, TableError> {
        if let Some(geometry) = &self.geometry {
            return Ok(geometry.clone());
        }
        let (Some(lat_col), Some(lon_col)) = (latitude_column, longitude_column) else {
            return Err(TableError::MissingCoordinateSource);
        };
        let lat_idx = self.require_column(lat_col)?;
        let lon_idx = self.require_column(lon_col)?;

        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let lat = coordinate(&row[lat_idx], i, lat_col)?;
                let lon = coordinate(&row[lon_idx], i, lon_col)?;
                Ok(Point::new(lon, lat))
            })
            .collect()
    }

    fn require_column(&self, name: &str) -> Result<usize, TableError> {
        self.column_index(name)
            .ok_or_else(|| TableError::ColumnNotFound {
                column: name.to_string(),
            })
    }

    /// Read a CSV table with a header row.
    ///
    /// Cells are typed by inference (integer, float, boolean, else string)
    /// when the typed value writes back as the same text; empty cells become
    /// `null`. A `geometry` column of WKT points becomes
    /// the table's geometry.
    pub fn read_csv<R: Read>(reader: R) -> Result<Self, TableError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let geometry_idx = headers.iter().position(|h| h == GEOMETRY_COLUMN);

        let mut table = Table::new(
            headers
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != geometry_idx)
                .map(|(_, h)| h.clone()),
        );
        let mut points = Vec::new();

        for (row_idx, record) in rdr.records().enumerate() {
            let record = record?;
            let mut row = Vec::with_capacity(table.columns.len());
            for (i, field) in record.iter().enumerate() {
                if Some(i) == geometry_idx {
                    points.push(parse_wkt_point(field).ok_or_else(|| {
                        TableError::InvalidCoordinate {
                            row: row_idx,
                            column: GEOMETRY_COLUMN.to_string(),
                        }
                    })?);
                } else {
                    row.push(infer_cell(field));
                }
            }
            table.push_row(row)?;
        }

        if geometry_idx.is_some() {
            table = table.with_geometry(points)?;
        }
        Ok(table)
    }

    pub fn read_csv_path(path: &Path) -> Result<Self, TableError> {
        let file = std::fs::File::open(path).map_err(|e| TableError::Csv {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::read_csv(file)
    }

    /// Write the table as CSV with a header row. `null` cells are written
    /// empty; geometry is written last as a WKT `geometry` column.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), TableError> {
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        if self.geometry.is_some() {
            header.push(GEOMETRY_COLUMN);
        }
        wtr.write_record(&header)?;

        for (i, row) in self.rows.iter().enumerate() {
            let mut record: Vec<String> = row.iter().map(render_cell).collect();
            if let Some(point) = self.geometry.as_ref().and_then(|g| g.get(i)) {
                record.push(format!("POINT({} {})", point.x(), point.y()));
            }
            wtr.write_record(&record)?;
        }

        wtr.flush().map_err(|e| TableError::Csv {
            message: e.to_string(),
        })
    }

    pub fn write_csv_path(&self, path: &Path) -> Result<(), TableError> {
        let file = std::fs::File::create(path).map_err(|e| TableError::Csv {
            message: format!("{}: {e}", path.display()),
        })?;
        self.write_csv(file)
    }
}

fn coordinate(cell: &Value, row: usize, column: &str) -> Result<f64, TableError> {
    let value = match cell {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        other => other.as_f64(),
    };
    value
        .filter(|v| v.is_finite())
        .ok_or_else(|| TableError::InvalidCoordinate {
            row,
            column: column.to_string(),
        })
}

/// Type a CSV field. A field only becomes a number or boolean when writing
/// that value back yields the same text, so untouched columns survive a
/// read/write cycle byte for byte (`02134`, `1.50` and `1e3` stay strings).
fn infer_cell(field: &str) -> Value {
    if field.is_empty() {
        return Value::Null;
    }
    let typed = if let Ok(i) = field.parse::<i64>() {
        Some(Value::from(i))
    } else if let Some(n) = field
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
    {
        Some(Value::Number(n))
    } else {
        match field {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        }
    };
    typed
        .filter(|v| render_cell(v) == field)
        .unwrap_or_else(|| Value::String(field.to_string()))
}

fn render_cell(cell: &Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse `POINT(x y)` (case-insensitive, optional space before the paren).
fn parse_wkt_point(field: &str) -> Option<Point<f64>> {
    let field = field.trim();
    let prefix = field.get(..5)?;
    if !prefix.eq_ignore_ascii_case("POINT") {
        return None;
    }
    let inner = field[5..]
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')?;
    let mut coords = inner.split_whitespace().map(str::parse::<f64>);
    let x = coords.next()?.ok()?;
    let y = coords.next()?.ok()?;
    if coords.next().is_some() || !x.is_finite() || !y.is_finite() {
        return None;
    }
    Some(Point::new(x, y))
}
