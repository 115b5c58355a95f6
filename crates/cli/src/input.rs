//! Ground truth and claims read from files (or stdin via `-`).

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde_json::Value;
use voxcheck_verify::{ClaimValue, Claims, MetadataDocument, ProvenanceRecord, ValidRanges};

use crate::CliError;

fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == "-"
}

pub fn read_text(path: &Path) -> Result<String, CliError> {
    if is_stdin(path) {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| CliError::args(format!("cannot read stdin: {e}")))?;
        return Ok(buf);
    }
    std::fs::read_to_string(path)
        .map_err(|e| CliError::args(format!("cannot read {}: {e}", path.display())))
}

fn read_json(path: &Path, what: &str) -> Result<Value, CliError> {
    let text = read_text(path)?;
    serde_json::from_str(&text).map_err(|e| {
        CliError::parse(format!("{what} {} is not valid JSON: {e}", path.display()))
    })
}

pub fn read_metadata(path: &Path) -> Result<MetadataDocument, CliError> {
    read_json(path, "metadata").map(MetadataDocument::new)
}

pub fn read_claims(path: &Path) -> Result<Claims, CliError> {
    let value = read_json(path, "claims")?;
    flatten_claims(&value).map_err(|e| CliError::parse(format!("claims {}: {e}", path.display())))
}

pub fn read_ranges(path: &Path) -> Result<ValidRanges, CliError> {
    let value = read_json(path, "ranges")?;
    serde_json::from_value(value).map_err(|e| {
        CliError::parse(format!("ranges {}: {e}", path.display()))
            .with_hint("expected an object of axis to [min, max], e.g. {\"inline\": [100, 750]}")
    })
}

pub fn read_record(path: &Path) -> Result<ProvenanceRecord, CliError> {
    let value = read_json(path, "provenance record")?;
    serde_json::from_value(value)
        .map_err(|e| CliError::parse(format!("provenance record {}: {e}", path.display())))
}

/// Samples from a CSV file (by extension, or whenever a column is named) or
/// from JSON.
pub fn read_samples(path: &Path, column: Option<&str>) -> Result<Vec<f64>, CliError> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    let text = read_text(path)?;
    let samples = if is_csv || column.is_some() {
        samples_from_csv(&text, column)
    } else {
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| CliError::parse(format!("samples {} is not valid JSON: {e}", path.display())))?;
        samples_from_json(&value)
    };
    samples.map_err(|e| CliError::parse(format!("samples {}: {e}", path.display())))
}

/// Claims as a flat map. Nested objects become dotted names so
/// `{"location": {"inline": 425}}` claims `location.inline`.
pub fn flatten_claims(value: &Value) -> Result<Claims, String> {
    let Value::Object(map) = value else {
        return Err("expected a JSON object of field name to claimed value".into());
    };
    let mut claims = Claims::new();
    flatten_into(&mut claims, "", map)?;
    Ok(claims)
}

fn flatten_into(
    claims: &mut Claims,
    prefix: &str,
    map: &serde_json::Map<String, Value>,
) -> Result<(), String> {
    for (key, value) in map {
        let name = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
        match value {
            Value::Object(inner) => flatten_into(claims, &name, inner)?,
            other => {
                let claim = ClaimValue::from_json(other)
                    .ok_or_else(|| format!("claim '{name}' is null"))?;
                claims.insert(name, claim);
            }
        }
    }
    Ok(())
}

/// A JSON array of numbers, or `{"samples": [...]}`. `null` (and text such as
/// "NaN") stand for missing samples.
pub fn samples_from_json(value: &Value) -> Result<Vec<f64>, String> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("samples") {
            Some(Value::Array(items)) => items,
            _ => return Err("expected an array of numbers or an object with a \"samples\" array".into()),
        },
        _ => return Err("expected an array of numbers".into()),
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Number(n) => n.as_f64().ok_or_else(|| format!("element {i} is out of range")),
            Value::Null => Ok(f64::NAN),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("element {i} ('{s}') is not a number")),
            other => Err(format!("element {i} ({other}) is not a number")),
        })
        .collect()
}

/// Numeric cells of a CSV document. With `column`, the first row is a header
/// and only that column is read; otherwise every cell is a sample and a
/// leading non-numeric row is skipped as a header. Empty cells are missing
/// samples.
pub fn samples_from_csv(data: &str, column: Option<&str>) -> Result<Vec<f64>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(column.is_some())
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes());
    let mut samples = Vec::new();

    match column {
        Some(name) => {
            let headers = reader.headers().map_err(|e| e.to_string())?.clone();
            let index = headers.iter().position(|h| h == name).ok_or_else(|| {
                format!(
                    "column '{name}' not found (columns: {})",
                    headers.iter().collect::<Vec<_>>().join(", ")
                )
            })?;
            for (row, record) in reader.records().enumerate() {
                let record = record.map_err(|e| e.to_string())?;
                let cell = record.get(index).unwrap_or("");
                let v = parse_cell(cell)
                    .ok_or_else(|| format!("row {}: '{cell}' is not a number", row + 2))?;
                samples.push(v);
            }
        }
        None => {
            for (row, record) in reader.records().enumerate() {
                let record = record.map_err(|e| e.to_string())?;
                let cells: Vec<Option<f64>> = record.iter().map(parse_cell).collect();
                if row == 0 && cells.iter().any(Option::is_none) {
                    continue;
                }
                for (cell, v) in record.iter().zip(cells) {
                    samples.push(v.ok_or_else(|| format!("row {}: '{cell}' is not a number", row + 1))?);
                }
            }
        }
    }
    Ok(samples)
}

fn parse_cell(cell: &str) -> Option<f64> {
    if cell.is_empty() {
        Some(f64::NAN)
    } else {
        cell.parse().ok()
    }
}

/// `KEY=VALUE` pairs. VALUE is taken as JSON when it parses (`window=32`,
/// `axes=["inline"]`), as text otherwise (`source=seismic.zarr`).
pub fn parse_params(pairs: &[String]) -> Result<BTreeMap<String, Value>, CliError> {
    let mut params = BTreeMap::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .filter(|(k, _)| !k.trim().is_empty())
            .ok_or_else(|| CliError::args(format!("invalid --param '{pair}'")).with_hint("use KEY=VALUE"))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        params.insert(key.trim().to_string(), value);
    }
    Ok(params)
}
