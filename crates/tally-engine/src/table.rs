//! JSON rows from the backtest endpoint, reshaped into a CSV table.

use serde_json::{Map, Value};
use std::path::Path;

/// Endpoint field -> output column.
const RENAMES: &[(&str, &str)] = &[
    ("fecha", "Date"),
    ("date", "Date"),
    ("hora", "Time"),
    ("time", "Time"),
    ("strikes", "Strikes"),
    ("type", "Type"),
    ("credit", "Credit"),
    ("price", "Price"),
    ("close", "Close"),
    ("result", "Result"),
    ("strike_distance", "Strike Distance"),
    ("moneyness", "Moneyness"),
];

/// Columns holding money-formatted numbers such as `"$1,234.50"`.
const MONEY_COLUMNS: &[&str] = &[
    "Credit",
    "Price",
    "Close",
    "Result",
    "Strike Distance",
    "Moneyness",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table from endpoint rows. Columns are the union of the row keys
    /// in first-seen order, renamed; missing cells are empty.
    pub fn from_rows(rows: &[Value], clean_numeric: bool) -> Result<Self, String> {
        let objects = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                row.as_object()
                    .ok_or_else(|| format!("row {} is {}, expected an object", i, kind(row)))
            })
            .collect::<Result<Vec<&Map<String, Value>>, String>>()?;

        let mut keys: Vec<&str> = Vec::new();
        for object in &objects {
            for key in object.keys() {
                if !keys.contains(&key.as_str()) {
                    keys.push(key.as_str());
                }
            }
        }

        let columns = rename_columns(&keys);
        let money: Vec<bool> = columns
            .iter()
            .map(|c| clean_numeric && MONEY_COLUMNS.contains(&c.as_str()))
            .collect();

        let rows = objects
            .iter()
            .map(|object| {
                keys.iter()
                    .zip(&money)
                    .map(|(key, is_money)| {
                        let cell = object.get(*key).map(cell_text).unwrap_or_default();
                        if *is_money {
                            clean_money(&cell).map(format_number).unwrap_or_default()
                        } else {
                            cell
                        }
                    })
                    .collect()
            })
            .collect();

        Ok(Self { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Rename known fields, keeping the raw key when the target column is taken
/// (e.g. both `fecha` and `date` present).
fn rename_columns(keys: &[&str]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::with_capacity(keys.len());
    for key in keys {
        let renamed = RENAMES
            .iter()
            .find(|(from, _)| from == key)
            .map(|(_, to)| to.to_string());
        match renamed {
            Some(name) if !columns.contains(&name) && !keys.contains(&name.as_str()) => {
                columns.push(name)
            }
            _ => columns.push(key.to_string()),
        }
    }
    columns
}

/// `"$1,234.50"` -> `1234.5`. `None` when the text is not a number.
pub fn clean_money(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn format_number(value: f64) -> String {
    value.to_string()
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
