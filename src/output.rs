//! Result rendering for the terminal.

use chrono::SecondsFormat;
use clap::ValueEnum;
use qwire_protocol::{Atom, Dict, Table, Value, Vector};
use serde_json::{json, Map};

/// Output format of query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// q console style.
    Text,
    /// One JSON document per result.
    Json,
}

pub fn render(value: &Value, format: Format) -> String {
    match format {
        Format::Text => render_text(value),
        Format::Json => {
            serde_json::to_string_pretty(&to_json(value)).unwrap_or_else(|e| e.to_string())
        }
    }
}

fn render_text(value: &Value) -> String {
    match value {
        Value::Table(table) => render_table(table),
        Value::Dict(dict) => render_dict(dict),
        other => other.to_string(),
    }
}

/// Cell text of one element, without type decoration for symbols and
/// characters.
fn cell(atom: &Atom) -> String {
    match atom {
        Atom::Symbol(s) => s.clone(),
        Atom::Char(c) => char::from(*c).to_string(),
        other => other.to_string(),
    }
}

fn cells(value: &Value) -> Vec<String> {
    match value {
        Value::Vector(Vector::Char(s)) => s.chars().map(String::from).collect(),
        Value::Vector(v) => v.atoms().map(|a| cell(&a)).collect(),
        Value::List(items) => items
            .iter()
            .map(|item| match item {
                Value::Vector(Vector::Char(s)) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Value::Atom(a) => vec![cell(a)],
        other => vec![other.to_string()],
    }
}

fn render_table(table: &Table) -> String {
    let columns: Vec<Vec<String>> = table.data.iter().map(cells).collect();
    let widths: Vec<usize> = table
        .columns
        .iter()
        .zip(&columns)
        .map(|(name, col)| {
            col.iter()
                .map(|c| c.chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    let header: Vec<String> = table
        .columns
        .iter()
        .zip(&widths)
        .map(|(name, w)| format!("{name:<w$}"))
        .collect();
    out.push_str(header.join(" ").trim_end());
    out.push('\n');
    out.push_str(&"-".repeat(widths.iter().sum::<usize>() + widths.len().saturating_sub(1)));

    for row in 0..table.row_count() {
        let line: Vec<String> = columns
            .iter()
            .zip(&widths)
            .map(|(col, w)| format!("{:<w$}", col.get(row).map(String::as_str).unwrap_or("")))
            .collect();
        out.push('\n');
        out.push_str(line.join(" ").trim_end());
    }
    out
}

fn render_dict(dict: &Dict) -> String {
    let keys = cells(&dict.keys);
    let values = cells(&dict.values);
    if keys.len() != values.len() {
        return dict.to_string();
    }
    let width = keys.iter().map(|k| k.chars().count()).max().unwrap_or(0);
    keys.iter()
        .zip(&values)
        .map(|(k, v)| format!("{k:<width$}| {v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn atom_json(atom: &Atom) -> serde_json::Value {
    if atom.is_null() {
        return serde_json::Value::Null;
    }
    match atom {
        Atom::Boolean(b) => json!(b),
        Atom::Guid(g) => json!(g.hyphenated().to_string()),
        Atom::Byte(b) => json!(b),
        Atom::Short(v) => json!(v),
        Atom::Int(v) => json!(v),
        Atom::Long(v) => json!(v),
        Atom::Real(v) => json!(v),
        Atom::Float(v) => json!(v),
        Atom::Char(c) => json!(char::from(*c).to_string()),
        Atom::Symbol(s) => json!(s),
        Atom::Timestamp(ts) => json!(ts.to_rfc3339_opts(SecondsFormat::Nanos, true)),
        Atom::Date(d) => json!(d.format("%Y-%m-%d").to_string()),
        Atom::Datetime(dt) => json!(dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()),
        Atom::Time(t) => json!(t.format("%H:%M:%S%.3f").to_string()),
        Atom::Month(m) => json!(m.to_string()),
        Atom::Timespan(n) => json!(n.to_string()),
        Atom::Minute(u) => json!(u.to_string()),
        Atom::Second(v) => json!(v.to_string()),
    }
}

/// Elements of a vector or list as JSON values.
fn elements(value: &Value) -> Option<Vec<serde_json::Value>> {
    match value {
        Value::Vector(Vector::Char(_)) => None,
        Value::Vector(v) => Some(v.atoms().map(|a| atom_json(&a)).collect()),
        Value::List(items) => Some(items.iter().map(to_json).collect()),
        _ => None,
    }
}

/// Converts a value to JSON.
///
/// Tables become arrays of row objects, symbol-keyed dictionaries become
/// objects and nulls become `null`.
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Atom(a) => atom_json(a),
        Value::Vector(Vector::Char(s)) => json!(s),
        Value::Vector(_) | Value::List(_) => {
            serde_json::Value::Array(elements(value).unwrap_or_default())
        }
        Value::Dict(dict) => match (&*dict.keys, elements(&dict.values)) {
            (Value::Vector(Vector::Symbol(keys)), Some(values)) if keys.len() == values.len() => {
                serde_json::Value::Object(keys.iter().cloned().zip(values).collect::<Map<_, _>>())
            }
            _ => json!({ "keys": to_json(&dict.keys), "values": to_json(&dict.values) }),
        },
        Value::Table(table) => {
            let columns: Vec<Vec<serde_json::Value>> = table
                .data
                .iter()
                .map(|col| elements(col).unwrap_or_else(|| vec![to_json(col)]))
                .collect();
            let rows = (0..table.row_count())
                .map(|row| {
                    let object: Map<String, serde_json::Value> = table
                        .columns
                        .iter()
                        .zip(&columns)
                        .map(|(name, col)| {
                            (name.clone(), col.get(row).cloned().unwrap_or_default())
                        })
                        .collect();
                    serde_json::Value::Object(object)
                })
                .collect();
            serde_json::Value::Array(rows)
        }
        Value::Function(kind) => json!(format!("<{kind:?}>")),
    }
}
