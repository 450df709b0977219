//! Terminal rendering of serialized pipeline results.
//!
//! Rows become an aligned text table; acknowledgements and failures become
//! a single line.

use serde_json::Value;

/// Text shown for SQL NULL.
const NULL_CELL: &str = "NULL";

/// Renders a serialized result for the terminal.
pub fn render_result(result: &Value) -> String {
    match result {
        Value::Array(rows) => render_rows(rows),
        Value::Object(object) => {
            if let Some(error) = object.get("error") {
                format!("Error: {}", cell_text(error))
            } else if let Some(count) = object.get("rows_affected") {
                let noun = if count.as_u64() == Some(1) { "row" } else { "rows" };
                format!("{} {} affected", count, noun)
            } else {
                serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string())
            }
        }
        other => cell_text(other),
    }
}

fn render_rows(rows: &[Value]) -> String {
    let Some(Value::Object(first)) = rows.first() else {
        return "(0 rows)".to_string();
    };
    let columns: Vec<&str> = first.keys().map(String::as_str).collect();

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|column| row.get(*column).map_or_else(String::new, cell_text))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, columns.iter().copied(), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&rule.join("-+-"));
    out.push('\n');
    for row in &cells {
        push_line(&mut out, row.iter().map(String::as_str), &widths);
    }

    let noun = if rows.len() == 1 { "row" } else { "rows" };
    out.push_str(&format!("({} {})", rows.len(), noun));
    out
}

fn push_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, width)| {
            let pad = width.saturating_sub(cell.chars().count());
            format!("{}{}", cell, " ".repeat(pad))
        })
        .collect();
    out.push_str(padded.join(" | ").trim_end());
    out.push('\n');
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => NULL_CELL.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Renders the cached schema as `table(column type, ...)` lines.
pub fn render_schema(schema: &Value) -> String {
    let Some(tables) = schema.as_object() else {
        return String::new();
    };
    if tables.is_empty() {
        return "(no tables)".to_string();
    }
    tables
        .iter()
        .map(|(table, columns)| {
            let columns: Vec<String> = columns
                .as_array()
                .map(|columns| {
                    columns
                        .iter()
                        .map(|c| {
                            let mut text = format!(
                                "{} {}",
                                c["column"].as_str().unwrap_or_default(),
                                c["type"].as_str().unwrap_or_default()
                            );
                            if c["nullable"] == Value::Bool(false) {
                                text.push_str(" NOT NULL");
                            }
                            text
                        })
                        .collect()
                })
                .unwrap_or_default();
            format!("{}({})", table, columns.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
