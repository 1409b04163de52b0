//! Inspection ("debug") results and their two output formats.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DebugFormat {
    /// psql-style aligned table rendered into a single string.
    #[default]
    Tabular,
    /// Raw rows, each an array of nullable text values.
    Array,
}

/// A cell in Postgres text representation; `None` is SQL NULL.
pub type Cell = Option<String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum DebugOutput {
    Tabular(String),
    Array(Vec<Vec<Option<String>>>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DebugResult {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    pub result: Option<DebugOutput>,
    pub error: Option<String>,
}

impl DebugResult {
    pub fn failed(name: &str, error: String) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            rows_affected: None,
            result: None,
            error: Some(error),
        }
    }
}

/// What a single inspected statement produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<Cell>>,
    },
    Command {
        rows_affected: u64,
    },
}

impl Execution {
    pub fn into_result(self, name: &str, format: DebugFormat) -> DebugResult {
        let (columns, rows_affected, result) = match self {
            Execution::Rows { columns, rows } => {
                let output = match format {
                    DebugFormat::Tabular => DebugOutput::Tabular(render_table(&columns, &rows)),
                    DebugFormat::Array => DebugOutput::Array(rows),
                };
                (columns, None, output)
            }
            Execution::Command { rows_affected } => {
                let output = match format {
                    DebugFormat::Tabular => DebugOutput::Tabular(format!(
                        "({} {} affected)",
                        rows_affected,
                        plural(rows_affected, "row", "rows")
                    )),
                    DebugFormat::Array => DebugOutput::Array(Vec::new()),
                };
                (Vec::new(), Some(rows_affected), output)
            }
        };
        DebugResult {
            name: name.to_string(),
            columns,
            rows_affected,
            result: Some(result),
            error: None,
        }
    }
}

fn plural<'a>(n: u64, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 {
        one
    } else {
        many
    }
}

/// Renders rows the way `psql` prints an aligned result:
///
/// ```text
///  id | name
/// ----+-------
///  1  | alpha
/// (1 row)
/// ```
///
/// NULL renders as an empty cell.
pub fn render_table(columns: &[String], rows: &[Vec<Cell>]) -> String {
    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            let len = cell.as_deref().map(|c| c.chars().count()).unwrap_or(0);
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(len);
            }
        }
    }

    let line = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| {
                let pad = width.saturating_sub(cell.chars().count());
                format!(" {}{} ", cell, " ".repeat(pad))
            })
            .collect::<Vec<_>>()
            .join("|")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    out.push_str(&line(columns.iter().map(String::as_str).collect()));
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+"),
    );
    out.push('\n');
    for row in rows {
        out.push_str(&line(
            row.iter().map(|c| c.as_deref().unwrap_or("")).collect(),
        ));
        out.push('\n');
    }
    out.push_str(&format!(
        "({} {})",
        rows.len(),
        plural(rows.len() as u64, "row", "rows")
    ));
    out
}
