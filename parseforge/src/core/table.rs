//! In-memory tables with typed cells and strict structural comparison.
//!
//! Expected fixtures and candidate output both arrive as CSV text and are
//! parsed with the same type-inference rules, so comparisons are always
//! like-for-like. Equality is intentionally exact: no tolerance, no fuzzy
//! matching, and a numeric cell never equals its string rendering.

use anyhow::{Result, bail};
use serde::{Serialize, Serializer};

/// How many mismatched cells a diff enumerates before cutting off.
pub const MAX_CELL_MISMATCHES: usize = 5;

/// A single typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    Empty,
}

impl Value {
    /// Infer a typed value from a raw CSV field.
    pub fn infer(raw: &str) -> Value {
        if raw.is_empty() {
            return Value::Empty;
        }
        if let Ok(v) = raw.parse::<i64>() {
            return Value::Int(v);
        }
        if let Ok(v) = raw.parse::<f64>() {
            return Value::Float(v);
        }
        Value::Text(raw.to_string())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Float(_) => "number",
            Value::Text(_) => "text",
            Value::Empty => "empty",
        }
    }

    /// Render the value with its type for diff messages, e.g. `text "5"` vs `integer 5`.
    pub fn render(&self) -> String {
        match self {
            Value::Int(v) => format!("integer {v}"),
            Value::Float(v) => format!("number {v}"),
            Value::Text(v) => format!("text {v:?}"),
            Value::Empty => "empty".to_string(),
        }
    }

    fn render_csv(&self) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Text(v) => {
                if v.contains([',', '"', '\n']) {
                    format!("\"{}\"", v.replace('"', "\"\""))
                } else {
                    v.clone()
                }
            }
            Value::Empty => String::new(),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Text(v) => serializer.serialize_str(v),
            Value::Empty => serializer.serialize_unit(),
        }
    }
}

/// A structured table: named columns plus typed rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Parse CSV text into a table. The first record is the header.
    ///
    /// Handles quoted fields, escaped quotes, and CRLF line endings. Ragged
    /// records are rejected rather than padded.
    pub fn from_csv(input: &str) -> Result<Table> {
        let records = parse_records(input)?;
        let mut iter = records.into_iter();
        let Some(columns) = iter.next() else {
            bail!("csv input has no header record");
        };
        let mut rows = Vec::new();
        for (idx, record) in iter.enumerate() {
            if record.len() != columns.len() {
                bail!(
                    "csv record {} has {} fields, expected {}",
                    idx + 2,
                    record.len(),
                    columns.len()
                );
            }
            rows.push(record.iter().map(|raw| Value::infer(raw)).collect());
        }
        Ok(Table { columns, rows })
    }

    /// One-line schema description fed to the planning prompt:
    /// column names with inferred types, plus a row-count hint.
    pub fn schema_summary(&self) -> String {
        let cols: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| format!("{name} ({})", self.column_type(idx)))
            .collect();
        format!("columns: [{}]; {} rows", cols.join(", "), self.rows.len())
    }

    /// Inferred type of a column: the type of its first non-empty cell.
    fn column_type(&self, idx: usize) -> &'static str {
        self.rows
            .iter()
            .filter_map(|row| row.get(idx))
            .find(|cell| !matches!(cell, Value::Empty))
            .map(Value::type_name)
            .unwrap_or("text")
    }

    /// Render the header and the first `limit` rows as CSV for prompt context.
    pub fn sample_csv(&self, limit: usize) -> String {
        let mut out = String::new();
        out.push_str(&self.columns.join(","));
        out.push('\n');
        for row in self.rows.iter().take(limit) {
            let fields: Vec<String> = row.iter().map(Value::render_csv).collect();
            out.push_str(&fields.join(","));
            out.push('\n');
        }
        out
    }
}

/// Column-, row-, and cell-level differences between two tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDiff {
    /// Expected columns absent from the produced table.
    pub missing_columns: Vec<String>,
    /// Produced columns absent from the expected table.
    pub unexpected_columns: Vec<String>,
    /// Same column set but in a different order.
    pub column_order_differs: bool,
    pub expected_rows: usize,
    pub produced_rows: usize,
    /// First [`MAX_CELL_MISMATCHES`] differing cells with expected/actual pairs.
    pub cell_mismatches: Vec<CellMismatch>,
}

/// One differing cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellMismatch {
    /// Zero-based data row index (header excluded).
    pub row: usize,
    pub column: String,
    pub expected: String,
    pub actual: String,
}

impl TableDiff {
    fn is_empty(&self) -> bool {
        self.missing_columns.is_empty()
            && self.unexpected_columns.is_empty()
            && !self.column_order_differs
            && self.expected_rows == self.produced_rows
            && self.cell_mismatches.is_empty()
    }

    /// Human-readable diagnostic enumerating every recorded difference.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        if !self.missing_columns.is_empty() {
            lines.push(format!(
                "missing columns: [{}]",
                self.missing_columns.join(", ")
            ));
        }
        if !self.unexpected_columns.is_empty() {
            lines.push(format!(
                "unexpected columns: [{}]",
                self.unexpected_columns.join(", ")
            ));
        }
        if self.column_order_differs {
            lines.push("columns are present but in the wrong order".to_string());
        }
        if self.expected_rows != self.produced_rows {
            lines.push(format!(
                "row count mismatch: expected {}, got {}",
                self.expected_rows, self.produced_rows
            ));
        }
        for mismatch in &self.cell_mismatches {
            lines.push(format!(
                "row {} column '{}': expected {}, got {}",
                mismatch.row, mismatch.column, mismatch.expected, mismatch.actual
            ));
        }
        lines.join("\n")
    }
}

/// Compare a produced table against the expected one.
///
/// Returns `None` on an exact match (same column names in the same order,
/// same row count, same typed cell values). Cell comparison only runs when
/// the columns already match exactly; a column-level difference is reported
/// on its own.
pub fn compare(expected: &Table, produced: &Table) -> Option<TableDiff> {
    let missing_columns: Vec<String> = expected
        .columns
        .iter()
        .filter(|c| !produced.columns.contains(c))
        .cloned()
        .collect();
    let unexpected_columns: Vec<String> = produced
        .columns
        .iter()
        .filter(|c| !expected.columns.contains(c))
        .cloned()
        .collect();
    let same_set = missing_columns.is_empty() && unexpected_columns.is_empty();
    let columns_equal = expected.columns == produced.columns;

    let mut diff = TableDiff {
        missing_columns,
        unexpected_columns,
        column_order_differs: same_set && !columns_equal,
        expected_rows: expected.rows.len(),
        produced_rows: produced.rows.len(),
        cell_mismatches: Vec::new(),
    };

    if columns_equal {
        'rows: for (row_idx, (exp_row, got_row)) in
            expected.rows.iter().zip(&produced.rows).enumerate()
        {
            for (col_idx, (exp, got)) in exp_row.iter().zip(got_row).enumerate() {
                if exp != got {
                    diff.cell_mismatches.push(CellMismatch {
                        row: row_idx,
                        column: expected.columns[col_idx].clone(),
                        expected: exp.render(),
                        actual: got.render(),
                    });
                    if diff.cell_mismatches.len() >= MAX_CELL_MISMATCHES {
                        break 'rows;
                    }
                }
            }
        }
    }

    if diff.is_empty() { None } else { Some(diff) }
}

fn parse_records(input: &str) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }
    if in_quotes {
        bail!("csv input ends inside a quoted field");
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    // A trailing blank line parses as a final single-empty-field record;
    // drop only that one. Interior blank lines stay as records so ragged
    // input is rejected and single-column empty rows survive.
    if records
        .last()
        .is_some_and(|r| r.len() == 1 && r[0].is_empty())
    {
        records.pop();
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        Table {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| Value::infer(cell)).collect())
                .collect(),
        }
    }

    #[test]
    fn parses_quoted_fields_and_crlf() {
        let csv = "date,description,amount\r\n01-02-2024,\"coffee, beans\",4.50\r\n";
        let parsed = Table::from_csv(csv).expect("parse");
        assert_eq!(parsed.columns, vec!["date", "description", "amount"]);
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(
            parsed.rows[0][1],
            Value::Text("coffee, beans".to_string())
        );
        assert_eq!(parsed.rows[0][2], Value::Float(4.5));
    }

    #[test]
    fn parses_escaped_quotes() {
        let parsed = Table::from_csv("note\n\"say \"\"hi\"\"\"\n").expect("parse");
        assert_eq!(parsed.rows[0][0], Value::Text("say \"hi\"".to_string()));
    }

    #[test]
    fn trailing_blank_line_is_dropped_but_interior_empty_rows_survive() {
        let parsed = Table::from_csv("a\n1\n\n2\n").expect("parse");
        assert_eq!(parsed.rows.len(), 3);
        assert_eq!(parsed.rows[1][0], Value::Empty);

        let parsed = Table::from_csv("a\n1\n\n").expect("parse");
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0][0], Value::Int(1));
    }

    #[test]
    fn rejects_ragged_records() {
        let err = Table::from_csv("a,b\n1,2,3\n").unwrap_err();
        assert!(err.to_string().contains("record 2"));
    }

    #[test]
    fn rejects_unterminated_quote() {
        let err = Table::from_csv("a\n\"open\n").unwrap_err();
        assert!(err.to_string().contains("quoted field"));
    }

    #[test]
    fn type_inference_distinguishes_numeric_from_text() {
        assert_eq!(Value::infer("5"), Value::Int(5));
        assert_eq!(Value::infer("5.0"), Value::Float(5.0));
        assert_eq!(Value::infer("05x"), Value::Text("05x".to_string()));
        assert_eq!(Value::infer(""), Value::Empty);
        // Type-sensitive equality: a number never equals its text rendering.
        assert_ne!(Value::Int(5), Value::Text("5".to_string()));
        assert_ne!(Value::Int(5), Value::Float(5.0));
    }

    #[test]
    fn equal_tables_produce_no_diff() {
        let expected = table(&["date", "amount"], &[&["01-02-2024", "4.50"]]);
        let produced = table(&["date", "amount"], &[&["01-02-2024", "4.50"]]);
        assert_eq!(compare(&expected, &produced), None);
    }

    #[test]
    fn extra_column_is_a_structural_diff() {
        let expected = table(&["date", "amount"], &[]);
        let produced = table(&["date", "amount", "balance"], &[]);
        let diff = compare(&expected, &produced).expect("diff");
        assert_eq!(diff.unexpected_columns, vec!["balance"]);
        assert!(diff.summary().contains("unexpected columns"));
    }

    #[test]
    fn reordered_columns_are_a_structural_diff() {
        let expected = table(&["date", "amount"], &[]);
        let produced = table(&["amount", "date"], &[]);
        let diff = compare(&expected, &produced).expect("diff");
        assert!(diff.column_order_differs);
        assert!(diff.missing_columns.is_empty());
        assert!(diff.summary().contains("wrong order"));
    }

    #[test]
    fn row_count_mismatch_is_a_structural_diff() {
        let expected = table(&["a"], &[&["1"], &["2"]]);
        let produced = table(&["a"], &[&["1"]]);
        let diff = compare(&expected, &produced).expect("diff");
        assert_eq!(diff.expected_rows, 2);
        assert_eq!(diff.produced_rows, 1);
    }

    #[test]
    fn single_cell_difference_is_reported_with_both_values() {
        let expected = table(&["a", "b"], &[&["1", "x"]]);
        let produced = table(&["a", "b"], &[&["1", "y"]]);
        let diff = compare(&expected, &produced).expect("diff");
        assert_eq!(diff.cell_mismatches.len(), 1);
        let mismatch = &diff.cell_mismatches[0];
        assert_eq!(mismatch.column, "b");
        assert!(mismatch.expected.contains("\"x\""));
        assert!(mismatch.actual.contains("\"y\""));
    }

    #[test]
    fn cell_mismatches_are_capped() {
        let expected = table(&["a"], &[&["1"], &["2"], &["3"], &["4"], &["5"], &["6"], &["7"]]);
        let produced = table(&["a"], &[&["9"], &["9"], &["9"], &["9"], &["9"], &["9"], &["9"]]);
        let diff = compare(&expected, &produced).expect("diff");
        assert_eq!(diff.cell_mismatches.len(), MAX_CELL_MISMATCHES);
    }

    #[test]
    fn typed_cell_comparison_rejects_stringified_numbers() {
        let expected = table(&["amount"], &[&["100"]]);
        let produced = Table {
            columns: vec!["amount".to_string()],
            rows: vec![vec![Value::Text("100".to_string())]],
        };
        assert!(compare(&expected, &produced).is_some());
    }

    #[test]
    fn schema_summary_names_columns_types_and_rows() {
        let t = table(&["date", "amount"], &[&["01-02-2024", "4.50"]]);
        let summary = t.schema_summary();
        assert!(summary.contains("date (text)"));
        assert!(summary.contains("amount (number)"));
        assert!(summary.contains("1 rows"));
    }

    #[test]
    fn sample_csv_limits_rows_and_quotes_fields() {
        let t = table(&["a", "b"], &[&["1", "x,y"], &["2", "z"]]);
        let sample = t.sample_csv(1);
        assert_eq!(sample, "a,b\n1,\"x,y\"\n");
    }
}
