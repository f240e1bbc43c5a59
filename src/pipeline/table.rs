//! Table detection from positioned text (stream mode).
//!
//! No ruling lines are needed: rows are text runs sharing a baseline, and
//! columns are x positions where text starts in most of those rows. A run of
//! at least two consecutive multi-span rows that align to the same two or more
//! columns is a table. Cells are rectangular by construction: a row missing a
//! column gets an empty cell.

use crate::error::PageError;
use crate::output::Table;
use crate::pipeline::source::TextSpan;
use crate::pipeline::Extraction;
use std::cmp::Ordering;
use tracing::debug;

/// Extract the page's tables. On failure returns no tables plus a
/// [`PageError::TableFailed`] entry, so "no tables" and "could not look"
/// stay distinguishable.
pub fn extract_tables(spans: Result<Vec<TextSpan>, String>, index: usize) -> Extraction<Vec<Table>> {
    match spans {
        Ok(spans) => {
            let tables = TableDetector::default().detect(&spans);
            debug!("Page {}: {} tables detected", index + 1, tables.len());
            Extraction::ok(tables)
        }
        Err(detail) => Extraction::failed(
            Vec::new(),
            PageError::TableFailed {
                page: index + 1,
                detail,
            },
        ),
    }
}

/// Detector thresholds, in PDF points where relevant.
#[derive(Debug, Clone)]
pub struct TableDetectorConfig {
    pub min_rows: usize,
    pub min_columns: usize,
    /// Above this, the "table" is more likely word-level splitting of prose.
    pub max_columns: usize,
    /// Fraction of a span's height two baselines may differ by and share a row.
    pub row_tolerance_factor: f32,
    /// Horizontal distance within which span starts count as aligned.
    pub column_tolerance: f32,
    /// Fraction of region rows a column start must appear in.
    pub min_column_support: f32,
    /// Fraction of a row's spans that must start on a column.
    pub min_alignment_ratio: f32,
}

impl Default for TableDetectorConfig {
    fn default() -> Self {
        Self {
            min_rows: 2,
            min_columns: 2,
            max_columns: 12,
            row_tolerance_factor: 0.5,
            column_tolerance: 5.0,
            min_column_support: 0.5,
            min_alignment_ratio: 0.8,
        }
    }
}

#[derive(Debug, Default)]
pub struct TableDetector {
    config: TableDetectorConfig,
}

#[derive(Debug)]
struct Row {
    spans: Vec<TextSpan>,
}

impl TableDetector {
    pub fn with_config(config: TableDetectorConfig) -> Self {
        Self { config }
    }

    /// Detect tables, top of the page first.
    pub fn detect(&self, spans: &[TextSpan]) -> Vec<Table> {
        let rows = self.group_into_rows(spans);
        let mut tables = Vec::new();

        let mut start = 0;
        while start < rows.len() {
            if rows[start].spans.len() < 2 {
                start += 1;
                continue;
            }
            let mut end = start;
            while end + 1 < rows.len() && rows[end + 1].spans.len() >= 2 {
                end += 1;
            }
            tables.extend(self.detect_in_region(&rows[start..=end]));
            start = end + 1;
        }

        tables
    }

    fn detect_in_region(&self, rows: &[Row]) -> Vec<Table> {
        if rows.len() < self.config.min_rows {
            return Vec::new();
        }

        let columns = self.detect_columns(rows);
        if columns.len() < self.config.min_columns || columns.len() > self.config.max_columns {
            return Vec::new();
        }

        // Split the region wherever a row does not fit the columns.
        let mut tables = Vec::new();
        let mut current: Vec<&Row> = Vec::new();
        for row in rows {
            if self.alignment_score(row, &columns) >= self.config.min_alignment_ratio {
                current.push(row);
            } else {
                self.flush(&mut current, &columns, &mut tables);
            }
        }
        self.flush(&mut current, &columns, &mut tables);
        tables
    }

    fn flush(&self, rows: &mut Vec<&Row>, columns: &[f32], tables: &mut Vec<Table>) {
        if rows.len() >= self.config.min_rows && !is_list_pattern(rows, columns) {
            let table: Table = rows.iter().map(|row| self.to_cells(row, columns)).collect();
            if table.iter().filter(|r| r.iter().filter(|c| !c.is_empty()).count() >= 2).count()
                >= self.config.min_rows
            {
                tables.push(table);
            }
        }
        rows.clear();
    }

    /// Group spans into rows, top to bottom, each row sorted left to right.
    fn group_into_rows(&self, spans: &[TextSpan]) -> Vec<Row> {
        let mut sorted: Vec<TextSpan> = spans
            .iter()
            .filter(|s| !s.text.trim().is_empty())
            .cloned()
            .collect();
        sorted.sort_by(|a, b| {
            b.y.partial_cmp(&a.y)
                .unwrap_or(Ordering::Equal)
                .then(a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal))
        });

        let mut rows: Vec<Row> = Vec::new();
        let mut row_y: Option<f32> = None;
        for span in sorted {
            let tolerance = (span.height * self.config.row_tolerance_factor).max(2.0);
            match (row_y, rows.last_mut()) {
                (Some(y), Some(row)) if (span.y - y).abs() <= tolerance => row.spans.push(span),
                _ => {
                    row_y = Some(span.y);
                    rows.push(Row { spans: vec![span] });
                }
            }
        }

        for row in &mut rows {
            row.spans
                .sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal));
        }
        rows
    }

    /// Cluster span start positions; keep clusters present in enough rows.
    fn detect_columns(&self, rows: &[Row]) -> Vec<f32> {
        let mut starts: Vec<(f32, usize)> = rows
            .iter()
            .enumerate()
            .flat_map(|(i, row)| row.spans.iter().map(move |s| (s.x, i)))
            .collect();
        starts.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        let min_rows =
            ((rows.len() as f32 * self.config.min_column_support).ceil() as usize).max(2);

        let mut columns = Vec::new();
        let mut cluster: Vec<(f32, usize)> = Vec::new();
        for start in starts {
            let joins = cluster
                .last()
                .map(|last| start.0 - last.0 <= self.config.column_tolerance)
                .unwrap_or(true);
            if !joins {
                push_cluster(&cluster, min_rows, &mut columns);
                cluster.clear();
            }
            cluster.push(start);
        }
        push_cluster(&cluster, min_rows, &mut columns);
        columns
    }

    fn alignment_score(&self, row: &Row, columns: &[f32]) -> f32 {
        if row.spans.is_empty() {
            return 0.0;
        }
        let aligned = row
            .spans
            .iter()
            .filter(|s| {
                columns
                    .iter()
                    .any(|c| (s.x - c).abs() <= self.config.column_tolerance)
            })
            .count();
        aligned as f32 / row.spans.len() as f32
    }

    fn to_cells(&self, row: &Row, columns: &[f32]) -> Vec<String> {
        let mut cells = vec![String::new(); columns.len()];
        for span in &row.spans {
            let col = columns
                .iter()
                .rposition(|c| *c <= span.x + self.config.column_tolerance)
                .unwrap_or(0);
            let cell = &mut cells[col];
            if !cell.is_empty() {
                cell.push(' ');
            }
            cell.push_str(span.text.trim());
        }
        cells
    }
}

fn push_cluster(cluster: &[(f32, usize)], min_rows: usize, columns: &mut Vec<f32>) {
    let mut row_ids: Vec<usize> = cluster.iter().map(|(_, r)| *r).collect();
    row_ids.sort_unstable();
    row_ids.dedup();
    if row_ids.len() >= min_rows {
        if let Some((x, _)) = cluster.first() {
            columns.push(*x);
        }
    }
}

/// Two columns where the first is only bullets or ordinals is a list.
fn is_list_pattern(rows: &[&Row], columns: &[f32]) -> bool {
    if columns.len() != 2 {
        return false;
    }
    rows.iter().all(|row| {
        row.spans
            .first()
            .map(|s| is_list_marker(s.text.trim()))
            .unwrap_or(false)
    })
}

fn is_list_marker(text: &str) -> bool {
    if matches!(text, "•" | "◦" | "▪" | "-" | "–" | "*" | "·") {
        return true;
    }
    let body = text
        .strip_suffix('.')
        .or_else(|| text.strip_suffix(')'))
        .unwrap_or("");
    !body.is_empty()
        && body.len() <= 3
        && (body.chars().all(|c| c.is_ascii_digit())
            || body.chars().all(|c| c.is_ascii_alphabetic()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(text: &str, x: f32, y: f32) -> TextSpan {
        TextSpan::new(text, x, y, 8.0 * text.len() as f32, 10.0)
    }

    #[test]
    fn detects_two_by_two_table() {
        let spans = vec![
            span("a", 72.0, 700.0),
            span("b", 200.0, 700.4),
            span("c", 72.3, 680.0),
            span("d", 199.8, 680.0),
        ];
        let tables = TableDetector::default().detect(&spans);
        assert_eq!(
            tables,
            vec![vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["c".to_string(), "d".to_string()],
            ]]
        );
    }

    #[test]
    fn unreadable_positions_are_recorded() {
        let out = extract_tables(Err("no text page".into()), 1);
        assert!(out.value.is_empty());
        assert_eq!(
            out.failures,
            vec![PageError::TableFailed {
                page: 2,
                detail: "no text page".into()
            }]
        );
    }

    #[test]
    fn prose_is_not_a_table() {
        let spans = vec![
            span("The quick brown fox", 72.0, 700.0),
            span("jumps over the lazy dog.", 72.0, 686.0),
            span("Another paragraph line", 72.0, 672.0),
        ];
        assert!(TableDetector::default().detect(&spans).is_empty());
    }

    #[test]
    fn short_rows_are_padded() {
        let spans = vec![
            span("Name", 72.0, 700.0),
            span("Qty", 200.0, 700.0),
            span("Price", 300.0, 700.0),
            span("Apple", 72.0, 685.0),
            span("3", 200.0, 685.0),
            span("1.20", 300.0, 685.0),
            span("Pear", 72.0, 670.0),
            span("0.90", 300.0, 670.0),
        ];
        let tables = TableDetector::default().detect(&spans);
        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(table.len(), 3);
        assert!(table.iter().all(|row| row.len() == 3));
        assert_eq!(table[2], vec!["Pear".to_string(), String::new(), "0.90".to_string()]);
    }

    #[test]
    fn numbered_list_is_not_a_table() {
        let spans = vec![
            span("1.", 72.0, 700.0),
            span("First item", 90.0, 700.0),
            span("2.", 72.0, 686.0),
            span("Second item", 90.0, 686.0),
            span("3.", 72.0, 672.0),
            span("Third item", 90.0, 672.0),
        ];
        assert!(TableDetector::default().detect(&spans).is_empty());
    }

    #[test]
    fn prose_between_tables_splits_them() {
        let spans = vec![
            span("a", 72.0, 700.0),
            span("b", 200.0, 700.0),
            span("c", 72.0, 685.0),
            span("d", 200.0, 685.0),
            span("A sentence that interrupts.", 72.0, 660.0),
            span("e", 72.0, 640.0),
            span("f", 200.0, 640.0),
            span("g", 72.0, 625.0),
            span("h", 200.0, 625.0),
        ];
        let tables = TableDetector::default().detect(&spans);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[1][0], vec!["e".to_string(), "f".to_string()]);
    }

    #[test]
    fn list_markers() {
        assert!(is_list_marker("•"));
        assert!(is_list_marker("12."));
        assert!(is_list_marker("b)"));
        assert!(!is_list_marker("Apple"));
        assert!(!is_list_marker("1.20"));
    }
}
