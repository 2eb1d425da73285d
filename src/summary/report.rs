//! Summary report types and terminal formatting.
//!
//! Reports render as text through `Display` or serialize to JSON.

use serde::Serialize;
use std::fmt;

use crate::dataset::DatasetKind;

/// The result of summarizing a dataset.
#[derive(Clone, Debug, Serialize)]
pub struct SummaryReport {
    pub kind: DatasetKind,
    /// Number of records (images).
    pub records: usize,
    /// Number of labels across all records.
    pub labels: usize,
    /// Records carrying at least one label.
    pub labelled_records: usize,
    /// Distinct class ids referenced by any label slot.
    pub distinct_classes: usize,
    /// Largest class id referenced, 0 for an empty dataset.
    pub max_class_id: u32,
    /// Entries in the label table.
    pub label_table_len: usize,
    /// Per-class usage, sorted by class id.
    pub classes: Vec<ClassCount>,
    /// Display-only option for histogram rendering width.
    #[serde(skip)]
    pub(crate) bar_width: usize,
}

/// How often one class id is referenced.
///
/// Relationship labels count each of their subject, object and predicate slots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClassCount {
    pub class_id: u32,
    pub name: String,
    pub count: usize,
}

impl fmt::Display for SummaryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "┌─ Summary ─────────────────────────────────────────────────┐")?;
        writeln!(f, "│   Kind:          {:<41}│", self.kind.as_str())?;
        writeln!(f, "│   Images:        {:<41}│", format_number(self.records))?;
        writeln!(
            f,
            "│   Labelled:      {:<41}│",
            format!(
                "{} ({})",
                format_number(self.labelled_records),
                fmt_percent(self.labelled_records, self.records)
            )
        )?;
        writeln!(f, "│   Labels:        {:<41}│", format_number(self.labels))?;
        writeln!(
            f,
            "│   Classes:       {:<41}│",
            format!(
                "{} used of {}",
                format_number(self.distinct_classes),
                format_number(self.label_table_len)
            )
        )?;
        writeln!(f, "│   Max class id:  {:<41}│", self.max_class_id)?;
        writeln!(f, "└───────────────────────────────────────────────────────────┘")?;
        writeln!(f)?;

        writeln!(f, "Class distribution:")?;
        if self.classes.is_empty() {
            writeln!(f, "    No labels found.")?;
            return Ok(());
        }
        let max_count = self.classes.iter().map(|c| c.count).max().unwrap_or(1);
        for class in &self.classes {
            writeln!(
                f,
                "    {:>5}  {:<16} {:>8}  {}",
                class.class_id,
                truncate_label(&class.name, 16),
                format_number(class.count),
                render_bar(class.count, max_count, self.bar_width)
            )?;
        }
        Ok(())
    }
}

/// Format a number with thousands separators.
fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

fn fmt_percent(numerator: usize, denominator: usize) -> String {
    if denominator == 0 {
        "n/a".to_string()
    } else {
        format!("{:.1}%", (numerator as f64 / denominator as f64) * 100.0)
    }
}

/// Render a horizontal bar using Unicode block characters.
fn render_bar(count: usize, max_count: usize, width: usize) -> String {
    if max_count == 0 || width == 0 {
        return String::new();
    }

    let filled = ((count * width) / max_count).min(width);
    "█".repeat(filled) + &"░".repeat(width - filled)
}

fn truncate_label(label: &str, max_len: usize) -> String {
    if label.chars().count() <= max_len {
        label.to_string()
    } else {
        let head: String = label.chars().take(max_len - 1).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(1234), "1,234");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_fmt_percent() {
        assert_eq!(fmt_percent(0, 0), "n/a");
        assert_eq!(fmt_percent(1, 3), "33.3%");
    }

    #[test]
    fn test_render_bar() {
        assert_eq!(render_bar(5, 10, 10), "█████░░░░░");
        assert_eq!(render_bar(0, 10, 4), "░░░░");
        assert_eq!(render_bar(1, 0, 4), "");
    }

    #[test]
    fn test_truncate_label() {
        assert_eq!(truncate_label("short", 10), "short");
        assert_eq!(truncate_label("verylonglabel", 10), "verylongl…");
        assert_eq!(truncate_label("ééééééééééé", 5), "éééé…");
    }
}
