//! Full-row buffers for bulk selects and content-compare payloads.

use std::cmp::Ordering;

use sqlx::mysql::MySqlRow;
use sqlx::Column as _;
use sqlx::Row as SqlxRow;

use crate::core::value::{Field, TypeTag};

/// One fetched row: an ordered sequence of fields whose length equals the
/// column count, plus one trailing hash field when a content check rides
/// along.
#[derive(Debug, Clone)]
pub struct Row {
    fields: Vec<Field>,
    has_check: bool,
}

impl Row {
    /// Decode a driver row under the declared tags. With `has_check` the row
    /// carries one extra trailing text field (the content hash).
    pub fn from_row(row: &MySqlRow, tags: &[TypeTag], has_check: bool) -> sqlx::Result<Row> {
        let mut fields = Vec::with_capacity(tags.len() + usize::from(has_check));
        for (i, tag) in tags.iter().enumerate() {
            fields.push(Field::read(row, i, *tag)?);
        }
        if has_check {
            fields.push(Field::read(row, tags.len(), TypeTag::Text)?);
        }
        Ok(Row { fields, has_check })
    }

    pub fn from_fields(fields: Vec<Field>, has_check: bool) -> Row {
        Row { fields, has_check }
    }

    /// Total field count, including the check tail when present.
    pub fn width(&self) -> usize {
        self.fields.len()
    }

    /// Field count without the check tail.
    pub fn data_width(&self) -> usize {
        self.fields.len() - usize::from(self.has_check)
    }

    pub fn field(&self, index: usize) -> &Field {
        &self.fields[index]
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields[..self.data_width()]
    }

    /// The trailing content-hash field.
    pub fn check_value(&self) -> Option<&Field> {
        if self.has_check {
            self.fields.last()
        } else {
            None
        }
    }

    /// Lexicographic ordering over the non-tail prefix. `None` when widths or
    /// column tags diverge.
    pub fn compare(&self, other: &Row) -> Option<Ordering> {
        if self.width() != other.width() {
            return None;
        }
        for i in 0..self.data_width() {
            match self.fields[i].compare(&other.fields[i])? {
                Ordering::Equal => {}
                order => return Some(order),
            }
        }
        Some(Ordering::Equal)
    }

    /// Cyclically shift the first `count` fields to the end, so that in a
    /// prepared update the SET values come first and the WHERE keys last.
    pub fn rotate(&mut self, count: usize) {
        debug_assert!(count > 0 && count < self.fields.len());
        self.fields.rotate_left(count);
    }

    /// Render the row against its column names for log output.
    pub fn describe(&self, names: &[String]) -> String {
        let mut out = String::new();
        for (i, field) in self.fields[..self.data_width()].iter().enumerate() {
            let name = names.get(i).map(String::as_str).unwrap_or("");
            out.push_str(&format!("{name}[{field}] "));
        }
        if let Some(check) = self.check_value() {
            out.push_str(&format!("<{check}>"));
        }
        out.trim_end().to_string()
    }
}

/// A growable set of rows sharing one column-name vector, reused across
/// chunks via `clear`.
#[derive(Debug, Default)]
pub struct RowBatch {
    names: Vec<String>,
    rows: Vec<Row>,
    has_check: bool,
}

impl RowBatch {
    pub fn new(has_check: bool) -> RowBatch {
        RowBatch {
            names: Vec::new(),
            rows: Vec::new(),
            has_check,
        }
    }

    pub fn with_capacity(has_check: bool, capacity: usize) -> RowBatch {
        RowBatch {
            names: Vec::new(),
            rows: Vec::with_capacity(capacity),
            has_check,
        }
    }

    /// Drop all rows and the recorded column names.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.names.clear();
    }

    /// Decode and append one driver row. The first row records column names,
    /// dropping the trailing hash alias when a check tail is present.
    pub fn load_row(&mut self, row: &MySqlRow, tags: &[TypeTag]) -> sqlx::Result<()> {
        if self.rows.is_empty() {
            let keep = row.columns().len() - usize::from(self.has_check);
            self.names = row
                .columns()
                .iter()
                .take(keep)
                .map(|c| c.name().to_string())
                .collect();
        }
        self.rows.push(Row::from_row(row, tags, self.has_check)?);
        Ok(())
    }

    pub fn has_check(&self) -> bool {
        self.has_check
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn row(&self, index: usize) -> &Row {
        &self.rows[index]
    }

    pub fn row_mut(&mut self, index: usize) -> &mut Row {
        &mut self.rows[index]
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sort rows by their non-tail prefix. Bulk key-IN selects give no
    /// ordering guarantee, so content-compare batches are re-indexed this way
    /// before being paired with the sorted key window.
    pub fn sort_rows(&mut self) {
        self.rows
            .sort_by(|a, b| a.compare(b).unwrap_or(Ordering::Equal));
    }

    pub fn describe_row(&self, index: usize) -> String {
        self.rows[index].describe(&self.names)
    }

    #[cfg(test)]
    pub(crate) fn push_test_row(&mut self, row: Row) {
        self.rows.push(row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::FieldValue;

    fn int(v: i32) -> Field {
        Field::new(TypeTag::Int, FieldValue::Int(v))
    }

    fn text(v: &str) -> Field {
        Field::new(TypeTag::Text, FieldValue::Text(v.to_string()))
    }

    fn row(values: &[i32]) -> Row {
        Row::from_fields(values.iter().map(|v| int(*v)).collect(), false)
    }

    #[test]
    fn test_rotate_moves_keys_to_the_tail() {
        let mut r = row(&[1, 2, 3, 4, 5]);
        r.rotate(2);
        let rendered: Vec<String> = (0..r.width()).map(|i| r.field(i).to_string()).collect();
        assert_eq!(rendered, vec!["3", "4", "5", "1", "2"]);
    }

    #[test]
    fn test_compare_is_lexicographic() {
        assert_eq!(row(&[1, 2]).compare(&row(&[1, 3])), Some(Ordering::Less));
        assert_eq!(row(&[2, 0]).compare(&row(&[1, 9])), Some(Ordering::Greater));
        assert_eq!(row(&[1, 2]).compare(&row(&[1, 2])), Some(Ordering::Equal));
    }

    #[test]
    fn test_compare_skips_check_tail() {
        let a = Row::from_fields(vec![int(1), text("md5-a")], true);
        let b = Row::from_fields(vec![int(1), text("md5-b")], true);
        assert_eq!(a.compare(&b), Some(Ordering::Equal));
        assert_ne!(
            a.check_value().unwrap().compare(b.check_value().unwrap()),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_width_mismatch_is_unordered() {
        assert_eq!(row(&[1]).compare(&row(&[1, 2])), None);
    }

    #[test]
    fn test_batch_sort_rows() {
        let mut batch = RowBatch::new(true);
        batch.rows = vec![
            Row::from_fields(vec![int(3), text("c")], true),
            Row::from_fields(vec![int(1), text("a")], true),
            Row::from_fields(vec![int(2), text("b")], true),
        ];
        batch.sort_rows();
        let keys: Vec<String> = batch.rows().iter().map(|r| r.field(0).to_string()).collect();
        assert_eq!(keys, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_clear_resets_rows_and_names() {
        let mut batch = RowBatch::new(false);
        batch.rows = vec![row(&[1])];
        batch.names = vec!["id".to_string()];
        batch.clear();
        assert!(batch.is_empty());
        assert!(batch.column_names().is_empty());
    }

    #[test]
    fn test_describe_row() {
        let mut batch = RowBatch::new(false);
        batch.rows = vec![Row::from_fields(vec![int(1), text("a")], false)];
        batch.names = vec!["id".to_string(), "name".to_string()];
        assert_eq!(batch.describe_row(0), "id[1] name[a]");
    }
}
