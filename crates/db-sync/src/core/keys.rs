//! Columnar container for the primary-key columns of one side of one table.
//!
//! Primary-key sets for large tables dominate memory, so values live in one
//! contiguous vector per scalar type and the sort permutation carries ordering
//! without moving payload. A per-row flag bitmap is shared by the diff walk
//! (only-this-side), the content compare (needs-update) and the update pass.

use std::cmp::Ordering;
use std::time::Instant;

use sqlx::mysql::{MySql, MySqlArguments, MySqlRow};
use sqlx::query::Query;
use sqlx::Column as _;
use sqlx::Row as _;
use tracing::{debug, trace};

use crate::core::batch::Row;
use crate::core::value::{naive_from_epoch, Field, FieldValue, TypeTag, NULL_SENTINEL};

const INITIAL_RESERVE: usize = 4096;

/// One typed column vector.
#[derive(Debug)]
enum KeyColumn {
    Int(Vec<i32>),
    Long(Vec<i64>),
    ULong(Vec<u64>),
    Double(Vec<f64>),
    Date(Vec<i64>),
    Text(Vec<String>),
    Bytes(Vec<Vec<u8>>),
}

impl KeyColumn {
    fn for_tag(tag: TypeTag) -> KeyColumn {
        let mut column = match tag {
            TypeTag::Int => KeyColumn::Int(Vec::new()),
            TypeTag::Long => KeyColumn::Long(Vec::new()),
            TypeTag::ULong => KeyColumn::ULong(Vec::new()),
            TypeTag::Double => KeyColumn::Double(Vec::new()),
            TypeTag::Date => KeyColumn::Date(Vec::new()),
            TypeTag::Text | TypeTag::Xml => KeyColumn::Text(Vec::new()),
            TypeTag::Blob => KeyColumn::Bytes(Vec::new()),
        };
        column.reserve(INITIAL_RESERVE);
        column
    }

    fn reserve(&mut self, additional: usize) {
        match self {
            KeyColumn::Int(v) => v.reserve(additional),
            KeyColumn::Long(v) => v.reserve(additional),
            KeyColumn::ULong(v) => v.reserve(additional),
            KeyColumn::Double(v) => v.reserve(additional),
            KeyColumn::Date(v) => v.reserve(additional),
            KeyColumn::Text(v) => v.reserve(additional),
            KeyColumn::Bytes(v) => v.reserve(additional),
        }
    }

    fn push(&mut self, value: FieldValue) -> bool {
        match (self, value) {
            (KeyColumn::Int(v), FieldValue::Int(x)) => v.push(x),
            (KeyColumn::Long(v), FieldValue::Long(x)) => v.push(x),
            (KeyColumn::ULong(v), FieldValue::ULong(x)) => v.push(x),
            (KeyColumn::Double(v), FieldValue::Double(x)) => v.push(x),
            (KeyColumn::Date(v), FieldValue::Date { epoch, .. }) => v.push(epoch),
            (KeyColumn::Text(v), FieldValue::Text(x)) => v.push(x),
            (KeyColumn::Bytes(v), FieldValue::Bytes(x)) => v.push(x),
            _ => return false,
        }
        true
    }

    fn compare(&self, i: usize, other: &KeyColumn, j: usize) -> Option<Ordering> {
        match (self, other) {
            (KeyColumn::Int(a), KeyColumn::Int(b)) => Some(a[i].cmp(&b[j])),
            (KeyColumn::Long(a), KeyColumn::Long(b)) => Some(a[i].cmp(&b[j])),
            (KeyColumn::ULong(a), KeyColumn::ULong(b)) => Some(a[i].cmp(&b[j])),
            (KeyColumn::Double(a), KeyColumn::Double(b)) => Some(a[i].total_cmp(&b[j])),
            (KeyColumn::Date(a), KeyColumn::Date(b)) => Some(a[i].cmp(&b[j])),
            (KeyColumn::Text(a), KeyColumn::Text(b)) => Some(a[i].cmp(&b[j])),
            (KeyColumn::Bytes(a), KeyColumn::Bytes(b)) => Some(a[i].cmp(&b[j])),
            _ => None,
        }
    }

    fn value_at(&self, i: usize) -> FieldValue {
        match self {
            KeyColumn::Int(v) => FieldValue::Int(v[i]),
            KeyColumn::Long(v) => FieldValue::Long(v[i]),
            KeyColumn::ULong(v) => FieldValue::ULong(v[i]),
            KeyColumn::Double(v) => FieldValue::Double(v[i]),
            KeyColumn::Date(v) => FieldValue::Date {
                epoch: v[i],
                text: naive_from_epoch(v[i]).format("%Y-%m-%d %H:%M:%S").to_string(),
            },
            KeyColumn::Text(v) => FieldValue::Text(v[i].clone()),
            KeyColumn::Bytes(v) => FieldValue::Bytes(v[i].clone()),
        }
    }

    fn bind_to<'q>(
        &self,
        i: usize,
        query: Query<'q, MySql, MySqlArguments>,
    ) -> Query<'q, MySql, MySqlArguments> {
        match self {
            KeyColumn::Int(v) => query.bind(v[i]),
            KeyColumn::Long(v) => query.bind(v[i]),
            KeyColumn::ULong(v) => query.bind(v[i]),
            KeyColumn::Double(v) => query.bind(v[i]),
            KeyColumn::Date(v) => query.bind(naive_from_epoch(v[i])),
            KeyColumn::Text(v) => query.bind(v[i].clone()),
            KeyColumn::Bytes(v) => query.bind(v[i].clone()),
        }
    }

    fn len(&self) -> usize {
        match self {
            KeyColumn::Int(v) => v.len(),
            KeyColumn::Long(v) => v.len(),
            KeyColumn::ULong(v) => v.len(),
            KeyColumn::Double(v) => v.len(),
            KeyColumn::Date(v) => v.len(),
            KeyColumn::Text(v) => v.len(),
            KeyColumn::Bytes(v) => v.len(),
        }
    }
}

/// Primary-key table for one side of one table.
///
/// All public row indices are positions in sorted order once `sort` has run;
/// the permutation maps them to load order internally.
#[derive(Debug, Default)]
pub struct KeyTable {
    names: Vec<String>,
    tags: Vec<TypeTag>,
    columns: Vec<KeyColumn>,
    len: usize,
    perm: Vec<usize>,
    flags: Vec<bool>,
    sorted_on_load: bool,
}

impl KeyTable {
    pub fn new() -> Self {
        KeyTable {
            sorted_on_load: true,
            ..Default::default()
        }
    }

    /// Append one driver row of primary-key values.
    ///
    /// The first call records column names and allocates one typed vector per
    /// column; every call tracks whether loads remain monotonically
    /// non-decreasing so an already-sorted stream skips the sort entirely.
    pub fn load_row(&mut self, row: &MySqlRow, tags: &[TypeTag]) -> sqlx::Result<()> {
        if self.len == 0 && self.columns.is_empty() {
            self.init(
                row.columns().iter().map(|c| c.name().to_string()).collect(),
                tags,
            );
        }

        let mut values = Vec::with_capacity(tags.len());
        for (i, tag) in tags.iter().enumerate() {
            let field = Field::read(row, i, *tag)?;
            match field.value() {
                Some(value) => values.push(value.clone()),
                None => {
                    return Err(sqlx::Error::Decode(
                        format!("NULL primary key value in column `{}`", self.names[i]).into(),
                    ))
                }
            }
        }
        self.push_values(values);
        Ok(())
    }

    fn init(&mut self, names: Vec<String>, tags: &[TypeTag]) {
        self.names = names;
        self.tags = tags.to_vec();
        self.columns = tags.iter().map(|t| KeyColumn::for_tag(*t)).collect();
    }

    fn push_values(&mut self, values: Vec<FieldValue>) {
        for (column, value) in self.columns.iter_mut().zip(values) {
            let ok = column.push(value);
            debug_assert!(ok, "key value variant diverged from column vector");
        }
        self.len += 1;
        debug_assert!(self.columns.iter().all(|c| c.len() == self.len));
        if self.len > 1 && self.sorted_on_load {
            self.sorted_on_load = self
                .compare_raw(self.len - 2, self, self.len - 1)
                .map(|o| o != Ordering::Greater)
                .unwrap_or(false);
        }
    }

    /// Build the sort permutation and the flag bitmap.
    ///
    /// When the load stream was already sorted the permutation stays the
    /// identity and no comparison runs.
    pub fn sort(&mut self, label: &str) {
        let started = Instant::now();
        self.perm = (0..self.len).collect();
        self.flags = vec![false; self.len];
        if !self.sorted_on_load {
            let columns = &self.columns;
            self.perm.sort_by(|&a, &b| {
                compare_columns(columns, a, columns, b).unwrap_or(Ordering::Equal)
            });
        }
        let elapsed = started.elapsed();
        let rate = if elapsed.as_secs_f64() > 0.0 {
            self.len as f64 / elapsed.as_secs_f64()
        } else {
            self.len as f64
        };
        debug!(
            "{} sort done [keys: {}] [{:.0} keys/sec] [presorted: {}]",
            label, self.len, rate, self.sorted_on_load
        );
        #[cfg(debug_assertions)]
        for i in 1..self.len {
            debug_assert_ne!(self.compare_at(i - 1, self, i), Some(Ordering::Greater));
        }
    }

    /// Compare sorted position `i` of this table with sorted position `j` of
    /// `other`, column by column, short-circuiting on the first non-equal
    /// column. `None` means the column type tags diverge.
    pub fn compare_at(&self, i: usize, other: &KeyTable, j: usize) -> Option<Ordering> {
        compare_columns(&self.columns, self.perm[i], &other.columns, other.perm[j])
    }

    fn compare_raw(&self, i: usize, other: &KeyTable, j: usize) -> Option<Ordering> {
        compare_columns(&self.columns, i, &other.columns, j)
    }

    /// Bind the primary-key values at sorted position `i` onto the next
    /// placeholders of a query, in declaration order.
    pub fn bind_at<'q>(
        &self,
        mut query: Query<'q, MySql, MySqlArguments>,
        i: usize,
    ) -> Query<'q, MySql, MySqlArguments> {
        let raw = self.perm[i];
        for column in &self.columns {
            query = column.bind_to(raw, query);
        }
        query
    }

    pub fn set_flag(&mut self, i: usize, value: bool) {
        self.flags[i] = value;
    }

    pub fn flag(&self, i: usize) -> bool {
        self.flags[i]
    }

    /// Flip every flag; used to move from "only-this-side" to "common".
    pub fn revert_flags(&mut self) {
        for flag in &mut self.flags {
            *flag = !*flag;
        }
    }

    pub fn count_flag(&self, value: bool) -> usize {
        self.flags.iter().filter(|f| **f == value).count()
    }

    /// Sorted positions whose flag equals `value`, ascending.
    pub fn flagged(&self, value: bool) -> impl Iterator<Item = usize> + '_ {
        self.flags
            .iter()
            .enumerate()
            .filter(move |(_, f)| **f == value)
            .map(|(i, _)| i)
    }

    /// Verify that the key-typed prefix of a fetched row equals the key at
    /// sorted position `i`. Used to detect out-of-order bulk-fetch results.
    pub fn check(&self, i: usize, row: &Row) -> bool {
        if row.width() < self.columns.len() {
            return false;
        }
        let raw = self.perm[i];
        for (c, column) in self.columns.iter().enumerate() {
            let key_field = Field::new(self.tags[c], column.value_at(raw));
            match key_field.compare(row.field(c)) {
                Some(Ordering::Equal) => {}
                _ => {
                    trace!(
                        "key check failed at {}: key {} row {}",
                        i,
                        key_field,
                        row.field(c)
                    );
                    return false;
                }
            }
        }
        true
    }

    /// Human-readable rendering of the key at sorted position `i`.
    pub fn describe(&self, i: usize) -> String {
        if i >= self.len {
            return NULL_SENTINEL.to_string();
        }
        let raw = self.perm[i];
        let mut out = String::new();
        for (c, column) in self.columns.iter().enumerate() {
            let field = Field::new(self.tags[c], column.value_at(raw));
            out.push_str(&format!("{}[{}] ", self.names[c], field));
        }
        out.trim_end().to_string()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True while the load stream has stayed monotonically non-decreasing.
    pub fn sorted_on_load(&self) -> bool {
        self.sorted_on_load
    }

    #[cfg(test)]
    pub(crate) fn load_test_row(
        &mut self,
        names: &[&str],
        tags: &[TypeTag],
        values: Vec<FieldValue>,
    ) {
        if self.len == 0 && self.columns.is_empty() {
            self.init(names.iter().map(|n| n.to_string()).collect(), tags);
        }
        self.push_values(values);
    }
}

fn compare_columns(
    left: &[KeyColumn],
    i: usize,
    right: &[KeyColumn],
    j: usize,
) -> Option<Ordering> {
    if left.len() != right.len() {
        return None;
    }
    for (a, b) in left.iter().zip(right.iter()) {
        match a.compare(i, b, j)? {
            Ordering::Equal => {}
            other => return Some(other),
        }
    }
    Some(Ordering::Equal)
}
