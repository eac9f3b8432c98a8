//! Typed scalar values with a total order per type and null handling.
//!
//! Every value read from a driver row carries the scalar tag declared by the
//! column metadata. Ordering is three-valued: `Some(Less | Equal | Greater)`
//! for comparable fields, `None` for a type-tag mismatch, which callers treat
//! as a hard error.

use std::borrow::Cow;
use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::mysql::{MySql, MySqlArguments, MySqlRow};
use sqlx::query::Query;
use sqlx::{Row as _, ValueRef};

/// Sentinel rendered for NULL values in log output and inside the server-side
/// hash payload.
pub const NULL_SENTINEL: &str = "\u{2205}";

/// Canonical format for the date/time string representation.
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Scalar type tag, derived from the column type reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// 32-bit integers (tinyint, smallint, mediumint, int, year).
    Int,
    /// 64-bit integers (bigint, unsigned int).
    Long,
    /// Unsigned 64-bit integers (bigint unsigned, bit).
    ULong,
    /// Floating point and decimals (float, double, decimal).
    Double,
    /// Temporal columns (date, datetime, timestamp), carried as epoch seconds
    /// plus the canonical string form.
    Date,
    /// Character data (char, varchar, text, enum, set, time).
    Text,
    /// Binary data (binary, varbinary, blob).
    Blob,
    /// Document columns (json).
    Xml,
}

impl TypeTag {
    /// Map a server column type to its scalar tag.
    ///
    /// The input is the `COLUMN_TYPE` form (e.g. "bigint unsigned",
    /// "varchar(64)"), so signedness is visible here.
    pub fn from_sql_type(sql_type: &str) -> TypeTag {
        let normalized = sql_type.to_ascii_lowercase();
        let unsigned = normalized.contains("unsigned");
        let base = normalized
            .split(|c: char| c == '(' || c == ' ')
            .next()
            .unwrap_or("");

        match base {
            "tinyint" | "smallint" | "mediumint" | "year" => TypeTag::Int,
            "int" | "integer" => {
                if unsigned {
                    TypeTag::Long
                } else {
                    TypeTag::Int
                }
            }
            "bigint" => {
                if unsigned {
                    TypeTag::ULong
                } else {
                    TypeTag::Long
                }
            }
            "bit" => TypeTag::ULong,
            "float" | "double" | "real" | "decimal" | "numeric" => TypeTag::Double,
            "date" | "datetime" | "timestamp" => TypeTag::Date,
            "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" => {
                TypeTag::Blob
            }
            "json" => TypeTag::Xml,
            _ => TypeTag::Text,
        }
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TypeTag::Int => "int",
            TypeTag::Long => "long",
            TypeTag::ULong => "ulong",
            TypeTag::Double => "double",
            TypeTag::Date => "date",
            TypeTag::Text => "text",
            TypeTag::Blob => "blob",
            TypeTag::Xml => "xml",
        };
        f.write_str(name)
    }
}

/// Concrete non-null payload of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i32),
    Long(i64),
    ULong(u64),
    Double(f64),
    /// Epoch seconds plus the canonical `YYYY-MM-DD HH:MM:SS` form.
    Date { epoch: i64, text: String },
    Text(String),
    Bytes(Vec<u8>),
}

/// Immutable typed scalar: tag, null flag, value.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    tag: TypeTag,
    value: Option<FieldValue>,
}

impl Field {
    /// Construct a NULL field of the given tag.
    pub fn null(tag: TypeTag) -> Self {
        Field { tag, value: None }
    }

    /// Construct a non-null field. The caller is responsible for matching the
    /// payload variant to the tag; `read` is the normal entry point.
    pub fn new(tag: TypeTag, value: FieldValue) -> Self {
        Field {
            tag,
            value: Some(value),
        }
    }

    /// Read the field at `index` from a driver row under the declared tag.
    pub fn read(row: &MySqlRow, index: usize, tag: TypeTag) -> sqlx::Result<Field> {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(Field::null(tag));
        }

        let value = match tag {
            TypeTag::Int => FieldValue::Int(decode_int(row, index)?),
            TypeTag::Long => FieldValue::Long(decode_long(row, index)?),
            TypeTag::ULong => FieldValue::ULong(decode_ulong(row, index)?),
            TypeTag::Double => FieldValue::Double(decode_double(row, index)?),
            TypeTag::Date => {
                let dt = decode_datetime(row, index)?;
                FieldValue::Date {
                    epoch: dt.and_utc().timestamp(),
                    text: dt.format(DATE_FORMAT).to_string(),
                }
            }
            TypeTag::Text | TypeTag::Xml => FieldValue::Text(decode_text(row, index)?),
            TypeTag::Blob => FieldValue::Bytes(row.try_get::<Vec<u8>, _>(index)?),
        };

        Ok(Field {
            tag,
            value: Some(value),
        })
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    pub fn value(&self) -> Option<&FieldValue> {
        self.value.as_ref()
    }

    /// Three-valued ordering.
    ///
    /// Nulls sort below any non-null; two nulls are equivalent; two non-nulls
    /// compare by their typed value. Fields of different tags are incomparable
    /// and yield `None`.
    pub fn compare(&self, other: &Field) -> Option<Ordering> {
        if self.tag != other.tag {
            return None;
        }
        match (&self.value, &other.value) {
            (None, None) => Some(Ordering::Equal),
            (None, Some(_)) => Some(Ordering::Less),
            (Some(_), None) => Some(Ordering::Greater),
            (Some(a), Some(b)) => compare_values(a, b),
        }
    }

    /// Bind this field as the next placeholder of a query.
    ///
    /// NULL is bound as a single shared shape regardless of the declared
    /// column type; the server treats the widened binding uniformly.
    pub fn bind_to<'q>(
        &self,
        query: Query<'q, MySql, MySqlArguments>,
    ) -> Query<'q, MySql, MySqlArguments> {
        match &self.value {
            None => query.bind(Option::<String>::None),
            Some(FieldValue::Int(v)) => query.bind(*v),
            Some(FieldValue::Long(v)) => query.bind(*v),
            Some(FieldValue::ULong(v)) => query.bind(*v),
            Some(FieldValue::Double(v)) => query.bind(*v),
            Some(FieldValue::Date { epoch, .. }) => query.bind(naive_from_epoch(*epoch)),
            Some(FieldValue::Text(v)) => query.bind(v.clone()),
            Some(FieldValue::Bytes(v)) => query.bind(v.clone()),
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.value {
            None => f.write_str(NULL_SENTINEL),
            Some(FieldValue::Int(v)) => write!(f, "{v}"),
            Some(FieldValue::Long(v)) => write!(f, "{v}"),
            Some(FieldValue::ULong(v)) => write!(f, "{v}"),
            Some(FieldValue::Double(v)) => write!(f, "{v}"),
            Some(FieldValue::Date { text, .. }) => f.write_str(text),
            Some(FieldValue::Text(v)) => f.write_str(v),
            Some(FieldValue::Bytes(v)) => f.write_str(&String::from_utf8_lossy(v)),
        }
    }
}

fn compare_values(a: &FieldValue, b: &FieldValue) -> Option<Ordering> {
    match (a, b) {
        (FieldValue::Int(x), FieldValue::Int(y)) => Some(x.cmp(y)),
        (FieldValue::Long(x), FieldValue::Long(y)) => Some(x.cmp(y)),
        (FieldValue::ULong(x), FieldValue::ULong(y)) => Some(x.cmp(y)),
        (FieldValue::Double(x), FieldValue::Double(y)) => Some(x.total_cmp(y)),
        (FieldValue::Date { epoch: x, .. }, FieldValue::Date { epoch: y, .. }) => Some(x.cmp(y)),
        (FieldValue::Text(x), FieldValue::Text(y)) => Some(x.cmp(y)),
        (FieldValue::Bytes(x), FieldValue::Bytes(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Reconstruct the canonical naive timestamp from epoch seconds.
pub(crate) fn naive_from_epoch(epoch: i64) -> NaiveDateTime {
    DateTime::from_timestamp(epoch, 0)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .naive_utc()
}

// Decode helpers accept the widenings a MySQL-compatible server may hand
// back for a tag (e.g. unsigned narrow ints, FLOAT under the double tag,
// DATE without a time part).

fn decode_int(row: &MySqlRow, i: usize) -> sqlx::Result<i32> {
    row.try_get::<i32, _>(i)
        .or_else(|_| row.try_get::<i16, _>(i).map(i32::from))
        .or_else(|_| row.try_get::<i8, _>(i).map(i32::from))
        .or_else(|_| row.try_get::<u32, _>(i).map(|v| v as i32))
        .or_else(|_| row.try_get::<u16, _>(i).map(i32::from))
        .or_else(|_| row.try_get::<u8, _>(i).map(i32::from))
}

fn decode_long(row: &MySqlRow, i: usize) -> sqlx::Result<i64> {
    row.try_get::<i64, _>(i)
        .or_else(|_| row.try_get::<u32, _>(i).map(i64::from))
        .or_else(|_| row.try_get::<i32, _>(i).map(i64::from))
}

fn decode_ulong(row: &MySqlRow, i: usize) -> sqlx::Result<u64> {
    row.try_get::<u64, _>(i)
        .or_else(|_| row.try_get::<i64, _>(i).map(|v| v as u64))
}

fn decode_double(row: &MySqlRow, i: usize) -> sqlx::Result<f64> {
    row.try_get::<f64, _>(i)
        .or_else(|_| row.try_get::<f32, _>(i).map(f64::from))
        .or_else(|_| {
            row.try_get::<Decimal, _>(i)
                .map(|d| d.to_f64().unwrap_or_default())
        })
}

fn decode_datetime(row: &MySqlRow, i: usize) -> sqlx::Result<NaiveDateTime> {
    row.try_get::<NaiveDateTime, _>(i).or_else(|_| {
        row.try_get::<NaiveDate, _>(i)
            .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
    })
}

fn decode_text(row: &MySqlRow, i: usize) -> sqlx::Result<String> {
    row.try_get::<String, _>(i).or_else(|_| {
        row.try_get::<Vec<u8>, _>(i)
            .map(|b| match String::from_utf8_lossy(&b) {
                Cow::Borrowed(s) => s.to_string(),
                Cow::Owned(s) => s,
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i32) -> Field {
        Field::new(TypeTag::Int, FieldValue::Int(v))
    }

    fn text(v: &str) -> Field {
        Field::new(TypeTag::Text, FieldValue::Text(v.to_string()))
    }

    #[test]
    fn test_null_sorts_below_any_value() {
        let null = Field::null(TypeTag::Int);
        assert_eq!(null.compare(&int(i32::MIN)), Some(Ordering::Less));
        assert_eq!(int(i32::MIN).compare(&null), Some(Ordering::Greater));
        assert_eq!(null.compare(&Field::null(TypeTag::Int)), Some(Ordering::Equal));
    }

    #[test]
    fn test_typed_ordering() {
        assert_eq!(int(1).compare(&int(2)), Some(Ordering::Less));
        assert_eq!(int(2).compare(&int(2)), Some(Ordering::Equal));
        assert_eq!(text("b").compare(&text("a")), Some(Ordering::Greater));
    }

    #[test]
    fn test_tag_mismatch_is_unordered() {
        assert_eq!(int(1).compare(&text("1")), None);
        assert_eq!(Field::null(TypeTag::Int).compare(&Field::null(TypeTag::Text)), None);
    }

    #[test]
    fn test_double_total_order_handles_nan() {
        let nan = Field::new(TypeTag::Double, FieldValue::Double(f64::NAN));
        let one = Field::new(TypeTag::Double, FieldValue::Double(1.0));
        assert!(nan.compare(&one).is_some());
        assert_eq!(nan.compare(&nan.clone()), Some(Ordering::Equal));
    }

    #[test]
    fn test_date_compares_by_epoch() {
        let a = Field::new(
            TypeTag::Date,
            FieldValue::Date {
                epoch: 100,
                text: "1970-01-01 00:01:40".to_string(),
            },
        );
        let b = Field::new(
            TypeTag::Date,
            FieldValue::Date {
                epoch: 200,
                text: "1970-01-01 00:03:20".to_string(),
            },
        );
        assert_eq!(a.compare(&b), Some(Ordering::Less));
    }

    #[test]
    fn test_tag_from_sql_type() {
        assert_eq!(TypeTag::from_sql_type("int(11)"), TypeTag::Int);
        assert_eq!(TypeTag::from_sql_type("int(10) unsigned"), TypeTag::Long);
        assert_eq!(TypeTag::from_sql_type("bigint"), TypeTag::Long);
        assert_eq!(TypeTag::from_sql_type("bigint(20) unsigned"), TypeTag::ULong);
        assert_eq!(TypeTag::from_sql_type("decimal(10,2)"), TypeTag::Double);
        assert_eq!(TypeTag::from_sql_type("DATETIME"), TypeTag::Date);
        assert_eq!(TypeTag::from_sql_type("varchar(255)"), TypeTag::Text);
        assert_eq!(TypeTag::from_sql_type("longblob"), TypeTag::Blob);
        assert_eq!(TypeTag::from_sql_type("json"), TypeTag::Xml);
    }

    #[test]
    fn test_null_renders_as_sentinel() {
        assert_eq!(Field::null(TypeTag::Text).to_string(), NULL_SENTINEL);
        assert_eq!(int(42).to_string(), "42");
    }

    #[test]
    fn test_epoch_round_trip() {
        let dt = naive_from_epoch(1_700_000_000);
        assert_eq!(dt.and_utc().timestamp(), 1_700_000_000);
    }
}
