//! Table and column metadata loaded from `information_schema`.

use serde::{Deserialize, Serialize};

use crate::core::value::TypeTag;

/// One column as reported by `information_schema.columns`.
///
/// Two descriptors are equal iff all four fields match; the per-table column
/// vectors of the two sides must be equal element by element before any
/// mutation is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,

    /// Column type as reported by the server (e.g. "int", "bigint unsigned").
    pub sql_type: String,

    /// Whether the column allows NULL.
    pub nullable: bool,

    /// Whether the column belongs to the primary key.
    pub primary_key: bool,
}

impl ColumnDescriptor {
    /// Scalar type tag for value decode, ordering and binding.
    pub fn type_tag(&self) -> TypeTag {
        TypeTag::from_sql_type(&self.sql_type)
    }
}

impl std::fmt::Display for ColumnDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{}` type {}", self.name, self.sql_type)?;
        if self.nullable {
            write!(f, " nullable")?;
        }
        if self.primary_key {
            write!(f, " primary key")?;
        }
        Ok(())
    }
}

/// Ordered column list for one table. Order is authoritative: the i-th
/// column on the source must equal the i-th column on the target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableMetadata {
    /// Column descriptors in declaration order.
    pub columns: Vec<ColumnDescriptor>,
}

impl TableMetadata {
    /// Primary-key column names in declaration order.
    pub fn pk_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect()
    }

    /// Non-key column names in declaration order.
    pub fn non_pk_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !c.primary_key)
            .map(|c| c.name.clone())
            .collect()
    }

    /// All column names in declaration order.
    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Type tags for every column in declaration order.
    pub fn tags(&self) -> Vec<TypeTag> {
        self.columns.iter().map(|c| c.type_tag()).collect()
    }

    /// Type tags for the primary-key columns in declaration order.
    pub fn pk_tags(&self) -> Vec<TypeTag> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.type_tag())
            .collect()
    }

    /// Number of primary-key columns.
    pub fn key_width(&self) -> usize {
        self.columns.iter().filter(|c| c.primary_key).count()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, sql_type: &str, pk: bool) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            nullable: !pk,
            primary_key: pk,
        }
    }

    fn sample() -> TableMetadata {
        TableMetadata {
            columns: vec![
                column("id", "int", true),
                column("tenant", "varchar", true),
                column("name", "varchar", false),
                column("created", "datetime", false),
            ],
        }
    }

    #[test]
    fn test_descriptor_equality_covers_all_fields() {
        let a = column("id", "int", true);
        let mut b = a.clone();
        assert_eq!(a, b);
        b.nullable = true;
        assert_ne!(a, b);
    }

    #[test]
    fn test_pk_projection_keeps_declaration_order() {
        let meta = sample();
        assert_eq!(meta.pk_names(), vec!["id", "tenant"]);
        assert_eq!(meta.non_pk_names(), vec!["name", "created"]);
        assert_eq!(meta.key_width(), 2);
    }

    #[test]
    fn test_display() {
        let rendered = column("id", "int", true).to_string();
        assert_eq!(rendered, "`id` type int primary key");
    }
}
