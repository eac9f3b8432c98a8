//! Configuration validation.

use crate::config::{EndpointConfig, SyncOptions};
use crate::error::{Result, SyncError};

/// Validate the run configuration before any connection is opened.
pub fn validate(
    options: &SyncOptions,
    source: &EndpointConfig,
    target: &EndpointConfig,
) -> Result<()> {
    validate_endpoint("source", source)?;
    validate_endpoint("target", target)?;

    if source.host == target.host && source.port == target.port && source.schema == target.schema {
        return Err(SyncError::Config(
            "source and target must be different schemas".to_string(),
        ));
    }

    if options.pk_bulk == 0 {
        return Err(SyncError::Config("pk-bulk must be greater than 0".to_string()));
    }
    if options.compare_bulk == 0 {
        return Err(SyncError::Config(
            "compare-bulk must be greater than 0".to_string(),
        ));
    }
    if options.modify_bulk == 0 {
        return Err(SyncError::Config(
            "modify-bulk must be greater than 0".to_string(),
        ));
    }

    for table in &options.tables {
        if table.is_empty() {
            return Err(SyncError::Config("empty table name in filter".to_string()));
        }
    }

    Ok(())
}

fn validate_endpoint(side: &str, endpoint: &EndpointConfig) -> Result<()> {
    if endpoint.host.is_empty() {
        return Err(SyncError::Config(format!("{side} host is required")));
    }
    if endpoint.user.is_empty() {
        return Err(SyncError::Config(format!("{side} user is required")));
    }
    if endpoint.schema.is_empty() {
        return Err(SyncError::Config(format!("{side} schema is required")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(host: &str, schema: &str) -> EndpointConfig {
        EndpointConfig {
            host: host.to_string(),
            port: 3306,
            user: "sync".to_string(),
            password: String::new(),
            schema: schema.to_string(),
        }
    }

    #[test]
    fn test_valid_configuration() {
        let opts = SyncOptions::default();
        assert!(validate(&opts, &endpoint("a", "s"), &endpoint("b", "s")).is_ok());
    }

    #[test]
    fn test_same_endpoint_rejected() {
        let opts = SyncOptions::default();
        let err = validate(&opts, &endpoint("a", "s"), &endpoint("a", "s")).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_same_host_different_schema_allowed() {
        let opts = SyncOptions::default();
        assert!(validate(&opts, &endpoint("a", "s1"), &endpoint("a", "s2")).is_ok());
    }

    #[test]
    fn test_zero_bulk_rejected() {
        let opts = SyncOptions {
            modify_bulk: 0,
            ..SyncOptions::default()
        };
        assert!(validate(&opts, &endpoint("a", "s"), &endpoint("b", "s")).is_err());
    }

    #[test]
    fn test_missing_host_rejected() {
        let opts = SyncOptions::default();
        let err = validate(&opts, &endpoint("", "s"), &endpoint("b", "s")).unwrap_err();
        assert!(err.to_string().contains("source host"));
    }

    #[test]
    fn test_empty_table_filter_entry_rejected() {
        let opts = SyncOptions {
            tables: vec!["users".to_string(), String::new()],
            ..SyncOptions::default()
        };
        assert!(validate(&opts, &endpoint("a", "s"), &endpoint("b", "s")).is_err());
    }
}
