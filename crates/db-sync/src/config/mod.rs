//! Run configuration: mode, endpoints, tuning knobs, validation.

mod types;
mod validation;

pub use types::{
    EndpointConfig, Mode, SyncOptions, SystemResources, DEFAULT_COMPARE_BULK, DEFAULT_MODIFY_BULK,
    DEFAULT_PK_BULK,
};
pub use validation::validate;
