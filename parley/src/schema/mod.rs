//! Per-user collection schemas and the rules documents must satisfy.

mod registry;
pub mod validate;

pub use registry::SchemaRegistry;
pub use validate::{
    check_extension, coerce_value, merge_update, validate, validate_partial, PartialUpdate,
};
