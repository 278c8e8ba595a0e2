//! v1 API Data Transfer Objects.
//!
//! Wire format for the REST API, kept separate from the domain models in
//! `src/models/`. Field names are camelCase on the wire.

pub mod collections;
pub mod common;
pub mod conversations;
pub mod messages;

pub use collections::*;
pub use common::*;
pub use conversations::*;
pub use messages::*;
