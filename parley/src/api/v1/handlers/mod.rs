pub mod collections;
pub mod conversations;
pub(crate) mod health;
pub mod messages;

pub use health::health_check;
