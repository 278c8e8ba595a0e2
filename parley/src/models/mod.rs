mod collection;
mod conversation;
mod document;
mod field;
mod message;
mod query;
mod reply;

pub use collection::*;
pub use conversation::*;
pub use document::*;
pub use field::*;
pub use message::*;
pub use query::*;
pub use reply::*;
