mod documents;
mod messages;

pub use documents::DocumentService;
pub use messages::{error_reply, MessageService};
