mod error;
mod handlers;
mod helpers;
mod outbox;
mod router;
mod types;

pub use error::err;
pub use outbox::Outbox;
pub use router::handle_request;
pub use types::{AppState, Request};
