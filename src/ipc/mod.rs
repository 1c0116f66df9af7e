mod error;
mod handlers;
mod helpers;
mod router;
mod types;

pub use handlers::core::{load_workspace_settings, open_table_store};
pub use router::handle_request;
pub use types::{AppState, Request};
