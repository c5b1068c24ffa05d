//! REST surface over the engine. Every handler runs the synchronous engine
//! call on the blocking pool and maps `CloakError` onto an HTTP status.

pub mod attachments;
pub mod auth;
pub mod conversations;
pub mod error;
pub mod groups;
pub mod messages;
pub mod middleware;
pub mod moderation;
pub mod routes;
pub mod state;
pub mod statuses;
pub mod users;

pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, AppStateInner};
