pub mod auth;
pub mod bot;
pub mod chat;
pub mod error;
pub mod friends;
pub mod middleware;
pub mod routes;
pub mod users;

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;
pub use routes::router;
