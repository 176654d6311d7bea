//! HTTP API for the diagnosis pipeline.
//!
//! Routes are nested under `/api/`. The router is composable:
//! `api_router()` returns a `Router` that can be mounted on any axum
//! server, and `start_api_server()` runs it with graceful shutdown.

pub mod collaborators;
pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use collaborators::{AnonymousSessions, NoUserStats, SessionLookup, User, UserStats};
pub use error::ApiError;
pub use router::api_router;
pub use server::{start_api_server, ApiServer, ServerError};
pub use types::ApiContext;
