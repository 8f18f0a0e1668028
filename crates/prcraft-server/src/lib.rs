//! HTTP surface for prcraft: token validation, pull request publishing
//! for completed tasks, and task lookups.

pub mod error;
pub mod publish;
pub mod routes;
pub mod server;

pub use error::{ApiError, Result};
pub use publish::{PublishOutcome, PublishSettings, Publisher, PullRequestText};
pub use server::{build_app, run_server, run_server_with_state, ServerState};
