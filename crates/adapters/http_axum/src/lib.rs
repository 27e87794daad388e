//! # lumen-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Serve the **JSON command surface** of the orchestrator
//!   (`/api/sync`, `/api/mode`, `/api/adjust`, `/api/zones/{zone}/…`, …)
//! - Accept canonical inbound events from external observers (`POST /api/events`)
//! - Stream every recomposed adjustment as Server-Sent Events
//! - Map orchestrator results and error codes into HTTP responses
//!
//! Every command answers with the same envelope:
//! `{ "status": "ok" | "error", "error_code"?, "message"?, "data"? }`.
//!
//! ## Dependency rule
//! Depends on `lumen-app` (for the orchestrator and port traits) and
//! `lumen-domain` (for request/response types). Never leaks axum types into
//! the domain.

pub mod api;
pub mod error;
pub mod router;
pub mod state;

pub use router::build;
pub use state::AppState;
