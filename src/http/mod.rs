//! HTTP surface of the relay.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (axum router, request id, trace, timeout, body limit)
//!     → handlers.rs (decode body, pick chain from path or body)
//!     → RelayService::{prepare, confirm, get}
//!     → response.rs (RelayError → status + JSON body)
//! ```
//!
//! # Design Decisions
//! - `/send/...` and `/api/...` are equivalent path families
//! - Body decoding errors use the same error envelope as relay errors
//! - `private_key` is moved into a redacting credential at the edge

pub mod handlers;
pub mod response;
pub mod server;

pub use handlers::AppState;
pub use server::HttpServer;
