//! VerDB Server - HTTP API
//!
//! REST boundary over the VerDB core: registry management, versioned
//! writes, direct upserts, raw searches and job scheduling.
//!
//! Key Features:
//! - Axum router with tracing, CORS and request ids
//! - Blocking core calls moved onto the blocking pool
//! - Optional JSON snapshot persistence of the document engine
//!
//! @version 0.1.0
//! @author VerDB Development Team

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use config::ServerConfig;
pub use router::create_router;
pub use state::AppState;
