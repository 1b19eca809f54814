//! HTTP gateway between the access-control dashboard and its devices.
//!
//! Wires the terminal bridge, the bus correlator, the camera relay and user
//! storage behind one axum router. The binary in `main.rs` reads its
//! configuration from [`cli::Cli`].

pub mod cli;
pub mod clients;
pub mod error;
pub mod logging;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::AppState;
