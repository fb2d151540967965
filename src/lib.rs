// Library crate for integration tests.
// main.rs has its own mod declarations; this re-exports all modules.

pub mod aggregation;
pub mod config;
pub mod credentials;
pub mod dashboard;
pub mod error;
pub mod progress;
pub mod rounds;
pub mod routes;
pub mod server;
pub mod state;
pub mod testpad;
pub mod traversal;
