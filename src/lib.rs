// Library crate shared by the binary and the integration tests.

pub mod aggregate;
pub mod audit;
pub mod config;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod routes;
pub mod server;
pub mod state;
pub mod store;
pub mod webhook;
