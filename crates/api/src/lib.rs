//! Agora host library.
//!
//! Exposes the pieces the binary wires together (config, state, router,
//! middleware, the forum task catalog) so integration tests can build the
//! same application without a database.

pub mod config;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod state;
pub mod tasks;
