//! Weather bot core library — webhook dispatch, weather lookup, MAX platform
//! messaging, and the HTTP server shell used by the CLI.

pub mod config;
pub mod max;
pub mod server;
pub mod signature;
pub mod weather;
pub mod webhook;
