// Library root: re-exports all modules so integration tests and the binary
// can access the server's public API.

pub mod config;
pub mod identity;
pub mod protocol;
pub mod session;
pub mod supervisor;
pub mod ws_server;
