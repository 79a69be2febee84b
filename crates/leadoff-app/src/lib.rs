// Library root: re-exports all modules so integration tests and the binary
// can access the engine's public API.

pub mod config;
pub mod console;
pub mod feed;
pub mod protocol;
pub mod scheduler;
