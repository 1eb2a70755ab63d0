//! Library crate for qr-attend-rs: the scan gate, the backend client and the
//! helpers behind the CLI.
pub mod api;
pub mod attendance;
pub mod error;
pub mod gate;
pub mod server;
pub mod session;
pub mod students;
pub mod submit;
pub mod types;
