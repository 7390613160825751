pub mod backend_client;
pub mod config;
pub mod identity;
pub mod session_guard;
pub mod session_store;
pub mod sse;
