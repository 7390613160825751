pub mod conversation;
pub mod error;
pub mod models;
pub mod route;
pub mod session;
pub mod think;
