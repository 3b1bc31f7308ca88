pub mod auth;
pub mod config;
pub mod email;
pub mod shared;
pub mod tickets;
