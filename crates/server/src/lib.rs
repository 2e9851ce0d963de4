//! Human-versus-engine chess sessions: clock, adaptive ratings, session
//! orchestration and the HTTP/WebSocket surface a board UI talks to.

pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod rating;
pub mod routes;
pub mod session;
pub mod store;
