//! Postcode availability checker
//!
//! Looks up whether a postcode is covered by a delivery service and, when it
//! is not, how many other people in the same sector are waiting for it.

pub mod api;
pub mod cache;
pub mod config;
pub mod hubs;
pub mod loader;
pub mod models;
pub mod normalize;
pub mod render;
pub mod resolver;
pub mod session;
