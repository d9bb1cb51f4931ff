//! Consistency core of the rgdps game server.
//!
//! Entities are read through a cache, written with partial updates and kept
//! coherent across processes by pub/sub invalidation events.

pub mod application;
pub mod cache;
pub mod config;
pub mod context;
pub mod domain;
pub mod infra;
pub mod pubsub;

pub(crate) mod util;
