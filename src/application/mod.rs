//! Repositories and the persistence contract they are built on.

pub mod changeset;
pub mod error;
pub mod persistence;
pub mod repositories;
