//! Business logic services.

pub mod deduplication;
