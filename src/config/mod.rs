//! Configuration module
//!
//! Settings for the API connection, rendering links, image resolution
//! and an optional column catalog.

pub mod config;
