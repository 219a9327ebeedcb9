//! Utility functions and helpers

pub mod stats;
