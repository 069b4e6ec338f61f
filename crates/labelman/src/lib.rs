#![doc = include_str!("../../../README.md")]
//!

//! This crate bundles the labeling core with the development server so
//! applications depend on a single crate.

pub use labelman_core::*;
pub use labelman_server as server;
