//! Shared low-level utilities
//!
//! - `lockfile`: `<path>.lock` based atomic file replacement

pub mod lockfile;
