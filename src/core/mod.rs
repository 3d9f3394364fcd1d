//! The core module holds state and error types shared by the whole library.

pub mod cache;
pub mod context;
pub mod error;
