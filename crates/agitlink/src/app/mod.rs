//! Application layer orchestrating domain logic and infrastructure.

pub mod lines;
pub mod permalink;
pub mod window;
