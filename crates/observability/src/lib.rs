//! Process-wide logging setup.

pub mod tracing;

pub use crate::tracing::{LogFormat, init, init_with};
