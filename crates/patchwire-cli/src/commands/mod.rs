//! CLI command implementations.

pub mod check;
pub mod common;
pub mod init;
pub mod render;
pub mod routes;
pub mod units;
