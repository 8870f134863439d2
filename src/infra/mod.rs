//! Infrastructure adapters and runtime bootstrap.

pub mod backend;
pub mod db;
pub mod deploy;
pub mod error;
pub mod http;
pub mod identity;
pub mod storage;
pub mod telemetry;
