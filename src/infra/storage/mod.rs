//! Object store adapters.

mod fs;
mod http;

pub use fs::FilesystemStore;
pub use http::HttpObjectStore;
