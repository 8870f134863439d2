//! Application services layer.

pub mod auth;
pub mod composer;
pub mod content;
pub mod deploy;
pub mod error;
pub mod markdown;
pub mod pages;
pub mod prerender;
pub mod repos;
pub mod storage;
pub mod uploads;
