pub mod catalog;
pub mod challenge;
pub mod common;
pub mod config;
pub mod detection;
pub mod effects;
pub mod error;
pub mod local;
pub mod sequence;
pub mod services;
pub mod session;
pub mod streaming;

pub use error::AppError;
