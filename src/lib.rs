pub mod analysis;
pub mod annotate;
pub mod batch;
pub mod config;
pub mod encode;
pub mod error;
pub mod model;
pub mod server;
pub mod upload;
