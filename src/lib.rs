pub mod cli;
pub mod config;
pub mod global;
pub mod media;
pub mod recorder;
pub mod session;
pub mod sink;
pub mod upload;
