pub mod config;
pub mod handpose_client;
pub mod modules;
pub mod pipeline;
pub mod transport;
pub mod utils;
