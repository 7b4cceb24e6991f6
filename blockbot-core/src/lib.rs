// File: blockbot-core/src/lib.rs

pub mod commands;
pub mod config;
pub mod eventbus;
pub mod gesture;
pub mod idle;
pub mod lifecycle;
pub mod mem;
pub mod state;
pub mod transport;

pub use blockbot_common::Error;
