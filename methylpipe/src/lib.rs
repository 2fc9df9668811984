pub mod channel;
pub mod cli;
pub mod config;
pub mod consts;
pub mod core;
pub mod error;
pub mod executor;
pub mod graph;
pub mod key;
pub mod stage;
pub mod summary;
pub mod unit;
