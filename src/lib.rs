pub mod bucketer;
pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod goal;
pub mod logging;
pub mod pipeline;
pub mod settings;
pub mod storage;
pub mod store;
pub mod structs;
pub mod tasks;
pub mod time_window;

pub use error::{Error, Result};
