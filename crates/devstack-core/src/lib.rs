pub mod env_file;
pub mod error;
pub mod io;
pub mod launch;
pub mod manifest;
pub mod orchestrator;
pub mod probe;
pub mod secrets;
pub mod service;
pub mod tools;
pub mod tunnel;

pub use error::{DevstackError, Result};
