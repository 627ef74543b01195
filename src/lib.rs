pub mod core;

pub use crate::core::error::{Error, Result};

#[cfg(target_os = "macos")]
pub use crate::core::daemon::{run, RunOptions};
