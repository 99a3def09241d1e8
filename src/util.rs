// Re-export from common crate to keep crate::util::* paths stable
pub use roster_common::config;
pub use roster_common::threading;
pub mod logging;
