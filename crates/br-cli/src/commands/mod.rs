//! Long-running commands.

pub mod serve;
pub mod watch;

pub use serve::{run_server, ServeOptions};
pub use watch::{watch_alerts, WatchOptions};
