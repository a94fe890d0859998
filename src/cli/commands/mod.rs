mod add;
mod list;
mod pipeline;
mod remove;
mod retry;

pub use add::cmd_add;
pub use list::cmd_list;
pub use pipeline::{cmd_check, cmd_daemon, cmd_sweep, cmd_sync};
pub use remove::cmd_remove;
pub use retry::cmd_retry;
