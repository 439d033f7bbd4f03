mod consumers;
mod init;
mod query;
mod reset;
mod status;
mod sync;

pub use consumers::cmd_consumers;
pub use init::cmd_init;
pub use query::cmd_query;
pub use reset::cmd_reset;
pub use status::cmd_status;
pub use sync::cmd_sync;
