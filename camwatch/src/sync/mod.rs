//! 任务间同步原语

pub mod mailbox;
pub mod signal;

pub use mailbox::{Mailbox, MailboxReceiver};
pub use signal::Teardown;
