//! State the updater keeps outside its own process.
//!
//! - [`postpone`]: the reboot-volatile "remind me later" timestamp
//! - [`autostart`]: start at logon with `--autostart`
//! - [`scheduler`]: daily `--background` run through the Windows task scheduler
//!
//! `--install` registers the autostart entry and the scheduled task, `--uninstall`
//! removes both.

pub mod autostart;
pub mod postpone;
pub mod scheduler;

pub use autostart::{is_autostart_registered, register_autostart, remove_autostart};
pub use postpone::{FileStore, MemoryStore, PostponeState, PostponeStore};
pub use scheduler::{create_scheduled_task, remove_scheduled_task};
