//! Process inspection helpers built on `sysinfo`.

use std::path::PathBuf;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

fn refreshed(pid: Pid) -> System {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing().with_exe(UpdateKind::Always),
    );
    system
}

/// Whether a process with `pid` is running.
#[must_use]
pub fn is_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    refreshed(pid).process(pid).is_some()
}

/// Executable path of the process with `pid`.
#[must_use]
pub fn executable_of(pid: u32) -> Option<PathBuf> {
    let pid = Pid::from_u32(pid);
    refreshed(pid).process(pid).and_then(|p| p.exe()).map(PathBuf::from)
}

/// Process id of the parent of the running process.
#[must_use]
pub fn parent_pid() -> Option<u32> {
    let pid = sysinfo::get_current_pid().ok()?;
    refreshed(pid).process(pid).and_then(|p| p.parent()).map(Pid::as_u32)
}
