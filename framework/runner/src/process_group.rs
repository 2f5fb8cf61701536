/// Kills the whole process group of a spawned child when dropped.
///
/// `kill_on_drop` only reaches the direct child. The commands it starts are in the same group,
/// so dropping the guard before the child exited on its own also stops them. Call
/// [ProcessGroupGuard::disarm] once the child has exited.
#[derive(Debug)]
pub(crate) struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    /// The child must have been spawned as the leader of a new process group.
    pub(crate) fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    pub(crate) fn disarm(mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        log::warn!("Process group id {pgid} is out of range, cannot kill it");
        return;
    };

    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => log::debug!("Killed process group {pgid}"),
        // Everything in the group already exited
        Err(Errno::ESRCH) => {}
        Err(e) => log::warn!("Failed to kill process group {pgid}: {e}"),
    }
}

#[cfg(not(unix))]
fn kill_group(pgid: u32) {
    log::debug!("Process groups are not supported on this platform, not killing {pgid}");
}
