//! Unix signal delivery

use anyhow::Result;

/// Force kill a process (SIGKILL)
pub fn kill_process(pid: u32) -> Result<()> {
    let pid = libc::pid_t::try_from(pid)?;
    unsafe {
        let result = libc::kill(pid, libc::SIGKILL);
        if result == 0 {
            Ok(())
        } else {
            anyhow::bail!(
                "Failed to kill process: {}",
                std::io::Error::last_os_error()
            )
        }
    }
}
