//! Platform-specific signal delivery for Unix and Windows

#[cfg(unix)]
mod unix;

#[cfg(windows)]
mod windows;

use anyhow::Result;

/// Force kill a process by pid
pub fn kill_process(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        unix::kill_process(pid)
    }
    #[cfg(windows)]
    {
        windows::kill_process(pid)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = pid;
        anyhow::bail!("Unsupported platform")
    }
}
