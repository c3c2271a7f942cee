//! Windows process termination

use anyhow::{Context, Result};

use windows::Win32::Foundation::{CloseHandle, FALSE};
use windows::Win32::System::Threading::{OpenProcess, TerminateProcess, PROCESS_TERMINATE};

/// Force kill a process
pub fn kill_process(pid: u32) -> Result<()> {
    unsafe {
        let handle =
            OpenProcess(PROCESS_TERMINATE, FALSE, pid).context("Failed to open process")?;

        let result = TerminateProcess(handle, 1);
        CloseHandle(handle)?;

        if result.is_ok() {
            Ok(())
        } else {
            anyhow::bail!("Failed to kill process")
        }
    }
}
