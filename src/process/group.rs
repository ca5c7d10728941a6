//! Process-group lifecycle.
//!
//! Every child is placed in its own process group (Unix) or Job Object
//! (Windows) at spawn time, so a single kill reaps descendants the child
//! spawns itself (the encoder's duration probes, the downloader's helper
//! processes). We never rely on parent-exit propagation.

use std::process::Command;

/// A handle that can kill an entire process group in one call.
#[derive(Debug, Clone, Copy)]
pub struct ProcessGroup {
    pid: u32,
}

impl ProcessGroup {
    pub fn of(pid: u32) -> Self {
        Self { pid }
    }

    pub fn kill(&self) {
        platform::kill_group(self.pid);
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// Configure `cmd` to start in a new process group, returning nothing — the
/// group id is discovered from the spawned child's pid (on Unix, the leader's
/// pid equals the pgid because of `setsid`).
pub fn configure_new_group(cmd: &mut Command) {
    platform::configure_new_group(cmd);
}

#[cfg(unix)]
mod platform {
    use std::os::unix::process::CommandExt;
    use std::process::Command;

    pub fn configure_new_group(cmd: &mut Command) {
        unsafe {
            cmd.pre_exec(|| {
                    // Detach into a new session so this process becomes its own
                    // group leader; `killpg` on its pid then reaches every
                    // descendant it spawns.
                    libc::setsid();
                    Ok(())
                });
        }
    }

    pub fn kill_group(pid: u32) {
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
}

#[cfg(windows)]
mod platform {
    use std::process::Command;
    use std::sync::Mutex;

    use once_cell::sync::Lazy;
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::System::JobObjects::{
        AssignProcessToJobObject, CreateJobObjectW, JOBOBJECT_EXTENDED_LIMIT_INFORMATION,
        JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE, JobObjectExtendedLimitInformation,
        SetInformationJobObject, TerminateJobObject,
    };
    use windows::Win32::System::Threading::{OpenProcess, PROCESS_ALL_ACCESS};

    struct JobHandle(isize);
    unsafe impl Send for JobHandle {}
    unsafe impl Sync for JobHandle {}

    // One Job Object per spawned child pid; `TerminateJobObject` kills every
    // process ever assigned to it, which is the Windows analogue of
    // `killpg`. Adapted from the standard global-job-object approach, but
    // scoped per child rather than per application so cancelling one job
    // cannot affect another.
    static JOBS: Lazy<Mutex<std::collections::HashMap<u32, JobHandle>>> =
    Lazy::new(|| Mutex::new(std::collections::HashMap::new()));

    pub fn configure_new_group(_cmd: &mut Command) {
        // Windows has no pre-spawn "new process group" primitive comparable
        // to setsid; the Job Object is created and the child assigned after
        // spawn, in `register_child_in_group` below.
    }

    pub fn register_child_in_group(pid: u32) {
        unsafe {
            let Ok(job) = CreateJobObjectW(None, None) else {
                return;
            };
            let mut info: JOBOBJECT_EXTENDED_LIMIT_INFORMATION = std::mem::zeroed();
            info.BasicLimitInformation.LimitFlags = JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE;
            let _ = SetInformationJobObject(
                job,
                JobObjectExtendedLimitInformation,
                &info as *const _ as *const std::ffi::c_void,
                std::mem::size_of::<JOBOBJECT_EXTENDED_LIMIT_INFORMATION>() as u32,
            );
            if let Ok(process) = OpenProcess(PROCESS_ALL_ACCESS, false, pid) {
                let _ = AssignProcessToJobObject(job, process);
                let _ = CloseHandle(process);
            }
            JOBS.lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(pid, JobHandle(job.0 as isize));
        }
    }

    pub fn kill_group(pid: u32) {
        let handle = JOBS
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .remove(&pid);
        if let Some(JobHandle(raw)) = handle {
            unsafe {
                let job = HANDLE(raw as *mut core::ffi::c_void);
                let _ = TerminateJobObject(job, 1);
                let _ = CloseHandle(job);
            }
        }
    }
}

#[cfg(windows)]
pub use platform::register_child_in_group;

#[cfg(unix)]
pub fn register_child_in_group(_pid: u32) {
    // Unix groups are established by `setsid` at spawn time; nothing to do.
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_group_of_constructs() {
        let group = ProcessGroup::of(1234);
        assert_eq!(group.pid, 1234);
    }
}
