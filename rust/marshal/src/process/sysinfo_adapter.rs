//! `sysinfo`-backed process enumeration.
//!
//! Each [`Process`] here is an immutable snapshot taken at observation
//! time, not a live handle into `sysinfo::System` — `is_running`/`children`
//! re-query a fresh snapshot so staleness is bounded by how often the
//! caller asks, matching the "process-tree kill races are accepted"
//! design note for this subsystem.

use super::{Process, ProcessState, Signal};
use crate::error::{ErrorKind, MarshalError};
use crate::scope::Scope;

use std::sync::Arc;
use sysinfo::{Pid, System};

fn os_string(s: &std::ffi::OsStr) -> String {
    s.to_string_lossy().into_owned()
}

fn to_state(status: sysinfo::ProcessStatus) -> ProcessState {
    match status {
        sysinfo::ProcessStatus::Run => ProcessState::Running,
        sysinfo::ProcessStatus::Sleep => ProcessState::Sleeping,
        sysinfo::ProcessStatus::Idle => ProcessState::Idle,
        sysinfo::ProcessStatus::Zombie => ProcessState::Zombie,
        sysinfo::ProcessStatus::Stop => ProcessState::Stopped,
        sysinfo::ProcessStatus::Dead => ProcessState::Dead,
        _ => ProcessState::Unknown,
    }
}

/// A process as observed by `sysinfo` at construction time.
pub struct SysinfoProcess {
    pid: u32,
    ppid: Option<u32>,
    name: String,
    executable: Option<String>,
    cwd: Option<String>,
    cmdline: Vec<String>,
}

impl SysinfoProcess {
    fn from_system(sys: &System, pid: Pid) -> Option<Self> {
        let p = sys.process(pid)?;
        Some(Self {
            pid: pid.as_u32(),
            ppid: p.parent().map(|pp| pp.as_u32()),
            name: os_string(p.name()),
            executable: p.exe().map(|e| e.to_string_lossy().into_owned()),
            cwd: p.cwd().map(|c| c.to_string_lossy().into_owned()),
            cmdline: p.cmd().iter().map(|a| os_string(a)).collect(),
        })
    }
}

impl Process for SysinfoProcess {
    fn pid(&self) -> u32 {
        self.pid
    }
    fn ppid(&self) -> Option<u32> {
        self.ppid
    }
    fn name(&self) -> String {
        self.name.clone()
    }
    fn executable(&self) -> Option<String> {
        self.executable.clone()
    }
    fn cwd(&self) -> Option<String> {
        self.cwd.clone()
    }
    fn cmdline(&self) -> Vec<String> {
        self.cmdline.clone()
    }

    fn is_running(&self, _scope: &Scope) -> Result<bool, MarshalError> {
        let mut sys = System::new();
        let pid = Pid::from_u32(self.pid);
        sys.refresh_process(pid);
        Ok(sys.process(pid).is_some())
    }

    fn is_zombie(&self, scope: &Scope) -> Result<bool, MarshalError> {
        Ok(self.state(scope)? == ProcessState::Zombie)
    }

    fn state(&self, _scope: &Scope) -> Result<ProcessState, MarshalError> {
        let mut sys = System::new();
        let pid = Pid::from_u32(self.pid);
        sys.refresh_process(pid);
        match sys.process(pid) {
            Some(p) => Ok(to_state(p.status())),
            None => Ok(ProcessState::Dead),
        }
    }

    fn children(&self, scope: &Scope) -> Result<Vec<Arc<dyn Process>>, MarshalError> {
        list(scope).map(|all| {
            all.into_iter()
                .filter(|p| p.ppid() == Some(self.pid))
                .collect()
        })
    }

    fn signal(&self, scope: &Scope, sig: Signal) -> Result<(), MarshalError> {
        #[cfg(unix)]
        {
            super::posix::send_signal(scope, self.pid, sig)
        }
        #[cfg(not(unix))]
        {
            super::other::send_signal(scope, self.pid, sig)
        }
    }

    fn kill_with_children(&self, scope: &Scope) -> Result<(), MarshalError> {
        #[cfg(unix)]
        {
            super::posix::kill_process_group(scope, self.pid)
        }
        #[cfg(not(unix))]
        {
            super::other::kill_tree(scope, self.pid)
        }
    }
}

/// `NotFound` iff no process with `pid` exists.
pub fn find(_scope: &Scope, pid: u32) -> Result<Arc<dyn Process>, MarshalError> {
    let mut sys = System::new();
    let target = Pid::from_u32(pid);
    sys.refresh_process(target);
    match SysinfoProcess::from_system(&sys, target) {
        Some(p) => Ok(Arc::new(p)),
        None => Err(MarshalError::new(ErrorKind::NotFound, format!("no process with pid {pid}"))),
    }
}

/// Enumerate every process currently visible to this host.
pub fn list(_scope: &Scope) -> Result<Vec<Arc<dyn Process>>, MarshalError> {
    let mut sys = System::new_all();
    sys.refresh_all();
    let pids: Vec<Pid> = sys.processes().keys().copied().collect();
    Ok(pids
        .into_iter()
        .filter_map(|pid| SysinfoProcess::from_system(&sys, pid))
        .map(|p| Arc::new(p) as Arc<dyn Process>)
        .collect())
}
