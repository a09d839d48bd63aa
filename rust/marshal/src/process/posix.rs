//! POSIX signalling via `nix`.

use super::Signal;
use crate::error::{ErrorKind, MarshalError};
use crate::scope::Scope;

use nix::sys::signal::{self, Signal as NixSignal};
use nix::unistd::Pid as NixPid;

fn to_nix_signal(sig: Signal) -> NixSignal {
    match sig {
        Signal::SigInt => NixSignal::SIGINT,
        Signal::SigTerm => NixSignal::SIGTERM,
        Signal::SigKill => NixSignal::SIGKILL,
    }
}

fn map_errno(err: nix::Error, pid: u32) -> MarshalError {
    if err == nix::Error::ESRCH {
        MarshalError::new(ErrorKind::NotFound, format!("no process with pid {pid}"))
    } else {
        MarshalError::from_source(ErrorKind::Unexpected, format!("signal delivery to pid {pid} failed"), err)
    }
}

/// Send a single signal to `pid`.
pub fn send_signal(_scope: &Scope, pid: u32, sig: Signal) -> Result<(), MarshalError> {
    signal::kill(NixPid::from_raw(pid as i32), to_nix_signal(sig)).map_err(|e| map_errno(e, pid))
}

/// If `pid` is its own process-group leader, `SIGKILL` the negated pgid in
/// one call; otherwise fall back to enumerating and killing children
/// individually, accepting the enumerate/signal race documented for this
/// subsystem.
pub fn kill_process_group(scope: &Scope, pid: u32) -> Result<(), MarshalError> {
    let target = NixPid::from_raw(pid as i32);
    let pgid = nix::unistd::getpgid(Some(target)).map_err(|e| map_errno(e, pid))?;

    if pgid.as_raw() == pid as i32 {
        let group = NixPid::from_raw(-(pgid.as_raw()));
        return match signal::kill(group, NixSignal::SIGKILL) {
            Ok(()) => Ok(()),
            Err(nix::Error::ESRCH) => Ok(()),
            Err(e) => Err(map_errno(e, pid)),
        };
    }

    kill_tree_individually(scope, pid)
}

fn kill_tree_individually(scope: &Scope, pid: u32) -> Result<(), MarshalError> {
    let children = super::sysinfo_adapter::find(scope, pid)?.children(scope)?;
    for child in children {
        let _ = kill_tree_individually(scope, child.pid());
    }
    match send_signal(scope, pid, Signal::SigKill) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
