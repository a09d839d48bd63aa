//! Non-POSIX signalling: there is no uniform interrupt/terminate signal,
//! so `SigInt`/`SigTerm` degrade to a best-effort no-op and `SigKill` is
//! implemented by a platform-native tree-kill command, matching the spec's
//! "SigKill is implemented by a platform-native group-kill" rule for this
//! platform family.

use super::Signal;
use crate::error::{ErrorKind, MarshalError};
use crate::scope::Scope;

use std::process::Command;
use std::time::Duration;

/// Bounded wait issued after invoking the native tree-kill command, before
/// this call returns, so a caller polling immediately afterwards sees a
/// settled state.
const WAIT_DELAY: Duration = Duration::from_millis(50);

pub fn send_signal(scope: &Scope, pid: u32, sig: Signal) -> Result<(), MarshalError> {
    match sig {
        Signal::SigInt | Signal::SigTerm => Ok(()),
        Signal::SigKill => kill_tree(scope, pid),
    }
}

/// Issue `taskkill /F /T /PID <pid>` and wait [`WAIT_DELAY`] for it to take
/// effect.
pub fn kill_tree(scope: &Scope, pid: u32) -> Result<(), MarshalError> {
    let status = Command::new("taskkill")
        .args(["/F", "/T", "/PID", &pid.to_string()])
        .status();

    let _ = scope.sleep(WAIT_DELAY);

    match status {
        Ok(status) if status.success() => Ok(()),
        // taskkill exits non-zero (128) when the pid is already gone.
        Ok(_) => Ok(()),
        Err(e) => Err(MarshalError::from_source(
            ErrorKind::Unexpected,
            format!("taskkill failed for pid {pid}"),
            e,
        )),
    }
}
