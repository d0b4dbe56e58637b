// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Upstream process management with zombie process protection.
//!
//! The upstream tool must not outlive the proxy: on Linux the child is
//! bound to the parent via PR_SET_PDEATHSIG, and everywhere the tokio
//! kill-on-drop flag reaps it when the supervisor is dropped.

use std::process::Stdio;
use tokio::process::{ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::core::errors::WardenError;

pub struct ProcessSupervisor {
    // Channel to trigger manual kill
    kill_tx: Option<oneshot::Sender<()>>,
}

pub type ProcessSpawnResult = (ProcessSupervisor, ChildStdin, ChildStdout, ChildStderr);

impl ProcessSupervisor {
    pub fn spawn(cmd: &str, args: &[String]) -> Result<ProcessSpawnResult, WardenError> {
        debug!("ProcessSupervisor: spawning '{}' with args {:?}", cmd, args);

        let mut command = Command::new(cmd);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // ------------------------------------------------------------------
        // LINUX: PR_SET_PDEATHSIG
        // ------------------------------------------------------------------
        #[cfg(target_os = "linux")]
        // SAFETY: PR_SET_PDEATHSIG with SIGKILL is a standard Linux mechanism
        // to ensure child process termination when the parent dies. The
        // integer constants are provided by the libc crate and are valid for
        // this platform.
        unsafe {
            command.pre_exec(|| {
                let ret = libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL);
                if ret != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = command.spawn().map_err(|e| {
            WardenError::ProcessError(format!("Failed to spawn upstream process: {}", e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WardenError::ProcessError("Upstream stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WardenError::ProcessError("Upstream stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| WardenError::ProcessError("Upstream stderr not captured".to_string()))?;

        let (kill_tx, kill_rx) = oneshot::channel();

        tokio::spawn(async move {
            tokio::select! {
                _ = kill_rx => {
                    let _ = child.kill().await;
                }
                status = child.wait() => {
                    match status {
                        Ok(s) => warn!("Upstream process exited with status {:?}", s.code()),
                        Err(e) => warn!("Upstream process wait failed: {}", e),
                    }
                }
            }
        });

        Ok((
            Self {
                kill_tx: Some(kill_tx),
            },
            stdin,
            stdout,
            stderr,
        ))
    }

    pub fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.kill();
    }
}
