//! Encryption hook: an external, opaque post-copy step invoked for files
//! matching the configured encryption-extension set (§4.8).

use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

/// Returns milliseconds: 0 not applicable, >0 success duration, -1 error.
/// The core treats the return value as opaque and records it verbatim.
pub trait EncryptionHook: Send + Sync {
    fn encrypt(&self, destination: &Path) -> i64;
}

/// Default hook: encryption is not configured, every file reports
/// "not applicable" rather than an error.
pub struct NoopEncryptionHook;

impl EncryptionHook for NoopEncryptionHook {
    fn encrypt(&self, _destination: &Path) -> i64 {
        0
    }
}

/// Shells out to a configured executable, passing the destination path as
/// its sole argument. Invocations are serialized process-wide: only one
/// encryption may run at a time regardless of how many workers call in.
pub struct ProcessEncryptionHook {
    executable: std::path::PathBuf,
    invocation_lock: Mutex<()>,
}

impl ProcessEncryptionHook {
    pub fn new(executable: std::path::PathBuf) -> Self {
        Self {
            executable,
            invocation_lock: Mutex::new(()),
        }
    }
}

impl EncryptionHook for ProcessEncryptionHook {
    fn encrypt(&self, destination: &Path) -> i64 {
        let _permit = self.invocation_lock.lock().expect("encryption lock poisoned");
        let start = Instant::now();
        let status = std::process::Command::new(&self.executable).arg(destination).status();

        match status {
            Ok(status) if status.success() => start.elapsed().as_millis() as i64,
            Ok(status) => {
                tracing::warn!(code = ?status.code(), "encryption tool exited non-zero");
                -1
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to spawn encryption tool");
                -1
            }
        }
    }
}
