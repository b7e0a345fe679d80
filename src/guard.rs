// Per-handler singleton execution guard.
//
// Each workflow owns one guard with process-wide lifetime. A trigger
// that finds the guard taken does not start a redundant pass: it waits
// for the in-flight run to finish and returns, so overlapping cron
// ticks collapse into a single logical execution.

use std::future::Future;

use tokio::sync::Mutex;
use tracing::debug;

/// How a trigger resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// This trigger executed the protected section
    Executed,
    /// Another run was active; this trigger waited for it and joined its result
    Joined,
}

/// At-most-one-active-run guard with trigger-or-join semantics.
///
/// Release happens when the internal `MutexGuard` drops, on every exit
/// path of the protected section. There is no release-without-acquire:
/// a caller that never acquired holds no guard to drop.
pub struct SingletonGuard {
    name: &'static str,
    inner: Mutex<()>,
}

impl SingletonGuard {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run `section` if no other run is active; otherwise wait for the
    /// active run to complete and return without executing.
    pub async fn run<F, Fut>(&self, section: F) -> RunOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        match self.inner.try_lock() {
            Ok(_guard) => {
                section().await;
                RunOutcome::Executed
            }
            Err(_) => {
                debug!("{} already running, joining in-flight run", self.name);
                let _guard = self.inner.lock().await;
                RunOutcome::Joined
            }
        }
    }
}
