use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};

use crate::error::{TreeError, TreeResult};

const CANCELLED: &str = "cancelled by caller";
const DEADLINE: &str = "deadline exceeded";

/// Cooperative cancellation for long traversals.
///
/// Clones share the same flag. A token may also carry a deadline, which
/// bounds in-flight store calls as well as the gaps between them.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            flag: Arc::default(),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    fn reason(&self) -> Option<&'static str> {
        if self.flag.load(Ordering::SeqCst) {
            return Some(CANCELLED);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Some(DEADLINE),
            _ => None,
        }
    }

    /// Fail with [`TreeError::Cancelled`] if the token has fired.
    pub fn check(&self) -> TreeResult<()> {
        match self.reason() {
            Some(reason) => Err(TreeError::Cancelled(reason)),
            None => Ok(()),
        }
    }

    /// Run one store call under this token.
    pub(crate) async fn run<F, T, E>(&self, call: F) -> TreeResult<T>
    where
        F: Future<Output = Result<T, E>>,
        TreeError: From<E>,
    {
        self.check()?;
        let out = match self.deadline {
            Some(deadline) => timeout_at(deadline, call)
                .await
                .map_err(|_| TreeError::Cancelled(DEADLINE))?,
            None => call.await,
        };
        Ok(out?)
    }
}
