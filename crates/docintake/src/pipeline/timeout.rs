//! Deadline for calls into external providers.

use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    TimedOut(Duration),
    /// The call panicked (or its thread could not be started).
    Aborted(String),
}

/// Caps the number of provider calls running at once.
///
/// A slot is held by the helper thread for as long as the provider call
/// runs, so a call abandoned after its deadline keeps its slot until it
/// actually returns.
#[derive(Clone)]
pub struct CallSlots {
    release: Sender<()>,
    acquire: Receiver<()>,
}

impl CallSlots {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        let (release, acquire) = bounded(limit);
        for _ in 0..limit {
            // Capacity equals the number of tokens.
            let _ = release.try_send(());
        }
        Self { release, acquire }
    }

    /// Blocks until a slot is free.
    fn take(&self) -> Slot {
        // Both ends live in `self`, so the channel never disconnects.
        let _ = self.acquire.recv();
        Slot {
            release: self.release.clone(),
        }
    }
}

struct Slot {
    release: Sender<()>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        let _ = self.release.try_send(());
    }
}

/// Runs `f` on a helper thread and waits at most `timeout` for its result.
///
/// The helper holds one of `slots` while `f` runs. On timeout the helper is
/// detached and its result is discarded, but its slot stays taken until `f`
/// returns.
pub fn call_with_timeout<T, F>(
    name: &str,
    slots: &CallSlots,
    timeout: Duration,
    f: F,
) -> Result<T, CallError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = bounded::<T>(1);
    let span = tracing::Span::current();
    let slot = slots.take();

    thread::Builder::new()
        .name(format!("docintake-{}", name))
        .spawn(move || {
            let _entered = span.enter();
            let _slot = slot;
            // Receiver may be gone after a timeout.
            let _ = tx.send(f());
        })
        .map_err(|e| CallError::Aborted(format!("failed to spawn {} call: {}", name, e)))?;

    match rx.recv_timeout(timeout) {
        Ok(value) => Ok(value),
        Err(RecvTimeoutError::Timeout) => {
            tracing::warn!("{} call abandoned after {:?}", name, timeout);
            Err(CallError::TimedOut(timeout))
        }
        Err(RecvTimeoutError::Disconnected) => {
            Err(CallError::Aborted(format!("{} call panicked", name)))
        }
    }
}
