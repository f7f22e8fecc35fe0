// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Single-shot deadline threads.
//!
//! Each armed deadline is a named thread blocked on
//! `Receiver::recv_timeout`. Sending on (or dropping) the paired sender
//! cancels it; a timeout runs the expiry callback on that thread.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Identifies one arming of a key's deadline.
pub(crate) type TimerId = u64;

/// A live deadline, owned by the key slot that armed it.
#[derive(Debug)]
pub(crate) struct ArmedTimer {
    id: TimerId,
    thread_name: String,
    cancel_tx: mpsc::Sender<()>,
}

impl ArmedTimer {
    pub(crate) fn id(&self) -> TimerId {
        self.id
    }

    pub(crate) fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Signal the deadline thread to exit without firing.
    ///
    /// Does not join: the caller usually holds the key guard that an
    /// already-expired deadline is waiting for.
    pub(crate) fn cancel(self) {
        let _ = self.cancel_tx.send(());
    }
}

/// Spawn a deadline that runs `on_expire` once `after` has elapsed, unless
/// canceled first.
pub(crate) fn spawn_deadline<F>(
    id: TimerId,
    key: &str,
    after: Duration,
    on_expire: F,
) -> std::io::Result<ArmedTimer>
where
    F: FnOnce() + Send + 'static,
{
    let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
    let thread_name = format!("burrow-timer-{}", key.replace('\0', ""));

    thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || match cancel_rx.recv_timeout(after) {
            Err(mpsc::RecvTimeoutError::Timeout) => on_expire(),
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                tracing::trace!(timer = id, "Deadline canceled");
            }
        })?;

    Ok(ArmedTimer {
        id,
        thread_name,
        cancel_tx,
    })
}
