//! Permission grant coordination
//!
//! Tracks waiters for outstanding OS permission prompts keyed by device
//! name and correlates asynchronous verdicts back to them. Multiple
//! concurrent requests for one device join a queue and resolve together;
//! a waiter with a deadline resolves `TimedOut` if the OS never answers.

use common::Error;
use protocol::PermissionOutcome;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::oneshot;

type Responder = oneshot::Sender<common::Result<PermissionOutcome>>;

struct Waiter {
    responder: Responder,
    deadline: Option<Instant>,
}

/// Waiter registry for pending permission prompts
#[derive(Default)]
pub struct PermissionCoordinator {
    waiters: HashMap<String, Vec<Waiter>>,
}

impl PermissionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for a device
    ///
    /// Returns true when this is the first waiter for the device, meaning
    /// the caller still has to issue the OS prompt. Later waiters piggyback
    /// on the outstanding prompt.
    pub fn register(
        &mut self,
        name: &str,
        responder: Responder,
        deadline: Option<Instant>,
    ) -> bool {
        let entry = self.waiters.entry(name.to_string()).or_default();
        let first = entry.is_empty();
        entry.push(Waiter {
            responder,
            deadline,
        });
        first
    }

    pub fn has_pending(&self, name: &str) -> bool {
        self.waiters.contains_key(name)
    }

    /// Resolve every waiter for a device with the OS verdict
    ///
    /// Returns the number of waiters resolved; zero when the verdict
    /// arrived for a device nobody was waiting on.
    pub fn resolve(&mut self, name: &str, granted: bool) -> usize {
        let Some(waiters) = self.waiters.remove(name) else {
            return 0;
        };

        let outcome = if granted {
            PermissionOutcome::Granted
        } else {
            PermissionOutcome::Denied
        };

        let count = waiters.len();
        for waiter in waiters {
            // The caller may have gone away; nothing to do then.
            let _ = waiter.responder.send(Ok(outcome));
        }
        count
    }

    /// Fail every waiter for a device with an error
    ///
    /// Used when issuing the OS prompt itself fails.
    pub fn fail(&mut self, name: &str, make_error: impl Fn() -> Error) -> usize {
        let Some(waiters) = self.waiters.remove(name) else {
            return 0;
        };

        let count = waiters.len();
        for waiter in waiters {
            let _ = waiter.responder.send(Err(make_error()));
        }
        count
    }

    /// Resolve waiters whose deadline has passed with `TimedOut`
    ///
    /// Waiters without a deadline stay pending indefinitely.
    pub fn expire(&mut self, now: Instant) -> usize {
        let mut expired = 0;

        for waiters in self.waiters.values_mut() {
            let mut kept = Vec::with_capacity(waiters.len());
            for waiter in waiters.drain(..) {
                match waiter.deadline {
                    Some(deadline) if deadline <= now => {
                        expired += 1;
                        let _ = waiter.responder.send(Ok(PermissionOutcome::TimedOut));
                    }
                    _ => kept.push(waiter),
                }
            }
            *waiters = kept;
        }
        self.waiters.retain(|_, waiters| !waiters.is_empty());

        expired
    }
}
