//! Working-directory locks.
//!
//! A lock is only enforced while its holder is busy. An idle holder is left
//! over from a finished session and any new acquirer silently takes the
//! directory over.

use std::collections::{HashMap, HashSet};

use metrics::{counter, gauge};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::errors::CwdLockedError;

#[derive(Default)]
struct LockState {
    /// `cwd -> holding session`.
    holders: HashMap<String, String>,
    /// Sessions currently busy.
    busy: HashSet<String>,
}

impl LockState {
    fn try_acquire(&mut self, cwd: &str, session_id: &str) -> Result<(), CwdLockedError> {
        match self.holders.get(cwd) {
            Some(holder) if holder == session_id => Ok(()),
            Some(holder) if self.busy.contains(holder) => {
                counter!(crate::metrics::CWD_LOCK_CONFLICTS_TOTAL).increment(1);
                warn!(cwd, session_id, holder = %holder, "cwd locked by busy session");
                Err(CwdLockedError {
                    session_id: holder.clone(),
                })
            }
            Some(holder) => {
                counter!(crate::metrics::CWD_LOCK_RECLAIMS_TOTAL).increment(1);
                info!(cwd, session_id, previous = %holder, "reclaimed stale cwd lock");
                let _ = self.holders.insert(cwd.to_owned(), session_id.to_owned());
                Ok(())
            }
            None => {
                debug!(cwd, session_id, "cwd lock acquired");
                let _ = self.holders.insert(cwd.to_owned(), session_id.to_owned());
                gauge!(crate::metrics::CWD_LOCKS_HELD).set(self.holders.len() as f64);
                Ok(())
            }
        }
    }
}

/// Per-directory mutual exclusion.
#[derive(Default)]
pub struct CwdLockManager {
    state: Mutex<LockState>,
}

impl CwdLockManager {
    /// Empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `cwd` for `session_id`.
    ///
    /// Succeeds if the directory is free, already held by this session, or
    /// held by an idle session (reclaimed). Fails only when another busy
    /// session holds it.
    #[instrument(skip(self))]
    pub fn acquire(&self, cwd: &str, session_id: &str) -> Result<(), CwdLockedError> {
        self.state.lock().try_acquire(cwd, session_id)
    }

    /// [`acquire`](Self::acquire) then [`mark_busy`](Self::mark_busy) under one lock.
    ///
    /// Closes the window in which a second acquirer could reclaim the
    /// directory between the two calls.
    #[instrument(skip(self))]
    pub fn acquire_busy(&self, cwd: &str, session_id: &str) -> Result<(), CwdLockedError> {
        let mut state = self.state.lock();
        state.try_acquire(cwd, session_id)?;
        let _ = state.busy.insert(session_id.to_owned());
        Ok(())
    }

    /// Drop every lock held by `session_id` and clear its busy flag.
    pub fn release(&self, session_id: &str) {
        let mut state = self.state.lock();
        let before = state.holders.len();
        state.holders.retain(|_, holder| holder != session_id);
        let _ = state.busy.remove(session_id);
        if state.holders.len() != before {
            debug!(session_id, released = before - state.holders.len(), "cwd locks released");
            gauge!(crate::metrics::CWD_LOCKS_HELD).set(state.holders.len() as f64);
        }
    }

    /// Mark `session_id` busy. Lock ownership is unchanged.
    pub fn mark_busy(&self, session_id: &str) {
        let _ = self.state.lock().busy.insert(session_id.to_owned());
    }

    /// Mark `session_id` idle. Lock ownership is unchanged.
    pub fn mark_idle(&self, session_id: &str) {
        let _ = self.state.lock().busy.remove(session_id);
    }

    /// Whether `session_id` is marked busy.
    pub fn is_busy(&self, session_id: &str) -> bool {
        self.state.lock().busy.contains(session_id)
    }

    /// Whether `cwd` is held by a busy session other than `exclude_session_id`.
    pub fn is_blocked(&self, cwd: &str, exclude_session_id: Option<&str>) -> bool {
        let state = self.state.lock();
        state.holders.get(cwd).is_some_and(|holder| {
            state.busy.contains(holder) && Some(holder.as_str()) != exclude_session_id
        })
    }

    /// Session holding `cwd`, if any.
    pub fn holder(&self, cwd: &str) -> Option<String> {
        self.state.lock().holders.get(cwd).cloned()
    }

    /// Drop the lock on `cwd` regardless of the holder's state.
    pub fn clear_lock(&self, cwd: &str) {
        let mut state = self.state.lock();
        if let Some(holder) = state.holders.remove(cwd) {
            info!(cwd, holder = %holder, "cwd lock cleared");
            gauge!(crate::metrics::CWD_LOCKS_HELD).set(state.holders.len() as f64);
        }
    }
}
