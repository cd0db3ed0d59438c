//! The current take.
//!
//! [`TakeRegistry`] holds the single take eligible for post-processing.
//! Results of asynchronous operations are applied with an [`OpToken`]:
//! every take-mutating operation draws a token before it starts, and only
//! the newest token issued may replace the current take.  A slow response
//! that lost the race is reported as [`StaleResult`] instead of silently
//! overwriting a newer take.
//!
//! Recordings draw a take token when they finish.  A save that completes
//! after a later recording was finished is stale too, so uploads that
//! overlap cannot bring an older take back.
//!
//! [`SharedRegistry`] is `Arc<Mutex<TakeRegistry>>`.  Lock it briefly and
//! never across an `.await`.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use super::take::Take;

/// Sequence number of a take-mutating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpToken(u64);

impl fmt::Display for OpToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A result arrived after a newer operation or take superseded it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("result of operation {token} superseded (newest is {newest})")]
pub struct StaleResult {
    pub token: OpToken,
    pub newest: OpToken,
}

#[derive(Debug, Default)]
pub struct TakeRegistry {
    current: Option<Take>,
    issued: u64,
    newest_take: u64,
}

impl TakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current take, if one was ever set.
    pub fn current(&self) -> Option<&Take> {
        self.current.as_ref()
    }

    /// Make `take` current.  Operations started before this call can no
    /// longer replace it.
    pub fn set_current(&mut self, take: Take) {
        self.issued += 1;
        self.current = Some(take);
    }

    /// Draw a token for an operation that will replace the current take.
    pub fn issue_token(&mut self) -> OpToken {
        self.issued += 1;
        OpToken(self.issued)
    }

    /// Draw a token for a newly recorded take that is about to be saved.
    pub fn issue_take_token(&mut self) -> OpToken {
        let token = self.issue_token();
        self.newest_take = token.0;
        token
    }

    /// Make a saved take current unless a later recording was finished
    /// since `token` was drawn.  Like [`set_current`](Self::set_current),
    /// this supersedes operations started against the previous take.
    pub fn set_current_if_newest(&mut self, take: Take, token: OpToken) -> Result<(), StaleResult> {
        if token.0 < self.newest_take {
            return Err(StaleResult {
                token,
                newest: OpToken(self.newest_take),
            });
        }
        self.set_current(take);
        Ok(())
    }

    /// Replace the current take with an operation's result.
    pub fn replace_current(&mut self, take: Take, token: OpToken) -> Result<(), StaleResult> {
        let newest = OpToken(self.issued);
        if token != newest {
            return Err(StaleResult { token, newest });
        }
        self.current = Some(take);
        Ok(())
    }
}

pub type SharedRegistry = Arc<Mutex<TakeRegistry>>;

/// A fresh, empty shared registry.
pub fn shared() -> SharedRegistry {
    Arc::new(Mutex::new(TakeRegistry::new()))
}

/// Lock `registry`.  A poisoned lock is recovered: the registry holds plain
/// data and every write completes before the guard drops.
pub fn lock(registry: &SharedRegistry) -> MutexGuard<'_, TakeRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::take::ServerFile;

    fn take(name: &str) -> Take {
        Take::derived(ServerFile {
            filename: name.into(),
            path: format!("/data/{name}"),
        })
    }

    #[test]
    fn empty_before_first_set() {
        assert!(TakeRegistry::new().current().is_none());
    }

    #[test]
    fn last_write_wins() {
        let mut reg = TakeRegistry::new();
        reg.set_current(take("a.webm"));
        reg.set_current(take("b.webm"));
        let token = reg.issue_token();
        reg.replace_current(take("c.webm"), token).unwrap();
        let token = reg.issue_token();
        reg.replace_current(take("d.webm"), token).unwrap();
        assert_eq!(reg.current(), Some(&take("d.webm")));
    }

    #[test]
    fn older_token_is_rejected() {
        let mut reg = TakeRegistry::new();
        reg.set_current(take("t1.webm"));
        let first = reg.issue_token();
        let second = reg.issue_token();

        reg.replace_current(take("second.webm"), second).unwrap();
        let err = reg.replace_current(take("first.webm"), first).unwrap_err();
        assert_eq!(err, StaleResult { token: first, newest: second });
        assert_eq!(reg.current(), Some(&take("second.webm")));
    }

    #[test]
    fn new_take_invalidates_pending_operations() {
        let mut reg = TakeRegistry::new();
        reg.set_current(take("t1.webm"));
        let token = reg.issue_token();
        reg.set_current(take("t2.webm"));

        assert!(reg.replace_current(take("t1_pitch.webm"), token).is_err());
        assert_eq!(reg.current(), Some(&take("t2.webm")));
    }

    #[test]
    fn older_recording_cannot_replace_newer_one() {
        let mut reg = TakeRegistry::new();
        let first = reg.issue_take_token();
        let second = reg.issue_take_token();

        reg.set_current_if_newest(take("t2.webm"), second).unwrap();
        let err = reg.set_current_if_newest(take("t1.webm"), first).unwrap_err();
        assert_eq!(err, StaleResult { token: first, newest: second });
        assert_eq!(reg.current(), Some(&take("t2.webm")));
    }

    #[test]
    fn pending_operation_does_not_block_new_recording() {
        let mut reg = TakeRegistry::new();
        reg.set_current(take("t1.webm"));
        let recording = reg.issue_take_token();
        let pitch = reg.issue_token();

        reg.replace_current(take("t1_pitch.webm"), pitch).unwrap();
        reg.set_current_if_newest(take("t2.webm"), recording).unwrap();
        assert_eq!(reg.current(), Some(&take("t2.webm")));
    }

    #[test]
    fn tokens_increase() {
        let mut reg = TakeRegistry::new();
        let a = reg.issue_token();
        let b = reg.issue_token();
        assert!(b > a);
        assert_eq!(b.to_string(), "#2");
    }

    #[test]
    fn shared_lock_survives_poison() {
        let reg = shared();
        let clone = Arc::clone(&reg);
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock().unwrap();
            panic!("poison");
        })
        .join();
        lock(&reg).set_current(take("after.webm"));
        assert!(lock(&reg).current().is_some());
    }
}
