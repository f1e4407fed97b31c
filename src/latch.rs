//! Single-use countdown barrier.
//!
//! A [`Latch`] is sized once when a phase launches and releases its waiters
//! when the count reaches zero. Workers hold a [`LatchGuard`] per latch; a
//! guard dropped without [`LatchGuard::release`] (panic, abort) breaks the
//! latch so the orchestrator fails fast instead of waiting forever.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierKind {
    Start,
    Finish,
}

impl fmt::Display for BarrierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BarrierKind::Start => f.write_str("start"),
            BarrierKind::Finish => f.write_str("finish"),
        }
    }
}

#[derive(Debug, Error)]
#[error("{0} barrier broken before reaching zero")]
pub struct LatchBroken(pub BarrierKind);

#[derive(Debug, Clone, Copy)]
struct LatchState {
    remaining: usize,
    broken: bool,
}

#[derive(Debug)]
pub struct Latch {
    kind: BarrierKind,
    state: watch::Sender<LatchState>,
}

impl Latch {
    pub fn new(kind: BarrierKind, count: usize) -> Arc<Self> {
        let (state, _) = watch::channel(LatchState {
            remaining: count,
            broken: false,
        });
        Arc::new(Self { kind, state })
    }

    pub fn remaining(&self) -> usize {
        self.state.borrow().remaining
    }

    fn count_down(&self) {
        self.state
            .send_modify(|s| s.remaining = s.remaining.saturating_sub(1));
    }

    fn break_latch(&self) {
        self.state.send_modify(|s| s.broken = true);
    }

    /// Hand out a guard that counts this latch down exactly once.
    pub fn arm(self: &Arc<Self>) -> LatchGuard {
        LatchGuard {
            latch: Some(Arc::clone(self)),
        }
    }

    /// Block until the count reaches zero. A zero-sized latch returns at once.
    pub async fn wait(&self) -> Result<(), LatchBroken> {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let state = *rx
            .wait_for(|s| s.remaining == 0 || s.broken)
            .await
            .map_err(|_| LatchBroken(self.kind))?;

        if state.remaining == 0 {
            Ok(())
        } else {
            Err(LatchBroken(self.kind))
        }
    }
}

#[derive(Debug)]
pub struct LatchGuard {
    latch: Option<Arc<Latch>>,
}

impl LatchGuard {
    pub fn release(mut self) {
        if let Some(latch) = self.latch.take() {
            latch.count_down();
        }
    }
}

impl Drop for LatchGuard {
    fn drop(&mut self) {
        if let Some(latch) = self.latch.take() {
            latch.break_latch();
        }
    }
}
