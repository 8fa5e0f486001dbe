//! Per-press writer lanes.
//!
//! Every press gets its own async mutex; tools without a press share the
//! `None` lane. Lanes are created on first use and live as long as the
//! [`PressLocks`] value.

use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::PressNumber;

type Lane = Arc<AsyncMutex<()>>;

/// Guard held while writing to a press. Dropping it releases the lane.
pub type PressGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct PressLocks {
    lanes: Mutex<HashMap<Option<PressNumber>, Lane>>,
}

impl PressLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lane(&self, press: Option<PressNumber>) -> Lane {
        self.lanes.lock().entry(press).or_default().clone()
    }

    /// Wait for exclusive write access to one press lane.
    pub async fn lock(&self, press: Option<PressNumber>) -> PressGuard {
        self.lane(press).lock_owned().await
    }

    /// Lock several lanes at once.
    ///
    /// Lanes are taken in a fixed order (unassigned first, then by press
    /// number) and duplicates are skipped, so two writers touching the same
    /// presses cannot deadlock.
    pub async fn lock_many(
        &self,
        presses: impl IntoIterator<Item = Option<PressNumber>>,
    ) -> Vec<PressGuard> {
        let mut guards = Vec::new();
        for press in lane_order(presses) {
            guards.push(self.lock(press).await);
        }
        guards
    }

    /// Lock the lanes of the presses reported by `current`.
    ///
    /// `current` is read again once the lanes are held. If a record moved to
    /// another press in between, the guards are dropped and the lanes of the
    /// new presses are taken instead.
    pub async fn lock_current<E, F, Fut>(&self, mut current: F) -> Result<Vec<PressGuard>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Vec<Option<PressNumber>>, E>>,
    {
        let mut presses = lane_order(current().await?);
        loop {
            let guards = self.lock_many(presses.iter().copied()).await;
            let held = lane_order(current().await?);
            if held == presses {
                return Ok(guards);
            }
            debug!("Press lanes moved from {:?} to {:?}; relocking", presses, held);
            drop(guards);
            presses = held;
        }
    }
}

fn lane_order(
    presses: impl IntoIterator<Item = Option<PressNumber>>,
) -> Vec<Option<PressNumber>> {
    let mut presses: Vec<Option<PressNumber>> = presses.into_iter().collect();
    presses.sort();
    presses.dedup();
    presses
}
