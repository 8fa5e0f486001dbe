//! Partial cycle derivation.
//!
//! A reading's partial count is its total minus the total of the nearest
//! earlier reading (by id) on the same press and position, whichever tool
//! that reading belongs to. Without an earlier reading the partial is the
//! total itself. Partials are always recomputed from the ledger, never stored.

use log::warn;
use std::collections::HashMap;

use crate::db::repository::{CycleRepository, RepositoryResult};
use crate::models::{
    CycleDelta, CycleId, CycleRecord, DiscontinuityPolicy, Position, PressCycle, PressNumber,
};

fn log_discontinuity(record: &CycleRecord, delta: &CycleDelta) {
    if let CycleDelta::Discontinuity {
        previous_total,
        raw,
    } = delta
    {
        warn!(
            "Counter went backwards on press {} {}: cycle {} (tool {}) reads {} after {} (delta {})",
            record.press_number,
            record.tool_position,
            record.id,
            record.tool_id,
            record.total_cycles,
            previous_total,
            raw
        );
    }
}

/// Derive the delta of a single reading from the ledger.
pub async fn partial_cycles<R: CycleRepository + ?Sized>(
    repo: &R,
    record: &CycleRecord,
) -> RepositoryResult<CycleDelta> {
    let previous = repo
        .previous_slot_total(record.press_number, record.tool_position, record.id)
        .await?;
    let delta = CycleDelta::between(previous, record.total_cycles);
    log_discontinuity(record, &delta);
    Ok(delta)
}

/// Attach its delta to a reading.
pub async fn annotate<R: CycleRepository + ?Sized>(
    repo: &R,
    record: CycleRecord,
    policy: DiscontinuityPolicy,
) -> RepositoryResult<PressCycle> {
    let delta = partial_cycles(repo, &record).await?;
    Ok(PressCycle::new(record, delta, policy))
}

/// Attach deltas to readings that may be a page of a larger history.
///
/// Each reading is resolved against the ledger, so the result is correct
/// even when the previous reading of a slot is not part of `records`.
pub async fn annotate_all<R: CycleRepository + ?Sized>(
    repo: &R,
    records: Vec<CycleRecord>,
    policy: DiscontinuityPolicy,
) -> RepositoryResult<Vec<PressCycle>> {
    let mut annotated = Vec::with_capacity(records.len());
    for record in records {
        annotated.push(annotate(repo, record, policy).await?);
    }
    Ok(annotated)
}

/// Deltas for a complete reading history, computed in one pass.
///
/// `records` must contain every reading of the slots involved (e.g. every
/// reading of a press); the result then matches [`partial_cycles`].
pub fn slot_deltas(records: &[CycleRecord]) -> HashMap<CycleId, CycleDelta> {
    let mut ordered: Vec<&CycleRecord> = records.iter().collect();
    ordered.sort_by_key(|r| r.id);

    let mut last_total: HashMap<(PressNumber, Position), i64> = HashMap::new();
    let mut deltas = HashMap::with_capacity(ordered.len());
    for record in ordered {
        let slot = (record.press_number, record.tool_position);
        let delta = CycleDelta::between(last_total.get(&slot).copied(), record.total_cycles);
        log_discontinuity(record, &delta);
        last_total.insert(slot, record.total_cycles);
        deltas.insert(record.id, delta);
    }
    deltas
}

/// Annotate a complete reading history without further ledger lookups.
pub fn annotate_history(records: Vec<CycleRecord>, policy: DiscontinuityPolicy) -> Vec<PressCycle> {
    let deltas = slot_deltas(&records);
    records
        .into_iter()
        .map(|record| {
            let delta = deltas
                .get(&record.id)
                .copied()
                .unwrap_or(CycleDelta::First {
                    total: record.total_cycles,
                });
            PressCycle::new(record, delta, policy)
        })
        .collect()
}
