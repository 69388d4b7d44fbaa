//! Incremental reconciliation
//!
//! An incremental file overlaps history that is already stored. Rather than
//! probing the store once per row, reconciliation issues one range query
//! bounded below by the earliest incoming timestamp (the high-water mark)
//! and keeps the incoming rows whose timestamp is not in the result.
//!
//! Identity is `(entity, timestamp)`: an incoming row whose timestamp is
//! already stored is dropped even if its value or approval differ.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use tracing::{debug, instrument};

use crate::error::{Result, SyncError};
use crate::models::ObservationRow;
use crate::store::ObservationStore;

/// Rows of `incoming` that `store` does not hold yet for `entity_id`
///
/// Returns an empty set without touching the store when `incoming` is
/// empty. Incoming order is preserved; when the batch itself repeats a
/// timestamp only the first occurrence is kept.
#[instrument(skip(incoming, store), fields(incoming = incoming.len()))]
pub async fn reconcile<S>(
    entity_id: &str,
    incoming: Vec<ObservationRow>,
    store: &S,
) -> Result<Vec<ObservationRow>>
where
    S: ObservationStore + ?Sized,
{
    let Some(high_water_mark) = incoming.iter().map(|row| row.timestamp).min() else {
        return Ok(Vec::new());
    };

    let existing = store
        .existing_timestamps(entity_id, high_water_mark)
        .await
        .map_err(|source| SyncError::ReconciliationQuery {
            entity: entity_id.to_string(),
            source,
        })?;

    let total = incoming.len();
    let fresh = subtract_existing(incoming, &existing);

    debug!(
        since = %high_water_mark,
        existing = existing.len(),
        fresh = fresh.len(),
        dropped = total - fresh.len(),
        "Reconciled incoming rows"
    );

    Ok(fresh)
}

/// Set difference on timestamps, keeping the first of any repeated timestamp
pub fn subtract_existing(
    incoming: Vec<ObservationRow>,
    existing: &[NaiveDateTime],
) -> Vec<ObservationRow> {
    let mut seen: HashSet<NaiveDateTime> = existing.iter().copied().collect();
    incoming
        .into_iter()
        .filter(|row| seen.insert(row.timestamp))
        .collect()
}
