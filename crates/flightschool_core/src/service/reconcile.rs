//! Shared level routine for reconciliation.
//!
//! Every level of the hierarchy is synchronized the same way: upsert each
//! child in document order, reconcile that child's own children right away,
//! then prune the parent's children that were not produced by this pass.

use crate::model::acs::{EntityKind, RowId};
use crate::service::sync_service::SyncResult;
use log::{debug, info};
use uuid::Uuid;

/// Audit context for one level under one parent.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LevelScope<'a> {
    pub run_id: Uuid,
    pub kind: EntityKind,
    /// Public address of the parent node.
    pub parent: &'a str,
}

/// Counts produced by one level pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct LevelOutcome {
    pub kept: usize,
    pub pruned: usize,
}

/// Runs upsert → descend for every child, then prunes with the collected ids.
///
/// `upsert` receives the zero-based document position of the child and maps
/// it (natural key + attributes) onto one store row. `descend` reconciles the
/// child's own levels. The first error stops the remaining siblings and is
/// returned unchanged; `prune` is not called in that case.
pub(crate) fn reconcile_level<T, U, D, P>(
    scope: LevelScope<'_>,
    children: impl IntoIterator<Item = T>,
    mut upsert: U,
    mut descend: D,
    prune: P,
) -> SyncResult<LevelOutcome>
where
    U: FnMut(usize, &T) -> SyncResult<RowId>,
    D: FnMut(RowId, &T) -> SyncResult<()>,
    P: FnOnce(&[RowId]) -> SyncResult<usize>,
{
    let mut known = Vec::new();
    for (position, child) in children.into_iter().enumerate() {
        let id = upsert(position, &child)?;
        descend(id, &child)?;
        known.push(id);
    }

    let pruned = prune(&known)?;
    if pruned == 0 {
        debug!(
            "event=acs_prune module=sync status=noop run_id={} kind={} parent={}",
            scope.run_id, scope.kind, scope.parent
        );
    } else {
        info!(
            "event=acs_prune module=sync status=ok run_id={} kind={} parent={} count={}",
            scope.run_id, scope.kind, scope.parent, pruned
        );
    }

    Ok(LevelOutcome {
        kept: known.len(),
        pruned,
    })
}
