//! ACS document reconciliation (populate) service.
//!
//! # Responsibility
//! - Mirror one external ACS document into the stored hierarchy.
//! - Run the whole pass in one transaction: committed on success, rolled
//!   back on any failure.
//!
//! # Invariants
//! - Surviving nodes keep their surrogate ids, so confidence rows stay valid.
//! - Orphans are pruned only after all sibling upserts for a parent succeed.
//! - A rollback failure is logged; the caller always sees the original error.
//! - Decode errors are reported before a transaction is opened.

use crate::model::acs::{EntityKind, RowId};
use crate::model::address::{
    element_address, join_address, reference_address, sub_element_address,
};
use crate::model::document::{AcsDocument, DocumentError, SubElementDocument, TaskDocument};
use crate::repo::acs_store::{AcsStore, RepoError, RepoResult, SqliteAcsStore};
use crate::service::reconcile::{reconcile_level, LevelOutcome, LevelScope};
use log::{error, info};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::Read;
use std::time::Instant;
use uuid::Uuid;

pub type SyncResult<T> = Result<T, SyncError>;

/// Terminal errors of one reconciliation pass.
#[derive(Debug)]
pub enum SyncError {
    /// Input document is structurally invalid; nothing was written.
    Decode(DocumentError),
    /// Transaction or store could not be started.
    Begin(RepoError),
    /// Upserting one node failed.
    Node {
        kind: EntityKind,
        node: String,
        source: RepoError,
    },
    /// Pruning children of one node failed.
    Prune {
        kind: EntityKind,
        parent: String,
        source: RepoError,
    },
    /// Final commit failed; the transaction was rolled back.
    Commit(RepoError),
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decode(err) => write!(f, "{err}"),
            Self::Begin(err) => write!(f, "failed to start ACS update: {err}"),
            Self::Node { kind, node, source } => {
                write!(f, "failed to update {kind} {node}: {source}")
            }
            Self::Prune {
                kind,
                parent,
                source,
            } => write!(f, "failed to remove unknown {kind} rows under {parent}: {source}"),
            Self::Commit(err) => write!(f, "failed to commit ACS update: {err}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Decode(err) => Some(err),
            Self::Begin(err) | Self::Commit(err) => Some(err),
            Self::Node { source, .. } | Self::Prune { source, .. } => Some(source),
        }
    }
}

impl From<DocumentError> for SyncError {
    fn from(value: DocumentError) -> Self {
        Self::Decode(value)
    }
}

/// Attaches the node being processed to a store error.
trait NodeContext<T> {
    fn at_node(self, kind: EntityKind, node: &str) -> SyncResult<T>;
    fn pruning(self, kind: EntityKind, parent: &str) -> SyncResult<T>;
}

impl<T> NodeContext<T> for RepoResult<T> {
    fn at_node(self, kind: EntityKind, node: &str) -> SyncResult<T> {
        self.map_err(|source| SyncError::Node {
            kind,
            node: node.to_string(),
            source,
        })
    }

    fn pruning(self, kind: EntityKind, parent: &str) -> SyncResult<T> {
        self.map_err(|source| SyncError::Prune {
            kind,
            parent: parent.to_string(),
            source,
        })
    }
}

/// Upsert/prune counts for one level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelCounts {
    pub upserted: usize,
    pub pruned: usize,
}

/// Summary of one committed reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub acs_id: String,
    pub run_id: Uuid,
    pub areas: LevelCounts,
    pub tasks: LevelCounts,
    pub task_references: LevelCounts,
    pub elements: LevelCounts,
    pub sub_elements: LevelCounts,
}

impl SyncReport {
    fn new(acs_id: &str, run_id: Uuid) -> Self {
        Self {
            acs_id: acs_id.to_string(),
            run_id,
            areas: LevelCounts::default(),
            tasks: LevelCounts::default(),
            task_references: LevelCounts::default(),
            elements: LevelCounts::default(),
            sub_elements: LevelCounts::default(),
        }
    }

    fn levels(&self) -> [LevelCounts; 5] {
        [
            self.areas,
            self.tasks,
            self.task_references,
            self.elements,
            self.sub_elements,
        ]
    }

    pub fn total_upserted(&self) -> usize {
        self.levels().iter().map(|level| level.upserted).sum()
    }

    /// Rows removed directly by pruning; cascaded descendants are not counted.
    pub fn total_pruned(&self) -> usize {
        self.levels().iter().map(|level| level.pruned).sum()
    }

    fn record(&mut self, kind: EntityKind, outcome: LevelOutcome) {
        let level = match kind {
            EntityKind::Standard => return,
            EntityKind::Area => &mut self.areas,
            EntityKind::Task => &mut self.tasks,
            EntityKind::TaskReference => &mut self.task_references,
            EntityKind::Element => &mut self.elements,
            EntityKind::SubElement => &mut self.sub_elements,
        };
        level.upserted += outcome.kept;
        level.pruned += outcome.pruned;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassState {
    Started,
    Committed,
    RolledBack,
}

impl PassState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }
}

/// Decodes a JSON document and reconciles it.
///
/// Decode failures return `SyncError::Decode` without touching the store.
pub fn populate_acs_from_json(conn: &Connection, reader: impl Read) -> SyncResult<SyncReport> {
    let document = AcsDocument::from_reader(reader)?;
    populate_acs(conn, &document)
}

/// Reconciles the stored hierarchy of `document.id` with `document`.
///
/// # Contract
/// - `Ok` means the pass is committed and the store mirrors the document.
/// - `Err` means the pass is rolled back and the store is unchanged.
/// - Safe to repeat with the same document; a repeat prunes nothing.
/// - `conn` must not already be inside a transaction.
pub fn populate_acs(conn: &Connection, document: &AcsDocument) -> SyncResult<SyncReport> {
    let run_id = Uuid::new_v4();
    let started_at = Instant::now();
    info!(
        "event=acs_sync module=sync status=start state={} run_id={} acs={} areas={}",
        PassState::Started.as_str(),
        run_id,
        document.id,
        document.areas.len()
    );

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(|err| SyncError::Begin(err.into()))?;

    let walked = SqliteAcsStore::try_new(&tx)
        .map_err(SyncError::Begin)
        .and_then(|store| reconcile_document(&store, run_id, document));

    match walked {
        Ok(report) => {
            if let Err(err) = tx.commit() {
                error!(
                    "event=acs_sync module=sync status=error state={} run_id={} acs={} duration_ms={} error_code=commit_failed error={}",
                    PassState::RolledBack.as_str(),
                    run_id,
                    document.id,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(SyncError::Commit(err.into()));
            }

            info!(
                "event=acs_sync module=sync status=ok state={} run_id={} acs={} duration_ms={} upserted={} pruned={}",
                PassState::Committed.as_str(),
                run_id,
                document.id,
                started_at.elapsed().as_millis(),
                report.total_upserted(),
                report.total_pruned()
            );
            Ok(report)
        }
        Err(err) => {
            rollback_quietly(tx, run_id);
            error!(
                "event=acs_sync module=sync status=error state={} run_id={} acs={} duration_ms={} error={}",
                PassState::RolledBack.as_str(),
                run_id,
                document.id,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn rollback_quietly(tx: Transaction<'_>, run_id: Uuid) {
    if let Err(err) = tx.rollback() {
        error!(
            "event=acs_sync module=sync status=error state={} run_id={} error_code=rollback_failed error={}",
            PassState::RolledBack.as_str(),
            run_id,
            err
        );
    }
}

/// Walks the document against any store; the caller owns the transaction.
pub(crate) fn reconcile_document<S: AcsStore>(
    store: &S,
    run_id: Uuid,
    document: &AcsDocument,
) -> SyncResult<SyncReport> {
    let mut reconciler = Reconciler {
        store,
        run_id,
        report: SyncReport::new(&document.id, run_id),
    };
    reconciler.reconcile_standard(document)?;
    Ok(reconciler.report)
}

struct Reconciler<'s, S: AcsStore> {
    store: &'s S,
    run_id: Uuid,
    report: SyncReport,
}

impl<S: AcsStore> Reconciler<'_, S> {
    fn reconcile_standard(&mut self, document: &AcsDocument) -> SyncResult<()> {
        let store = self.store;
        let run_id = self.run_id;
        let acs_id = document.id.as_str();

        store
            .upsert_standard(acs_id, &document.name)
            .at_node(EntityKind::Standard, acs_id)?;
        log_upsert(run_id, EntityKind::Standard, acs_id, None);

        let scope = LevelScope {
            run_id,
            kind: EntityKind::Area,
            parent: acs_id,
        };
        let outcome = reconcile_level(
            scope,
            &document.areas,
            |position, area| {
                let node = join_address(acs_id, &area.id);
                let id = store
                    .upsert_area(acs_id, &area.id, &area.name, position as i64)
                    .at_node(EntityKind::Area, &node)?;
                log_upsert(run_id, EntityKind::Area, &node, Some(id));
                Ok(id)
            },
            |area_id, area| {
                self.reconcile_tasks(area_id, &join_address(acs_id, &area.id), &area.tasks)
            },
            |known| {
                store
                    .prune_areas(acs_id, known)
                    .pruning(EntityKind::Area, acs_id)
            },
        )?;
        self.report.record(EntityKind::Area, outcome);
        Ok(())
    }

    fn reconcile_tasks(
        &mut self,
        area_id: RowId,
        area_address: &str,
        tasks: &[TaskDocument],
    ) -> SyncResult<()> {
        let store = self.store;
        let run_id = self.run_id;

        let scope = LevelScope {
            run_id,
            kind: EntityKind::Task,
            parent: area_address,
        };
        let outcome = reconcile_level(
            scope,
            tasks,
            |_, task| {
                let node = join_address(area_address, &task.id);
                let id = store
                    .upsert_task(area_id, &task.id, &task.name, &task.objective, &task.note)
                    .at_node(EntityKind::Task, &node)?;
                log_upsert(run_id, EntityKind::Task, &node, Some(id));
                Ok(id)
            },
            |task_id, task| {
                let task_address = join_address(area_address, &task.id);
                self.reconcile_references(task_id, &task_address, &task.references)?;
                self.reconcile_elements(task_id, &task_address, task)
            },
            |known| {
                store
                    .prune_tasks(area_id, known)
                    .pruning(EntityKind::Task, area_address)
            },
        )?;
        self.report.record(EntityKind::Task, outcome);
        Ok(())
    }

    fn reconcile_references(
        &mut self,
        task_id: RowId,
        task_address: &str,
        references: &[String],
    ) -> SyncResult<()> {
        let store = self.store;
        let run_id = self.run_id;

        let scope = LevelScope {
            run_id,
            kind: EntityKind::TaskReference,
            parent: task_address,
        };
        let outcome = reconcile_level(
            scope,
            references,
            |position, document| {
                let node = reference_address(task_address, position);
                let id = store
                    .upsert_task_reference(task_id, position as i64, document)
                    .at_node(EntityKind::TaskReference, &node)?;
                log_upsert(run_id, EntityKind::TaskReference, &node, Some(id));
                Ok(id)
            },
            |_, _| Ok(()),
            |known| {
                store
                    .prune_task_references(task_id, known)
                    .pruning(EntityKind::TaskReference, task_address)
            },
        )?;
        self.report.record(EntityKind::TaskReference, outcome);
        Ok(())
    }

    fn reconcile_elements(
        &mut self,
        task_id: RowId,
        task_address: &str,
        task: &TaskDocument,
    ) -> SyncResult<()> {
        let store = self.store;
        let run_id = self.run_id;

        let scope = LevelScope {
            run_id,
            kind: EntityKind::Element,
            parent: task_address,
        };
        let outcome = reconcile_level(
            scope,
            task.elements(),
            |_, &(kind, element)| {
                let node = element_address(task_address, kind, element.id);
                let id = store
                    .upsert_element(task_id, kind, element.id, &element.content)
                    .at_node(EntityKind::Element, &node)?;
                log_upsert(run_id, EntityKind::Element, &node, Some(id));
                Ok(id)
            },
            |element_id, &(kind, element)| {
                let node = element_address(task_address, kind, element.id);
                self.reconcile_sub_elements(element_id, &node, &element.sub_elements)
            },
            |known| {
                store
                    .prune_elements(task_id, known)
                    .pruning(EntityKind::Element, task_address)
            },
        )?;
        self.report.record(EntityKind::Element, outcome);
        Ok(())
    }

    fn reconcile_sub_elements(
        &mut self,
        element_id: RowId,
        element_address: &str,
        sub_elements: &[SubElementDocument],
    ) -> SyncResult<()> {
        let store = self.store;
        let run_id = self.run_id;

        let scope = LevelScope {
            run_id,
            kind: EntityKind::SubElement,
            parent: element_address,
        };
        let outcome = reconcile_level(
            scope,
            sub_elements,
            |position, sub_element| {
                let node = sub_element_address(element_address, position);
                let id = store
                    .upsert_sub_element(element_id, position as i64, &sub_element.content)
                    .at_node(EntityKind::SubElement, &node)?;
                log_upsert(run_id, EntityKind::SubElement, &node, Some(id));
                Ok(id)
            },
            |_, _| Ok(()),
            |known| {
                store
                    .prune_sub_elements(element_id, known)
                    .pruning(EntityKind::SubElement, element_address)
            },
        )?;
        self.report.record(EntityKind::SubElement, outcome);
        Ok(())
    }
}

fn log_upsert(run_id: Uuid, kind: EntityKind, node: &str, id: Option<RowId>) {
    match id {
        Some(id) => info!(
            "event=acs_upsert module=sync status=ok run_id={run_id} kind={kind} node={node} id={id}"
        ),
        None => info!("event=acs_upsert module=sync status=ok run_id={run_id} kind={kind} node={node}"),
    }
}
