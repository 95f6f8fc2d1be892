//! Write primitives for the ACS hierarchy.
//!
//! # Responsibility
//! - Upsert one node by `(parent, natural key)` and return its surrogate id.
//! - Prune children of one parent that were not produced by the latest upserts.
//!
//! # Invariants
//! - An upsert on an existing natural key updates in place; the surrogate id
//!   is never changed.
//! - Pruning relies on `ON DELETE CASCADE` for descendants and confidence rows.
//! - Callers own the transaction; nothing here commits.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::acs::{ElementKind, RowId};
use rusqlite::types::Value;
use rusqlite::{params, Connection, Params};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from ACS repository operations.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Addressed row does not exist.
    NotFound(String),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "ACS repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "ACS repository requires table `{table}`")
            }
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::InvalidData(message) => write!(f, "invalid ACS data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Write contract used by the reconciler, one upsert and one prune per level.
pub trait AcsStore {
    fn upsert_standard(&self, acs_id: &str, name: &str) -> RepoResult<()>;
    fn upsert_area(
        &self,
        acs_id: &str,
        public_id: &str,
        name: &str,
        sort_order: i64,
    ) -> RepoResult<RowId>;
    fn upsert_task(
        &self,
        area_id: RowId,
        public_id: &str,
        name: &str,
        objective: &str,
        note: &str,
    ) -> RepoResult<RowId>;
    fn upsert_task_reference(
        &self,
        task_id: RowId,
        sort_order: i64,
        document: &str,
    ) -> RepoResult<RowId>;
    fn upsert_element(
        &self,
        task_id: RowId,
        kind: ElementKind,
        public_id: u32,
        content: &str,
    ) -> RepoResult<RowId>;
    fn upsert_sub_element(
        &self,
        element_id: RowId,
        sort_order: i64,
        content: &str,
    ) -> RepoResult<RowId>;

    fn prune_areas(&self, acs_id: &str, known: &[RowId]) -> RepoResult<usize>;
    fn prune_tasks(&self, area_id: RowId, known: &[RowId]) -> RepoResult<usize>;
    fn prune_task_references(&self, task_id: RowId, known: &[RowId]) -> RepoResult<usize>;
    fn prune_elements(&self, task_id: RowId, known: &[RowId]) -> RepoResult<usize>;
    fn prune_sub_elements(&self, element_id: RowId, known: &[RowId]) -> RepoResult<usize>;
}

/// SQLite-backed ACS store.
///
/// Usually built over a `rusqlite::Transaction` (which derefs to
/// `Connection`) so the whole reconciliation pass shares one transaction.
pub struct SqliteAcsStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAcsStore<'conn> {
    /// Creates store from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_acs_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl AcsStore for SqliteAcsStore<'_> {
    fn upsert_standard(&self, acs_id: &str, name: &str) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO acs (id, name)
             VALUES (?1, ?2)
             ON CONFLICT (id) DO UPDATE
             SET name = excluded.name,
                 updated_at = (strftime('%s', 'now') * 1000);",
            params![acs_id, name],
        )?;
        Ok(())
    }

    fn upsert_area(
        &self,
        acs_id: &str,
        public_id: &str,
        name: &str,
        sort_order: i64,
    ) -> RepoResult<RowId> {
        upsert_returning_id(
            self.conn,
            "INSERT INTO acs_areas (acs_id, public_id, name, sort_order)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (acs_id, public_id) DO UPDATE
             SET name = excluded.name,
                 sort_order = excluded.sort_order,
                 updated_at = (strftime('%s', 'now') * 1000)
             RETURNING id;",
            params![acs_id, public_id, name, sort_order],
        )
    }

    fn upsert_task(
        &self,
        area_id: RowId,
        public_id: &str,
        name: &str,
        objective: &str,
        note: &str,
    ) -> RepoResult<RowId> {
        upsert_returning_id(
            self.conn,
            "INSERT INTO acs_tasks (area_id, public_id, name, objective, note)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (area_id, public_id) DO UPDATE
             SET name = excluded.name,
                 objective = excluded.objective,
                 note = excluded.note,
                 updated_at = (strftime('%s', 'now') * 1000)
             RETURNING id;",
            params![area_id, public_id, name, objective, note],
        )
    }

    fn upsert_task_reference(
        &self,
        task_id: RowId,
        sort_order: i64,
        document: &str,
    ) -> RepoResult<RowId> {
        upsert_returning_id(
            self.conn,
            "INSERT INTO acs_task_references (task_id, sort_order, document)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (task_id, sort_order) DO UPDATE
             SET document = excluded.document
             RETURNING id;",
            params![task_id, sort_order, document],
        )
    }

    fn upsert_element(
        &self,
        task_id: RowId,
        kind: ElementKind,
        public_id: u32,
        content: &str,
    ) -> RepoResult<RowId> {
        upsert_returning_id(
            self.conn,
            "INSERT INTO acs_elements (task_id, kind, public_id, content)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (task_id, kind, public_id) DO UPDATE
             SET content = excluded.content,
                 updated_at = (strftime('%s', 'now') * 1000)
             RETURNING id;",
            params![task_id, element_kind_to_db(kind), public_id, content],
        )
    }

    fn upsert_sub_element(
        &self,
        element_id: RowId,
        sort_order: i64,
        content: &str,
    ) -> RepoResult<RowId> {
        upsert_returning_id(
            self.conn,
            "INSERT INTO acs_subelements (element_id, sort_order, content)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (element_id, sort_order) DO UPDATE
             SET content = excluded.content
             RETURNING id;",
            params![element_id, sort_order, content],
        )
    }

    fn prune_areas(&self, acs_id: &str, known: &[RowId]) -> RepoResult<usize> {
        prune_children(
            self.conn,
            ChildTable::AREAS,
            Value::Text(acs_id.to_string()),
            known,
        )
    }

    fn prune_tasks(&self, area_id: RowId, known: &[RowId]) -> RepoResult<usize> {
        prune_children(self.conn, ChildTable::TASKS, Value::Integer(area_id), known)
    }

    fn prune_task_references(&self, task_id: RowId, known: &[RowId]) -> RepoResult<usize> {
        prune_children(
            self.conn,
            ChildTable::TASK_REFERENCES,
            Value::Integer(task_id),
            known,
        )
    }

    fn prune_elements(&self, task_id: RowId, known: &[RowId]) -> RepoResult<usize> {
        prune_children(self.conn, ChildTable::ELEMENTS, Value::Integer(task_id), known)
    }

    fn prune_sub_elements(&self, element_id: RowId, known: &[RowId]) -> RepoResult<usize> {
        prune_children(
            self.conn,
            ChildTable::SUB_ELEMENTS,
            Value::Integer(element_id),
            known,
        )
    }
}

/// Child table and the column pointing at its parent.
#[derive(Debug, Clone, Copy)]
struct ChildTable {
    table: &'static str,
    parent_column: &'static str,
}

impl ChildTable {
    const AREAS: Self = Self {
        table: "acs_areas",
        parent_column: "acs_id",
    };
    const TASKS: Self = Self {
        table: "acs_tasks",
        parent_column: "area_id",
    };
    const TASK_REFERENCES: Self = Self {
        table: "acs_task_references",
        parent_column: "task_id",
    };
    const ELEMENTS: Self = Self {
        table: "acs_elements",
        parent_column: "task_id",
    };
    const SUB_ELEMENTS: Self = Self {
        table: "acs_subelements",
        parent_column: "element_id",
    };
}

fn upsert_returning_id(conn: &Connection, sql: &str, params: impl Params) -> RepoResult<RowId> {
    let id = conn
        .prepare_cached(sql)?
        .query_row(params, |row| row.get::<_, RowId>(0))?;
    Ok(id)
}

/// Deletes children of `parent` whose id is not in `known`.
///
/// Binds at most one id per statement; any number of children is supported.
fn prune_children(
    conn: &Connection,
    child: ChildTable,
    parent: Value,
    known: &[RowId],
) -> RepoResult<usize> {
    let known: HashSet<RowId> = known.iter().copied().collect();

    let mut select = conn.prepare_cached(&format!(
        "SELECT id FROM {} WHERE {} = ?1;",
        child.table, child.parent_column
    ))?;
    let stale = select
        .query_map([parent], |row| row.get::<_, RowId>(0))?
        .filter(|id| !matches!(id, Ok(id) if known.contains(id)))
        .collect::<Result<Vec<_>, _>>()?;

    if stale.is_empty() {
        return Ok(0);
    }

    let mut delete =
        conn.prepare_cached(&format!("DELETE FROM {} WHERE id = ?1;", child.table))?;
    let mut deleted = 0;
    for id in stale {
        deleted += delete.execute([id])?;
    }
    Ok(deleted)
}

pub(crate) fn element_kind_to_db(kind: ElementKind) -> &'static str {
    match kind {
        ElementKind::Knowledge => "K",
        ElementKind::RiskManagement => "R",
        ElementKind::Skill => "S",
    }
}

pub(crate) fn parse_element_kind(value: &str) -> Option<ElementKind> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(code), None) => ElementKind::from_code(code),
        _ => None,
    }
}

const REQUIRED_TABLES: &[&str] = &[
    "acs",
    "acs_areas",
    "acs_tasks",
    "acs_task_references",
    "acs_elements",
    "acs_subelements",
    "element_confidence",
];

pub(crate) fn ensure_acs_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in REQUIRED_TABLES {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(*table));
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
