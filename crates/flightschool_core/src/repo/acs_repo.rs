//! ACS read queries and confidence tracking.
//!
//! # Responsibility
//! - Load areas, tasks, elements and sub-elements maintained by reconciliation.
//! - Record and aggregate element confidence votes.
//!
//! # Invariants
//! - Areas list by `sort_order`; tasks by public id; elements by
//!   `(kind, public_id)`; references and sub-elements by `sort_order`.
//! - Confidence aggregates count every element, rated or not, toward
//!   `possible`.

use crate::model::acs::{
    AreaOfOperation, Confidence, ConfidenceLevel, ElementKind, RowId, SubElement, Task,
    TaskElement, TaskSummary,
};
use crate::model::address::{element_address, task_address};
use crate::repo::acs_store::{
    ensure_acs_connection_ready, parse_element_kind, RepoError, RepoResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;

const AREA_SELECT_SQL: &str = "SELECT
    a.id AS id,
    a.acs_id AS acs_id,
    a.public_id AS public_id,
    a.name AS name,
    a.sort_order AS sort_order,
    (SELECT COUNT(*) FROM acs_tasks t WHERE t.area_id = a.id) AS task_count,
    COALESCE((
        SELECT SUM(c.vote)
        FROM acs_tasks t
        INNER JOIN acs_elements e ON e.task_id = t.id
        INNER JOIN element_confidence c ON c.element_id = e.id
        WHERE t.area_id = a.id
    ), 0) AS votes,
    (
        SELECT COUNT(*)
        FROM acs_tasks t
        INNER JOIN acs_elements e ON e.task_id = t.id
        WHERE t.area_id = a.id
    ) AS element_count
FROM acs_areas a";

const TASK_CONFIDENCE_SQL: &str = "SELECT
    COALESCE(SUM(c.vote), 0),
    COUNT(e.id)
FROM acs_elements e
LEFT JOIN element_confidence c ON c.element_id = e.id
WHERE e.task_id = ?1;";

/// Repository interface for ACS reads and confidence writes.
pub trait AcsRepository {
    /// Lists areas of one standard in document order.
    fn list_areas(&self, acs_id: &str) -> RepoResult<Vec<AreaOfOperation>>;
    /// Loads one area by public id.
    fn get_area(&self, acs_id: &str, area_public_id: &str) -> RepoResult<Option<AreaOfOperation>>;
    /// Lists task summaries of one area.
    fn list_tasks(&self, area_id: RowId) -> RepoResult<Vec<TaskSummary>>;
    /// Loads one full task by public ids.
    fn get_task(
        &self,
        acs_id: &str,
        area_public_id: &str,
        task_public_id: &str,
    ) -> RepoResult<Option<Task>>;
    /// Loads the full task owning one element.
    fn get_task_by_element(&self, element_id: RowId) -> RepoResult<Option<Task>>;
    /// Returns `ACS.AREA.TASK.<kind><id>` for one element.
    fn element_public_id(&self, element_id: RowId) -> RepoResult<Option<String>>;
    /// Records (or replaces) the confidence vote for one element.
    fn set_element_confidence(&self, element_id: RowId, level: ConfidenceLevel) -> RepoResult<()>;
    /// Removes the confidence vote for one element, if any.
    fn clear_element_confidence(&self, element_id: RowId) -> RepoResult<bool>;
    /// Aggregates confidence over all elements of one task.
    fn task_confidence(&self, task_id: RowId) -> RepoResult<Confidence>;
}

/// SQLite-backed ACS read repository.
pub struct SqliteAcsRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAcsRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_acs_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl AcsRepository for SqliteAcsRepository<'_> {
    fn list_areas(&self, acs_id: &str) -> RepoResult<Vec<AreaOfOperation>> {
        let mut stmt = self.conn.prepare(&format!(
            "{AREA_SELECT_SQL}
             WHERE a.acs_id = ?1
             ORDER BY a.sort_order ASC, a.id ASC;"
        ))?;
        let mut rows = stmt.query([acs_id])?;
        let mut areas = Vec::new();
        while let Some(row) = rows.next()? {
            areas.push(parse_area_row(row)?);
        }
        Ok(areas)
    }

    fn get_area(&self, acs_id: &str, area_public_id: &str) -> RepoResult<Option<AreaOfOperation>> {
        let mut stmt = self.conn.prepare(&format!(
            "{AREA_SELECT_SQL}
             WHERE a.acs_id = ?1
               AND a.public_id = ?2;"
        ))?;
        let mut rows = stmt.query(params![acs_id, area_public_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_area_row(row)?));
        }
        Ok(None)
    }

    fn list_tasks(&self, area_id: RowId) -> RepoResult<Vec<TaskSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                t.id AS id,
                t.area_id AS area_id,
                t.public_id AS public_id,
                t.name AS name,
                t.objective AS objective,
                a.acs_id AS acs_id,
                a.public_id AS area_public_id,
                COALESCE((
                    SELECT SUM(c.vote)
                    FROM acs_elements e
                    INNER JOIN element_confidence c ON c.element_id = e.id
                    WHERE e.task_id = t.id
                ), 0) AS votes,
                (SELECT COUNT(*) FROM acs_elements e WHERE e.task_id = t.id) AS element_count,
                (SELECT COUNT(*) FROM acs_elements e WHERE e.task_id = t.id AND e.kind = 'K')
                    AS knowledge_count,
                (SELECT COUNT(*) FROM acs_elements e WHERE e.task_id = t.id AND e.kind = 'R')
                    AS risk_management_count,
                (SELECT COUNT(*) FROM acs_elements e WHERE e.task_id = t.id AND e.kind = 'S')
                    AS skill_count
             FROM acs_tasks t
             INNER JOIN acs_areas a ON a.id = t.area_id
             WHERE t.area_id = ?1
             ORDER BY t.public_id ASC;",
        )?;
        let mut rows = stmt.query([area_id])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            let acs_id: String = row.get("acs_id")?;
            let area_public_id: String = row.get("area_public_id")?;
            let public_id: String = row.get("public_id")?;
            tasks.push(TaskSummary {
                id: row.get("id")?,
                area_id: row.get("area_id")?,
                full_public_id: task_address(&acs_id, &area_public_id, &public_id),
                public_id,
                name: row.get("name")?,
                objective: row.get("objective")?,
                confidence: Confidence::from_counts(row.get("votes")?, row.get("element_count")?),
                knowledge_count: row.get("knowledge_count")?,
                risk_management_count: row.get("risk_management_count")?,
                skill_count: row.get("skill_count")?,
            });
        }
        Ok(tasks)
    }

    fn get_task(
        &self,
        acs_id: &str,
        area_public_id: &str,
        task_public_id: &str,
    ) -> RepoResult<Option<Task>> {
        let Some(area) = self.get_area(acs_id, area_public_id)? else {
            return Ok(None);
        };

        let row = self
            .conn
            .query_row(
                "SELECT id, public_id, name, objective, note
                 FROM acs_tasks
                 WHERE area_id = ?1
                   AND public_id = ?2;",
                params![area.id, task_public_id],
                |row| {
                    Ok((
                        row.get::<_, RowId>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        let Some((id, public_id, name, objective, note)) = row else {
            return Ok(None);
        };

        let full_public_id = task_address(&area.acs, &area.public_id, &public_id);
        let references = list_task_references(self.conn, id)?;
        let mut elements = list_task_elements(self.conn, id, &full_public_id)?;
        let confidence = self.task_confidence(id)?;

        Ok(Some(Task {
            id,
            public_id,
            name,
            objective,
            note,
            area,
            confidence,
            references,
            knowledge: elements.remove(&ElementKind::Knowledge).unwrap_or_default(),
            risk_management: elements
                .remove(&ElementKind::RiskManagement)
                .unwrap_or_default(),
            skills: elements.remove(&ElementKind::Skill).unwrap_or_default(),
        }))
    }

    fn get_task_by_element(&self, element_id: RowId) -> RepoResult<Option<Task>> {
        let Some((acs_id, area_public_id, task_public_id, _, _)) =
            load_element_path(self.conn, element_id)?
        else {
            return Ok(None);
        };
        self.get_task(&acs_id, &area_public_id, &task_public_id)
    }

    fn element_public_id(&self, element_id: RowId) -> RepoResult<Option<String>> {
        let path = load_element_path(self.conn, element_id)?;
        Ok(path.map(|(acs_id, area, task, kind, public_id)| {
            element_address(&task_address(&acs_id, &area, &task), kind, public_id)
        }))
    }

    fn set_element_confidence(
        &self,
        element_id: RowId,
        level: ConfidenceLevel,
    ) -> RepoResult<()> {
        if !element_exists(self.conn, element_id)? {
            return Err(RepoError::NotFound(format!("element {element_id}")));
        }

        self.conn.execute(
            "INSERT INTO element_confidence (element_id, vote)
             VALUES (?1, ?2)
             ON CONFLICT (element_id) DO UPDATE
             SET vote = excluded.vote,
                 updated_at = (strftime('%s', 'now') * 1000);",
            params![element_id, level.vote()],
        )?;
        Ok(())
    }

    fn clear_element_confidence(&self, element_id: RowId) -> RepoResult<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM element_confidence WHERE element_id = ?1;",
            [element_id],
        )?;
        Ok(deleted > 0)
    }

    fn task_confidence(&self, task_id: RowId) -> RepoResult<Confidence> {
        let (votes, element_count) = self.conn.query_row(TASK_CONFIDENCE_SQL, [task_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        Ok(Confidence::from_counts(votes, element_count))
    }
}

type ElementPath = (String, String, String, ElementKind, u32);

fn load_element_path(conn: &Connection, element_id: RowId) -> RepoResult<Option<ElementPath>> {
    let row = conn
        .query_row(
            "SELECT a.acs_id, a.public_id, t.public_id, e.kind, e.public_id
             FROM acs_elements e
             INNER JOIN acs_tasks t ON t.id = e.task_id
             INNER JOIN acs_areas a ON a.id = t.area_id
             WHERE e.id = ?1;",
            [element_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, u32>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((acs_id, area, task, kind_text, public_id)) = row else {
        return Ok(None);
    };
    let kind = parse_element_kind(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid element kind `{kind_text}` in acs_elements.kind"
        ))
    })?;
    Ok(Some((acs_id, area, task, kind, public_id)))
}

fn element_exists(conn: &Connection, element_id: RowId) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM acs_elements WHERE id = ?1);",
        [element_id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn list_task_references(conn: &Connection, task_id: RowId) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT document
         FROM acs_task_references
         WHERE task_id = ?1
         ORDER BY sort_order ASC;",
    )?;
    let mut rows = stmt.query([task_id])?;
    let mut references = Vec::new();
    while let Some(row) = rows.next()? {
        references.push(row.get(0)?);
    }
    Ok(references)
}

fn list_task_elements(
    conn: &Connection,
    task_id: RowId,
    task_public_id: &str,
) -> RepoResult<HashMap<ElementKind, Vec<TaskElement>>> {
    let mut sub_elements = list_sub_elements_for_task(conn, task_id)?;

    let mut stmt = conn.prepare(
        "SELECT
            e.id AS id,
            e.task_id AS task_id,
            e.kind AS kind,
            e.public_id AS public_id,
            e.content AS content,
            c.vote AS vote
         FROM acs_elements e
         LEFT JOIN element_confidence c ON c.element_id = e.id
         WHERE e.task_id = ?1
         ORDER BY e.kind ASC, e.public_id ASC;",
    )?;
    let mut rows = stmt.query([task_id])?;

    let mut by_kind: HashMap<ElementKind, Vec<TaskElement>> = HashMap::new();
    while let Some(row) = rows.next()? {
        let id: RowId = row.get("id")?;
        let kind_text: String = row.get("kind")?;
        let kind = parse_element_kind(&kind_text).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid element kind `{kind_text}` in acs_elements.kind"
            ))
        })?;
        let confidence_level = match row.get::<_, Option<i64>>("vote")? {
            Some(vote) => Some(ConfidenceLevel::from_vote(vote).ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "invalid vote `{vote}` in element_confidence.vote"
                ))
            })?),
            None => None,
        };
        let public_id: u32 = row.get("public_id")?;

        by_kind.entry(kind).or_default().push(TaskElement {
            id,
            task_id: row.get("task_id")?,
            kind,
            public_id,
            content: row.get("content")?,
            full_public_id: element_address(task_public_id, kind, public_id),
            confidence_level,
            sub_elements: sub_elements.remove(&id).unwrap_or_default(),
        });
    }
    Ok(by_kind)
}

fn list_sub_elements_for_task(
    conn: &Connection,
    task_id: RowId,
) -> RepoResult<HashMap<RowId, Vec<SubElement>>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.element_id, s.sort_order, s.content
         FROM acs_subelements s
         INNER JOIN acs_elements e ON e.id = s.element_id
         WHERE e.task_id = ?1
         ORDER BY s.element_id ASC, s.sort_order ASC;",
    )?;
    let mut rows = stmt.query([task_id])?;
    let mut by_element: HashMap<RowId, Vec<SubElement>> = HashMap::new();
    while let Some(row) = rows.next()? {
        let sub_element = SubElement {
            id: row.get(0)?,
            element_id: row.get(1)?,
            sort_order: row.get(2)?,
            content: row.get(3)?,
        };
        by_element
            .entry(sub_element.element_id)
            .or_default()
            .push(sub_element);
    }
    Ok(by_element)
}

fn parse_area_row(row: &Row<'_>) -> RepoResult<AreaOfOperation> {
    Ok(AreaOfOperation {
        id: row.get("id")?,
        acs: row.get("acs_id")?,
        public_id: row.get("public_id")?,
        name: row.get("name")?,
        sort_order: row.get("sort_order")?,
        task_count: row.get("task_count")?,
        confidence: Confidence::from_counts(row.get("votes")?, row.get("element_count")?),
    })
}
