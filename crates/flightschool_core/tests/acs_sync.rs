use flightschool_core::db::open_db_in_memory;
use flightschool_core::{
    populate_acs, populate_acs_from_json, AcsDocument, AcsRepository, ConfidenceLevel,
    DocumentError, EntityKind, SqliteAcsRepository, SyncError, SyncReport,
};
use rusqlite::Connection;
use serde_json::{json, Value};

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn private_pilot() -> Value {
    json!({
        "id": "PA",
        "name": "Private Pilot - Airplane",
        "areas": [
            {
                "id": "I",
                "name": "Preflight Preparation",
                "tasks": [
                    {
                        "id": "A",
                        "name": "Pilot Qualifications",
                        "objective": "Determine the applicant's knowledge of pilot qualifications.",
                        "references": ["14 CFR part 61", "14 CFR part 91"],
                        "knowledge": [
                            {
                                "id": 1,
                                "content": "Certification requirements",
                                "subElements": [
                                    {"content": "Eligibility"},
                                    {"content": "Privileges"},
                                    {"content": "Limitations"}
                                ]
                            },
                            {"id": 2, "content": "Currency requirements"}
                        ],
                        "riskManagement": [
                            {"id": 1, "content": "Proficiency versus currency"}
                        ],
                        "skills": [
                            {"id": 1, "content": "Apply requirements to act as PIC"}
                        ]
                    },
                    {
                        "id": "B",
                        "name": "Airworthiness Requirements",
                        "knowledge": [{"id": 1, "content": "General airworthiness"}]
                    }
                ]
            },
            {
                "id": "II",
                "name": "Preflight Procedures",
                "tasks": [
                    {
                        "id": "A",
                        "name": "Preflight Assessment",
                        "note": "Cross-country flights are covered in area VI.",
                        "knowledge": [{"id": 1, "content": "Pilot self-assessment"}],
                        "skills": [
                            {"id": 1, "content": "Inspect the airplane"},
                            {"id": 2, "content": "Verify airworthiness"}
                        ]
                    }
                ]
            }
        ]
    })
}

fn populate(conn: &Connection, document: &Value) -> SyncReport {
    let document = AcsDocument::from_json_str(&document.to_string()).unwrap();
    populate_acs(conn, &document).unwrap()
}

fn tasks_of(document: &mut Value, area: usize) -> &mut Vec<Value> {
    document["areas"][area]["tasks"].as_array_mut().unwrap()
}

fn row_id(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

fn count(conn: &Connection, table: &str) -> i64 {
    row_id(conn, &format!("SELECT COUNT(*) FROM {table};"))
}

fn task_id(conn: &Connection, area: &str, task: &str) -> i64 {
    conn.query_row(
        "SELECT t.id FROM acs_tasks t
         INNER JOIN acs_areas a ON a.id = t.area_id
         WHERE a.acs_id = 'PA' AND a.public_id = ?1 AND t.public_id = ?2;",
        [area, task],
        |row| row.get(0),
    )
    .unwrap()
}

fn element_id(conn: &Connection, task_id: i64, kind: &str, public_id: i64) -> i64 {
    conn.query_row(
        "SELECT id FROM acs_elements WHERE task_id = ?1 AND kind = ?2 AND public_id = ?3;",
        rusqlite::params![task_id, kind, public_id],
        |row| row.get(0),
    )
    .unwrap()
}

/// Every stored column except timestamps, in id order.
fn snapshot(conn: &Connection) -> Vec<String> {
    let queries = [
        "SELECT id || '|' || name FROM acs ORDER BY id;",
        "SELECT id || '|' || acs_id || '|' || public_id || '|' || name || '|' || sort_order
         FROM acs_areas ORDER BY id;",
        "SELECT id || '|' || area_id || '|' || public_id || '|' || name || '|' || objective
            || '|' || note
         FROM acs_tasks ORDER BY id;",
        "SELECT id || '|' || task_id || '|' || sort_order || '|' || document
         FROM acs_task_references ORDER BY id;",
        "SELECT id || '|' || task_id || '|' || kind || '|' || public_id || '|' || content
         FROM acs_elements ORDER BY id;",
        "SELECT id || '|' || element_id || '|' || sort_order || '|' || content
         FROM acs_subelements ORDER BY id;",
        "SELECT element_id || '|' || vote FROM element_confidence ORDER BY element_id;",
    ];
    let mut rows = Vec::new();
    for sql in queries {
        let mut stmt = conn.prepare(sql).unwrap();
        let values = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        rows.extend(values);
    }
    rows
}

#[test]
fn populate_creates_the_full_hierarchy() {
    let conn = setup();

    let report = populate(&conn, &private_pilot());

    assert_eq!(report.acs_id, "PA");
    assert_eq!(report.areas.upserted, 2);
    assert_eq!(report.tasks.upserted, 3);
    assert_eq!(report.task_references.upserted, 2);
    assert_eq!(report.elements.upserted, 8);
    assert_eq!(report.sub_elements.upserted, 3);
    assert_eq!(report.total_pruned(), 0);

    assert_eq!(count(&conn, "acs"), 1);
    assert_eq!(count(&conn, "acs_areas"), 2);
    assert_eq!(count(&conn, "acs_tasks"), 3);
    assert_eq!(count(&conn, "acs_task_references"), 2);
    assert_eq!(count(&conn, "acs_elements"), 8);
    assert_eq!(count(&conn, "acs_subelements"), 3);

    let note: String = conn
        .query_row(
            "SELECT note FROM acs_tasks WHERE id = ?1;",
            [task_id(&conn, "II", "A")],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(note, "Cross-country flights are covered in area VI.");
}

#[test]
fn repeating_the_same_document_changes_nothing() {
    let conn = setup();
    let document = private_pilot();

    let first = populate(&conn, &document);
    let before = snapshot(&conn);
    let second = populate(&conn, &document);

    assert_eq!(snapshot(&conn), before);
    assert_eq!(second.total_upserted(), first.total_upserted());
    assert_eq!(second.total_pruned(), 0);
    assert_ne!(first.run_id, second.run_id);
}

#[test]
fn removed_task_and_its_descendants_are_pruned() {
    let conn = setup();
    let mut document = private_pilot();
    populate(&conn, &document);
    let kept_task = task_id(&conn, "I", "A");
    let removed_task = task_id(&conn, "I", "B");

    tasks_of(&mut document, 0).remove(1);
    let report = populate(&conn, &document);

    assert_eq!(report.tasks.pruned, 1);
    assert_eq!(task_id(&conn, "I", "A"), kept_task);
    assert_eq!(count(&conn, "acs_tasks"), 2);
    assert_eq!(count(&conn, "acs_elements"), 7);
    let leftovers = row_id(
        &conn,
        &format!("SELECT COUNT(*) FROM acs_elements WHERE task_id = {removed_task};"),
    );
    assert_eq!(leftovers, 0);
}

#[test]
fn surviving_element_keeps_its_id_and_confidence() {
    let conn = setup();
    let mut document = private_pilot();
    populate(&conn, &document);

    let task = task_id(&conn, "I", "A");
    let k1 = element_id(&conn, task, "K", 1);
    let k2 = element_id(&conn, task, "K", 2);
    let repo = SqliteAcsRepository::try_new(&conn).unwrap();
    repo.set_element_confidence(k1, ConfidenceLevel::Low).unwrap();
    repo.set_element_confidence(k2, ConfidenceLevel::High).unwrap();

    let knowledge = tasks_of(&mut document, 0)[0]["knowledge"]
        .as_array_mut()
        .unwrap();
    knowledge.remove(0);
    knowledge[0]["content"] = json!("Currency and recency requirements");
    let report = populate(&conn, &document);

    assert_eq!(report.elements.pruned, 1);
    assert_eq!(element_id(&conn, task, "K", 2), k2);
    let content: String = conn
        .query_row("SELECT content FROM acs_elements WHERE id = ?1;", [k2], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(content, "Currency and recency requirements");

    let vote: i64 = conn
        .query_row(
            "SELECT vote FROM element_confidence WHERE element_id = ?1;",
            [k2],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(vote, ConfidenceLevel::High.vote());

    let pruned_votes = row_id(
        &conn,
        &format!("SELECT COUNT(*) FROM element_confidence WHERE element_id = {k1};"),
    );
    assert_eq!(pruned_votes, 0, "confidence of a pruned element must go with it");
    assert_eq!(count(&conn, "acs_subelements"), 0);
}

#[test]
fn reordering_areas_updates_order_and_keeps_ids() {
    let conn = setup();
    let mut document = json!({
        "id": "PA",
        "name": "Private Pilot - Airplane",
        "areas": [
            {"id": "A", "name": "Alpha"},
            {"id": "B", "name": "Bravo"},
            {"id": "C", "name": "Charlie"}
        ]
    });
    populate(&conn, &document);
    let ids_before = area_ids_by_public_id(&conn);

    let areas = document["areas"].as_array_mut().unwrap();
    let charlie = areas.remove(2);
    areas.insert(0, charlie);
    let report = populate(&conn, &document);

    assert_eq!(report.areas.pruned, 0);
    assert_eq!(area_ids_by_public_id(&conn), ids_before);

    let mut stmt = conn
        .prepare("SELECT public_id FROM acs_areas ORDER BY sort_order ASC;")
        .unwrap();
    let order = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(order, vec!["C", "A", "B"]);
}

fn area_ids_by_public_id(conn: &Connection) -> Vec<(String, i64)> {
    let mut stmt = conn
        .prepare("SELECT public_id, id FROM acs_areas ORDER BY public_id ASC;")
        .unwrap();
    stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn references_are_keyed_by_position() {
    let conn = setup();
    let mut document = private_pilot();
    populate(&conn, &document);
    let task = task_id(&conn, "I", "A");
    let first_reference = row_id(
        &conn,
        &format!("SELECT id FROM acs_task_references WHERE task_id = {task} AND sort_order = 0;"),
    );

    tasks_of(&mut document, 0)[0]["references"] = json!(["14 CFR part 91"]);
    let report = populate(&conn, &document);

    assert_eq!(report.task_references.pruned, 1);
    let (id, text): (i64, String) = conn
        .query_row(
            "SELECT id, document FROM acs_task_references WHERE task_id = ?1;",
            [task],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(id, first_reference);
    assert_eq!(text, "14 CFR part 91");
}

#[test]
fn failure_part_way_through_leaves_the_store_unchanged() {
    let conn = setup();
    let mut document = json!({
        "id": "PA",
        "name": "Private Pilot - Airplane",
        "areas": [{
            "id": "I",
            "name": "Preflight Preparation",
            "tasks": [
                {"id": "A", "name": "Alpha", "knowledge": [{"id": 1, "content": "a"}]},
                {"id": "B", "name": "Bravo"}
            ]
        }]
    });
    populate(&conn, &document);
    let before = snapshot(&conn);

    conn.execute_batch(
        "CREATE TRIGGER fail_task_c BEFORE INSERT ON acs_tasks
         WHEN NEW.public_id = 'C'
         BEGIN
             SELECT RAISE(ABORT, 'injected failure');
         END;",
    )
    .unwrap();

    *tasks_of(&mut document, 0) = ["A", "B", "C", "D", "E"]
        .iter()
        .map(|id| json!({"id": id, "name": format!("Renamed {id}")}))
        .collect();
    let parsed = AcsDocument::from_json_str(&document.to_string()).unwrap();
    let err = populate_acs(&conn, &parsed).unwrap_err();

    match &err {
        SyncError::Node { kind, node, .. } => {
            assert_eq!(*kind, EntityKind::Task);
            assert_eq!(node, "PA.I.C");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("PA.I.C"));
    assert!(conn.is_autocommit(), "transaction must be closed");
    assert_eq!(snapshot(&conn), before);

    conn.execute_batch("DROP TRIGGER fail_task_c;").unwrap();
    let report = populate_acs(&conn, &parsed).unwrap();
    assert_eq!(report.tasks.upserted, 5);
}

#[test]
fn failing_sub_element_is_reported_with_its_letter_address() {
    let conn = setup();
    conn.execute_batch(
        "CREATE TRIGGER fail_second_sub_element BEFORE INSERT ON acs_subelements
         WHEN NEW.sort_order = 1
         BEGIN
             SELECT RAISE(ABORT, 'injected failure');
         END;",
    )
    .unwrap();

    let document = AcsDocument::from_json_str(&private_pilot().to_string()).unwrap();
    let err = populate_acs(&conn, &document).unwrap_err();

    match &err {
        SyncError::Node { kind, node, .. } => {
            assert_eq!(*kind, EntityKind::SubElement);
            assert_eq!(node, "PA.I.A.K1b");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(count(&conn, "acs"), 0);
    assert_eq!(count(&conn, "acs_subelements"), 0);
}

#[test]
fn document_without_areas_removes_everything_but_the_standard() {
    let conn = setup();
    let mut document = private_pilot();
    populate(&conn, &document);
    let task = task_id(&conn, "I", "A");
    let repo = SqliteAcsRepository::try_new(&conn).unwrap();
    repo.set_element_confidence(element_id(&conn, task, "S", 1), ConfidenceLevel::Medium)
        .unwrap();

    document["areas"] = json!([]);
    let report = populate(&conn, &document);

    assert_eq!(report.areas.pruned, 2);
    assert_eq!(count(&conn, "acs"), 1);
    for table in [
        "acs_areas",
        "acs_tasks",
        "acs_task_references",
        "acs_elements",
        "acs_subelements",
        "element_confidence",
    ] {
        assert_eq!(count(&conn, table), 0, "{table} should be empty");
    }
}

#[test]
fn standards_are_reconciled_independently() {
    let conn = setup();
    populate(&conn, &private_pilot());
    let pa_areas = count(&conn, "acs_areas");

    let commercial = json!({
        "id": "CA",
        "name": "Commercial Pilot - Airplane",
        "areas": [{"id": "I", "name": "Preflight Preparation"}]
    });
    let report = populate(&conn, &commercial);

    assert_eq!(report.areas.pruned, 0);
    assert_eq!(count(&conn, "acs"), 2);
    assert_eq!(count(&conn, "acs_areas"), pa_areas + 1);
}

#[test]
fn malformed_json_fails_before_any_transaction() {
    let conn = setup();
    // An open transaction would make a second BEGIN fail with a store error.
    conn.execute_batch("BEGIN;").unwrap();

    let err = populate_acs_from_json(&conn, "{\"id\": \"PA\",".as_bytes()).unwrap_err();

    assert!(matches!(err, SyncError::Decode(DocumentError::Json(_))));
    conn.execute_batch("ROLLBACK;").unwrap();
    assert_eq!(count(&conn, "acs"), 0);
}

#[test]
fn more_sub_elements_than_letters_is_a_decode_error() {
    let conn = setup();
    let mut document = private_pilot();
    let sub_elements = (0..27)
        .map(|index| json!({"content": format!("item {index}")}))
        .collect::<Vec<_>>();
    tasks_of(&mut document, 0)[0]["knowledge"][0]["subElements"] = Value::Array(sub_elements);

    let err = populate_acs_from_json(&conn, document.to_string().as_bytes()).unwrap_err();

    match err {
        SyncError::Decode(DocumentError::TooManySubElements { element, count }) => {
            assert_eq!(element, "PA.I.A.K1");
            assert_eq!(count, 27);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(count(&conn, "acs"), 0);
}

#[test]
fn populate_from_json_reader_commits() {
    let conn = setup();

    let report = populate_acs_from_json(&conn, private_pilot().to_string().as_bytes()).unwrap();

    assert_eq!(report.tasks.upserted, 3);
    assert!(conn.is_autocommit());
    assert_eq!(count(&conn, "acs_tasks"), 3);
}

#[test]
fn dropping_a_sub_element_keeps_its_siblings() {
    let conn = setup();
    let mut document = private_pilot();
    populate(&conn, &document);
    let k1 = element_id(&conn, task_id(&conn, "I", "A"), "K", 1);
    let before = sub_elements_of(&conn, k1);
    assert_eq!(before.len(), 3);

    tasks_of(&mut document, 0)[0]["knowledge"][0]["subElements"]
        .as_array_mut()
        .unwrap()
        .pop();
    let report = populate(&conn, &document);

    assert_eq!(report.sub_elements.pruned, 1);
    assert_eq!(report.elements.pruned, 0);
    assert_eq!(sub_elements_of(&conn, k1), before[..2].to_vec());
}

/// `(id, sort_order, content)` of one element's sub-elements, in order.
fn sub_elements_of(conn: &Connection, element_id: i64) -> Vec<(i64, i64, String)> {
    let mut stmt = conn
        .prepare(
            "SELECT id, sort_order, content FROM acs_subelements
             WHERE element_id = ?1 ORDER BY sort_order ASC;",
        )
        .unwrap();
    stmt.query_map([element_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn pruning_handles_more_children_than_sqlite_bind_parameters() {
    let conn = setup();
    let mut document = private_pilot();
    let references = (0..33_000)
        .map(|index| Value::String(format!("Reference {index}")))
        .collect::<Vec<_>>();
    tasks_of(&mut document, 0)[0]["references"] = Value::Array(references);

    let first = populate_acs_from_json(&conn, document.to_string().as_bytes()).unwrap();
    assert_eq!(first.task_references.upserted, 33_000);

    tasks_of(&mut document, 0)[0]["references"]
        .as_array_mut()
        .unwrap()
        .truncate(32_999);
    let second = populate_acs_from_json(&conn, document.to_string().as_bytes()).unwrap();

    assert_eq!(second.task_references.pruned, 1);
    assert_eq!(count(&conn, "acs_task_references"), 32_999);
}
