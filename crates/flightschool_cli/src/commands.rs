//! Command implementations on top of `flightschool_core`.

use anyhow::{bail, Context, Result};
use flightschool_core::db::open_db;
use flightschool_core::{
    populate_acs_from_json, AcsService, ConfidenceLevel, RowId, SqliteAcsRepository, SyncReport,
};
use log::info;
use rusqlite::Connection;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub fn open(path: &Path) -> Result<Connection> {
    open_db(path).with_context(|| format!("failed to open database {}", path.display()))
}

/// Reconciles one document file and prints its pass summary.
pub fn populate_file(conn: &Connection, file: &Path) -> Result<SyncReport> {
    let reader = File::open(file)
        .map(BufReader::new)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let report = populate_acs_from_json(conn, reader)
        .with_context(|| format!("failed to populate ACS from {}", file.display()))?;
    println!("{}", summary_line(&report));
    Ok(report)
}

/// Reconciles every `*.json` file of `dir`, in file-name order, one pass each.
pub fn populate_dir(conn: &Connection, dir: &Path) -> Result<()> {
    let files = document_files(dir)?;
    if files.is_empty() {
        println!("No ACS documents found in {}", dir.display());
        return Ok(());
    }
    info!(
        "event=acs_populate_dir module=cli status=start dir={} files={}",
        dir.display(),
        files.len()
    );
    for file in &files {
        populate_file(conn, file)?;
    }
    Ok(())
}

fn document_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list ACS directory {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to list ACS directory {}", dir.display()))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn show_task(conn: &Connection, address: &str) -> Result<()> {
    let service = AcsService::new(SqliteAcsRepository::try_new(conn)?);
    let Some(task) = service.get_task_by_address(address)? else {
        bail!("task {address} not found");
    };
    println!("{}", serde_json::to_string_pretty(&task)?);
    Ok(())
}

pub fn set_confidence(
    conn: &Connection,
    element_id: RowId,
    level: Option<ConfidenceLevel>,
) -> Result<()> {
    let service = AcsService::new(SqliteAcsRepository::try_new(conn)?);
    let Some(public_id) = service.element_public_id(element_id)? else {
        bail!("element {element_id} not found");
    };
    service.set_element_confidence(element_id, level)?;
    match level {
        Some(level) => println!("{public_id}: confidence {}", level.as_str()),
        None => println!("{public_id}: confidence cleared"),
    }
    Ok(())
}

fn summary_line(report: &SyncReport) -> String {
    format!(
        "ACS {}: {} upserted, {} pruned (areas {}/{}, tasks {}/{}, references {}/{}, elements {}/{}, sub-elements {}/{}) run_id={}",
        report.acs_id,
        report.total_upserted(),
        report.total_pruned(),
        report.areas.upserted,
        report.areas.pruned,
        report.tasks.upserted,
        report.tasks.pruned,
        report.task_references.upserted,
        report.task_references.pruned,
        report.elements.upserted,
        report.elements.pruned,
        report.sub_elements.upserted,
        report.sub_elements.pruned,
        report.run_id
    )
}
