//! Notebooks and pages.

use super::{format_datetime, parse_datetime};
use crate::{DatabaseError, DatabaseResult, NewNotebook, NewPage, Notebook, Page};
use chrono::Utc;
use rusqlite::{params, Connection, Row};

const NOTEBOOK_COLUMNS: &str =
    "id, owner_id, title, last_opened_at, last_modified_at, created_at, updated_at";

const PAGE_COLUMNS: &str = "id, owner_id, notebook_id, page_number, text, created_at, updated_at";

fn map_notebook(row: &Row<'_>) -> rusqlite::Result<Notebook> {
    Ok(Notebook {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        last_opened_at: row.get::<_, Option<String>>(3)?.map(parse_datetime),
        last_modified_at: row.get::<_, Option<String>>(4)?.map(parse_datetime),
        created_at: parse_datetime(row.get(5)?),
        updated_at: parse_datetime(row.get(6)?),
    })
}

fn map_page(row: &Row<'_>) -> rusqlite::Result<Page> {
    Ok(Page {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        notebook_id: row.get(2)?,
        page_number: row.get(3)?,
        text: row.get(4)?,
        created_at: parse_datetime(row.get(5)?),
        updated_at: parse_datetime(row.get(6)?),
    })
}

/// Insert a notebook or update its title and timestamps.
pub fn upsert_notebook(conn: &Connection, notebook: &NewNotebook) -> DatabaseResult<Notebook> {
    let now = format_datetime(&Utc::now());
    conn.execute(
        "INSERT INTO notebooks (id, owner_id, title, last_opened_at, last_modified_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         ON CONFLICT (id) DO UPDATE SET
            title = excluded.title,
            last_opened_at = excluded.last_opened_at,
            last_modified_at = excluded.last_modified_at,
            updated_at = excluded.updated_at",
        params![
            notebook.id,
            notebook.owner_id,
            notebook.title,
            notebook.last_opened_at.as_ref().map(format_datetime),
            notebook.last_modified_at.as_ref().map(format_datetime),
            now,
        ],
    )?;
    get_notebook(conn, &notebook.id)?
        .ok_or_else(|| DatabaseError::NotFound("Notebook not found after upsert".to_string()))
}

pub fn get_notebook(conn: &Connection, id: &str) -> DatabaseResult<Option<Notebook>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {NOTEBOOK_COLUMNS} FROM notebooks WHERE id = ?1"
    ))?;

    match stmt.query_row(params![id], map_notebook) {
        Ok(notebook) => Ok(Some(notebook)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// List an owner's notebooks, oldest first.
pub fn list_notebooks(conn: &Connection, owner_id: &str) -> DatabaseResult<Vec<Notebook>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {NOTEBOOK_COLUMNS} FROM notebooks WHERE owner_id = ?1 ORDER BY created_at ASC, id ASC"
    ))?;

    let notebooks = stmt
        .query_map(params![owner_id], map_notebook)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(notebooks)
}

/// Insert a page or replace its number and text.
pub fn upsert_page(conn: &Connection, page: &NewPage) -> DatabaseResult<Page> {
    let now = format_datetime(&Utc::now());
    conn.execute(
        "INSERT INTO pages (id, owner_id, notebook_id, page_number, text, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         ON CONFLICT (id) DO UPDATE SET
            notebook_id = excluded.notebook_id,
            page_number = excluded.page_number,
            text = excluded.text,
            updated_at = excluded.updated_at",
        params![
            page.id,
            page.owner_id,
            page.notebook_id,
            page.page_number,
            page.text,
            now,
        ],
    )?;
    get_page(conn, &page.id)?
        .ok_or_else(|| DatabaseError::NotFound("Page not found after upsert".to_string()))
}

pub fn get_page(conn: &Connection, id: &str) -> DatabaseResult<Option<Page>> {
    let mut stmt =
        conn.prepare_cached(&format!("SELECT {PAGE_COLUMNS} FROM pages WHERE id = ?1"))?;

    match stmt.query_row(params![id], map_page) {
        Ok(page) => Ok(Some(page)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Pages of a notebook in page order.
pub fn list_pages_for_notebook(conn: &Connection, notebook_id: &str) -> DatabaseResult<Vec<Page>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {PAGE_COLUMNS} FROM pages WHERE notebook_id = ?1 ORDER BY page_number ASC, id ASC"
    ))?;

    let pages = stmt
        .query_map(params![notebook_id], map_page)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(pages)
}
