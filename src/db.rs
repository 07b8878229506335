use crate::terms::{format_academic_session, parse_iso_date, Term, TermType};
use anyhow::{anyhow, Context};
use chrono::{NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE_NAME: &str = "termsd.sqlite3";

const TERM_COLUMNS: &str =
    "id, name, term_type, academic_session, start_date, end_date, is_current, is_active";

#[derive(Debug, Clone)]
pub struct NewTerm {
    pub name: String,
    pub term_type: TermType,
    pub academic_session: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TermPatch {
    pub name: Option<String>,
    pub term_type: Option<TermType>,
    pub academic_session: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl TermPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.term_type.is_none()
            && self.academic_session.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
    }

    /// Merged record; flags are never touched by a patch.
    pub fn apply(&self, term: &Term) -> Term {
        let mut next = term.clone();
        if let Some(v) = &self.name {
            next.name = v.clone();
        }
        if let Some(v) = self.term_type {
            next.term_type = v;
        }
        if let Some(v) = &self.academic_session {
            next.academic_session = v.clone();
        }
        if let Some(v) = self.start_date {
            next.start_date = v;
        }
        if let Some(v) = self.end_date {
            next.end_date = v;
        }
        next
    }
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.display()))?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS terms(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            term_type TEXT NOT NULL,
            academic_session TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            is_current INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_terms_session ON terms(academic_session)",
        [],
    )?;

    // Workspaces created before edits were tracked have no updated_at column.
    ensure_terms_updated_at(&conn)?;

    Ok(conn)
}

fn ensure_terms_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "terms", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE terms ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn conversion_err(idx: usize, e: crate::terms::TermError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn term_from_row(row: &Row<'_>) -> rusqlite::Result<Term> {
    let term_type: String = row.get(2)?;
    let start: String = row.get(4)?;
    let end: String = row.get(5)?;
    Ok(Term {
        id: row.get(0)?,
        name: row.get(1)?,
        term_type: term_type.parse().map_err(|e| conversion_err(2, e))?,
        academic_session: row.get(3)?,
        start_date: parse_iso_date(&start).map_err(|e| conversion_err(4, e))?,
        end_date: parse_iso_date(&end).map_err(|e| conversion_err(5, e))?,
        is_current: row.get::<_, i64>(6)? != 0,
        is_active: row.get::<_, i64>(7)? != 0,
    })
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Terms in insertion order.
pub fn list_terms(conn: &Connection) -> anyhow::Result<Vec<Term>> {
    let sql = format!("SELECT {} FROM terms ORDER BY rowid", TERM_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let terms = stmt
        .query_map([], term_from_row)?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to read terms")?;
    Ok(terms)
}

pub fn get_term(conn: &Connection, term_id: &str) -> anyhow::Result<Option<Term>> {
    let sql = format!("SELECT {} FROM terms WHERE id = ?", TERM_COLUMNS);
    let term = conn
        .query_row(&sql, [term_id], term_from_row)
        .optional()
        .with_context(|| format!("failed to read term {}", term_id))?;
    Ok(term)
}

/// New terms are never current; that flag only moves through `set_current_term`.
pub fn insert_term(conn: &Connection, new: &NewTerm) -> anyhow::Result<Term> {
    let term = Term {
        id: Uuid::new_v4().to_string(),
        name: new.name.clone(),
        term_type: new.term_type,
        academic_session: format_academic_session(&new.academic_session),
        start_date: new.start_date,
        end_date: new.end_date,
        is_current: false,
        is_active: new.is_active,
    };
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO terms(id, name, term_type, academic_session, start_date, end_date,
                           is_current, is_active, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, 0, ?, ?, ?)",
        (
            &term.id,
            &term.name,
            term.term_type.as_str(),
            &term.academic_session,
            iso(term.start_date),
            iso(term.end_date),
            term.is_active as i64,
            &now,
            &now,
        ),
    )
    .context("failed to insert term")?;
    Ok(term)
}

/// Writes the descriptive fields of `term`; the current/active flags are left as stored.
pub fn update_term(conn: &Connection, term: &Term) -> anyhow::Result<Term> {
    let session = format_academic_session(&term.academic_session);
    let changed = conn
        .execute(
            "UPDATE terms
             SET name = ?, term_type = ?, academic_session = ?, start_date = ?, end_date = ?,
                 updated_at = ?
             WHERE id = ?",
            (
                &term.name,
                term.term_type.as_str(),
                &session,
                iso(term.start_date),
                iso(term.end_date),
                Utc::now().to_rfc3339(),
                &term.id,
            ),
        )
        .context("failed to update term")?;
    if changed == 0 {
        return Err(anyhow!("term not found: {}", term.id));
    }
    get_term(conn, &term.id)?.ok_or_else(|| anyhow!("term not found: {}", term.id))
}

pub fn delete_term(conn: &Connection, term_id: &str) -> anyhow::Result<bool> {
    let changed = conn
        .execute("DELETE FROM terms WHERE id = ?", [term_id])
        .with_context(|| format!("failed to delete term {}", term_id))?;
    Ok(changed > 0)
}

/// Moves the current flag to `term_id`, clearing it everywhere else in one transaction.
pub fn set_current_term(conn: &Connection, term_id: &str) -> anyhow::Result<()> {
    let tx = conn
        .unchecked_transaction()
        .context("failed to start transaction")?;
    let now = Utc::now().to_rfc3339();
    tx.execute(
        "UPDATE terms SET is_current = 0, updated_at = ? WHERE is_current <> 0 AND id <> ?",
        (&now, term_id),
    )
    .context("failed to clear current term")?;
    let changed = tx
        .execute(
            "UPDATE terms SET is_current = 1, updated_at = ? WHERE id = ?",
            (&now, term_id),
        )
        .context("failed to set current term")?;
    if changed == 0 {
        // Dropping the transaction rolls back the cleared flags.
        return Err(anyhow!("term not found: {}", term_id));
    }
    tx.commit().context("failed to commit current term")?;
    Ok(())
}

pub fn set_term_active(conn: &Connection, term_id: &str, active: bool) -> anyhow::Result<bool> {
    let changed = conn
        .execute(
            "UPDATE terms SET is_active = ?, updated_at = ? WHERE id = ?",
            (active as i64, Utc::now().to_rfc3339(), term_id),
        )
        .with_context(|| format!("failed to update term {}", term_id))?;
    Ok(changed > 0)
}
