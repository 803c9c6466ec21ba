//! Derived, rebuildable SQLite read cache (§4.A). The JSONL logs are the
//! source of truth; this cache exists purely to make `list`/`show` queries
//! fast without scanning JSONL on every call. It is never written to
//! directly by a mutation — only rebuilt wholesale from the in-memory graph
//! after a write lands on the log.

use rusqlite::Connection;

use crate::error::Result;
use crate::model::{Behavior, Edge};

/// One schema migration, applied in order against a fresh or existing
/// cache database.
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "initial behaviors/edges cache schema",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "embeddings side-table (§4.A design note)",
        up: MIGRATION_V2_UP,
    },
];

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS behaviors (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    priority INTEGER NOT NULL,
    confidence REAL NOT NULL,
    canonical TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    document TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_behaviors_kind ON behaviors(kind);

CREATE TABLE IF NOT EXISTS edges (
    source TEXT NOT NULL,
    target TEXT NOT NULL,
    kind TEXT NOT NULL,
    weight REAL NOT NULL,
    document TEXT NOT NULL,
    PRIMARY KEY (source, target, kind)
);

CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target);

CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);
"#;

const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS embeddings (
    id TEXT PRIMARY KEY,
    model TEXT NOT NULL,
    vector BLOB NOT NULL
);
"#;

/// Opens (creating if absent) the cache database at `path` and applies any
/// migrations newer than its recorded schema version.
pub fn open(path: &std::path::Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure_connection(&conn)?;
    apply_migrations(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure_connection(&conn)?;
    apply_migrations(&conn)?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

fn apply_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")?;
    let current: u32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))
        .unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current {
            conn.execute_batch(migration.up)?;
            conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [migration.version])?;
            tracing::debug!(version = migration.version, desc = migration.description, "applied cache migration");
        }
    }
    Ok(())
}

/// Wholesale rebuild: drop and repopulate `behaviors`/`edges` from the
/// authoritative in-memory snapshot. Cheaper than incremental updates and
/// avoids the cache ever drifting from the log.
pub fn rebuild(conn: &Connection, behaviors: &[Behavior], edges: &[Edge]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM behaviors", [])?;
    tx.execute("DELETE FROM edges", [])?;
    tx.execute("DELETE FROM embeddings", [])?;

    for b in behaviors {
        let document = serde_json::to_string(b)?;
        tx.execute(
            "INSERT INTO behaviors (id, name, kind, priority, confidence, canonical, tags, created_at, updated_at, document)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                b.id,
                b.name,
                b.kind.as_str(),
                b.priority,
                b.confidence,
                b.content.canonical,
                b.content.tags.join(","),
                b.stats.created_at.to_rfc3339(),
                b.stats.updated_at.to_rfc3339(),
                document,
            ],
        )?;
        if let Some((vector, model)) = b.embedding() {
            let blob: Vec<u8> = vector.iter().flat_map(|v| v.to_le_bytes()).collect();
            tx.execute(
                "INSERT OR REPLACE INTO embeddings (id, model, vector) VALUES (?1, ?2, ?3)",
                rusqlite::params![b.id, model, blob],
            )?;
        }
    }

    for e in edges {
        let document = serde_json::to_string(e)?;
        tx.execute(
            "INSERT OR REPLACE INTO edges (source, target, kind, weight, document)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![e.source, e.target, e.kind.as_str(), e.weight, document],
        )?;
    }

    tx.commit()?;
    Ok(())
}

/// List behaviors matching an optional kind filter, decoded straight from
/// the stored JSON document (the cache never reconstructs a `Behavior` from
/// individual columns — those exist only for indexing/filtering).
pub fn list_behaviors(conn: &Connection, kind_filter: Option<&str>) -> Result<Vec<Behavior>> {
    let mut stmt = match kind_filter {
        Some(_) => conn.prepare("SELECT document FROM behaviors WHERE kind = ?1")?,
        None => conn.prepare("SELECT document FROM behaviors")?,
    };
    let rows = if let Some(kind) = kind_filter {
        stmt.query_map([kind], |row| row.get::<_, String>(0))?
    } else {
        stmt.query_map([], |row| row.get::<_, String>(0))?
    };

    let mut out = Vec::new();
    for row in rows {
        let doc = row?;
        out.push(serde_json::from_str(&doc)?);
    }
    Ok(out)
}

/// Read every stored embedding straight from the derived cache — the fast
/// path `get_all_embeddings` (§4.A) takes instead of decoding every
/// behavior's base64 blob on each call.
pub fn get_all_embeddings(conn: &Connection) -> Result<Vec<(String, String, Vec<f32>)>> {
    let mut stmt = conn.prepare("SELECT id, model, vector FROM embeddings")?;
    let rows = stmt.query_map([], |row| {
        let id: String = row.get(0)?;
        let model: String = row.get(1)?;
        let blob: Vec<u8> = row.get(2)?;
        Ok((id, model, blob))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, model, blob) = row?;
        let vector = blob
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        out.push((id, model, vector));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Behavior, Edge, EdgeKind};
    use chrono::Utc;

    #[test]
    fn rebuild_then_list_roundtrips() {
        let conn = open_in_memory().unwrap();
        let b = Behavior::new("a", "name", "canonical text");
        let e = Edge::new("a", "b", EdgeKind::SimilarTo, 0.5, Utc::now());
        rebuild(&conn, &[b], &[e]).unwrap();
        let listed = list_behaviors(&conn, None).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "a");
    }

    #[test]
    fn kind_filter_narrows_results() {
        let conn = open_in_memory().unwrap();
        let mut constraint = Behavior::new("a", "n", "x");
        constraint.kind = crate::model::BehaviorKind::Constraint;
        let directive = Behavior::new("b", "n", "y");
        rebuild(&conn, &[constraint, directive], &[]).unwrap();
        let listed = list_behaviors(&conn, Some("constraint")).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "a");
    }

    #[test]
    fn migrations_are_idempotent_across_reopen() {
        let conn1 = open_in_memory().unwrap();
        drop(conn1);
        let conn2 = open_in_memory().unwrap();
        let version: u32 = conn2
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, MIGRATIONS.last().unwrap().version);
    }

    #[test]
    fn rebuild_derives_embeddings_from_behavior_metadata() {
        let conn = open_in_memory().unwrap();
        let mut b = Behavior::new("a", "n", "x");
        b.set_embedding(&[1.0, 2.0, 3.0], "test-model");
        rebuild(&conn, &[b], &[]).unwrap();

        let embeddings = get_all_embeddings(&conn).unwrap();
        assert_eq!(embeddings.len(), 1);
        assert_eq!(embeddings[0].0, "a");
        assert_eq!(embeddings[0].1, "test-model");
        assert_eq!(embeddings[0].2, vec![1.0, 2.0, 3.0]);
    }
}
