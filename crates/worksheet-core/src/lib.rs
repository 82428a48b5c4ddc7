#[cfg(test)]
mod tests;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::{env, fs, path::PathBuf, sync::Arc};
use thiserror::Error;

pub mod graph;
pub mod tags;

// Search module (enabled with "search" feature)
#[cfg(feature = "search")]
pub mod search;

pub use graph::TagGraph;
pub use tags::{TagCount, TagSet};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Message(String),
    #[error("page {0} not found")]
    NotFound(i64),
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

const PAGE_COLUMNS: &str = "id, source_name, source_path, page_number, text, tags, embedding, derived_summary, created_at, updated_at";

/// Durable store of worksheet pages.
///
/// The store is the source of truth for page content. Cloning is cheap and
/// every clone shares the same connection.
#[derive(Clone)]
pub struct PageStore {
    db_path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone, Default)]
pub struct StoreOverrides {
    pub base_root: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
}

/// A single page of an uploaded document.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Page {
    pub id: i64,
    pub source_name: String,
    pub source_path: Option<String>,
    /// 1-based position in the source document
    pub page_number: u32,
    pub text: String,
    pub tags: TagSet,
    #[serde(skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    pub derived_summary: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Page {
    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|v| !v.is_empty())
    }

    pub fn is_image_heavy(&self) -> bool {
        self.tags.contains(tags::IMAGE_HEAVY_TAG)
    }
}

/// Fields supplied when a page is first created. Embeddings are attached
/// afterwards by index maintenance.
#[derive(Debug, Clone, Default)]
pub struct NewPage {
    pub source_name: String,
    pub source_path: Option<String>,
    pub page_number: u32,
    pub text: String,
    pub tags: TagSet,
    pub derived_summary: Option<String>,
}

/// Per-document overview.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SourceSummary {
    pub source_name: String,
    pub page_count: usize,
    pub image_heavy_count: usize,
}

impl PageStore {
    pub fn initialize(overrides: StoreOverrides) -> CoreResult<Self> {
        let db_path = overrides
            .db_path
            .or_else(|| env_path("WORKSHEET_DB_PATH"))
            .or_else(|| {
                overrides
                    .base_root
                    .or_else(|| env_path("WORKSHEET_ROOT"))
                    .or_else(default_base_root)
                    .map(|root| root.join("pages.db"))
            })
            .ok_or_else(|| CoreError::Message("Unable to resolve user home directory".into()))?;
        Self::open(db_path)
    }

    pub fn open(db_path: PathBuf) -> CoreResult<Self> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS pages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_name TEXT NOT NULL,
                source_path TEXT,
                page_number INTEGER NOT NULL,
                text TEXT NOT NULL DEFAULT '',
                tags TEXT NOT NULL DEFAULT '',
                embedding BLOB,
                derived_summary TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(source_name, page_number)
            );

            CREATE INDEX IF NOT EXISTS idx_pages_source ON pages(source_name);
        ",
        )?;

        ensure_schema_migrations(&conn)?;

        Ok(Self {
            db_path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    pub fn create(&self, page: NewPage) -> CoreResult<Page> {
        if page.source_name.trim().is_empty() {
            return Err(CoreError::Message("Source name is required.".into()));
        }
        if page.page_number == 0 {
            return Err(CoreError::Message("Page numbers start at 1.".into()));
        }
        let ts = now_iso();
        let id = self.with_conn(|conn| {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT id FROM pages WHERE source_name = ?1 AND page_number = ?2",
                    params![page.source_name, page.page_number],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Err(CoreError::Message(format!(
                    "Page {} of \"{}\" already exists.",
                    page.page_number, page.source_name
                )));
            }
            conn.execute(
                "INSERT INTO pages (source_name, source_path, page_number, text, tags, derived_summary, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    page.source_name,
                    page.source_path,
                    page.page_number,
                    page.text,
                    page.tags.to_store_string(),
                    page.derived_summary,
                    ts
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        self.require(id)
    }

    pub fn get(&self, id: i64) -> CoreResult<Option<Page>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {PAGE_COLUMNS} FROM pages WHERE id = ?1"))?;
            let page = stmt.query_row([id], row_to_page).optional()?;
            Ok(page)
        })
    }

    /// Like [`get`](Self::get) but a missing page is an error.
    pub fn require(&self, id: i64) -> CoreResult<Page> {
        self.get(id)?.ok_or(CoreError::NotFound(id))
    }

    /// Write back every mutable field of `page`.
    pub fn update(&self, page: &Page) -> CoreResult<()> {
        let ts = now_iso();
        let embedding = page.embedding.as_deref().map(embedding_to_bytes);
        let changed = self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE pages SET source_path = ?1, text = ?2, tags = ?3, embedding = ?4, derived_summary = ?5, updated_at = ?6
                 WHERE id = ?7",
                params![
                    page.source_path,
                    page.text,
                    page.tags.to_store_string(),
                    embedding,
                    page.derived_summary,
                    ts,
                    page.id
                ],
            )?;
            Ok(changed)
        })?;
        if changed == 0 {
            return Err(CoreError::NotFound(page.id));
        }
        Ok(())
    }

    pub fn set_tags(&self, id: i64, tags: &TagSet) -> CoreResult<Page> {
        self.update_column(id, "tags", tags.to_store_string())?;
        self.require(id)
    }

    pub fn set_embedding(&self, id: i64, embedding: Option<&[f32]>) -> CoreResult<()> {
        self.update_column(id, "embedding", embedding.map(embedding_to_bytes))
    }

    pub fn set_derived_summary(&self, id: i64, summary: Option<&str>) -> CoreResult<()> {
        self.update_column(id, "derived_summary", summary)
    }

    /// All pages in id order.
    pub fn list_all(&self) -> CoreResult<Vec<Page>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {PAGE_COLUMNS} FROM pages ORDER BY id"))?;
            let rows = stmt
                .query_map([], row_to_page)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_by_filter<F>(&self, predicate: F) -> CoreResult<Vec<Page>>
    where
        F: Fn(&Page) -> bool,
    {
        Ok(self.list_all()?.into_iter().filter(|p| predicate(p)).collect())
    }

    pub fn list_by_source(&self, source_name: &str) -> CoreResult<Vec<Page>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PAGE_COLUMNS} FROM pages WHERE source_name = ?1 ORDER BY page_number"
            ))?;
            let rows = stmt
                .query_map([source_name], row_to_page)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count(&self) -> CoreResult<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(1) FROM pages", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    /// Delete every page. Ids are never handed out again.
    pub fn reset(&self) -> CoreResult<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM pages", [])?;
            Ok(removed)
        })
    }

    /// Every tag in use, case-insensitive alphabetical.
    pub fn list_tags(&self) -> CoreResult<Vec<String>> {
        let sets = self.all_tag_sets()?;
        Ok(tags::aggregate_tags(&sets))
    }

    pub fn top_tags(&self, limit: usize) -> CoreResult<Vec<TagCount>> {
        let sets = self.all_tag_sets()?;
        Ok(tags::count_tags(&sets, limit))
    }

    pub fn list_sources(&self) -> CoreResult<Vec<SourceSummary>> {
        let mut summaries: Vec<SourceSummary> = Vec::new();
        for page in self.list_all()? {
            let image_heavy = usize::from(page.is_image_heavy());
            match summaries.iter_mut().find(|s| s.source_name == page.source_name) {
                Some(summary) => {
                    summary.page_count += 1;
                    summary.image_heavy_count += image_heavy;
                }
                None => summaries.push(SourceSummary {
                    source_name: page.source_name,
                    page_count: 1,
                    image_heavy_count: image_heavy,
                }),
            }
        }
        Ok(summaries)
    }

    /// Give untagged pages the folder components of their source path.
    /// Returns the number of pages that gained tags.
    pub fn backfill_folder_tags(&self) -> CoreResult<usize> {
        let mut updated = 0;
        for page in self.list_by_filter(|p| p.tags.is_empty())? {
            let folder_tags = tags::folder_tags(&page.source_name);
            if folder_tags.is_empty() {
                continue;
            }
            self.set_tags(page.id, &folder_tags)?;
            updated += 1;
        }
        Ok(updated)
    }

    pub fn tag_graph(&self) -> CoreResult<TagGraph> {
        Ok(TagGraph::build(&self.list_all()?))
    }

    fn all_tag_sets(&self) -> CoreResult<Vec<TagSet>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT tags FROM pages")?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .map(|raw| raw.map(|raw| TagSet::parse(&raw)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn update_column<V: rusqlite::ToSql>(&self, id: i64, column: &str, value: V) -> CoreResult<()> {
        let ts = now_iso();
        let changed = self.with_conn(|conn| {
            let changed = conn.execute(
                &format!("UPDATE pages SET {column} = ?1, updated_at = ?2 WHERE id = ?3"),
                params![value, ts, id],
            )?;
            Ok(changed)
        })?;
        if changed == 0 {
            return Err(CoreError::NotFound(id));
        }
        Ok(())
    }

    fn with_conn<F, T>(&self, action: F) -> CoreResult<T>
    where
        F: FnOnce(&Connection) -> CoreResult<T>,
    {
        let conn = self.conn.lock();
        action(&conn)
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn row_to_page(row: &rusqlite::Row<'_>) -> rusqlite::Result<Page> {
    let embedding = match row.get::<_, Option<Vec<u8>>>(6)? {
        Some(blob) if !blob.is_empty() => Some(bytes_to_embedding(&blob).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Blob,
                format!("corrupt embedding blob of {} bytes", blob.len()).into(),
            )
        })?),
        _ => None,
    };
    Ok(Page {
        id: row.get(0)?,
        source_name: row.get(1)?,
        source_path: row.get(2)?,
        page_number: row.get(3)?,
        text: row.get(4)?,
        tags: TagSet::parse(&row.get::<_, String>(5)?),
        embedding,
        derived_summary: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn ensure_schema_migrations(conn: &Connection) -> CoreResult<()> {
    // Databases created before captioning support lack derived_summary.
    let mut stmt = conn.prepare("PRAGMA table_info(pages)")?;
    let cols = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    if !cols.iter().any(|c| c == "derived_summary") {
        conn.execute("ALTER TABLE pages ADD COLUMN derived_summary TEXT", [])?;
    }
    Ok(())
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

fn default_base_root() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".worksheet-search"))
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}
