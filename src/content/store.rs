//! Content Store - rusqlite 기반 다국어 콘텐츠 저장소
//!
//! 수집된 RSS 항목과 DIKSHA 교육 콘텐츠를 저장하고 검색합니다.
//! 저장 위치: ~/.bharat-connect/content.db

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, Row};
use serde::{Deserialize, Serialize};

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.bharat-connect/)
///
/// `BHARAT_CONNECT_DATA_DIR` 환경변수가 있으면 그 경로를 사용합니다.
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("BHARAT_CONNECT_DATA_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }

    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bharat-connect")
}

/// 데이터 디렉토리 생성 후 반환
pub(crate) fn ensure_data_dir() -> Result<PathBuf> {
    let data_dir = get_data_dir();
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;
    }
    Ok(data_dir)
}

// ============================================================================
// Types
// ============================================================================

/// 콘텐츠 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Rss,
    Diksha,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Rss => "rss",
            ContentKind::Diksha => "diksha",
        }
    }

    fn from_db(s: &str) -> Self {
        match s {
            "diksha" => ContentKind::Diksha,
            _ => ContentKind::Rss,
        }
    }
}

/// 검색 가능한 콘텐츠 한 건
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    /// 원본 식별자 (RSS guid 해시, DIKSHA identifier)
    pub content_id: String,
    pub kind: ContentKind,
    /// 출처 이름 (피드 제목 또는 "DIKSHA")
    pub source: String,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub body: Option<String>,
    /// ISO 639-1 언어 코드 목록
    pub languages: Vec<String>,
    pub board: Option<String>,
    pub grades: Vec<String>,
    pub subjects: Vec<String>,
    pub published_at: Option<String>,
}

impl ContentItem {
    /// 첫 번째 언어 코드 (없으면 en)
    pub fn primary_language(&self) -> &str {
        self.languages.first().map(String::as_str).unwrap_or("en")
    }

    /// 본문 (body가 없으면 description)
    pub fn text(&self) -> &str {
        self.body
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .or(self.description.as_deref())
            .unwrap_or("")
    }
}

/// 저장된 콘텐츠 (DB 메타데이터 포함)
#[derive(Debug, Clone, Serialize)]
pub struct StoredContent {
    pub id: i64,
    pub item: ContentItem,
    pub updated_at: DateTime<Utc>,
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct ContentStats {
    pub total: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub by_language: BTreeMap<String, usize>,
    pub db_path: PathBuf,
}

// ============================================================================
// ContentStore
// ============================================================================

/// Content Store - 동기 콘텐츠 저장소
///
/// URL 기준으로 유일하며, 제목/설명/본문에 FTS5 인덱스를 둡니다.
pub struct ContentStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

const SELECT_COLUMNS: &str = "c.id, c.content_id, c.kind, c.source, c.url, c.title, c.description, \
     c.body, c.languages, c.board, c.grades, c.subjects, c.published_at, c.updated_at";

impl ContentStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    /// 기본 위치에서 열기 (~/.bharat-connect/content.db)
    pub fn open_default() -> Result<Self> {
        let data_dir = ensure_data_dir()?;
        Self::open(&data_dir.join("content.db"))
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS contents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                source TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                description TEXT,
                body TEXT,
                languages TEXT NOT NULL DEFAULT '',
                board TEXT,
                grades TEXT NOT NULL DEFAULT '[]',
                subjects TEXT NOT NULL DEFAULT '[]',
                published_at TEXT,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create contents table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_contents_kind ON contents(kind)",
            [],
        )
        .context("Failed to create kind index")?;

        // FTS5 가상 테이블 (키워드 검색용)
        // source: https://www.sqlite.org/fts5.html
        let fts_result = conn.execute(
            "CREATE VIRTUAL TABLE IF NOT EXISTS contents_fts USING fts5(
                title,
                description,
                body,
                content=contents,
                content_rowid=id
            )",
            [],
        );

        if let Err(e) = fts_result {
            tracing::warn!("FTS5 not available (optional): {}", e);
        } else {
            conn.execute_batch(
                r#"
                CREATE TRIGGER IF NOT EXISTS contents_ai AFTER INSERT ON contents BEGIN
                    INSERT INTO contents_fts(rowid, title, description, body)
                    VALUES (new.id, new.title, new.description, new.body);
                END;

                CREATE TRIGGER IF NOT EXISTS contents_ad AFTER DELETE ON contents BEGIN
                    INSERT INTO contents_fts(contents_fts, rowid, title, description, body)
                    VALUES('delete', old.id, old.title, old.description, old.body);
                END;

                CREATE TRIGGER IF NOT EXISTS contents_au AFTER UPDATE ON contents BEGIN
                    INSERT INTO contents_fts(contents_fts, rowid, title, description, body)
                    VALUES('delete', old.id, old.title, old.description, old.body);
                    INSERT INTO contents_fts(rowid, title, description, body)
                    VALUES (new.id, new.title, new.description, new.body);
                END;
                "#,
            )
            .context("Failed to create FTS triggers")?;
        }

        tracing::debug!("Content store initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 콘텐츠 저장 (URL이 같으면 갱신)
    pub fn upsert(&self, item: &ContentItem) -> Result<i64> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let now = Utc::now().to_rfc3339();

        // INSERT OR REPLACE는 삭제 트리거를 건너뛰므로 FTS 인덱스가 어긋난다
        conn.execute(
            "INSERT INTO contents (content_id, kind, source, url, title, description, body,
                                   languages, board, grades, subjects, published_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(url) DO UPDATE SET
                content_id = excluded.content_id,
                kind = excluded.kind,
                source = excluded.source,
                title = excluded.title,
                description = excluded.description,
                body = excluded.body,
                languages = excluded.languages,
                board = excluded.board,
                grades = excluded.grades,
                subjects = excluded.subjects,
                published_at = excluded.published_at,
                updated_at = excluded.updated_at",
            params![
                item.content_id,
                item.kind.as_str(),
                item.source,
                item.url,
                item.title,
                item.description,
                item.body,
                encode_languages(&item.languages),
                item.board,
                serde_json::to_string(&item.grades)?,
                serde_json::to_string(&item.subjects)?,
                item.published_at,
                now,
            ],
        )
        .context("Failed to upsert content")?;

        let id: i64 = conn
            .query_row(
                "SELECT id FROM contents WHERE url = ?1",
                params![item.url],
                |row| row.get(0),
            )
            .context("Failed to read content id")?;

        tracing::debug!("Stored content: {} (id={})", item.url, id);
        Ok(id)
    }

    /// URL로 조회
    pub fn get_by_url(&self, url: &str) -> Result<Option<StoredContent>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let sql = format!("SELECT {} FROM contents c WHERE c.url = ?1", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let item = stmt.query_row(params![url], row_to_content).ok();

        Ok(item)
    }

    /// 키워드 검색
    ///
    /// FTS5 MATCH를 먼저 시도하고, 결과가 없거나 FTS5를 쓸 수 없으면
    /// 모든 단어를 포함하는 LIKE 검색으로 대체합니다.
    ///
    /// # Arguments
    /// * `languages` - 비어 있지 않으면 이 언어 코드 중 하나를 가진 항목만
    /// * `kind` - 콘텐츠 종류 필터
    pub fn search(
        &self,
        query: &str,
        languages: &[String],
        kind: Option<ContentKind>,
        limit: usize,
    ) -> Result<Vec<StoredContent>> {
        let words = query_words(query);
        if words.is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        match self.search_fts(&words, languages, kind, limit) {
            Ok(results) if !results.is_empty() => return Ok(results),
            Ok(_) => {}
            Err(e) => tracing::debug!("FTS5 search failed, falling back to LIKE: {}", e),
        }

        self.search_like(&words, languages, kind, limit)
    }

    fn search_fts(
        &self,
        words: &[String],
        languages: &[String],
        kind: Option<ContentKind>,
        limit: usize,
    ) -> Result<Vec<StoredContent>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let match_expr = escape_fts5_query(words);
        let mut values = vec![SqlValue::Text(match_expr)];
        let filters = filter_clause(languages, kind, &mut values);
        values.push(SqlValue::Integer(limit as i64));

        let sql = format!(
            "SELECT {}
             FROM contents_fts
             JOIN contents c ON c.id = contents_fts.rowid
             WHERE contents_fts MATCH ?{}
             ORDER BY bm25(contents_fts)
             LIMIT ?",
            SELECT_COLUMNS, filters
        );

        let mut stmt = conn.prepare(&sql)?;
        let results = stmt
            .query_map(params_from_iter(values.iter()), row_to_content)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(results)
    }

    fn search_like(
        &self,
        words: &[String],
        languages: &[String],
        kind: Option<ContentKind>,
        limit: usize,
    ) -> Result<Vec<StoredContent>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut values = Vec::new();
        let mut clauses = Vec::new();
        for word in words {
            clauses.push(
                "(LOWER(c.title) LIKE ? OR LOWER(COALESCE(c.description, '')) LIKE ? \
                 OR LOWER(COALESCE(c.body, '')) LIKE ?)",
            );
            let pattern = format!("%{}%", word.to_lowercase());
            for _ in 0..3 {
                values.push(SqlValue::Text(pattern.clone()));
            }
        }
        let filters = filter_clause(languages, kind, &mut values);
        values.push(SqlValue::Integer(limit as i64));

        let sql = format!(
            "SELECT {} FROM contents c
             WHERE {}{}
             ORDER BY c.updated_at DESC
             LIMIT ?",
            SELECT_COLUMNS,
            clauses.join(" AND "),
            filters
        );

        let mut stmt = conn.prepare(&sql)?;
        let results = stmt
            .query_map(params_from_iter(values.iter()), row_to_content)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(results)
    }

    /// 저장소 통계
    pub fn stats(&self) -> Result<ContentStats> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut by_kind = BTreeMap::new();
        let mut stmt = conn.prepare("SELECT kind, COUNT(*) FROM contents GROUP BY kind")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for (kind, count) in rows.filter_map(|r| r.ok()) {
            by_kind.insert(kind, count as usize);
        }

        let mut by_language: BTreeMap<String, usize> = BTreeMap::new();
        let mut stmt = conn.prepare("SELECT languages FROM contents")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for encoded in rows.filter_map(|r| r.ok()) {
            for lang in decode_languages(&encoded) {
                *by_language.entry(lang).or_insert(0) += 1;
            }
        }

        Ok(ContentStats {
            total: by_kind.values().sum(),
            by_kind,
            by_language,
            db_path: self.db_path.clone(),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn row_to_content(row: &Row<'_>) -> rusqlite::Result<StoredContent> {
    let kind: String = row.get(2)?;
    let languages: String = row.get(8)?;
    let grades: String = row.get(10)?;
    let subjects: String = row.get(11)?;

    Ok(StoredContent {
        id: row.get(0)?,
        item: ContentItem {
            content_id: row.get(1)?,
            kind: ContentKind::from_db(&kind),
            source: row.get(3)?,
            url: row.get(4)?,
            title: row.get(5)?,
            description: row.get(6)?,
            body: row.get(7)?,
            languages: decode_languages(&languages),
            board: row.get(9)?,
            grades: serde_json::from_str(&grades).unwrap_or_default(),
            subjects: serde_json::from_str(&subjects).unwrap_or_default(),
            published_at: row.get(12)?,
        },
        updated_at: parse_datetime(row.get::<_, String>(13)?),
    })
}

/// 언어 필터와 종류 필터 SQL 조각 (값은 `values`에 추가)
fn filter_clause(
    languages: &[String],
    kind: Option<ContentKind>,
    values: &mut Vec<SqlValue>,
) -> String {
    let mut sql = String::new();

    if !languages.is_empty() {
        let ors: Vec<&str> = languages.iter().map(|_| "c.languages LIKE ?").collect();
        sql.push_str(&format!(" AND ({})", ors.join(" OR ")));
        for lang in languages {
            values.push(SqlValue::Text(format!("%,{},%", lang.to_lowercase())));
        }
    }

    if let Some(kind) = kind {
        sql.push_str(" AND c.kind = ?");
        values.push(SqlValue::Text(kind.as_str().to_string()));
    }

    sql
}

/// 언어 코드 목록을 `,hi,en,` 형태로 인코딩 (LIKE 필터용)
fn encode_languages(languages: &[String]) -> String {
    if languages.is_empty() {
        return String::new();
    }
    format!(
        ",{},",
        languages
            .iter()
            .map(|l| l.trim().to_lowercase())
            .collect::<Vec<_>>()
            .join(",")
    )
}

fn decode_languages(encoded: &str) -> Vec<String> {
    encoded
        .split(',')
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// 검색어를 단어 목록으로 정리 (구두점 제거)
///
/// 인도계 문자의 결합 기호(모음 기호, virama)는 단어의 일부로 남깁니다.
fn query_words(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| *c == '_' || *c == '-' || !(c.is_ascii_punctuation() || matches!(c, '।' | '॥')))
                .collect::<String>()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// FTS5 쿼리 이스케이프
///
/// 각 단어를 큰따옴표로 감싸 문자열 토큰으로 취급합니다 (암묵적 AND).
/// source: https://www.sqlite.org/fts5.html#full_text_query_syntax
fn escape_fts5_query(words: &[String]) -> String {
    words
        .iter()
        .map(|w| format!("\"{}\"", w.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Tests
// ============================================================================
