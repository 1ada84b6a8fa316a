//! Validation Store - 검증 이력 저장소 (추가 전용)
//!
//! 모든 검증 결과를 JSON 보고서와 함께 `validations` 테이블에 쌓습니다.
//! 갱신/삭제 API는 없습니다.
//! 저장 위치: ~/.bharat-connect/validation_history.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OpenFlags, Row};
use serde::Serialize;

use super::ValidationReport;
use crate::content::ensure_data_dir;

/// 저장된 검증 기록
#[derive(Debug, Clone, Serialize)]
pub struct StoredValidation {
    pub id: i64,
    pub source: String,
    pub validator: String,
    pub run_id: Option<String>,
    pub report: ValidationReport,
}

/// 검증 이력 저장소
#[derive(Clone)]
pub struct ValidationStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl ValidationStore {
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

    /// 기본 위치에서 열기 (~/.bharat-connect/validation_history.db)
    pub fn open_default() -> Result<Self> {
        let data_dir = ensure_data_dir()?;
        Self::open(&data_dir.join("validation_history.db"))
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .context("Failed to enable WAL journal")?;
        tracing::debug!("Validation store journal mode: {}", mode);

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS validations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                source TEXT NOT NULL,
                validator TEXT NOT NULL,
                valid INTEGER NOT NULL,
                quality_score INTEGER NOT NULL,
                run_id TEXT,
                report TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_validations_url ON validations(url);
            CREATE INDEX IF NOT EXISTS idx_validations_ts ON validations(timestamp);",
        )
        .context("Failed to create validations table")?;

        tracing::debug!("Validation store initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 검증 결과 저장 → 행 ID
    pub fn save_report(
        &self,
        report: &ValidationReport,
        source: &str,
        validator: &str,
        run_id: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let json = serde_json::to_string(report).context("Failed to serialize report")?;

        conn.execute(
            "INSERT INTO validations (url, timestamp, source, validator, valid, quality_score, run_id, report)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                report.url,
                report.timestamp.to_rfc3339(),
                source,
                validator,
                report.valid,
                report.score,
                run_id,
                json,
            ],
        )
        .context("Failed to insert validation")?;

        Ok(conn.last_insert_rowid())
    }

    /// 최근 검증 기록 (최신순)
    pub fn fetch_recent(&self, limit: usize) -> Result<Vec<StoredValidation>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT id, source, validator, run_id, report FROM validations
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(params![limit as i64], row_to_validation)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(rows)
    }

    /// URL별 검증 기록 (최신순)
    pub fn fetch_by_url(&self, url: &str) -> Result<Vec<StoredValidation>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT id, source, validator, run_id, report FROM validations
             WHERE url = ?1
             ORDER BY timestamp DESC, id DESC",
        )?;

        let rows = stmt
            .query_map(params![url], row_to_validation)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(rows)
    }

    /// 전체 기록 수
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM validations", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn row_to_validation(row: &Row<'_>) -> rusqlite::Result<StoredValidation> {
    let json: String = row.get(4)?;
    let report = serde_json::from_str(&json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(StoredValidation {
        id: row.get(0)?,
        source: row.get(1)?,
        validator: row.get(2)?,
        run_id: row.get(3)?,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn report(url: &str, valid: bool, score: u32) -> ValidationReport {
        let mut r = ValidationReport::new(url);
        r.valid = valid;
        r.score = score;
        r
    }

    #[test]
    fn test_save_and_fetch() {
        let dir = TempDir::new().unwrap();
        let store = ValidationStore::open(&dir.path().join("v.db")).unwrap();

        let first = store
            .save_report(&report("https://a/rss", true, 80), "phase1", "ai", Some("abcd1234"))
            .unwrap();
        let second = store
            .save_report(&report("https://a/rss", false, 20), "rag_iter_1", "ai", None)
            .unwrap();
        store
            .save_report(&report("https://b/rss", true, 70), "phase1", "lightweight", None)
            .unwrap();
        assert!(second > first);

        assert_eq!(store.count().unwrap(), 3);

        let history = store.fetch_by_url("https://a/rss").unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().any(|h| h.run_id.as_deref() == Some("abcd1234")));

        let recent = store.fetch_recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].report.url, "https://b/rss");
        assert_eq!(recent[0].validator, "lightweight");
    }

    #[test]
    fn test_reopen_keeps_history() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("v.db");
        {
            let store = ValidationStore::open(&path).unwrap();
            store.save_report(&report("https://a", true, 90), "cli", "ai", None).unwrap();
        }
        let store = ValidationStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }
}
