//! 체크포인트 관리
//!
//! Phase 1 결과와 최종 결과를 JSON 파일로 남겨, 실패한 실행을
//! Phase 1 없이 다시 시작할 수 있게 합니다.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DiscoveryResults;
use crate::feed::FeedCandidate;

/// 기본 보관 개수
pub const DEFAULT_KEEP: usize = 5;

/// Phase 1 체크포인트 파일 내용
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseOneCheckpoint {
    pub checkpoint_type: String,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub feeds_count: usize,
    pub feeds: Vec<FeedCandidate>,
}

/// 체크포인트 디렉토리 관리자
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// 디렉토리가 없으면 생성
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create checkpoint directory: {}", dir.display()))?;
            tracing::info!("Created checkpoint directory: {}", dir.display());
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn phase_one_path(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("phase_1_checkpoint_{}.json", run_id))
    }

    fn final_path(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("final_results_checkpoint_{}.json", run_id))
    }

    pub fn save_phase_one(&self, feeds: &[FeedCandidate], run_id: &str) -> Result<PathBuf> {
        let checkpoint = PhaseOneCheckpoint {
            checkpoint_type: "phase_1_complete".to_string(),
            run_id: run_id.to_string(),
            timestamp: Utc::now(),
            feeds_count: feeds.len(),
            feeds: feeds.to_vec(),
        };

        let path = self.phase_one_path(run_id);
        let json = serde_json::to_string_pretty(&checkpoint)?;
        fs::write(&path, json).with_context(|| format!("Failed to write checkpoint: {}", path.display()))?;

        tracing::info!("Phase 1 checkpoint saved: {} ({} feeds)", path.display(), feeds.len());
        Ok(path)
    }

    /// Phase 1 체크포인트 로드. 없거나 읽을 수 없으면 None
    pub fn load_phase_one(&self, run_id: &str) -> Option<PhaseOneCheckpoint> {
        let path = self.phase_one_path(run_id);
        if !path.exists() {
            return None;
        }

        let loaded = fs::read_to_string(&path)
            .context("Failed to read checkpoint")
            .and_then(|text| serde_json::from_str::<PhaseOneCheckpoint>(&text).context("Invalid checkpoint JSON"));

        match loaded {
            Ok(checkpoint) => {
                tracing::info!(
                    "Loaded Phase 1 checkpoint: {} ({} feeds)",
                    path.display(),
                    checkpoint.feeds_count
                );
                Some(checkpoint)
            }
            Err(e) => {
                tracing::error!("Error loading checkpoint {}: {:#}", path.display(), e);
                None
            }
        }
    }

    pub fn save_final(&self, results: &DiscoveryResults, run_id: &str) -> Result<PathBuf> {
        let path = self.final_path(run_id);
        results.save(&path)?;
        tracing::info!("Final results checkpoint saved: {}", path.display());
        Ok(path)
    }

    /// `.json` 체크포인트 목록 (파일명 내림차순)
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(vec![]);
        }

        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read {}", self.dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
            .collect();

        files.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
        Ok(files)
    }

    /// 앞에서 `keep`개만 남기고 삭제. 삭제한 수 반환
    pub fn cleanup(&self, keep: usize) -> Result<usize> {
        let mut removed = 0;
        for path in self.list()?.into_iter().skip(keep) {
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!("Removed old checkpoint: {}", path.display());
                    removed += 1;
                }
                Err(e) => tracing::error!("Error removing checkpoint {}: {}", path.display(), e),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_phase_one_roundtrip_and_missing() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("checkpoints")).unwrap();
        assert!(manager.dir().exists());

        assert!(manager.load_phase_one("abc12345").is_none());

        let feeds = vec![
            FeedCandidate::new("https://pib.gov.in/RssMain.aspx?ModId=6").with_title("PIB"),
            FeedCandidate::new("/RssMain.aspx?ModId=7"),
        ];
        let path = manager.save_phase_one(&feeds, "abc12345").unwrap();
        assert!(path.ends_with("phase_1_checkpoint_abc12345.json"));

        let loaded = manager.load_phase_one("abc12345").unwrap();
        assert_eq!(loaded.checkpoint_type, "phase_1_complete");
        assert_eq!(loaded.feeds_count, 2);
        assert_eq!(loaded.feeds[0].title.as_deref(), Some("PIB"));
    }

    #[test]
    fn test_corrupt_checkpoint_is_ignored() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path()).unwrap();
        fs::write(dir.path().join("phase_1_checkpoint_bad.json"), "{not json").unwrap();
        assert!(manager.load_phase_one("bad").is_none());
    }

    #[test]
    fn test_list_and_cleanup() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path()).unwrap();

        for id in ["a1", "b2", "c3", "d4", "e5", "f6", "g7"] {
            manager.save_phase_one(&[], id).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let list = manager.list().unwrap();
        assert_eq!(list.len(), 7);
        assert!(list[0].ends_with("phase_1_checkpoint_g7.json"));

        assert_eq!(manager.cleanup(DEFAULT_KEEP).unwrap(), 2);
        let list = manager.list().unwrap();
        assert_eq!(list.len(), 5);
        assert!(!dir.path().join("phase_1_checkpoint_a1.json").exists());
        assert!(dir.path().join("notes.txt").exists());
    }
}
