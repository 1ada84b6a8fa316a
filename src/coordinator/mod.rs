//! Coordinator 모듈 - 전체 탐색 워크플로우
//!
//! ```text
//! Phase 1   : FeedDiscoverer → (체크포인트) → FeedValidator
//! Phase 2..N: RagAgent.run_iteration → LearningAgent.analyze_iteration → 수렴 확인
//! Final     : DiscoveryResults (URL 기준 중복 제거) → 최종 체크포인트
//! ```

mod checkpoint;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use checkpoint::{CheckpointManager, PhaseOneCheckpoint, DEFAULT_KEEP};

use crate::feed::FeedCandidate;
use crate::learning::{
    ConvergenceAssessment, LearningAgent, LearningReport, StrategyRecommendation, DEFAULT_RECENT_ITERATIONS,
};
use crate::llm::{LlmProvider, RetryBudget};
use crate::rag::{url_key, RagAgent, RagStats, Strategy};
use crate::scraper::discover::FeedDiscoverer;
use crate::validator::{FeedValidator, ValidationReport, ValidatorStats};

/// `FORCE_PHASE1` 환경변수 확인 (1, true, yes)
pub fn force_phase1_from_env() -> bool {
    std::env::var("FORCE_PHASE1")
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// 새 실행 ID (UUID v4 앞 8자리)
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// 코디네이터 설정
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// 후보 URL 생성의 기준 URL (예: https://pib.gov.in/RssMain.aspx)
    pub base_url: String,
    /// Phase 1 시작 페이지 (예: https://www.pib.gov.in/ViewRss.aspx)
    pub start_url: String,
    pub max_iterations: usize,
    pub min_quality_score: u32,
    pub candidates_per_iteration: usize,
    pub strategy: Strategy,
    pub max_pages: usize,
    pub checkpoint_dir: PathBuf,
    pub run_id: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://pib.gov.in/RssMain.aspx".to_string(),
            start_url: "https://www.pib.gov.in/ViewRss.aspx".to_string(),
            max_iterations: 5,
            min_quality_score: 60,
            candidates_per_iteration: 50,
            strategy: Strategy::Hybrid,
            max_pages: 500,
            checkpoint_dir: PathBuf::from("./checkpoints"),
            run_id: new_run_id(),
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// 단계별 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseResult {
    pub status: String,
    pub feeds_discovered: usize,
    pub feeds_validated: usize,
    pub validation_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub base_url: String,
    pub max_iterations: usize,
    pub min_quality_score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsSummary {
    pub total_unique_feeds: usize,
    pub total_iterations: usize,
    pub total_urls_tested: usize,
    pub overall_success_rate: f64,
    pub avg_quality_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsStatistics {
    pub rag_agent: Option<RagStats>,
    pub validator_agent: ValidatorStats,
    pub learning_report: LearningReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsAnalysis {
    pub convergence: ConvergenceAssessment,
    pub strategy_recommendation: StrategyRecommendation,
    pub phase_results: BTreeMap<String, PhaseResult>,
}

/// 최종 탐색 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResults {
    pub metadata: RunMetadata,
    pub summary: ResultsSummary,
    pub discovered_feeds: Vec<ValidationReport>,
    pub statistics: ResultsStatistics,
    pub analysis: ResultsAnalysis,
    pub insights: Vec<String>,
}

impl DiscoveryResults {
    /// 보기 좋게 정렬된 JSON으로 저장
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Results saved to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Invalid results file: {}", path.display()))
    }

    /// 품질 점수 상위 `n`개
    pub fn top_feeds(&self, n: usize) -> Vec<&ValidationReport> {
        let mut feeds: Vec<&ValidationReport> = self.discovered_feeds.iter().collect();
        feeds.sort_by(|a, b| b.score.cmp(&a.score));
        feeds.truncate(n);
        feeds
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// 탐색 코디네이터
pub struct Coordinator {
    config: CoordinatorConfig,
    discoverer: FeedDiscoverer,
    validator: Box<dyn FeedValidator>,
    rag: Option<RagAgent>,
    learning: LearningAgent,
    checkpoints: CheckpointManager,
    seeds: Vec<ValidationReport>,
    phase_results: BTreeMap<String, PhaseResult>,
    start_time: DateTime<Utc>,
}

impl Coordinator {
    /// # Arguments
    /// * `llm` - 없으면 Phase 2(RAG 반복)를 건너뜁니다
    pub fn new(
        config: CoordinatorConfig,
        discoverer: FeedDiscoverer,
        validator: Box<dyn FeedValidator>,
        llm: Option<Arc<dyn LlmProvider>>,
        budget: RetryBudget,
    ) -> Result<Self> {
        let checkpoints = CheckpointManager::new(&config.checkpoint_dir)?;
        let rag = llm.map(|llm| RagAgent::new(config.base_url.clone(), llm, budget).with_run_id(config.run_id.clone()));

        tracing::info!(
            "Coordinator initialized (run_id: {}, base: {}, max iterations: {}, validator: {})",
            config.run_id,
            config.base_url,
            config.max_iterations,
            validator.name()
        );

        Ok(Self {
            config,
            discoverer,
            validator,
            rag,
            learning: LearningAgent::new(),
            checkpoints,
            seeds: Vec::new(),
            phase_results: BTreeMap::new(),
            start_time: Utc::now(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.config.run_id
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    pub fn learning(&self) -> &LearningAgent {
        &self.learning
    }

    /// 전체 워크플로우 실행
    ///
    /// 최종 결과를 체크포인트로 저장하고 오래된 체크포인트를 정리한 뒤 결과를 반환합니다.
    pub async fn execute(&mut self, force_phase1: bool) -> Result<DiscoveryResults> {
        self.start_time = Utc::now();
        let force = force_phase1 || force_phase1_from_env();

        tracing::info!("PHASE 1: Initial heuristic discovery");
        let (feeds, from_checkpoint) = self.phase_one_feeds(force).await?;
        self.validate_seeds(feeds, from_checkpoint).await;

        tracing::info!("PHASE 2+: RAG learning and validation iterations");
        self.run_iterations().await;

        tracing::info!("PHASE FINAL: Analysis and results compilation");
        let results = self.final_results();

        self.checkpoints.save_final(&results, &self.config.run_id)?;
        self.checkpoints.cleanup(DEFAULT_KEEP)?;
        Ok(results)
    }

    /// 체크포인트가 있으면 로드, 없으면 탐색 후 저장
    async fn phase_one_feeds(&mut self, force: bool) -> Result<(Vec<FeedCandidate>, bool)> {
        if !force {
            if let Some(checkpoint) = self.checkpoints.load_phase_one(&self.config.run_id) {
                tracing::info!("Resuming from Phase 1 checkpoint");
                self.start_time = checkpoint.timestamp;
                return Ok((checkpoint.feeds, true));
            }
        }

        tracing::info!("Running Phase 1 discovery (max {} pages)", self.config.max_pages);
        let feeds = self
            .discoverer
            .discover(&self.config.start_url)
            .await
            .context("Phase 1 discovery failed")?;

        if !feeds.is_empty() {
            self.checkpoints.save_phase_one(&feeds, &self.config.run_id)?;
        }
        Ok((feeds, false))
    }

    /// 상대 URL을 기준 URL로 해석한 뒤 Phase 1 피드 검증
    async fn validate_seeds(&mut self, feeds: Vec<FeedCandidate>, from_checkpoint: bool) {
        if feeds.is_empty() {
            tracing::warn!("No initial feeds discovered");
            self.phase_results.insert(
                "phase_1".to_string(),
                PhaseResult {
                    status: "warning".to_string(),
                    feeds_discovered: 0,
                    feeds_validated: 0,
                    validation_rate: 0.0,
                },
            );
            return;
        }

        let base = url::Url::parse(&self.config.base_url).ok();
        let mut seen = HashSet::new();
        let urls: Vec<String> = feeds
            .iter()
            .filter_map(|f| {
                if f.url.starts_with("http") {
                    Some(f.url.clone())
                } else {
                    base.as_ref()?.join(&f.url).ok().map(|u| u.to_string())
                }
            })
            .filter(|u| seen.insert(url_key(u)))
            .collect();

        tracing::info!("Validating {} Phase 1 feeds", urls.len());
        let summary = self
            .validator
            .validate_batch(&urls, "phase1", Some(&self.config.run_id))
            .await;
        tracing::info!("{} feeds passed validation", summary.valid_count);

        self.phase_results.insert(
            "phase_1".to_string(),
            PhaseResult {
                status: if from_checkpoint { "loaded_from_checkpoint" } else { "completed" }.to_string(),
                feeds_discovered: feeds.len(),
                feeds_validated: summary.valid_count,
                validation_rate: summary.success_rate,
            },
        );
        self.seeds = summary.validated;
    }

    /// 시드 + RAG 발견 피드 (URL 기준 중복 없음)
    fn current_feeds(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let discovered = self.rag.as_ref().map(|r| r.discovered()).unwrap_or_default();
        self.seeds
            .iter()
            .chain(discovered.iter())
            .map(|r| r.url.clone())
            .filter(|u| seen.insert(url_key(u)))
            .collect()
    }

    async fn run_iterations(&mut self) {
        if self.seeds.is_empty() {
            tracing::warn!("No feeds to learn from in Phase 2");
            return;
        }
        if self.rag.is_none() {
            tracing::warn!("No LLM configured; skipping RAG iterations");
            return;
        }

        let domain = url::Url::parse(&self.config.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        let last = self.config.max_iterations.saturating_sub(1);

        for iteration in 1..self.config.max_iterations {
            tracing::info!("RAG iteration {}/{}", iteration, last);
            let feeds = self.current_feeds();

            let Some(rag) = self.rag.as_mut() else { return };
            let outcome = match rag
                .run_iteration(
                    &feeds,
                    self.config.strategy,
                    self.config.candidates_per_iteration,
                    self.validator.as_mut(),
                )
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Error in iteration {}: {:#}", iteration, e);
                    continue;
                }
            };

            tracing::info!("Found {} new feeds", outcome.new_feeds_found);
            let analysis = self.learning.analyze_iteration(&outcome, &domain, rag.patterns());
            for insight in &analysis.insights {
                tracing::info!("   {}", insight);
            }

            let (stop, reason) = rag.should_stop();
            if stop {
                tracing::info!("Convergence detected: {}", reason);
                break;
            }
            if outcome.new_feeds_found == 0 {
                tracing::info!("No new feeds in iteration {}, stopping early", iteration);
                break;
            }
        }
    }

    /// 현재 상태로 최종 결과 구성
    pub fn final_results(&self) -> DiscoveryResults {
        let mut seen = HashSet::new();
        let discovered = self.rag.as_ref().map(|r| r.discovered()).unwrap_or_default();
        let discovered_feeds: Vec<ValidationReport> = discovered
            .iter()
            .chain(self.seeds.iter())
            .filter(|r| seen.insert(url_key(&r.url)))
            .cloned()
            .collect();

        let rag_stats = self.rag.as_ref().map(RagAgent::stats);
        let validator_stats = self.validator.stats();
        let end_time = Utc::now();

        DiscoveryResults {
            metadata: RunMetadata {
                run_id: self.config.run_id.clone(),
                start_time: self.start_time,
                end_time,
                duration_seconds: (end_time - self.start_time).num_milliseconds() as f64 / 1000.0,
                base_url: self.config.base_url.clone(),
                max_iterations: self.config.max_iterations,
                min_quality_score: self.config.min_quality_score,
            },
            summary: ResultsSummary {
                total_unique_feeds: discovered_feeds.len(),
                total_iterations: rag_stats.as_ref().map(|s| s.iterations_completed).unwrap_or(0),
                total_urls_tested: rag_stats.as_ref().map(|s| s.total_urls_tested).unwrap_or(0),
                overall_success_rate: rag_stats.as_ref().map(|s| s.success_rate).unwrap_or(0.0),
                avg_quality_score: validator_stats.average_quality,
            },
            discovered_feeds,
            statistics: ResultsStatistics {
                rag_agent: rag_stats,
                validator_agent: validator_stats,
                learning_report: self.learning.learning_report(),
            },
            analysis: ResultsAnalysis {
                convergence: self.learning.convergence_assessment(DEFAULT_RECENT_ITERATIONS),
                strategy_recommendation: self.learning.strategy_recommendation(),
                phase_results: self.phase_results.clone(),
            },
            insights: self.learning.insights().to_vec(),
        }
    }
}
