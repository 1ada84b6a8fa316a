//! RAG 모듈 - 패턴 학습 기반 피드 탐색
//!
//! 알려진 피드 URL에서 쿼리 파라미터 패턴을 학습하고(로컬 분석 + LLM),
//! 새 후보 URL을 생성해 검증하는 반복 루프의 한 단계를 담당합니다.
//!
//! ## 흐름
//! ```text
//! feeds → UrlStructureAnalyzer ┐
//!       → PatternLearner(LLM)  ┴→ LearnedPatterns → UrlGenerator → FeedValidator
//! ```

mod analyzer;
mod generator;
mod patterns;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use analyzer::{NumericRange, ParamKind, ParameterSummary, UrlStructure, UrlStructureAnalyzer};
pub use generator::{query_param_names, strip_internal_params, url_key, Strategy, UrlGenerator};
pub use patterns::{Coverage, Dependency, LearnedParameter, LearnedPatterns, PatternLearner, Suggestion};

use crate::llm::{LlmProvider, RetryBudget};
use crate::validator::{BatchSummary, FeedValidator, ValidationReport};

/// 한 번의 반복 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationOutcome {
    pub iteration: usize,
    pub strategy: Strategy,
    pub candidates_generated: usize,
    pub validated_count: usize,
    pub rejected_count: usize,
    /// 이번 반복에서 처음 발견된 유효 피드 수
    pub new_feeds_found: usize,
    pub total_feeds: usize,
    pub validated: Vec<ValidationReport>,
    pub rejected: Vec<ValidationReport>,
}

/// RAG 에이전트 통계
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagStats {
    pub total_discovered_feeds: usize,
    pub total_urls_generated: usize,
    pub total_urls_tested: usize,
    pub success_rate: f64,
    pub iterations_completed: usize,
    pub iteration_history: Vec<IterationOutcome>,
}

/// RAG 에이전트
pub struct RagAgent {
    base_url: String,
    learner: PatternLearner,
    patterns: LearnedPatterns,
    discovered: Vec<ValidationReport>,
    discovered_urls: HashSet<String>,
    iteration_count: usize,
    total_generated: usize,
    total_tested: usize,
    history: Vec<IterationOutcome>,
    run_id: Option<String>,
}

impl RagAgent {
    pub fn new(base_url: impl Into<String>, llm: Arc<dyn LlmProvider>, budget: RetryBudget) -> Self {
        let base_url = base_url.into();
        tracing::info!("RAG agent initialized for {}", base_url);

        Self {
            base_url,
            learner: PatternLearner::new(llm, budget),
            patterns: LearnedPatterns::default(),
            discovered: Vec::new(),
            discovered_urls: HashSet::new(),
            iteration_count: 0,
            total_generated: 0,
            total_tested: 0,
            history: Vec::new(),
            run_id: None,
        }
    }

    /// 검증 기록에 남길 실행 ID
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// 마지막으로 학습한 패턴
    pub fn patterns(&self) -> &LearnedPatterns {
        &self.patterns
    }

    /// 지금까지 발견한 유효 피드 (URL 기준 중복 없음)
    pub fn discovered(&self) -> &[ValidationReport] {
        &self.discovered
    }

    fn domain(&self) -> Result<String> {
        let parsed = url::Url::parse(&self.base_url)
            .with_context(|| format!("Invalid base URL: {}", self.base_url))?;
        Ok(parsed.host_str().unwrap_or("").to_string())
    }

    /// 피드 URL에서 패턴 학습 (로컬 구조 + LLM 병합)
    pub async fn learn_patterns(&mut self, feed_urls: &[String]) -> Result<&LearnedPatterns> {
        tracing::info!("Learning patterns from {} feeds", feed_urls.len());

        let domain = self.domain()?;
        let structure = UrlStructureAnalyzer::analyze(feed_urls);
        tracing::info!(
            "Parameters found: {:?}",
            structure.parameters.keys().collect::<Vec<_>>()
        );

        let learned = self.learner.learn(feed_urls, &domain).await;
        self.patterns = LearnedPatterns::merge(&structure, learned);
        Ok(&self.patterns)
    }

    /// 후보 생성 (이미 알려진 URL 제외, 쿼리 순서 무관)
    ///
    /// `known`은 [`url_key`]로 정규화한 키 집합입니다.
    pub fn generate_candidates(
        &mut self,
        strategy: Strategy,
        num_candidates: usize,
        known: &HashSet<String>,
    ) -> Vec<String> {
        let generated = UrlGenerator::new(&self.base_url, &self.patterns)
            .generate(strategy, num_candidates);

        let candidates: Vec<String> = generated
            .into_iter()
            .filter(|u| {
                let key = url_key(u);
                !known.contains(&key) && !self.discovered_urls.contains(&key)
            })
            .collect();

        self.total_generated += candidates.len();
        for (i, url) in candidates.iter().take(5).enumerate() {
            tracing::info!("   {}. {}", i + 1, url);
        }
        candidates
    }

    /// 후보 검증 후 새 유효 피드 누적. 반환값의 두 번째는 새로 추가된 수
    pub async fn validate_candidates(
        &mut self,
        candidates: &[String],
        validator: &mut dyn FeedValidator,
        source: &str,
    ) -> (BatchSummary, usize) {
        tracing::info!("Validating {} candidates with {} validator", candidates.len(), validator.name());

        let summary = validator
            .validate_batch(candidates, source, self.run_id.as_deref())
            .await;
        self.total_tested += candidates.len();

        let mut added = 0;
        for report in &summary.validated {
            if self.discovered_urls.insert(url_key(&report.url)) {
                self.discovered.push(report.clone());
                added += 1;
            }
        }

        tracing::info!("Validation complete: {} new feeds found", added);
        (summary, added)
    }

    /// 반복 한 번 실행: 학습 → 생성 → 검증
    ///
    /// # Arguments
    /// * `current_feeds` - 학습에 쓸 알려진 피드 URL (시드 + 지금까지의 발견)
    pub async fn run_iteration(
        &mut self,
        current_feeds: &[String],
        strategy: Strategy,
        num_candidates: usize,
        validator: &mut dyn FeedValidator,
    ) -> Result<IterationOutcome> {
        self.iteration_count += 1;
        let iteration = self.iteration_count;
        tracing::info!("RAG iteration {}", iteration);

        self.learn_patterns(current_feeds).await?;

        let known: HashSet<String> = current_feeds.iter().map(|u| url_key(u)).collect();
        let candidates = self.generate_candidates(strategy, num_candidates, &known);

        let source = format!("rag_iter_{}", iteration);
        let (summary, added) = self.validate_candidates(&candidates, validator, &source).await;

        let outcome = IterationOutcome {
            iteration,
            strategy,
            candidates_generated: candidates.len(),
            validated_count: summary.valid_count,
            rejected_count: summary.invalid_count,
            new_feeds_found: added,
            total_feeds: self.discovered.len(),
            validated: summary.validated,
            rejected: summary.rejected,
        };

        tracing::info!(
            "Iteration {}: generated {}, valid {}, total {}",
            iteration,
            outcome.candidates_generated,
            outcome.validated_count,
            outcome.total_feeds
        );

        self.history.push(outcome.clone());
        Ok(outcome)
    }

    /// 수렴 판정: 2회 이상 반복했고 최근 2회 모두 새 피드가 없으면 중단
    pub fn should_stop(&self) -> (bool, &'static str) {
        if self.iteration_count < 2 || self.history.len() < 2 {
            return (false, "Need more iterations");
        }

        let recent = &self.history[self.history.len() - 2..];
        if recent.iter().all(|it| it.new_feeds_found == 0) {
            (true, "No new feeds in last 2 iterations")
        } else {
            (false, "Still discovering feeds")
        }
    }

    pub fn stats(&self) -> RagStats {
        RagStats {
            total_discovered_feeds: self.discovered.len(),
            total_urls_generated: self.total_generated,
            total_urls_tested: self.total_tested,
            success_rate: self.discovered.len() as f64 / self.total_tested.max(1) as f64,
            iterations_completed: self.iteration_count,
            iteration_history: self.history.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashSet;

    use async_trait::async_trait;

    use crate::validator::{FeedValidator, ValidationReport, ValidatorStats};

    /// 미리 정한 URL만 유효로 판정하는 검증기
    #[derive(Default)]
    pub struct FixedValidator {
        pub valid: HashSet<String>,
        pub seen: Vec<String>,
    }

    impl FixedValidator {
        pub fn accepting<I: IntoIterator<Item = S>, S: Into<String>>(urls: I) -> Self {
            Self {
                valid: urls.into_iter().map(Into::into).collect(),
                seen: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl FeedValidator for FixedValidator {
        async fn validate_feed(&mut self, url: &str, _source: &str, _run_id: Option<&str>) -> ValidationReport {
            self.seen.push(url.to_string());
            let mut report = ValidationReport::new(url);
            report.valid = self.valid.contains(url);
            report.score = if report.valid { 80 } else { 10 };
            report
        }

        fn stats(&self) -> ValidatorStats {
            ValidatorStats::default()
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }
}
