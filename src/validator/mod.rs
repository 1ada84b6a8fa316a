//! Validator 모듈 - 피드 검증
//!
//! 후보 URL을 가져와 RSS/Atom 형태인지 확인하고 품질 점수(0-100)를 매깁니다.
//!
//! ## 검증기
//! - [`AiValidator`]: LLM이 품질을 평가 (기본)
//! - [`LightweightValidator`]: 항목이 하나 이상 있으면 유효 (API 키가 없을 때)
//!
//! 모든 검증 결과는 [`ValidationStore`]에 추가 전용으로 기록됩니다.

mod ai;
mod lightweight;
mod store;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use ai::AiValidator;
pub use lightweight::LightweightValidator;
pub use store::{StoredValidation, ValidationStore};

use crate::llm::RetryBudget;

// ============================================================================
// Types
// ============================================================================

/// LLM 권고
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Accept,
    #[default]
    Review,
    Reject,
}

impl Recommendation {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "ACCEPT" => Recommendation::Accept,
            "REJECT" => Recommendation::Reject,
            _ => Recommendation::Review,
        }
    }
}

/// 검증 보고서
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub valid: bool,
    /// 품질 점수 (0-100)
    pub score: u32,
    pub reasoning: String,
    pub http_status: Option<u16>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub feed_type: Option<String>,
    pub content_type: Option<String>,
    pub update_frequency: Option<String>,
    #[serde(default)]
    pub recommendation: Recommendation,
    pub title: Option<String>,
    #[serde(default)]
    pub item_count: usize,
}

impl ValidationReport {
    /// 빈 보고서 (무효, 점수 0)
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            timestamp: Utc::now(),
            valid: false,
            score: 0,
            reasoning: String::new(),
            http_status: None,
            errors: Vec::new(),
            warnings: Vec::new(),
            feed_type: None,
            content_type: None,
            update_frequency: None,
            recommendation: Recommendation::Review,
            title: None,
            item_count: 0,
        }
    }

    /// 에러 하나로 실패 보고서 생성
    pub fn failed(url: &str, error: impl Into<String>) -> Self {
        let mut report = Self::new(url);
        report.errors.push(error.into());
        report.recommendation = Recommendation::Reject;
        report
    }
}

/// 배치 검증 요약
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_tested: usize,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub success_rate: f64,
    pub validated: Vec<ValidationReport>,
    pub rejected: Vec<ValidationReport>,
}

/// 검증기 누적 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatorStats {
    pub total_validated: usize,
    pub valid_feeds: usize,
    pub rejected_feeds: usize,
    pub success_rate: f64,
    /// 유효 피드의 평균 품질 점수
    pub average_quality: f64,
}

/// 검증기 설정
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub min_quality_score: u32,
    pub timeout: Duration,
    /// LLM 평가 재시도 예산
    pub budget: RetryBudget,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_quality_score: 60,
            timeout: Duration::from_secs(10),
            budget: RetryBudget::default(),
        }
    }
}

// ============================================================================
// FeedValidator Trait
// ============================================================================

/// 피드 검증기 트레이트
///
/// 코디네이터와 RAG 에이전트가 같은 검증기 인스턴스를 공유합니다.
#[async_trait]
pub trait FeedValidator: Send {
    /// URL 하나 검증
    ///
    /// # Arguments
    /// * `source` - 검증 요청 출처 (예: "phase1", "rag_iter_2")
    /// * `run_id` - 코디네이터 실행 ID
    async fn validate_feed(&mut self, url: &str, source: &str, run_id: Option<&str>) -> ValidationReport;

    /// URL 목록 순차 검증
    async fn validate_batch(
        &mut self,
        urls: &[String],
        source: &str,
        run_id: Option<&str>,
    ) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for (i, url) in urls.iter().enumerate() {
            tracing::debug!("Validating {}/{}: {}", i + 1, urls.len(), url);
            let report = self.validate_feed(url, source, run_id).await;
            if report.valid {
                summary.validated.push(report);
            } else {
                summary.rejected.push(report);
            }
        }

        summary.total_tested = urls.len();
        summary.valid_count = summary.validated.len();
        summary.invalid_count = summary.rejected.len();
        summary.success_rate = summary.valid_count as f64 / summary.total_tested.max(1) as f64;

        tracing::info!(
            "Batch validation ({}): {}/{} valid",
            source,
            summary.valid_count,
            summary.total_tested
        );
        summary
    }

    /// 누적 통계
    fn stats(&self) -> ValidatorStats;

    /// 검증기 이름 (저장소의 validator 컬럼)
    fn name(&self) -> &str;
}

// ============================================================================
// Shared Helpers
// ============================================================================

/// 검증 통계 집계기
#[derive(Debug, Default)]
pub(crate) struct StatsTracker {
    total: usize,
    valid: usize,
    quality_sum: u64,
}

impl StatsTracker {
    pub(crate) fn record(&mut self, report: &ValidationReport) {
        self.total += 1;
        if report.valid {
            self.valid += 1;
            self.quality_sum += report.score as u64;
        }
    }

    pub(crate) fn snapshot(&self) -> ValidatorStats {
        ValidatorStats {
            total_validated: self.total,
            valid_feeds: self.valid,
            rejected_feeds: self.total - self.valid,
            success_rate: self.valid as f64 / self.total.max(1) as f64,
            average_quality: if self.valid == 0 {
                0.0
            } else {
                self.quality_sum as f64 / self.valid as f64
            },
        }
    }
}

/// 가져온 피드 본문
pub(crate) struct FetchedFeed {
    pub status: u16,
    pub body: String,
}

/// URL 형식 확인 (http/https만 허용)
pub(crate) fn is_valid_url(url: &str) -> bool {
    let url = url.trim();
    !url.is_empty() && url.starts_with("http")
}

/// 피드 가져오기. 실패 시 보고서용 에러 문자열 반환
pub(crate) async fn fetch_feed(client: &reqwest::Client, url: &str) -> Result<FetchedFeed, String> {
    let response = client.get(url).send().await.map_err(describe_http_error)?;
    let status = response.status().as_u16();
    let body = response.text().await.map_err(describe_http_error)?;
    Ok(FetchedFeed { status, body })
}

fn describe_http_error(e: reqwest::Error) -> String {
    if e.is_timeout() {
        "HTTP request timeout".to_string()
    } else {
        format!("Connection failed: {}", e)
    }
}

pub(crate) fn build_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    use anyhow::Context;

    reqwest::Client::builder()
        .user_agent("Mozilla/5.0 (compatible; BharatConnect/0.1; +feed-validator)")
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// 저장소에 기록 (실패는 경고만)
pub(crate) fn persist(
    store: Option<&ValidationStore>,
    report: &ValidationReport,
    source: &str,
    validator: &str,
    run_id: Option<&str>,
) {
    if let Some(store) = store {
        if let Err(e) = store.save_report(report, source, validator, run_id) {
            tracing::warn!("Failed to persist validation for {}: {:#}", report.url, e);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_format() {
        assert!(is_valid_url("https://pib.gov.in/rss.xml"));
        assert!(is_valid_url("http://example.com"));
        assert!(!is_valid_url(""));
        assert!(!is_valid_url("ftp://example.com/feed"));
        assert!(!is_valid_url("/relative/feed.xml"));
    }

    #[test]
    fn test_stats_tracker() {
        let mut tracker = StatsTracker::default();
        let mut good = ValidationReport::new("a");
        good.valid = true;
        good.score = 80;
        let mut better = ValidationReport::new("b");
        better.valid = true;
        better.score = 90;
        let bad = ValidationReport::failed("c", "HTTP 404");

        tracker.record(&good);
        tracker.record(&better);
        tracker.record(&bad);

        let stats = tracker.snapshot();
        assert_eq!(stats.total_validated, 3);
        assert_eq!(stats.valid_feeds, 2);
        assert_eq!(stats.rejected_feeds, 1);
        assert!((stats.average_quality - 85.0).abs() < f64::EPSILON);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_recommendation_parse() {
        assert_eq!(Recommendation::parse("accept"), Recommendation::Accept);
        assert_eq!(Recommendation::parse("REJECT"), Recommendation::Reject);
        assert_eq!(Recommendation::parse("maybe"), Recommendation::Review);
    }

    #[test]
    fn test_report_serde() {
        let report = ValidationReport::failed("https://x", "HTTP 500");
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"REJECT\""));
        let back: ValidationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.errors, vec!["HTTP 500"]);
    }
}
