//! LLM 없이 동작하는 경량 검증기
//!
//! 피드를 파싱해 항목이 하나 이상 있으면 유효로 판정합니다.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use super::{
    build_client, fetch_feed, is_valid_url, persist, FeedValidator, Recommendation, StatsTracker,
    ValidationReport, ValidationStore, ValidatorConfig, ValidatorStats,
};
use crate::feed::{looks_like_feed, parse_feed};

/// 경량 검증기
pub struct LightweightValidator {
    client: reqwest::Client,
    store: Option<ValidationStore>,
    cache: HashMap<String, ValidationReport>,
    stats: StatsTracker,
}

impl LightweightValidator {
    pub fn new(config: ValidatorConfig, store: Option<ValidationStore>) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout)?,
            store,
            cache: HashMap::new(),
            stats: StatsTracker::default(),
        })
    }
}

/// 항목 수 기반 점수 (항목 1개 = 64점, 10개 이상 = 100점)
fn item_score(item_count: usize) -> u32 {
    if item_count == 0 {
        0
    } else {
        (60 + 4 * item_count.min(10) as u32).min(100)
    }
}

#[async_trait]
impl FeedValidator for LightweightValidator {
    async fn validate_feed(&mut self, url: &str, source: &str, run_id: Option<&str>) -> ValidationReport {
        if let Some(cached) = self.cache.get(url) {
            return cached.clone();
        }

        let mut report = ValidationReport::new(url);
        if !is_valid_url(url) {
            report.errors.push("Invalid URL format".to_string());
        } else {
            match fetch_feed(&self.client, url).await {
                Err(error) => report.errors.push(error),
                Ok(fetched) => {
                    report.http_status = Some(fetched.status);
                    if fetched.status >= 400 {
                        report.errors.push(format!("HTTP {}", fetched.status));
                    } else if !looks_like_feed(&fetched.body) {
                        report.errors.push("Not a valid RSS/Atom feed".to_string());
                    } else {
                        match parse_feed(&fetched.body) {
                            Ok(feed) => {
                                report.title = feed.title.clone();
                                report.item_count = feed.items.len();
                            }
                            Err(e) => report.errors.push(format!("Feed parse error: {:#}", e)),
                        }
                    }
                }
            }
        }

        report.valid = report.errors.is_empty() && report.item_count > 0;
        report.score = if report.errors.is_empty() {
            item_score(report.item_count)
        } else {
            0
        };
        report.recommendation = if report.valid {
            Recommendation::Accept
        } else {
            Recommendation::Reject
        };
        report.reasoning = format!("{} items parsed", report.item_count);

        self.stats.record(&report);
        persist(self.store.as_ref(), &report, source, self.name(), run_id);
        self.cache.insert(url.to_string(), report.clone());
        report
    }

    fn stats(&self) -> ValidatorStats {
        self.stats.snapshot()
    }

    fn name(&self) -> &str {
        "lightweight"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_score() {
        assert_eq!(item_score(0), 0);
        assert_eq!(item_score(1), 64);
        assert_eq!(item_score(10), 100);
        assert_eq!(item_score(500), 100);
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let mut v = LightweightValidator::new(ValidatorConfig::default(), None).unwrap();
        let report = v.validate_feed("javascript:void(0)", "test", None).await;
        assert!(!report.valid);
        assert_eq!(report.errors, vec!["Invalid URL format"]);
    }
}
