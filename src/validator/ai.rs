//! LLM 기반 피드 품질 검증기

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{
    build_client, fetch_feed, is_valid_url, persist, FeedValidator, Recommendation, StatsTracker,
    ValidationReport, ValidationStore, ValidatorConfig, ValidatorStats,
};
use crate::feed::{looks_like_feed, parse_feed, ParsedFeed};
use crate::llm::{complete_json, into_object, GenerationOptions, LlmProvider};

/// LLM에 보낼 본문 최대 길이
const CONTENT_SAMPLE_CHARS: usize = 5000;

/// LLM 평가를 받지 못했을 때의 점수
const FALLBACK_SCORE: u32 = 50;

/// AI 피드 검증기
pub struct AiValidator {
    client: reqwest::Client,
    llm: Arc<dyn LlmProvider>,
    config: ValidatorConfig,
    store: Option<ValidationStore>,
    cache: HashMap<String, ValidationReport>,
    stats: StatsTracker,
}

impl AiValidator {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        config: ValidatorConfig,
        store: Option<ValidationStore>,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout)?,
            llm,
            config,
            store,
            cache: HashMap::new(),
            stats: StatsTracker::default(),
        })
    }

    pub fn min_quality_score(&self) -> u32 {
        self.config.min_quality_score
    }

    async fn assess(&self, url: &str, body: &str, report: &mut ValidationReport) {
        let feed = match parse_feed(body) {
            Ok(feed) => feed,
            Err(e) => {
                report.warnings.push(format!("Feed parse error: {:#}", e));
                ParsedFeed::default()
            }
        };
        report.title = feed.title.clone();
        report.item_count = feed.items.len();

        let prompt = build_prompt(url, &feed, body);
        let options = GenerationOptions::json(0.1, 1024);

        match complete_json(self.llm.as_ref(), &prompt, &options, &self.config.budget).await {
            Ok(Some(value)) => match into_object(value).and_then(|obj| apply_assessment(report, &obj)) {
                Some(()) => {}
                None => apply_fallback(report, "AI response could not be interpreted"),
            },
            Ok(None) => apply_fallback(report, "AI assessment budget exhausted"),
            Err(e) => {
                tracing::warn!("AI assessment failed for {}: {}", url, e);
                report.errors.push(format!("AI assessment failed: {}", e));
            }
        }
    }
}

#[async_trait]
impl FeedValidator for AiValidator {
    async fn validate_feed(&mut self, url: &str, source: &str, run_id: Option<&str>) -> ValidationReport {
        if let Some(cached) = self.cache.get(url) {
            tracing::debug!("Validation cache hit: {}", url);
            return cached.clone();
        }

        let report = if !is_valid_url(url) {
            ValidationReport::failed(url, "Invalid URL format")
        } else {
            let mut report = ValidationReport::new(url);
            match fetch_feed(&self.client, url).await {
                Err(error) => report.errors.push(error),
                Ok(fetched) => {
                    report.http_status = Some(fetched.status);
                    if fetched.status >= 400 {
                        report.errors.push(format!("HTTP {}", fetched.status));
                    } else if !looks_like_feed(&fetched.body) {
                        report.errors.push("Not a valid RSS/Atom feed".to_string());
                    } else {
                        self.assess(url, &fetched.body, &mut report).await;
                    }
                }
            }

            report.valid =
                report.score >= self.config.min_quality_score && report.errors.is_empty();
            if !report.errors.is_empty() {
                report.recommendation = Recommendation::Reject;
            }
            report
        };

        if report.valid {
            tracing::info!("[valid] {} (score {})", url, report.score);
        } else {
            tracing::info!("[rejected] {} (score {}, {:?})", url, report.score, report.errors);
        }

        self.stats.record(&report);
        persist(self.store.as_ref(), &report, source, self.name(), run_id);
        self.cache.insert(url.to_string(), report.clone());
        report
    }

    fn stats(&self) -> ValidatorStats {
        self.stats.snapshot()
    }

    fn name(&self) -> &str {
        "ai"
    }
}

fn build_prompt(url: &str, feed: &ParsedFeed, body: &str) -> String {
    let sample: String = body.chars().take(CONTENT_SAMPLE_CHARS).collect();
    let titles: Vec<&str> = feed
        .items
        .iter()
        .filter_map(|i| i.title.as_deref())
        .take(5)
        .collect();

    format!(
        "Assess this RSS/Atom feed from an Indian government or educational source.\n\
         URL: {url}\n\
         Feed title: {title}\n\
         Item count: {count}\n\
         Sample item titles: {titles:?}\n\n\
         Content (truncated):\n{sample}\n\n\
         Respond with JSON only:\n\
         {{\"is_valid\": bool, \"quality_score\": 0-100, \"feed_type\": \"rss|atom|unknown\", \
         \"content_type\": string, \"update_frequency\": string, \
         \"recommendation\": \"ACCEPT|REVIEW|REJECT\", \"reasoning\": string, \"warnings\": [string]}}",
        url = url,
        title = feed.title.as_deref().unwrap_or("(none)"),
        count = feed.items.len(),
        titles = titles,
        sample = sample,
    )
}

/// LLM 응답 객체를 보고서에 반영. quality_score가 없으면 None
fn apply_assessment(report: &mut ValidationReport, obj: &Map<String, Value>) -> Option<()> {
    let score = match obj.get("quality_score")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    report.score = score.clamp(0.0, 100.0).round() as u32;

    let text = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);
    report.reasoning = text("reasoning").unwrap_or_default();
    report.feed_type = text("feed_type");
    report.content_type = text("content_type");
    report.update_frequency = text("update_frequency");
    report.recommendation = text("recommendation")
        .map(|r| Recommendation::parse(&r))
        .unwrap_or_default();

    if let Some(Value::Array(warnings)) = obj.get("warnings") {
        report
            .warnings
            .extend(warnings.iter().filter_map(Value::as_str).map(str::to_string));
    }

    Some(())
}

fn apply_fallback(report: &mut ValidationReport, reason: &str) {
    tracing::warn!("{} for {}, using fallback score", reason, report.url);
    report.score = FALLBACK_SCORE;
    report.recommendation = Recommendation::Review;
    report.reasoning = format!("{}; fallback assessment applied", reason);
    report.warnings.push(reason.to_string());
}
