//! Phase 1 피드 탐색
//!
//! 시작 페이지 → 드롭다운 조합 → 조합별 페이지 → 2단계 피드 탐색.
//! 휴리스틱이 2개 미만을 찾으면 LLM에게 숨은 피드 URL을 묻습니다.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use scraper::{Html, Selector};
use serde_json::Value;

use super::forms::{
    cascading_combinations, construct_url_from_combo, extract_dropdowns, form_action,
    mapping_from_final_url, sample_combinations, Combo,
};
use super::links::extract_feed_links;
use super::{extract_title, resolve_url, FetchedPage, WebScraper};
use crate::feed::{Confidence, FeedCandidate};
use crate::llm::{complete_json, GenerationOptions, LlmProvider, RetryBudget};

/// 탐색 설정
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// 방문할 최대 조합(페이지) 수
    pub max_pages: usize,
    /// 1단계 결과가 이보다 적으면 2단계(LLM) 실행
    pub deep_analysis_threshold: usize,
    /// LLM에 보여줄 최대 링크 수
    pub max_links_in_prompt: usize,
    pub budget: RetryBudget,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_pages: 500,
            deep_analysis_threshold: 2,
            max_links_in_prompt: 100,
            budget: RetryBudget::default(),
        }
    }
}

/// 피드 탐색기
pub struct FeedDiscoverer {
    scraper: WebScraper,
    llm: Option<Arc<dyn LlmProvider>>,
    config: DiscoveryConfig,
}

impl FeedDiscoverer {
    /// # Arguments
    /// * `llm` - 없으면 2단계 분석을 건너뜁니다
    pub fn new(scraper: WebScraper, llm: Option<Arc<dyn LlmProvider>>, config: DiscoveryConfig) -> Self {
        Self { scraper, llm, config }
    }

    /// 시작 URL에서 피드 후보 탐색
    pub async fn discover(&self, start_url: &str) -> Result<Vec<FeedCandidate>> {
        tracing::info!("Phase 1 discovery starting at {}", start_url);

        let start = self
            .scraper
            .fetch(start_url)
            .await
            .context("Failed to fetch start page")?;
        if start.status >= 400 {
            anyhow::bail!("Start page returned HTTP {}", start.status);
        }

        let dropdowns = extract_dropdowns(&start.html);
        let mut combos = cascading_combinations(&dropdowns);
        tracing::info!(
            "Found {} dropdowns, {} combinations",
            dropdowns.len(),
            combos.len()
        );

        let mapping = if combos.is_empty() {
            combos.push(Combo::new());
            HashMap::new()
        } else {
            self.learn_parameter_mapping(&start, &combos, dropdowns.len()).await
        };

        // 최소 한 페이지는 방문
        let max_pages = self.config.max_pages.max(1);
        if combos.len() > max_pages {
            tracing::info!("Limiting combinations to {}", max_pages);
            combos.truncate(max_pages);
        }

        let mut found: Vec<FeedCandidate> = Vec::new();
        let mut seen_urls: HashSet<String> = HashSet::new();
        let mut seen_combos: HashSet<Combo> = HashSet::new();

        // 시작 페이지 자체의 링크
        if combos.first().is_some_and(|c| !c.is_empty()) {
            let page_feeds = self.two_stage(&start, &seen_urls).await;
            accumulate(&mut found, &mut seen_urls, page_feeds, &Combo::new());
        }

        let total = combos.len();
        for (i, combo) in combos.into_iter().enumerate() {
            if !seen_combos.insert(combo.clone()) {
                continue;
            }

            let page_url = construct_url_from_combo(&start.final_url, &combo, &mapping);
            let page = if combo.is_empty() {
                start.clone()
            } else {
                match self.scraper.fetch(&page_url).await {
                    Ok(page) if page.status < 400 => page,
                    Ok(page) => {
                        tracing::warn!("Skipping {} (HTTP {})", page_url, page.status);
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("Skipping {}: {:#}", page_url, e);
                        continue;
                    }
                }
            };

            let page_feeds = self.two_stage(&page, &seen_urls).await;
            tracing::info!(
                "[{}/{}] {} → {} feeds",
                i + 1,
                total,
                page_url,
                page_feeds.len()
            );
            accumulate(&mut found, &mut seen_urls, page_feeds, &combo);
        }

        tracing::info!("Phase 1 discovery found {} unique feeds", found.len());
        Ok(found)
    }

    /// 표본 조합을 GET으로 제출해 드롭다운 → 쿼리 파라미터 매핑 학습
    async fn learn_parameter_mapping(
        &self,
        start: &FetchedPage,
        combos: &[Combo],
        dropdown_count: usize,
    ) -> HashMap<String, String> {
        let action = form_action(&start.html, &start.final_url);
        let mut mapping: HashMap<String, String> = HashMap::new();

        for combo in sample_combinations(combos) {
            let submit_url = construct_url_from_combo(&action, &combo, &HashMap::new());
            match self.scraper.fetch(&submit_url).await {
                Ok(page) => {
                    for (dropdown, param) in mapping_from_final_url(&page.final_url, &combo) {
                        mapping.entry(dropdown).or_insert(param);
                    }
                }
                Err(e) => tracing::debug!("Form submission failed for {}: {:#}", submit_url, e),
            }

            if mapping.len() >= dropdown_count {
                break;
            }
        }

        tracing::info!("Learned parameter mapping: {:?}", mapping);
        mapping
    }

    /// 1단계 휴리스틱 + (필요 시) 2단계 LLM 분석
    async fn two_stage(&self, page: &FetchedPage, seen: &HashSet<String>) -> Vec<FeedCandidate> {
        let mut feeds = extract_feed_links(&page.html, &page.final_url, seen);

        if feeds.len() < self.config.deep_analysis_threshold {
            if let Some(llm) = &self.llm {
                let mut known: HashSet<String> = seen.clone();
                known.extend(feeds.iter().map(|f| f.url.clone()));
                let extra = self.deep_analysis(llm.as_ref(), page, &known).await;
                feeds.extend(extra);
            }
        }

        feeds
    }

    /// 2단계: LLM에게 비자명한 피드 URL 질의
    async fn deep_analysis(
        &self,
        llm: &dyn LlmProvider,
        page: &FetchedPage,
        known: &HashSet<String>,
    ) -> Vec<FeedCandidate> {
        let prompt = self.deep_analysis_prompt(page, known);
        let options = GenerationOptions::json(0.2, 2048);

        let value = match complete_json(llm, &prompt, &options, &self.config.budget).await {
            Ok(Some(value)) => value,
            Ok(None) => return vec![],
            Err(e) => {
                tracing::warn!("Deep analysis failed for {}: {}", page.final_url, e);
                return vec![];
            }
        };

        let entries = match value {
            Value::Array(items) => items,
            Value::Object(mut obj) => match obj.remove("feeds") {
                Some(Value::Array(items)) => items,
                _ => vec![Value::Object(obj)],
            },
            _ => vec![],
        };

        let mut out = Vec::new();
        let mut local: HashSet<String> = HashSet::new();
        for entry in entries {
            let Some(href) = entry.get("url").and_then(Value::as_str) else { continue };
            let Some(url) = resolve_url(&page.final_url, href) else { continue };
            if known.contains(&url) || !local.insert(url.clone()) {
                continue;
            }

            let mut candidate = FeedCandidate::new(url).with_confidence(
                entry
                    .get("confidence")
                    .and_then(Value::as_str)
                    .map(Confidence::parse)
                    .unwrap_or(Confidence::Low),
            );
            candidate.title = entry
                .get("title")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| Some("RSS Feed".to_string()));
            candidate.source_page = Some(page.final_url.clone());
            out.push(candidate);
        }

        tracing::info!("Stage 2 found {} additional feeds on {}", out.len(), page.final_url);
        out
    }

    fn deep_analysis_prompt(&self, page: &FetchedPage, known: &HashSet<String>) -> String {
        let document = Html::parse_document(&page.html);
        let title = extract_title(&document).unwrap_or_default();

        let mut links = Vec::new();
        if let Ok(selector) = Selector::parse("a[href]") {
            for element in document.select(&selector).take(self.config.max_links_in_prompt) {
                let href = element.value().attr("href").unwrap_or("");
                let text = element.text().collect::<String>();
                links.push(format!("- {} | {}", href.trim(), text.trim()));
            }
        }

        let mut known_list: Vec<&String> = known.iter().collect();
        known_list.sort();

        format!(
            "You are analysing a government web page to find RSS/Atom feed URLs that simple \
             pattern matching missed (e.g. handlers, query-driven endpoints, XML exports).\n\
             Page URL: {}\nPage title: {}\n\nLinks (href | text):\n{}\n\n\
             Already known feeds:\n{:?}\n\n\
             Respond with a JSON array only: \
             [{{\"url\": string, \"title\": string, \"confidence\": \"high|medium|low\", \"reasoning\": string}}]. \
             Return [] if there are none.",
            page.final_url,
            title,
            links.join("\n"),
            known_list
        )
    }
}

/// 페이지 결과를 전체 목록에 URL 기준으로 누적
fn accumulate(
    found: &mut Vec<FeedCandidate>,
    seen: &mut HashSet<String>,
    page_feeds: Vec<FeedCandidate>,
    combo: &Combo,
) {
    for mut feed in page_feeds {
        if !seen.insert(feed.url.clone()) {
            continue;
        }
        feed.combo = combo.clone();
        feed.discovered_at = Utc::now();
        found.push(feed);
    }
}
