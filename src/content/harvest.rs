//! 피드 수집기 - 검증된 피드의 항목을 콘텐츠 저장소에 적재

use std::time::Duration;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::store::{ContentItem, ContentKind, ContentStore};
use crate::feed::{parse_feed, ParsedFeed};

/// 수집기 설정
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// 동시에 가져올 피드 수
    pub concurrency: usize,
    pub timeout: Duration,
    /// 피드당 저장할 최대 항목 수
    pub max_items_per_feed: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            timeout: Duration::from_secs(20),
            max_items_per_feed: 50,
        }
    }
}

/// 수집 결과 요약
#[derive(Debug, Clone, Default, Serialize)]
pub struct HarvestReport {
    pub feeds_ok: usize,
    pub feeds_failed: usize,
    pub items_stored: usize,
    pub errors: Vec<(String, String)>,
}

/// 피드 수집기
pub struct FeedHarvester {
    client: reqwest::Client,
    config: HarvestConfig,
}

impl FeedHarvester {
    pub fn new(config: HarvestConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; BharatConnect/0.1)")
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    /// 피드 목록을 병렬로 가져와 저장
    pub async fn harvest(&self, urls: &[String], store: &ContentStore) -> Result<HarvestReport> {
        let fetched: Vec<(String, Result<ParsedFeed>)> = stream::iter(urls.iter().cloned())
            .map(|url| async move {
                let result = self.fetch_feed(&url).await;
                (url, result)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut report = HarvestReport::default();
        for (url, result) in fetched {
            match result {
                Ok(feed) => {
                    report.feeds_ok += 1;
                    for item in feed_to_items(&url, &feed, self.config.max_items_per_feed) {
                        store.upsert(&item)?;
                        report.items_stored += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to harvest {}: {:#}", url, e);
                    report.feeds_failed += 1;
                    report.errors.push((url, format!("{:#}", e)));
                }
            }
        }

        tracing::info!(
            "Harvested {} items from {} feeds ({} failed)",
            report.items_stored,
            report.feeds_ok,
            report.feeds_failed
        );
        Ok(report)
    }

    async fn fetch_feed(&self, url: &str) -> Result<ParsedFeed> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch feed: {}", url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {}", status.as_u16());
        }

        let body = response.text().await.context("Failed to read feed body")?;
        parse_feed(&body)
    }
}

/// 파싱된 피드를 저장용 항목으로 변환 (링크 없는 항목은 제외)
pub fn feed_to_items(feed_url: &str, feed: &ParsedFeed, max_items: usize) -> Vec<ContentItem> {
    let language = normalize_language(feed.language.as_deref());
    let source = feed
        .title
        .clone()
        .or_else(|| url::Url::parse(feed_url).ok()?.host_str().map(str::to_string))
        .unwrap_or_else(|| feed_url.to_string());

    feed.items
        .iter()
        .filter_map(|item| {
            let link = item.link.as_deref()?.trim();
            if link.is_empty() {
                return None;
            }
            let link = resolve(feed_url, link);
            let title = item.title.clone().unwrap_or_else(|| link.clone());

            let content_id = match item.guid.as_deref() {
                Some(guid) if !guid.trim().is_empty() => guid.trim().to_string(),
                _ => content_hash(feed_url, &title, &link),
            };

            Some(ContentItem {
                content_id,
                kind: ContentKind::Rss,
                source: source.clone(),
                url: link,
                title,
                description: item.description.clone(),
                body: None,
                languages: vec![language.clone()],
                board: None,
                grades: vec![],
                subjects: vec![],
                published_at: item.published.clone(),
            })
        })
        .take(max_items)
        .collect()
}

/// `hi-IN`, `EN_us` 같은 태그를 두 글자 코드로 (없으면 en)
pub fn normalize_language(tag: Option<&str>) -> String {
    tag.map(str::trim)
        .filter(|t| t.len() >= 2)
        .map(|t| {
            t.chars()
                .take_while(|c| c.is_ascii_alphabetic())
                .take(2)
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|code| code.len() == 2)
        .unwrap_or_else(|| "en".to_string())
}

fn content_hash(feed_url: &str, title: &str, link: &str) -> String {
    let digest = Sha256::digest(format!("{}|{}|{}", feed_url, title, link).as_bytes());
    format!("{:x}", digest).chars().take(16).collect()
}

fn resolve(base: &str, link: &str) -> String {
    url::Url::parse(base)
        .and_then(|b| b.join(link))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| link.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedItem;

    #[test]
    fn test_normalize_language() {
        assert_eq!(normalize_language(Some("hi-IN")), "hi");
        assert_eq!(normalize_language(Some("EN_us")), "en");
        assert_eq!(normalize_language(Some("ta")), "ta");
        assert_eq!(normalize_language(Some("x")), "en");
        assert_eq!(normalize_language(None), "en");
    }

    #[test]
    fn test_feed_to_items() {
        let feed = ParsedFeed {
            title: Some("PIB".to_string()),
            description: None,
            language: Some("hi-IN".to_string()),
            items: vec![
                FeedItem {
                    title: Some("One".to_string()),
                    link: Some("/news/1".to_string()),
                    guid: Some("guid-1".to_string()),
                    ..Default::default()
                },
                FeedItem {
                    title: Some("Two".to_string()),
                    link: Some("https://pib.gov.in/news/2".to_string()),
                    ..Default::default()
                },
                FeedItem {
                    title: Some("No link".to_string()),
                    ..Default::default()
                },
            ],
        };

        let items = feed_to_items("https://pib.gov.in/rss.xml", &feed, 10);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].url, "https://pib.gov.in/news/1");
        assert_eq!(items[0].content_id, "guid-1");
        assert_eq!(items[0].languages, vec!["hi"]);
        assert_eq!(items[0].source, "PIB");
        assert_eq!(items[1].content_id.len(), 16);

        assert_eq!(feed_to_items("https://pib.gov.in/rss.xml", &feed, 1).len(), 1);
    }
}
