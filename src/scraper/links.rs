//! 1단계 피드 링크 추출 (휴리스틱)
//!
//! 네 가지 전략을 `<a href>`에 적용합니다.
//! 1. href 패턴 (`.xml`/`.rss`로 끝나면 high, 나머지 패턴은 medium)
//! 2. 링크 텍스트 키워드
//! 3. title 속성 키워드
//! 4. class/id에 rss, feed
//!
//! 그리고 `<link rel="alternate">` 선언은 high로 취급합니다.

use std::collections::HashSet;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::resolve_url;
use crate::feed::{Confidence, FeedCandidate};

const HIGH_PATTERNS: &[&str] = &[r"(?i)\.xml$", r"(?i)\.rss$"];
const MEDIUM_PATTERNS: &[&str] = &[
    r"(?i)/feed/?",
    r"(?i)/rss/?",
    r"(?i)RelId=",
    r"(?i)rss",
    r"(?i)feed",
    r"(?i)atom",
    r"(?i)RssMain",
];
const TEXT_KEYWORDS: &[&str] = &["rss", "feed", "atom", "xml", "subscribe"];
const ATTR_KEYWORDS: &[&str] = &["rss", "feed"];

struct LinkPatterns {
    high: Vec<Regex>,
    medium: Vec<Regex>,
}

impl LinkPatterns {
    fn compile() -> Self {
        Self {
            high: compile_all(HIGH_PATTERNS),
            medium: compile_all(MEDIUM_PATTERNS),
        }
    }

    /// 전략 1: href 패턴
    fn classify(&self, href: &str) -> Option<Confidence> {
        // 쿼리스트링 앞부분만 확장자 검사
        let path = href.split(['?', '#']).next().unwrap_or(href);
        if self.high.iter().any(|re| re.is_match(path)) {
            return Some(Confidence::High);
        }
        if self.medium.iter().any(|re| re.is_match(href)) {
            return Some(Confidence::Medium);
        }
        None
    }
}

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

/// 페이지에서 피드 후보 추출
///
/// # Arguments
/// * `base_url` - 상대 URL 해석 기준 (페이지 URL)
/// * `seen` - 이미 찾은 URL (건너뜀)
pub fn extract_feed_links(html: &str, base_url: &str, seen: &HashSet<String>) -> Vec<FeedCandidate> {
    let document = Html::parse_document(html);
    let patterns = LinkPatterns::compile();
    let mut found: Vec<FeedCandidate> = Vec::new();
    let mut local_seen: HashSet<String> = HashSet::new();

    let mut push = |url: String, title: String, confidence: Confidence| {
        if seen.contains(&url) || !local_seen.insert(url.clone()) {
            return;
        }
        let mut candidate = FeedCandidate::new(url)
            .with_title(title)
            .with_confidence(confidence);
        candidate.source_page = Some(base_url.to_string());
        found.push(candidate);
    };

    if let Ok(selector) = Selector::parse("link[rel][href]") {
        for element in document.select(&selector) {
            let attrs = element.value();
            let rel = attrs.attr("rel").unwrap_or("").to_lowercase();
            let kind = attrs.attr("type").unwrap_or("").to_lowercase();
            if rel.contains("alternate") && (kind.contains("rss+xml") || kind.contains("atom+xml")) {
                if let Some(url) = attrs.attr("href").and_then(|h| resolve_url(base_url, h)) {
                    let title = attrs.attr("title").unwrap_or("RSS Feed").to_string();
                    push(url, title, Confidence::High);
                }
            }
        }
    }

    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else { continue };
            let Some(confidence) = anchor_confidence(&patterns, &element, href) else { continue };
            let Some(url) = resolve_url(base_url, href) else { continue };
            push(url, anchor_title(&element), confidence);
        }
    }

    tracing::debug!("Stage 1 found {} feed links on {}", found.len(), base_url);
    found
}

fn anchor_confidence(patterns: &LinkPatterns, element: &ElementRef<'_>, href: &str) -> Option<Confidence> {
    let by_href = patterns.classify(href);

    let text = element.text().collect::<String>().to_lowercase();
    let title = element.value().attr("title").unwrap_or("").to_lowercase();
    let marker = format!(
        "{} {}",
        element.value().classes().collect::<Vec<_>>().join(" "),
        element.value().id().unwrap_or("")
    )
    .to_lowercase();

    let by_other = TEXT_KEYWORDS.iter().any(|k| text.contains(k))
        || TEXT_KEYWORDS.iter().any(|k| title.contains(k))
        || ATTR_KEYWORDS.iter().any(|k| marker.contains(k));

    match (by_href, by_other) {
        (Some(Confidence::Low), true) | (None, true) => Some(Confidence::Medium),
        (confidence, _) => confidence,
    }
}

/// 링크 텍스트 → title 속성 → "RSS Feed"
fn anchor_title(element: &ElementRef<'_>) -> String {
    let text = element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if !text.is_empty() {
        return text;
    }

    element
        .value()
        .attr("title")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("RSS Feed")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
          <head>
            <link rel="alternate" type="application/rss+xml" title="Site feed" href="/site.xml">
          </head>
          <body>
            <a href="/releases.xml">Releases</a>
            <a href="RssMain.aspx?ModId=6&amp;Lang=1&amp;Regid=3">Ministry of Education</a>
            <a href="/about">About us</a>
            <a href="/updates" title="Subscribe to updates"></a>
            <a href="/news" class="rss-link">News</a>
            <a href="/contact">Contact</a>
            <a href="/releases.xml">Duplicate</a>
          </body>
        </html>
    "#;

    #[test]
    fn test_extract_feed_links() {
        let links = extract_feed_links(PAGE, "https://pib.gov.in/ViewRss.aspx", &HashSet::new());
        let urls: Vec<&str> = links.iter().map(|c| c.url.as_str()).collect();

        assert_eq!(
            urls,
            vec![
                "https://pib.gov.in/site.xml",
                "https://pib.gov.in/releases.xml",
                "https://pib.gov.in/RssMain.aspx?ModId=6&Lang=1&Regid=3",
                "https://pib.gov.in/updates",
                "https://pib.gov.in/news",
            ]
        );

        assert_eq!(links[0].confidence, Confidence::High);
        assert_eq!(links[0].title.as_deref(), Some("Site feed"));
        assert_eq!(links[1].confidence, Confidence::High);
        assert_eq!(links[2].confidence, Confidence::Medium);
        assert_eq!(links[3].confidence, Confidence::Medium);
        assert_eq!(links[3].title.as_deref(), Some("Subscribe to updates"));
        assert_eq!(links[4].confidence, Confidence::Medium);
        assert_eq!(
            links[2].source_page.as_deref(),
            Some("https://pib.gov.in/ViewRss.aspx")
        );
    }

    #[test]
    fn test_extract_skips_seen() {
        let mut seen = HashSet::new();
        seen.insert("https://pib.gov.in/releases.xml".to_string());
        let links = extract_feed_links(PAGE, "https://pib.gov.in/ViewRss.aspx", &seen);
        assert!(links.iter().all(|c| c.url != "https://pib.gov.in/releases.xml"));
    }

    #[test]
    fn test_title_fallback() {
        let html = r#"<a href="/feed/"><img src="rss.png"></a>"#;
        let links = extract_feed_links(html, "https://example.gov.in/", &HashSet::new());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].title.as_deref(), Some("RSS Feed"));
    }
}
