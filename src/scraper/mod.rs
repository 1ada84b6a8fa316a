//! 웹 스크래퍼 모듈 - 페이지 수집과 피드 링크 추출
//!
//! 정부 사이트의 시작 페이지에서 드롭다운(`<select>`) 조합을 펼쳐
//! 각 페이지의 RSS/Atom 링크를 찾습니다.
//!
//! - [`links`]: 1단계 휴리스틱 링크 추출
//! - [`forms`]: 드롭다운 파싱, 조합 생성, 파라미터 매핑 학습
//! - [`discover`]: 전체 탐색 흐름 (2단계 LLM 분석 포함)

pub mod discover;
pub mod forms;
pub mod links;

use std::time::Duration;

use anyhow::{Context, Result};
use scraper::{Html, Selector};

pub use discover::{DiscoveryConfig, FeedDiscoverer};
pub use forms::{
    cascading_combinations, construct_url_from_combo, extract_dropdowns, sample_combinations,
    Combo, Dropdown, DropdownOption,
};
pub use links::extract_feed_links;

/// 가져온 페이지
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// 요청한 URL
    pub requested_url: String,
    /// 리다이렉트를 따라간 최종 URL
    pub final_url: String,
    pub status: u16,
    pub html: String,
}

/// 웹 스크래퍼
pub struct WebScraper {
    client: reqwest::Client,
}

impl WebScraper {
    /// 새 스크래퍼 생성
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; BharatConnect/0.1)")
            .timeout(timeout)
            .build()
            .context("HTTP 클라이언트 생성 실패")?;

        Ok(Self { client })
    }

    /// 페이지 가져오기 (리다이렉트 추적)
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        tracing::debug!("Fetching: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("HTTP 요청 실패: {}", url))?;

        let final_url = response.url().to_string();
        let status = response.status().as_u16();
        let html = response.text().await.context("응답 본문 읽기 실패")?;

        Ok(FetchedPage {
            requested_url: url.to_string(),
            final_url,
            status,
            html,
        })
    }
}

impl Default for WebScraper {
    fn default() -> Self {
        Self::new().unwrap_or_else(|e| {
            tracing::error!("WebScraper 생성 실패: {}", e);
            Self {
                client: reqwest::Client::new(),
            }
        })
    }
}

/// 제목 추출 (`<title>` 다음 `<h1>`)
pub fn extract_title(document: &Html) -> Option<String> {
    for tag in ["title", "h1"] {
        if let Ok(selector) = Selector::parse(tag) {
            if let Some(element) = document.select(&selector).next() {
                let title = element.text().collect::<String>().trim().to_string();
                if !title.is_empty() {
                    return Some(title);
                }
            }
        }
    }

    None
}

/// 상대 URL을 기준 URL로 해석
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }

    url::Url::parse(base)
        .and_then(|b| b.join(href))
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scraper_creation() {
        assert!(WebScraper::new().is_ok());
    }

    #[test]
    fn test_extract_title() {
        let html = r#"
            <html>
                <head><title>PIB RSS</title></head>
                <body><h1>Main Heading</h1></body>
            </html>
        "#;
        let document = Html::parse_document(html);
        assert_eq!(extract_title(&document), Some("PIB RSS".to_string()));
    }

    #[test]
    fn test_extract_title_h1_fallback() {
        let html = "<html><head><title></title></head><body><h1>H1 Heading</h1></body></html>";
        let document = Html::parse_document(html);
        assert_eq!(extract_title(&document), Some("H1 Heading".to_string()));
    }

    #[test]
    fn test_resolve_url() {
        assert_eq!(
            resolve_url("https://pib.gov.in/ViewRss.aspx", "RssMain.aspx?ModId=6").as_deref(),
            Some("https://pib.gov.in/RssMain.aspx?ModId=6")
        );
        assert_eq!(
            resolve_url("https://pib.gov.in/a/b", "/feed.xml").as_deref(),
            Some("https://pib.gov.in/feed.xml")
        );
        assert!(resolve_url("https://pib.gov.in", "#top").is_none());
        assert!(resolve_url("https://pib.gov.in", "javascript:void(0)").is_none());
        assert!(resolve_url("https://pib.gov.in", "mailto:a@b.c").is_none());
    }

    #[tokio::test]
    async fn test_fetch_follows_redirect() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", format!("{}/new?lang=1", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let page = WebScraper::new()
            .unwrap()
            .fetch(&format!("{}/old", server.uri()))
            .await
            .unwrap();

        assert_eq!(page.status, 200);
        assert!(page.final_url.ends_with("/new?lang=1"));
        assert!(page.requested_url.ends_with("/old"));
    }
}
