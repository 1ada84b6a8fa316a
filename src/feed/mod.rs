//! Feed 모듈 - 피드 후보와 RSS/Atom 파싱
//!
//! 스크래퍼/URL 생성기가 만든 [`FeedCandidate`]와, 검증기/수집기가 사용하는
//! quick-xml 기반 피드 파서를 제공합니다.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

// ============================================================================
// Feed Candidate
// ============================================================================

/// 휴리스틱 신뢰도
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
    #[default]
    Unknown,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
            Confidence::Unknown => "unknown",
        }
    }

    /// 문자열에서 변환 (알 수 없으면 Unknown)
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" => Confidence::High,
            "medium" => Confidence::Medium,
            "low" => Confidence::Low,
            _ => Confidence::Unknown,
        }
    }
}

/// 검증 대기 중인 피드 후보
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedCandidate {
    pub url: String,
    pub title: Option<String>,
    #[serde(default)]
    pub confidence: Confidence,
    pub source_page: Option<String>,
    /// 이 후보를 찾은 드롭다운 조합 (드롭다운 이름 → 값)
    #[serde(default)]
    pub combo: BTreeMap<String, String>,
    pub discovered_at: DateTime<Utc>,
}

impl FeedCandidate {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            confidence: Confidence::Unknown,
            source_page: None,
            combo: BTreeMap::new(),
            discovered_at: Utc::now(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }
}

// ============================================================================
// Feed Detection
// ============================================================================

/// 피드 형태 확인에 사용하는 앞부분 길이
const SNIFF_CHARS: usize = 2000;

/// 본문이 RSS/Atom처럼 보이는지 확인
///
/// 앞 2000자 안에 `<rss`, `<feed`, `<?xml`, `xmlns` 중 하나가 있으면 true.
pub fn looks_like_feed(content: &str) -> bool {
    let head: String = content.chars().take(SNIFF_CHARS).collect::<String>().to_lowercase();
    ["<rss", "<feed", "<?xml", "xmlns"]
        .iter()
        .any(|marker| head.contains(marker))
}

// ============================================================================
// Feed Parsing
// ============================================================================

/// 파싱된 피드
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub items: Vec<FeedItem>,
}

/// 피드 항목 (RSS item / Atom entry)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub published: Option<String>,
    pub guid: Option<String>,
}

/// RSS 2.0 / RSS 1.0 / Atom 문서 파싱
///
/// 네임스페이스 접두사는 무시하고 로컬 이름으로만 매칭합니다.
pub fn parse_feed(xml: &str) -> Result<ParsedFeed> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut feed = ParsedFeed::default();
    let mut current: Option<FeedItem> = None;
    let mut stack: Vec<String> = Vec::new();
    let mut text = String::new();

    loop {
        let event = reader
            .read_event()
            .with_context(|| format!("Malformed feed XML at position {}", reader.buffer_position()))?;

        match event {
            Event::Start(e) => {
                let name = local_name(&e);
                if name == "item" || name == "entry" {
                    current = Some(FeedItem::default());
                }
                if name == "link" {
                    apply_link_href(&e, current.as_mut());
                }
                stack.push(name);
                text.clear();
            }
            Event::Empty(e) => {
                if local_name(&e) == "link" {
                    apply_link_href(&e, current.as_mut());
                }
            }
            Event::Text(t) => {
                let value = t
                    .unescape()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                text.push_str(&value);
            }
            Event::CData(c) => {
                text.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Event::End(_) => {
                let name = stack.pop().unwrap_or_default();
                let value = std::mem::take(&mut text).trim().to_string();

                if name == "item" || name == "entry" {
                    if let Some(item) = current.take() {
                        feed.items.push(item);
                    }
                    continue;
                }

                if value.is_empty() {
                    continue;
                }

                match current.as_mut() {
                    Some(item) => assign_item_field(item, &name, value),
                    None => assign_channel_field(&mut feed, &stack, &name, value),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(feed)
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase()
}

/// Atom `<link href="..."/>` 처리 (rel이 alternate이거나 없을 때만)
fn apply_link_href(e: &BytesStart<'_>, item: Option<&mut FeedItem>) {
    let Some(item) = item else { return };

    let mut href = None;
    let mut rel = None;
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_lowercase();
        let value = attr
            .unescape_value()
            .map(|v| v.into_owned())
            .unwrap_or_default();
        match key.as_str() {
            "href" => href = Some(value),
            "rel" => rel = Some(value),
            _ => {}
        }
    }

    if let Some(href) = href {
        let alternate = rel.as_deref().map(|r| r == "alternate").unwrap_or(true);
        if alternate && item.link.is_none() {
            item.link = Some(href);
        }
    }
}

fn assign_item_field(item: &mut FeedItem, name: &str, value: String) {
    match name {
        "title" if item.title.is_none() => item.title = Some(value),
        "link" if item.link.is_none() => item.link = Some(value),
        "description" | "summary" | "content" | "encoded" if item.description.is_none() => {
            item.description = Some(value)
        }
        "pubdate" | "published" | "updated" | "date" if item.published.is_none() => {
            item.published = Some(value)
        }
        "guid" | "id" if item.guid.is_none() => item.guid = Some(value),
        _ => {}
    }
}

fn assign_channel_field(feed: &mut ParsedFeed, stack: &[String], name: &str, value: String) {
    // <image><title> 같은 하위 요소의 title은 무시
    let parent = stack.last().map(String::as_str).unwrap_or("");
    if !matches!(parent, "channel" | "feed" | "") {
        return;
    }

    match name {
        "title" if feed.title.is_none() => feed.title = Some(value),
        "description" | "subtitle" if feed.description.is_none() => feed.description = Some(value),
        "language" if feed.language.is_none() => feed.language = Some(value),
        _ => {}
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>PIB Press Releases</title>
    <description>Latest releases</description>
    <language>hi-IN</language>
    <image><title>Logo</title><url>https://pib.gov.in/logo.png</url></image>
    <item>
      <title>Cabinet approves scheme</title>
      <link>https://pib.gov.in/PressReleasePage.aspx?PRID=1</link>
      <description><![CDATA[<p>Details &amp; more</p>]]></description>
      <pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate>
      <guid>PRID-1</guid>
    </item>
    <item>
      <title>Second &amp; final</title>
      <link>https://pib.gov.in/PressReleasePage.aspx?PRID=2</link>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Atom</title>
  <subtitle>Atom subtitle</subtitle>
  <entry>
    <title>Entry one</title>
    <link rel="self" href="https://example.gov.in/self"/>
    <link href="https://example.gov.in/entry/1"/>
    <id>urn:uuid:1</id>
    <updated>2024-01-01T00:00:00Z</updated>
    <summary>Short summary</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_looks_like_feed() {
        assert!(looks_like_feed(RSS));
        assert!(looks_like_feed(ATOM));
        assert!(looks_like_feed("<RSS version=\"2.0\">"));
        assert!(!looks_like_feed("<html><body>Not a feed</body></html>"));
    }

    #[test]
    fn test_looks_like_feed_only_checks_head() {
        let mut content = "x".repeat(2500);
        content.push_str("<rss>");
        assert!(!looks_like_feed(&content));
    }

    #[test]
    fn test_parse_rss() {
        let feed = parse_feed(RSS).unwrap();
        assert_eq!(feed.title.as_deref(), Some("PIB Press Releases"));
        assert_eq!(feed.description.as_deref(), Some("Latest releases"));
        assert_eq!(feed.language.as_deref(), Some("hi-IN"));
        assert_eq!(feed.items.len(), 2);

        let first = &feed.items[0];
        assert_eq!(first.title.as_deref(), Some("Cabinet approves scheme"));
        assert_eq!(first.guid.as_deref(), Some("PRID-1"));
        assert!(first.description.as_deref().unwrap().contains("Details"));
        assert!(first.published.is_some());

        assert_eq!(feed.items[1].title.as_deref(), Some("Second & final"));
    }

    #[test]
    fn test_parse_atom() {
        let feed = parse_feed(ATOM).unwrap();
        assert_eq!(feed.title.as_deref(), Some("Example Atom"));
        assert_eq!(feed.description.as_deref(), Some("Atom subtitle"));
        assert_eq!(feed.items.len(), 1);

        let entry = &feed.items[0];
        assert_eq!(entry.link.as_deref(), Some("https://example.gov.in/entry/1"));
        assert_eq!(entry.guid.as_deref(), Some("urn:uuid:1"));
        assert_eq!(entry.description.as_deref(), Some("Short summary"));
    }

    #[test]
    fn test_parse_malformed_feed() {
        assert!(parse_feed("<rss><channel><title>x</channel></rss>").is_err());
    }

    #[test]
    fn test_confidence_parse() {
        assert_eq!(Confidence::parse("HIGH"), Confidence::High);
        assert_eq!(Confidence::parse("weird"), Confidence::Unknown);
        assert_eq!(Confidence::Medium.as_str(), "medium");
    }
}
