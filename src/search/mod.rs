//! Search 모듈 - 교차 언어 검색
//!
//! 사용자 언어로 먼저 찾고, 없으면 모든 언어(원문 질의, 그다음 영어 번역)로
//! 다시 찾은 뒤, 결과를 사용자 언어로 번역하고 요약합니다.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::content::{ContentKind, ContentStore, StoredContent};
use crate::llm::{GenerationOptions, LlmProvider};

/// 번역/요약에 넘기는 본문 최대 길이 (문자)
const MAX_CONTENT_CHARS: usize = 500;

// ============================================================================
// Language
// ============================================================================

/// 지원 언어
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    Hindi,
    English,
    Telugu,
    Tamil,
    Marathi,
    Gujarati,
    Kannada,
    Malayalam,
    Bengali,
    Punjabi,
}

impl Language {
    pub const ALL: [Language; 10] = [
        Language::Hindi,
        Language::English,
        Language::Telugu,
        Language::Tamil,
        Language::Marathi,
        Language::Gujarati,
        Language::Kannada,
        Language::Malayalam,
        Language::Bengali,
        Language::Punjabi,
    ];

    /// ISO 639-1 코드
    pub fn code(&self) -> &'static str {
        match self {
            Language::Hindi => "hi",
            Language::English => "en",
            Language::Telugu => "te",
            Language::Tamil => "ta",
            Language::Marathi => "mr",
            Language::Gujarati => "gu",
            Language::Kannada => "kn",
            Language::Malayalam => "ml",
            Language::Bengali => "bn",
            Language::Punjabi => "pa",
        }
    }

    /// 영어 이름
    pub fn name(&self) -> &'static str {
        match self {
            Language::Hindi => "Hindi",
            Language::English => "English",
            Language::Telugu => "Telugu",
            Language::Tamil => "Tamil",
            Language::Marathi => "Marathi",
            Language::Gujarati => "Gujarati",
            Language::Kannada => "Kannada",
            Language::Malayalam => "Malayalam",
            Language::Bengali => "Bengali",
            Language::Punjabi => "Punjabi",
        }
    }

    /// 고유 표기
    pub fn native_name(&self) -> &'static str {
        match self {
            Language::Hindi => "हिन्दी",
            Language::English => "English",
            Language::Telugu => "తెలుగు",
            Language::Tamil => "தமிழ்",
            Language::Marathi => "मराठी",
            Language::Gujarati => "ગુજરાતી",
            Language::Kannada => "ಕನ್ನಡ",
            Language::Malayalam => "മലയാളം",
            Language::Bengali => "বাংলা",
            Language::Punjabi => "ਪੰਜਾਬੀ",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim().to_lowercase();
        Self::ALL.into_iter().find(|l| l.code() == code)
    }

    /// 영어 이름, 고유 표기 또는 코드 (대소문자 무시)
    pub fn from_name(name: &str) -> Option<Self> {
        let trimmed = name.trim();
        let lower = trimmed.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|l| l.name().to_lowercase() == lower || l.native_name() == trimmed)
            .or_else(|| Self::from_code(trimmed))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| {
            let known: Vec<&str> = Self::ALL.iter().map(Language::name).collect();
            anyhow::anyhow!("Unsupported language: {} ({})", s, known.join(", "))
        })
    }
}

// ============================================================================
// Translator / Summarizer
// ============================================================================

/// LLM 번역기
pub struct Translator {
    llm: Arc<dyn LlmProvider>,
}

impl Translator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// 번역. 빈 입력은 "", 실패하면 원문
    pub async fn translate(&self, text: &str, target: Language) -> String {
        if text.trim().is_empty() {
            return String::new();
        }

        let prompt = format!(
            "Translate to {lang}. If already in {lang}, return unchanged. \
             Only translation, no explanation.\n\nText: \"{text}\"\n\n{lang}:",
            lang = target.name(),
            text = text
        );

        match self.llm.generate(&prompt, &GenerationOptions::text(0.1, 1024)).await {
            Ok(translated) => translated
                .trim()
                .trim_matches(|c| c == '"' || c == '\'')
                .to_string(),
            Err(e) => {
                tracing::warn!("Translation error: {}", e);
                text.to_string()
            }
        }
    }
}

/// LLM 요약기
pub struct Summarizer {
    llm: Arc<dyn LlmProvider>,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// 세 줄 요약. 빈 입력은 "No content available.", 실패하면 "Summary unavailable."
    pub async fn summarize(&self, text: &str, target: Language) -> String {
        if text.trim().is_empty() {
            return "No content available.".to_string();
        }

        let prompt = format!(
            "Summarize in {lang} using 3 bullet points (15-25 words each). Be concise and clear.\n\n\
             Content: \"{text}\"\n\nSummary in {lang}:",
            lang = target.name(),
            text = text
        );

        match self.llm.generate(&prompt, &GenerationOptions::text(0.3, 512)).await {
            Ok(summary) => summary.trim().to_string(),
            Err(e) => {
                tracing::warn!("Summarization error: {}", e);
                "Summary unavailable.".to_string()
            }
        }
    }
}

// ============================================================================
// CrossLanguageSearch
// ============================================================================

/// 검색 필터
#[derive(Debug, Clone)]
pub struct SearchFilters {
    pub limit: usize,
    /// None이면 전체 (뉴스 + 교육)
    pub kind: Option<ContentKind>,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self { limit: 5, kind: None }
    }
}

/// 처리된 검색 결과 한 건
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub original_title: String,
    pub original_language: String,
    pub original_language_code: String,
    pub was_translated: bool,
    pub summary: String,
    pub source: String,
    pub url: String,
    pub date: String,
    /// "education" 또는 "news"
    pub content_type: String,
    pub board: Option<String>,
    pub grade: Option<String>,
    pub subject: Option<String>,
}

/// 질의 응답
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub user_language: String,
    pub user_language_code: String,
    pub results_count: usize,
    pub cross_language_used: bool,
    pub results: Vec<SearchHit>,
    pub error: Option<String>,
}

/// 교차 언어 검색기
pub struct CrossLanguageSearch<'a> {
    store: &'a ContentStore,
    translator: Translator,
    summarizer: Summarizer,
    user_language: Language,
}

impl<'a> CrossLanguageSearch<'a> {
    pub fn new(store: &'a ContentStore, llm: Arc<dyn LlmProvider>, user_language: Language) -> Self {
        tracing::info!(
            "Cross-language search ready for {} ({})",
            user_language.name(),
            user_language.code()
        );

        Self {
            store,
            translator: Translator::new(llm.clone()),
            summarizer: Summarizer::new(llm),
            user_language,
        }
    }

    /// 질의 처리
    pub async fn process_query(&self, query: &str, filters: &SearchFilters) -> anyhow::Result<SearchResponse> {
        let limit = filters.limit.max(1);
        let user = self.user_language;

        tracing::info!("Searching '{}' in {}", query, user.name());
        let mut results = self
            .store
            .search(query, &[user.code().to_string()], filters.kind, limit * 2)?;

        let mut cross_language_used = false;
        if results.is_empty() {
            tracing::info!("No results in {}; searching all languages", user.name());
            cross_language_used = true;

            let mut queries = vec![query.to_string()];
            if user != Language::English {
                let translated = self.translator.translate(query, Language::English).await;
                tracing::info!("Translated query: {} → {}", query, translated);
                if !translated.is_empty() && translated != query {
                    queries.push(translated);
                }
            }

            for q in &queries {
                results = self.store.search(q, &[], filters.kind, limit * 2)?;
                if !results.is_empty() {
                    break;
                }
            }
        }

        if results.is_empty() {
            return Ok(SearchResponse {
                query: query.to_string(),
                user_language: user.name().to_string(),
                user_language_code: user.code().to_string(),
                results_count: 0,
                cross_language_used: false,
                results: vec![],
                error: Some(format!("No content found for '{}' in any language.", query)),
            });
        }

        let mut hits = Vec::new();
        for (idx, stored) in results.iter().take(limit).enumerate() {
            tracing::debug!("Processing result {}/{}", idx + 1, limit.min(results.len()));
            hits.push(self.process_hit(stored).await);
        }

        Ok(SearchResponse {
            query: query.to_string(),
            user_language: user.name().to_string(),
            user_language_code: user.code().to_string(),
            results_count: hits.len(),
            cross_language_used,
            results: hits,
            error: None,
        })
    }

    async fn process_hit(&self, stored: &StoredContent) -> SearchHit {
        let item = &stored.item;
        let code = item.primary_language().to_string();
        let original = Language::from_code(&code);
        let needs_translation = original != Some(self.user_language);

        let content_source = item
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .or(item.body.as_deref().filter(|b| !b.trim().is_empty()))
            .unwrap_or(&item.title);
        let content: String = content_source.chars().take(MAX_CONTENT_CHARS).collect();

        let (title, content) = if needs_translation {
            (
                self.translator.translate(&item.title, self.user_language).await,
                self.translator.translate(&content, self.user_language).await,
            )
        } else {
            (item.title.clone(), content)
        };

        let summary = self.summarizer.summarize(&content, self.user_language).await;
        let education = item.kind == ContentKind::Diksha;

        SearchHit {
            title,
            original_title: item.title.clone(),
            original_language: original.map(|l| l.name()).unwrap_or("Unknown").to_string(),
            original_language_code: code,
            was_translated: needs_translation,
            summary,
            source: item.source.clone(),
            url: item.url.clone(),
            date: item.published_at.clone().unwrap_or_else(|| "N/A".to_string()),
            content_type: if education { "education" } else { "news" }.to_string(),
            board: education.then(|| item.board.clone().unwrap_or_else(|| "N/A".to_string())),
            grade: education.then(|| item.grades.join(", ")),
            subject: education.then(|| item.subjects.join(", ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentItem;
    use crate::llm::testing::ScriptedProvider;
    use crate::llm::LlmError;
    use tempfile::tempdir;

    fn item(url: &str, title: &str, lang: &str, kind: ContentKind) -> ContentItem {
        ContentItem {
            content_id: url.to_string(),
            kind,
            source: if kind == ContentKind::Diksha { "DIKSHA" } else { "PIB" }.to_string(),
            url: url.to_string(),
            title: title.to_string(),
            description: Some(format!("{} description", title)),
            body: None,
            languages: vec![lang.to_string()],
            board: (kind == ContentKind::Diksha).then(|| "CBSE".to_string()),
            grades: vec!["Class 10".to_string()],
            subjects: vec!["Science".to_string(), "Physics".to_string()],
            published_at: None,
        }
    }

    #[test]
    fn test_language_lookup() {
        assert_eq!(Language::from_code("HI"), Some(Language::Hindi));
        assert_eq!(Language::from_name("tamil"), Some(Language::Tamil));
        assert_eq!(Language::from_name("বাংলা"), Some(Language::Bengali));
        assert_eq!(Language::from_name("pa"), Some(Language::Punjabi));
        assert!(Language::from_name("Klingon").is_none());
        assert!("Klingon".parse::<Language>().is_err());
        assert_eq!(Language::ALL.len(), 10);
    }

    #[tokio::test]
    async fn test_translator_and_summarizer_fallbacks() {
        let failing = || -> Arc<dyn LlmProvider> {
            Arc::new(ScriptedProvider::new(vec![Err(LlmError::EmptyResponse)]))
        };

        let translator = Translator::new(failing());
        assert_eq!(translator.translate("  ", Language::Hindi).await, "");
        assert_eq!(translator.translate("hello", Language::Hindi).await, "hello");

        let summarizer = Summarizer::new(failing());
        assert_eq!(summarizer.summarize("", Language::Hindi).await, "No content available.");
        assert_eq!(summarizer.summarize("text", Language::Hindi).await, "Summary unavailable.");

        let translator = Translator::new(Arc::new(ScriptedProvider::new(vec![Ok(" \"नमस्ते\" ".into())])));
        assert_eq!(translator.translate("hello", Language::Hindi).await, "नमस्ते");
    }

    #[tokio::test]
    async fn test_same_language_hit_is_not_translated() {
        let dir = tempdir().unwrap();
        let store = ContentStore::open(&dir.path().join("c.db")).unwrap();
        store
            .upsert(&item("https://pib.gov.in/1", "Solar mission", "en", ContentKind::Rss))
            .unwrap();

        let provider = Arc::new(ScriptedProvider::new(vec![Ok("- point".into())]));
        let search = CrossLanguageSearch::new(&store, provider.clone(), Language::English);
        let response = search.process_query("solar", &SearchFilters::default()).await.unwrap();

        assert_eq!(response.results_count, 1);
        assert!(!response.cross_language_used);
        let hit = &response.results[0];
        assert!(!hit.was_translated);
        assert_eq!(hit.title, "Solar mission");
        assert_eq!(hit.summary, "- point");
        assert_eq!(hit.content_type, "news");
        assert!(hit.board.is_none());
        assert_eq!(hit.date, "N/A");
        // 요약 한 번만
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_cross_language_fallback_with_translated_query() {
        let dir = tempdir().unwrap();
        let store = ContentStore::open(&dir.path().join("c.db")).unwrap();
        store
            .upsert(&item("https://diksha.gov.in/play/content/do_1", "Electricity", "en", ContentKind::Diksha))
            .unwrap();

        // 질의 번역 → 제목 번역 → 본문 번역 → 요약
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok("electricity".into()),
            Ok("बिजली".into()),
            Ok("बिजली विवरण".into()),
            Ok("- सारांश".into()),
        ]));
        let search = CrossLanguageSearch::new(&store, provider.clone(), Language::Hindi);
        let response = search.process_query("बिजली", &SearchFilters::default()).await.unwrap();

        assert!(response.cross_language_used);
        assert_eq!(response.user_language_code, "hi");
        let hit = &response.results[0];
        assert!(hit.was_translated);
        assert_eq!(hit.title, "बिजली");
        assert_eq!(hit.original_title, "Electricity");
        assert_eq!(hit.original_language, "English");
        assert_eq!(hit.summary, "- सारांश");
        assert_eq!(hit.content_type, "education");
        assert_eq!(hit.board.as_deref(), Some("CBSE"));
        assert_eq!(hit.subject.as_deref(), Some("Science, Physics"));
        assert_eq!(provider.calls(), 4);
    }

    #[tokio::test]
    async fn test_no_results_sets_error() {
        let dir = tempdir().unwrap();
        let store = ContentStore::open(&dir.path().join("c.db")).unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let search = CrossLanguageSearch::new(&store, provider, Language::English);

        let response = search.process_query("nothing", &SearchFilters::default()).await.unwrap();
        assert_eq!(response.results_count, 0);
        assert!(!response.cross_language_used);
        assert_eq!(
            response.error.as_deref(),
            Some("No content found for 'nothing' in any language.")
        );
    }
}
