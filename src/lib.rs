//! bharat-connect - 인도 정부 피드 탐색 및 다국어 검색
//!
//! 정부 포털에서 RSS/Atom 피드를 찾아 LLM으로 검증하고,
//! 발견한 URL 패턴을 학습해 새 후보를 생성합니다.
//! DIKSHA 교육 콘텐츠와 수집한 뉴스는 SQLite FTS5 저장소에 쌓이고,
//! 사용자 언어로 번역·요약하는 교차 언어 검색에 쓰입니다.

pub mod cli;
pub mod content;
pub mod coordinator;
pub mod diksha;
pub mod feed;
pub mod learning;
pub mod llm;
pub mod rag;
pub mod scraper;
pub mod search;
pub mod validator;

// Re-exports
pub use content::{get_data_dir, ContentItem, ContentKind, ContentStore, FeedHarvester};
pub use coordinator::{CheckpointManager, Coordinator, CoordinatorConfig, DiscoveryResults};
pub use diksha::{DikshaConfig, DikshaDiscoveryAgent, DikshaFilters};
pub use feed::{parse_feed, Confidence, FeedCandidate, ParsedFeed};
pub use learning::LearningAgent;
pub use llm::{get_api_key, has_api_key, GeminiClient, LlmError, LlmProvider, RetryBudget};
pub use rag::{RagAgent, Strategy};
pub use crate::scraper::{FeedDiscoverer, WebScraper};
pub use search::{CrossLanguageSearch, Language};
pub use validator::{AiValidator, FeedValidator, LightweightValidator, ValidationReport, ValidationStore};
