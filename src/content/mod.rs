//! 콘텐츠 모듈
//!
//! RSS 항목과 DIKSHA 교육 콘텐츠를 하나의 SQLite(FTS5) 저장소에 모으고,
//! 검증된 피드에서 항목을 수집합니다.

mod harvest;
mod store;

pub use harvest::{feed_to_items, normalize_language, FeedHarvester, HarvestConfig, HarvestReport};
pub use store::{get_data_dir, ContentItem, ContentKind, ContentStats, ContentStore, StoredContent};

pub(crate) use store::ensure_data_dir;
