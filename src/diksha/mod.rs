//! DIKSHA 모듈 - 교육 콘텐츠 탐색
//!
//! DIKSHA 공개 검색 API(`/api/content/v1/search`, 인증 불필요)를
//! 보드 × 학년 × 과목 × 매체 조합으로 훑어 콘텐츠를 모읍니다.
//!
//! - 페이지네이션 (빈 페이지, `max_items`, 전체 `count` 도달 시 중단)
//! - 조합별 체크포인트 (이미 끝난 조합은 건너뜀)
//! - 언어/보드/학년/과목별 통계
//! - JSON/CSV 내보내기, 콘텐츠 저장소 적재

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use itertools::iproduct;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::content::{ContentItem, ContentKind, ContentStore};
use crate::search::Language;

/// 요청에 포함하는 필드
const SEARCH_FIELDS: &[&str] = &[
    "name",
    "identifier",
    "description",
    "board",
    "gradeLevel",
    "subject",
    "medium",
    "language",
    "contentType",
    "primaryCategory",
    "mimeType",
    "createdOn",
    "lastUpdatedOn",
    "status",
    "framework",
    "channel",
];

/// 콘텐츠 재생 페이지
const PLAY_URL: &str = "https://diksha.gov.in/play/content/";

// ============================================================================
// Config
// ============================================================================

/// DIKSHA API 설정
#[derive(Debug, Clone)]
pub struct DikshaConfig {
    pub base_url: String,
    pub search_endpoint: String,
    pub languages: Vec<String>,
    pub boards: Vec<String>,
    pub grades: Vec<String>,
    pub subjects: Vec<String>,
    /// 페이지당 항목 수
    pub page_limit: usize,
    pub timeout: Duration,
    /// 페이지/조합 사이 대기
    pub rate_delay: Duration,
    pub max_retries: u32,
    /// 재시도 대기 단위 (대기 = 단위 × 2^attempt)
    pub retry_unit: Duration,
    pub checkpoint_dir: PathBuf,
}

impl Default for DikshaConfig {
    fn default() -> Self {
        let strings = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        Self {
            base_url: "https://diksha.gov.in".to_string(),
            search_endpoint: "/api/content/v1/search".to_string(),
            languages: strings(&[
                "English", "Hindi", "Tamil", "Telugu", "Marathi", "Gujarati", "Kannada",
                "Malayalam", "Bengali", "Punjabi", "Assamese", "Odia", "Urdu",
            ]),
            boards: strings(&["CBSE", "NCERT"]),
            grades: (1..=12).map(|i| format!("Class {}", i)).collect(),
            subjects: strings(&[
                "Mathematics", "Science", "English", "Hindi", "Social Science", "Physics",
                "Chemistry", "Biology",
            ]),
            page_limit: 100,
            timeout: Duration::from_secs(15),
            rate_delay: Duration::from_secs(1),
            max_retries: 3,
            retry_unit: Duration::from_secs(1),
            checkpoint_dir: PathBuf::from("checkpoints"),
        }
    }
}

// ============================================================================
// Types
// ============================================================================

/// 검색 필터 (None은 필터 없음)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DikshaFilters {
    pub board: Option<String>,
    pub grade: Option<String>,
    pub subject: Option<String>,
    pub medium: Option<String>,
}

impl DikshaFilters {
    /// 조합 체크포인트 키 (`board_grade_subject_medium|all`)
    pub fn checkpoint_key(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.board.as_deref().unwrap_or("all"),
            self.grade.as_deref().unwrap_or("all"),
            self.subject.as_deref().unwrap_or("all"),
            self.medium.as_deref().unwrap_or("all")
        )
    }

    fn to_json(&self) -> Value {
        let mut filters = serde_json::Map::new();
        filters.insert("status".to_string(), json!(["Live"]));
        for (key, value) in [
            ("board", &self.board),
            ("gradeLevel", &self.grade),
            ("subject", &self.subject),
            ("medium", &self.medium),
        ] {
            if let Some(v) = value {
                filters.insert(key.to_string(), json!([v]));
            }
        }
        Value::Object(filters)
    }
}

/// API가 돌려준 콘텐츠 한 건
///
/// 문자열 또는 목록으로 올 수 있는 필드는 목록으로 정규화합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DikshaItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub identifier: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub board: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub grade_level: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub subject: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub medium: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub language: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub content_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub primary_category: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mime_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub created_on: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_updated_on: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub framework: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub channel: Option<String>,
    /// 이 항목을 찾은 조합
    #[serde(default)]
    pub discovered: Option<DikshaFilters>,
}

/// 검색 결과 한 페이지
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub content: Vec<DikshaItem>,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Option<SearchResult>,
}

/// 내보내기용 평탄화 레코드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DikshaRecord {
    pub source: String,
    pub content_id: Option<String>,
    pub title: Option<String>,
    pub description: String,
    pub content_type: Option<String>,
    pub primary_category: Option<String>,
    pub mime_type: Option<String>,
    pub board: Option<String>,
    pub grade_level: Vec<String>,
    pub subject: Vec<String>,
    pub language: Vec<String>,
    pub medium: Vec<String>,
    pub diksha_url: String,
    pub framework: Option<String>,
    pub channel: Option<String>,
    pub status: Option<String>,
    pub created_on: Option<String>,
    pub last_updated_on: Option<String>,
    pub discovered_at: DateTime<Utc>,
    pub discovered_board: Option<String>,
    pub discovered_grade: Option<String>,
    pub discovered_subject: Option<String>,
    pub discovered_medium: Option<String>,
}

/// 탐색 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DikshaStats {
    pub total_requests: usize,
    pub total_discovered: usize,
    pub by_language: BTreeMap<String, usize>,
    pub by_board: BTreeMap<String, usize>,
    pub by_grade: BTreeMap<String, usize>,
    pub by_subject: BTreeMap<String, usize>,
}

/// 체계적 탐색 계획 (빈 목록은 설정의 기본값)
#[derive(Debug, Clone, Default)]
pub struct SystematicPlan {
    pub boards: Vec<String>,
    pub grades: Vec<String>,
    pub subjects: Vec<String>,
    /// 비어 있으면 매체 필터 없이 한 번
    pub mediums: Vec<String>,
    pub items_per_combination: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinationCount {
    pub filters: DikshaFilters,
    pub count: usize,
}

/// 체계적 탐색 결과
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystematicReport {
    pub combinations_total: usize,
    pub combinations_tested: usize,
    pub combinations_skipped: usize,
    pub combinations_with_content: usize,
    pub total_content: usize,
    pub by_combination: Vec<CombinationCount>,
}

// ============================================================================
// DikshaDiscoveryAgent
// ============================================================================

/// DIKSHA 탐색 에이전트
pub struct DikshaDiscoveryAgent {
    client: reqwest::Client,
    config: DikshaConfig,
    discovered: Vec<DikshaItem>,
    stats: DikshaStats,
}

impl DikshaDiscoveryAgent {
    pub fn new(config: DikshaConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.checkpoint_dir).with_context(|| {
            format!("Failed to create checkpoint directory: {}", config.checkpoint_dir.display())
        })?;

        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; BharatConnect/1.0)")
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        tracing::info!(
            "DIKSHA agent initialized (endpoint: {}{}, checkpoints: {})",
            config.base_url,
            config.search_endpoint,
            config.checkpoint_dir.display()
        );

        Ok(Self {
            client,
            config,
            discovered: Vec::new(),
            stats: DikshaStats::default(),
        })
    }

    pub fn config(&self) -> &DikshaConfig {
        &self.config
    }

    pub fn discovered(&self) -> &[DikshaItem] {
        &self.discovered
    }

    pub fn stats(&self) -> &DikshaStats {
        &self.stats
    }

    /// 재시도 포함 POST. 429는 2^attempt 단위 대기 후 재시도, 그 외 상태는 포기
    async fn post_search(&mut self, payload: &Value) -> Option<SearchResult> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), self.config.search_endpoint);

        for attempt in 1..=self.config.max_retries {
            let backoff = self.config.retry_unit * 2u32.pow(attempt);
            let response = self
                .client
                .post(&url)
                .header("Accept", "application/json")
                .json(payload)
                .send()
                .await;
            self.stats.total_requests += 1;

            match response {
                Ok(resp) if resp.status().is_success() => match resp.json::<SearchResponse>().await {
                    Ok(body) => return Some(body.result.unwrap_or_default()),
                    Err(e) => {
                        tracing::error!("Invalid DIKSHA response: {}", e);
                        return None;
                    }
                },
                Ok(resp) if resp.status().as_u16() == 429 => {
                    if attempt < self.config.max_retries {
                        tracing::warn!("Rate limit, waiting {:?}", backoff);
                        tokio::time::sleep(backoff).await;
                    } else {
                        tracing::error!("Rate limit persists after {} attempts", attempt);
                    }
                }
                Ok(resp) => {
                    tracing::error!("DIKSHA API error {}", resp.status().as_u16());
                    return None;
                }
                Err(e) => {
                    tracing::error!("DIKSHA request error: {}", e);
                    if attempt < self.config.max_retries {
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        None
    }

    /// 콘텐츠 검색 한 페이지. 실패하면 빈 결과
    pub async fn search_content(&mut self, filters: &DikshaFilters, limit: usize, offset: usize) -> SearchResult {
        let payload = json!({
            "request": {
                "filters": filters.to_json(),
                "limit": limit,
                "offset": offset,
                "fields": SEARCH_FIELDS,
            }
        });

        self.post_search(&payload).await.unwrap_or_default()
    }

    /// 페이지를 넘기며 수집
    pub async fn discover_with_pagination(
        &mut self,
        filters: &DikshaFilters,
        max_items: Option<usize>,
    ) -> Vec<DikshaItem> {
        let limit = self.config.page_limit.max(1);
        let mut all: Vec<DikshaItem> = Vec::new();
        let mut offset = 0;
        let mut page = 1;

        tracing::info!("Discovering: {}", filters.checkpoint_key());

        loop {
            let result = self.search_content(filters, limit, offset).await;
            if result.content.is_empty() {
                break;
            }

            tracing::info!(
                "   Page {}: {} items (total available: {})",
                page,
                result.content.len(),
                result.count
            );
            all.extend(result.content);

            if let Some(max) = max_items {
                if all.len() >= max {
                    all.truncate(max);
                    break;
                }
            }
            if all.len() as u64 >= result.count {
                break;
            }

            offset += limit;
            page += 1;
            tokio::time::sleep(self.config.rate_delay).await;
        }

        tracing::info!("   Total discovered: {} items", all.len());
        all
    }

    fn checkpoint_path(&self, key: &str) -> PathBuf {
        self.config.checkpoint_dir.join(format!("{}.json", key))
    }

    /// 보드 × 학년 × 과목 × 매체 조합 탐색
    pub async fn discover_systematic(&mut self, plan: SystematicPlan) -> Result<SystematicReport> {
        let pick = |given: Vec<String>, default: &[String]| if given.is_empty() { default.to_vec() } else { given };
        let boards = pick(plan.boards, &self.config.boards);
        let grades = pick(plan.grades, &self.config.grades);
        let subjects = pick(plan.subjects, &self.config.subjects);
        let mediums: Vec<Option<String>> = if plan.mediums.is_empty() {
            vec![None]
        } else {
            plan.mediums.into_iter().map(Some).collect()
        };
        let max_items = (plan.items_per_combination > 0).then_some(plan.items_per_combination);

        let combinations: Vec<DikshaFilters> = iproduct!(&boards, &grades, &subjects, &mediums)
            .map(|(board, grade, subject, medium)| DikshaFilters {
                board: Some(board.clone()),
                grade: Some(grade.clone()),
                subject: Some(subject.clone()),
                medium: medium.clone(),
            })
            .collect();

        let mut report = SystematicReport {
            combinations_total: combinations.len(),
            ..Default::default()
        };
        tracing::info!(
            "Systematic DIKSHA discovery: {} boards, {} grades, {} subjects, {} mediums ({} combinations)",
            boards.len(),
            grades.len(),
            subjects.len(),
            mediums.len(),
            combinations.len()
        );

        for (idx, filters) in combinations.into_iter().enumerate() {
            let key = filters.checkpoint_key();
            tracing::info!("[{}/{}] {}", idx + 1, report.combinations_total, key);

            let checkpoint = self.checkpoint_path(&key);
            if checkpoint.exists() {
                tracing::info!("   Skipping (checkpoint exists)");
                report.combinations_skipped += 1;
                continue;
            }

            let mut content = self.discover_with_pagination(&filters, max_items).await;
            if !content.is_empty() {
                for item in &mut content {
                    item.discovered = Some(filters.clone());
                }
                self.update_stats(&content);

                report.combinations_with_content += 1;
                report.total_content += content.len();
                report.by_combination.push(CombinationCount {
                    filters: filters.clone(),
                    count: content.len(),
                });
                self.discovered.extend(content);

                let marker = json!({ "timestamp": Utc::now().to_rfc3339() });
                std::fs::write(&checkpoint, marker.to_string())
                    .with_context(|| format!("Failed to write checkpoint: {}", checkpoint.display()))?;
            }

            report.combinations_tested += 1;
            tokio::time::sleep(self.config.rate_delay).await;
        }

        self.stats.total_discovered = self.discovered.len();
        tracing::info!(
            "Systematic discovery complete: {}/{} combinations with content, {} items",
            report.combinations_with_content,
            report.combinations_total,
            report.total_content
        );
        Ok(report)
    }

    fn update_stats(&mut self, items: &[DikshaItem]) {
        for item in items {
            for lang in &item.language {
                *self.stats.by_language.entry(lang.clone()).or_default() += 1;
            }
            if let Some(board) = item.board.first() {
                *self.stats.by_board.entry(board.clone()).or_default() += 1;
            }
            for grade in &item.grade_level {
                *self.stats.by_grade.entry(grade.clone()).or_default() += 1;
            }
            for subject in &item.subject {
                *self.stats.by_subject.entry(subject.clone()).or_default() += 1;
            }
        }
    }

    pub fn records(&self) -> Vec<DikshaRecord> {
        self.discovered.iter().map(to_record).collect()
    }

    /// 메타데이터 + 레코드 JSON 내보내기
    pub fn export_json(&self, path: &Path) -> Result<()> {
        let export = json!({
            "metadata": {
                "timestamp": Utc::now().to_rfc3339(),
                "total_content": self.discovered.len(),
                "statistics": self.stats,
            },
            "content": self.records(),
        });

        std::fs::write(path, serde_json::to_string_pretty(&export)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Exported {} items to {}", self.discovered.len(), path.display());
        Ok(())
    }

    /// CSV 내보내기 (목록 필드는 "; "로 연결). 내보낸 행 수 반환, 비어 있으면 파일을 만들지 않음
    pub fn export_csv(&self, path: &Path) -> Result<usize> {
        if self.discovered.is_empty() {
            return Ok(0);
        }

        let records = self.records();
        let mut out = String::new();
        out.push_str(&CSV_COLUMNS.join(","));
        out.push('\n');
        for record in &records {
            let row: Vec<String> = csv_row(record).iter().map(|f| csv_escape(f)).collect();
            out.push_str(&row.join(","));
            out.push('\n');
        }

        std::fs::write(path, out).with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Exported {} rows to {}", records.len(), path.display());
        Ok(records.len())
    }

    /// 콘텐츠 저장소에 적재. 저장한 수 반환
    pub fn store_into(&self, store: &ContentStore) -> Result<usize> {
        let mut stored = 0;
        for item in &self.discovered {
            if let Some(content) = to_content_item(item) {
                store.upsert(&content)?;
                stored += 1;
            }
        }
        tracing::info!("Stored {} DIKSHA items", stored);
        Ok(stored)
    }
}

// ============================================================================
// Record conversion
// ============================================================================

/// API 항목 → 내보내기 레코드
pub fn to_record(item: &DikshaItem) -> DikshaRecord {
    let discovered = item.discovered.clone().unwrap_or_default();

    DikshaRecord {
        source: "DIKSHA".to_string(),
        content_id: item.identifier.clone(),
        title: item.name.clone(),
        description: item.description.clone().unwrap_or_default(),
        content_type: item.content_type.clone(),
        primary_category: item.primary_category.clone(),
        mime_type: item.mime_type.clone(),
        board: item.board.first().cloned(),
        grade_level: item.grade_level.clone(),
        subject: item.subject.clone(),
        language: item.language.clone(),
        medium: item.medium.clone(),
        diksha_url: format!("{}{}", PLAY_URL, item.identifier.as_deref().unwrap_or("")),
        framework: item.framework.clone(),
        channel: item.channel.clone(),
        status: item.status.clone(),
        created_on: item.created_on.clone(),
        last_updated_on: item.last_updated_on.clone(),
        discovered_at: Utc::now(),
        discovered_board: discovered.board,
        discovered_grade: discovered.grade,
        discovered_subject: discovered.subject,
        discovered_medium: discovered.medium,
    }
}

/// 저장소용 항목. identifier가 없으면 None
fn to_content_item(item: &DikshaItem) -> Option<ContentItem> {
    let id = item.identifier.clone().filter(|s| !s.is_empty())?;

    let mut languages: Vec<String> = Vec::new();
    for name in item.language.iter().chain(item.medium.iter()) {
        if let Some(lang) = Language::from_name(name) {
            let code = lang.code().to_string();
            if !languages.contains(&code) {
                languages.push(code);
            }
        }
    }
    if languages.is_empty() {
        languages.push("en".to_string());
    }

    Some(ContentItem {
        url: format!("{}{}", PLAY_URL, id),
        title: item.name.clone().unwrap_or_else(|| id.clone()),
        content_id: id,
        kind: ContentKind::Diksha,
        source: "DIKSHA".to_string(),
        description: item.description.clone(),
        body: None,
        languages,
        board: item.board.first().cloned(),
        grades: item.grade_level.clone(),
        subjects: item.subject.clone(),
        published_at: item.last_updated_on.clone().or_else(|| item.created_on.clone()),
    })
}

const CSV_COLUMNS: &[&str] = &[
    "source",
    "content_id",
    "title",
    "description",
    "content_type",
    "primary_category",
    "mime_type",
    "board",
    "grade_level",
    "subject",
    "language",
    "medium",
    "diksha_url",
    "framework",
    "channel",
    "status",
    "created_on",
    "last_updated_on",
    "discovered_at",
    "discovered_board",
    "discovered_grade",
    "discovered_subject",
    "discovered_medium",
];

fn csv_row(r: &DikshaRecord) -> Vec<String> {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    let list = |v: &[String]| v.join("; ");

    vec![
        r.source.clone(),
        opt(&r.content_id),
        opt(&r.title),
        r.description.clone(),
        opt(&r.content_type),
        opt(&r.primary_category),
        opt(&r.mime_type),
        opt(&r.board),
        list(&r.grade_level),
        list(&r.subject),
        list(&r.language),
        list(&r.medium),
        r.diksha_url.clone(),
        opt(&r.framework),
        opt(&r.channel),
        opt(&r.status),
        opt(&r.created_on),
        opt(&r.last_updated_on),
        r.discovered_at.to_rfc3339(),
        opt(&r.discovered_board),
        opt(&r.discovered_grade),
        opt(&r.discovered_subject),
        opt(&r.discovered_medium),
    ]
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

// ============================================================================
// Lenient deserializers
// ============================================================================

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// 문자열, 숫자, 목록(첫 값), null 허용
fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match &value {
        Value::Array(items) => items.iter().find_map(scalar_to_string),
        other => scalar_to_string(other),
    })
}

/// 문자열 하나 또는 목록 → 목록
fn string_or_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match &value {
        Value::Array(items) => items.iter().filter_map(scalar_to_string).collect(),
        Value::String(s) if s.is_empty() => vec![],
        other => scalar_to_string(other).into_iter().collect(),
    })
}
