//! LLM 모듈 - Gemini API를 통한 텍스트 생성
//!
//! 패턴 학습, 피드 품질 평가, 숨은 피드 탐색, 번역/요약에 사용하는
//! Gemini 프로바이더입니다. JSON 응답이 필요한 호출은 [`complete_json`]을
//! 거쳐 전체 재시도 예산 안에서 처리됩니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let llm = GeminiClient::from_env()?;
//! let value = complete_json(&llm, prompt, &GenerationOptions::json(0.2, 4096), &RetryBudget::default()).await?;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

// ============================================================================
// Errors
// ============================================================================

/// LLM 호출 에러
///
/// 호출자는 쿼터 에러(재시도 대상)와 그 외 에러를 구분해야 합니다.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.")]
    MissingApiKey,

    #[error("Rate limit exceeded (429): {0}")]
    RateLimited(String),

    #[error("Gemini API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to decode model response: {0}")]
    Decode(String),

    #[error("Model returned an empty response")]
    EmptyResponse,
}

impl LlmError {
    /// 쿼터/리소스 소진 계열 에러인지 확인
    pub fn is_quota(&self) -> bool {
        match self {
            LlmError::RateLimited(_) => true,
            LlmError::Api { status, message } => {
                *status == 429
                    || message.contains("RESOURCE_EXHAUSTED")
                    || message.contains("Resource exhausted")
                    || message.to_lowercase().contains("quota")
            }
            _ => false,
        }
    }
}

// ============================================================================
// LlmProvider Trait
// ============================================================================

/// 생성 옵션
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// `application/json` 응답 강제 여부
    pub json: bool,
}

impl GenerationOptions {
    /// JSON 응답용 옵션
    pub fn json(temperature: f32, max_output_tokens: u32) -> Self {
        Self {
            temperature,
            max_output_tokens,
            json: true,
        }
    }

    /// 일반 텍스트 응답용 옵션
    pub fn text(temperature: f32, max_output_tokens: u32) -> Self {
        Self {
            temperature,
            max_output_tokens,
            json: false,
        }
    }
}

/// LLM 프로바이더 트레이트
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// 프롬프트에 대한 응답 텍스트 생성
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, LlmError>;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Rate Limiter
// ============================================================================

/// Gemini API 기본 엔드포인트
/// ref: https://ai.google.dev/api/generate-content
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// 기본 모델
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Rate limit 설정
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// 분당 최대 요청 수
    pub requests_per_minute: u32,
    /// 직전 응답 수신 시점부터의 최소 간격
    pub min_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            min_interval: Duration::from_millis(1000),
        }
    }
}

/// Rate Limiter with minimum delay measured from the previous response
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_interval: Duration,
    last_response: Option<Instant>,
}

impl RateLimiter {
    fn new(config: &RateLimitConfig) -> Self {
        Self {
            requests: Vec::new(),
            max_requests: config.requests_per_minute.max(1),
            window: Duration::from_secs(60),
            min_interval: config.min_interval,
            last_response: None,
        }
    }

    /// 요청 슬롯 확보 (필요 시 대기)
    async fn acquire(&mut self) {
        if let Some(last) = self.last_response {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Min interval: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        let now = Instant::now();
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        self.requests.push(Instant::now());
    }

    /// 응답(쿼터 에러 포함) 수신 시점 기록
    fn record_response(&mut self) {
        self.last_response = Some(Instant::now());
    }
}

// ============================================================================
// Gemini Client
// ============================================================================

/// Google Gemini 텍스트 생성 클라이언트
#[derive(Debug)]
pub struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl GeminiClient {
    /// 기본 모델과 rate limit으로 생성
    pub fn new(api_key: String) -> anyhow::Result<Self> {
        Self::with_config(api_key, DEFAULT_MODEL.to_string(), RateLimitConfig::default())
    }

    /// 모델과 rate limit을 지정하여 생성
    pub fn with_config(
        api_key: String,
        model: String,
        rate_limit: RateLimitConfig,
    ) -> anyhow::Result<Self> {
        if api_key.trim().is_empty() {
            anyhow::bail!(LlmError::MissingApiKey);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            model,
            base_url: GEMINI_API_BASE.to_string(),
            client,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(&rate_limit))),
        })
    }

    /// 환경변수에서 생성
    ///
    /// `GEMINI_MODEL`이 있으면 모델을 덮어씁니다.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_env_with_rate_limit(RateLimitConfig::default())
    }

    /// 환경변수에서 rate limit을 지정하여 생성
    pub fn from_env_with_rate_limit(rate_limit: RateLimitConfig) -> anyhow::Result<Self> {
        let api_key = get_api_key()?;
        let model = std::env::var("GEMINI_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Self::with_config(api_key, model, rate_limit)
    }

    /// API 베이스 URL 변경 (프록시/테스트 서버용)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// 사용 중인 모델
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

/// generateContent 요청 본문
/// ref: https://ai.google.dev/api/generate-content
#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    role: String,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    #[serde(rename = "responseMimeType", skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Debug, Deserialize)]
struct TextPart {
    #[serde(default)]
    text: String,
}

/// Gemini API 에러 응답
#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

#[async_trait]
impl LlmProvider for GeminiClient {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, LlmError> {
        let request = GenerateRequest {
            contents: vec![RequestContent {
                role: "user".to_string(),
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_output_tokens,
                response_mime_type: options.json.then(|| "application/json".to_string()),
            },
        };

        {
            let mut limiter = self.rate_limiter.lock().await;
            limiter.acquire().await;
        }

        let sent = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await;

        // 응답을 받았든 실패했든 다음 호출은 지금부터 간격을 센다
        self.rate_limiter.lock().await.record_response();

        let response = sent?;
        let status = response.status();
        let body = response.text().await?;

        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited(truncate(&body, 200)));
        }

        if !status.is_success() {
            let message = match serde_json::from_str::<GeminiError>(&body) {
                Ok(err) if !err.error.status.is_empty() => {
                    format!("{}: {}", err.error.status, err.error.message)
                }
                Ok(err) => err.error.message,
                Err(_) => truncate(&body, 200),
            };
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::Decode(e.to_string()))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        Ok(text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// JSON Completion
// ============================================================================

/// 재시도 예산
#[derive(Debug, Clone)]
pub struct RetryBudget {
    /// 전체 허용 시간 (대기 + 호출)
    pub total: Duration,
    /// 첫 백오프 (시도마다 2배)
    pub initial_backoff: Duration,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self {
            total: Duration::from_secs(60),
            initial_backoff: Duration::from_secs(2),
        }
    }
}

/// JSON 응답을 예산 안에서 받아오기
///
/// 쿼터 에러와 해석 불가능한 응답은 지수 백오프 후 재시도합니다.
/// 예산을 모두 쓰면 `Ok(None)`을 반환하므로 호출자가 폴백을 적용합니다.
/// 쿼터 이외의 에러는 그대로 반환합니다.
pub async fn complete_json(
    provider: &dyn LlmProvider,
    prompt: &str,
    options: &GenerationOptions,
    budget: &RetryBudget,
) -> Result<Option<Value>, LlmError> {
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        let remaining = budget.total.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            tracing::warn!("LLM retry budget exhausted after {} attempts", attempt - 1);
            return Ok(None);
        }

        let text = match tokio::time::timeout(remaining, provider.generate(prompt, options)).await {
            Err(_) => {
                tracing::warn!("LLM call did not finish within the remaining budget");
                return Ok(None);
            }
            Ok(Ok(text)) => text,
            Ok(Err(e)) if e.is_quota() => {
                tracing::warn!("{} quota hit (attempt {}): {}", provider.name(), attempt, e);
                if !backoff(started, budget, attempt).await {
                    return Ok(None);
                }
                continue;
            }
            Ok(Err(e)) => return Err(e),
        };

        match parse_json_response(&text) {
            Some(value) => return Ok(Some(value)),
            None => {
                tracing::warn!(
                    "Failed to parse {} response as JSON (attempt {})",
                    provider.name(),
                    attempt
                );
                if !backoff(started, budget, attempt).await {
                    return Ok(None);
                }
            }
        }
    }
}

/// 백오프 대기. 남은 예산이 없으면 false
async fn backoff(started: Instant, budget: &RetryBudget, attempt: u32) -> bool {
    let remaining = budget.total.saturating_sub(started.elapsed());
    if remaining.is_zero() {
        return false;
    }

    let exp = budget
        .initial_backoff
        .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
    let wait = exp.min(remaining.max(Duration::from_secs(1)));
    tracing::debug!("Backing off {:?} before retry", wait);
    tokio::time::sleep(wait).await;
    true
}

/// 모델 응답 텍스트를 JSON 값으로 해석
///
/// 코드 펜스(```json)를 제거하고, 실패하면 가장 바깥쪽 `{...}` 또는 `[...]`
/// 부분 문자열을 시도합니다.
pub fn parse_json_response(text: &str) -> Option<Value> {
    let mut body = text.trim();

    if body.starts_with("```") {
        let parts: Vec<&str> = body.split("```").collect();
        if parts.len() >= 2 {
            body = parts[1];
            if let Some(rest) = body.strip_prefix("json") {
                body = rest;
            }
        }
    }

    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Some(value);
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (body.find(open), body.rfind(close)) {
            if end > start {
                if let Ok(value) = serde_json::from_str::<Value>(&body[start..=end]) {
                    return Some(value);
                }
            }
        }
    }

    None
}

/// JSON 값에서 객체 하나를 꺼냄 (리스트면 첫 번째 객체)
pub fn into_object(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        Value::Array(items) => match items.into_iter().next() {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        },
        _ => None,
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> anyhow::Result<String> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    anyhow::bail!(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
    )
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"]
        .iter()
        .any(|var| std::env::var(var).map(|k| !k.is_empty()).unwrap_or(false))
}

// ============================================================================
// Test Support
// ============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// 미리 정해진 응답을 순서대로 돌려주는 프로바이더
    pub struct ScriptedProvider {
        responses: Mutex<VecDeque<Result<String, LlmError>>>,
        fallback: String,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                fallback: "{}".to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }

        /// 스크립트가 끝난 뒤 반복할 응답
        pub fn with_fallback(mut self, fallback: &str) -> Self {
            self.fallback = fallback.to_string();
            self
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().map(|p| p.len()).unwrap_or(0)
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<String, LlmError> {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt.to_string());
            }
            let next = self.responses.lock().ok().and_then(|mut r| r.pop_front());
            next.unwrap_or_else(|| Ok(self.fallback.clone()))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    /// 테스트용 짧은 예산
    pub fn quick_budget() -> RetryBudget {
        RetryBudget {
            total: Duration::from_millis(500),
            initial_backoff: Duration::from_millis(1),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
