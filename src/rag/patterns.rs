//! LLM 기반 패턴 학습
//!
//! 알려진 피드 URL을 LLM에 보여주고 파라미터 의미, 의존 관계,
//! 새 조합 제안, 커버리지 추정을 JSON으로 받습니다.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::analyzer::{NumericRange, ParamKind, UrlStructure, INTERNAL_PARAMS};
use crate::llm::{complete_json, into_object, GenerationOptions, LlmProvider, RetryBudget};

/// LLM에 보내는 최대 피드 수
const MAX_FEEDS_IN_PROMPT: usize = 20;

/// 학습된 파라미터
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearnedParameter {
    pub kind: Option<ParamKind>,
    pub observed_values: Vec<String>,
    pub range: Option<NumericRange>,
    pub confidence: Option<f64>,
    pub interpretation: Option<String>,
}

/// 파라미터 간 의존 관계
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    pub parameter: String,
    pub depends_on: String,
    pub relationship: String,
}

/// 새 파라미터 조합 제안
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub params: BTreeMap<String, String>,
    pub confidence: Option<f64>,
    pub reasoning: Option<String>,
}

/// 커버리지 추정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Coverage {
    pub estimated_total_feeds: Option<u64>,
    pub discovered_so_far: Option<u64>,
    pub coverage_percent: f64,
}

/// 학습된 패턴 (매 반복마다 다시 생성)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearnedPatterns {
    pub domain: String,
    pub path: String,
    pub path_patterns: Vec<String>,
    pub parameters: BTreeMap<String, LearnedParameter>,
    pub dependencies: Vec<Dependency>,
    pub suggestions: Vec<Suggestion>,
    pub coverage: Option<Coverage>,
}

impl LearnedPatterns {
    /// 생성에 쓸 수 있는 정보가 없는지
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.suggestions.is_empty()
    }

    /// 로컬 구조만으로 만든 패턴
    pub fn from_structure(structure: &UrlStructure) -> Self {
        let parameters = structure
            .parameters
            .iter()
            .map(|(name, summary)| {
                (
                    name.clone(),
                    LearnedParameter {
                        kind: Some(summary.kind),
                        observed_values: summary.observed_values.clone(),
                        range: summary.numeric_range,
                        confidence: None,
                        interpretation: None,
                    },
                )
            })
            .collect();

        Self {
            domain: structure.domain.clone(),
            path: structure.path.clone(),
            path_patterns: structure.path_patterns.clone(),
            parameters,
            ..Default::default()
        }
    }

    /// 로컬 구조와 LLM 결과 병합 (LLM 필드 우선)
    pub fn merge(structure: &UrlStructure, learned: Option<LearnedPatterns>) -> Self {
        let mut merged = Self::from_structure(structure);
        let Some(learned) = learned else {
            return merged;
        };

        if !learned.parameters.is_empty() {
            merged.parameters = learned.parameters;
        }
        merged.dependencies = learned.dependencies;
        merged.suggestions = learned.suggestions;
        merged.coverage = learned.coverage;
        merged
    }

    /// LLM JSON 응답 해석 (필드가 없거나 형식이 달라도 가능한 만큼)
    pub fn from_llm(obj: &Map<String, Value>) -> Self {
        let mut patterns = Self::default();

        if let Some(Value::Object(params)) = obj.get("parameters") {
            for (name, info) in params {
                if INTERNAL_PARAMS.contains(&name.to_lowercase().as_str()) {
                    continue;
                }
                patterns.parameters.insert(name.clone(), parse_parameter(info));
            }
        }

        if let Some(Value::Array(deps)) = obj.get("dependencies") {
            patterns.dependencies = deps
                .iter()
                .filter_map(|d| {
                    Some(Dependency {
                        parameter: d.get("parameter")?.as_str()?.to_string(),
                        depends_on: d.get("depends_on")?.as_str()?.to_string(),
                        relationship: d
                            .get("relationship")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string(),
                    })
                })
                .collect();
        }

        if let Some(Value::Array(suggestions)) = obj.get("suggestions") {
            patterns.suggestions = suggestions
                .iter()
                .filter_map(Value::as_object)
                .map(parse_suggestion)
                .filter(|s| !s.params.is_empty())
                .collect();
        }

        if let Some(Value::Object(cov)) = obj.get("coverage") {
            patterns.coverage = Some(Coverage {
                estimated_total_feeds: cov.get("estimated_total_feeds").and_then(Value::as_u64),
                discovered_so_far: cov.get("discovered_so_far").and_then(Value::as_u64),
                coverage_percent: cov
                    .get("coverage_percent")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0),
            });
        }

        patterns
    }
}

fn parse_parameter(info: &Value) -> LearnedParameter {
    let observed_values = match info.get("observed_values") {
        Some(Value::Array(values)) => values.iter().filter_map(value_to_string).collect(),
        _ => vec![],
    };

    let range = match info.get("range") {
        Some(Value::Array(bounds)) if bounds.len() == 2 => {
            match (bounds[0].as_f64(), bounds[1].as_f64()) {
                (Some(min), Some(max)) => Some(NumericRange {
                    min: min as i64,
                    max: max as i64,
                }),
                _ => None,
            }
        }
        _ => None,
    };

    LearnedParameter {
        kind: info.get("type").and_then(Value::as_str).and_then(ParamKind::parse),
        observed_values,
        range,
        confidence: info.get("confidence").and_then(Value::as_f64),
        interpretation: info
            .get("interpretation")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

fn parse_suggestion(obj: &Map<String, Value>) -> Suggestion {
    let params = obj
        .iter()
        .filter(|(k, _)| !INTERNAL_PARAMS.contains(&k.to_lowercase().as_str()))
        .filter_map(|(k, v)| value_to_string(v).map(|v| (k.clone(), v)))
        .collect();

    Suggestion {
        params,
        confidence: obj.get("confidence").and_then(Value::as_f64),
        reasoning: obj
            .get("reasoning")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// 문자열/숫자/불리언 값을 문자열로 (null과 복합 값은 None)
fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ============================================================================
// PatternLearner
// ============================================================================

/// LLM 패턴 학습기
pub struct PatternLearner {
    llm: Arc<dyn LlmProvider>,
    budget: RetryBudget,
}

impl PatternLearner {
    pub fn new(llm: Arc<dyn LlmProvider>, budget: RetryBudget) -> Self {
        Self { llm, budget }
    }

    /// 피드 URL에서 패턴 학습. 실패하면 None (빈 패턴)
    pub async fn learn(&self, feed_urls: &[String], domain: &str) -> Option<LearnedPatterns> {
        let summaries: Vec<Value> = feed_urls
            .iter()
            .take(MAX_FEEDS_IN_PROMPT)
            .map(|u| feed_summary(u))
            .collect();

        let prompt = format!(
            "You are an expert at discovering hidden RSS/Atom feed patterns on websites.\n\
             Analyze these {count} discovered feeds from domain \"{domain}\":\n{feeds}\n\n\
             1. Identify parameter names, types and observed values\n\
             2. Identify dependencies between parameters\n\
             3. Suggest at least 15 new parameter combinations that might be valid feeds\n\
             4. Estimate coverage\n\n\
             Respond with JSON only:\n\
             {{\"parameters\": {{\"name\": {{\"type\": \"numeric|categorical|boolean\", \
             \"observed_values\": [], \"range\": [min, max], \"confidence\": 0.0, \"interpretation\": \"\"}}}}, \
             \"dependencies\": [{{\"parameter\": \"\", \"depends_on\": \"\", \"relationship\": \"\"}}], \
             \"suggestions\": [{{\"param\": \"value\", \"confidence\": 0.0, \"reasoning\": \"\"}}], \
             \"coverage\": {{\"estimated_total_feeds\": 0, \"discovered_so_far\": 0, \"coverage_percent\": 0}}}}",
            count = summaries.len(),
            domain = domain,
            feeds = serde_json::to_string_pretty(&summaries).unwrap_or_default(),
        );

        tracing::info!("Sending {} feeds to {} for pattern analysis", summaries.len(), self.llm.name());
        let options = GenerationOptions::json(0.3, 8192);

        match complete_json(self.llm.as_ref(), &prompt, &options, &self.budget).await {
            Ok(Some(value)) => match into_object(value) {
                Some(obj) => Some(LearnedPatterns::from_llm(&obj)),
                None => {
                    tracing::warn!("Pattern response was not a JSON object; using empty patterns");
                    None
                }
            },
            Ok(None) => {
                tracing::warn!("Pattern learning budget exhausted; using empty patterns");
                None
            }
            Err(e) => {
                tracing::warn!("Pattern learning failed: {}", e);
                None
            }
        }
    }
}

/// URL + 파라미터별 첫 번째 값
fn feed_summary(url: &str) -> Value {
    let mut params = Map::new();
    if let Ok(parsed) = url::Url::parse(url) {
        for (k, v) in parsed.query_pairs() {
            params
                .entry(k.into_owned())
                .or_insert_with(|| Value::String(v.into_owned()));
        }
    }
    json!({ "url": url, "parameters": params })
}
