//! URL 구조 분석기 (로컬, LLM 없음)
//!
//! 알려진 피드 URL들의 도메인, 경로, 쿼리 파라미터와 값의 분포를 요약합니다.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

/// 분석에서 제외하는 내부 파라미터
pub const INTERNAL_PARAMS: &[&str] = &["confidence", "reasoning"];

/// 파라미터당 보관하는 관측값 수
const MAX_OBSERVED_VALUES: usize = 50;

/// 파라미터 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Boolean,
    Numeric,
    Categorical,
    String,
}

impl ParamKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "boolean" | "bool" => Some(ParamKind::Boolean),
            "numeric" | "number" | "integer" => Some(ParamKind::Numeric),
            "categorical" | "category" | "enum" => Some(ParamKind::Categorical),
            "string" | "text" => Some(ParamKind::String),
            _ => None,
        }
    }
}

/// 숫자 파라미터 범위
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    pub min: i64,
    pub max: i64,
}

/// 파라미터 하나의 요약
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSummary {
    /// 관측값 (처음 본 순서, 최대 50개)
    pub observed_values: Vec<String>,
    /// 서로 다른 값의 수
    pub value_count: usize,
    pub kind: ParamKind,
    pub numeric_range: Option<NumericRange>,
}

/// URL 구조 요약
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UrlStructure {
    pub domain: String,
    pub path: String,
    pub path_patterns: Vec<String>,
    pub parameters: BTreeMap<String, ParameterSummary>,
}

/// URL 구조 분석기
pub struct UrlStructureAnalyzer;

impl UrlStructureAnalyzer {
    /// 피드 URL 목록 분석
    ///
    /// 도메인과 경로는 처음 해석된 URL에서 가져옵니다.
    pub fn analyze(urls: &[String]) -> UrlStructure {
        let mut structure = UrlStructure::default();
        let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut seen_paths: HashSet<String> = HashSet::new();

        for raw in urls {
            let Ok(parsed) = url::Url::parse(raw) else {
                tracing::debug!("Skipping unparsable URL: {}", raw);
                continue;
            };

            if structure.domain.is_empty() {
                structure.domain = parsed.host_str().unwrap_or("").to_string();
                structure.path = parsed.path().to_string();
            }

            for (name, value) in parsed.query_pairs() {
                if INTERNAL_PARAMS.contains(&name.to_lowercase().as_str()) || value.is_empty() {
                    continue;
                }
                let entry = values.entry(name.into_owned()).or_default();
                if !entry.iter().any(|v| v == value.as_ref()) {
                    entry.push(value.into_owned());
                }
            }

            let path = parsed.path();
            if !path.is_empty() && path != "/" && seen_paths.insert(path.to_string()) {
                structure.path_patterns.push(path.to_string());
            }
        }

        for (name, vals) in values {
            let kind = classify(&vals);
            let numeric_range = if is_numeric(&vals) {
                let nums: Vec<i64> = vals.iter().filter_map(|v| digits_value(v)).collect();
                match (nums.iter().min(), nums.iter().max()) {
                    (Some(&min), Some(&max)) => Some(NumericRange { min, max }),
                    _ => None,
                }
            } else {
                None
            };

            structure.parameters.insert(
                name,
                ParameterSummary {
                    value_count: vals.len(),
                    observed_values: vals.into_iter().take(MAX_OBSERVED_VALUES).collect(),
                    kind,
                    numeric_range,
                },
            );
        }

        tracing::info!(
            "Extracted {} unique parameters from {} URLs",
            structure.parameters.len(),
            urls.len()
        );
        structure
    }
}

/// 종류 판정: boolean → numeric(80% 초과 숫자) → categorical(10개 이하) → string
fn classify(values: &[String]) -> ParamKind {
    if is_boolean(values) {
        ParamKind::Boolean
    } else if is_numeric(values) {
        ParamKind::Numeric
    } else if values.len() <= 10 {
        ParamKind::Categorical
    } else {
        ParamKind::String
    }
}

fn is_boolean(values: &[String]) -> bool {
    const BOOL_VALUES: &[&str] = &["true", "false", "0", "1", "yes", "no"];
    values
        .iter()
        .all(|v| BOOL_VALUES.contains(&v.to_lowercase().as_str()))
}

fn is_numeric(values: &[String]) -> bool {
    if values.is_empty() {
        return false;
    }
    let numeric = values.iter().filter(|v| digits_value(v).is_some()).count();
    numeric as f64 / values.len() as f64 > 0.8
}

/// 숫자로만 이루어진 값
fn digits_value(v: &str) -> Option<i64> {
    if !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()) {
        v.parse().ok()
    } else {
        None
    }
}
