//! 후보 URL 생성기

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::analyzer::INTERNAL_PARAMS;
use super::patterns::LearnedPatterns;

/// 체계적 생성 시 파라미터당 사용할 값 수
const SYSTEMATIC_VALUES_PER_PARAM: usize = 5;
/// 체계적 생성 최대 URL 수
const SYSTEMATIC_LIMIT: usize = 25;

/// 생성 전략
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// LLM 제안 조합
    Suggested,
    /// 관측값의 데카르트 곱
    Systematic,
    /// 제안 → 체계적
    #[default]
    Hybrid,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Suggested => "suggested",
            Strategy::Systematic => "systematic",
            Strategy::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "suggested" => Ok(Strategy::Suggested),
            "systematic" => Ok(Strategy::Systematic),
            "hybrid" => Ok(Strategy::Hybrid),
            other => anyhow::bail!("Unknown strategy: {} (suggested|systematic|hybrid)", other),
        }
    }
}

/// 학습된 패턴으로 후보 URL 생성
pub struct UrlGenerator<'a> {
    base_url: &'a str,
    patterns: &'a LearnedPatterns,
}

impl<'a> UrlGenerator<'a> {
    pub fn new(base_url: &'a str, patterns: &'a LearnedPatterns) -> Self {
        Self { base_url, patterns }
    }

    /// 전략에 따라 최대 `max`개의 중복 없는 URL 생성
    pub fn generate(&self, strategy: Strategy, max: usize) -> Vec<String> {
        if self.patterns.is_empty() {
            tracing::warn!("No patterns available for URL generation");
            return vec![];
        }

        let raw = match strategy {
            Strategy::Suggested => self.from_suggestions(),
            Strategy::Systematic => self.systematic(),
            Strategy::Hybrid => {
                let mut urls = self.from_suggestions();
                urls.extend(self.systematic());
                urls
            }
        };

        let mut seen = HashSet::new();
        let candidates: Vec<String> = raw
            .into_iter()
            .map(|u| strip_internal_params(&u))
            .filter(|u| seen.insert(u.clone()))
            .take(max)
            .collect();

        tracing::info!("Generated {} candidate URLs using {}", candidates.len(), strategy);
        candidates
    }

    fn from_suggestions(&self) -> Vec<String> {
        self.patterns
            .suggestions
            .iter()
            .map(|s| {
                let params: Vec<(&str, &str)> = s
                    .params
                    .iter()
                    .filter(|(k, _)| !is_internal(k))
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                self.build_url(&params)
            })
            .collect()
    }

    fn systematic(&self) -> Vec<String> {
        let parameters = &self.patterns.parameters;
        if parameters.is_empty() {
            return vec![];
        }

        let names: Vec<&str> = parameters.keys().map(String::as_str).collect();
        let value_lists: Vec<Vec<&str>> = parameters
            .values()
            .map(|p| {
                p.observed_values
                    .iter()
                    .take(SYSTEMATIC_VALUES_PER_PARAM)
                    .map(String::as_str)
                    .collect()
            })
            .collect();

        if value_lists.iter().any(|v| v.is_empty()) {
            return vec![];
        }

        value_lists
            .into_iter()
            .multi_cartesian_product()
            .take(SYSTEMATIC_LIMIT)
            .map(|combo| {
                let params: Vec<(&str, &str)> = names.iter().copied().zip(combo).collect();
                self.build_url(&params)
            })
            .collect()
    }

    /// 쿼리를 뺀 기준 URL + urlencode(params). None/빈 값은 제외
    fn build_url(&self, params: &[(&str, &str)]) -> String {
        let base = self.base_url.split('?').next().unwrap_or(self.base_url);
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in params {
            if v.is_empty() || *v == "None" {
                continue;
            }
            serializer.append_pair(k, v);
        }
        format!("{}?{}", base, serializer.finish())
    }
}

fn is_internal(name: &str) -> bool {
    INTERNAL_PARAMS.contains(&name.to_lowercase().as_str())
}

/// URL에서 내부 메타데이터 파라미터 제거
pub fn strip_internal_params(raw: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(raw) else {
        return raw.to_string();
    };

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_internal(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }
    parsed.to_string()
}

/// 중복 판정용 URL 키: 스킴, 호스트, 경로 + 정렬된 쿼리 쌍 (순서 무관)
///
/// 파싱할 수 없는 URL은 앞뒤 공백만 제거해 그대로 씁니다.
pub fn url_key(raw: &str) -> String {
    let Ok(parsed) = url::Url::parse(raw.trim()) else {
        return raw.trim().to_string();
    };

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    let mut key = format!("{}://{}", parsed.scheme(), parsed.host_str().unwrap_or(""));
    if let Some(port) = parsed.port() {
        key.push_str(&format!(":{}", port));
    }
    key.push_str(parsed.path());
    if !pairs.is_empty() {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        serializer.extend_pairs(pairs);
        key.push('?');
        key.push_str(&serializer.finish());
    }
    key
}

/// URL의 쿼리 파라미터 이름 목록
pub fn query_param_names(raw: &str) -> Vec<String> {
    url::Url::parse(raw)
        .map(|u| {
            u.query_pairs()
                .map(|(k, _)| k.into_owned())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use crate::rag::patterns::{LearnedParameter, Suggestion};

    fn patterns() -> LearnedPatterns {
        let mut p = LearnedPatterns::default();
        p.parameters.insert(
            "Lang".to_string(),
            LearnedParameter {
                observed_values: vec!["1".into(), "2".into()],
                ..Default::default()
            },
        );
        p.parameters.insert(
            "ModId".to_string(),
            LearnedParameter {
                observed_values: (1..=8).map(|i| i.to_string()).collect(),
                ..Default::default()
            },
        );
        p.suggestions.push(Suggestion {
            params: BTreeMap::from([
                ("ModId".to_string(), "40".to_string()),
                ("Regid".to_string(), "None".to_string()),
                ("reasoning".to_string(), "x".to_string()),
            ]),
            confidence: Some(0.9),
            reasoning: None,
        });
        p
    }

    const BASE: &str = "https://pib.gov.in/RssMain.aspx?ModId=6";

    #[test]
    fn test_suggested() {
        let p = patterns();
        let urls = UrlGenerator::new(BASE, &p).generate(Strategy::Suggested, 50);
        assert_eq!(urls, vec!["https://pib.gov.in/RssMain.aspx?ModId=40"]);
    }

    #[test]
    fn test_systematic_uses_first_five_values() {
        let p = patterns();
        let urls = UrlGenerator::new(BASE, &p).generate(Strategy::Systematic, 50);
        // 2 x 5
        assert_eq!(urls.len(), 10);
        assert_eq!(urls[0], "https://pib.gov.in/RssMain.aspx?Lang=1&ModId=1");
        assert!(urls.iter().all(|u| !u.contains("ModId=6")));
    }

    #[test]
    fn test_hybrid_dedupes_and_truncates() {
        let mut p = patterns();
        p.suggestions.push(Suggestion {
            params: BTreeMap::from([
                ("Lang".to_string(), "1".to_string()),
                ("ModId".to_string(), "1".to_string()),
            ]),
            confidence: None,
            reasoning: None,
        });

        let urls = UrlGenerator::new(BASE, &p).generate(Strategy::Hybrid, 50);
        assert_eq!(urls.len(), 11);
        assert_eq!(urls[1], "https://pib.gov.in/RssMain.aspx?Lang=1&ModId=1");

        let urls = UrlGenerator::new(BASE, &p).generate(Strategy::Hybrid, 3);
        assert_eq!(urls.len(), 3);
    }

    #[test]
    fn test_empty_patterns() {
        let p = LearnedPatterns::default();
        assert!(UrlGenerator::new(BASE, &p).generate(Strategy::Hybrid, 50).is_empty());
    }

    #[test]
    fn test_systematic_cap() {
        let mut p = LearnedPatterns::default();
        for name in ["a", "b", "c"] {
            p.parameters.insert(
                name.to_string(),
                LearnedParameter {
                    observed_values: (0..5).map(|i| i.to_string()).collect(),
                    ..Default::default()
                },
            );
        }
        let urls = UrlGenerator::new(BASE, &p).generate(Strategy::Systematic, 100);
        assert_eq!(urls.len(), 25);
    }

    #[test]
    fn test_strip_internal_params() {
        assert_eq!(
            strip_internal_params("https://x.gov.in/f?a=1&confidence=0.9&Reasoning=why"),
            "https://x.gov.in/f?a=1"
        );
        assert_eq!(strip_internal_params("https://x.gov.in/f?confidence=1"), "https://x.gov.in/f");
        assert_eq!(strip_internal_params("not a url"), "not a url");
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("Hybrid".parse::<Strategy>().unwrap(), Strategy::Hybrid);
        assert!("random".parse::<Strategy>().is_err());
        assert_eq!(Strategy::Systematic.to_string(), "systematic");
    }

    #[test]
    fn test_query_param_names() {
        assert_eq!(query_param_names("https://a/b?z=1&a=2&z=3"), vec!["a", "z"]);
        assert!(query_param_names("nope").is_empty());
    }

    #[test]
    fn test_url_key_ignores_query_order() {
        let key = url_key("https://pib.gov.in/RssMain.aspx?ModId=6&Lang=1");
        assert_eq!(key, "https://pib.gov.in/RssMain.aspx?Lang=1&ModId=6");
        assert_eq!(key, url_key("https://PIB.gov.in/RssMain.aspx?Lang=1&ModId=6#top"));
        assert_ne!(key, url_key("https://pib.gov.in/RssMain.aspx?Lang=1&ModId=7"));
        assert_eq!(url_key("https://pib.gov.in/feed.xml"), "https://pib.gov.in/feed.xml");
        assert_eq!(url_key(" not a url "), "not a url");
    }
}
