//! Learning 모듈 - 반복 결과 분석과 수렴 판정
//!
//! RAG 반복마다 성공률과 생성 효율을 기록하고, 전략별 성과와
//! 파라미터별 효과를 누적해 다음 반복에 대한 인사이트를 만듭니다.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rag::{query_param_names, IterationOutcome, LearnedPatterns, Strategy};

/// 수렴 판정에 쓰는 기본 최근 반복 수
pub const DEFAULT_RECENT_ITERATIONS: usize = 3;

/// 반복 한 번의 기록
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub domain: String,
    pub timestamp: DateTime<Utc>,
    pub candidates_generated: usize,
    /// 검증을 수행한 후보 수
    pub candidates_validated: usize,
    pub new_feeds_found: usize,
    /// new / max(1, validated)
    pub success_rate: f64,
    /// new / max(1, generated)
    pub generation_efficiency: f64,
    pub strategy: Strategy,
}

/// 파라미터 하나의 분석 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterAnalysis {
    pub name: String,
    pub kind: Option<String>,
    pub observed_values: usize,
    pub confidence: f64,
    pub interpretation: String,
}

/// 학습된 패턴 분석
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternAnalysis {
    pub parameters: BTreeMap<String, ParameterAnalysis>,
    pub parameter_count: usize,
    pub dependencies: usize,
    pub coverage_estimate: f64,
    pub key_insights: Vec<String>,
}

/// `analyze_iteration` 반환값
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationAnalysis {
    pub iteration: usize,
    pub metrics: IterationRecord,
    pub analysis: PatternAnalysis,
    pub insights: Vec<String>,
}

/// 수렴 판정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceAssessment {
    pub converging: bool,
    pub reason: String,
    pub confidence: f64,
    pub recommendation: String,
}

impl ConvergenceAssessment {
    fn new(converging: bool, reason: &str, confidence: f64, recommendation: &str) -> Self {
        Self {
            converging,
            reason: reason.to_string(),
            confidence,
            recommendation: recommendation.to_string(),
        }
    }
}

/// 전략별 점수
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyScore {
    pub score: f64,
    pub avg_success: f64,
    pub avg_efficiency: f64,
    pub uses: usize,
}

/// 전략 추천
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyRecommendation {
    pub recommended: Strategy,
    pub reason: Option<String>,
    pub score: f64,
    pub avg_success_rate: f64,
    pub avg_efficiency: f64,
    pub times_used: usize,
    pub all_strategies: BTreeMap<String, StrategyScore>,
    pub confidence: f64,
}

/// 도메인별 인사이트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainInsights {
    pub domain: String,
    pub iterations: usize,
    pub total_found: usize,
    pub avg_success_rate: f64,
    pub insights: Vec<String>,
}

/// 파라미터 효과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterEffectiveness {
    pub name: String,
    pub success: usize,
    pub failures: usize,
    pub total: usize,
    pub success_rate: f64,
    pub effectiveness_score: f64,
}

/// 학습 요약
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningSummary {
    pub total_iterations: usize,
    pub total_feeds_found: usize,
    pub total_urls_tested: usize,
    pub average_success_rate: f64,
}

/// 전체 학습 리포트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningReport {
    pub summary: LearningSummary,
    pub convergence_assessment: ConvergenceAssessment,
    pub strategy_recommendation: StrategyRecommendation,
    pub parameter_effectiveness: Vec<ParameterEffectiveness>,
    pub insights: Vec<String>,
    pub iteration_history: Vec<IterationRecord>,
}

#[derive(Debug, Clone, Copy)]
struct StrategyResult {
    success_rate: f64,
    efficiency: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct ParamCounter {
    success: usize,
    failures: usize,
}

// ============================================================================
// LearningAgent
// ============================================================================

/// 반복 분석기
#[derive(Default)]
pub struct LearningAgent {
    history: Vec<IterationRecord>,
    strategy_performance: BTreeMap<Strategy, Vec<StrategyResult>>,
    params: BTreeMap<String, ParamCounter>,
    insights: Vec<String>,
}

impl LearningAgent {
    pub fn new() -> Self {
        tracing::info!("Learning agent initialized");
        Self::default()
    }

    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    /// 지금까지 쌓인 인사이트 (반복 순)
    pub fn insights(&self) -> &[String] {
        &self.insights
    }

    /// 반복 결과 분석
    ///
    /// 기록을 남기고 전략 성과와 파라미터 효과를 갱신한 뒤 인사이트를 반환합니다.
    pub fn analyze_iteration(
        &mut self,
        outcome: &IterationOutcome,
        domain: &str,
        patterns: &LearnedPatterns,
    ) -> IterationAnalysis {
        tracing::info!("Analyzing iteration {}", outcome.iteration);

        let candidates_validated = outcome.validated.len() + outcome.rejected.len();
        let success_rate = outcome.new_feeds_found as f64 / candidates_validated.max(1) as f64;
        let generation_efficiency =
            outcome.new_feeds_found as f64 / outcome.candidates_generated.max(1) as f64;

        let record = IterationRecord {
            iteration: outcome.iteration,
            domain: domain.to_string(),
            timestamp: Utc::now(),
            candidates_generated: outcome.candidates_generated,
            candidates_validated,
            new_feeds_found: outcome.new_feeds_found,
            success_rate,
            generation_efficiency,
            strategy: outcome.strategy,
        };
        self.history.push(record.clone());

        self.strategy_performance
            .entry(outcome.strategy)
            .or_default()
            .push(StrategyResult {
                success_rate,
                efficiency: generation_efficiency,
            });

        for report in &outcome.validated {
            for name in query_param_names(&report.url) {
                self.params.entry(name).or_default().success += 1;
            }
        }
        for report in &outcome.rejected {
            for name in query_param_names(&report.url) {
                self.params.entry(name).or_default().failures += 1;
            }
        }

        let analysis = analyze_patterns(patterns);
        let insights = generate_insights(&record, &analysis);
        self.insights.extend(insights.iter().cloned());

        tracing::info!(
            "Iteration {} analyzed: success {:.1}%, efficiency {:.1}%",
            outcome.iteration,
            success_rate * 100.0,
            generation_efficiency * 100.0
        );

        IterationAnalysis {
            iteration: outcome.iteration,
            metrics: record,
            analysis,
            insights,
        }
    }

    /// 최근 `recent`회 반복의 새 피드 수로 수렴 판정
    pub fn convergence_assessment(&self, recent: usize) -> ConvergenceAssessment {
        if recent == 0 || self.history.len() < recent {
            return ConvergenceAssessment::new(false, "Not enough iterations", 0.0, "Continue iterations");
        }

        let window = &self.history[self.history.len() - recent..];
        let avg = window.iter().map(|r| r.new_feeds_found).sum::<usize>() as f64 / window.len() as f64;

        if window.iter().all(|r| r.new_feeds_found == 0) {
            ConvergenceAssessment::new(true, "No new feeds found in recent iterations", 0.95, "Stop discovery")
        } else if avg < 1.0 {
            ConvergenceAssessment::new(true, "Diminishing returns detected", 0.80, "1-2 more iterations then stop")
        } else if avg < 3.0 {
            ConvergenceAssessment::new(true, "Gradual reduction in new feeds", 0.60, "Continue 2-3 more iterations")
        } else {
            ConvergenceAssessment::new(false, "Good discovery rate maintained", 0.70, "Continue iterations")
        }
    }

    /// 성공률 60% + 효율 40% 가중 점수가 가장 높은 전략
    pub fn strategy_recommendation(&self) -> StrategyRecommendation {
        let all_strategies: BTreeMap<String, StrategyScore> = self
            .strategy_performance
            .iter()
            .filter(|(_, results)| !results.is_empty())
            .map(|(strategy, results)| {
                let n = results.len() as f64;
                let avg_success = results.iter().map(|r| r.success_rate).sum::<f64>() / n;
                let avg_efficiency = results.iter().map(|r| r.efficiency).sum::<f64>() / n;
                (
                    strategy.to_string(),
                    StrategyScore {
                        score: avg_success * 0.6 + avg_efficiency * 0.4,
                        avg_success,
                        avg_efficiency,
                        uses: results.len(),
                    },
                )
            })
            .collect();

        let best = all_strategies
            .iter()
            .max_by(|a, b| a.1.score.total_cmp(&b.1.score))
            .and_then(|(name, score)| Some((name.parse::<Strategy>().ok()?, score.clone())));

        match best {
            Some((recommended, best)) => StrategyRecommendation {
                recommended,
                reason: None,
                score: best.score,
                avg_success_rate: best.avg_success,
                avg_efficiency: best.avg_efficiency,
                times_used: best.uses,
                confidence: best.score.min(0.95),
                all_strategies,
            },
            None => StrategyRecommendation {
                recommended: Strategy::Hybrid,
                reason: Some("No history available".to_string()),
                score: 0.0,
                avg_success_rate: 0.0,
                avg_efficiency: 0.0,
                times_used: 0,
                all_strategies,
                confidence: 0.5,
            },
        }
    }

    pub fn domain_insights(&self, domain: &str) -> DomainInsights {
        let records: Vec<&IterationRecord> = self.history.iter().filter(|r| r.domain == domain).collect();

        if records.is_empty() {
            return DomainInsights {
                domain: domain.to_string(),
                iterations: 0,
                total_found: 0,
                avg_success_rate: 0.0,
                insights: vec![],
            };
        }

        let total_generated: usize = records.iter().map(|r| r.candidates_generated).sum();
        let total_validated: usize = records.iter().map(|r| r.candidates_validated).sum();
        let total_found: usize = records.iter().map(|r| r.new_feeds_found).sum();
        let avg_success = records.iter().map(|r| r.success_rate).sum::<f64>() / records.len() as f64;

        let mut insights = vec![
            format!("Iterations: {}", records.len()),
            format!("Total feeds found: {}", total_found),
            format!("Total candidates tested: {}", total_validated),
            format!("Average success rate: {:.1}%", avg_success * 100.0),
            format!(
                "Generation efficiency: {:.1}%",
                total_found as f64 / total_generated.max(1) as f64 * 100.0
            ),
        ];

        // 동률이면 먼저 나온 반복
        let mut best = records[0];
        for record in &records[1..] {
            if record.new_feeds_found > best.new_feeds_found {
                best = record;
            }
        }
        insights.push(format!(
            "Best iteration: #{} with {} new feeds",
            best.iteration, best.new_feeds_found
        ));

        DomainInsights {
            domain: domain.to_string(),
            iterations: records.len(),
            total_found,
            avg_success_rate: avg_success,
            insights,
        }
    }

    /// 파라미터별 효과 (성공률 내림차순, 같으면 이름순)
    pub fn parameter_effectiveness(&self) -> Vec<ParameterEffectiveness> {
        let mut list: Vec<ParameterEffectiveness> = self
            .params
            .iter()
            .map(|(name, c)| {
                let total = c.success + c.failures;
                let success_rate = if total == 0 { 0.0 } else { c.success as f64 / total as f64 };
                ParameterEffectiveness {
                    name: name.clone(),
                    success: c.success,
                    failures: c.failures,
                    total,
                    success_rate,
                    effectiveness_score: success_rate * 100.0,
                }
            })
            .collect();

        list.sort_by(|a, b| b.effectiveness_score.total_cmp(&a.effectiveness_score));
        list
    }

    pub fn learning_report(&self) -> LearningReport {
        let total_feeds_found: usize = self.history.iter().map(|r| r.new_feeds_found).sum();
        let total_urls_tested: usize = self.history.iter().map(|r| r.candidates_validated).sum();
        let average_success_rate = if total_urls_tested > 0 {
            total_feeds_found as f64 / total_urls_tested as f64
        } else {
            0.0
        };

        LearningReport {
            summary: LearningSummary {
                total_iterations: self.history.len(),
                total_feeds_found,
                total_urls_tested,
                average_success_rate,
            },
            convergence_assessment: self.convergence_assessment(DEFAULT_RECENT_ITERATIONS),
            strategy_recommendation: self.strategy_recommendation(),
            parameter_effectiveness: self.parameter_effectiveness(),
            insights: self.insights.clone(),
            iteration_history: self.history.clone(),
        }
    }
}

fn analyze_patterns(patterns: &LearnedPatterns) -> PatternAnalysis {
    let parameters: BTreeMap<String, ParameterAnalysis> = patterns
        .parameters
        .iter()
        .map(|(name, p)| {
            (
                name.clone(),
                ParameterAnalysis {
                    name: name.clone(),
                    kind: p.kind.map(|k| format!("{:?}", k).to_lowercase()),
                    observed_values: p.observed_values.len(),
                    confidence: p.confidence.unwrap_or(0.0),
                    interpretation: p.interpretation.clone().unwrap_or_default(),
                },
            )
        })
        .collect();

    PatternAnalysis {
        parameter_count: parameters.len(),
        parameters,
        dependencies: patterns.dependencies.len(),
        coverage_estimate: patterns
            .coverage
            .as_ref()
            .map(|c| c.coverage_percent)
            .unwrap_or(0.0),
        key_insights: patterns
            .dependencies
            .iter()
            .map(|d| format!("{} depends on {}", d.parameter, d.depends_on))
            .collect(),
    }
}

fn generate_insights(record: &IterationRecord, analysis: &PatternAnalysis) -> Vec<String> {
    let n = record.iteration;
    let rate = record.success_rate;
    let mut insights = Vec::new();

    insights.push(if rate > 0.2 {
        format!("Iteration {}: High success rate ({:.1}%)", n, rate * 100.0)
    } else if rate > 0.1 {
        format!("Iteration {}: Moderate success rate ({:.1}%)", n, rate * 100.0)
    } else if rate == 0.0 {
        format!("Iteration {}: No new feeds (possible convergence)", n)
    } else {
        format!("Iteration {}: Low success rate ({:.1}%)", n, rate * 100.0)
    });

    let remark = match record.strategy {
        Strategy::Hybrid => "provides balanced exploration",
        Strategy::Suggested => "focuses on high-confidence candidates",
        Strategy::Systematic => "explores comprehensively",
    };
    insights.push(format!("Strategy '{}' {}", record.strategy, remark));

    let coverage = analysis.coverage_estimate;
    insights.push(if coverage > 80.0 {
        format!("Coverage high ({}%) - near saturation", coverage)
    } else if coverage > 50.0 {
        format!("Coverage moderate ({}%) - keep exploring", coverage)
    } else {
        format!("Coverage low ({}%) - significant potential remains", coverage)
    });

    let count = analysis.parameter_count;
    if count > 5 {
        insights.push(format!("High parameter complexity ({} params) - focus on dependencies", count));
    } else if count <= 2 {
        insights.push(format!("Low parameter complexity ({} params) - exhaustive search recommended", count));
    }

    if analysis.dependencies > 0 {
        insights.push(format!(
            "Identified {} parameter dependencies - refine generation strategy",
            analysis.dependencies
        ));
    }

    insights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::{Coverage, Dependency, LearnedParameter};
    use crate::validator::ValidationReport;

    fn outcome(iteration: usize, strategy: Strategy, generated: usize, valid: &[&str], rejected: &[&str]) -> IterationOutcome {
        IterationOutcome {
            iteration,
            strategy,
            candidates_generated: generated,
            validated_count: valid.len(),
            rejected_count: rejected.len(),
            new_feeds_found: valid.len(),
            total_feeds: valid.len(),
            validated: valid.iter().map(|u| ValidationReport::new(u)).collect(),
            rejected: rejected.iter().map(|u| ValidationReport::new(u)).collect(),
        }
    }

    fn patterns(params: usize, coverage: f64) -> LearnedPatterns {
        let mut p = LearnedPatterns::default();
        for i in 0..params {
            p.parameters.insert(format!("p{}", i), LearnedParameter::default());
        }
        p.coverage = Some(Coverage {
            coverage_percent: coverage,
            ..Default::default()
        });
        p
    }

    #[test]
    fn test_analyze_iteration_metrics_and_insights() {
        let mut agent = LearningAgent::new();
        let mut p = patterns(1, 85.0);
        p.dependencies.push(Dependency {
            parameter: "Regid".into(),
            depends_on: "Lang".into(),
            relationship: "".into(),
        });

        let result = agent.analyze_iteration(
            &outcome(
                1,
                Strategy::Hybrid,
                10,
                &["https://a/f?ModId=1", "https://a/f?ModId=2"],
                &["https://a/f?ModId=3&Lang=1", "https://a/f?Lang=2", "https://a/f?ModId=4"],
            ),
            "a",
            &p,
        );

        assert_eq!(result.metrics.candidates_validated, 5);
        assert!((result.metrics.success_rate - 0.4).abs() < 1e-9);
        assert!((result.metrics.generation_efficiency - 0.2).abs() < 1e-9);
        assert_eq!(
            result.insights,
            vec![
                "Iteration 1: High success rate (40.0%)",
                "Strategy 'hybrid' provides balanced exploration",
                "Coverage high (85%) - near saturation",
                "Low parameter complexity (1 params) - exhaustive search recommended",
                "Identified 1 parameter dependencies - refine generation strategy",
            ]
        );
        assert_eq!(result.analysis.key_insights, vec!["Regid depends on Lang"]);
        assert_eq!(agent.insights().len(), 5);
    }

    #[test]
    fn test_success_rate_bands() {
        let mut agent = LearningAgent::new();
        let rejected: Vec<String> = (0..9).map(|i| format!("https://a/f?x={}", i)).collect();
        let rejected: Vec<&str> = rejected.iter().map(String::as_str).collect();

        // 1 / 10 = 10% → low (경계값은 moderate가 아님)
        let r = agent.analyze_iteration(
            &outcome(1, Strategy::Systematic, 10, &["https://a/f?x=v"], &rejected),
            "a",
            &patterns(6, 60.0),
        );
        assert_eq!(r.insights[0], "Iteration 1: Low success rate (10.0%)");
        assert_eq!(r.insights[1], "Strategy 'systematic' explores comprehensively");
        assert_eq!(r.insights[2], "Coverage moderate (60%) - keep exploring");
        assert_eq!(r.insights[3], "High parameter complexity (6 params) - focus on dependencies");

        let r = agent.analyze_iteration(&outcome(2, Strategy::Suggested, 0, &[], &[]), "a", &patterns(3, 0.0));
        assert_eq!(r.insights[0], "Iteration 2: No new feeds (possible convergence)");
        assert_eq!(r.insights[1], "Strategy 'suggested' focuses on high-confidence candidates");
        assert_eq!(r.insights[2], "Coverage low (0%) - significant potential remains");
        assert_eq!(r.insights.len(), 3);
    }

    #[test]
    fn test_convergence_assessment() {
        let mut agent = LearningAgent::new();
        let p = LearnedPatterns::default();

        let c = agent.convergence_assessment(3);
        assert!(!c.converging);
        assert_eq!(c.reason, "Not enough iterations");
        assert_eq!(c.confidence, 0.0);

        for i in 1..=3 {
            agent.analyze_iteration(&outcome(i, Strategy::Hybrid, 5, &[], &["https://a/f?x=1"]), "a", &p);
        }
        let c = agent.convergence_assessment(3);
        assert!(c.converging);
        assert_eq!(c.confidence, 0.95);
        assert_eq!(c.recommendation, "Stop discovery");

        agent.analyze_iteration(&outcome(4, Strategy::Hybrid, 5, &["https://a/f?x=2"], &[]), "a", &p);
        assert_eq!(agent.convergence_assessment(3).confidence, 0.80);

        agent.analyze_iteration(
            &outcome(5, Strategy::Hybrid, 5, &["https://a/f?x=3", "https://a/f?x=4", "https://a/f?x=5"], &[]),
            "a",
            &p,
        );
        // (0 + 1 + 3) / 3 < 3
        assert_eq!(agent.convergence_assessment(3).confidence, 0.60);

        let many: Vec<String> = (0..5).map(|i| format!("https://a/f?y={}", i)).collect();
        let many: Vec<&str> = many.iter().map(String::as_str).collect();
        agent.analyze_iteration(&outcome(6, Strategy::Hybrid, 5, &many, &[]), "a", &p);
        // (1 + 3 + 5) / 3 = 3
        let c = agent.convergence_assessment(3);
        assert!(!c.converging);
        assert_eq!(c.reason, "Good discovery rate maintained");
    }

    #[test]
    fn test_strategy_recommendation() {
        let mut agent = LearningAgent::new();
        let rec = agent.strategy_recommendation();
        assert_eq!(rec.recommended, Strategy::Hybrid);
        assert_eq!(rec.confidence, 0.5);
        assert_eq!(rec.reason.as_deref(), Some("No history available"));

        let p = LearnedPatterns::default();
        agent.analyze_iteration(&outcome(1, Strategy::Hybrid, 10, &[], &["https://a/f?x=1"]), "a", &p);
        agent.analyze_iteration(
            &outcome(2, Strategy::Suggested, 2, &["https://a/f?x=2"], &["https://a/f?x=3"]),
            "a",
            &p,
        );

        let rec = agent.strategy_recommendation();
        assert_eq!(rec.recommended, Strategy::Suggested);
        // 0.6 * 0.5 + 0.4 * 0.5
        assert!((rec.score - 0.5).abs() < 1e-9);
        assert!((rec.confidence - 0.5).abs() < 1e-9);
        assert_eq!(rec.all_strategies.len(), 2);
        assert_eq!(rec.times_used, 1);
    }

    #[test]
    fn test_parameter_effectiveness_sorted() {
        let mut agent = LearningAgent::new();
        agent.analyze_iteration(
            &outcome(
                1,
                Strategy::Hybrid,
                4,
                &["https://a/f?ModId=1&Lang=1", "https://a/f?ModId=2"],
                &["https://a/f?Lang=2&Regid=3"],
            ),
            "a",
            &LearnedPatterns::default(),
        );

        let eff = agent.parameter_effectiveness();
        let names: Vec<&str> = eff.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["ModId", "Lang", "Regid"]);
        assert_eq!(eff[0].success, 2);
        assert_eq!(eff[1].total, 2);
        assert_eq!(eff[1].effectiveness_score, 50.0);
        assert_eq!(eff[2].failures, 1);
    }

    #[test]
    fn test_domain_insights_and_report() {
        let mut agent = LearningAgent::new();
        let p = LearnedPatterns::default();
        agent.analyze_iteration(&outcome(1, Strategy::Hybrid, 4, &["https://a/f?x=1"], &["https://a/f?x=2"]), "pib.gov.in", &p);
        agent.analyze_iteration(
            &outcome(2, Strategy::Hybrid, 4, &["https://a/f?x=3", "https://a/f?x=4"], &["https://a/f?x=5", "https://a/f?x=6"]),
            "pib.gov.in",
            &p,
        );

        let d = agent.domain_insights("pib.gov.in");
        assert_eq!(d.iterations, 2);
        assert_eq!(d.total_found, 3);
        assert!(d.insights.contains(&"Best iteration: #2 with 2 new feeds".to_string()));
        assert!(d.insights.contains(&"Generation efficiency: 37.5%".to_string()));

        assert_eq!(agent.domain_insights("other").iterations, 0);

        let report = agent.learning_report();
        assert_eq!(report.summary.total_iterations, 2);
        assert_eq!(report.summary.total_feeds_found, 3);
        assert_eq!(report.summary.total_urls_tested, 6);
        assert!((report.summary.average_success_rate - 0.5).abs() < 1e-9);
        assert_eq!(report.iteration_history.len(), 2);
        assert!(!report.convergence_assessment.converging);
    }
}
