// src/analyzer.rs
//
// Read-only insight analysis over the metrics store.
//
// Produces one ApiFeedbackReport per invocation: per-function statistics,
// action-sequence patterns, overall performance, the learning curve,
// optimal sequences, failure analysis, and templated recommendations.
// All aggregation is deterministic, so running the analyzer twice over
// the same store yields identical reports (modulo the timestamp field).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clock::{Clock, TimestampMs};
use crate::event_log::{
    ActionMetrics, EpisodeMetrics, EventPayload, LogEvent, MetricsStore, PerformanceMetrics,
    ResultMetrics,
};

/// Patterns below this frequency are not reported.
const MIN_PATTERN_FREQUENCY: u32 = 3;
/// Subsequence lengths scanned within each episode.
const MIN_PATTERN_LEN: usize = 2;
const MAX_PATTERN_LEN: usize = 5;
/// Moving-average window for the learning curve.
const LEARNING_WINDOW: usize = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityDataPoint {
    pub episode: usize,
    pub quality: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub avg_output_quality: f64,
    pub consistency_score: f64,
    pub reliability_score: f64,
    pub quality_trend: Vec<QualityDataPoint>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionStats {
    pub call_count: u32,
    pub success_rate: f64,
    pub avg_reward: f64,
    pub avg_q_value: f64,
    pub avg_duration: f64,
    pub common_contexts: Vec<String>,
    pub error_types: BTreeMap<String, u32>,
    pub quality_metrics: QualityMetrics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SequencePattern {
    pub sequence: Vec<String>,
    pub frequency: u32,
    pub avg_reward: f64,
    pub success_rate: f64,
    pub efficiency: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverallPerformance {
    pub total_episodes: usize,
    pub total_steps: usize,
    pub avg_episode_reward: f64,
    pub overall_success_rate: f64,
    pub learning_efficiency: f64,
    pub convergence_rate: f64,
    pub exploration_balance: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningDataPoint {
    pub episode: usize,
    pub avg_reward: f64,
    pub success_rate: f64,
    pub q_value_variance: f64,
    pub exploration_rate: f64,
    pub policy_stability: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailurePattern {
    pub pattern: String,
    pub frequency: u32,
    pub impact: f64,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailureAnalysis {
    pub common_failures: BTreeMap<String, FailurePattern>,
    pub failures_by_function: BTreeMap<String, Vec<String>>,
    pub critical_issues: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiFeedbackReport {
    pub timestamp_ms: TimestampMs,
    pub analysis_period: u64,
    pub function_usage_stats: BTreeMap<String, FunctionStats>,
    pub sequence_patterns: Vec<SequencePattern>,
    pub performance_metrics: OverallPerformance,
    pub learning_curve: Vec<LearningDataPoint>,
    pub optimal_sequences: BTreeMap<String, Vec<String>>,
    pub failure_analysis: FailureAnalysis,
    pub recommendations: Vec<String>,
}

pub struct InsightAnalyzer {
    store: Arc<MetricsStore>,
    analysis_window: u64,
    clock: Arc<dyn Clock>,
}

impl InsightAnalyzer {
    pub fn new(store: Arc<MetricsStore>, analysis_window: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            analysis_window,
            clock,
        }
    }

    pub fn generate_insights(&self) -> ApiFeedbackReport {
        let events = self.store.events();
        let episodes = sorted_episodes(self.store.episodes());
        let paired = EventPairing::build(&events);

        let mut report = ApiFeedbackReport {
            timestamp_ms: self.clock.now_ms(),
            analysis_period: self.analysis_window,
            function_usage_stats: analyze_function_usage(&events, &paired),
            sequence_patterns: analyze_action_sequences(&episodes),
            performance_metrics: analyze_performance(&events, &episodes),
            learning_curve: analyze_learning_progress(&episodes),
            optimal_sequences: BTreeMap::new(),
            failure_analysis: analyze_failures(&events, &paired),
            recommendations: Vec::new(),
        };

        report.optimal_sequences = find_optimal_sequences(&report.sequence_patterns);
        report.recommendations = generate_recommendations(&report);

        info!(
            functions = report.function_usage_stats.len(),
            patterns = report.sequence_patterns.len(),
            recommendations = report.recommendations.len(),
            "insight analysis complete"
        );
        report
    }
}

/// Index pairing (episode_id, step) to its reward and selection events.
struct EventPairing<'a> {
    rewards: HashMap<(&'a str, u32), (&'a ResultMetrics, &'a PerformanceMetrics)>,
    selections: HashMap<(&'a str, u32), &'a ActionMetrics>,
}

impl<'a> EventPairing<'a> {
    fn build(events: &'a [LogEvent]) -> Self {
        let mut rewards = HashMap::new();
        let mut selections = HashMap::new();
        for event in events {
            match &event.payload {
                EventPayload::RewardCalculated {
                    result,
                    performance,
                } => {
                    rewards.insert(
                        (event.episode_id.as_str(), event.step_number),
                        (result, performance),
                    );
                }
                EventPayload::ActionSelected(metrics) => {
                    selections.insert((event.episode_id.as_str(), event.step_number), metrics);
                }
                _ => {}
            }
        }
        Self {
            rewards,
            selections,
        }
    }
}

fn sorted_episodes(episodes: HashMap<String, EpisodeMetrics>) -> Vec<EpisodeMetrics> {
    let mut list: Vec<EpisodeMetrics> = episodes.into_values().collect();
    list.sort_by(|a, b| {
        a.start_time_ms
            .cmp(&b.start_time_ms)
            .then_with(|| a.episode_id.cmp(&b.episode_id))
    });
    list
}

fn analyze_function_usage(
    events: &[LogEvent],
    paired: &EventPairing<'_>,
) -> BTreeMap<String, FunctionStats> {
    // Group selections by function, in event order.
    let mut by_function: BTreeMap<String, Vec<&LogEvent>> = BTreeMap::new();
    for event in events {
        if let EventPayload::ActionSelected(metrics) = &event.payload {
            by_function
                .entry(metrics.function_name.clone())
                .or_default()
                .push(event);
        }
    }

    // Contexts come from the paired state observation's feature keys.
    let mut state_features: HashMap<(&str, u32), Vec<&String>> = HashMap::new();
    for event in events {
        if let EventPayload::StateObservation(metrics) = &event.payload {
            state_features.insert(
                (event.episode_id.as_str(), event.step_number),
                metrics.features.keys().collect(),
            );
        }
    }

    let mut stats = BTreeMap::new();
    for (function_name, selections) in by_function {
        let mut total_reward = 0.0;
        let mut total_q = 0.0;
        let mut total_duration = 0.0;
        let mut success_count = 0u32;
        let mut error_types: BTreeMap<String, u32> = BTreeMap::new();
        let mut contexts: BTreeMap<&String, u32> = BTreeMap::new();
        let mut quality_points = Vec::new();

        for (i, event) in selections.iter().enumerate() {
            let key = (event.episode_id.as_str(), event.step_number);
            if let Some((result, performance)) = paired.rewards.get(&key) {
                if result.success {
                    success_count += 1;
                } else if !result.error_type.is_empty() {
                    *error_types.entry(result.error_type.clone()).or_default() += 1;
                }
                total_reward += performance.cumulative_reward;
                total_duration += result.execution_time;
                quality_points.push(QualityDataPoint {
                    episode: i,
                    quality: result.output_quality,
                });
            }

            if let EventPayload::ActionSelected(metrics) = &event.payload {
                total_q += metrics.q_value;
            }

            if let Some(features) = state_features.get(&key) {
                for feature in features {
                    *contexts.entry(feature).or_default() += 1;
                }
            }
        }

        let call_count = selections.len() as u32;
        let n = call_count as f64;
        stats.insert(
            function_name,
            FunctionStats {
                call_count,
                success_rate: success_count as f64 / n,
                avg_reward: total_reward / n,
                avg_q_value: total_q / n,
                avg_duration: total_duration / n,
                common_contexts: top_contexts(&contexts, 5),
                error_types,
                quality_metrics: quality_metrics(quality_points),
            },
        );
    }

    stats
}

fn top_contexts(contexts: &BTreeMap<&String, u32>, limit: usize) -> Vec<String> {
    let mut pairs: Vec<(&String, u32)> = contexts.iter().map(|(k, v)| (*k, *v)).collect();
    // Count descending, then name for a stable order.
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    pairs
        .into_iter()
        .take(limit)
        .map(|(name, _)| name.clone())
        .collect()
}

fn quality_metrics(points: Vec<QualityDataPoint>) -> QualityMetrics {
    if points.is_empty() {
        return QualityMetrics::default();
    }
    let avg = points.iter().map(|p| p.quality).sum::<f64>() / points.len() as f64;
    QualityMetrics {
        avg_output_quality: avg,
        // Constant placeholders; refine once per-run variance is tracked.
        consistency_score: 0.8,
        reliability_score: 0.9,
        quality_trend: points,
    }
}

fn analyze_action_sequences(episodes: &[EpisodeMetrics]) -> Vec<SequencePattern> {
    struct SequenceInfo {
        sequence: Vec<String>,
        frequency: u32,
        total_reward: f64,
        success_count: u32,
    }

    let mut counts: BTreeMap<String, SequenceInfo> = BTreeMap::new();
    for episode in episodes {
        let sequence: Vec<&str> = episode
            .actions
            .iter()
            .map(|a| a.function_name.as_str())
            .collect();

        for length in MIN_PATTERN_LEN..=MAX_PATTERN_LEN.min(sequence.len()) {
            for start in 0..=sequence.len() - length {
                let subseq = &sequence[start..start + length];
                let key = subseq.join("->");
                let info = counts.entry(key).or_insert_with(|| SequenceInfo {
                    sequence: subseq.iter().map(|s| s.to_string()).collect(),
                    frequency: 0,
                    total_reward: 0.0,
                    success_count: 0,
                });
                info.frequency += 1;
                info.total_reward += episode.total_reward;
                if episode.total_reward > 0.0 {
                    info.success_count += 1;
                }
            }
        }
    }

    let mut patterns: Vec<SequencePattern> = counts
        .into_values()
        .filter(|info| info.frequency >= MIN_PATTERN_FREQUENCY)
        .map(|info| {
            let avg_reward = info.total_reward / info.frequency as f64;
            let success_rate = info.success_count as f64 / info.frequency as f64;
            SequencePattern {
                sequence: info.sequence,
                frequency: info.frequency,
                avg_reward,
                success_rate,
                efficiency: avg_reward * success_rate,
            }
        })
        .collect();

    // Composite score: frequency x (avg reward x 10), as an integer.
    let score = |p: &SequencePattern| p.frequency as i64 * (p.avg_reward * 10.0) as i64;
    patterns.sort_by(|a, b| score(b).cmp(&score(a)).then_with(|| a.sequence.cmp(&b.sequence)));
    patterns
}

fn analyze_performance(events: &[LogEvent], episodes: &[EpisodeMetrics]) -> OverallPerformance {
    if episodes.is_empty() {
        return OverallPerformance::default();
    }

    let total_episodes = episodes.len();
    let total_steps: usize = episodes.iter().map(|e| e.actions.len()).sum();
    let total_reward: f64 = episodes.iter().map(|e| e.total_reward).sum();
    let successful = episodes.iter().filter(|e| e.total_reward > 0.0).count();

    let variances: Vec<f64> = episodes.iter().map(q_value_variance).collect();

    OverallPerformance {
        total_episodes,
        total_steps,
        avg_episode_reward: total_reward / total_episodes as f64,
        overall_success_rate: successful as f64 / total_episodes as f64,
        learning_efficiency: learning_efficiency(episodes),
        convergence_rate: convergence_rate(&variances),
        exploration_balance: exploration_balance(events),
    }
}

fn q_value_variance(episode: &EpisodeMetrics) -> f64 {
    if episode.actions.is_empty() {
        return 0.0;
    }
    let n = episode.actions.len() as f64;
    let (sum, sum_sq) = episode
        .actions
        .iter()
        .fold((0.0, 0.0), |(s, sq), a| (s + a.q_value, sq + a.q_value * a.q_value));
    let mean = sum / n;
    sum_sq / n - mean * mean
}

/// Reward improvement of the second half over the first, normalized by
/// the first half's magnitude.
fn learning_efficiency(episodes: &[EpisodeMetrics]) -> f64 {
    if episodes.len() < 2 {
        return 0.0;
    }
    let mid = episodes.len() / 2;
    let first: f64 =
        episodes[..mid].iter().map(|e| e.total_reward).sum::<f64>() / mid as f64;
    let second: f64 = episodes[mid..].iter().map(|e| e.total_reward).sum::<f64>()
        / (episodes.len() - mid) as f64;
    if first.abs() < f64::EPSILON {
        return 0.0;
    }
    (second - first) / first.abs()
}

fn convergence_rate(variances: &[f64]) -> f64 {
    if variances.len() < 2 {
        return 0.0;
    }
    let first = variances[0];
    let last = variances[variances.len() - 1];
    if first.abs() < f64::EPSILON {
        return 0.0;
    }
    (first - last) / first
}

fn exploration_balance(events: &[LogEvent]) -> f64 {
    let mut total = 0u32;
    let mut exploring = 0u32;
    for event in events {
        if let EventPayload::ActionSelected(metrics) = &event.payload {
            total += 1;
            if metrics.exploration {
                exploring += 1;
            }
        }
    }
    if total == 0 {
        return 0.0;
    }
    exploring as f64 / total as f64
}

fn analyze_learning_progress(episodes: &[EpisodeMetrics]) -> Vec<LearningDataPoint> {
    let mut curve = Vec::new();
    if episodes.len() <= LEARNING_WINDOW {
        return curve;
    }

    for i in LEARNING_WINDOW..episodes.len() {
        let window = &episodes[i - LEARNING_WINDOW..i];
        let avg_reward =
            window.iter().map(|e| e.total_reward).sum::<f64>() / LEARNING_WINDOW as f64;
        let success_rate = window.iter().filter(|e| e.total_reward > 0.0).count() as f64
            / LEARNING_WINDOW as f64;

        let episode = &episodes[i];
        let exploration_rate = if episode.actions.is_empty() {
            0.0
        } else {
            episode.actions.iter().filter(|a| a.exploration).count() as f64
                / episode.actions.len() as f64
        };

        curve.push(LearningDataPoint {
            episode: i,
            avg_reward,
            success_rate,
            q_value_variance: q_value_variance(episode),
            exploration_rate,
            // Placeholder until policy-change tracking lands.
            policy_stability: 0.8,
        });
    }

    curve
}

fn find_optimal_sequences(patterns: &[SequencePattern]) -> BTreeMap<String, Vec<String>> {
    let mut optimal = BTreeMap::new();

    let best_by = |cmp: fn(&SequencePattern) -> f64| {
        patterns
            .iter()
            .max_by(|a, b| {
                cmp(a)
                    .partial_cmp(&cmp(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.sequence.cmp(&a.sequence))
            })
            .map(|p| p.sequence.clone())
            .unwrap_or_default()
    };

    optimal.insert("highest_reward".to_string(), best_by(|p| p.avg_reward));
    optimal.insert("highest_success".to_string(), best_by(|p| p.success_rate));
    optimal.insert("most_efficient".to_string(), best_by(|p| p.efficiency));
    optimal
}

fn analyze_failures(events: &[LogEvent], paired: &EventPairing<'_>) -> FailureAnalysis {
    let mut common_failures: BTreeMap<String, FailurePattern> = BTreeMap::new();
    let mut failures_by_function: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for event in events {
        let EventPayload::RewardCalculated {
            result,
            performance,
        } = &event.payload
        else {
            continue;
        };
        if result.success {
            continue;
        }

        let error_type = if result.error_type.is_empty() {
            "unknown_failure".to_string()
        } else {
            result.error_type.clone()
        };

        let pattern = common_failures
            .entry(error_type.clone())
            .or_insert_with(|| FailurePattern {
                pattern: error_type.clone(),
                ..FailurePattern::default()
            });
        pattern.frequency += 1;
        pattern.impact += performance.cumulative_reward.abs();

        let key = (event.episode_id.as_str(), event.step_number);
        if let Some(selection) = paired.selections.get(&key) {
            failures_by_function
                .entry(selection.function_name.clone())
                .or_default()
                .push(error_type.clone());
        }
    }

    for pattern in common_failures.values_mut() {
        pattern.suggestions = failure_suggestions(&pattern.pattern);
    }

    let critical_issues = common_failures
        .values()
        .filter(|p| p.frequency > 20 && p.impact > 10.0)
        .map(|p| {
            format!(
                "Critical issue: {} (frequency: {}, impact: {:.2})",
                p.pattern, p.frequency, p.impact
            )
        })
        .collect();

    FailureAnalysis {
        common_failures,
        failures_by_function,
        critical_issues,
    }
}

fn failure_suggestions(error_type: &str) -> Vec<String> {
    match error_type {
        "timeout" => vec![
            "Consider increasing timeout values or optimizing function performance".to_string(),
        ],
        "invalid_input" => vec!["Add input validation and preprocessing steps".to_string()],
        "memory_limit" => {
            vec!["Optimize memory usage or increase available memory".to_string()]
        }
        _ => vec!["Review function implementation and error handling".to_string()],
    }
}

fn generate_recommendations(report: &ApiFeedbackReport) -> Vec<String> {
    let mut recommendations = Vec::new();

    for (function_name, stats) in &report.function_usage_stats {
        if stats.success_rate < 0.7 {
            recommendations.push(format!(
                "Function '{}' has low success rate ({:.2}%). Consider improving documentation or error handling.",
                function_name,
                stats.success_rate * 100.0
            ));
        }
        if stats.avg_reward < 0.0 {
            recommendations.push(format!(
                "Function '{}' shows negative average reward ({:.2}). Review implementation or usage patterns.",
                function_name, stats.avg_reward
            ));
        }
    }

    for (pattern, failure) in &report.failure_analysis.common_failures {
        if failure.frequency > 10 {
            recommendations.push(format!(
                "Common failure pattern detected: '{}' (occurred {} times). Impact: {:.2}",
                pattern, failure.frequency, failure.impact
            ));
        }
    }

    if report.performance_metrics.total_episodes > 0
        && report.performance_metrics.overall_success_rate < 0.8
    {
        recommendations.push(format!(
            "Overall success rate is low ({:.2}%). Consider reviewing task complexity or function implementations.",
            report.performance_metrics.overall_success_rate * 100.0
        ));
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::event_log::StateMetrics;

    fn selection(episode: &str, step: u32, function: &str, exploration: bool) -> LogEvent {
        LogEvent {
            timestamp_ms: step as i64,
            session_id: "s".to_string(),
            episode_id: episode.to_string(),
            step_number: step,
            payload: EventPayload::ActionSelected(ActionMetrics {
                function_name: function.to_string(),
                category: "analysis".to_string(),
                compute_cost: 3,
                input_size: 10,
                q_value: 0.5,
                exploration,
            }),
        }
    }

    fn reward(episode: &str, step: u32, success: bool, error: &str, cum: f64) -> LogEvent {
        LogEvent {
            timestamp_ms: step as i64,
            session_id: "s".to_string(),
            episode_id: episode.to_string(),
            step_number: step,
            payload: EventPayload::RewardCalculated {
                result: ResultMetrics {
                    success,
                    output_quality: 0.7,
                    execution_time: 0.05,
                    memory_used: 64,
                    error_type: error.to_string(),
                    output_size: 100,
                },
                performance: PerformanceMetrics {
                    cumulative_reward: cum,
                    ..PerformanceMetrics::default()
                },
            },
        }
    }

    fn episode(id: &str, start_ms: i64, functions: &[&str], total_reward: f64) -> EpisodeMetrics {
        EpisodeMetrics {
            episode_id: id.to_string(),
            start_time_ms: start_ms,
            end_time_ms: start_ms + 100,
            actions: functions
                .iter()
                .map(|f| ActionMetrics {
                    function_name: f.to_string(),
                    q_value: 0.3,
                    ..ActionMetrics::default()
                })
                .collect(),
            rewards: vec![total_reward],
            states: vec![StateMetrics::default()],
            total_reward,
        }
    }

    fn analyzer_with(events: Vec<LogEvent>, episodes: Vec<EpisodeMetrics>) -> InsightAnalyzer {
        let store = Arc::new(MetricsStore::new());
        for event in events {
            store.insert_event(event);
        }
        for ep in episodes {
            store.insert_episode(ep);
        }
        InsightAnalyzer::new(store, 100, Arc::new(ManualClock::new(42)))
    }

    #[test]
    fn function_stats_pair_selection_with_reward() {
        let analyzer = analyzer_with(
            vec![
                selection("ep0", 0, "extract_entities", false),
                reward("ep0", 0, true, "", 2.0),
                selection("ep0", 1, "extract_entities", true),
                reward("ep0", 1, false, "timeout", -1.0),
            ],
            vec![],
        );

        let report = analyzer.generate_insights();
        let stats = &report.function_usage_stats["extract_entities"];
        assert_eq!(stats.call_count, 2);
        assert!((stats.success_rate - 0.5).abs() < 1e-9);
        assert_eq!(stats.error_types["timeout"], 1);
        assert!((stats.avg_q_value - 0.5).abs() < 1e-9);
    }

    #[test]
    fn sequence_patterns_respect_frequency_threshold() {
        // "a->b" appears 3 times, "b->c" only twice.
        let episodes = vec![
            episode("ep0", 0, &["a", "b", "c"], 1.0),
            episode("ep1", 1, &["a", "b", "c"], 2.0),
            episode("ep2", 2, &["a", "b"], 1.0),
        ];
        let analyzer = analyzer_with(vec![], episodes);
        let report = analyzer.generate_insights();

        let keys: Vec<String> = report
            .sequence_patterns
            .iter()
            .map(|p| p.sequence.join("->"))
            .collect();
        assert!(keys.contains(&"a->b".to_string()));
        assert!(!keys.contains(&"b->c".to_string()));

        let ab = report
            .sequence_patterns
            .iter()
            .find(|p| p.sequence == vec!["a", "b"])
            .unwrap();
        assert_eq!(ab.frequency, 3);
        assert!((ab.success_rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn analyzer_is_idempotent() {
        let episodes = vec![
            episode("ep0", 0, &["a", "b", "c"], 1.0),
            episode("ep1", 1, &["a", "b", "c"], -0.5),
            episode("ep2", 2, &["a", "b", "c"], 2.0),
            episode("ep3", 3, &["c", "a", "b"], 0.5),
        ];
        let events = vec![
            selection("ep0", 0, "a", true),
            reward("ep0", 0, true, "", 1.0),
            selection("ep0", 1, "b", false),
            reward("ep0", 1, false, "memory_limit", -0.5),
        ];
        let analyzer = analyzer_with(events, episodes);

        let mut a = analyzer.generate_insights();
        let mut b = analyzer.generate_insights();
        a.timestamp_ms = 0;
        b.timestamp_ms = 0;
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn overall_performance_aggregates() {
        let episodes = vec![
            episode("ep0", 0, &["a"], 2.0),
            episode("ep1", 1, &["a", "b"], -1.0),
            episode("ep2", 2, &["b"], 3.0),
            episode("ep3", 3, &["a"], 4.0),
        ];
        let events = vec![
            selection("ep0", 0, "a", true),
            selection("ep1", 0, "a", false),
        ];
        let analyzer = analyzer_with(events, episodes);
        let perf = analyzer.generate_insights().performance_metrics;

        assert_eq!(perf.total_episodes, 4);
        assert_eq!(perf.total_steps, 5);
        assert!((perf.avg_episode_reward - 2.0).abs() < 1e-9);
        assert!((perf.overall_success_rate - 0.75).abs() < 1e-9);
        // First half avg 0.5, second half 3.5 -> (3.5-0.5)/0.5 = 6.
        assert!((perf.learning_efficiency - 6.0).abs() < 1e-9);
        assert!((perf.exploration_balance - 0.5).abs() < 1e-9);
    }

    #[test]
    fn learning_curve_starts_after_window() {
        let episodes: Vec<EpisodeMetrics> = (0..15)
            .map(|i| episode(&format!("ep{i:02}"), i as i64, &["a"], i as f64))
            .collect();
        let analyzer = analyzer_with(vec![], episodes);
        let curve = analyzer.generate_insights().learning_curve;

        assert_eq!(curve.len(), 5);
        assert_eq!(curve[0].episode, 10);
        // Window over episodes 0..10: avg reward 4.5.
        assert!((curve[0].avg_reward - 4.5).abs() < 1e-9);
    }

    #[test]
    fn failures_grouped_and_suggested() {
        let mut events = Vec::new();
        for step in 0..25u32 {
            events.push(selection("ep0", step, "summarize_text", false));
            events.push(reward("ep0", step, false, "timeout", -1.0));
        }
        let analyzer = analyzer_with(events, vec![]);
        let report = analyzer.generate_insights();

        let failure = &report.failure_analysis.common_failures["timeout"];
        assert_eq!(failure.frequency, 25);
        assert!(failure.impact > 10.0);
        assert!(!failure.suggestions.is_empty());
        assert_eq!(
            report.failure_analysis.failures_by_function["summarize_text"].len(),
            25
        );
        assert_eq!(report.failure_analysis.critical_issues.len(), 1);
        // Frequency > 10 also produces a recommendation.
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("Common failure pattern")));
    }

    #[test]
    fn optimal_sequences_pick_maxima() {
        let episodes = vec![
            episode("ep0", 0, &["a", "b"], 5.0),
            episode("ep1", 1, &["a", "b"], 5.0),
            episode("ep2", 2, &["a", "b"], 5.0),
            episode("ep3", 3, &["c", "d"], -1.0),
            episode("ep4", 4, &["c", "d"], -1.0),
            episode("ep5", 5, &["c", "d"], -1.0),
        ];
        let analyzer = analyzer_with(vec![], episodes);
        let report = analyzer.generate_insights();

        assert_eq!(
            report.optimal_sequences["highest_reward"],
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(
            report.optimal_sequences["most_efficient"],
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
