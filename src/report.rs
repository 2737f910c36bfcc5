// src/report.rs
//
// Markdown rendering of an ApiFeedbackReport into an API usage guide
// (report mode of the CLI).

use std::fmt::Write;

use crate::analyzer::ApiFeedbackReport;
use crate::persist::ModelCheckpoint;

/// Render the usage guide. `model` optionally contributes Q-table
/// summary statistics.
pub fn render_usage_guide(report: &ApiFeedbackReport, model: Option<&ModelCheckpoint>) -> String {
    let mut out = String::new();
    let perf = &report.performance_metrics;

    let _ = write!(
        out,
        "# TextLab API Usage Guide\n\n\
         Analysis Period: {} episodes\n\n\
         ## Executive Summary\n\n\
         This report summarizes the usage patterns discovered by reinforcement\n\
         learning over the text-processing catalog.\n\n\
         ### Key Findings\n\n\
         - **Total Episodes Analyzed**: {}\n\
         - **Overall Success Rate**: {:.2}%\n\
         - **Average Episode Reward**: {:.2}\n\
         - **Learning Efficiency**: {:.2}\n\n",
        report.analysis_period,
        perf.total_episodes,
        perf.overall_success_rate * 100.0,
        perf.avg_episode_reward,
        perf.learning_efficiency,
    );

    out.push_str("## Function Performance Analysis\n\n");
    for (function_name, stats) in &report.function_usage_stats {
        let _ = write!(
            out,
            "### {}\n\
             - **Call Count**: {}\n\
             - **Success Rate**: {:.2}%\n\
             - **Average Reward**: {:.2}\n\
             - **Average Duration**: {:.3} seconds\n\
             - **Quality Score**: {:.2}\n\n",
            function_name,
            stats.call_count,
            stats.success_rate * 100.0,
            stats.avg_reward,
            stats.avg_duration,
            stats.quality_metrics.avg_output_quality,
        );
    }

    out.push_str("## Optimal Usage Patterns\n\n");
    for (criterion, sequence) in &report.optimal_sequences {
        let _ = write!(
            out,
            "### {}\nSequence: {}\n\n",
            criterion,
            if sequence.is_empty() {
                "(none found)".to_string()
            } else {
                sequence.join(" -> ")
            }
        );
    }

    out.push_str("## Recommendations\n\n");
    if report.recommendations.is_empty() {
        out.push_str("No recommendations; all tracked metrics are within thresholds.\n");
    }
    for (i, recommendation) in report.recommendations.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, recommendation);
    }

    out.push_str("\n## Failure Analysis\n\n");
    for (pattern, failure) in &report.failure_analysis.common_failures {
        let _ = write!(
            out,
            "### {}\n- **Frequency**: {}\n- **Impact**: {:.2}\n- **Suggestions**:\n",
            pattern, failure.frequency, failure.impact
        );
        for suggestion in &failure.suggestions {
            let _ = writeln!(out, "  - {}", suggestion);
        }
        out.push('\n');
    }

    if let Some(model) = model {
        let entries: usize = model.q_table.values().map(|m| m.len()).sum();
        let _ = write!(
            out,
            "## Model Summary\n\n\
             - **Q-table states**: {}\n\
             - **Q-table entries**: {}\n\
             - **Model version**: {}\n\n",
            model.q_table.len(),
            entries,
            model.version,
        );
    }

    out.push_str("---\n*Generated by textlab*\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{FunctionStats, OverallPerformance};
    use crate::config::SystemConfig;
    use crate::persist::ModelCheckpoint;

    fn sample_report() -> ApiFeedbackReport {
        let mut report = ApiFeedbackReport {
            analysis_period: 100,
            performance_metrics: OverallPerformance {
                total_episodes: 100,
                total_steps: 420,
                avg_episode_reward: 1.7,
                overall_success_rate: 0.85,
                learning_efficiency: 0.4,
                convergence_rate: 0.2,
                exploration_balance: 0.3,
            },
            ..ApiFeedbackReport::default()
        };
        report.function_usage_stats.insert(
            "extract_entities".to_string(),
            FunctionStats {
                call_count: 42,
                success_rate: 0.9,
                avg_reward: 1.2,
                ..FunctionStats::default()
            },
        );
        report.optimal_sequences.insert(
            "highest_reward".to_string(),
            vec!["extract_entities".to_string(), "validate_output".to_string()],
        );
        report
            .recommendations
            .push("Review summarize_text usage.".to_string());
        report
    }

    #[test]
    fn guide_contains_all_sections() {
        let guide = render_usage_guide(&sample_report(), None);
        for heading in [
            "# TextLab API Usage Guide",
            "## Executive Summary",
            "## Function Performance Analysis",
            "### extract_entities",
            "## Optimal Usage Patterns",
            "extract_entities -> validate_output",
            "## Recommendations",
            "1. Review summarize_text usage.",
            "## Failure Analysis",
        ] {
            assert!(guide.contains(heading), "missing {heading:?}");
        }
        assert!(!guide.contains("## Model Summary"));
    }

    #[test]
    fn model_section_appears_when_supplied() {
        let model = ModelCheckpoint::new(Default::default(), SystemConfig::default(), 0);
        let guide = render_usage_guide(&sample_report(), Some(&model));
        assert!(guide.contains("## Model Summary"));
        assert!(guide.contains("**Model version**: 1.0"));
    }
}
