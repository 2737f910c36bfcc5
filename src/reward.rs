// src/reward.rs
//
// Reward shaping for the Q-learning agent.
//
// Two calculators share the same shape r(state, action, result, example):
// a basic variant used for quick experiments and an enhanced variant with
// task-conditioned weighting, sequence bonuses, and redundancy penalties.
// Both are pure functions over their inputs.

use std::collections::HashMap;

use crate::types::{Action, ActionResult, State, TaskType, TrainingExample};

/// Basic reward: flat -1 on failure, otherwise a handful of additive
/// terms clamped to [-5, 5].
pub struct RewardCalculator {
    task_weights: HashMap<TaskType, f64>,
}

impl Default for RewardCalculator {
    fn default() -> Self {
        let mut task_weights = HashMap::new();
        task_weights.insert(TaskType::EntityExtraction, 1.0);
        task_weights.insert(TaskType::ReadabilityAnalysis, 0.8);
        task_weights.insert(TaskType::CodeAnalysis, 0.9);
        task_weights.insert(TaskType::Comprehensive, 1.2);
        Self { task_weights }
    }
}

impl RewardCalculator {
    pub fn calculate(&self, state: &State, action: &Action, result: &ActionResult) -> f64 {
        if !result.success {
            return -1.0;
        }

        let mut base = 1.0;
        if let Some(weight) = self.task_weights.get(&state.task_type) {
            base *= weight;
        }

        let efficiency = 1.0 / action.cost.max(1) as f64;
        let quality = quality_bonus(result.output.as_ref());
        let time_penalty = (result.duration_ms as f64 / 1000.0 / 10.0).min(0.5);
        let step_penalty = state.step_count as f64 * 0.1;
        let diversity = if state
            .actions_used
            .iter()
            .any(|a| a == &action.function_name)
        {
            0.0
        } else {
            0.5
        };

        let total = base + efficiency + quality + diversity - time_penalty - step_penalty;
        total.clamp(-5.0, 5.0)
    }
}

/// Output-shape heuristic shared with the basic calculator.
fn quality_bonus(output: Option<&serde_json::Value>) -> f64 {
    let Some(output) = output else { return 0.0 };
    let Some(map) = output.as_object() else {
        return 0.5;
    };

    let mut quality = 0.0;
    if let Some(score) = map.get("score").and_then(|v| v.as_f64()) {
        quality += score;
    }
    if let Some(confidence) = map.get("confidence").and_then(|v| v.as_f64()) {
        quality += confidence;
    }

    const EXPECTED_FIELDS: [&str; 5] = ["count", "entities", "keywords", "summary", "sentiment"];
    let field_count = EXPECTED_FIELDS.iter().filter(|f| map.contains_key(**f)).count();
    quality += field_count as f64 * 0.2;

    quality.min(2.0)
}

/// Enhanced reward: nine additive terms, task-weighted and scaled by
/// example difficulty, clamped to [-5, 10]. Failure costs -1 minus a tenth
/// of the action cost.
pub struct EnhancedRewardCalculator {
    task_weights: HashMap<TaskType, f64>,
    quality_thresholds: HashMap<&'static str, f64>,
    sequence_bonus: HashMap<&'static str, f64>,
}

impl Default for EnhancedRewardCalculator {
    fn default() -> Self {
        let mut task_weights = HashMap::new();
        task_weights.insert(TaskType::TechnicalAnalysis, 1.2);
        task_weights.insert(TaskType::CodeAnalysis, 1.3);
        task_weights.insert(TaskType::AcademicAnalysis, 1.1);
        task_weights.insert(TaskType::BusinessCommunication, 1.0);
        task_weights.insert(TaskType::NewsAnalysis, 0.9);
        task_weights.insert(TaskType::SocialMediaAnalysis, 0.8);
        task_weights.insert(TaskType::LegalAnalysis, 1.4);
        task_weights.insert(TaskType::MedicalAnalysis, 1.5);
        task_weights.insert(TaskType::InstructionalAnalysis, 0.7);
        task_weights.insert(TaskType::LogAnalysis, 1.2);
        task_weights.insert(TaskType::MarketingAnalysis, 0.9);
        task_weights.insert(TaskType::ScientificAnalysis, 1.3);

        let mut quality_thresholds = HashMap::new();
        quality_thresholds.insert("entity_extraction", 0.7);
        quality_thresholds.insert("readability_analysis", 0.8);
        quality_thresholds.insert("code_detection", 0.9);
        quality_thresholds.insert("sentiment_analysis", 0.75);
        quality_thresholds.insert("keyword_extraction", 0.8);

        // Lexical "prev->curr" keys; last write wins on duplicates.
        let mut sequence_bonus = HashMap::new();
        sequence_bonus.insert("extract_entities->extract_keywords", 0.3);
        sequence_bonus.insert("detect_code->analyze_readability", 0.2);
        sequence_bonus.insert("extract_keywords->sentiment_analysis", 0.25);
        sequence_bonus.insert("analyze_readability->summarize_text", 0.4);
        sequence_bonus.insert("extract_entities->validate_output", 0.2);

        Self {
            task_weights,
            quality_thresholds,
            sequence_bonus,
        }
    }
}

impl EnhancedRewardCalculator {
    pub fn calculate(
        &self,
        state: &State,
        action: &Action,
        result: &ActionResult,
        example: &TrainingExample,
    ) -> f64 {
        if !result.success {
            return -1.0 - action.cost as f64 * 0.1;
        }

        let mut base = 1.0;
        if let Some(weight) = self.task_weights.get(&example.task_type) {
            base *= weight;
        }

        let relevance = self.relevance_bonus(action, example);
        let quality = self.assess_output_quality(action, result, example);
        let efficiency = self.efficiency_score(state, action);
        let sequence = self.sequence_bonus(state, action);
        let progress = self.progress_reward(state, action, example);
        let redundancy = self.redundancy_penalty(state, action);
        let time_bonus = self.time_bonus(result, action);
        let diversity = self.diversity_bonus(state);

        let total = base + relevance + quality + efficiency + sequence + progress - redundancy
            + time_bonus
            + diversity;

        let scaled = total * (1.0 + example.difficulty * 0.5);
        scaled.clamp(-5.0, 10.0)
    }

    /// Static task-type x function relevance table, values in [0, 1].
    fn relevance_bonus(&self, action: &Action, example: &TrainingExample) -> f64 {
        let name = action.function_name.as_str();
        match example.task_type {
            TaskType::CodeAnalysis if name == "detect_code" || name == "analyze_readability" => 1.0,
            TaskType::TechnicalAnalysis
            | TaskType::AcademicAnalysis
            | TaskType::ScientificAnalysis
                if name == "extract_entities" || name == "extract_keywords" =>
            {
                0.8
            }
            TaskType::BusinessCommunication | TaskType::MarketingAnalysis
                if name == "sentiment_analysis" || name == "extract_entities" =>
            {
                0.7
            }
            TaskType::SocialMediaAnalysis if name == "sentiment_analysis" => 0.9,
            TaskType::LegalAnalysis | TaskType::MedicalAnalysis if name == "extract_entities" => 1.0,
            TaskType::LogAnalysis if name == "detect_code" || name == "extract_keywords" => 0.8,
            _ => 0.0,
        }
    }

    /// Per-function output-shape heuristics, capped at 1.5.
    fn assess_output_quality(
        &self,
        action: &Action,
        result: &ActionResult,
        example: &TrainingExample,
    ) -> f64 {
        let Some(map) = result.output.as_ref().and_then(|o| o.as_object()) else {
            return 0.3;
        };

        let mut quality = 0.0;
        if example.expected.contains_key(&action.function_name) {
            quality += 0.5;
        }

        match action.function_name.as_str() {
            "extract_entities" => {
                if let Some(entities) = map.get("entities").and_then(|v| v.as_array()) {
                    quality += entities.len() as f64 * 0.1;
                }
            }
            "analyze_readability" => {
                if let Some(score) = map.get("readability_score").and_then(|v| v.as_f64()) {
                    if (30.0..=90.0).contains(&score) {
                        quality += 0.4;
                    }
                }
            }
            "sentiment_analysis" => {
                if map.contains_key("score") && map.contains_key("confidence") {
                    quality += 0.5;
                }
            }
            _ => {}
        }

        if let Some(threshold) = self.quality_thresholds.get(action.function_name.as_str()) {
            if quality >= *threshold {
                quality *= 1.2;
            }
        }

        quality.min(1.5)
    }

    /// Cost efficiency scaled by remaining budget; expensive actions on a
    /// low budget are penalized outright.
    fn efficiency_score(&self, state: &State, action: &Action) -> f64 {
        let budget_ratio = state.remaining_budget as f64 / crate::types::INITIAL_BUDGET as f64;
        if budget_ratio < 0.3 && action.cost > 5 {
            return -0.5;
        }
        (1.0 / action.cost.max(1) as f64) * budget_ratio
    }

    fn sequence_bonus(&self, state: &State, action: &Action) -> f64 {
        let Some(last) = state.actions_used.last() else {
            return 0.0;
        };

        let key = format!("{}->{}", last, action.function_name);
        if let Some(bonus) = self.sequence_bonus.get(key.as_str()) {
            return *bonus;
        }

        // Default bonuses for analysis -> enrichment transitions.
        match (last.as_str(), action.function_name.as_str()) {
            ("extract_entities", "extract_keywords") | ("extract_entities", "validate_output") => {
                0.2
            }
            ("detect_code", "analyze_readability") => 0.15,
            ("analyze_readability", "summarize_text") => 0.25,
            _ => 0.0,
        }
    }

    /// Progress toward the example's expected outcomes, plus a bonus once
    /// two distinct action categories have been used.
    fn progress_reward(&self, state: &State, action: &Action, example: &TrainingExample) -> f64 {
        let mut progress = 0.0;

        let prefix = action
            .function_name
            .split('_')
            .next()
            .unwrap_or(action.function_name.as_str());
        for key in example.expected.keys() {
            if key.contains(prefix) {
                progress += 0.3;
            }
        }

        let mut categories = std::collections::HashSet::new();
        for used in &state.actions_used {
            let category = if used.contains("format") {
                "formatting"
            } else if used.contains("validate") {
                "validation"
            } else {
                "analysis"
            };
            categories.insert(category);
        }
        if categories.len() >= 2 {
            progress += 0.2;
        }

        progress
    }

    /// 0.3 per prior use of the same action.
    fn redundancy_penalty(&self, state: &State, action: &Action) -> f64 {
        let count = state
            .actions_used
            .iter()
            .filter(|a| *a == &action.function_name)
            .count();
        count as f64 * 0.3
    }

    /// +0.1 for executions faster than 10ms per cost unit, -0.1 beyond
    /// 20ms per cost unit.
    fn time_bonus(&self, result: &ActionResult, action: &Action) -> f64 {
        let expected_ms = action.cost * 10;
        if result.duration_ms < expected_ms {
            0.1
        } else if result.duration_ms > expected_ms * 2 {
            -0.1
        } else {
            0.0
        }
    }

    fn diversity_bonus(&self, state: &State) -> f64 {
        let unique: std::collections::HashSet<&String> = state.actions_used.iter().collect();
        let ratio = unique.len() as f64 / (state.actions_used.len() + 1) as f64;
        ratio * 0.3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionResult, Category, State};
    use std::collections::BTreeMap;

    fn example(task_type: TaskType, difficulty: f64) -> TrainingExample {
        TrainingExample {
            id: "r1".to_string(),
            text: "Sample text.".to_string(),
            task_type,
            expected: BTreeMap::new(),
            difficulty,
        }
    }

    fn success_result(output: serde_json::Value, duration_ms: i64) -> ActionResult {
        ActionResult {
            success: true,
            output: Some(output),
            error: String::new(),
            duration_ms,
            memory_used: 256,
        }
    }

    #[test]
    fn basic_reward_bounded() {
        let calc = RewardCalculator::default();
        let ex = example(TaskType::Comprehensive, 0.0);
        let state = State::initial(&ex);
        let action = Action::new("validate_output", Category::Utility, 1);

        let reward = calc.calculate(
            &state,
            &action,
            &success_result(serde_json::json!({"score": 100.0, "confidence": 50.0}), 1),
        );
        assert!(reward <= 5.0);

        let failure = calc.calculate(&state, &action, &ActionResult::failure("timeout", 5, 8));
        assert_eq!(failure, -1.0);
    }

    #[test]
    fn enhanced_failure_scales_with_cost() {
        let calc = EnhancedRewardCalculator::default();
        let ex = example(TaskType::CodeAnalysis, 0.3);
        let state = State::initial(&ex);
        let cheap = Action::new("validate_output", Category::Utility, 1);
        let expensive = Action::new("summarize_text", Category::Generation, 8);
        let failed = ActionResult::failure("timeout", 10, 64);

        let r_cheap = calc.calculate(&state, &cheap, &failed, &ex);
        let r_expensive = calc.calculate(&state, &expensive, &failed, &ex);
        assert!((r_cheap - (-1.1)).abs() < 1e-9);
        assert!((r_expensive - (-1.8)).abs() < 1e-9);
    }

    #[test]
    fn enhanced_reward_clamped_at_ten() {
        let calc = EnhancedRewardCalculator::default();
        let mut ex = example(TaskType::MedicalAnalysis, 1.0);
        // Expected outcomes matching every prefix pump the progress term.
        for key in ["extract_a", "extract_b", "extract_c", "extract_d", "extract_e"] {
            ex.expected.insert(key.to_string(), serde_json::json!(true));
        }
        let mut state = State::initial(&ex);
        state.actions_used = vec!["format_text".to_string(), "validate_output".to_string()];
        state.step_count = 2;

        let action = Action::new("extract_entities", Category::Analysis, 5);
        let entities: Vec<serde_json::Value> =
            (0..40).map(|i| serde_json::json!({"text": i})).collect();
        let reward = calc.calculate(
            &state,
            &action,
            &success_result(serde_json::json!({"entities": entities}), 1),
            &ex,
        );
        assert!(reward <= 10.0);
        assert!(reward >= -5.0);
    }

    #[test]
    fn sequence_bonus_uses_last_action() {
        let calc = EnhancedRewardCalculator::default();
        let ex = example(TaskType::Comprehensive, 0.0);
        let mut state = State::initial(&ex);
        state.actions_used = vec!["analyze_readability".to_string()];
        state.step_count = 1;

        let action = Action::new("summarize_text", Category::Generation, 8);
        assert!((calc.sequence_bonus(&state, &action) - 0.4).abs() < 1e-9);

        let unrelated = Action::new("format_text", Category::Formatting, 2);
        assert_eq!(calc.sequence_bonus(&state, &unrelated), 0.0);
    }

    #[test]
    fn redundancy_penalty_grows_per_repeat() {
        let calc = EnhancedRewardCalculator::default();
        let ex = example(TaskType::Comprehensive, 0.0);
        let mut state = State::initial(&ex);
        state.actions_used = vec![
            "detect_code".to_string(),
            "detect_code".to_string(),
            "format_text".to_string(),
        ];

        let action = Action::new("detect_code", Category::Analysis, 2);
        assert!((calc.redundancy_penalty(&state, &action) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn low_budget_expensive_action_penalized() {
        let calc = EnhancedRewardCalculator::default();
        let ex = example(TaskType::Comprehensive, 0.0);
        let mut state = State::initial(&ex);
        state.remaining_budget = 10; // 20% of initial

        let expensive = Action::new("summarize_text", Category::Generation, 8);
        assert_eq!(calc.efficiency_score(&state, &expensive), -0.5);

        let cheap = Action::new("validate_output", Category::Utility, 1);
        assert!(calc.efficiency_score(&state, &cheap) > 0.0);
    }
}
