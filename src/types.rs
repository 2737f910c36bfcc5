// src/types.rs
//
// Core data model for the training harness: task labels, the action
// vocabulary, heterogeneous parameter values, training examples, and the
// per-episode state that the agent observes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clock::TimestampMs;

/// Closed set of task labels carried by training examples.
///
/// The reward calculator's weight and relevance tables are keyed by these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    TechnicalAnalysis,
    CodeAnalysis,
    AcademicAnalysis,
    BusinessCommunication,
    NewsAnalysis,
    SocialMediaAnalysis,
    LegalAnalysis,
    MedicalAnalysis,
    InstructionalAnalysis,
    LogAnalysis,
    MarketingAnalysis,
    ScientificAnalysis,
    Comprehensive,
    EntityExtraction,
    ReadabilityAnalysis,
}

impl TaskType {
    /// Stable lowercase name, used in logs and serialized keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::TechnicalAnalysis => "technical_analysis",
            TaskType::CodeAnalysis => "code_analysis",
            TaskType::AcademicAnalysis => "academic_analysis",
            TaskType::BusinessCommunication => "business_communication",
            TaskType::NewsAnalysis => "news_analysis",
            TaskType::SocialMediaAnalysis => "social_media_analysis",
            TaskType::LegalAnalysis => "legal_analysis",
            TaskType::MedicalAnalysis => "medical_analysis",
            TaskType::InstructionalAnalysis => "instructional_analysis",
            TaskType::LogAnalysis => "log_analysis",
            TaskType::MarketingAnalysis => "marketing_analysis",
            TaskType::ScientificAnalysis => "scientific_analysis",
            TaskType::Comprehensive => "comprehensive",
            TaskType::EntityExtraction => "entity_extraction",
            TaskType::ReadabilityAnalysis => "readability_analysis",
        }
    }
}

/// Action categories in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Analysis,
    Generation,
    Formatting,
    Utility,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Analysis => "analysis",
            Category::Generation => "generation",
            Category::Formatting => "formatting",
            Category::Utility => "utility",
        }
    }
}

/// Heterogeneous parameter value.
///
/// Action parameters, strategy-action parameters, and optimizer genomes are
/// all maps of these. Serialized untagged so JSON round-trips naturally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    /// Numeric view; integers widen to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

/// Parameter map with stable (sorted) key order.
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Deterministic encoding of a parameter map for cache keys.
///
/// BTreeMap iteration is already sorted by key, so serde_json output is
/// canonical for a given map.
pub fn canonical_params(params: &ParamMap) -> String {
    serde_json::to_string(params).unwrap_or_else(|_| "{}".to_string())
}

/// Typed range for a single optimizable parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterRange {
    Int {
        min: i64,
        max: i64,
        default: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<i64>,
    },
    Float {
        min: f64,
        max: f64,
        default: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<f64>,
    },
    Bool {
        default: bool,
    },
    Enum {
        options: Vec<String>,
        default: String,
    },
}

impl ParameterRange {
    /// The declared default as a value.
    pub fn default_value(&self) -> ParamValue {
        match self {
            ParameterRange::Int { default, .. } => ParamValue::Int(*default),
            ParameterRange::Float { default, .. } => ParamValue::Float(*default),
            ParameterRange::Bool { default } => ParamValue::Bool(*default),
            ParameterRange::Enum { default, .. } => ParamValue::Str(default.clone()),
        }
    }
}

/// One labeled example from the training corpus. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingExample {
    pub id: String,
    pub text: String,
    pub task_type: TaskType,
    /// Task-specific expected outcomes consulted by reward shaping.
    #[serde(default)]
    pub expected: BTreeMap<String, serde_json::Value>,
    /// Difficulty in [0, 1]; scales the enhanced reward.
    pub difficulty: f64,
}

/// One callable operation from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub function_name: String,
    pub category: Category,
    pub cost: i64,
    #[serde(default)]
    pub parameters: ParamMap,
}

impl Action {
    pub fn new(function_name: &str, category: Category, cost: i64) -> Self {
        Self {
            function_name: function_name.to_string(),
            category,
            cost,
            parameters: ParamMap::new(),
        }
    }
}

/// Simulator error kinds. Failures are data, not `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    InvalidInput,
    MemoryLimit,
    UnknownFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::MemoryLimit => "memory_limit",
            ErrorKind::UnknownFailure => "unknown_failure",
        }
    }
}

/// Outcome of one simulated operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub output: Option<serde_json::Value>,
    /// Error label; empty on success.
    #[serde(default)]
    pub error: String,
    pub duration_ms: i64,
    pub memory_used: i64,
}

impl ActionResult {
    pub fn failure(error: &str, duration_ms: i64, memory_used: i64) -> Self {
        Self {
            success: false,
            output: None,
            error: error.to_string(),
            duration_ms,
            memory_used,
        }
    }
}

/// Per-episode state observed by the agent.
///
/// Logically immutable per step: `update` returns the successor state, the
/// episode runner owns the live value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub text: String,
    pub task_type: TaskType,
    /// Ordered function names, appended once per step.
    pub actions_used: Vec<String>,
    /// Last successful output per function.
    pub current_results: BTreeMap<String, serde_json::Value>,
    pub step_count: u32,
    pub remaining_budget: i64,
}

/// Initial per-episode budget.
pub const INITIAL_BUDGET: i64 = 50;

impl State {
    /// Build the initial state for an example.
    pub fn initial(example: &TrainingExample) -> Self {
        Self::with_budget(example, INITIAL_BUDGET)
    }

    pub fn with_budget(example: &TrainingExample, budget: i64) -> Self {
        Self {
            text: example.text.clone(),
            task_type: example.task_type,
            actions_used: Vec::new(),
            current_results: BTreeMap::new(),
            step_count: 0,
            remaining_budget: budget,
        }
    }

    /// Pure transition: successor state after executing `action`.
    ///
    /// step_count increments by exactly one, budget decreases by the action
    /// cost, and only successful outputs land in `current_results`.
    pub fn update(&self, action: &Action, result: &ActionResult) -> State {
        let mut next = self.clone();
        next.step_count += 1;
        next.remaining_budget -= action.cost;
        next.actions_used.push(action.function_name.clone());
        if result.success {
            if let Some(output) = &result.output {
                next.current_results
                    .insert(action.function_name.clone(), output.clone());
            }
        }
        next
    }

    /// Terminal predicate: budget exhausted or step cap reached.
    pub fn is_terminal(&self, max_steps: u32) -> bool {
        self.remaining_budget <= 0 || self.actions_used.len() as u32 >= max_steps
    }
}

/// Session identifier derived from a timestamp.
pub fn session_id(now_ms: TimestampMs) -> String {
    format!("session_{}", now_ms / 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example() -> TrainingExample {
        TrainingExample {
            id: "t1".to_string(),
            text: "Sample text for analysis and processing.".to_string(),
            task_type: TaskType::Comprehensive,
            expected: BTreeMap::new(),
            difficulty: 0.5,
        }
    }

    #[test]
    fn state_transition_is_monotonic() {
        let state = State::initial(&example());
        let action = Action::new("extract_entities", Category::Analysis, 5);
        let result = ActionResult {
            success: true,
            output: Some(serde_json::json!({"count": 2})),
            error: String::new(),
            duration_ms: 12,
            memory_used: 80,
        };

        let next = state.update(&action, &result);
        assert_eq!(next.step_count, state.step_count + 1);
        assert_eq!(next.remaining_budget, state.remaining_budget - action.cost);
        assert_eq!(next.actions_used.len(), next.step_count as usize);
        assert!(next.current_results.contains_key("extract_entities"));
        // Original untouched.
        assert_eq!(state.step_count, 0);
        assert!(state.current_results.is_empty());
    }

    #[test]
    fn failed_result_leaves_results_unchanged() {
        let state = State::initial(&example());
        let action = Action::new("summarize_text", Category::Generation, 8);
        let result = ActionResult::failure("timeout", 90, 128);

        let next = state.update(&action, &result);
        assert!(next.current_results.is_empty());
        assert_eq!(next.actions_used, vec!["summarize_text".to_string()]);
    }

    #[test]
    fn terminal_on_budget_or_steps() {
        let mut state = State::with_budget(&example(), 3);
        assert!(!state.is_terminal(10));
        state.remaining_budget = 0;
        assert!(state.is_terminal(10));

        let mut state = State::initial(&example());
        state.actions_used = vec!["a".into(), "b".into(), "c".into()];
        state.step_count = 3;
        assert!(state.is_terminal(3));
    }

    #[test]
    fn canonical_params_sorted_and_stable() {
        let mut params = ParamMap::new();
        params.insert("zeta".to_string(), ParamValue::Int(3));
        params.insert("alpha".to_string(), ParamValue::Bool(true));
        let encoded = canonical_params(&params);
        assert_eq!(encoded, r#"{"alpha":true,"zeta":3}"#);
    }

    #[test]
    fn task_type_serde_round_trip() {
        let json = serde_json::to_string(&TaskType::CodeAnalysis).unwrap();
        assert_eq!(json, "\"code_analysis\"");
        let back: TaskType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TaskType::CodeAnalysis);
    }
}
