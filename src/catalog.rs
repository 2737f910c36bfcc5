// src/catalog.rs
//
// Fixed catalog of simulated text-processing operations and the simulator
// that executes them.
//
// The simulator never returns Err: every failure is encoded in the
// ActionResult so the reward calculator and failure analyzer can consume
// it as data.

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Value as JsonValue};

use crate::types::{Action, ActionResult, Category, ErrorKind, ParamMap};

/// Pure output generator: (input, params) -> simulated output.
type OutputGenerator = fn(&str, &ParamMap) -> JsonValue;

/// One catalog entry.
#[derive(Clone)]
pub struct SimulatedFunction {
    pub name: &'static str,
    pub category: Category,
    pub cost: i64,
    pub base_success_rate: f64,
    output: OutputGenerator,
}

/// Executes catalog operations with simulated latency, memory, and
/// stochastic success.
pub struct ActionSimulator {
    functions: BTreeMap<&'static str, SimulatedFunction>,
    rng: ChaCha8Rng,
    /// When true, actually sleep for the simulated latency. Tests keep
    /// this off; the latency is recorded either way.
    pub block_on_latency: bool,
}

impl ActionSimulator {
    pub fn new(seed: u64) -> Self {
        let mut functions = BTreeMap::new();
        for function in builtin_functions() {
            functions.insert(function.name, function);
        }
        Self {
            functions,
            rng: ChaCha8Rng::seed_from_u64(seed),
            block_on_latency: false,
        }
    }

    /// The catalog as agent-selectable actions, in stable name order.
    pub fn available_actions(&self) -> Vec<Action> {
        self.functions
            .values()
            .map(|f| Action::new(f.name, f.category, f.cost))
            .collect()
    }

    pub fn lookup(&self, function_name: &str) -> Option<&SimulatedFunction> {
        self.functions.get(function_name)
    }

    /// Execute one action against `input`.
    ///
    /// Latency is monotone in input length and action cost. Success is a
    /// Bernoulli draw around the function's base rate, jittered by at most
    /// +/-0.1 from the seeded RNG.
    pub fn execute(&mut self, action: &Action, input: &str, params: &ParamMap) -> ActionResult {
        let function = match self.functions.get(action.function_name.as_str()) {
            Some(f) => f.clone(),
            None => {
                return ActionResult::failure(
                    &format!("unknown function: {}", action.function_name),
                    1,
                    1024,
                );
            }
        };

        let duration_ms = simulated_latency_ms(input.len(), function.cost);
        if self.block_on_latency {
            std::thread::sleep(std::time::Duration::from_millis(duration_ms as u64));
        }
        let memory_used = (input.len() as i64) * 2;

        let jitter = self.rng.gen_range(-0.1..0.1);
        let success = self.rng.gen_bool((function.base_success_rate + jitter).clamp(0.0, 1.0));

        if !success {
            let kind = self.pick_error_kind();
            return ActionResult::failure(kind.as_str(), duration_ms, memory_used);
        }

        ActionResult {
            success: true,
            output: Some((function.output)(input, params)),
            error: String::new(),
            duration_ms,
            memory_used,
        }
    }

    fn pick_error_kind(&mut self) -> ErrorKind {
        match self.rng.gen_range(0..4u8) {
            0 => ErrorKind::Timeout,
            1 => ErrorKind::InvalidInput,
            2 => ErrorKind::MemoryLimit,
            _ => ErrorKind::UnknownFailure,
        }
    }
}

/// Latency model: linear in input size and cost, never decreasing in either.
fn simulated_latency_ms(input_len: usize, cost: i64) -> i64 {
    (input_len as i64) / 100 + cost * 10
}

/// The default catalog. Costs and base success rates shape the learning
/// problem; the output generators are deliberately cheap stand-ins.
fn builtin_functions() -> Vec<SimulatedFunction> {
    vec![
        SimulatedFunction {
            name: "extract_entities",
            category: Category::Analysis,
            cost: 5,
            base_success_rate: 0.85,
            output: simulate_entity_extraction,
        },
        SimulatedFunction {
            name: "analyze_readability",
            category: Category::Analysis,
            cost: 3,
            base_success_rate: 0.90,
            output: simulate_readability_analysis,
        },
        SimulatedFunction {
            name: "detect_code",
            category: Category::Analysis,
            cost: 2,
            base_success_rate: 0.95,
            output: simulate_code_detection,
        },
        SimulatedFunction {
            name: "extract_keywords",
            category: Category::Analysis,
            cost: 4,
            base_success_rate: 0.88,
            output: simulate_keyword_extraction,
        },
        SimulatedFunction {
            name: "sentiment_analysis",
            category: Category::Analysis,
            cost: 3,
            base_success_rate: 0.82,
            output: simulate_sentiment_analysis,
        },
        SimulatedFunction {
            name: "summarize_text",
            category: Category::Generation,
            cost: 8,
            base_success_rate: 0.75,
            output: simulate_text_summary,
        },
        SimulatedFunction {
            name: "format_text",
            category: Category::Formatting,
            cost: 2,
            base_success_rate: 0.98,
            output: simulate_text_formatting,
        },
        SimulatedFunction {
            name: "validate_output",
            category: Category::Utility,
            cost: 1,
            base_success_rate: 0.99,
            output: simulate_output_validation,
        },
    ]
}

fn simulate_entity_extraction(input: &str, _params: &ParamMap) -> JsonValue {
    let mut entities = Vec::new();
    for (i, word) in input.split_whitespace().enumerate() {
        if word.len() > 5 && i % 3 == 0 {
            entities.push(json!({
                "text": word,
                "type": "ENTITY",
                "start": i,
                "end": i + word.len(),
            }));
        }
    }
    json!({ "count": entities.len(), "entities": entities })
}

fn simulate_readability_analysis(input: &str, _params: &ParamMap) -> JsonValue {
    let words = input.split_whitespace().count();
    let sentences = input
        .chars()
        .filter(|c| matches!(c, '.' | '!' | '?'))
        .count()
        .max(1);

    let avg_words_per_sentence = words as f64 / sentences as f64;
    let readability_score = (100.0 - avg_words_per_sentence * 2.0).clamp(0.0, 100.0);

    json!({
        "readability_score": readability_score,
        "avg_words_per_sentence": avg_words_per_sentence,
        "total_words": words,
        "total_sentences": sentences,
        "level": readability_level(readability_score),
    })
}

fn simulate_code_detection(input: &str, _params: &ParamMap) -> JsonValue {
    const INDICATORS: [&str; 10] = [
        "function", "class", "def", "import", "var", "const", "let", "if", "for", "while",
    ];
    let lower = input.to_lowercase();
    let blocks: Vec<JsonValue> = INDICATORS
        .iter()
        .filter(|ind| lower.contains(*ind))
        .map(|ind| {
            json!({
                "type": "code_snippet",
                "language": "unknown",
                "indicator": ind,
            })
        })
        .collect();

    json!({
        "has_code": !blocks.is_empty(),
        "confidence": blocks.len() as f64 / INDICATORS.len() as f64,
        "code_blocks": blocks,
    })
}

fn simulate_keyword_extraction(input: &str, _params: &ParamMap) -> JsonValue {
    let mut keywords: Vec<JsonValue> = input
        .split_whitespace()
        .filter(|w| w.len() > 4 && !is_common_word(w))
        .map(|w| json!({ "keyword": w, "score": w.len() as f64 / 10.0 }))
        .collect();
    keywords.truncate(10);

    json!({ "count": keywords.len(), "keywords": keywords })
}

fn simulate_sentiment_analysis(input: &str, _params: &ParamMap) -> JsonValue {
    const POSITIVE: [&str; 6] = ["good", "great", "excellent", "amazing", "wonderful", "fantastic"];
    const NEGATIVE: [&str; 6] = ["bad", "terrible", "awful", "horrible", "disappointing", "poor"];

    let lower = input.to_lowercase();
    let positive_count: usize = POSITIVE.iter().map(|w| lower.matches(w).count()).sum();
    let negative_count: usize = NEGATIVE.iter().map(|w| lower.matches(w).count()).sum();

    let total = (positive_count + negative_count + 1) as f64;
    let (sentiment, score) = if positive_count > negative_count {
        ("positive", positive_count as f64 / total)
    } else if negative_count > positive_count {
        ("negative", -(negative_count as f64) / total)
    } else {
        ("neutral", 0.0)
    };

    json!({
        "sentiment": sentiment,
        "score": score,
        "positive_count": positive_count,
        "negative_count": negative_count,
        "confidence": 0.75,
    })
}

fn simulate_text_summary(input: &str, _params: &ParamMap) -> JsonValue {
    let sentences: Vec<&str> = input.split('.').collect();
    if sentences.len() <= 2 {
        return json!({ "summary": input, "ratio": 1.0 });
    }

    // First and second-to-last sentence as a crude extractive summary.
    let summary = format!(
        "{}. {}.",
        sentences[0].trim(),
        sentences[sentences.len() - 2].trim()
    );

    json!({
        "summary": summary,
        "original_length": input.len(),
        "summary_length": summary.len(),
        "compression_ratio": summary.len() as f64 / input.len().max(1) as f64,
    })
}

fn simulate_text_formatting(input: &str, _params: &ParamMap) -> JsonValue {
    let formatted = input.trim().replace("  ", " ");
    json!({
        "formatted_text": formatted,
        "changes_made": ["trimmed_whitespace", "normalized_spaces"],
    })
}

fn simulate_output_validation(input: &str, _params: &ParamMap) -> JsonValue {
    let mut issues: Vec<&str> = Vec::new();
    if input.is_empty() {
        issues.push("empty_input");
    }
    if input.len() > 10_000 {
        issues.push("input_too_long");
    }

    json!({
        "is_valid": issues.is_empty(),
        "issues": issues,
        "score": 0.95,
    })
}

fn readability_level(score: f64) -> &'static str {
    if score >= 90.0 {
        "very_easy"
    } else if score >= 80.0 {
        "easy"
    } else if score >= 70.0 {
        "fairly_easy"
    } else if score >= 60.0 {
        "standard"
    } else if score >= 50.0 {
        "fairly_difficult"
    } else if score >= 30.0 {
        "difficult"
    } else {
        "very_difficult"
    }
}

fn is_common_word(word: &str) -> bool {
    const COMMON: [&str; 12] = [
        "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    ];
    let lower = word.to_lowercase();
    COMMON.iter().any(|c| *c == lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_eight_functions_in_name_order() {
        let sim = ActionSimulator::new(0);
        let actions = sim.available_actions();
        assert_eq!(actions.len(), 8);
        let names: Vec<&str> = actions.iter().map(|a| a.function_name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn unknown_function_fails_without_panicking() {
        let mut sim = ActionSimulator::new(0);
        let action = Action::new("does_not_exist", Category::Utility, 1);
        let result = sim.execute(&action, "text", &ParamMap::new());
        assert!(!result.success);
        assert!(result.error.contains("unknown function"));
    }

    #[test]
    fn latency_monotone_in_input_and_cost() {
        assert!(simulated_latency_ms(1000, 5) >= simulated_latency_ms(100, 5));
        assert!(simulated_latency_ms(100, 8) >= simulated_latency_ms(100, 2));
    }

    #[test]
    fn execution_is_deterministic_under_fixed_seed() {
        let action = Action::new("extract_entities", Category::Analysis, 5);
        let input = "Deterministic simulation keeps regression tests honest.";

        let mut a = ActionSimulator::new(42);
        let mut b = ActionSimulator::new(42);
        for _ in 0..20 {
            let ra = a.execute(&action, input, &ParamMap::new());
            let rb = b.execute(&action, input, &ParamMap::new());
            assert_eq!(ra.success, rb.success);
            assert_eq!(ra.error, rb.error);
            assert_eq!(ra.duration_ms, rb.duration_ms);
        }
    }

    #[test]
    fn failure_error_is_a_known_kind() {
        let mut sim = ActionSimulator::new(7);
        let action = Action::new("summarize_text", Category::Generation, 8);
        let mut saw_failure = false;
        for _ in 0..200 {
            let result = sim.execute(&action, "a. b. c. d.", &ParamMap::new());
            if !result.success {
                saw_failure = true;
                assert!(matches!(
                    result.error.as_str(),
                    "timeout" | "invalid_input" | "memory_limit" | "unknown_failure"
                ));
            }
        }
        assert!(saw_failure, "0.75 base rate should fail within 200 draws");
    }

    #[test]
    fn readability_output_shape() {
        let out = simulate_readability_analysis("One two three. Four five.", &ParamMap::new());
        assert!(out["readability_score"].as_f64().unwrap() >= 0.0);
        assert_eq!(out["total_sentences"].as_u64(), Some(2));
        assert!(out["level"].is_string());
    }

    #[test]
    fn sentiment_detects_polarity() {
        let pos = simulate_sentiment_analysis("This is a great and excellent tool", &ParamMap::new());
        assert_eq!(pos["sentiment"], "positive");
        let neg = simulate_sentiment_analysis("A terrible, awful experience", &ParamMap::new());
        assert_eq!(neg["sentiment"], "negative");
    }
}
