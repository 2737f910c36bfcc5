// src/training.rs
//
// Built-in training corpus: realistic labeled examples spanning the task
// vocabulary. Used whenever no corpus file is supplied.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::types::{TaskType, TrainingExample};

fn expected(pairs: Vec<(&str, Value)>) -> BTreeMap<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// The default corpus.
pub fn builtin_training_data() -> Vec<TrainingExample> {
    vec![
        TrainingExample {
            id: "tech_doc_1".to_string(),
            text: "The Redis persistence mechanism offers two distinct approaches: RDB \
                   snapshots and AOF logging. RDB performs point-in-time snapshots of your \
                   dataset at specified intervals, while AOF logs every write operation \
                   received by the server. These methods can be used independently or \
                   combined for maximum data safety. The trade-off involves balancing \
                   performance impact against data durability requirements."
                .to_string(),
            task_type: TaskType::TechnicalAnalysis,
            expected: expected(vec![
                ("entities", json!(["Redis", "RDB", "AOF"])),
                ("keywords", json!(["persistence", "snapshots", "logging", "durability"])),
                ("readability_score", json!(65.0)),
            ]),
            difficulty: 0.6,
        },
        TrainingExample {
            id: "code_sample_1".to_string(),
            text: "def calculate_fibonacci(n):\n    \
                   \"\"\"Calculate the nth Fibonacci number using dynamic programming.\"\"\"\n    \
                   if n <= 1:\n        return n\n    prev, curr = 0, 1\n    \
                   for i in range(2, n + 1):\n        prev, curr = curr, prev + curr\n    \
                   return curr"
                .to_string(),
            task_type: TaskType::CodeAnalysis,
            expected: expected(vec![
                ("detect_code", json!(true)),
                ("language", json!("python")),
                ("function_count", json!(1)),
            ]),
            difficulty: 0.7,
        },
        TrainingExample {
            id: "research_abstract_1".to_string(),
            text: "Abstract: We present a novel approach to multi-task learning in neural \
                   networks that significantly improves performance on diverse NLP tasks. \
                   Our method combines adaptive task weighting with gradient surgery to \
                   mitigate negative transfer. Experiments on twelve benchmarks show \
                   consistent gains over strong single-task baselines."
                .to_string(),
            task_type: TaskType::AcademicAnalysis,
            expected: expected(vec![
                ("entities", json!(["NLP", "multi-task learning"])),
                ("extract_keywords", json!(["neural", "adaptive", "gradient"])),
            ]),
            difficulty: 0.8,
        },
        TrainingExample {
            id: "business_email_1".to_string(),
            text: "Hi team, great progress this quarter. The renewal pipeline looks \
                   excellent and customer satisfaction scores improved again. Please \
                   review the attached forecast before Thursday's sync and flag any \
                   accounts that need executive attention. Thanks!"
                .to_string(),
            task_type: TaskType::BusinessCommunication,
            expected: expected(vec![
                ("sentiment", json!("positive")),
                ("sentiment_analysis", json!({"score": 0.6})),
            ]),
            difficulty: 0.3,
        },
        TrainingExample {
            id: "news_article_1".to_string(),
            text: "City council voted 7-2 on Tuesday to approve the riverfront \
                   redevelopment plan, ending a two-year dispute over zoning. Supporters \
                   say the project will create hundreds of jobs; opponents warn of \
                   rising rents in adjacent neighborhoods. Construction is expected to \
                   begin next spring."
                .to_string(),
            task_type: TaskType::NewsAnalysis,
            expected: expected(vec![
                ("entities", json!(["City council", "Tuesday"])),
                ("summary", json!("council approves redevelopment")),
            ]),
            difficulty: 0.5,
        },
        TrainingExample {
            id: "social_post_1".to_string(),
            text: "ok the new update is actually amazing?? battery life is so much \
                   better and the camera is fantastic. still hate the new icon though \
                   lol #upgrade"
                .to_string(),
            task_type: TaskType::SocialMediaAnalysis,
            expected: expected(vec![
                ("sentiment", json!("positive")),
                ("sentiment_analysis", json!({"score": 0.5})),
            ]),
            difficulty: 0.4,
        },
        TrainingExample {
            id: "legal_clause_1".to_string(),
            text: "Notwithstanding anything to the contrary herein, the Licensee shall \
                   indemnify and hold harmless the Licensor, its officers, directors, \
                   and employees from any claims arising out of the Licensee's use of \
                   the Software, except to the extent such claims result from the \
                   Licensor's gross negligence or willful misconduct."
                .to_string(),
            task_type: TaskType::LegalAnalysis,
            expected: expected(vec![
                ("entities", json!(["Licensee", "Licensor", "Software"])),
                ("extract_entities", json!({"count": 3})),
            ]),
            difficulty: 0.9,
        },
        TrainingExample {
            id: "medical_note_1".to_string(),
            text: "Patient presents with a three-day history of productive cough and \
                   low-grade fever. Auscultation reveals crackles in the right lower \
                   lobe. Chest radiograph confirms right lower lobe consolidation \
                   consistent with community-acquired pneumonia. Started on empiric \
                   amoxicillin-clavulanate."
                .to_string(),
            task_type: TaskType::MedicalAnalysis,
            expected: expected(vec![
                ("entities", json!(["pneumonia", "amoxicillin-clavulanate"])),
                ("extract_entities", json!({"count": 2})),
            ]),
            difficulty: 0.9,
        },
        TrainingExample {
            id: "howto_guide_1".to_string(),
            text: "To reset the device, first hold the power button for ten seconds. \
                   When the light blinks twice, release the button and wait for the \
                   startup chime. If the chime does not sound, repeat the process with \
                   the device connected to power."
                .to_string(),
            task_type: TaskType::InstructionalAnalysis,
            expected: expected(vec![("summarize_text", json!("reset steps"))]),
            difficulty: 0.2,
        },
        TrainingExample {
            id: "server_log_1".to_string(),
            text: "2024-03-02T10:14:07Z ERROR api-gateway request_id=9f31 upstream \
                   timeout after 30000ms route=/v2/search retries=2\n\
                   2024-03-02T10:14:09Z WARN api-gateway circuit breaker OPEN for \
                   upstream search-svc\n\
                   2024-03-02T10:15:01Z INFO api-gateway circuit breaker HALF_OPEN \
                   probe succeeded"
                .to_string(),
            task_type: TaskType::LogAnalysis,
            expected: expected(vec![
                ("keywords", json!(["timeout", "circuit", "upstream"])),
                ("detect_code", json!(false)),
            ]),
            difficulty: 0.6,
        },
        TrainingExample {
            id: "ad_copy_1".to_string(),
            text: "Meet the only water bottle that remembers to hydrate for you. Smart \
                   sensors, gorgeous design, and a battery that lasts a month. Join \
                   50,000 happy customers and feel the difference. Order today and get \
                   free shipping!"
                .to_string(),
            task_type: TaskType::MarketingAnalysis,
            expected: expected(vec![("sentiment", json!("positive"))]),
            difficulty: 0.3,
        },
        TrainingExample {
            id: "paper_methods_1".to_string(),
            text: "Samples were incubated at 37 degrees for 24 hours in triplicate. \
                   Optical density was measured at 600 nm every 30 minutes. Growth \
                   curves were fitted with a logistic model; lag time and maximum \
                   growth rate were estimated by nonlinear least squares."
                .to_string(),
            task_type: TaskType::ScientificAnalysis,
            expected: expected(vec![
                ("extract_keywords", json!(["incubated", "logistic", "growth"])),
            ]),
            difficulty: 0.7,
        },
        TrainingExample {
            id: "mixed_corpus_1".to_string(),
            text: "The quarterly report shows great improvements across all metrics. \
                   Revenue is up 23% and the new analytics function performs well. \
                   import pandas as pd was the only code change required. Customer \
                   feedback remains excellent."
                .to_string(),
            task_type: TaskType::Comprehensive,
            expected: expected(vec![
                ("entities", json!(["pandas"])),
                ("sentiment", json!("positive")),
                ("detect_code", json!(true)),
            ]),
            difficulty: 0.5,
        },
    ]
}
