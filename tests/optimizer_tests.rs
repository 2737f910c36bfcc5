// Evolutionary optimizer scenarios: the NSGA-II toy problem and the
// single-parameter GA improvement check.

use std::collections::BTreeMap;

use textlab::optimizer::{
    Direction, GaConfig, MultiObjectiveOptimizer, NsgaConfig, Objective, ParameterOptimizer,
    Solution,
};
use textlab::types::ParameterRange;

fn two_minimize_objectives() -> MultiObjectiveOptimizer {
    let mut opt = MultiObjectiveOptimizer::with_config(
        NsgaConfig {
            population_size: 6,
            generations: 1,
            ..NsgaConfig::default()
        },
        1,
    );
    opt.add_objective(Objective {
        name: "f1".to_string(),
        direction: Direction::Minimize,
        weight: 0.5,
        evaluator: |s| s.objectives[0],
    });
    opt.add_objective(Objective {
        name: "f2".to_string(),
        direction: Direction::Minimize,
        weight: 0.5,
        evaluator: |s| s.objectives[1],
    });
    opt
}

#[test]
fn nsga_two_objective_toy_problem() {
    let opt = two_minimize_objectives();
    let mut population: Vec<Solution> = [
        (1.0, 5.0),
        (2.0, 3.0),
        (3.0, 2.0),
        (5.0, 1.0),
        (4.0, 4.0),
        (6.0, 6.0),
    ]
    .iter()
    .map(|&(f1, f2)| Solution::with_objectives(vec![f1, f2]))
    .collect();

    let fronts = opt.sort_into_fronts(&mut population);

    // F0 = {(1,5), (2,3), (3,2), (5,1)}.
    let f0: Vec<(f64, f64)> = fronts[0]
        .iter()
        .map(|&i| (population[i].objectives[0], population[i].objectives[1]))
        .collect();
    assert_eq!(f0.len(), 4);
    for point in [(1.0, 5.0), (2.0, 3.0), (3.0, 2.0), (5.0, 1.0)] {
        assert!(f0.contains(&point), "expected {point:?} in F0");
    }

    // (4,4) sits in F1, (6,6) in F2.
    let find = |f1: f64| population.iter().find(|s| s.objectives[0] == f1).unwrap();
    assert_eq!(find(4.0).rank, 1);
    assert_eq!(find(6.0).rank, 2);
}

#[test]
fn pareto_front_contains_no_dominated_solution() {
    let mut opt = MultiObjectiveOptimizer::with_config(
        NsgaConfig {
            population_size: 20,
            generations: 5,
            ..NsgaConfig::default()
        },
        13,
    );
    opt.setup_standard_objectives();

    let front = opt.optimize(|actions, params| {
        let mut sol = Solution {
            actions: actions.to_vec(),
            parameters: params.clone(),
            ..Solution::default()
        };
        sol.total_time = actions.len() as f64 * 7.0;
        sol.accuracy = 0.5 + 0.1 * actions.len() as f64;
        sol.memory_usage = 2048 * actions.len() as i64;
        sol.cost = params
            .get("timeout_ms")
            .and_then(|v| v.as_f64())
            .unwrap_or(1.0);
        sol.objectives = vec![
            sol.total_time,
            sol.accuracy,
            sol.memory_usage as f64,
            sol.cost,
        ];
        sol
    });

    assert!(!front.is_empty());
    for a in &front {
        for b in &front {
            assert!(!textlab::optimizer::nsga::dominates(a, b, opt.objectives()));
        }
    }
}

#[test]
fn parameter_optimizer_reaches_high_fitness() {
    // Single float parameter x in [0,1], fitness = x. Median best over
    // 21 seeds after 10 generations should clear 0.8.
    let mut ranges = BTreeMap::new();
    ranges.insert(
        "x".to_string(),
        ParameterRange::Float {
            min: 0.0,
            max: 1.0,
            default: 0.5,
            step: None,
        },
    );

    let mut best_values = Vec::new();
    for seed in 0..21u64 {
        let mut opt = ParameterOptimizer::with_config(
            GaConfig {
                generations: 10,
                ..GaConfig::default()
            },
            seed,
        );
        let best = opt.optimize("linear", &ranges, |params| {
            params["x"].as_f64().unwrap_or(0.0)
        });
        best_values.push(best["x"].as_f64().unwrap());
    }

    best_values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let median = best_values[best_values.len() / 2];
    assert!(median >= 0.8, "median {median} below target");
}

#[test]
fn mixed_range_optimization_respects_types() {
    let mut ranges = BTreeMap::new();
    ranges.insert(
        "depth".to_string(),
        ParameterRange::Int {
            min: 1,
            max: 8,
            default: 4,
            step: Some(1),
        },
    );
    ranges.insert(
        "mode".to_string(),
        ParameterRange::Enum {
            options: vec!["fast".to_string(), "thorough".to_string()],
            default: "fast".to_string(),
        },
    );
    ranges.insert(
        "strict".to_string(),
        ParameterRange::Bool { default: false },
    );

    let mut opt = ParameterOptimizer::with_config(
        GaConfig {
            generations: 8,
            ..GaConfig::default()
        },
        5,
    );
    // Prefer deep, thorough, strict configurations.
    let best = opt.optimize("mixed", &ranges, |params| {
        let depth = params["depth"].as_i64().unwrap_or(0) as f64;
        let thorough = matches!(
            params.get("mode"),
            Some(textlab::types::ParamValue::Str(s)) if s == "thorough"
        );
        let strict = params["strict"].as_bool().unwrap_or(false);
        depth + if thorough { 5.0 } else { 0.0 } + if strict { 3.0 } else { 0.0 }
    });

    let depth = best["depth"].as_i64().unwrap();
    assert!((1..=8).contains(&depth));
    assert!(depth >= 6, "GA should find deep configs, got {depth}");
    assert_eq!(
        best.get("mode"),
        Some(&textlab::types::ParamValue::Str("thorough".to_string()))
    );
    assert_eq!(best["strict"].as_bool(), Some(true));
}

#[test]
fn nsga_convergence_metrics_are_recorded_per_generation() {
    let mut opt = MultiObjectiveOptimizer::with_config(
        NsgaConfig {
            population_size: 10,
            generations: 12,
            ..NsgaConfig::default()
        },
        3,
    );
    opt.setup_standard_objectives();

    opt.optimize(|actions, params| {
        let mut sol = Solution {
            actions: actions.to_vec(),
            parameters: params.clone(),
            ..Solution::default()
        };
        sol.total_time = 5.0;
        sol.accuracy = 0.9;
        sol.memory_usage = 1024;
        sol.cost = 2.0;
        sol.objectives = vec![5.0, 0.9, 1024.0, 2.0];
        sol
    });

    let convergence = opt.convergence_data();
    assert_eq!(convergence.len(), 12);
    for point in convergence {
        assert!(point.spread >= 0.0);
        assert!(point.pareto_front_size >= 1);
    }
    // Identical solutions: the front is stable, so late generations
    // report full convergence.
    assert_eq!(convergence[11].convergence, 1.0);
}
