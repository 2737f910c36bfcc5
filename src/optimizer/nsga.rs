// src/optimizer/nsga.rs
//
// NSGA-II multi-objective optimizer over (action sequence, parameter map)
// solutions.
//
// The caller supplies the evaluation function; the optimizer handles
// non-dominated sorting, crowding distance, elitist selection, breeding,
// and per-generation convergence tracking. The "hypervolume" here is the
// product-of-objectives surrogate used consistently across generations,
// not a true hypervolume.

use std::sync::atomic::{AtomicBool, Ordering};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::types::{Action, Category, ParamMap, ParamValue};

/// Optimization direction for one objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Minimize,
    Maximize,
}

/// A registered objective.
#[derive(Serialize)]
pub struct Objective {
    pub name: String,
    pub direction: Direction,
    pub weight: f64,
    #[serde(skip)]
    pub evaluator: fn(&Solution) -> f64,
}

/// One candidate solution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Solution {
    pub actions: Vec<Action>,
    pub parameters: ParamMap,
    /// One value per registered objective; empty until evaluated.
    pub objectives: Vec<f64>,
    pub fitness: f64,
    /// 0 = first Pareto front.
    pub rank: usize,
    pub crowding_distance: f64,

    // Derived performance attributes filled by the evaluator.
    pub total_time: f64,
    pub accuracy: f64,
    pub memory_usage: i64,
    pub cache_hits: i64,
    pub cost: f64,
}

impl Solution {
    pub fn with_objectives(objectives: Vec<f64>) -> Self {
        Self {
            objectives,
            ..Solution::default()
        }
    }
}

/// Per-generation record kept in bounded history.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRecord {
    pub number: usize,
    pub population: Vec<Solution>,
    pub pareto_front: Vec<Solution>,
    pub best_fitness: f64,
    pub diversity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvergencePoint {
    pub generation: usize,
    pub hypervolume: f64,
    pub spread: f64,
    pub convergence: f64,
    pub pareto_front_size: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct NsgaConfig {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
}

impl Default for NsgaConfig {
    fn default() -> Self {
        Self {
            population_size: 100,
            generations: 200,
            mutation_rate: 0.1,
            crossover_rate: 0.8,
        }
    }
}

/// Retained generation-history depth.
const MAX_HISTORY: usize = 200;

pub struct MultiObjectiveOptimizer {
    objectives: Vec<Objective>,
    config: NsgaConfig,
    pareto_front: Vec<Solution>,
    generation_history: Vec<GenerationRecord>,
    convergence_data: Vec<ConvergencePoint>,
    prev_front_size: Option<usize>,
    rng: ChaCha8Rng,
}

impl MultiObjectiveOptimizer {
    pub fn new(seed: u64) -> Self {
        Self::with_config(NsgaConfig::default(), seed)
    }

    pub fn with_config(config: NsgaConfig, seed: u64) -> Self {
        Self {
            objectives: Vec::new(),
            config,
            pareto_front: Vec::new(),
            generation_history: Vec::new(),
            convergence_data: Vec::new(),
            prev_front_size: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn add_objective(&mut self, objective: Objective) {
        self.objectives.push(objective);
    }

    /// The standard objective set: execution time, accuracy, memory, cost.
    pub fn setup_standard_objectives(&mut self) {
        self.add_objective(Objective {
            name: "execution_time".to_string(),
            direction: Direction::Minimize,
            weight: 0.4,
            evaluator: |sol| sol.total_time,
        });
        self.add_objective(Objective {
            name: "accuracy".to_string(),
            direction: Direction::Maximize,
            weight: 0.3,
            evaluator: |sol| sol.accuracy,
        });
        self.add_objective(Objective {
            name: "memory_usage".to_string(),
            direction: Direction::Minimize,
            weight: 0.2,
            evaluator: |sol| sol.memory_usage as f64,
        });
        self.add_objective(Objective {
            name: "cost".to_string(),
            direction: Direction::Minimize,
            weight: 0.1,
            evaluator: |sol| sol.cost,
        });
    }

    /// Fill a solution's objective vector from the registered evaluators.
    /// Evaluation callbacks typically set the derived attributes, then
    /// call this.
    pub fn evaluate_objectives(&self, solution: &mut Solution) {
        solution.objectives = self
            .objectives
            .iter()
            .map(|obj| (obj.evaluator)(solution))
            .collect();
    }

    pub fn objectives(&self) -> &[Objective] {
        &self.objectives
    }

    pub fn pareto_front(&self) -> &[Solution] {
        &self.pareto_front
    }

    pub fn generation_history(&self) -> &[GenerationRecord] {
        &self.generation_history
    }

    pub fn convergence_data(&self) -> &[ConvergencePoint] {
        &self.convergence_data
    }

    /// Run the full optimization. `evaluate` is called for every solution
    /// whose objectives vector is still empty.
    pub fn optimize<F>(&mut self, evaluate: F) -> Vec<Solution>
    where
        F: FnMut(&[Action], &ParamMap) -> Solution,
    {
        let never = AtomicBool::new(false);
        self.optimize_until(evaluate, &never)
    }

    /// As `optimize`, but stops between generations once `cancel` is set.
    pub fn optimize_until<F>(&mut self, mut evaluate: F, cancel: &AtomicBool) -> Vec<Solution>
    where
        F: FnMut(&[Action], &ParamMap) -> Solution,
    {
        let mut population = self.initialize_population();

        for generation in 0..self.config.generations {
            if cancel.load(Ordering::Relaxed) {
                break;
            }

            for solution in &mut population {
                if solution.objectives.is_empty() {
                    *solution = evaluate(&solution.actions, &solution.parameters);
                }
            }

            let fronts = sort_into_fronts_impl(&mut population, &self.objectives);
            for front in &fronts {
                assign_crowding_distance(&mut population, front, self.objectives.len());
            }

            if let Some(first) = fronts.first() {
                self.pareto_front = first.iter().map(|&i| population[i].clone()).collect();
            }

            self.record_generation(generation, &population);

            population = self.next_generation(&population, &fronts);
        }

        self.pareto_front.clone()
    }

    fn initialize_population(&mut self) -> Vec<Solution> {
        (0..self.config.population_size)
            .map(|_| Solution {
                actions: self.random_actions(),
                parameters: self.random_parameters(),
                ..Solution::default()
            })
            .collect()
    }

    fn random_actions(&mut self) -> Vec<Action> {
        const NAMES: [&str; 5] = [
            "extract_entities",
            "analyze_readability",
            "extract_keywords",
            "detect_code",
            "sentiment_analysis",
        ];
        let count = self.rng.gen_range(1..=3usize);
        (0..count)
            .map(|_| {
                let name = NAMES[self.rng.gen_range(0..NAMES.len())];
                Action::new(name, Category::Analysis, 1)
            })
            .collect()
    }

    fn random_parameters(&mut self) -> ParamMap {
        let mut params = ParamMap::new();
        params.insert(
            "max_parallel".to_string(),
            ParamValue::Int(self.rng.gen_range(2..=7)),
        );
        params.insert(
            "timeout_ms".to_string(),
            ParamValue::Int(self.rng.gen_range(1_000..=5_000)),
        );
        params.insert("enable_caching".to_string(), ParamValue::Bool(true));
        params.insert(
            "cache_size".to_string(),
            ParamValue::Int(self.rng.gen_range(100..=1_000)),
        );
        params
    }

    fn record_generation(&mut self, generation: usize, population: &[Solution]) {
        let best_fitness = population
            .iter()
            .map(|s| s.fitness)
            .fold(f64::NEG_INFINITY, f64::max);
        let best_fitness = if best_fitness.is_finite() {
            best_fitness
        } else {
            0.0
        };

        self.generation_history.push(GenerationRecord {
            number: generation,
            population: population.to_vec(),
            pareto_front: self.pareto_front.clone(),
            best_fitness,
            diversity: average_finite_crowding(population),
        });
        if self.generation_history.len() > MAX_HISTORY {
            self.generation_history.remove(0);
        }

        let convergence = match self.prev_front_size {
            Some(prev) if generation >= 10 && prev > 0 => {
                1.0 - (self.pareto_front.len() as f64 - prev as f64).abs() / prev as f64
            }
            _ => 1.0,
        };
        self.prev_front_size = Some(self.pareto_front.len());

        self.convergence_data.push(ConvergencePoint {
            generation,
            hypervolume: hypervolume_surrogate(&self.pareto_front),
            spread: crowding_spread(&self.pareto_front),
            convergence,
            pareto_front_size: self.pareto_front.len(),
        });
    }

    /// Elitist survivor selection followed by generational breeding, as in
    /// canonical NSGA-II: fronts fill the parent pool (boundary front
    /// truncated by descending crowding distance), and the next population
    /// is bred from that pool.
    fn next_generation(&mut self, population: &[Solution], fronts: &[Vec<usize>]) -> Vec<Solution> {
        let mut parents: Vec<Solution> = Vec::with_capacity(self.config.population_size);

        for front in fronts {
            if parents.len() + front.len() <= self.config.population_size {
                parents.extend(front.iter().map(|&i| population[i].clone()));
            } else {
                let mut boundary: Vec<Solution> =
                    front.iter().map(|&i| population[i].clone()).collect();
                boundary.sort_by(|a, b| {
                    b.crowding_distance
                        .partial_cmp(&a.crowding_distance)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                let remaining = self.config.population_size - parents.len();
                parents.extend(boundary.into_iter().take(remaining));
                break;
            }
        }

        if parents.is_empty() {
            return Vec::new();
        }

        (0..self.config.population_size)
            .map(|_| {
                let parent1 = self.tournament(&parents).clone();
                let parent2 = self.tournament(&parents).clone();
                let mut child = self.crossover(&parent1, &parent2);
                self.mutate(&mut child);
                child
            })
            .collect()
    }

    /// Binary tournament: lower rank wins, ties broken by larger crowding
    /// distance.
    fn tournament<'a>(&mut self, pool: &'a [Solution]) -> &'a Solution {
        let a = &pool[self.rng.gen_range(0..pool.len())];
        let b = &pool[self.rng.gen_range(0..pool.len())];
        if compare_rank_crowding(a, b) == std::cmp::Ordering::Greater {
            a
        } else {
            b
        }
    }

    /// Uniform crossover: first action from each parent; numeric
    /// parameters average, everything else comes from parent 1.
    fn crossover(&mut self, parent1: &Solution, parent2: &Solution) -> Solution {
        let mut actions = Vec::new();
        if let Some(first) = parent1.actions.first() {
            actions.push(first.clone());
        }
        if let Some(first) = parent2.actions.first() {
            actions.push(first.clone());
        }

        let mut parameters = ParamMap::new();
        for (key, value1) in &parent1.parameters {
            let merged = match (value1, parent2.parameters.get(key)) {
                (ParamValue::Float(a), Some(ParamValue::Float(b))) => {
                    ParamValue::Float((a + b) / 2.0)
                }
                (ParamValue::Int(a), Some(ParamValue::Int(b))) => ParamValue::Int((a + b) / 2),
                _ => value1.clone(),
            };
            parameters.insert(key.clone(), merged);
        }

        Solution {
            actions,
            parameters,
            // Objectives are cleared so the child is re-evaluated.
            objectives: Vec::new(),
            ..Solution::default()
        }
    }

    /// Perturb numeric parameters by a small fixed factor, each with
    /// probability mutation_rate.
    fn mutate(&mut self, solution: &mut Solution) {
        let keys: Vec<String> = solution.parameters.keys().cloned().collect();
        for key in keys {
            if self.rng.gen::<f64>() >= self.config.mutation_rate {
                continue;
            }
            if let Some(value) = solution.parameters.get_mut(&key) {
                match value {
                    ParamValue::Float(v) => *v *= 1.1,
                    ParamValue::Int(v) => {
                        let variation = (*v / 10).max(1);
                        *v += variation - variation / 2;
                    }
                    _ => {}
                }
            }
        }
    }

    /// Results bundle for persistence and inspection.
    pub fn results(&self) -> serde_json::Value {
        serde_json::json!({
            "pareto_front": self.pareto_front,
            "convergence_data": self.convergence_data,
            "final_hypervolume": hypervolume_surrogate(&self.pareto_front),
            "final_spread": crowding_spread(&self.pareto_front),
            "objectives": self.objectives,
        })
    }
}

/// `a` dominates `b` iff it is no worse on every objective and strictly
/// better on at least one, with "better" respecting each direction.
pub fn dominates(a: &Solution, b: &Solution, objectives: &[Objective]) -> bool {
    let mut strictly_better = false;
    for (i, objective) in objectives.iter().enumerate() {
        let (va, vb) = match (a.objectives.get(i), b.objectives.get(i)) {
            (Some(va), Some(vb)) => (*va, *vb),
            _ => return false,
        };
        match objective.direction {
            Direction::Minimize => {
                if va > vb {
                    return false;
                }
                if va < vb {
                    strictly_better = true;
                }
            }
            Direction::Maximize => {
                if va < vb {
                    return false;
                }
                if va > vb {
                    strictly_better = true;
                }
            }
        }
    }
    strictly_better
}

impl MultiObjectiveOptimizer {
    /// Fast non-dominated sort. Assigns ranks in place and returns the
    /// fronts as index lists. Every solution lands in exactly one front.
    pub fn sort_into_fronts(&self, population: &mut [Solution]) -> Vec<Vec<usize>> {
        sort_into_fronts_impl(population, &self.objectives)
    }
}

fn sort_into_fronts_impl(population: &mut [Solution], objectives: &[Objective]) -> Vec<Vec<usize>> {
    let n = population.len();
    let mut domination_count = vec![0usize; n];
    let mut dominated: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut fronts: Vec<Vec<usize>> = Vec::new();

    let mut first_front = Vec::new();
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            if dominates(&population[i], &population[j], objectives) {
                dominated[i].push(j);
            } else if dominates(&population[j], &population[i], objectives) {
                domination_count[i] += 1;
            }
        }
        if domination_count[i] == 0 {
            population[i].rank = 0;
            first_front.push(i);
        }
    }

    if first_front.is_empty() {
        return fronts;
    }
    fronts.push(first_front);

    let mut k = 0;
    while k < fronts.len() {
        let mut next = Vec::new();
        for &p in &fronts[k] {
            for &q in &dominated[p] {
                domination_count[q] -= 1;
                if domination_count[q] == 0 {
                    population[q].rank = k + 1;
                    next.push(q);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        fronts.push(next);
        k += 1;
    }

    fronts
}

/// Crowding distance within one front.
///
/// Fronts of size <= 2 get all-infinite distances; larger fronts get the
/// standard per-objective normalized gap sum with infinite boundaries.
fn assign_crowding_distance(population: &mut [Solution], front: &[usize], num_objectives: usize) {
    if front.len() <= 2 {
        for &i in front {
            population[i].crowding_distance = f64::INFINITY;
        }
        return;
    }

    for &i in front {
        population[i].crowding_distance = 0.0;
    }

    let mut order: Vec<usize> = front.to_vec();
    for obj in 0..num_objectives {
        order.sort_by(|&a, &b| {
            let va = population[a].objectives.get(obj).copied().unwrap_or(0.0);
            let vb = population[b].objectives.get(obj).copied().unwrap_or(0.0);
            va.partial_cmp(&vb).unwrap_or(std::cmp::Ordering::Equal)
        });

        let first = order[0];
        let last = order[order.len() - 1];
        let v_min = population[first].objectives.get(obj).copied().unwrap_or(0.0);
        let v_max = population[last].objectives.get(obj).copied().unwrap_or(0.0);
        population[first].crowding_distance = f64::INFINITY;
        population[last].crowding_distance = f64::INFINITY;

        let span = v_max - v_min;
        if span <= 0.0 {
            continue;
        }
        for w in 1..order.len() - 1 {
            let prev = population[order[w - 1]].objectives.get(obj).copied().unwrap_or(0.0);
            let next = population[order[w + 1]].objectives.get(obj).copied().unwrap_or(0.0);
            let idx = order[w];
            if population[idx].crowding_distance.is_finite() {
                population[idx].crowding_distance += (next - prev) / span;
            }
        }
    }
}

fn compare_rank_crowding(a: &Solution, b: &Solution) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match b.rank.cmp(&a.rank) {
        Ordering::Equal => a
            .crowding_distance
            .partial_cmp(&b.crowding_distance)
            .unwrap_or(Ordering::Equal),
        other => other,
    }
}

/// Product-of-objectives surrogate, summed over the front.
fn hypervolume_surrogate(front: &[Solution]) -> f64 {
    front
        .iter()
        .map(|sol| sol.objectives.iter().product::<f64>())
        .sum()
}

/// Standard deviation of the finite crowding distances in the front.
fn crowding_spread(front: &[Solution]) -> f64 {
    let finite: Vec<f64> = front
        .iter()
        .map(|s| s.crowding_distance)
        .filter(|d| d.is_finite())
        .collect();
    if finite.is_empty() {
        return 0.0;
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    let variance = finite.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / finite.len() as f64;
    variance.sqrt()
}

fn average_finite_crowding(population: &[Solution]) -> f64 {
    let finite: Vec<f64> = population
        .iter()
        .map(|s| s.crowding_distance)
        .filter(|d| d.is_finite())
        .collect();
    if finite.is_empty() {
        return 0.0;
    }
    finite.iter().sum::<f64>() / finite.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_min_objectives() -> MultiObjectiveOptimizer {
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
            evaluator: |s| s.objectives.first().copied().unwrap_or(0.0),
        });
        opt.add_objective(Objective {
            name: "f2".to_string(),
            direction: Direction::Minimize,
            weight: 0.5,
            evaluator: |s| s.objectives.get(1).copied().unwrap_or(0.0),
        });
        opt
    }

    fn toy_population() -> Vec<Solution> {
        [
            (1.0, 5.0),
            (2.0, 3.0),
            (3.0, 2.0),
            (5.0, 1.0),
            (4.0, 4.0),
            (6.0, 6.0),
        ]
        .iter()
        .map(|&(f1, f2)| Solution::with_objectives(vec![f1, f2]))
        .collect()
    }

    #[test]
    fn toy_problem_front_membership() {
        let opt = two_min_objectives();
        let mut population = toy_population();
        let fronts = opt.sort_into_fronts(&mut population);

        let front0: Vec<(f64, f64)> = fronts[0]
            .iter()
            .map(|&i| (population[i].objectives[0], population[i].objectives[1]))
            .collect();
        for expected in [(1.0, 5.0), (2.0, 3.0), (3.0, 2.0), (5.0, 1.0)] {
            assert!(front0.contains(&expected), "missing {expected:?} in F0");
        }
        assert_eq!(fronts[0].len(), 4);

        // (4,4) is dominated only by F0 members; (6,6) also by (4,4).
        let rank_of = |f1: f64| {
            population
                .iter()
                .find(|s| s.objectives[0] == f1)
                .unwrap()
                .rank
        };
        assert_eq!(rank_of(4.0), 1);
        assert_eq!(rank_of(6.0), 2);
    }

    #[test]
    fn fronts_partition_the_population() {
        let opt = two_min_objectives();
        let mut population = toy_population();
        let fronts = opt.sort_into_fronts(&mut population);

        let mut seen = vec![false; population.len()];
        for front in &fronts {
            for &i in front {
                assert!(!seen[i], "solution {i} appears in two fronts");
                seen[i] = true;
            }
        }
        assert!(seen.iter().all(|&s| s), "some solution missing from fronts");
    }

    #[test]
    fn no_front_member_dominates_another() {
        let opt = two_min_objectives();
        let mut population = toy_population();
        let fronts = opt.sort_into_fronts(&mut population);

        for front in &fronts {
            for &a in front {
                for &b in front {
                    if a != b {
                        assert!(!dominates(
                            &population[a],
                            &population[b],
                            opt.objectives()
                        ));
                    }
                }
            }
        }
    }

    #[test]
    fn crowding_boundaries_are_infinite() {
        let opt = two_min_objectives();
        let mut population = toy_population();
        let fronts = opt.sort_into_fronts(&mut population);
        assign_crowding_distance(&mut population, &fronts[0], 2);

        let f0: Vec<&Solution> = fronts[0].iter().map(|&i| &population[i]).collect();
        let infinite = f0
            .iter()
            .filter(|s| s.crowding_distance.is_infinite())
            .count();
        // Both extremes on each of two objectives; the corner points
        // coincide, so exactly the two boundary solutions are infinite.
        assert!(infinite >= 2);
        let finite = f0
            .iter()
            .filter(|s| s.crowding_distance.is_finite())
            .count();
        assert_eq!(infinite + finite, 4);
    }

    #[test]
    fn small_front_gets_infinite_crowding() {
        let mut population = vec![
            Solution::with_objectives(vec![1.0, 1.0]),
            Solution::with_objectives(vec![2.0, 0.5]),
        ];
        let front = vec![0, 1];
        assign_crowding_distance(&mut population, &front, 2);
        assert!(population[0].crowding_distance.is_infinite());
        assert!(population[1].crowding_distance.is_infinite());
    }

    #[test]
    fn maximize_direction_inverts_domination() {
        let mut opt = MultiObjectiveOptimizer::new(1);
        opt.add_objective(Objective {
            name: "score".to_string(),
            direction: Direction::Maximize,
            weight: 1.0,
            evaluator: |s| s.objectives[0],
        });

        let high = Solution::with_objectives(vec![10.0]);
        let low = Solution::with_objectives(vec![1.0]);
        assert!(dominates(&high, &low, opt.objectives()));
        assert!(!dominates(&low, &high, opt.objectives()));
    }

    #[test]
    fn optimize_runs_and_tracks_convergence() {
        let mut opt = MultiObjectiveOptimizer::with_config(
            NsgaConfig {
                population_size: 12,
                generations: 15,
                ..NsgaConfig::default()
            },
            7,
        );
        opt.setup_standard_objectives();

        let front = opt.optimize(|actions, params| {
            let mut sol = Solution {
                actions: actions.to_vec(),
                parameters: params.clone(),
                ..Solution::default()
            };
            sol.total_time = actions.len() as f64 * 10.0;
            sol.accuracy = 1.0 / (1.0 + actions.len() as f64);
            sol.memory_usage = 1024 * actions.len() as i64;
            sol.cost = params
                .get("cache_size")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            sol.objectives = vec![
                sol.total_time,
                sol.accuracy,
                sol.memory_usage as f64,
                sol.cost,
            ];
            sol
        });

        assert!(!front.is_empty());
        assert_eq!(opt.convergence_data().len(), 15);
        // Early generations report full convergence by definition.
        assert_eq!(opt.convergence_data()[0].convergence, 1.0);
        assert!(!opt.generation_history().is_empty());
    }

    #[test]
    fn cancellation_stops_between_generations() {
        let mut opt = MultiObjectiveOptimizer::with_config(
            NsgaConfig {
                population_size: 8,
                generations: 1000,
                ..NsgaConfig::default()
            },
            3,
        );
        opt.setup_standard_objectives();

        let cancel = AtomicBool::new(true);
        let front = opt.optimize_until(
            |actions, params| {
                let mut sol = Solution {
                    actions: actions.to_vec(),
                    parameters: params.clone(),
                    ..Solution::default()
                };
                sol.objectives = vec![1.0, 1.0, 1.0, 1.0];
                sol
            },
            &cancel,
        );
        assert!(front.is_empty());
        assert!(opt.convergence_data().is_empty());
    }
}
