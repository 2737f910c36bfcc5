// src/optimizer/params.rs
//
// Genetic optimizer for one function's parameter map.
//
// Elitism keeps the top tenth of each generation; the rest is bred with
// k=3 tournament selection, uniform per-key crossover, and per-key
// mutation that resamples from the declared range.

use std::collections::{BTreeMap, HashMap};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::types::{ParamMap, ParamValue, ParameterRange};

const TOURNAMENT_SIZE: usize = 3;

/// GA hyperparameters.
#[derive(Debug, Clone, Copy)]
pub struct GaConfig {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            population_size: 20,
            generations: 50,
            mutation_rate: 0.1,
            crossover_rate: 0.7,
        }
    }
}

/// Snapshot of one generation, kept per optimized function.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterGeneration {
    pub generation: usize,
    pub population: Vec<ParamMap>,
    pub fitness: Vec<f64>,
    pub best_params: ParamMap,
    pub best_fitness: f64,
}

pub struct ParameterOptimizer {
    config: GaConfig,
    rng: ChaCha8Rng,
    best_parameters: HashMap<String, ParamMap>,
    history: HashMap<String, Vec<ParameterGeneration>>,
}

impl ParameterOptimizer {
    pub fn new(seed: u64) -> Self {
        Self::with_config(GaConfig::default(), seed)
    }

    pub fn with_config(config: GaConfig, seed: u64) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            best_parameters: HashMap::new(),
            history: HashMap::new(),
        }
    }

    /// Run the GA and return the best parameter map found in the final
    /// generation. Higher fitness wins.
    pub fn optimize<F>(
        &mut self,
        function_name: &str,
        ranges: &BTreeMap<String, ParameterRange>,
        mut fitness_fn: F,
    ) -> ParamMap
    where
        F: FnMut(&ParamMap) -> f64,
    {
        let mut population = self.initialize_population(ranges);

        for generation in 0..self.config.generations {
            let fitness: Vec<f64> = population.iter().map(|p| fitness_fn(p)).collect();

            let best_idx = argmax(&fitness);
            self.history
                .entry(function_name.to_string())
                .or_default()
                .push(ParameterGeneration {
                    generation,
                    population: population.clone(),
                    fitness: fitness.clone(),
                    best_params: population[best_idx].clone(),
                    best_fitness: fitness[best_idx],
                });

            population = self.evolve(&population, &fitness, ranges);
        }

        let best = self.select_best(&population, &mut fitness_fn);
        self.best_parameters
            .insert(function_name.to_string(), best.clone());
        best
    }

    pub fn best_parameters(&self, function_name: &str) -> Option<&ParamMap> {
        self.best_parameters.get(function_name)
    }

    pub fn history(&self, function_name: &str) -> Option<&[ParameterGeneration]> {
        self.history.get(function_name).map(|h| h.as_slice())
    }

    fn initialize_population(&mut self, ranges: &BTreeMap<String, ParameterRange>) -> Vec<ParamMap> {
        (0..self.config.population_size)
            .map(|_| {
                ranges
                    .iter()
                    .map(|(name, range)| (name.clone(), self.random_value(range)))
                    .collect()
            })
            .collect()
    }

    /// Sample a value from a range. Unrecognized shapes fall back to the
    /// declared default.
    fn random_value(&mut self, range: &ParameterRange) -> ParamValue {
        match range {
            ParameterRange::Int { min, max, .. } if max >= min => {
                ParamValue::Int(self.rng.gen_range(*min..=*max))
            }
            ParameterRange::Float { min, max, .. } if max > min => {
                ParamValue::Float(self.rng.gen_range(*min..*max))
            }
            ParameterRange::Bool { .. } => ParamValue::Bool(self.rng.gen_bool(0.5)),
            ParameterRange::Enum { options, .. } if !options.is_empty() => {
                ParamValue::Str(options[self.rng.gen_range(0..options.len())].clone())
            }
            _ => range.default_value(),
        }
    }

    fn evolve(
        &mut self,
        population: &[ParamMap],
        fitness: &[f64],
        ranges: &BTreeMap<String, ParameterRange>,
    ) -> Vec<ParamMap> {
        let mut next = Vec::with_capacity(self.config.population_size);

        // Elitism: top tenth carried over unchanged.
        let elite_count = self.config.population_size / 10;
        let ranked = sort_indices_by_fitness(fitness);
        for &idx in ranked.iter().take(elite_count) {
            next.push(population[idx].clone());
        }

        while next.len() < self.config.population_size {
            let parent1 = self.tournament(population, fitness);
            let parent2 = self.tournament(population, fitness);
            let mut child = self.crossover(parent1, parent2, ranges);
            self.mutate(&mut child, ranges);
            next.push(child);
        }

        next
    }

    fn tournament<'a>(&mut self, population: &'a [ParamMap], fitness: &[f64]) -> &'a ParamMap {
        let mut best_idx = self.rng.gen_range(0..population.len());
        for _ in 1..TOURNAMENT_SIZE {
            let idx = self.rng.gen_range(0..population.len());
            if fitness[idx] > fitness[best_idx] {
                best_idx = idx;
            }
        }
        &population[best_idx]
    }

    /// Uniform per-key crossover: each key takes parent1's value with
    /// probability crossover_rate, else parent2's.
    fn crossover(
        &mut self,
        parent1: &ParamMap,
        parent2: &ParamMap,
        ranges: &BTreeMap<String, ParameterRange>,
    ) -> ParamMap {
        let mut child = ParamMap::new();
        for (name, range) in ranges {
            let value = if self.rng.gen::<f64>() < self.config.crossover_rate {
                parent1.get(name)
            } else {
                parent2.get(name)
            };
            let value = value
                .cloned()
                .unwrap_or_else(|| range.default_value());
            child.insert(name.clone(), value);
        }
        child
    }

    /// Per-key mutation: resample from the range with probability
    /// mutation_rate.
    fn mutate(&mut self, individual: &mut ParamMap, ranges: &BTreeMap<String, ParameterRange>) {
        for (name, range) in ranges {
            if self.rng.gen::<f64>() < self.config.mutation_rate {
                individual.insert(name.clone(), self.random_value(range));
            }
        }
    }

    fn select_best<F>(&self, population: &[ParamMap], fitness_fn: &mut F) -> ParamMap
    where
        F: FnMut(&ParamMap) -> f64,
    {
        let mut best = population[0].clone();
        let mut best_fitness = fitness_fn(&best);
        for individual in &population[1..] {
            let fitness = fitness_fn(individual);
            if fitness > best_fitness {
                best_fitness = fitness;
                best = individual.clone();
            }
        }
        best
    }
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

fn sort_indices_by_fitness(fitness: &[f64]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..fitness.len()).collect();
    indices.sort_by(|&a, &b| {
        fitness[b]
            .partial_cmp(&fitness[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    indices
}

/// Parameter ranges for the catalog functions that expose tunables.
pub fn catalog_parameter_ranges() -> HashMap<String, BTreeMap<String, ParameterRange>> {
    let mut ranges = HashMap::new();

    let mut extract_entities = BTreeMap::new();
    extract_entities.insert(
        "confidence_threshold".to_string(),
        ParameterRange::Float {
            min: 0.1,
            max: 0.9,
            default: 0.5,
            step: Some(0.1),
        },
    );
    extract_entities.insert(
        "max_entities".to_string(),
        ParameterRange::Int {
            min: 10,
            max: 1000,
            default: 100,
            step: Some(10),
        },
    );
    ranges.insert("extract_entities".to_string(), extract_entities);

    let mut analyze_readability = BTreeMap::new();
    analyze_readability.insert(
        "include_advanced".to_string(),
        ParameterRange::Bool { default: false },
    );
    analyze_readability.insert(
        "sample_size".to_string(),
        ParameterRange::Int {
            min: 100,
            max: 10_000,
            default: 1_000,
            step: Some(100),
        },
    );
    ranges.insert("analyze_readability".to_string(), analyze_readability);

    let mut summarize_text = BTreeMap::new();
    summarize_text.insert(
        "min_sentence_length".to_string(),
        ParameterRange::Int {
            min: 5,
            max: 50,
            default: 10,
            step: Some(5),
        },
    );
    summarize_text.insert(
        "delimiter_style".to_string(),
        ParameterRange::Enum {
            options: vec![
                "standard".to_string(),
                "aggressive".to_string(),
                "conservative".to_string(),
            ],
            default: "standard".to_string(),
        },
    );
    ranges.insert("summarize_text".to_string(), summarize_text);

    ranges
}
