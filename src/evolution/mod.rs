pub mod grammar;
pub mod mapper;

use crate::config::GaConfig;
use crate::evaluation::expression::Assignment;
use crate::evaluation::fitness::{FitnessError, FitnessEvaluator};
use crate::evolution::grammar::Grammar;
use crate::evolution::mapper::{GenotypeMapper, MappingError};
use log::{debug, info, warn};
use rand::prelude::*;
use thiserror::Error;

/// Sentinel score for individuals whose phenotype could not be produced or evaluated
const INFINITE_PENALTY: f64 = f64::NEG_INFINITY;

/// Alias within crate for genome representation
pub type Genome = Vec<u32>;

#[derive(Error, Debug)]
pub enum EvolutionError {
    #[error("Fatal mapping error: {0}")]
    Mapping(#[from] MappingError),
    #[error("Fatal evaluation error: {0}")]
    Fitness(#[from] FitnessError),
    #[error("Generation {generation} produced no viable individual")]
    NoViableIndividuals { generation: usize },
}

/// A genome paired with what it became during one generation's evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
    /// The codons this individual is made of
    pub genome: Genome,
    /// The derived expression, `None` when mapping or evaluation failed
    pub phenotype: Option<String>,
    /// `fitness - alpha * complexity`, or `f64::NEG_INFINITY` for failed individuals
    pub score: f64,
}

impl Individual {
    pub fn is_viable(&self) -> bool {
        self.phenotype.is_some()
    }
}

/// Failure counts of one `evaluate_population` pass.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct PopulationEvaluationReport {
    /// Individuals whose derivation hit the step bound
    pub mapping_failures: usize,
    /// Individuals whose phenotype did not parse as a Boolean expression
    pub invalid_expressions: usize,
}

impl PopulationEvaluationReport {
    pub fn failures(&self) -> usize {
        self.mapping_failures + self.invalid_expressions
    }
}

/// Drives the generational loop: map, score, keep the elites, refill with their mutants.
///
/// All randomness comes from the injected `rng`, so a seeded generator reproduces a run.
pub struct EvolutionEngine<'a, R: Rng> {
    /// Run parameters
    config: &'a GaConfig,
    /// Turns genomes into phenotypes
    mapper: GenotypeMapper<'a>,
    /// Scores phenotypes against the run's variable assignment
    evaluator: FitnessEvaluator<'a>,
    /// Current generation, replaced wholesale after every selection step
    population: Vec<Genome>,
    /// Sole source of randomness for initialization and mutation
    rng: R,
}

impl<'a, R: Rng> EvolutionEngine<'a, R> {
    /// Creates a new EvolutionEngine instance
    ///
    /// # Arguments
    /// * `config` - Reference to a `GaConfig` struct containing all the parameters required for the evolution.
    /// * `grammar` - Reference to the `Grammar` genomes are mapped with.
    /// * `assignment` - Truth values of the grammar's variables.
    /// * `rng` - Source of all randomness for initialization and mutation.
    pub fn new(
        config: &'a GaConfig,
        grammar: &'a Grammar,
        assignment: &'a Assignment,
        rng: R,
    ) -> Self {
        Self {
            config,
            mapper: GenotypeMapper::new(grammar, config.max_steps),
            evaluator: FitnessEvaluator::new(assignment, config.alpha),
            population: Vec::with_capacity(config.population_size),
            rng,
        }
    }

    pub fn population(&self) -> &[Genome] {
        &self.population
    }

    /// Runs `num_generations` generations and returns the elites of the last one,
    /// best first.
    ///
    /// # Errors
    /// * `Mapping` / `Fitness` - configuration or contract errors, fatal for the run
    /// * `NoViableIndividuals` - every individual of a generation failed to map or evaluate
    pub fn evolve(&mut self) -> Result<Vec<Individual>, EvolutionError> {
        info!(
            "Initializing population of size {}...",
            self.config.population_size
        );
        self.initialize_population();

        let mut generation = 0;
        loop {
            info!(
                "--- Starting Generation {}/{} ---",
                generation + 1,
                self.config.num_generations
            );

            let (evaluated, report) = self.evaluate_population()?;
            log_generation(generation, &evaluated, &report);

            let elites = select_elites(evaluated, self.config.elite_size);
            if elites.is_empty() {
                return Err(EvolutionError::NoViableIndividuals { generation });
            }

            generation += 1;
            if generation >= self.config.num_generations {
                info!("Evolution complete.");
                return Ok(elites);
            }

            self.reproduce(&elites);
        }
    }

    /// Fills the population with `population_size` genomes of `genotype_length` codons,
    /// each codon drawn uniformly from `0..=codon_max`.
    pub fn initialize_population(&mut self) {
        let codon_max = self.config.codon_max;
        let length = self.config.genotype_length;
        let rng = &mut self.rng;
        self.population = (0..self.config.population_size)
            .map(|_| (0..length).map(|_| rng.random_range(0..=codon_max)).collect())
            .collect();
    }

    /// Maps and scores every genome of the current population, in population order.
    ///
    /// Individuals that fail with `IncompleteExpansion` or an invalid expression are kept
    /// with the sentinel score and counted in the report.
    pub fn evaluate_population(
        &self,
    ) -> Result<(Vec<Individual>, PopulationEvaluationReport), EvolutionError> {
        let mut report = PopulationEvaluationReport::default();
        let mut evaluated = Vec::with_capacity(self.population.len());

        for genome in &self.population {
            let individual = match self.evaluate_genome(genome) {
                Ok((phenotype, score)) => Individual {
                    genome: genome.clone(),
                    phenotype: Some(phenotype),
                    score,
                },
                Err(EvolutionError::Mapping(e @ MappingError::IncompleteExpansion { .. })) => {
                    debug!("Mapping failed: {}. Assigning catastrophic fitness.", e);
                    report.mapping_failures += 1;
                    failed(genome)
                }
                Err(EvolutionError::Fitness(e @ FitnessError::InvalidExpression { .. })) => {
                    debug!("Evaluation failed: {}. Assigning catastrophic fitness.", e);
                    report.invalid_expressions += 1;
                    failed(genome)
                }
                Err(fatal) => return Err(fatal),
            };
            evaluated.push(individual);
        }

        Ok((evaluated, report))
    }

    fn evaluate_genome(&self, genome: &Genome) -> Result<(String, f64), EvolutionError> {
        let phenotype = self.mapper.map(genome)?;
        let score = self.evaluator.final_score(&phenotype)?;
        Ok((phenotype, score))
    }

    /// Replaces the population with the elites' genomes followed by mutants of elites
    /// picked uniformly at random, up to `population_size`.
    pub fn reproduce(&mut self, elites: &[Individual]) {
        let mut next_generation: Vec<Genome> = elites
            .iter()
            .take(self.config.population_size)
            .map(|elite| elite.genome.clone())
            .collect();

        while next_generation.len() < self.config.population_size {
            let Some(parent) = elites.choose(&mut self.rng) else {
                warn!("reproduce called without elites, keeping the current population");
                return;
            };
            let child = self.mutate(&parent.genome);
            next_generation.push(child);
        }

        self.population = next_generation;
    }

    /// Mutates a copy of `genome` with the configured per-codon `mutation_rate`.
    pub fn mutate(&mut self, genome: &Genome) -> Genome {
        mutate_genome(
            genome,
            self.config.mutation_rate,
            self.config.codon_max,
            &mut self.rng,
        )
    }
}

fn failed(genome: &Genome) -> Individual {
    Individual {
        genome: genome.clone(),
        phenotype: None,
        score: INFINITE_PENALTY,
    }
}

fn log_generation(generation: usize, evaluated: &[Individual], report: &PopulationEvaluationReport) {
    let viable: Vec<f64> = evaluated
        .iter()
        .filter(|ind| ind.is_viable())
        .map(|ind| ind.score)
        .collect();
    let best = viable.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = if viable.is_empty() {
        f64::NAN
    } else {
        viable.iter().sum::<f64>() / viable.len() as f64
    };

    info!(
        "Gen {}: Best Score={:.4} | Mean Score={:.4} | Mapping Fails={} | Invalid Exprs={}",
        generation + 1,
        best,
        mean,
        report.mapping_failures,
        report.invalid_expressions
    );
    if report.failures() > 0 {
        warn!(
            "Gen {}: {} of {} individuals excluded from selection",
            generation + 1,
            report.failures(),
            evaluated.len()
        );
    }
}

/// Keeps the `k` best viable individuals.
///
/// The sort is stable, so individuals with equal scores keep their evaluation order.
pub fn select_elites(evaluated: Vec<Individual>, k: usize) -> Vec<Individual> {
    let mut viable: Vec<Individual> = evaluated
        .into_iter()
        .filter(Individual::is_viable)
        .collect();
    viable.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    viable.truncate(k);
    viable
}

/// Per-Gene-Probabilistic mutation with random resetting.
///
/// Each codon is independently redrawn from `0..=codon_max` with probability `mutation_rate`.
/// The parent is left untouched.
pub fn mutate_genome<R: Rng>(
    parent: &[u32],
    mutation_rate: f64,
    codon_max: u32,
    rng: &mut R,
) -> Genome {
    parent
        .iter()
        .map(|&gene| {
            if rng.random::<f64>() < mutation_rate {
                rng.random_range(0..=codon_max)
            } else {
                gene
            }
        })
        .collect()
}
