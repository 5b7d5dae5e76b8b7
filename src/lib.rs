//! Grammar-guided genetic programming over Boolean expressions.
//!
//! Integer genomes are mapped to expressions through a context-free grammar
//! ([`evolution::mapper::GenotypeMapper`]), scored against a target truth assignment
//! ([`evaluation::fitness::FitnessEvaluator`]) and evolved by an elitist generational loop
//! ([`evolution::EvolutionEngine`]).

pub mod config;
pub mod evaluation;
pub mod evolution;
