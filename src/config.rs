use crate::evaluation::expression::{Assignment, RESERVED_WORDS};
use crate::evaluation::fitness::DEFAULT_ALPHA;
use crate::evolution::grammar::{Grammar, GrammarError};
use crate::evolution::mapper::DEFAULT_MAX_STEPS;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub ga: GaConfig,
    pub grammar: GrammarConfig,
    /// Target truth values, one 0/1 entry per variable
    pub assignment: BTreeMap<String, u8>,
}

/// Parameters of the evolutionary run.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct GaConfig {
    pub population_size: usize,
    pub genotype_length: usize,
    pub num_generations: usize,
    pub elite_size: usize,
    pub mutation_rate: f64,
    /// Weight of the complexity penalty
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Hard bound on rewrite steps per derivation
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Codons are drawn from `0..=codon_max`
    #[serde(default = "default_codon_max")]
    pub codon_max: u32,
    /// Seed for reproducible runs; OS entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct GrammarConfig {
    pub variables: Vec<String>,
    #[serde(default = "default_binary_operators")]
    pub binary_operators: Vec<String>,
    #[serde(default = "default_unary_operators")]
    pub unary_operators: Vec<String>,
    /// Optional BNF file replacing the built-in Boolean grammar
    #[serde(default)]
    pub file: Option<String>,
}

fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}

fn default_codon_max() -> u32 {
    10
}

fn default_binary_operators() -> Vec<String> {
    vec!["AND".to_string(), "OR".to_string(), "XOR".to_string()]
}

fn default_unary_operators() -> Vec<String> {
    vec!["NOT".to_string()]
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Checks every run parameter before any evolution starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ga.validate()?;

        if self.grammar.variables.is_empty() {
            return Err(ConfigError::Invalid(
                "At least one variable is required".to_string(),
            ));
        }
        for variable in &self.grammar.variables {
            let well_formed = !variable.is_empty()
                && variable.chars().all(|c| c.is_alphanumeric() || c == '_');
            if !well_formed {
                return Err(ConfigError::Invalid(format!(
                    "Variable name '{}' must be alphanumeric",
                    variable
                )));
            }
            if RESERVED_WORDS.contains(&variable.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Variable name '{}' is a reserved operator or literal",
                    variable
                )));
            }
            if !self.assignment.contains_key(variable) {
                return Err(ConfigError::Invalid(format!(
                    "Variable '{}' has no assigned value",
                    variable
                )));
            }
        }
        if let Some((name, value)) = self.assignment.iter().find(|(_, v)| **v > 1) {
            return Err(ConfigError::Invalid(format!(
                "Variable '{}' must be assigned 0 or 1, got {}",
                name, value
            )));
        }
        Ok(())
    }

    /// The assignment as truth values, ready for the fitness evaluator.
    pub fn assignment(&self) -> Assignment {
        self.assignment
            .iter()
            .map(|(name, value)| (name.clone(), *value == 1))
            .collect()
    }

    /// Builds the grammar: the BNF file when configured, the Boolean grammar otherwise.
    ///
    /// Relative grammar paths are resolved against `base_dir`.
    pub fn build_grammar(&self, base_dir: &Path) -> Result<Grammar, GrammarError> {
        match &self.grammar.file {
            Some(file) => Grammar::new(&base_dir.join(file)),
            None => Grammar::boolean(
                self.grammar.variables.as_slice(),
                self.grammar.binary_operators.as_slice(),
                self.grammar.unary_operators.as_slice(),
            ),
        }
    }
}

impl GaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::Invalid(
                "Population size must be at least 1".to_string(),
            ));
        }
        if self.genotype_length == 0 {
            return Err(ConfigError::Invalid(
                "Genotype length must be at least 1".to_string(),
            ));
        }
        if self.num_generations == 0 {
            return Err(ConfigError::Invalid(
                "Number of generations must be at least 1".to_string(),
            ));
        }
        if self.elite_size == 0 || self.elite_size > self.population_size {
            return Err(ConfigError::Invalid(format!(
                "Elite size must be between 1 and the population size ({}), got {}",
                self.population_size, self.elite_size
            )));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(ConfigError::Invalid(
                "Mutation rate must be between 0 and 1".to_string(),
            ));
        }
        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(ConfigError::Invalid(
                "Alpha must be a finite, non-negative number".to_string(),
            ));
        }
        if self.max_steps == 0 {
            return Err(ConfigError::Invalid(
                "Max steps must be at least 1".to_string(),
            ));
        }
        if self.codon_max == 0 {
            return Err(ConfigError::Invalid(
                "Codon max must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
