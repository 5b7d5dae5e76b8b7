use crate::evaluation::expression::{evaluate_expression, Assignment, ExpressionError};
use crate::evolution::grammar::find_marker;
use thiserror::Error;

/// Default weight of the complexity penalty.
pub const DEFAULT_ALPHA: f64 = 1.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitnessError {
    #[error("Phenotype still contains a non-terminal: '{0}'")]
    UnexpandedNonTerminal(String),
    #[error("Phenotype '{phenotype}' is not a valid Boolean expression: {source}")]
    InvalidExpression {
        phenotype: String,
        #[source]
        source: ExpressionError,
    },
}

/// Scores phenotypes against a fixed variable assignment.
///
/// `final_score = fitness - alpha * complexity`, where fitness is the 0/1 truth value of
/// the phenotype under the assignment.
#[derive(Debug, Clone)]
pub struct FitnessEvaluator<'a> {
    /// Externally supplied truth values, constant for the run
    assignment: &'a Assignment,
    /// Weight of the parsimony pressure
    alpha: f64,
}

impl<'a> FitnessEvaluator<'a> {
    pub fn new(assignment: &'a Assignment, alpha: f64) -> Self {
        Self { assignment, alpha }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Evaluates `phenotype` to 0 or 1.
    ///
    /// # Errors
    /// * `UnexpandedNonTerminal` - the phenotype still carries a `<...>` marker, which means
    ///   the mapper handed over an unfinished derivation
    /// * `InvalidExpression` - the phenotype does not parse under the Boolean grammar
    pub fn evaluate(&self, phenotype: &str) -> Result<u8, FitnessError> {
        if find_marker(phenotype).is_some() {
            return Err(FitnessError::UnexpandedNonTerminal(phenotype.to_string()));
        }

        match evaluate_expression(phenotype, self.assignment) {
            Ok(value) => Ok(value as u8),
            Err(ExpressionError::UnexpandedNonTerminal(_)) => {
                Err(FitnessError::UnexpandedNonTerminal(phenotype.to_string()))
            }
            Err(source) => Err(FitnessError::InvalidExpression {
                phenotype: phenotype.to_string(),
                source,
            }),
        }
    }

    /// Correctness reward minus the weighted complexity penalty.
    pub fn final_score(&self, phenotype: &str) -> Result<f64, FitnessError> {
        let fitness = self.evaluate(phenotype)? as f64;
        let penalty = complexity(phenotype) as f64;
        Ok(fitness - self.alpha * penalty)
    }
}

/// Structural size of a phenotype: the number of whitespace-separated tokens minus one.
pub fn complexity(phenotype: &str) -> usize {
    phenotype.split_whitespace().count().saturating_sub(1)
}
