use crate::evolution::grammar::{is_non_terminal, split_symbols, Grammar};
use crate::evolution::Genome;
use thiserror::Error;

/// Default hard bound on rewrite steps for a single derivation.
pub const DEFAULT_MAX_STEPS: usize = 100;

#[derive(Error, Debug, PartialEq)]
pub enum MappingError {
    #[error("Invalid grammar: non-terminal '{symbol}' has no production rules. Genome: {genome:?}")]
    UnknownSymbol { symbol: String, genome: Genome },
    #[error(
        "Derivation did not terminate within {max_steps} steps. Partial form: '{partial}'. Genome: {genome:?}"
    )]
    IncompleteExpansion {
        max_steps: usize,
        partial: String,
        genome: Genome,
    },
}

/// One entry of the sentential form being rewritten.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Symbol<'a> {
    Terminal(&'a str),
    NonTerminal(&'a str),
}

impl<'a> Symbol<'a> {
    fn from_token(token: &'a str) -> Self {
        if is_non_terminal(token) {
            Symbol::NonTerminal(token)
        } else {
            Symbol::Terminal(token)
        }
    }

    fn text(&self) -> &'a str {
        match self {
            Symbol::Terminal(s) | Symbol::NonTerminal(s) => s,
        }
    }
}

/// State of a single leftmost derivation.
struct MappingContext<'a> {
    /// Reference to the `Genome` being mapped
    genome: &'a Genome,
    /// Index of the next fresh codon; never wraps
    codon_idx: usize,
    /// Current sentential form
    form: Vec<Symbol<'a>>,
    /// Everything before `cursor` is terminal and will never be rewritten again
    cursor: usize,
    /// Rewrite steps applied so far
    steps: usize,
}

impl<'a> MappingContext<'a> {
    fn new(genome: &'a Genome, start: &'a str) -> Self {
        Self {
            genome,
            codon_idx: 0,
            form: split_symbols(start)
                .into_iter()
                .map(Symbol::from_token)
                .collect(),
            cursor: 0,
            steps: 0,
        }
    }

    /// Returns the next unused codon, or `None` once the genome is exhausted.
    fn next_codon(&mut self) -> Option<u32> {
        let codon = self.genome.get(self.codon_idx).copied()?;
        self.codon_idx += 1;
        Some(codon)
    }

    /// Moves the cursor onto the leftmost non-terminal and returns it.
    fn leftmost_non_terminal(&mut self) -> Option<&'a str> {
        while let Some(symbol) = self.form.get(self.cursor) {
            match *symbol {
                Symbol::NonTerminal(name) => return Some(name),
                Symbol::Terminal(_) => self.cursor += 1,
            }
        }
        None
    }

    /// Replaces the non-terminal under the cursor with `production`.
    ///
    /// Markers glued to terminals are split out so they are still rewritten.
    fn rewrite(&mut self, production: &'a [String]) {
        let replacement = production
            .iter()
            .flat_map(|t| split_symbols(t))
            .map(Symbol::from_token);
        self.form.splice(self.cursor..=self.cursor, replacement);
        self.steps += 1;
    }

    /// Space-joined rendering of the current form.
    fn render(&self) -> String {
        self.form
            .iter()
            .map(Symbol::text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Deterministic derivation engine turning a genome into a phenotype string.
///
/// Each step rewrites the leftmost non-terminal. While codons remain, the production is
/// `codon % productions.len()`; once the genome is exhausted the grammar's
/// termination-biased fallback is used instead. Codons are consumed in order and never reused.
#[derive(Clone)]
pub struct GenotypeMapper<'a> {
    /// The `Grammar` to be used for the mapping
    grammar: &'a Grammar,
    /// Hard bound on rewrite steps, the only guard against runaway expansion
    max_steps: usize,
}

impl<'a> GenotypeMapper<'a> {
    pub fn new(grammar: &'a Grammar, max_steps: usize) -> Self {
        Self { grammar, max_steps }
    }

    pub fn grammar(&self) -> &'a Grammar {
        self.grammar
    }

    /// Maps `genome` starting from the grammar's start symbol.
    pub fn map(&self, genome: &Genome) -> Result<String, MappingError> {
        self.map_from(genome, self.grammar.start_symbol())
    }

    /// Maps `genome` starting from an explicit `start` symbol.
    ///
    /// # Returns
    /// * `Ok(String)` - The whitespace-normalized phenotype, free of non-terminals
    /// * `Err(MappingError)` - `UnknownSymbol` for a symbol missing from the grammar,
    ///   `IncompleteExpansion` when `max_steps` runs out first
    pub fn map_from(&self, genome: &Genome, start: &str) -> Result<String, MappingError> {
        let mut context = MappingContext::new(genome, start);

        while context.steps < self.max_steps {
            let Some(non_terminal) = context.leftmost_non_terminal() else {
                break;
            };

            let productions = self
                .grammar
                .productions_for(non_terminal)
                .map_err(|_| MappingError::UnknownSymbol {
                    symbol: non_terminal.to_string(),
                    genome: genome.clone(),
                })?;
            if productions.is_empty() {
                return Err(MappingError::UnknownSymbol {
                    symbol: non_terminal.to_string(),
                    genome: genome.clone(),
                });
            }

            let choice = match context.next_codon() {
                Some(codon) => codon as usize % productions.len(),
                None => self.grammar.fallback_choice(non_terminal),
            };
            context.rewrite(&productions[choice]);
        }

        if context.leftmost_non_terminal().is_some() {
            return Err(MappingError::IncompleteExpansion {
                max_steps: self.max_steps,
                partial: context.render(),
                genome: genome.clone(),
            });
        }

        Ok(context.render())
    }
}
