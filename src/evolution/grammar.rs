use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Start symbol of the built-in Boolean grammar.
pub const DEFAULT_START_SYMBOL: &str = "<expr>";

#[derive(Error, Debug)]
pub enum GrammarError {
    #[error("Failed to read grammar file: {0}")]
    FileReadError(#[from] std::io::Error),
    #[error("Failed to parse rule on line: '{0}'")]
    ParseError(String),
    #[error("Grammar contains no rules")]
    EmptyGrammar,
    #[error("Non-terminal '{0}' has an empty production list")]
    EmptyProductions(String),
    #[error("Unknown non-terminal symbol: '{0}'")]
    UnknownSymbol(String),
    #[error("Undefined non-terminal referenced in grammar: '{0}'")]
    UndefinedNonTerminal(String),
    #[error("Unreachable rule in grammar: {0}")]
    UnreachableRule(String),
    #[error("Non-terminating rule in grammar: {0}")]
    NonTerminatingRule(String),
}

/// A context-free grammar, validated for logical consistency on construction.
///
/// Production order matters: a codon selects a production by index, so the same
/// genome maps differently under a reordered rule.
#[derive(Debug, Clone)]
pub struct Grammar {
    pub rules: HashMap<String, Vec<Vec<String>>>,
    start: String,
    /// Termination-biased production index per non-terminal, used once the genome runs out
    fallbacks: HashMap<String, usize>,
}

impl Grammar {
    /// Parses and validates a grammar from a `.bnf` file when creating a `Grammar` instance
    ///
    /// # Arguments
    /// * `path` - Reference to a `Path` struct representing the path to the user-specified grammar.
    ///
    /// # Returns
    /// * `Result<Self, GrammarError>` - A Result enum returning `Grammar` in the happy case, and
    /// `GrammarError` otherwise
    pub fn new(path: &Path) -> Result<Self, GrammarError> {
        let content = fs::read_to_string(path)?;
        Self::from_bnf(&content)
    }

    /// Parses BNF text of the form `<lhs> ::= a b | <c>`, one rule per line.
    /// Blank lines and lines starting with `#` are skipped. The left-hand side of the
    /// first rule becomes the start symbol.
    pub fn from_bnf(content: &str) -> Result<Self, GrammarError> {
        let mut rules = HashMap::new();
        let mut start = None;

        for line in content.lines() {
            if line.trim().starts_with('#') || line.trim().is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.split("::=").collect();
            if parts.len() != 2 {
                return Err(GrammarError::ParseError(line.to_string()));
            }
            let non_terminal = parts[0].trim().to_string();
            if !is_non_terminal(&non_terminal) {
                return Err(GrammarError::ParseError(line.to_string()));
            }

            let productions = parts[1]
                .split('|')
                .map(|p| p.split_whitespace().map(String::from).collect())
                .collect();

            start.get_or_insert_with(|| non_terminal.clone());
            rules.insert(non_terminal, productions);
        }

        let start = start.ok_or(GrammarError::EmptyGrammar)?;
        Self::from_rules(&start, rules)
    }

    /// Builds the default Boolean grammar:
    ///
    /// ```text
    /// <expr>   ::= <expr> <bin_op> <expr> | <un_op> <expr> | <term>
    /// <bin_op> ::= AND | OR | XOR
    /// <un_op>  ::= NOT
    /// <term>   ::= <variables...>
    /// ```
    pub fn boolean<S: AsRef<str>>(
        variables: &[S],
        binary_operators: &[S],
        unary_operators: &[S],
    ) -> Result<Self, GrammarError> {
        let alternatives = |items: &[S]| -> Vec<Vec<String>> {
            items.iter().map(|s| vec![s.as_ref().to_string()]).collect()
        };
        let symbols = |s: &str| -> Vec<String> { s.split_whitespace().map(String::from).collect() };

        let mut rules = HashMap::new();
        rules.insert(
            DEFAULT_START_SYMBOL.to_string(),
            vec![
                symbols("<expr> <bin_op> <expr>"),
                symbols("<un_op> <expr>"),
                symbols("<term>"),
            ],
        );
        rules.insert("<bin_op>".to_string(), alternatives(binary_operators));
        rules.insert("<un_op>".to_string(), alternatives(unary_operators));
        rules.insert("<term>".to_string(), alternatives(variables));

        Self::from_rules(DEFAULT_START_SYMBOL, rules)
    }

    /// Builds a grammar from an explicit rule table and validates it.
    ///
    /// Markers glued to terminals are split apart first, so a production symbol `(<expr>)`
    /// is stored as `(`, `<expr>`, `)`.
    pub fn from_rules(
        start: &str,
        rules: HashMap<String, Vec<Vec<String>>>,
    ) -> Result<Self, GrammarError> {
        let rules: HashMap<String, Vec<Vec<String>>> = rules
            .into_iter()
            .map(|(lhs, productions)| {
                let productions: Vec<Vec<String>> = productions
                    .iter()
                    .map(|production| {
                        production
                            .iter()
                            .flat_map(|symbol| split_symbols(symbol))
                            .map(String::from)
                            .collect()
                    })
                    .collect();
                (lhs, productions)
            })
            .collect();

        if rules.is_empty() {
            return Err(GrammarError::EmptyGrammar);
        }
        if !rules.contains_key(start) {
            return Err(GrammarError::UnknownSymbol(start.to_string()));
        }

        let mut grammar = Self {
            rules,
            start: start.to_string(),
            fallbacks: HashMap::new(),
        };
        grammar.validate()?; // Mandated validation pass
        grammar.fallbacks = grammar.compute_fallbacks();
        Ok(grammar)
    }

    /// The symbol derivations start from.
    pub fn start_symbol(&self) -> &str {
        &self.start
    }

    /// Returns the ordered production list for `non_terminal`.
    pub fn productions_for(&self, non_terminal: &str) -> Result<&[Vec<String>], GrammarError> {
        self.rules
            .get(non_terminal)
            .map(Vec::as_slice)
            .ok_or_else(|| GrammarError::UnknownSymbol(non_terminal.to_string()))
    }

    /// Production index to use for `non_terminal` once the genome is exhausted.
    pub fn fallback_choice(&self, non_terminal: &str) -> usize {
        self.fallbacks.get(non_terminal).copied().unwrap_or(0)
    }

    /// Checks if a given symbol is a non-terminal.
    pub fn is_non_terminal(&self, symbol: &str) -> bool {
        is_non_terminal(symbol)
    }

    /// Validates that all referenced non-terminals are defined, reachable from the
    /// start symbol, and able to terminate.
    ///
    /// # Returns
    /// * `Result<(), GrammarError>` - A Result enum returning a unit in the happy case, and
    /// `GrammarError` otherwise
    fn validate(&self) -> Result<(), GrammarError> {
        // 1. Check for empty alternatives lists and undefined non-terminals
        for (lhs, productions) in &self.rules {
            if productions.is_empty() {
                return Err(GrammarError::EmptyProductions(lhs.clone()));
            }
            for production in productions {
                for symbol in production {
                    if is_non_terminal(symbol) && !self.rules.contains_key(symbol) {
                        return Err(GrammarError::UndefinedNonTerminal(symbol.clone()));
                    }
                }
            }
        }

        // 2. Check for unreachable rules, BFS from the start symbol
        let mut reachable = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(self.start.clone());
        reachable.insert(self.start.clone());
        while let Some(current) = queue.pop_front() {
            if let Some(productions) = self.rules.get(&current) {
                for symbol in productions.iter().flatten() {
                    if is_non_terminal(symbol) && reachable.insert(symbol.clone()) {
                        queue.push_back(symbol.clone());
                    }
                }
            }
        }
        if let Some(rule) = self.rules.keys().find(|rule| !reachable.contains(*rule)) {
            return Err(GrammarError::UnreachableRule(rule.clone()));
        }

        // 3. Check for non-terminating rules (fixed point over "has a terminating production")
        let mut terminating: HashSet<&str> = HashSet::new();
        let mut changed = true;
        while changed {
            changed = false;
            for (lhs, productions) in &self.rules {
                if terminating.contains(lhs.as_str()) {
                    continue;
                }
                let terminates = productions.iter().any(|production| {
                    production
                        .iter()
                        .all(|s| !is_non_terminal(s) || terminating.contains(s.as_str()))
                });
                if terminates {
                    terminating.insert(lhs.as_str());
                    changed = true;
                }
            }
        }
        if let Some(rule) = self.rules.keys().find(|rule| !terminating.contains(rule.as_str())) {
            return Err(GrammarError::NonTerminatingRule(rule.clone()));
        }

        Ok(())
    }

    /// For every rule, the first production made of a single terminal-class symbol: a plain
    /// terminal, or a non-terminal whose productions are all terminal-only (like `<term>`).
    /// Rules without one fall back to production 0.
    fn compute_fallbacks(&self) -> HashMap<String, usize> {
        let terminal_only = |symbol: &str| {
            self.rules.get(symbol).is_some_and(|productions| {
                productions
                    .iter()
                    .all(|p| p.iter().all(|s| !is_non_terminal(s)))
            })
        };

        self.rules
            .iter()
            .map(|(lhs, productions)| {
                let choice = productions
                    .iter()
                    .position(|p| match p.as_slice() {
                        [symbol] => !is_non_terminal(symbol) || terminal_only(symbol),
                        _ => false,
                    })
                    .unwrap_or(0);
                (lhs.clone(), choice)
            })
            .collect()
    }
}

/// A symbol is a non-terminal when it has the form `<NAME>`; the degenerate `<>` is not one.
pub fn is_non_terminal(symbol: &str) -> bool {
    find_marker(symbol) == Some((0, symbol.len()))
}

/// Byte range of the first `<NAME>` marker in `text`, scanning left to right.
///
/// `NAME` must be non-empty and free of whitespace and angle brackets, so a lone `<` or
/// `<>` is never a marker.
pub fn find_marker(text: &str) -> Option<(usize, usize)> {
    let mut search = 0;
    while let Some(offset) = text[search..].find('<') {
        let start = search + offset;
        let close = text[start + 1..]
            .char_indices()
            .find(|&(_, c)| c == '<' || c == '>' || c.is_whitespace());
        match close {
            Some((len, '>')) if len > 0 => return Some((start, start + len + 2)),
            _ => search = start + 1,
        }
    }
    None
}

/// Splits one whitespace-free token into its terminal and marker pieces.
///
/// `(<expr>)` yields `(`, `<expr>`, `)`; a token without markers comes back whole.
pub fn split_symbols(token: &str) -> Vec<&str> {
    let mut symbols = Vec::new();
    let mut rest = token;
    while let Some((start, end)) = find_marker(rest) {
        if start > 0 {
            symbols.push(&rest[..start]);
        }
        symbols.push(&rest[start..end]);
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        symbols.push(rest);
    }
    symbols
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_valid_grammar_loads() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("good.bnf");
        let mut file = File::create(&file_path).unwrap();
        write!(file, "<start> ::= <A> | <B>\n<A> ::= 'a'\n<B> ::= 'b'").unwrap();
        let result = Grammar::new(&file_path);
        assert!(result.is_ok(), "Error is {:?}", result.unwrap_err());
        assert_eq!(result.unwrap().start_symbol(), "<start>");
    }

    #[test]
    fn test_undefined_non_terminal_error() {
        let result = Grammar::from_bnf("<start> ::= <undefined>");
        assert!(matches!(result, Err(GrammarError::UndefinedNonTerminal(s)) if s == "<undefined>"));
    }

    #[test]
    fn test_unreachable_rule_error() {
        let result = Grammar::from_bnf("<start> ::= x\n<orphan> ::= y");
        assert!(matches!(result, Err(GrammarError::UnreachableRule(s)) if s == "<orphan>"));
    }

    #[test]
    fn test_non_terminating_rule_error() {
        let result = Grammar::from_bnf("<start> ::= <loop>\n<loop> ::= <loop> x");
        assert!(matches!(result, Err(GrammarError::NonTerminatingRule(_))));
    }

    #[test]
    fn test_malformed_line_is_rejected() {
        let result = Grammar::from_bnf("<start> x y");
        assert!(matches!(result, Err(GrammarError::ParseError(_))));
        let result = Grammar::from_bnf("start ::= x");
        assert!(matches!(result, Err(GrammarError::ParseError(_))));
    }

    #[test]
    fn test_empty_grammar_is_rejected() {
        let result = Grammar::from_bnf("# nothing but a comment\n\n");
        assert!(matches!(result, Err(GrammarError::EmptyGrammar)));
    }

    #[test]
    fn test_boolean_grammar_structure() {
        let grammar = Grammar::boolean(&["A", "B"], &["AND", "OR", "XOR"], &["NOT"]).unwrap();
        assert_eq!(grammar.start_symbol(), "<expr>");

        let expr = grammar.productions_for("<expr>").unwrap();
        assert_eq!(expr.len(), 3);
        assert_eq!(expr[0], vec!["<expr>", "<bin_op>", "<expr>"]);
        assert_eq!(expr[1], vec!["<un_op>", "<expr>"]);
        assert_eq!(expr[2], vec!["<term>"]);

        let terms = grammar.productions_for("<term>").unwrap();
        assert_eq!(terms, &[vec!["A".to_string()], vec!["B".to_string()]]);
        assert_eq!(grammar.productions_for("<bin_op>").unwrap().len(), 3);
        assert_eq!(grammar.productions_for("<un_op>").unwrap().len(), 1);
    }

    #[test]
    fn test_productions_for_unknown_symbol() {
        let grammar = Grammar::boolean(&["A"], &["AND"], &["NOT"]).unwrap();
        let result = grammar.productions_for("<missing>");
        assert!(matches!(result, Err(GrammarError::UnknownSymbol(s)) if s == "<missing>"));
    }

    #[test]
    fn test_boolean_grammar_without_variables_is_rejected() {
        let no_vars: [&str; 0] = [];
        let result = Grammar::boolean(&no_vars, &["AND"], &["NOT"]);
        assert!(matches!(result, Err(GrammarError::EmptyProductions(s)) if s == "<term>"));
    }

    #[test]
    fn test_fallback_prefers_term_alternative() {
        let grammar = Grammar::boolean(&["A", "B"], &["AND", "OR", "XOR"], &["NOT"]).unwrap();
        // <expr> -> <term> sits at index 2
        assert_eq!(grammar.fallback_choice("<expr>"), 2);
        assert_eq!(grammar.fallback_choice("<term>"), 0);
        assert_eq!(grammar.fallback_choice("<bin_op>"), 0);
    }

    #[test]
    fn test_fallback_defaults_to_first_production() {
        let grammar = Grammar::from_bnf("<s> ::= <s> <t> | <t> <t>\n<t> ::= x").unwrap();
        // No single-symbol production exists for <s>
        assert_eq!(grammar.fallback_choice("<s>"), 0);
    }

    #[test]
    fn test_production_order_is_preserved() {
        let grammar = Grammar::from_bnf("<s> ::= c | a | b").unwrap();
        let productions = grammar.productions_for("<s>").unwrap();
        let flat: Vec<&str> = productions.iter().map(|p| p[0].as_str()).collect();
        assert_eq!(flat, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_project_grammar_file_loads() {
        let grammar = Grammar::new(Path::new("grammar.bnf")).expect("Failed to load grammar.bnf");
        assert_eq!(grammar.start_symbol(), "<expr>");
        assert!(grammar.rules.contains_key("<bin_op>"));
        assert!(grammar.rules.contains_key("<un_op>"));
        assert!(grammar.rules.contains_key("<term>"));
        let expr = grammar.productions_for("<expr>").unwrap();
        assert!(expr.iter().any(|p| p == &vec!["(", "<expr>", ")"]));
    }

    #[test]
    fn test_is_non_terminal() {
        assert!(is_non_terminal("<expr>"));
        assert!(!is_non_terminal("<>"));
        assert!(!is_non_terminal("AND"));
        assert!(!is_non_terminal("<expr"));
        assert!(!is_non_terminal("(<expr>)"));
        assert!(!is_non_terminal("<a b>"));
    }

    #[test]
    fn test_find_marker() {
        assert_eq!(find_marker("<expr>"), Some((0, 6)));
        assert_eq!(find_marker("(<s>)"), Some((1, 4)));
        assert_eq!(find_marker("A <> B"), None);
        assert_eq!(find_marker("<<t>"), Some((1, 4)));
        assert_eq!(find_marker("a < b > c"), None);
    }

    #[test]
    fn test_split_symbols() {
        assert_eq!(split_symbols("(<expr>)"), vec!["(", "<expr>", ")"]);
        assert_eq!(split_symbols("<a><b>"), vec!["<a>", "<b>"]);
        assert_eq!(split_symbols("NOT"), vec!["NOT"]);
        assert_eq!(split_symbols("<>"), vec!["<>"]);
        assert!(split_symbols("").is_empty());
    }

    #[test]
    fn test_glued_markers_become_separate_symbols() {
        let grammar = Grammar::from_bnf("<s> ::= (<s>) | A").unwrap();
        let productions = grammar.productions_for("<s>").unwrap();
        assert_eq!(productions[0], vec!["(", "<s>", ")"]);
        // The glued production is no longer a single-symbol candidate
        assert_eq!(grammar.fallback_choice("<s>"), 1);
    }

    #[test]
    fn test_glued_undefined_marker_is_rejected() {
        let result = Grammar::from_bnf("<s> ::= (<t>) | A");
        assert!(matches!(result, Err(GrammarError::UndefinedNonTerminal(s)) if s == "<t>"));
    }

    #[test]
    fn test_from_rules_splits_glued_markers() {
        let mut rules = HashMap::new();
        rules.insert(
            "<s>".to_string(),
            vec![vec!["NOT(<s>)".to_string()], vec!["A".to_string()]],
        );
        let grammar = Grammar::from_rules("<s>", rules).unwrap();
        assert_eq!(grammar.productions_for("<s>").unwrap()[0], vec!["NOT(", "<s>", ")"]);
    }
}
