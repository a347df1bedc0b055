//! Keyword heuristics for query complexity and type
//!
//! Pure CPU logic, no model calls. Keyword checks are evaluated in priority
//! order and the first match wins, so the ordering of the rule blocks below is
//! part of the behaviour.

use super::{QueryComplexity, QueryType, Tier};

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Estimate token count as the mean of a word count and a chars/4 estimate
pub fn estimate_tokens(text: &str) -> usize {
    (word_count(text) + text.len() / 4) / 2
}

/// Classify how demanding a query is
pub fn classify_complexity(query: &str) -> QueryComplexity {
    let q = query.to_lowercase();
    let words = word_count(query);

    // Rule 1: design decisions and trade-offs
    if contains_any(
        &q,
        &[
            "architect",
            "design pattern",
            "trade-off",
            "best approach",
            "should i",
            "pros and cons",
        ],
    ) {
        return QueryComplexity::Expert;
    }

    // Rule 2: analysis, implementation, code work, or long queries
    if words > 15
        || contains_any(
            &q,
            &[
                "explain",
                "compare",
                "analyze",
                "implement",
                "refactor",
                "review",
                "code",
                "function",
                "bug",
                "error",
            ],
        )
    {
        return QueryComplexity::Complex;
    }

    // Rule 3: how/why questions and debugging
    if words > 10 || contains_any(&q, &["how", "why", "debug", "fix"]) {
        return QueryComplexity::Moderate;
    }

    // Rule 4: plain lookups
    if contains_any(&q, &["what is", "where is", "find", "list"]) {
        return QueryComplexity::Simple;
    }

    if words >= 5 {
        QueryComplexity::Moderate
    } else {
        QueryComplexity::Trivial
    }
}

/// Categorise a query by intent
pub fn classify_type(query: &str) -> QueryType {
    let q = query.to_lowercase();

    if contains_any(&q, &["what is", "syntax", "first "]) || q.starts_with("list ") {
        return QueryType::Lookup;
    }
    if contains_any(&q, &["explain", "how does", "why "]) {
        return QueryType::Explanation;
    }
    if contains_any(&q, &["write", "create", "implement", "generate"]) {
        return QueryType::CodeGeneration;
    }
    if contains_any(&q, &["refactor", "improve", "optimize"]) {
        return QueryType::Refactoring;
    }
    if contains_any(&q, &["architect", "design", "should i", "trade-off"]) {
        return QueryType::Architecture;
    }
    if contains_any(&q, &["bug", "fix", "debug", "error"]) {
        return QueryType::Debugging;
    }
    if contains_any(&q, &["review", "check"]) {
        return QueryType::Review;
    }
    if contains_any(&q, &["plan", "roadmap"]) {
        return QueryType::Planning;
    }

    QueryType::General
}

/// Coarse effort level from [`QueryAnalysis`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Effort {
    Low,
    Medium,
    High,
}

/// Content features of a query, used for diagnostics and tier hints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryAnalysis {
    pub token_count: usize,
    pub has_code: bool,
    pub has_math: bool,
    pub requires_reasoning: bool,
    pub effort: Effort,
}

const CODE_INDICATORS: &[&str] = &[
    "```", "function", "def ", "class ", "import ", "func ", "var ", "const ", "let ",
];

const MATH_INDICATORS: &[&str] = &[
    "=",
    "+",
    "-",
    "*",
    "/",
    "^",
    "sqrt",
    "sum",
    "integral",
    "derivative",
    "equation",
];

const REASONING_INDICATORS: &[&str] = &[
    "why", "how", "explain", "analyze", "compare", "evaluate", "consider", "reason",
];

impl QueryAnalysis {
    /// Inspect a query for code, math and reasoning markers
    pub fn analyze(query: &str) -> Self {
        let lower = query.to_lowercase();
        let token_count = estimate_tokens(query);
        // Code markers are case-sensitive ("Function" in prose is not code)
        let has_code = contains_any(query, CODE_INDICATORS);
        let has_math = contains_any(&lower, MATH_INDICATORS);
        let requires_reasoning = contains_any(&lower, REASONING_INDICATORS);

        let effort = if token_count > 500 || requires_reasoning {
            Effort::High
        } else if token_count > 100 || has_code {
            Effort::Medium
        } else {
            Effort::Low
        };

        Self {
            token_count,
            has_code,
            has_math,
            requires_reasoning,
            effort,
        }
    }

    /// Tier suggested by the content features alone
    pub fn recommended_tier(&self) -> Tier {
        match self.effort {
            Effort::High => Tier::Cloud,
            Effort::Medium if self.has_code => Tier::Cloud,
            Effort::Medium | Effort::Low => Tier::Local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expert_keywords_win_over_everything() {
        assert_eq!(
            classify_complexity("Should I use microservices?"),
            QueryComplexity::Expert
        );
        assert_eq!(
            classify_complexity("explain the trade-off between the two"),
            QueryComplexity::Expert
        );
    }

    #[test]
    fn test_complex_keywords_and_word_threshold() {
        assert_eq!(classify_complexity("fix this bug"), QueryComplexity::Complex);
        // 16 words with no keywords
        let long = "one two three four five six seven eight nine ten eleven twelve thirteen fourteen fifteen sixteen";
        assert_eq!(classify_complexity(long), QueryComplexity::Complex);
    }

    #[test]
    fn test_word_threshold_boundary_at_fifteen() {
        // 15 words: not > 15, but > 10 => Moderate
        let fifteen = "one two three four five six seven eight nine ten eleven twelve thirteen fourteen fifteen";
        assert_eq!(classify_complexity(fifteen), QueryComplexity::Moderate);
    }

    #[test]
    fn test_moderate_keywords() {
        assert_eq!(classify_complexity("how do I"), QueryComplexity::Moderate);
        assert_eq!(classify_complexity("why not"), QueryComplexity::Moderate);
    }

    #[test]
    fn test_simple_lookup() {
        assert_eq!(classify_complexity("what is rust"), QueryComplexity::Simple);
        assert_eq!(classify_complexity("list files"), QueryComplexity::Simple);
    }

    #[test]
    fn test_trivial_and_five_word_default() {
        assert_eq!(classify_complexity("hello"), QueryComplexity::Trivial);
        assert_eq!(classify_complexity(""), QueryComplexity::Trivial);
        assert_eq!(
            classify_complexity("tell me a nice story"),
            QueryComplexity::Moderate
        );
    }

    #[test]
    fn test_classify_type_priority_order() {
        assert_eq!(classify_type("what is a monad"), QueryType::Lookup);
        assert_eq!(classify_type("list the crates"), QueryType::Lookup);
        assert_eq!(classify_type("explain lifetimes"), QueryType::Explanation);
        assert_eq!(classify_type("write a parser"), QueryType::CodeGeneration);
        assert_eq!(classify_type("refactor this"), QueryType::Refactoring);
        assert_eq!(classify_type("design the schema"), QueryType::Architecture);
        assert_eq!(classify_type("debug the crash"), QueryType::Debugging);
        assert_eq!(classify_type("review my PR"), QueryType::Review);
        assert_eq!(classify_type("roadmap for Q3"), QueryType::Planning);
        assert_eq!(classify_type("hello there"), QueryType::General);
    }

    #[test]
    fn test_lookup_beats_code_generation() {
        // "what is" is checked before "write"
        assert_eq!(
            classify_type("what is the way to write a macro"),
            QueryType::Lookup
        );
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        // 2 words, 11 chars => (2 + 2) / 2 = 2
        assert_eq!(estimate_tokens("hello world"), 2);
    }

    #[test]
    fn test_analysis_flags_code() {
        let analysis = QueryAnalysis::analyze("```rust\nfn main() {}\n```");
        assert!(analysis.has_code);
        assert_eq!(analysis.effort, Effort::Medium);
        assert_eq!(analysis.recommended_tier(), Tier::Cloud);
    }

    #[test]
    fn test_analysis_reasoning_is_high_effort() {
        let analysis = QueryAnalysis::analyze("why is the sky blue");
        assert!(analysis.requires_reasoning);
        assert_eq!(analysis.effort, Effort::High);
    }

    #[test]
    fn test_analysis_plain_chat_stays_local() {
        let analysis = QueryAnalysis::analyze("good morning");
        assert_eq!(analysis.effort, Effort::Low);
        assert_eq!(analysis.recommended_tier(), Tier::Local);
    }
}
