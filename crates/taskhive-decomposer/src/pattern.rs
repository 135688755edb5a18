use crate::plan::ExecutionStrategy;
use std::sync::Arc;
use std::time::Duration;

/// Predicate deciding whether a pattern applies to a description.
#[derive(Clone)]
pub enum PatternMatcher {
    /// Case-insensitive substring match on any keyword.
    KeywordAny(Vec<String>),
    Custom(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl PatternMatcher {
    pub fn keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::KeywordAny(keywords.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, description: &str) -> bool {
        match self {
            PatternMatcher::KeywordAny(keywords) => {
                let lower = description.to_lowercase();
                keywords.iter().any(|k| lower.contains(&k.to_lowercase()))
            }
            PatternMatcher::Custom(predicate) => predicate(description),
        }
    }
}

impl std::fmt::Debug for PatternMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternMatcher::KeywordAny(keywords) => {
                f.debug_tuple("KeywordAny").field(keywords).finish()
            }
            PatternMatcher::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One subtask slot of a pattern. `depends_on` names other templates'
/// `local_id`s; under `Sequential` an empty list means "the previous
/// template".
#[derive(Debug, Clone)]
pub struct SubTaskTemplate {
    pub local_id: String,
    /// Action phrase, prefixed to the parent description at expansion.
    pub action: String,
    pub capability: String,
    pub depends_on: Vec<String>,
    pub estimated_duration: Duration,
}

impl SubTaskTemplate {
    pub fn new(
        local_id: impl Into<String>,
        action: impl Into<String>,
        capability: impl Into<String>,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            action: action.into(),
            capability: capability.into(),
            depends_on: Vec::new(),
            estimated_duration: Duration::from_secs(60),
        }
    }

    pub fn depends_on(mut self, deps: Vec<String>) -> Self {
        self.depends_on = deps;
        self
    }

    pub fn with_estimate(mut self, estimate: Duration) -> Self {
        self.estimated_duration = estimate;
        self
    }
}

/// A registered decomposition pattern. Patterns are tried in registration
/// order; the first match wins.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub id: String,
    pub matcher: PatternMatcher,
    pub strategy: ExecutionStrategy,
    pub templates: Vec<SubTaskTemplate>,
}

impl Pattern {
    pub fn new(
        id: impl Into<String>,
        matcher: PatternMatcher,
        strategy: ExecutionStrategy,
        templates: Vec<SubTaskTemplate>,
    ) -> Self {
        Self {
            id: id.into(),
            matcher,
            strategy,
            templates,
        }
    }

    pub fn matches(&self, description: &str) -> bool {
        self.matcher.matches(description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_matcher_case_insensitive() {
        let matcher = PatternMatcher::keywords(["research", "report"]);
        assert!(matcher.matches("Research the market"));
        assert!(matcher.matches("write a REPORT on X"));
        assert!(!matcher.matches("fix the login bug"));
    }

    #[test]
    fn test_custom_matcher() {
        let matcher = PatternMatcher::Custom(Arc::new(|d: &str| d.len() > 10));
        assert!(matcher.matches("a long description"));
        assert!(!matcher.matches("short"));
    }
}
