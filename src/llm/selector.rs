//! Rule-based model selection.
//!
//! A query is matched against an ordered table of rules; the first rule
//! whose predicate holds decides the provider, model and sampling
//! parameters. The final rule always matches, so selection never fails.

use serde::{Deserialize, Serialize};

use super::analysis::{COMPLEX_QUERY_CHARS, QueryAnalysis, QueryClassifier, QueryFeatures};
use super::provider::ProviderKind;

/// Large general-purpose model served by Groq.
pub const GROQ_LARGE_MODEL: &str = "llama-3.3-70b-versatile";
/// Small low-latency model served by Groq.
pub const GROQ_FAST_MODEL: &str = "llama-3.1-8b-instant";
/// Code-specialized model served by Together.
pub const TOGETHER_CODE_MODEL: &str = "Qwen/Qwen2.5-Coder-32B-Instruct";
/// Large general-purpose model served by Together.
pub const TOGETHER_LARGE_MODEL: &str = "meta-llama/Llama-3.3-70B-Instruct-Turbo";

/// Concrete provider/model/parameter tuple for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub provider: ProviderKind,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ModelSelection {
    fn new(provider: ProviderKind, model: &str, temperature: f32, max_tokens: u32) -> Self {
        Self {
            provider,
            model: model.to_string(),
            temperature,
            max_tokens,
        }
    }
}

/// Optional caller overrides.
///
/// `provider` + `model` together bypass the rule table. `temperature` and
/// `max_tokens` replace the values of whatever selection was made.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectionHints {
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// One entry of the routing table.
pub struct SelectionRule {
    pub name: &'static str,
    pub matches: fn(&QueryFeatures) -> bool,
    pub selection: ModelSelection,
}

/// Outcome of a selection, including which rule fired.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionDecision {
    pub rule: &'static str,
    pub selection: ModelSelection,
    pub analysis: QueryAnalysis,
}

/// Routing table in priority order.
pub fn default_rules() -> Vec<SelectionRule> {
    vec![
        SelectionRule {
            name: "arabic",
            // Any Arabic character, which also covers mixed Arabic/Latin input.
            matches: |f| f.has_arabic,
            selection: ModelSelection::new(ProviderKind::Groq, GROQ_LARGE_MODEL, 0.7, 2048),
        },
        SelectionRule {
            name: "code",
            matches: |f| f.looks_like_code,
            selection: ModelSelection::new(ProviderKind::Together, TOGETHER_CODE_MODEL, 0.3, 4096),
        },
        SelectionRule {
            name: "complex",
            matches: |f| f.char_len > COMPLEX_QUERY_CHARS || f.analytical,
            selection: ModelSelection::new(ProviderKind::Groq, GROQ_LARGE_MODEL, 0.5, 4096),
        },
        SelectionRule {
            name: "creative",
            matches: |f| f.creative,
            selection: ModelSelection::new(ProviderKind::Together, TOGETHER_LARGE_MODEL, 0.9, 2048),
        },
        SelectionRule {
            name: "default",
            matches: |_| true,
            selection: ModelSelection::new(ProviderKind::Groq, GROQ_FAST_MODEL, 0.7, 1024),
        },
    ]
}

/// Maps free-text queries to a model configuration.
pub struct ModelSelector {
    classifier: QueryClassifier,
    rules: Vec<SelectionRule>,
    fallback: ModelSelection,
}

impl ModelSelector {
    /// Create a selector with the built-in routing table.
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    /// Create a selector with a custom routing table.
    ///
    /// If no rule matches a query the small Groq model is used.
    pub fn with_rules(rules: Vec<SelectionRule>) -> Self {
        Self {
            classifier: QueryClassifier::new(),
            rules,
            fallback: ModelSelection::new(ProviderKind::Groq, GROQ_FAST_MODEL, 0.7, 1024),
        }
    }

    /// Pick a model for `query`.
    pub fn select(&self, query: &str) -> ModelSelection {
        self.select_with_hints(query, &SelectionHints::default()).selection
    }

    /// Pick a model for `query`, honoring caller hints, and report the
    /// rule that decided and the query's analytics labels.
    pub fn select_with_hints(&self, query: &str, hints: &SelectionHints) -> SelectionDecision {
        let features = self.classifier.features(query);
        let analysis = self.classifier.analyze_features(query, &features);

        let (rule, mut selection) = match (hints.provider, hints.model.as_deref()) {
            (Some(provider), Some(model)) => {
                ("override", ModelSelection::new(provider, model, 0.7, 1024))
            }
            _ => self
                .rules
                .iter()
                .find(|rule| (rule.matches)(&features))
                .map(|rule| (rule.name, rule.selection.clone()))
                .unwrap_or(("fallback", self.fallback.clone())),
        };

        if let Some(temperature) = hints.temperature {
            selection.temperature = temperature.clamp(0.0, 1.0);
        }
        if let Some(max_tokens) = hints.max_tokens {
            selection.max_tokens = max_tokens.max(1);
        }

        tracing::debug!(
            rule,
            provider = %selection.provider,
            model = %selection.model,
            language = ?analysis.language,
            complexity = ?analysis.complexity,
            intent = ?analysis.intent,
            "Model selected"
        );

        SelectionDecision {
            rule,
            selection,
            analysis,
        }
    }

    /// Names of the rules in evaluation order.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }
}

impl Default for ModelSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn large_groq(temperature: f32, max_tokens: u32) -> ModelSelection {
        ModelSelection::new(ProviderKind::Groq, GROQ_LARGE_MODEL, temperature, max_tokens)
    }

    #[test]
    fn test_arabic_query_routes_to_groq_large() {
        let selector = ModelSelector::new();
        assert_eq!(selector.select("ما هي عاصمة فرنسا؟"), large_groq(0.7, 2048));
    }

    #[test]
    fn test_arabic_wins_regardless_of_length_or_code() {
        let selector = ModelSelector::new();
        let long = format!("{} ```function foo() {{}}``` why", "مرحبا ".repeat(60));
        let decision = selector.select_with_hints(&long, &SelectionHints::default());
        assert_eq!(decision.rule, "arabic");
        assert_eq!(decision.selection, large_groq(0.7, 2048));
    }

    #[test]
    fn test_fenced_code_routes_to_together_coder() {
        let selector = ModelSelector::new();
        assert_eq!(
            selector.select("```function foo() {}```"),
            ModelSelection::new(ProviderKind::Together, TOGETHER_CODE_MODEL, 0.3, 4096)
        );
    }

    #[test]
    fn test_long_analytical_question_is_complex() {
        let selector = ModelSelector::new();
        let mut query = String::from("why does the sky look blue during the day ");
        while query.chars().count() < 250 {
            query.push_str("and red at sunset ");
        }
        let query: String = query.chars().take(250).collect();
        let decision = selector.select_with_hints(&query, &SelectionHints::default());
        assert_eq!(decision.rule, "complex");
        assert_eq!(decision.selection, large_groq(0.5, 4096));
    }

    #[test]
    fn test_length_alone_triggers_complex() {
        let selector = ModelSelector::new();
        let query = "tell me about the weather ".repeat(10);
        assert!(query.chars().count() > COMPLEX_QUERY_CHARS);
        assert_eq!(selector.select(&query), large_groq(0.5, 4096));
    }

    #[test]
    fn test_creative_request_routes_to_together_large() {
        let selector = ModelSelector::new();
        assert_eq!(
            selector.select("write me a short poem about autumn"),
            ModelSelection::new(ProviderKind::Together, TOGETHER_LARGE_MODEL, 0.9, 2048)
        );
    }

    #[test]
    fn test_analytical_outranks_creative() {
        let selector = ModelSelector::new();
        let decision =
            selector.select_with_hints("explain and write a story", &SelectionHints::default());
        assert_eq!(decision.rule, "complex");
    }

    #[test]
    fn test_short_greeting_uses_default() {
        let selector = ModelSelector::new();
        assert_eq!(
            selector.select("hi"),
            ModelSelection::new(ProviderKind::Groq, GROQ_FAST_MODEL, 0.7, 1024)
        );
    }

    #[test]
    fn test_rule_order() {
        let selector = ModelSelector::new();
        assert_eq!(
            selector.rule_names(),
            vec!["arabic", "code", "complex", "creative", "default"]
        );
    }

    #[test]
    fn test_explicit_override_bypasses_rules() {
        let selector = ModelSelector::new();
        let hints = SelectionHints {
            provider: Some(ProviderKind::Together),
            model: Some("custom/model".to_string()),
            ..SelectionHints::default()
        };
        let decision = selector.select_with_hints("ما هي عاصمة فرنسا؟", &hints);
        assert_eq!(decision.rule, "override");
        assert_eq!(decision.selection.provider, ProviderKind::Together);
        assert_eq!(decision.selection.model, "custom/model");
    }

    #[test]
    fn test_parameter_hints_are_clamped() {
        let selector = ModelSelector::new();
        let hints = SelectionHints {
            temperature: Some(3.0),
            max_tokens: Some(0),
            ..SelectionHints::default()
        };
        let decision = selector.select_with_hints("hi", &hints);
        assert_eq!(decision.rule, "default");
        assert_eq!(decision.selection.temperature, 1.0);
        assert_eq!(decision.selection.max_tokens, 1);
    }

    #[test]
    fn test_empty_table_uses_fallback() {
        let selector = ModelSelector::with_rules(Vec::new());
        let decision = selector.select_with_hints("anything", &SelectionHints::default());
        assert_eq!(decision.rule, "fallback");
        assert_eq!(decision.selection.model, GROQ_FAST_MODEL);
    }
}
