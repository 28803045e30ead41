//! Query classification for model routing and analytics.
//!
//! [`QueryClassifier::features`] extracts the signals the selector's rules
//! test against. [`QueryClassifier::analyze`] adds the coarse labels
//! (language, complexity, intent, sentiment, topics) that are logged and
//! returned by the selection preview API. The labels never influence which
//! model is picked.

use regex::Regex;
use serde::Serialize;

/// Queries longer than this many characters are treated as complex.
pub const COMPLEX_QUERY_CHARS: usize = 200;

/// Queries shorter than this many characters are treated as simple.
pub const SIMPLE_QUERY_CHARS: usize = 50;

/// Signals consumed by the selection rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFeatures {
    pub char_len: usize,
    pub has_arabic: bool,
    pub has_latin: bool,
    pub looks_like_code: bool,
    pub analytical: bool,
    pub creative: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Arabic,
    English,
    Mixed,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Code,
    Analytical,
    Creative,
    Question,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// Coarse labels for one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryAnalysis {
    pub language: Language,
    pub complexity: Complexity,
    pub intent: Intent,
    pub sentiment: Sentiment,
    pub topics: Vec<String>,
}

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "love", "thanks", "thank", "awesome", "happy", "nice", "شكرا",
    "رائع", "جميل",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "hate", "awful", "broken", "angry", "sad", "wrong", "worst", "سيء",
];

const TOPICS: &[(&str, &[&str])] = &[
    (
        "programming",
        &["code", "function", "bug", "compile", "api", "rust", "python", "javascript"],
    ),
    ("science", &["physics", "chemistry", "biology", "science", "experiment"]),
    ("math", &["math", "equation", "calculate", "algebra", "integral"]),
    ("business", &["market", "business", "finance", "startup", "sales"]),
    ("health", &["health", "doctor", "medicine", "diet", "exercise"]),
    ("education", &["learn", "study", "school", "course", "teach"]),
    ("travel", &["travel", "trip", "flight", "hotel", "country", "capital"]),
];

/// Compiled patterns shared by all classifications.
pub struct QueryClassifier {
    code: Regex,
    analytical: Regex,
    creative: Regex,
    question: Regex,
}

impl QueryClassifier {
    pub fn new() -> Self {
        Self {
            code: Regex::new(
                r"(?x)
                ```
                | \b(?:function|class|def|import|const|let|var|return|async|await)\b
                | =>
                | \#include
                | \bpublic\s+static\b
                | (?i:\bselect\b.+\bfrom\b)
                ",
            )
            .expect("valid code regex"),
            analytical: Regex::new(r"(?i)\b(?:why|how|what|explain|compare|analy[sz]e)\b")
                .expect("valid analytical regex"),
            creative: Regex::new(r"(?i)\b(?:write|create|story|poem|imagine)\b")
                .expect("valid creative regex"),
            question: Regex::new(r"(?i)(?:[?؟]\s*$|^\s*(?:who|when|where|which|is|are|can|do|does)\b)")
                .expect("valid question regex"),
        }
    }

    /// Extract the signals used by the selection rules.
    pub fn features(&self, query: &str) -> QueryFeatures {
        QueryFeatures {
            char_len: query.chars().count(),
            has_arabic: query.chars().any(is_arabic),
            has_latin: query.chars().any(|c| c.is_ascii_alphabetic()),
            looks_like_code: self.code.is_match(query),
            analytical: self.analytical.is_match(query),
            creative: self.creative.is_match(query),
        }
    }

    /// Compute the analytics labels for a query.
    pub fn analyze(&self, query: &str) -> QueryAnalysis {
        self.analyze_features(query, &self.features(query))
    }

    /// Labels for `query` given its already extracted `features`.
    pub fn analyze_features(&self, query: &str, features: &QueryFeatures) -> QueryAnalysis {
        let language = match (features.has_arabic, features.has_latin) {
            (true, true) => Language::Mixed,
            (true, false) => Language::Arabic,
            (false, true) => Language::English,
            (false, false) => Language::Other,
        };

        let complexity = if features.char_len > COMPLEX_QUERY_CHARS || features.analytical {
            Complexity::Complex
        } else if features.char_len < SIMPLE_QUERY_CHARS {
            Complexity::Simple
        } else {
            Complexity::Moderate
        };

        let intent = if features.looks_like_code {
            Intent::Code
        } else if features.analytical {
            Intent::Analytical
        } else if features.creative {
            Intent::Creative
        } else if self.question.is_match(query) {
            Intent::Question
        } else {
            Intent::Chat
        };

        let words = lowercase_words(query);
        let positive = words.iter().filter(|w| POSITIVE_WORDS.contains(&w.as_str())).count();
        let negative = words.iter().filter(|w| NEGATIVE_WORDS.contains(&w.as_str())).count();
        let sentiment = match positive.cmp(&negative) {
            std::cmp::Ordering::Greater => Sentiment::Positive,
            std::cmp::Ordering::Less => Sentiment::Negative,
            std::cmp::Ordering::Equal => Sentiment::Neutral,
        };

        let topics = TOPICS
            .iter()
            .filter(|(_, keywords)| words.iter().any(|w| keywords.contains(&w.as_str())))
            .map(|(topic, _)| topic.to_string())
            .collect();

        QueryAnalysis {
            language,
            complexity,
            intent,
            sentiment,
            topics,
        }
    }
}

impl Default for QueryClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Arabic Unicode block (U+0600..U+06FF).
fn is_arabic(c: char) -> bool {
    ('\u{0600}'..='\u{06FF}').contains(&c)
}

fn lowercase_words(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arabic_detection() {
        let classifier = QueryClassifier::new();
        let f = classifier.features("ما هي عاصمة فرنسا؟");
        assert!(f.has_arabic);
        assert!(!f.has_latin);
        assert_eq!(classifier.analyze("ما هي عاصمة فرنسا؟").language, Language::Arabic);
    }

    #[test]
    fn test_mixed_language() {
        let classifier = QueryClassifier::new();
        let analysis = classifier.analyze("اشرح لي Rust ownership");
        assert_eq!(analysis.language, Language::Mixed);
    }

    #[test]
    fn test_analyze_features_uses_given_features() {
        let classifier = QueryClassifier::new();
        let query = "how do lifetimes work in rust";
        let features = classifier.features(query);
        assert_eq!(classifier.analyze_features(query, &features), classifier.analyze(query));

        let forced = QueryFeatures {
            looks_like_code: true,
            ..features
        };
        assert_eq!(classifier.analyze_features(query, &forced).intent, Intent::Code);
    }

    #[test]
    fn test_code_markers() {
        let classifier = QueryClassifier::new();
        assert!(classifier.features("```function foo() {}```").looks_like_code);
        assert!(classifier.features("const x = 1").looks_like_code);
        assert!(classifier.features("items.map(x => x * 2)").looks_like_code);
        assert!(classifier.features("SELECT id FROM users").looks_like_code);
        assert!(!classifier.features("hello there").looks_like_code);
    }

    #[test]
    fn test_keywords_match_whole_words_only() {
        let classifier = QueryClassifier::new();
        // "classic" and "showcase" contain keywords as substrings only.
        let f = classifier.features("a classic showcase");
        assert!(!f.looks_like_code);
        assert!(!f.analytical);
    }

    #[test]
    fn test_complexity_tiers() {
        let classifier = QueryClassifier::new();
        assert_eq!(classifier.analyze("hi").complexity, Complexity::Simple);
        let moderate = "tell me something interesting about the history of maps please";
        assert_eq!(classifier.analyze(moderate).complexity, Complexity::Moderate);
        let long = "a".repeat(COMPLEX_QUERY_CHARS + 1);
        assert_eq!(classifier.analyze(&long).complexity, Complexity::Complex);
    }

    #[test]
    fn test_intent_labels() {
        let classifier = QueryClassifier::new();
        assert_eq!(classifier.analyze("def main(): pass").intent, Intent::Code);
        assert_eq!(classifier.analyze("explain monads").intent, Intent::Analytical);
        assert_eq!(classifier.analyze("write a poem").intent, Intent::Creative);
        assert_eq!(classifier.analyze("is it raining?").intent, Intent::Question);
        assert_eq!(classifier.analyze("hi").intent, Intent::Chat);
    }

    #[test]
    fn test_sentiment_and_topics() {
        let classifier = QueryClassifier::new();
        let analysis = classifier.analyze("thanks, the python api docs are great");
        assert_eq!(analysis.sentiment, Sentiment::Positive);
        assert_eq!(analysis.topics, vec!["programming".to_string()]);

        let analysis = classifier.analyze("this flight was terrible");
        assert_eq!(analysis.sentiment, Sentiment::Negative);
        assert_eq!(analysis.topics, vec!["travel".to_string()]);
    }
}
