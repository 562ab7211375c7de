//! Fixed topic-class taxonomy.
//!
//! Each class is described by a handful of keywords. An event's class
//! confidence is its mean similarity to the class keywords.

use serde::{Deserialize, Serialize};

/// A taxonomy class and its descriptor keywords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicClass {
    pub name: String,
    pub keywords: Vec<String>,
}

impl TopicClass {
    pub fn new(name: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// The built-in taxonomy.
pub fn default_taxonomy() -> Vec<TopicClass> {
    vec![
        TopicClass::new(
            "politics",
            &["election", "government", "policy", "democracy", "parliament"],
        ),
        TopicClass::new(
            "business",
            &["economy", "market", "finance", "trade", "industry"],
        ),
        TopicClass::new(
            "technology",
            &["innovation", "digital", "software", "internet", "tech"],
        ),
        TopicClass::new(
            "science",
            &["research", "discovery", "space", "climate", "biology"],
        ),
        TopicClass::new(
            "health",
            &["medical", "healthcare", "disease", "treatment", "medicine"],
        ),
        TopicClass::new(
            "sports",
            &["athletics", "tournament", "championship", "game", "match"],
        ),
        TopicClass::new(
            "entertainment",
            &["film", "music", "celebrity", "art", "culture"],
        ),
        TopicClass::new(
            "environment",
            &["climate", "sustainability", "pollution", "conservation", "energy"],
        ),
    ]
}

/// Default category vocabulary: the union of portal section names.
pub fn default_categories() -> Vec<String> {
    [
        "world",
        "politics",
        "business",
        "economy",
        "technology",
        "science",
        "health",
        "sport",
        "culture",
        "environment",
        "education",
        "travel",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
