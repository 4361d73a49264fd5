//! Comment filtering
//!
//! Picks the stored comments worth replying to. Runs after collection over
//! the comment records of a run:
//! - `FilterMode::Keyword` keeps comments asking about price, purchase or
//!   contact details
//! - `FilterMode::Question` keeps comments containing a question mark
//! - `FilterMode::HighLike` keeps comments liked more than the threshold
//! - `FilterMode::Any` keeps comments matching any of the above
//!
//! Comments containing a spam marker are dropped in every mode.

mod export;

pub use export::{filter_comment_file, load_records, write_records, FilterReport};

use crate::config::FilterConfig;
use crate::model::Record;
use crate::platform::parse_count;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

const REPLY_KEYWORDS: &[&str] = &[
    // price
    "多少钱", "价格", "多钱", "怎么卖",
    // where to buy
    "哪里买", "在哪买", "怎么买", "链接", "购买",
    // opinions
    "怎么样", "好用吗", "推荐吗", "值得吗",
    // questions
    "？", "?", "吗", "呢",
    // contact
    "微信", "联系", "私信",
];

const SPAM_MARKERS: &[&str] = &["互粉", "关注", "刷", "广告"];

/// Which comments a filter keeps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterMode {
    #[default]
    Keyword,
    Question,
    HighLike,
    Any,
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Keyword => "keyword",
            Self::Question => "question",
            Self::HighLike => "high-like",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

/// Keyword, question and popularity rules over comment records
#[derive(Debug, Clone)]
pub struct CommentFilter {
    keywords: Vec<String>,
    exclude_keywords: Vec<String>,
    min_likes: u64,
}

impl Default for CommentFilter {
    fn default() -> Self {
        Self {
            keywords: REPLY_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            exclude_keywords: SPAM_MARKERS.iter().map(|k| k.to_string()).collect(),
            min_likes: 10,
        }
    }
}

impl CommentFilter {
    /// Built-in rules extended with the configured keywords
    pub fn from_config(config: &FilterConfig) -> Self {
        let mut filter = Self {
            min_likes: config.min_likes,
            ..Self::default()
        };
        for keyword in &config.keywords {
            filter.add_keyword(keyword);
        }
        for keyword in &config.exclude_keywords {
            filter.add_exclude_keyword(keyword);
        }
        filter
    }

    pub fn add_keyword(&mut self, keyword: &str) {
        if !keyword.is_empty() && !self.keywords.iter().any(|k| k == keyword) {
            self.keywords.push(keyword.to_string());
        }
    }

    pub fn add_exclude_keyword(&mut self, keyword: &str) {
        if !keyword.is_empty() && !self.exclude_keywords.iter().any(|k| k == keyword) {
            self.exclude_keywords.push(keyword.to_string());
        }
    }

    pub fn is_spam(&self, content: &str) -> bool {
        self.exclude_keywords.iter().any(|k| content.contains(k.as_str()))
    }

    fn has_keyword(&self, content: &str) -> bool {
        self.keywords.iter().any(|k| content.contains(k.as_str()))
    }

    fn is_question(content: &str) -> bool {
        content.contains('？') || content.contains('?')
    }

    /// Whether one comment record passes `mode`
    pub fn matches(&self, record: &Record, mode: FilterMode) -> bool {
        let content = record.get("content").and_then(Value::as_str).unwrap_or_default();
        if self.is_spam(content) {
            return false;
        }
        let popular = || parse_count(record.get("like_count")) > self.min_likes;

        match mode {
            FilterMode::Keyword => self.has_keyword(content),
            FilterMode::Question => Self::is_question(content),
            FilterMode::HighLike => popular(),
            FilterMode::Any => self.has_keyword(content) || Self::is_question(content) || popular(),
        }
    }

    /// Records passing `mode`, in their original order
    pub fn apply(&self, records: &[Record], mode: FilterMode) -> Vec<Record> {
        records
            .iter()
            .filter(|r| self.matches(r, mode))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(content: &str, likes: Value) -> Record {
        match json!({"comment_id": content, "content": content, "like_count": likes}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn sample() -> Vec<Record> {
        vec![
            record("这个多少钱？", json!("5")),
            record("真好看", json!("2")),
            record("哪里可以买到？", json!(8)),
            record("互粉走一波", json!(0)),
            record("这个好用吗？", json!(15)),
            record("beautiful", json!(30)),
        ]
    }

    fn contents(records: &[Record]) -> Vec<&str> {
        records
            .iter()
            .filter_map(|r| r.get("content").and_then(Value::as_str))
            .collect()
    }

    #[test]
    fn test_keyword_mode() {
        let kept = CommentFilter::default().apply(&sample(), FilterMode::Keyword);
        assert_eq!(contents(&kept), vec!["这个多少钱？", "哪里可以买到？", "这个好用吗？"]);
    }

    #[test]
    fn test_question_mode() {
        let mut records = sample();
        records.push(record("why so cheap?", json!(0)));
        let kept = CommentFilter::default().apply(&records, FilterMode::Question);
        assert_eq!(
            contents(&kept),
            vec!["这个多少钱？", "哪里可以买到？", "这个好用吗？", "why so cheap?"]
        );
    }

    #[test]
    fn test_high_like_mode_reads_numbers_and_strings() {
        let kept = CommentFilter::default().apply(&sample(), FilterMode::HighLike);
        assert_eq!(contents(&kept), vec!["这个好用吗？", "beautiful"]);
    }

    #[test]
    fn test_any_mode_excludes_spam() {
        let mut records = sample();
        records.push(record("关注我？", json!(100)));
        let kept = CommentFilter::default().apply(&records, FilterMode::Any);
        assert_eq!(
            contents(&kept),
            vec!["这个多少钱？", "哪里可以买到？", "这个好用吗？", "beautiful"]
        );
    }

    #[test]
    fn test_configured_keywords_and_threshold() {
        let config = FilterConfig {
            enabled: true,
            mode: FilterMode::Keyword,
            keywords: vec!["beautiful".to_string()],
            exclude_keywords: vec!["真".to_string()],
            min_likes: 20,
        };
        let filter = CommentFilter::from_config(&config);

        assert!(filter.matches(&record("beautiful", json!(0)), FilterMode::Keyword));
        assert!(filter.is_spam("真好看"));
        assert!(!filter.matches(&record("这个好用吗？", json!(15)), FilterMode::HighLike));
        assert!(filter.matches(&record("beautiful", json!(30)), FilterMode::HighLike));
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(FilterMode::HighLike.to_string(), "high-like");
        let mode: FilterMode = serde_json::from_value(json!("high-like")).unwrap();
        assert_eq!(mode, FilterMode::HighLike);
    }
}
