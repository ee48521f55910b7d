//! Ordered rules for renaming Amplitude event types to PostHog event names.

use crate::types::PAGEVIEW_EVENT;

pub enum EventTypeMatcher {
    /// The whole event type equals the literal.
    Exact(String),
    /// The word appears, followed by a whitespace character and at least one
    /// more character, e.g. `Viewed Pricing`.
    WordThenText(String),
    Predicate(Box<dyn Fn(&str) -> bool + Send + Sync>),
}

impl EventTypeMatcher {
    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            Self::Exact(literal) => event_type == literal,
            Self::WordThenText(word) => word_then_text(event_type, word),
            Self::Predicate(predicate) => predicate(event_type),
        }
    }
}

fn word_then_text(event_type: &str, word: &str) -> bool {
    event_type.match_indices(word).any(|(start, _)| {
        let mut rest = event_type[start + word.len()..].chars();
        matches!(rest.next(), Some(c) if c.is_whitespace()) && rest.next().is_some()
    })
}

pub struct EventNameRule {
    pub matcher: EventTypeMatcher,
    pub replacement: String,
}

/// First matching rule wins; unmatched event types pass through unchanged.
pub struct EventNameRules {
    rules: Vec<EventNameRule>,
}

impl Default for EventNameRules {
    fn default() -> Self {
        Self::empty()
            .with_rule(
                EventTypeMatcher::Exact("view_page".to_string()),
                PAGEVIEW_EVENT,
            )
            .with_rule(
                EventTypeMatcher::WordThenText("Viewed".to_string()),
                PAGEVIEW_EVENT,
            )
    }
}

impl EventNameRules {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule; it is consulted after every existing rule.
    pub fn with_rule(mut self, matcher: EventTypeMatcher, replacement: &str) -> Self {
        self.rules.push(EventNameRule {
            matcher,
            replacement: replacement.to_string(),
        });
        self
    }

    /// Insert a rule ahead of every existing rule.
    pub fn with_priority_rule(mut self, matcher: EventTypeMatcher, replacement: &str) -> Self {
        self.rules.insert(
            0,
            EventNameRule {
                matcher,
                replacement: replacement.to_string(),
            },
        );
        self
    }

    pub fn rename<'a>(&'a self, event_type: &'a str) -> &'a str {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(event_type))
            .map(|rule| rule.replacement.as_str())
            .unwrap_or(event_type)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
