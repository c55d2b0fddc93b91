//! Trigger-argument routing.
//!
//! A message is routed to the first enabled provider (in priority order)
//! whose trigger args appear among the message's whitespace-delimited words.

use std::collections::HashSet;

use chatai_providers::{ProviderKind, RegisteredProvider};

/// Minimum number of words a message needs to be considered at all.
pub const MIN_WORDS: usize = 2;

/// One routing entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub kind: ProviderKind,
    pub enabled: bool,
    pub args: Vec<String>,
}

impl Route {
    pub fn new(kind: ProviderKind, args: &[&str]) -> Self {
        Self {
            kind,
            enabled: true,
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn matches(&self, words: &[String]) -> bool {
        self.enabled && words.iter().any(|w| self.args.iter().any(|a| a == w))
    }
}

/// Ordered route table.
#[derive(Clone, Debug, Default)]
pub struct ProviderRouter {
    routes: Vec<Route>,
}

impl ProviderRouter {
    /// Build a router; routes are kept in provider priority order whatever
    /// order they were given in.
    pub fn new(mut routes: Vec<Route>) -> Self {
        routes.sort_by_key(|r| priority(r.kind));
        Self { routes }
    }

    pub fn from_registered(providers: &[RegisteredProvider]) -> Self {
        Self::new(
            providers
                .iter()
                .map(|p| Route {
                    kind: p.kind,
                    enabled: true,
                    args: p.args.clone(),
                })
                .collect(),
        )
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Pick the provider for a message's words.
    pub fn select(&self, words: &[String]) -> Option<ProviderKind> {
        if words.len() < MIN_WORDS {
            return None;
        }
        self.routes
            .iter()
            .find(|r| r.matches(words))
            .map(|r| r.kind)
    }

    /// Union of the trigger args of every enabled route.
    pub fn recognized_args(&self) -> HashSet<&str> {
        self.routes
            .iter()
            .filter(|r| r.enabled)
            .flat_map(|r| r.args.iter().map(String::as_str))
            .collect()
    }
}

fn priority(kind: ProviderKind) -> usize {
    ProviderKind::ALL
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    fn router() -> ProviderRouter {
        ProviderRouter::new(vec![
            Route::new(ProviderKind::NewBing, &["!bing", "!ask"]),
            Route::new(ProviderKind::Gemini, &["!gemini"]),
            Route::new(ProviderKind::ChatGpt, &["!gpt", "!ask"]),
        ])
    }

    #[test]
    fn test_routes_sorted_by_priority() {
        let kinds: Vec<_> = router().routes().iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![ProviderKind::ChatGpt, ProviderKind::Gemini, ProviderKind::NewBing]
        );
    }

    #[test]
    fn test_too_few_words_is_ignored() {
        assert_eq!(router().select(&words("!gpt")), None);
        assert_eq!(router().select(&[]), None);
    }

    #[test]
    fn test_earlier_priority_wins() {
        assert_eq!(
            router().select(&words("!ask what is 2+2")),
            Some(ProviderKind::ChatGpt)
        );
        assert_eq!(
            router().select(&words("!bing !gemini hello")),
            Some(ProviderKind::Gemini)
        );
    }

    #[test]
    fn test_trigger_can_appear_anywhere() {
        assert_eq!(
            router().select(&words("hello there !bing")),
            Some(ProviderKind::NewBing)
        );
    }

    #[test]
    fn test_whole_word_match_only() {
        assert_eq!(router().select(&words("!gptx hello")), None);
        assert_eq!(router().select(&words("no trigger here")), None);
    }

    #[test]
    fn test_disabled_route_is_skipped() {
        let mut gpt = Route::new(ProviderKind::ChatGpt, &["!ask"]);
        gpt.enabled = false;
        let router = ProviderRouter::new(vec![gpt, Route::new(ProviderKind::QWen, &["!ask"])]);
        assert_eq!(router.select(&words("!ask hi")), Some(ProviderKind::QWen));
        assert!(router.recognized_args().contains("!ask"));
        assert_eq!(router.recognized_args().len(), 1);
    }

    #[test]
    fn test_recognized_args_union() {
        let router = router();
        let args = router.recognized_args();
        for a in ["!bing", "!ask", "!gemini", "!gpt"] {
            assert!(args.contains(a));
        }
        assert_eq!(args.len(), 4);
    }
}
