//! Picks the one widget instance that polls on behalf of its siblings.

use log::debug;

/// What one widget instance exposes to its siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sibling {
    pub identifier: String,
    pub token: String,
}

/// Accessor for every instance of this widget on the dashboard, in dashboard order.
pub trait SiblingDirectory {
    fn siblings(&self) -> &[Sibling];
}

/// Fixed list of siblings captured when the dashboard is assembled.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    siblings: Vec<Sibling>,
}

impl Roster {
    pub fn new(siblings: Vec<Sibling>) -> Self {
        Roster { siblings }
    }
}

impl SiblingDirectory for Roster {
    fn siblings(&self) -> &[Sibling] {
        &self.siblings
    }
}

/// True when `identifier` should poll.
///
/// A lone instance always polls. With several instances, only the first one
/// polls, and only if every instance carries the same token; when the tokens
/// differ nobody is elected and no instance polls.
pub fn elect(identifier: &str, token: &str, siblings: &[Sibling]) -> bool {
    if siblings.len() <= 1 {
        return true;
    }

    let first = siblings.first().is_some_and(|s| s.identifier == identifier);
    let tokens_match = siblings.iter().all(|s| s.token == token);
    debug!(
        "Election for {}: instances={}, first={}, tokens_match={}",
        identifier,
        siblings.len(),
        first,
        tokens_match
    );
    first && tokens_match
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(tokens: &[&str]) -> Roster {
        Roster::new(
            tokens
                .iter()
                .enumerate()
                .map(|(i, t)| Sibling {
                    identifier: format!("module_{}", i),
                    token: t.to_string(),
                })
                .collect(),
        )
    }

    fn leaders(roster: &Roster) -> Vec<String> {
        roster
            .siblings()
            .iter()
            .filter(|s| elect(&s.identifier, &s.token, roster.siblings()))
            .map(|s| s.identifier.clone())
            .collect()
    }

    #[test]
    fn single_instance_leads() {
        assert_eq!(leaders(&roster(&["c.a"])), vec!["module_0"]);
    }

    #[test]
    fn first_of_matching_tokens_leads() {
        assert_eq!(leaders(&roster(&["c.a", "c.a", "c.a"])), vec!["module_0"]);
    }

    #[test]
    fn mismatched_tokens_elect_nobody() {
        assert!(leaders(&roster(&["c.a", "c.b", "c.a"])).is_empty());
        assert!(leaders(&roster(&["c.b", "c.a", "c.a"])).is_empty());
    }

    #[test]
    fn unknown_identifier_does_not_lead() {
        let r = roster(&["c.a", "c.a"]);
        assert!(!elect("module_7", "c.a", r.siblings()));
    }
}
