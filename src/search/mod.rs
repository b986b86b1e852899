//! Pluggable multi-pattern search engines.
//!
//! The compiler talks to search engines through two seams: [`SearchBackend`]
//! creates engine instances for a configured [`SearchMethod`], and
//! [`SearchEngine`] accepts fast patterns, compiles its automaton, and later
//! replays every pattern's rule association through a [`TreeAgent`] so the
//! caller can fold decision trees.

pub mod ac;
pub mod regex_set;

use crate::config::SearchMethod;
use crate::error::Result;
use crate::rules::{OptionId, RuleId};

pub use ac::AhoCorasickBackend;
pub use regex_set::RegexSetBackend;

/// Which engine slot of a group an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineRole {
    Primary,
    Offload,
}

impl EngineRole {
    pub const COUNT: usize = 2;

    pub fn index(self) -> usize {
        match self {
            EngineRole::Primary => 0,
            EngineRole::Offload => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EngineRole::Primary => "primary",
            EngineRole::Offload => "offload",
        }
    }
}

/// Per-pattern properties an engine needs to host a fast pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternDescriptor {
    pub no_case: bool,
    pub negated: bool,
    pub literal: bool,
    /// Opaque evaluator flags carried through to the runtime.
    pub flags: u32,
}

/// What a pattern match means: this rule, entered through this condition.
///
/// The runtime gets the association back on every hit and uses it to pick
/// the decision tree to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleAssociation {
    pub rule: RuleId,
    pub option: OptionId,
}

/// Callback target for the post-compile association walk.
///
/// Engines replay their associations in insertion order: positives through
/// [`build_tree`](TreeAgent::build_tree), negated patterns through
/// [`negated_pattern`](TreeAgent::negated_pattern), then one
/// [`finish`](TreeAgent::finish) call when the walk is complete.
pub trait TreeAgent {
    fn build_tree(&mut self, assoc: RuleAssociation) -> Result<()>;
    fn negated_pattern(&mut self, assoc: RuleAssociation) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

/// One multi-pattern search engine instance.
pub trait SearchEngine: Send {
    /// Insert one fast pattern with its rule association.
    fn add_pattern(
        &mut self,
        bytes: &[u8],
        desc: PatternDescriptor,
        assoc: RuleAssociation,
    ) -> Result<()>;

    /// Number of patterns inserted so far.
    fn pattern_count(&self) -> usize;

    /// Build the automaton from the inserted patterns. Idempotent.
    fn compile(&mut self) -> Result<()>;

    /// Request extra automaton optimization before [`compile`](Self::compile).
    fn set_search_opt(&mut self, enable: bool);

    /// Replay every association through `agent`, then finish it.
    fn build_trees(&self, agent: &mut dyn TreeAgent) -> Result<()>;

    /// One-line description for diagnostics.
    fn summary(&self) -> String;
}

/// Factory for one search method.
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Engines from this backend accept non-literal patterns.
    fn regex_capable(&self) -> bool;

    /// Engines from this backend may compile on worker threads.
    fn parallel_compile(&self) -> bool;

    fn create(&self) -> Result<Box<dyn SearchEngine>>;
}

static AC_BACKEND: AhoCorasickBackend = AhoCorasickBackend;
static REGEX_SET_BACKEND: RegexSetBackend = RegexSetBackend;

/// Resolve the backend for a configured search method.
pub fn backend_for(method: SearchMethod) -> &'static dyn SearchBackend {
    match method {
        SearchMethod::AhoCorasick => &AC_BACKEND,
        SearchMethod::RegexSet => &REGEX_SET_BACKEND,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_factory() {
        let ac = backend_for(SearchMethod::AhoCorasick);
        assert_eq!(ac.name(), "ac");
        assert!(!ac.regex_capable());
        assert!(ac.parallel_compile());

        let rs = backend_for(SearchMethod::RegexSet);
        assert_eq!(rs.name(), "regex-set");
        assert!(rs.regex_capable());
        assert!(!rs.parallel_compile());
    }

    #[test]
    fn test_engine_role_indices() {
        assert_eq!(EngineRole::Primary.index(), 0);
        assert_eq!(EngineRole::Offload.index(), 1);
        assert_eq!(EngineRole::COUNT, 2);
        assert_eq!(EngineRole::Offload.name(), "offload");
    }

    #[test]
    fn test_association_equality() {
        let a = RuleAssociation { rule: 1, option: 7 };
        let b = RuleAssociation { rule: 1, option: 7 };
        let c = RuleAssociation { rule: 1, option: 8 };

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
