//! Build-time configuration for the fast-pattern compiler.
//!
//! Controls which multi-pattern search backend hosts the fast patterns, how
//! long an inserted pattern may be, and how any-any port rules are folded
//! into the per-port groups.

use serde::{Deserialize, Serialize};

/// Multi-pattern search method used for the compiled engines.
///
/// | Method | Patterns | Parallel compile | Use case |
/// |--------|----------|------------------|----------|
/// | `AhoCorasick` | literal only | yes | default packet inspection |
/// | `RegexSet` | literal + regex | no | rule sets relying on regex fast patterns |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchMethod {
    /// Literal multi-pattern automaton (aho-corasick).
    AhoCorasick,
    /// Regex-capable set matcher (regex::bytes::RegexSet).
    RegexSet,
}

impl SearchMethod {
    /// Human-readable backend name used in summaries and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            SearchMethod::AhoCorasick => "ac",
            SearchMethod::RegexSet => "regex-set",
        }
    }
}

impl Default for SearchMethod {
    fn default() -> Self {
        Self::AhoCorasick
    }
}

/// Configuration for one fast-pattern compilation run.
///
/// The configuration is immutable during a compile; counters such as the
/// number of truncated patterns are reported on the compile summary, not
/// mutated here.
///
/// # Examples
///
/// ```rust
/// use fastpattern_compiler::{FastPatternConfig, SearchMethod};
///
/// let config = FastPatternConfig::new()
///     .with_search_method(SearchMethod::AhoCorasick)
///     .with_max_pattern_len(20)
///     .with_split_any_any(true);
///
/// assert_eq!(config.max_pattern_len, 20);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastPatternConfig {
    /// Search method for the primary engines.
    pub search_method: SearchMethod,
    /// Optional distinct search method for offload engines. `None` means
    /// offload uses the primary engines and no offload instances are built.
    pub offload_search_method: Option<SearchMethod>,
    /// Upper bound on inserted fast-pattern length in bytes. Patterns longer
    /// than this are truncated on insertion; `0` means unbounded.
    pub max_pattern_len: usize,
    /// Keep any-any port rules in their own engine group instead of copying
    /// them into every port group. Saves memory, costs a second search.
    pub split_any_any: bool,
    /// Ask each engine to spend extra effort optimizing its automaton.
    pub search_optimize: bool,
    /// Log a summary line for every queued engine.
    pub debug_mode: bool,
    /// Log every selected fast pattern as it is inserted.
    pub debug_print_fast_patterns: bool,
}

impl Default for FastPatternConfig {
    fn default() -> Self {
        Self {
            search_method: SearchMethod::default(),
            offload_search_method: None,
            max_pattern_len: 0,
            split_any_any: false,
            search_optimize: false,
            debug_mode: false,
            debug_print_fast_patterns: false,
        }
    }
}

impl FastPatternConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration favoring smaller engines over single-search lookups.
    ///
    /// Caps inserted patterns at 20 bytes and keeps any-any rules in a
    /// separate group so they are not duplicated into every port group.
    pub fn memory_efficient() -> Self {
        Self {
            max_pattern_len: 20,
            split_any_any: true,
            ..Default::default()
        }
    }

    /// Configuration favoring search speed over build time and memory.
    pub fn high_performance() -> Self {
        Self {
            search_optimize: true,
            split_any_any: false,
            ..Default::default()
        }
    }

    /// Configuration for debugging rule-to-group assignment.
    pub fn development() -> Self {
        Self {
            debug_mode: true,
            debug_print_fast_patterns: true,
            ..Default::default()
        }
    }

    /// Set the primary search method.
    pub fn with_search_method(mut self, method: SearchMethod) -> Self {
        self.search_method = method;
        self
    }

    /// Set a distinct search method for offload engines.
    pub fn with_offload_search_method(mut self, method: SearchMethod) -> Self {
        self.offload_search_method = Some(method);
        self
    }

    /// Set the maximum inserted pattern length (`0` = unbounded).
    pub fn with_max_pattern_len(mut self, len: usize) -> Self {
        self.max_pattern_len = len;
        self
    }

    /// Enable or disable the dedicated any-any group split.
    pub fn with_split_any_any(mut self, enable: bool) -> Self {
        self.split_any_any = enable;
        self
    }

    /// Enable or disable extra automaton optimization.
    pub fn with_search_optimize(mut self, enable: bool) -> Self {
        self.search_optimize = enable;
        self
    }

    /// Enable or disable per-engine queue logging.
    pub fn with_debug_mode(mut self, enable: bool) -> Self {
        self.debug_mode = enable;
        self
    }

    /// Enable or disable per-pattern insertion logging.
    pub fn with_debug_print_fast_patterns(mut self, enable: bool) -> Self {
        self.debug_print_fast_patterns = enable;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FastPatternConfig::default();

        assert_eq!(config.search_method, SearchMethod::AhoCorasick);
        assert_eq!(config.offload_search_method, None);
        assert_eq!(config.max_pattern_len, 0);
        assert!(!config.split_any_any);
        assert!(!config.search_optimize);
        assert!(!config.debug_mode);
    }

    #[test]
    fn test_memory_efficient_config() {
        let config = FastPatternConfig::memory_efficient();

        assert_eq!(config.max_pattern_len, 20);
        assert!(config.split_any_any);
    }

    #[test]
    fn test_high_performance_config() {
        let config = FastPatternConfig::high_performance();

        assert!(config.search_optimize);
        assert!(!config.split_any_any);
    }

    #[test]
    fn test_development_config() {
        let config = FastPatternConfig::development();

        assert!(config.debug_mode);
        assert!(config.debug_print_fast_patterns);
    }

    #[test]
    fn test_builder_methods() {
        let config = FastPatternConfig::new()
            .with_search_method(SearchMethod::RegexSet)
            .with_offload_search_method(SearchMethod::AhoCorasick)
            .with_max_pattern_len(16)
            .with_split_any_any(true)
            .with_search_optimize(true)
            .with_debug_mode(true)
            .with_debug_print_fast_patterns(true);

        assert_eq!(config.search_method, SearchMethod::RegexSet);
        assert_eq!(
            config.offload_search_method,
            Some(SearchMethod::AhoCorasick)
        );
        assert_eq!(config.max_pattern_len, 16);
        assert!(config.split_any_any);
        assert!(config.search_optimize);
        assert!(config.debug_mode);
        assert!(config.debug_print_fast_patterns);
    }

    #[test]
    fn test_search_method_names() {
        assert_eq!(SearchMethod::AhoCorasick.name(), "ac");
        assert_eq!(SearchMethod::RegexSet.name(), "regex-set");
        assert_eq!(SearchMethod::default(), SearchMethod::AhoCorasick);
    }
}
