//! Literal multi-pattern backend built on aho-corasick.
//!
//! Patterns go into the automaton case-normalized; a pattern that was added
//! case-sensitive keeps `no_case == false` in its descriptor so the runtime
//! can verify the exact bytes after a hit.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, AhoCorasickKind, MatchKind};

use crate::error::{FastPatternError, Result};
use crate::search::{
    PatternDescriptor, RuleAssociation, SearchBackend, SearchEngine, TreeAgent,
};

/// Factory for [`AhoCorasickEngine`] instances.
#[derive(Debug, Clone, Copy)]
pub struct AhoCorasickBackend;

impl SearchBackend for AhoCorasickBackend {
    fn name(&self) -> &'static str {
        "ac"
    }

    fn regex_capable(&self) -> bool {
        false
    }

    fn parallel_compile(&self) -> bool {
        true
    }

    fn create(&self) -> Result<Box<dyn SearchEngine>> {
        Ok(Box::new(AhoCorasickEngine::new()))
    }
}

/// Aho-Corasick search engine holding literal fast patterns.
#[derive(Debug, Default)]
pub struct AhoCorasickEngine {
    patterns: Vec<Vec<u8>>,
    descriptors: Vec<PatternDescriptor>,
    associations: Vec<RuleAssociation>,
    automaton: Option<AhoCorasick>,
    search_opt: bool,
}

impl AhoCorasickEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn negated_count(&self) -> usize {
        self.descriptors.iter().filter(|d| d.negated).count()
    }
}

impl SearchEngine for AhoCorasickEngine {
    fn add_pattern(
        &mut self,
        bytes: &[u8],
        desc: PatternDescriptor,
        assoc: RuleAssociation,
    ) -> Result<()> {
        if bytes.is_empty() {
            return Err(FastPatternError::EmptyPattern);
        }
        self.patterns.push(bytes.to_vec());
        self.descriptors.push(desc);
        self.associations.push(assoc);
        self.automaton = None;
        Ok(())
    }

    fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    fn compile(&mut self) -> Result<()> {
        if self.automaton.is_some() {
            return Ok(());
        }
        let kind = if self.search_opt {
            Some(AhoCorasickKind::DFA)
        } else {
            None
        };
        let automaton = AhoCorasickBuilder::new()
            .match_kind(MatchKind::Standard)
            .ascii_case_insensitive(true)
            .kind(kind)
            .build(&self.patterns)
            .map_err(|e| {
                FastPatternError::Compilation(format!("Failed to build ac automaton: {e}"))
            })?;
        self.automaton = Some(automaton);
        Ok(())
    }

    fn set_search_opt(&mut self, enable: bool) {
        self.search_opt = enable;
    }

    fn build_trees(&self, agent: &mut dyn TreeAgent) -> Result<()> {
        for (desc, assoc) in self.descriptors.iter().zip(&self.associations) {
            if desc.negated {
                agent.negated_pattern(*assoc)?;
            } else {
                agent.build_tree(*assoc)?;
            }
        }
        agent.finish()
    }

    fn summary(&self) -> String {
        let kind = if self.search_opt { "dfa" } else { "nfa" };
        format!(
            "ac ({kind}): {} patterns, {} negated",
            self.patterns.len(),
            self.negated_count()
        )
    }
}
