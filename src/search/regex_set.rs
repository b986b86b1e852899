//! Regex-capable backend built on `regex::bytes::RegexSet`.
//!
//! Literal patterns are escaped byte for byte; non-literal patterns join the
//! set verbatim. The whole set compiles with Unicode off so `\xNN` escapes
//! match raw bytes.

use regex::bytes::{RegexSet, RegexSetBuilder};

use crate::error::{FastPatternError, Result};
use crate::search::{
    PatternDescriptor, RuleAssociation, SearchBackend, SearchEngine, TreeAgent,
};

/// Factory for [`RegexSetEngine`] instances.
#[derive(Debug, Clone, Copy)]
pub struct RegexSetBackend;

impl SearchBackend for RegexSetBackend {
    fn name(&self) -> &'static str {
        "regex-set"
    }

    fn regex_capable(&self) -> bool {
        true
    }

    fn parallel_compile(&self) -> bool {
        false
    }

    fn create(&self) -> Result<Box<dyn SearchEngine>> {
        Ok(Box::new(RegexSetEngine::new()))
    }
}

/// Search engine hosting literal and regex fast patterns in one set.
#[derive(Debug, Default)]
pub struct RegexSetEngine {
    exprs: Vec<String>,
    descriptors: Vec<PatternDescriptor>,
    associations: Vec<RuleAssociation>,
    set: Option<RegexSet>,
    search_opt: bool,
}

impl RegexSetEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn expr_for(bytes: &[u8], desc: &PatternDescriptor) -> String {
        let expr = if desc.literal {
            escape_bytes(bytes)
        } else {
            String::from_utf8_lossy(bytes).into_owned()
        };
        if desc.no_case {
            format!("(?i:{expr})")
        } else {
            expr
        }
    }
}

/// Escape literal bytes into a regex that matches them exactly.
fn escape_bytes(bytes: &[u8]) -> String {
    let mut expr = String::with_capacity(bytes.len() * 4);
    for &b in bytes {
        if b.is_ascii_alphanumeric() {
            expr.push(b as char);
        } else {
            expr.push_str(&format!("\\x{b:02x}"));
        }
    }
    expr
}

impl SearchEngine for RegexSetEngine {
    fn add_pattern(
        &mut self,
        bytes: &[u8],
        desc: PatternDescriptor,
        assoc: RuleAssociation,
    ) -> Result<()> {
        if bytes.is_empty() {
            return Err(FastPatternError::EmptyPattern);
        }
        self.exprs.push(Self::expr_for(bytes, &desc));
        self.descriptors.push(desc);
        self.associations.push(assoc);
        self.set = None;
        Ok(())
    }

    fn pattern_count(&self) -> usize {
        self.exprs.len()
    }

    fn compile(&mut self) -> Result<()> {
        if self.set.is_some() {
            return Ok(());
        }
        let set = RegexSetBuilder::new(&self.exprs)
            .unicode(false)
            .build()
            .map_err(|e| {
                FastPatternError::Compilation(format!("Failed to build regex set: {e}"))
            })?;
        self.set = Some(set);
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
        let negated = self.descriptors.iter().filter(|d| d.negated).count();
        format!(
            "regex-set: {} patterns, {} negated",
            self.exprs.len(),
            negated
        )
    }
}
