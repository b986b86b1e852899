//! Rule-set model handed to the compiler.
//!
//! Rules and their condition payloads live in two flat intern tables owned by
//! [`RuleSet`]. Everything downstream addresses them through `u32` handles;
//! the build never clones a rule.
//!
//! Handle identity is the contract: two conditions are "the same" for tree
//! sharing exactly when they carry the same [`OptionId`]. Loaders that want
//! structurally equal conditions to merge must intern them once and reuse the
//! handle. No value comparison happens later.

use std::fmt;

use crate::pattern::PatternMatchData;

/// Handle of a rule inside a [`RuleSet`].
pub type RuleId = u32;

/// Handle of an interned condition payload inside a [`RuleSet`].
pub type OptionId = u32;

/// Signature identity of a rule: generator id, signature id, revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignatureId {
    pub gid: u32,
    pub sid: u32,
    pub rev: u32,
}

impl SignatureId {
    pub fn new(gid: u32, sid: u32, rev: u32) -> Self {
        Self { gid, sid, rev }
    }
}

impl fmt::Display for SignatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.gid, self.sid, self.rev)
    }
}

/// Interned payload of one condition.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionData {
    /// A byte pattern matched against a packet buffer.
    Pattern(PatternMatchData),
    /// A non-pattern test (flow state, byte test, size check). Only its
    /// identity and name matter to the compiler.
    Check { name: String },
}

impl OptionData {
    pub fn is_pattern(&self) -> bool {
        matches!(self, OptionData::Pattern(_))
    }

    pub fn as_pattern(&self) -> Option<&PatternMatchData> {
        match self {
            OptionData::Pattern(pmd) => Some(pmd),
            OptionData::Check { .. } => None,
        }
    }

    /// True for literal content conditions, the kind the tree fixup pass
    /// counts when deciding whether a chain can collapse.
    pub fn is_literal_content(&self) -> bool {
        match self {
            OptionData::Pattern(pmd) => pmd.literal,
            OptionData::Check { .. } => false,
        }
    }
}

/// Ordered element of a rule's condition chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Condition {
    pub option: OptionId,
    /// Evaluates relative to the previous condition's match position.
    pub relative: bool,
}

impl Condition {
    pub fn new(option: OptionId) -> Self {
        Self {
            option,
            relative: false,
        }
    }

    pub fn relative(option: OptionId) -> Self {
        Self {
            option,
            relative: true,
        }
    }
}

/// One detection rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub sig: SignatureId,
    /// Condition chain in evaluation order.
    pub conditions: Vec<Condition>,
    /// One bit per inspection policy the rule is enabled in.
    pub policy_mask: u64,
    /// Decoder/preprocessor rules that never join search engine groups.
    pub builtin: bool,
}

impl Rule {
    pub fn new(sig: SignatureId, conditions: Vec<Condition>) -> Self {
        Self {
            sig,
            conditions,
            policy_mask: 1,
            builtin: false,
        }
    }

    /// Enabled in at least one policy.
    pub fn enabled_somewhere(&self) -> bool {
        self.policy_mask != 0
    }
}

/// Per-rule products of one compile, indexed by [`RuleId`] on the build
/// context. The rule set itself stays immutable.
#[derive(Debug, Clone, Default)]
pub struct RuleBuildState {
    /// Longest untruncated fast-pattern length seen for this rule across all
    /// localities, in bytes.
    pub longest_pattern_len: u32,
    /// Condition index fully consumed by the fast-pattern search, per engine
    /// slot (primary, offload). The tree walk for that slot skips it.
    pub fp_only: [Option<usize>; 2],
    /// The missing/negated fast-pattern warning was already emitted.
    pub warned_no_fp: bool,
}

/// The rule and option intern tables for one compilation.
///
/// Read-only for the whole build; per-rule build products (longest pattern
/// length, fast-pattern-only markers) live on the compile context instead.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    options: Vec<OptionData>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern one condition payload and return its handle.
    ///
    /// Each call mints a fresh handle; reusing a handle across conditions is
    /// how a loader declares two conditions identical.
    pub fn add_option(&mut self, data: OptionData) -> OptionId {
        let id = self.options.len() as OptionId;
        self.options.push(data);
        id
    }

    pub fn add_rule(&mut self, rule: Rule) -> RuleId {
        let id = self.rules.len() as RuleId;
        self.rules.push(rule);
        id
    }

    pub fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(id as usize)
    }

    pub fn option(&self, id: OptionId) -> Option<&OptionData> {
        self.options.get(id as usize)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn options(&self) -> &[OptionData] {
        &self.options
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn option_count(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::BufferType;

    #[test]
    fn test_signature_display() {
        let sig = SignatureId::new(1, 2000, 3);
        assert_eq!(sig.to_string(), "1:2000:3");
    }

    #[test]
    fn test_option_interning_mints_fresh_handles() {
        let mut set = RuleSet::new();
        let a = set.add_option(OptionData::Check {
            name: "flow:established".to_string(),
        });
        let b = set.add_option(OptionData::Check {
            name: "flow:established".to_string(),
        });

        // Equal payloads do not merge; the loader decides identity by
        // reusing handles.
        assert_ne!(a, b);
        assert_eq!(set.option_count(), 2);
    }

    #[test]
    fn test_literal_content_classification() {
        let literal = OptionData::Pattern(PatternMatchData::literal(b"GET /", BufferType::Packet));
        let mut pcre = PatternMatchData::literal(b"a+b", BufferType::Packet);
        pcre.literal = false;
        let check = OptionData::Check {
            name: "dsize:>100".to_string(),
        };

        assert!(literal.is_literal_content());
        assert!(!OptionData::Pattern(pcre).is_literal_content());
        assert!(!check.is_literal_content());
        assert!(literal.is_pattern());
        assert!(!check.is_pattern());
    }

    #[test]
    fn test_rule_enabled_somewhere() {
        let sig = SignatureId::new(1, 1, 1);
        let mut rule = Rule::new(sig, Vec::new());
        assert!(rule.enabled_somewhere());

        rule.policy_mask = 0;
        assert!(!rule.enabled_somewhere());
    }

    #[test]
    fn test_rule_set_accessors() {
        let mut set = RuleSet::new();
        assert!(set.is_empty());

        let opt = set.add_option(OptionData::Check {
            name: "ttl:5".to_string(),
        });
        let rule = set.add_rule(Rule::new(
            SignatureId::new(1, 10, 1),
            vec![Condition::new(opt)],
        ));

        assert!(!set.is_empty());
        assert_eq!(set.rule_count(), 1);
        assert_eq!(set.rule(rule).map(|r| r.sig.sid), Some(10));
        assert!(set.rule(99).is_none());
        assert!(set.option(opt).is_some());
        assert!(set.option(99).is_none());
    }

    #[test]
    fn test_condition_constructors() {
        let plain = Condition::new(4);
        let rel = Condition::relative(4);

        assert_eq!(plain.option, rel.option);
        assert!(!plain.relative);
        assert!(rel.relative);
    }
}
