//! Rule groups: per-locality search engines plus the no-fast-pattern bucket.
//!
//! A [`PortGroup`] is the compiled unit for one locality (a port set or a
//! service direction). [`PortGroupAssembler`] fills it rule by rule: each
//! rule's best pattern lands in the engine for its buffer type, rules without
//! a usable pattern land in the unconditional bucket, and `finish` discards
//! whatever stayed empty.

use std::fmt;

use log::{debug, warn};

use crate::config::FastPatternConfig;
use crate::error::{FastPatternError, Result};
use crate::pattern::{
    pattern_preview, select_fast_pattern, BufferType, FinalPattern, PatternMatchData,
};
use crate::rules::{OptionData, OptionId, Rule, RuleBuildState, RuleId, RuleSet};
use crate::search::{
    backend_for, EngineRole, PatternDescriptor, RuleAssociation, SearchBackend, SearchEngine,
};
use crate::tree::{finalize_root, insert_rule, TreeForest, TreeRegistry, TreeRootId};

/// Handle of a built group inside the compiled output.
pub type GroupId = u32;

/// One engine instance plus the negated associations collected for it
/// during the tree-folding walk.
pub struct EngineInstance {
    pub engine: Box<dyn SearchEngine>,
    pub negated: Vec<RuleAssociation>,
}

impl EngineInstance {
    pub fn new(engine: Box<dyn SearchEngine>) -> Self {
        Self {
            engine,
            negated: Vec::new(),
        }
    }
}

impl fmt::Debug for EngineInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineInstance")
            .field("engine", &self.engine.summary())
            .field("negated", &self.negated.len())
            .finish()
    }
}

/// Primary and offload engines for one buffer type, sharing one decision
/// tree.
#[derive(Debug, Default)]
pub struct SearchEngineGroup {
    pub primary: Option<EngineInstance>,
    pub offload: Option<EngineInstance>,
    /// Root shared by both engine slots; folded during the compile phase.
    pub tree: Option<TreeRootId>,
}

impl SearchEngineGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, role: EngineRole) -> Option<&EngineInstance> {
        match role {
            EngineRole::Primary => self.primary.as_ref(),
            EngineRole::Offload => self.offload.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, role: EngineRole) -> &mut Option<EngineInstance> {
        match role {
            EngineRole::Primary => &mut self.primary,
            EngineRole::Offload => &mut self.offload,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.offload.is_none()
    }
}

/// Compiled detection unit for one locality.
#[derive(Debug, Default)]
pub struct PortGroup {
    /// One engine pair per buffer type that received patterns.
    pub engines: [Option<SearchEngineGroup>; BufferType::COUNT],
    /// Rules evaluated unconditionally on the normal path.
    pub nfp_rules: Vec<RuleId>,
    /// Rules evaluated unconditionally on the offload path only.
    pub offload_nfp_rules: Vec<RuleId>,
    pub nfp_tree: Option<TreeRootId>,
    pub offload_nfp_tree: Option<TreeRootId>,
    /// Rules gated purely by a fast pattern.
    pub rule_count: u32,
}

impl PortGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_nfp_rule(&mut self, rule: RuleId) {
        self.nfp_rules.push(rule);
    }

    pub fn add_offload_nfp_rule(&mut self, rule: RuleId) {
        self.offload_nfp_rules.push(rule);
    }

    pub fn nfp_rule_count(&self) -> usize {
        self.nfp_rules.len()
    }

    pub fn offload_nfp_rule_count(&self) -> usize {
        self.offload_nfp_rules.len()
    }
}

/// Mutable state of one compilation, shared across every group build.
#[derive(Debug, Default)]
pub struct BuildContext {
    pub forest: TreeForest,
    pub registry: TreeRegistry,
    /// Per-rule build products, indexed by `RuleId`.
    pub rule_states: Vec<RuleBuildState>,
    /// Fast patterns shortened by the configured length cap.
    pub patterns_truncated: u64,
    /// Engines queued for compilation, by role.
    pub queued: [u32; EngineRole::COUNT],
}

impl BuildContext {
    pub fn new(rule_count: usize) -> Self {
        Self {
            rule_states: vec![RuleBuildState::default(); rule_count],
            ..Self::default()
        }
    }

    pub fn queued_total(&self) -> u32 {
        self.queued.iter().sum()
    }
}

/// The rule's chosen fast pattern: its condition position, interned option
/// handle, and payload.
#[derive(Clone, Copy)]
struct FastPatternPick<'a> {
    cond_index: usize,
    option: OptionId,
    pmd: &'a PatternMatchData,
}

/// Builds [`PortGroup`]s one rule at a time.
pub struct PortGroupAssembler<'a> {
    ruleset: &'a RuleSet,
    config: &'a FastPatternConfig,
    primary: &'static dyn SearchBackend,
    /// Set only when a distinct offload method is configured.
    offload: Option<&'static dyn SearchBackend>,
}

impl<'a> PortGroupAssembler<'a> {
    pub fn new(ruleset: &'a RuleSet, config: &'a FastPatternConfig) -> Self {
        let offload = config
            .offload_search_method
            .filter(|method| *method != config.search_method)
            .map(backend_for);
        Self {
            ruleset,
            config,
            primary: backend_for(config.search_method),
            offload,
        }
    }

    /// Add one rule to the group: best pattern into the buffer's engine,
    /// or into the no-fast-pattern bucket when no engine can host one.
    /// `label` names the locality in diagnostics.
    pub fn add_rule(
        &self,
        ctx: &mut BuildContext,
        group: &mut PortGroup,
        rule_id: RuleId,
        label: &str,
    ) -> Result<()> {
        let rule = self
            .ruleset
            .rule(rule_id)
            .ok_or(FastPatternError::InvalidHandle(rule_id))?;

        if rule.builtin || !rule.enabled_somewhere() {
            return Ok(());
        }

        let main = match self.pick_fast_pattern(rule, !self.primary.regex_capable()) {
            Some(pick) => pick,
            None => {
                group.add_nfp_rule(rule_id);
                self.warn_no_fast_pattern(ctx, rule, rule_id, label);
                return Ok(());
            }
        };

        let offload_pick = match self.offload {
            Some(backend) => self.pick_fast_pattern(rule, !backend.regex_capable()),
            None => None,
        };
        if self.offload.is_some() && offload_pick.is_none() {
            // The primary engine keeps the rule; the offload path must
            // evaluate it unconditionally.
            group.add_offload_nfp_rule(rule_id);
            debug!("{label}: rule {} has no offload fast pattern", rule.sig);
        }

        let buffer = main.pmd.buffer;
        let engines = group.engines[buffer.index()].get_or_insert_with(SearchEngineGroup::new);

        if engines.primary.is_none() {
            engines.primary =
                Some(self.create_engine(self.primary, EngineRole::Primary, buffer, label)?);
        }

        let mut negated_main = false;
        let mut negated_offload = false;

        if let Some(instance) = engines.primary.as_mut() {
            negated_main = main.pmd.negated;
            self.insert_main_pattern(ctx, instance, rule, rule_id, main, EngineRole::Primary, label)?;
        }

        if let (Some(backend), Some(ol)) = (self.offload, offload_pick) {
            if engines.offload.is_none() {
                // The offload engine lives alongside the primary pick's
                // buffer type even when its own pick differs.
                engines.offload =
                    Some(self.create_engine(backend, EngineRole::Offload, buffer, label)?);
            }
            if let Some(instance) = engines.offload.as_mut() {
                negated_offload = ol.pmd.negated;
                self.insert_main_pattern(ctx, instance, rule, rule_id, ol, EngineRole::Offload, label)?;
            }
        }

        if !negated_main && !negated_offload {
            group.rule_count += 1;
        } else {
            if negated_main {
                group.add_nfp_rule(rule_id);
            }
            if negated_offload {
                group.add_offload_nfp_rule(rule_id);
            }
            self.warn_no_fast_pattern(ctx, rule, rule_id, label);
        }
        Ok(())
    }

    /// Queue surviving engines, build the unconditional-bucket trees, and
    /// drop the group if nothing remains.
    pub fn finish(
        &self,
        ctx: &mut BuildContext,
        mut group: PortGroup,
        label: &str,
    ) -> Result<Option<PortGroup>> {
        let mut keep = false;

        for slot in group.engines.iter_mut() {
            if let Some(engines) = slot.as_mut() {
                for role in [EngineRole::Primary, EngineRole::Offload] {
                    let entry = engines.slot_mut(role);
                    let has_patterns = entry
                        .as_ref()
                        .map_or(false, |i| i.engine.pattern_count() > 0);
                    if has_patterns {
                        ctx.queued[role.index()] += 1;
                        if self.config.debug_mode {
                            if let Some(instance) = entry.as_ref() {
                                debug!("{label}: queued {}", instance.engine.summary());
                            }
                        }
                        keep = true;
                    } else {
                        *entry = None;
                    }
                }
                if engines.is_empty() {
                    *slot = None;
                }
            }
        }

        if !group.nfp_rules.is_empty() {
            group.nfp_tree =
                Some(self.build_bucket_tree(ctx, &group.nfp_rules, EngineRole::Primary)?);
            keep = true;
        }
        if !group.offload_nfp_rules.is_empty() {
            group.offload_nfp_tree =
                Some(self.build_bucket_tree(ctx, &group.offload_nfp_rules, EngineRole::Offload)?);
            keep = true;
        }

        if !keep {
            return Ok(None);
        }
        Ok(Some(group))
    }

    /// Walk the rule's pattern conditions and pick the best fast-pattern
    /// candidate. Author designation trumps length; length trumps position;
    /// the earliest candidate wins ties.
    fn pick_fast_pattern(&self, rule: &Rule, only_literal: bool) -> Option<FastPatternPick<'a>> {
        let mut best: Option<FastPatternPick<'a>> = None;
        for (idx, cond) in rule.conditions.iter().enumerate() {
            let pmd = match self.ruleset.option(cond.option).and_then(OptionData::as_pattern) {
                Some(pmd) => pmd,
                None => continue,
            };
            if only_literal && !pmd.literal {
                continue;
            }
            if pmd.pattern.is_empty() {
                continue;
            }
            let better = match best {
                None => true,
                Some(cur) => {
                    (pmd.user_fast_pattern, pmd.pattern.len())
                        > (cur.pmd.user_fast_pattern, cur.pmd.pattern.len())
                }
            };
            if better {
                best = Some(FastPatternPick {
                    cond_index: idx,
                    option: cond.option,
                    pmd,
                });
            }
        }
        best
    }

    fn create_engine(
        &self,
        backend: &dyn SearchBackend,
        role: EngineRole,
        buffer: BufferType,
        label: &str,
    ) -> Result<EngineInstance> {
        let mut engine = backend.create().map_err(|e| {
            FastPatternError::EngineAllocation(format!(
                "{} {} matcher for {label}: {e}",
                role.name(),
                buffer.name()
            ))
        })?;
        engine.set_search_opt(self.config.search_optimize);
        Ok(EngineInstance::new(engine))
    }

    /// Insert the picked pattern and its alternates, update the rule's
    /// longest-pattern length, and mark the condition fast-pattern-only
    /// when the engine hit fully substitutes for it.
    #[allow(clippy::too_many_arguments)]
    fn insert_main_pattern(
        &self,
        ctx: &mut BuildContext,
        instance: &mut EngineInstance,
        rule: &Rule,
        rule_id: RuleId,
        pick: FastPatternPick<'_>,
        role: EngineRole,
        label: &str,
    ) -> Result<()> {
        let fp = select_fast_pattern(pick.pmd, self.config.max_pattern_len);
        self.insert_pattern(ctx, instance, rule, rule_id, pick.option, pick.pmd, fp, label)?;

        let raw_len = pick.pmd.pattern.len() as u32;
        let state = &mut ctx.rule_states[rule_id as usize];
        if raw_len > state.longest_pattern_len {
            state.longest_pattern_len = raw_len;
        }
        if pattern_substitutes(rule, pick.cond_index, pick.pmd, fp.truncated) {
            state.fp_only[role.index()] = Some(pick.cond_index);
        }

        for &alt in &pick.pmd.alternates {
            let alt_pmd = self
                .ruleset
                .option(alt)
                .and_then(OptionData::as_pattern)
                .ok_or(FastPatternError::InvalidHandle(alt))?;
            // Alternates are not the chosen fast pattern and bypass the
            // length cap.
            let raw = FinalPattern {
                bytes: &alt_pmd.pattern,
                truncated: false,
            };
            self.insert_pattern(ctx, instance, rule, rule_id, alt, alt_pmd, raw, label)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_pattern(
        &self,
        ctx: &mut BuildContext,
        instance: &mut EngineInstance,
        rule: &Rule,
        rule_id: RuleId,
        option: OptionId,
        pmd: &PatternMatchData,
        fp: FinalPattern<'_>,
        label: &str,
    ) -> Result<()> {
        if self.config.debug_print_fast_patterns {
            debug!(
                "FP {label} {} {}[{}] = '{}'{}{}",
                rule.sig,
                pmd.buffer.name(),
                fp.bytes.len(),
                pattern_preview(fp.bytes),
                if pmd.user_fast_pattern { " user" } else { "" },
                if pmd.negated { " negated" } else { "" },
            );
        }
        if fp.truncated {
            ctx.patterns_truncated += 1;
        }

        let desc = PatternDescriptor {
            no_case: pmd.no_case,
            negated: pmd.negated,
            literal: pmd.literal,
            flags: pmd.flags,
        };
        instance.engine.add_pattern(
            fp.bytes,
            desc,
            RuleAssociation {
                rule: rule_id,
                option,
            },
        )
    }

    /// Build and finalize the decision tree for one unconditional bucket.
    fn build_bucket_tree(
        &self,
        ctx: &mut BuildContext,
        rules: &[RuleId],
        role: EngineRole,
    ) -> Result<TreeRootId> {
        let root = ctx.forest.alloc_root();
        for &rule_id in rules {
            let skip = ctx.rule_states[rule_id as usize].fp_only[role.index()];
            insert_rule(&mut ctx.forest, self.ruleset, root, rule_id, skip)?;
        }
        finalize_root(&mut ctx.forest, &mut ctx.registry, root);
        Ok(root)
    }

    fn warn_no_fast_pattern(
        &self,
        ctx: &mut BuildContext,
        rule: &Rule,
        rule_id: RuleId,
        label: &str,
    ) {
        let state = &mut ctx.rule_states[rule_id as usize];
        if state.warned_no_fp {
            return;
        }
        state.warned_no_fp = true;
        let kind = if state.longest_pattern_len > 0 {
            "negated"
        } else {
            "no"
        };
        warn!("{label}: rule {} has {kind} fast pattern", rule.sig);
    }
}

/// True when the engine hit fully substitutes for the condition at
/// evaluation time: a literal positive match of the whole pattern, with no
/// later condition anchored to its position. Case folding is handled inside
/// the engine through the pattern descriptor.
fn pattern_substitutes(
    rule: &Rule,
    cond_index: usize,
    pmd: &PatternMatchData,
    truncated: bool,
) -> bool {
    if pmd.negated || !pmd.literal || truncated {
        return false;
    }
    if pmd.fp_offset != 0 || pmd.fp_length != 0 {
        return false;
    }
    match rule.conditions.get(cond_index + 1) {
        Some(next) => !next.relative,
        None => true,
    }
}
