//! The compilation driver: ports, services, engine compilation, trees.
//!
//! [`FastPatternCompiler`] sequences one full build: port groups for every
//! protocol and direction, the dense port lookup maps, service groups, the
//! (optionally parallel) automaton compilation with its strict count check,
//! the sequential tree-folding walk, and the final chain fixup.

use std::fmt;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::config::FastPatternConfig;
use crate::error::{FastPatternError, Result};
use crate::pattern::BufferType;
use crate::port_group::{BuildContext, GroupId, PortGroup, PortGroupAssembler, SearchEngineGroup};
use crate::port_table::{
    build_port_rule_map, PortDirection, PortObject, PortRuleMap, PortTable, Protocol,
    RulePortTables,
};
use crate::rules::{RuleBuildState, RuleSet};
use crate::search::{backend_for, EngineRole, TreeAgent};
use crate::service_map::{
    build_service_groups, ServiceGroupMap, ServiceIndex, ServiceRuleMap,
};
use crate::tree::{fixup_registered_trees, TreeFolder, TreeForest};

/// Everything the runtime needs from one build.
#[derive(Debug)]
pub struct CompiledDetection {
    pub groups: Vec<PortGroup>,
    pub port_maps: [PortRuleMap; Protocol::COUNT],
    pub service_groups: ServiceGroupMap,
    pub forest: TreeForest,
    /// Per-rule build products, indexed by `RuleId`.
    pub rule_states: Vec<RuleBuildState>,
    pub summary: CompileSummary,
}

impl CompiledDetection {
    pub fn group(&self, id: GroupId) -> Option<&PortGroup> {
        self.groups.get(id as usize)
    }

    pub fn port_map(&self, protocol: Protocol) -> &PortRuleMap {
        &self.port_maps[protocol.index()]
    }
}

/// Group and rule counts for one protocol's lookup maps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtocolSummary {
    pub src_groups: u32,
    pub dst_groups: u32,
    pub any_group: bool,
    pub src_rules: u32,
    pub dst_rules: u32,
    pub any_rules: u32,
}

/// Aggregate diagnostics for one build, logged at `info!` and kept on the
/// output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileSummary {
    /// Patterns per buffer type and engine role.
    pub patterns: [[u64; EngineRole::COUNT]; BufferType::COUNT],
    pub patterns_truncated: u64,
    pub engines_compiled: u32,
    pub port_counts: [ProtocolSummary; Protocol::COUNT],
    pub to_srv_groups: u32,
    pub to_cli_groups: u32,
    pub group_count: u32,
}

impl fmt::Display for CompileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fast pattern groups: {}", self.group_count)?;
        writeln!(f, "{:>17}  {:>7} {:>7} {:>7}", "", "src", "dst", "any")?;
        for (protocol, counts) in Protocol::ALL.iter().zip(&self.port_counts) {
            if counts.src_groups == 0 && counts.dst_groups == 0 && !counts.any_group {
                continue;
            }
            writeln!(
                f,
                "{:>17}: {:>7} {:>7} {:>7}",
                protocol.name(),
                counts.src_groups,
                counts.dst_groups,
                u32::from(counts.any_group)
            )?;
            writeln!(
                f,
                "{:>17}: {:>7} {:>7} {:>7}",
                "rules", counts.src_rules, counts.dst_rules, counts.any_rules
            )?;
        }
        writeln!(f, "{:>17}  {:>7} {:>7}", "", "primary", "offload")?;
        for (buffer, roles) in BufferType::ALL.iter().zip(&self.patterns) {
            if roles.iter().all(|&n| n == 0) {
                continue;
            }
            writeln!(
                f,
                "{:>17}: {:>7} {:>7}",
                buffer.name(),
                roles[EngineRole::Primary.index()],
                roles[EngineRole::Offload.index()]
            )?;
        }
        writeln!(
            f,
            "service groups: {} to-srv, {} to-cli",
            self.to_srv_groups, self.to_cli_groups
        )?;
        if self.patterns_truncated > 0 {
            writeln!(f, "truncated patterns: {}", self.patterns_truncated)?;
        }
        write!(f, "search engines compiled: {}", self.engines_compiled)
    }
}

/// Built group handles for one protocol, aligned with its input tables.
#[derive(Debug, Default)]
struct BuiltTables {
    src: Vec<Option<GroupId>>,
    dst: Vec<Option<GroupId>>,
    any: Option<GroupId>,
}

/// Compiles a rule set's fast-pattern detection state.
#[derive(Debug, Clone)]
pub struct FastPatternCompiler {
    config: FastPatternConfig,
    reloading: bool,
}

impl FastPatternCompiler {
    pub fn new(config: FastPatternConfig) -> Self {
        Self {
            config,
            reloading: false,
        }
    }

    /// Mark this build as a configuration reload, which forces sequential
    /// engine compilation.
    pub fn reloading(mut self, reloading: bool) -> Self {
        self.reloading = reloading;
        self
    }

    /// Run one full build over an immutable rule set.
    pub fn compile(
        &self,
        ruleset: &RuleSet,
        ports: &RulePortTables,
        services: &ServiceRuleMap,
        service_index: &ServiceIndex,
    ) -> Result<CompiledDetection> {
        if ruleset.is_empty() {
            debug!("no rules; nothing to compile");
            return Ok(CompiledDetection {
                groups: Vec::new(),
                port_maps: Protocol::ALL.map(|_| PortRuleMap::new()),
                service_groups: ServiceGroupMap::new(service_index.len()),
                forest: TreeForest::new(),
                rule_states: Vec::new(),
                summary: CompileSummary::default(),
            });
        }

        let assembler = PortGroupAssembler::new(ruleset, &self.config);
        let mut ctx = BuildContext::new(ruleset.rule_count());
        let mut groups: Vec<PortGroup> = Vec::new();

        let mut built: [BuiltTables; Protocol::COUNT] = Default::default();
        for protocol in Protocol::ALL {
            let tables = ports.proto(protocol);
            let fold_any = if self.config.split_any_any {
                None
            } else {
                Some(&tables.any)
            };

            let src = self.build_table_groups(
                &assembler,
                &mut ctx,
                &mut groups,
                &tables.src,
                fold_any,
                protocol,
                PortDirection::Src,
            )?;
            let dst = self.build_table_groups(
                &assembler,
                &mut ctx,
                &mut groups,
                &tables.dst,
                fold_any,
                protocol,
                PortDirection::Dst,
            )?;
            let any =
                self.build_any_group(&assembler, &mut ctx, &mut groups, &tables.any, protocol)?;
            built[protocol.index()] = BuiltTables { src, dst, any };
        }

        let port_maps = Protocol::ALL.map(|protocol| {
            let tables = &built[protocol.index()];
            build_port_rule_map(ports.proto(protocol), &tables.src, &tables.dst, tables.any)
        });

        let service_groups =
            build_service_groups(&assembler, &mut ctx, &mut groups, services, service_index)?;

        let compiled = compile_engines(&mut groups, self.parallel_allowed());
        let queued = ctx.queued_total();
        if compiled != queued {
            return Err(FastPatternError::EngineCountMismatch { queued, compiled });
        }

        for group in &mut groups {
            fold_group_trees(&mut ctx, ruleset, group)?;
        }
        fixup_registered_trees(&mut ctx.forest, ruleset, &ctx.registry);

        let summary = build_summary(&groups, &port_maps, &service_groups, &ctx, compiled);
        info!("{summary}");

        Ok(CompiledDetection {
            groups,
            port_maps,
            service_groups,
            forest: ctx.forest,
            rule_states: ctx.rule_states,
            summary,
        })
    }

    /// Build one group per locality of `table`, folding the protocol's
    /// any-port rules into each unless the split policy isolates them.
    #[allow(clippy::too_many_arguments)]
    fn build_table_groups(
        &self,
        assembler: &PortGroupAssembler<'_>,
        ctx: &mut BuildContext,
        groups: &mut Vec<PortGroup>,
        table: &PortTable,
        fold_any: Option<&PortObject>,
        protocol: Protocol,
        direction: PortDirection,
    ) -> Result<Vec<Option<GroupId>>> {
        let label = format!("{} {}", protocol.name(), direction.name());
        let mut built = Vec::with_capacity(table.objects.len());

        for object in &table.objects {
            if object.ports.is_empty() {
                built.push(None);
                continue;
            }

            let mut group = PortGroup::new();
            for &rule in &object.rules {
                assembler.add_rule(ctx, &mut group, rule, &label)?;
            }
            if let Some(any) = fold_any {
                for &rule in &any.rules {
                    assembler.add_rule(ctx, &mut group, rule, &label)?;
                }
            }

            match assembler.finish(ctx, group, &label)? {
                Some(done) => {
                    let gid = groups.len() as GroupId;
                    groups.push(done);
                    built.push(Some(gid));
                }
                None => built.push(None),
            }
        }
        Ok(built)
    }

    /// The dedicated any-port group is always built from the any locality
    /// alone, whatever the split policy says.
    fn build_any_group(
        &self,
        assembler: &PortGroupAssembler<'_>,
        ctx: &mut BuildContext,
        groups: &mut Vec<PortGroup>,
        any: &PortObject,
        protocol: Protocol,
    ) -> Result<Option<GroupId>> {
        let label = format!("{} any", protocol.name());
        let mut group = PortGroup::new();
        for &rule in &any.rules {
            assembler.add_rule(ctx, &mut group, rule, &label)?;
        }
        match assembler.finish(ctx, group, &label)? {
            Some(done) => {
                let gid = groups.len() as GroupId;
                groups.push(done);
                Ok(Some(gid))
            }
            None => Ok(None),
        }
    }

    fn parallel_allowed(&self) -> bool {
        if self.reloading {
            return false;
        }
        if !backend_for(self.config.search_method).parallel_compile() {
            return false;
        }
        match self.config.offload_search_method {
            Some(method) => backend_for(method).parallel_compile(),
            None => true,
        }
    }
}

/// Compile every queued engine and return the success count. Failures are
/// logged and surface through the caller's count check.
fn compile_engines(groups: &mut [PortGroup], parallel: bool) -> u32 {
    if parallel {
        groups.par_iter_mut().map(compile_group_engines).sum()
    } else {
        groups.iter_mut().map(compile_group_engines).sum()
    }
}

fn compile_group_engines(group: &mut PortGroup) -> u32 {
    let mut compiled = 0;
    for engines in group.engines.iter_mut().flatten() {
        for role in [EngineRole::Primary, EngineRole::Offload] {
            if let Some(instance) = engines.slot_mut(role).as_mut() {
                match instance.engine.compile() {
                    Ok(()) => compiled += 1,
                    Err(e) => warn!("{} engine compile failed: {e}", role.name()),
                }
            }
        }
    }
    compiled
}

/// Replay every engine's associations into the group's shared tree. The
/// walk is sequential; only the last engine of a pair finalizes the root.
fn fold_group_trees(ctx: &mut BuildContext, ruleset: &RuleSet, group: &mut PortGroup) -> Result<()> {
    for engines in group.engines.iter_mut().flatten() {
        let SearchEngineGroup {
            primary,
            offload,
            tree,
        } = engines;
        let has_offload = offload.is_some();

        if let Some(instance) = primary.as_mut() {
            let mut folder = TreeFolder {
                forest: &mut ctx.forest,
                registry: &mut ctx.registry,
                ruleset,
                rule_states: &ctx.rule_states,
                role: EngineRole::Primary,
                root: &mut *tree,
                negated: &mut instance.negated,
                finalize_on_finish: !has_offload,
            };
            instance.engine.build_trees(&mut folder)?;
        }
        if let Some(instance) = offload.as_mut() {
            let mut folder = TreeFolder {
                forest: &mut ctx.forest,
                registry: &mut ctx.registry,
                ruleset,
                rule_states: &ctx.rule_states,
                role: EngineRole::Offload,
                root: tree,
                negated: &mut instance.negated,
                finalize_on_finish: true,
            };
            instance.engine.build_trees(&mut folder)?;
        }
    }
    Ok(())
}

fn build_summary(
    groups: &[PortGroup],
    port_maps: &[PortRuleMap; Protocol::COUNT],
    service_groups: &ServiceGroupMap,
    ctx: &BuildContext,
    engines_compiled: u32,
) -> CompileSummary {
    let mut summary = CompileSummary {
        patterns_truncated: ctx.patterns_truncated,
        engines_compiled,
        to_srv_groups: service_groups.to_srv.len() as u32,
        to_cli_groups: service_groups.to_cli.len() as u32,
        group_count: groups.len() as u32,
        ..CompileSummary::default()
    };

    for group in groups {
        for (buffer, slot) in group.engines.iter().enumerate() {
            if let Some(engines) = slot {
                for role in [EngineRole::Primary, EngineRole::Offload] {
                    if let Some(instance) = engines.slot(role) {
                        summary.patterns[buffer][role.index()] +=
                            instance.engine.pattern_count() as u64;
                    }
                }
            }
        }
    }

    for protocol in Protocol::ALL {
        let map = &port_maps[protocol.index()];
        summary.port_counts[protocol.index()] = ProtocolSummary {
            src_groups: map.src_group_count,
            dst_groups: map.dst_group_count,
            any_group: map.any.is_some(),
            src_rules: map.src_rule_count,
            dst_rules: map.dst_rule_count,
            any_rules: map.any_rule_count,
        };
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchMethod;
    use crate::pattern::PatternMatchData;
    use crate::rules::{Condition, OptionData, Rule, RuleId, SignatureId};

    fn content_rule(set: &mut RuleSet, sid: u32, pattern: &[u8]) -> RuleId {
        let opt = set.add_option(OptionData::Pattern(PatternMatchData::literal(
            pattern,
            BufferType::Packet,
        )));
        set.add_rule(Rule::new(SignatureId::new(1, sid, 1), vec![Condition::new(opt)]))
    }

    fn tcp_dst_input(set: &RuleSet, port: u16) -> RulePortTables {
        let mut ports = RulePortTables::new();
        ports.tcp.dst.objects.push(PortObject::new(
            vec![port],
            (0..set.rule_count() as RuleId).collect(),
        ));
        ports
    }

    #[test]
    fn test_empty_rule_set_short_circuits() {
        let compiler = FastPatternCompiler::new(FastPatternConfig::new());
        let out = compiler
            .compile(
                &RuleSet::new(),
                &RulePortTables::new(),
                &ServiceRuleMap::new(),
                &ServiceIndex::new(),
            )
            .unwrap();

        assert!(out.groups.is_empty());
        assert_eq!(out.summary, CompileSummary::default());
        assert_eq!(out.port_map(Protocol::Tcp).lookup(PortDirection::Dst, 80), None);
    }

    #[test]
    fn test_port_rules_compile_end_to_end() {
        let mut set = RuleSet::new();
        content_rule(&mut set, 1, b"attack-one");
        content_rule(&mut set, 2, b"attack-two");
        let ports = tcp_dst_input(&set, 80);

        let compiler = FastPatternCompiler::new(FastPatternConfig::new());
        let out = compiler
            .compile(&set, &ports, &ServiceRuleMap::new(), &ServiceIndex::new())
            .unwrap();

        assert_eq!(out.groups.len(), 1);
        let gid = out.port_map(Protocol::Tcp).lookup(PortDirection::Dst, 80);
        assert!(gid.is_some());
        let group = out.group(gid.unwrap()).unwrap();
        let engines = group.engines[BufferType::Packet.index()].as_ref().unwrap();
        assert_eq!(engines.primary.as_ref().unwrap().engine.pattern_count(), 2);
        assert!(engines.tree.is_some());
        assert_eq!(out.summary.engines_compiled, 1);
        assert!(out.forest.validate().is_ok());
    }

    #[test]
    fn test_any_any_folds_unless_split() {
        let mut set = RuleSet::new();
        let port_rule = content_rule(&mut set, 1, b"port-pattern");
        let any_rule = content_rule(&mut set, 2, b"any-pattern");

        let mut ports = RulePortTables::new();
        ports.tcp.dst.objects.push(PortObject::new(vec![80], vec![port_rule]));
        ports.tcp.any = PortObject::new(Vec::new(), vec![any_rule]);

        let folded = FastPatternCompiler::new(FastPatternConfig::new())
            .compile(&set, &ports, &ServiceRuleMap::new(), &ServiceIndex::new())
            .unwrap();
        let gid = folded
            .port_map(Protocol::Tcp)
            .lookup(PortDirection::Dst, 80)
            .unwrap();
        let engines = folded.group(gid).unwrap().engines[BufferType::Packet.index()]
            .as_ref()
            .unwrap();
        assert_eq!(engines.primary.as_ref().unwrap().engine.pattern_count(), 2);
        // The dedicated any group is built either way.
        assert!(folded.port_map(Protocol::Tcp).any.is_some());

        let split = FastPatternCompiler::new(FastPatternConfig::new().with_split_any_any(true))
            .compile(&set, &ports, &ServiceRuleMap::new(), &ServiceIndex::new())
            .unwrap();
        let gid = split
            .port_map(Protocol::Tcp)
            .lookup(PortDirection::Dst, 80)
            .unwrap();
        let engines = split.group(gid).unwrap().engines[BufferType::Packet.index()]
            .as_ref()
            .unwrap();
        assert_eq!(engines.primary.as_ref().unwrap().engine.pattern_count(), 1);
        assert!(split.port_map(Protocol::Tcp).any.is_some());
    }

    #[test]
    fn test_portless_locality_skipped() {
        let mut set = RuleSet::new();
        let rule = content_rule(&mut set, 1, b"unreachable");
        let mut ports = RulePortTables::new();
        ports.udp.src.objects.push(PortObject::new(Vec::new(), vec![rule]));

        let out = FastPatternCompiler::new(FastPatternConfig::new())
            .compile(&set, &ports, &ServiceRuleMap::new(), &ServiceIndex::new())
            .unwrap();

        assert!(out.groups.is_empty());
        assert_eq!(out.port_map(Protocol::Udp).src_group_count, 0);
    }

    #[test]
    fn test_invalid_regex_fails_count_check() {
        let mut set = RuleSet::new();
        let opt = set.add_option(OptionData::Pattern(PatternMatchData::regex(
            b"unclosed(group",
            BufferType::Packet,
        )));
        set.add_rule(Rule::new(SignatureId::new(1, 1, 1), vec![Condition::new(opt)]));
        let ports = tcp_dst_input(&set, 443);

        let config = FastPatternConfig::new().with_search_method(SearchMethod::RegexSet);
        let err = FastPatternCompiler::new(config)
            .compile(&set, &ports, &ServiceRuleMap::new(), &ServiceIndex::new())
            .unwrap_err();

        assert_eq!(
            err,
            FastPatternError::EngineCountMismatch {
                queued: 1,
                compiled: 0
            }
        );
    }

    #[test]
    fn test_fully_consumed_rule_has_leaf_only_tree() {
        let mut set = RuleSet::new();
        content_rule(&mut set, 9, b"whole-pattern");
        let ports = tcp_dst_input(&set, 8080);

        let out = FastPatternCompiler::new(FastPatternConfig::new())
            .compile(&set, &ports, &ServiceRuleMap::new(), &ServiceIndex::new())
            .unwrap();

        let gid = out
            .port_map(Protocol::Tcp)
            .lookup(PortDirection::Dst, 8080)
            .unwrap();
        let engines = out.group(gid).unwrap().engines[BufferType::Packet.index()]
            .as_ref()
            .unwrap();
        let root = engines.tree.unwrap();
        let children = &out.forest.root(root).children;
        assert_eq!(children.len(), 1);
        assert!(out.forest.node(children[0]).is_leaf());
    }

    #[test]
    fn test_rebuild_produces_identical_summary() {
        let mut set = RuleSet::new();
        content_rule(&mut set, 1, b"alpha");
        content_rule(&mut set, 2, b"beta");
        let ports = tcp_dst_input(&set, 80);
        let mut services = ServiceRuleMap::new();
        services.add_to_srv("http", 0);
        let mut index = ServiceIndex::new();
        index.add("http");

        let compiler = FastPatternCompiler::new(FastPatternConfig::new());
        let first = compiler.compile(&set, &ports, &services, &index).unwrap();
        let second = compiler.compile(&set, &ports, &services, &index).unwrap();

        assert_eq!(first.summary, second.summary);
        assert_eq!(first.groups.len(), second.groups.len());
    }

    #[test]
    fn test_reloading_forces_sequential_path() {
        let mut set = RuleSet::new();
        content_rule(&mut set, 1, b"still-compiles");
        let ports = tcp_dst_input(&set, 80);

        let out = FastPatternCompiler::new(FastPatternConfig::new())
            .reloading(true)
            .compile(&set, &ports, &ServiceRuleMap::new(), &ServiceIndex::new())
            .unwrap();

        assert_eq!(out.summary.engines_compiled, 1);
    }

    #[test]
    fn test_summary_display_sections() {
        let mut summary = CompileSummary::default();
        summary.group_count = 2;
        summary.port_counts[Protocol::Tcp.index()] = ProtocolSummary {
            src_groups: 0,
            dst_groups: 1,
            any_group: true,
            src_rules: 0,
            dst_rules: 4,
            any_rules: 1,
        };
        summary.patterns[BufferType::Packet.index()][EngineRole::Primary.index()] = 5;
        summary.patterns_truncated = 1;
        summary.engines_compiled = 2;

        let text = summary.to_string();
        assert!(text.contains("tcp"));
        assert!(text.contains("truncated patterns: 1"));
        assert!(text.contains("search engines compiled: 2"));
        // Protocols with nothing built stay out of the table.
        assert!(!text.contains("icmp"));
    }
}
