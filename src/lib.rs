//! # Fast-Pattern Detection Compiler
//!
//! A Rust library for compiling intrusion-detection rule sets into
//! multi-pattern search engines with shared rule-evaluation trees, in the
//! style of fast packet detection in network IDS engines.
//!
//! Rules are grouped by the traffic they can match (port localities and
//! service bindings). Each group gets one search engine per packet buffer
//! type, holding one fast pattern per rule; rules that cannot contribute a
//! usable pattern fall back to the group's always-searched list. A forest of
//! decision trees, shared across groups by shape, dispatches search hits to
//! full rule evaluation.
//!
//! ## Quick Start
//!
//! ```rust
//! use fastpattern_compiler::{
//!     BufferType, Condition, FastPatternCompiler, FastPatternConfig, OptionData,
//!     PatternMatchData, PortDirection, PortObject, Protocol, Rule, RuleSet,
//!     RulePortTables, ServiceIndex, ServiceRuleMap, SignatureId,
//! };
//!
//! // One rule: content "attack" in the packet buffer.
//! let mut rules = RuleSet::new();
//! let content = rules.add_option(OptionData::Pattern(PatternMatchData::literal(
//!     b"attack",
//!     BufferType::Packet,
//! )));
//! let rule = rules.add_rule(Rule::new(
//!     SignatureId::new(1, 1000, 1),
//!     vec![Condition::new(content)],
//! ));
//!
//! // Bind it to TCP destination port 80.
//! let mut ports = RulePortTables::new();
//! ports.tcp.dst.objects.push(PortObject::new(vec![80], vec![rule]));
//!
//! let compiler = FastPatternCompiler::new(FastPatternConfig::new());
//! let detection = compiler.compile(
//!     &rules,
//!     &ports,
//!     &ServiceRuleMap::new(),
//!     &ServiceIndex::new(),
//! )?;
//!
//! let group = detection.port_map(Protocol::Tcp).lookup(PortDirection::Dst, 80);
//! assert!(group.is_some());
//! # Ok::<(), fastpattern_compiler::FastPatternError>(())
//! ```
//!
//! ## Offload Engines
//!
//! ```rust,ignore
//! use fastpattern_compiler::{FastPatternConfig, SearchMethod};
//!
//! // Regex-capable primary engines, literal-only offload engines. Rules
//! // whose best pattern is a regex still reach the offload path through the
//! // group's offload fallback list.
//! let config = FastPatternConfig::new()
//!     .with_search_method(SearchMethod::RegexSet)
//!     .with_offload_search_method(SearchMethod::AhoCorasick);
//! ```

pub mod compile;
pub mod config;
pub mod error;
pub mod pattern;
pub mod port_group;
pub mod port_table;
pub mod rules;
pub mod search;
pub mod service_map;
pub mod tree;

// Primary compiler interface
pub use compile::{CompileSummary, CompiledDetection, FastPatternCompiler, ProtocolSummary};

// Configuration
pub use config::{FastPatternConfig, SearchMethod};

// Core types and errors
pub use error::{FastPatternError, Result};
pub use pattern::{select_fast_pattern, BufferType, FinalPattern, PatternMatchData};
pub use rules::{
    Condition, OptionData, OptionId, Rule, RuleBuildState, RuleId, RuleSet, SignatureId,
};

// Rule groups and their lookup maps
pub use port_group::{
    BuildContext, EngineInstance, GroupId, PortGroup, PortGroupAssembler, SearchEngineGroup,
};
pub use port_table::{
    build_port_rule_map, PortDirection, PortObject, PortRuleMap, PortTable, Protocol,
    ProtocolTables, RulePortTables, MAX_PORTS,
};
pub use service_map::{
    build_service_groups, ServiceDirection, ServiceGroupMap, ServiceId, ServiceIndex,
    ServiceRuleMap,
};

// Search engine abstraction (for custom backends and runtime integration)
pub use search::{
    backend_for, EngineRole, PatternDescriptor, RuleAssociation, SearchBackend, SearchEngine,
    TreeAgent,
};

// Decision trees (for runtime evaluation)
pub use tree::{
    TreeForest, TreeNode, TreeNodeId, TreeNodeKind, TreeRoot, TreeRootId, TreeStatistics,
};
