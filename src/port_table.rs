//! Port-keyed rule localities and the dense port-to-group lookup tables.
//!
//! Callers hand the compiler pre-merged [`PortObject`]s: every port with an
//! identical rule set shares one object, so the mapper only fans each built
//! group out to the ports its object covers. One [`PortRuleMap`] per
//! protocol gives the runtime O(1) group lookup by port and direction.

use crate::port_group::GroupId;
use crate::rules::RuleId;

/// Full 16-bit port space covered by each direction table.
pub const MAX_PORTS: usize = 65536;

/// Protocols with port-keyed rule groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Ip,
    Icmp,
    Tcp,
    Udp,
}

impl Protocol {
    pub const COUNT: usize = 4;

    pub const ALL: [Protocol; Protocol::COUNT] =
        [Protocol::Ip, Protocol::Icmp, Protocol::Tcp, Protocol::Udp];

    pub fn index(self) -> usize {
        match self {
            Protocol::Ip => 0,
            Protocol::Icmp => 1,
            Protocol::Tcp => 2,
            Protocol::Udp => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Protocol::Ip => "ip",
            Protocol::Icmp => "icmp",
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

/// Traffic direction a port table applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Src,
    Dst,
}

impl PortDirection {
    pub fn name(self) -> &'static str {
        match self {
            PortDirection::Src => "src",
            PortDirection::Dst => "dst",
        }
    }
}

/// One pre-merged locality: the ports it covers and the rules active there.
#[derive(Debug, Clone, Default)]
pub struct PortObject {
    pub ports: Vec<u16>,
    pub rules: Vec<RuleId>,
}

impl PortObject {
    pub fn new(ports: Vec<u16>, rules: Vec<RuleId>) -> Self {
        Self { ports, rules }
    }
}

/// All localities for one protocol and direction.
#[derive(Debug, Clone, Default)]
pub struct PortTable {
    pub objects: Vec<PortObject>,
}

/// Port input for one protocol.
#[derive(Debug, Clone, Default)]
pub struct ProtocolTables {
    pub src: PortTable,
    pub dst: PortTable,
    /// Rules applying regardless of port.
    pub any: PortObject,
}

/// Port input for the whole build.
#[derive(Debug, Clone, Default)]
pub struct RulePortTables {
    pub ip: ProtocolTables,
    pub icmp: ProtocolTables,
    pub tcp: ProtocolTables,
    pub udp: ProtocolTables,
}

impl RulePortTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn proto(&self, protocol: Protocol) -> &ProtocolTables {
        match protocol {
            Protocol::Ip => &self.ip,
            Protocol::Icmp => &self.icmp,
            Protocol::Tcp => &self.tcp,
            Protocol::Udp => &self.udp,
        }
    }

    pub fn proto_mut(&mut self, protocol: Protocol) -> &mut ProtocolTables {
        match protocol {
            Protocol::Ip => &mut self.ip,
            Protocol::Icmp => &mut self.icmp,
            Protocol::Tcp => &mut self.tcp,
            Protocol::Udp => &mut self.udp,
        }
    }
}

/// Dense port-to-group lookup for one protocol.
#[derive(Debug, Clone)]
pub struct PortRuleMap {
    src: Vec<Option<GroupId>>,
    dst: Vec<Option<GroupId>>,
    /// Group for the protocol's any-port rules.
    pub any: Option<GroupId>,
    pub src_group_count: u32,
    pub dst_group_count: u32,
    pub src_rule_count: u32,
    pub dst_rule_count: u32,
    pub any_rule_count: u32,
}

impl Default for PortRuleMap {
    fn default() -> Self {
        Self::new()
    }
}

impl PortRuleMap {
    pub fn new() -> Self {
        Self {
            src: vec![None; MAX_PORTS],
            dst: vec![None; MAX_PORTS],
            any: None,
            src_group_count: 0,
            dst_group_count: 0,
            src_rule_count: 0,
            dst_rule_count: 0,
            any_rule_count: 0,
        }
    }

    pub fn lookup(&self, direction: PortDirection, port: u16) -> Option<GroupId> {
        match direction {
            PortDirection::Src => self.src[port as usize],
            PortDirection::Dst => self.dst[port as usize],
        }
    }
}

/// Build one protocol's lookup map from its built localities.
///
/// `src_groups`/`dst_groups` align with the object order of the respective
/// table; `None` marks a locality whose group was discarded. Rules of
/// discarded localities do not count.
pub fn build_port_rule_map(
    tables: &ProtocolTables,
    src_groups: &[Option<GroupId>],
    dst_groups: &[Option<GroupId>],
    any_group: Option<GroupId>,
) -> PortRuleMap {
    let mut map = PortRuleMap::new();
    map.any = any_group;
    map.any_rule_count = tables.any.rules.len() as u32;

    fan_out(
        &tables.src,
        src_groups,
        &mut map.src,
        &mut map.src_group_count,
        &mut map.src_rule_count,
    );
    fan_out(
        &tables.dst,
        dst_groups,
        &mut map.dst,
        &mut map.dst_group_count,
        &mut map.dst_rule_count,
    );
    map
}

fn fan_out(
    table: &PortTable,
    built: &[Option<GroupId>],
    slots: &mut [Option<GroupId>],
    group_count: &mut u32,
    rule_count: &mut u32,
) {
    for (object, group) in table.objects.iter().zip(built) {
        let group = match group {
            Some(group) => *group,
            None => continue,
        };
        *group_count += 1;
        *rule_count += object.rules.len() as u32;
        for &port in &object.ports {
            slots[port as usize] = Some(group);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_covers_every_object_port() {
        let mut tables = ProtocolTables::default();
        tables.dst.objects.push(PortObject::new(vec![80, 8080], vec![0, 1]));
        tables.dst.objects.push(PortObject::new(vec![443], vec![2]));

        let map = build_port_rule_map(&tables, &[], &[Some(10), Some(11)], None);

        assert_eq!(map.lookup(PortDirection::Dst, 80), Some(10));
        assert_eq!(map.lookup(PortDirection::Dst, 8080), Some(10));
        assert_eq!(map.lookup(PortDirection::Dst, 443), Some(11));
        assert_eq!(map.lookup(PortDirection::Dst, 81), None);
        assert_eq!(map.dst_group_count, 2);
        assert_eq!(map.dst_rule_count, 3);
    }

    #[test]
    fn test_discarded_locality_leaves_no_mapping() {
        let mut tables = ProtocolTables::default();
        tables.src.objects.push(PortObject::new(vec![53], vec![0]));

        let map = build_port_rule_map(&tables, &[None], &[], None);

        assert_eq!(map.lookup(PortDirection::Src, 53), None);
        assert_eq!(map.src_group_count, 0);
        assert_eq!(map.src_rule_count, 0);
    }

    #[test]
    fn test_directions_are_independent() {
        let mut tables = ProtocolTables::default();
        tables.src.objects.push(PortObject::new(vec![25], vec![0]));
        tables.dst.objects.push(PortObject::new(vec![25], vec![1]));

        let map = build_port_rule_map(&tables, &[Some(1)], &[Some(2)], None);

        assert_eq!(map.lookup(PortDirection::Src, 25), Some(1));
        assert_eq!(map.lookup(PortDirection::Dst, 25), Some(2));
    }

    #[test]
    fn test_any_slot_and_rule_count() {
        let mut tables = ProtocolTables::default();
        tables.any = PortObject::new(Vec::new(), vec![4, 5, 6]);

        let map = build_port_rule_map(&tables, &[], &[], Some(7));

        assert_eq!(map.any, Some(7));
        assert_eq!(map.any_rule_count, 3);
    }

    #[test]
    fn test_extreme_ports_addressable() {
        let mut tables = ProtocolTables::default();
        tables.dst.objects.push(PortObject::new(vec![0, 65535], vec![0]));

        let map = build_port_rule_map(&tables, &[], &[Some(3)], None);

        assert_eq!(map.lookup(PortDirection::Dst, 0), Some(3));
        assert_eq!(map.lookup(PortDirection::Dst, 65535), Some(3));
    }

    #[test]
    fn test_protocol_round_trip() {
        for (i, protocol) in Protocol::ALL.iter().enumerate() {
            assert_eq!(protocol.index(), i);
            assert!(!protocol.name().is_empty());
        }

        let mut tables = RulePortTables::new();
        tables.proto_mut(Protocol::Udp).any.rules.push(9);
        assert_eq!(tables.proto(Protocol::Udp).any.rules, vec![9]);
        assert!(tables.proto(Protocol::Tcp).any.rules.is_empty());
    }
}
