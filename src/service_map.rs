//! Service-keyed rule groups.
//!
//! Rules carrying service metadata group by `(service, direction)` instead
//! of by port. The input lists arrive pre-split into to-server and to-client
//! maps; each list becomes one [`PortGroup`] and is published both under the
//! service name and under its dense service id.

use std::collections::BTreeMap;

use log::debug;

use crate::error::{FastPatternError, Result};
use crate::port_group::{BuildContext, GroupId, PortGroup, PortGroupAssembler};
use crate::rules::RuleId;

/// Dense service identifier assigned by [`ServiceIndex`].
pub type ServiceId = u32;

/// Direction of service traffic a rule list applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceDirection {
    ToServer,
    ToClient,
}

impl ServiceDirection {
    pub const ALL: [ServiceDirection; 2] = [ServiceDirection::ToServer, ServiceDirection::ToClient];

    pub fn name(self) -> &'static str {
        match self {
            ServiceDirection::ToServer => "to-srv",
            ServiceDirection::ToClient => "to-cli",
        }
    }
}

/// Rule lists per service name, split by direction. Ordered iteration keeps
/// the build deterministic.
#[derive(Debug, Clone, Default)]
pub struct ServiceRuleMap {
    pub to_srv: BTreeMap<String, Vec<RuleId>>,
    pub to_cli: BTreeMap<String, Vec<RuleId>>,
}

impl ServiceRuleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_to_srv(&mut self, service: &str, rule: RuleId) {
        self.to_srv.entry(service.to_string()).or_default().push(rule);
    }

    pub fn add_to_cli(&mut self, service: &str, rule: RuleId) {
        self.to_cli.entry(service.to_string()).or_default().push(rule);
    }

    pub fn is_empty(&self) -> bool {
        self.to_srv.is_empty() && self.to_cli.is_empty()
    }

    fn lists(&self, direction: ServiceDirection) -> &BTreeMap<String, Vec<RuleId>> {
        match direction {
            ServiceDirection::ToServer => &self.to_srv,
            ServiceDirection::ToClient => &self.to_cli,
        }
    }
}

/// Assigns each service name a dense integer id.
#[derive(Debug, Clone, Default)]
pub struct ServiceIndex {
    ids: BTreeMap<String, ServiceId>,
}

impl ServiceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service name, returning its id. Re-registering returns
    /// the id assigned first.
    pub fn add(&mut self, name: &str) -> ServiceId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.ids.len() as ServiceId;
        self.ids.insert(name.to_string(), id);
        id
    }

    pub fn find(&self, name: &str) -> Option<ServiceId> {
        self.ids.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Built service groups: name-keyed and dense id-indexed lookup per
/// direction.
#[derive(Debug, Default)]
pub struct ServiceGroupMap {
    pub to_srv: BTreeMap<String, GroupId>,
    pub to_cli: BTreeMap<String, GroupId>,
    srv_by_id: Vec<Option<GroupId>>,
    cli_by_id: Vec<Option<GroupId>>,
}

impl ServiceGroupMap {
    pub fn new(service_count: usize) -> Self {
        Self {
            to_srv: BTreeMap::new(),
            to_cli: BTreeMap::new(),
            srv_by_id: vec![None; service_count],
            cli_by_id: vec![None; service_count],
        }
    }

    pub fn lookup(&self, direction: ServiceDirection, service: ServiceId) -> Option<GroupId> {
        let table = match direction {
            ServiceDirection::ToServer => &self.srv_by_id,
            ServiceDirection::ToClient => &self.cli_by_id,
        };
        table.get(service as usize).copied().flatten()
    }

    pub fn lookup_name(&self, direction: ServiceDirection, name: &str) -> Option<GroupId> {
        match direction {
            ServiceDirection::ToServer => self.to_srv.get(name).copied(),
            ServiceDirection::ToClient => self.to_cli.get(name).copied(),
        }
    }

    pub fn group_count(&self) -> usize {
        self.to_srv.len() + self.to_cli.len()
    }

    fn publish(&mut self, direction: ServiceDirection, name: &str, id: ServiceId, group: GroupId) {
        let (by_name, by_id) = match direction {
            ServiceDirection::ToServer => (&mut self.to_srv, &mut self.srv_by_id),
            ServiceDirection::ToClient => (&mut self.to_cli, &mut self.cli_by_id),
        };
        by_name.insert(name.to_string(), group);
        by_id[id as usize] = Some(group);
    }
}

/// Assemble one group per `(service, direction)` rule list and publish the
/// survivors. A service with rules but no assigned id fails the build.
pub fn build_service_groups(
    assembler: &PortGroupAssembler<'_>,
    ctx: &mut BuildContext,
    groups: &mut Vec<PortGroup>,
    services: &ServiceRuleMap,
    index: &ServiceIndex,
) -> Result<ServiceGroupMap> {
    let mut map = ServiceGroupMap::new(index.len());

    for direction in ServiceDirection::ALL {
        for (name, rules) in services.lists(direction) {
            let id = index
                .find(name)
                .ok_or_else(|| FastPatternError::UnknownService(name.clone()))?;

            let label = format!("{name} {}", direction.name());
            let mut group = PortGroup::new();
            for &rule in rules {
                assembler.add_rule(ctx, &mut group, rule, &label)?;
            }

            match assembler.finish(ctx, group, &label)? {
                Some(group) => {
                    let gid = groups.len() as GroupId;
                    groups.push(group);
                    map.publish(direction, name, id, gid);
                }
                None => debug!("{label}: no group built"),
            }
        }
    }
    Ok(map)
}
