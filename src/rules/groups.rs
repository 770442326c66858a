/// Port-keyed rule groups: after a signature is finalised its dense
/// index lands in the src/dst/any-any group for its protocol
use super::header::RuleHeader;
use super::ports::PortObject;
use super::rule::{HeaderFlags, Protocol};
use super::signature::{IpProtoConstraint, Signature};
use crate::config::FastPatternConfig;
use crate::stats::{PortListEntry, RuleCounts};
use tracing::warn;

/// Group table for one protocol and one direction. Entries own their
/// port objects; rule indices are collected in place.
#[derive(Debug, Default)]
pub struct GroupTable {
    entries: Vec<PortObject>,
}

impl GroupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_by_ports(&self, po: &PortObject) -> Option<&PortObject> {
        self.entries.iter().find(|e| e.same_ports(po))
    }

    /// Locate the entry with this port set, or create it by duplicating
    /// the ports (without the attached rules)
    pub fn find_or_insert(&mut self, po: &PortObject) -> &mut PortObject {
        if let Some(pos) = self.entries.iter().position(|e| e.same_ports(po)) {
            return &mut self.entries[pos];
        }
        let index = self.entries.len();
        self.entries.push(po.dup_ports());
        &mut self.entries[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &PortObject> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The src/dst/any-any triple for one protocol
#[derive(Debug)]
pub struct ProtoGroups {
    pub src: GroupTable,
    pub dst: GroupTable,
    pub any_any: PortObject,
}

impl ProtoGroups {
    fn new() -> Self {
        ProtoGroups {
            src: GroupTable::new(),
            dst: GroupTable::new(),
            any_any: PortObject::any_port(),
        }
    }
}

impl Default for ProtoGroups {
    fn default() -> Self {
        Self::new()
    }
}

/// All rule group tables the packet engine reads after ingestion
#[derive(Debug, Default)]
pub struct RulePortTables {
    pub tcp: ProtoGroups,
    pub udp: ProtoGroups,
    pub icmp: ProtoGroups,
    pub ip: ProtoGroups,
}

impl RulePortTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn groups(&self, proto: Protocol) -> &ProtoGroups {
        match proto {
            Protocol::Tcp => &self.tcp,
            Protocol::Udp => &self.udp,
            Protocol::Icmp => &self.icmp,
            Protocol::Ip => &self.ip,
        }
    }

    pub fn groups_mut(&mut self, proto: Protocol) -> &mut ProtoGroups {
        match proto {
            Protocol::Tcp => &mut self.tcp,
            Protocol::Udp => &mut self.udp,
            Protocol::Icmp => &mut self.icmp,
            Protocol::Ip => &mut self.ip,
        }
    }
}

/// Finish adding a rule to the port tables:
/// no-content rules are counted, overly large port sets are promoted
/// to the any-any group (bleedover), any-any rules land in the any-any
/// object, and everything else joins the src/dst group tables keyed by
/// its port set. All-IP any-any rules additionally propagate to the
/// TCP/UDP/ICMP any-any groups their ip_proto constraint allows.
pub fn finish_rule(
    tables: &mut RulePortTables,
    counts: &mut RuleCounts,
    header: &RuleHeader,
    sig: &Signature,
    proto: Protocol,
    entry: &PortListEntry,
    fp: &FastPatternConfig,
) {
    let flags = header.flags;
    let fully_any = flags.contains(HeaderFlags::ANY_SRC_PORT | HeaderFlags::ANY_DST_PORT);
    let rim_index = sig.rule_index;

    {
        let prc = counts.for_proto_mut(proto);
        if !flags.contains(HeaderFlags::ANY_DST_PORT) && !flags.contains(HeaderFlags::ANY_SRC_PORT)
        {
            prc.sd += 1;
        }
        if !entry.content && !entry.uricontent {
            prc.nc += 1;
        }
    }

    // Port bleedover: a specific port set larger than the configured
    // limit is promoted to the any-any group so no per-port group grows
    // unbounded. Pointless when a single rule group is in use.
    let mut large_port_group = false;
    let mut src_cnt = 0;
    let mut dst_cnt = 0;
    if !fp.single_rule_group && !fully_any {
        if !flags.contains(HeaderFlags::ANY_SRC_PORT) {
            src_cnt = header.src_ports.port_count();
            if src_cnt > fp.bleedover_port_limit {
                large_port_group = true;
            }
        }

        if !flags.contains(HeaderFlags::ANY_DST_PORT) {
            dst_cnt = header.dst_ports.port_count();
            if dst_cnt > fp.bleedover_port_limit {
                large_port_group = true;
            }
        }

        if large_port_group && fp.bleedover_warnings {
            warn!(
                "bleedover port limit ({}) exceeded for rule {}:{} ({} ports): {} -> {} \
                 adding to any-any group",
                fp.bleedover_port_limit,
                sig.gid(),
                sig.sid(),
                src_cnt.max(dst_cnt),
                header.src_ports,
                header.dst_ports,
            );
        }
    }

    if fully_any || large_port_group || fp.single_rule_group {
        if proto == Protocol::Ip {
            // All-IP rules also feed the higher-level protocol groups
            // they can apply to; rules pinned to some other protocol
            // stay in the IP table alone
            match sig.effective_ip_proto() {
                IpProtoConstraint::Equals(6) => {
                    tables.tcp.any_any.add_rule(rim_index);
                    counts.tcp.aa += 1;
                }
                IpProtoConstraint::Equals(17) => {
                    tables.udp.any_any.add_rule(rim_index);
                    counts.udp.aa += 1;
                }
                IpProtoConstraint::Equals(1) => {
                    tables.icmp.any_any.add_rule(rim_index);
                    counts.icmp.aa += 1;
                }
                IpProtoConstraint::Unconstrained => {
                    tables.tcp.any_any.add_rule(rim_index);
                    counts.tcp.aa += 1;
                    tables.udp.any_any.add_rule(rim_index);
                    counts.udp.aa += 1;
                    tables.icmp.any_any.add_rule(rim_index);
                    counts.icmp.aa += 1;
                }
                IpProtoConstraint::Equals(_) | IpProtoConstraint::Other => {}
            }

            tables.ip.any_any.add_rule(rim_index);
            counts.ip.aa += 1;
        } else {
            tables.groups_mut(proto).any_any.add_rule(rim_index);
            counts.for_proto_mut(proto).aa += 1;
        }

        return;
    }

    let bidirectional = flags.contains(HeaderFlags::BIDIRECTIONAL);
    let groups = tables.groups_mut(proto);

    if !flags.contains(HeaderFlags::ANY_DST_PORT) {
        counts.for_proto_mut(proto).dst += 1;
        groups.dst.find_or_insert(&header.dst_ports).add_rule(rim_index);

        if bidirectional {
            groups.src.find_or_insert(&header.dst_ports).add_rule(rim_index);
        }
    }

    if !flags.contains(HeaderFlags::ANY_SRC_PORT) {
        counts.for_proto_mut(proto).src += 1;
        groups.src.find_or_insert(&header.src_ports).add_rule(rim_index);

        if bidirectional {
            groups.dst.find_or_insert(&header.src_ports).add_rule(rim_index);
        }
    }
}
