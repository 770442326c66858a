/// Ingestion statistics: session counters, per-protocol rule counts,
/// and the per-rule debug records
use crate::rules::{Protocol, RuleAction};
use std::fmt;
use tracing::debug;

/// Upper bound on retained per-rule debug records
pub const MAX_RULE_COUNT: usize = 65536;

const LOG_DIV: &str = "--------------------------------------------------";

/// Rule counts for the port-group tables of one protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtoRuleCounts {
    /// Specific source port
    pub src: u32,
    /// Specific destination port
    pub dst: u32,
    /// Any-any group (including promoted rules)
    pub aa: u32,
    /// Both src and dst ports specific
    pub sd: u32,
    /// No content and no uricontent
    pub nc: u32,
}

/// The per-protocol counter block
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleCounts {
    pub tcp: ProtoRuleCounts,
    pub udp: ProtoRuleCounts,
    pub icmp: ProtoRuleCounts,
    pub ip: ProtoRuleCounts,
}

impl RuleCounts {
    pub fn for_proto(&self, proto: Protocol) -> &ProtoRuleCounts {
        match proto {
            Protocol::Tcp => &self.tcp,
            Protocol::Udp => &self.udp,
            Protocol::Icmp => &self.icmp,
            Protocol::Ip => &self.ip,
        }
    }

    pub fn for_proto_mut(&mut self, proto: Protocol) -> &mut ProtoRuleCounts {
        match proto {
            Protocol::Tcp => &mut self.tcp,
            Protocol::Udp => &mut self.udp,
            Protocol::Icmp => &mut self.icmp,
            Protocol::Ip => &mut self.ip,
        }
    }
}

/// Per-rule debug record kept for printing and troubleshooting
#[derive(Debug, Clone)]
pub struct PortListEntry {
    pub action: RuleAction,
    pub proto: Protocol,
    pub ip_proto: u8,
    pub gid: u32,
    pub sid: u32,
    pub bidirectional: bool,
    pub content: bool,
    pub uricontent: bool,
    pub src_port: Option<String>,
    pub dst_port: Option<String>,
}

/// Counters and records for one ingestion session
#[derive(Debug, Default)]
pub struct IngestStats {
    /// Accepted rules currently loaded
    pub rule_count: u32,
    /// Text rules among them
    pub detect_rule_count: u32,
    /// Builtin rules among them
    pub builtin_rule_count: u32,
    /// Canonical headers installed
    pub head_count: u32,
    /// Distinct option chains
    pub otn_count: u32,
    pub counts: RuleCounts,
    pub port_list: Vec<PortListEntry>,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_entry(&mut self, entry: PortListEntry) {
        if self.port_list.len() >= MAX_RULE_COUNT {
            debug!(
                "port list full, dropping record for {}:{}",
                entry.gid, entry.sid
            );
            return;
        }
        self.port_list.push(entry);
    }
}

impl fmt::Display for IngestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", LOG_DIV)?;
        writeln!(f, "rule counts")?;
        writeln!(f, "{:>25}: {:<12}", "total rules loaded", self.rule_count)?;

        if self.rule_count == 0 {
            return Ok(());
        }

        writeln!(f, "{:>25}: {:<12}", "text rules", self.detect_rule_count)?;
        writeln!(f, "{:>25}: {:<12}", "builtin rules", self.builtin_rule_count)?;
        writeln!(f, "{:>25}: {:<12}", "option chains", self.otn_count)?;
        writeln!(f, "{:>25}: {:<12}", "chain headers", self.head_count)?;

        writeln!(f, "{}", LOG_DIV)?;
        writeln!(f, "rule port counts")?;
        writeln!(f, "{:>8}{:>8}{:>8}{:>8}{:>8}", " ", "tcp", "udp", "icmp", "ip")?;

        let rows: [(&str, fn(&ProtoRuleCounts) -> u32); 5] = [
            ("src", |c| c.src),
            ("dst", |c| c.dst),
            ("any", |c| c.aa),
            ("nc", |c| c.nc),
            ("s+d", |c| c.sd),
        ];

        for (label, get) in rows {
            let (t, u, i, p) = (
                get(&self.counts.tcp),
                get(&self.counts.udp),
                get(&self.counts.icmp),
                get(&self.counts.ip),
            );
            if t != 0 || u != 0 || i != 0 || p != 0 {
                writeln!(f, "{:>8}{:>8}{:>8}{:>8}{:>8}", label, t, u, i, p)?;
            }
        }

        Ok(())
    }
}
