/// Rule headers: draft specs, canonical shared nodes, and the
/// per-header detection-function chain
use super::addr::AddrSet;
use super::ports::PortObject;
use super::rule::{HeaderFlags, Protocol, RuleAction};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// An action list; every header links back to the list for its action
#[derive(Debug)]
pub struct RuleList {
    pub action: RuleAction,
    pub name: &'static str,
}

impl RuleList {
    pub fn new(action: RuleAction) -> Self {
        let name = match action {
            RuleAction::Alert => "alert",
            RuleAction::Log => "log",
            RuleAction::Pass => "pass",
            RuleAction::Drop => "drop",
            RuleAction::Reject => "reject",
        };
        RuleList { action, name }
    }
}

/// Header fields assembled by the rule parsers, before canonicalisation
#[derive(Debug, Clone)]
pub struct HeaderSpec {
    pub action: RuleAction,
    pub list: Arc<RuleList>,
    pub proto: Protocol,
    pub flags: HeaderFlags,
    pub sip: Arc<AddrSet>,
    pub dip: Arc<AddrSet>,
    pub src_ports: Arc<PortObject>,
    pub dst_ports: Arc<PortObject>,
}

/// One step of a header's detection-function chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStep {
    CheckBidirectional,
    CheckDstPortEqual,
    CheckDstPortNotEq,
    CheckSrcPortEqual,
    CheckSrcPortNotEq,
    CheckSrcIp,
    CheckDstIp,
    RuleListEnd,
}

/// Canonical rule header shared by every signature with identical
/// header fields within one policy. `ref_count` tracks how many
/// signature/policy bindings point here.
#[derive(Debug)]
pub struct RuleHeader {
    pub action: RuleAction,
    pub list: Arc<RuleList>,
    pub proto: Protocol,
    pub flags: HeaderFlags,
    pub sip: Arc<AddrSet>,
    pub dip: Arc<AddrSet>,
    pub src_ports: Arc<PortObject>,
    pub dst_ports: Arc<PortObject>,
    pub head_node_number: u32,
    pub chain: Vec<DetectionStep>,
    ref_count: AtomicU32,
}

impl RuleHeader {
    /// Install a draft as a canonical header, building its detection
    /// chain. The initial reference belongs to the rule being parsed.
    pub fn install(spec: HeaderSpec, head_node_number: u32) -> Arc<RuleHeader> {
        let chain = build_chain(spec.flags);
        Arc::new(RuleHeader {
            action: spec.action,
            list: spec.list,
            proto: spec.proto,
            flags: spec.flags,
            sip: spec.sip,
            dip: spec.dip,
            src_ports: spec.src_ports,
            dst_ports: spec.dst_ports,
            head_node_number,
            chain,
            ref_count: AtomicU32::new(1),
        })
    }

    /// Header equality for canonicalisation. Address sets compare
    /// structurally; port objects compare by pointer, which coincides
    /// with set equality because every inline list goes through the
    /// anonymous table first.
    pub fn matches(&self, spec: &HeaderSpec) -> bool {
        self.action == spec.action
            && Arc::ptr_eq(&self.list, &spec.list)
            && self.proto == spec.proto
            && self.flags == spec.flags
            && *self.sip == *spec.sip
            && *self.dip == *spec.dip
            && Arc::ptr_eq(&self.src_ports, &spec.src_ports)
            && Arc::ptr_eq(&self.dst_ports, &spec.dst_ports)
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Relaxed)
    }

    pub(crate) fn add_ref(&self) {
        self.ref_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn release(&self) {
        self.ref_count.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Build the ordered detection chain for a header. Bidirectional
/// headers get the combined check; otherwise port checks come before IP
/// checks and each is omitted when the matching any-flag is set.
fn build_chain(flags: HeaderFlags) -> Vec<DetectionStep> {
    let mut chain = Vec::new();

    if flags.contains(HeaderFlags::BIDIRECTIONAL) {
        chain.push(DetectionStep::CheckBidirectional);
    } else {
        if !flags.contains(HeaderFlags::ANY_DST_PORT) {
            if flags.contains(HeaderFlags::EXCEPT_DST_PORT) {
                chain.push(DetectionStep::CheckDstPortNotEq);
            } else {
                chain.push(DetectionStep::CheckDstPortEqual);
            }
        }
        if !flags.contains(HeaderFlags::ANY_SRC_PORT) {
            if flags.contains(HeaderFlags::EXCEPT_SRC_PORT) {
                chain.push(DetectionStep::CheckSrcPortNotEq);
            } else {
                chain.push(DetectionStep::CheckSrcPortEqual);
            }
        }
        if !flags.contains(HeaderFlags::ANY_SRC_IP) {
            chain.push(DetectionStep::CheckSrcIp);
        }
        if !flags.contains(HeaderFlags::ANY_DST_IP) {
            chain.push(DetectionStep::CheckDstIp);
        }
    }

    chain.push(DetectionStep::RuleListEnd);
    chain
}
