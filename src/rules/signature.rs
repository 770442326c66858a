/// Signature nodes, the (gid, sid) signature map, the dense rule-index
/// map, and rule classifications
use super::header::RuleHeader;
use super::options::{CmpOp, Operator, OperatorKind};
use super::rule::Protocol;
use ahash::AHashMap;
use std::sync::Arc;

/// Identifies a named configuration scope; the same signature may bind
/// to different headers under different policies
pub type PolicyId = usize;

/// Generator id used for engine-built rules and as the default for
/// text rules without an explicit gid
pub const GENERATOR_ENGINE: u32 = 1;

/// External reference attached to a signature (reference:cve,2021-...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub scheme: String,
    pub id: String,
}

/// Signature identity and descriptive metadata
#[derive(Debug, Clone)]
pub struct SigInfo {
    pub generator: u32,
    pub id: u32,
    pub rev: u32,
    pub message: Option<String>,
    pub class_name: Option<String>,
    pub priority: u32,
    pub(crate) priority_set: bool,
    pub references: Vec<Reference>,
    pub metadata: Vec<(String, String)>,
    pub text_rule: bool,
}

impl SigInfo {
    fn new(text_rule: bool) -> Self {
        SigInfo {
            generator: GENERATOR_ENGINE,
            id: 0,
            rev: 0,
            message: None,
            class_name: None,
            priority: 0,
            priority_set: false,
            references: Vec::new(),
            metadata: Vec::new(),
            text_rule,
        }
    }
}

/// Per-instance runtime state; one slot per detection instance
#[derive(Debug, Clone, Copy, Default)]
pub struct SigState {
    pub checks: u64,
    pub matches: u64,
    pub alerts: u64,
}

/// Effective IP protocol constraint of a signature, derived from its
/// ip_proto operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpProtoConstraint {
    /// No ip_proto operator present
    Unconstrained,
    /// Constrained to exactly one protocol
    Equals(u8),
    /// Negated or ranged constraint
    Other,
}

/// A signature (option-tree node): identity, operator list, and the
/// per-policy bindings to canonical headers
#[derive(Debug, Clone)]
pub struct Signature {
    pub info: SigInfo,
    pub proto: Protocol,
    pub rule_index: usize,
    pub enabled: bool,
    pub chain_node_number: u32,
    pub ops: Vec<Operator>,
    pub num_detection_opts: usize,
    pub state: Vec<SigState>,
    headers: AHashMap<PolicyId, Arc<RuleHeader>>,
}

impl Signature {
    pub fn new(
        proto: Protocol,
        text_rule: bool,
        enabled: bool,
        instances: usize,
        chain_node_number: u32,
    ) -> Self {
        Signature {
            info: SigInfo::new(text_rule),
            proto,
            rule_index: 0,
            enabled,
            chain_node_number,
            ops: Vec::new(),
            num_detection_opts: 0,
            state: vec![SigState::default(); instances.max(1)],
            headers: AHashMap::new(),
        }
    }

    pub fn gid(&self) -> u32 {
        self.info.generator
    }

    pub fn sid(&self) -> u32 {
        self.info.id
    }

    pub fn rev(&self) -> u32 {
        self.info.rev
    }

    pub fn header_for(&self, policy: PolicyId) -> Option<&Arc<RuleHeader>> {
        self.headers.get(&policy)
    }

    pub fn bind_header(&mut self, policy: PolicyId, header: Arc<RuleHeader>) {
        self.headers.insert(policy, header);
    }

    pub fn unbind_header(&mut self, policy: PolicyId) -> Option<Arc<RuleHeader>> {
        self.headers.remove(&policy)
    }

    pub fn drain_headers(&mut self) -> Vec<(PolicyId, Arc<RuleHeader>)> {
        self.headers.drain().collect()
    }

    pub fn policies(&self) -> impl Iterator<Item = PolicyId> + '_ {
        self.headers.keys().copied()
    }

    /// Terminate the operator list
    pub fn push_leaf(&mut self) {
        self.ops.push(Operator::new(OperatorKind::Leaf));
    }

    pub fn has_content(&self) -> bool {
        self.ops
            .iter()
            .any(|op| matches!(op.kind, OperatorKind::Content(_)))
    }

    /// True when any http content sits in a buffer the fast-pattern
    /// matcher can use
    pub fn has_fp_eligible_uricontent(&self) -> bool {
        self.ops.iter().any(|op| match &op.kind {
            OperatorKind::ContentUri(data) => {
                data.http_buffer.map(|b| b.fp_eligible()).unwrap_or(false)
            }
            _ => false,
        })
    }

    /// Derive the IP protocol constraint the port-group indexer uses
    /// for all-IP rules
    pub fn effective_ip_proto(&self) -> IpProtoConstraint {
        let mut constraint = IpProtoConstraint::Unconstrained;
        for op in &self.ops {
            if let OperatorKind::IpProto { op: cmp, proto } = op.kind {
                constraint = match cmp {
                    CmpOp::Eq => IpProtoConstraint::Equals(proto),
                    _ => IpProtoConstraint::Other,
                };
            }
        }
        constraint
    }
}

/// Map of all accepted signatures, keyed by (gid, sid)
#[derive(Debug, Default)]
pub struct SignatureMap {
    map: AHashMap<(u32, u32), Signature>,
}

impl SignatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, gid: u32, sid: u32) -> bool {
        self.map.contains_key(&(gid, sid))
    }

    pub fn get(&self, gid: u32, sid: u32) -> Option<&Signature> {
        self.map.get(&(gid, sid))
    }

    pub fn get_mut(&mut self, gid: u32, sid: u32) -> Option<&mut Signature> {
        self.map.get_mut(&(gid, sid))
    }

    pub fn insert(&mut self, sig: Signature) {
        self.map.insert((sig.gid(), sig.sid()), sig);
    }

    pub fn remove(&mut self, gid: u32, sid: u32) -> Option<Signature> {
        self.map.remove(&(gid, sid))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Signature> {
        self.map.values()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Assigns a dense index to each unique (gid, sid) pair; duplicates
/// reuse the first index
#[derive(Debug, Default)]
pub struct RuleIndexMap {
    by_key: AHashMap<(u32, u32), usize>,
    entries: Vec<(u32, u32)>,
}

impl RuleIndexMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, gid: u32, sid: u32) -> usize {
        if let Some(&index) = self.by_key.get(&(gid, sid)) {
            return index;
        }
        let index = self.entries.len();
        self.entries.push((gid, sid));
        self.by_key.insert((gid, sid), index);
        index
    }

    pub fn get(&self, index: usize) -> Option<(u32, u32)> {
        self.entries.get(index).copied()
    }

    pub fn find(&self, gid: u32, sid: u32) -> Option<usize> {
        self.by_key.get(&(gid, sid)).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One classtype entry: short name and the default priority it confers
#[derive(Debug, Clone)]
pub struct Classification {
    pub name: String,
    pub text: String,
    pub priority: u32,
}

/// Classification table resolved by the classtype meta option
#[derive(Debug, Clone, Default)]
pub struct ClassificationTable {
    map: AHashMap<String, Classification>,
}

impl ClassificationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock classifications every ruleset assumes
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        for (name, text, priority) in [
            ("attempted-admin", "Attempted Administrator Privilege Gain", 1),
            ("attempted-user", "Attempted User Privilege Gain", 1),
            ("shellcode-detect", "Executable Code was Detected", 1),
            ("trojan-activity", "A Network Trojan was Detected", 1),
            ("web-application-attack", "Web Application Attack", 1),
            ("policy-violation", "Potential Corporate Privacy Violation", 1),
            ("attempted-dos", "Attempted Denial of Service", 2),
            ("attempted-recon", "Attempted Information Leak", 2),
            ("bad-unknown", "Potentially Bad Traffic", 2),
            ("misc-attack", "Misc Attack", 2),
            ("suspicious-login", "An Attempted Login Using a Suspicious Username", 2),
            ("misc-activity", "Misc activity", 3),
            ("network-scan", "Detection of a Network Scan", 3),
            ("not-suspicious", "Not Suspicious Traffic", 3),
            ("protocol-command-decode", "Generic Protocol Command Decode", 3),
        ] {
            table.add(name, text, priority);
        }
        table
    }

    pub fn add(&mut self, name: &str, text: &str, priority: u32) {
        self.map.insert(
            name.to_string(),
            Classification {
                name: name.to_string(),
                text: text.to_string(),
                priority,
            },
        );
    }

    pub fn find(&self, name: &str) -> Option<&Classification> {
        self.map.get(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
