/// Address sets and the IP variable table
use super::parser;
use super::rule::IpSpec;
use crate::error::{Result, RuleError};
use ahash::AHashMap;
use ipnetwork::IpNetwork;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

/// A set of CIDR ranges with a positive list and a negated list.
/// Named sets are owned by the variable table; rule headers hold shared
/// aliases. Equality is structural and ignores the name.
#[derive(Debug, Clone, Default)]
pub struct AddrSet {
    name: Option<String>,
    any: bool,
    positive: Vec<IpNetwork>,
    negated: Vec<IpNetwork>,
}

impl PartialEq for AddrSet {
    fn eq(&self, other: &Self) -> bool {
        self.any == other.any && self.positive == other.positive && self.negated == other.negated
    }
}

impl Eq for AddrSet {}

impl AddrSet {
    /// The universal set
    pub fn any() -> Self {
        AddrSet {
            name: None,
            any: true,
            positive: Vec::new(),
            negated: Vec::new(),
        }
    }

    pub fn is_any(&self) -> bool {
        self.any
    }

    /// Both lists empty and not universal
    pub fn is_empty(&self) -> bool {
        !self.any && self.positive.is_empty() && self.negated.is_empty()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn positive(&self) -> &[IpNetwork] {
        &self.positive
    }

    pub fn negated(&self) -> &[IpNetwork] {
        &self.negated
    }

    fn push(&mut self, net: IpNetwork, negated: bool) {
        // store the canonical base address so 10.1.2.3/8 and 10.0.0.0/8
        // compare equal
        let net = IpNetwork::new(net.network(), net.prefix()).unwrap_or(net);
        if negated {
            self.negated.push(net);
        } else {
            self.positive.push(net);
        }
    }

    fn normalize(&mut self) {
        self.positive.sort_by_key(|n| (n.ip(), n.prefix()));
        self.positive.dedup();
        self.negated.sort_by_key(|n| (n.ip(), n.prefix()));
        self.negated.dedup();
    }

    /// A negated range at least as general as a positive range can never
    /// match anything
    fn check_conflicts(&self, token: &str) -> Result<()> {
        for neg in &self.negated {
            for pos in &self.positive {
                if same_family(neg, pos)
                    && neg.prefix() <= pos.prefix()
                    && neg.contains(pos.network())
                {
                    return Err(RuleError::AddressConflict(token.to_string()));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for AddrSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            return write!(f, "${}", name);
        }
        if self.any && self.negated.is_empty() {
            return write!(f, "any");
        }
        write!(f, "[")?;
        let mut first = true;
        if self.any {
            write!(f, "any")?;
            first = false;
        }
        for net in &self.positive {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{}", net)?;
            first = false;
        }
        for net in &self.negated {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "!{}", net)?;
            first = false;
        }
        write!(f, "]")
    }
}

fn same_family(a: &IpNetwork, b: &IpNetwork) -> bool {
    matches!(
        (a, b),
        (IpNetwork::V4(_), IpNetwork::V4(_)) | (IpNetwork::V6(_), IpNetwork::V6(_))
    )
}

fn host_network(addr: IpAddr) -> IpNetwork {
    IpNetwork::from(addr)
}

/// Table of named address sets ($HOME_NET and friends)
#[derive(Debug, Clone, Default)]
pub struct IpVarTable {
    vars: AHashMap<String, Arc<AddrSet>>,
}

impl IpVarTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a variable from its textual value. Definitions may refer
    /// to previously defined variables.
    pub fn define(&mut self, name: &str, value: &str) -> Result<()> {
        let spec = parser::ip_spec(value)?;
        let mut set = compile(&spec, self, value)?;
        set.name = Some(name.to_string());
        self.vars.insert(name.to_string(), Arc::new(set));
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&Arc<AddrSet>> {
        self.vars.get(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Resolve one address token for a rule header. A bare variable
/// reference aliases the table's storage (keeping its name); anything
/// else allocates a fresh set.
pub fn resolve(token: &str, table: &IpVarTable) -> Result<Arc<AddrSet>> {
    if let Some(name) = token.strip_prefix('$') {
        if let Some(var) = table.lookup(name) {
            return Ok(Arc::clone(var));
        }
    }
    let spec = parser::ip_spec(token)?;
    let set = compile(&spec, table, token)?;
    Ok(Arc::new(set))
}

/// Flatten a parsed address specification into an address set,
/// expanding variables and folding negation
pub fn compile(spec: &IpSpec, table: &IpVarTable, token: &str) -> Result<AddrSet> {
    let mut set = AddrSet::default();
    add_spec(&mut set, spec, table, false, token)?;
    set.normalize();
    set.check_conflicts(token)?;
    if set.is_empty() {
        return Err(RuleError::EmptyAddressList(token.to_string()));
    }
    Ok(set)
}

fn add_spec(
    set: &mut AddrSet,
    spec: &IpSpec,
    table: &IpVarTable,
    negated: bool,
    token: &str,
) -> Result<()> {
    match spec {
        IpSpec::Any => {
            if negated {
                return Err(RuleError::NotAny(token.to_string()));
            }
            set.any = true;
        }
        IpSpec::Host(addr) => set.push(host_network(*addr), negated),
        IpSpec::Network { addr, prefix } => {
            let net = IpNetwork::new(*addr, *prefix)
                .map_err(|_| RuleError::BadAddress(token.to_string()))?;
            set.push(net, negated);
        }
        IpSpec::Variable(name) => {
            let var = table
                .lookup(name)
                .ok_or_else(|| RuleError::UndefinedVariable(token.to_string()))?;
            if var.any {
                if negated {
                    return Err(RuleError::NotAny(token.to_string()));
                }
                set.any = true;
            }
            for net in &var.positive {
                set.push(*net, negated);
            }
            for net in &var.negated {
                set.push(*net, !negated);
            }
        }
        IpSpec::List(items) => {
            for item in items {
                add_spec(set, item, table, negated, token)?;
            }
        }
        IpSpec::Not(inner) => add_spec(set, inner, table, !negated, token)?,
    }
    Ok(())
}
