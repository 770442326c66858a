/// Port sets, port objects, and the three kinds of port tables
use super::parser;
use super::rule::{PortSpec, Protocol};
use crate::error::{Result, RuleError};
use ahash::AHashMap;
use std::fmt;
use std::sync::Arc;

/// A normalized set of inclusive port ranges: sorted, disjoint, and
/// with adjacent ranges merged
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PortSet {
    ranges: Vec<(u16, u16)>,
}

impl PortSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn full() -> Self {
        PortSet {
            ranges: vec![(0, u16::MAX)],
        }
    }

    pub fn add_range(&mut self, lo: u16, hi: u16) {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        self.ranges.push((lo, hi));
        self.ranges.sort_unstable();

        let mut merged: Vec<(u16, u16)> = Vec::with_capacity(self.ranges.len());
        for &(a, b) in &self.ranges {
            match merged.last_mut() {
                // contiguous port numbers merge too: 1:5 and 6:9 is 1:9
                Some(last) if a as u32 <= last.1 as u32 + 1 => last.1 = last.1.max(b),
                _ => merged.push((a, b)),
            }
        }
        self.ranges = merged;
    }

    pub fn remove_range(&mut self, lo: u16, hi: u16) {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        let mut out = Vec::with_capacity(self.ranges.len());
        for &(a, b) in &self.ranges {
            if b < lo || a > hi {
                out.push((a, b));
                continue;
            }
            if a < lo {
                out.push((a, lo - 1));
            }
            if b > hi {
                out.push((hi + 1, b));
            }
        }
        self.ranges = out;
    }

    pub fn contains(&self, port: u16) -> bool {
        self.ranges.iter().any(|&(a, b)| a <= port && port <= b)
    }

    /// Number of individual ports covered
    pub fn count(&self) -> usize {
        self.ranges
            .iter()
            .map(|&(a, b)| b as usize - a as usize + 1)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter_ranges(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.ranges.iter().copied()
    }
}

impl fmt::Display for PortSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (a, b)) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            if a == b {
                write!(f, "{}", a)?;
            } else {
                write!(f, "{}:{}", a, b)?;
            }
        }
        Ok(())
    }
}

/// A port object: a deduplicated port set plus the dense indices of the
/// signatures attached to it. Shared instances behind `Arc` are never
/// mutated; only table-owned copies collect rule indices.
#[derive(Debug, Clone)]
pub struct PortObject {
    name: Option<String>,
    any: bool,
    pure_not: bool,
    ports: PortSet,
    rule_ids: Vec<usize>,
}

impl PortObject {
    /// The distinguished any-port object
    pub fn any_port() -> Self {
        PortObject {
            name: Some("any".to_string()),
            any: true,
            pure_not: false,
            ports: PortSet::new(),
            rule_ids: Vec::new(),
        }
    }

    pub fn from_ports(ports: PortSet) -> Self {
        PortObject {
            name: None,
            any: false,
            pure_not: false,
            ports,
            rule_ids: Vec::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn has_any(&self) -> bool {
        self.any
    }

    pub fn is_pure_not(&self) -> bool {
        self.pure_not
    }

    pub fn ports(&self) -> &PortSet {
        &self.ports
    }

    pub fn port_count(&self) -> usize {
        if self.any {
            u16::MAX as usize + 1
        } else {
            self.ports.count()
        }
    }

    pub fn contains(&self, port: u16) -> bool {
        self.any || self.ports.contains(port)
    }

    /// Structural equality by port set
    pub fn same_ports(&self, other: &PortObject) -> bool {
        self.any == other.any && self.pure_not == other.pure_not && self.ports == other.ports
    }

    /// Copy the port set without the attached rules
    pub fn dup_ports(&self) -> PortObject {
        PortObject {
            name: None,
            any: self.any,
            pure_not: self.pure_not,
            ports: self.ports.clone(),
            rule_ids: Vec::new(),
        }
    }

    pub fn add_rule(&mut self, index: usize) {
        self.rule_ids.push(index);
    }

    pub fn rule_ids(&self) -> &[usize] {
        &self.rule_ids
    }
}

impl fmt::Display for PortObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.any {
            write!(f, "any")
        } else {
            write!(f, "{}", self.ports)
        }
    }
}

/// Named port variables ($HTTP_PORTS and friends); always carries the
/// 'any' entry
#[derive(Debug, Clone)]
pub struct PortVarTable {
    vars: AHashMap<String, Arc<PortObject>>,
}

impl PortVarTable {
    pub fn new() -> Self {
        let mut vars = AHashMap::new();
        vars.insert("any".to_string(), Arc::new(PortObject::any_port()));
        PortVarTable { vars }
    }

    pub fn define(&mut self, name: &str, value: &str) -> Result<()> {
        let spec = parser::port_spec(value).map_err(|reason| RuleError::BadPortList {
            dir: "variable",
            token: value.to_string(),
            reason,
        })?;
        let mut po = compile(&spec, self, value, "variable")?;
        po.name = Some(name.to_string());
        self.vars.insert(name.to_string(), Arc::new(po));
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&Arc<PortObject>> {
        self.vars.get(name)
    }

    pub fn any(&self) -> Result<&Arc<PortObject>> {
        self.vars.get("any").ok_or(RuleError::MissingAnyPort)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl Default for PortVarTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Anonymous table holding inline port lists, deduplicated by port set.
/// Header equality compares port objects by pointer, so routing every
/// inline list through here is what makes pointer equality coincide
/// with set equality.
#[derive(Debug, Clone, Default)]
pub struct PortTable {
    objects: Vec<Arc<PortObject>>,
}

impl PortTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_by_ports(&self, po: &PortObject) -> Option<&Arc<PortObject>> {
        self.objects.iter().find(|o| o.same_ports(po))
    }

    /// Adopt an existing structurally-equal object or add this one
    pub fn intern(&mut self, po: PortObject) -> Arc<PortObject> {
        if let Some(existing) = self.find_by_ports(&po) {
            return Arc::clone(existing);
        }
        let po = Arc::new(po);
        self.objects.push(Arc::clone(&po));
        po
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Which side of the header a port token came from, for error context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDir {
    Src,
    Dst,
}

impl PortDir {
    pub fn label(&self) -> &'static str {
        match self {
            PortDir::Src => "source",
            PortDir::Dst => "destination",
        }
    }
}

/// Resolve one port token for a rule header. Protocols without ports
/// always resolve to the any object; `$name` goes through the variable
/// table; literal lists are interned in the anonymous table.
pub fn resolve(
    token: &str,
    proto: Protocol,
    vars: &PortVarTable,
    inline: &mut PortTable,
    dir: PortDir,
) -> Result<Arc<PortObject>> {
    if !proto.has_ports() {
        return Ok(Arc::clone(vars.any()?));
    }

    if token.eq_ignore_ascii_case("any") {
        return Ok(Arc::clone(vars.any()?));
    }

    if let Some(name) = token.strip_prefix('$') {
        return vars
            .find(name)
            .cloned()
            .ok_or_else(|| RuleError::UndefinedPortVariable(token.to_string()));
    }

    let spec = parser::port_spec(token).map_err(|reason| RuleError::BadPortList {
        dir: dir.label(),
        token: token.to_string(),
        reason,
    })?;
    let po = compile(&spec, vars, token, dir.label())?;
    Ok(inline.intern(po))
}

/// Flatten a parsed port specification into a port object, expanding
/// variables and folding negation
pub fn compile(
    spec: &PortSpec,
    vars: &PortVarTable,
    token: &str,
    dir: &'static str,
) -> Result<PortObject> {
    let mut gather = Gather::default();
    gather.add(spec, vars, false)?;

    if gather.any && gather.include.is_empty() && gather.exclude.is_empty() {
        // an inline "any" (e.g. [any]) is an anonymous any object,
        // distinct from the variable table's entry
        let mut po = PortObject::any_port();
        po.name = None;
        return Ok(po);
    }

    let pure_not = !gather.any && gather.include.is_empty() && !gather.exclude.is_empty();

    let mut matching = if gather.any || pure_not {
        PortSet::full()
    } else {
        gather.include
    };
    for (lo, hi) in gather.exclude.iter_ranges().collect::<Vec<_>>() {
        matching.remove_range(lo, hi);
    }

    if matching.is_empty() {
        return Err(RuleError::BadPortList {
            dir,
            token: token.to_string(),
            reason: "no ports left after negation".to_string(),
        });
    }

    let mut po = PortObject::from_ports(matching);
    po.pure_not = pure_not;
    Ok(po)
}

#[derive(Default)]
struct Gather {
    any: bool,
    include: PortSet,
    exclude: PortSet,
}

impl Gather {
    fn add(&mut self, spec: &PortSpec, vars: &PortVarTable, negated: bool) -> Result<()> {
        let dest = |g: &mut Gather, lo, hi| {
            if negated {
                g.exclude.add_range(lo, hi)
            } else {
                g.include.add_range(lo, hi)
            }
        };
        match spec {
            PortSpec::Any => {
                if negated {
                    self.exclude.add_range(0, u16::MAX);
                } else {
                    self.any = true;
                }
            }
            PortSpec::Port(p) => dest(self, *p, *p),
            PortSpec::Range(lo, hi) => dest(self, *lo, *hi),
            PortSpec::RangeFrom(lo) => dest(self, *lo, u16::MAX),
            PortSpec::RangeTo(hi) => dest(self, 0, *hi),
            PortSpec::Variable(name) => {
                let var = vars
                    .find(name)
                    .ok_or_else(|| RuleError::UndefinedPortVariable(format!("${}", name)))?;
                if var.has_any() {
                    if negated {
                        self.exclude.add_range(0, u16::MAX);
                    } else {
                        self.any = true;
                    }
                } else {
                    for (lo, hi) in var.ports().iter_ranges() {
                        dest(self, lo, hi);
                    }
                }
            }
            PortSpec::List(items) => {
                for item in items {
                    self.add(item, vars, negated)?;
                }
            }
            PortSpec::Not(inner) => self.add(inner, vars, !negated)?,
        }
        Ok(())
    }
}
