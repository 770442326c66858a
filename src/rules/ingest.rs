/// The ingestion driver: takes one rule at a time from raw text to
/// canonical headers, deduplicated signatures, and port groups
use super::addr::{self, AddrSet, IpVarTable};
use super::groups::{self, RulePortTables};
use super::header::{HeaderSpec, RuleHeader, RuleList};
use super::options::{self, MetaOutcome, OptionRegistry};
use super::parser::{self, HeaderTokens};
use super::ports::{self, PortDir, PortTable, PortVarTable};
use super::rule::{Direction, HeaderFlags, Protocol, RuleAction};
use super::signature::{
    ClassificationTable, PolicyId, RuleIndexMap, Signature, SignatureMap,
};
use crate::config::{FastPatternConfig, Settings, VarKind};
use crate::error::{Result, RuleError};
use crate::stats::{IngestStats, PortListEntry};
use ahash::AHashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// One rule-ingestion session. Owns the signature map, variable tables,
/// the anonymous port table, the rule-index map, the group tables, and
/// the statistics; everything downstream consumers read after
/// ingestion completes.
#[derive(Debug)]
pub struct Ingestor {
    policy: PolicyId,
    lists: AHashMap<RuleAction, Arc<RuleList>>,
    ip_vars: IpVarTable,
    port_vars: PortVarTable,
    inline_ports: PortTable,
    registry: OptionRegistry,
    classifications: ClassificationTable,
    so_rules: AHashMap<String, String>,
    sigs: SignatureMap,
    index_map: RuleIndexMap,
    tables: RulePortTables,
    fp: FastPatternConfig,
    strict_duplicates: bool,
    default_rule_state: bool,
    instances: usize,
    ip_proto_refs: [bool; 256],
    stats: IngestStats,
}

impl Ingestor {
    pub fn new(settings: &Settings) -> Result<Self> {
        let mut ingestor = Ingestor {
            policy: 0,
            lists: AHashMap::new(),
            ip_vars: IpVarTable::new(),
            port_vars: PortVarTable::new(),
            inline_ports: PortTable::new(),
            registry: OptionRegistry::with_builtins(),
            classifications: ClassificationTable::with_defaults(),
            so_rules: AHashMap::new(),
            sigs: SignatureMap::new(),
            index_map: RuleIndexMap::new(),
            tables: RulePortTables::new(),
            fp: settings.fast_pattern.clone(),
            strict_duplicates: settings.parsing.strict_duplicates,
            default_rule_state: settings.parsing.default_rule_state,
            instances: settings.parsing.instances,
            ip_proto_refs: [false; 256],
            stats: IngestStats::new(),
        };

        for class in &settings.classifications {
            ingestor
                .classifications
                .add(&class.name, &class.text, class.priority);
        }

        for var in &settings.variables {
            match var.kind {
                VarKind::Ip => ingestor.ip_vars.define(&var.name, &var.value)?,
                VarKind::Port => ingestor.port_vars.define(&var.name, &var.value)?,
            }
        }

        Ok(ingestor)
    }

    /// Switch the active policy; subsequently parsed rules bind their
    /// headers under this id
    pub fn set_policy(&mut self, policy: PolicyId) {
        self.policy = policy;
    }

    pub fn policy(&self) -> PolicyId {
        self.policy
    }

    /// Register the option stub of a shared-object rule, looked up by
    /// the soid meta option
    pub fn register_so_rule(&mut self, soid: &str, options: &str) {
        self.so_rules.insert(soid.to_string(), options.to_string());
    }

    pub fn define_ip_var(&mut self, name: &str, value: &str) -> Result<()> {
        self.ip_vars.define(name, value)
    }

    pub fn define_port_var(&mut self, name: &str, value: &str) -> Result<()> {
        self.port_vars.define(name, value)
    }

    /// Define an untyped variable the way rule files spell them: tried
    /// as an address list first, then as a port list
    pub fn define_var(&mut self, name: &str, value: &str) -> Result<()> {
        match self.ip_vars.define(name, value) {
            Ok(()) => Ok(()),
            Err(ip_err) => self.port_vars.define(name, value).map_err(|_| ip_err),
        }
    }

    pub fn signatures(&self) -> &SignatureMap {
        &self.sigs
    }

    pub fn rule_index_map(&self) -> &RuleIndexMap {
        &self.index_map
    }

    pub fn port_tables(&self) -> &RulePortTables {
        &self.tables
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    /// Whether any parsed rule referenced this IP protocol
    pub fn ip_proto_used(&self, proto: u8) -> bool {
        self.ip_proto_refs[proto as usize]
    }

    /// Process one rule and add it to the session. Text beginning with
    /// '(' is a builtin rule ingested under the alert action.
    pub fn parse_rule(&mut self, text: &str) -> Result<()> {
        let parts = parser::split_rule(text)?;
        match parts.header {
            Some(header) => self.parse_text_rule(header, parts.options),
            None => self.parse_builtin(RuleAction::Alert, text.trim()),
        }
    }

    /// Ingest a builtin (engine-provided) rule: the header is assumed
    /// to be `tcp any any <> any any` and detection options are
    /// rejected
    pub fn parse_builtin(&mut self, action: RuleAction, options: &str) -> Result<()> {
        let proto = Protocol::Tcp;

        let mut flags = HeaderFlags::ANY_SRC_IP | HeaderFlags::ANY_DST_IP;
        flags.insert(HeaderFlags::ANY_SRC_PORT);
        flags.insert(HeaderFlags::ANY_DST_PORT);
        flags.insert(HeaderFlags::BIDIRECTIONAL);

        let any_ports = Arc::clone(self.port_vars.any()?);
        let spec = HeaderSpec {
            action,
            list: self.list_for(action),
            proto,
            flags,
            sip: Arc::new(AddrSet::any()),
            dip: Arc::new(AddrSet::any()),
            src_ports: Arc::clone(&any_ports),
            dst_ports: any_ports,
        };

        self.ingest(spec, proto, Some(options), false, None)
    }

    fn parse_text_rule(&mut self, h: HeaderTokens<'_>, options: Option<&str>) -> Result<()> {
        let action = RuleAction::from_token(h.action)?;
        let proto = Protocol::from_token(h.proto)?;
        self.mark_protocol(proto);

        let mut flags = HeaderFlags::empty();

        let sip = addr::resolve(h.src_ip, &self.ip_vars)?;
        if sip.is_any() {
            flags.insert(HeaderFlags::ANY_SRC_IP);
        }

        // a direction token in the port position means the port was
        // left out, a classic mistake in ICMP rules
        if Direction::is_direction_token(h.src_port) {
            return Err(RuleError::MissingPortValue);
        }

        let src_ports = ports::resolve(
            h.src_port,
            proto,
            &self.port_vars,
            &mut self.inline_ports,
            PortDir::Src,
        )?;
        if src_ports.has_any() {
            flags.insert(HeaderFlags::ANY_SRC_PORT);
        }
        if src_ports.is_pure_not() {
            return Err(RuleError::PureNotPort(h.src_port.to_string()));
        }

        if Direction::from_token(h.dir)? == Direction::Bidirectional {
            flags.insert(HeaderFlags::BIDIRECTIONAL);
        }

        let dip = addr::resolve(h.dst_ip, &self.ip_vars)?;
        if dip.is_any() {
            flags.insert(HeaderFlags::ANY_DST_IP);
        }

        let dst_ports = ports::resolve(
            h.dst_port,
            proto,
            &self.port_vars,
            &mut self.inline_ports,
            PortDir::Dst,
        )?;
        if dst_ports.has_any() {
            flags.insert(HeaderFlags::ANY_DST_PORT);
        }
        if dst_ports.is_pure_not() {
            return Err(RuleError::PureNotPort(h.dst_port.to_string()));
        }

        let spec = HeaderSpec {
            action,
            list: self.list_for(action),
            proto,
            flags,
            sip,
            dip,
            src_ports,
            dst_ports,
        };

        self.ingest(spec, proto, options, true, Some((h.src_port, h.dst_port)))
    }

    fn ingest(
        &mut self,
        spec: HeaderSpec,
        proto: Protocol,
        options: Option<&str>,
        text_rule: bool,
        port_tokens: Option<(&str, &str)>,
    ) -> Result<()> {
        debug!(flags = %spec.flags, "processing head node");
        let header = self.process_head_node(spec);

        let Some((gid, sid)) = self.parse_rule_options(&header, options, proto, text_rule)? else {
            // duplicate with an older revision; the stored rule stays
            return Ok(());
        };

        self.stats.rule_count += 1;

        let Some(sig) = self.sigs.get(gid, sid) else {
            return Ok(());
        };

        // http cookie and status buffers don't feed the fast-pattern
        // matcher, so only eligible uri-class content counts here
        let uricontent = sig.has_fp_eligible_uricontent();
        let content = !uricontent && sig.has_content();

        let entry = PortListEntry {
            action: header.action,
            proto,
            ip_proto: proto.number(),
            gid,
            sid,
            bidirectional: header.flags.contains(HeaderFlags::BIDIRECTIONAL),
            content,
            uricontent,
            src_port: port_tokens.map(|(src, _)| src.to_string()),
            dst_port: port_tokens.map(|(_, dst)| dst.to_string()),
        };

        groups::finish_rule(
            &mut self.tables,
            &mut self.stats.counts,
            &header,
            sig,
            proto,
            &entry,
            &self.fp,
        );
        self.stats.record_entry(entry);

        Ok(())
    }

    /// Find the canonical header matching this draft in the active
    /// policy, or install the draft as a new chain head
    fn process_head_node(&mut self, spec: HeaderSpec) -> Arc<RuleHeader> {
        for sig in self.sigs.iter() {
            if let Some(header) = sig.header_for(self.policy) {
                if header.matches(&spec) {
                    header.add_ref();
                    return Arc::clone(header);
                }
            }
        }

        self.stats.head_count += 1;
        debug!("building new chain head node {}", self.stats.head_count);
        RuleHeader::install(spec, self.stats.head_count)
    }

    /// Parse the option body into a signature bound to this header.
    /// Returns None when a duplicate with an older revision was dropped
    /// in favour of the stored rule.
    fn parse_rule_options(
        &mut self,
        header: &Arc<RuleHeader>,
        options: Option<&str>,
        proto: Protocol,
        text_rule: bool,
    ) -> Result<Option<(u32, u32)>> {
        let Some(body) = options else {
            return Err(RuleError::MissingSid);
        };

        let body = body.trim();
        if body.len() < 2 || !body.starts_with('(') || !body.ends_with(')') {
            return Err(RuleError::UnenclosedOptions);
        }
        let inner = &body[1..body.len() - 1];

        let mut sig = Signature::new(
            proto,
            text_rule,
            self.default_rule_state,
            self.instances,
            self.stats.otn_count,
        );
        let mut num_detection_opts = 0;
        let mut so_opts: Option<String> = None;

        for tok in parser::split_options(inner) {
            let (name, args) = parser::split_option(&tok);
            match options::parse_meta_option(
                &mut sig,
                name,
                args,
                &self.classifications,
                &self.so_rules,
            )? {
                MetaOutcome::Consumed => {}
                MetaOutcome::SharedObject(stub) => so_opts = Some(stub),
                MetaOutcome::NotMeta => {
                    if !self.registry.get_option(&mut sig, proto, name, args)? {
                        return Err(RuleError::UnknownOption(name.to_string()));
                    }
                    num_detection_opts += 1;
                }
            }
        }

        if let Some(stub) = so_opts {
            let toks = parser::split_options(&stub);
            // the continuation pass ignores its final token, a leftover
            // of the trailing semicolon in generated stubs
            let keep = toks.len().saturating_sub(1);
            for tok in &toks[..keep] {
                let (name, args) = parser::split_option(tok);
                match options::parse_meta_option(
                    &mut sig,
                    name,
                    args,
                    &self.classifications,
                    &self.so_rules,
                )? {
                    MetaOutcome::Consumed | MetaOutcome::SharedObject(_) => {}
                    MetaOutcome::NotMeta => {
                        if !self.registry.get_option(&mut sig, proto, name, args)? {
                            return Err(RuleError::UnknownOption(name.to_string()));
                        }
                        num_detection_opts += 1;
                    }
                }
            }
        }

        if num_detection_opts > 0 && !text_rule {
            return Err(RuleError::BuiltinDetectionOptions);
        }

        if sig.info.id == 0 {
            return Err(RuleError::MissingSid);
        }

        sig.num_detection_opts = num_detection_opts;
        sig.bind_header(self.policy, Arc::clone(header));

        let Some(key) = self.install_signature(sig, header)? else {
            return Ok(None);
        };

        self.stats.otn_count += 1;
        if text_rule {
            self.stats.detect_rule_count += 1;
        } else {
            self.stats.builtin_rule_count += 1;
        }

        if let Some(stored) = self.sigs.get_mut(key.0, key.1) {
            stored.push_leaf();
            options::validate_fast_pattern(stored);
        }

        Ok(Some(key))
    }

    /// Store a freshly parsed signature, merging with a stored
    /// duplicate by revision. Returns None when the stored rule wins.
    fn install_signature(
        &mut self,
        mut sig: Signature,
        header: &Arc<RuleHeader>,
    ) -> Result<Option<(u32, u32)>> {
        let key = (sig.gid(), sig.sid());

        let Some(mut old) = self.sigs.remove(key.0, key.1) else {
            sig.rule_index = self.index_map.add(key.0, key.1);
            self.sigs.insert(sig);
            return Ok(Some(key));
        };

        // duplicate sid/gid: keep the higher revision
        sig.rule_index = old.rule_index;
        let old_active = old.header_for(self.policy).cloned();

        if old.proto != sig.proto {
            self.sigs.insert(old);
            return Err(RuleError::DuplicateProtocolMismatch {
                gid: key.0,
                sid: key.1,
            });
        }

        if let Some(current) = &old_active {
            if current.action != header.action {
                self.sigs.insert(old);
                return Err(RuleError::DuplicateTypeMismatch {
                    gid: key.0,
                    sid: key.1,
                });
            }
        }

        if sig.rev() < old.rev() {
            // the stored rule is newer; discard the new one, donating
            // its header binding when this policy has none yet
            warn!(
                "{}:{} duplicates previous rule. Using revision {}.",
                key.0,
                key.1,
                old.rev()
            );

            let donated = sig.unbind_header(self.policy);
            match (donated, old_active.is_none()) {
                (Some(hdr), true) => old.bind_header(self.policy, hdr),
                _ => header.release(),
            }
            self.sigs.insert(old);
            return Ok(None);
        }

        // the new rule wins; the stored one goes away
        if old_active.is_some() {
            if self.strict_duplicates {
                self.sigs.insert(old);
                return Err(RuleError::DuplicateRule {
                    gid: key.0,
                    sid: key.1,
                    rev: sig.rev(),
                });
            }
            warn!(
                "{}:{} duplicates previous rule. Using revision {}.",
                key.0,
                key.1,
                sig.rev()
            );

            // rule_count stays equal to detect + builtin, so it moves
            // with whichever of the two drops here
            if old.info.text_rule {
                self.stats.detect_rule_count -= 1;
            } else {
                self.stats.builtin_rule_count -= 1;
            }
            self.stats.rule_count -= 1;
        }
        self.stats.otn_count -= 1;

        // migrate every other policy's header binding onto the new
        // signature; the active policy's binding is replaced
        for (policy, hdr) in old.drain_headers() {
            if policy == self.policy {
                hdr.release();
            } else {
                sig.bind_header(policy, hdr);
            }
        }

        self.sigs.insert(sig);
        Ok(Some(key))
    }

    fn list_for(&mut self, action: RuleAction) -> Arc<RuleList> {
        Arc::clone(
            self.lists
                .entry(action)
                .or_insert_with(|| Arc::new(RuleList::new(action))),
        )
    }

    fn mark_protocol(&mut self, proto: Protocol) {
        match proto {
            Protocol::Tcp => self.ip_proto_refs[6] = true,
            Protocol::Udp => self.ip_proto_refs[17] = true,
            Protocol::Icmp => {
                self.ip_proto_refs[1] = true;
                self.ip_proto_refs[58] = true;
            }
            Protocol::Ip => {
                for proto in [6, 17, 1, 58] {
                    self.ip_proto_refs[proto] = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::signature::IpProtoConstraint;

    fn ingestor() -> Ingestor {
        Ingestor::new(&Settings::default_config()).unwrap()
    }

    fn ingestor_with(f: impl FnOnce(&mut Settings)) -> Ingestor {
        let mut settings = Settings::default_config();
        f(&mut settings);
        Ingestor::new(&settings).unwrap()
    }

    #[test]
    fn test_simple_content_rule() {
        let mut ing = ingestor();
        ing.parse_rule("alert tcp any any -> any 80 (sid:1; content:\"GET\";)")
            .unwrap();

        let sig = ing.signatures().get(1, 1).unwrap();
        assert_eq!(sig.rule_index, 0);
        assert!(sig.info.text_rule);

        let header = sig.header_for(0).unwrap();
        assert_eq!(
            header.flags,
            HeaderFlags::ANY_SRC_IP | HeaderFlags::ANY_DST_IP | HeaderFlags::ANY_SRC_PORT
        );
        assert_eq!(header.ref_count(), 1);

        // placed in the TCP dst group for port 80
        let dst_entry = ing
            .port_tables()
            .tcp
            .dst
            .iter()
            .find(|po| po.contains(80))
            .unwrap();
        assert_eq!(dst_entry.rule_ids(), &[0]);

        let stats = ing.stats();
        assert_eq!(stats.rule_count, 1);
        assert_eq!(stats.detect_rule_count, 1);
        assert_eq!(stats.counts.tcp.dst, 1);
        assert_eq!(stats.counts.tcp.aa, 0);
        assert!(stats.port_list[0].content);
        assert!(!stats.port_list[0].uricontent);
    }

    #[test]
    fn test_headers_canonicalised_within_policy() {
        let mut ing = ingestor();
        ing.parse_rule("alert tcp any any -> any 80 (sid:1; content:\"a\";)")
            .unwrap();
        ing.parse_rule("alert tcp any any -> any 80 (sid:2; content:\"b\";)")
            .unwrap();
        ing.parse_rule("alert tcp any any -> any 443 (sid:3;)").unwrap();

        let h1 = ing.signatures().get(1, 1).unwrap().header_for(0).unwrap();
        let h2 = ing.signatures().get(1, 2).unwrap().header_for(0).unwrap();
        let h3 = ing.signatures().get(1, 3).unwrap().header_for(0).unwrap();

        assert!(Arc::ptr_eq(h1, h2));
        assert!(!Arc::ptr_eq(h1, h3));
        assert_eq!(h1.ref_count(), 2);
        assert_eq!(h3.ref_count(), 1);
        assert_eq!(ing.stats().head_count, 2);
    }

    #[test]
    fn test_duplicate_newer_revision_wins() {
        let mut ing = ingestor();
        ing.parse_rule("alert tcp any any -> any 80 (sid:1; rev:1; content:\"GET\";)")
            .unwrap();
        ing.parse_rule("alert tcp any any -> any 80 (sid:1; rev:2; content:\"GET\";)")
            .unwrap();

        let sig = ing.signatures().get(1, 1).unwrap();
        assert_eq!(sig.rev(), 2);
        assert_eq!(sig.rule_index, 0);
        assert_eq!(ing.signatures().len(), 1);

        let stats = ing.stats();
        assert_eq!(stats.otn_count, 1);
        assert_eq!(stats.detect_rule_count, 1);
        assert_eq!(stats.rule_count, 1);
        assert_eq!(ing.rule_index_map().len(), 1);

        // the replaced rule released its header reference
        assert_eq!(sig.header_for(0).unwrap().ref_count(), 1);
    }

    #[test]
    fn test_duplicate_older_revision_dropped() {
        let mut ing = ingestor();
        ing.parse_rule("alert tcp any any -> any 80 (sid:1; rev:2; content:\"GET\";)")
            .unwrap();
        ing.parse_rule("alert tcp any any -> any 80 (sid:1; rev:1; content:\"GET\";)")
            .unwrap();

        let sig = ing.signatures().get(1, 1).unwrap();
        assert_eq!(sig.rev(), 2);

        let stats = ing.stats();
        assert_eq!(stats.rule_count, 1);
        assert_eq!(stats.otn_count, 1);
        assert_eq!(stats.detect_rule_count, 1);
        assert_eq!(sig.header_for(0).unwrap().ref_count(), 1);
    }

    #[test]
    fn test_duplicate_equal_revision_strict_mode() {
        let mut ing = ingestor_with(|s| s.parsing.strict_duplicates = true);
        ing.parse_rule("alert tcp any any -> any 80 (sid:1; rev:1;)").unwrap();
        let err = ing
            .parse_rule("alert tcp any any -> any 80 (sid:1; rev:1;)")
            .unwrap_err();
        assert!(matches!(err, RuleError::DuplicateRule { sid: 1, .. }));
    }

    #[test]
    fn test_duplicate_protocol_mismatch() {
        let mut ing = ingestor();
        ing.parse_rule("alert tcp any any -> any 80 (sid:1;)").unwrap();
        let err = ing
            .parse_rule("alert udp any any -> any 80 (sid:1; rev:2;)")
            .unwrap_err();
        assert!(matches!(err, RuleError::DuplicateProtocolMismatch { .. }));
    }

    #[test]
    fn test_duplicate_action_mismatch() {
        let mut ing = ingestor();
        ing.parse_rule("alert tcp any any -> any 80 (sid:1;)").unwrap();
        let err = ing
            .parse_rule("drop tcp any any -> any 80 (sid:1; rev:2;)")
            .unwrap_err();
        assert!(matches!(err, RuleError::DuplicateTypeMismatch { .. }));
    }

    #[test]
    fn test_cross_policy_binding_migrates() {
        let mut ing = ingestor();
        ing.parse_rule("alert tcp any any -> any 80 (sid:1; rev:1;)").unwrap();

        ing.set_policy(1);
        ing.parse_rule("alert tcp any any -> any 80 (sid:1; rev:2;)").unwrap();

        let sig = ing.signatures().get(1, 1).unwrap();
        assert_eq!(sig.rev(), 2);
        assert!(sig.header_for(0).is_some());
        assert!(sig.header_for(1).is_some());
        assert_eq!(sig.header_for(0).unwrap().ref_count(), 1);
        assert_eq!(sig.header_for(1).unwrap().ref_count(), 1);
    }

    #[test]
    fn test_cross_policy_older_revision_donates_header() {
        let mut ing = ingestor();
        ing.parse_rule("alert tcp any any -> any 80 (sid:1; rev:2;)").unwrap();

        ing.set_policy(1);
        ing.parse_rule("alert tcp any any -> any 80 (sid:1; rev:1;)").unwrap();

        let sig = ing.signatures().get(1, 1).unwrap();
        assert_eq!(sig.rev(), 2);
        // the older rule's header binding still serves the new policy
        assert!(sig.header_for(1).is_some());
        assert_eq!(sig.header_for(1).unwrap().ref_count(), 1);
    }

    #[test]
    fn test_any_any_rule_placement() {
        let mut ing = ingestor();
        ing.parse_rule("alert tcp any any -> any any (sid:1; content:\"x\";)")
            .unwrap();

        let stats = ing.stats();
        assert_eq!(stats.counts.tcp.aa, 1);
        assert_eq!(stats.counts.tcp.src, 0);
        assert_eq!(stats.counts.tcp.dst, 0);
        assert_eq!(ing.port_tables().tcp.any_any.rule_ids(), &[0]);
        assert!(ing.port_tables().tcp.dst.is_empty());
    }

    #[test]
    fn test_ip_rule_propagates_to_all_any_any_groups() {
        let mut ing = ingestor();
        ing.parse_rule("alert ip any any <> any any (sid:2;)").unwrap();

        let tables = ing.port_tables();
        assert_eq!(tables.tcp.any_any.rule_ids(), &[0]);
        assert_eq!(tables.udp.any_any.rule_ids(), &[0]);
        assert_eq!(tables.icmp.any_any.rule_ids(), &[0]);
        assert_eq!(tables.ip.any_any.rule_ids(), &[0]);

        let stats = ing.stats();
        assert_eq!(stats.counts.tcp.aa, 1);
        assert_eq!(stats.counts.udp.aa, 1);
        assert_eq!(stats.counts.icmp.aa, 1);
        assert_eq!(stats.counts.ip.aa, 1);
    }

    #[test]
    fn test_ip_rule_with_proto_constraint() {
        let mut ing = ingestor();
        ing.parse_rule("alert ip any any -> any any (sid:3; ip_proto:tcp;)")
            .unwrap();

        let sig = ing.signatures().get(1, 3).unwrap();
        assert_eq!(sig.effective_ip_proto(), IpProtoConstraint::Equals(6));

        let tables = ing.port_tables();
        assert_eq!(tables.tcp.any_any.rule_ids(), &[0]);
        assert!(tables.udp.any_any.rule_ids().is_empty());
        assert!(tables.icmp.any_any.rule_ids().is_empty());
        assert_eq!(tables.ip.any_any.rule_ids(), &[0]);
    }

    #[test]
    fn test_bleedover_promotion() {
        let mut ing = ingestor();
        ing.parse_rule("alert tcp any [1:10000] -> any any (sid:3; content:\"x\";)")
            .unwrap();

        // 10000 source ports exceed the default limit of 1024
        let stats = ing.stats();
        assert_eq!(stats.counts.tcp.aa, 1);
        assert_eq!(stats.counts.tcp.src, 0);
        assert_eq!(ing.port_tables().tcp.any_any.rule_ids(), &[0]);
        assert!(ing.port_tables().tcp.src.is_empty());
    }

    #[test]
    fn test_bleedover_boundary() {
        // a set exactly at the limit stays in its group
        let mut ing = ingestor_with(|s| s.fast_pattern.bleedover_port_limit = 1024);
        ing.parse_rule("alert tcp any [1:1024] -> any any (sid:1;)").unwrap();
        assert_eq!(ing.stats().counts.tcp.src, 1);
        assert_eq!(ing.stats().counts.tcp.aa, 0);

        // one above goes to any-any
        let mut ing = ingestor_with(|s| s.fast_pattern.bleedover_port_limit = 1024);
        ing.parse_rule("alert tcp any [1:1025] -> any any (sid:1;)").unwrap();
        assert_eq!(ing.stats().counts.tcp.src, 0);
        assert_eq!(ing.stats().counts.tcp.aa, 1);
    }

    #[test]
    fn test_single_rule_group_mode() {
        let mut ing = ingestor_with(|s| s.fast_pattern.single_rule_group = true);
        ing.parse_rule("alert tcp any any -> any 80 (sid:1;)").unwrap();

        assert_eq!(ing.stats().counts.tcp.aa, 1);
        assert_eq!(ing.stats().counts.tcp.dst, 0);
        assert!(ing.port_tables().tcp.dst.is_empty());
    }

    #[test]
    fn test_bidirectional_specific_ports_in_both_tables() {
        let mut ing = ingestor();
        ing.parse_rule("alert tcp any [6000:6010] <> any 80 (sid:1;)").unwrap();

        let tables = ing.port_tables();
        // dst port 80 appears in both dst and src tables, and the src
        // range likewise
        assert!(tables.tcp.dst.iter().any(|po| po.contains(80)));
        assert!(tables.tcp.src.iter().any(|po| po.contains(80)));
        assert!(tables.tcp.src.iter().any(|po| po.contains(6005)));
        assert!(tables.tcp.dst.iter().any(|po| po.contains(6005)));

        let stats = ing.stats();
        assert_eq!(stats.counts.tcp.sd, 1);
        assert_eq!(stats.counts.tcp.src, 1);
        assert_eq!(stats.counts.tcp.dst, 1);
    }

    #[test]
    fn test_no_content_counter() {
        let mut ing = ingestor();
        ing.parse_rule("alert tcp any any -> any 80 (sid:1;)").unwrap();
        ing.parse_rule("alert tcp any any -> any 81 (sid:2; content:\"x\";)")
            .unwrap();
        assert_eq!(ing.stats().counts.tcp.nc, 1);
    }

    #[test]
    fn test_pure_not_port_rejected() {
        let mut ing = ingestor();
        let err = ing
            .parse_rule("alert tcp any any -> any ![80] (sid:4;)")
            .unwrap_err();
        assert!(matches!(err, RuleError::PureNotPort(_)));
    }

    #[test]
    fn test_missing_port_value() {
        let mut ing = ingestor();
        let err = ing
            .parse_rule("alert icmp any -> any any any (sid:1;)")
            .unwrap_err();
        assert!(matches!(err, RuleError::MissingPortValue));
    }

    #[test]
    fn test_illegal_direction() {
        let mut ing = ingestor();
        let err = ing
            .parse_rule("alert tcp any any <- any 80 (sid:1;)")
            .unwrap_err();
        assert!(matches!(err, RuleError::BadDirection(_)));
    }

    #[test]
    fn test_missing_sid() {
        let mut ing = ingestor();
        let err = ing
            .parse_rule("alert tcp any any -> any 80 (msg:\"no sid\";)")
            .unwrap_err();
        assert!(matches!(err, RuleError::MissingSid));

        // a header-only rule fails the same way
        let err = ing
            .parse_rule("alert tcp any any -> any 80")
            .unwrap_err();
        assert!(matches!(err, RuleError::MissingSid));
    }

    #[test]
    fn test_unknown_option() {
        let mut ing = ingestor();
        let err = ing
            .parse_rule("alert tcp any any -> any 80 (sid:1; frobnicate:9;)")
            .unwrap_err();
        assert!(matches!(err, RuleError::UnknownOption(_)));
    }

    #[test]
    fn test_variables_resolve_in_headers() {
        let mut ing = ingestor();
        ing.parse_rule("alert tcp $EXTERNAL_NET any -> $HOME_NET $HTTP_PORTS (sid:1;)")
            .unwrap();

        let sig = ing.signatures().get(1, 1).unwrap();
        let header = sig.header_for(0).unwrap();
        assert!(!header.flags.contains(HeaderFlags::ANY_SRC_IP));
        assert!(!header.flags.contains(HeaderFlags::ANY_DST_PORT));
        assert_eq!(header.dst_ports.name(), Some("HTTP_PORTS"));

        let err = ing
            .parse_rule("alert tcp $NOT_DEFINED any -> any 80 (sid:2;)")
            .unwrap_err();
        assert!(matches!(err, RuleError::UndefinedVariable(_)));
    }

    #[test]
    fn test_builtin_rule() {
        let mut ing = ingestor();
        ing.parse_rule("(sid:1; gid:116; rev:1; msg:\"decoder event\";)")
            .unwrap();

        let sig = ing.signatures().get(116, 1).unwrap();
        assert!(!sig.info.text_rule);
        assert_eq!(sig.proto, Protocol::Tcp);

        let header = sig.header_for(0).unwrap();
        assert!(header.flags.contains(HeaderFlags::BIDIRECTIONAL));
        assert!(header.flags.contains(
            HeaderFlags::ANY_SRC_IP
                | HeaderFlags::ANY_DST_IP
                | HeaderFlags::ANY_SRC_PORT
                | HeaderFlags::ANY_DST_PORT
        ));

        let stats = ing.stats();
        assert_eq!(stats.builtin_rule_count, 1);
        assert_eq!(stats.detect_rule_count, 0);
        assert_eq!(stats.rule_count, 1);
        // any-any by construction
        assert_eq!(stats.counts.tcp.aa, 1);
    }

    #[test]
    fn test_builtin_rejects_detection_options() {
        let mut ing = ingestor();
        let err = ing
            .parse_rule("(sid:1; gid:116; content:\"x\";)")
            .unwrap_err();
        assert!(matches!(err, RuleError::BuiltinDetectionOptions));
    }

    #[test]
    fn test_shared_object_continuation_drops_last_token() {
        let mut ing = ingestor();
        ing.register_so_rule("3|2001", "classtype:misc-activity; metadata:engine shared; rev:9");

        ing.parse_rule("alert tcp any any -> any any (soid:3|2001; sid:2001; rev:2;)")
            .unwrap();

        let sig = ing.signatures().get(1, 2001).unwrap();
        assert_eq!(sig.info.class_name.as_deref(), Some("misc-activity"));
        assert_eq!(sig.info.metadata.len(), 1);
        // the trailing token of the stub (rev:9) was discarded
        assert_eq!(sig.rev(), 2);
    }

    #[test]
    fn test_unknown_so_rule() {
        let mut ing = ingestor();
        let err = ing
            .parse_rule("alert tcp any any -> any any (soid:3|404; sid:404;)")
            .unwrap_err();
        assert!(matches!(err, RuleError::UnknownSoRule(_)));
    }

    #[test]
    fn test_operator_list_ends_with_leaf() {
        use crate::rules::options::OperatorKind;

        let mut ing = ingestor();
        ing.parse_rule("alert tcp any any -> any 80 (sid:1; content:\"GET\"; nocase;)")
            .unwrap();

        let sig = ing.signatures().get(1, 1).unwrap();
        assert!(matches!(sig.ops.last().unwrap().kind, OperatorKind::Leaf));
        assert_eq!(sig.num_detection_opts, 2);
    }

    #[test]
    fn test_rule_index_density() {
        let mut ing = ingestor();
        ing.parse_rule("alert tcp any any -> any 80 (sid:10;)").unwrap();
        ing.parse_rule("alert tcp any any -> any 81 (sid:20;)").unwrap();
        ing.parse_rule("alert udp any any -> any 53 (sid:30;)").unwrap();

        let map = ing.rule_index_map();
        assert_eq!(map.len(), 3);
        for sig in ing.signatures().iter() {
            assert!(sig.rule_index < map.len());
            assert_eq!(map.find(sig.gid(), sig.sid()), Some(sig.rule_index));
        }
    }

    #[test]
    fn test_protocol_usage_map() {
        let mut ing = ingestor();
        ing.parse_rule("alert udp any any -> any 53 (sid:1;)").unwrap();
        assert!(ing.ip_proto_used(17));
        assert!(!ing.ip_proto_used(6));

        ing.parse_rule("alert ip any any -> any any (sid:2;)").unwrap();
        assert!(ing.ip_proto_used(6));
        assert!(ing.ip_proto_used(1));
    }

    #[test]
    fn test_replacement_keeps_statistics_totals() {
        let mut ing = ingestor();

        // same-policy replacement of a text rule and of a builtin rule
        ing.parse_rule("alert tcp any any -> any 80 (sid:1; rev:1; content:\"GET\";)")
            .unwrap();
        ing.parse_rule("alert tcp any any -> any 80 (sid:1; rev:2; content:\"GET\";)")
            .unwrap();
        ing.parse_rule("(sid:9; gid:116; rev:1;)").unwrap();
        ing.parse_rule("(sid:9; gid:116; rev:2;)").unwrap();

        let stats = ing.stats();
        assert_eq!(stats.detect_rule_count, 1);
        assert_eq!(stats.builtin_rule_count, 1);
        assert_eq!(stats.rule_count, 2);
        assert_eq!(
            stats.rule_count,
            stats.detect_rule_count + stats.builtin_rule_count
        );

        // an older revision is dropped without touching any counter
        ing.parse_rule("alert tcp any any -> any 80 (sid:1; rev:1; content:\"GET\";)")
            .unwrap();

        let stats = ing.stats();
        assert_eq!(stats.rule_count, 2);
        assert_eq!(
            stats.rule_count,
            stats.detect_rule_count + stats.builtin_rule_count
        );
    }

    #[test]
    fn test_statistics_totals() {
        let mut ing = ingestor();
        ing.parse_rule("alert tcp any any -> any 80 (sid:1; content:\"a\";)")
            .unwrap();
        ing.parse_rule("alert udp any any -> any 53 (sid:2;)").unwrap();
        ing.parse_rule("(sid:3; gid:116;)").unwrap();

        let stats = ing.stats();
        assert_eq!(
            stats.rule_count,
            stats.detect_rule_count + stats.builtin_rule_count
        );
        assert_eq!(stats.otn_count, ing.signatures().len() as u32);
        assert_eq!(stats.port_list.len(), 3);
    }
}
