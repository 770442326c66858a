/// Rule option body parsing: meta options, the detection-operator
/// registry, and fast-pattern validation
use super::rule::Protocol;
use super::signature::{ClassificationTable, Reference, Signature};
use crate::error::{Result, RuleError};
use ahash::AHashMap;
use tracing::warn;

/// HTTP buffer a content pattern is anchored to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpBuffer {
    Method,
    Uri,
    Header,
    Cookie,
    Body,
    StatCode,
    StatMsg,
}

impl HttpBuffer {
    /// Cookie and status buffers never feed the fast-pattern matcher
    pub fn fp_eligible(&self) -> bool {
        matches!(self, HttpBuffer::Uri | HttpBuffer::Header | HttpBuffer::Body)
    }
}

/// Content matching parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentData {
    /// Pattern to match
    pub pattern: Vec<u8>,
    /// Negated match (content:!"...")
    pub negated: bool,
    /// Case-insensitive matching
    pub nocase: bool,
    /// Offset from start of payload
    pub offset: Option<i32>,
    /// Search depth
    pub depth: Option<i32>,
    /// Distance from previous match
    pub distance: Option<i32>,
    /// Within bytes of previous match
    pub within: Option<i32>,
    /// Preferred fast-pattern candidate
    pub fast_pattern: bool,
    /// fast_pattern:only - skip re-evaluation after the prefilter hit
    pub fast_pattern_only: bool,
    /// HTTP buffer, when this is an http content
    pub http_buffer: Option<HttpBuffer>,
}

impl ContentData {
    fn new(pattern: Vec<u8>, negated: bool) -> Self {
        ContentData {
            pattern,
            negated,
            nocase: false,
            offset: None,
            depth: None,
            distance: None,
            within: None,
            fast_pattern: false,
            fast_pattern_only: false,
            http_buffer: None,
        }
    }
}

/// Flow state requirements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowSpec {
    pub established: bool,
    pub not_established: bool,
    pub stateless: bool,
    pub direction: Option<FlowDirection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDirection {
    ToServer,
    ToClient,
    FromServer,
    FromClient,
}

/// Comparison applied by the ip_proto operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
}

/// Detection operator kinds. The option list of every signature ends
/// with the Leaf sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorKind {
    Content(ContentData),
    ContentUri(ContentData),
    Pcre { expr: String },
    ByteJump { bytes: u32, offset: i32 },
    ByteExtract { bytes: u32, offset: i32, name: String },
    FileData,
    PktData,
    Base64Data,
    IpProto { op: CmpOp, proto: u8 },
    Flow(FlowSpec),
    Leaf,
}

/// One entry of a signature's operator list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    pub kind: OperatorKind,
    pub is_relative: bool,
}

impl Operator {
    pub fn new(kind: OperatorKind) -> Self {
        Operator {
            kind,
            is_relative: false,
        }
    }
}

/// Outcome of presenting an option to the meta-option pass
#[derive(Debug)]
pub enum MetaOutcome {
    /// Consumed as signature metadata
    Consumed,
    /// Consumed; the rest of the rule body comes from a shared-object
    /// stub and must be parsed as a continuation
    SharedObject(String),
    /// Not a meta option; try the detection-operator registry
    NotMeta,
}

/// Handle the fixed meta options (sid, gid, rev, msg, classtype,
/// priority, reference, metadata, soid)
pub fn parse_meta_option(
    sig: &mut Signature,
    name: &str,
    args: Option<&str>,
    classifications: &ClassificationTable,
    so_rules: &AHashMap<String, String>,
) -> Result<MetaOutcome> {
    match name {
        "msg" => {
            sig.info.message = Some(strip_quotes(req_arg(name, args)?).to_string());
        }
        "sid" => sig.info.id = parse_u32(name, args)?,
        "gid" => sig.info.generator = parse_u32(name, args)?,
        "rev" => sig.info.rev = parse_u32(name, args)?,
        "priority" => {
            sig.info.priority = parse_u32(name, args)?;
            sig.info.priority_set = true;
        }
        "classtype" => {
            let arg = req_arg(name, args)?;
            let class = classifications
                .find(arg)
                .ok_or_else(|| RuleError::UnknownClasstype(arg.to_string()))?;
            sig.info.class_name = Some(class.name.clone());
            if !sig.info.priority_set {
                sig.info.priority = class.priority;
            }
        }
        "reference" => {
            let arg = req_arg(name, args)?;
            let (scheme, id) = arg
                .split_once(',')
                .ok_or_else(|| bad_arg(name, arg))?;
            sig.info.references.push(Reference {
                scheme: scheme.trim().to_string(),
                id: id.trim().to_string(),
            });
        }
        "metadata" => {
            let arg = req_arg(name, args)?;
            for pair in arg.split(',') {
                let pair = pair.trim();
                if pair.is_empty() {
                    continue;
                }
                match pair.split_once(char::is_whitespace) {
                    Some((k, v)) => sig
                        .info
                        .metadata
                        .push((k.trim().to_string(), v.trim().to_string())),
                    None => sig.info.metadata.push((pair.to_string(), String::new())),
                }
            }
        }
        "soid" => {
            let arg = req_arg(name, args)?;
            let stub = so_rules
                .get(arg)
                .ok_or_else(|| RuleError::UnknownSoRule(arg.to_string()))?;
            return Ok(MetaOutcome::SharedObject(stub.clone()));
        }
        _ => return Ok(MetaOutcome::NotMeta),
    }
    Ok(MetaOutcome::Consumed)
}

type OptionHandler = fn(&mut Signature, Option<&str>) -> Result<()>;

/// Registry mapping detection option names to their argument parsers.
/// A hit appends an operator (or adjusts the previous content) on the
/// signature's operator list.
pub struct OptionRegistry {
    parsers: AHashMap<&'static str, OptionHandler>,
}

impl OptionRegistry {
    pub fn with_builtins() -> Self {
        let mut parsers: AHashMap<&'static str, OptionHandler> = AHashMap::new();
        parsers.insert("content", opt_content);
        parsers.insert("uricontent", opt_uricontent);
        parsers.insert("nocase", opt_nocase);
        parsers.insert("offset", opt_offset);
        parsers.insert("depth", opt_depth);
        parsers.insert("distance", opt_distance);
        parsers.insert("within", opt_within);
        parsers.insert("fast_pattern", opt_fast_pattern);
        parsers.insert("http_method", opt_http_method);
        parsers.insert("http_uri", opt_http_uri);
        parsers.insert("http_header", opt_http_header);
        parsers.insert("http_cookie", opt_http_cookie);
        parsers.insert("http_client_body", opt_http_client_body);
        parsers.insert("http_stat_code", opt_http_stat_code);
        parsers.insert("http_stat_msg", opt_http_stat_msg);
        parsers.insert("pcre", opt_pcre);
        parsers.insert("byte_jump", opt_byte_jump);
        parsers.insert("byte_extract", opt_byte_extract);
        parsers.insert("file_data", opt_file_data);
        parsers.insert("pkt_data", opt_pkt_data);
        parsers.insert("base64_data", opt_base64_data);
        parsers.insert("ip_proto", opt_ip_proto);
        parsers.insert("flow", opt_flow);
        OptionRegistry { parsers }
    }

    /// Returns false when the name is unknown to the registry
    pub fn get_option(
        &self,
        sig: &mut Signature,
        _proto: Protocol,
        name: &str,
        args: Option<&str>,
    ) -> Result<bool> {
        match self.parsers.get(name) {
            Some(handler) => {
                handler(sig, args)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl std::fmt::Debug for OptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionRegistry")
            .field("options", &self.parsers.len())
            .finish()
    }
}

// -- handlers --------------------------------------------------------

fn opt_content(sig: &mut Signature, args: Option<&str>) -> Result<()> {
    let data = parse_content_arg("content", args)?;
    sig.ops.push(Operator::new(OperatorKind::Content(data)));
    Ok(())
}

fn opt_uricontent(sig: &mut Signature, args: Option<&str>) -> Result<()> {
    let mut data = parse_content_arg("uricontent", args)?;
    data.http_buffer = Some(HttpBuffer::Uri);
    sig.ops.push(Operator::new(OperatorKind::ContentUri(data)));
    Ok(())
}

fn opt_nocase(sig: &mut Signature, _args: Option<&str>) -> Result<()> {
    last_content(sig, "nocase")?.0.nocase = true;
    Ok(())
}

fn opt_offset(sig: &mut Signature, args: Option<&str>) -> Result<()> {
    let value = parse_i32("offset", args)?;
    last_content(sig, "offset")?.0.offset = Some(value);
    Ok(())
}

fn opt_depth(sig: &mut Signature, args: Option<&str>) -> Result<()> {
    let value = parse_i32("depth", args)?;
    last_content(sig, "depth")?.0.depth = Some(value);
    Ok(())
}

fn opt_distance(sig: &mut Signature, args: Option<&str>) -> Result<()> {
    let value = parse_i32("distance", args)?;
    let (data, relative) = last_content(sig, "distance")?;
    data.distance = Some(value);
    *relative = true;
    Ok(())
}

fn opt_within(sig: &mut Signature, args: Option<&str>) -> Result<()> {
    let value = parse_i32("within", args)?;
    let (data, relative) = last_content(sig, "within")?;
    data.within = Some(value);
    *relative = true;
    Ok(())
}

fn opt_fast_pattern(sig: &mut Signature, args: Option<&str>) -> Result<()> {
    let (data, _) = last_content(sig, "fast_pattern")?;
    match args {
        None => data.fast_pattern = true,
        Some("only") => {
            data.fast_pattern = true;
            data.fast_pattern_only = true;
        }
        Some(arg) => {
            // fast_pattern:<offset>,<length>
            let ok = arg
                .split_once(',')
                .map(|(a, b)| {
                    a.trim().parse::<u16>().is_ok() && b.trim().parse::<u16>().is_ok()
                })
                .unwrap_or(false);
            if !ok {
                return Err(bad_arg("fast_pattern", arg));
            }
            data.fast_pattern = true;
        }
    }
    Ok(())
}

fn opt_http_method(sig: &mut Signature, args: Option<&str>) -> Result<()> {
    set_http_buffer(sig, "http_method", args, HttpBuffer::Method)
}

fn opt_http_uri(sig: &mut Signature, args: Option<&str>) -> Result<()> {
    set_http_buffer(sig, "http_uri", args, HttpBuffer::Uri)
}

fn opt_http_header(sig: &mut Signature, args: Option<&str>) -> Result<()> {
    set_http_buffer(sig, "http_header", args, HttpBuffer::Header)
}

fn opt_http_cookie(sig: &mut Signature, args: Option<&str>) -> Result<()> {
    set_http_buffer(sig, "http_cookie", args, HttpBuffer::Cookie)
}

fn opt_http_client_body(sig: &mut Signature, args: Option<&str>) -> Result<()> {
    set_http_buffer(sig, "http_client_body", args, HttpBuffer::Body)
}

fn opt_http_stat_code(sig: &mut Signature, args: Option<&str>) -> Result<()> {
    set_http_buffer(sig, "http_stat_code", args, HttpBuffer::StatCode)
}

fn opt_http_stat_msg(sig: &mut Signature, args: Option<&str>) -> Result<()> {
    set_http_buffer(sig, "http_stat_msg", args, HttpBuffer::StatMsg)
}

/// Re-anchor the previous content to an HTTP buffer, turning it into a
/// uri-class operator
fn set_http_buffer(
    sig: &mut Signature,
    name: &'static str,
    args: Option<&str>,
    buffer: HttpBuffer,
) -> Result<()> {
    if let Some(arg) = args {
        return Err(bad_arg(name, arg));
    }
    let op = sig
        .ops
        .iter_mut()
        .rev()
        .find(|op| matches!(op.kind, OperatorKind::Content(_) | OperatorKind::ContentUri(_)))
        .ok_or_else(|| RuleError::ModifierWithoutContent(name.to_string()))?;

    let mut data = match &op.kind {
        OperatorKind::Content(d) | OperatorKind::ContentUri(d) => d.clone(),
        _ => unreachable!(),
    };
    data.http_buffer = Some(buffer);
    op.kind = OperatorKind::ContentUri(data);
    Ok(())
}

fn opt_pcre(sig: &mut Signature, args: Option<&str>) -> Result<()> {
    let arg = req_arg("pcre", args)?;
    let raw = strip_quotes(arg);
    let raw = raw.strip_prefix('!').unwrap_or(raw);

    let rest = raw
        .strip_prefix('/')
        .ok_or_else(|| bad_arg("pcre", arg))?;
    let close = rest.rfind('/').ok_or_else(|| bad_arg("pcre", arg))?;
    let (pattern, modifiers) = (&rest[..close], &rest[close + 1..]);

    // compile-check with the supported inline flags; the remaining
    // Snort modifiers select buffers and don't affect the expression
    let mut expr = String::new();
    if modifiers.contains('i') {
        expr.push_str("(?i)");
    }
    if modifiers.contains('m') {
        expr.push_str("(?m)");
    }
    if modifiers.contains('s') {
        expr.push_str("(?s)");
    }
    expr.push_str(pattern);
    regex::bytes::Regex::new(&expr).map_err(|_| bad_arg("pcre", arg))?;

    let mut op = Operator::new(OperatorKind::Pcre { expr });
    op.is_relative = modifiers.contains('R');
    sig.ops.push(op);
    Ok(())
}

fn opt_byte_jump(sig: &mut Signature, args: Option<&str>) -> Result<()> {
    let arg = req_arg("byte_jump", args)?;
    let mut parts = arg.split(',').map(str::trim);
    let bytes = parts
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(|| bad_arg("byte_jump", arg))?;
    let offset = parts
        .next()
        .and_then(|s| s.parse::<i32>().ok())
        .ok_or_else(|| bad_arg("byte_jump", arg))?;
    let relative = parts.any(|flag| flag == "relative");

    let mut op = Operator::new(OperatorKind::ByteJump { bytes, offset });
    op.is_relative = relative;
    sig.ops.push(op);
    Ok(())
}

fn opt_byte_extract(sig: &mut Signature, args: Option<&str>) -> Result<()> {
    let arg = req_arg("byte_extract", args)?;
    let mut parts = arg.split(',').map(str::trim);
    let bytes = parts
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(|| bad_arg("byte_extract", arg))?;
    let offset = parts
        .next()
        .and_then(|s| s.parse::<i32>().ok())
        .ok_or_else(|| bad_arg("byte_extract", arg))?;
    let name = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad_arg("byte_extract", arg))?
        .to_string();
    let relative = parts.any(|flag| flag == "relative");

    let mut op = Operator::new(OperatorKind::ByteExtract {
        bytes,
        offset,
        name,
    });
    op.is_relative = relative;
    sig.ops.push(op);
    Ok(())
}

fn opt_file_data(sig: &mut Signature, _args: Option<&str>) -> Result<()> {
    sig.ops.push(Operator::new(OperatorKind::FileData));
    Ok(())
}

fn opt_pkt_data(sig: &mut Signature, _args: Option<&str>) -> Result<()> {
    sig.ops.push(Operator::new(OperatorKind::PktData));
    Ok(())
}

fn opt_base64_data(sig: &mut Signature, _args: Option<&str>) -> Result<()> {
    sig.ops.push(Operator::new(OperatorKind::Base64Data));
    Ok(())
}

fn opt_ip_proto(sig: &mut Signature, args: Option<&str>) -> Result<()> {
    let arg = req_arg("ip_proto", args)?;
    let (op, rest) = match arg.as_bytes().first() {
        Some(&b'!') => (CmpOp::Ne, &arg[1..]),
        Some(&b'<') => (CmpOp::Lt, &arg[1..]),
        Some(&b'>') => (CmpOp::Gt, &arg[1..]),
        _ => (CmpOp::Eq, arg),
    };
    let proto = match rest.trim() {
        "tcp" => 6,
        "udp" => 17,
        "icmp" => 1,
        other => other
            .parse::<u8>()
            .map_err(|_| bad_arg("ip_proto", arg))?,
    };
    sig.ops
        .push(Operator::new(OperatorKind::IpProto { op, proto }));
    Ok(())
}

fn opt_flow(sig: &mut Signature, args: Option<&str>) -> Result<()> {
    let arg = req_arg("flow", args)?;
    let mut spec = FlowSpec::default();
    for tok in arg.split(',').map(str::trim) {
        match tok {
            "established" => spec.established = true,
            "not_established" => spec.not_established = true,
            "stateless" => spec.stateless = true,
            "to_server" => spec.direction = Some(FlowDirection::ToServer),
            "to_client" => spec.direction = Some(FlowDirection::ToClient),
            "from_server" => spec.direction = Some(FlowDirection::FromServer),
            "from_client" => spec.direction = Some(FlowDirection::FromClient),
            _ => return Err(bad_arg("flow", arg)),
        }
    }
    sig.ops.push(Operator::new(OperatorKind::Flow(spec)));
    Ok(())
}

// -- helpers ---------------------------------------------------------

fn last_content<'a>(
    sig: &'a mut Signature,
    opt: &str,
) -> Result<(&'a mut ContentData, &'a mut bool)> {
    let op = sig
        .ops
        .iter_mut()
        .rev()
        .find(|op| matches!(op.kind, OperatorKind::Content(_) | OperatorKind::ContentUri(_)))
        .ok_or_else(|| RuleError::ModifierWithoutContent(opt.to_string()))?;
    match &mut op.kind {
        OperatorKind::Content(data) | OperatorKind::ContentUri(data) => {
            Ok((data, &mut op.is_relative))
        }
        _ => unreachable!(),
    }
}

fn parse_content_arg(name: &'static str, args: Option<&str>) -> Result<ContentData> {
    let arg = req_arg(name, args)?;
    let (negated, arg) = match arg.strip_prefix('!') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, arg),
    };
    let inner = strip_quotes(arg);
    let pattern = unescape_content(inner);
    if pattern.is_empty() {
        return Err(bad_arg(name, arg));
    }
    Ok(ContentData::new(pattern, negated))
}

/// Decode a content pattern (supports hex notation |XX XX| and escaped
/// chars)
fn unescape_content(input: &str) -> Vec<u8> {
    let mut result = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '|' => {
                // Hex notation: |48 65 6C 6C 6F|
                let mut hex_str = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch == '|' {
                        chars.next();
                        break;
                    }
                    hex_str.push(ch);
                    chars.next();
                }

                for hex_byte in hex_str.split_whitespace() {
                    if let Ok(byte) = u8::from_str_radix(hex_byte, 16) {
                        result.push(byte);
                    }
                }
            }
            '\\' => {
                if let Some(next) = chars.next() {
                    match next {
                        'n' => result.push(b'\n'),
                        'r' => result.push(b'\r'),
                        't' => result.push(b'\t'),
                        '\\' => result.push(b'\\'),
                        '"' => result.push(b'"'),
                        ';' => result.push(b';'),
                        ':' => result.push(b':'),
                        _ => {
                            result.push(b'\\');
                            result.push(next as u8);
                        }
                    }
                }
            }
            _ => result.push(c as u8),
        }
    }

    result
}

fn strip_quotes(arg: &str) -> &str {
    let arg = arg.trim();
    if arg.len() >= 2 && arg.starts_with('"') && arg.ends_with('"') {
        &arg[1..arg.len() - 1]
    } else {
        arg
    }
}

fn req_arg<'a>(name: &str, args: Option<&'a str>) -> Result<&'a str> {
    match args {
        Some(a) if !a.is_empty() => Ok(a),
        _ => Err(RuleError::BadOptionArgument {
            name: name.to_string(),
            value: "<missing>".to_string(),
        }),
    }
}

fn parse_u32(name: &str, args: Option<&str>) -> Result<u32> {
    let arg = req_arg(name, args)?;
    arg.trim().parse::<u32>().map_err(|_| bad_arg(name, arg))
}

fn parse_i32(name: &str, args: Option<&str>) -> Result<i32> {
    let arg = req_arg(name, args)?;
    arg.trim().parse::<i32>().map_err(|_| bad_arg(name, arg))
}

fn bad_arg(name: &str, value: &str) -> RuleError {
    RuleError::BadOptionArgument {
        name: name.to_string(),
        value: value.to_string(),
    }
}

/// Walk the finished operator list and warn when a relative option
/// follows a fast_pattern:only content with no buffer reset in between
pub fn validate_fast_pattern(sig: &Signature) {
    let mut fp_only = false;

    for op in &sig.ops {
        if fp_only && op.is_relative {
            warn!("relative rule option used after fast_pattern:only");
        }

        match &op.kind {
            OperatorKind::FileData
            | OperatorKind::PktData
            | OperatorKind::Base64Data
            | OperatorKind::Pcre { .. }
            | OperatorKind::ByteJump { .. }
            | OperatorKind::ByteExtract { .. } => fp_only = false,
            OperatorKind::Content(data) | OperatorKind::ContentUri(data) => {
                fp_only = data.fast_pattern_only;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::signature::Signature;

    fn sig() -> Signature {
        Signature::new(Protocol::Tcp, true, true, 1, 0)
    }

    fn registry_parse(sig: &mut Signature, name: &str, args: Option<&str>) -> Result<bool> {
        OptionRegistry::with_builtins().get_option(sig, Protocol::Tcp, name, args)
    }

    #[test]
    fn test_meta_sid_gid_rev() {
        let mut s = sig();
        let classes = ClassificationTable::with_defaults();
        let so = AHashMap::new();

        for (name, args) in [("sid", "1000001"), ("gid", "3"), ("rev", "4")] {
            let out = parse_meta_option(&mut s, name, Some(args), &classes, &so).unwrap();
            assert!(matches!(out, MetaOutcome::Consumed));
        }
        assert_eq!(s.info.id, 1000001);
        assert_eq!(s.info.generator, 3);
        assert_eq!(s.info.rev, 4);

        assert!(parse_meta_option(&mut s, "sid", Some("x"), &classes, &so).is_err());
        assert!(parse_meta_option(&mut s, "sid", None, &classes, &so).is_err());
    }

    #[test]
    fn test_meta_classtype_priority_interaction() {
        let classes = ClassificationTable::with_defaults();
        let so = AHashMap::new();

        let mut s = sig();
        parse_meta_option(&mut s, "classtype", Some("attempted-admin"), &classes, &so).unwrap();
        assert_eq!(s.info.priority, 1);

        // an explicit priority wins regardless of option order
        let mut s = sig();
        parse_meta_option(&mut s, "priority", Some("5"), &classes, &so).unwrap();
        parse_meta_option(&mut s, "classtype", Some("attempted-admin"), &classes, &so).unwrap();
        assert_eq!(s.info.priority, 5);

        let mut s = sig();
        assert!(matches!(
            parse_meta_option(&mut s, "classtype", Some("no-such-class"), &classes, &so),
            Err(RuleError::UnknownClasstype(_))
        ));
    }

    #[test]
    fn test_meta_reference_and_metadata() {
        let classes = ClassificationTable::with_defaults();
        let so = AHashMap::new();
        let mut s = sig();

        parse_meta_option(&mut s, "reference", Some("cve,2021-44228"), &classes, &so).unwrap();
        assert_eq!(s.info.references.len(), 1);
        assert_eq!(s.info.references[0].scheme, "cve");

        parse_meta_option(
            &mut s,
            "metadata",
            Some("service http, policy balanced"),
            &classes,
            &so,
        )
        .unwrap();
        assert_eq!(s.info.metadata.len(), 2);
        assert_eq!(s.info.metadata[0], ("service".to_string(), "http".to_string()));
    }

    #[test]
    fn test_meta_soid() {
        let classes = ClassificationTable::with_defaults();
        let mut so = AHashMap::new();
        so.insert("3|10001".to_string(), "content:\"x\"; sid:10001;".to_string());

        let mut s = sig();
        let out = parse_meta_option(&mut s, "soid", Some("3|10001"), &classes, &so).unwrap();
        assert!(matches!(out, MetaOutcome::SharedObject(_)));

        assert!(matches!(
            parse_meta_option(&mut s, "soid", Some("3|999"), &classes, &so),
            Err(RuleError::UnknownSoRule(_))
        ));
    }

    #[test]
    fn test_unknown_name_is_not_meta() {
        let classes = ClassificationTable::with_defaults();
        let so = AHashMap::new();
        let mut s = sig();
        assert!(matches!(
            parse_meta_option(&mut s, "content", Some("\"x\""), &classes, &so).unwrap(),
            MetaOutcome::NotMeta
        ));
    }

    #[test]
    fn test_content_and_modifiers() {
        let mut s = sig();
        assert!(registry_parse(&mut s, "content", Some("\"GET |0D 0A|\"")).unwrap());
        assert!(registry_parse(&mut s, "nocase", None).unwrap());
        assert!(registry_parse(&mut s, "offset", Some("4")).unwrap());
        assert!(registry_parse(&mut s, "within", Some("10")).unwrap());

        assert_eq!(s.ops.len(), 1);
        let op = &s.ops[0];
        assert!(op.is_relative); // set by within
        if let OperatorKind::Content(data) = &op.kind {
            assert_eq!(data.pattern, b"GET \r\n");
            assert!(data.nocase);
            assert_eq!(data.offset, Some(4));
            assert_eq!(data.within, Some(10));
        } else {
            panic!("expected content operator");
        }
    }

    #[test]
    fn test_modifier_without_content() {
        let mut s = sig();
        assert!(matches!(
            registry_parse(&mut s, "nocase", None),
            Err(RuleError::ModifierWithoutContent(_))
        ));
    }

    #[test]
    fn test_http_modifier_re_anchors() {
        let mut s = sig();
        registry_parse(&mut s, "content", Some("\"/admin\"")).unwrap();
        registry_parse(&mut s, "http_uri", None).unwrap();

        if let OperatorKind::ContentUri(data) = &s.ops[0].kind {
            assert_eq!(data.http_buffer, Some(HttpBuffer::Uri));
            assert!(data.http_buffer.unwrap().fp_eligible());
        } else {
            panic!("expected uri content operator");
        }

        registry_parse(&mut s, "content", Some("\"session=\"")).unwrap();
        registry_parse(&mut s, "http_cookie", None).unwrap();
        if let OperatorKind::ContentUri(data) = &s.ops[1].kind {
            assert!(!data.http_buffer.unwrap().fp_eligible());
        } else {
            panic!("expected cookie content operator");
        }
    }

    #[test]
    fn test_negated_content() {
        let mut s = sig();
        registry_parse(&mut s, "content", Some("!\"evil\"")).unwrap();
        if let OperatorKind::Content(data) = &s.ops[0].kind {
            assert!(data.negated);
            assert_eq!(data.pattern, b"evil");
        } else {
            panic!("expected content operator");
        }
    }

    #[test]
    fn test_pcre_parse() {
        let mut s = sig();
        registry_parse(&mut s, "pcre", Some("\"/^GET\\s+/i\"")).unwrap();
        assert!(!s.ops[0].is_relative);

        registry_parse(&mut s, "pcre", Some("\"/more/R\"")).unwrap();
        assert!(s.ops[1].is_relative);

        assert!(registry_parse(&mut s, "pcre", Some("\"no-slashes\"")).is_err());
        assert!(registry_parse(&mut s, "pcre", Some("\"/bad(/\"")).is_err());
    }

    #[test]
    fn test_byte_jump_and_extract() {
        let mut s = sig();
        registry_parse(&mut s, "byte_jump", Some("4,12,relative")).unwrap();
        assert!(s.ops[0].is_relative);
        assert_eq!(
            s.ops[0].kind,
            OperatorKind::ByteJump { bytes: 4, offset: 12 }
        );

        registry_parse(&mut s, "byte_extract", Some("2,0,len")).unwrap();
        assert!(!s.ops[1].is_relative);

        assert!(registry_parse(&mut s, "byte_jump", Some("four,12")).is_err());
    }

    #[test]
    fn test_ip_proto_forms() {
        let mut s = sig();
        registry_parse(&mut s, "ip_proto", Some("tcp")).unwrap();
        registry_parse(&mut s, "ip_proto", Some("!udp")).unwrap();
        registry_parse(&mut s, "ip_proto", Some("47")).unwrap();

        assert_eq!(
            s.ops[0].kind,
            OperatorKind::IpProto { op: CmpOp::Eq, proto: 6 }
        );
        assert_eq!(
            s.ops[1].kind,
            OperatorKind::IpProto { op: CmpOp::Ne, proto: 17 }
        );
        assert_eq!(
            s.ops[2].kind,
            OperatorKind::IpProto { op: CmpOp::Eq, proto: 47 }
        );
    }

    #[test]
    fn test_flow_parse() {
        let mut s = sig();
        registry_parse(&mut s, "flow", Some("established,to_server")).unwrap();
        if let OperatorKind::Flow(spec) = &s.ops[0].kind {
            assert!(spec.established);
            assert_eq!(spec.direction, Some(FlowDirection::ToServer));
        } else {
            panic!("expected flow operator");
        }

        assert!(registry_parse(&mut s, "flow", Some("sideways")).is_err());
    }

    #[test]
    fn test_unknown_option_returns_false() {
        let mut s = sig();
        assert!(!registry_parse(&mut s, "frobnicate", Some("1")).unwrap());
    }

    #[test]
    fn test_fast_pattern_only_state_machine() {
        // fast_pattern:only followed by pcre resets the state; a plain
        // relative content after the reset is fine
        let mut s = sig();
        registry_parse(&mut s, "content", Some("\"a\"")).unwrap();
        registry_parse(&mut s, "fast_pattern", Some("only")).unwrap();
        registry_parse(&mut s, "pcre", Some("\"/b/\"")).unwrap();
        registry_parse(&mut s, "content", Some("\"c\"")).unwrap();
        registry_parse(&mut s, "distance", Some("1")).unwrap();
        validate_fast_pattern(&s); // warns nothing; exercised for coverage

        if let OperatorKind::Content(data) = &s.ops[0].kind {
            assert!(data.fast_pattern_only);
        } else {
            panic!("expected content operator");
        }
    }
}
