/// Rule text tokenisation: header splitting, the escape-aware option
/// tokenizer, and the address/port specification grammars
use super::rule::{IpSpec, PortSpec};
use crate::error::{Result, RuleError};
use std::net::IpAddr;

/// The seven whitespace-separated header fields of a text rule
#[derive(Debug, Clone, Copy)]
pub struct HeaderTokens<'a> {
    pub action: &'a str,
    pub proto: &'a str,
    pub src_ip: &'a str,
    pub src_port: &'a str,
    pub dir: &'a str,
    pub dst_ip: &'a str,
    pub dst_port: &'a str,
}

/// A rule split into its header fields and parenthesised option body.
/// Builtin rules (starting with '(') have no header tokens.
#[derive(Debug, Clone, Copy)]
pub struct RuleParts<'a> {
    pub header: Option<HeaderTokens<'a>>,
    pub options: Option<&'a str>,
}

/// Split one rule into header tokens and the option body. The option
/// body keeps its surrounding parentheses; balance is validated by the
/// option parser.
pub fn split_rule(text: &str) -> Result<RuleParts<'_>> {
    let text = text.trim();

    if text.is_empty() {
        return Err(RuleError::BadRule(text.to_string()));
    }

    // A leading '(' marks a builtin rule: the whole string is options
    if text.starts_with('(') {
        return Ok(RuleParts {
            header: None,
            options: Some(text),
        });
    }

    let (head, options) = match text.find('(') {
        Some(pos) => (&text[..pos], Some(text[pos..].trim())),
        None => (text, None),
    };

    let toks: Vec<&str> = head.split_whitespace().collect();
    if toks.len() != 7 {
        return Err(RuleError::BadRule(text.to_string()));
    }

    Ok(RuleParts {
        header: Some(HeaderTokens {
            action: toks[0],
            proto: toks[1],
            src_ip: toks[2],
            src_port: toks[3],
            dir: toks[4],
            dst_ip: toks[5],
            dst_port: toks[6],
        }),
        options,
    })
}

/// Split an option body (parentheses already stripped) on ';',
/// honouring '\' as an escape so '\;' stays inside a token. Empty
/// tokens are dropped, so a trailing ';' produces no phantom option.
pub fn split_options(body: &str) -> Vec<String> {
    let mut toks = Vec::new();
    let mut cur = String::new();
    let mut escaped = false;

    for c in body.chars() {
        if escaped {
            cur.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => {
                // keep the backslash; option arguments unescape later
                cur.push(c);
                escaped = true;
            }
            ';' => {
                let tok = cur.trim();
                if !tok.is_empty() {
                    toks.push(tok.to_string());
                }
                cur.clear();
            }
            _ => cur.push(c),
        }
    }

    let tok = cur.trim();
    if !tok.is_empty() {
        toks.push(tok.to_string());
    }

    toks
}

/// Break an option token into its name and optional argument, splitting
/// once on the first unescaped ':'
pub fn split_option(token: &str) -> (&str, Option<&str>) {
    let mut escaped = false;
    for (i, c) in token.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            ':' => return (token[..i].trim(), Some(token[i + 1..].trim())),
            _ => {}
        }
    }
    (token.trim(), None)
}

/// Parse a complete address token into its specification tree
pub fn ip_spec(token: &str) -> Result<IpSpec> {
    parse_ip_token(token).ok_or_else(|| RuleError::BadAddress(token.to_string()))
}

/// Parse a complete port token into its specification tree; the caller
/// attaches the src/dst context to failures
pub fn port_spec(token: &str) -> std::result::Result<PortSpec, String> {
    parse_port_token(token).ok_or_else(|| "malformed port list".to_string())
}

fn parse_ip_token(token: &str) -> Option<IpSpec> {
    let token = token.trim();

    if let Some(rest) = token.strip_prefix('!') {
        return Some(IpSpec::Not(Box::new(parse_ip_token(rest)?)));
    }

    if token.starts_with('[') {
        let inner = token.strip_prefix('[')?.strip_suffix(']')?;
        let items = split_list(inner)
            .into_iter()
            .map(parse_ip_token)
            .collect::<Option<Vec<_>>>()?;
        return Some(IpSpec::List(items));
    }

    if token.eq_ignore_ascii_case("any") {
        return Some(IpSpec::Any);
    }

    if let Some(name) = token.strip_prefix('$') {
        return variable_name(name).map(IpSpec::Variable);
    }

    // prefix notation splits at the last '/' so IPv6 text stays whole
    if let Some((addr, prefix)) = token.rsplit_once('/') {
        let addr = addr.parse::<IpAddr>().ok()?;
        let prefix = prefix.parse::<u8>().ok()?;
        return Some(IpSpec::Network { addr, prefix });
    }

    token.parse::<IpAddr>().ok().map(IpSpec::Host)
}

fn parse_port_token(token: &str) -> Option<PortSpec> {
    let token = token.trim();

    if let Some(rest) = token.strip_prefix('!') {
        return Some(PortSpec::Not(Box::new(parse_port_token(rest)?)));
    }

    if token.starts_with('[') {
        let inner = token.strip_prefix('[')?.strip_suffix(']')?;
        let items = split_list(inner)
            .into_iter()
            .map(parse_port_token)
            .collect::<Option<Vec<_>>>()?;
        return Some(PortSpec::List(items));
    }

    if token.eq_ignore_ascii_case("any") {
        return Some(PortSpec::Any);
    }

    if let Some(name) = token.strip_prefix('$') {
        return variable_name(name).map(PortSpec::Variable);
    }

    match token.split_once(':') {
        Some(("", hi)) => hi.parse().ok().map(PortSpec::RangeTo),
        Some((lo, "")) => lo.parse().ok().map(PortSpec::RangeFrom),
        Some((lo, hi)) => Some(PortSpec::Range(lo.parse().ok()?, hi.parse().ok()?)),
        None => token.parse().ok().map(PortSpec::Port),
    }
}

/// Split a bracketed list body on the commas at nesting depth zero
fn split_list(inner: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in inner.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(inner[start..].trim());

    items
}

fn variable_name(name: &str) -> Option<String> {
    if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        Some(name.to_string())
    } else {
        None
    }
}
