/// Rule vocabulary shared across the ingestion pipeline
use crate::error::RuleError;
use std::fmt;
use std::net::IpAddr;

/// What the engine does with traffic matching a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleAction {
    /// Raise an event and let the packet through
    Alert,
    /// Silently discard the packet when running inline
    Drop,
    /// Record the packet without raising an event
    Log,
    /// Stop evaluating; the packet is explicitly allowed
    Pass,
    /// Discard and answer with a TCP reset or an ICMP unreachable
    Reject,
}

impl RuleAction {
    /// Resolve an action token against the known action lists
    pub fn from_token(token: &str) -> Result<Self, RuleError> {
        match token.to_ascii_lowercase().as_str() {
            "alert" => Ok(RuleAction::Alert),
            "drop" => Ok(RuleAction::Drop),
            "log" => Ok(RuleAction::Log),
            "pass" => Ok(RuleAction::Pass),
            "reject" => Ok(RuleAction::Reject),
            _ => Err(RuleError::BadAction(token.to_string())),
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleAction::Alert => write!(f, "alert"),
            RuleAction::Drop => write!(f, "drop"),
            RuleAction::Log => write!(f, "log"),
            RuleAction::Pass => write!(f, "pass"),
            RuleAction::Reject => write!(f, "reject"),
        }
    }
}

/// Transport selector in a rule header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    /// Every IP protocol; a rule narrows it with the ip_proto option
    Ip,
}

impl Protocol {
    pub fn from_token(token: &str) -> Result<Self, RuleError> {
        match token.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            "icmp" => Ok(Protocol::Icmp),
            "ip" => Ok(Protocol::Ip),
            _ => Err(RuleError::BadProtocol(token.to_string())),
        }
    }

    /// ICMP and all-IP rules have no real ports; only the type/protocol
    /// dimension matters for them
    pub fn has_ports(&self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }

    /// IANA protocol number (0 for the all-IP pseudo protocol)
    pub fn number(&self) -> u8 {
        match self {
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
            Protocol::Icmp => 1,
            Protocol::Ip => 0,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
            Protocol::Icmp => write!(f, "icmp"),
            Protocol::Ip => write!(f, "ip"),
        }
    }
}

/// Traffic orientation between the two header endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// '->': source to destination only
    Directional,
    /// '<>': either orientation
    Bidirectional,
}

impl Direction {
    pub fn is_direction_token(token: &str) -> bool {
        token == "->" || token == "<>"
    }

    pub fn from_token(token: &str) -> Result<Self, RuleError> {
        match token {
            "->" => Ok(Direction::Directional),
            "<>" => Ok(Direction::Bidirectional),
            _ => Err(RuleError::BadDirection(token.to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Directional => write!(f, "->"),
            Direction::Bidirectional => write!(f, "<>"),
        }
    }
}

/// Parsed form of an address field, before resolution against the
/// variable table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpSpec {
    /// The universal set
    Any,
    /// Named set from the variable table ($HOME_NET)
    Variable(String),
    /// A single host address
    Host(IpAddr),
    /// A network in prefix notation (10.0.0.0/8)
    Network { addr: IpAddr, prefix: u8 },
    /// Bracketed collection; members may nest and negate freely
    List(Vec<IpSpec>),
    /// Complement of the inner specification
    Not(Box<IpSpec>),
}

/// Parsed form of a port field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    /// The full port space
    Any,
    /// Named object from the port variable table ($HTTP_PORTS)
    Variable(String),
    /// One port
    Port(u16),
    /// Inclusive span (8000:8100)
    Range(u16, u16),
    /// From a port to the top of the space (1024:)
    RangeFrom(u16),
    /// From zero up to a port (:1023)
    RangeTo(u16),
    /// Bracketed collection; members may nest and negate freely
    List(Vec<PortSpec>),
    /// Complement of the inner specification
    Not(Box<PortSpec>),
}

/// Header flag bits carried by a rule-tree node. The EXCEPT bits take
/// part in header equality but are never set during ingestion; per-port
/// negation lives inside port objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct HeaderFlags(u32);

impl HeaderFlags {
    pub const ANY_SRC_IP: HeaderFlags = HeaderFlags(0x01);
    pub const ANY_DST_IP: HeaderFlags = HeaderFlags(0x02);
    pub const ANY_SRC_PORT: HeaderFlags = HeaderFlags(0x04);
    pub const ANY_DST_PORT: HeaderFlags = HeaderFlags(0x08);
    pub const EXCEPT_SRC_PORT: HeaderFlags = HeaderFlags(0x10);
    pub const EXCEPT_DST_PORT: HeaderFlags = HeaderFlags(0x20);
    pub const BIDIRECTIONAL: HeaderFlags = HeaderFlags(0x40);

    pub fn empty() -> Self {
        HeaderFlags(0)
    }

    pub fn contains(self, other: HeaderFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: HeaderFlags) {
        self.0 |= other.0;
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for HeaderFlags {
    type Output = HeaderFlags;

    fn bitor(self, rhs: HeaderFlags) -> HeaderFlags {
        HeaderFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for HeaderFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}
