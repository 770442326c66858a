use thiserror::Error;

/// Main error type for rule ingestion. Every variant is fatal to the
/// ingestion pass; recoverable conditions go out as tracing warnings
/// instead.
#[derive(Error, Debug)]
pub enum RuleError {
    // -- syntactic ---------------------------------------------------
    #[error("bad rule in rules file: {0}")]
    BadRule(String),

    #[error("bad protocol: {0}")]
    BadProtocol(String),

    #[error("unknown rule action: {0}")]
    BadAction(String),

    #[error("port value missing in rule")]
    MissingPortValue,

    #[error("illegal direction specifier: {0}")]
    BadDirection(String),

    #[error("rule options must be enclosed in '(' and ')'")]
    UnenclosedOptions,

    #[error("unknown rule option: {0}")]
    UnknownOption(String),

    #[error("invalid argument to rule option {name}: {value}")]
    BadOptionArgument { name: String, value: String },

    #[error("{0} requires a preceding content option")]
    ModifierWithoutContent(String),

    // -- addresses ---------------------------------------------------
    #[error("undefined variable in the string: {0}")]
    UndefinedVariable(String),

    #[error(
        "negated IP ranges that are more general than non-negated ranges \
         are not allowed; consider inverting the logic: {0}"
    )]
    AddressConflict(String),

    #[error("!any is not allowed: {0}")]
    NotAny(String),

    #[error("unable to process the IP address: {0}")]
    BadAddress(String),

    #[error("empty IP used either as source IP or as destination IP in a rule; IP list: {0}")]
    EmptyAddressList(String),

    // -- ports -------------------------------------------------------
    #[error("port variable table missing an 'any' variable")]
    MissingAnyPort,

    #[error("port variable lookup failed on '{0}'")]
    UndefinedPortVariable(String),

    #[error("bad {dir} port '{token}': {reason}")]
    BadPortList {
        dir: &'static str,
        token: String,
        reason: String,
    },

    #[error("pure NOT ports are not allowed: {0}")]
    PureNotPort(String),

    // -- signatures --------------------------------------------------
    #[error("each rule must contain a sid")]
    MissingSid,

    #[error("builtin rules do not support detection options")]
    BuiltinDetectionOptions,

    #[error("unknown classification: {0}")]
    UnknownClasstype(String),

    #[error("unknown shared object rule: {0}")]
    UnknownSoRule(String),

    #[error("gid {gid} sid {sid} in rule duplicates previous rule, with different protocol")]
    DuplicateProtocolMismatch { gid: u32, sid: u32 },

    #[error("gid {gid} sid {sid} in rule duplicates previous rule, with different type")]
    DuplicateTypeMismatch { gid: u32, sid: u32 },

    #[error("{gid}:{sid}:{rev} duplicates previous rule")]
    DuplicateRule { gid: u32, sid: u32, rev: u32 },

    // -- ambient -----------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for rule ingestion operations
pub type Result<T> = std::result::Result<T, RuleError>;
