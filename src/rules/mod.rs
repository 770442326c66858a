// Rule ingestion core - header/option parsing, canonicalisation, and
// port-group indexing
pub mod addr;
pub mod groups;
pub mod header;
pub mod ingest;
pub mod options;
pub mod parser;
pub mod ports;
pub mod rule;
pub mod signature;

pub use addr::{AddrSet, IpVarTable};
pub use groups::{GroupTable, ProtoGroups, RulePortTables};
pub use header::{DetectionStep, HeaderSpec, RuleHeader, RuleList};
pub use ingest::Ingestor;
pub use options::{
    ContentData, FlowSpec, HttpBuffer, MetaOutcome, Operator, OperatorKind, OptionRegistry,
};
pub use ports::{PortDir, PortObject, PortSet, PortTable, PortVarTable};
pub use rule::{Direction, HeaderFlags, IpSpec, PortSpec, Protocol, RuleAction};
pub use signature::{
    ClassificationTable, IpProtoConstraint, PolicyId, Reference, RuleIndexMap, SigInfo, Signature,
    SignatureMap,
};
