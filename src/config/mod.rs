// Configuration loading for the ingestion engine
pub mod settings;

pub use settings::{
    ClassificationDef, FastPatternConfig, LoggingConfig, ParsingConfig, Settings, VarDef, VarKind,
};
