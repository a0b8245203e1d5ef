pub mod config;
pub mod errors;
pub mod message;
pub mod thread;

pub use config::{
    AppConfig, AssistantConfig, ConfigError, ConfigOverrides, DatabaseConfig, LlmConfig,
    LlmProvider, LoadOptions, LogFormat, LoggingConfig, MeetingsConfig, RetrievalConfig,
    ServerConfig,
};
pub use errors::{ApplicationError, InterfaceError};
pub use message::{
    validate_history, HistoryIntegrityError, Message, ToolCallRequest, ToolStatus,
};
pub use thread::{filter_reserved_keys, merge_user_data, Thread, UserConfig};
