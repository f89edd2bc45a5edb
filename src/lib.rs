//! VoxBridge Library
//!
//! Voice command pipeline for conversational agents: speech capture and
//! recognition, speech output, command interpretation, and a gateway for
//! invoking tools on external tool servers.

pub mod asr;
pub mod audio;
pub mod commands;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handler;
pub mod history;
pub mod listener;
pub mod normalizer;
pub mod session;
pub mod tools;
pub mod tts;
pub mod utils;

pub use commands::{Command, CommandInterpreter, CommandType};
pub use config::Config;
pub use error::{VoxError, VoxResult};
pub use gateway::{GatewayError, ToolServerGateway};
pub use session::{CommandHandler, VoiceSession};
pub use tools::{extract_tool_calls, ToolDispatcher, ToolRegistry};
