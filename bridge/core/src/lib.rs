//! Bridge Core - Duplex Command Bus for Browser Terminals
//!
//! This crate connects a synchronous, blocking command interpreter to a
//! stateless, polling HTTP client. The interpreter never touches a socket
//! and the client never holds a connection open to the interpreter; both
//! talk to the [`CommandBus`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                       ┌──────────────────────┐
//! │   Browser terminal   │  POST /session ──────►│                      │
//! │   (polling client)   │◄────── GET /session   │      CommandBus      │
//! └──────────────────────┘                       │  inbound ─► dispatch │
//!                                                │  outbound ◄─ enqueue │
//!                                                └──────────┬───────────┘
//!                                                           │
//!                                         one-shot consumers │ interceptors
//!                                                           ▼
//!                                                ┌──────────────────────┐
//!                                                │ Interpreter (worker  │
//!                                                │ thread, blocking UI) │
//!                                                └──────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`InboundCommand`]: one line of client input plus terminal width
//! - [`OutboundCommand`]: one instruction for the terminal
//! - [`CommandBus`]: queues, dispatch loop, consumer registry
//! - [`ConsumerHandle`]: revocation handle for a pending input wait
//!
//! # Quick Start
//!
//! ```ignore
//! use bridge_core::{BusConfig, CommandBus, InboundCommand, OutboundCommand};
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = CommandBus::start(BusConfig::default());
//!
//!     // Interpreter side: wait for the next line
//!     bus.register_one_shot_consumer(|cmd, _scope| {
//!         println!("got {}", cmd.text_line);
//!     });
//!     bus.enqueue_outbound(OutboundCommand::read_line(false, None)).unwrap();
//!
//!     // HTTP side
//!     let next = bus.poll_outbound().await;
//!     bus.enqueue_inbound(InboundCommand::new("dir", 120)).unwrap();
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`commands`]: wire types for both directions
//! - [`consumer`]: one-shot consumer registry and revocation handles
//! - [`bus`]: the command bus and its dispatch loop
//! - [`config`]: TOML / environment / CLI configuration

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bus;
pub mod commands;
pub mod config;
pub mod consumer;

// Re-exports for convenience
pub use bus::{BusError, BusStats, CommandBus, Interceptor};
pub use commands::{InboundCommand, OutboundCommand, PromptField};
pub use config::{
    default_config_path, load_config, load_config_from_path, BridgeConfigFile, BusConfig,
    ConfigError, ConfigOverrides, ConfigSource, HostConfig, ServerConfig,
};
pub use consumer::{ConsumerCallback, ConsumerHandle, ConsumerId, ConsumerRegistry, ConsumerState};
