//! # hastur
//!
//! **Zero-conf systemd-nspawn container manager**
//!
//! hastur provisions lightweight Linux containers from a cached,
//! package-installed base image, attaches each one to a shared software
//! bridge with an IPv4 address, and runs a caller-supplied command
//! inside. It targets automated testing and local fleets of short-lived
//! containers on a single host.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                            hastur                                  │
//! ├────────────────────────────────────────────────────────────────────┤
//! │  ┌────────────────────────────────────────────────────────────┐    │
//! │  │                 Lifecycle Orchestrator                     │    │
//! │  │  forwarding → bridge → image → rootfs → handshake → wait   │    │
//! │  │             reverse-order cleanup stack                    │    │
//! │  └───────────┬──────────────────────┬─────────────────────────┘    │
//! │              │                      │                              │
//! │  ┌───────────┴──────────┐  ┌────────┴─────────────────────────┐    │
//! │  │   Base-Image Cache   │  │        Network Helpers           │    │
//! │  │  SHA-224 fingerprint │  │  bridge / netns / masquerade /   │    │
//! │  │  .hastur sentinel    │  │  address + route migration       │    │
//! │  └───────────┬──────────┘  └──────────────────────────────────┘    │
//! │              │                                                     │
//! │  ┌───────────┴────────────────────────────────────────────────┐    │
//! │  │                    Storage Backends                        │    │
//! │  │  ┌──────────────────────┐   ┌──────────────────────┐       │    │
//! │  │  │   OverlayFsStorage   │   │      ZfsStorage      │       │    │
//! │  │  │  overlay over dirs,  │   │   snapshot + clone   │       │    │
//! │  │  │   tmpfs fallback     │   │      datasets        │       │    │
//! │  │  └──────────────────────┘   └──────────────────────┘       │    │
//! │  └────────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Two-Process One-Binary Pattern
//!
//! The manager binary doubles as the in-container entrypoint. The
//! orchestrator copies it into the container root as `/.hastur.exec`;
//! when the process starts under that argv[0] it runs the bootstrap
//! path instead of the CLI, blocking on a control FIFO until the host
//! finishes network setup, then execing the user command. The handshake
//! guarantees the user command sees its network already configured.
//!
//! # Shared Host State
//!
//! Multiple invocations may race on the bridge, the image cache, and the
//! netns directory. Every mutation of shared state is idempotent
//! ("already present" is success), which is what makes concurrent runs
//! safe and reruns cheap. Per-container state (rootfs, netns bind, veth
//! pair) is owned by one invocation and reclaimed in reverse order on
//! every exit path.

pub mod bootstrap;
pub mod cleanup;
pub mod error;
pub mod exec;
pub mod fsutil;
pub mod image;
pub mod lifecycle;
pub mod machine;
pub mod mount;
pub mod namegen;
pub mod network;
pub mod nspawn;
pub mod query;
pub mod signals;
pub mod storage;

pub use error::{Error, Result};
pub use lifecycle::StartOptions;
pub use machine::CONTAINER_SUFFIX;
pub use query::ContainerInfo;
pub use storage::{OverlayFsStorage, Storage, ZfsStorage};
