//! winscope-core: window scope for container-managed beans
//!
//! A window scope ties bean lifetimes to a logical browser window or tab
//! instead of a request or a whole session. The window id is issued on the
//! server, carried by the client on every request, and bounded per session
//! with least-recently-used eviction.
//!
//! # Architecture
//!
//! ```text
//! request ─→ WindowContext::resolve_window_id ─→ WindowIdHolder (per session)
//!                    ↓
//!            WindowBeanHolder (per session, LRU) ─→ BeanBag (per window)
//!                    ↓
//!            Contextual::create / destroy
//! ```
//!
//! # Modules
//!
//! - `window_context`: The scope itself
//! - `extension`: Two-phase container extension installing the scope
//! - `container`: Container SPI and an in-process standalone container
//! - `session`: Per-session storage and the session registry
//! - `window_bean_holder`: Window → bean bag mapping with LRU eviction
//! - `window_id_holder`: Window ids known to a session
//! - `client_window`: Render-mode policy (crawlers, script-disabled clients)
//! - `propagation`: URL, form and script channels for the window id
//! - `messages`: User messages kept across redirects per window
//! - `contextual`: Bean creation/destruction contract
//! - `request`: Request abstraction and per-request resolution state
//! - `config`: Configuration management
//! - `logging`: Structured logging setup
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod client_window;
pub mod config;
pub mod container;
pub mod contextual;
pub mod error;
pub mod extension;
pub mod logging;
pub mod messages;
pub mod propagation;
pub mod request;
pub mod session;
pub mod window_bean_holder;
pub mod window_context;
pub mod window_id;
pub mod window_id_holder;

pub use error::{ConfigError, Error, Result};
pub use window_context::WindowContext;
pub use window_id::{SessionId, WindowId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
