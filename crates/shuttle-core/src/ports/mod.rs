//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! The coordinator consumes every external collaborator (task store, trigger
//! engine, handler registry, listeners, security context) through these traits
//! and receives them explicitly at construction time.

pub mod clock;
pub mod handler;
pub mod id_generator;
pub mod listener;
pub mod security;
pub mod task_store;
pub mod trigger_engine;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::handler::{HandlerResolver, TaskHandler};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::listener::TaskListener;
pub use self::security::{SecurityContextManager, SecurityScope};
pub use self::task_store::{Precondition, TaskStore};
pub use self::trigger_engine::TriggerEngine;
