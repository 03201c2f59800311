//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryTaskStore**: テスト用の正本
//! - **InMemoryTriggerEngine**: 呼び出しを記録するだけのトリガーエンジン
//! - **HandlerRegistry**: handler_ref -> handler
//! - **RecordingListener** / **InMemorySecurityContext**

pub mod inmem_store;
pub mod inmem_trigger;
pub mod listener;
pub mod registry;
pub mod security;

// 主要な型を再エクスポート
pub use self::inmem_store::InMemoryTaskStore;
pub use self::inmem_trigger::{InMemoryTriggerEngine, TriggerEvent};
pub use self::listener::{ListenerEvent, RecordingListener};
pub use self::registry::HandlerRegistry;
pub use self::security::{InMemorySecurityContext, SYSTEM_IDENTITY};
