//! shuttle-core
//!
//! Core of the Shuttle task execution coordinator: what happens on a node
//! between "the trigger engine fired task X" and "task X is back at rest".
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, task, result, stop, policy, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, TriggerEngine, TaskHandler, など）
//! - **app**: firing の実行ロジック（Coordinator と各ステップ）
//! - **impls**: 実装（InMemoryTaskStore など開発用）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
