//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせて 1 回の firing を実行します。
//!
//! # 主要コンポーネント
//! - **Coordinator**: firing 全体のオーケストレーション（CoordinatorBuilder で構築）
//! - **snapshot / readiness / recovery**: 取得・READY チェック・クラッシュ後の修復
//! - **admission**: group ごとの同時実行数の上限
//! - **exclusivity / execution_state**: 排他チェックと RUNNING の出入り
//! - **dispatcher**: handler の解決・実行・結果の適用
//! - **interrupt / stop_policy**: 外部からの停止と thread-stop action
//! - **children**: lightweight 子タスクの待機

pub mod admission;
pub mod children;
pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod exclusivity;
pub mod execution_state;
pub mod firing;
pub mod handle;
pub mod interrupt;
pub mod readiness;
pub mod recovery;
pub mod running;
pub mod snapshot;
pub mod state_manager;
pub mod stop_policy;

// 主要な型を再エクスポート
pub use self::admission::{AdmissionController, AdmissionDecision, SaturatedGroup};
pub use self::children::{ChildState, LightweightContext, wait_for_children_and_close};
pub use self::config::{ConfigError, CoordinatorConfig};
pub use self::coordinator::{BuildError, Coordinator, CoordinatorBuilder};
pub use self::firing::RunContext;
pub use self::handle::ExecutionHandle;
pub use self::interrupt::{InterruptPolicy, ShutdownCoordinator};
pub use self::running::{RunningRegistration, RunningTasks};
pub use self::state_manager::StateManager;
