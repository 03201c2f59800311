//! Admission control: per-group concurrency ceilings.
//!
//! A refused task does not run. It is either left to its trigger's next
//! natural firing ("regular" backoff) or explicitly rescheduled to a
//! computed time. Neither path touches the execution state.

use chrono::{DateTime, TimeDelta, Utc};

use super::config::CoordinatorConfig;
use crate::domain::{ExecutionConstraints, FiringStep, StopFiring, Task};
use crate::ports::{Clock, TaskStore, TriggerEngine};

/// A group that is at or over its limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaturatedGroup {
    pub group: String,
    pub running: usize,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    Allowed,
    Refused {
        saturated: Vec<SaturatedGroup>,
        retry_at: DateTime<Utc>,
        /// True if the trigger's own next firing is relied upon.
        regular: bool,
    },
}

pub struct AdmissionController<'a> {
    pub store: &'a dyn TaskStore,
    pub trigger: &'a dyn TriggerEngine,
    pub clock: &'a dyn Clock,
    pub config: &'a CoordinatorConfig,
}

impl AdmissionController<'_> {
    /// Decides whether `task` may run under `constraints`. Does not reschedule.
    pub async fn check(
        &self,
        task: &Task,
        constraints: Option<&ExecutionConstraints>,
    ) -> FiringStep<AdmissionDecision> {
        let Some(constraints) = constraints else {
            return Ok(AdmissionDecision::Allowed);
        };

        let mut saturated = Vec::new();
        for constraint in &constraints.groups {
            let limit = self
                .config
                .group_limits
                .get(&constraint.group)
                .copied()
                .or(constraint.limit);
            let Some(limit) = limit else {
                continue;
            };

            let running = self
                .store
                .count_running_in_group(&constraint.group, task.oid)
                .await
                .map_err(|e| {
                    StopFiring::unexpected(
                        format!("couldn't count running tasks in group {}", constraint.group),
                        e,
                    )
                })?;
            tracing::trace!(group = %constraint.group, running, limit, "group admission check");
            if running >= limit as usize {
                saturated.push(SaturatedGroup {
                    group: constraint.group.clone(),
                    running,
                    limit,
                });
            }
        }

        if saturated.is_empty() {
            return Ok(AdmissionDecision::Allowed);
        }

        let retry_after = constraints
            .retry_after_secs
            .unwrap_or(self.config.group_retry_after.as_secs());
        let retry_at = self
            .clock
            .now()
            .checked_add_signed(
                i64::try_from(retry_after)
                    .ok()
                    .and_then(TimeDelta::try_seconds)
                    .unwrap_or(TimeDelta::MAX),
            )
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let (retry_at, regular) = match self.natural_refire_before(task, retry_at).await {
            Some(next) => (next, true),
            None => (retry_at, false),
        };

        Ok(AdmissionDecision::Refused {
            saturated,
            retry_at,
            regular,
        })
    }

    /// Checks admission and, if refused, reschedules and stops the firing.
    pub async fn enforce(
        &self,
        task: &Task,
        constraints: Option<&ExecutionConstraints>,
    ) -> FiringStep {
        let AdmissionDecision::Refused {
            saturated,
            retry_at,
            regular,
        } = self.check(task, constraints).await?
        else {
            return Ok(());
        };

        if !regular {
            self.trigger
                .reschedule_later(task.oid, retry_at)
                .await
                .map_err(|e| {
                    StopFiring::unexpected(
                        format!(
                            "couldn't reschedule task {task} (rescheduled because of execution constraints)"
                        ),
                        e,
                    )
                })?;
        }

        let groups = saturated
            .iter()
            .map(|g| format!("{} ({}/{})", g.group, g.running, g.limit))
            .collect::<Vec<_>>()
            .join(", ");
        Err(StopFiring::info(format!(
            "task {task} not started, group limit reached: {groups}; next attempt at {retry_at}"
        )))
    }

    /// The trigger's next fire time if natural recurrence may be relied upon
    /// and it comes no later than `retry_at`.
    async fn natural_refire_before(
        &self,
        task: &Task,
        retry_at: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if !self.config.regular_backoff || !task.is_loosely_recurring() {
            return None;
        }
        match self.trigger.next_fire_time(task.oid).await {
            Ok(Some(next)) if next <= retry_at => Some(next),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(oid = %task.oid, error = %e, "next fire time unknown, rescheduling explicitly");
                None
            }
        }
    }
}
