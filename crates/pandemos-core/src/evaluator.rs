//! Action evaluation: validate, score, and apply player interventions.
//!
//! Evaluation happens between ticks against live region state, under the
//! target region's write lock, so each accepted action applies exactly
//! once. Outcomes are deterministic: the luck term derives from
//! `(tick_id, region_id, player_id, ref_id)` and nothing else, so any
//! recorded action replays bit-for-bit from the audit log.
//!
//! Idempotency is two-layered. Completed `ref_id`s replay their stored
//! receipt from the audit log; in-flight duplicates park on a
//! [`Notify`] until the first submission finishes, then replay.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{info, warn};

use pandemos_model::registry::CompoundRegistry;
use pandemos_model::seed::{outcome_seed, unit_fraction};
use pandemos_types::{
    ActionOutcome, ActionReceipt, ActionRecord, ActionRequest, CooldownState, MAX_INFECTION_BPS,
    MIX_TOTAL_BPS, Mix, PlayerId, RegionState,
};

use crate::audit::AuditLog;
use crate::config::ActionConfig;
use crate::error::{ActionError, ValidationError};
use crate::store::RegionStateStore;

/// Evaluates intervention submissions against live region state.
#[derive(Debug)]
pub struct ActionEvaluator {
    store: Arc<RegionStateStore>,
    audit: Arc<AuditLog>,
    registry: Arc<CompoundRegistry>,
    config: ActionConfig,
    cooldowns: RwLock<BTreeMap<PlayerId, CooldownState>>,
    pending: Mutex<BTreeSet<String>>,
    pending_done: Notify,
}

impl ActionEvaluator {
    /// Create an evaluator over the shared store, audit log, and registry.
    pub fn new(
        store: Arc<RegionStateStore>,
        audit: Arc<AuditLog>,
        registry: Arc<CompoundRegistry>,
        config: ActionConfig,
    ) -> Self {
        Self {
            store,
            audit,
            registry,
            config,
            cooldowns: RwLock::new(BTreeMap::new()),
            pending: Mutex::new(BTreeSet::new()),
            pending_done: Notify::new(),
        }
    }

    /// Submit one intervention for evaluation.
    ///
    /// A `ref_id` already recorded in the audit log replays its stored
    /// receipt without re-evaluation; a `ref_id` currently in flight
    /// waits for the first submission to finish, then replays.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Validation`] for malformed or illegal
    /// requests and [`ActionError::Cooldown`] for rate-limited players.
    /// Neither mutates any state.
    pub async fn submit(&self, request: ActionRequest) -> Result<ActionReceipt, ActionError> {
        loop {
            if let Some(stored) = self.audit.find_action(&request.ref_id).await {
                return Ok(ActionReceipt::from_record(&stored));
            }
            let wait = {
                let mut pending = self.pending.lock().await;
                if pending.insert(request.ref_id.clone()) {
                    break;
                }
                // Arm the waiter while still holding the set's lock so the
                // finisher's notify_waiters cannot slip between check and
                // await.
                self.pending_done.notified()
            };
            wait.await;
        }

        let result = self.evaluate_new(&request).await;

        let mut pending = self.pending.lock().await;
        pending.remove(&request.ref_id);
        drop(pending);
        self.pending_done.notify_waiters();

        result
    }

    /// Validate, charge cooldown, score, apply, and record one action.
    async fn evaluate_new(&self, request: &ActionRequest) -> Result<ActionReceipt, ActionError> {
        self.validate(request)?;

        let tick_applied = self.audit.last_tick_id().await.saturating_add(1);
        self.check_region_cap(request, tick_applied).await?;

        let now = Utc::now();
        self.charge_cooldown(request.player_id, now).await?;

        let seed = outcome_seed(
            tick_applied,
            &request.region_id,
            request.player_id,
            &request.ref_id,
        );
        let luck = (unit_fraction(seed) - Decimal::new(5, 1)) * self.config.luck_weight;

        let Some((outcome, delta_applied, new_infection_level)) = self
            .store
            .with_region_mut(&request.region_id, |state| {
                self.score_and_apply(request, state, luck, now)
            })
            .await
        else {
            // Region existence was validated above; a miss here means the
            // topology changed underneath us, which it never does.
            return Err(ValidationError::UnknownRegion(request.region_id.clone()).into());
        };

        let proof = self.audit.action_proof(
            &request.ref_id,
            tick_applied,
            outcome,
            delta_applied,
            new_infection_level,
        );
        let record = ActionRecord {
            ref_id: request.ref_id.clone(),
            player_id: request.player_id,
            region_id: request.region_id.clone(),
            mix: request.mix.clone(),
            submitted_at: now,
            tick_applied,
            outcome,
            delta_applied,
            new_infection_level,
            proof,
        };

        if let Err(err) = self.audit.append_action(record.clone()).await {
            // The pending set makes a duplicate append unreachable; if the
            // log still refused, prefer whatever it holds.
            warn!(ref_id = %record.ref_id, error = %err, "audit rejected action append");
            if let Some(stored) = self.audit.find_action(&record.ref_id).await {
                return Ok(ActionReceipt::from_record(&stored));
            }
        }

        info!(
            ref_id = %record.ref_id,
            region_id = %record.region_id,
            outcome = ?outcome,
            delta_applied,
            new_infection_level,
            "action applied"
        );
        Ok(ActionReceipt::from_record(&record))
    }

    /// Structural validation. Rejected requests mutate nothing.
    fn validate(&self, request: &ActionRequest) -> Result<(), ValidationError> {
        if !self.store.contains(&request.region_id) {
            return Err(ValidationError::UnknownRegion(request.region_id.clone()));
        }
        let components = &request.mix.components;
        if components.is_empty() {
            return Err(ValidationError::EmptyMix);
        }
        if components.len() > self.config.max_components {
            return Err(ValidationError::TooManyComponents {
                count: components.len(),
                max: self.config.max_components,
            });
        }
        for component in components {
            if !self.registry.contains(&component.compound_id) {
                return Err(ValidationError::UnknownCompound(
                    component.compound_id.clone(),
                ));
            }
        }
        let total_bps = request.mix.total_share_bps();
        if total_bps.abs_diff(MIX_TOTAL_BPS) > self.config.mix_tolerance_bps {
            return Err(ValidationError::BadMixTotal {
                total_bps,
                expected_bps: MIX_TOTAL_BPS,
                tolerance_bps: self.config.mix_tolerance_bps,
            });
        }
        Ok(())
    }

    /// Enforce the per-region per-tick submission cap, if enabled.
    async fn check_region_cap(
        &self,
        request: &ActionRequest,
        tick_applied: u64,
    ) -> Result<(), ActionError> {
        if self.config.region_tick_cap == 0 {
            return Ok(());
        }
        let used = self
            .audit
            .region_actions_at(tick_applied, &request.region_id)
            .await;
        if used >= self.config.region_tick_cap {
            return Err(ValidationError::RegionCapReached {
                region_id: request.region_id.clone(),
                tick_id: tick_applied,
            }
            .into());
        }
        Ok(())
    }

    /// Check and charge the player's cooldown in one write-locked pass.
    async fn charge_cooldown(
        &self,
        player_id: PlayerId,
        now: DateTime<Utc>,
    ) -> Result<(), ActionError> {
        let mut cooldowns = self.cooldowns.write().await;
        if let Some(state) = cooldowns.get(&player_id)
            && state.next_allowed_at > now
        {
            return Err(ActionError::Cooldown {
                retry_at: state.next_allowed_at,
            });
        }
        let window_count = cooldowns.get(&player_id).map_or(0, |s| s.window_count);
        let cooldown = chrono::Duration::milliseconds(
            i64::try_from(self.config.cooldown_ms).unwrap_or(i64::MAX),
        );
        cooldowns.insert(
            player_id,
            CooldownState {
                player_id,
                next_allowed_at: now.checked_add_signed(cooldown).unwrap_or(now),
                window_count: window_count.saturating_add(1),
            },
        );
        Ok(())
    }

    /// Score the mix against the region and apply the bounded delta.
    ///
    /// Runs under the region's write lock. Returns the outcome, the delta
    /// actually applied after clamping, and the resulting level.
    fn score_and_apply(
        &self,
        request: &ActionRequest,
        state: &mut RegionState,
        luck: Decimal,
        now: DateTime<Utc>,
    ) -> (ActionOutcome, i32, u16) {
        let score = self.mix_score(&request.mix, state) + luck;

        let (outcome, desired_delta) = if score > self.config.success_threshold {
            let clamped = score.clamp(Decimal::ZERO, Decimal::ONE);
            let min = Decimal::from(self.config.min_success_delta_bps);
            let span = Decimal::from(
                self.config
                    .max_success_delta_bps
                    .saturating_sub(self.config.min_success_delta_bps),
            );
            let magnitude = (min + span * clamped).round().to_i32().unwrap_or(0);
            (ActionOutcome::Success, magnitude.saturating_neg())
        } else {
            (ActionOutcome::Fail, i32::from(self.config.fail_delta_bps))
        };

        let before = i32::from(state.infection_level);
        let after = before
            .saturating_add(desired_delta)
            .clamp(0, i32::from(MAX_INFECTION_BPS));
        state.infection_level = u16::try_from(after).unwrap_or(MAX_INFECTION_BPS);
        state.updated_at = now;

        if outcome == ActionOutcome::Fail {
            self.raise_resistance(&request.mix, state);
        }

        (outcome, after.saturating_sub(before), state.infection_level)
    }

    /// Weighted effectiveness of the mix against the region's current
    /// resistance vector, minus the overmix penalty for every component
    /// beyond the optimal count.
    fn mix_score(&self, mix: &Mix, state: &RegionState) -> Decimal {
        let total = Decimal::from(MIX_TOTAL_BPS);
        let base: Decimal = mix
            .components
            .iter()
            .filter_map(|component| {
                let compound = self.registry.get(&component.compound_id)?;
                let share = Decimal::from(component.share_bps)
                    .checked_div(total)
                    .unwrap_or(Decimal::ZERO);
                let effect: Decimal = compound
                    .tags
                    .iter()
                    .map(|(tag, weight)| {
                        let resistance =
                            state.resistance.get(tag).copied().unwrap_or(Decimal::ZERO);
                        *weight * (Decimal::ONE - resistance)
                    })
                    .sum();
                Some(share * compound.base_power * effect)
            })
            .sum();

        let excess = mix
            .components
            .len()
            .saturating_sub(self.config.optimal_components);
        base - self.config.overmix_penalty * Decimal::from(excess)
    }

    /// On a fail outcome every targeted tag gains resistance, capped at 1.
    fn raise_resistance(&self, mix: &Mix, state: &mut RegionState) {
        let gain = self.config.fail_resistance_gain;
        for component in &mix.components {
            let Some(compound) = self.registry.get(&component.compound_id) else {
                continue;
            };
            for (tag, weight) in &compound.tags {
                if *weight <= Decimal::ZERO {
                    continue;
                }
                let entry = state
                    .resistance
                    .entry(tag.clone())
                    .or_insert(Decimal::ZERO);
                *entry = (*entry + gain).min(Decimal::ONE);
            }
        }
    }
}
