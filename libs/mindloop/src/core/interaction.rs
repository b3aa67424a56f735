// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Agent/environment interaction loop
//!
//! One tick: observe the environment, let the agent step, apply the action.
//! [`FixedIntervalInteraction`] paces ticks on virtual time with drift
//! correction: the schedule advances by exactly the interval, a late tick
//! runs immediately, and when more than one whole interval has been missed
//! the schedule skips forward to the next aligned boundary instead of
//! burning a catch-up burst.

use super::error::{LoopError, Result};
use super::lifecycle::{PauseGate, SleepOutcome};

/// User-implemented environment. `on_paused`/`on_resumed` let external
/// resources (sockets, devices) quiesce across a pause.
pub trait Environment: Send + 'static {
    type Obs;
    type Action;

    fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    fn observe(&mut self) -> Result<Self::Obs>;

    fn affect(&mut self, action: Self::Action) -> Result<()>;

    fn teardown(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_paused(&mut self) {}

    fn on_resumed(&mut self) {}
}

/// User-implemented agent. `step` typically reads inference model views and
/// writes experience into collectors.
pub trait Agent: Send + 'static {
    type Obs;
    type Action;

    fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    fn step(&mut self, obs: Self::Obs) -> Result<Self::Action>;

    fn teardown(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_paused(&mut self) {}

    fn on_resumed(&mut self) {}
}

/// Couples an environment with an agent.
pub struct Interaction<E, A>
where
    E: Environment,
    A: Agent<Obs = E::Obs, Action = E::Action>,
{
    environment: E,
    agent: A,
}

impl<E, A> Interaction<E, A>
where
    E: Environment,
    A: Agent<Obs = E::Obs, Action = E::Action>,
{
    pub fn new(environment: E, agent: A) -> Self {
        Self { environment, agent }
    }

    pub fn setup(&mut self) -> Result<()> {
        self.environment.setup()?;
        self.agent.setup()
    }

    /// observe -> step -> affect.
    pub fn step(&mut self) -> Result<()> {
        let obs = self.environment.observe()?;
        let action = self.agent.step(obs)?;
        self.environment.affect(action)
    }

    /// Reverse of setup order: the agent goes first, the environment last.
    pub fn teardown(&mut self) -> Result<()> {
        let agent_result = self.agent.teardown();
        self.environment.teardown()?;
        agent_result
    }

    pub fn on_paused(&mut self) {
        self.environment.on_paused();
        self.agent.on_paused();
    }

    pub fn on_resumed(&mut self) {
        self.environment.on_resumed();
        self.agent.on_resumed();
    }
}

/// Object-safe driver interface the interaction thread runs against.
/// [`FixedIntervalInteraction`] is the standard implementation.
pub trait InteractionDriver: Send + 'static {
    fn setup(&mut self) -> Result<()>;

    /// Run one cycle: wait for the schedule, then step once. Implementations
    /// must return promptly with `Ok` when a pause interrupts the wait so
    /// the harness can run the pause hooks.
    fn tick(&mut self, gate: &PauseGate) -> Result<()>;

    fn teardown(&mut self) -> Result<()>;

    fn on_paused(&mut self);

    fn on_resumed(&mut self);
}

/// Paces an [`Interaction`] at a fixed virtual-time interval.
pub struct FixedIntervalInteraction<E, A>
where
    E: Environment,
    A: Agent<Obs = E::Obs, Action = E::Action>,
{
    interaction: Interaction<E, A>,
    interval: f64,
    next_fire: Option<f64>,
}

impl<E, A> FixedIntervalInteraction<E, A>
where
    E: Environment,
    A: Agent<Obs = E::Obs, Action = E::Action>,
{
    pub fn new(environment: E, agent: A, interval_secs: f64) -> Result<Self> {
        if !interval_secs.is_finite() || interval_secs <= 0.0 {
            return Err(LoopError::Configuration(format!(
                "interaction interval must be positive, got {}",
                interval_secs
            )));
        }
        Ok(Self {
            interaction: Interaction::new(environment, agent),
            interval: interval_secs,
            next_fire: None,
        })
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Advance the schedule after a tick that ran at virtual time `now`.
    /// Returns the updated `next_fire`.
    fn advance_schedule(&mut self, fired_at: f64, now: f64) -> f64 {
        let mut next = fired_at + self.interval;
        if now > next {
            let behind = now - next;
            let skipped = (behind / self.interval).floor();
            if skipped >= 1.0 {
                // More than one interval behind: realign instead of
                // catching up tick by tick.
                next += skipped * self.interval;
            }
            tracing::warn!(
                "interaction overran its {:.1}ms interval by {:.1}ms",
                self.interval * 1e3,
                behind * 1e3
            );
        }
        self.next_fire = Some(next);
        next
    }
}

impl<E, A> InteractionDriver for FixedIntervalInteraction<E, A>
where
    E: Environment,
    A: Agent<Obs = E::Obs, Action = E::Action>,
{
    fn setup(&mut self) -> Result<()> {
        self.next_fire = None;
        self.interaction.setup()
    }

    fn tick(&mut self, gate: &PauseGate) -> Result<()> {
        let scheduled = *self
            .next_fire
            .get_or_insert_with(|| gate.clock().now());
        if gate.clock().now() < scheduled {
            match gate.sleep_until(scheduled)? {
                SleepOutcome::Completed => {}
                // Let the harness run the pause hooks; the schedule is in
                // virtual time and does not drift across the pause.
                SleepOutcome::Paused => return Ok(()),
            }
        }
        self.interaction.step()?;
        let now = gate.clock().now();
        self.advance_schedule(scheduled, now);
        Ok(())
    }

    fn teardown(&mut self) -> Result<()> {
        self.interaction.teardown()
    }

    fn on_paused(&mut self) {
        self.interaction.on_paused();
    }

    fn on_resumed(&mut self) {
        self.interaction.on_resumed();
    }
}
