//! Generation evaluator: the per-tick control loop.
//!
//! One generation owns one [`PhysicsWorld`] shared by all of its walkers.
//! Every tick runs, in order:
//!
//! 1. sense, decide and actuate every live walker, gated by the limiter flags
//!    left over from the previous tick;
//! 2. a single fixed physics step;
//! 3. per live walker: limiter pass, fitness accrual, termination check and,
//!    if still alive, a reset of all motor rates;
//! 4. the floor resistance schedule.
//!
//! The generation ends when no walker is alive or the tick ceiling is hit.

use serde::Serialize;
use tracing::{debug, warn};

use crate::codec::{decode_outputs, gate_commands};
use crate::config::SimConfig;
use crate::controller::Controller;
use crate::error::{Result, SimError};
use crate::walker::{TerminationReason, Walker, WalkerFrame};
use crate::world::{BodyPose, PhysicsWorld};

/// Stepwise-increasing backward floor speed.
#[derive(Clone, Debug)]
pub struct FloorSchedule {
    level: u32,
    ticks_in_level: u32,
    level_ticks: u32,
    speed_step: f32,
}

impl FloorSchedule {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            level: 1,
            ticks_in_level: 0,
            level_ticks: config.floor_level_ticks.max(1),
            speed_step: config.floor_speed_step,
        }
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn surface_velocity(&self) -> f32 {
        Self::velocity_for_level(self.speed_step, self.level)
    }

    pub fn velocity_for_level(speed_step: f32, level: u32) -> f32 {
        -speed_step * level as f32
    }

    /// Counts one tick; returns true when the level went up.
    pub fn advance(&mut self) -> bool {
        self.ticks_in_level += 1;
        if self.ticks_in_level >= self.level_ticks {
            self.ticks_in_level = 0;
            self.level += 1;
            return true;
        }
        false
    }
}

/// Finish wins over fall, fall over stall.
pub fn termination_check(
    time_alive: u32,
    torso: &BodyPose,
    config: &SimConfig,
) -> Option<TerminationReason> {
    if torso.x > config.finish_x {
        Some(TerminationReason::Finished)
    } else if torso.y < config.fall_height {
        Some(TerminationReason::Fell)
    } else if time_alive > config.stall_ticks
        && (config.stuck_min_x..=config.stuck_max_x).contains(&torso.x)
    {
        Some(TerminationReason::Stalled)
    } else {
        None
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotFrame {
    pub tick: u32,
    pub floor_level: u32,
    pub surface_velocity: f32,
    pub walkers: Vec<WalkerFrame>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkerOutcome {
    pub id: usize,
    pub fitness: f32,
    pub reason: Option<TerminationReason>,
    pub time_alive: u32,
    pub final_x: f32,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    pub ticks: u32,
    pub floor_level: u32,
    pub outcomes: Vec<WalkerOutcome>,
}

impl GenerationReport {
    pub fn best(&self) -> Option<&WalkerOutcome> {
        self.outcomes
            .iter()
            .max_by(|a, b| a.fitness.total_cmp(&b.fitness))
    }

    pub fn mean_fitness(&self) -> f32 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        self.outcomes.iter().map(|o| o.fitness).sum::<f32>() / self.outcomes.len() as f32
    }

    pub fn count(&self, reason: TerminationReason) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.reason == Some(reason))
            .count()
    }
}

/// Receives diagnostics while a generation runs.
pub trait GenerationObserver {
    fn wants_snapshots(&self) -> bool {
        false
    }

    fn on_snapshot(&mut self, _frame: &SnapshotFrame) {}

    fn on_complete(&mut self, _report: &GenerationReport) {}
}

pub struct NoopObserver;

impl GenerationObserver for NoopObserver {}

pub struct Generation<C> {
    config: SimConfig,
    world: PhysicsWorld,
    walkers: Vec<Walker>,
    controllers: Vec<Option<C>>,
    schedule: FloorSchedule,
    ticks: u32,
}

impl<C: Controller> Generation<C> {
    /// Spawns one walker per controller slot. A `None` slot is a controller
    /// that could not be built; its walker starts out done.
    pub fn new(config: SimConfig, controllers: Vec<Option<C>>) -> Result<Self> {
        config.validate()?;
        if controllers.is_empty() {
            return Err(SimError::EmptyPopulation);
        }

        let mut world = PhysicsWorld::new(&config);
        let schedule = FloorSchedule::new(&config);
        world.set_surface_velocity(schedule.surface_velocity());

        let mut walkers = Vec::with_capacity(controllers.len());
        for (id, controller) in controllers.iter().enumerate() {
            let mut walker = Walker::spawn(&mut world, id, &config);
            if controller.is_none() {
                walker.despawn(&mut world, TerminationReason::ControllerFault)?;
            }
            walkers.push(walker);
        }

        Ok(Self {
            config,
            world,
            walkers,
            controllers,
            schedule,
            ticks: 0,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn walkers(&self) -> &[Walker] {
        &self.walkers
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn floor_level(&self) -> u32 {
        self.schedule.level()
    }

    pub fn alive_count(&self) -> usize {
        self.walkers.iter().filter(|w| w.is_alive()).count()
    }

    pub fn is_finished(&self) -> bool {
        self.alive_count() == 0
    }

    /// Runs one full tick and returns the number of walkers still alive.
    pub fn tick(&mut self) -> Result<usize> {
        if self.is_finished() {
            return Ok(0);
        }

        for (walker, controller) in self.walkers.iter_mut().zip(&self.controllers) {
            if !walker.is_alive() {
                continue;
            }
            let Some(controller) = controller else {
                continue;
            };
            let inputs = walker.sense(&self.world)?;
            let output = controller.activate(&inputs);
            match decode_outputs(
                &output,
                self.config.activation_threshold,
                self.config.motor_speed,
            ) {
                Ok(commands) => {
                    let gated = gate_commands(commands, walker.flags());
                    walker.actuate(&mut self.world, &gated, &self.config)?;
                }
                Err(err) => {
                    warn!(walker = walker.id(), "{err}; terminating walker");
                    walker.despawn(&mut self.world, TerminationReason::ControllerFault)?;
                }
            }
        }

        self.world.step();
        self.ticks += 1;

        let mut alive = 0;
        for walker in &mut self.walkers {
            if !walker.is_alive() {
                continue;
            }
            walker.apply_limits(&mut self.world, &self.config)?;
            let torso = walker.torso_pose(&self.world)?;
            walker.accrue(torso.x, &self.config);
            match termination_check(walker.vitals().time_alive, &torso, &self.config) {
                Some(reason) => walker.despawn(&mut self.world, reason)?,
                None => {
                    walker.reset_motors(&mut self.world)?;
                    alive += 1;
                }
            }
        }

        if self.schedule.advance() {
            self.world
                .set_surface_velocity(self.schedule.surface_velocity());
            debug!(
                level = self.schedule.level(),
                surface_velocity = self.world.surface_velocity(),
                "floor speed raised"
            );
        }

        if alive > 0 && self.ticks >= self.config.max_ticks {
            debug!(alive, ticks = self.ticks, "tick ceiling reached");
            for walker in self.walkers.iter_mut().filter(|w| w.is_alive()) {
                walker.despawn(&mut self.world, TerminationReason::TickLimit)?;
            }
            alive = 0;
        }

        Ok(alive)
    }

    pub fn snapshot(&self) -> Result<SnapshotFrame> {
        let mut walkers = Vec::new();
        for walker in self.walkers.iter().filter(|w| w.is_alive()) {
            walkers.push(walker.frame(&self.world)?);
        }
        Ok(SnapshotFrame {
            tick: self.ticks,
            floor_level: self.schedule.level(),
            surface_velocity: self.world.surface_velocity(),
            walkers,
        })
    }

    pub fn report(&self) -> GenerationReport {
        GenerationReport {
            ticks: self.ticks,
            floor_level: self.schedule.level(),
            outcomes: self
                .walkers
                .iter()
                .map(|walker| WalkerOutcome {
                    id: walker.id(),
                    fitness: walker.fitness(),
                    reason: walker.termination_reason(),
                    time_alive: walker.vitals().time_alive,
                    final_x: walker.vitals().distance,
                })
                .collect(),
        }
    }

    /// Ticks until every walker is done.
    pub fn run(&mut self, observer: &mut dyn GenerationObserver) -> Result<GenerationReport> {
        let snapshot_every = self.config.snapshot_every.max(1);
        if observer.wants_snapshots() {
            observer.on_snapshot(&self.snapshot()?);
        }
        while !self.is_finished() {
            let alive = self.tick()?;
            if observer.wants_snapshots() && (self.ticks % snapshot_every == 0 || alive == 0) {
                observer.on_snapshot(&self.snapshot()?);
            }
        }
        let report = self.report();
        observer.on_complete(&report);
        Ok(report)
    }
}
