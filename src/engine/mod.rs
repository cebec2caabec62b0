//! Exerciser driver
//!
//! The [`Exerciser`] owns one device, one position generator, one operation
//! selector and the per-run [`ExerciserState`]. It draws a range, runs the
//! selected operations over it through the executors, and repeats until the
//! iteration budget is reached or an operation diverges.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --run()--> Running --budget reached--> Completed
//!                    |
//!                    +------divergence------> Failed
//! ```
//!
//! Everything that can be rejected without touching the device (alignment,
//! zone layout, operations the device cannot perform) is rejected by
//! [`Exerciser::new`]. A run that starts either completes or stops at the
//! first divergence; nothing is retried.
//!
//! # Example
//!
//! ```no_run
//! use blkx::config::{Config, Profile};
//! use blkx::device::open_device;
//! use blkx::engine::Exerciser;
//!
//! let config = Config::for_profile("/tmp/blkx.dat".into(), Profile::File);
//! let device = open_device(&config.target.path, config.target.direct).unwrap();
//! let mut exerciser = Exerciser::from_config(&config, device).unwrap();
//! let report = exerciser.run().unwrap();
//! assert!(report.passed());
//! ```

pub mod report;
pub mod selector;
pub mod state;

pub use report::{RunOutcome, RunReport};
pub use selector::OperationSelector;
pub use state::{ExerciserState, OpCounters};

use crate::config::{Config, ExerciserConfig, PositionMode};
use crate::device::Device;
use crate::error::{Divergence, ExerciserError, InvariantViolation, OpKind};
use crate::executor::{self, Outcome};
use crate::position::random::RandomPositions;
use crate::position::windowed::WindowedPositions;
use crate::position::{align_up, ByteRange, GeneratorBounds, PositionGenerator, Zone};
use crate::shadow::Coverage;
use crate::zone::{self, ZoneError, ZonePlan};
use chrono::Utc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Consecutive non-progressing operations tolerated before the run is
/// declared stalled
pub const MAX_CONSECUTIVE_SKIPS: u64 = 10_000;

/// Where an exerciser is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// One exerciser instance bound to one device and one zone
pub struct Exerciser {
    config: ExerciserConfig,
    device: Box<dyn Device>,
    generator: Box<dyn PositionGenerator>,
    selector: OperationSelector,
    state: ExerciserState,
    run_state: RunState,
    seed: u64,
    partition: Option<ZonePlan>,
    failure: Option<Divergence>,
    iterations: u64,
    final_verify_bytes: u64,
}

impl Exerciser {
    /// Build an exerciser working on `zone` of `device`
    ///
    /// The alignment unit is the larger of the device block size and
    /// `config.alignment`. The zone bounds and `max_op_size` must be
    /// multiples of it.
    pub fn new(
        config: &ExerciserConfig,
        zone: Zone,
        device: Box<dyn Device>,
    ) -> Result<Self, ExerciserError> {
        let kind = device.kind();
        let unit = device.block_size().max(config.alignment);
        if !unit.is_power_of_two() {
            return Err(ExerciserError::Config(format!(
                "alignment unit {} is not a power of two",
                unit
            )));
        }
        if config.max_op_size == 0 || config.max_op_size % unit != 0 {
            return Err(ExerciserError::Config(format!(
                "max_op_size {} is not a multiple of the alignment unit {}",
                config.max_op_size, unit
            )));
        }
        if zone.is_empty() {
            return Err(ZoneError::Empty { zone }.into());
        }
        zone::check_alignment(zone, unit)?;

        if config.operations.is_empty() {
            return Err(ExerciserError::Config(
                "operation selection can never pick an operation".to_string(),
            ));
        }

        if config.operations.includes(OpKind::Truncate) && !kind.is_resizable() {
            return Err(ExerciserError::Config(format!(
                "truncate is not supported on a {}",
                kind
            )));
        }
        if !kind.is_resizable() {
            let device_size = device.size().map_err(ExerciserError::Setup)?;
            if zone.upper > device_size {
                return Err(ZoneError::PastDeviceEnd { zone, device_size }.into());
            }
        }

        let seed = config.seed.unwrap_or_else(rand::random);
        let bounds = GeneratorBounds {
            zone,
            unit,
            max_op_size: config.max_op_size,
        };
        let generator: Box<dyn PositionGenerator> = match config.positions {
            PositionMode::Random { bias_percent } => Box::new(RandomPositions::with_seed(
                bounds,
                bias_percent,
                seed.wrapping_add(1),
            )),
            PositionMode::Windowed { stride } => Box::new(WindowedPositions::new(bounds, stride)),
        };
        let selector = OperationSelector::new(config.operations.clone(), seed.wrapping_add(2));

        let coverage = if kind.is_resizable() {
            Coverage::Full
        } else {
            Coverage::Written
        };
        let state = ExerciserState::new(config, zone, unit, coverage, seed)
            .map_err(ExerciserError::Setup)?;

        Ok(Self {
            config: config.clone(),
            device,
            generator,
            selector,
            state,
            run_state: RunState::Idle,
            seed,
            partition: None,
            failure: None,
            iterations: 0,
            final_verify_bytes: 0,
        })
    }

    /// Plan the zone from `config` and the opened device, then build
    ///
    /// Regular files are resizable, so their current length does not bound
    /// the plan.
    pub fn from_config(config: &Config, device: Box<dyn Device>) -> Result<Self, ExerciserError> {
        let device_size = if device.kind().is_resizable() {
            u64::MAX
        } else {
            device.size().map_err(ExerciserError::Setup)?
        };
        let plan = zone::plan_instance(config, device_size)?;

        let mut exerciser = Self::new(&config.exerciser, plan.zone, device)?;
        exerciser.partition = plan.partition;
        Ok(exerciser)
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn zone(&self) -> Zone {
        self.state.zone
    }

    /// Alignment unit of every generated range
    pub fn unit(&self) -> u64 {
        self.state.unit
    }

    pub fn partition(&self) -> Option<&ZonePlan> {
        self.partition.as_ref()
    }

    pub fn state(&self) -> &ExerciserState {
        &self.state
    }

    /// Divergence that failed the run, if any
    pub fn failure(&self) -> Option<&Divergence> {
        self.failure.as_ref()
    }

    /// Operations that made progress so far
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Run until the budget is reached or an operation diverges
    ///
    /// A divergence is not an `Err`: it ends the run and is carried by the
    /// returned report. `Err` means the exerciser could not run at all.
    pub fn run(&mut self) -> Result<RunReport, ExerciserError> {
        if self.run_state != RunState::Idle {
            return Err(ExerciserError::AlreadyFinished);
        }
        self.run_state = RunState::Running;

        let started_at = Utc::now();
        let start = Instant::now();
        info!(
            profile = %self.config.profile,
            device = %self.device.kind(),
            zone = %self.state.zone,
            unit = self.state.unit,
            seed = self.seed,
            iterations = self.config.iterations,
            "starting run"
        );

        let result = self
            .prepare()
            .and_then(|()| self.exercise())
            .and_then(|()| self.final_verify());

        match result {
            Ok(()) => {
                self.run_state = RunState::Completed;
                info!(
                    iterations = self.iterations,
                    logical_size = self.state.shadow.current_logical_size(),
                    elapsed_secs = start.elapsed().as_secs_f64(),
                    "run completed"
                );
            }
            Err(divergence) => {
                self.run_state = RunState::Failed;
                error!(
                    kind = divergence.kind(),
                    iterations = self.iterations,
                    "run failed: {}",
                    divergence
                );
                self.failure = Some(divergence);
            }
        }

        Ok(self.report(started_at, start))
    }

    /// Reset a resizable target to an empty logical region
    fn prepare(&mut self) -> Result<(), Divergence> {
        if !self.device.kind().is_resizable() {
            return Ok(());
        }
        let lower = self.state.zone.lower;
        debug!(size = lower, "resetting target");
        self.device.set_len(lower).map_err(|error| Divergence::Io {
            op: OpKind::Truncate,
            offset: lower,
            len: 0,
            error,
        })
    }

    fn exercise(&mut self) -> Result<(), Divergence> {
        let budget = self.config.iterations;
        let mut consecutive_skips = 0u64;

        while self.iterations < budget {
            let range = self
                .generator
                .next_range(self.state.shadow.current_logical_size());

            for &op in self.selector.next_ops() {
                if self.iterations >= budget {
                    break;
                }
                match executor::execute(op, range, &mut self.state, self.device.as_ref()) {
                    Outcome::Progressed => {
                        self.iterations += 1;
                        consecutive_skips = 0;
                    }
                    Outcome::Skipped => {
                        self.state.counters.skipped += 1;
                        consecutive_skips += 1;
                        if consecutive_skips >= MAX_CONSECUTIVE_SKIPS {
                            return Err(InvariantViolation::Stalled {
                                skipped: consecutive_skips,
                            }
                            .into());
                        }
                    }
                    Outcome::Diverged(divergence) => return Err(divergence),
                }
            }
        }
        Ok(())
    }

    /// Re-read the whole logical region against the shadow model
    fn final_verify(&mut self) -> Result<(), Divergence> {
        if !self.config.final_verify || !self.state.shadow.tracks_content() {
            return Ok(());
        }
        let lower = self.state.zone.lower;
        let end = align_up(self.state.shadow.logical_end(), self.state.unit).min(self.state.zone.upper);
        if end <= lower {
            return Ok(());
        }

        info!(from = lower, to = end, "final verification");
        let mut offset = lower;
        while offset < end {
            let size = self.state.max_op_size.min(end - offset);
            let range = ByteRange::new(offset, size);
            match executor::verify(range, &mut self.state, self.device.as_ref()) {
                Outcome::Progressed => self.final_verify_bytes += size,
                Outcome::Skipped => {}
                Outcome::Diverged(divergence) => return Err(divergence),
            }
            offset += size;
        }
        Ok(())
    }

    fn report(&self, started_at: chrono::DateTime<Utc>, start: Instant) -> RunReport {
        let outcome = if self.run_state == RunState::Completed {
            RunOutcome::Completed
        } else {
            RunOutcome::Failed
        };
        RunReport {
            outcome,
            profile: self.config.profile,
            device_kind: self.device.kind(),
            started_at,
            elapsed: start.elapsed(),
            seed: self.seed,
            iterations: self.iterations,
            budget: self.config.iterations,
            counters: self.state.counters,
            logical_size: self.state.shadow.current_logical_size(),
            logical_end: self.state.shadow.logical_end(),
            alignment: self.state.unit,
            zone: self.state.zone,
            partition: self.partition,
            final_verify_bytes: self.final_verify_bytes,
            divergence: self.failure.as_ref().map(Divergence::to_report),
        }
    }
}
