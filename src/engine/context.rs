//! Engine context and frame driver.
//!
//! This module ties the core systems together. An [`Engine`] owns exactly one
//! [`TaskSystem`], [`QuestSystem`], [`ComponentManager`] and [`EntitySystem`];
//! there are no process-wide singletons, so every subsystem reaches the core
//! through the [`UpdateContext`] it is handed.
//!
//! ## Frame Model
//!
//! [`Engine::update`] runs one frame:
//!
//! 1. completed daily quests are re-armed,
//! 2. due entity requests are processed (components indices handed out and
//!    returned),
//! 3. every [`UpdatePhase`] runs in order; within a phase each participating
//!    subsystem is updated in slice order and sees the component manager only
//!    through a [`PhaseComponents`] view that enforces the phase's
//!    permissions.
//!
//! Subsystems are free to fan work out to the task system (directly, via
//! daily quests, or via [`TaskSystem::parallel_for`]) as long as they wait for
//! it before returning from their update.
//!
//! ## Subsystem Trait
//!
//! - [`Subsystem::name`] identifies the subsystem in logs and errors.
//! - [`Subsystem::phases`] lists the phases it takes part in.
//! - [`Subsystem::initialize`] registers kinds, permissions and quests.
//! - [`Subsystem::update`] does the per-phase work.
//!
//! [`FnSubsystem`] wraps a closure for subsystems that need no state of their
//! own.

use std::time::Duration;

use crate::engine::config::EngineConfiguration;
use crate::engine::entity::{EntitySystem, EntityUpdateReport};
use crate::engine::error::EngineResult;
use crate::engine::manager::{ComponentManager, PhaseComponents};
use crate::engine::phase::UpdatePhase;
use crate::engine::quest::QuestSystem;
use crate::engine::task_system::TaskSystem;
use crate::profiling::profiler;


/// Everything a subsystem may use during one phase.
pub struct UpdateContext<'a> {
    /// Frame counter, starting at 0.
    pub frame: u64,
    /// Time elapsed since the previous frame.
    pub delta: Duration,
    /// Phase being run.
    pub phase: UpdatePhase,
    /// Worker pool.
    pub tasks: &'a TaskSystem,
    /// Daily quest registry.
    pub quests: &'a QuestSystem,
    /// Component storage, access-checked against `phase`.
    pub components: PhaseComponents<'a>,
    /// Entity requests may be filed from here.
    pub entities: &'a EntitySystem,
}

/// Setup-time view of the engine handed to [`Subsystem::initialize`].
pub struct SetupContext<'a> {
    /// Worker pool.
    pub tasks: &'a TaskSystem,
    /// Daily quest registry.
    pub quests: &'a QuestSystem,
    /// Component storage, unrestricted.
    pub components: &'a mut ComponentManager,
    /// Entity system.
    pub entities: &'a EntitySystem,
}

/// A game-side system driven by the engine once per participating phase.
pub trait Subsystem {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Phases this subsystem is updated in.
    fn phases(&self) -> &[UpdatePhase];

    /// Called once by [`Engine::initialize_subsystems`].
    fn initialize(&mut self, setup: &mut SetupContext<'_>) -> EngineResult<()> {
        let _ = setup;
        Ok(())
    }

    /// Per-phase work.
    fn update(&mut self, context: &mut UpdateContext<'_>) -> EngineResult<()>;
}

/// Closure-backed [`Subsystem`].
///
/// ```
/// use hearth_engine::{FnSubsystem, UpdatePhase};
///
/// let mut frames = 0;
/// let counter = FnSubsystem::new("frame counter", vec![UpdatePhase::Post], move |context| {
///     frames = context.frame + 1;
///     Ok(())
/// });
/// # let _ = counter;
/// ```
pub struct FnSubsystem<F>
where
    F: FnMut(&mut UpdateContext<'_>) -> EngineResult<()>,
{
    name: &'static str,
    phases: Vec<UpdatePhase>,
    function: F,
}

impl<F> FnSubsystem<F>
where
    F: FnMut(&mut UpdateContext<'_>) -> EngineResult<()>,
{
    /// Creates a subsystem running `function` in each of `phases`.
    pub fn new(name: &'static str, phases: Vec<UpdatePhase>, function: F) -> Self {
        Self {
            name,
            phases,
            function,
        }
    }
}

impl<F> Subsystem for FnSubsystem<F>
where
    F: FnMut(&mut UpdateContext<'_>) -> EngineResult<()>,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn phases(&self) -> &[UpdatePhase] {
        &self.phases
    }

    fn update(&mut self, context: &mut UpdateContext<'_>) -> EngineResult<()> {
        (self.function)(context)
    }
}

/// What one [`Engine::update`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Frame number that ran.
    pub frame: u64,
    /// Entity request processing of this frame.
    pub entities: EntityUpdateReport,
    /// Subsystem updates performed across all phases.
    pub subsystem_updates: usize,
}

/// Owner of the core systems.
pub struct Engine {
    configuration: EngineConfiguration,
    tasks: TaskSystem,
    quests: QuestSystem,
    components: ComponentManager,
    entities: EntitySystem,
    frame: u64,
}

impl Engine {
    /// Validates `configuration` and brings up every core system.
    pub fn initialize(configuration: EngineConfiguration) -> EngineResult<Self> {
        configuration.validate()?;
        let tasks = TaskSystem::with_configuration(&configuration.multithreading)?;
        log::info!("engine initialized with {} task executors", tasks.number_of_task_executors());

        Ok(Self {
            configuration,
            tasks,
            quests: QuestSystem::new(),
            components: ComponentManager::new(),
            entities: EntitySystem::new(),
            frame: 0,
        })
    }

    /// Configuration the engine was started with.
    pub fn configuration(&self) -> &EngineConfiguration {
        &self.configuration
    }

    /// Worker pool.
    pub fn task_system(&self) -> &TaskSystem {
        &self.tasks
    }

    /// Daily quest registry.
    pub fn quests(&self) -> &QuestSystem {
        &self.quests
    }

    /// Component storage.
    pub fn components(&self) -> &ComponentManager {
        &self.components
    }

    /// Mutable component storage, e.g. for registering entity kinds.
    pub fn components_mut(&mut self) -> &mut ComponentManager {
        &mut self.components
    }

    /// Entity system.
    pub fn entities(&self) -> &EntitySystem {
        &self.entities
    }

    /// Number of frames run so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Runs [`Subsystem::initialize`] on each subsystem, in order.
    pub fn initialize_subsystems(&mut self, subsystems: &mut [Box<dyn Subsystem>]) -> EngineResult<()> {
        let mut setup = SetupContext {
            tasks: &self.tasks,
            quests: &self.quests,
            components: &mut self.components,
            entities: &self.entities,
        };
        for subsystem in subsystems.iter_mut() {
            log::debug!("initializing subsystem `{}`", subsystem.name());
            subsystem.initialize(&mut setup)?;
        }
        Ok(())
    }

    /// Runs one frame.
    ///
    /// A failing subsystem aborts the frame and the frame counter is not
    /// advanced.
    pub fn update(&mut self, subsystems: &mut [Box<dyn Subsystem>], delta: Duration) -> EngineResult<FrameReport> {
        let _frame_span = profiler::span("frame");

        self.quests.pre_update();
        let entity_report = self.entities.pre_update(&mut self.components);

        let mut subsystem_updates = 0;
        for phase in UpdatePhase::ALL {
            let _phase_span = profiler::span(phase_name(phase));

            let mut context = UpdateContext {
                frame: self.frame,
                delta,
                phase,
                tasks: &self.tasks,
                quests: &self.quests,
                components: self.components.enter_phase(phase),
                entities: &self.entities,
            };

            for subsystem in subsystems.iter_mut() {
                if !subsystem.phases().contains(&phase) {
                    continue;
                }
                if let Err(error) = subsystem.update(&mut context) {
                    log::error!("subsystem `{}` failed in {phase:?}: {error}", subsystem.name());
                    return Err(error);
                }
                subsystem_updates += 1;
            }
        }

        let report = FrameReport {
            frame: self.frame,
            entities: entity_report,
            subsystem_updates,
        };
        self.frame += 1;
        Ok(report)
    }

    /// Destroys every entity, then stops the task system.
    pub fn release(mut self) -> EngineResult<()> {
        self.entities.release(&mut self.components);
        self.tasks.release();
        self.components.validate()?;
        log::info!("engine released after {} frames", self.frame);
        Ok(())
    }
}

fn phase_name(phase: UpdatePhase) -> &'static str {
    match phase {
        UpdatePhase::Pre => "phase: pre",
        UpdatePhase::Input => "phase: input",
        UpdatePhase::Logic => "phase: logic",
        UpdatePhase::Physics => "phase: physics",
        UpdatePhase::Render => "phase: render",
        UpdatePhase::Post => "phase: post",
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("frame", &self.frame)
            .field("tasks", &self.tasks)
            .field("quests", &self.quests)
            .field("entities", &self.entities)
            .finish_non_exhaustive()
    }
}
