//! Compilation controller.
//!
//! Drives preprocess → transpile → execute → render for the latest request.
//! Work is cooperative: `poll` advances the in-flight job by one stage, so a
//! host can interleave compilation with its own event loop. Only one job is
//! in flight; a newer request waits in a single queue slot and a finished
//! job whose generation is no longer the newest is discarded.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Instant, SystemTime};
use tracing::{debug, info, warn};

use crate::bindings::{BindingLibrary, BINDING_LIBRARY};
use crate::config::CompilerConfig;
use crate::discovery::{discover, DiscoveredComponent, DiscoveryStep};
use crate::error::{Diagnostic, Stage, StageError};
use crate::executor::{execute, ExecutedUnit};
use crate::fingerprint::StageFingerprints;
use crate::preprocess::{preprocess, PreprocessOutput};
use crate::registry::{ModuleRegistry, RegistrySnapshot};
use crate::render::{first_render, RenderSession};
use crate::transpile::{transpile, Transpiled};

// ═══════════════════════════════════════════════════════════════════════════════
// RESULT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct CompiledComponent {
    /// Binding the component was discovered under.
    pub name: String,
    pub step: DiscoveryStep,
    pub session: RenderSession,
    /// First-render markup.
    pub output: String,
    pub warnings: Vec<Diagnostic>,
    pub fingerprints: StageFingerprints,
    pub timestamp: SystemTime,
}

#[derive(Debug)]
pub enum CompilationResult {
    Idle,
    Compiling,
    Success(Box<CompiledComponent>),
    Error {
        error: StageError,
        timestamp: SystemTime,
    },
}

impl CompilationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CompilationResult::Success(_))
    }

    pub fn component(&self) -> Option<&CompiledComponent> {
        match self {
            CompilationResult::Success(component) => Some(component),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&StageError> {
        match self {
            CompilationResult::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> Option<SystemTime> {
        match self {
            CompilationResult::Success(component) => Some(component.timestamp),
            CompilationResult::Error { timestamp, .. } => Some(*timestamp),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CompilationResult::Idle => "idle",
            CompilationResult::Compiling => "compiling",
            CompilationResult::Success(_) => "success",
            CompilationResult::Error { .. } => "error",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// JOBS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct Request {
    generation: u64,
    source: String,
}

/// Where a job is; each variant carries the outputs of the stages behind it.
enum JobStage {
    Preprocess,
    Transpile {
        pre: PreprocessOutput,
    },
    Execute {
        pre: PreprocessOutput,
        transpiled: Transpiled,
    },
    Render {
        pre: PreprocessOutput,
        transpiled: Transpiled,
        unit: ExecutedUnit,
        found: DiscoveredComponent,
    },
}

impl JobStage {
    fn stage(&self) -> Stage {
        match self {
            JobStage::Preprocess => Stage::Preprocess,
            JobStage::Transpile { .. } => Stage::Transpile,
            JobStage::Execute { .. } => Stage::Execute,
            JobStage::Render { .. } => Stage::Render,
        }
    }
}

struct Job {
    generation: u64,
    source: String,
    snapshot: RegistrySnapshot,
    stage: JobStage,
    started: Instant,
}

enum Step {
    Continue(JobStage),
    Done(CompilationResult),
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTROLLER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct CompilationController {
    registry: Rc<RefCell<ModuleRegistry>>,
    library: &'static BindingLibrary,
    config: CompilerConfig,
    state: CompilationResult,
    job: Option<Job>,
    queued: Option<Request>,
    generation: u64,
    /// Set by the registry observer, cleared when a job snapshots the registry.
    registry_dirty: Rc<Cell<bool>>,
    last_source: Option<String>,
    last_started_at: Option<SystemTime>,
    last_compile_time: Option<SystemTime>,
}

impl std::fmt::Debug for CompilationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilationController")
            .field("state", &self.state.label())
            .field("generation", &self.generation)
            .field("in_flight", &self.job.as_ref().map(|j| j.stage.stage()))
            .field("queued", &self.queued.is_some())
            .finish()
    }
}

impl Default for CompilationController {
    fn default() -> Self {
        Self::new(CompilerConfig::default())
    }
}

impl CompilationController {
    pub fn new(config: CompilerConfig) -> Self {
        Self::with_registry(Rc::new(RefCell::new(ModuleRegistry::new())), config)
    }

    pub fn with_registry(registry: Rc<RefCell<ModuleRegistry>>, config: CompilerConfig) -> Self {
        let registry_dirty = Rc::new(Cell::new(false));
        let flag = registry_dirty.clone();
        registry
            .borrow_mut()
            .subscribe(Box::new(move |_| flag.set(true)));

        Self {
            registry,
            library: &BINDING_LIBRARY,
            config,
            state: CompilationResult::Idle,
            job: None,
            queued: None,
            generation: 0,
            registry_dirty,
            last_source: None,
            last_started_at: None,
            last_compile_time: None,
        }
    }

    pub fn registry(&self) -> Rc<RefCell<ModuleRegistry>> {
        self.registry.clone()
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn current_result(&self) -> &CompilationResult {
        &self.state
    }

    /// The mounted component of the current success, for event dispatch.
    pub fn session_mut(&mut self) -> Option<&mut RenderSession> {
        match &mut self.state {
            CompilationResult::Success(component) => Some(&mut component.session),
            _ => None,
        }
    }

    pub fn is_compiling(&self) -> bool {
        matches!(self.state, CompilationResult::Compiling)
    }

    /// When the last accepted result was produced.
    pub fn last_compile_time(&self) -> Option<SystemTime> {
        self.last_compile_time
    }

    /// When the most recent job took its registry snapshot.
    pub fn last_started_at(&self) -> Option<SystemTime> {
        self.last_started_at
    }

    /// Requests a compilation of `source`. Nothing runs until `poll`.
    pub fn compile(&mut self, source: &str) {
        self.generation += 1;

        if source.trim().is_empty() {
            debug!(generation = self.generation, "empty source, going idle");
            self.queued = None;
            self.last_source = None;
            self.state = CompilationResult::Idle;
            return;
        }

        self.last_source = Some(source.to_string());
        if self.queued.is_some() {
            debug!(generation = self.generation, "replacing queued request");
        }
        self.queued = Some(Request {
            generation: self.generation,
            source: source.to_string(),
        });
        self.state = CompilationResult::Compiling;
    }

    /// Advances compilation by one step. Returns whether work remains.
    pub fn poll(&mut self) -> bool {
        let Some(job) = self.job.take() else {
            return self.start_next();
        };

        let Job {
            generation,
            source,
            snapshot,
            stage,
            started,
        } = job;
        let current = stage.stage();

        match self.run_stage(&source, &snapshot, stage) {
            Step::Continue(next) => {
                debug!(generation, from = %current, to = %next.stage(), "stage complete");
                self.job = Some(Job {
                    generation,
                    source,
                    snapshot,
                    stage: next,
                    started,
                });
                true
            }
            Step::Done(result) => {
                self.finish(generation, result, started);
                self.has_work()
            }
        }
    }

    pub fn run_until_idle(&mut self) {
        while self.poll() {}
    }

    pub fn compile_now(&mut self, source: &str) -> &CompilationResult {
        self.compile(source);
        self.run_until_idle();
        &self.state
    }

    fn has_work(&self) -> bool {
        self.job.is_some() || self.queued.is_some() || self.pending_recompile()
    }

    fn pending_recompile(&self) -> bool {
        self.registry_dirty.get() && self.last_source.is_some()
    }

    fn start_next(&mut self) -> bool {
        if self.queued.is_none() && self.pending_recompile() {
            self.generation += 1;
            info!(generation = self.generation, "registry changed, recompiling");
            self.queued = self.last_source.clone().map(|source| Request {
                generation: self.generation,
                source,
            });
        }

        let Some(request) = self.queued.take() else {
            self.registry_dirty.set(false);
            return false;
        };

        self.registry_dirty.set(false);
        let snapshot = self.registry.borrow().snapshot();
        debug!(
            generation = request.generation,
            revision = snapshot.revision(),
            modules = snapshot.len(),
            "starting compilation"
        );
        self.last_started_at = Some(SystemTime::now());
        self.state = CompilationResult::Compiling;
        self.job = Some(Job {
            generation: request.generation,
            source: request.source,
            snapshot,
            stage: JobStage::Preprocess,
            started: Instant::now(),
        });
        true
    }

    fn finish(&mut self, generation: u64, result: CompilationResult, started: Instant) {
        if generation != self.generation {
            info!(
                generation,
                latest = self.generation,
                "discarding stale compilation result"
            );
            return;
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            CompilationResult::Success(component) => info!(
                component = component.name.as_str(),
                step = %component.step,
                warnings = component.warnings.len(),
                hash = component.fingerprints.short(),
                elapsed_ms,
                "compilation succeeded"
            ),
            CompilationResult::Error { error, .. } => warn!(
                stage = %error.stage,
                elapsed_ms,
                "compilation failed: {}",
                error.message
            ),
            _ => {}
        }

        self.last_compile_time = result.timestamp();
        self.state = result;
    }

    fn run_stage(&self, source: &str, snapshot: &RegistrySnapshot, stage: JobStage) -> Step {
        let config = &self.config;
        let outcome: Result<Step, StageError> = match stage {
            JobStage::Preprocess => preprocess(source, snapshot, config)
                .map(|pre| Step::Continue(JobStage::Transpile { pre }))
                .map_err(StageError::from),

            JobStage::Transpile { pre } => transpile(&pre.code, config)
                .map(|transpiled| Step::Continue(JobStage::Execute { pre, transpiled }))
                .map_err(StageError::from),

            JobStage::Execute { pre, transpiled } => {
                execute(&transpiled.code, self.library, config.sandbox)
                    .and_then(|unit| {
                        let found =
                            discover(&unit.table, pre.entry.as_deref(), self.library, config)?;
                        Ok(Step::Continue(JobStage::Render {
                            pre,
                            transpiled,
                            unit,
                            found,
                        }))
                    })
                    .map_err(StageError::from)
            }

            JobStage::Render {
                pre,
                transpiled,
                unit,
                found,
            } => first_render(found.value, unit.interpreter)
                .map(|session| {
                    let mut warnings = pre.warnings;
                    for diagnostic in session.interpreter().diagnostics() {
                        if !warnings.contains(diagnostic) {
                            warnings.push(diagnostic.clone());
                        }
                    }
                    Step::Done(CompilationResult::Success(Box::new(CompiledComponent {
                        name: found.name,
                        step: found.step,
                        output: session.to_markup(),
                        session,
                        warnings,
                        fingerprints: StageFingerprints::new(source, &pre.code, &transpiled.code),
                        timestamp: SystemTime::now(),
                    })))
                })
                .map_err(StageError::from),
        };

        outcome.unwrap_or_else(|error| {
            Step::Done(CompilationResult::Error {
                error,
                timestamp: SystemTime::now(),
            })
        })
    }
}
