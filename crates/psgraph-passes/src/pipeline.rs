//! Ordered execution of passes over one program pair.

use std::sync::Arc;
use std::time::{Duration, Instant};

use psgraph_core::Program;
use tracing::{debug, info};

use crate::context::PassContext;
use crate::error::{PassError, Result};
use crate::pass::Pass;
use crate::registry::PassRegistry;

/// Timing for one applied pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassRun {
    pub name: &'static str,
    pub elapsed: Duration,
}

/// A sequence of passes applied in order to the same programs and context.
///
/// Passes run strictly sequentially. A failing pass stops the run and may
/// leave the programs partially rewritten; nothing is rolled back.
#[derive(Debug, Default, Clone)]
pub struct PassPipeline {
    passes: Vec<Arc<dyn Pass>>,
}

impl PassPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves each name through `registry`, preserving order.
    pub fn from_names<S: AsRef<str>>(registry: &PassRegistry, names: &[S]) -> Result<Self> {
        let passes = names
            .iter()
            .map(|name| registry.create(name.as_ref()).map(Arc::<dyn Pass>::from))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { passes })
    }

    /// Appends a pass to the end of the pipeline.
    pub fn with_pass(mut self, pass: impl Pass + 'static) -> Self {
        self.passes.push(Arc::new(pass));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Checks every pass before anything is rewritten.
    ///
    /// Fails on the first pass whose self check fails, whose required
    /// context attributes are absent, or which conflicts with another
    /// selected pass.
    pub fn validate(&self, ctx: &PassContext) -> Result<()> {
        for pass in &self.passes {
            if !pass.check_self() {
                return Err(PassError::CheckSelfFailed {
                    name: pass.name().to_string(),
                });
            }
            if let Some(key) = pass.required_attrs().iter().find(|key| !ctx.has(**key)) {
                return Err(PassError::missing(key.as_str()));
            }
        }

        for (i, pass) in self.passes.iter().enumerate() {
            for (j, other) in self.passes.iter().enumerate() {
                if i != j && !pass.check_conflict(other.as_ref()) {
                    return Err(conflict(pass.as_ref(), other.as_ref()));
                }
            }
        }
        Ok(())
    }

    /// Validates, then applies each pass in order.
    ///
    /// Each pass is also checked against the passes `ctx` has already seen
    /// applied, including those from earlier runs with the same context.
    pub fn run(
        &self,
        main_program: &mut Program,
        startup_program: &mut Program,
        ctx: &mut PassContext,
    ) -> Result<Vec<PassRun>> {
        self.validate(ctx)?;
        info!(passes = ?self.names(), "running pass pipeline");

        let mut runs = Vec::with_capacity(self.passes.len());
        for pass in &self.passes {
            if let Some(other) = ctx
                .applied()
                .iter()
                .find(|applied| !pass.check_conflict(applied.as_ref()))
            {
                return Err(conflict(pass.as_ref(), other.as_ref()));
            }

            let start = Instant::now();
            pass.apply(main_program, startup_program, ctx)?;
            let elapsed = start.elapsed();
            ctx.record_applied(Arc::clone(pass));

            debug!(pass = pass.name(), elapsed_us = elapsed.as_micros() as u64, "applied pass");
            runs.push(PassRun {
                name: pass.name(),
                elapsed,
            });
        }

        info!(
            applied = runs.len(),
            main_ops = main_program.op_count(),
            startup_ops = startup_program.op_count(),
            tensor_tables = ctx.tensor_table().len(),
            "pass pipeline finished"
        );
        Ok(runs)
    }
}

fn conflict(pass: &dyn Pass, other: &dyn Pass) -> PassError {
    PassError::Conflict {
        pass: pass.name().to_string(),
        other: other.name().to_string(),
    }
}
