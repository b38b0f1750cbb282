//! Shared state threaded through one pipeline run.
//!
//! Every pass in a run sees the same [`PassContext`]: keys written by an
//! earlier pass are visible to, and may be overwritten by, later ones. The
//! context is single-owner; run pipelines concurrently with separate contexts.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use psgraph_core::{AttrMap, AttrValue, Program, RoleMaker};
use serde::{Deserialize, Serialize};

use crate::error::{PassError, Result};
use crate::pass::Pass;

/// Feed-variable key of the learning-rate decay counter table.
pub const LR_DECAY_COUNTER: &str = "@LR_DECAY_COUNTER@";
/// Runtime class polling the global-step tensor table.
pub const GLOBAL_STEP_TABLE_CLASS: &str = "GlobalStepTable";

/// Parameter-server training mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PsMode {
    Sync,
    #[default]
    Async,
    HalfAsync,
    Geo,
}

impl PsMode {
    /// Integer code written into the `distributed_mode` attribute.
    pub fn code(self) -> i64 {
        match self {
            PsMode::Sync => 0,
            PsMode::Async => 1,
            PsMode::HalfAsync => 2,
            PsMode::Geo => 3,
        }
    }
}

impl fmt::Display for PsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PsMode::Sync => "sync",
            PsMode::Async => "async",
            PsMode::HalfAsync => "half_async",
            PsMode::Geo => "geo",
        };
        f.write_str(s)
    }
}

/// Named, well-known context attributes a pass may require up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKey {
    OriginMainProgram,
    OriginStartupProgram,
    RoleMaker,
    PsMode,
    LrDecaySteps,
}

impl ContextKey {
    pub fn as_str(self) -> &'static str {
        match self {
            ContextKey::OriginMainProgram => "origin_main_program",
            ContextKey::OriginStartupProgram => "origin_startup_program",
            ContextKey::RoleMaker => "role_maker",
            ContextKey::PsMode => "ps_mode",
            ContextKey::LrDecaySteps => "lr_decay_steps",
        }
    }
}

/// A side-channel sub-program the PS runtime executes apart from the main graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorTableEntry {
    pub feed_var_name: String,
    pub fetch_var_name: String,
    pub startup_program: Program,
    pub main_program: Program,
    pub tensor_table_class: String,
}

/// Per-run pass context.
#[derive(Debug, Clone, Default)]
pub struct PassContext {
    origin_main_program: Option<Arc<Program>>,
    origin_startup_program: Option<Arc<Program>>,
    role_maker: Option<Arc<dyn RoleMaker>>,
    ps_mode: Option<PsMode>,
    lr_decay_steps: Option<i64>,
    tensor_table: BTreeMap<String, TensorTableEntry>,
    applied_passes: Vec<Arc<dyn Pass>>,
    extra: AttrMap,
}

impl PassContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_origin_main_program(mut self, program: impl Into<Arc<Program>>) -> Self {
        self.origin_main_program = Some(program.into());
        self
    }

    pub fn with_origin_startup_program(mut self, program: impl Into<Arc<Program>>) -> Self {
        self.origin_startup_program = Some(program.into());
        self
    }

    pub fn with_role_maker(mut self, role_maker: Arc<dyn RoleMaker>) -> Self {
        self.role_maker = Some(role_maker);
        self
    }

    pub fn with_ps_mode(mut self, mode: PsMode) -> Self {
        self.ps_mode = Some(mode);
        self
    }

    pub fn with_lr_decay_steps(mut self, steps: i64) -> Self {
        self.lr_decay_steps = Some(steps);
        self
    }

    /// Whether a well-known attribute has been provided.
    pub fn has(&self, key: ContextKey) -> bool {
        match key {
            ContextKey::OriginMainProgram => self.origin_main_program.is_some(),
            ContextKey::OriginStartupProgram => self.origin_startup_program.is_some(),
            ContextKey::RoleMaker => self.role_maker.is_some(),
            ContextKey::PsMode => self.ps_mode.is_some(),
            ContextKey::LrDecaySteps => self.lr_decay_steps.is_some(),
        }
    }

    pub fn origin_main_program(&self) -> Result<&Program> {
        self.origin_main_program
            .as_deref()
            .ok_or_else(|| PassError::missing(ContextKey::OriginMainProgram.as_str()))
    }

    pub fn origin_startup_program(&self) -> Result<&Program> {
        self.origin_startup_program
            .as_deref()
            .ok_or_else(|| PassError::missing(ContextKey::OriginStartupProgram.as_str()))
    }

    pub fn role_maker(&self) -> Result<&dyn RoleMaker> {
        self.role_maker
            .as_deref()
            .ok_or_else(|| PassError::missing(ContextKey::RoleMaker.as_str()))
    }

    pub fn ps_mode(&self) -> Result<PsMode> {
        self.ps_mode
            .ok_or_else(|| PassError::missing(ContextKey::PsMode.as_str()))
    }

    pub fn lr_decay_steps(&self) -> Result<i64> {
        self.lr_decay_steps
            .ok_or_else(|| PassError::missing(ContextKey::LrDecaySteps.as_str()))
    }

    pub fn set_lr_decay_steps(&mut self, steps: i64) {
        self.lr_decay_steps = Some(steps);
    }

    pub fn set_ps_mode(&mut self, mode: PsMode) {
        self.ps_mode = Some(mode);
    }

    /// Tensor-table entries keyed by feed variable name.
    pub fn tensor_table(&self) -> &BTreeMap<String, TensorTableEntry> {
        &self.tensor_table
    }

    /// Inserts a tensor-table entry, returning the entry it replaced.
    pub fn add_tensor_table(&mut self, entry: TensorTableEntry) -> Option<TensorTableEntry> {
        let key = entry.feed_var_name.clone();
        let replaced = self.tensor_table.insert(key.clone(), entry);
        if replaced.is_some() {
            tracing::warn!(feed_var_name = %key, "replacing existing tensor table entry");
        }
        replaced
    }

    /// Names of the passes applied so far, in order.
    pub fn applied_passes(&self) -> Vec<&'static str> {
        self.applied_passes.iter().map(|pass| pass.name()).collect()
    }

    pub(crate) fn applied(&self) -> &[Arc<dyn Pass>] {
        &self.applied_passes
    }

    pub(crate) fn record_applied(&mut self, pass: Arc<dyn Pass>) {
        self.applied_passes.push(pass);
    }

    /// Dynamic attribute not covered by a typed field.
    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.extra.get(key)
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<AttrValue>) {
        self.extra.insert(key.to_string(), value.into());
    }

    pub fn extra_attrs(&self) -> &AttrMap {
        &self.extra
    }
}
