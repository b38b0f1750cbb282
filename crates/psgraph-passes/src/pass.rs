//! The pass contract.

use psgraph_core::Program;

use crate::context::{ContextKey, PassContext};
use crate::error::Result;

/// A named graph-transformation unit.
///
/// `apply` is expected to run at most once per pipeline run per instance and
/// is not idempotent: applying a pass twice repeats its mutations. Side
/// effects are limited to the two programs and the context.
pub trait Pass: Send + Sync {
    /// Registry name, e.g. `"add_listen_and_serv_pass"`.
    fn name(&self) -> &'static str;

    /// Validates the pass's own configuration.
    fn check_self(&self) -> bool {
        true
    }

    /// Validates that this pass may run in the same pipeline as `other`.
    ///
    /// No pass defines composition conflicts yet, so the default accepts everything.
    fn check_conflict(&self, _other: &dyn Pass) -> bool {
        true
    }

    /// Context attributes that must be present before the pipeline starts.
    fn required_attrs(&self) -> &'static [ContextKey] {
        &[]
    }

    /// Rewrites `main_program` / `startup_program` in place.
    fn apply(
        &self,
        main_program: &mut Program,
        startup_program: &mut Program,
        ctx: &mut PassContext,
    ) -> Result<()>;
}

impl std::fmt::Debug for dyn Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pass").field("name", &self.name()).finish()
    }
}
