//! JSON pipeline configuration.
//!
//! A [`PipelineConfig`] carries everything a server-side pipeline run needs
//! besides the programs themselves. Missing fields fall back to
//! [`PipelineConfig::default`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use psgraph_core::{AttrMap, Program, PsRoleMaker};
use serde::{Deserialize, Serialize};

use crate::context::{PassContext, PsMode};
use crate::error::{PassError, Result};
use crate::ps_server::default_server_passes;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Training mode of the cluster.
    pub ps_mode: PsMode,
    /// Global-step period of the staircase decay forms.
    pub lr_decay_steps: Option<i64>,
    /// Position of this server in the cluster.
    pub role: Option<PsRoleMaker>,
    /// Explicit pass order. Defaults to the server passes for `ps_mode`.
    pub passes: Option<Vec<String>>,
    /// Attributes copied into the context's free-form map.
    pub extra: AttrMap,
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| PassError::Config {
            message: format!("invalid pipeline config: {e}"),
        })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| PassError::Config {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::from_json_str(&json)
    }

    /// Returns the fields that differ from [`PipelineConfig::default`].
    pub fn user_overrides(&self) -> BTreeMap<String, serde_json::Value> {
        let defaults = PipelineConfig::default();
        let mut out = BTreeMap::new();

        macro_rules! push_override {
            ($field:ident) => {
                if self.$field != defaults.$field {
                    out.insert(
                        stringify!($field).to_string(),
                        serde_json::to_value(&self.$field).unwrap_or(serde_json::Value::Null),
                    );
                }
            };
        }

        push_override!(ps_mode);
        push_override!(lr_decay_steps);
        push_override!(role);
        push_override!(passes);
        push_override!(extra);

        out
    }

    /// Pass names to run, in order.
    pub fn pass_names(&self) -> Vec<String> {
        match &self.passes {
            Some(passes) => passes.clone(),
            None => default_server_passes(self.ps_mode)
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }

    /// Builds the context for one run over the given origin programs.
    pub fn build_context(&self, origin_main: Program, origin_startup: Program) -> PassContext {
        let mut ctx = PassContext::new()
            .with_origin_main_program(origin_main)
            .with_origin_startup_program(origin_startup)
            .with_ps_mode(self.ps_mode);

        if let Some(role) = &self.role {
            ctx = ctx.with_role_maker(Arc::new(role.clone()));
        }
        if let Some(steps) = self.lr_decay_steps {
            ctx.set_lr_decay_steps(steps);
        }
        for (key, value) in &self.extra {
            ctx.set_attr(key, value.clone());
        }
        ctx
    }
}
