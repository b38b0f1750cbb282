//! Parameter-server program passes.
//!
//! These passes turn a trainer program into the program a parameter server
//! runs: a `listen_and_serv` loop, optimizer sub-blocks and an optional
//! learning-rate decay tensor table. Only the decay table and the serving
//! loop rewrite anything yet; the remaining passes are registered
//! placeholders so pipelines can name them.

use psgraph_core::{get_optimize_ops, AttrValue, OpDesc, Program};
use tracing::{debug, info};

use crate::context::{
    ContextKey, PassContext, PsMode, TensorTableEntry, GLOBAL_STEP_TABLE_CLASS, LR_DECAY_COUNTER,
};
use crate::error::Result;
use crate::lr_decay::lr_scheduler_program;
use crate::pass::Pass;
use crate::registry::PassRegistry;

/// Operator type of the server event loop.
pub const LISTEN_AND_SERV_OP: &str = "listen_and_serv";

/// Thread-count attributes left at `-1` so the runtime picks its defaults.
const RPC_THREAD_ATTRS: [&str; 3] = [
    "rpc_get_thread_num",
    "rpc_send_thread_num",
    "rpc_prefetch_thread_num",
];

/// Attributes filled in later by the optimizer passes.
const DEFERRED_ATTRS: [&str; 5] = [
    "grad_to_block_id",
    "sparse_grad_to_param",
    "lr_decay_block_id",
    "dense_optimize_blocks",
    "sparse_optimize_blocks",
];

/// Registers a global-step tensor table when the trainer program declares
/// a learning-rate scheduler.
#[derive(Debug, Default, Clone, Copy)]
pub struct AddLrDecayTablePass;

impl Pass for AddLrDecayTablePass {
    fn name(&self) -> &'static str {
        "add_lr_decay_table_pass"
    }

    fn required_attrs(&self) -> &'static [ContextKey] {
        &[ContextKey::OriginMainProgram]
    }

    fn apply(
        &self,
        _main: &mut Program,
        _startup: &mut Program,
        ctx: &mut PassContext,
    ) -> Result<()> {
        let origin_main = ctx.origin_main_program()?;
        let Some(scheduler) = origin_main.lr_scheduler() else {
            debug!("no learning-rate scheduler declared, skipping decay table");
            return Ok(());
        };

        let optimize_ops = get_optimize_ops(origin_main);
        debug!(
            count = optimize_ops.len(),
            ops = ?optimize_ops.iter().map(|op| op.op_type.as_str()).collect::<Vec<_>>(),
            "optimizer ops in origin program"
        );

        let lr_decay_steps = ctx.lr_decay_steps()?;
        let decay = lr_scheduler_program(scheduler, lr_decay_steps)?;
        info!(
            scheduler = scheduler.name(),
            fetch_var_name = %decay.lr_name,
            "adding learning-rate decay tensor table"
        );

        ctx.add_tensor_table(TensorTableEntry {
            feed_var_name: LR_DECAY_COUNTER.to_string(),
            fetch_var_name: decay.lr_name,
            startup_program: decay.startup_program,
            main_program: decay.main_program,
            tensor_table_class: GLOBAL_STEP_TABLE_CLASS.to_string(),
        });
        Ok(())
    }
}

/// Appends the `listen_and_serv` op that runs the server event loop.
#[derive(Debug, Default, Clone, Copy)]
pub struct AddListenAndServPass;

impl Pass for AddListenAndServPass {
    fn name(&self) -> &'static str {
        "add_listen_and_serv_pass"
    }

    fn required_attrs(&self) -> &'static [ContextKey] {
        &[ContextKey::RoleMaker, ContextKey::PsMode]
    }

    fn apply(
        &self,
        main: &mut Program,
        _startup: &mut Program,
        ctx: &mut PassContext,
    ) -> Result<()> {
        let role_maker = ctx.role_maker()?;
        let mode = ctx.ps_mode()?;
        let endpoint = role_maker.endpoint();

        let mut op = OpDesc::new(LISTEN_AND_SERV_OP)
            .with_input("X", Vec::<String>::new())
            .with_attr("endpoint", endpoint.as_str())
            .with_attr("pserver_id", role_maker.rank_id())
            .with_attr("Fanin", role_maker.trainer_count())
            .with_attr("distributed_mode", mode.code());
        for key in DEFERRED_ATTRS {
            op = op.with_attr(key, AttrValue::None);
        }
        for key in RPC_THREAD_ATTRS {
            op = op.with_attr(key, -1_i64);
        }

        main.global_block_mut().append_op(op);
        info!(%endpoint, mode = %mode, "added {LISTEN_AND_SERV_OP} op");
        Ok(())
    }
}

macro_rules! placeholder_pass {
    ($(#[$meta:meta])* $ty:ident, $name:literal) => {
        $(#[$meta])*
        #[derive(Debug, Default, Clone, Copy)]
        pub struct $ty;

        impl Pass for $ty {
            fn name(&self) -> &'static str {
                $name
            }

            fn apply(
                &self,
                _main: &mut Program,
                _startup: &mut Program,
                _ctx: &mut PassContext,
            ) -> Result<()> {
                debug!(pass = $name, "placeholder pass, nothing to rewrite");
                Ok(())
            }
        }
    };
}

placeholder_pass!(
    /// Sets RPC runtime flags on the server program.
    AddRpcGlobalFlagsPass,
    "add_rpc_global_flags_pass"
);
placeholder_pass!(
    /// Builds optimizer sub-blocks for sync, async and half-async modes.
    AddOptimizerPass,
    "add_optimizer_pass"
);
placeholder_pass!(
    /// Builds optimizer sub-blocks for geo mode.
    AddGeoOptimizerPass,
    "add_geo_optimizer_pass"
);
placeholder_pass!(
    /// Derives the server startup program from the trainer startup program.
    BuildPserverStartupProgramPass,
    "build_pserver_startup_program_pass"
);
placeholder_pass!(
    /// Drops startup ops whose outputs the server never reads.
    DeleteUnusedInStartupPass,
    "delete_unused_in_startup_pass"
);

/// Registers every parameter-server pass with `registry`.
pub fn register_builtin_passes(registry: &mut PassRegistry) -> Result<()> {
    registry.register_default::<AddLrDecayTablePass>()?;
    registry.register_default::<AddListenAndServPass>()?;
    registry.register_default::<AddRpcGlobalFlagsPass>()?;
    registry.register_default::<AddOptimizerPass>()?;
    registry.register_default::<AddGeoOptimizerPass>()?;
    registry.register_default::<BuildPserverStartupProgramPass>()?;
    registry.register_default::<DeleteUnusedInStartupPass>()?;
    Ok(())
}

/// The pass sequence that builds a server program for `mode`.
pub fn default_server_passes(mode: PsMode) -> Vec<&'static str> {
    let optimizer = match mode {
        PsMode::Geo => "add_geo_optimizer_pass",
        PsMode::Sync | PsMode::Async | PsMode::HalfAsync => "add_optimizer_pass",
    };
    vec![
        "add_listen_and_serv_pass",
        "add_rpc_global_flags_pass",
        optimizer,
        "add_lr_decay_table_pass",
        "build_pserver_startup_program_pass",
        "delete_unused_in_startup_pass",
    ]
}
