//! Graph passes that turn a trainer program into a parameter-server program.
//!
//! - [`Pass`]: the transformation contract.
//! - [`PassRegistry`]: name to constructor catalog, plus the process-wide
//!   registry of built-in passes ([`registry::global`]).
//! - [`PassContext`]: typed state shared by the passes of one run.
//! - [`PassPipeline`]: validates and applies passes in order.
//! - [`PipelineConfig`]: JSON description of a run.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use psgraph_core::{LrScheduler, Program, PsRoleMaker};
//! use psgraph_passes::{registry, PassContext, PassPipeline, PsMode, LR_DECAY_COUNTER};
//!
//! let mut origin = Program::new();
//! origin.set_lr_scheduler(Some(LrScheduler::exponential(0.5)));
//!
//! let role = PsRoleMaker::new(vec!["127.0.0.1:6170".to_string()], 0, 2).unwrap();
//! let mut ctx = PassContext::new()
//!     .with_origin_main_program(origin)
//!     .with_role_maker(Arc::new(role))
//!     .with_ps_mode(PsMode::Async)
//!     .with_lr_decay_steps(100);
//!
//! let pipeline = PassPipeline::from_names(
//!     registry::global().unwrap(),
//!     &["add_listen_and_serv_pass", "add_lr_decay_table_pass"],
//! )
//! .unwrap();
//!
//! let (mut main, mut startup) = (Program::new(), Program::new());
//! pipeline.run(&mut main, &mut startup, &mut ctx).unwrap();
//! assert_eq!(main.global_block().ops[0].op_type, "listen_and_serv");
//! assert!(ctx.tensor_table().contains_key(LR_DECAY_COUNTER));
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod lr_decay;
pub mod pass;
pub mod pipeline;
pub mod ps_server;
pub mod registry;

pub use config::PipelineConfig;
pub use context::{
    ContextKey, PassContext, PsMode, TensorTableEntry, GLOBAL_STEP_TABLE_CLASS, LR_DECAY_COUNTER,
};
pub use error::{PassError, Result};
pub use lr_decay::{lr_scheduler_program, DecayProgram};
pub use pass::Pass;
pub use pipeline::{PassPipeline, PassRun};
pub use ps_server::{
    default_server_passes, AddGeoOptimizerPass, AddListenAndServPass, AddLrDecayTablePass,
    AddOptimizerPass, AddRpcGlobalFlagsPass, BuildPserverStartupProgramPass,
    DeleteUnusedInStartupPass, LISTEN_AND_SERV_OP,
};
pub use registry::{new_pass, PassFactory, PassRegistry};
