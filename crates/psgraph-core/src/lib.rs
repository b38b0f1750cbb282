//! Core graph model for psgraph.
//!
//! This crate provides the types that parameter-server graph passes read and
//! rewrite:
//!
//! - **Programs**: ordered blocks of operator nodes with typed inputs,
//!   outputs and attributes ([`Program`], [`Block`], [`OpDesc`]).
//! - **Attributes**: the dynamically typed [`AttrValue`].
//! - **LR schedulers**: the closed set of scheduler declarations a program
//!   can carry ([`LrScheduler`]).
//! - **Role makers**: the cluster-position queries a pass needs ([`RoleMaker`]).
//!
//! # Example
//!
//! ```
//! use psgraph_core::{OpDesc, OpRole, Program, get_optimize_ops};
//!
//! let mut program = Program::new();
//! program.global_block_mut().append_op(
//!     OpDesc::new("sgd")
//!         .with_input("Param", ["fc_0.w_0"])
//!         .with_role(OpRole::Optimize),
//! );
//! assert_eq!(get_optimize_ops(&program).len(), 1);
//! ```

pub mod attr;
pub mod error;
pub mod lr_scheduler;
pub mod program;
pub mod role_maker;

pub use attr::{AttrMap, AttrValue};
pub use error::{CoreError, Result};
pub use lr_scheduler::{LrScheduler, PS_SUPPORTED_SCHEDULERS};
pub use program::{
    get_optimize_ops, Block, DataType, OpDesc, OpRole, Program, VarDesc, CLIP_OP_NAME_SCOPE,
    OP_NAME_SCOPE_ATTR_NAME, OP_ROLE_ATTR_NAME,
};
pub use role_maker::{PsRoleMaker, RoleMaker};
