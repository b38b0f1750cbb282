//! Computation-graph programs.
//!
//! A [`Program`] is an ordered list of [`Block`]s; block 0 is the global
//! block and always exists. Each block declares variables and holds an
//! ordered sequence of operator nodes ([`OpDesc`]). Passes receive programs
//! by `&mut` and rewrite them in place.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::attr::{AttrMap, AttrValue};
use crate::error::{CoreError, Result};
use crate::lr_scheduler::LrScheduler;

/// Attribute carrying an operator's [`OpRole`].
pub const OP_ROLE_ATTR_NAME: &str = "op_role";
/// Attribute carrying an operator's name scope.
pub const OP_NAME_SCOPE_ATTR_NAME: &str = "op_namescope";
/// Name-scope fragment marking gradient-clip operators.
pub const CLIP_OP_NAME_SCOPE: &str = "gradient_clip";

/// The role an operator plays in a training program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpRole {
    Forward,
    Backward,
    Optimize,
    Rpc,
    Dist,
    LrSched,
    Loss,
}

impl OpRole {
    /// Integer code stored in the `op_role` attribute.
    pub fn code(self) -> i64 {
        match self {
            OpRole::Forward => 0x0000,
            OpRole::Backward => 0x0001,
            OpRole::Optimize => 0x0002,
            OpRole::Rpc => 0x0004,
            OpRole::Dist => 0x0008,
            OpRole::LrSched => 0x0010,
            OpRole::Loss => 0x0100,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0x0000 => Some(OpRole::Forward),
            0x0001 => Some(OpRole::Backward),
            0x0002 => Some(OpRole::Optimize),
            0x0004 => Some(OpRole::Rpc),
            0x0008 => Some(OpRole::Dist),
            0x0010 => Some(OpRole::LrSched),
            0x0100 => Some(OpRole::Loss),
            _ => None,
        }
    }
}

/// Element type of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
}

/// A variable declared in a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDesc {
    pub name: String,
    pub dtype: DataType,
    #[serde(default)]
    pub shape: Vec<i64>,
    #[serde(default)]
    pub persistable: bool,
}

impl VarDesc {
    pub fn new(name: impl Into<String>, dtype: DataType, shape: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            dtype,
            shape,
            persistable: false,
        }
    }

    pub fn persistable(mut self, persistable: bool) -> Self {
        self.persistable = persistable;
        self
    }
}

/// An operator node: a type tag plus named input/output slots and attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpDesc {
    #[serde(rename = "type")]
    pub op_type: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub outputs: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub attrs: AttrMap,
}

impl OpDesc {
    pub fn new(op_type: impl Into<String>) -> Self {
        Self {
            op_type: op_type.into(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            attrs: AttrMap::new(),
        }
    }

    /// Builder: binds an input slot to a list of variable names.
    pub fn with_input<I, S>(mut self, slot: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs
            .insert(slot.to_string(), vars.into_iter().map(Into::into).collect());
        self
    }

    /// Builder: binds an output slot to a list of variable names.
    pub fn with_output<I, S>(mut self, slot: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs
            .insert(slot.to_string(), vars.into_iter().map(Into::into).collect());
        self
    }

    /// Builder: sets an attribute.
    pub fn with_attr(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    /// Builder: tags the op with a role.
    pub fn with_role(self, role: OpRole) -> Self {
        self.with_attr(OP_ROLE_ATTR_NAME, role.code())
    }

    /// Variables bound to an input slot; empty when the slot is absent.
    pub fn input(&self, slot: &str) -> &[String] {
        self.inputs.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Variables bound to an output slot; empty when the slot is absent.
    pub fn output(&self, slot: &str) -> &[String] {
        self.outputs.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<AttrValue>) {
        self.attrs.insert(name.to_string(), value.into());
    }

    /// Decoded `op_role` attribute, if present and recognised.
    pub fn role(&self) -> Option<OpRole> {
        self.attr(OP_ROLE_ATTR_NAME)
            .and_then(AttrValue::as_int)
            .and_then(OpRole::from_code)
    }
}

/// One block of a program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub idx: usize,
    #[serde(default)]
    pub parent_idx: Option<usize>,
    #[serde(default)]
    pub vars: BTreeMap<String, VarDesc>,
    #[serde(default)]
    pub ops: Vec<OpDesc>,
}

impl Block {
    pub fn new(idx: usize, parent_idx: Option<usize>) -> Self {
        Self {
            idx,
            parent_idx,
            vars: BTreeMap::new(),
            ops: Vec::new(),
        }
    }

    /// Appends an operator and returns its position.
    pub fn append_op(&mut self, op: OpDesc) -> usize {
        self.ops.push(op);
        self.ops.len() - 1
    }

    /// Inserts an operator at the front of the block.
    pub fn prepend_op(&mut self, op: OpDesc) {
        self.ops.insert(0, op);
    }

    /// Declares a variable, replacing any earlier declaration with the same name.
    pub fn create_var(&mut self, var: VarDesc) -> &VarDesc {
        let name = var.name.clone();
        self.vars.insert(name.clone(), var);
        &self.vars[&name]
    }

    pub fn has_var(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn var(&self, name: &str) -> Result<&VarDesc> {
        self.vars.get(name).ok_or_else(|| CoreError::VarNotFound {
            name: name.to_string(),
            block_idx: self.idx,
        })
    }

    /// Operators of the given type, in program order.
    pub fn ops_of_type<'a, 'b>(
        &'a self,
        op_type: &'b str,
    ) -> impl Iterator<Item = &'a OpDesc> + 'b
    where
        'a: 'b,
    {
        self.ops.iter().filter(move |op| op.op_type == op_type)
    }
}

#[derive(Deserialize)]
struct ProgramRepr {
    blocks: Vec<Block>,
    #[serde(default)]
    lr_scheduler: Option<LrScheduler>,
    #[serde(default)]
    name_counters: BTreeMap<String, usize>,
}

impl TryFrom<ProgramRepr> for Program {
    type Error = CoreError;

    fn try_from(repr: ProgramRepr) -> Result<Self> {
        if repr.blocks.is_empty() {
            return Err(CoreError::BlockNotFound {
                idx: 0,
                num_blocks: 0,
            });
        }
        for (pos, block) in repr.blocks.iter().enumerate() {
            if block.idx != pos {
                return Err(CoreError::Serialization {
                    message: format!("block at position {} declares idx {}", pos, block.idx),
                });
            }
        }
        Ok(Program {
            blocks: repr.blocks,
            lr_scheduler: repr.lr_scheduler,
            name_counters: repr.name_counters,
        })
    }
}

/// A computation graph: ordered blocks, block 0 being the global block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ProgramRepr")]
pub struct Program {
    blocks: Vec<Block>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lr_scheduler: Option<LrScheduler>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    name_counters: BTreeMap<String, usize>,
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl Program {
    /// Creates a program holding only an empty global block.
    pub fn new() -> Self {
        Self {
            blocks: vec![Block::new(0, None)],
            lr_scheduler: None,
            name_counters: BTreeMap::new(),
        }
    }

    pub fn global_block(&self) -> &Block {
        &self.blocks[0]
    }

    pub fn global_block_mut(&mut self) -> &mut Block {
        &mut self.blocks[0]
    }

    pub fn block(&self, idx: usize) -> Result<&Block> {
        let num_blocks = self.blocks.len();
        self.blocks
            .get(idx)
            .ok_or(CoreError::BlockNotFound { idx, num_blocks })
    }

    pub fn block_mut(&mut self, idx: usize) -> Result<&mut Block> {
        let num_blocks = self.blocks.len();
        self.blocks
            .get_mut(idx)
            .ok_or(CoreError::BlockNotFound { idx, num_blocks })
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Appends a new block whose parent is `parent_idx` and returns its index.
    pub fn create_block(&mut self, parent_idx: usize) -> Result<usize> {
        self.block(parent_idx)?;
        let idx = self.blocks.len();
        self.blocks.push(Block::new(idx, Some(parent_idx)));
        Ok(idx)
    }

    /// Total operator count across all blocks.
    pub fn op_count(&self) -> usize {
        self.blocks.iter().map(|b| b.ops.len()).sum()
    }

    pub fn lr_scheduler(&self) -> Option<&LrScheduler> {
        self.lr_scheduler.as_ref()
    }

    pub fn set_lr_scheduler(&mut self, scheduler: Option<LrScheduler>) {
        self.lr_scheduler = scheduler;
    }

    /// Generates a value name unique within this program, e.g.
    /// `exponential_decay_0.tmp_0`.
    pub fn unique_name(&mut self, prefix: &str) -> String {
        let counter = self.name_counters.entry(prefix.to_string()).or_insert(0);
        let name = format!("{}_{}.tmp_0", prefix, counter);
        *counter += 1;
        name
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Returns the optimizer operators of `program`'s global block.
///
/// An op qualifies when its `op_role` is exactly [`OpRole::Optimize`].
/// Gradient-clip ops share that role but are skipped.
pub fn get_optimize_ops(program: &Program) -> Vec<&OpDesc> {
    program
        .global_block()
        .ops
        .iter()
        .filter(|op| op.role() == Some(OpRole::Optimize))
        .filter(|op| {
            let clipped = op
                .attr(OP_NAME_SCOPE_ATTR_NAME)
                .and_then(AttrValue::as_str)
                .is_some_and(|scope| scope.contains(CLIP_OP_NAME_SCOPE));
            if clipped {
                tracing::debug!(op_type = %op.op_type, "skipping gradient-clip op");
            }
            !clipped
        })
        .collect()
}
