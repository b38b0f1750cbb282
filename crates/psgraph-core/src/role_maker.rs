//! Role-maker abstraction: where this process sits in the PS cluster.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Read-only view of the cluster role of the current process.
pub trait RoleMaker: Send + Sync + std::fmt::Debug {
    /// This process's own network endpoint (`host:port`).
    fn endpoint(&self) -> String;

    /// Rank of this process within its role.
    fn rank_id(&self) -> i64;

    /// Number of trainer processes feeding the servers.
    fn trainer_count(&self) -> i64;
}

/// Role maker for a parameter-server process.
///
/// Always valid: both [`PsRoleMaker::new`] and deserialization run
/// [`PsRoleMaker::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PsRoleMakerRepr")]
pub struct PsRoleMaker {
    /// Endpoints of all parameter servers, indexed by rank.
    pserver_endpoints: Vec<String>,
    /// Index of this server in `pserver_endpoints`.
    role_id: usize,
    /// Number of trainers.
    trainer_num: usize,
}

impl PsRoleMaker {
    /// Creates a validated server role maker.
    ///
    /// # Arguments
    ///
    /// * `pserver_endpoints` - Endpoints of all parameter servers.
    /// * `role_id` - Index of this server.
    /// * `trainer_num` - Number of trainers.
    pub fn new(pserver_endpoints: Vec<String>, role_id: usize, trainer_num: usize) -> Result<Self> {
        let rm = Self {
            pserver_endpoints,
            role_id,
            trainer_num,
        };
        rm.validate()?;
        Ok(rm)
    }

    pub fn pserver_endpoints(&self) -> &[String] {
        &self.pserver_endpoints
    }

    pub fn role_id(&self) -> usize {
        self.role_id
    }

    pub fn trainer_num(&self) -> usize {
        self.trainer_num
    }

    /// Validates the settings; deserialized values should be checked too.
    pub fn validate(&self) -> Result<()> {
        if self.pserver_endpoints.is_empty() {
            return Err(CoreError::InvalidRoleMaker {
                message: "At least one pserver endpoint is required".to_string(),
            });
        }

        if self.role_id >= self.pserver_endpoints.len() {
            return Err(CoreError::InvalidRoleMaker {
                message: format!(
                    "Role id {} is out of range (max: {})",
                    self.role_id,
                    self.pserver_endpoints.len() - 1
                ),
            });
        }

        if self.trainer_num == 0 {
            return Err(CoreError::InvalidRoleMaker {
                message: "At least one trainer is required".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Deserialize)]
struct PsRoleMakerRepr {
    pserver_endpoints: Vec<String>,
    role_id: usize,
    trainer_num: usize,
}

impl TryFrom<PsRoleMakerRepr> for PsRoleMaker {
    type Error = CoreError;

    fn try_from(repr: PsRoleMakerRepr) -> Result<Self> {
        PsRoleMaker::new(repr.pserver_endpoints, repr.role_id, repr.trainer_num)
    }
}

impl RoleMaker for PsRoleMaker {
    fn endpoint(&self) -> String {
        self.pserver_endpoints[self.role_id].clone()
    }

    fn rank_id(&self) -> i64 {
        self.role_id as i64
    }

    fn trainer_count(&self) -> i64 {
        self.trainer_num as i64
    }
}
