//! Error types for the psgraph core library.
//!
//! Graph-model and role-maker failures are reported through [`CoreError`];
//! higher layers wrap it rather than re-describing the same conditions.

use thiserror::Error;

/// The main error type for psgraph-core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A block index does not exist in the program.
    #[error("Block {idx} not found (program has {num_blocks} blocks)")]
    BlockNotFound {
        /// The requested block index.
        idx: usize,
        /// Number of blocks in the program.
        num_blocks: usize,
    },

    /// A variable is not declared in the block being searched.
    #[error("Variable {name} not found in block {block_idx}")]
    VarNotFound {
        /// The variable name.
        name: String,
        /// The block that was searched.
        block_idx: usize,
    },

    /// Role-maker settings are inconsistent.
    #[error("Invalid role maker: {message}")]
    InvalidRoleMaker {
        /// A description of the inconsistency.
        message: String,
    },

    /// Error when serialization or deserialization fails.
    #[error("Serialization error: {message}")]
    Serialization {
        /// A description of the serialization error.
        message: String,
    },
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization {
            message: err.to_string(),
        }
    }
}

/// A specialized Result type for psgraph-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::BlockNotFound {
            idx: 3,
            num_blocks: 1,
        };
        assert_eq!(err.to_string(), "Block 3 not found (program has 1 blocks)");

        let err = CoreError::VarNotFound {
            name: "fc_0.w_0".to_string(),
            block_idx: 0,
        };
        assert_eq!(err.to_string(), "Variable fc_0.w_0 not found in block 0");

        let err = CoreError::InvalidRoleMaker {
            message: "no pserver endpoints".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid role maker: no pserver endpoints");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: CoreError = json_err.into();
        assert!(err.to_string().starts_with("Serialization error: "));
    }
}
