//! Batch-level failure of a Silver load.

use thiserror::Error;

use crate::pipeline::Stage;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid load plan: {0}")]
    Plan(String),

    /// A stage failed while transforming or writing; the batch halts here
    #[error("stage {stage} failed: {message}")]
    Stage {
        stage: Stage,
        message: String,
        sqlstate: Option<String>,
    },

    /// Opening or committing the load transaction failed
    #[error("load transaction failed during {phase}: {message}")]
    Transaction {
        phase: &'static str,
        message: String,
        sqlstate: Option<String>,
    },
}

impl LoadError {
    pub fn stage(stage: Stage, err: &anyhow::Error) -> Self {
        LoadError::Stage {
            stage,
            message: format!("{:#}", err),
            sqlstate: sqlstate(err),
        }
    }

    pub fn transaction(phase: &'static str, err: &anyhow::Error) -> Self {
        LoadError::Transaction {
            phase,
            message: format!("{:#}", err),
            sqlstate: sqlstate(err),
        }
    }

    /// SQLSTATE of the database error behind this failure, if any
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            LoadError::Plan(_) => None,
            LoadError::Stage { sqlstate, .. } | LoadError::Transaction { sqlstate, .. } => {
                sqlstate.as_deref()
            }
        }
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            LoadError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// First database error code found in the error chain
pub fn sqlstate(err: &anyhow::Error) -> Option<String> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<sqlx::Error>())
        .and_then(|e| e.as_database_error())
        .and_then(|db| db.code())
        .map(|code| code.into_owned())
}
