use thiserror::Error;

use crate::agents::BankId;

/// Errors surfaced by the simulation core and its output layer.
///
/// Bank failures are not errors: credit and liquidity failures are recorded
/// on the bank itself and the run continues.
#[derive(Error, Debug)]
pub enum SimError {
    /// The contagion fixed-point loop exceeded its pass bound.
    #[error("contagion resolver did not converge after {passes} passes ({solvent_banks} banks still solvent)")]
    NonConvergence { passes: usize, solvent_banks: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A bank record left a phase with a non-finite value or a broken
    /// `total_assets == reserves + loans` identity.
    #[error("corrupt balance sheet for bank {bank} after {phase}: {field} = {value}")]
    CorruptBalanceSheet {
        bank: BankId,
        phase: &'static str,
        field: &'static str,
        value: f64,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("toml decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),

    #[error("toml encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
