pub mod agents;
pub mod contagion;
pub mod dividends;
pub mod error;
pub mod liquidity;
pub mod loan_book;
pub mod market;
pub mod model;
pub mod network;
pub mod output;
pub mod population;
pub mod registry;
pub mod risk_weight;
pub mod snapshot;
pub mod solvency;
pub mod sweep;
pub mod unwind;

pub use error::{Result, SimError};
pub use model::{BankSim, LiquidationMode, SimConfig};
