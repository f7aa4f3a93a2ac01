use std::fs::File;
use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::model::{BankSim, SimConfig};
use crate::snapshot::{SnapshotSink, StepRecord};

/// Summary statistics for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub steps: usize,
    pub seed: u64,
    pub surviving_banks: usize,
    pub credit_failures: usize,
    pub liquidity_failures: usize,
    /// Banks unwound while settling interbank exposures
    pub contagion_failures: usize,
    pub total_dividends: f64,
    pub total_equity: f64,
    pub total_deposits: f64,
    pub total_loans: f64,
    /// The run ended before `max_steps` because every bank had failed
    pub all_banks_failed: bool,
}

impl RunSummary {
    pub fn from_sim(sim: &BankSim, stopped_early: bool) -> Self {
        let banks = &sim.registry.banks;
        RunSummary {
            steps: sim.current_step,
            seed: sim.config.seed,
            surviving_banks: banks.iter().filter(|b| b.solvent).count(),
            credit_failures: banks.iter().filter(|b| b.credit_failure).count(),
            liquidity_failures: banks.iter().filter(|b| b.liquidity_failure).count(),
            contagion_failures: banks
                .iter()
                .filter(|b| !b.solvent && !b.credit_failure && !b.liquidity_failure)
                .count(),
            total_dividends: banks.iter().map(|b| b.cum_dividend).sum(),
            total_equity: banks.iter().map(|b| b.equity).sum(),
            total_deposits: banks.iter().map(|b| b.deposits).sum(),
            total_loans: banks.iter().map(|b| b.loans).sum(),
            all_banks_failed: stopped_early,
        }
    }
}

/// Streams bank and interbank snapshots to `banks.csv` and `interbank.csv`.
pub struct CsvSink {
    banks: csv::Writer<File>,
    interbank: csv::Writer<File>,
}

impl CsvSink {
    pub fn create(output_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(output_dir)?;
        let mut banks = csv::Writer::from_path(output_dir.join("banks.csv"))?;
        banks.write_record([
            "step",
            "bank",
            "car",
            "min_reserves_ratio",
            "capital_ratio",
            "reserves_ratio",
            "leverage_ratio",
            "upper_bound_cratio",
            "buffer_reserves_ratio",
            "dividend",
            "cum_dividend",
            "loans",
            "reserves",
            "deposits",
            "equity",
            "total_assets",
            "rwa",
            "provisions",
            "interest_income",
            "interest_expense",
            "defaulted_loans",
            "ib_credits",
            "ib_debits",
            "ib_credits_settled",
            "ib_debits_settled",
            "ib_net_interest_income",
            "ib_credit_loss",
            "solvent",
            "capitalized",
            "credit_failure",
            "liquidity_failure",
        ])?;
        let mut interbank = csv::Writer::from_path(output_dir.join("interbank.csv"))?;
        interbank.write_record(["step", "creditor", "debtor", "amount"])?;
        Ok(CsvSink { banks, interbank })
    }
}

impl SnapshotSink for CsvSink {
    fn record(&mut self, record: &StepRecord) -> Result<()> {
        for b in &record.banks {
            self.banks.write_record(&[
                b.step.to_string(),
                b.bank.to_string(),
                format!("{:.4}", b.car),
                format!("{:.4}", b.min_reserves_ratio),
                format!("{:.6}", b.capital_ratio),
                format!("{:.6}", b.reserves_ratio),
                format!("{:.6}", b.leverage_ratio),
                format!("{:.4}", b.upper_bound_cratio),
                format!("{:.4}", b.buffer_reserves_ratio),
                format!("{:.4}", b.dividend),
                format!("{:.4}", b.cum_dividend),
                format!("{:.4}", b.loans),
                format!("{:.4}", b.reserves),
                format!("{:.4}", b.deposits),
                format!("{:.4}", b.equity),
                format!("{:.4}", b.total_assets),
                format!("{:.4}", b.rwa),
                format!("{:.4}", b.provisions),
                format!("{:.4}", b.interest_income),
                format!("{:.4}", b.interest_expense),
                format!("{:.4}", b.defaulted_loans),
                format!("{:.4}", b.ib_credits),
                format!("{:.4}", b.ib_debits),
                format!("{:.4}", b.ib_credits_settled),
                format!("{:.4}", b.ib_debits_settled),
                format!("{:.4}", b.ib_net_interest_income),
                format!("{:.4}", b.ib_credit_loss),
                b.solvent.to_string(),
                b.capitalized.to_string(),
                b.credit_failure.to_string(),
                b.liquidity_failure.to_string(),
            ])?;
        }
        for l in &record.interbank {
            self.interbank.write_record(&[
                l.step.to_string(),
                l.creditor.to_string(),
                l.debtor.to_string(),
                format!("{:.6}", l.amount),
            ])?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.banks.flush()?;
        self.interbank.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct SummaryFile<'a> {
    generated_at: String,
    config: &'a SimConfig,
    summary: &'a RunSummary,
}

/// Save the run summary, with the config that produced it, to JSON.
pub fn save_summary_json(summary: &RunSummary, config: &SimConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = SummaryFile {
        generated_at: chrono::Utc::now().to_rfc3339(),
        config,
        summary,
    };
    std::fs::write(path, serde_json::to_string_pretty(&file)?)?;
    Ok(())
}

/// Save configuration to TOML format.
pub fn save_config_toml(config: &SimConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, config.to_toml_string()?)?;
    Ok(())
}
