use serde::Serialize;

use crate::agents::{Bank, BankId, InterbankLoan};
use crate::error::Result;

/// Per-bank state recorded at the end of a step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BankSnapshot {
    pub step: usize,
    pub bank: BankId,
    pub car: f64,
    pub min_reserves_ratio: f64,
    pub capital_ratio: f64,
    pub reserves_ratio: f64,
    pub leverage_ratio: f64,
    pub upper_bound_cratio: f64,
    pub buffer_reserves_ratio: f64,
    pub dividend: f64,
    pub cum_dividend: f64,
    pub loans: f64,
    pub reserves: f64,
    pub deposits: f64,
    pub equity: f64,
    pub total_assets: f64,
    pub rwa: f64,
    pub provisions: f64,
    pub interest_income: f64,
    pub interest_expense: f64,
    pub defaulted_loans: f64,
    pub ib_credits: f64,
    pub ib_debits: f64,
    pub ib_credits_settled: f64,
    pub ib_debits_settled: f64,
    pub ib_net_interest_income: f64,
    pub ib_credit_loss: f64,
    pub solvent: bool,
    pub capitalized: bool,
    pub credit_failure: bool,
    pub liquidity_failure: bool,
}

impl BankSnapshot {
    /// `ib_credits` and `ib_debits` are the positions opened since the last
    /// contagion pass and still outstanding. The `*_settled` figures and the
    /// interbank income and loss come from the ledger archived at that pass.
    pub fn capture(step: usize, bank: &Bank, car: f64, min_reserves_ratio: f64) -> Self {
        BankSnapshot {
            step,
            bank: bank.id,
            car,
            min_reserves_ratio,
            capital_ratio: bank.capital_ratio,
            reserves_ratio: bank.reserves_ratio,
            leverage_ratio: bank.leverage_ratio,
            upper_bound_cratio: bank.upper_bound_cratio,
            buffer_reserves_ratio: bank.buffer_reserves_ratio,
            dividend: bank.dividend,
            cum_dividend: bank.cum_dividend,
            loans: bank.loans,
            reserves: bank.reserves,
            deposits: bank.deposits,
            equity: bank.equity,
            total_assets: bank.total_assets,
            rwa: bank.rwa,
            provisions: bank.provisions,
            interest_income: bank.interest_income,
            interest_expense: bank.interest_expense,
            defaulted_loans: bank.defaulted_loans,
            ib_credits: bank.ib.credits,
            ib_debits: bank.ib.debits,
            ib_credits_settled: bank.ib_last.credits,
            ib_debits_settled: bank.ib_last.debits,
            ib_net_interest_income: bank.ib_last.net_interest_income,
            ib_credit_loss: bank.ib_last.credit_loss,
            solvent: bank.solvent,
            capitalized: bank.capitalized,
            credit_failure: bank.credit_failure,
            liquidity_failure: bank.liquidity_failure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterbankSnapshot {
    pub step: usize,
    pub creditor: BankId,
    pub debtor: BankId,
    pub amount: f64,
}

impl InterbankSnapshot {
    pub fn capture(step: usize, loan: &InterbankLoan) -> Self {
        InterbankSnapshot {
            step,
            creditor: loan.creditor,
            debtor: loan.debtor,
            amount: loan.amount,
        }
    }
}

/// Everything recorded for one step.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepRecord {
    pub step: usize,
    pub banks: Vec<BankSnapshot>,
    pub interbank: Vec<InterbankSnapshot>,
}

impl StepRecord {
    pub fn solvent_banks(&self) -> usize {
        self.banks.iter().filter(|b| b.solvent).count()
    }
}

/// Receives step records as a run produces them.
pub trait SnapshotSink {
    fn record(&mut self, record: &StepRecord) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<StepRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }
}

impl SnapshotSink for MemorySink {
    fn record(&mut self, record: &StepRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// Discards records; used when only the summary is wanted.
#[derive(Debug, Default)]
pub struct NullSink;

impl SnapshotSink for NullSink {
    fn record(&mut self, _record: &StepRecord) -> Result<()> {
        Ok(())
    }
}
