use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::agents::{safe_div, BankId, LoanId};
use crate::registry::Registry;

/// Loans one bank shed to lift its capital ratio.
#[derive(Debug, Clone, Default)]
pub struct ShedRecord {
    pub bank: BankId,
    pub shed: Vec<LoanId>,
    /// Running capital ratio before the first shed, then after each one
    pub ratio_path: Vec<f64>,
    pub accounts_closed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct OptimizerReport {
    pub banks: Vec<ShedRecord>,
}

impl OptimizerReport {
    pub fn loans_shed(&self) -> usize {
        self.banks.iter().map(|r| r.shed.len()).sum()
    }
}

/// Running balance sheet while a bank walks its book.
#[derive(Debug, Clone, Copy)]
struct Interim {
    equity: f64,
    rwa: f64,
    reserves: f64,
    loans: f64,
    provisions: f64,
    capital_ratio: f64,
}

/// Shed loans from every solvent, uncapitalized bank.
///
/// Each performing loan is considered once, in book order. Selling it costs
/// its fire-sale loss and releases its provision; the sale goes through only
/// when the resulting capital ratio is strictly above the running one and
/// equity and RWA stay positive. Shed loans stay on the bank's book as
/// dumped, unapproved loans.
///
/// The bank then loses as many depositors as loans shed, chosen at random;
/// when it has no more depositors than that, all of them leave and the excess
/// count is charged against equity.
pub fn optimize_risk_weights(registry: &mut Registry, car: f64, rng: &mut StdRng) -> OptimizerReport {
    let mut report = OptimizerReport::default();

    let uncapitalized: Vec<BankId> = registry
        .banks
        .iter()
        .filter(|b| b.solvent && !b.capitalized)
        .map(|b| b.id)
        .collect();

    for bank in uncapitalized {
        let b = &registry.banks[bank];
        let mut interim = Interim {
            equity: b.equity,
            rwa: b.rwa,
            reserves: b.reserves,
            loans: b.loans,
            provisions: b.provisions,
            capital_ratio: b.capital_ratio,
        };
        let mut record = ShedRecord {
            bank,
            ratio_path: vec![interim.capital_ratio],
            ..ShedRecord::default()
        };

        for id in registry.performing_loans(bank) {
            let loan = &mut registry.loans[id];
            let released = loan.expected_loss();
            let sale_loss = loan.amount * loan.fire_sale_loss;

            let equity = interim.equity - sale_loss + released;
            let rwa = interim.rwa - loan.rw_amount();
            let capital_ratio = safe_div(equity, rwa);

            if capital_ratio > interim.capital_ratio && equity > 0.0 && rwa > 0.0 {
                interim = Interim {
                    equity,
                    rwa,
                    reserves: interim.reserves - sale_loss + released,
                    loans: interim.loans - loan.amount,
                    provisions: (interim.provisions - released).max(0.0),
                    capital_ratio,
                };
                loan.dumped = true;
                loan.approved = false;
                record.shed.push(id);
                record.ratio_path.push(capital_ratio);
            }
        }

        let b = &mut registry.banks[bank];
        b.equity = interim.equity;
        b.rwa = interim.rwa;
        b.capital_ratio = interim.capital_ratio;
        b.reserves = interim.reserves;
        b.loans = interim.loans;
        b.update_total_assets();
        b.update_leverage_ratio();
        b.provisions = interim.provisions;
        b.update_reserves_ratio();
        if b.capital_ratio > car {
            b.capitalized = true;
        }

        let holders = registry.account_holders(bank);
        let n_shed = record.shed.len();
        let leaving: Vec<_> = if n_shed < holders.len() {
            holders.choose_multiple(rng, n_shed).copied().collect()
        } else {
            holders.clone()
        };
        for &s in &leaving {
            registry.savers[s].owns_account = false;
        }
        record.accounts_closed = leaving.len();
        if n_shed >= holders.len() {
            registry.banks[bank].equity -= (n_shed - holders.len()) as f64;
        }

        let deposits = registry.balance_of(&registry.account_holders(bank));
        registry.banks[bank].deposits = deposits;

        report.banks.push(record);
    }

    debug!(
        banks = report.banks.len(),
        loans_shed = report.loans_shed(),
        "risk weights optimized"
    );
    report
}
