use rand::rngs::StdRng;
use tracing::debug;

use crate::agents::BankId;
use crate::error::{Result, SimError};
use crate::model::LiquidationMode;
use crate::registry::Registry;
use crate::unwind::{unwind_bank, UnwindReport};

/// Outcome of settling the interbank market.
#[derive(Debug, Clone, Default)]
pub struct ContagionReport {
    /// Full passes over the solvent set until it stopped changing
    pub passes: usize,
    pub failures: Vec<UnwindReport>,
    /// Interbank loans retired after settlement
    pub loans_retired: usize,
}

/// Default pass bound for `bank_count` banks. Each pass that does not
/// terminate removes at least one bank, so a correct run needs at most
/// `bank_count + 1` passes.
pub fn default_max_passes(bank_count: usize) -> usize {
    (bank_count + 1) * (bank_count + 1)
}

/// Settle one bank's interbank positions and re-check its status.
///
/// Income and expense are measured with a `(1 + rate)` multiplier. A bank
/// with positive net interbank income collects principal and interest on its
/// credits less losses on insolvent debtors; otherwise it repays principal
/// and interest on its debits. Equity moves by the interest (and losses)
/// only, reserves by principal as well.
fn settle_bank(
    registry: &mut Registry,
    bank: BankId,
    mode: LiquidationMode,
    car: f64,
    rng: &mut StdRng,
) -> Option<UnwindReport> {
    let mut credit_loss = 0.0;
    let mut interest_income = 0.0;
    let mut interest_expense = 0.0;
    let mut credit_principal = 0.0;
    let mut credit_interest = 0.0;
    let mut debit_principal = 0.0;
    let mut debit_interest = 0.0;

    for ib in &registry.interbank_loans {
        if ib.creditor == bank {
            credit_principal += ib.amount;
            credit_interest += ib.amount * ib.rate;
            if registry.banks[ib.debtor].solvent {
                interest_income += ib.amount * (1.0 + ib.rate);
            } else {
                credit_loss += ib.amount;
            }
        }
        if ib.debtor == bank {
            interest_expense += ib.amount * (1.0 + ib.rate);
            debit_principal += ib.amount;
            debit_interest += ib.amount * ib.rate;
        }
    }

    let b = &mut registry.banks[bank];
    b.ib.credit_loss = credit_loss;
    b.ib.interest_income = interest_income;
    b.ib.interest_expense = interest_expense;
    b.ib.net_interest_income = interest_income - interest_expense;

    if b.ib.net_interest_income > 0.0 {
        b.equity += credit_interest - credit_loss;
        b.reserves += credit_principal + credit_interest - credit_loss;
    } else {
        b.equity -= debit_interest;
        b.reserves -= debit_principal + debit_interest;
    }
    b.refresh_ratios();

    let mut failure = None;
    if b.equity < 0.0 || b.reserves < 0.0 {
        b.solvent = false;
        b.capitalized = false;
        failure = Some(unwind_bank(registry, bank, mode, rng));
    }

    let b = &mut registry.banks[bank];
    if 0.0 < b.capital_ratio && b.capital_ratio < car {
        b.capitalized = false;
        b.solvent = true;
        b.refresh_ratios();
    } else if b.capital_ratio > car {
        b.capitalized = true;
        b.solvent = true;
        b.refresh_ratios();
    }

    failure
}

/// Settle interbank exposures carried over from the previous liquidity phase
/// until the set of solvent banks stops changing.
///
/// Every pass re-settles each bank in the current solvent set; when a pass
/// fails any bank the loop restarts over the survivors. Once stable, each
/// bank's interbank ledger is archived and cleared and every interbank loan
/// is retired along with its network edge.
pub fn resolve_second_round_effects(
    registry: &mut Registry,
    mode: LiquidationMode,
    car: f64,
    max_passes: usize,
    rng: &mut StdRng,
) -> Result<ContagionReport> {
    let mut report = ContagionReport::default();
    let mut solvent = registry.solvent_banks();

    loop {
        if report.passes >= max_passes {
            return Err(SimError::NonConvergence {
                passes: report.passes,
                solvent_banks: solvent.len(),
            });
        }
        report.passes += 1;

        for &bank in &solvent {
            if let Some(failure) = settle_bank(registry, bank, mode, car, rng) {
                report.failures.push(failure);
            }
        }

        let survivors = solvent
            .iter()
            .filter(|&&b| registry.banks[b].solvent)
            .count();
        debug!(
            pass = report.passes,
            entered = solvent.len(),
            survivors,
            "contagion pass"
        );
        if survivors == solvent.len() {
            break;
        }
        solvent = registry.solvent_banks();
    }

    for bank in registry.banks.iter_mut() {
        bank.archive_interbank();
    }
    report.loans_retired = registry.interbank_loans.len();
    registry.clear_interbank_loans();

    Ok(report)
}
