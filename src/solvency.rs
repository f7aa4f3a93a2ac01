use rand::rngs::StdRng;
use rand::Rng;
use tracing::debug;

use crate::agents::{BankId, LoanId};
use crate::model::LiquidationMode;
use crate::registry::Registry;
use crate::unwind::{unwind_bank, UnwindReport};

/// Outcome of one solvency pass.
#[derive(Debug, Clone, Default)]
pub struct SolvencyReport {
    /// Loans that defaulted this step
    pub defaulted: Vec<LoanId>,
    /// Banks that failed on credit losses and were unwound
    pub failures: Vec<UnwindReport>,
}

/// Draw defaults on a bank's performing loans and book the credit loss.
///
/// Defaults cost equity their LGD; the provision top-up for the surviving
/// book comes out of equity and reserves; recoveries flow into reserves.
/// Deposits do not move when loans default.
pub fn apply_credit_losses(registry: &mut Registry, bank: BankId, rng: &mut StdRng) -> Vec<LoanId> {
    let book = registry.performing_loans(bank);
    let mut defaulted = Vec::new();
    for id in book {
        let loan = &mut registry.loans[id];
        if rng.gen::<f64>() < loan.pdef {
            loan.solvent = false;
            defaulted.push(id);
        }
    }

    let mut rw_lost = 0.0;
    let mut lgd_lost = 0.0;
    let mut recovered = 0.0;
    let mut principal = 0.0;
    for &id in &defaulted {
        let loan = &registry.loans[id];
        rw_lost += loan.rw_amount();
        lgd_lost += loan.lgd_amount();
        recovered += loan.recovery();
        principal += loan.amount;
    }

    let new_provisions: f64 = registry
        .performing_loans(bank)
        .iter()
        .map(|&id| registry.loans[id].expected_loss())
        .sum();

    let b = &mut registry.banks[bank];
    b.rwa -= rw_lost;
    // equity may go negative here; the bank is not failed until net
    // interest income has been booked
    b.equity -= lgd_lost;
    b.new_provisions = new_provisions;
    let change_in_provisions = b.new_provisions - b.provisions;
    b.provisions = b.new_provisions;
    b.equity -= change_in_provisions;
    b.reserves += recovered;
    b.reserves -= change_in_provisions;
    b.loans -= principal;
    b.defaulted_loans += principal;
    b.update_total_assets();

    defaulted
}

/// Interest on performing loans plus the reserve rate on reserves and
/// provisions, less deposit interest owed to the savers located at the bank.
pub fn book_net_interest_income(registry: &mut Registry, bank: BankId, reserve_rate: f64) {
    let loan_income: f64 = registry
        .performing_loans(bank)
        .iter()
        .map(|&id| registry.loans[id].interest_payment())
        .sum();
    let saver_balances = registry.balance_of(registry.savers_of(bank));

    let b = &mut registry.banks[bank];
    b.interest_income = loan_income + (b.reserves + b.provisions) * reserve_rate;
    b.interest_expense = saver_balances * b.deposit_rate;
    b.net_interest_income = b.interest_income - b.interest_expense;

    b.equity += b.net_interest_income;
    b.update_capital_ratio();
    b.reserves += b.net_interest_income;
    b.update_reserves_ratio();
}

/// Evaluate every solvent bank after this step's loan defaults.
///
/// A bank whose equity ends negative fails on credit and is unwound in the
/// same pass. Survivors are classified capitalized when their capital ratio
/// exceeds `car` and uncapitalized when it lies strictly between 0 and `car`;
/// a ratio exactly at `car` or at 0 leaves the flag untouched.
pub fn evaluate_solvency(
    registry: &mut Registry,
    reserve_rate: f64,
    mode: LiquidationMode,
    car: f64,
    rng: &mut StdRng,
) -> SolvencyReport {
    let mut report = SolvencyReport::default();

    for bank in registry.solvent_banks() {
        let defaulted = apply_credit_losses(registry, bank, rng);
        report.defaulted.extend(defaulted);
        book_net_interest_income(registry, bank, reserve_rate);

        if registry.banks[bank].equity < 0.0 {
            let b = &mut registry.banks[bank];
            b.solvent = false;
            b.capitalized = false;
            b.credit_failure = true;
            report.failures.push(unwind_bank(registry, bank, mode, rng));
        } else {
            let b = &mut registry.banks[bank];
            if 0.0 < b.capital_ratio && b.capital_ratio < car {
                b.capitalized = false;
                b.solvent = true;
            } else if b.capital_ratio > car {
                b.capitalized = true;
                b.solvent = true;
            }
            b.refresh_ratios();
        }
    }

    debug!(
        defaults = report.defaulted.len(),
        failures = report.failures.len(),
        "solvency evaluated"
    );
    report
}
