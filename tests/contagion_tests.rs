use approx::assert_relative_eq;
use banksim::agents::*;
use banksim::contagion::{default_max_passes, resolve_second_round_effects};
use banksim::error::SimError;
use banksim::market::initialize_deposit_base;
use banksim::model::LiquidationMode;
use banksim::registry::Registry;
use rand::rngs::StdRng;
use rand::SeedableRng;

const RATE: f64 = 0.01;

/// Banks with no loans; reserves start at equity + deposits.
fn network(banks: &[(f64, f64)]) -> Registry {
    let mut reg = Registry::new();
    for &(equity, deposits) in banks {
        let id = reg.add_bank(&BankParams {
            equity,
            deposit_rate: 0.0,
            upper_bound_cratio: 0.12,
            buffer_reserves_ratio: 1.5,
        });
        if deposits > 0.0 {
            reg.add_saver(
                id,
                &SaverTerms {
                    balance: deposits,
                    withdraw_prob: 0.0,
                    exit_prob: 0.0,
                },
            );
        }
    }
    initialize_deposit_base(&mut reg);
    for b in reg.banks.iter_mut() {
        b.refresh_ratios();
    }
    reg
}

fn resolve(reg: &mut Registry, max_passes: usize) -> banksim::Result<banksim::contagion::ContagionReport> {
    let mut rng = StdRng::seed_from_u64(5);
    resolve_second_round_effects(reg, LiquidationMode::FireSale, 0.08, max_passes, &mut rng)
}

#[test]
fn test_settlement_between_solvent_banks() {
    let mut reg = network(&[(100.0, 0.0), (100.0, 0.0)]);
    reg.add_interbank_loan(0, 1, 10.0, RATE);

    let report = resolve(&mut reg, 100).unwrap();

    assert_eq!(report.passes, 1);
    assert!(report.failures.is_empty());
    assert_eq!(report.loans_retired, 1);

    let creditor = &reg.banks[0];
    let debtor = &reg.banks[1];
    assert_relative_eq!(creditor.equity, 100.1, epsilon = 1e-9);
    assert_relative_eq!(creditor.reserves, 110.1, epsilon = 1e-9);
    assert_relative_eq!(debtor.equity, 99.9, epsilon = 1e-9);
    assert_relative_eq!(debtor.reserves, 89.9, epsilon = 1e-9);

    // income and expense carry the (1 + rate) multiplier
    assert_relative_eq!(creditor.ib_last.interest_income, 10.1, epsilon = 1e-9);
    assert_relative_eq!(debtor.ib_last.interest_expense, 10.1, epsilon = 1e-9);
    assert_eq!(creditor.ib, InterbankLedger::default());

    assert!(reg.interbank_loans.is_empty());
    assert_eq!(reg.network.edge_count(), 0);
}

#[test]
fn test_failed_debtor_restarts_pass() {
    // bank 1 cannot repay: reserves 1 against 10.1 owed
    let mut reg = network(&[(100.0, 0.0), (1.0, 0.0)]);
    reg.add_interbank_loan(0, 1, 10.0, RATE);

    let report = resolve(&mut reg, 100).unwrap();

    assert_eq!(report.passes, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].bank, 1);
    assert!(!reg.banks[1].solvent);
    assert!(reg.banks[0].solvent);
    // second pass: nothing collectable, so no net income to book
    assert_relative_eq!(reg.banks[0].ib_last.credit_loss, 10.0);
    assert_relative_eq!(reg.banks[0].equity, 100.1, epsilon = 1e-9);
}

#[test]
fn test_credit_loss_booked_against_surviving_income() {
    // bank 0 lends 10 to bank 1 (fails) and 20 to bank 2 (survives)
    let mut reg = network(&[(100.0, 0.0), (1.0, 0.0), (100.0, 0.0)]);
    reg.add_interbank_loan(0, 1, 10.0, RATE);
    reg.add_interbank_loan(0, 2, 20.0, RATE);

    let report = resolve(&mut reg, 100).unwrap();

    assert_eq!(report.passes, 2);
    assert_eq!(report.loans_retired, 2);

    // pass 1 books +0.3; pass 2 books 0.3 interest less the 10 lost
    let lender = &reg.banks[0];
    assert!(lender.solvent);
    assert_relative_eq!(lender.equity, 90.6, epsilon = 1e-9);
    assert_relative_eq!(lender.reserves, 150.6, epsilon = 1e-9);

    let survivor = &reg.banks[2];
    assert_relative_eq!(survivor.equity, 99.6, epsilon = 1e-9);
    assert_relative_eq!(survivor.reserves, 59.6, epsilon = 1e-9);
}

#[test]
fn test_cascade_terminates_with_every_bank_failed() {
    // a ring of thinly capitalized banks each owing more than it holds
    let mut reg = network(&[(1.0, 0.0), (1.0, 0.0), (1.0, 0.0)]);
    reg.add_interbank_loan(0, 1, 5.0, RATE);
    reg.add_interbank_loan(1, 2, 5.0, RATE);
    reg.add_interbank_loan(2, 0, 5.0, RATE);

    let report = resolve(&mut reg, default_max_passes(3)).unwrap();

    assert!(reg.banks.iter().all(|b| !b.solvent));
    assert_eq!(report.failures.len(), 3);
    assert!(report.passes <= 4);
    assert!(reg.interbank_loans.is_empty());
}

#[test]
fn test_pass_bound_reports_non_convergence() {
    let mut reg = network(&[(100.0, 0.0), (1.0, 0.0)]);
    reg.add_interbank_loan(0, 1, 10.0, RATE);

    let err = resolve(&mut reg, 1).unwrap_err();
    match err {
        SimError::NonConvergence { passes, solvent_banks } => {
            assert_eq!(passes, 1);
            assert_eq!(solvent_banks, 1);
        }
        other => panic!("expected non-convergence, got {other}"),
    }
}

#[test]
fn test_no_interbank_loans_is_a_single_pass() {
    let mut reg = network(&[(100.0, 50.0), (100.0, 50.0)]);
    let before: Vec<f64> = reg.banks.iter().map(|b| b.equity).collect();

    let report = resolve(&mut reg, 1).unwrap();

    assert_eq!(report.passes, 1);
    let after: Vec<f64> = reg.banks.iter().map(|b| b.equity).collect();
    assert_eq!(before, after);
    assert_eq!(default_max_passes(10), 121);
}
