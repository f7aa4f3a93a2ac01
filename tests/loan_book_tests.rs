use approx::assert_relative_eq;
use banksim::agents::*;
use banksim::loan_book::{build_loan_book_globally, build_loan_book_locally, reset_insolvent_loans};
use banksim::market::{initialize_deposit_base, initialize_loan_book};
use banksim::registry::Registry;

/// Banks with equity 100 and one depositor of 1000 each, no loans yet.
fn banks(n: usize) -> Registry {
    let mut reg = Registry::new();
    for _ in 0..n {
        let id = reg.add_bank(&BankParams {
            equity: 100.0,
            deposit_rate: 0.01,
            upper_bound_cratio: 0.12,
            buffer_reserves_ratio: 1.5,
        });
        reg.add_saver(
            id,
            &SaverTerms {
                balance: 1000.0,
                withdraw_prob: 0.0,
                exit_prob: 0.0,
            },
        );
    }
    initialize_deposit_base(&mut reg);
    initialize_loan_book(&mut reg, 0.08, 0.03);
    reg
}

fn offer(reg: &mut Registry, bank: BankId, count: usize, amount: f64, pdef: f64) -> Vec<LoanId> {
    let terms = LoanTerms {
        amount,
        pdef,
        recovery_rate: 0.4,
        fire_sale_loss: 0.0,
    };
    (0..count).map(|_| reg.add_loan(bank, &terms, 0.01)).collect()
}

// ═══════════════════════════════════════════════════════════════════════
// Reset
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_reset_is_idempotent() {
    let mut reg = banks(1);
    let ids = offer(&mut reg, 0, 4, 10.0, 0.05);
    for &id in &ids[..2] {
        reg.loans[id].approved = true;
        reg.loans[id].solvent = false;
    }
    reg.loans[ids[2]].approved = true;

    assert_eq!(reset_insolvent_loans(&mut reg), 2);
    let after_first: Vec<(bool, bool)> = reg.loans.iter().map(|l| (l.approved, l.solvent)).collect();
    assert_eq!(after_first, vec![(false, true), (false, true), (true, true), (false, true)]);

    assert_eq!(reset_insolvent_loans(&mut reg), 0);
    let after_second: Vec<(bool, bool)> = reg.loans.iter().map(|l| (l.approved, l.solvent)).collect();
    assert_eq!(after_first, after_second);
}

// ═══════════════════════════════════════════════════════════════════════
// Local loan book
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_local_book_stops_at_car() {
    // each loan: rw 100, provision 0.1 * 60 = 6
    let mut reg = banks(1);
    offer(&mut reg, 0, 10, 100.0, 0.1);

    let originated = build_loan_book_locally(&mut reg, 0.03, 0.08);

    assert_eq!(originated, 7);
    let bank = &reg.banks[0];
    assert_relative_eq!(bank.rwa, 700.0, epsilon = 1e-9);
    assert_relative_eq!(bank.equity, 58.0, epsilon = 1e-9);
    assert_relative_eq!(bank.provisions, 42.0, epsilon = 1e-9);
    assert_relative_eq!(bank.loans, 700.0, epsilon = 1e-9);
    assert_relative_eq!(bank.reserves, 358.0, epsilon = 1e-9);
    assert_relative_eq!(bank.capital_ratio, 58.0 / 700.0, epsilon = 1e-12);
    assert_eq!(bank.total_assets, bank.reserves + bank.loans);
    assert!(bank.capital_ratio > 0.08);
}

#[test]
fn test_local_book_skips_uncapitalized_banks() {
    let mut reg = banks(1);
    reg.banks[0].capitalized = false;
    offer(&mut reg, 0, 3, 10.0, 0.0);

    assert_eq!(build_loan_book_locally(&mut reg, 0.03, 0.08), 0);
    assert!(reg.loans.iter().all(|l| !l.approved));
}

// ═══════════════════════════════════════════════════════════════════════
// Global loan book
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_global_book_moves_loans_from_failed_banks() {
    let mut reg = banks(3);
    let pool = offer(&mut reg, 0, 3, 100.0, 0.0);
    reg.banks[0].solvent = false;
    reg.banks[0].capitalized = false;

    let originated = build_loan_book_globally(&mut reg, 0.08, 0.03);

    assert_eq!(originated, 3);
    assert!(reg.loans_of(0).is_empty());
    assert_eq!(reg.loans_of(1), pool.as_slice());
    assert!(reg.loans_of(2).is_empty(), "a loan is only taken once");
    for &id in &pool {
        assert_eq!(reg.loans[id].bank, Some(1));
        assert!(reg.loans[id].approved);
    }
    assert_relative_eq!(reg.banks[1].loans, 300.0);
    assert_relative_eq!(reg.banks[1].reserves, 800.0);
}

#[test]
fn test_global_book_uses_unbuffered_reserve_floor() {
    let mut reg = banks(2);
    // lender reserves of 140: one loan of 100 leaves a ratio of 0.04
    reg.banks[1].reserves = 140.0;
    reg.banks[1].refresh_ratios();
    offer(&mut reg, 1, 1, 100.0, 0.0);
    let pool = offer(&mut reg, 0, 1, 100.0, 0.0);
    reg.banks[0].solvent = false;
    reg.banks[0].capitalized = false;

    // 0.04 is under the buffered floor of 0.045
    assert_eq!(build_loan_book_locally(&mut reg, 0.03, 0.08), 0);
    // but clears the plain minimum of 0.03
    assert_eq!(build_loan_book_globally(&mut reg, 0.08, 0.03), 1);
    assert_eq!(reg.loans[pool[0]].bank, Some(1));
}

#[test]
fn test_global_book_ignores_solvent_uncapitalized_banks() {
    let mut reg = banks(2);
    offer(&mut reg, 0, 2, 10.0, 0.0);
    reg.banks[0].capitalized = false;

    assert_eq!(build_loan_book_globally(&mut reg, 0.08, 0.03), 0);
    assert_eq!(reg.loans_of(0).len(), 2);
}
