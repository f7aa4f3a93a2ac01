use tracing::debug;

use crate::agents::{safe_div, BankId};
use crate::registry::Registry;

#[derive(Debug, Clone, PartialEq)]
pub struct DividendPayment {
    pub bank: BankId,
    pub amount: f64,
    /// True when the payout needed deleveraging instead of coming straight
    /// out of excess reserves
    pub deleveraged: bool,
    pub loans_shed: usize,
}

/// Pay out capital above each bank's upper bound.
///
/// Only banks whose capital ratio exceeds `car` and has reached their upper
/// bound pay. When the excess capital fits inside the excess reserves it is
/// paid in full and equity drops to the target. Otherwise reserves are drawn
/// to their floor and the bank sells performing loans at par while the
/// capital ratio stays in `[upper_bound, running_ratio)`.
///
/// Every bank's period dividend is reset first; the cumulative figure carries
/// across the run.
pub fn pay_dividends(registry: &mut Registry, car: f64, min_reserves_ratio: f64) -> Vec<DividendPayment> {
    for b in registry.banks.iter_mut() {
        b.dividend = 0.0;
    }

    let payers: Vec<BankId> = registry
        .banks
        .iter()
        .filter(|b| b.capital_ratio > car && b.capital_ratio >= b.upper_bound_cratio)
        .map(|b| b.id)
        .collect();

    let mut payments = Vec::with_capacity(payers.len());
    for bank in payers {
        let b = &mut registry.banks[bank];
        let target_capital = b.upper_bound_cratio * b.rwa;
        let excess_capital = b.equity - target_capital;
        let reserves_floor = min_reserves_ratio * b.deposits * b.buffer_reserves_ratio;
        let excess_reserves = b.reserves - reserves_floor;

        if excess_capital < excess_reserves {
            b.reserves -= excess_capital;
            b.dividend = excess_capital;
            b.cum_dividend += b.dividend;
            b.equity = target_capital;
            b.refresh_ratios();
            payments.push(DividendPayment {
                bank,
                amount: b.dividend,
                deleveraged: false,
                loans_shed: 0,
            });
            continue;
        }

        b.reserves = reserves_floor;
        b.update_reserves_ratio();
        let upper_bound = b.upper_bound_cratio;
        let starting_equity = b.equity;
        let mut interim_equity = b.equity;
        let mut interim_rwa = b.rwa;
        let mut interim_ratio = b.capital_ratio;
        let mut interim_loans = b.loans;
        let mut loans_shed = 0;

        for id in registry.performing_loans(bank) {
            let loan = &mut registry.loans[id];
            // orderly sale: a bank paying dividends is not distressed
            let equity = interim_equity;
            let rwa = interim_rwa - loan.rw_amount();
            let ratio = safe_div(equity, rwa);
            if upper_bound <= ratio && ratio < interim_ratio && equity > 0.0 && rwa > 0.0 {
                interim_equity = equity;
                interim_rwa = rwa;
                interim_ratio = ratio;
                interim_loans -= loan.amount;
                loan.dumped = true;
                loan.approved = false;
                loans_shed += 1;
            }
        }

        let b = &mut registry.banks[bank];
        b.dividend = starting_equity - interim_equity;
        b.cum_dividend += b.dividend;
        b.equity = interim_equity;
        b.rwa = interim_rwa;
        b.loans = interim_loans;
        b.reserves -= b.dividend;
        b.refresh_ratios();
        payments.push(DividendPayment {
            bank,
            amount: b.dividend,
            deleveraged: true,
            loans_shed,
        });
    }

    debug!(
        payers = payments.len(),
        total = payments.iter().map(|p| p.amount).sum::<f64>(),
        "dividends paid"
    );
    payments
}
