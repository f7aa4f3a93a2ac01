use tracing::debug;

use crate::agents::{safe_div, BankId, LoanId};
use crate::registry::Registry;

/// Return defaulted loans to the pool of loans available for origination.
///
/// Returns the number of loans reset. A second call right after the first
/// finds nothing to reset.
pub fn reset_insolvent_loans(registry: &mut Registry) -> usize {
    let mut reset = 0;
    for loan in registry.loans.iter_mut() {
        if loan.approved && !loan.solvent {
            loan.solvent = true;
            loan.approved = false;
            reset += 1;
        }
    }
    reset
}

/// Balance sheet carried through one bank's lending decisions.
struct Book {
    equity: f64,
    rwa: f64,
    reserves: f64,
    deposits: f64,
    loans: f64,
    provisions: f64,
}

impl Book {
    fn of(registry: &Registry, bank: BankId) -> Self {
        let b = &registry.banks[bank];
        Book {
            equity: b.equity,
            rwa: b.rwa,
            reserves: b.reserves,
            deposits: b.deposits,
            loans: b.loans,
            provisions: b.provisions,
        }
    }

    /// Originate the loan if, after booking its provision, the capital ratio
    /// stays above `car` and the reserve ratio above `reserves_floor`.
    fn try_originate(
        &mut self,
        registry: &mut Registry,
        loan: LoanId,
        car: f64,
        reserves_floor: f64,
    ) -> bool {
        let l = &registry.loans[loan];
        let provision = l.expected_loss();
        let rw = l.rw_amount();
        let amount = l.amount;

        let capital_ratio = safe_div(self.equity - provision, self.rwa + rw);
        let reserves_ratio = safe_div(self.reserves - provision - amount, self.deposits);
        if capital_ratio > car && reserves_ratio > reserves_floor {
            self.rwa += rw;
            self.equity -= provision;
            self.reserves -= amount + provision;
            self.loans += amount;
            self.provisions += provision;
            registry.loans[loan].approved = true;
            true
        } else {
            false
        }
    }

    fn commit(self, registry: &mut Registry, bank: BankId) {
        let b = &mut registry.banks[bank];
        b.rwa = self.rwa;
        b.reserves = self.reserves;
        b.loans = self.loans;
        b.equity = self.equity;
        b.provisions = self.provisions;
        // recomputed from the final figures, not the last candidate tested
        b.capital_ratio = safe_div(self.equity, self.rwa);
        b.update_reserves_ratio();
        b.update_total_assets();
        b.update_leverage_ratio();
    }
}

fn capitalized_banks(registry: &Registry) -> Vec<BankId> {
    registry
        .banks
        .iter()
        .filter(|b| b.capitalized)
        .map(|b| b.id)
        .collect()
}

/// Each capitalized bank lends from its own pool of available loans, in book
/// order, keeping its reserve ratio above the buffered minimum.
pub fn build_loan_book_locally(registry: &mut Registry, min_reserves_ratio: f64, car: f64) -> usize {
    let mut originated = 0;
    for bank in capitalized_banks(registry) {
        let floor = registry.banks[bank].desired_reserves_ratio(min_reserves_ratio);
        let mut book = Book::of(registry, bank);
        for loan in registry.available_loans(bank) {
            if book.try_originate(registry, loan, car, floor) {
                originated += 1;
            }
        }
        book.commit(registry, bank);
    }
    debug!(originated, "local loan books built");
    originated
}

/// Offer the available loans of failed, uncapitalized banks to every
/// capitalized bank against the plain minimum reserve ratio. Accepted loans
/// move to the lender's book. A loan taken by one bank is not offered again.
pub fn build_loan_book_globally(registry: &mut Registry, car: f64, min_reserves_ratio: f64) -> usize {
    let lenders = capitalized_banks(registry);
    let pool: Vec<LoanId> = registry
        .banks
        .iter()
        .filter(|b| !b.capitalized && !b.solvent)
        .flat_map(|b| registry.available_loans(b.id))
        .collect();

    let mut originated = 0;
    for bank in lenders {
        let mut book = Book::of(registry, bank);
        for &loan in &pool {
            if !registry.loans[loan].is_available() {
                continue;
            }
            if book.try_originate(registry, loan, car, min_reserves_ratio) {
                registry.reassign_loan(loan, bank);
                originated += 1;
            }
        }
        book.commit(registry, bank);
    }
    debug!(pool = pool.len(), originated, "global loan books built");
    originated
}
