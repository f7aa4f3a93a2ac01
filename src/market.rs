use crate::agents::safe_div;
use crate::registry::Registry;

/// Open an account for every saver at its home bank and seed each bank's
/// deposit base. Reserves start as deposits plus equity.
pub fn initialize_deposit_base(registry: &mut Registry) {
    for bank in 0..registry.bank_count() {
        let savers = registry.savers_of(bank).to_vec();
        for &s in &savers {
            let saver = &mut registry.savers[s];
            saver.bank = Some(bank);
            saver.owns_account = true;
        }
        let deposits = registry.balance_of(&savers);
        let b = &mut registry.banks[bank];
        b.deposits = deposits;
        b.reserves = deposits + b.equity;
    }
}

/// Seed each bank's loan book.
///
/// Available loans are approved greedily in creation order while the
/// running RWA stays under `equity / (1.1 * car)` and the running reserve
/// ratio stays above the bank's buffered minimum. Both conditions are
/// checked before each approval, so the last approval may overshoot.
pub fn initialize_loan_book(registry: &mut Registry, car: f64, min_reserves_ratio: f64) {
    for bank in 0..registry.bank_count() {
        let (deposits, desired_ratio) = {
            let b = &mut registry.banks[bank];
            b.reserves = b.equity + b.deposits;
            b.update_reserves_ratio();
            b.max_rwa = b.equity / (1.1 * car);
            (b.deposits, b.desired_reserves_ratio(min_reserves_ratio))
        };
        let max_rwa = registry.banks[bank].max_rwa;
        let mut interim_reserves = registry.banks[bank].reserves;
        let mut interim_reserves_ratio = registry.banks[bank].reserves_ratio;
        let mut rwa = 0.0;
        let mut booked = 0.0;

        for id in registry.available_loans(bank) {
            if rwa < max_rwa && interim_reserves_ratio > desired_ratio {
                let loan = &mut registry.loans[id];
                interim_reserves -= loan.amount;
                interim_reserves_ratio = safe_div(interim_reserves, deposits);
                loan.approved = true;
                booked += loan.amount;
                rwa += loan.rw_amount();
            }
        }

        let provisions: f64 = registry
            .performing_loans(bank)
            .iter()
            .map(|&id| registry.loans[id].expected_loss())
            .sum();

        let b = &mut registry.banks[bank];
        b.loans = booked;
        b.rwa = rwa;
        b.reserves = b.deposits + b.equity - b.loans;
        b.provisions = provisions;
        b.solvent = true;
        b.refresh_ratios();
    }
}
