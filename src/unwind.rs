use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::info;

use crate::agents::{BankId, SaverId};
use crate::model::LiquidationMode;
use crate::registry::Registry;

/// What happened when a failed bank was wound down.
#[derive(Debug, Clone, PartialEq)]
pub struct UnwindReport {
    pub bank: BankId,
    /// ceil(reserves + loan proceeds + provisions + equity)
    pub recovered_funds: f64,
    pub loans_liquidated: usize,
    pub accounts_closed: usize,
    /// Savers left unpaid (balance zeroed)
    pub savers_wiped: usize,
}

/// Liquidate an insolvent or illiquid bank.
///
/// Every account at the bank is closed and every performing loan is sold.
/// Savers are repaid out of the recovered funds counted per head: when the
/// funds fall short of the saver count, `ceil(savers - funds)` randomly
/// chosen savers lose their balance, and all of them do when the funds are
/// negative. The bank is left as a zeroed, permanently insolvent record.
pub fn unwind_bank(
    registry: &mut Registry,
    bank: BankId,
    mode: LiquidationMode,
    rng: &mut StdRng,
) -> UnwindReport {
    let loans = registry.performing_loans(bank);
    let savers: Vec<SaverId> = registry.account_holders(bank);
    for &s in &savers {
        registry.savers[s].owns_account = false;
    }

    let proceeds: f64 = match mode {
        LiquidationMode::Orderly => loans.iter().map(|&l| registry.loans[l].recovery()).sum(),
        LiquidationMode::FireSale => loans
            .iter()
            .map(|&l| {
                let loan = &registry.loans[l];
                (1.0 - loan.fire_sale_loss) * loan.amount
            })
            .sum(),
    };

    let b = &registry.banks[bank];
    // equity is negative here, so provisions + equity < provisions
    let recovered_funds = (b.reserves + proceeds + b.provisions + b.equity).ceil();

    let headcount = savers.len() as f64;
    let mut savers_wiped = 0;
    if recovered_funds < 0.0 {
        for &s in &savers {
            registry.savers[s].wipe_out();
        }
        savers_wiped = savers.len();
    } else if recovered_funds > 0.0 && recovered_funds < headcount {
        let unpaid = (headcount - recovered_funds).ceil() as usize;
        let chosen: Vec<SaverId> = savers.choose_multiple(rng, unpaid).copied().collect();
        for s in chosen {
            registry.savers[s].wipe_out();
        }
        savers_wiped = unpaid;
    }

    for &l in &loans {
        registry.liquidate_loan(l);
    }

    let remaining_loans: f64 = registry
        .performing_loans(bank)
        .iter()
        .map(|&l| registry.loans[l].amount)
        .sum();
    let remaining_deposits = registry.balance_of(&registry.account_holders(bank));

    let b = &mut registry.banks[bank];
    b.loans = remaining_loans;
    b.deposits = remaining_deposits;
    b.mark_unwound();
    b.update_total_assets();

    info!(
        bank,
        recovered_funds,
        loans = loans.len(),
        savers = savers.len(),
        savers_wiped,
        "insolvent bank unwound"
    );

    UnwindReport {
        bank,
        recovered_funds,
        loans_liquidated: loans.len(),
        accounts_closed: savers.len(),
        savers_wiped,
    }
}
