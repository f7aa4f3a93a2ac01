use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use crate::agents::{safe_div, BankId, SaverId};
use crate::model::LiquidationMode;
use crate::registry::Registry;
use crate::unwind::{unwind_bank, UnwindReport};

/// One borrower's trip to the interbank market.
#[derive(Debug, Clone, PartialEq)]
pub struct AuctionResult {
    pub borrower: BankId,
    pub needed: f64,
    pub available: f64,
    pub borrowed: f64,
    pub lenders: Vec<(BankId, f64)>,
}

impl AuctionResult {
    pub fn shortfall(&self) -> f64 {
        (self.needed - self.borrowed).max(0.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LiquidityReport {
    pub withdrawals: usize,
    pub reassigned: usize,
    pub bank_runs: Vec<UnwindReport>,
    pub auctions: Vec<AuctionResult>,
}

/// Each account-holding, solvent saver at a solvent bank closes its account
/// with its own withdrawal probability. The saver becomes unbanked and its
/// balance is booked as the bank's outflow.
pub fn process_deposit_withdrawal(registry: &mut Registry, rng: &mut StdRng) -> usize {
    let mut withdrawals = 0;
    for bank in registry.solvent_banks() {
        let savers: Vec<SaverId> = registry
            .savers_of(bank)
            .iter()
            .copied()
            .filter(|&s| registry.savers[s].owns_account && registry.savers[s].solvent)
            .collect();
        debug!(bank, savers = savers.len(), "deposit withdrawal");

        let mut outflow = 0.0;
        for s in savers {
            let saver = &mut registry.savers[s];
            if rng.gen::<f64>() < saver.withdraw_prob {
                saver.bank = None;
                saver.owns_account = false;
                outflow += saver.balance;
                withdrawals += 1;
            }
        }
        registry.banks[bank].deposit_outflow += outflow;
    }
    withdrawals
}

/// Move every unbanked saver to a bank drawn uniformly from the solvent,
/// capitalized banks, or from all solvent banks when none is capitalized.
/// Each solvent bank's inflow is what the reassigned savers brought it.
///
/// With no solvent bank left, unbanked savers stay where they are.
pub fn process_deposit_reassignment(registry: &mut Registry, rng: &mut StdRng) -> usize {
    let mut targets: Vec<BankId> = registry
        .banks
        .iter()
        .filter(|b| b.solvent && b.capitalized)
        .map(|b| b.id)
        .collect();
    if targets.is_empty() {
        targets = registry.solvent_banks();
    }

    let unbanked: Vec<SaverId> = registry
        .savers
        .iter()
        .filter(|s| s.bank.is_none())
        .map(|s| s.id)
        .collect();

    let mut reassigned = Vec::with_capacity(unbanked.len());
    for s in unbanked {
        if let Some(&bank) = targets.choose(rng) {
            registry.move_saver(s, bank);
            reassigned.push(s);
        }
    }

    for bank in registry.solvent_banks() {
        let inflow: f64 = reassigned
            .iter()
            .map(|&s| &registry.savers[s])
            .filter(|s| s.home == bank && s.owns_account)
            .map(|s| s.balance)
            .sum();
        let b = &mut registry.banks[bank];
        b.deposit_inflow = inflow;
        b.net_deposit_flow = b.deposit_inflow - b.deposit_outflow;
    }
    reassigned.len()
}

/// Book each solvent bank's net deposit flow against deposits and reserves,
/// then clear the flow accumulators.
pub fn process_deposit_flow_rebalancing(registry: &mut Registry) {
    for b in registry.banks.iter_mut().filter(|b| b.solvent) {
        b.deposits += b.net_deposit_flow;
        b.reserves += b.net_deposit_flow;
        b.update_reserves_ratio();
        b.update_total_assets();
        b.deposit_inflow = 0.0;
        b.deposit_outflow = 0.0;
        b.net_deposit_flow = 0.0;
    }
}

/// Cover `borrower`'s reserve shortfall from banks holding reserves above
/// their buffered minimum.
///
/// Each lender gives in proportion to its excess reserves and gets an
/// interbank loan at `libor_rate` for the amount, even when the amount is 0.
/// The borrower takes the smaller of what it needs and what is on offer.
pub fn access_interbank_market(
    registry: &mut Registry,
    borrower: BankId,
    car: f64,
    min_reserves_ratio: f64,
    libor_rate: f64,
) -> AuctionResult {
    let lenders: Vec<(BankId, f64)> = registry
        .banks
        .iter()
        .filter(|b| {
            b.id != borrower
                && b.solvent
                && b.capital_ratio >= car
                && b.reserves_ratio > b.desired_reserves_ratio(min_reserves_ratio)
        })
        .map(|b| (b.id, b.excess_reserves(min_reserves_ratio)))
        .collect();

    let b = &registry.banks[borrower];
    let needed = min_reserves_ratio * b.deposits - b.reserves;
    let available: f64 = lenders.iter().map(|&(_, excess)| excess).sum();
    let request = needed.min(available);

    let mut contributions = Vec::with_capacity(lenders.len());
    for (lender, excess) in lenders {
        let contribution = safe_div(excess * request, available);
        let l = &mut registry.banks[lender];
        l.reserves -= contribution;
        l.ib.credits += contribution;
        l.update_reserves_ratio();
        l.update_total_assets();
        registry.add_interbank_loan(lender, borrower, contribution, libor_rate);
        contributions.push((lender, contribution));
    }

    let b = &mut registry.banks[borrower];
    b.ib.debits = request;
    b.reserves += request;
    b.update_reserves_ratio();
    b.update_total_assets();

    if needed > available {
        warn!(
            bank = borrower,
            needed,
            available,
            "interbank market cannot cover reserve shortfall"
        );
    }

    AuctionResult {
        borrower,
        needed,
        available,
        borrowed: request,
        lenders: contributions,
    }
}

/// Unwind every bank whose reserves went negative, then send solvent banks
/// that sit below the minimum reserve ratio but meet `car` to the interbank
/// market. A bank with no deposits has nothing to borrow against.
pub fn process_evaluate_liquidity_needs(
    registry: &mut Registry,
    car: f64,
    min_reserves_ratio: f64,
    libor_rate: f64,
    mode: LiquidationMode,
    rng: &mut StdRng,
) -> (Vec<UnwindReport>, Vec<AuctionResult>) {
    for b in registry.banks.iter_mut().filter(|b| b.solvent) {
        b.update_reserves_ratio();
    }

    let runs: Vec<BankId> = registry
        .banks
        .iter()
        .filter(|b| b.solvent && b.reserves_ratio < 0.0)
        .map(|b| b.id)
        .collect();
    let mut bank_runs = Vec::with_capacity(runs.len());
    for bank in runs {
        bank_runs.push(unwind_bank(registry, bank, mode, rng));
        registry.banks[bank].liquidity_failure = true;
    }

    let borrowers: Vec<BankId> = registry
        .banks
        .iter()
        .filter(|b| {
            b.solvent
                && b.reserves_ratio < min_reserves_ratio
                && b.capital_ratio >= car
                && min_reserves_ratio * b.deposits > b.reserves
        })
        .map(|b| b.id)
        .collect();
    let auctions = borrowers
        .into_iter()
        .map(|bank| access_interbank_market(registry, bank, car, min_reserves_ratio, libor_rate))
        .collect();

    (bank_runs, auctions)
}

/// Run the deposit shock and liquidity resolution for one step.
///
/// Withdrawal, reassignment and rebalancing leave system deposits unchanged;
/// only bank runs and the interbank market move liquidity between banks.
pub fn evaluate_liquidity(
    registry: &mut Registry,
    car: f64,
    min_reserves_ratio: f64,
    libor_rate: f64,
    mode: LiquidationMode,
    rng: &mut StdRng,
) -> LiquidityReport {
    let withdrawals = process_deposit_withdrawal(registry, rng);
    let reassigned = process_deposit_reassignment(registry, rng);
    process_deposit_flow_rebalancing(registry);
    let (bank_runs, auctions) =
        process_evaluate_liquidity_needs(registry, car, min_reserves_ratio, libor_rate, mode, rng);

    debug!(
        withdrawals,
        reassigned,
        bank_runs = bank_runs.len(),
        auctions = auctions.len(),
        "liquidity evaluated"
    );
    LiquidityReport {
        withdrawals,
        reassigned,
        bank_runs,
        auctions,
    }
}
