use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::agents::{BankId, LoanTerms, SaverTerms};
use crate::error::{Result, SimError};
use crate::model::SimConfig;

/// Starting state of one bank.
#[derive(Debug, Clone, PartialEq)]
pub struct BankSpec {
    pub equity: f64,
}

/// Initial agent population handed to the simulation.
///
/// Savers and loans are placed at a bank by index. Loans are offered to
/// their bank in the order they appear here.
#[derive(Debug, Clone, Default)]
pub struct Population {
    pub banks: Vec<BankSpec>,
    pub savers: Vec<(BankId, SaverTerms)>,
    pub loans: Vec<(BankId, LoanTerms)>,
}

/// U[0, upper), or a constant 0 when the upper bound is 0.
struct UpperBounded(Option<Uniform<f64>>);

impl UpperBounded {
    fn new(upper: f64) -> Self {
        if upper > 0.0 {
            UpperBounded(Some(Uniform::new(0.0, upper)))
        } else {
            UpperBounded(None)
        }
    }

    fn draw(&self, rng: &mut StdRng) -> f64 {
        match &self.0 {
            Some(dist) => dist.sample(rng),
            None => 0.0,
        }
    }
}

impl Population {
    /// Draw a population from the configured counts and upper bounds.
    ///
    /// Banks are created first, then savers, then loans; savers and loans are
    /// each placed at a uniformly chosen bank.
    pub fn generate(config: &SimConfig, rng: &mut StdRng) -> Result<Self> {
        config.validate()?;
        if config.initial_bank == 0 && (config.initial_saver > 0 || config.initial_loan > 0) {
            return Err(SimError::InvalidConfig(
                "savers and loans need at least one bank".to_string(),
            ));
        }

        let banks = vec![
            BankSpec {
                equity: config.initial_equity
            };
            config.initial_bank
        ];

        let withdraw = UpperBounded::new(config.withdraw_upper);
        let exit = UpperBounded::new(config.exit_upper);
        let mut savers = Vec::with_capacity(config.initial_saver);
        for _ in 0..config.initial_saver {
            let bank = rng.gen_range(0..config.initial_bank);
            let terms = SaverTerms {
                balance: config.saver_balance,
                withdraw_prob: withdraw.draw(rng),
                exit_prob: exit.draw(rng),
            };
            savers.push((bank, terms));
        }

        let pdef = UpperBounded::new(config.pdef_upper);
        let fire_sale = UpperBounded::new(config.fire_sale_upper);
        let mut loans = Vec::with_capacity(config.initial_loan);
        for _ in 0..config.initial_loan {
            let terms = LoanTerms {
                amount: config.loan_amount,
                pdef: pdef.draw(rng),
                recovery_rate: config.recovery_rate,
                fire_sale_loss: fire_sale.draw(rng),
            };
            let bank = rng.gen_range(0..config.initial_bank);
            loans.push((bank, terms));
        }

        Ok(Population {
            banks,
            savers,
            loans,
        })
    }

    /// Check placements and amounts before the registry is built.
    pub fn validate(&self) -> Result<()> {
        let n = self.banks.len();
        for (i, b) in self.banks.iter().enumerate() {
            if !b.equity.is_finite() {
                return Err(SimError::InvalidConfig(format!(
                    "bank {} has non-finite equity",
                    i
                )));
            }
        }
        for (i, (bank, s)) in self.savers.iter().enumerate() {
            if *bank >= n {
                return Err(SimError::InvalidConfig(format!(
                    "saver {} placed at unknown bank {}",
                    i, bank
                )));
            }
            if !(s.balance.is_finite() && s.balance >= 0.0) {
                return Err(SimError::InvalidConfig(format!(
                    "saver {} has invalid balance {}",
                    i, s.balance
                )));
            }
            for p in [s.withdraw_prob, s.exit_prob] {
                if !(0.0..=1.0).contains(&p) {
                    return Err(SimError::InvalidConfig(format!(
                        "saver {} has probability {} outside [0, 1]",
                        i, p
                    )));
                }
            }
        }
        for (i, (bank, l)) in self.loans.iter().enumerate() {
            if *bank >= n {
                return Err(SimError::InvalidConfig(format!(
                    "loan {} placed at unknown bank {}",
                    i, bank
                )));
            }
            if !(l.amount.is_finite() && l.amount >= 0.0) {
                return Err(SimError::InvalidConfig(format!(
                    "loan {} has invalid amount {}",
                    i, l.amount
                )));
            }
            for p in [l.pdef, l.recovery_rate, l.fire_sale_loss] {
                if !(0.0..=1.0).contains(&p) {
                    return Err(SimError::InvalidConfig(format!(
                        "loan {} has rate {} outside [0, 1]",
                        i, p
                    )));
                }
            }
        }
        Ok(())
    }
}
