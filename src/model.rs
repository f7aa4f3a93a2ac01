use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agents::BankParams;
use crate::contagion::{default_max_passes, resolve_second_round_effects};
use crate::dividends::pay_dividends;
use crate::error::{Result, SimError};
use crate::liquidity::evaluate_liquidity;
use crate::loan_book::{build_loan_book_globally, build_loan_book_locally, reset_insolvent_loans};
use crate::market::{initialize_deposit_base, initialize_loan_book};
use crate::output::RunSummary;
use crate::population::Population;
use crate::registry::Registry;
use crate::risk_weight::optimize_risk_weights;
use crate::snapshot::{BankSnapshot, InterbankSnapshot, SnapshotSink, StepRecord};
use crate::solvency::evaluate_solvency;

/// How a failed bank's loan book is turned into cash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquidationMode {
    /// Loans fetch their recovery value
    Orderly,
    /// Loans fetch par less their fire-sale loss
    #[default]
    FireSale,
}

/// Run-level parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub initial_bank: usize,
    pub initial_saver: usize,
    pub initial_loan: usize,
    pub initial_equity: f64,
    /// Risk-free rate. Deposits pay it, reserves earn half of it and the
    /// interbank market lends at it.
    pub rfree: f64,
    /// Capital adequacy ratio
    pub car: f64,
    pub min_reserves_ratio: f64,
    pub buffer_reserves_ratio: f64,
    /// Dividends are paid above `upper_bound_multiplier * car`
    pub upper_bound_multiplier: f64,
    pub liquidation_mode: LiquidationMode,
    pub saver_balance: f64,
    pub loan_amount: f64,
    pub pdef_upper: f64,
    pub recovery_rate: f64,
    pub fire_sale_upper: f64,
    pub withdraw_upper: f64,
    pub exit_upper: f64,
    pub max_steps: usize,
    pub seed: u64,
    /// Overrides the contagion pass bound of `(banks + 1)^2`
    pub contagion_max_passes: Option<usize>,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            initial_bank: 10,
            initial_saver: 10000,
            initial_loan: 20000,
            initial_equity: 100.0,
            rfree: 0.01,
            car: 0.08,
            min_reserves_ratio: 0.03,
            buffer_reserves_ratio: 1.5,
            upper_bound_multiplier: 1.5,
            liquidation_mode: LiquidationMode::FireSale,
            saver_balance: 1.0,
            loan_amount: 1.0,
            pdef_upper: 0.1,
            recovery_rate: 0.4,
            fire_sale_upper: 0.1,
            withdraw_upper: 0.2,
            exit_upper: 0.2,
            max_steps: 240,
            seed: 42,
            contagion_max_passes: None,
        }
    }
}

impl SimConfig {
    pub fn reserve_rate(&self) -> f64 {
        self.rfree / 2.0
    }

    pub fn libor_rate(&self) -> f64 {
        self.rfree
    }

    pub fn upper_bound_cratio(&self) -> f64 {
        self.upper_bound_multiplier * self.car
    }

    pub fn bank_params(&self, equity: f64) -> BankParams {
        BankParams {
            equity,
            deposit_rate: self.rfree,
            upper_bound_cratio: self.upper_bound_cratio(),
            buffer_reserves_ratio: self.buffer_reserves_ratio,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let finite = [
            ("initial_equity", self.initial_equity),
            ("rfree", self.rfree),
            ("car", self.car),
            ("min_reserves_ratio", self.min_reserves_ratio),
            ("buffer_reserves_ratio", self.buffer_reserves_ratio),
            ("upper_bound_multiplier", self.upper_bound_multiplier),
            ("saver_balance", self.saver_balance),
            ("loan_amount", self.loan_amount),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(SimError::InvalidConfig(format!("{} must be finite, got {}", name, value)));
            }
        }
        for (name, value) in [
            ("initial_equity", self.initial_equity),
            ("rfree", self.rfree),
            ("car", self.car),
            ("min_reserves_ratio", self.min_reserves_ratio),
            ("buffer_reserves_ratio", self.buffer_reserves_ratio),
            ("saver_balance", self.saver_balance),
            ("loan_amount", self.loan_amount),
        ] {
            if value < 0.0 {
                return Err(SimError::InvalidConfig(format!("{} must be non-negative, got {}", name, value)));
            }
        }
        for (name, value) in [
            ("recovery_rate", self.recovery_rate),
            ("fire_sale_upper", self.fire_sale_upper),
            ("withdraw_upper", self.withdraw_upper),
            ("exit_upper", self.exit_upper),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SimError::InvalidConfig(format!("{} must lie in [0, 1], got {}", name, value)));
            }
        }
        if !(0.0..1.0).contains(&self.pdef_upper) {
            return Err(SimError::InvalidConfig(format!(
                "pdef_upper must lie in [0, 1), got {}",
                self.pdef_upper
            )));
        }
        if self.contagion_max_passes == Some(0) {
            return Err(SimError::InvalidConfig(
                "contagion_max_passes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: SimConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Step orchestration
// ═══════════════════════════════════════════════════════════════════════

/// Counts of what happened in one step, for logging and summaries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepStats {
    pub defaults: usize,
    pub credit_failures: usize,
    pub contagion_passes: usize,
    pub contagion_failures: usize,
    pub loans_shed: usize,
    pub dividends: f64,
    pub loans_reset: usize,
    pub originated_locally: usize,
    pub originated_globally: usize,
    pub withdrawals: usize,
    pub bank_runs: usize,
    pub auctions: usize,
}

/// A banking network and the run-scoped random stream that drives it.
pub struct BankSim {
    pub config: SimConfig,
    pub registry: Registry,
    pub current_step: usize,
    pub last_stats: StepStats,
    rng: StdRng,
    max_passes: usize,
}

impl BankSim {
    /// Build the network from an explicit population and initialize the
    /// market. The random stream is seeded from `config.seed`.
    pub fn new(config: SimConfig, population: &Population) -> Result<Self> {
        let rng = StdRng::seed_from_u64(config.seed);
        Self::with_rng(config, population, rng)
    }

    /// Draw a population from `config` and build the network from it. The
    /// same random stream is used for the draw and for the run.
    pub fn from_config(config: SimConfig) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let population = Population::generate(&config, &mut rng)?;
        Self::with_rng(config, &population, rng)
    }

    fn with_rng(config: SimConfig, population: &Population, rng: StdRng) -> Result<Self> {
        config.validate()?;
        population.validate()?;

        let mut registry = Registry::new();
        for spec in &population.banks {
            registry.add_bank(&config.bank_params(spec.equity));
        }
        for (home, terms) in &population.savers {
            registry.add_saver(*home, terms);
        }
        for (bank, terms) in &population.loans {
            registry.add_loan(*bank, terms, config.rfree);
        }

        initialize_deposit_base(&mut registry);
        initialize_loan_book(&mut registry, config.car, config.min_reserves_ratio);

        let max_passes = config
            .contagion_max_passes
            .unwrap_or_else(|| default_max_passes(registry.bank_count()));

        let sim = BankSim {
            config,
            registry,
            current_step: 0,
            last_stats: StepStats::default(),
            rng,
            max_passes,
        };
        sim.validate_banks("initialization")?;
        Ok(sim)
    }

    fn validate_banks(&self, phase: &'static str) -> Result<()> {
        for bank in &self.registry.banks {
            bank.validate(phase)?;
        }
        debug!(step = self.current_step, phase, "phase complete");
        Ok(())
    }

    pub fn solvent_bank_count(&self) -> usize {
        self.registry.banks.iter().filter(|b| b.solvent).count()
    }

    pub fn all_banks_failed(&self) -> bool {
        self.solvent_bank_count() == 0
    }

    /// Advance one step through every phase in order and return what the
    /// step left behind. Every bank is validated after each phase.
    pub fn step(&mut self) -> Result<StepRecord> {
        self.current_step += 1;
        let car = self.config.car;
        let min_rr = self.config.min_reserves_ratio;
        let mode = self.config.liquidation_mode;
        let mut stats = StepStats::default();

        let solvency = evaluate_solvency(
            &mut self.registry,
            self.config.reserve_rate(),
            mode,
            car,
            &mut self.rng,
        );
        stats.defaults = solvency.defaulted.len();
        stats.credit_failures = solvency.failures.len();
        self.validate_banks("solvency")?;

        let contagion =
            resolve_second_round_effects(&mut self.registry, mode, car, self.max_passes, &mut self.rng)?;
        stats.contagion_passes = contagion.passes;
        stats.contagion_failures = contagion.failures.len();
        self.validate_banks("contagion")?;

        stats.loans_shed = optimize_risk_weights(&mut self.registry, car, &mut self.rng).loans_shed();
        self.validate_banks("risk_weight")?;

        stats.dividends = pay_dividends(&mut self.registry, car, min_rr)
            .iter()
            .map(|p| p.amount)
            .sum();
        self.validate_banks("dividends")?;

        stats.loans_reset = reset_insolvent_loans(&mut self.registry);
        stats.originated_locally = build_loan_book_locally(&mut self.registry, min_rr, car);
        self.validate_banks("local_loan_book")?;
        stats.originated_globally = build_loan_book_globally(&mut self.registry, car, min_rr);
        self.validate_banks("global_loan_book")?;

        let liquidity = evaluate_liquidity(
            &mut self.registry,
            car,
            min_rr,
            self.config.libor_rate(),
            mode,
            &mut self.rng,
        );
        stats.withdrawals = liquidity.withdrawals;
        stats.bank_runs = liquidity.bank_runs.len();
        stats.auctions = liquidity.auctions.len();
        self.validate_banks("liquidity")?;

        debug!(step = self.current_step, ?stats, "step complete");
        self.last_stats = stats;
        Ok(self.snapshot())
    }

    /// Record the current state of every bank and interbank loan.
    pub fn snapshot(&self) -> StepRecord {
        let step = self.current_step;
        StepRecord {
            step,
            banks: self
                .registry
                .banks
                .iter()
                .map(|b| BankSnapshot::capture(step, b, self.config.car, self.config.min_reserves_ratio))
                .collect(),
            interbank: self
                .registry
                .interbank_loans
                .iter()
                .map(|l| InterbankSnapshot::capture(step, l))
                .collect(),
        }
    }

    /// Run up to `config.max_steps` steps, handing each record to `sink`.
    /// The run stops early once no bank is solvent.
    pub fn run(&mut self, sink: &mut impl SnapshotSink) -> Result<RunSummary> {
        info!(
            banks = self.registry.bank_count(),
            savers = self.registry.savers.len(),
            loans = self.registry.loans.len(),
            steps = self.config.max_steps,
            seed = self.config.seed,
            "run started"
        );

        let mut stopped_early = false;
        while self.current_step < self.config.max_steps {
            if self.all_banks_failed() {
                info!(step = self.current_step, "all banks insolvent, stopping");
                stopped_early = true;
                break;
            }
            let record = self.step()?;
            sink.record(&record)?;
        }
        sink.finish()?;

        let summary = RunSummary::from_sim(self, stopped_early);
        info!(
            steps = summary.steps,
            surviving_banks = summary.surviving_banks,
            credit_failures = summary.credit_failures,
            liquidity_failures = summary.liquidity_failures,
            contagion_failures = summary.contagion_failures,
            "run finished"
        );
        Ok(summary)
    }
}
