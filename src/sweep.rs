use std::path::Path;

use rayon::prelude::*;
use serde::Serialize;

use crate::error::Result;
use crate::model::{BankSim, SimConfig};
use crate::output::RunSummary;
use crate::snapshot::NullSink;

/// Result of one (CAR, minimum reserve ratio) combination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepResult {
    pub car: f64,
    pub min_reserves_ratio: f64,
    pub summary: RunSummary,
}

/// Runs the regulatory grid, one independent simulation per combination.
pub struct SweepEngine {
    pub base: SimConfig,
    pub cars: Vec<f64>,
    pub reserve_ratios: Vec<f64>,
}

impl SweepEngine {
    pub fn new(base: SimConfig) -> Self {
        SweepEngine {
            base,
            cars: Self::default_cars(),
            reserve_ratios: Self::default_reserve_ratios(),
        }
    }

    pub fn default_cars() -> Vec<f64> {
        vec![0.04, 0.08, 0.12, 0.16]
    }

    pub fn default_reserve_ratios() -> Vec<f64> {
        vec![0.03, 0.045, 0.06]
    }

    /// Generate all parameter combinations, CAR-major.
    pub fn combinations(&self) -> Vec<(f64, f64)> {
        self.cars
            .iter()
            .flat_map(|&car| self.reserve_ratios.iter().map(move |&rr| (car, rr)))
            .collect()
    }

    /// Run every combination in parallel. Each run seeds its own stream
    /// from the base seed, so results do not depend on thread scheduling.
    pub fn run_grid(&self) -> Result<Vec<SweepResult>> {
        self.run_grid_with(|| {})
    }

    /// As `run_grid`, calling `on_done` as each combination finishes.
    pub fn run_grid_with<F>(&self, on_done: F) -> Result<Vec<SweepResult>>
    where
        F: Fn() + Sync,
    {
        self.combinations()
            .par_iter()
            .map(|&(car, min_reserves_ratio)| {
                let config = SimConfig {
                    car,
                    min_reserves_ratio,
                    ..self.base.clone()
                };
                let mut sim = BankSim::from_config(config)?;
                let summary = sim.run(&mut NullSink)?;
                on_done();
                Ok(SweepResult {
                    car,
                    min_reserves_ratio,
                    summary,
                })
            })
            .collect()
    }
}

/// Save sweep results to CSV.
pub fn save_sweep_results(results: &[SweepResult], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record([
        "car",
        "min_reserves_ratio",
        "steps",
        "surviving_banks",
        "credit_failures",
        "liquidity_failures",
        "contagion_failures",
        "total_dividends",
        "total_equity",
        "total_deposits",
        "total_loans",
        "all_banks_failed",
    ])?;

    for r in results {
        let s = &r.summary;
        wtr.write_record(&[
            format!("{:.4}", r.car),
            format!("{:.4}", r.min_reserves_ratio),
            s.steps.to_string(),
            s.surviving_banks.to_string(),
            s.credit_failures.to_string(),
            s.liquidity_failures.to_string(),
            s.contagion_failures.to_string(),
            format!("{:.4}", s.total_dividends),
            format!("{:.4}", s.total_equity),
            format!("{:.4}", s.total_deposits),
            format!("{:.4}", s.total_loans),
            s.all_banks_failed.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
