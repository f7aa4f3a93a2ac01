use approx::assert_relative_eq;
use banksim::agents::*;
use banksim::model::{BankSim, LiquidationMode, SimConfig};
use banksim::population::{BankSpec, Population};
use banksim::SimError;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn quiet_config() -> SimConfig {
    SimConfig {
        rfree: 0.0,
        car: 0.08,
        min_reserves_ratio: 0.03,
        max_steps: 1,
        ..SimConfig::default()
    }
}

/// Two banks with equity 100, one saver of 1000 and one loan of 500 each.
fn two_bank_population() -> Population {
    let saver = SaverTerms {
        balance: 1000.0,
        withdraw_prob: 0.0,
        exit_prob: 0.0,
    };
    let loan = LoanTerms {
        amount: 500.0,
        pdef: 0.0,
        recovery_rate: 0.4,
        fire_sale_loss: 0.0,
    };
    Population {
        banks: vec![BankSpec { equity: 100.0 }; 2],
        savers: vec![(0, saver.clone()), (1, saver)],
        loans: vec![(0, loan.clone()), (1, loan)],
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Market initialization
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_two_bank_initialization() {
    let sim = BankSim::new(quiet_config(), &two_bank_population()).unwrap();

    for bank in &sim.registry.banks {
        assert_relative_eq!(bank.deposits, 1000.0);
        assert_relative_eq!(bank.loans, 500.0);
        assert_relative_eq!(bank.reserves, 600.0);
        assert_relative_eq!(bank.total_assets, 1100.0);
        assert_relative_eq!(bank.rwa, 250.0);
        assert_relative_eq!(bank.capital_ratio, 0.4);
        assert_relative_eq!(bank.reserves_ratio, 0.6);
        assert_relative_eq!(bank.leverage_ratio, 100.0 / 1100.0);
        assert_eq!(bank.provisions, 0.0);
        assert!(bank.solvent);
        assert_relative_eq!(bank.upper_bound_cratio, 0.12, epsilon = 1e-12);
    }
    for saver in &sim.registry.savers {
        assert!(saver.owns_account);
        assert_eq!(saver.bank, Some(saver.home));
    }
    assert!(sim.registry.loans.iter().all(|l| l.approved));
}

#[test]
fn test_initial_loan_book_stops_at_rwa_ceiling() {
    // max_rwa = 10 / (1.1 * 0.08) = 113.6; loans of 10 at rw 0.5 add 5 each
    let saver = SaverTerms {
        balance: 1000.0,
        withdraw_prob: 0.0,
        exit_prob: 0.0,
    };
    let loan = LoanTerms {
        amount: 10.0,
        pdef: 0.0,
        recovery_rate: 0.4,
        fire_sale_loss: 0.0,
    };
    let population = Population {
        banks: vec![BankSpec { equity: 10.0 }],
        savers: vec![(0, saver)],
        loans: vec![(0, loan); 40],
    };
    let sim = BankSim::new(quiet_config(), &population).unwrap();
    let bank = &sim.registry.banks[0];

    // approvals continue while rwa < 113.6, so the 23rd loan overshoots
    assert_eq!(sim.registry.performing_loans(0).len(), 23);
    assert_relative_eq!(bank.rwa, 115.0);
    assert_relative_eq!(bank.loans, 230.0);
    assert_relative_eq!(bank.reserves, 1010.0 - 230.0);
}

#[test]
fn test_initial_loan_book_stops_at_reserve_floor() {
    // reserves fall 100 per loan; the buffered floor is 0.045 * 1000 = 45
    let saver = SaverTerms {
        balance: 1000.0,
        withdraw_prob: 0.0,
        exit_prob: 0.0,
    };
    let loan = LoanTerms {
        amount: 100.0,
        pdef: 0.0,
        recovery_rate: 0.4,
        fire_sale_loss: 0.0,
    };
    let population = Population {
        banks: vec![BankSpec { equity: 1000.0 }],
        savers: vec![(0, saver)],
        loans: vec![(0, loan); 30],
    };
    let sim = BankSim::new(quiet_config(), &population).unwrap();
    let bank = &sim.registry.banks[0];

    // ratio after k loans is (2000 - 100k) / 1000; the 20th approval takes
    // it from 0.1 to 0.0, after which lending stops
    assert_eq!(sim.registry.performing_loans(0).len(), 20);
    assert_relative_eq!(bank.reserves, 0.0);
}

// ═══════════════════════════════════════════════════════════════════════
// Population and configuration
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_generated_population_respects_bounds() {
    let config = SimConfig {
        initial_bank: 5,
        initial_saver: 200,
        initial_loan: 300,
        ..SimConfig::default()
    };
    let mut rng = StdRng::seed_from_u64(7);
    let pop = Population::generate(&config, &mut rng).unwrap();

    assert_eq!(pop.banks.len(), 5);
    assert_eq!(pop.savers.len(), 200);
    assert_eq!(pop.loans.len(), 300);
    assert!(pop.savers.iter().all(|(b, s)| *b < 5 && s.withdraw_prob < 0.2 && s.exit_prob < 0.2));
    assert!(pop
        .loans
        .iter()
        .all(|(b, l)| *b < 5 && l.pdef < 0.1 && l.fire_sale_loss < 0.1 && l.amount == 1.0));
    assert!(pop.validate().is_ok());
}

#[test]
fn test_population_rejects_unknown_bank() {
    let mut pop = two_bank_population();
    pop.savers[0].0 = 9;
    assert!(pop.validate().is_err());
    assert!(BankSim::new(quiet_config(), &pop).is_err());
}

#[test]
fn test_population_needs_a_bank() {
    let config = SimConfig {
        initial_bank: 0,
        ..SimConfig::default()
    };
    let mut rng = StdRng::seed_from_u64(1);
    assert!(Population::generate(&config, &mut rng).is_err());
}

#[test]
fn test_config_validation() {
    assert!(SimConfig::default().validate().is_ok());

    let bad = SimConfig {
        pdef_upper: 1.0,
        ..SimConfig::default()
    };
    assert!(bad.validate().is_err());

    let bad = SimConfig {
        recovery_rate: 1.5,
        ..SimConfig::default()
    };
    assert!(bad.validate().is_err());

    let bad = SimConfig {
        car: f64::NAN,
        ..SimConfig::default()
    };
    assert!(bad.validate().is_err());

    let bad = SimConfig {
        contagion_max_passes: Some(0),
        ..SimConfig::default()
    };
    assert!(bad.validate().is_err());
}

#[test]
fn test_config_rejects_negative_equity_and_rate() {
    let bad = SimConfig {
        initial_equity: -1.0,
        ..SimConfig::default()
    };
    assert!(matches!(bad.validate(), Err(SimError::InvalidConfig(_))));

    let bad = SimConfig {
        rfree: -0.01,
        ..SimConfig::default()
    };
    assert!(matches!(bad.validate(), Err(SimError::InvalidConfig(_))));

    let zero = SimConfig {
        initial_equity: 0.0,
        rfree: 0.0,
        ..SimConfig::default()
    };
    assert!(zero.validate().is_ok());
}

#[test]
fn test_config_toml_round_trip_and_partial_files() {
    let config = SimConfig {
        car: 0.12,
        liquidation_mode: LiquidationMode::Orderly,
        contagion_max_passes: Some(50),
        ..SimConfig::default()
    };
    let text = config.to_toml_string().unwrap();
    assert!(text.contains("liquidation_mode = \"orderly\""));
    let parsed: SimConfig = toml::from_str(&text).unwrap();
    assert_eq!(parsed, config);

    let partial: SimConfig = toml::from_str("initial_bank = 3\ncar = 0.04\n").unwrap();
    assert_eq!(partial.initial_bank, 3);
    assert_relative_eq!(partial.car, 0.04);
    assert_eq!(partial.liquidation_mode, LiquidationMode::FireSale);
    assert_eq!(partial.max_steps, 240);
}

#[test]
fn test_derived_rates() {
    let config = SimConfig::default();
    assert_relative_eq!(config.reserve_rate(), 0.005);
    assert_relative_eq!(config.libor_rate(), 0.01);
    assert_relative_eq!(config.upper_bound_cratio(), 0.12, epsilon = 1e-12);
}
