use crate::error::{Result, SimError};

pub type BankId = usize;
pub type LoanId = usize;
pub type SaverId = usize;
pub type InterbankLoanId = usize;

/// Ratio helper: every balance-sheet ratio is defined as 0 when the
/// denominator is 0.
pub fn safe_div(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Bank
// ═══════════════════════════════════════════════════════════════════════

/// Policy parameters fixed per bank at creation.
#[derive(Debug, Clone)]
pub struct BankParams {
    pub equity: f64,
    /// Deposit rate paid to savers (deposits are assumed risk free)
    pub deposit_rate: f64,
    /// Dividends are paid once the capital ratio reaches this level
    pub upper_bound_cratio: f64,
    /// Desired markup over the minimum reserve ratio
    pub buffer_reserves_ratio: f64,
}

/// Interbank positions accumulated during one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterbankLedger {
    pub credits: f64,
    pub debits: f64,
    pub interest_income: f64,
    pub interest_expense: f64,
    pub net_interest_income: f64,
    pub credit_loss: f64,
}

#[derive(Debug, Clone)]
pub struct Bank {
    pub id: BankId,
    pub equity: f64,
    pub deposits: f64,
    pub loans: f64,
    pub reserves: f64,
    pub total_assets: f64,
    /// Provisions against expected losses
    pub provisions: f64,
    /// Required provisions, not met if the bank defaults
    pub new_provisions: f64,
    pub deposit_rate: f64,
    pub rwa: f64,
    /// RWA ceiling used while seeding the initial loan book
    pub max_rwa: f64,

    pub capital_ratio: f64,
    pub reserves_ratio: f64,
    pub leverage_ratio: f64,

    pub interest_income: f64,
    pub interest_expense: f64,
    pub net_interest_income: f64,
    /// Cumulative principal of defaulted loans
    pub defaulted_loans: f64,

    pub dividend: f64,
    pub cum_dividend: f64,
    pub upper_bound_cratio: f64,
    pub buffer_reserves_ratio: f64,

    pub deposit_outflow: f64,
    pub deposit_inflow: f64,
    pub net_deposit_flow: f64,

    /// Current-step interbank positions, cleared after contagion resolution
    pub ib: InterbankLedger,
    /// Interbank positions archived for reporting when `ib` is cleared
    pub ib_last: InterbankLedger,

    pub solvent: bool,
    pub capitalized: bool,
    pub credit_failure: bool,
    pub liquidity_failure: bool,
}

impl Bank {
    pub fn new(id: BankId, params: &BankParams) -> Self {
        Bank {
            id,
            equity: params.equity,
            deposits: 0.0,
            loans: 0.0,
            reserves: 0.0,
            total_assets: 0.0,
            provisions: 0.0,
            new_provisions: 0.0,
            deposit_rate: params.deposit_rate,
            rwa: 0.0,
            max_rwa: 0.0,
            capital_ratio: 0.0,
            reserves_ratio: 0.0,
            leverage_ratio: 0.0,
            interest_income: 0.0,
            interest_expense: 0.0,
            net_interest_income: 0.0,
            defaulted_loans: 0.0,
            dividend: 0.0,
            cum_dividend: 0.0,
            upper_bound_cratio: params.upper_bound_cratio,
            buffer_reserves_ratio: params.buffer_reserves_ratio,
            deposit_outflow: 0.0,
            deposit_inflow: 0.0,
            net_deposit_flow: 0.0,
            ib: InterbankLedger::default(),
            ib_last: InterbankLedger::default(),
            solvent: true,
            capitalized: true,
            credit_failure: false,
            liquidity_failure: false,
        }
    }

    pub fn update_total_assets(&mut self) {
        self.total_assets = self.reserves + self.loans;
    }

    pub fn update_leverage_ratio(&mut self) {
        self.leverage_ratio = safe_div(self.equity, self.total_assets);
    }

    pub fn update_capital_ratio(&mut self) {
        self.capital_ratio = safe_div(self.equity, self.rwa);
    }

    pub fn update_reserves_ratio(&mut self) {
        self.reserves_ratio = safe_div(self.reserves, self.deposits);
    }

    /// Recompute total assets and every derived ratio.
    pub fn refresh_ratios(&mut self) {
        self.update_total_assets();
        self.update_leverage_ratio();
        self.update_capital_ratio();
        self.update_reserves_ratio();
    }

    /// Reserve ratio the bank aims to hold: the minimum times its buffer.
    pub fn desired_reserves_ratio(&self, min_reserves_ratio: f64) -> f64 {
        min_reserves_ratio * self.buffer_reserves_ratio
    }

    /// Reserves above the buffered minimum; negative when short.
    pub fn excess_reserves(&self, min_reserves_ratio: f64) -> f64 {
        self.reserves - self.desired_reserves_ratio(min_reserves_ratio) * self.deposits
    }

    /// Archive this step's interbank positions and clear them.
    pub fn archive_interbank(&mut self) {
        self.ib_last = std::mem::take(&mut self.ib);
    }

    /// Zero the balance sheet of a bank that has been unwound. Deposits and
    /// loans are recomputed by the caller from the surviving sets.
    pub fn mark_unwound(&mut self) {
        self.equity = 0.0;
        self.reserves = 0.0;
        self.reserves_ratio = 0.0;
        self.leverage_ratio = 0.0;
        self.rwa = 0.0;
        self.solvent = false;
        self.capitalized = false;
        self.total_assets = 0.0;
        self.capital_ratio = 0.0;
    }

    /// Reject records with non-finite values or a broken asset identity.
    pub fn validate(&self, phase: &'static str) -> Result<()> {
        let fields = [
            ("equity", self.equity),
            ("deposits", self.deposits),
            ("loans", self.loans),
            ("reserves", self.reserves),
            ("total_assets", self.total_assets),
            ("provisions", self.provisions),
            ("rwa", self.rwa),
            ("capital_ratio", self.capital_ratio),
            ("reserves_ratio", self.reserves_ratio),
            ("leverage_ratio", self.leverage_ratio),
            ("cum_dividend", self.cum_dividend),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(SimError::CorruptBalanceSheet {
                    bank: self.id,
                    phase,
                    field,
                    value,
                });
            }
        }
        if self.total_assets != self.reserves + self.loans {
            return Err(SimError::CorruptBalanceSheet {
                bank: self.id,
                phase,
                field: "total_assets",
                value: self.total_assets,
            });
        }
        if self.provisions < 0.0 {
            return Err(SimError::CorruptBalanceSheet {
                bank: self.id,
                phase,
                field: "provisions",
                value: self.provisions,
            });
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Loan
// ═══════════════════════════════════════════════════════════════════════

/// Terms drawn once when a loan is created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoanTerms {
    pub amount: f64,
    /// True probability of default
    pub pdef: f64,
    pub recovery_rate: f64,
    /// Loss fraction if sold or removed from the bank book
    pub fire_sale_loss: f64,
}

#[derive(Debug, Clone)]
pub struct Loan {
    pub id: LoanId,
    /// Lending bank; `None` once the loan is liquidated
    pub bank: Option<BankId>,
    pub amount: f64,
    pub pdef: f64,
    pub rweight: f64,
    pub recovery_rate: f64,
    pub fire_sale_loss: f64,
    rate_quote: f64,
    pub approved: bool,
    pub solvent: bool,
    /// Shed during risk-weight optimization or dividend deleveraging
    pub dumped: bool,
    /// Liquidated when its bank was unwound
    pub liquidated: bool,
}

impl Loan {
    pub fn new(id: LoanId, bank: BankId, terms: &LoanTerms, rfree: f64) -> Self {
        let pdef = terms.pdef;
        let rate_quote = (safe_div(
            (1.0 + rfree) - terms.recovery_rate * pdef,
            1.0 - pdef,
        ) - 1.0)
            * 1.2;
        Loan {
            id,
            bank: Some(bank),
            amount: terms.amount,
            pdef,
            rweight: 0.5 + pdef * 5.0,
            recovery_rate: terms.recovery_rate,
            fire_sale_loss: terms.fire_sale_loss,
            rate_quote,
            approved: false,
            solvent: true,
            dumped: false,
            liquidated: false,
        }
    }

    /// Rate quoted by the lending bank, priced once at creation.
    pub fn rate_quote(&self) -> f64 {
        self.rate_quote
    }

    /// Loss given default: (1 - recovery_rate) * amount
    pub fn lgd_amount(&self) -> f64 {
        (1.0 - self.recovery_rate) * self.amount
    }

    pub fn recovery(&self) -> f64 {
        self.recovery_rate * self.amount
    }

    pub fn rw_amount(&self) -> f64 {
        self.rweight * self.amount
    }

    pub fn interest_payment(&self) -> f64 {
        self.rate_quote * self.amount
    }

    /// Required provision: pdef * LGD
    pub fn expected_loss(&self) -> f64 {
        self.pdef * self.lgd_amount()
    }

    /// Approved and performing: counts toward the bank's book.
    pub fn is_performing(&self) -> bool {
        self.approved && self.solvent
    }

    /// Not yet lent and not in default: can be originated.
    pub fn is_available(&self) -> bool {
        !self.approved && self.solvent
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Saver
// ═══════════════════════════════════════════════════════════════════════

/// Per-saver parameters drawn once at creation.
#[derive(Debug, Clone, PartialEq)]
pub struct SaverTerms {
    pub balance: f64,
    /// Probability of withdrawing and moving to another bank
    pub withdraw_prob: f64,
    /// Probability of exiting the banking system
    pub exit_prob: f64,
}

#[derive(Debug, Clone)]
pub struct Saver {
    pub id: SaverId,
    pub balance: f64,
    /// Bank the saver's account is with; `None` while unbanked
    pub bank: Option<BankId>,
    /// Bank the saver is located at
    pub home: BankId,
    pub owns_account: bool,
    /// False once a failed bank could not repay the saver
    pub solvent: bool,
    pub exit: bool,
    pub withdraw_prob: f64,
    pub exit_prob: f64,
}

impl Saver {
    pub fn new(id: SaverId, home: BankId, terms: &SaverTerms) -> Self {
        Saver {
            id,
            balance: terms.balance,
            bank: None,
            home,
            owns_account: false,
            solvent: true,
            exit: false,
            withdraw_prob: terms.withdraw_prob,
            exit_prob: terms.exit_prob,
        }
    }

    /// Terminal state for a saver whose bank failed to pay.
    pub fn wipe_out(&mut self) {
        self.solvent = false;
        self.balance = 0.0;
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Interbank loan
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct InterbankLoan {
    pub id: InterbankLoanId,
    pub creditor: BankId,
    pub debtor: BankId,
    pub amount: f64,
    pub rate: f64,
}
