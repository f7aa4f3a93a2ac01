use crate::agents::*;
use crate::network::BankNetwork;

/// Typed arenas for every entity kind plus per-bank indices.
///
/// Ids are arena indices. The loans-by-bank and savers-by-bank indices are
/// kept sorted by id, so iterating them visits records in creation order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub banks: Vec<Bank>,
    pub loans: Vec<Loan>,
    pub savers: Vec<Saver>,
    pub interbank_loans: Vec<InterbankLoan>,
    pub network: BankNetwork,
    loans_by_bank: Vec<Vec<LoanId>>,
    savers_by_bank: Vec<Vec<SaverId>>,
    next_interbank_id: InterbankLoanId,
}

fn insert_sorted(ids: &mut Vec<usize>, id: usize) {
    if let Err(pos) = ids.binary_search(&id) {
        ids.insert(pos, id);
    }
}

fn remove_sorted(ids: &mut Vec<usize>, id: usize) {
    if let Ok(pos) = ids.binary_search(&id) {
        ids.remove(pos);
    }
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn add_bank(&mut self, params: &BankParams) -> BankId {
        let id = self.banks.len();
        self.banks.push(Bank::new(id, params));
        self.loans_by_bank.push(Vec::new());
        self.savers_by_bank.push(Vec::new());
        self.network.add_node();
        id
    }

    pub fn add_loan(&mut self, bank: BankId, terms: &LoanTerms, rfree: f64) -> LoanId {
        let id = self.loans.len();
        self.loans.push(Loan::new(id, bank, terms, rfree));
        insert_sorted(&mut self.loans_by_bank[bank], id);
        id
    }

    pub fn add_saver(&mut self, home: BankId, terms: &SaverTerms) -> SaverId {
        let id = self.savers.len();
        self.savers.push(Saver::new(id, home, terms));
        insert_sorted(&mut self.savers_by_bank[home], id);
        id
    }

    pub fn bank_count(&self) -> usize {
        self.banks.len()
    }

    /// Loans booked at a bank, in creation order.
    pub fn loans_of(&self, bank: BankId) -> &[LoanId] {
        &self.loans_by_bank[bank]
    }

    /// Savers located at a bank, in creation order.
    pub fn savers_of(&self, bank: BankId) -> &[SaverId] {
        &self.savers_by_bank[bank]
    }

    /// Approved, solvent loans of a bank.
    pub fn performing_loans(&self, bank: BankId) -> Vec<LoanId> {
        self.loans_by_bank[bank]
            .iter()
            .copied()
            .filter(|&id| self.loans[id].is_performing())
            .collect()
    }

    /// Unapproved, solvent loans of a bank.
    pub fn available_loans(&self, bank: BankId) -> Vec<LoanId> {
        self.loans_by_bank[bank]
            .iter()
            .copied()
            .filter(|&id| self.loans[id].is_available())
            .collect()
    }

    /// Savers at a bank that currently hold an account there.
    pub fn account_holders(&self, bank: BankId) -> Vec<SaverId> {
        self.savers_by_bank[bank]
            .iter()
            .copied()
            .filter(|&id| self.savers[id].owns_account)
            .collect()
    }

    /// Sum of the balances of the given savers.
    pub fn balance_of(&self, savers: &[SaverId]) -> f64 {
        savers.iter().map(|&id| self.savers[id].balance).sum()
    }

    /// Move a loan to another bank's book.
    pub fn reassign_loan(&mut self, loan: LoanId, bank: BankId) {
        if let Some(old) = self.loans[loan].bank {
            remove_sorted(&mut self.loans_by_bank[old], loan);
        }
        self.loans[loan].bank = Some(bank);
        insert_sorted(&mut self.loans_by_bank[bank], loan);
    }

    /// Liquidate a loan: it leaves every book for good.
    pub fn liquidate_loan(&mut self, loan: LoanId) {
        if let Some(old) = self.loans[loan].bank.take() {
            remove_sorted(&mut self.loans_by_bank[old], loan);
        }
        let l = &mut self.loans[loan];
        l.approved = false;
        l.solvent = false;
        l.liquidated = true;
    }

    /// Relocate a saver and open an account at the new bank.
    pub fn move_saver(&mut self, saver: SaverId, bank: BankId) {
        let old = self.savers[saver].home;
        if old != bank {
            remove_sorted(&mut self.savers_by_bank[old], saver);
            insert_sorted(&mut self.savers_by_bank[bank], saver);
        }
        let s = &mut self.savers[saver];
        s.home = bank;
        s.bank = Some(bank);
        s.owns_account = true;
    }

    pub fn add_interbank_loan(
        &mut self,
        creditor: BankId,
        debtor: BankId,
        amount: f64,
        rate: f64,
    ) -> InterbankLoanId {
        let id = self.next_interbank_id;
        self.next_interbank_id += 1;
        self.interbank_loans.push(InterbankLoan {
            id,
            creditor,
            debtor,
            amount,
            rate,
        });
        self.network.add_edge(creditor, debtor);
        id
    }

    /// Retire every interbank loan and sever its network edge.
    pub fn clear_interbank_loans(&mut self) {
        for ib in self.interbank_loans.drain(..) {
            self.network.remove_edge(ib.creditor, ib.debtor);
        }
    }

    pub fn solvent_banks(&self) -> Vec<BankId> {
        self.banks
            .iter()
            .filter(|b| b.solvent)
            .map(|b| b.id)
            .collect()
    }

    /// Total deposits held by account-owning savers, system wide.
    pub fn total_saver_balances(&self) -> f64 {
        self.savers
            .iter()
            .filter(|s| s.owns_account)
            .map(|s| s.balance)
            .sum()
    }
}
