use std::collections::BTreeMap;

use crate::agents::BankId;

/// Undirected multigraph of banks linked by outstanding interbank loans.
///
/// Each interbank loan adds one parallel edge between its creditor and
/// debtor; retiring the loan removes it. Only bookkeeping uses the topology,
/// contagion math runs on the loan records themselves.
#[derive(Debug, Clone, Default)]
pub struct BankNetwork {
    node_count: usize,
    /// Unordered bank pair -> number of parallel edges
    edges: BTreeMap<(BankId, BankId), usize>,
}

fn key(a: BankId, b: BankId) -> (BankId, BankId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl BankNetwork {
    pub fn new(node_count: usize) -> Self {
        BankNetwork {
            node_count,
            edges: BTreeMap::new(),
        }
    }

    pub fn add_node(&mut self) -> BankId {
        self.node_count += 1;
        self.node_count - 1
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn add_edge(&mut self, a: BankId, b: BankId) {
        *self.edges.entry(key(a, b)).or_insert(0) += 1;
    }

    /// Remove one parallel edge. Returns false if no edge linked the pair.
    pub fn remove_edge(&mut self, a: BankId, b: BankId) -> bool {
        let k = key(a, b);
        match self.edges.get_mut(&k) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.edges.remove(&k);
                true
            }
            None => false,
        }
    }

    /// Total edges, counting parallel edges separately.
    pub fn edge_count(&self) -> usize {
        self.edges.values().sum()
    }

    pub fn has_edge(&self, a: BankId, b: BankId) -> bool {
        self.edges.contains_key(&key(a, b))
    }

    /// Distinct neighbours of a bank, in ascending id order.
    pub fn neighbors(&self, bank: BankId) -> Vec<BankId> {
        let mut out: Vec<BankId> = self
            .edges
            .keys()
            .filter_map(|&(a, b)| {
                if a == bank {
                    Some(b)
                } else if b == bank {
                    Some(a)
                } else {
                    None
                }
            })
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Edge count incident to a bank, parallel edges included. A self-loop
    /// counts twice.
    pub fn degree(&self, bank: BankId) -> usize {
        self.edges
            .iter()
            .map(|(&(a, b), &n)| {
                let ends = (a == bank) as usize + (b == bank) as usize;
                ends * n
            })
            .sum()
    }
}
