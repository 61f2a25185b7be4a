//! Point-in-time holder snapshots.

use super::units::amount_str;
use super::{Address, InstrumentId, Phase, TimeMs, TournamentId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Balance of one instrument held by one address, in base units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub instrument_id: InstrumentId,
    #[serde(with = "amount_str")]
    pub balance: u128,
}

impl Holding {
    pub fn new(instrument_id: InstrumentId, balance: u128) -> Self {
        Self {
            instrument_id,
            balance,
        }
    }
}

/// All non-zero holdings of one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holder {
    pub address: Address,
    pub holdings: Vec<Holding>,
}

/// Aggregate statistics over a holder list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotStats {
    pub total_holder_entries: i64,
    pub total_tokens: u128,
    pub unique_address_count: i64,
}

/// Immutable capture of the holder universe for one tournament phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub tournament_id: TournamentId,
    pub phase: Phase,
    pub captured_at_block: u64,
    pub captured_at_time: TimeMs,
    pub ledger_address: String,
    pub holders: Vec<Holder>,
    pub total_holder_entries: i64,
    #[serde(with = "amount_str")]
    pub total_tokens: u128,
    pub unique_address_count: i64,
    pub digest: String,
}

impl Snapshot {
    /// Look up the holder entry for `address`, if any. Holders are sorted by address.
    pub fn holder(&self, address: &Address) -> Option<&Holder> {
        self.holders
            .binary_search_by(|h| h.address.cmp(address))
            .ok()
            .map(|idx| &self.holders[idx])
    }

    /// Holdings of `address`; absence yields an empty slice.
    pub fn holdings_of(&self, address: &Address) -> &[Holding] {
        self.holder(address)
            .map(|h| h.holdings.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    /// True if the stored digest matches the holder list.
    pub fn verify_digest(&self) -> bool {
        self.digest == holders_digest(&self.holders)
    }
}

/// Group `(address, instrument, balance)` triples into holder records.
///
/// Zero balances are dropped and duplicate pairs are summed. Holders come out
/// ordered by address, holdings by instrument id.
pub fn group_balances<I>(pairs: I) -> Vec<Holder>
where
    I: IntoIterator<Item = (Address, InstrumentId, u128)>,
{
    let mut grouped: BTreeMap<Address, BTreeMap<InstrumentId, u128>> = BTreeMap::new();
    for (address, instrument, balance) in pairs {
        if balance == 0 {
            continue;
        }
        let entry = grouped.entry(address).or_default().entry(instrument).or_insert(0);
        *entry = entry.saturating_add(balance);
    }

    grouped
        .into_iter()
        .map(|(address, holdings)| Holder {
            address,
            holdings: holdings
                .into_iter()
                .map(|(instrument_id, balance)| Holding::new(instrument_id, balance))
                .collect(),
        })
        .collect()
}

/// Compute aggregate statistics. Returns `None` if the token sum overflows.
pub fn compute_stats(holders: &[Holder]) -> Option<SnapshotStats> {
    let mut total_tokens: u128 = 0;
    let mut total_holder_entries: i64 = 0;
    for holder in holders {
        for holding in &holder.holdings {
            total_tokens = total_tokens.checked_add(holding.balance)?;
            total_holder_entries += 1;
        }
    }
    Some(SnapshotStats {
        total_holder_entries,
        total_tokens,
        unique_address_count: holders.len() as i64,
    })
}

/// Content digest of a holder list: truncated SHA-256, hex encoded.
pub fn holders_digest(holders: &[Holder]) -> String {
    use sha2::{Digest, Sha256};

    fn hash_var(hasher: &mut Sha256, data: &str) {
        hasher.update((data.len() as u32).to_le_bytes());
        hasher.update(data.as_bytes());
    }

    let mut hasher = Sha256::new();
    for holder in holders {
        hash_var(&mut hasher, holder.address.as_str());
        hasher.update((holder.holdings.len() as u32).to_le_bytes());
        for holding in &holder.holdings {
            hash_var(&mut hasher, holding.instrument_id.as_str());
            hasher.update(holding.balance.to_le_bytes());
        }
    }
    let hash = hasher.finalize();
    hex::encode(&hash[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::new(s.to_string())
    }

    fn inst(s: &str) -> InstrumentId {
        InstrumentId::new(s.to_string())
    }

    #[test]
    fn test_group_balances_groups_by_address_and_drops_zero() {
        let holders = group_balances(vec![
            (addr("0xb"), inst("P2"), 200),
            (addr("0xa"), inst("P1"), 100),
            (addr("0xb"), inst("P1"), 50),
            (addr("0xc"), inst("P1"), 0),
            (addr("0xa"), inst("P2"), 0),
        ]);

        assert_eq!(holders.len(), 2);
        assert_eq!(holders[0].address, addr("0xa"));
        assert_eq!(holders[0].holdings, vec![Holding::new(inst("P1"), 100)]);
        assert_eq!(holders[1].address, addr("0xb"));
        assert_eq!(
            holders[1].holdings,
            vec![Holding::new(inst("P1"), 50), Holding::new(inst("P2"), 200)]
        );
        assert!(holders
            .iter()
            .all(|h| !h.holdings.is_empty() && h.holdings.iter().all(|x| x.balance > 0)));
    }

    #[test]
    fn test_compute_stats() {
        let holders = group_balances(vec![
            (addr("0xa"), inst("P1"), 100),
            (addr("0xb"), inst("P1"), 50),
            (addr("0xb"), inst("P2"), 200),
        ]);
        let stats = compute_stats(&holders).unwrap();
        assert_eq!(stats.total_tokens, 350);
        assert_eq!(stats.total_holder_entries, 3);
        assert_eq!(stats.unique_address_count, 2);
    }

    #[test]
    fn test_compute_stats_overflow() {
        let holders = group_balances(vec![
            (addr("0xa"), inst("P1"), u128::MAX),
            (addr("0xb"), inst("P1"), 1),
        ]);
        assert!(compute_stats(&holders).is_none());
    }

    #[test]
    fn test_digest_changes_with_balance() {
        let a = group_balances(vec![(addr("0xa"), inst("P1"), 100)]);
        let b = group_balances(vec![(addr("0xa"), inst("P1"), 101)]);
        assert_ne!(holders_digest(&a), holders_digest(&b));
        assert_eq!(holders_digest(&a), holders_digest(&a.clone()));
        assert_eq!(holders_digest(&a).len(), 32);
    }
}
