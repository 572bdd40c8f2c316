//! `AssetMap` — the concrete representation of every "mapping Asset to
//! non-negative integer" in the data model (`openVolume`, `reservableBalance`,
//! `requiredBalance`, spendable-balance snapshots).
//!
//! Combination is a cleaning semigroup: 0-valued entries are dropped after
//! every add/subtract so key iteration (e.g. `changedAssets`) stays bounded.

use crate::core_types::Asset;
use rustc_hash::FxHashMap;

pub type AssetMap = FxHashMap<Asset, u64>;

/// Pointwise add `delta` into `target`, dropping any key that nets to zero.
pub fn add_into(target: &mut AssetMap, delta: &AssetMap) {
    for (&asset, &amount) in delta {
        if amount == 0 {
            continue;
        }
        *target.entry(asset).or_insert(0) += amount;
    }
}

/// Pointwise subtract `delta` from `target`.
///
/// # Panics
/// Panics if any resulting value would go negative — per spec, a negative
/// `openVolume` entry indicates a logic bug and is fatal, never silently
/// clamped.
pub fn sub_into(target: &mut AssetMap, delta: &AssetMap) {
    for (&asset, &amount) in delta {
        if amount == 0 {
            continue;
        }
        let entry = target.entry(asset).or_insert(0);
        *entry = entry
            .checked_sub(amount)
            .unwrap_or_else(|| panic!("reserved balance underflow for {asset}: {entry} - {amount}"));
        if *entry == 0 {
            target.remove(&asset);
        }
    }
}

/// `a - b`, restricted to the keys of `b`, clamped at zero (used to compute
/// "how much of `need` is still uncovered by `rest_balance`" without the
/// fatal-on-negative semantics of [`sub_into`] — a shortfall here is an
/// expected outcome, not a bug).
pub fn saturating_diff(a: &AssetMap, b: &AssetMap) -> AssetMap {
    let mut out = AssetMap::default();
    for (&asset, &need) in b {
        let have = a.get(&asset).copied().unwrap_or(0);
        if need > have {
            out.insert(asset, need - have);
        }
    }
    out
}

/// Restrict `map` to `keys`, defaulting missing entries to 0.
pub fn restrict(map: &AssetMap, keys: &[Asset]) -> AssetMap {
    keys.iter()
        .map(|&a| (a, map.get(&a).copied().unwrap_or(0)))
        .collect()
}

/// `spendable - reserved`, key set taken from `spendable` — the tradable
/// balance shown to a client or staged into a ws snapshot.
pub fn tradable(spendable: &AssetMap, reserved: &AssetMap) -> AssetMap {
    spendable
        .iter()
        .map(|(&asset, &have)| {
            let locked = reserved.get(&asset).copied().unwrap_or(0);
            (asset, have.saturating_sub(locked))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(pairs: &[(Asset, u64)]) -> AssetMap {
        pairs.iter().copied().collect()
    }

    #[test]
    fn add_drops_zero_keys() {
        let mut target = AssetMap::default();
        add_into(&mut target, &m(&[(Asset::Native, 5)]));
        assert_eq!(target.get(&Asset::Native), Some(&5));

        let mut target2 = m(&[(Asset::Native, 5)]);
        sub_into(&mut target2, &m(&[(Asset::Native, 5)]));
        assert!(target2.is_empty(), "zero-valued entries must be dropped");
    }

    #[test]
    #[should_panic(expected = "underflow")]
    fn sub_into_panics_on_negative() {
        let mut target = m(&[(Asset::Native, 5)]);
        sub_into(&mut target, &m(&[(Asset::Native, 10)]));
    }

    #[test]
    fn saturating_diff_reports_only_shortfall() {
        let have = m(&[(Asset::Native, 40)]);
        let need = m(&[(Asset::Native, 30)]);
        assert!(saturating_diff(&have, &need).is_empty());

        let have = m(&[(Asset::Native, 20)]);
        let need = m(&[(Asset::Native, 30)]);
        let diff = saturating_diff(&have, &need);
        assert_eq!(diff.get(&Asset::Native), Some(&10));
    }

    #[test]
    fn tradable_subtracts_reserved_and_keeps_spendable_keyset() {
        let spendable = m(&[(Asset::Native, 100)]);
        let reserved = m(&[(Asset::Native, 30)]);
        let t = tradable(&spendable, &reserved);
        assert_eq!(t.get(&Asset::Native), Some(&70));
    }
}
