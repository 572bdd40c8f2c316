//! `BalanceOracle` — the per-process cache in front of [`crate::chain::ChainClient`].
//!
//! Structured exactly like the teacher's `transfer::channel` request/response
//! pair: an `mpsc::Sender<OracleRequest>` handle cloned into every account
//! actor, a single task owning the cache and `oneshot::Sender` reply per
//! request. Concurrent callers asking the same question about the same
//! address while a remote fetch is in flight are coalesced onto that one
//! fetch rather than each issuing their own `ChainClient::fetch_balances`
//! call.

use crate::balance_map::{self, AssetMap};
use crate::chain::ChainClient;
use crate::core_types::{Address, Asset};
use crate::error::MatcherError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

#[derive(Debug)]
enum OracleRequest {
    /// Tradable balance for a subset of assets, consulting the cache first
    /// and only calling out to the chain on a miss.
    Get {
        addr: Address,
        assets: Vec<Asset>,
        reply: oneshot::Sender<Result<AssetMap, MatcherError>>,
    },
    /// The complete balance for `addr`, served from the cache if a full
    /// snapshot is already held, otherwise fetched and cached as one.
    GetSnapshot {
        addr: Address,
        reply: oneshot::Sender<Result<AssetMap, MatcherError>>,
    },
    /// Push externally-observed new balances (e.g. a blockchain balance
    /// stream) into the cache.
    UpdateStates { addr: Address, balances: AssetMap },
    /// Debit the cached spendable balance in place, without a remote call,
    /// once an account actor has locally decided to reserve funds.
    Subtract { addr: Address, delta: AssetMap },
}

#[derive(Clone)]
pub struct BalanceOracleHandle {
    tx: mpsc::Sender<OracleRequest>,
}

impl BalanceOracleHandle {
    pub async fn get(&self, addr: Address, assets: &[Asset]) -> Result<AssetMap, MatcherError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(OracleRequest::Get {
                addr,
                assets: assets.to_vec(),
                reply,
            })
            .await
            .map_err(|_| MatcherError::UnexpectedError("balance oracle closed".to_string()))?;
        rx.await
            .map_err(|_| MatcherError::UnexpectedError("balance oracle dropped reply".to_string()))?
    }

    pub async fn get_snapshot(&self, addr: Address) -> Result<AssetMap, MatcherError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(OracleRequest::GetSnapshot { addr, reply })
            .await
            .map_err(|_| MatcherError::UnexpectedError("balance oracle closed".to_string()))?;
        rx.await
            .map_err(|_| MatcherError::UnexpectedError("balance oracle dropped reply".to_string()))?
    }

    pub async fn update_states(&self, addr: Address, balances: AssetMap) {
        let _ = self.tx.send(OracleRequest::UpdateStates { addr, balances }).await;
    }

    pub async fn subtract(&self, addr: Address, delta: AssetMap) {
        let _ = self.tx.send(OracleRequest::Subtract { addr, delta }).await;
    }
}

/// Spawn the oracle task and return a cloneable handle to it.
pub fn spawn(chain: Arc<dyn ChainClient>, buffer: usize) -> BalanceOracleHandle {
    let (tx, rx) = mpsc::channel(buffer);
    tokio::spawn(run(chain, rx));
    BalanceOracleHandle { tx }
}

/// What the cache holds for one address: either the complete balance
/// (`full`, obtained via a snapshot fetch or authoritative push), or
/// whatever individual assets have been learned so far from point queries.
/// A point query can only be served from `known` when it asks for nothing
/// outside that set — it never gets promoted into `full`.
#[derive(Default)]
struct CachedBalance {
    full: Option<AssetMap>,
    known: AssetMap,
}

impl CachedBalance {
    fn covers(&self, assets: &[Asset]) -> bool {
        self.full.is_some() || assets.iter().all(|a| self.known.contains_key(a))
    }

    fn read(&self, assets: &[Asset]) -> AssetMap {
        match &self.full {
            Some(full) => balance_map::restrict(full, assets),
            None => balance_map::restrict(&self.known, assets),
        }
    }
}

/// A fetch key: an address plus the asset subset being fetched, or `None`
/// for a full snapshot. Normalized (sorted, deduplicated) so two requests
/// for the same assets in a different order still coalesce onto one fetch.
type FetchKey = (Address, Option<Vec<Asset>>);

fn fetch_key(addr: Address, assets: Option<&[Asset]>) -> FetchKey {
    let normalized = assets.map(|a| {
        let mut v = a.to_vec();
        v.sort();
        v.dedup();
        v
    });
    (addr, normalized)
}

async fn run(chain: Arc<dyn ChainClient>, mut rx: mpsc::Receiver<OracleRequest>) {
    let mut cache: HashMap<Address, CachedBalance> = HashMap::new();
    let mut in_flight: HashMap<FetchKey, Vec<oneshot::Sender<Result<AssetMap, MatcherError>>>> =
        HashMap::new();
    let (done_tx, mut done_rx) = mpsc::channel::<(FetchKey, Result<AssetMap, MatcherError>)>(64);

    loop {
        tokio::select! {
            Some((key, result)) = done_rx.recv() => {
                let (addr, assets) = &key;
                if let Ok(balances) = &result {
                    let entry = cache.entry(*addr).or_default();
                    match assets {
                        None => {
                            entry.full = Some(balances.clone());
                            entry.known.clear();
                        }
                        Some(requested) => {
                            for asset in requested {
                                entry.known.insert(*asset, balances.get(asset).copied().unwrap_or(0));
                            }
                        }
                    }
                }
                if let Some(waiters) = in_flight.remove(&key) {
                    for waiter in waiters {
                        let _ = waiter.send(result.clone());
                    }
                }
            }
            maybe_req = rx.recv() => {
                let Some(req) = maybe_req else { break };
                match req {
                    OracleRequest::Get { addr, assets, reply } => {
                        if let Some(entry) = cache.get(&addr) {
                            if entry.covers(&assets) {
                                let _ = reply.send(Ok(entry.read(&assets)));
                                continue;
                            }
                        }
                        fetch_or_join(&chain, &mut in_flight, &done_tx, addr, Some(assets), reply);
                    }
                    OracleRequest::GetSnapshot { addr, reply } => {
                        if let Some(full) = cache.get(&addr).and_then(|e| e.full.as_ref()) {
                            let _ = reply.send(Ok(full.clone()));
                            continue;
                        }
                        fetch_or_join(&chain, &mut in_flight, &done_tx, addr, None, reply);
                    }
                    OracleRequest::UpdateStates { addr, balances } => {
                        debug!(%addr, "balance oracle: external update");
                        let entry = cache.entry(addr).or_default();
                        if let Some(full) = &mut entry.full {
                            for (asset, amount) in &balances {
                                full.insert(*asset, *amount);
                            }
                        }
                        for (asset, amount) in &balances {
                            entry.known.insert(*asset, *amount);
                        }
                    }
                    OracleRequest::Subtract { addr, delta } => {
                        match cache.get_mut(&addr) {
                            Some(entry) => {
                                if let Some(full) = &mut entry.full {
                                    balance_map::sub_into(full, &delta);
                                }
                                balance_map::sub_into(&mut entry.known, &delta);
                            }
                            None => warn!(%addr, "subtract on address with no cached balance, ignoring"),
                        }
                    }
                }
            }
            else => break,
        }
    }
}

fn fetch_or_join(
    chain: &Arc<dyn ChainClient>,
    in_flight: &mut HashMap<FetchKey, Vec<oneshot::Sender<Result<AssetMap, MatcherError>>>>,
    done_tx: &mpsc::Sender<(FetchKey, Result<AssetMap, MatcherError>)>,
    addr: Address,
    assets: Option<Vec<Asset>>,
    reply: oneshot::Sender<Result<AssetMap, MatcherError>>,
) {
    let key = fetch_key(addr, assets.as_deref());
    if let Some(waiters) = in_flight.get_mut(&key) {
        waiters.push(reply);
        return;
    }
    in_flight.insert(key.clone(), vec![reply]);
    let chain = Arc::clone(chain);
    let done_tx = done_tx.clone();
    tokio::spawn(async move {
        let result = chain
            .fetch_balances(addr, key.1.as_deref())
            .await
            .map_err(MatcherError::from);
        let _ = done_tx.send((key, result)).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::InMemoryChainClient;

    #[tokio::test]
    async fn get_reads_through_cache_miss() {
        let chain = Arc::new(InMemoryChainClient::new());
        let addr = Address::from_u64(1);
        let mut balances = AssetMap::default();
        balances.insert(Asset::Native, 500);
        chain.set_balance(addr, balances);
        let handle = spawn(chain.clone(), 16);

        let got = handle.get(addr, &[Asset::Native]).await.unwrap();
        assert_eq!(got.get(&Asset::Native), Some(&500));
        assert_eq!(chain.call_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_gets_coalesce_into_one_remote_call() {
        let chain = Arc::new(InMemoryChainClient::new());
        let addr = Address::from_u64(2);
        let mut balances = AssetMap::default();
        balances.insert(Asset::Native, 10);
        chain.set_balance(addr, balances);
        let handle = spawn(chain.clone(), 16);

        let h1 = handle.clone();
        let h2 = handle.clone();
        let (r1, r2) = tokio::join!(
            h1.get(addr, &[Asset::Native]),
            h2.get(addr, &[Asset::Native]),
        );
        assert!(r1.is_ok() && r2.is_ok());
        assert_eq!(chain.call_count(), 1);
    }

    #[tokio::test]
    async fn subtract_debits_the_cache() {
        let chain = Arc::new(InMemoryChainClient::new());
        let addr = Address::from_u64(3);
        let mut balances = AssetMap::default();
        balances.insert(Asset::Native, 100);
        chain.set_balance(addr, balances);
        let handle = spawn(chain.clone(), 16);

        let _ = handle.get(addr, &[Asset::Native]).await.unwrap();
        let mut delta = AssetMap::default();
        delta.insert(Asset::Native, 40);
        handle.subtract(addr, delta).await;
        // give the actor a tick to process the fire-and-forget message
        tokio::task::yield_now().await;
        // a plain `get` reads the (now debited) cache rather than forcing
        // a fresh chain pull, unlike `get_snapshot`.
        let got = handle.get(addr, &[Asset::Native]).await.unwrap();
        assert_eq!(got.get(&Asset::Native), Some(&60));
    }

    #[tokio::test]
    async fn distinct_asset_subsets_each_cost_a_remote_call() {
        let chain = Arc::new(InMemoryChainClient::new());
        let addr = Address::from_u64(4);
        let mut balances = AssetMap::default();
        balances.insert(Asset::Native, 300);
        balances.insert(Asset::issued_from_u64(1), 7);
        chain.set_balance(addr, balances);
        let handle = spawn(chain.clone(), 16);

        let got = handle.get(addr, &[Asset::Native]).await.unwrap();
        assert_eq!(got.get(&Asset::Native), Some(&300));
        assert_eq!(got.get(&Asset::issued_from_u64(1)), None);
        assert_eq!(chain.call_count(), 1);

        // repeating the same query is served from the cache
        let _ = handle.get(addr, &[Asset::Native]).await.unwrap();
        assert_eq!(chain.call_count(), 1);

        // a different asset, never fetched for this address, costs a call
        let got = handle.get(addr, &[Asset::issued_from_u64(2)]).await.unwrap();
        assert_eq!(got.get(&Asset::issued_from_u64(2)), Some(&0));
        assert_eq!(chain.call_count(), 2);

        // a request mixing an already-known asset with an unknown one still
        // costs a call, since not every requested asset is covered
        let got = handle
            .get(addr, &[Asset::Native, Asset::issued_from_u64(1)])
            .await
            .unwrap();
        assert_eq!(got.get(&Asset::issued_from_u64(1)), Some(&7));
        assert_eq!(chain.call_count(), 3);
    }

    #[tokio::test]
    async fn get_state_defaults_missing_assets_to_zero() {
        let chain = Arc::new(InMemoryChainClient::new());
        let addr = Address::from_u64(5);
        let mut balances = AssetMap::default();
        balances.insert(Asset::Native, 10);
        chain.set_balance(addr, balances);
        let handle = spawn(chain.clone(), 16);

        let got = handle.get(addr, &[Asset::issued_from_u64(9)]).await.unwrap();
        assert_eq!(got.get(&Asset::issued_from_u64(9)), Some(&0));
        assert_eq!(got.get(&Asset::Native), None);
    }

    #[tokio::test]
    async fn update_states_then_gets_for_cached_assets_cost_nothing() {
        let chain = Arc::new(InMemoryChainClient::new());
        let addr = Address::from_u64(6);
        let handle = spawn(chain.clone(), 16);

        let mut pushed = AssetMap::default();
        pushed.insert(Asset::Native, 300);
        pushed.insert(Asset::issued_from_u64(1), 5);
        handle.update_states(addr, pushed).await;
        tokio::task::yield_now().await;

        let got = handle.get(addr, &[Asset::Native, Asset::issued_from_u64(1)]).await.unwrap();
        assert_eq!(got.get(&Asset::Native), Some(&300));
        assert_eq!(got.get(&Asset::issued_from_u64(1)), Some(&5));
        assert_eq!(chain.call_count(), 0);
    }
}
