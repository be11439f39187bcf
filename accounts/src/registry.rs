//! Asset registry with lazily created per-asset balances.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use trellis_common::{now, Amount, AssetCode, AssetId, BalanceId, Timestamp, MAX_ASSET_SCALE};
use trellis_ledger::{BalanceKind, BalanceSpec, BalanceStore, LedgerError};

use crate::error::{LedgerInconsistency, QueryError};

/// A (code, scale) currency unit and its two service balances.
///
/// Immutable once created. Exactly one asset exists per (code, scale)
/// pair; the same code at two scales is two assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Asset id.
    pub id: AssetId,
    /// Asset code.
    pub code: AssetCode,
    /// Asset scale.
    pub scale: u8,
    /// Dense integer stamped on every balance in this asset.
    pub unit: u16,
    /// Pool absorbing and funding amount differences. Held value.
    pub liquidity_balance_id: BalanceId,
    /// External funds entering and leaving the node. Obligation.
    pub settlement_balance_id: BalanceId,
    /// Creation time.
    pub created_at: Timestamp,
}

/// Check an asset (code, scale) pair before touching the registry.
pub fn validate_asset(code: &AssetCode, scale: u8) -> bool {
    code.is_valid() && scale <= MAX_ASSET_SCALE
}

/// Registry of every asset the node has touched.
///
/// Assets are created on first use. Creation allocates a fresh dense
/// unit and the asset's liquidity and settlement balances in one store
/// batch; the double-checked guard keeps a concurrent first-creator
/// race from minting two assets for one pair.
pub struct AssetRegistry {
    /// Backing store holding the per-asset balances.
    store: Arc<dyn BalanceStore>,
    /// Assets by (code, scale).
    assets: DashMap<(AssetCode, u8), Arc<Asset>>,
    /// Asset keys by id.
    by_id: DashMap<AssetId, (AssetCode, u8)>,
    /// Next dense unit to assign.
    next_unit: AtomicU16,
    /// Serializes first-creation.
    create_guard: Mutex<()>,
}

impl AssetRegistry {
    /// Create an empty registry over the given store.
    pub fn new(store: Arc<dyn BalanceStore>) -> Self {
        Self {
            store,
            assets: DashMap::new(),
            by_id: DashMap::new(),
            next_unit: AtomicU16::new(1),
            create_guard: Mutex::new(()),
        }
    }

    /// Fetch the asset for a pair the caller has validated, creating it
    /// and its two balances on first use.
    pub async fn get_or_create(
        &self,
        code: &AssetCode,
        scale: u8,
    ) -> Result<Arc<Asset>, LedgerInconsistency> {
        let key = (code.clone(), scale);
        if let Some(asset) = self.assets.get(&key) {
            return Ok(asset.clone());
        }

        let _guard = self.create_guard.lock().await;
        // Re-check under the guard; a concurrent creator may have won
        if let Some(asset) = self.assets.get(&key) {
            return Ok(asset.clone());
        }

        let unit = self.next_unit.fetch_add(1, Ordering::Relaxed);
        let liquidity = BalanceSpec::new(BalanceId::new(), unit, BalanceKind::HeldValue);
        let settlement = BalanceSpec::new(BalanceId::new(), unit, BalanceKind::Obligation);
        self.store
            .create_balances(&[liquidity.clone(), settlement.clone()])
            .await?;

        let asset = Arc::new(Asset {
            id: AssetId::new(),
            code: code.clone(),
            scale,
            unit,
            liquidity_balance_id: liquidity.id,
            settlement_balance_id: settlement.id,
            created_at: now(),
        });
        self.assets.insert(key, asset.clone());
        self.by_id.insert(asset.id, (asset.code.clone(), asset.scale));

        info!(asset = %asset.code, scale = asset.scale, unit = asset.unit, "Asset created");
        Ok(asset)
    }

    /// Look up an asset without creating it.
    pub fn get(&self, code: &AssetCode, scale: u8) -> Option<Arc<Asset>> {
        self.assets
            .get(&(code.clone(), scale))
            .map(|asset| asset.clone())
    }

    /// Look up an asset by id.
    pub fn get_by_id(&self, id: AssetId) -> Option<Arc<Asset>> {
        let key = self.by_id.get(&id).map(|entry| entry.value().clone())?;
        self.assets.get(&key).map(|asset| asset.clone())
    }

    /// Number of assets created.
    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    /// Net value held in the asset's liquidity pool.
    pub async fn get_liquidity_balance(
        &self,
        code: &AssetCode,
        scale: u8,
    ) -> Result<Amount, QueryError> {
        let asset = self.get(code, scale).ok_or(QueryError::UnknownAsset)?;
        let balance = self.read_one(asset.liquidity_balance_id).await?;
        Ok(balance.net_credit())
    }

    /// Net amount that has entered the node through settlement.
    pub async fn get_settlement_balance(
        &self,
        code: &AssetCode,
        scale: u8,
    ) -> Result<Amount, QueryError> {
        let asset = self.get(code, scale).ok_or(QueryError::UnknownAsset)?;
        let balance = self.read_one(asset.settlement_balance_id).await?;
        Ok(balance.net_debit())
    }

    async fn read_one(&self, id: BalanceId) -> Result<trellis_ledger::Balance, QueryError> {
        self.store
            .read_balances(&[id])
            .await
            .into_iter()
            .next()
            .ok_or_else(|| {
                QueryError::Inconsistent(LedgerInconsistency::Store(LedgerError::BalanceNotFound {
                    id,
                }))
            })
    }
}
