//! Turns ownership shares and resolved prices into patrimony reports.
use crate::core::error::ValuationResult;
use crate::core::ledger::{COLLECTIVE_GROUP, Ledger, LedgerSnapshot};
use crate::core::model::{Asset, Role, Stakeholder};
use crate::core::price::{Resolution, ResolutionSource};
use crate::core::resolver::PriceResolver;
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Value of one stakeholder's share in one asset.
#[derive(Debug, Clone, Serialize)]
pub struct AssetShareValue {
    pub asset_id: String,
    pub label: String,
    pub collective: bool,
    pub percentage: Decimal,
    /// Full asset price; `None` when the asset could not be priced.
    pub price: Option<Decimal>,
    /// `price * percentage / 100`; `None` when unpriced.
    pub share_value: Option<Decimal>,
    pub source: ResolutionSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct StakeholderPatrimony {
    pub stakeholder: Stakeholder,
    /// Sum of priced share values. Unpriced assets do not contribute.
    pub total: Decimal,
    pub assets: Vec<AssetShareValue>,
}

impl StakeholderPatrimony {
    pub fn unpriced_count(&self) -> usize {
        self.assets.iter().filter(|a| a.share_value.is_none()).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RankEntry {
    pub position: usize,
    pub stakeholder_id: String,
    pub name: String,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupPatrimony {
    pub role: Role,
    /// Member patrimonies, highest total first.
    pub members: Vec<StakeholderPatrimony>,
    pub sum: Decimal,
    pub average: Decimal,
    pub ranking: Vec<RankEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectiveAssetValue {
    pub asset_id: String,
    pub label: String,
    pub price: Option<Decimal>,
    pub source: ResolutionSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberCollectiveShare {
    pub stakeholder_id: String,
    pub name: String,
    pub active: bool,
    pub share_value: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectivePatrimony {
    pub total_value: Decimal,
    pub asset_count: usize,
    pub unpriced_count: usize,
    pub assets: Vec<CollectiveAssetValue>,
    pub per_member: Vec<MemberCollectiveShare>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FullReport {
    pub stakeholders: Vec<StakeholderPatrimony>,
    pub group: GroupPatrimony,
    pub collective: CollectivePatrimony,
    /// Σ over assets of price × allocated percentage / 100.
    pub grand_total: Decimal,
}

/// Resolved prices for one report, so each asset is priced once per call.
type PriceBook = HashMap<String, Resolution>;

pub struct PatrimonyAggregator {
    ledger: Arc<Ledger>,
    resolver: Arc<PriceResolver>,
}

impl PatrimonyAggregator {
    pub fn new(ledger: Arc<Ledger>, resolver: Arc<PriceResolver>) -> Self {
        Self { ledger, resolver }
    }

    pub async fn stakeholder_patrimony(
        &self,
        stakeholder_id: &str,
    ) -> ValuationResult<StakeholderPatrimony> {
        let mut snapshot = self.ledger.snapshot();
        let stakeholder = snapshot.stakeholder(stakeholder_id)?.clone();
        let asset_ids: Vec<String> = snapshot
            .shares_for_stakeholder(stakeholder_id)
            .into_iter()
            .map(|s| s.asset_id)
            .collect();
        let prices = self.price_assets(&mut snapshot, &asset_ids).await;
        Ok(fold_stakeholder(&snapshot, stakeholder, &prices))
    }

    pub async fn group_patrimony(&self, role: Role) -> GroupPatrimony {
        let mut snapshot = self.ledger.snapshot();
        let asset_ids: Vec<String> = snapshot
            .members(role)
            .flat_map(|member| snapshot.shares_for_stakeholder(&member.id))
            .map(|s| s.asset_id)
            .collect();
        let prices = self.price_assets(&mut snapshot, &asset_ids).await;
        fold_group(&snapshot, role, &prices)
    }

    pub async fn collective_asset_patrimony(&self) -> CollectivePatrimony {
        let mut snapshot = self.ledger.snapshot();
        let asset_ids: Vec<String> = snapshot
            .assets()
            .filter(|a| a.collective)
            .map(|a| a.id.clone())
            .collect();
        let prices = self.price_assets(&mut snapshot, &asset_ids).await;
        fold_collective(&snapshot, &prices)
    }

    /// Every figure of the report comes from the same ledger snapshot, so
    /// `grand_total` always equals the sum of the stakeholder totals.
    pub async fn full_report(&self) -> FullReport {
        let mut snapshot = self.ledger.snapshot();
        let asset_ids: Vec<String> = snapshot.assets().map(|a| a.id.clone()).collect();
        let prices = self.price_assets(&mut snapshot, &asset_ids).await;

        let stakeholders: Vec<StakeholderPatrimony> = snapshot
            .stakeholders()
            .map(|s| fold_stakeholder(&snapshot, s.clone(), &prices))
            .collect();
        let group = fold_group(&snapshot, COLLECTIVE_GROUP, &prices);
        let collective = fold_collective(&snapshot, &prices);

        let grand_total: Decimal = snapshot
            .assets()
            .filter_map(|asset| {
                let price = prices.get(&asset.id)?.priced_value()?;
                Some(price * snapshot.allocated_percentage(&asset.id) / Decimal::ONE_HUNDRED)
            })
            .sum();

        FullReport {
            stakeholders,
            group,
            collective,
            grand_total,
        }
    }

    /// Resolves every distinct asset once; live results enrich both the
    /// ledger and the snapshot being reported on.
    async fn price_assets(&self, snapshot: &mut LedgerSnapshot, asset_ids: &[String]) -> PriceBook {
        let mut unique: Vec<Asset> = Vec::new();
        for asset_id in asset_ids {
            if unique.iter().any(|a| &a.id == asset_id) {
                continue;
            }
            match snapshot.asset(asset_id) {
                Ok(asset) => unique.push(asset.clone()),
                Err(e) => warn!("Skipping share on missing asset: {}", e),
            }
        }

        let lookups = unique.iter().map(|asset| async move {
            (asset.id.clone(), self.resolver.resolve(&asset.key).await)
        });
        let prices: PriceBook = join_all(lookups).await.into_iter().collect();

        for (asset_id, resolution) in &prices {
            if resolution.source != ResolutionSource::Live {
                continue;
            }
            snapshot.enrich_asset(asset_id, &resolution.metadata);
            if let Err(e) = self.ledger.enrich_asset(asset_id, &resolution.metadata) {
                debug!("Could not enrich asset {}: {}", asset_id, e);
            }
        }
        prices
    }
}

fn fold_stakeholder(
    snapshot: &LedgerSnapshot,
    stakeholder: Stakeholder,
    prices: &PriceBook,
) -> StakeholderPatrimony {
    let mut total = Decimal::ZERO;
    let mut assets = Vec::new();

    for share in snapshot.shares_for_stakeholder(&stakeholder.id) {
        let Ok(asset) = snapshot.asset(&share.asset_id) else {
            continue;
        };
        let resolution = prices.get(&share.asset_id);
        let price = resolution.and_then(Resolution::priced_value);
        let share_value = price.map(|p| p * share.percentage / Decimal::ONE_HUNDRED);
        if let Some(value) = share_value {
            total += value;
        } else {
            debug!(
                "Excluding unpriced asset {} from {}'s total",
                asset.id, stakeholder.id
            );
        }

        assets.push(AssetShareValue {
            asset_id: asset.id.clone(),
            label: asset.label(),
            collective: asset.collective,
            percentage: share.percentage,
            price,
            share_value,
            source: resolution.map_or(ResolutionSource::None, |r| r.source),
        });
    }

    StakeholderPatrimony {
        stakeholder,
        total,
        assets,
    }
}

fn fold_group(snapshot: &LedgerSnapshot, role: Role, prices: &PriceBook) -> GroupPatrimony {
    let mut members: Vec<StakeholderPatrimony> = snapshot
        .members(role)
        .map(|m| fold_stakeholder(snapshot, m.clone(), prices))
        .collect();
    members.sort_by(|a, b| {
        b.total
            .cmp(&a.total)
            .then_with(|| a.stakeholder.id.cmp(&b.stakeholder.id))
    });

    let sum: Decimal = members.iter().map(|m| m.total).sum();
    let average = if members.is_empty() {
        Decimal::ZERO
    } else {
        (sum / Decimal::from(members.len())).round_dp(2)
    };
    let ranking = members
        .iter()
        .enumerate()
        .map(|(i, m)| RankEntry {
            position: i + 1,
            stakeholder_id: m.stakeholder.id.clone(),
            name: m.stakeholder.name.clone(),
            total: m.total,
        })
        .collect();

    GroupPatrimony {
        role,
        members,
        sum,
        average,
        ranking,
    }
}

fn fold_collective(snapshot: &LedgerSnapshot, prices: &PriceBook) -> CollectivePatrimony {
    let collective: Vec<&Asset> = snapshot.assets().filter(|a| a.collective).collect();

    let mut total_value = Decimal::ZERO;
    let mut assets = Vec::new();
    let mut per_member: BTreeMap<String, Decimal> = BTreeMap::new();

    for asset in &collective {
        let resolution = prices.get(&asset.id);
        let price = resolution.and_then(Resolution::priced_value);
        if let Some(price) = price {
            total_value += price;
            for share in snapshot.shares_for_asset(&asset.id) {
                *per_member.entry(share.stakeholder_id).or_default() +=
                    price * share.percentage / Decimal::ONE_HUNDRED;
            }
        }
        assets.push(CollectiveAssetValue {
            asset_id: asset.id.clone(),
            label: asset.label(),
            price,
            source: resolution.map_or(ResolutionSource::None, |r| r.source),
        });
    }

    let per_member = per_member
        .into_iter()
        .filter_map(|(stakeholder_id, share_value)| {
            let stakeholder = snapshot.stakeholder(&stakeholder_id).ok()?;
            Some(MemberCollectiveShare {
                name: stakeholder.name.clone(),
                active: stakeholder.active,
                stakeholder_id,
                share_value,
            })
        })
        .collect();

    CollectivePatrimony {
        total_value,
        asset_count: collective.len(),
        unpriced_count: assets.iter().filter(|a| a.price.is_none()).count(),
        assets,
        per_member,
    }
}
