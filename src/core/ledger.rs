//! Ownership ledger: who owns which percentage of which asset.
//!
//! Invariants kept by every mutating operation:
//! - per asset, the sum of share percentages never exceeds 100;
//! - at most one share per (asset, stakeholder);
//! - collective assets always carry the equal split of the currently active
//!   partners (recomputed whenever that roster changes).
//!
//! A failed operation leaves the ledger unchanged.

use crate::core::error::{ValuationError, ValuationResult};
use crate::core::model::{Asset, OwnershipShare, Role, Stakeholder};
use crate::core::price::PriceMetadata;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Role whose active members share collective assets equally.
pub const COLLECTIVE_GROUP: Role = Role::Partner;

const PERCENTAGE_SCALE: u32 = 2;

#[derive(Default, Clone)]
struct LedgerState {
    stakeholders: BTreeMap<String, Stakeholder>,
    assets: BTreeMap<String, Asset>,
    // asset id -> stakeholder id -> percentage
    shares: BTreeMap<String, BTreeMap<String, Decimal>>,
}

impl LedgerState {
    fn asset(&self, asset_id: &str) -> ValuationResult<&Asset> {
        self.assets
            .get(asset_id)
            .ok_or_else(|| ValuationError::not_found("asset", asset_id))
    }

    fn stakeholder(&self, stakeholder_id: &str) -> ValuationResult<&Stakeholder> {
        self.stakeholders
            .get(stakeholder_id)
            .ok_or_else(|| ValuationError::not_found("stakeholder", stakeholder_id))
    }

    fn allocated_excluding(&self, asset_id: &str, excluded: &[&str]) -> Decimal {
        self.shares
            .get(asset_id)
            .map(|holders| {
                holders
                    .iter()
                    .filter(|(holder, _)| !excluded.contains(&holder.as_str()))
                    .map(|(_, pct)| *pct)
                    .sum()
            })
            .unwrap_or(Decimal::ZERO)
    }

    fn ensure_fits(
        &self,
        asset_id: &str,
        excluded: &[&str],
        percentage: Decimal,
    ) -> ValuationResult<()> {
        if percentage <= Decimal::ZERO || percentage > Decimal::ONE_HUNDRED {
            return Err(ValuationError::conflict(format!(
                "percentage {percentage} must be within (0, 100]"
            )));
        }
        let allocated = self.allocated_excluding(asset_id, excluded);
        if allocated + percentage > Decimal::ONE_HUNDRED {
            return Err(ValuationError::conflict(format!(
                "asset {asset_id} would be {}% allocated ({allocated}% already held by others)",
                allocated + percentage
            )));
        }
        Ok(())
    }

    fn active_members(&self, role: Role) -> Vec<String> {
        self.stakeholders
            .values()
            .filter(|s| s.role == role && s.active)
            .map(|s| s.id.clone())
            .collect()
    }

    /// Replaces the shares held by members of `role` on `asset_id` with an
    /// equal split among the active ones. Returns the number of shares created.
    fn distribute(&mut self, asset_id: &str, role: Role) -> ValuationResult<usize> {
        self.asset(asset_id)?;

        let group: Vec<&str> = self
            .stakeholders
            .values()
            .filter(|s| s.role == role)
            .map(|s| s.id.as_str())
            .collect();
        let outside_group = self.allocated_excluding(asset_id, &group);
        let members = self.active_members(role);

        if outside_group > Decimal::ZERO {
            return Err(ValuationError::conflict(format!(
                "asset {asset_id} has {outside_group}% held outside the {role} group"
            )));
        }
        let split = equal_split(members.len());
        if split.iter().any(|pct| *pct <= Decimal::ZERO) {
            return Err(ValuationError::conflict(format!(
                "{} {role} members are too many to split asset {asset_id}",
                members.len()
            )));
        }

        let holders = self.shares.entry(asset_id.to_string()).or_default();
        holders.retain(|holder, _| !group.contains(&holder.as_str()));
        for (member, percentage) in members.iter().zip(split) {
            holders.insert(member.clone(), percentage);
        }
        if holders.is_empty() {
            self.shares.remove(asset_id);
        }

        if members.is_empty() {
            warn!("No active {} members to share asset {}", role, asset_id);
        } else {
            debug!(
                "Distributed asset {} equally among {} {} members",
                asset_id,
                members.len(),
                role
            );
        }
        Ok(members.len())
    }

    /// Collective assets may only be held by members of the collective group,
    /// so a later roster change can always redistribute them.
    fn ensure_may_hold(&self, asset_id: &str, stakeholder_id: &str) -> ValuationResult<()> {
        let asset = self.asset(asset_id)?;
        let stakeholder = self.stakeholder(stakeholder_id)?;
        if asset.collective && stakeholder.role != COLLECTIVE_GROUP {
            return Err(ValuationError::conflict(format!(
                "collective asset {asset_id} can only be held by {COLLECTIVE_GROUP} members, not {stakeholder_id}"
            )));
        }
        Ok(())
    }

    fn share_rows(&self, asset_id: &str) -> Vec<OwnershipShare> {
        self.shares
            .get(asset_id)
            .map(|holders| {
                holders
                    .iter()
                    .map(|(holder, pct)| OwnershipShare {
                        asset_id: asset_id.to_string(),
                        stakeholder_id: holder.clone(),
                        percentage: *pct,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn holdings(&self, stakeholder_id: &str) -> Vec<OwnershipShare> {
        self.shares
            .iter()
            .filter_map(|(asset_id, holders)| {
                holders.get(stakeholder_id).map(|pct| OwnershipShare {
                    asset_id: asset_id.clone(),
                    stakeholder_id: stakeholder_id.to_string(),
                    percentage: *pct,
                })
            })
            .collect()
    }

    fn drop_collective_shares(&mut self, stakeholder_id: &str) {
        for asset in self.assets.values().filter(|a| a.collective) {
            if let Some(holders) = self.shares.get_mut(&asset.id) {
                holders.remove(stakeholder_id);
            }
        }
        self.shares.retain(|_, holders| !holders.is_empty());
    }

    fn redistribute_collective(&mut self, role: Role) -> ValuationResult<()> {
        if role != COLLECTIVE_GROUP {
            return Ok(());
        }
        let collective: Vec<String> = self
            .assets
            .values()
            .filter(|a| a.collective)
            .map(|a| a.id.clone())
            .collect();
        for asset_id in &collective {
            self.distribute(asset_id, role)?;
        }
        if !collective.is_empty() {
            info!(
                "Recomputed {} collective assets after {} roster change",
                collective.len(),
                role
            );
        }
        Ok(())
    }
}

/// Splits 100% into `members` parts with two decimals. Parts are rounded down
/// and the first one absorbs the remainder, so the parts sum to exactly 100
/// and the first is never smaller than the others.
pub fn equal_split(members: usize) -> Vec<Decimal> {
    if members == 0 {
        return Vec::new();
    }
    let count = Decimal::from(members);
    let share = (Decimal::ONE_HUNDRED / count)
        .round_dp_with_strategy(PERCENTAGE_SCALE, RoundingStrategy::ToZero);
    let remainder = Decimal::ONE_HUNDRED - share * (count - Decimal::ONE);

    let mut split = vec![share; members];
    split[0] = remainder;
    split
}

/// In-memory ownership ledger, safe to share between concurrent readers.
#[derive(Default)]
pub struct Ledger {
    state: RwLock<LedgerState>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `op` against a copy of the state and commits only on success.
    fn transact<T>(
        &self,
        op: impl FnOnce(&mut LedgerState) -> ValuationResult<T>,
    ) -> ValuationResult<T> {
        let mut state = self.write();
        let mut draft = state.clone();
        let out = op(&mut draft)?;
        *state = draft;
        Ok(out)
    }

    pub fn add_stakeholder(&self, stakeholder: Stakeholder) -> ValuationResult<()> {
        self.transact(|state| {
            if state.stakeholders.contains_key(&stakeholder.id) {
                return Err(ValuationError::conflict(format!(
                    "stakeholder {} already exists",
                    stakeholder.id
                )));
            }
            let role = stakeholder.role;
            let refresh = stakeholder.active;
            state
                .stakeholders
                .insert(stakeholder.id.clone(), stakeholder);
            if refresh {
                state.redistribute_collective(role)?;
            }
            Ok(())
        })
    }

    /// Changes name and role. A role change recomputes both rosters.
    pub fn update_stakeholder(&self, id: &str, name: &str, role: Role) -> ValuationResult<()> {
        self.transact(|state| {
            let previous = state.stakeholder(id)?.role;
            if let Some(stakeholder) = state.stakeholders.get_mut(id) {
                stakeholder.name = name.to_string();
                stakeholder.role = role;
            }
            if previous != role {
                if previous == COLLECTIVE_GROUP {
                    state.drop_collective_shares(id);
                }
                state.redistribute_collective(previous)?;
                state.redistribute_collective(role)?;
            }
            Ok(())
        })
    }

    pub fn set_stakeholder_active(&self, id: &str, active: bool) -> ValuationResult<()> {
        self.transact(|state| {
            let stakeholder = state
                .stakeholders
                .get_mut(id)
                .ok_or_else(|| ValuationError::not_found("stakeholder", id))?;
            if stakeholder.active == active {
                return Ok(());
            }
            stakeholder.active = active;
            let role = stakeholder.role;
            info!(
                "Stakeholder {} is now {}",
                id,
                if active { "active" } else { "inactive" }
            );
            state.redistribute_collective(role)
        })
    }

    /// Registers an asset; collective assets are split among the active
    /// partners straight away.
    pub fn register_asset(&self, asset: Asset) -> ValuationResult<()> {
        self.transact(|state| {
            if state.assets.contains_key(&asset.id) {
                return Err(ValuationError::conflict(format!(
                    "asset {} already exists",
                    asset.id
                )));
            }
            let id = asset.id.clone();
            let collective = asset.collective;
            state.assets.insert(id.clone(), asset);
            if collective {
                state.distribute(&id, COLLECTIVE_GROUP)?;
            }
            Ok(())
        })
    }

    /// Flags an asset as collectively owned or not. Flagging it collective
    /// distributes it; clearing the flag keeps the current shares.
    pub fn set_collective(&self, asset_id: &str, collective: bool) -> ValuationResult<()> {
        self.transact(|state| {
            let asset = state
                .assets
                .get_mut(asset_id)
                .ok_or_else(|| ValuationError::not_found("asset", asset_id))?;
            let was_collective = asset.collective;
            asset.collective = collective;
            if collective && !was_collective {
                state.distribute(asset_id, COLLECTIVE_GROUP)?;
            }
            Ok(())
        })
    }

    /// Removes an asset that no longer has any owner.
    pub fn remove_asset(&self, asset_id: &str) -> ValuationResult<()> {
        self.transact(|state| {
            state.asset(asset_id)?;
            if state.shares.get(asset_id).is_some_and(|h| !h.is_empty()) {
                return Err(ValuationError::conflict(format!(
                    "asset {asset_id} still has ownership shares"
                )));
            }
            state.assets.remove(asset_id);
            Ok(())
        })
    }

    /// Copies display fields from a live price lookup onto the asset.
    pub fn enrich_asset(&self, asset_id: &str, metadata: &PriceMetadata) -> ValuationResult<()> {
        let mut state = self.write();
        let asset = state
            .assets
            .get_mut(asset_id)
            .ok_or_else(|| ValuationError::not_found("asset", asset_id))?;
        asset.enrich(metadata);
        Ok(())
    }

    pub fn add_share(
        &self,
        asset_id: &str,
        stakeholder_id: &str,
        percentage: Decimal,
    ) -> ValuationResult<()> {
        self.transact(|state| {
            state.ensure_may_hold(asset_id, stakeholder_id)?;
            if state
                .shares
                .get(asset_id)
                .is_some_and(|holders| holders.contains_key(stakeholder_id))
            {
                return Err(ValuationError::conflict(format!(
                    "{stakeholder_id} already holds a share of {asset_id}"
                )));
            }
            state.ensure_fits(asset_id, &[], percentage)?;
            state
                .shares
                .entry(asset_id.to_string())
                .or_default()
                .insert(stakeholder_id.to_string(), percentage);
            debug!("Granted {}% of {} to {}", percentage, asset_id, stakeholder_id);
            Ok(())
        })
    }

    pub fn update_share(
        &self,
        asset_id: &str,
        stakeholder_id: &str,
        percentage: Decimal,
    ) -> ValuationResult<()> {
        self.transact(|state| {
            state.ensure_may_hold(asset_id, stakeholder_id)?;
            if !state
                .shares
                .get(asset_id)
                .is_some_and(|holders| holders.contains_key(stakeholder_id))
            {
                return Err(ValuationError::not_found(
                    "share",
                    format!("{asset_id}/{stakeholder_id}"),
                ));
            }
            state.ensure_fits(asset_id, &[stakeholder_id], percentage)?;
            if let Some(holders) = state.shares.get_mut(asset_id) {
                holders.insert(stakeholder_id.to_string(), percentage);
            }
            debug!("Updated share of {} in {} to {}%", stakeholder_id, asset_id, percentage);
            Ok(())
        })
    }

    pub fn remove_share(&self, asset_id: &str, stakeholder_id: &str) -> ValuationResult<()> {
        let mut state = self.write();
        let holders = state
            .shares
            .get_mut(asset_id)
            .filter(|holders| holders.contains_key(stakeholder_id))
            .ok_or_else(|| {
                ValuationError::not_found("share", format!("{asset_id}/{stakeholder_id}"))
            })?;
        holders.remove(stakeholder_id);
        if holders.is_empty() {
            state.shares.remove(asset_id);
        }
        debug!("Revoked share of {} in {}", stakeholder_id, asset_id);
        Ok(())
    }

    /// Replaces the shares of `role` members on the asset with an equal split
    /// among its active members. Returns how many shares were created.
    pub fn distribute_equally_among_group(&self, asset_id: &str, role: Role) -> ValuationResult<usize> {
        self.transact(|state| state.distribute(asset_id, role))
    }

    pub fn asset(&self, asset_id: &str) -> ValuationResult<Asset> {
        self.read().asset(asset_id).cloned()
    }

    pub fn assets(&self) -> Vec<Asset> {
        self.read().assets.values().cloned().collect()
    }

    pub fn stakeholder(&self, stakeholder_id: &str) -> ValuationResult<Stakeholder> {
        self.read().stakeholder(stakeholder_id).cloned()
    }

    pub fn stakeholders(&self) -> Vec<Stakeholder> {
        self.read().stakeholders.values().cloned().collect()
    }

    /// All stakeholders holding `role`, active or not.
    pub fn members(&self, role: Role) -> Vec<Stakeholder> {
        self.read()
            .stakeholders
            .values()
            .filter(|s| s.role == role)
            .cloned()
            .collect()
    }

    pub fn shares_for_asset(&self, asset_id: &str) -> Vec<OwnershipShare> {
        self.read().share_rows(asset_id)
    }

    pub fn shares_for_stakeholder(&self, stakeholder_id: &str) -> Vec<OwnershipShare> {
        self.read().holdings(stakeholder_id)
    }

    pub fn allocated_percentage(&self, asset_id: &str) -> Decimal {
        self.read().allocated_excluding(asset_id, &[])
    }

    /// Copies the whole ledger under a single read lock.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            state: self.read().clone(),
        }
    }
}

/// Point-in-time copy of a [`Ledger`]. Reports fold over one snapshot so that
/// concurrent roster changes cannot make their totals disagree.
#[derive(Clone)]
pub struct LedgerSnapshot {
    state: LedgerState,
}

impl LedgerSnapshot {
    pub fn asset(&self, asset_id: &str) -> ValuationResult<&Asset> {
        self.state.asset(asset_id)
    }

    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.state.assets.values()
    }

    pub fn stakeholder(&self, stakeholder_id: &str) -> ValuationResult<&Stakeholder> {
        self.state.stakeholder(stakeholder_id)
    }

    pub fn stakeholders(&self) -> impl Iterator<Item = &Stakeholder> {
        self.state.stakeholders.values()
    }

    pub fn members(&self, role: Role) -> impl Iterator<Item = &Stakeholder> {
        self.stakeholders().filter(move |s| s.role == role)
    }

    pub fn shares_for_asset(&self, asset_id: &str) -> Vec<OwnershipShare> {
        self.state.share_rows(asset_id)
    }

    pub fn shares_for_stakeholder(&self, stakeholder_id: &str) -> Vec<OwnershipShare> {
        self.state.holdings(stakeholder_id)
    }

    pub fn allocated_percentage(&self, asset_id: &str) -> Decimal {
        self.state.allocated_excluding(asset_id, &[])
    }

    /// Applies display fields to the copy only; see [`Ledger::enrich_asset`].
    pub fn enrich_asset(&mut self, asset_id: &str, metadata: &PriceMetadata) {
        if let Some(asset) = self.state.assets.get_mut(asset_id) {
            asset.enrich(metadata);
        }
    }
}
