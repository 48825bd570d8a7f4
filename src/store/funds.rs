use super::{FundStore, compound_key, decode, encode, owner_prefix, scan_all, scan_keys, scan_prefix};
use crate::core::model::{EstimateSnapshot, Fund, Holding};
use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use fjall::Batch;
use tracing::debug;

const DATE_KEY_FORMAT: &str = "%Y-%m-%d";
// Fractional seconds keep snapshots taken within the same second apart
const TIME_KEY_FORMAT: &str = "%H:%M:%S%.f";

fn holding_key(fund_code: &str, index: usize) -> Vec<u8> {
    compound_key(&[fund_code.as_bytes(), &(index as u32).to_be_bytes()])
}

fn estimate_day_prefix(fund_code: &str, date: NaiveDate) -> Vec<u8> {
    let mut prefix = compound_key(&[
        fund_code.as_bytes(),
        date.format(DATE_KEY_FORMAT).to_string().as_bytes(),
    ]);
    prefix.push(super::SEPARATOR);
    prefix
}

impl FundStore {
    pub fn upsert_fund(&self, fund: &Fund) -> Result<()> {
        self.funds
            .insert(fund.fund_code.as_bytes(), encode(fund)?)
            .with_context(|| format!("Failed to store fund {}", fund.fund_code))?;
        Ok(())
    }

    /// Stores a fund together with its holdings in one atomic write.
    pub fn save_fund_with_holdings(&self, fund: &Fund, holdings: &[Holding]) -> Result<()> {
        let mut batch = self.keyspace.batch();
        batch.insert(&self.funds, fund.fund_code.as_bytes(), encode(fund)?);
        self.stage_holdings(&mut batch, &fund.fund_code, holdings)?;
        batch
            .commit()
            .with_context(|| format!("Failed to store fund {}", fund.fund_code))?;
        debug!(
            "Stored fund {} with {} holdings",
            fund.fund_code,
            holdings.len()
        );
        Ok(())
    }

    pub fn get_fund(&self, fund_code: &str) -> Result<Option<Fund>> {
        self.funds
            .get(fund_code.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// All funds, ordered by code.
    pub fn list_funds(&self) -> Result<Vec<Fund>> {
        scan_all(&self.funds)
    }

    /// Records a newly published NAV. Returns `false` when the fund is unknown.
    pub fn update_nav(
        &self,
        fund_code: &str,
        nav: f64,
        nav_date: NaiveDate,
        updated_at: NaiveDateTime,
    ) -> Result<bool> {
        let Some(mut fund) = self.get_fund(fund_code)? else {
            return Ok(false);
        };
        fund.last_nav = Some(nav);
        fund.nav_date = Some(nav_date);
        fund.updated_at = updated_at;
        self.upsert_fund(&fund)?;
        Ok(true)
    }

    /// Swaps the stored holdings of a fund for a newer report.
    pub fn replace_holdings(&self, fund_code: &str, holdings: &[Holding]) -> Result<()> {
        let mut batch = self.keyspace.batch();
        self.stage_holdings(&mut batch, fund_code, holdings)?;
        batch
            .commit()
            .with_context(|| format!("Failed to replace holdings of {fund_code}"))?;
        Ok(())
    }

    fn stage_holdings(&self, batch: &mut Batch, fund_code: &str, holdings: &[Holding]) -> Result<()> {
        for key in scan_keys(&self.holdings, &owner_prefix(fund_code))? {
            batch.remove(&self.holdings, key);
        }
        for (index, holding) in holdings.iter().enumerate() {
            batch.insert(&self.holdings, holding_key(fund_code, index), encode(holding)?);
        }
        Ok(())
    }

    /// Holdings in report order.
    pub fn holdings(&self, fund_code: &str) -> Result<Vec<Holding>> {
        scan_prefix(&self.holdings, &owner_prefix(fund_code))
    }

    pub fn append_estimate_snapshot(&self, snapshot: &EstimateSnapshot) -> Result<()> {
        let mut key = estimate_day_prefix(&snapshot.fund_code, snapshot.snapshot_date);
        key.extend_from_slice(
            snapshot
                .snapshot_time
                .format(TIME_KEY_FORMAT)
                .to_string()
                .as_bytes(),
        );
        self.estimate_snapshots.insert(key, encode(snapshot)?)?;
        Ok(())
    }

    /// Estimate snapshots of one fund on one day, ordered by time.
    pub fn estimate_snapshots_on(
        &self,
        fund_code: &str,
        date: NaiveDate,
    ) -> Result<Vec<EstimateSnapshot>> {
        scan_prefix(
            &self.estimate_snapshots,
            &estimate_day_prefix(fund_code, date),
        )
    }
}
