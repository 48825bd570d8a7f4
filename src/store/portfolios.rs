use super::{FundStore, decode, encode, id_key, scan_all, scan_keys, scan_prefix};
use crate::core::model::{Portfolio, PortfolioFund, PortfolioSnapshot};
use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

fn position_key(portfolio_id: u64, position_id: u64) -> Vec<u8> {
    let mut key = id_key(portfolio_id);
    key.extend_from_slice(&position_id.to_be_bytes());
    key
}

fn snapshot_key(portfolio_id: u64, date: NaiveDate) -> Vec<u8> {
    let mut key = id_key(portfolio_id);
    key.extend_from_slice(date.format("%Y-%m-%d").to_string().as_bytes());
    key
}

impl FundStore {
    pub fn create_portfolio(&self, name: &str, created_at: NaiveDateTime) -> Result<Portfolio> {
        let portfolio = Portfolio {
            id: self.next_id("portfolio")?,
            name: name.to_string(),
            created_at,
        };
        self.portfolios
            .insert(id_key(portfolio.id), encode(&portfolio)?)
            .context("Failed to store portfolio")?;
        debug!("Created portfolio {} ({})", portfolio.id, portfolio.name);
        Ok(portfolio)
    }

    pub fn get_portfolio(&self, id: u64) -> Result<Option<Portfolio>> {
        self.portfolios
            .get(id_key(id))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// All portfolios, ordered by id.
    pub fn list_portfolios(&self) -> Result<Vec<Portfolio>> {
        scan_all(&self.portfolios)
    }

    pub fn rename_portfolio(&self, id: u64, name: &str) -> Result<Option<Portfolio>> {
        let Some(mut portfolio) = self.get_portfolio(id)? else {
            return Ok(None);
        };
        portfolio.name = name.to_string();
        self.portfolios.insert(id_key(id), encode(&portfolio)?)?;
        Ok(Some(portfolio))
    }

    /// Deletes a portfolio with its lots and snapshots. Returns `false` when
    /// there was nothing to delete.
    pub fn delete_portfolio(&self, id: u64) -> Result<bool> {
        if self.get_portfolio(id)?.is_none() {
            return Ok(false);
        }

        let owner = id_key(id);
        let mut batch = self.keyspace.batch();
        batch.remove(&self.portfolios, owner.clone());
        for key in scan_keys(&self.positions, &owner)? {
            batch.remove(&self.positions, key);
        }
        for key in scan_keys(&self.portfolio_snapshots, &owner)? {
            batch.remove(&self.portfolio_snapshots, key);
        }
        batch
            .commit()
            .with_context(|| format!("Failed to delete portfolio {id}"))?;
        debug!("Deleted portfolio {id}");
        Ok(true)
    }

    /// Inserts a new lot. Lots of the same fund are never merged.
    pub fn add_position(
        &self,
        portfolio_id: u64,
        fund_code: &str,
        shares: f64,
        cost_nav: f64,
        added_at: NaiveDateTime,
    ) -> Result<PortfolioFund> {
        let position = PortfolioFund {
            id: self.next_id("position")?,
            portfolio_id,
            fund_code: fund_code.to_string(),
            shares,
            cost_nav,
            added_at,
        };
        self.positions
            .insert(position_key(portfolio_id, position.id), encode(&position)?)
            .context("Failed to store position")?;
        Ok(position)
    }

    /// Lots of a portfolio in insertion order.
    pub fn positions(&self, portfolio_id: u64) -> Result<Vec<PortfolioFund>> {
        scan_prefix(&self.positions, &id_key(portfolio_id))
    }

    /// Removes every lot of `fund_code` from the portfolio, returning how many went.
    pub fn remove_fund(&self, portfolio_id: u64, fund_code: &str) -> Result<usize> {
        let doomed: Vec<u64> = self
            .positions(portfolio_id)?
            .into_iter()
            .filter(|position| position.fund_code == fund_code)
            .map(|position| position.id)
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        let mut batch = self.keyspace.batch();
        for position_id in &doomed {
            batch.remove(&self.positions, position_key(portfolio_id, *position_id));
        }
        batch.commit()?;
        Ok(doomed.len())
    }

    /// Writes the snapshot, replacing any earlier one for the same portfolio and date.
    pub fn upsert_portfolio_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<()> {
        self.portfolio_snapshots
            .insert(
                snapshot_key(snapshot.portfolio_id, snapshot.snapshot_date),
                encode(snapshot)?,
            )
            .context("Failed to store portfolio snapshot")?;
        Ok(())
    }

    /// Snapshots dated on or after `since`, ascending by date.
    pub fn portfolio_snapshots_since(
        &self,
        portfolio_id: u64,
        since: NaiveDate,
    ) -> Result<Vec<PortfolioSnapshot>> {
        let start = snapshot_key(portfolio_id, since);
        let end = id_key(portfolio_id.saturating_add(1));
        self.portfolio_snapshots
            .range(start..end)
            .map(|item| {
                let (_, value) = item?;
                decode(&value)
            })
            .collect()
    }
}
