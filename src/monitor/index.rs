//! The CSI 300 benchmark shown next to fund and portfolio charts.

use super::Monitor;
use crate::core::estimate::round_to;
use crate::core::model::{IndexHistory, IndexTrend};
use crate::core::period::Period;
use serde::Serialize;
use tracing::debug;

pub const BENCHMARK_NAME: &str = "沪深300";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexSeries {
    pub name: &'static str,
    pub period: Period,
    pub closes: IndexHistory,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexIntraday {
    pub name: &'static str,
    #[serde(flatten)]
    pub trend: IndexTrend,
}

impl IndexIntraday {
    /// Latest price against the previous close, in percent.
    pub fn change_pct(&self) -> Option<f64> {
        let pre_close = self.trend.pre_close.filter(|p| *p > 0.0)?;
        let last = self.trend.points.last()?;
        Some(round_to((last.price - pre_close) / pre_close * 100.0, 2))
    }
}

impl Monitor {
    /// Daily closes of the benchmark within the period, ascending. Empty when
    /// the source has nothing.
    pub async fn index_history(&self, period: Period) -> IndexSeries {
        let today = self.now().date_naive();
        let cutoff = period.cutoff(today);
        let key = (today, period);

        let closes = match self.index_histories.get(&key).await {
            Some(closes) => closes,
            None => {
                let fetched = self.sources.index.get_index_history(cutoff, today).await;
                let closes: IndexHistory = fetched
                    .range(cutoff..=today)
                    .map(|(d, close)| (*d, *close))
                    .collect();
                debug!("{} index closes for {}", closes.len(), period);
                if !closes.is_empty() {
                    self.index_histories.set(key, closes.clone(), None).await;
                }
                closes
            }
        };

        IndexSeries {
            name: BENCHMARK_NAME,
            period,
            closes,
        }
    }

    /// Minute prices of the latest session. Not cached.
    pub async fn index_intraday(&self) -> IndexIntraday {
        IndexIntraday {
            name: BENCHMARK_NAME,
            trend: self.sources.index.get_index_intraday().await,
        }
    }
}
