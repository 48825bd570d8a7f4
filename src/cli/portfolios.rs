use super::{HistorySource, PortfolioCommand, ui};
use crate::core::model::{Portfolio, PortfolioSnapshot};
use crate::core::valuation::HistoryPoint;
use crate::monitor::{Monitor, PortfolioDetail};
use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::Cell;

pub fn portfolio_list_table(portfolios: &[Portfolio]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("ID"),
        ui::header_cell("Name"),
        ui::header_cell("Created"),
    ]);
    for portfolio in portfolios {
        table.add_row(vec![
            ui::number_cell(portfolio.id.to_string()),
            Cell::new(&portfolio.name),
            Cell::new(portfolio.created_at.format("%Y-%m-%d %H:%M")),
        ]);
    }
    table.to_string()
}

impl PortfolioDetail {
    pub fn display_as_table(&self) -> String {
        let valuation = &self.valuation;
        let mut output = format!(
            "Portfolio: {} {}\n\n",
            ui::style_text(&self.portfolio.name, ui::StyleType::Title),
            ui::style_text(&format!("#{}", self.portfolio.id), ui::StyleType::Subtle)
        );

        if valuation.positions.is_empty() {
            output.push_str("No positions yet");
            return output;
        }
        if !self.trading_day {
            output.push_str(&ui::style_text(
                "Market closed today, values use the last official NAV\n\n",
                ui::StyleType::Subtle,
            ));
        }

        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Fund"),
            ui::header_cell("Shares"),
            ui::header_cell("Cost NAV"),
            ui::header_cell("Est. NAV"),
            ui::header_cell("Change"),
            ui::header_cell("Value"),
            ui::header_cell("Profit"),
            ui::header_cell("Profit %"),
        ]);
        for position in &valuation.positions {
            table.add_row(vec![
                Cell::new(format!("{} ({})", position.fund_name, position.fund_code)),
                ui::number_cell(format!("{:.2}", position.shares)),
                ui::number_cell(format!("{:.4}", position.cost_nav)),
                ui::number_cell(format!("{:.4}", position.est_nav)),
                ui::change_cell(position.est_change_pct),
                ui::number_cell(format!("{:.2}", position.current_value)),
                ui::profit_cell(position.profit),
                ui::change_cell(position.profit_pct),
            ]);
        }
        output.push_str(&table.to_string());

        let total_style_type = if valuation.total_profit >= 0.0 {
            ui::StyleType::TotalValue
        } else {
            ui::StyleType::Error
        };
        output.push_str(&format!(
            "\n\n{} {:.2}  cost {:.2}  profit {}",
            ui::style_text("Total Value:", ui::StyleType::TotalLabel),
            valuation.total_estimate,
            valuation.total_cost,
            ui::style_text(
                &format!(
                    "{:+.2} ({:+.2}%)",
                    valuation.total_profit, valuation.total_profit_pct
                ),
                total_style_type
            )
        ));
        output
    }
}

/// One row of a value history, whichever source it came from.
struct HistoryRow {
    date: NaiveDate,
    total_value: f64,
    total_cost: f64,
    profit_pct: f64,
}

impl From<&PortfolioSnapshot> for HistoryRow {
    fn from(snapshot: &PortfolioSnapshot) -> Self {
        HistoryRow {
            date: snapshot.snapshot_date,
            total_value: snapshot.total_value,
            total_cost: snapshot.total_cost,
            profit_pct: snapshot.profit_pct(),
        }
    }
}

impl From<&HistoryPoint> for HistoryRow {
    fn from(point: &HistoryPoint) -> Self {
        HistoryRow {
            date: point.date,
            total_value: point.total_value,
            total_cost: point.total_cost,
            profit_pct: point.profit_pct,
        }
    }
}

fn history_table(rows: &[HistoryRow]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("Value"),
        ui::header_cell("Cost"),
        ui::header_cell("Profit %"),
    ]);
    for row in rows {
        table.add_row(vec![
            Cell::new(row.date),
            ui::number_cell(format!("{:.2}", row.total_value)),
            ui::number_cell(format!("{:.2}", row.total_cost)),
            ui::change_cell(row.profit_pct),
        ]);
    }
    table.to_string()
}

pub fn snapshot_history_table(snapshots: &[PortfolioSnapshot]) -> String {
    history_table(&snapshots.iter().map(HistoryRow::from).collect::<Vec<_>>())
}

pub fn value_history_table(points: &[HistoryPoint]) -> String {
    history_table(&points.iter().map(HistoryRow::from).collect::<Vec<_>>())
}

pub async fn run(monitor: &Monitor, command: PortfolioCommand) -> Result<()> {
    match command {
        PortfolioCommand::Create { name } => {
            let portfolio = monitor.create_portfolio(&name)?;
            println!("Created portfolio #{} {}", portfolio.id, portfolio.name);
        }
        PortfolioCommand::List => {
            let portfolios = monitor.list_portfolios()?;
            if portfolios.is_empty() {
                println!("No portfolios yet. Create one with `fundmon portfolio create <name>`.");
            } else {
                println!("{}", portfolio_list_table(&portfolios));
            }
        }
        PortfolioCommand::Show { id } => {
            let pb = ui::new_spinner("Valuing positions...");
            let detail = monitor.portfolio_detail(id).await;
            pb.finish_and_clear();
            println!("{}", detail?.display_as_table());
        }
        PortfolioCommand::Rename { id, name } => {
            let portfolio = monitor.rename_portfolio(id, &name)?;
            println!("Renamed portfolio #{} to {}", portfolio.id, portfolio.name);
        }
        PortfolioCommand::Delete { id } => {
            monitor.delete_portfolio(id)?;
            println!("Deleted portfolio #{id}");
        }
        PortfolioCommand::Add {
            id,
            code,
            shares,
            cost_nav,
        } => {
            let lot = monitor.add_position(id, &code, shares, cost_nav)?;
            println!(
                "Added {:.2} shares of {} at {:.4} to portfolio #{}",
                lot.shares, lot.fund_code, lot.cost_nav, lot.portfolio_id
            );
        }
        PortfolioCommand::Remove { id, code } => {
            let removed = monitor.remove_fund(id, &code)?;
            println!("Removed {removed} lot(s) of {code} from portfolio #{id}");
        }
        PortfolioCommand::History { id, source, period } => {
            let table = match source {
                HistorySource::Snapshots => {
                    let snapshots = monitor.snapshot_history(id, period)?;
                    (!snapshots.is_empty()).then(|| snapshot_history_table(&snapshots))
                }
                HistorySource::Nav => {
                    let pb = ui::new_spinner("Fetching NAV history...");
                    let points = monitor.value_history(id, period).await;
                    pb.finish_and_clear();
                    let points = points?;
                    (!points.is_empty()).then(|| value_history_table(&points))
                }
            };
            match table {
                Some(table) => println!("{table}"),
                None => println!("No history for portfolio #{id} in {period}"),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::valuation::{PortfolioValuation, PositionValuation};
    use chrono::NaiveDateTime;

    fn portfolio() -> Portfolio {
        Portfolio {
            id: 3,
            name: "Core".to_string(),
            created_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn test_empty_portfolio_detail() {
        let detail = PortfolioDetail {
            portfolio: portfolio(),
            trading_day: true,
            valuation: PortfolioValuation {
                positions: vec![],
                total_cost: 0.0,
                total_estimate: 0.0,
                total_profit: 0.0,
                total_profit_pct: 0.0,
            },
        };
        assert!(detail.display_as_table().contains("No positions yet"));
    }

    #[test]
    fn test_portfolio_detail_totals() {
        let position = PositionValuation {
            fund_code: "161725".to_string(),
            fund_name: "招商中证白酒".to_string(),
            shares: 1000.0,
            cost_nav: 1.0,
            est_nav: 1.1,
            est_change_pct: 2.0,
            coverage: 0.8,
            cost: 1000.0,
            current_value: 1100.0,
            profit: 100.0,
            profit_pct: 10.0,
            holdings_date: None,
        };
        let detail = PortfolioDetail {
            portfolio: portfolio(),
            trading_day: false,
            valuation: PortfolioValuation {
                positions: vec![position],
                total_cost: 1000.0,
                total_estimate: 1100.0,
                total_profit: 100.0,
                total_profit_pct: 10.0,
            },
        };
        let output = detail.display_as_table();
        assert!(output.contains("Market closed"));
        assert!(output.contains("招商中证白酒 (161725)"));
        assert!(output.contains("+100.00 (+10.00%)"));
    }

    #[test]
    fn test_snapshot_history_uses_derived_profit() {
        let snapshots = vec![PortfolioSnapshot {
            portfolio_id: 3,
            snapshot_date: NaiveDate::from_ymd_opt(2026, 2, 18).unwrap(),
            total_value: 1050.0,
            total_cost: 1000.0,
        }];
        let table = snapshot_history_table(&snapshots);
        assert!(table.contains("2026-02-18"));
        assert!(table.contains("+5.00%"));
    }
}
