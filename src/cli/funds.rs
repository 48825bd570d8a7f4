use super::{FundCommand, ui};
use crate::core::model::{Fund, Holding, NavHistory};
use crate::monitor::{FundEstimate, HoldingsRefresh, IntradaySeries, Monitor, SetupOutcome};
use anyhow::Result;
use comfy_table::Cell;

fn optional_date<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or("N/A".to_string(), |v| v.to_string())
}

pub fn fund_list_table(funds: &[Fund]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Code"),
        ui::header_cell("Name"),
        ui::header_cell("Type"),
        ui::header_cell("NAV"),
        ui::header_cell("NAV Date"),
    ]);
    for fund in funds {
        table.add_row(vec![
            Cell::new(&fund.fund_code),
            Cell::new(&fund.fund_name),
            Cell::new(&fund.fund_type),
            ui::format_optional_cell(fund.last_nav, |nav| format!("{nav:.4}")),
            Cell::new(optional_date(fund.nav_date)),
        ]);
    }
    table.to_string()
}

pub fn fund_detail(fund: &Fund, holdings: &[Holding]) -> String {
    let mut output = format!(
        "{} {}\n",
        ui::style_text(&fund.fund_name, ui::StyleType::Title),
        ui::style_text(&fund.fund_code, ui::StyleType::Subtle)
    );
    output.push_str(&format!(
        "Type: {}  NAV: {} ({})\n\n",
        fund.fund_type,
        fund.last_nav
            .map_or("N/A".to_string(), |nav| format!("{nav:.4}")),
        optional_date(fund.nav_date)
    ));

    if holdings.is_empty() {
        output.push_str("No holdings disclosed");
        return output;
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Stock"),
        ui::header_cell("Name"),
        ui::header_cell("Weight"),
    ]);
    for holding in holdings {
        table.add_row(vec![
            Cell::new(&holding.stock_code),
            Cell::new(&holding.stock_name),
            ui::number_cell(format!("{:.2}%", holding.holding_ratio * 100.0)),
        ]);
    }
    output.push_str(&table.to_string());
    output.push_str(&format!(
        "\nHoldings as of {}",
        holdings[0].report_date
    ));
    output
}

impl FundEstimate {
    pub fn display_as_table(&self) -> String {
        let mut output = format!(
            "{} {}\n\n",
            ui::style_text(&self.fund_name, ui::StyleType::Title),
            ui::style_text(&self.fund_code, ui::StyleType::Subtle)
        );

        if !self.trading_day {
            output.push_str(&ui::style_text(
                "Market closed today, showing the last official NAV\n\n",
                ui::StyleType::Subtle,
            ));
        }

        let estimate = &self.estimate;
        if !estimate.details.is_empty() {
            let mut table = ui::new_styled_table();
            table.set_header(vec![
                ui::header_cell("Stock"),
                ui::header_cell("Name"),
                ui::header_cell("Weight"),
                ui::header_cell("Price"),
                ui::header_cell("Change"),
                ui::header_cell("Contribution"),
            ]);
            for detail in &estimate.details {
                table.add_row(vec![
                    Cell::new(&detail.stock_code),
                    Cell::new(&detail.stock_name),
                    ui::number_cell(format!("{:.2}%", detail.holding_ratio * 100.0)),
                    ui::number_cell(format!("{:.2}", detail.price)),
                    ui::change_cell(detail.change_pct),
                    ui::change_cell(detail.contribution),
                ]);
            }
            output.push_str(&table.to_string());
            output.push_str("\n\n");
        }

        output.push_str(&format!(
            "{} {:.4} ({:+.2}%)  last NAV {:.4}  coverage {:.2}%",
            ui::style_text("Estimated NAV:", ui::StyleType::TotalLabel),
            estimate.est_nav,
            estimate.est_change_pct,
            estimate.last_nav,
            estimate.coverage * 100.0
        ));
        if let Some(date) = self.holdings_date {
            output.push_str(&format!("\nHoldings as of {date}"));
        }
        output
    }
}

pub fn nav_history_table(history: &NavHistory) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Date"), ui::header_cell("NAV")]);
    for (date, nav) in history {
        table.add_row(vec![Cell::new(date), ui::number_cell(format!("{nav:.4}"))]);
    }
    table.to_string()
}

impl IntradaySeries {
    pub fn display_as_table(&self) -> String {
        if self.points.is_empty() {
            return format!("No estimates recorded for {} on {}", self.fund_code, self.date);
        }
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Time"),
            ui::header_cell("Est. NAV"),
            ui::header_cell("Change"),
        ]);
        for point in &self.points {
            table.add_row(vec![
                Cell::new(point.snapshot_time.format("%H:%M:%S")),
                ui::number_cell(format!("{:.4}", point.est_nav)),
                ui::change_cell(point.est_change_pct),
            ]);
        }
        format!(
            "{} on {} (last NAV {})\n{}",
            ui::style_text(&self.fund_code, ui::StyleType::Title),
            self.date,
            self.last_nav
                .map_or("N/A".to_string(), |nav| format!("{nav:.4}")),
            table
        )
    }
}

pub async fn run(monitor: &Monitor, command: FundCommand) -> Result<()> {
    match command {
        FundCommand::Setup { code } => {
            let pb = ui::new_spinner(&format!("Fetching {code}..."));
            let outcome = monitor.setup_fund(&code).await;
            pb.finish_and_clear();
            match outcome? {
                SetupOutcome::Exists(fund) => {
                    println!("{} ({}) is already tracked", fund.fund_name, fund.fund_code)
                }
                SetupOutcome::Created {
                    fund,
                    holdings_count,
                } => println!(
                    "Tracking {} ({}) with {} holdings",
                    fund.fund_name, fund.fund_code, holdings_count
                ),
            }
        }
        FundCommand::Show { code } => {
            let fund = monitor.fund(&code)?;
            let holdings = monitor.holdings(&code)?;
            println!("{}", fund_detail(&fund, &holdings));
        }
        FundCommand::List => {
            let funds = monitor.list_funds()?;
            if funds.is_empty() {
                println!("No funds tracked yet. Add one with `fundmon fund setup <code>`.");
            } else {
                println!("{}", fund_list_table(&funds));
            }
        }
        FundCommand::Estimate { code } => {
            let pb = ui::new_spinner("Fetching quotes...");
            let estimate = monitor.estimate_fund(&code).await;
            pb.finish_and_clear();
            println!("{}", estimate?.display_as_table());
        }
        FundCommand::RefreshNav { code } => {
            let nav = monitor.refresh_nav(&code).await?;
            println!("{code}: NAV {:.4} as of {}", nav.nav, nav.nav_date);
        }
        FundCommand::RefreshHoldings { code } => {
            let pb = ui::new_spinner(&format!("Fetching holdings of {code}..."));
            let outcome = monitor.refresh_holdings(&code).await;
            pb.finish_and_clear();
            match outcome? {
                HoldingsRefresh::Updated {
                    report_date,
                    holdings_count,
                } => println!("{code}: {holdings_count} holdings as of {report_date}"),
                HoldingsRefresh::Unchanged { report_date } => println!(
                    "{code}: holdings already current ({})",
                    optional_date(report_date)
                ),
            }
        }
        FundCommand::History { code, period } => {
            let history = monitor.nav_history(&code, period).await?;
            if history.is_empty() {
                println!("No NAV history for {code} in {period}");
            } else {
                println!("{}", nav_history_table(&history));
            }
        }
        FundCommand::Intraday { code } => {
            println!("{}", monitor.intraday(&code)?.display_as_table());
        }
    }
    Ok(())
}
