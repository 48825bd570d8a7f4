use super::{IndexCommand, ui};
use crate::monitor::{IndexIntraday, IndexSeries, Monitor};
use anyhow::Result;
use chrono::Timelike;
use comfy_table::Cell;

impl IndexSeries {
    pub fn display_as_table(&self) -> String {
        if self.closes.is_empty() {
            return format!("No {} data for {}", self.name, self.period);
        }
        let mut table = ui::new_styled_table();
        table.set_header(vec![ui::header_cell("Date"), ui::header_cell("Close")]);
        for (date, close) in &self.closes {
            table.add_row(vec![Cell::new(date), ui::number_cell(format!("{close:.2}"))]);
        }
        format!(
            "{} ({})\n{}",
            ui::style_text(self.name, ui::StyleType::Title),
            self.period,
            table
        )
    }
}

impl IndexIntraday {
    pub fn display_as_table(&self) -> String {
        let points = &self.trend.points;
        let Some(last) = points.last() else {
            return format!("No intraday data for {}", self.name);
        };

        let mut table = ui::new_styled_table();
        table.set_header(vec![ui::header_cell("Time"), ui::header_cell("Price")]);
        // One row per half hour keeps a full session readable
        for point in points.iter().filter(|p| p.time.minute() % 30 == 0) {
            table.add_row(vec![
                Cell::new(point.time.format("%H:%M")),
                ui::number_cell(format!("{:.2}", point.price)),
            ]);
        }

        let mut output = format!(
            "{} {}\n{}\n",
            ui::style_text(self.name, ui::StyleType::Title),
            last.time.date(),
            table
        );
        output.push_str(&format!(
            "{} {:.2} at {}",
            ui::style_text("Last:", ui::StyleType::TotalLabel),
            last.price,
            last.time.format("%H:%M")
        ));
        if let (Some(pre_close), Some(change)) = (self.trend.pre_close, self.change_pct()) {
            output.push_str(&format!(
                "  previous close {pre_close:.2}  {}",
                ui::change_cell(change).content()
            ));
        }
        output
    }
}

pub async fn run(monitor: &Monitor, command: IndexCommand) -> Result<()> {
    match command {
        IndexCommand::History { period } => {
            let pb = ui::new_spinner("Fetching index history...");
            let series = monitor.index_history(period).await;
            pb.finish_and_clear();
            println!("{}", series.display_as_table());
        }
        IndexCommand::Intraday => {
            let pb = ui::new_spinner("Fetching index trend...");
            let intraday = monitor.index_intraday().await;
            pb.finish_and_clear();
            println!("{}", intraday.display_as_table());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{IndexPoint, IndexTrend};
    use crate::core::period::Period;
    use chrono::NaiveDate;

    fn minute(h: u32, m: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 18)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_index_history_table() {
        let series = IndexSeries {
            name: "沪深300",
            period: Period::SevenDays,
            closes: [(minute(0, 0).date(), 3938.8)].into_iter().collect(),
        };
        let output = series.display_as_table();
        assert!(output.contains("3938.80"));
        assert!(output.contains("(7d)"));

        let empty = IndexSeries {
            closes: Default::default(),
            ..series
        };
        assert_eq!(empty.display_as_table(), "No 沪深300 data for 7d");
    }

    #[test]
    fn test_index_intraday_table() {
        let intraday = IndexIntraday {
            name: "沪深300",
            trend: IndexTrend {
                pre_close: Some(4000.0),
                points: vec![
                    IndexPoint {
                        time: minute(9, 30),
                        price: 4010.0,
                    },
                    IndexPoint {
                        time: minute(9, 31),
                        price: 4011.0,
                    },
                    IndexPoint {
                        time: minute(9, 47),
                        price: 4020.0,
                    },
                ],
            },
        };
        let output = intraday.display_as_table();
        assert!(output.contains("09:30"));
        assert!(!output.contains("09:31"));
        assert!(output.contains("4020.00 at 09:47"));
        assert!(output.contains("+0.50%"));

        let empty = IndexIntraday {
            trend: IndexTrend::default(),
            ..intraday
        };
        assert_eq!(empty.display_as_table(), "No intraday data for 沪深300");
    }
}
