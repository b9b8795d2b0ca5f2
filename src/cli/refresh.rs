use super::ui;
use crate::Engine;
use crate::core::refresh::{RefreshOutcome, RefreshSummary};
use anyhow::Result;
use comfy_table::Cell;

impl RefreshSummary {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Asset"),
            ui::header_cell("Price"),
            ui::header_cell("Source"),
            ui::header_cell("Status"),
        ]);

        for outcome in &self.outcomes {
            let status = if outcome.updated {
                Cell::new("updated")
            } else {
                Cell::new(ui::style_text("failed", ui::StyleType::Error))
            };
            table.add_row(vec![
                Cell::new(&outcome.asset_id),
                ui::money_cell(outcome.source.is_priced().then_some(outcome.price)),
                ui::source_cell(outcome.source),
                status,
            ]);
        }

        format!(
            "{}\n\n{}\n\n{} updated, {} failed",
            ui::style_text("Price refresh", ui::StyleType::Title),
            table,
            ui::style_text(&self.updated.to_string(), ui::StyleType::TotalValue),
            ui::style_text(&self.failed.to_string(), ui::StyleType::Error)
        )
    }
}

pub async fn run(engine: &Engine) -> Result<()> {
    let total = engine.ledger.assets().len() as u64;
    let pb = ui::new_progress_bar(total, true);
    pb.set_message("Refreshing prices...");

    let on_progress = |outcome: &RefreshOutcome| {
        pb.set_message(outcome.asset_id.clone());
        pb.inc(1);
    };
    let summary = engine.scheduler.refresh_all(&on_progress).await;
    pb.finish_and_clear();

    println!("{}", summary.display_as_table());
    Ok(())
}
