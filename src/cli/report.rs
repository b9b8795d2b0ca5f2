use super::ui;
use crate::Engine;
use crate::core::model::Role;
use crate::core::patrimony::{
    CollectivePatrimony, FullReport, GroupPatrimony, StakeholderPatrimony,
};
use anyhow::Result;
use comfy_table::{Cell, CellAlignment};

impl StakeholderPatrimony {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Asset"),
            ui::header_cell("Share"),
            ui::header_cell("Price"),
            ui::header_cell("Value"),
            ui::header_cell("Source"),
        ]);

        for asset in &self.assets {
            let label = if asset.collective {
                format!("{} *", asset.label)
            } else {
                asset.label.clone()
            };
            table.add_row(vec![
                Cell::new(label),
                ui::percentage_cell(asset.percentage),
                ui::money_cell(asset.price),
                ui::money_cell(asset.share_value),
                ui::source_cell(asset.source),
            ]);
        }

        let mut output = format!(
            "{} ({}{})\n\n",
            ui::style_text(&self.stakeholder.name, ui::StyleType::Title),
            self.stakeholder.role,
            if self.stakeholder.active { "" } else { ", inactive" }
        );

        if self.assets.is_empty() {
            output.push_str(&ui::style_text("No shares held", ui::StyleType::Subtle));
        } else {
            output.push_str(&table.to_string());
        }

        output.push_str(&format!(
            "\n\n{}: {}",
            ui::style_text("Total", ui::StyleType::TotalLabel),
            ui::style_text(&ui::format_brl(self.total), ui::StyleType::TotalValue)
        ));
        let unpriced = self.unpriced_count();
        if unpriced > 0 {
            output.push_str(&format!(
                "\n{}",
                ui::style_text(
                    &format!("{unpriced} asset(s) could not be priced and are excluded"),
                    ui::StyleType::Error
                )
            ));
        }
        output
    }
}

impl GroupPatrimony {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("#"),
            ui::header_cell("Stakeholder"),
            ui::header_cell("Patrimony"),
        ]);

        for entry in &self.ranking {
            table.add_row(vec![
                Cell::new(entry.position).set_alignment(CellAlignment::Right),
                Cell::new(&entry.name),
                ui::money_cell(Some(entry.total)),
            ]);
        }

        let mut output = format!(
            "Group: {}\n\n",
            ui::style_text(&self.role.to_string(), ui::StyleType::Title)
        );
        if self.ranking.is_empty() {
            output.push_str(&ui::style_text("No members", ui::StyleType::Subtle));
        } else {
            output.push_str(&table.to_string());
        }
        output.push_str(&format!(
            "\n\n{}: {}\n{}: {}",
            ui::style_text("Sum", ui::StyleType::TotalLabel),
            ui::style_text(&ui::format_brl(self.sum), ui::StyleType::TotalValue),
            ui::style_text("Average", ui::StyleType::TotalLabel),
            ui::format_brl(self.average)
        ));
        output
    }
}

impl CollectivePatrimony {
    pub fn display_as_table(&self) -> String {
        let mut assets = ui::new_styled_table();
        assets.set_header(vec![
            ui::header_cell("Asset"),
            ui::header_cell("Price"),
            ui::header_cell("Source"),
        ]);
        for asset in &self.assets {
            assets.add_row(vec![
                Cell::new(&asset.label),
                ui::money_cell(asset.price),
                ui::source_cell(asset.source),
            ]);
        }

        let mut members = ui::new_styled_table();
        members.set_header(vec![
            ui::header_cell("Member"),
            ui::header_cell("Share of collective assets"),
        ]);
        for member in &self.per_member {
            let name = if member.active {
                member.name.clone()
            } else {
                format!("{} (inactive)", member.name)
            };
            members.add_row(vec![Cell::new(name), ui::money_cell(Some(member.share_value))]);
        }

        let mut output = format!(
            "{}\n\n",
            ui::style_text("Collective assets", ui::StyleType::Title)
        );
        if self.assets.is_empty() {
            output.push_str(&ui::style_text("No collective assets", ui::StyleType::Subtle));
            return output;
        }
        output.push_str(&assets.to_string());
        output.push_str("\n\n");
        output.push_str(&members.to_string());
        output.push_str(&format!(
            "\n\n{} ({} assets): {}",
            ui::style_text("Total value", ui::StyleType::TotalLabel),
            self.asset_count,
            ui::style_text(&ui::format_brl(self.total_value), ui::StyleType::TotalValue)
        ));
        if self.unpriced_count > 0 {
            output.push_str(&format!(
                "\n{}",
                ui::style_text(
                    &format!("{} asset(s) could not be priced", self.unpriced_count),
                    ui::StyleType::Error
                )
            ));
        }
        output
    }
}

pub async fn run_full(engine: &Engine) -> Result<()> {
    let pb = ui::new_spinner("Resolving prices...");
    let report: FullReport = engine.aggregator.full_report().await;
    pb.finish_and_clear();

    for stakeholder in &report.stakeholders {
        println!("{}", stakeholder.display_as_table());
        ui::print_separator();
    }
    println!("{}", report.group.display_as_table());
    ui::print_separator();
    println!("{}", report.collective.display_as_table());

    let term_width = console::Term::stdout()
        .size_checked()
        .map(|(_, w)| w as usize)
        .unwrap_or(80);
    println!("\n{}", "=".repeat(term_width));
    let total_str = format!("Grand Total: {}", ui::format_brl(report.grand_total));
    let styled_total = console::style(&total_str).bold().green();
    println!("{styled_total:>term_width$}");
    Ok(())
}

pub async fn run_stakeholder(engine: &Engine, stakeholder_id: &str) -> Result<()> {
    let pb = ui::new_spinner("Resolving prices...");
    let patrimony = engine.aggregator.stakeholder_patrimony(stakeholder_id).await;
    pb.finish_and_clear();

    println!("{}", patrimony?.display_as_table());
    Ok(())
}

pub async fn run_group(engine: &Engine, role: Role) -> Result<()> {
    let pb = ui::new_spinner("Resolving prices...");
    let group = engine.aggregator.group_patrimony(role).await;
    pb.finish_and_clear();

    println!("{}", group.display_as_table());
    Ok(())
}

pub async fn run_collective(engine: &Engine) -> Result<()> {
    let pb = ui::new_spinner("Resolving prices...");
    let collective = engine.aggregator.collective_asset_patrimony().await;
    pb.finish_and_clear();

    println!("{}", collective.display_as_table());
    Ok(())
}
