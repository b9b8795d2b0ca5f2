use super::ui;
use crate::Engine;
use anyhow::Result;
use comfy_table::Cell;

pub async fn run(engine: &Engine) -> Result<()> {
    let entries = engine.cache.entries().await;
    if entries.is_empty() {
        println!("{}", ui::style_text("Price cache is empty", ui::StyleType::Subtle));
        return Ok(());
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Key"),
        ui::header_cell("Vehicle"),
        ui::header_cell("Price"),
        ui::header_cell("Reference"),
        ui::header_cell("Updated"),
    ]);

    for entry in &entries {
        let vehicle = match (&entry.metadata.brand_name, &entry.metadata.model_name) {
            (Some(brand), Some(model)) => format!("{brand} {model}"),
            _ => "N/A".to_string(),
        };
        table.add_row(vec![
            Cell::new(entry.key.to_string()),
            Cell::new(vehicle),
            ui::money_cell(Some(entry.price)),
            Cell::new(entry.metadata.reference_month.as_deref().unwrap_or("N/A")),
            Cell::new(entry.updated_at.format("%Y-%m-%d %H:%M")),
        ]);
    }

    println!(
        "{} ({} entries{})\n\n{}",
        ui::style_text("Cached prices", ui::StyleType::Title),
        entries.len(),
        if engine.store.is_persistent() {
            ""
        } else {
            ", not persisted"
        },
        table
    );
    Ok(())
}
