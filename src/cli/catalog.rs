use super::ui;
use crate::Engine;
use crate::core::model::AssetCategory;
use crate::core::price::CatalogItem;
use anyhow::Result;
use comfy_table::Cell;

/// Lists brands, the models of a brand, or the years of a model.
pub async fn run(
    engine: &Engine,
    category: AssetCategory,
    brand: Option<&str>,
    model: Option<&str>,
) -> Result<()> {
    let pb = ui::new_spinner("Fetching catalog...");
    let (title, items) = match (brand, model) {
        (None, _) => (
            format!("Brands ({category})"),
            engine.catalog.brands(category).await,
        ),
        (Some(brand), None) => (
            format!("Models of brand {brand}"),
            engine.catalog.models(category, brand).await,
        ),
        (Some(brand), Some(model)) => (
            format!("Years of model {model}"),
            engine.catalog.years(category, brand, model).await,
        ),
    };
    pb.finish_and_clear();

    println!("{}", display_items(&title, &items?));
    Ok(())
}

fn display_items(title: &str, items: &[CatalogItem]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Code"), ui::header_cell("Name")]);
    for item in items {
        table.add_row(vec![Cell::new(&item.code), Cell::new(&item.name)]);
    }
    format!(
        "{}\n\n{}",
        ui::style_text(title, ui::StyleType::Title),
        table
    )
}
