use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use fipeval::core::log::init_logging;
use fipeval::core::model::{AssetCategory, Role};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for fipeval::AppCommand {
    fn from(cmd: Commands) -> fipeval::AppCommand {
        match cmd {
            Commands::Report => fipeval::AppCommand::Report,
            Commands::Stakeholder { id } => fipeval::AppCommand::Stakeholder(id),
            Commands::Group { role } => fipeval::AppCommand::Group(role),
            Commands::Collective => fipeval::AppCommand::Collective,
            Commands::Refresh => fipeval::AppCommand::Refresh,
            Commands::Cache => fipeval::AppCommand::Cache,
            Commands::Catalog {
                category,
                brand,
                model,
            } => fipeval::AppCommand::Catalog {
                category,
                brand,
                model,
            },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Display the full patrimony report
    Report,
    /// Display the patrimony of one stakeholder
    Stakeholder {
        /// Stakeholder id from the configuration
        id: String,
    },
    /// Display the ranked patrimony of a role
    Group {
        /// partner or investor
        #[arg(default_value = "partner")]
        role: Role,
    },
    /// Display the value of collectively owned assets
    Collective,
    /// Re-fetch every asset price from FIPE
    Refresh,
    /// List cached prices
    Cache,
    /// Browse FIPE brand, model and year codes
    Catalog {
        /// cars, motorcycles or trucks
        category: AssetCategory,
        /// Brand code; lists brands when omitted
        brand: Option<String>,
        /// Model code; lists models of the brand when omitted
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => fipeval::cli::setup::setup(),
        Some(cmd) => fipeval::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
