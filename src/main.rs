use std::path::PathBuf;

use chrono::Local;
use clap::Parser;
use svc_principals::{
    completion::{is_principal_context, text_before, DocumentLanguage, PrincipalCatalog},
    config::{Command, Config},
    info_time,
    process::process_site,
    Error, Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    match config.command.clone() {
        Some(Command::Suggest {
            file,
            line,
            column,
            language,
            catalog,
        }) => {
            let catalog = catalog.unwrap_or_else(|| config.output_path());
            suggest(file, line, column, language, catalog).await
        }
        None => scrape(&config).await,
    }
}

async fn scrape(config: &Config) -> Result<()> {
    let start_time = Local::now();
    let report = process_site(config).await?;

    let summary = report.summary;
    println!("Found {} service principals:", summary.total);
    println!("- Documentation only: {}", summary.documentation_only);
    println!("- Policy Generator only: {}", summary.policy_generator_only);
    println!("- Both sources: {}", summary.both);
    println!("\nResults saved to {}", report.output_path.display());

    info_time!(start_time, "Full program time:");
    Ok(())
}

async fn suggest(
    file: PathBuf,
    line: usize,
    column: usize,
    language: Option<DocumentLanguage>,
    catalog: PathBuf,
) -> Result<()> {
    let language = language
        .or_else(|| DocumentLanguage::from_path(&file))
        .ok_or_else(|| Error::Config(format!("can't infer the language of {}", file.display())))?;

    let document = tokio::fs::read_to_string(&file).await?;
    if !is_principal_context(&text_before(&document, line, column), language) {
        return Ok(());
    }

    let catalog = PrincipalCatalog::load(&catalog).await?;
    for principal in catalog.principals() {
        println!("{principal}");
    }
    Ok(())
}
