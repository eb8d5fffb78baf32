use clap::{Arg, ArgAction, Command};
use log::LevelFilter;
use mail_importer::config::DEFAULT_CONFIG_PATH;
use mail_importer::fields::BeanRegistry;
use mail_importer::memory::{InMemoryFileStore, InMemoryRepository};
use mail_importer::metadata::ImageMetadataExtraction;
use mail_importer::{
    ContentPublisher, ImporterConfig, MailParser, MailProcessor, MimeMailParser, RouteConfig,
};
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("mail-importer")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Imports e-mails as articles and images into a content repository")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (YAML, or TOML with a .toml extension)")
                .default_value(DEFAULT_CONFIG_PATH),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Test configuration validity and list the resolved routes")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("parse-email")
                .long("parse-email")
                .value_name("FILE")
                .help("Parse an .eml file and print the resulting mail record as JSON")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("publish-email")
                .long("publish-email")
                .value_name("FILE")
                .help("Dry run: publish an .eml file into an in-memory repository and print the writes")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("route")
                .long("route")
                .value_name("INDEX")
                .help("Index of the configured route to use with --parse-email/--publish-email")
                .value_parser(clap::value_parser!(usize))
                .default_value("0"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG_PATH);
    let config = match ImporterConfig::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        config.log_level().parse().unwrap_or(LevelFilter::Info)
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();
    log::info!("Loaded configuration from: {}", config_path);

    if matches.get_flag("test-config") {
        test_config(&config);
        return;
    }

    let route_index = matches.get_one::<usize>("route").copied().unwrap_or(0);

    if let Some(email_file) = matches.get_one::<String>("parse-email") {
        let route = select_route(&config, route_index);
        if let Err(e) = parse_email_file(&route, email_file) {
            eprintln!("Error parsing {email_file}: {e:#}");
            process::exit(1);
        }
        return;
    }

    if let Some(email_file) = matches.get_one::<String>("publish-email") {
        let route = select_route(&config, route_index);
        if let Err(e) = publish_email_file(&config, route, email_file).await {
            eprintln!("Error publishing {email_file}: {e:#}");
            process::exit(1);
        }
        return;
    }

    let routes = config.active_routes();
    if routes.is_empty() {
        println!("No active routes configured.");
    }
    for route in &routes {
        println!("{route}");
    }
}

fn generate_default_config(path: &str) {
    let config = ImporterConfig::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e:#}");
            process::exit(1);
        }
    }
}

fn test_config(config: &ImporterConfig) {
    println!("Testing configuration...");
    let routes = config.routes();
    println!("Number of routes: {}", routes.len());
    for (i, route) in routes.iter().enumerate() {
        let state = if route.is_active() { "active" } else { "inactive" };
        println!("  Route {}: {} [{}]", i, route, state);
    }

    match config.validate() {
        Ok(()) => println!("Configuration is valid."),
        Err(e) => {
            println!("Configuration validation failed:");
            println!("Error: {e:#}");
            process::exit(1);
        }
    }
}

/// Configured route at `index`; with no routes configured, index 0 is the
/// template built from the global values.
fn select_route(config: &ImporterConfig, index: usize) -> RouteConfig {
    let mut routes = config.routes();
    if routes.is_empty() && index == 0 {
        return config.template_route();
    }
    if index >= routes.len() {
        eprintln!(
            "No route with index {index}, {} route(s) configured",
            routes.len()
        );
        process::exit(1);
    }
    routes.swap_remove(index)
}

fn parse_email_file(route: &RouteConfig, email_file: &str) -> anyhow::Result<()> {
    use anyhow::Context;

    let raw = std::fs::read(email_file).context("Cannot read email file")?;
    let mail = MimeMailParser::new().parse(&raw, Some(route))?;
    println!("{}", serde_json::to_string_pretty(&mail)?);
    Ok(())
}

async fn publish_email_file(
    config: &ImporterConfig,
    mut route: RouteConfig,
    email_file: &str,
) -> anyhow::Result<()> {
    use anyhow::Context;

    let raw = std::fs::read(email_file).context("Cannot read email file")?;
    route.dump_folder = None;

    let repository = Arc::new(InMemoryRepository::new());
    let files = Arc::new(InMemoryFileStore::new());
    let metadata = ImageMetadataExtraction::from_config(config.metadata_service.as_ref())
        .context("Cannot create image metadata service client")?;
    let publisher = ContentPublisher::new(repository.clone(), files.clone(), Arc::new(metadata))
        .with_registry(BeanRegistry::from_config(config));
    let processor = MailProcessor::new(Arc::new(MimeMailParser::new()), publisher);

    let outcome = processor.process(&raw, &route).await?;
    let report = serde_json::json!({
        "outcome": outcome,
        "writes": repository.writes(),
        "uploads": files.uploads(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
