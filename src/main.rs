use bill_splitter::config::cli::{Cli, Command, ExportArgs};
use bill_splitter::core::export::SplitExporter;
use bill_splitter::core::formatted;
use bill_splitter::domain::model::Split;
use bill_splitter::domain::ports::{BillImage, BillParser, ParseRequest};
use bill_splitter::server::{self, AppState};
use bill_splitter::utils::error::ErrorSeverity;
use bill_splitter::utils::logger;
use bill_splitter::utils::validation::{self, Validate};
use bill_splitter::{AppConfig, ChatCompletionsParser, LocalStorage, SplitEngine, SplitError};
use clap::Parser;
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.log_json {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting bill-splitter");
    tracing::debug!("CLI arguments: {:?}", cli);

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration validation failed: {}", e);
            tracing::error!("Suggestion: {}", e.recovery_suggestion());
            eprintln!("{}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli.command, config).await {
        tracing::error!(
            "bill-splitter failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("{}", e.user_friendly_message());
        eprintln!("Suggestion: {}", e.recovery_suggestion());

        let exit_code = match e.severity() {
            ErrorSeverity::Low => 4,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        std::process::exit(exit_code);
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> bill_splitter::Result<AppConfig> {
    let config = AppConfig::load(path)?;
    config.validate()?;
    Ok(config)
}

fn build_engine(config: &AppConfig) -> bill_splitter::Result<SplitEngine<Box<dyn BillParser>>> {
    let parser: Box<dyn BillParser> = Box::new(ChatCompletionsParser::new(config.parser.clone())?);
    Ok(SplitEngine::new(
        config.intake.clone(),
        parser,
        config.calculator(),
    ))
}

async fn run(command: Command, mut config: AppConfig) -> bill_splitter::Result<()> {
    match command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let state = AppState::new(build_engine(&config)?).with_session_ttl(
                chrono::Duration::minutes(i64::from(config.server.session_ttl_minutes)),
            );
            server::serve(state, &config.server.address()).await
        }
        Command::Split { file, export } => {
            let text = tokio::fs::read_to_string(&file).await?;
            let bill = formatted::parse(&text)?;
            let split = config.calculator().calculate(&bill)?;
            print_split(&split);
            export_split(&split, &export).await
        }
        Command::Process {
            images,
            description,
            export,
        } => {
            let mut request = ParseRequest {
                images: Vec::with_capacity(images.len()),
                description,
                feedback: None,
                previous_output: None,
            };
            for path in &images {
                let mut image = BillImage::new(tokio::fs::read(path).await?);
                image.filename = path.file_name().map(|name| name.to_string_lossy().into_owned());
                request.images.push(image);
            }

            let engine = build_engine(&config)?;
            let session = engine.process(request).await?;
            println!("{}\n", formatted::render(session.bill()));

            match session.current_split() {
                Ok(split) => {
                    print_split(&split);
                    export_split(&split, &export).await
                }
                Err(e) => {
                    eprintln!("Correct the bill above and run `bill-splitter split <file>`.");
                    Err(e)
                }
            }
        }
    }
}

fn print_split(split: &Split) {
    let width = split
        .shares
        .iter()
        .map(|share| share.participant.chars().count())
        .max()
        .unwrap_or(0)
        .max("Total".len());
    for share in &split.shares {
        println!("{:<width$}  {:>10}", share.participant, share.total.to_string(), width = width);
    }
    println!("{:<width$}  {:>10}", "Total", split.total.to_string(), width = width);
}

async fn export_split(split: &Split, args: &ExportArgs) -> Result<(), SplitError> {
    let Some(format) = args.export else {
        return Ok(());
    };
    validation::validate_path("--output-path", &args.output_path)?;
    let exporter = SplitExporter::new(LocalStorage::new(args.output_path.clone()));
    let path = exporter.export(split, &args.name, format).await?;
    tracing::info!("Split saved to: {}/{}", args.output_path, path);
    println!("Split saved to: {}/{}", args.output_path, path);
    Ok(())
}
