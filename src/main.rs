use std::io::{stdin, stdout, Write};
use std::sync::Arc;

use anyhow::{Context, Error};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use institute_sql_chat::api::{self, AppState};
use institute_sql_chat::chain::Chain;
use institute_sql_chat::config::Config;
use institute_sql_chat::database::PgDatabase;
use institute_sql_chat::llm::OllamaModel;
use institute_sql_chat::text_to_sql_chain::TextToSqlChain;

#[derive(Parser)]
#[command(
    name = "institute_sql_chat",
    about = "Ask questions about institute data in plain language"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Answer one question and exit; prompts when no question is given
    Ask { question: Option<String> },
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Ask { question } => ask(config, question).await,
    }
}

async fn serve(config: Config) -> Result<(), Error> {
    let db = Arc::new(
        PgDatabase::connect(
            &config.database_url,
            config.db_max_connections,
            config.db_acquire_timeout,
        )
        .await?,
    );
    let model = Arc::new(OllamaModel::new(
        &config.ollama_host,
        config.ollama_port,
        config.llm_model.clone(),
        config.llm_timeout,
    ));
    let chain = TextToSqlChain::from_config(&config, db.clone(), model).await?;

    let app = api::router(AppState {
        chain: Arc::new(chain),
        students: db,
    });

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(%bind_addr, model = %config.llm_model, "server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ask(config: Config, question: Option<String>) -> Result<(), Error> {
    let processor = TextToSqlChain::initialize(&config).await?;

    let input = match question {
        Some(question) => question,
        None => {
            let mut input = String::new();
            print!("How can I help you?: ");
            stdout().flush()?;
            stdin().read_line(&mut input)?;
            input
        }
    };

    let answer = processor.run(input).await?;
    println!("{answer}");

    Ok(())
}
