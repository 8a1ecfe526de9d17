//! newsdesk service and CLI
//!
//! Runs the local HTTP API (`serve`) or answers one-off queries against the
//! same gateway, cache and store from the command line.

use anyhow::Result;
use chrono::Duration;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use newsdesk::analytics::AnalyticsReport;
use newsdesk::cache::CacheConfig;
use newsdesk::client::{GNewsClient, HttpClientConfig};
use newsdesk::clock::{Clock, SystemClock};
use newsdesk::config::Config;
use newsdesk::export::generate_csv;
use newsdesk::gateway::{NetworkStatus, NewsGateway};
use newsdesk::payout::{AggregationEngine, RateBook};
use newsdesk::schemas::{
    ArticleType, Category, FilterOptions, NewsResponse, PayoutData, PayoutRate, SortBy, SortOrder,
};
use newsdesk::server::{start_server, AppState};
use newsdesk::store::{FileStore, OfflineStore};

/// newsdesk - news analytics and payout service
#[derive(Parser, Debug)]
#[command(name = "newsdesk")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "News fetching, caching and payout analytics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, default_value = "false", global = true)]
    json_logs: bool,

    /// Never call the news API; serve stored articles only
    #[arg(long, global = true)]
    offline: bool,
}

#[derive(Args, Debug, Default)]
struct SearchArgs {
    /// Search text
    #[arg(short, long)]
    query: Option<String>,

    #[arg(long)]
    author: Option<String>,

    #[arg(long)]
    source: Option<String>,

    #[arg(long)]
    category: Option<Category>,

    /// Article type (news, blog)
    #[arg(long = "type")]
    article_type: Option<ArticleType>,

    /// Start date (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    from: Option<String>,

    /// End date (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    to: Option<String>,

    /// Sort field (date, relevance, popularity)
    #[arg(long)]
    sort_by: Option<SortBy>,

    /// Sort order (asc, desc)
    #[arg(long)]
    sort_order: Option<SortOrder>,
}

impl From<SearchArgs> for FilterOptions {
    fn from(args: SearchArgs) -> Self {
        FilterOptions {
            query: args.query,
            author: args.author,
            source: args.source,
            category: args.category,
            article_type: args.article_type,
            from_date: args.from,
            to_date: args.to,
            sort_by: args.sort_by,
            sort_order: args.sort_order,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Table,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port override (defaults to SERVER_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Search articles
    Search {
        #[command(flatten)]
        filters: SearchArgs,

        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },

    /// Fetch top headlines
    Headlines {
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },

    /// Payouts for a search result
    Payouts {
        #[command(flatten)]
        filters: SearchArgs,

        /// Group by author instead of source
        #[arg(long)]
        by_author: bool,
    },

    /// Grouped analytics for a search result
    Analytics {
        #[command(flatten)]
        filters: SearchArgs,
    },

    /// Write a CSV payout report
    Export {
        #[command(flatten)]
        filters: SearchArgs,

        /// Output file (stdout when omitted)
        #[arg(short = 'f', long)]
        file: Option<std::path::PathBuf>,
    },

    /// Manage payout rates
    Rates {
        #[command(subcommand)]
        action: RateAction,
    },

    /// Show cache, quota and store status
    Status,
}

#[derive(Subcommand, Debug)]
enum RateAction {
    /// List configured rates
    List,

    /// Add or update a rate
    Set {
        /// Source name (use "Default" for the fallback rule)
        #[arg(long, conflicts_with = "author", required_unless_present = "author")]
        source: Option<String>,

        #[arg(long)]
        author: Option<String>,

        /// Amount per article
        #[arg(long)]
        rate: f64,
    },

    /// Delete a rate by id
    Delete {
        id: String,
    },
}

/// Sets up structured logging with tracing
fn setup_logging(log_level: &str, json_output: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

/// Everything the commands share
struct Services {
    config: Config,
    gateway: Arc<NewsGateway>,
    store: Arc<dyn OfflineStore>,
    clock: Arc<dyn Clock>,
}

impl Services {
    async fn build(config: Config, offline: bool) -> Result<Self> {
        if !config.has_api_key() {
            warn!("GNEWS_API_KEY is not set; remote calls will be rejected upstream");
        }

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store: Arc<dyn OfflineStore> = Arc::new(FileStore::open(&config.data_dir).await?);
        let client = GNewsClient::new(HttpClientConfig::from_config(&config))?;

        let cache_config = CacheConfig {
            freshness: Duration::from_std(config.cache_freshness()?)?,
            daily_limit: config.daily_request_limit,
        };
        let network = Arc::new(NetworkStatus::new(!(offline || config.offline)));

        let gateway = NewsGateway::open(
            Arc::new(client),
            store.clone(),
            cache_config,
            network,
            clock.clone(),
        )
        .await;

        Ok(Self {
            config,
            gateway: Arc::new(gateway),
            store,
            clock,
        })
    }

    fn rate_book(&self) -> RateBook {
        RateBook::new(self.store.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs);

    let config = Config::load()?;
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        base_url = %config.gnews_base_url,
        daily_limit = config.daily_request_limit,
        data_dir = %config.data_dir.display(),
        "Configuration loaded"
    );

    let services = Services::build(config, cli.offline).await?;

    match cli.command {
        Commands::Serve { port } => serve(services, port).await?,
        Commands::Search { filters, output } => {
            let response = services.gateway.search(&filters.into()).await;
            print_news(&response, output)?;
        }
        Commands::Headlines { output } => {
            let response = services.gateway.headlines().await;
            print_news(&response, output)?;
        }
        Commands::Payouts { filters, by_author } => {
            show_payouts(&services, filters.into(), by_author).await?;
        }
        Commands::Analytics { filters } => {
            let response = services.gateway.search(&filters.into()).await;
            let rates = services.rate_book().load().await?;
            let report = AnalyticsReport::build(
                &response.articles,
                &rates,
                &AggregationEngine::new(),
                services.clock.today(),
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Export { filters, file } => {
            let response = services.gateway.search(&filters.into()).await;
            let rates = services.rate_book().load().await?;
            let rows = AggregationEngine::new().calculate_payouts(&response.articles, &rates);
            let csv = generate_csv(&rows)?;
            match file {
                Some(path) => {
                    tokio::fs::write(&path, csv).await?;
                    info!(path = %path.display(), rows = rows.len(), "Payout report written");
                }
                None => print!("{csv}"),
            }
        }
        Commands::Rates { action } => manage_rates(&services, action).await?,
        Commands::Status => show_status(&services).await?,
    }

    Ok(())
}

async fn serve(services: Services, port: Option<u16>) -> Result<()> {
    let mut addr = services.config.server_addr()?;
    if let Some(port) = port {
        addr.set_port(port);
    }

    let state = Arc::new(AppState {
        gateway: services.gateway.clone(),
        rates: services.rate_book(),
        engine: AggregationEngine::new(),
        clock: services.clock.clone(),
        metrics_enabled: services.config.metrics_enabled,
    });

    tokio::select! {
        result = start_server(addr, state) => result?,
        _ = shutdown_signal() => {}
    }

    info!("newsdesk stopped");
    Ok(())
}

fn print_news(response: &NewsResponse, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(response)?),
        OutputFormat::Table => {
            println!(
                "\n{:<20} {:<14} {:<5} {}",
                "Source", "Category", "Min", "Title"
            );
            println!("{}", "-".repeat(90));
            for article in &response.articles {
                println!(
                    "{:<20} {:<14} {:<5} {}",
                    truncate(&article.source.name, 20),
                    article.category.as_str(),
                    article.read_time,
                    truncate(&article.title, 60)
                );
            }
            println!(
                "\n{} articles shown, {} total, status: {}",
                response.articles.len(),
                response.total_articles,
                response.status.as_str()
            );
            if let Some(error) = &response.error {
                println!("note: {error}");
            }
        }
    }
    Ok(())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let cut: String = text.chars().take(width.saturating_sub(1)).collect();
    format!("{cut}…")
}

fn print_payout_rows(rows: &[PayoutData]) {
    println!("\n{:<30} {:>8} {:>10} {:>12}", "Name", "Articles", "Rate", "Total");
    println!("{}", "-".repeat(64));
    for row in rows {
        let name = row.author.as_deref().unwrap_or(&row.source);
        println!(
            "{:<30} {:>8} {:>10.2} {:>12.2}",
            truncate(name, 30),
            row.articles,
            row.rate,
            row.total
        );
    }
}

async fn show_payouts(services: &Services, filters: FilterOptions, by_author: bool) -> Result<()> {
    let response = services.gateway.search(&filters).await;
    let rates = services.rate_book().load().await?;
    let engine = AggregationEngine::new();

    let rows = if by_author {
        engine.payouts_by_author(&response.articles, &rates)
    } else {
        engine.calculate_payouts(&response.articles, &rates)
    };
    print_payout_rows(&rows);
    println!(
        "\nTotal payout: {:.2} (status: {})",
        engine.total_payout(&response.articles, &rates),
        response.status.as_str()
    );
    Ok(())
}

async fn manage_rates(services: &Services, action: RateAction) -> Result<()> {
    let book = services.rate_book();
    match action {
        RateAction::List => {
            let rates = book.load().await?;
            println!("\n{:<38} {:<8} {:<30} {:>8}", "ID", "Type", "Target", "Rate");
            println!("{}", "-".repeat(88));
            for rate in &rates {
                println!(
                    "{:<38} {:<8} {:<30} {:>8.2}",
                    rate.id,
                    rate.rate_type.as_str(),
                    truncate(rate.target().unwrap_or("-"), 30),
                    rate.rate
                );
            }
        }
        RateAction::Set { source, author, rate } => {
            let new_rate = match (source, author) {
                (Some(source), _) => PayoutRate::for_source(source, rate),
                (None, Some(author)) => PayoutRate::for_author(author, rate),
                (None, None) => anyhow::bail!("either --source or --author is required"),
            };
            let saved = book.upsert(new_rate).await?;
            println!("Saved rate {} ({} = {:.2})", saved.id, saved.target().unwrap_or("-"), saved.rate);
        }
        RateAction::Delete { id } => {
            book.delete(&id).await?;
            println!("Deleted rate {id}");
        }
    }
    Ok(())
}

async fn show_status(services: &Services) -> Result<()> {
    let stats = services.gateway.stats();
    let stored = services.store.get_articles().await?;

    println!("\nnewsdesk status");
    println!("===============\n");
    println!("API key:        {}", if services.config.has_api_key() { "configured" } else { "missing" });
    println!("Base URL:       {}", services.config.gnews_base_url);
    println!("Network:        {}", if services.gateway.network().is_online() { "online" } else { "offline" });
    println!("Quota:          {}/{} used today", stats.requests_used, stats.daily_limit);
    println!("Cache window:   {}", humantime::format_duration(services.config.cache_freshness()?));
    println!("Stored articles: {}", stored.len());
    println!("Data dir:       {}", services.config.data_dir.display());
    Ok(())
}
