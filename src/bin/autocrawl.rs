//! autocrawl CLI: run a crawl worker or seed its backlog.

use autocrawl::config::Config;
use autocrawl::config::secrets::ExposeSecret;
use autocrawl::db::{Db, Store};
use autocrawl::db::backlog::{EXECUTING, UNFULFILLED};
use autocrawl::engine::{Collaborators, Engine, EngineConfig};
use autocrawl::fleet::CommandLauncher;
use autocrawl::github::HttpApi;
use autocrawl::model::work::{RepoListCursor, RepoRef, Task, WorkItem};
use autocrawl::queue::DeferredQueue;
use autocrawl::telemetry::{TelemetryConfig, init_telemetry};
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "autocrawl", about = "Self-scaling repository crawler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a worker until its quota and in-flight work are exhausted
    Run,
    /// Queue traversal roots for workers to pick up
    Seed {
        #[command(subcommand)]
        root: SeedRoot,
    },
    /// Show the shared backlog counters
    Status,
}

#[derive(Subcommand)]
enum SeedRoot {
    /// Walk the global repository listing
    Repos {
        /// Start after this repository id
        #[arg(long, default_value_t = 0)]
        since: i64,
    },
    /// Crawl a single repository
    Repo {
        /// OWNER/NAME
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "autocrawl".to_string(),
        log_level: config.log_level.clone(),
        worker_id: config.worker_id.clone(),
    })?;

    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.migrate().await?;

    match cli.command {
        Command::Run => cmd_run(&config, db).await,
        Command::Seed { root } => cmd_seed(db, root).await,
        Command::Status => cmd_status(&db).await,
    }
}

async fn cmd_run(config: &Config, db: Db) -> anyhow::Result<()> {
    let db = Arc::new(db);
    let engine = Engine::new(
        EngineConfig::from_config(config),
        Collaborators {
            store: db.clone(),
            audit: db,
            api: Arc::new(HttpApi::new(config.github_token.clone())?),
            launcher: Arc::new(CommandLauncher::new(config.fleet.launch_command.clone())),
        },
    );

    let shutdown = engine.run().await?;
    // Once launching has begun the backlog is left for the next process to
    // rescale; failing before the scaling decision is a crash.
    if let Some(error) = shutdown.error {
        if shutdown.requested == 0 {
            anyhow::bail!("end of process failed: {error}");
        }
        tracing::warn!(
            launched = shutdown.launched,
            requested = shutdown.requested,
            %error,
            "end of process incomplete"
        );
    }
    Ok(())
}

async fn cmd_seed(db: Db, root: SeedRoot) -> anyhow::Result<()> {
    let task = match root {
        SeedRoot::Repos { since } => Task::FetchRepoList(RepoListCursor {
            since,
            repos_count: 0,
        }),
        SeedRoot::Repo { name } => {
            let (owner, repo) = name
                .split_once('/')
                .filter(|(o, r)| !o.is_empty() && !r.is_empty())
                .ok_or_else(|| anyhow::anyhow!("expected OWNER/NAME, got '{name}'"))?;
            Task::FetchRepo(RepoRef {
                owner: owner.to_string(),
                repo: repo.to_string(),
            })
        }
    };

    let db = Arc::new(db);
    let item = WorkItem::new(task);
    let queue = DeferredQueue::new(db.clone());
    if queue.enqueue(&item).await? {
        println!("Queued: {} {}", item.kind(), item.uuid());
    }
    db.close().await;
    Ok(())
}

async fn cmd_status(db: &Db) -> anyhow::Result<()> {
    db.health_check().await?;
    println!("Unfulfilled: {}", db.read_counter(UNFULFILLED).await?);
    println!("Executing:   {}", db.read_counter(EXECUTING).await?);
    Ok(())
}
