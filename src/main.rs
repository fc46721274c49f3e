use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod api;
mod archive;
mod config;
mod database;
mod deployers;
mod discord;
mod dispatcher;
mod errors;
mod generate;
mod health;
mod lp_factory;
mod models;
mod templates;
mod traits;

use config::AppConfig;
use dispatcher::{DeployTarget, available_targets};
use lp_factory::{LpFactory, read_tree, write_files};
use models::SiteConfig;
use templates::catalog::NewTemplate;

#[derive(Parser)]
#[command(name = "lpf")]
#[command(version, about = "Landing page generator and multi-provider deployer")]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List, save or delete templates
    Templates {
        #[command(subcommand)]
        command: Option<TemplateCommands>,
    },
    /// Show which template an id resolves to
    Resolve { template_id: Option<String> },
    /// Render the preview HTML of a site
    Preview {
        /// Site id, domain or path to a site JSON file
        site: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate the Astro project of a site
    Project {
        site: String,
        #[arg(short, long, default_value = "out")]
        output: PathBuf,
    },
    /// Build a ZIP of the preview page (or of the project)
    Zip {
        site: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        project: bool,
    },
    /// Deploy a site; defaults to the highest-priority configured target
    Deploy {
        site: String,
        #[arg(short, long = "target", value_enum)]
        targets: Vec<DeployTarget>,
        /// Deploy even when the site does not validate
        #[arg(long)]
        force: bool,
    },
    /// Provider-side status of a site's deploys
    Status {
        site: String,
        #[arg(short, long = "target", value_enum)]
        targets: Vec<DeployTarget>,
    },
    /// Remove a site from its deploy targets
    Teardown {
        site: String,
        #[arg(short, long = "target", value_enum)]
        targets: Vec<DeployTarget>,
    },
    /// Fetch each deployed URL and check the brand is on the page
    Verify { site: String },
    /// Deploy targets and whether they are configured
    Targets,
    /// Provider connectivity checks
    Health,
    Sites {
        #[command(subcommand)]
        command: Option<SiteCommands>,
    },
    Settings {
        #[command(subcommand)]
        command: Option<SettingsCommands>,
    },
    /// Import the dashboard's localStorage export
    ImportState { file: PathBuf },
    /// Poll deploy status on a cron schedule
    Watch,
}

#[derive(Subcommand)]
enum TemplateCommands {
    List {
        /// Refetch custom templates from the API
        #[arg(long)]
        refresh: bool,
    },
    /// Upload a directory as a custom template
    Save {
        id: String,
        name: String,
        dir: PathBuf,
        #[arg(long, default_value = "")]
        description: String,
    },
    Delete { id: String },
}

#[derive(Subcommand)]
enum SiteCommands {
    List,
    Show { site: String },
    /// Store a site from a JSON file
    Save {
        file: PathBuf,
        #[arg(long)]
        force: bool,
    },
    Delete { site: String },
    History {
        site: Option<String>,
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    Show,
    /// Set a value by its camelCase key, e.g. `netlifyToken`
    Set { key: String, value: String },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    let lpf = Arc::new(LpFactory::new(&config).await?);
    run(cli, &config, lpf).await
}

async fn run(cli: Cli, config: &AppConfig, lpf: Arc<LpFactory>) -> Result<()> {
    let json = cli.json;
    match cli.command {
        Commands::Templates { command } => match command.unwrap_or(TemplateCommands::List { refresh: false }) {
            TemplateCommands::List { refresh } => {
                if refresh {
                    lpf.catalog().refresh().await?;
                }
                let all = lpf.catalog().all().await;
                if json {
                    return print_json(&all);
                }
                for t in all {
                    println!("{:<18} {:<7} {:<10} {}", t.id, t.source.to_string(), t.badge, t.name);
                }
            }
            TemplateCommands::Save {
                id,
                name,
                dir,
                description,
            } => {
                let files = read_tree(&dir).await?;
                let template = NewTemplate {
                    description,
                    ..NewTemplate::new(&id, &name, &files)
                };
                lpf.catalog().save(&template).await?;
                println!("Saved template {id} ({} files)", files.len());
            }
            TemplateCommands::Delete { id } => {
                lpf.catalog().delete(&id).await?;
                println!("Deleted template {id}");
            }
        },
        Commands::Resolve { template_id } => {
            let resolution = lpf.catalog().resolve(template_id.as_deref()).await;
            let info = resolution.template.info();
            if json {
                return print_json(&info);
            }
            println!("{} ({})", info.id, info.source);
            if let Some(fallback) = &resolution.fallback {
                println!(
                    "fallback: {:?} for {}",
                    fallback.reason,
                    fallback.requested.as_deref().unwrap_or("(unset)")
                );
            }
        }
        Commands::Preview { site, output } => {
            let site = lpf.load_site(&site).await?;
            let html = lpf.preview(&site).await;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, html)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!("Wrote {}", path.display());
                }
                None => println!("{html}"),
            }
        }
        Commands::Project { site, output } => {
            let site = lpf.load_site(&site).await?;
            let files = lpf.project(&site).await;
            let written = write_files(&output, &files).await?;
            println!("Wrote {written} files to {}", output.display());
        }
        Commands::Zip { site, output, project } => {
            let site = lpf.load_site(&site).await?;
            let bytes = lpf.zip(&site, project).await?;
            let path = output.unwrap_or_else(|| PathBuf::from(format!("{}.zip", site.slug(40))));
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {} ({} bytes)", path.display(), bytes.len());
        }
        Commands::Deploy { site, targets, force } => {
            let site = lpf.load_site(&site).await?;
            let targets = if targets.is_empty() {
                let settings = lpf.settings().await?;
                match DeployTarget::by_priority().into_iter().find(|t| t.configured(&settings)) {
                    Some(target) => vec![target],
                    None => bail!("No deploy target is configured. See `lpf targets`."),
                }
            } else {
                targets
            };

            let outcomes = lpf.deploy(&site, &targets, force).await?;
            if json {
                return print_json(&outcomes);
            }
            for o in &outcomes {
                match (o.success, &o.url, &o.error) {
                    (true, Some(url), _) if o.queued => println!("{} {:<14} queued  {url}", o.target.icon(), o.target),
                    (true, Some(url), _) => println!("{} {:<14} live    {url}", o.target.icon(), o.target),
                    (_, _, error) => println!(
                        "{} {:<14} failed  {}",
                        o.target.icon(),
                        o.target,
                        error.as_deref().unwrap_or("unknown error")
                    ),
                }
            }
            if outcomes.iter().all(|o| !o.success) {
                bail!("Every deploy failed");
            }
        }
        Commands::Status { site, targets } => {
            let site = lpf.load_site(&site).await?;
            let targets = or_deployed(&lpf, &site, targets).await?;
            let reports = lpf.status(&site, &targets).await?;
            if json {
                return print_json(&reports);
            }
            for r in reports {
                let detail = r.error.or(r.url).unwrap_or_default();
                println!("{:<14} {:<10} {detail}", r.target, r.status.as_str());
            }
        }
        Commands::Teardown { site, targets } => {
            let site = lpf.load_site(&site).await?;
            let targets = or_deployed(&lpf, &site, targets).await?;
            let report = lpf.teardown(&site, &targets).await?;
            if json {
                return print_json(&report);
            }
            for target in &report.succeeded {
                println!("removed {target}");
            }
            for failure in &report.failed {
                println!("failed  {}: {}", failure.target, failure.error);
            }
        }
        Commands::Verify { site } => {
            let site = lpf.load_site(&site).await?;
            for (target, check) in lpf.verify(&site).await? {
                match check {
                    Ok(page) if page.brand_found => println!("{target:<14} ok       {}", page.url),
                    Ok(page) => println!(
                        "{target:<14} mismatch {} (title: {})",
                        page.url,
                        page.title.as_deref().unwrap_or("-")
                    ),
                    Err(e) => println!("{target:<14} error    {e}"),
                }
            }
        }
        Commands::Targets => {
            let targets = available_targets(&lpf.settings().await?);
            if json {
                return print_json(&targets);
            }
            for t in targets {
                let state = if t.configured {
                    "configured".to_string()
                } else {
                    format!("missing {}", t.missing.join(", "))
                };
                println!("{} {:<14} {:<22} {state}", t.icon, t.id, t.label);
            }
        }
        Commands::Health => {
            let reports = lpf.health().await?;
            if json {
                return print_json(&reports);
            }
            for r in reports {
                println!("{:<12} {:<13} {:>5}ms  {}", r.service.label(), r.status.as_str(), r.ms, r.detail);
            }
        }
        Commands::Sites { command } => match command.unwrap_or(SiteCommands::List) {
            SiteCommands::List => {
                let sites = lpf.database().sites().await?;
                if json {
                    return print_json(&sites);
                }
                for s in sites {
                    println!("{:<18} {:<24} {}", s.id, s.domain, s.brand);
                }
            }
            SiteCommands::Show { site } => print_json(&lpf.load_site(&site).await?)?,
            SiteCommands::Save { file, force } => {
                let raw = tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let site: SiteConfig = serde_json::from_str(&raw)?;
                let site = lpf.save_site(site, force).await?;
                println!("Saved {} as {}", site.display_name(), site.id);
            }
            SiteCommands::Delete { site } => {
                let site = lpf.load_site(&site).await?;
                if lpf.database().delete_site(&site.id).await? {
                    println!("Deleted {}", site.id);
                }
            }
            SiteCommands::History { site, limit } => {
                let site_id = match site {
                    Some(key) => Some(lpf.load_site(&key).await?.id),
                    None => None,
                };
                let history = lpf.database().history(site_id.as_deref(), limit).await?;
                if json {
                    return print_json(&history);
                }
                for h in history {
                    println!("{} {:<14} {:<7} {}", h.created_at.format("%Y-%m-%d %H:%M"), h.target, h.status, h.url);
                }
            }
        },
        Commands::Settings { command } => match command.unwrap_or(SettingsCommands::Show) {
            SettingsCommands::Show => print_json(&lpf.settings().await?.masked())?,
            SettingsCommands::Set { key, value } => lpf.set_setting(&key, &value).await?,
        },
        Commands::ImportState { file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let summary = lpf.import_state(&serde_json::from_str(&raw)?).await?;
            print_json(&summary)?;
        }
        Commands::Watch => watch(config, lpf).await?,
    }
    Ok(())
}

async fn or_deployed(lpf: &LpFactory, site: &SiteConfig, targets: Vec<DeployTarget>) -> Result<Vec<DeployTarget>> {
    if !targets.is_empty() {
        return Ok(targets);
    }
    let deployed = lpf.deployed_targets(site).await?;
    if deployed.is_empty() {
        bail!("{} has no recorded deploys; pass --target", site.display_name());
    }
    Ok(deployed)
}

async fn watch(config: &AppConfig, lpf: Arc<LpFactory>) -> Result<()> {
    info!("Starting deploy status watcher");

    // Run once immediately to seed the seen statuses
    if let Err(e) = lpf.poll_deployments().await {
        error!("Error during initial status check: {}", e);
    }

    let mut sched = JobScheduler::new().await?;
    let job_lpf = lpf.clone();
    sched
        .add(Job::new_async(config.watch_cron.as_str(), move |_uuid, _l| {
            let lpf = job_lpf.clone();
            Box::pin(async move {
                match lpf.poll_deployments().await {
                    Ok(changed) if !changed.is_empty() => info!("{} deploys changed status", changed.len()),
                    Ok(_) => {}
                    Err(e) => error!("Error checking deploy status: {}", e),
                }
            })
        })?)
        .await?;

    info!("Scheduler started ({})", config.watch_cron);
    sched.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Stopping watcher");
    sched.shutdown().await?;
    Ok(())
}
