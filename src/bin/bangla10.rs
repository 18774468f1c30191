//! bangla10: local trainer with background sync to a progress endpoint.

use bangla10_srs::catalog::Catalog;
use bangla10_srs::cli::{parse_hits, ClientArgs, Command, PrayerCommand};
use bangla10_srs::context::AppContext;
use bangla10_srs::remote::{HttpTransport, ProgressTransport};
use bangla10_srs::scheduler::{ItemKind, PlanMode, Rating, SessionPlan};
use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let args = ClientArgs::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match args.sync_config() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let catalog = match Catalog::load_dir(&args.data) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("Catalog unavailable, phrase commands will fail: {}", e);
            Catalog::default()
        }
    };

    let transport = config
        .endpoint()
        .map(|endpoint| Arc::new(HttpTransport::new(endpoint)) as Arc<dyn ProgressTransport>);
    let ctx = AppContext::open(&config, catalog, transport);

    // Reconcile with the remote before touching anything locally.
    ctx.sync().wait_bootstrapped().await;

    let result = run(&ctx, args.command).await;

    ctx.sync().flush().await;
    if let Some(error) = ctx.sync().status().last_error {
        eprintln!("sync: {}", error);
    }

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(ctx: &AppContext, command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Plan { extra } => print_plan(&ctx.plan(mode(extra))),
        Command::Session { extra } => run_session(ctx, mode(extra)).await?,
        Command::Rate { phrase, rating } => {
            ctx.rate(&phrase, rating)?;
            println!("{}: {}", phrase, rating);
        }
        Command::Status => print_status(ctx),
        Command::Sync => {
            ctx.sync().flush().await;
            let status = ctx.sync().status();
            if !status.enabled {
                println!("Sync is disabled");
            } else if status.last_error.is_none() {
                println!("Synced at revision {}", status.revision);
            }
        }
        Command::Export { output } => {
            let json = ctx.export_json()?;
            match output {
                Some(path) => std::fs::write(path, json)?,
                None => println!("{}", json),
            }
        }
        Command::Import { file } => {
            let text = std::fs::read_to_string(&file)?;
            ctx.import_json(&text)?;
            println!("Imported {}", file.display());
        }
        Command::Prayer(command) => run_prayer(ctx, command)?,
    }
    Ok(())
}

fn mode(extra: bool) -> PlanMode {
    if extra {
        PlanMode::ExtraPractice
    } else {
        PlanMode::Daily
    }
}

fn kind_label(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Review => "review",
        ItemKind::New => "new",
    }
}

fn print_plan(plan: &SessionPlan) {
    if plan.is_empty() {
        println!("Nothing to practice today");
        return;
    }
    println!(
        "{}: {} reviews, {} new, about {} min",
        plan.date, plan.review_count, plan.new_count, plan.estimated_minutes
    );
    for (i, item) in plan.items.iter().enumerate() {
        println!("{:>3}. [{}] {}", i + 1, kind_label(item.kind), item.phrase_id);
    }
}

async fn run_session(ctx: &AppContext, mode: PlanMode) -> Result<(), Box<dyn Error>> {
    let mut active = ctx.start_session(mode)?;
    print_plan(&active.plan);

    let started = Instant::now();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    for item in active.plan.items.clone() {
        loop {
            println!("[{}] {} (again/hard/good/easy):", kind_label(item.kind), item.phrase_id);
            let Some(line) = lines.next_line().await? else {
                println!("Session abandoned");
                return Ok(());
            };
            match line.trim().parse::<Rating>() {
                Ok(rating) => {
                    ctx.rate_in_session(&mut active, &item.phrase_id, rating)?;
                    break;
                }
                Err(e) => eprintln!("{}", e),
            }
        }
    }

    let summary = ctx.finish_session(&active, started.elapsed())?;
    println!(
        "Done: {} phrases ({} new) in {} min, {}% recalled",
        summary.reviewed, summary.new_learned, summary.elapsed_min, summary.accuracy
    );
    Ok(())
}

fn print_status(ctx: &AppContext) {
    let summary = ctx.summary();
    println!("Learned:   {}/{}", summary.learned, summary.total);
    println!("Due today: {}", summary.due);
    println!("Recall:    {}%", summary.recall_rate);
    println!(
        "Streak:    {} (longest {})",
        summary.current_streak, summary.longest_streak
    );
    println!(
        "Sessions:  {} ({} min)",
        summary.total_sessions, summary.total_minutes
    );
    println!(
        "Next milestone: {} ({} to go)",
        summary.milestone.next, summary.milestone.remaining
    );
    for category in &summary.categories {
        println!(
            "  {:<16} {:>3}/{:<3} mastered {}",
            category.id, category.learned_count, category.starter_count, category.mastery_count
        );
    }
    let week: String = summary
        .week
        .iter()
        .map(|d| if d.done { '#' } else { '.' })
        .collect();
    println!("This week: {}", week);

    let sync = ctx.sync().status();
    let phase = sync.phase().as_str();
    match (sync.enabled, sync.last_synced_at) {
        (false, _) => println!("Sync:      disabled"),
        (true, Some(at)) => println!("Sync:      revision {} at {} ({})", sync.revision, at, phase),
        (true, None) => println!("Sync:      revision {}, never synced ({})", sync.revision, phase),
    }
    if let Some(error) = &sync.last_error {
        println!("Last sync error: {}", error);
    }
}

fn run_prayer(ctx: &AppContext, command: PrayerCommand) -> Result<(), Box<dyn Error>> {
    match command {
        PrayerCommand::Status => {
            for recitation in &ctx.catalog().recitations {
                let progress = ctx.recitation_progress(&recitation.id)?;
                println!(
                    "{:<20} {:<10} {}/{} memorised",
                    recitation.id,
                    progress.status.as_str(),
                    progress.memorised,
                    progress.total
                );
            }
            if let Some(target) = ctx.prayer_target() {
                println!(
                    "Today: {} {}",
                    target.recitation_id,
                    target.chunk_id.unwrap_or("")
                );
            }
        }
        PrayerCommand::Cycle { recitation, chunk } => {
            let status = ctx.cycle_chunk_status(&recitation, &chunk)?;
            println!("{}/{}: {}", recitation, chunk, status.as_str());
        }
        PrayerCommand::Set {
            recitation,
            chunk,
            status,
        } => ctx.set_chunk_status(&recitation, &chunk, status)?,
        PrayerCommand::Practiced { recitation, chunk } => {
            ctx.track_chunk_practiced(&recitation, &chunk)?
        }
        PrayerCommand::Full { recitation, status } => {
            ctx.set_recitation_status(&recitation, status)?
        }
        PrayerCommand::Test { recitation, hits } => {
            let status = ctx.record_prayer_test(&recitation, &parse_hits(&hits))?;
            println!("{}: {}", recitation, status.as_str());
        }
    }
    Ok(())
}
