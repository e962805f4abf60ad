use std::time::Duration;

use clap::Parser;
use tracing::Level;

mod app;
mod cli;
mod config;
mod db;
mod error;
mod extract;
mod import;
mod models;
mod remote;
mod sync;

use app::App;
use cli::{Args, Command};
use config::Config;
use error::Result;
use models::{Article, ArticleFilter, SyncStatus};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Only warnings and errors unless asked for more
    let level = if args.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(args.config.as_deref())?;
    let app = App::new(config).await?;

    run(&app, args.command).await
}

async fn run(app: &App, command: Command) -> Result<()> {
    match command {
        Command::Add { url, title } => {
            let (id, inserted) = app.add_url(&url, title.as_deref()).await?;
            if inserted {
                println!("Saved {}", id);
            } else {
                println!("Already saved as {}", id);
            }
        }
        Command::Import { file } => {
            let report = app.import_export(&file).await?;
            println!("Imported {} articles ({} already saved)", report.added, report.skipped);
        }
        Command::List { archived, favorites } => {
            let filter = if archived {
                ArticleFilter::Archived
            } else if favorites {
                ArticleFilter::Favorites
            } else {
                ArticleFilter::Active
            };
            print_articles(&app.articles(filter).await?);
        }
        Command::Search { query, limit } => {
            print_articles(&app.repository.search_articles(&query, limit).await?);
        }
        Command::Show { id } => {
            let (article, tags, attachments) = app.article_details(&id).await?;
            println!("{}\n{}", article.title, article.url());
            if !tags.is_empty() {
                let names: Vec<_> = tags.iter().map(|t| t.tag.as_str()).collect();
                println!("Tags: {}", names.join(", "));
            }
            if let Some(author) = attachments.authors.first() {
                println!("By {}", author.name);
            }
            if article.word_count > 0 {
                println!("{} words, {} min", article.word_count, article.time_to_read);
            }
            match article.text.as_deref() {
                Some(text) if !text.is_empty() => println!("\n{}", text),
                Some(_) => println!("\n(no readable text could be extracted)"),
                None => println!("\n(not extracted yet; run `readlater extract`)"),
            }
        }
        Command::Favorite { id, off } => app.repository.set_favorite(&id, !off).await?,
        Command::Read { id, off } => app.repository.mark_read(&id, !off).await?,
        Command::Archive { id, off } => app.repository.archive(&id, !off).await?,
        Command::Delete { id } => app.repository.soft_delete(&id).await?,
        Command::Tag { id, tag } => app.repository.add_tag(&id, &tag).await?,
        Command::Untag { id, tag } => app.repository.remove_tag(&id, &tag).await?,
        Command::Extract => {
            let report = app.extract().await?;
            println!(
                "Processed {}: {} extracted, {} without text, {} failed",
                report.processed, report.extracted, report.empty, report.failed
            );
        }
        Command::Sync => print_status(&app.sync_local_changes().await?),
        Command::FullSync => print_status(&app.full_sync().await?),
        Command::Watch { interval } => {
            let manager = app.sync_manager()?;
            let period = interval
                .map(|minutes| Duration::from_secs(minutes.max(1) * 60))
                .unwrap_or_else(|| app.config().sync_interval());

            let mut observer = manager.observer();
            let reporter = tokio::spawn(async move {
                while let Some(status) = observer.changed().await {
                    if !matches!(status, SyncStatus::Syncing) {
                        print_status(&status);
                    }
                }
            });

            manager.schedule_periodic_sync(period);
            println!("Syncing every {} min; Ctrl-C to stop", period.as_secs() / 60);
            tokio::signal::ctrl_c().await?;
            manager.cancel_periodic_sync();
            reporter.abort();
        }
    }
    Ok(())
}

fn print_articles(articles: &[Article]) {
    if articles.is_empty() {
        println!("No articles");
        return;
    }
    for article in articles {
        let star = if article.favorite { "*" } else { " " };
        let read = if article.is_read() { "r" } else { " " };
        println!("{}{} {}  {}", star, read, article.item_id, article.title);
    }
}

fn print_status(status: &SyncStatus) {
    match status {
        SyncStatus::Error(message) => eprintln!("Sync failed: {}", message),
        other => println!("{}", other),
    }
}
