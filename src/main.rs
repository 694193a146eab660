use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::Read;
use std::sync::Arc;
use tracing::info;

use pushfeed::activity::feed::{self, FeedQuery};
use pushfeed::activity::{PushCommit, PushCommits};
use pushfeed::config::Config;
use pushfeed::db::models::{Repository, User};
use pushfeed::db::{Database, NewIssue, NewRepository, NewUser, SqliteDatabase};
use pushfeed::issues::KeywordPatterns;
use pushfeed::output::terminal;
use pushfeed::pipeline::repo_events;
use pushfeed::pipeline::{PushEvent, PushPipeline};

/// pushfeed: activity feeds, issue updates and webhooks for git pushes.
///
/// Drives the push pipeline against a local SQLite store the way a git
/// hook would, and inspects the resulting feeds and webhook queue.
#[derive(Parser)]
#[command(name = "pushfeed", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Create a user account
    AddUser {
        name: String,
        email: String,

        /// Display name used in payloads
        #[arg(long, default_value = "")]
        full_name: String,
    },

    /// Create a repository (the owner starts out watching it)
    AddRepo {
        /// Owning user
        owner: String,
        name: String,

        #[arg(long)]
        private: bool,

        #[arg(long, default_value = "")]
        description: String,

        /// Who creates it, when not the owner
        #[arg(long)]
        actor: Option<String>,
    },

    /// Open an issue or pull request
    AddIssue {
        /// Repository as owner/name
        repo: String,
        title: String,

        /// Open a pull request instead
        #[arg(long)]
        pull: bool,

        /// Poster, defaults to the repository owner
        #[arg(long)]
        poster: Option<String>,
    },

    /// Watch (or stop watching) a repository
    Watch {
        user: String,
        /// Repository as owner/name
        repo: String,

        #[arg(long)]
        unwatch: bool,
    },

    /// Record a push, as reported by a post-receive hook
    Push {
        /// Pushing user
        pusher: String,
        /// Repository as owner/name
        repo: String,
        /// Full ref name, e.g. refs/heads/main or refs/tags/v1.0
        ref_full_name: String,
        old_commit_id: String,
        new_commit_id: String,

        /// JSON array of commits, newest first ("-" reads stdin)
        #[arg(long)]
        commits: Option<String>,

        /// Git-level email of the pusher, defaults to the account email
        #[arg(long)]
        email: Option<String>,
    },

    /// Show a user's activity feed
    Feed {
        user: String,

        #[arg(long, default_value = "0")]
        offset: u32,

        /// Only the user's own public activity
        #[arg(long)]
        profile: bool,
    },

    /// List queued webhook tasks
    Hooks {
        /// Only tasks for this repository (owner/name)
        #[arg(long)]
        repo: Option<String>,
    },

    /// Show system status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pushfeed=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Init => {
            info!("Initializing pushfeed database...");
            let db = pushfeed::db::initialize_sqlite(&config.db_path)?;
            let table_count = db.table_count().await?;
            println!("Database initialized at: {}", config.db_path);
            println!("Tables created: {table_count}");
            println!("\nNext: pushfeed add-user <name> <email>");
        }

        Commands::AddUser {
            name,
            email,
            full_name,
        } => {
            let db = open_database(&config)?;
            let user = db
                .create_user(&NewUser {
                    full_name,
                    ..NewUser::new(&name, &email)
                })
                .await?;
            println!("{} user {} (id {})", "Created".green().bold(), user.name, user.id);
        }

        Commands::AddRepo {
            owner,
            name,
            private,
            description,
            actor,
        } => {
            let db = open_database(&config)?;
            let owner = find_user(&*db, &owner).await?;
            let actor = match actor {
                Some(name) => find_user(&*db, &name).await?,
                None => owner.clone(),
            };
            let new = NewRepository {
                description,
                is_private: private,
                ..NewRepository::new(&name)
            };
            let repo = repo_events::new_repo(&*db, &actor, &owner, &new).await?;
            println!("{} repository {}", "Created".green().bold(), repo.full_name());
        }

        Commands::AddIssue {
            repo,
            title,
            pull,
            poster,
        } => {
            let db = open_database(&config)?;
            let repo = find_repo(&*db, &repo).await?;
            let poster = find_user(&*db, poster.as_deref().unwrap_or(&repo.owner_name)).await?;
            let new = NewIssue {
                is_pull: pull,
                ..NewIssue::new(&title)
            };
            let issue = db.create_issue(&repo, &poster, &new).await?;
            repo_events::create_issue_action(&*db, &poster, &repo, &issue).await?;
            println!(
                "{} {}#{}: {}",
                "Opened".green().bold(),
                repo.full_name(),
                issue.index,
                issue.name
            );
        }

        Commands::Watch {
            user,
            repo,
            unwatch,
        } => {
            let db = open_database(&config)?;
            let user = find_user(&*db, &user).await?;
            let repo = find_repo(&*db, &repo).await?;
            db.watch_repo(user.id, repo.id, !unwatch).await?;
            let verb = if unwatch { "stopped watching" } else { "is watching" };
            println!("{} {} {}", user.name, verb, repo.full_name());
        }

        Commands::Push {
            pusher,
            repo,
            ref_full_name,
            old_commit_id,
            new_commit_id,
            commits,
            email,
        } => {
            let db = open_database(&config)?;
            let pusher = find_user(&*db, &pusher).await?;
            let repo = find_repo(&*db, &repo).await?;
            let commits = match commits {
                Some(source) => read_commits(&source)?,
                None => Vec::new(),
            };

            let patterns = KeywordPatterns::new(
                config.settings.close_keywords.as_slice(),
                config.settings.reopen_keywords.as_slice(),
            )?;
            let pipeline = PushPipeline::new(&*db, &*db, &patterns, &config.settings);
            let report = pipeline
                .commit_repo_action(PushEvent {
                    pusher_id: pusher.id,
                    pusher_name: pusher.name.clone(),
                    pusher_email: email.unwrap_or_else(|| pusher.email.clone()),
                    repo_owner_id: repo.owner_id,
                    repo_name: repo.name.clone(),
                    ref_full_name,
                    old_commit_id,
                    new_commit_id,
                    commits: PushCommits::new(commits),
                })
                .await?;
            terminal::display_push_report(&report);
        }

        Commands::Feed {
            user,
            offset,
            profile,
        } => {
            let db = open_database(&config)?;
            let user = find_user(&*db, &user).await?;
            let actions = feed::get_feeds(
                &*db,
                FeedQuery {
                    user_id: user.id,
                    offset,
                    is_profile: profile,
                },
            )
            .await?;
            terminal::display_feed(&actions);
        }

        Commands::Hooks { repo } => {
            let db = open_database(&config)?;
            let repo_id = match repo {
                Some(path) => Some(find_repo(&*db, &path).await?.id),
                None => None,
            };
            let tasks = db.list_hook_tasks(repo_id).await?;
            terminal::display_hook_tasks(&tasks);
        }

        Commands::Status => {
            let db: Arc<dyn Database> = match open_database(&config) {
                Ok(db) => db as Arc<dyn Database>,
                // show() reports the missing file itself
                Err(_) => Arc::new(pushfeed::db::open_in_memory()?),
            };
            pushfeed::status::show(&db, &config.db_path).await?;
        }
    }

    Ok(())
}

/// Open the existing database.
fn open_database(config: &Config) -> Result<Arc<SqliteDatabase>> {
    pushfeed::db::open_sqlite(&config.db_path)
}

async fn find_user(db: &dyn Database, name: &str) -> Result<User> {
    db.get_user_by_name(name)
        .await?
        .with_context(|| format!("No user named {name}"))
}

/// Look up `owner/name`.
async fn find_repo(db: &dyn Database, path: &str) -> Result<Repository> {
    let (owner, name) = path
        .split_once('/')
        .with_context(|| format!("Expected owner/name, got {path}"))?;
    let owner = find_user(db, owner).await?;
    db.get_repository_by_name(owner.id, name)
        .await?
        .with_context(|| format!("No repository {path}"))
}

/// Read a newest-first JSON commit list from a file, or stdin for "-".
fn read_commits(source: &str) -> Result<Vec<PushCommit>> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read commits from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read {source}"))?
    };
    serde_json::from_str(&raw).context("Commits must be a JSON array of {sha1, message, author_email, author_name}")
}
