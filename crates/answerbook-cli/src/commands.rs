//! Command parsing and execution.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use answerbook_core::assets::{
    AssetCacheManager, AssetRequest, CacheHost, CacheSettings, FsCacheHost, HttpNetwork, Network, WorkerState,
};
use answerbook_core::auth::{FirebaseAuth, IdentityProvider};
use answerbook_core::models::{Answer, Book};
use answerbook_core::store::{DocumentStore, FirestoreStore};
use answerbook_core::sync::{BootstrapOutcome, ProjectionScope, SyncEvent};
use answerbook_core::utils::truncate_string;
use answerbook_core::{AnswerBookApp, Config, Locale, RemoteConfig};

/// How long one-shot commands wait for the first snapshot
const SNAPSHOT_TIMEOUT_SECS: u64 = 15;

/// How often `watch` checks whether the id token needs refreshing
const TOKEN_CHECK_INTERVAL_SECS: u64 = 60;

/// Width of answer text in listings
const ANSWER_DISPLAY_WIDTH: usize = 60;

#[derive(Debug, Parser)]
#[command(name = "answerbook")]
#[command(about = "Draw a random answer from your books of answers")]
#[command(version, arg_required_else_help = true)]
#[command(after_help = "<BOOK> is a book id or its exact name.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum AssetsCommand {
    /// Precache the app's static assets
    Install,
    /// Make the installed version current and drop old ones
    Activate,
    /// Fetch a URL through the asset cache
    Fetch { url: String },
    /// Show cached versions and entries
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// List your books (* = selected for draws)
    Books,
    /// List the answers in a book
    Answers { book: String },
    /// Create a book
    NewBook {
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        name: Vec<String>,
    },
    /// Rename a book
    RenameBook {
        book: String,
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        name: Vec<String>,
    },
    /// Delete a book and all its answers
    DeleteBook { book: String },
    /// Add one answer
    AddAnswer {
        book: String,
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Add one answer per non-empty line of a file
    Import { book: String, file: PathBuf },
    /// Change an answer's text
    EditAnswer {
        id: String,
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Delete an answer
    DeleteAnswer { id: String },
    /// Draw a random answer (default book if none given)
    Draw { books: Vec<String> },
    /// Follow live changes to your books
    Watch,
    /// Sign in with email and password
    Login { email: Option<String> },
    /// Sign in with an identity token from a provider (e.g. google.com)
    LoginWith { provider: String },
    /// Create an account
    Register { email: String },
    /// Sign out
    Logout,
    /// Show the signed-in account
    Whoami,
    /// Show or change the language
    Locale { locale: Option<Locale> },
    /// Offline asset cache
    #[command(subcommand)]
    Assets(AssetsCommand),
}

pub async fn run(command: Command, config: &mut Config, cache_dir: &Path) -> Result<()> {
    match command {
        Command::Assets(assets) => run_assets(assets, config, cache_dir).await,
        Command::Locale { locale: None } => {
            println!("{}", config.locale);
            Ok(())
        }
        other => {
            let remote = RemoteConfig::from_env().map_err(|e| {
                error!(error = %e, "Remote store is not configured");
                anyhow!(e)
            })?;
            let services = Services::connect(&remote, config, cache_dir).await?;
            run_remote(other, &services, config).await
        }
    }
}

// ============================================================================
// Remote commands
// ============================================================================

struct Services {
    app_id: String,
    auth: Arc<FirebaseAuth>,
    store: Arc<FirestoreStore>,
}

impl Services {
    async fn connect(remote: &RemoteConfig, config: &Config, cache_dir: &Path) -> Result<Self> {
        let auth = Arc::new(FirebaseAuth::new(remote, cache_dir.to_path_buf())?);
        let store = FirestoreStore::new(remote, config.poll_interval())?.with_token_cell(auth.token_cell());
        if let Err(e) = auth.restore().await {
            warn!(error = %e, "Could not restore previous session");
        }
        Ok(Self {
            app_id: remote.app_id.clone(),
            auth,
            store: Arc::new(store),
        })
    }

    async fn start_app(&self, locale: Locale) -> Result<(AnswerBookApp, mpsc::UnboundedReceiver<SyncEvent>)> {
        let store: Arc<dyn DocumentStore> = self.store.clone();
        let identity: Arc<dyn IdentityProvider> = self.auth.clone();
        let (mut app, events) = AnswerBookApp::new(self.app_id.clone(), locale, store, identity);
        app.start().await?;
        Ok((app, events))
    }
}

fn prompt_password(prompt: &str) -> Result<String> {
    rpassword::prompt_password(prompt).context("Failed to read password")
}

async fn run_remote(command: Command, services: &Services, config: &mut Config) -> Result<()> {
    let auth = &services.auth;
    match command {
        Command::Login { email } => {
            let email = email
                .or_else(|| config.last_email.clone())
                .ok_or_else(|| anyhow!("Missing argument <email>"))?;
            let password = prompt_password("Password: ")?;
            let identity = auth.login(&email, &password).await?;
            remember_email(config, &email);
            println!("Signed in as {}", identity.label());
            return Ok(());
        }
        Command::LoginWith { provider } => {
            let id_token = prompt_password("Identity token: ")?;
            let identity = auth.sign_in_with_idp(&provider, id_token.trim()).await?;
            println!("Signed in as {}", identity.label());
            return Ok(());
        }
        Command::Register { email } => {
            let password = prompt_password("Choose a password: ")?;
            if prompt_password("Repeat password: ")? != password {
                bail!("Passwords do not match");
            }
            let identity = auth.register(&email, &password).await?;
            remember_email(config, &email);
            println!("Registered and signed in as {}", identity.label());
            return Ok(());
        }
        Command::Logout => {
            auth.sign_out().await?;
            println!("Signed out");
            return Ok(());
        }
        Command::Whoami => {
            match auth.current() {
                Some(identity) => println!(
                    "{} (token valid for {} more minutes)",
                    identity.label(),
                    auth.minutes_until_expiry().unwrap_or(0)
                ),
                None => println!("Not signed in"),
            }
            return Ok(());
        }
        _ => {}
    }

    let (mut app, mut events) = services.start_app(config.locale).await?;

    match command {
        Command::Books => {
            let books = wait_for_books(&mut app, &mut events).await?;
            if books.is_empty() {
                println!("No books yet. Create one with `answerbook new-book <name>`.");
            }
            for book in &books {
                let marker = if app.selection().contains(&book.id) { "*" } else { " " };
                println!("{} {}  {}", marker, book.id, book.display_name(app.locale()));
            }
        }
        Command::Answers { book } => {
            let book = find_book(&mut app, &mut events, &book).await?;
            app.open_book(&book.id).await?;
            let answers = wait_for_answers(&mut app, &mut events, &book.id).await?;
            println!("{} ({} answers)", book.display_name(app.locale()), answers.len());
            for answer in &answers {
                println!("  {}  {}", answer.id, truncate_string(&answer.text, ANSWER_DISPLAY_WIDTH));
            }
        }
        Command::NewBook { name } => {
            let id = app.create_book(&name.join(" ")).await?;
            println!("Created book {}", id);
        }
        Command::RenameBook { book, name } => {
            let book = find_book(&mut app, &mut events, &book).await?;
            app.rename_book(&book.id, &name.join(" ")).await?;
            println!("Renamed {}", book.id);
        }
        Command::DeleteBook { book } => {
            let book = find_book(&mut app, &mut events, &book).await?;
            let removed = app.delete_book(&book.id).await?;
            println!("Deleted {} and {} answers", book.display_name(app.locale()), removed);
        }
        Command::AddAnswer { book, text } => {
            let book = find_book(&mut app, &mut events, &book).await?;
            let id = app.add_answer(&book.id, &text.join(" ")).await?;
            println!("Added answer {}", id);
        }
        Command::Import { book, file } => {
            let book = find_book(&mut app, &mut events, &book).await?;
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let count = app.add_answers(&book.id, &text).await?;
            println!("Added {} answers to {}", count, book.display_name(app.locale()));
        }
        Command::EditAnswer { id, text } => {
            app.edit_answer(&id, &text.join(" ")).await?;
            println!("Updated answer {}", id);
        }
        Command::DeleteAnswer { id } => {
            app.delete_answer(&id).await?;
            println!("Deleted answer {}", id);
        }
        Command::Draw { books } => {
            wait_for_books(&mut app, &mut events).await?;
            if !books.is_empty() {
                let mut ids = Vec::with_capacity(books.len());
                for reference in &books {
                    ids.push(find_book(&mut app, &mut events, reference).await?.id);
                }
                app.selection_mut().set(ids);
            }
            match app.draw().await? {
                Some(answer) => println!("{}", answer),
                None => println!("No answers to draw from"),
            }
        }
        Command::Watch => watch(&mut app, &mut events, services).await?,
        Command::Locale { locale: Some(locale) } => {
            config.locale = locale;
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
            match app.set_locale(locale).await {
                Some(BootstrapOutcome::Created { answers }) => {
                    println!("Language set to {}; created default book with {} answers", locale, answers)
                }
                _ => println!("Language set to {}", locale),
            }
        }
        _ => {}
    }
    Ok(())
}

fn remember_email(config: &mut Config, email: &str) {
    config.last_email = Some(email.to_string());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<SyncEvent>) -> Result<SyncEvent> {
    tokio::time::timeout(Duration::from_secs(SNAPSHOT_TIMEOUT_SECS), events.recv())
        .await
        .map_err(|_| anyhow!("Timed out waiting for data"))?
        .ok_or_else(|| anyhow!("Session closed"))
}

async fn wait_for_books(app: &mut AnswerBookApp, events: &mut mpsc::UnboundedReceiver<SyncEvent>) -> Result<Vec<Book>> {
    loop {
        let event = next_event(events).await?;
        app.observe(&event);
        match event {
            SyncEvent::BooksChanged(books) => return Ok(books),
            SyncEvent::SubscriptionFailed {
                scope: ProjectionScope::Books,
                message,
            } => bail!("Failed to load books: {}", message),
            _ => {}
        }
    }
}

async fn wait_for_answers(
    app: &mut AnswerBookApp,
    events: &mut mpsc::UnboundedReceiver<SyncEvent>,
    book_id: &str,
) -> Result<Vec<Answer>> {
    loop {
        let event = next_event(events).await?;
        app.observe(&event);
        match event {
            SyncEvent::AnswersChanged { book_id: id, answers } if id == book_id => return Ok(answers),
            SyncEvent::SubscriptionFailed {
                scope: ProjectionScope::Answers,
                message,
            } => bail!("Failed to load answers: {}", message),
            _ => {}
        }
    }
}

/// Resolve a book by id, then by exact name.
async fn find_book(
    app: &mut AnswerBookApp,
    events: &mut mpsc::UnboundedReceiver<SyncEvent>,
    reference: &str,
) -> Result<Book> {
    let mut books = app.books();
    if books.is_empty() {
        books = wait_for_books(app, events).await?;
    }
    let locale = app.locale();
    books
        .iter()
        .find(|b| b.id == reference)
        .or_else(|| books.iter().find(|b| b.display_name(locale) == reference))
        .cloned()
        .ok_or_else(|| anyhow!("No book matches {}", reference))
}

fn print_event(locale: Locale, event: &SyncEvent) {
    match event {
        SyncEvent::SessionChanged(Some(identity)) => println!("Signed in as {}", identity.label()),
        SyncEvent::SessionChanged(None) => println!("Signed out"),
        SyncEvent::BooksChanged(books) => {
            let names: Vec<&str> = books.iter().map(|b| b.display_name(locale)).collect();
            println!("Books ({}): {}", books.len(), names.join(", "));
        }
        SyncEvent::AnswersChanged { book_id, answers } => {
            println!("Book {} now has {} answers", book_id, answers.len())
        }
        SyncEvent::SubscriptionFailed { scope, message } => println!("Live {} stopped: {}", scope, message),
        SyncEvent::BootstrapFailed(message) => println!("Default book unavailable: {}", message),
    }
}

/// Follow identity changes and live updates until the session closes.
async fn watch(
    app: &mut AnswerBookApp,
    events: &mut mpsc::UnboundedReceiver<SyncEvent>,
    services: &Services,
) -> Result<()> {
    let mut identity_rx = app.identity_changes();
    identity_rx.borrow_and_update();
    let mut token_check = tokio::time::interval(Duration::from_secs(TOKEN_CHECK_INTERVAL_SECS));
    let mut resubscribe = false;
    info!("Watching for changes");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                app.observe(&event);
                print_event(app.locale(), &event);
                if matches!(event, SyncEvent::SubscriptionFailed { scope: ProjectionScope::Books, .. }) {
                    resubscribe = true;
                }
            }
            changed = identity_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let identity = identity_rx.borrow_and_update().clone();
                if let Err(e) = app.handle_identity_change(identity).await {
                    error!(error = %e, "Failed to switch session");
                    println!("Session error: {}", e);
                }
            }
            _ = token_check.tick() => {
                if let Err(e) = services.auth.ensure_fresh().await {
                    warn!(error = %e, "Token refresh failed");
                }
                if resubscribe {
                    match app.subscribe_books().await {
                        Ok(()) => resubscribe = false,
                        Err(e) => warn!(error = %e, "Re-subscribe failed"),
                    }
                }
            }
        }
    }
    Ok(())
}

// ============================================================================
// Asset cache commands
// ============================================================================

async fn run_assets(command: AssetsCommand, config: &Config, cache_dir: &Path) -> Result<()> {
    let settings = CacheSettings::from_config(config).context("Invalid origin in config")?;
    let host = Arc::new(FsCacheHost::new(cache_dir.join("assets"))?);
    let network: Arc<dyn Network> = Arc::new(HttpNetwork::new()?);
    let mut manager = AssetCacheManager::restore(settings, host.clone(), network.clone())?;
    let state = manager.state();

    match command {
        AssetsCommand::Install => {
            if state != WorkerState::Idle {
                println!("Version {} is already installed", manager.version());
                return Ok(());
            }
            let report = manager.install().await?;
            host.record_installed(&report.version)?;
            if !report.bucket_opened {
                println!("Could not open the cache; nothing was stored");
            }
            println!("Cached {} assets for {}", report.cached.len(), report.version);
            for failure in &report.failed {
                println!("  failed: {} ({})", failure.url, failure.reason);
            }
        }
        AssetsCommand::Activate => {
            if state == WorkerState::Idle {
                bail!("Version {} is not installed; run `answerbook assets install`", manager.version());
            }
            if state == WorkerState::Active {
                println!("Version {} is already active", manager.version());
                return Ok(());
            }
            let report = manager.activate().await?;
            println!("Activated {}", report.version);
            for retired in &report.retired {
                println!("  deleted old cache {}", retired);
            }
            for failure in &report.failed {
                println!("  could not delete {} ({})", failure.url, failure.reason);
            }
        }
        AssetsCommand::Fetch { url } => {
            let request = AssetRequest::parse(&url).with_context(|| format!("Invalid URL: {}", url))?;
            // An installed version waits until activation; the controller keeps serving
            let serving = match state {
                WorkerState::Active => manager,
                _ => AssetCacheManager::restore_controlling(manager.settings(), host.clone(), network)?
                    .unwrap_or(manager),
            };
            let served = serving.intercept(&request).await?;
            eprintln!("{} via {:?} ({})", served.response.status, served.source, serving.version());
            std::io::stdout()
                .write_all(&served.response.body)
                .context("Failed to write response")?;
        }
        AssetsCommand::Status => {
            println!("Configured version: {} ({})", manager.version(), state);
            if let Some(controller) = host.controller()? {
                println!("Controlling version: {}", controller);
            }
            for bucket in host.keys().await? {
                let entries = host.entries(&bucket).await?;
                println!("{} ({} entries)", bucket, entries.len());
                for entry in entries {
                    println!("  {}  {} bytes  {}", entry.url, entry.size, entry.age_display());
                }
            }
        }
    }
    Ok(())
}
