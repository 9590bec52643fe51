use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use library_bridge::config::{BridgeConfig, ENV_DB};
use library_bridge::consts::default_db_path;
use library_bridge::events::EventBus;
use library_bridge::library::Library;
use library_bridge::protocol::{Action, Identity, Request, Response};
use library_bridge::store::DocumentStore;
use library_bridge::store::sqlite::SqliteStore;
use library_bridge::sync::StartupSync;
use library_bridge::Bridge;

#[derive(Parser)]
#[command(
    name = "library-bridge",
    version,
    about = "Runs the library catalogue engine and forwards JSON requests to it."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// SQLite document store path (default: $LIBRARY_DB, then ~/.library-bridge/library.db)
    #[arg(short, long)]
    db: Option<String>,

    /// Run without a document store; the engine reads whatever flat files exist
    #[arg(long, default_value_t = false, conflicts_with = "db")]
    no_store: bool,

    /// Project root: engine working directory, parent of data/ and backend/
    #[arg(long)]
    project_root: Option<PathBuf>,

    /// Directory for the flat files handed to the engine
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Engine executable, tried before the default locations
    #[arg(short, long)]
    engine: Option<PathBuf>,

    /// Seconds to wait for each engine response (0 waits forever)
    #[arg(long)]
    read_timeout: Option<u64>,

    /// Caller user ID, enables re-registration when the engine forgets it
    #[arg(long)]
    user_id: Option<String>,

    /// Caller display name
    #[arg(long, default_value = "User")]
    name: String,

    /// Caller role
    #[arg(long, default_value = "student")]
    role: String,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Answer one JSON request per stdin line with one JSON response per stdout line
    Serve,
    /// Migrate legacy flat files and rehydrate projections, then exit
    Sync,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();

    let config = build_config(&cli);
    let store = open_store(&cli);

    match cli.command {
        Some(Command::Sync) => run_sync(&config, store).await,
        Some(Command::Serve) | None => serve(&cli, config, store).await,
    }
}

fn build_config(cli: &Cli) -> BridgeConfig {
    let mut config = match &cli.project_root {
        Some(root) => BridgeConfig::new(root),
        None => BridgeConfig::default(),
    }
    .from_env();

    if let Some(engine) = &cli.engine {
        config = config.with_engine(engine);
    }
    if let Some(dir) = &cli.data_dir {
        config = config.with_data_dir(dir);
    }
    if let Some(secs) = cli.read_timeout {
        config.read_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    config
}

/// Open the document store. Failure is not fatal: the bridge runs on
/// whatever flat files exist.
fn open_store(cli: &Cli) -> Option<Arc<dyn DocumentStore>> {
    if cli.no_store {
        return None;
    }
    let path = cli
        .db
        .clone()
        .or_else(|| std::env::var(ENV_DB).ok().filter(|p| !p.is_empty()))
        .or_else(|| default_db_path().map(|p| p.to_string_lossy().into_owned()))?;

    if path != ":memory:"
        && let Some(parent) = PathBuf::from(&path).parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        warn!(error = %e, "cannot create document store directory");
    }

    match SqliteStore::open(&path) {
        Ok(store) => {
            info!(%path, "document store open");
            Some(Arc::new(store))
        }
        Err(e) => {
            error!(error = %e, %path, "document store unavailable, persistence disabled");
            None
        }
    }
}

async fn run_sync(
    config: &BridgeConfig,
    store: Option<Arc<dyn DocumentStore>>,
) -> anyhow::Result<()> {
    let report = StartupSync::new(config, store).run().await?;
    if report.skipped {
        println!("no document store configured; flat files left as they are");
    } else {
        println!(
            "migrated {} book(s), {} user(s); wrote {} book(s), {} user(s), {} transaction(s) to {}",
            report.migrated_books,
            report.migrated_users,
            report.books,
            report.users,
            report.transactions,
            config.data_dir.display(),
        );
    }
    Ok(())
}

async fn serve(
    cli: &Cli,
    config: BridgeConfig,
    store: Option<Arc<dyn DocumentStore>>,
) -> anyhow::Result<()> {
    let events = Arc::new(EventBus::default());
    events.spawn_logger();
    let bridge = Arc::new(Bridge::supervised(config, store.clone(), events));
    bridge.start().await;
    info!(engine = %bridge.engine_name().await, "bridge ready");

    let library = Library::new(bridge, store);
    let identity = cli
        .user_id
        .as_ref()
        .map(|id| Identity::new(id, &cli.name, &cli.role));

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        let line = tokio::select! {
            result = lines.next_line() => {
                match result {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "input error");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match parse_request(line) {
            Ok(request) => dispatch(&library, request, identity.as_ref()).await,
            Err(response) => response,
        };

        let mut out = io::stdout().lock();
        writeln!(out, "{}", serde_json::to_string(&response)?)?;
        out.flush()?;
    }

    Ok(())
}

fn parse_request(line: &str) -> Result<Request, Response> {
    let request: Request = serde_json::from_str(line)
        .map_err(|e| Response::failure(format!("invalid request: {e}")))?;
    let missing = request.missing_fields();
    if !missing.is_empty() {
        return Err(Response::failure(format!(
            "missing field(s) for {}: {}",
            request.action,
            missing.join(", ")
        )));
    }
    Ok(request)
}

/// Route through [`Library`] so accepted circulation is persisted.
async fn dispatch(library: &Library, request: Request, caller: Option<&Identity>) -> Response {
    let identity = match request.text("userID") {
        Some(uid) => Some(match caller {
            Some(c) if c.user_id == uid => c.clone(),
            _ => Identity::new(uid, "User", "student"),
        }),
        None => caller.cloned(),
    };
    let isbn = request.text("isbn").unwrap_or_default();

    match (request.action, identity.as_ref()) {
        (Action::AddUser, Some(id)) => {
            let name = request.text("name").unwrap_or_else(|| id.name.clone());
            let role = request.text("type").unwrap_or_else(|| id.role.clone());
            library.login(&Identity::new(&id.user_id, name, role)).await
        }
        (Action::Issue, Some(id)) => library.issue(id, &isbn).await,
        (Action::Return, Some(id)) => library.return_book(id, &isbn).await,
        (Action::Reserve, Some(id)) => library.reserve(id, &isbn).await,
        _ => library.bridge().call_with_retry(&request, identity.as_ref()).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use library_bridge::engine::mock::{ScriptLog, ScriptedEngine};
    use library_bridge::store::Collection;

    struct Served {
        library: Library,
        log: Arc<ScriptLog>,
        store: Arc<SqliteStore>,
    }

    fn served(responses: Vec<Response>) -> Served {
        let engine = ScriptedEngine::new(responses).with_fallback(Response::ok("ok"));
        let log = engine.log();
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let bridge = Arc::new(Bridge::new(Box::new(engine)));
        let library = Library::new(bridge, Some(store.clone() as Arc<dyn DocumentStore>));
        Served {
            library,
            log,
            store,
        }
    }

    fn forgotten_caller() -> Vec<Response> {
        vec![
            Response::failure("User not found"),
            Response::ok("User added"),
            Response::ok("done"),
        ]
    }

    #[test]
    fn missing_fields_are_named_in_the_failure() {
        let response = parse_request(r#"{"action":"issue","userID":"u1"}"#).unwrap_err();
        assert!(!response.success);
        assert_eq!(response.message, "missing field(s) for issue: isbn");
    }

    #[test]
    fn unparseable_line_is_a_failure_response() {
        let response = parse_request(r#"{"action":"teleport"}"#).unwrap_err();
        assert!(response.message.starts_with("invalid request:"));
        assert!(parse_request("not json").is_err());
    }

    #[tokio::test]
    async fn matching_caller_is_reregistered_with_its_own_details() {
        let s = served(forgotten_caller());
        let caller = Identity::new("u1", "Ada", "faculty");
        let request = parse_request(r#"{"action":"profile","userID":"u1"}"#).unwrap();

        let response = dispatch(&s.library, request, Some(&caller)).await;
        assert_eq!(response.message, "done");

        let registration = &s.log.requests()[1];
        assert_eq!(registration.action, Action::AddUser);
        assert_eq!(registration.text("name").as_deref(), Some("Ada"));
        assert_eq!(registration.text("type").as_deref(), Some("faculty"));
    }

    #[tokio::test]
    async fn other_user_id_gets_placeholder_identity() {
        let s = served(forgotten_caller());
        let caller = Identity::new("u1", "Ada", "faculty");
        let request = parse_request(r#"{"action":"profile","userID":"u2"}"#).unwrap();

        dispatch(&s.library, request, Some(&caller)).await;

        let registration = &s.log.requests()[1];
        assert_eq!(registration.text("userID").as_deref(), Some("u2"));
        assert_eq!(registration.text("name").as_deref(), Some("User"));
        assert_eq!(registration.text("type").as_deref(), Some("student"));
    }

    #[tokio::test]
    async fn request_without_user_id_falls_back_to_caller() {
        let s = served(forgotten_caller());
        let caller = Identity::new("u1", "Ada", "faculty");

        dispatch(&s.library, Request::undo(), Some(&caller)).await;
        assert_eq!(
            s.log.actions(),
            vec![Action::Undo, Action::AddUser, Action::Undo]
        );
    }

    #[tokio::test]
    async fn no_caller_and_no_user_id_means_no_retry() {
        let s = served(forgotten_caller());

        let response = dispatch(&s.library, Request::undo(), None).await;
        assert_eq!(response.message, "User not found");
        assert_eq!(s.log.actions(), vec![Action::Undo]);
    }

    #[tokio::test]
    async fn add_user_goes_through_login() {
        let s = served(vec![]);
        let request = parse_request(
            r#"{"action":"add_user","userID":"u7","name":"Bob","type":"faculty"}"#,
        )
        .unwrap();

        dispatch(&s.library, request, None).await;

        let user = s.store.find_one(Collection::Users, "u7").await.unwrap().unwrap();
        assert_eq!(user["name"], "Bob");
        assert_eq!(user["type"], "FACULTY");
        assert_eq!(user["email"], "u7@library.edu");
        assert_eq!(s.log.requests()[0].text("name").as_deref(), Some("Bob"));
    }

    #[tokio::test]
    async fn accepted_issue_is_persisted() {
        let s = served(vec![]);
        let request = parse_request(r#"{"action":"issue","userID":"u1","isbn":"978"}"#).unwrap();

        dispatch(&s.library, request, None).await;

        let txns = s.store.find_all(Collection::Transactions).await.unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0]["type"], "ISSUE");
    }
}
