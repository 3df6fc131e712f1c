//! Sysbridge CLI: inspect and migrate system entities per app.
//!
//! Usage:
//!   sysbridge app <subcommand> [--db path] [--config path]
//!   sysbridge entity <subcommand> --app <id> --etype <etype>
//!   sysbridge query --app <id> '<instaql json>'

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use sysbridge::model::system_attributes;
use sysbridge::{
    AppId, BridgeConfig, BridgeError, BridgeResult, Dispatcher, EntityId, InstaqlForm, Operation,
    SqliteStore, Where,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "sysbridge",
    version,
    about = "System entities across the legacy/triples migration"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Path to YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage apps
    App {
        #[command(subcommand)]
        action: AppAction,
    },
    /// Read or delete system entities of a migrated app
    Entity {
        #[command(subcommand)]
        action: EntityAction,
        /// App id
        #[arg(long, global = true)]
        app: Option<AppId>,
        /// Entity type, e.g. `$oauthClients`
        #[arg(long, global = true, default_value = "$users")]
        etype: String,
    },
    /// Run a raw structured query against a migrated app
    Query {
        /// App id
        #[arg(long)]
        app: AppId,
        /// Query JSON, e.g. '{"$users": {"$": {"where": {"email": "a@b.c"}}}}'
        query: String,
    },
}

#[derive(Subcommand)]
enum AppAction {
    /// Create an app with the system attribute catalog installed
    Create {
        /// Title for the new app
        title: String,
    },
    /// List all apps
    List,
    /// Show an app's migration state
    Show {
        id: AppId,
    },
    /// Switch an app to triples (or back with --revert)
    Cutover {
        id: AppId,
        #[arg(long)]
        revert: bool,
    },
}

#[derive(Subcommand)]
enum EntityAction {
    /// Fetch one entity by id
    Get {
        id: EntityId,
    },
    /// Fetch entities matching `label=value` clauses
    Where {
        /// Equality clause; the value is parsed as JSON when possible
        #[arg(long = "eq", value_parser = parse_clause)]
        clauses: Vec<(String, serde_json::Value)>,
        /// Only return the first match
        #[arg(long)]
        first: bool,
    },
    /// Delete one entity by id
    Delete {
        id: EntityId,
    },
}

fn parse_clause(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (label, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected label=value, got {raw:?}"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::from(value));
    Ok((label.to_string(), value))
}

/// Get the default database path (~/.local/share/sysbridge/sysbridge.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("sysbridge").join("sysbridge.db")
}

fn init_logging(config: &BridgeConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_filter.as_deref().unwrap_or("sysbridge=info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn legacy_unavailable<T>(app_id: AppId) -> BridgeResult<T> {
    Err(BridgeError::Engine(format!(
        "app {app_id} still uses legacy tables; run `sysbridge app cutover {app_id}` first"
    )))
}

fn print_json(value: &impl serde::Serialize) -> BridgeResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_app(bridge: &Dispatcher, action: AppAction) -> BridgeResult<()> {
    let store = bridge.store();
    match action {
        AppAction::Create { title } => {
            let app_id = store.create_app(&title)?;
            store.add_attrs(app_id, &system_attributes())?;
            println!("Created app '{}' ({})", title, app_id);
        }
        AppAction::List => {
            let apps = store.list_apps()?;
            if apps.is_empty() {
                println!("No apps found.");
            }
            let conn = store.connection()?;
            for app_id in apps {
                let state = bridge.gate().resolve_app(&*conn, app_id)?;
                let repr = if state.users_in_triples { "triples" } else { "legacy" };
                println!("{}  {:<8}  {}", state.app_id, repr, state.title);
            }
        }
        AppAction::Show { id } => {
            let conn = store.connection()?;
            print_json(&bridge.gate().resolve_app(&*conn, id)?)?;
        }
        AppAction::Cutover { id, revert } => {
            let state = bridge.cutover(id, !revert)?;
            println!(
                "App {} now stores system entities as {}",
                state.app_id,
                if state.users_in_triples { "triples" } else { "legacy rows" }
            );
        }
    }
    Ok(())
}

fn run_entity(bridge: &Dispatcher, action: EntityAction, app: AppId, etype: String) -> BridgeResult<()> {
    match action {
        EntityAction::Get { id } => {
            let record = bridge.query_op(Operation::read(
                app,
                etype,
                |_conn| legacy_unavailable(app),
                |caps| caps.get_entity(id),
            ))?;
            match record {
                Some(record) => print_json(&record)?,
                None => println!("Entity {} not found", id),
            }
        }
        EntityAction::Where { clauses, first } => {
            let filter = clauses
                .into_iter()
                .fold(Where::new(), |w, (label, value)| w.eq(label, value));
            let records = bridge.query_op(Operation::read(
                app,
                etype,
                |_conn| legacy_unavailable(app),
                |caps| {
                    if first {
                        Ok(caps.get_entity_where(&filter)?.into_iter().collect())
                    } else {
                        caps.get_entities_where(&filter)
                    }
                },
            ))?;
            print_json(&records)?;
        }
        EntityAction::Delete { id } => {
            let removed = bridge.update_op(Operation::write(
                app,
                etype,
                |_tx| legacy_unavailable(app),
                |caps| caps.delete_entity(id),
            ))?;
            match removed {
                Some(record) => print_json(&record)?,
                None => println!("Entity {} not found", id),
            }
        }
    }
    Ok(())
}

fn run(cli: Cli, config: BridgeConfig) -> BridgeResult<()> {
    let db_path = cli
        .db
        .or_else(|| config.database.clone())
        .unwrap_or_else(default_db_path);
    let store = Arc::new(SqliteStore::open(&db_path)?);
    let bridge = Dispatcher::new(store, Arc::new(config.migration_window.clone()));

    match cli.command {
        Commands::App { action } => run_app(&bridge, action),
        Commands::Entity { action, app, etype } => {
            let app = app.ok_or_else(|| BridgeError::Config("--app is required".into()))?;
            run_entity(&bridge, action, app, etype)
        }
        Commands::Query { app, query } => {
            let form = InstaqlForm::from_json(&serde_json::from_str(&query)?)?;
            let tree = bridge.query_op(Operation::read(
                app,
                form.etype.clone(),
                |_conn| legacy_unavailable(app),
                |caps| caps.admin_query(&form),
            ))?;
            print_json(&tree)
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let config = match cli.config.as_ref().map(BridgeConfig::load).transpose() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    init_logging(&config);

    if let Err(e) = run(cli, config) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
