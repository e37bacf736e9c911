//! mongocursor - stream a MongoDB query through a prefetching cursor
//!
//! # Usage
//!
//! ```bash
//! mongocursor mongodb://localhost:27017/shop --collection orders \
//!     --filter '{"status": "open"}' --batch-size 500 --prefetch always
//! ```

use std::sync::Arc;

use mongodb::Client;
use mongodb::options::ClientOptions;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use mongocursor::cli::CliInterface;
use mongocursor::connection::MongoChannelProvider;
use mongocursor::cursor::{BsonMaterializer, Cursor, CursorSpec, DocumentCursor};
use mongocursor::error::Result;
use mongocursor::formatter::JsonFormatter;

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Handle subcommands or stream the query
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;
    initialize_logging(&cli);

    if cli.handle_subcommand()? {
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let ctrl_c_handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => cancel_clone.cancel(),
            Err(err) => eprintln!("Failed to listen for Ctrl+C: {}", err),
        }
    });

    let outcome = stream_query(&cli, cancel).await;
    ctrl_c_handle.abort();
    outcome
}

/// Connect, open the cursor and print every document
async fn stream_query(cli: &CliInterface, cancel: CancellationToken) -> Result<()> {
    let config = cli.config();
    let request = cli.find_request()?;

    let mut options = ClientOptions::parse(config.connection.uri.as_str()).await?;
    options.connect_timeout = Some(config.connection_timeout());
    options.server_selection_timeout = Some(config.connection_timeout());
    // The cursor lives on the server that created it. With several hosts,
    // find and getMore both target the primary instead.
    let pinned = match options.hosts.as_slice() {
        [only] => Some(only.clone()),
        _ => None,
    };
    let client = Client::with_options(options)?;

    // find, getMore and killCursors must share the session that owns the cursor.
    let mut provider =
        MongoChannelProvider::start(&client, request.namespace.database.as_str()).await?;
    if let Some(address) = pinned {
        debug!("Pinning cursor commands to {}", address);
        provider = provider.pinned_to(address);
    }
    let provider = Arc::new(provider);

    let reply = provider.find(&request).await?;
    let spec = CursorSpec::from_reply(reply, request.namespace.clone());
    let mut cursor = Cursor::new(
        spec,
        provider,
        BsonMaterializer,
        config.cursor.to_options(cancel),
    )?
    .with_policy(config.cursor.prefetch.to_policy());

    let formatter = JsonFormatter::from_config(&config.display);
    let printed = print_documents(&mut cursor, &formatter).await;
    let disposed = cursor.dispose().await;

    let count = printed?;
    disposed?;
    info!("Printed {} documents from {}", count, request.namespace);
    Ok(())
}

async fn print_documents(
    cursor: &mut DocumentCursor<MongoChannelProvider>,
    formatter: &JsonFormatter,
) -> Result<u64> {
    let mut count = 0;
    while cursor.advance().await? {
        println!("{}", formatter.format_document(cursor.current()?)?);
        count += 1;
    }
    Ok(count)
}

/// Initialize logging system based on verbosity level
///
/// `RUST_LOG` takes precedence over the configured level when set.
fn initialize_logging(cli: &CliInterface) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().as_str().to_lowercase()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
