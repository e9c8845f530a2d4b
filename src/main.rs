//! qbridge - uniform query execution over PostgreSQL and ClickHouse.

use qbridge::cli::Cli;
use qbridge::config::{Config, ConnectionConfig};
use qbridge::error::{BridgeError, Result};
use qbridge::logging;
use qbridge::Connector;
use tracing::{error, info};

fn main() {
    logging::init_stderr_logging();

    if let Err(e) = run() {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();
    cli.validate()?;

    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let connection = resolve_connection(&cli, &config)?.ok_or_else(|| {
        BridgeError::config(
            "No database connection configured. Use --help for usage information.",
        )
    })?;

    let mut settings = config.query.clone();
    if let Some(timeout) = cli.timeout {
        settings.timeout_secs = timeout;
    }

    let mut connector = Connector::with_settings(settings)?;
    connector.connect(&connection)?;

    if cli.batch {
        connector.execute_batch(&cli.queries)?;
        info!("Batch of {} statements committed", cli.queries.len());
    } else {
        for sql in &cli.queries {
            println!("{}", connector.execute_to_json(sql)?);
        }
    }

    connector.disconnect();
    Ok(())
}

/// Resolves the final connection configuration from CLI args, config file, and environment.
fn resolve_connection(cli: &Cli, config: &Config) -> Result<Option<ConnectionConfig>> {
    // Precedence: CLI arguments, named connection, default connection
    let mut connection = cli.to_connection_config()?;

    if connection.is_none() {
        if let Some(name) = cli.connection_name() {
            connection = config.get_connection(Some(name)).cloned();
            if connection.is_none() {
                return Err(BridgeError::config(format!(
                    "Connection '{}' not found in config file",
                    name
                )));
            }
        }
    }

    if connection.is_none() {
        connection = config.get_connection(None).cloned();
    }

    // Environment variables fill whatever is still missing
    if let Some(ref mut conn) = connection {
        conn.apply_env_defaults();
    }

    Ok(connection)
}
