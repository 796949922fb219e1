use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use buddies_auth::{spawn_session_sweeper, AuthConfig, AuthServiceImpl, AuthStorage};
use buddies_core::data_access::DataAccess;
use buddies_core::Buddies;
use buddies_utils::logging;
use buddies_web::ServerConfig;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: String,
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,
    #[arg(long, env = "DATABASE_URL", id = "CONNECTION URL", help = "Database connection url. Format: postgresql://[user[:password]@][host][:port][/dbname][?param1=value1&...]")]
    db: Option<String>,
    #[arg(long, help = "Keep everything in memory instead of using a database")]
    mock: bool,
    #[arg(long, env = "SESSION_MINUTES", default_value_t = 10)]
    session_minutes: i64,
    #[arg(long, env = "CSRF_SECRET", hide_env_values = true, help = "Key for signing CSRF tokens. A random key is used if missing")]
    csrf_secret: Option<String>,
    #[arg(long, env = "SECURE_COOKIES")]
    secure_cookies: bool,
    #[arg(long, env = "SWEEP_SECONDS", default_value_t = 60)]
    sweep_seconds: u64,
    #[arg(long, env = "REQUEST_TIMEOUT_SECONDS", default_value_t = 10)]
    request_timeout_seconds: u64,
}

impl Args {
    fn auth_config(&self) -> AuthConfig {
        let mut config = AuthConfig {
            session_lifetime: chrono::Duration::minutes(self.session_minutes),
            secure_cookies: self.secure_cookies,
            ..AuthConfig::default()
        };
        if let Some(secret) = &self.csrf_secret {
            config.csrf_secret = secret.as_bytes().to_vec();
        }
        config
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // a missing .env file is fine
    let _ = dotenv::dotenv();
    logging::init(logging::DEFAULT_LOG_FILTER);

    let args = Args::parse();
    let cancellation_token = make_cancellation_token();

    if args.mock {
        info!("Using in-memory storage");
        let db_access = mock_db::Db::new();
        run_server(db_access, &args, cancellation_token).await?;
    } else {
        let db_connection = args.db.as_deref().context("Database connection url must be specified")?;
        let db_access = postgres_db::Db::new(db_connection).await?;
        db_access.check_migrations().await?;
        let db_graceful_shutdown = db_access.graceful_shutdown(cancellation_token.clone());

        run_server(db_access, &args, cancellation_token).await?;

        db_graceful_shutdown.await.context("Join error in thread handling database connection shutdown")?;
    }

    Ok(())
}

async fn run_server<T: DataAccess + AuthStorage>(db_access: T, args: &Args, cancellation_token: CancellationToken) -> Result<()> {
    let auth_service = AuthServiceImpl::new(db_access.clone(), args.auth_config());
    let sweeper = spawn_session_sweeper(
        auth_service.clone(),
        Duration::from_secs(args.sweep_seconds),
        cancellation_token.clone(),
    );

    let app = Buddies::new(db_access, auth_service);
    let server_config = args.server_config();
    let res = buddies_web::run_server(app, &server_config, cancellation_token.clone()).await;

    // the server may also stop on its own, the sweeper has to go either way
    cancellation_token.cancel();
    sweeper.await.context("Join error in session sweeper")?;

    res.with_context(|| format!("Unable to run server at {}", server_config.addr()))
}

fn make_cancellation_token() -> CancellationToken {
    let cancellation_token = CancellationToken::new();

    let cloned_token = cancellation_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
            },
            Err(err) => {
                error!("Unable to listen for shutdown signal: {}", err);
            },
        };
        cloned_token.cancel();
    });

    cancellation_token
}
