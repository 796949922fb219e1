use anyhow::Result;
use clap::Parser;
use tracing::info;

use buddies_utils::logging;
use postgres_db::Db;

#[derive(Parser, Debug)]
struct Args {
    #[arg(env = "DATABASE_URL", id = "CONNECTION URL", help = "Database connection url. Format: postgresql://[user[:password]@][host][:port][/dbname][?param1=value1&...]")]
    db: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    logging::init(logging::DEFAULT_LOG_FILTER);

    let args = Args::parse();
    let db_access = Db::new(&args.db).await?;
    db_access.migrate().await?;
    db_access.check_migrations().await?;

    info!("Database is up to date");
    Ok(())
}
