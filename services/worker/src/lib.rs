mod cli;
mod infra;
mod routes;
mod server;

use reengage::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
