mod cli;
mod configs;
mod demo;
mod infra;
mod routes;
mod server;

use verascore::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
