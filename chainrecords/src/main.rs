use chainrecords::connection::HttpConnector;
use chainrecords::{domains, logging, ChainRecordsError, Config};
use tracing::{error, info};

const CONFIG_PATH_VAR: &str = "CHAINRECORDS_CONFIG";
const RPC_URL_VAR: &str = "CHAINRECORDS_RPC_URL";
const DEFAULT_CONFIG_PATH: &str = "chainrecords.toml";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    logging::init("chainrecords=info");

    if let Err(error) = run().await {
        error!(%error, "chainrecords failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ChainRecordsError> {
    let config_path =
        std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut config = Config::from_toml_file(&config_path)?;
    if let Ok(json_rpc_url) = std::env::var(RPC_URL_VAR) {
        config = config.with_json_rpc_url(&json_rpc_url);
    }

    info!(config = %config_path, chain_id = config.chain.id_as_u64(), "starting");

    let indexing_task = chainrecords::index_events(&config, HttpConnector, domains::all()?).await?;

    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "cannot listen for ctrl-c, shutting down");
    }
    indexing_task.stop().await;

    Ok(())
}
