// src/main.rs
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use ethers::providers::{Http, Provider};
use ethers::signers::LocalWallet;
use ethers::types::{Address, U256};
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use kernel_light::rpc::{KernelRpcImpl, KernelRpcServer};
use kernel_light::{
    ChainClient, EcdsaValidator, KernelAccountConfig, KernelPlugin, KernelSmartAccount,
    PluginConfig, ProviderClient, SessionKeyData, SessionKeyValidator,
};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(short, long, env = "KERNEL_RPC_SERVER_ADDR", default_value = "127.0.0.1:4337")]
    rpc_server_addr: String,

    #[clap(short, long, env = "KERNEL_ETH_RPC_URL")]
    eth_rpc_url: String,

    /// Overrides the chain id reported by the node
    #[clap(short, long, env = "KERNEL_CHAIN_ID")]
    chain_id: Option<u64>,

    /// Owner key of the default ECDSA validator
    #[clap(short, long, env = "KERNEL_PRIVATE_KEY", hide_env_values = true)]
    private_key: String,

    /// Session key; when set, user operations are signed by the session-key plugin
    #[clap(long, env = "KERNEL_SESSION_PRIVATE_KEY", hide_env_values = true)]
    session_private_key: Option<String>,

    /// JSON file with the session key's validity window and permissions
    #[clap(long, env = "KERNEL_PERMISSIONS_FILE")]
    permissions_file: Option<PathBuf>,

    #[clap(long, env = "KERNEL_ACCOUNT_INDEX", default_value_t = 0)]
    index: u64,

    #[clap(long, env = "KERNEL_ACCOUNT_ADDRESS")]
    account_address: Option<String>,

    #[clap(long, env = "KERNEL_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args = Args::parse();

    let level: Level = args.log_level.parse()?;
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let provider = Provider::<Http>::try_from(args.eth_rpc_url.as_str())?;
    let mut client = ProviderClient::new(Arc::new(provider));
    if let Some(chain_id) = args.chain_id {
        client = client.with_chain_id(chain_id);
    }
    let client: Arc<dyn ChainClient> = Arc::new(client);

    let owner: LocalWallet = args.private_key.parse()?;
    let default_validator = EcdsaValidator::new(client.clone(), owner, PluginConfig::ecdsa()).await?;

    let plugin: Option<Box<dyn KernelPlugin>> = match &args.session_private_key {
        Some(key) => {
            let session_key_data = load_session_key_data(args.permissions_file.as_deref())?;
            let session_key: LocalWallet = key.parse()?;
            let validator = SessionKeyValidator::new(
                client.clone(),
                session_key,
                session_key_data,
                PluginConfig::session_key(),
            )
            .await?;
            Some(Box::new(validator) as Box<dyn KernelPlugin>)
        }
        None => None,
    };

    let deployed_account_address = args
        .account_address
        .as_deref()
        .map(|address| {
            address
                .parse::<Address>()
                .map_err(|e| anyhow::anyhow!("invalid account address {}: {}", address, e))
        })
        .transpose()?;
    let config = KernelAccountConfig {
        index: U256::from(args.index),
        deployed_account_address,
        ..Default::default()
    };

    let account = KernelSmartAccount::new(client, Box::new(default_validator), plugin, config).await?;

    let server_addr: SocketAddr = args.rpc_server_addr.parse()?;
    let kernel_rpc = KernelRpcImpl::new(Arc::new(account));

    info!("Starting kernel account RPC server on {}", server_addr);

    let server_handle = start_server(server_addr, kernel_rpc).await?;

    tokio::signal::ctrl_c().await?;
    server_handle.stop()?;
    info!("Server stopped");

    Ok(())
}

/// Permissions file contents, or an unrestricted session key without one.
fn load_session_key_data(path: Option<&Path>) -> anyhow::Result<SessionKeyData> {
    let Some(path) = path else {
        info!("No permissions file, session key is unrestricted");
        return Ok(SessionKeyData::new(0, 0, Vec::new())?);
    };
    let contents = std::fs::read_to_string(path)?;
    let data: SessionKeyData = serde_json::from_str(&contents)?;
    info!("Loaded {} permissions from {}", data.permissions().len(), path.display());
    Ok(data)
}

async fn start_server(server_addr: SocketAddr, kernel_rpc: KernelRpcImpl) -> anyhow::Result<ServerHandle> {
    let server = ServerBuilder::default().build(server_addr).await?;
    let server_handle = server.start(kernel_rpc.into_rpc());

    Ok(server_handle)
}
