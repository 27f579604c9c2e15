//! Start command - launches the cardsmith server.

use std::net::{IpAddr, SocketAddr};

use anyhow::{Context as _, Result};
use clap::Args;
use console::Style;

use cardsmith_server::{AppState, Server, ServerConfig};
use cardsmith_session::SessionStore;

use super::{Context, LlmArgs, build_generation, load_config, store_config};

/// Arguments for the start command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,

    #[command(flatten)]
    pub llm: LlmArgs,
}

/// Run the start command.
pub async fn run(args: StartArgs, ctx: &Context) -> Result<()> {
    let config = load_config(&args.llm, ctx)?;

    let mut server_config = ServerConfig::from_section(&config.server())?;
    if let Some(ref bind) = args.bind {
        let ip: IpAddr = bind
            .parse()
            .with_context(|| format!("Invalid bind address '{}'", bind))?;
        server_config.bind_address.set_ip(ip);
    }
    if let Some(port) = args.port {
        server_config.bind_address.set_port(port);
    }

    let store = SessionStore::new(store_config(&config));
    let generation = build_generation(&config, args.llm.api_key.as_deref(), store.clone())?;

    let reaper = store.spawn_reaper();

    let addr: SocketAddr = server_config.bind_address;
    let dim = Style::new().dim();
    println!("cardsmith server starting on http://{}", addr);
    println!(
        "{}",
        dim.apply_to(format!(
            "Backend: {}  Model: {}  Session TTL: {}s",
            generation.backend_name(),
            generation.options().model,
            store.config().ttl.as_secs()
        ))
    );
    println!("{}", dim.apply_to("Press Ctrl+C to stop"));

    let server = Server::from_state(AppState::new(generation, server_config));
    let result = server.run().await;

    reaper.abort();
    result?;
    Ok(())
}
