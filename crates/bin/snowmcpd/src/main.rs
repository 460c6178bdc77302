//! Daemon entry point for the Snowflake MCP services.
//!
//! Loads configuration from CLI arguments, the environment, and an optional
//! connections file, builds the shared session registry and error log, then
//! serves the selected MCP services over stdio or streamable HTTP.

mod config;
mod registry;

use std::sync::Arc;

use snowmcp::server::McpHttpServerConfig;
use snowmcp_errlog::server::McpHttpServerConfig as ErrlogHttpServerConfig;
use snowmcp_store::ErrorLogStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::registry::build_registry;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "snowmcpd=info,snowmcp=info,snowmcp_core=info,snowmcp_store=info,\
             snowmcp_errlog=info,rmcp=info",
        )
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let config = Config::from_args()?;
    let error_log = ErrorLogStore::open(config.errlog_file.clone()).await?;
    let registry = build_registry(&config, error_log.clone());
    let _sweeper = registry.clone().spawn_sweeper();
    let registry = Arc::new(registry);

    // A stdio service owns the process; HTTP listeners only run without one.
    if config.enable_stdio {
        info!("Serving warehouse MCP over stdio (profile {})", config.profile);
        snowmcp::server::serve_stdio(registry, config.profile).await?;
        return Ok(());
    }
    if config.errlog_stdio {
        info!(
            "Serving error log MCP over stdio ({})",
            error_log.path().display()
        );
        snowmcp_errlog::server::serve_stdio(error_log).await?;
        return Ok(());
    }

    match (config.mcp_serve, config.errlog_serve) {
        (true, true) => {
            info!(
                "Serving warehouse MCP on {} and error log MCP on {}",
                config.mcp_http_addr, config.errlog_http_addr
            );
            tokio::try_join!(
                snowmcp::server::serve_streamable_http(
                    registry,
                    config.profile,
                    McpHttpServerConfig::new(config.mcp_http_addr),
                ),
                snowmcp_errlog::server::serve_streamable_http(
                    error_log,
                    ErrlogHttpServerConfig::new(config.errlog_http_addr),
                ),
            )?;
        }
        (true, false) => {
            info!("Serving warehouse MCP on {}", config.mcp_http_addr);
            snowmcp::server::serve_streamable_http(
                registry,
                config.profile,
                McpHttpServerConfig::new(config.mcp_http_addr),
            )
            .await?;
        }
        (false, true) => {
            info!("Serving error log MCP on {}", config.errlog_http_addr);
            snowmcp_errlog::server::serve_streamable_http(
                error_log,
                ErrlogHttpServerConfig::new(config.errlog_http_addr),
            )
            .await?;
        }
        // Config validation guarantees a service was selected.
        (false, false) => {}
    }
    Ok(())
}
