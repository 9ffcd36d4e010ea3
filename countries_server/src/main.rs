use clap::Parser;
use countries_core::{RefreshConfig, RenderConfig, SqliteCountryStore};
use countries_server::cli::{Cli, Commands, StorageArgs};
use countries_server::error::ApiError;
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    countries_core::o11y::init_global_from_env()?;
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve(cli.serve)) {
        Commands::Serve(args) => {
            let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
            let refresh = RefreshConfig::from_env()?;
            let render = render_config(&args.storage)?;
            let state =
                countries_server::server::build_state(&args.storage.database, &refresh, render)
                    .await?;
            countries_server::server::serve(addr, state).await?;
        }
        Commands::Migrate(args) => {
            SqliteCountryStore::new(&args.database).await?;
            tracing::info!(database = %args.database.display(), "schema ready");
        }
        Commands::Refresh(args) => {
            let refresh = RefreshConfig::from_env()?;
            let render = render_config(&args)?;
            let state =
                countries_server::server::build_state(&args.database, &refresh, render).await?;

            let outcome = state.orchestrator.refresh().await;
            state.orchestrator.settle_render().await;
            match outcome {
                Ok(summary) => {
                    let out = serde_json::json!({
                        "message": "Countries refreshed successfully",
                        "total_countries": summary.total,
                        "last_refreshed_at": summary.refreshed_at,
                    });
                    println!("{}", serde_json::to_string_pretty(&out)?);
                }
                Err(e) => {
                    let err = ApiError::from(e);
                    println!("{}", serde_json::to_string_pretty(&err.body())?);
                    anyhow::bail!("refresh failed: {err}");
                }
            }
        }
        Commands::Config(args) => {
            let refresh = RefreshConfig::from_env()?;
            let render = render_config(&args)?;
            let cfg = serde_json::json!({
                "database": args.database,
                "countries_url": refresh.countries_url,
                "exchange_url": refresh.exchange_url,
                "fetch_timeout_ms": refresh.fetch_timeout.as_millis() as u64,
                "cache_dir": render.cache_dir,
                "image_path": render.image_path(),
                "font_path": render.font_path,
            });
            println!("{}", serde_json::to_string_pretty(&cfg)?);
        }
    }

    Ok(())
}

fn render_config(args: &StorageArgs) -> anyhow::Result<RenderConfig> {
    let mut cfg = RenderConfig::from_env()?;
    if let Some(dir) = &args.cache_dir {
        cfg.cache_dir = dir.clone();
        cfg.validate()?;
    }
    Ok(cfg)
}
