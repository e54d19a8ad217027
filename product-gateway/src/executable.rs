//! Main entry point for CLI command to start server.

use std::io::IsTerminal;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use anyhow::anyhow;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::axum_factory::HttpServerHandle;
use crate::configuration::Configuration;
use crate::configuration::Overrides;
use crate::configuration::generate_config_schema;
use crate::schema::build_schema;
use crate::schema::sdl;
use crate::upstream::Forwarder;

/// Options for the gateway
#[derive(Parser, Debug)]
#[command(name = "gateway", about = "Product and variant GraphQL gateway")]
pub(crate) struct Opt {
    /// Log level (off|error|warn|info|debug|trace). `RUST_LOG` takes precedence when set.
    #[arg(
        long = "log",
        default_value = "info",
        alias = "log-level",
        env = "GATEWAY_LOG"
    )]
    log_level: String,

    /// Configuration file location.
    #[arg(short, long = "config", env = "GATEWAY_CONFIG_PATH")]
    config_path: Option<PathBuf>,

    /// Address to listen on, overriding `server.listen`.
    #[arg(long, env = "GATEWAY_LISTEN")]
    listen: Option<SocketAddr>,

    /// Upstream GraphQL endpoint, overriding `upstream.url`.
    #[arg(long, env = "GATEWAY_UPSTREAM_URL")]
    upstream_url: Option<Url>,

    /// Upstream admin secret, overriding `upstream.admin_secret`.
    #[arg(
        long,
        env = "GATEWAY_UPSTREAM_ADMIN_SECRET",
        hide_env_values = true
    )]
    upstream_admin_secret: Option<String>,

    /// Prints the configuration schema.
    #[arg(long)]
    schema: bool,

    /// Prints the gateway's GraphQL schema.
    #[arg(long)]
    sdl: bool,

    /// Display version and exit.
    #[arg(long, short = 'V')]
    version: bool,
}

impl Opt {
    fn overrides(&self) -> Overrides {
        Overrides {
            listen: self.listen,
            upstream_url: self.upstream_url.clone(),
            upstream_admin_secret: self.upstream_admin_secret.clone(),
        }
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
            EnvFilter::try_from_default_env().context("could not parse RUST_LOG")
        } else {
            EnvFilter::try_new(&self.log_level).context("could not parse log configuration")
        }
    }
}

/// This is the main gateway entrypoint.
pub fn main() -> Result<()> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(nb) = std::env::var("GATEWAY_NUM_CORES")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
    {
        builder.worker_threads(nb);
    }
    let runtime = builder.build()?;
    runtime.block_on(Executable::builder().start())
}

/// Entry point into creating a gateway executable.
pub struct Executable {}

#[buildstructor::buildstructor]
impl Executable {
    /// Parses command line options, sets up logging and serves until Ctrl-C.
    ///
    /// A `configuration` given here is used as is, in place of the configuration file and
    /// the command line overrides.
    #[builder(entry = "builder", exit = "start")]
    pub async fn start(configuration: Option<Configuration>) -> Result<()> {
        let opt = Opt::parse();

        if opt.version {
            println!("{}", std::env!("CARGO_PKG_VERSION"));
            return Ok(());
        }

        if opt.schema {
            let schema = generate_config_schema();
            println!("{}", serde_json::to_string_pretty(&schema)?);
            return Ok(());
        }

        if opt.sdl {
            println!("{}", sdl());
            return Ok(());
        }

        let builder = tracing_subscriber::fmt::fmt().with_env_filter(opt.env_filter()?);
        if std::io::stdout().is_terminal() {
            builder.try_init()
        } else {
            builder.json().try_init()
        }
        .map_err(|err| anyhow!(err))?;

        let configuration = match configuration {
            Some(configuration) => configuration,
            None => Configuration::load(opt.config_path.as_deref(), &opt.overrides())
                .context("could not load configuration")?,
        };

        tracing::info!(
            version = std::env!("CARGO_PKG_VERSION"),
            upstream = %configuration.upstream.url,
            service = %configuration.upstream.name,
            "starting product gateway"
        );

        let forwarder = Forwarder::new(&configuration.upstream)
            .context("could not create the upstream client")?;
        let handle = HttpServerHandle::start(build_schema(forwarder), &configuration.server)
            .await
            .context("could not start the http server")?;

        tokio::signal::ctrl_c()
            .await
            .context("could not listen for the shutdown signal")?;
        tracing::info!("shutting down");
        handle.shutdown().await?;
        Ok(())
    }
}
