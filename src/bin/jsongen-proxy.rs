//! HTTP proxy turning prompts into generated JSON

use std::sync::Arc;
use log::{error, info};

use jsongen::config::ProxyConfig;
use jsongen::providers::MistralClient;

fn init_logging()
{   env_logger::Builder::from_env(
      env_logger::Env::default().default_filter_or("info")
    )
    .format_target(true)
    .init();
}

#[tokio::main]
async fn main()
{   dotenv::dotenv().ok();
    init_logging();

    let config = match ProxyConfig::from_env()
    {   Ok(c) => c
      , Err(e) => {
          error!("Failed to load configuration: {}", e);
          std::process::exit(1);
        }
    };

    let generator = match MistralClient::from_config(&config)
    {   Ok(g) => g
      , Err(e) => {
          error!("Failed to create model client: {}", e);
          std::process::exit(1);
        }
    };

    info!(
      "Starting jsongen-proxy on {} (model {}, {} req / {}s per client)"
    , config.listen_addr()
    , generator.model()
    , config.rate_limit.max_requests
    , config.rate_limit.window_secs
    );

    if let Err(e) = jsongen::server::serve(config, Arc::new(generator)).await
    {   error!("Server error: {}", e);
        std::process::exit(1);
    }
}
