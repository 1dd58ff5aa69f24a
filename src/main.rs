use anyhow::Result;

use stecagrid_bridge::options::Options;
use stecagrid_bridge::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let options = Options::new();

    let config = Config::new(options.config_file.clone())?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.loglevel()))
        .init();
    config.log_summary();

    stecagrid_bridge::run(config, options).await
}
