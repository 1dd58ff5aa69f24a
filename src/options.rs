use clap::Parser;

/// StecaGrid Bridge - polls StecaGrid inverters over their TCP-to-RS485 bridge
#[derive(Debug, Parser)]
#[clap(author, version)]
pub struct Options {
    /// Config file to read
    #[clap(short = 'c', long = "config", default_value = "config.yaml")]
    pub config_file: String,

    /// Optional runtime limit in seconds
    #[clap(short = 't', long = "time")]
    pub runtime: Option<u64>,

    /// Query every configured request once, print the readings as JSON and exit
    #[clap(long = "once")]
    pub once: bool,
}

impl Options {
    pub fn new() -> Self {
        Self::parse()
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            config_file: "config.yaml".to_string(),
            runtime: None,
            once: false,
        }
    }
}
