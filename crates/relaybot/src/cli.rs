use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "relaybot")]
#[command(author, version, about = "Telegram bot that relays media extracted from links", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the bot with long polling (default)
    Run,

    /// Extract a single URL and print the result without sending anything
    Extract {
        /// Content URL to extract
        url: String,

        /// Print the raw result as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
