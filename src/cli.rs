//! Command-line flags for the publisher and subscriber binaries.
//!
//! Required flags are enforced by clap, which prints usage and exits
//! non-zero before any configuration is loaded or connection attempted.
//! An empty value counts as missing.

use clap::builder::NonEmptyStringValueParser;
use clap::Parser;

use crate::config::Config;
use crate::publisher::PublishSettings;
use crate::routing::split_patterns;

#[derive(Parser, Debug)]
#[command(name = "topicbus-pub")]
#[command(about = "Publish numbered, timestamped messages to a topic exchange")]
pub struct PublisherArgs {
    /// Exchange name
    #[arg(short = 't', long = "exchange", value_parser = NonEmptyStringValueParser::new())]
    pub exchange: String,

    /// Routing key
    #[arg(short = 'r', long = "routing-key", value_parser = NonEmptyStringValueParser::new())]
    pub routing_key: String,

    /// Stop after this many messages (default: run until interrupted)
    #[arg(short = 'n', long)]
    pub count: Option<u64>,

    /// Upper bound of the random pause between messages, in milliseconds
    #[arg(long)]
    pub max_delay_ms: Option<u64>,

    /// Configuration file (YAML)
    #[arg(short, long)]
    pub config: Option<String>,
}

impl PublisherArgs {
    /// Combine flags with loaded configuration. Flags win.
    pub fn settings(&self, config: &Config) -> PublishSettings {
        let max_delay = match self.max_delay_ms {
            Some(ms) => std::time::Duration::from_millis(ms),
            None => config.publisher.max_delay(),
        };
        PublishSettings {
            exchange: self.exchange.clone(),
            routing_key: self.routing_key.clone(),
            max_delay,
            limit: self.count,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "topicbus-sub")]
#[command(about = "Bind an anonymous queue to a topic exchange and log what arrives")]
pub struct SubscriberArgs {
    /// Topic (exchange) name
    #[arg(short = 't', long = "exchange", value_parser = NonEmptyStringValueParser::new())]
    pub exchange: String,

    /// Routing keys, comma separated (e.g. "info,warn" or "kern.*,#.critical")
    #[arg(short = 'r', long = "routing-key", value_parser = NonEmptyStringValueParser::new())]
    pub routing_keys: String,

    /// Configuration file (YAML)
    #[arg(short, long)]
    pub config: Option<String>,
}

impl SubscriberArgs {
    /// One pattern per comma-separated segment.
    pub fn patterns(&self) -> Vec<String> {
        split_patterns(&self.routing_keys)
    }
}
