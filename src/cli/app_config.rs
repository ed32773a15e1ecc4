use crate::config::{BenchConfig, FailurePolicy, FanOut, Timeouts};
use crate::error::BenchError;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about)]
pub struct Cli {
    /// The target url, like http://www.google.com (http:// is assumed when omitted)
    pub url: String,
    /// Number of concurrent connections
    #[arg(short = 'c', long = "concurrency", value_name = "connections")]
    pub concurrency: usize,
    /// Total number of requests; one request per connection when omitted
    #[arg(short = 'n', long = "requests", value_name = "requests")]
    pub requests_option: Option<usize>,
    /// Keep probing when a request fails and report the failure count
    #[arg(long = "collect-errors")]
    pub collect_errors: bool,
    /// Allow insecure server connections
    #[arg(short = 'k', long = "insecure")]
    pub skip_certificate_validate: bool,
    /// CA certificates (PEM) to verify the server with
    #[arg(long = "cacert", value_name = "file")]
    pub certificate_path_option: Option<PathBuf>,
    /// Maximum time allowed for a single request, in seconds
    #[arg(short = 'm', long = "max-time", value_name = "seconds", default_value_t = 30)]
    pub max_time: u64,
    /// Print the summary as JSON
    #[arg(long = "json")]
    pub json: bool,
    /// Make the operation more talkative
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbosity: u8,
}

impl TryFrom<&Cli> for BenchConfig {
    type Error = BenchError;

    fn try_from(cli: &Cli) -> Result<Self, Self::Error> {
        let fan_out = cli
            .requests_option
            .map_or(FanOut::PerWorker, FanOut::TargetSamples);
        let failure_policy = if cli.collect_errors {
            FailurePolicy::CollectErrors
        } else {
            FailurePolicy::FailFast
        };
        let mut config = BenchConfig::new(&cli.url, cli.concurrency)?
            .with_fan_out(fan_out)
            .with_failure_policy(failure_policy)
            .with_timeouts(Timeouts {
                request: Duration::from_secs(cli.max_time),
                ..Timeouts::default()
            });
        config.insecure = cli.skip_certificate_validate;
        config.ca_cert = cli.certificate_path_option.clone();
        config.validate()?;
        Ok(config)
    }
}
