//! Command-line surface (§6). Parsed once at startup into an immutable
//! [`Cli`] that every other module reads from.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

fn parse_seconds(s: &str) -> Result<Duration, std::num::ParseFloatError> {
    s.parse::<f64>().map(Duration::from_secs_f64)
}

/// EDNS Client Subnet scope surveyor.
#[derive(Debug, Parser)]
#[command(name = "ecsplorer", author, version, about)]
pub struct Cli {
    /// Input domain list: one `domain,nameserver_ip` pair per line.
    #[arg(long = "if")]
    pub input_file: Option<PathBuf>,

    /// Output directory; must not already exist.
    #[arg(long = "out")]
    pub out_dir: Option<PathBuf>,

    /// Target prefix length to scan down to.
    #[arg(long = "pl", default_value_t = 24)]
    pub prefix_length: u8,

    /// Channel capacity between pipeline stages.
    #[arg(long = "cc", default_value_t = 100)]
    pub channel_capacity: usize,

    /// Number of planner worker tasks.
    #[arg(long = "ni", default_value_t = 20)]
    pub planner_workers: usize,

    /// Log verbosity, 0 (quietest) to 3 (most verbose).
    #[arg(long = "ll", default_value_t = 2, value_parser = clap::value_parser!(u8).range(0..=3))]
    pub log_level: u8,

    /// Optional log file; stderr otherwise.
    #[arg(long = "lf")]
    pub log_file: Option<PathBuf>,

    /// Query-list file: switches the planner to list mode.
    #[arg(long = "query-list")]
    pub query_list: Option<PathBuf>,

    /// Print the final per-domain result summary to stdout.
    #[arg(long = "pr")]
    pub print_result: bool,

    /// CPU profile output path.
    #[arg(long = "cp")]
    pub cpu_profile: Option<PathBuf>,

    /// Memory (heap) profile output path.
    #[arg(long = "mp")]
    pub mem_profile: Option<PathBuf>,

    /// BGP prefix file.
    #[arg(long = "pf")]
    pub bgp_prefix_file: Option<PathBuf>,

    /// Special-use prefix file.
    #[arg(long = "sf")]
    pub special_prefix_file: Option<PathBuf>,

    /// Max temporary errors tolerated per domain before retirement.
    #[arg(long = "te", default_value_t = 3)]
    pub max_temp_errors: u32,

    /// Probes per second, global.
    #[arg(long = "query-rate", default_value_t = 100)]
    pub query_rate: usize,

    /// Transport retries before giving up / escalating to TCP.
    #[arg(long = "retries", default_value_t = 3)]
    pub retries: u32,

    /// Max domains admitted and in flight simultaneously.
    #[arg(long = "domain-outstanding", default_value_t = 100)]
    pub domain_outstanding: usize,

    /// Local IPv4 source address for outgoing queries.
    #[arg(long = "ip4source")]
    pub ip4_source: Option<IpAddr>,

    /// Local IPv6 source address for outgoing queries.
    #[arg(long = "ip6source")]
    pub ip6_source: Option<IpAddr>,

    /// Scope-zero responses tolerated before early domain retirement; 0 disables.
    #[arg(long = "scope-zero-allowed", default_value_t = 10000)]
    pub scope_zero_allowed: u32,

    /// Skip writing the CSV result file.
    #[arg(long = "disable-store")]
    pub disable_store: bool,

    /// Print version and exit.
    #[arg(long = "version")]
    pub version: bool,

    /// Scan IPv6 space instead of IPv4.
    #[arg(short = '6')]
    pub ipv6: bool,

    /// Depth past which child visitation order is randomized rather than bit-0-first.
    #[arg(long = "randomize-depth", default_value_t = 32)]
    pub randomize_depth: u8,

    /// Keep pursuing unfinished BGP subprefixes even once per-depth limits stop forcing it.
    #[arg(long = "scanAllBGP")]
    pub scan_all_bgp: bool,

    /// Public recursive resolver to query instead of each domain's own nameserver.
    #[arg(long = "resolver")]
    pub resolver: Option<IpAddr>,

    /// YAML configuration file (required unless `--query-list` is set).
    #[arg(long = "config-file")]
    pub config_file: Option<PathBuf>,

    /// Dial timeout.
    #[arg(long = "timeout-dial", default_value = "2", value_parser = parse_seconds)]
    pub timeout_dial: Duration,

    /// Read timeout.
    #[arg(long = "timeout-read", default_value = "2", value_parser = parse_seconds)]
    pub timeout_read: Duration,

    /// Write timeout.
    #[arg(long = "timeout-write", default_value = "2", value_parser = parse_seconds)]
    pub timeout_write: Duration,
}

impl Cli {
    pub fn is_list_mode(&self) -> bool {
        self.query_list.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cli = Cli::parse_from(["ecsplorer", "--if", "domains.txt", "--out", "out"]);
        assert_eq!(cli.prefix_length, 24);
        assert_eq!(cli.channel_capacity, 100);
        assert_eq!(cli.planner_workers, 20);
        assert_eq!(cli.log_level, 2);
        assert_eq!(cli.max_temp_errors, 3);
        assert_eq!(cli.query_rate, 100);
        assert_eq!(cli.retries, 3);
        assert_eq!(cli.domain_outstanding, 100);
        assert_eq!(cli.scope_zero_allowed, 10000);
        assert_eq!(cli.randomize_depth, 32);
        assert_eq!(cli.timeout_dial, Duration::from_secs(2));
        assert!(!cli.ipv6);
        assert!(!cli.is_list_mode());
    }

    #[test]
    fn query_list_flag_selects_list_mode() {
        let cli = Cli::parse_from(["ecsplorer", "--if", "domains.txt", "--query-list", "prefixes.txt"]);
        assert!(cli.is_list_mode());
    }

    #[test]
    fn rejects_out_of_range_log_level() {
        let result = Cli::try_parse_from(["ecsplorer", "--if", "domains.txt", "--ll", "9"]);
        assert!(result.is_err());
    }
}
