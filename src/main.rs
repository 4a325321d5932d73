use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, error, info};

use ecsplorer::cli::Cli;
use ecsplorer::classify::PrefixClassifier;
use ecsplorer::config::ScanConfig;
use ecsplorer::controller::{self, ControllerConfig};
use ecsplorer::csvwriter::CsvWriter;
use ecsplorer::input::{read_domain_list, read_query_list};
use ecsplorer::logging;
use ecsplorer::probe::ProbeConfig;

#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.version {
        println!("ecsplorer {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    if let Err(e) = logging::init(cli.log_level, cli.log_file.as_deref()) {
        eprintln!("failed to set up logging: {e}");
        return ExitCode::from(2);
    }

    debug!(?cli, "parsed command-line flags");

    let runtime = tokio::runtime::Runtime::new().expect("failed to start async runtime");
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> ExitCode {
    let input_file = cli.input_file.as_ref().expect("-if is required");
    let domains = match read_domain_list(input_file, cli.resolver) {
        Ok(d) => d,
        Err(e) => {
            error!(error = %e, "failed to read domain list");
            return ExitCode::from(1);
        }
    };

    let query_list = match &cli.query_list {
        Some(path) => match read_query_list(path) {
            Ok(list) => Some(Arc::new(list)),
            Err(e) => {
                error!(error = %e, "failed to read query-list file");
                return ExitCode::from(1);
            }
        },
        None => None,
    };

    let bgp_prefixes = match &cli.bgp_prefix_file {
        Some(path) => match fs::read_to_string(path) {
            Ok(contents) => PrefixClassifier::parse_cidr_list(&contents),
            Err(e) => {
                panic!("cannot open required BGP prefix file {}: {e}", path.display());
            }
        },
        None => Vec::new(),
    };
    let special_prefixes = match &cli.special_prefix_file {
        Some(path) => match fs::read_to_string(path) {
            Ok(contents) => PrefixClassifier::parse_cidr_list(&contents),
            Err(e) => {
                panic!("cannot open required special prefix file {}: {e}", path.display());
            }
        },
        None => Vec::new(),
    };
    let classifier = Arc::new(PrefixClassifier::new(&bgp_prefixes, &special_prefixes, cli.ipv6));

    let scan_config = if query_list.is_none() {
        let config_path = match &cli.config_file {
            Some(p) => p,
            None => {
                error!("-config-file is required unless -query-list is set");
                return ExitCode::from(2);
            }
        };
        let contents = match fs::read_to_string(config_path) {
            Ok(c) => c,
            Err(e) => panic!("cannot open required config file {}: {e}", config_path.display()),
        };
        let limits_file = match ecsplorer::config::ScanLimitsFile::from_yaml(&contents) {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, "failed to parse YAML config");
                return ExitCode::from(2);
            }
        };
        match ScanConfig::from_file(
            &limits_file,
            cli.ipv6,
            cli.prefix_length,
            cli.randomize_depth as usize,
            cli.scope_zero_allowed,
            cli.scan_all_bgp,
            cli.max_temp_errors,
        ) {
            Ok(c) => Some(Arc::new(c)),
            Err(e) => {
                error!(error = %e, "invalid scan configuration");
                return ExitCode::from(2);
            }
        }
    } else {
        None
    };

    if let Some(out_dir) = &cli.out_dir {
        if out_dir.exists() {
            error!(path = %out_dir.display(), "output directory already exists");
            return ExitCode::from(2);
        }
        if let Err(e) = fs::create_dir_all(out_dir) {
            panic!("cannot create output directory {}: {e}", out_dir.display());
        }
        let mut perms = fs::metadata(out_dir).expect("just-created output dir must exist").permissions();
        perms.set_mode(0o750);
        let _ = fs::set_permissions(out_dir, perms);
    }

    let csv_path = if cli.disable_store {
        None
    } else {
        cli.out_dir.as_ref().map(|dir| dir.join("ecsresults.csv"))
    };
    let csv = match CsvWriter::create(csv_path.as_deref()) {
        Ok(w) => Arc::new(w),
        Err(e) => panic!("cannot create result CSV file: {e}"),
    };

    let probe_config = Arc::new(ProbeConfig {
        retries: cli.retries,
        dial_timeout: cli.timeout_dial,
        read_timeout: cli.timeout_read,
        write_timeout: cli.timeout_write,
        local_v4_source: cli.ip4_source,
        local_v6_source: cli.ip6_source,
        resolver_configured: cli.resolver.is_some(),
    });

    let controller_config = ControllerConfig {
        domain_outstanding: cli.domain_outstanding,
        planner_workers: cli.planner_workers,
        query_rate: cli.query_rate,
        channel_capacity: cli.channel_capacity,
        print_result: cli.print_result,
    };

    let total = domains.len();
    info!(total, "starting scan");

    let cpu_guard = cli.cpu_profile.as_ref().map(|_| {
        pprof::ProfilerGuardBuilder::default()
            .frequency(1000)
            .blocklist(&["libc", "libgcc", "pthread", "vdso"])
            .build()
            .expect("failed to start CPU profiler")
    });

    let scan_config = scan_config.unwrap_or_else(|| {
        Arc::new(ScanConfig {
            is_v6: cli.ipv6,
            limits: ecsplorer::config::ScanLimits::build(&ecsplorer::config::DepthLimits::default()),
            max_special_prefix_scans: 0,
            total_notrouted_limit: u32::MAX,
            prefix_length_to_scan_with: cli.prefix_length,
            scan_results_to_finish: u8::MAX,
            randomize_depth: cli.randomize_depth as usize,
            max_num_scope_zeros: cli.scope_zero_allowed,
            scan_all_bgp: cli.scan_all_bgp,
            maximum_temp_errors: cli.max_temp_errors,
        })
    });

    let run_future = controller::run(domains, scan_config, probe_config, controller_config, classifier, query_list, csv.clone());

    #[cfg(unix)]
    let mut sigpipe = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::pipe())
        .expect("failed to install SIGPIPE handler");
    #[cfg(unix)]
    let sigpipe_recv = sigpipe.recv();
    #[cfg(not(unix))]
    let sigpipe_recv = std::future::pending::<Option<()>>();

    let interrupted = tokio::select! {
        _ = run_future => {
            info!("scan completed normally");
            false
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted (SIGINT), exiting without a graceful drain");
            true
        }
        _ = sigpipe_recv => {
            info!("interrupted (SIGPIPE), exiting without a graceful drain");
            true
        }
    };

    flush_profiles(cli.cpu_profile.as_deref(), cli.mem_profile.as_deref(), cpu_guard).await;

    if cli.print_result {
        println!("scanned {total} domains; results in {:?}", cli.out_dir);
    }

    if interrupted {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

/// Flushes CPU and heap profiling artifacts, called both on normal
/// completion and from the SIGINT path above - there is no graceful drain,
/// only a best-effort flush before exit (§5 Cancellation).
async fn flush_profiles(cpu_path: Option<&std::path::Path>, mem_path: Option<&std::path::Path>, cpu_guard: Option<pprof::ProfilerGuard<'static>>) {
    if let (Some(path), Some(guard)) = (cpu_path, cpu_guard) {
        match guard.report().build() {
            Ok(report) => match fs::File::create(path) {
                Ok(file) => {
                    if let Err(e) = report.flamegraph(file) {
                        error!(error = %e, "failed to write CPU flamegraph");
                    }
                }
                Err(e) => error!(error = %e, path = %path.display(), "failed to create CPU profile output file"),
            },
            Err(e) => error!(error = %e, "failed to build CPU profile report"),
        }
    }

    if let Some(path) = mem_path {
        match jemalloc_pprof::PROF_CTL.as_ref() {
            Some(ctl) => {
                let mut ctl = ctl.lock().await;
                match ctl.dump_pprof() {
                    Ok(bytes) => {
                        if let Err(e) = fs::write(path, bytes) {
                            error!(error = %e, path = %path.display(), "failed to write heap profile");
                        }
                    }
                    Err(e) => error!(error = %e, "failed to dump heap profile"),
                }
            }
            None => error!("heap profiling requested but jemalloc profiling is not active (set MALLOC_CONF=prof:true)"),
        }
    }
}
