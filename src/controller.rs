//! The controller (§4.3): admits domains up to `domainOutstanding`, hands
//! work to a planner pool and a probe pool over bounded channels, and
//! retires domains once their planner returns `DomainScanFinished`.
//!
//! Mirrors the original's single-threaded `sync.Cond`-guarded admission
//! loop, but expressed with `tokio::sync::mpsc` channels standing in for the
//! original's internal work queues and `tokio::select!` standing in for the
//! condition-variable wakeup.

use std::sync::Arc;

use ipnetwork::IpNetwork;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::classify::PrefixClassifier;
use crate::config::ScanConfig;
use crate::csvwriter::CsvWriter;
use crate::domain::DomainState;
use crate::planner::{plan_list, plan_trie};
use crate::probe::{perform_query, ProbeConfig};
use crate::proto::{PlannerInput, PlannerOutput, QueryRequest, QueryRequestList, QueryResponse, QueryResponseList};
use crate::ratelimit::TokenBucket;

/// One unit of work handed to a planner worker.
enum PlannerJob {
    Input(PlannerInput),
}

/// One unit of work handed to a probe worker.
enum ProbeJob {
    Single(Box<DomainState>, QueryRequest),
    List(Box<DomainState>, QueryRequestList),
}

/// Result handed back from a probe worker to the controller.
enum ProbeResult {
    Single(Box<DomainState>, QueryResponse),
    List(Box<DomainState>, QueryResponseList),
}

pub struct ControllerConfig {
    pub domain_outstanding: usize,
    pub planner_workers: usize,
    pub query_rate: usize,
    /// `-cc`: capacity shared by all four controller/planner/probe channels,
    /// mirroring the original's `capacityForChannelsFlag`.
    pub channel_capacity: usize,
    /// Mirrors `-pr`: log each domain's full trie summary as it retires,
    /// not just that it retired.
    pub print_result: bool,
}

/// Drives the whole scan to completion: admits domains, dispatches planner
/// and probe work, writes results, and returns once every admitted domain
/// has finished.
pub async fn run(
    domains: Vec<(String, std::net::IpAddr)>,
    scan_config: Arc<ScanConfig>,
    probe_config: Arc<ProbeConfig>,
    controller_config: ControllerConfig,
    classifier: Arc<PrefixClassifier>,
    query_list: Option<Arc<Vec<IpNetwork>>>,
    csv: Arc<CsvWriter>,
) {
    let channel_capacity = controller_config.channel_capacity.max(1);
    let (planner_tx, mut planner_rx) = mpsc::channel::<PlannerJob>(channel_capacity);
    let (planner_result_tx, mut planner_result_rx) = mpsc::channel::<PlannerOutput>(channel_capacity);
    let (probe_tx, mut probe_rx) = mpsc::channel::<ProbeJob>(channel_capacity);
    let (probe_result_tx, mut probe_result_rx) = mpsc::channel::<ProbeResult>(channel_capacity);

    spawn_planner_pool(
        controller_config.planner_workers.max(1),
        &mut planner_rx,
        planner_result_tx.clone(),
        scan_config.clone(),
        classifier.clone(),
        query_list.clone(),
    );

    let bucket = Arc::new(TokenBucket::new(controller_config.query_rate.max(1)));
    bucket.spawn_refiller(controller_config.query_rate.max(1));
    spawn_probe_pool(
        controller_config.query_rate.max(1),
        &mut probe_rx,
        probe_result_tx.clone(),
        probe_config.clone(),
        bucket,
    );
    drop(planner_rx);
    drop(probe_rx);

    let total_domains = domains.len();
    let mut pending = std::collections::VecDeque::from(domains);

    let mut outstanding = 0usize;
    let mut finished = 0usize;

    loop {
        if finished >= total_domains {
            break;
        }

        while outstanding < controller_config.domain_outstanding {
            let next = pending.pop_front();
            let (domain, nameserver_ip) = match next {
                Some(pair) => pair,
                None => break,
            };
            let domain_state = Box::new(DomainState::new(domain, nameserver_ip));
            let job = PlannerJob::Input(PlannerInput {
                domain_state,
                last_scans: Vec::new(),
            });
            if planner_tx.send(job).await.is_err() {
                warn!("planner pool closed while admitting domains");
                break;
            }
            outstanding += 1;
        }

        tokio::select! {
            Some(output) = planner_result_rx.recv() => {
                match output {
                    PlannerOutput::DomainScanFinished(ds) => {
                        if controller_config.print_result {
                            match ds.trie_root.as_ref().map(crate::trie::summarize) {
                                Some(summary) => info!(
                                    domain = %ds.domain, ns = %ds.nameserver_ip,
                                    nodes = summary.nodes, leaves = summary.leaves,
                                    total_scans = summary.total_scans,
                                    response_satisfied_nodes = summary.response_satisfied_nodes,
                                    temp_errors = ds.temp_errors, perm_error = ds.perm_error,
                                    "domain result",
                                ),
                                None => info!(
                                    domain = %ds.domain, ns = %ds.nameserver_ip,
                                    list_scan_index = ds.list_scan_index, list_response_index = ds.list_response_index,
                                    temp_errors = ds.temp_errors, perm_error = ds.perm_error,
                                    "domain result",
                                ),
                            }
                        } else {
                            debug!(domain = %ds.domain, "scan finished");
                        }
                        finished += 1;
                        outstanding -= 1;
                    }
                    PlannerOutput::WaitingForMoreResults(_ds) => {
                        // List mode still has in-flight probes outstanding for
                        // this domain; nothing to dispatch until they land.
                    }
                    PlannerOutput::QueryRequest(ds, request) => {
                        if probe_tx.send(ProbeJob::Single(ds, request)).await.is_err() {
                            warn!("probe pool closed while dispatching a query");
                        }
                    }
                    PlannerOutput::QueryRequestList(ds, list) => {
                        if probe_tx.send(ProbeJob::List(ds, list)).await.is_err() {
                            warn!("probe pool closed while dispatching a query list");
                        }
                    }
                }
            }
            Some(result) = probe_result_rx.recv() => {
                match result {
                    ProbeResult::Single(mut ds, response) => {
                        if response.error.is_permanent() {
                            ds.perm_error = true;
                        } else if response.error != crate::proto::ErrorType::NoErr {
                            ds.temp_errors += 1;
                        }
                        csv.write_response(&ds.domain, &response);
                        let job = PlannerJob::Input(PlannerInput {
                            domain_state: ds,
                            last_scans: vec![response],
                        });
                        if planner_tx.send(job).await.is_err() {
                            warn!("planner pool closed while forwarding a probe result");
                        }
                    }
                    ProbeResult::List(mut ds, list) => {
                        for response in &list.responses {
                            if response.error.is_permanent() {
                                ds.perm_error = true;
                            } else if response.error != crate::proto::ErrorType::NoErr {
                                ds.temp_errors += 1;
                            }
                            csv.write_response(&ds.domain, response);
                        }
                        let job = PlannerJob::Input(PlannerInput {
                            domain_state: ds,
                            last_scans: list.responses,
                        });
                        if planner_tx.send(job).await.is_err() {
                            warn!("planner pool closed while forwarding a probe result list");
                        }
                    }
                }
            }
        }
    }

    info!(total = total_domains, "all domains finished");
}

fn spawn_planner_pool(
    workers: usize,
    rx: &mut mpsc::Receiver<PlannerJob>,
    result_tx: mpsc::Sender<PlannerOutput>,
    scan_config: Arc<ScanConfig>,
    classifier: Arc<PrefixClassifier>,
    query_list: Option<Arc<Vec<IpNetwork>>>,
) {
    // `mpsc::Receiver` cannot be cloned; workers share it behind a mutex so
    // any idle worker can pick up the next job, mirroring the original's
    // single shared work queue rather than one queue per worker.
    let shared_rx = Arc::new(Mutex::new(std::mem::replace(rx, mpsc::channel(1).1)));
    for _ in 0..workers {
        let shared_rx = shared_rx.clone();
        let result_tx = result_tx.clone();
        let scan_config = scan_config.clone();
        let classifier = classifier.clone();
        let query_list = query_list.clone();
        tokio::spawn(async move {
            loop {
                let job = {
                    let mut guard = shared_rx.lock().await;
                    guard.recv().await
                };
                let job = match job {
                    Some(j) => j,
                    None => break,
                };
                let PlannerJob::Input(input) = job;
                let output = match &query_list {
                    Some(list) => plan_list(input, list),
                    None => plan_trie(input, &scan_config, &classifier),
                };
                if result_tx.send(output).await.is_err() {
                    break;
                }
            }
        });
    }
}

fn spawn_probe_pool(
    workers: usize,
    rx: &mut mpsc::Receiver<ProbeJob>,
    result_tx: mpsc::Sender<ProbeResult>,
    probe_config: Arc<ProbeConfig>,
    bucket: Arc<TokenBucket>,
) {
    let shared_rx = Arc::new(Mutex::new(std::mem::replace(rx, mpsc::channel(1).1)));
    for _ in 0..workers {
        let shared_rx = shared_rx.clone();
        let result_tx = result_tx.clone();
        let probe_config = probe_config.clone();
        let bucket = bucket.clone();
        tokio::spawn(async move {
            loop {
                let job = {
                    let mut guard = shared_rx.lock().await;
                    guard.recv().await
                };
                let job = match job {
                    Some(j) => j,
                    None => break,
                };
                match job {
                    ProbeJob::Single(ds, request) => {
                        bucket.acquire().await;
                        let response = perform_query(request, &probe_config).await;
                        if result_tx.send(ProbeResult::Single(ds, response)).await.is_err() {
                            break;
                        }
                    }
                    ProbeJob::List(ds, list) => {
                        let mut responses = Vec::with_capacity(list.requests.len());
                        for request in list.requests {
                            bucket.acquire().await;
                            responses.push(perform_query(request, &probe_config).await);
                        }
                        if result_tx
                            .send(ProbeResult::List(ds, QueryResponseList { responses }))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }
        });
    }
}
