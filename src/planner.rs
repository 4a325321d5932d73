//! The planner: given a domain's prior response(s), decides the next ECS
//! probe or retires the domain. Two variants per §4.4, selected once at
//! startup by whether a query-list file was supplied.

use std::net::IpAddr;
use std::sync::Arc;

use ipnetwork::IpNetwork;

use crate::classify::PrefixClassifier;
use crate::config::ScanConfig;
use crate::proto::{ErrorType, Family, PlannerInput, PlannerOutput, QueryRequest, QueryRequestList};
use crate::trie::{calculate_next_parameters, effective_scope_bits, root_handle_response, Elem};

/// Hard-coded in the original source; `spec.md` keeps them fixed but notes
/// an implementation may surface them as configuration.
pub const MAX_INFLIGHT: usize = 500;
pub const MAX_LIST_LENGTH: usize = 1000;

/// Trie planner: one cooperative invocation per admitted domain per
/// request/response round-trip.
pub fn plan_trie(mut input: PlannerInput, config: &ScanConfig, classifier: &PrefixClassifier) -> PlannerOutput {
    assert!(
        input.last_scans.len() <= 1,
        "trie planner invoked with more than one prior response"
    );

    if input.last_scans.is_empty() {
        input.domain_state.trie_root = Some(Elem::new_root());
    } else {
        let response = &input.last_scans[0];
        if response.error == ErrorType::NoErr {
            let effective = effective_scope_bits(
                response.request.ip_address_client,
                response.request.source_prefix_length,
                response.scope_prefix_length,
                config.is_v6,
            );
            let root = input
                .domain_state
                .trie_root
                .as_mut()
                .expect("trie root installed on the first planner invocation");
            if root_handle_response(root, &effective, config, classifier) {
                return PlannerOutput::DomainScanFinished(input.domain_state);
            }
        }
    }

    if input.domain_state.perm_error || input.domain_state.temp_errors > config.maximum_temp_errors {
        return PlannerOutput::DomainScanFinished(input.domain_state);
    }

    let root = input
        .domain_state
        .trie_root
        .as_mut()
        .expect("trie root installed on the first planner invocation");
    match calculate_next_parameters(root, config, classifier) {
        None => PlannerOutput::DomainScanFinished(input.domain_state),
        Some((ip, source_len)) => {
            let family = if config.is_v6 { Family::V6 } else { Family::V4 };
            let request = QueryRequest {
                ip_address_client: ip,
                source_prefix_length: source_len,
                family,
                domain: Arc::from(input.domain_state.domain.as_str()),
                nameserver_ip: input.domain_state.nameserver_ip,
            };
            PlannerOutput::QueryRequest(input.domain_state, request)
        }
    }
}

/// List planner: candidate prefixes are drawn sequentially from an
/// externally supplied list, replacing the trie entirely.
pub fn plan_list(mut input: PlannerInput, query_list: &[IpNetwork]) -> PlannerOutput {
    input.domain_state.list_response_index += input.last_scans.len();

    let scan_index = input.domain_state.list_scan_index;
    let response_index = input.domain_state.list_response_index;

    let window_open = scan_index < query_list.len()
        && (response_index as i64) > (scan_index as i64) - (MAX_INFLIGHT as i64);

    if window_open {
        let domain: Arc<str> = Arc::from(input.domain_state.domain.as_str());
        let nameserver_ip: IpAddr = input.domain_state.nameserver_ip;
        let mut requests = Vec::new();
        while input.domain_state.list_scan_index < query_list.len() && requests.len() < MAX_LIST_LENGTH {
            let net = query_list[input.domain_state.list_scan_index];
            let (ip, prefix_len, family) = match net {
                IpNetwork::V4(n) => (IpAddr::V4(n.ip()), n.prefix(), Family::V4),
                IpNetwork::V6(n) => (IpAddr::V6(n.ip()), n.prefix(), Family::V6),
            };
            requests.push(QueryRequest {
                ip_address_client: ip,
                source_prefix_length: prefix_len,
                family,
                domain: domain.clone(),
                nameserver_ip,
            });
            input.domain_state.list_scan_index += 1;
        }
        PlannerOutput::QueryRequestList(input.domain_state, QueryRequestList { requests })
    } else if input.domain_state.list_response_index >= query_list.len() {
        PlannerOutput::DomainScanFinished(input.domain_state)
    } else {
        PlannerOutput::WaitingForMoreResults(input.domain_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DepthLimits, ScanLimits};
    use crate::domain::DomainState;
    use std::str::FromStr;

    fn config() -> ScanConfig {
        ScanConfig {
            is_v6: false,
            limits: ScanLimits::build(&DepthLimits::default()),
            max_special_prefix_scans: 0,
            total_notrouted_limit: u32::MAX,
            prefix_length_to_scan_with: 24,
            scan_results_to_finish: u8::MAX,
            randomize_depth: 32,
            max_num_scope_zeros: 0,
            scan_all_bgp: false,
            maximum_temp_errors: 3,
        }
    }

    #[test]
    fn first_invocation_installs_root_and_emits_request() {
        let classifier = PrefixClassifier::new(&[], &[], false);
        let ds = Box::new(DomainState::new("a.test".to_string(), "192.0.2.1".parse().unwrap()));
        let input = PlannerInput {
            domain_state: ds,
            last_scans: vec![],
        };
        match plan_trie(input, &config(), &classifier) {
            PlannerOutput::QueryRequest(ds, req) => {
                assert!(ds.trie_root.is_some());
                assert_eq!(req.source_prefix_length, 24);
            }
            _ => panic!("expected a query request"),
        }
    }

    #[test]
    fn permanent_error_retires_domain_without_consulting_trie() {
        let classifier = PrefixClassifier::new(&[], &[], false);
        let mut ds = Box::new(DomainState::new("a.test".to_string(), "192.0.2.1".parse().unwrap()));
        ds.trie_root = Some(Elem::new_root());
        ds.perm_error = true;
        let input = PlannerInput {
            domain_state: ds,
            last_scans: vec![],
        };
        match plan_trie(input, &config(), &classifier) {
            PlannerOutput::DomainScanFinished(_) => {}
            _ => panic!("expected the domain to retire"),
        }
    }

    #[test]
    fn list_mode_admits_first_batch_up_to_max_list_length() {
        let list: Vec<IpNetwork> = (0..3000u32)
            .map(|i| IpNetwork::from_str(&format!("{}.{}.{}.0/32", i / 65536 % 256, i / 256 % 256, i % 256)).unwrap())
            .collect();
        let ds = Box::new(DomainState::new("a.test".to_string(), "192.0.2.1".parse().unwrap()));
        let input = PlannerInput {
            domain_state: ds,
            last_scans: vec![],
        };
        match plan_list(input, &list) {
            PlannerOutput::QueryRequestList(ds, batch) => {
                assert_eq!(batch.requests.len(), MAX_LIST_LENGTH);
                assert_eq!(ds.list_scan_index, MAX_LIST_LENGTH);
            }
            _ => panic!("expected a query request list"),
        }
    }

    #[test]
    fn list_mode_finishes_once_all_responses_seen() {
        let list: Vec<IpNetwork> = vec![IpNetwork::from_str("203.0.113.1/32").unwrap()];
        let mut ds = Box::new(DomainState::new("a.test".to_string(), "192.0.2.1".parse().unwrap()));
        ds.list_scan_index = 1;
        ds.list_response_index = 0;
        let input = PlannerInput {
            domain_state: ds,
            last_scans: vec![crate::proto::QueryResponse {
                request: QueryRequest {
                    ip_address_client: "203.0.113.1".parse().unwrap(),
                    source_prefix_length: 32,
                    family: Family::V4,
                    domain: Arc::from("a.test"),
                    nameserver_ip: "192.0.2.1".parse().unwrap(),
                },
                scope_prefix_length: 32,
                error: ErrorType::NoErr,
                error_detail: String::new(),
                nsid: None,
                answers: vec![],
                cnames: vec![],
            }],
        };
        match plan_list(input, &list) {
            PlannerOutput::DomainScanFinished(_) => {}
            _ => panic!("expected domain scan finished"),
        }
    }
}
