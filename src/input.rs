//! Loaders for the text-file inputs of §6: the domain list, the BGP/special
//! prefix files (delegated to [`crate::classify`]), and the query-list file.

use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;

use ipnetwork::IpNetwork;
use tracing::warn;

use crate::classify::parse_cidr;
use crate::error::{EcsplorerError, EcsplorerResult};

/// Parses `domain,nameserver_ip` lines. Malformed lines are logged and
/// skipped rather than aborting the whole load, matching §6's "logged and
/// skipped" contract for individual list entries.
///
/// When `resolver_override` is set the nameserver field is ignored and every
/// domain is paired with the configured resolver address instead.
pub fn load_domain_list(contents: &str, resolver_override: Option<IpAddr>) -> Vec<(String, IpAddr)> {
    let mut domains = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, ',');
        let domain = match parts.next() {
            Some(d) if !d.is_empty() => d,
            _ => {
                warn!(line = lineno + 1, "skipping domain list entry with no domain field");
                continue;
            }
        };
        if let Some(resolver) = resolver_override {
            domains.push((domain.to_string(), resolver));
            continue;
        }
        let ns_field = match parts.next() {
            Some(f) => f,
            None => {
                warn!(line = lineno + 1, domain, "skipping entry missing nameserver field");
                continue;
            }
        };
        match IpAddr::from_str(ns_field) {
            Ok(ip) => domains.push((domain.to_string(), ip)),
            Err(_) => warn!(line = lineno + 1, domain, ns_field, "skipping entry with unparseable nameserver address"),
        }
    }
    domains
}

pub fn read_domain_list(path: &Path, resolver_override: Option<IpAddr>) -> EcsplorerResult<Vec<(String, IpAddr)>> {
    let contents = std::fs::read_to_string(path).map_err(EcsplorerError::Io)?;
    Ok(load_domain_list(&contents, resolver_override))
}

/// Loads a query-list file: one CIDR per line, entirely replacing trie
/// planning. Unparseable lines are logged and skipped.
pub fn load_query_list(contents: &str) -> Vec<IpNetwork> {
    let mut list = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_cidr(line) {
            Ok(net) => list.push(net),
            Err(e) => warn!(line = lineno + 1, error = %e, "skipping unparseable query-list entry"),
        }
    }
    list
}

pub fn read_query_list(path: &Path) -> EcsplorerResult<Vec<IpNetwork>> {
    let contents = std::fs::read_to_string(path).map_err(EcsplorerError::Io)?;
    Ok(load_query_list(&contents))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_domain_list() {
        let input = "example.com,192.0.2.1\nexample.org,198.51.100.7\n";
        let domains = load_domain_list(input, None);
        assert_eq!(domains.len(), 2);
        assert_eq!(domains[0].0, "example.com");
        assert_eq!(domains[0].1, "192.0.2.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn skips_lines_with_missing_or_bad_nameserver() {
        let input = "good.test,192.0.2.1\nbad.test,not-an-ip\nincomplete.test\n";
        let domains = load_domain_list(input, None);
        assert_eq!(domains.len(), 1);
        assert_eq!(domains[0].0, "good.test");
    }

    #[test]
    fn resolver_override_ignores_nameserver_field() {
        let input = "a.test,192.0.2.1\nb.test,bogus\n";
        let resolver = "203.0.113.53".parse::<IpAddr>().unwrap();
        let domains = load_domain_list(input, Some(resolver));
        assert_eq!(domains.len(), 2);
        assert!(domains.iter().all(|(_, ns)| *ns == resolver));
    }

    #[test]
    fn query_list_skips_unparseable_cidrs() {
        let input = "10.0.0.0/8\nnot-a-cidr\n192.0.2.0/24\n";
        let list = load_query_list(input);
        assert_eq!(list.len(), 2);
    }
}
