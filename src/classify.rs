//! Prefix classifier: answers whether a candidate prefix is BGP-announced,
//! special-use, or contains a BGP-announced subprefix, given the static
//! tables loaded at startup.

use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;

use ipnetwork::IpNetwork;

use crate::addr::{bits_of, subnet_key, subnet_upper_key};
use crate::error::{EcsplorerError, EcsplorerResult};

/// One of the three kinds a trie node's prefix can be classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixKind {
    Unannounced,
    BgpAnnounced,
    Special,
}

/// Static, immutable tables of BGP-announced and special-use prefixes,
/// indexed by the subnet key of each entry's network address so a lookup on
/// a candidate prefix is a hash lookup plus a short scan of the lengths
/// present at that key.
pub struct PrefixClassifier {
    bgp_by_key: HashMap<u64, Vec<u8>>,
    bgp_keys_sorted: Vec<u64>,
    special_by_key: HashMap<u64, Vec<u8>>,
    is_v6: bool,
}

impl PrefixClassifier {
    /// Build a classifier from the parsed CIDR lists. `bgp` and `special`
    /// contain the CIDRs loaded from `-pf`/`-sf`; either may be empty.
    pub fn new(bgp: &[IpNetwork], special: &[IpNetwork], is_v6: bool) -> Self {
        let bgp_by_key = index_by_key(bgp, is_v6);
        let special_by_key = index_by_key(special, is_v6);
        let mut bgp_keys_sorted: Vec<u64> = bgp_by_key.keys().copied().collect();
        bgp_keys_sorted.sort_unstable();
        PrefixClassifier {
            bgp_by_key,
            bgp_keys_sorted,
            special_by_key,
            is_v6,
        }
    }

    /// Parse a text file of `address/len` CIDR lines, logging and skipping
    /// any line that fails to parse rather than aborting the whole load.
    pub fn parse_cidr_list(contents: &str) -> Vec<IpNetwork> {
        let mut nets = Vec::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match IpNetwork::from_str(line) {
                Ok(net) => nets.push(net),
                Err(_) => tracing::warn!(line, "skipping unparseable CIDR entry"),
            }
        }
        nets
    }

    pub fn is_bgp(&self, prefix: &[u8]) -> bool {
        let key = subnet_key(prefix, self.is_v6);
        match self.bgp_by_key.get(&key) {
            Some(lengths) => lengths.contains(&(prefix.len() as u8)),
            None => false,
        }
    }

    pub fn is_special(&self, prefix: &[u8]) -> bool {
        let key = subnet_key(prefix, self.is_v6);
        match self.special_by_key.get(&key) {
            Some(lengths) => {
                let shortest = lengths.iter().copied().min().unwrap_or(u8::MAX);
                shortest <= prefix.len() as u8
            }
            None => false,
        }
    }

    /// True iff the BGP table holds any entry at all, mirroring the root
    /// trie node's `hasBGPSubnet` (the whole address space "has a BGP
    /// subnet" whenever any prefix has been loaded).
    pub fn has_any_bgp(&self) -> bool {
        !self.bgp_keys_sorted.is_empty()
    }

    /// True iff any BGP entry's network address falls within the numeric
    /// range spanned by `prefix`.
    pub fn has_bgp_subnet(&self, prefix: &[u8]) -> bool {
        let start = subnet_key(prefix, self.is_v6);
        let end = subnet_upper_key(prefix, self.is_v6);
        let idx = self.bgp_keys_sorted.partition_point(|&k| k < start);
        match self.bgp_keys_sorted.get(idx) {
            Some(&k) => k <= end,
            None => false,
        }
    }
}

fn index_by_key(nets: &[IpNetwork], is_v6: bool) -> HashMap<u64, Vec<u8>> {
    let mut map: HashMap<u64, Vec<u8>> = HashMap::new();
    for net in nets {
        let addr_is_v6 = matches!(net, IpNetwork::V6(_));
        if addr_is_v6 != is_v6 {
            continue;
        }
        let ip: IpAddr = net.network();
        let prefix_len = net.prefix();
        let bits = bits_of(ip, is_v6);
        let key = subnet_key(&bits[..prefix_len as usize], is_v6);
        map.entry(key).or_default().push(prefix_len);
    }
    map
}

/// Parse a single `address/len` CIDR line, used for the query-list input in
/// list mode. Returns a descriptive error rather than skipping, since a
/// malformed entry there directly corresponds to a missing scan target.
pub fn parse_cidr(line: &str) -> EcsplorerResult<IpNetwork> {
    IpNetwork::from_str(line.trim()).map_err(|_| EcsplorerError::InvalidPrefix(line.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> PrefixClassifier {
        let bgp = vec![
            IpNetwork::from_str("10.0.0.0/8").unwrap(),
            IpNetwork::from_str("198.51.100.0/24").unwrap(),
        ];
        let special = vec![IpNetwork::from_str("192.0.2.0/24").unwrap()];
        PrefixClassifier::new(&bgp, &special, false)
    }

    fn prefix(addr: &str, len: usize) -> Vec<u8> {
        let ip: IpAddr = addr.parse().unwrap();
        bits_of(ip, false)[..len].to_vec()
    }

    #[test]
    fn exact_bgp_match() {
        let c = classifier();
        assert!(c.is_bgp(&prefix("10.0.0.0", 8)));
        assert!(!c.is_bgp(&prefix("10.0.0.0", 9)));
    }

    #[test]
    fn special_matches_equal_or_narrower() {
        let c = classifier();
        assert!(c.is_special(&prefix("192.0.2.0", 24)));
        assert!(c.is_special(&prefix("192.0.2.128", 25)));
        assert!(!c.is_special(&prefix("192.0.2.0", 23)));
    }

    #[test]
    fn has_bgp_subnet_detects_descendant_announcement() {
        let c = classifier();
        assert!(c.has_bgp_subnet(&prefix("10.0.0.0", 7)));
        assert!(!c.has_bgp_subnet(&prefix("11.0.0.0", 8)));
        assert!(c.has_bgp_subnet(&prefix("198.51.100.0", 23)));
    }
}
