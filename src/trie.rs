//! The per-domain scan trie: a binary trie over the address space that
//! tracks which prefixes have been probed and drives the adaptive
//! prefix-selection policy described by [`get_new_parameters_with_mode`].
//!
//! The trie is encoded as a tagged sum (`Elem::Root` / `Elem::Node` /
//! `Elem::Leaf`) rather than as a trait object hierarchy: a `Leaf` is a
//! collapsed subtree that has been pruned from further consideration but
//! still carries its aggregate scan counters for bookkeeping.

use std::net::IpAddr;

use crate::addr::{bits_of, ip_of, mask};
use crate::classify::{PrefixClassifier, PrefixKind};
use crate::config::ScanConfig;

/// Restrictiveness of the scanning policy at a given node, ordered so that
/// `Finished` dominates every other mode under `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScanMode {
    Sample,
    Bgp,
    BgpPrefix,
    Finished,
}

#[derive(Debug)]
pub struct RootData {
    pub scope_zero_observed: u32,
    pub children: [Option<Box<Elem>>; 2],
}

#[derive(Debug)]
pub struct NodeData {
    pub counter_returned_as_scope: u32,
    pub node_scans: u32,
    pub scans_announced: u32,
    pub scans_unannounced: u32,
    pub kind: PrefixKind,
    pub has_bgp_subnet: bool,
    pub is_announced: bool,
    pub value: u8,
    pub children: [Option<Box<Elem>>; 2],
}

#[derive(Debug)]
pub struct LeafData {
    pub leaf_scanned: u32,
    pub scans_announced: u32,
    pub scans_unannounced: u32,
    pub kind: PrefixKind,
    pub has_bgp_subnet: bool,
    pub is_announced: bool,
    pub value: u8,
}

#[derive(Debug)]
pub enum Elem {
    Root(RootData),
    Node(NodeData),
    Leaf(LeafData),
}

impl Elem {
    pub fn new_root() -> Elem {
        Elem::Root(RootData {
            scope_zero_observed: 0,
            children: [None, None],
        })
    }

    /// Collapse a `Node` into a `Leaf`, carrying the aggregate scan counters
    /// forward. A leaf's own `leaf_scanned` flag starts fresh rather than
    /// inheriting the node's scan count - it is never consulted again since
    /// a leaf always reports `ScanMode::Finished`.
    fn collapse(self) -> Elem {
        match self {
            Elem::Node(n) => Elem::Leaf(LeafData {
                leaf_scanned: 0,
                scans_announced: n.scans_announced,
                scans_unannounced: n.scans_unannounced,
                kind: n.kind,
                has_bgp_subnet: n.has_bgp_subnet,
                is_announced: n.is_announced,
                value: n.value,
            }),
            other => other,
        }
    }

    fn value(&self) -> Option<u8> {
        match self {
            Elem::Root(_) => None,
            Elem::Node(n) => Some(n.value),
            Elem::Leaf(l) => Some(l.value),
        }
    }

    fn was_scanned(&self) -> bool {
        match self {
            Elem::Root(_) => false,
            Elem::Node(n) => n.node_scans >= 1,
            Elem::Leaf(l) => l.leaf_scanned >= 1,
        }
    }

    fn set_scanned(&mut self) {
        match self {
            Elem::Root(_) => {}
            Elem::Node(n) => {
                n.node_scans += 1;
                if n.kind == PrefixKind::BgpAnnounced {
                    n.scans_announced += 1;
                } else {
                    n.scans_unannounced += 1;
                }
            }
            Elem::Leaf(l) => {
                l.leaf_scanned += 1;
                if l.kind == PrefixKind::BgpAnnounced {
                    l.scans_announced += 1;
                } else {
                    l.scans_unannounced += 1;
                }
            }
        }
    }

    fn set_child_scanned(&mut self, is_bgp_announced: bool) {
        match self {
            Elem::Root(_) => {}
            Elem::Node(n) => {
                if is_bgp_announced || n.kind == PrefixKind::BgpAnnounced {
                    n.scans_announced += 1;
                } else {
                    n.scans_unannounced += 1;
                }
            }
            Elem::Leaf(l) => {
                if is_bgp_announced || l.kind == PrefixKind::BgpAnnounced {
                    l.scans_announced += 1;
                } else {
                    l.scans_unannounced += 1;
                }
            }
        }
    }

    fn is_bgp_prefix(&self) -> bool {
        match self {
            Elem::Root(_) => false,
            Elem::Node(n) => n.kind == PrefixKind::BgpAnnounced,
            Elem::Leaf(l) => l.kind == PrefixKind::BgpAnnounced,
        }
    }

    fn is_in_announced_space(&self) -> bool {
        match self {
            Elem::Root(_) => false,
            Elem::Node(n) => n.is_announced,
            Elem::Leaf(l) => l.is_announced,
        }
    }

    fn has_bgp_subnet_flag(&self, classifier: &PrefixClassifier) -> bool {
        match self {
            Elem::Root(_) => classifier.has_any_bgp(),
            Elem::Node(n) => n.has_bgp_subnet,
            Elem::Leaf(l) => l.has_bgp_subnet,
        }
    }
}

fn make_new_node(
    prefix_upto_parent: &[u8],
    this_value: u8,
    parent_kind: PrefixKind,
    parent_announced: bool,
    classifier: &PrefixClassifier,
) -> NodeData {
    let mut prefix = prefix_upto_parent.to_vec();
    prefix.push(this_value);

    let kind = if parent_kind == PrefixKind::Special || classifier.is_special(&prefix) {
        PrefixKind::Special
    } else if classifier.is_bgp(&prefix) {
        PrefixKind::BgpAnnounced
    } else {
        PrefixKind::Unannounced
    };
    let has_bgp_subnet = classifier.has_bgp_subnet(&prefix);

    NodeData {
        counter_returned_as_scope: 0,
        node_scans: 0,
        scans_announced: 0,
        scans_unannounced: 0,
        kind,
        has_bgp_subnet,
        is_announced: parent_announced || kind == PrefixKind::BgpAnnounced,
        value: this_value,
        children: [None, None],
    }
}

fn ensure_child(
    children: &mut [Option<Box<Elem>>; 2],
    idx: usize,
    prefix_upto_parent: &[u8],
    parent_kind: PrefixKind,
    parent_announced: bool,
    classifier: &PrefixClassifier,
) {
    if children[idx].is_none() {
        let node = make_new_node(prefix_upto_parent, idx as u8, parent_kind, parent_announced, classifier);
        children[idx] = Some(Box::new(Elem::Node(node)));
    }
}

/// Fetch (materializing if absent) the child at `idx`. Returns `None` only
/// when `elem` is a leaf - leaves have no children and, per the "collapsed
/// subtree" invariant, are never expanded again.
fn get_child_mut<'a>(
    elem: &'a mut Elem,
    idx: u8,
    prefix_upto_parent: &[u8],
    classifier: &PrefixClassifier,
) -> Option<&'a mut Elem> {
    match elem {
        Elem::Leaf(_) => None,
        Elem::Root(root) => {
            ensure_child(&mut root.children, idx as usize, prefix_upto_parent, PrefixKind::Unannounced, false, classifier);
            root.children[idx as usize].as_deref_mut()
        }
        Elem::Node(node) => {
            ensure_child(&mut node.children, idx as usize, prefix_upto_parent, node.kind, node.is_announced, classifier);
            node.children[idx as usize].as_deref_mut()
        }
    }
}

fn finish_child_element(elem: &mut Elem, idx: u8) {
    let children = match elem {
        Elem::Root(r) => &mut r.children,
        Elem::Node(n) => &mut n.children,
        Elem::Leaf(_) => return,
    };
    if let Some(child) = children[idx as usize].take() {
        children[idx as usize] = Some(Box::new(child.collapse()));
    }
}

fn node_any_not_finished_bgp_subnets_left(
    node: &mut NodeData,
    prefix_upto_this: &[u8],
    config: &ScanConfig,
    classifier: &PrefixClassifier,
) -> bool {
    if node.kind == PrefixKind::BgpAnnounced && node.node_scans == 0 {
        return true;
    }
    if !node.has_bgp_subnet {
        return false;
    }
    if prefix_upto_this.len() == config.prefix_length_to_scan_with as usize {
        return false;
    }
    for idx in 0..2u8 {
        ensure_child(&mut node.children, idx as usize, prefix_upto_this, node.kind, node.is_announced, classifier);
        let mut child_prefix = prefix_upto_this.to_vec();
        child_prefix.push(idx);
        let child = node.children[idx as usize].as_deref_mut().unwrap();
        if elem_any_not_finished_bgp_subnets_left(child, &child_prefix, config, classifier) {
            return true;
        }
    }
    false
}

fn elem_any_not_finished_bgp_subnets_left(
    elem: &mut Elem,
    prefix_upto_this: &[u8],
    config: &ScanConfig,
    classifier: &PrefixClassifier,
) -> bool {
    match elem {
        Elem::Leaf(_) => false,
        Elem::Root(root) => {
            for idx in 0..2 {
                if let Some(child) = root.children[idx].as_deref_mut() {
                    if elem_any_not_finished_bgp_subnets_left(child, prefix_upto_this, config, classifier) {
                        return true;
                    }
                }
            }
            false
        }
        Elem::Node(node) => node_any_not_finished_bgp_subnets_left(node, prefix_upto_this, config, classifier),
    }
}

/// The scanning mode decision table of §4.3.2, evaluated for any element
/// (root, node or leaf) at the given prefix depth.
fn scanning_mode(elem: &mut Elem, prefix_upto_this: &[u8], config: &ScanConfig, classifier: &PrefixClassifier) -> ScanMode {
    match elem {
        Elem::Leaf(_) => ScanMode::Finished,
        Elem::Root(root) => {
            let mut mode = ScanMode::Finished;
            for idx in 0..2 {
                match root.children[idx].as_deref_mut() {
                    None => return ScanMode::Sample,
                    Some(child) => {
                        let child_mode = scanning_mode(child, prefix_upto_this, config, classifier);
                        if child_mode < mode {
                            mode = child_mode;
                        }
                    }
                }
            }
            mode
        }
        Elem::Node(node) => {
            let depth = prefix_upto_this.len();
            if node.kind == PrefixKind::Special && config.max_special_prefix_scans <= node.scans_unannounced {
                return ScanMode::Finished;
            }
            let total_hit_default = node.scans_unannounced + node.scans_announced >= config.total_notrouted_limit;
            let default_mode = if total_hit_default { ScanMode::Bgp } else { ScanMode::Sample };
            if config.limits.no_limits_at(depth) {
                // `-scanAllBGP`: keep pursuing unfinished BGP subprefixes even
                // when no per-depth limit would otherwise force the issue.
                if config.scan_all_bgp && node_any_not_finished_bgp_subnets_left(node, prefix_upto_this, config, classifier) {
                    return ScanMode::BgpPrefix;
                }
                return default_mode;
            }
            if node.counter_returned_as_scope >= config.scan_results_to_finish as u32 {
                return if node_any_not_finished_bgp_subnets_left(node, prefix_upto_this, config, classifier) {
                    ScanMode::BgpPrefix
                } else {
                    ScanMode::Finished
                };
            }
            let total_hit = config.limits.total.at(depth) != 0
                && config.limits.total.at(depth) <= node.scans_unannounced + node.scans_announced;
            let announced_hit =
                config.limits.bgp_announced.at(depth) != 0 && config.limits.bgp_announced.at(depth) <= node.scans_announced;
            let unannounced_hit =
                config.limits.unannounced.at(depth) != 0 && config.limits.unannounced.at(depth) <= node.scans_unannounced;
            if total_hit || announced_hit || unannounced_hit {
                let bgp_left = node_any_not_finished_bgp_subnets_left(node, prefix_upto_this, config, classifier);
                if total_hit || announced_hit {
                    if bgp_left {
                        ScanMode::BgpPrefix
                    } else {
                        ScanMode::Finished
                    }
                } else {
                    ScanMode::Bgp
                }
            } else {
                default_mode
            }
        }
    }
}

/// §4.3.3: pick the next probe target, descending the trie under `elem`.
/// Returns the selected bit-field prefix (of length exactly
/// `prefixLengthToScanWith`) plus whether it lies in BGP-announced space, or
/// `None` if nothing remains to scan under this subtree.
pub fn get_new_parameters_with_mode(
    elem: &mut Elem,
    prefix_upto_parent: &[u8],
    scanning_mode_in: ScanMode,
    config: &ScanConfig,
    classifier: &PrefixClassifier,
) -> Option<(Vec<u8>, bool)> {
    if matches!(elem, Elem::Leaf(_)) {
        return None;
    }

    let mut current_prefix = prefix_upto_parent.to_vec();
    if let Some(v) = elem.value() {
        current_prefix.push(v);
    }

    let node_mode = scanning_mode(elem, &current_prefix, config, classifier);
    if node_mode == ScanMode::Finished {
        return None;
    }
    let mode = scanning_mode_in.max(node_mode);

    if (mode == ScanMode::Bgp || mode == ScanMode::BgpPrefix)
        && !elem.has_bgp_subnet_flag(classifier)
        && !elem.is_in_announced_space()
    {
        return None;
    }

    if current_prefix.len() == config.prefix_length_to_scan_with as usize {
        if elem.was_scanned() {
            return None;
        }
        let eligible = mode == ScanMode::Sample
            || (mode == ScanMode::BgpPrefix && elem.is_bgp_prefix())
            || (mode == ScanMode::Bgp && elem.is_in_announced_space());
        if !eligible {
            return None;
        }
        elem.set_scanned();
        return Some((current_prefix, elem.is_bgp_prefix()));
    }

    let first_child_index: u8 = if current_prefix.len() >= config.randomize_depth {
        rand::random::<bool>() as u8
    } else {
        0
    };
    let mut slot_order = [first_child_index, 1 - first_child_index];
    let mut available = [false, false];
    let mut bgp_leaning = [false, false];

    for (pos, &child_idx) in slot_order.iter().enumerate() {
        let child = get_child_mut(elem, child_idx, &current_prefix, classifier)
            .expect("root/node children are always materialized on access");
        if matches!(child, Elem::Leaf(_)) {
            continue;
        }
        let disqualified = mode == ScanMode::BgpPrefix
            && !child.is_bgp_prefix()
            && !child.has_bgp_subnet_flag(classifier);
        let already_scanned = child.was_scanned();
        if disqualified || already_scanned {
            finish_child_element(elem, child_idx);
            continue;
        }
        bgp_leaning[pos] = child.has_bgp_subnet_flag(classifier) || child.is_in_announced_space();
        available[pos] = true;
    }

    if available[0] || available[1] {
        let mut only_second_has_bgp = true;
        if available[0] && bgp_leaning[0] {
            only_second_has_bgp = false;
        }
        if available[1] && !bgp_leaning[1] {
            only_second_has_bgp = false;
        }
        if only_second_has_bgp {
            slot_order.swap(0, 1);
            available.swap(0, 1);
        }

        for pos in 0..2 {
            if !available[pos] {
                continue;
            }
            let child_idx = slot_order[pos];
            let child = get_child_mut(elem, child_idx, &current_prefix, classifier).unwrap();
            match get_new_parameters_with_mode(child, &current_prefix, mode, config, classifier) {
                Some((result_prefix, prefix_is_announced)) => {
                    elem.set_child_scanned(prefix_is_announced);
                    return Some((result_prefix, prefix_is_announced || elem.is_bgp_prefix()));
                }
                None => finish_child_element(elem, child_idx),
            }
        }
    }

    if elem.is_bgp_prefix() && !elem.was_scanned() {
        elem.set_scanned();
        return Some((current_prefix, true));
    }
    None
}

/// Wraps [`get_new_parameters_with_mode`] for the trie root: pads the
/// returned bit-field to the full address and masks it so the emitted ECS
/// address conforms to RFC 7871.
pub fn calculate_next_parameters(root: &mut Elem, config: &ScanConfig, classifier: &PrefixClassifier) -> Option<(IpAddr, u8)> {
    let (bits, _is_announced) = get_new_parameters_with_mode(root, &[], ScanMode::Sample, config, classifier)?;
    let source_len = bits.len() as u8;
    let ip = ip_of(&bits, config.is_v6);
    Some((mask(ip, source_len, config.is_v6), source_len))
}

fn mark_as_in_response(elem: &mut Elem, config: &ScanConfig) -> bool {
    match elem {
        Elem::Leaf(_) => true,
        Elem::Root(_) => false,
        Elem::Node(n) => {
            n.counter_returned_as_scope += 1;
            n.counter_returned_as_scope >= config.scan_results_to_finish as u32
        }
    }
}

fn handle_response(elem: &mut Elem, shortened: &[u8], depth: usize, config: &ScanConfig, classifier: &PrefixClassifier) -> bool {
    if shortened.len() == depth {
        return mark_as_in_response(elem, config);
    }
    let prefix_upto_here = &shortened[..depth];
    match get_child_mut(elem, shortened[depth], prefix_upto_here, classifier) {
        None => false,
        Some(child) => {
            let child_finished = handle_response(child, shortened, depth + 1, config, classifier);
            if child_finished {
                scanning_mode(elem, prefix_upto_here, config, classifier) == ScanMode::Finished
            } else {
                false
            }
        }
    }
}

/// §4.3.4: feed a completed probe's effective-scope bits back into the
/// trie. Returns true once the domain is fully done: either a non-root node
/// propagated its own completion up through the root's scanning mode, or
/// (for an empty/`scope == 0` observation) the scope-zero cap was exceeded.
pub fn root_handle_response(root: &mut Elem, shortened_client_ip: &[u8], config: &ScanConfig, classifier: &PrefixClassifier) -> bool {
    if !shortened_client_ip.is_empty() {
        handle_response(root, shortened_client_ip, 0, config, classifier)
    } else {
        match root {
            Elem::Root(r) => {
                r.scope_zero_observed += 1;
                config.max_num_scope_zeros > 0 && r.scope_zero_observed > config.max_num_scope_zeros
            }
            _ => unreachable!("root_handle_response called on a non-root element"),
        }
    }
}

/// Compute the effective scope bits for a response: `min(source, scope)`
/// leading bits of the client address that was requested.
pub fn effective_scope_bits(request_ip: IpAddr, source_prefix_len: u8, response_scope_len: u8, is_v6: bool) -> Vec<u8> {
    let effective = source_prefix_len.min(response_scope_len) as usize;
    bits_of(request_ip, is_v6)[..effective].to_vec()
}

/// Aggregate shape of a finished domain's trie, for `-pr`'s per-domain
/// result printout: total node count, total probes issued, and total
/// response-satisfied nodes, walked once over the whole tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrieSummary {
    pub nodes: u32,
    pub leaves: u32,
    pub total_scans: u32,
    pub response_satisfied_nodes: u32,
}

pub fn summarize(elem: &Elem) -> TrieSummary {
    let mut summary = TrieSummary::default();
    accumulate_summary(elem, &mut summary);
    summary
}

fn accumulate_summary(elem: &Elem, summary: &mut TrieSummary) {
    match elem {
        Elem::Root(root) => {
            for child in root.children.iter().flatten() {
                accumulate_summary(child, summary);
            }
        }
        Elem::Node(n) => {
            summary.nodes += 1;
            summary.total_scans += n.node_scans;
            if n.counter_returned_as_scope > 0 {
                summary.response_satisfied_nodes += 1;
            }
            for child in n.children.iter().flatten() {
                accumulate_summary(child, summary);
            }
        }
        Elem::Leaf(l) => {
            summary.leaves += 1;
            summary.total_scans += l.leaf_scanned;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DepthLimits, ScanLimits};
    use ipnetwork::IpNetwork;
    use std::str::FromStr;

    fn empty_config(prefix_len: u8, randomize_depth: usize) -> ScanConfig {
        ScanConfig {
            is_v6: false,
            limits: ScanLimits::build(&DepthLimits::default()),
            max_special_prefix_scans: 0,
            total_notrouted_limit: u32::MAX,
            prefix_length_to_scan_with: prefix_len,
            scan_results_to_finish: u8::MAX,
            randomize_depth,
            max_num_scope_zeros: 0,
            scan_all_bgp: false,
            maximum_temp_errors: 3,
        }
    }

    fn empty_classifier() -> PrefixClassifier {
        PrefixClassifier::new(&[], &[], false)
    }

    #[test]
    fn sample_traversal_picks_bit_zero_first_to_depth_24() {
        let mut root = Elem::new_root();
        let config = empty_config(24, 32);
        let classifier = empty_classifier();

        let (bits, is_bgp) = get_new_parameters_with_mode(&mut root, &[], ScanMode::Sample, &config, &classifier).unwrap();
        assert_eq!(bits.len(), 24);
        assert!(bits.iter().all(|&b| b == 0));
        assert!(!is_bgp);

        let ip = ip_of(&bits, false);
        assert_eq!(ip, "0.0.0.0".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn second_probe_advances_past_first_scanned_leaf() {
        let mut root = Elem::new_root();
        let config = empty_config(2, 32);
        let classifier = empty_classifier();

        let (first, _) = get_new_parameters_with_mode(&mut root, &[], ScanMode::Sample, &config, &classifier).unwrap();
        assert_eq!(first, vec![0, 0]);
        let (second, _) = get_new_parameters_with_mode(&mut root, &[], ScanMode::Sample, &config, &classifier).unwrap();
        assert_eq!(second, vec![0, 1]);
        let (third, _) = get_new_parameters_with_mode(&mut root, &[], ScanMode::Sample, &config, &classifier).unwrap();
        assert_eq!(third, vec![1, 0]);
    }

    #[test]
    fn total_limit_prunes_subtree_after_threshold() {
        let mut limits_map = DepthLimits::default();
        limits_map.total.insert(8, 1);
        let mut config = empty_config(24, 32);
        config.limits = ScanLimits::build(&limits_map);

        let classifier = empty_classifier();
        let mut root = Elem::new_root();

        // Drive one full scan (depth 24) under 10.0.0.0/8 so the depth-8
        // ancestor's total counter reaches its cap of 1.
        let target: Vec<u8> = bits_of("10.0.0.0".parse().unwrap(), false)[..24].to_vec();
        // Force descent toward that exact prefix by repeatedly asking and
        // discarding results until we land on it (deterministic since bit0
        // is visited first and 10.0.0.0/24 is the all-zero-after-the-8th
        // path only when preceded by 00001010).
        let mut found = false;
        for _ in 0..300 {
            let before = matches!(&root, Elem::Root(r) if r.children[0].is_some());
            let _ = before;
            if let Some((bits, _)) = get_new_parameters_with_mode(&mut root, &[], ScanMode::Sample, &config, &classifier) {
                if bits == target {
                    found = true;
                    break;
                }
            } else {
                break;
            }
        }
        assert!(found, "expected to eventually scan 10.0.0.0/24");

        // Feed a response with scope 24 so the depth-8 ancestor's counters
        // are consistent with one completed scan under it.
        let effective = effective_scope_bits("10.0.0.0".parse().unwrap(), 24, 24, false);
        let _ = root_handle_response(&mut root, &effective, &config, &classifier);

        // The depth-8 ancestor is now at its total limit; no further probe
        // should be emitted anywhere under 10.0.0.0/8 without a pending BGP
        // subprefix (there is none, since the BGP table is empty).
        for _ in 0..5000 {
            match get_new_parameters_with_mode(&mut root, &[], ScanMode::Sample, &config, &classifier) {
                Some((bits, _)) => {
                    let under_10_8 = bits.len() >= 8 && bits[..8] == bits_of("10.0.0.0".parse().unwrap(), false)[..8];
                    assert!(!under_10_8, "expected no further scans under 10.0.0.0/8");
                }
                None => break,
            }
        }
    }

    #[test]
    fn response_consolidation_finishes_node_after_threshold() {
        let mut config = empty_config(8, 32);
        config.scan_results_to_finish = 2;
        let classifier = empty_classifier();
        let mut root = Elem::new_root();

        let (bits, _) = get_new_parameters_with_mode(&mut root, &[], ScanMode::Sample, &config, &classifier).unwrap();
        assert_eq!(bits, vec![0, 0, 0, 0, 0, 0, 0, 0]);

        let ip = ip_of(&bits, false);
        let effective = effective_scope_bits(ip, 8, 8, false);
        assert!(!root_handle_response(&mut root, &effective, &config, &classifier));
        assert!(!root_handle_response(&mut root, &effective, &config, &classifier));

        // After two NO_ERR responses at this exact scope, the node is
        // response-satisfied; a fresh planning pass must skip straight past
        // it to the sibling prefix rather than revisiting 0.0.0.0/8.
        let (next, _) = get_new_parameters_with_mode(&mut root, &[], ScanMode::Sample, &config, &classifier).unwrap();
        assert_ne!(&next[..8.min(next.len())], &bits[..]);
    }

    #[test]
    fn scope_zero_counter_increments_and_caps() {
        let mut config = empty_config(24, 32);
        config.max_num_scope_zeros = 1;
        let classifier = empty_classifier();
        let mut root = Elem::new_root();

        assert!(!root_handle_response(&mut root, &[], &config, &classifier));
        match &root {
            Elem::Root(r) => assert_eq!(r.scope_zero_observed, 1),
            _ => unreachable!(),
        }
        assert!(root_handle_response(&mut root, &[], &config, &classifier));
    }

    #[test]
    fn node_classification_inherits_special_from_parent() {
        let special = vec![IpNetwork::from_str("192.0.2.0/24").unwrap()];
        let classifier = PrefixClassifier::new(&[], &special, false);
        let parent = make_new_node(&[], 1, PrefixKind::Unannounced, false, &classifier);
        // This just checks the helper compiles end-to-end for a non-special
        // parent; the actual special classification is exercised through
        // classify::tests.
        assert_eq!(parent.kind, PrefixKind::Unannounced);
    }

    #[test]
    fn summarize_counts_nodes_and_scans_across_the_tree() {
        let mut root = Elem::new_root();
        let config = empty_config(2, 32);
        let classifier = empty_classifier();

        // Drive two probes to depth 2, populating a handful of nodes.
        let _ = get_new_parameters_with_mode(&mut root, &[], ScanMode::Sample, &config, &classifier).unwrap();
        let _ = get_new_parameters_with_mode(&mut root, &[], ScanMode::Sample, &config, &classifier).unwrap();

        let summary = summarize(&root);
        assert_eq!(summary.total_scans, 2);
        assert!(summary.nodes >= 2, "expected at least the two depth-1 ancestor nodes");
    }
}
