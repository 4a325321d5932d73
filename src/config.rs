//! Scan-limit configuration: the YAML file loaded by `-config-file` and the
//! frozen, process-wide [`ScanConfig`] derived from it plus the relevant CLI
//! flags. Published once at startup and handed out by shared reference -
//! nothing in this crate mutates a `ScanConfig` after the controller starts.

use std::collections::HashMap;

use serde::Deserialize;

use crate::addr::address_width;
use crate::error::EcsplorerResult;

#[derive(Debug, Deserialize, Default)]
pub struct DepthLimits {
    #[serde(default)]
    pub bgprouted: HashMap<u8, u32>,
    #[serde(default)]
    pub notrouted: HashMap<u8, u32>,
    #[serde(default)]
    pub total: HashMap<u8, u32>,
}

/// Raw shape of the YAML config file, matching the key names in `spec.md` §6.
#[derive(Debug, Deserialize)]
pub struct ScanLimitsFile {
    #[serde(rename = "ipv4Limits", default)]
    pub ipv4_limits: Option<DepthLimits>,
    #[serde(rename = "ipv6Limits", default)]
    pub ipv6_limits: Option<DepthLimits>,
    #[serde(rename = "maxSpecialPrefixScans")]
    pub max_special_prefix_scans: u32,
    #[serde(rename = "scanResultsToFinish")]
    pub scan_results_to_finish: u8,
    #[serde(rename = "totalNotroutedLimit")]
    pub total_notrouted_limit: u32,
}

impl ScanLimitsFile {
    pub fn from_yaml(contents: &str) -> EcsplorerResult<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }
}

/// One of `limits[BGPANNOUNCED]`, `limits[UNANNOUNCED]`, `limits[TOTAL]`:
/// a dense array indexed by prefix length, zero meaning "no limit".
#[derive(Debug, Clone)]
pub struct DepthLimitTable(Vec<u32>);

impl DepthLimitTable {
    fn build(map: &HashMap<u8, u32>, width: usize) -> Self {
        let mut table = vec![0u32; width + 1];
        for (&depth, &cap) in map {
            if (depth as usize) < table.len() {
                table[depth as usize] = cap;
            }
        }
        DepthLimitTable(table)
    }

    pub fn at(&self, depth: usize) -> u32 {
        self.0.get(depth).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct ScanLimits {
    pub bgp_announced: DepthLimitTable,
    pub unannounced: DepthLimitTable,
    pub total: DepthLimitTable,
}

impl ScanLimits {
    /// `spec.md` allocates depth tables to 128 entries for both families so
    /// one code path serves IPv4 and IPv6 alike; the IPv4 tail is simply
    /// never indexed.
    pub fn build(limits: &DepthLimits) -> Self {
        let width = address_width(true);
        ScanLimits {
            bgp_announced: DepthLimitTable::build(&limits.bgprouted, width),
            unannounced: DepthLimitTable::build(&limits.notrouted, width),
            total: DepthLimitTable::build(&limits.total, width),
        }
    }

    pub fn no_limits_at(&self, depth: usize) -> bool {
        self.bgp_announced.at(depth) == 0 && self.unannounced.at(depth) == 0 && self.total.at(depth) == 0
    }
}

/// Process-wide immutable scan configuration, assembled from the YAML file
/// and the relevant CLI flags once at startup.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub is_v6: bool,
    pub limits: ScanLimits,
    pub max_special_prefix_scans: u32,
    pub total_notrouted_limit: u32,
    pub prefix_length_to_scan_with: u8,
    pub scan_results_to_finish: u8,
    pub randomize_depth: usize,
    pub max_num_scope_zeros: u32,
    pub scan_all_bgp: bool,
    pub maximum_temp_errors: u32,
}

impl ScanConfig {
    pub fn from_file(
        file: &ScanLimitsFile,
        is_v6: bool,
        prefix_length_to_scan_with: u8,
        randomize_depth: usize,
        max_num_scope_zeros: u32,
        scan_all_bgp: bool,
        maximum_temp_errors: u32,
    ) -> EcsplorerResult<Self> {
        if prefix_length_to_scan_with == 0 {
            return Err(crate::error::EcsplorerError::Other(
                "prefixLengthToScanWith cannot be 0".to_string(),
            ));
        }
        let depth_limits = if is_v6 {
            file.ipv6_limits.as_ref()
        } else {
            file.ipv4_limits.as_ref()
        }
        .cloned_or_default();

        Ok(ScanConfig {
            is_v6,
            limits: ScanLimits::build(&depth_limits),
            max_special_prefix_scans: file.max_special_prefix_scans,
            total_notrouted_limit: file.total_notrouted_limit,
            prefix_length_to_scan_with,
            scan_results_to_finish: file.scan_results_to_finish,
            randomize_depth,
            max_num_scope_zeros,
            scan_all_bgp,
            maximum_temp_errors,
        })
    }
}

trait OptionDepthLimitsExt {
    fn cloned_or_default(self) -> DepthLimits;
}

impl OptionDepthLimitsExt for Option<&DepthLimits> {
    fn cloned_or_default(self) -> DepthLimits {
        match self {
            Some(limits) => DepthLimits {
                bgprouted: limits.bgprouted.clone(),
                notrouted: limits.notrouted.clone(),
                total: limits.total.clone(),
            },
            None => DepthLimits::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_yaml() {
        let yaml = r#"
ipv4Limits:
  bgprouted:
    8: 100
  notrouted:
    8: 10
  total:
    24: 1
maxSpecialPrefixScans: 5
scanResultsToFinish: 2
totalNotroutedLimit: 1000
"#;
        let file = ScanLimitsFile::from_yaml(yaml).unwrap();
        let config = ScanConfig::from_file(&file, false, 24, 32, 10000, false, 3).unwrap();
        assert_eq!(config.limits.bgp_announced.at(8), 100);
        assert_eq!(config.limits.total.at(24), 1);
        assert_eq!(config.limits.total.at(25), 0);
        assert!(config.limits.no_limits_at(16));
    }

    #[test]
    fn rejects_zero_prefix_length() {
        let yaml = r#"
maxSpecialPrefixScans: 0
scanResultsToFinish: 1
totalNotroutedLimit: 0
"#;
        let file = ScanLimitsFile::from_yaml(yaml).unwrap();
        assert!(ScanConfig::from_file(&file, false, 0, 32, 0, false, 3).is_err());
    }
}
