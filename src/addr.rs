//! Address codec: conversions between IP addresses, bit-fields and the
//! numeric subnet keys the prefix classifier and trie index on.
//!
//! A bit-field is a left-to-right ordered sequence of 0/1 values; the first
//! *k* entries represent a prefix of length *k*. This mirrors
//! `convertIPFromNetIPToField` / `convertIPFromFieldToNetIP` in the original
//! Go implementation (`examples/original_source/src/convert.go`) rather than
//! a packed bitset: the original never holds more than one address width's
//! worth of bits at a time, so there is nothing to gain from packing.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub type BitField = Vec<u8>;

/// Number of bits in an address of the given family.
pub fn address_width(is_v6: bool) -> usize {
    if is_v6 {
        128
    } else {
        32
    }
}

/// Expand an IP address into its full-width bit-field.
pub fn bits_of(ip: IpAddr, is_v6: bool) -> BitField {
    let bytes = address_bytes(ip, is_v6);
    let mut bits = Vec::with_capacity(bytes.len() * 8);
    for byte in bytes {
        for shift in (0..8).rev() {
            bits.push((byte >> shift) & 1);
        }
    }
    bits
}

/// Rebuild an IP address from a (possibly short) bit-field, padding any
/// missing trailing bits with zero.
pub fn ip_of(bits: &[u8], is_v6: bool) -> IpAddr {
    let width = address_width(is_v6);
    let mut full = bits.to_vec();
    full.resize(width, 0);

    let num_bytes = width / 8;
    let mut bytes = vec![0u8; num_bytes];
    for (i, byte) in bytes.iter_mut().enumerate() {
        let mut v: u8 = 0;
        for bit in 0..8 {
            if full[i * 8 + bit] == 1 {
                v |= 1 << (7 - bit);
            }
        }
        *byte = v;
    }

    if is_v6 {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&bytes);
        IpAddr::V6(Ipv6Addr::from(octets))
    } else {
        let mut octets = [0u8; 4];
        octets.copy_from_slice(&bytes);
        IpAddr::V4(Ipv4Addr::from(octets))
    }
}

/// Big-endian numeric key for a prefix, zero-padded to the key width. For
/// IPv6, only the first 64 bits participate (the original's `int64` trick in
/// `convertIPFromShortFieldToKeyInt`): it is the key used to index BGP and
/// special-use prefix tables, and no real-world aggregate announces a /64
/// or shorter split across the low 64 bits.
pub fn subnet_key(bits: &[u8], is_v6: bool) -> u64 {
    build_key(bits, is_v6, 0)
}

/// Same as [`subnet_key`], but padded with ones instead of zeros; together
/// `(subnet_key, subnet_upper_key)` span the numeric range of every address
/// inside the prefix.
pub fn subnet_upper_key(bits: &[u8], is_v6: bool) -> u64 {
    build_key(bits, is_v6, 1)
}

fn key_width_bits(is_v6: bool) -> usize {
    if is_v6 {
        64
    } else {
        32
    }
}

fn build_key(bits: &[u8], is_v6: bool, pad_bit: u8) -> u64 {
    let key_bits = key_width_bits(is_v6);
    let mut key: u64 = 0;
    for &bit in bits.iter().take(key_bits) {
        key = (key << 1) | (bit as u64);
    }
    let consumed = bits.len().min(key_bits);
    for _ in consumed..key_bits {
        key = (key << 1) | (pad_bit as u64);
    }
    key
}

/// Zero the trailing bits of `ip` beyond `prefix_len` so the serialized ECS
/// address conforms to RFC 7871.
pub fn mask(ip: IpAddr, prefix_len: u8, is_v6: bool) -> IpAddr {
    let bits = bits_of(ip, is_v6);
    let truncated = &bits[..prefix_len as usize];
    ip_of(truncated, is_v6)
}

fn address_bytes(ip: IpAddr, is_v6: bool) -> Vec<u8> {
    match ip {
        IpAddr::V4(v4) if !is_v6 => v4.octets().to_vec(),
        IpAddr::V6(v6) if is_v6 => v6.octets().to_vec(),
        // An address of the "wrong" family for the scan mode is never
        // produced by this crate's own callers; fall back to its natural
        // width rather than panicking on external input.
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_v4() {
        let ip: IpAddr = "203.0.113.77".parse().unwrap();
        let bits = bits_of(ip, false);
        assert_eq!(bits.len(), 32);
        for len in 0..=32usize {
            let prefix = &bits[..len];
            let rebuilt_bits = bits_of(ip_of(prefix, false), false);
            let mut expected = prefix.to_vec();
            expected.resize(32, 0);
            assert_eq!(rebuilt_bits, expected, "prefix len {len}");
        }
    }

    #[test]
    fn round_trip_v6() {
        let ip: IpAddr = "2001:db8::1".parse().unwrap();
        let bits = bits_of(ip, true);
        assert_eq!(bits.len(), 128);
        for len in [0, 1, 32, 64, 96, 127, 128] {
            let prefix = &bits[..len];
            let rebuilt_bits = bits_of(ip_of(prefix, true), true);
            let mut expected = prefix.to_vec();
            expected.resize(128, 0);
            assert_eq!(rebuilt_bits, expected, "prefix len {len}");
        }
    }

    #[test]
    fn mask_preserves_prefix_and_zeros_tail() {
        let ip: IpAddr = "10.20.30.40".parse().unwrap();
        let masked = mask(ip, 12, false);
        assert_eq!(masked, "10.16.0.0".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn subnet_key_ordering_spans_range() {
        let bits = bits_of("192.0.2.0".parse().unwrap(), false);
        let prefix = &bits[..24];
        let lo = subnet_key(prefix, false);
        let hi = subnet_upper_key(prefix, false);
        assert!(lo <= hi);
        assert_eq!(hi - lo, 255);
    }

    #[test]
    fn subnet_key_v6_uses_first_64_bits() {
        let bits = bits_of("2001:db8::".parse().unwrap(), true);
        let key_48 = subnet_key(&bits[..48], true);
        let key_64 = subnet_key(&bits[..64], true);
        assert_eq!(key_48, key_64);
    }
}
