//! FQDN normalization and the small pieces of address math the sweeps need.

use ipnet::{IpNet, Ipv4Net};
use rand::Rng;
use std::net::IpAddr;

const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Lower-case a candidate FQDN and strip the trailing dot, returning `None`
/// when the result is not a valid name.
pub fn normalize_fqdn(name: &str) -> Option<String> {
    let name = name.trim().trim_end_matches('.').to_lowercase();
    if is_valid_fqdn(&name) { Some(name) } else { None }
}

/// Validity per the usual host-name rules, with leading underscores allowed
/// so service labels (`_ldap._tcp`) and verification records pass.
pub fn is_valid_fqdn(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }
    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    })
}

/// Case-insensitive label-boundary suffix match. `example.com` is considered
/// a subdomain of itself.
pub fn is_subdomain(name: &str, domain: &str) -> bool {
    let name = name.trim_end_matches('.').to_lowercase();
    let domain = domain.trim_end_matches('.').to_lowercase();
    if domain.is_empty() {
        return false;
    }
    name == domain || name.ends_with(&format!(".{domain}"))
}

/// The subdomain a FQDN counts toward: the name with its leftmost label
/// removed. Only proper subdomains qualify; a host directly under the root
/// counts toward nothing.
pub fn parent_subdomain(name: &str, domain: &str) -> Option<String> {
    if !is_subdomain(name, domain) {
        return None;
    }
    let name = name.to_lowercase();
    let domain = domain.to_lowercase();
    if name == domain {
        return None;
    }
    let parent = name.split_once('.').map(|(_, rest)| rest.to_string())?;
    if parent != domain && is_subdomain(&parent, &domain) {
        Some(parent)
    } else {
        None
    }
}

/// Random label used for wildcard probing; always starts with a letter.
pub fn random_label() -> String {
    const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
    const ALNUM: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let mut label = String::with_capacity(15);
    label.push(LETTERS[rng.gen_range(0..LETTERS.len())] as char);
    for _ in 0..14 {
        label.push(ALNUM[rng.gen_range(0..ALNUM.len())] as char);
    }
    label
}

/// The network swept around a discovered address: the containing /24, or the
/// containing /23 when active techniques are enabled. IPv6 addresses are not
/// swept.
pub fn sweep_net(addr: IpAddr, active: bool) -> Option<IpNet> {
    match addr {
        IpAddr::V4(v4) => {
            let prefix = if active { 23 } else { 24 };
            Ipv4Net::new(v4, prefix).ok().map(|n| IpNet::V4(n.trunc()))
        }
        IpAddr::V6(_) => None,
    }
}

/// Host addresses of a sweep network.
pub fn sweep_addrs(net: &IpNet) -> Vec<IpAddr> {
    match net {
        IpNet::V4(v4) => v4.hosts().map(IpAddr::V4).collect(),
        IpNet::V6(_) => Vec::new(),
    }
}

/// The reverse-lookup name for an address (`4.3.2.1.in-addr.arpa`).
pub fn ptr_name(addr: IpAddr) -> String {
    match addr {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            format!("{}.{}.{}.{}.in-addr.arpa", o[3], o[2], o[1], o[0])
        }
        IpAddr::V6(v6) => {
            let mut nibbles = Vec::with_capacity(32);
            for byte in v6.octets().iter().rev() {
                nibbles.push(format!("{:x}", byte & 0x0f));
                nibbles.push(format!("{:x}", byte >> 4));
            }
            format!("{}.ip6.arpa", nibbles.join("."))
        }
    }
}
