//! Address firewall.
//!
//! Entries are either a literal address or an IPv4 pattern where any octet may
//! be `*` (`10.0.*.*`). The list is kept in insertion order and persisted to
//! `firewall.cfg`, one entry per line; blank lines and `#` comments are ignored.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::str::FromStr;

use log::{info, warn};
use thiserror::Error;
use tokio::fs;

use crate::storage::{sync_parent, write_synced};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FirewallError {
    #[error("'{0}' is not an address or address pattern")]
    InvalidEntry(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirewallEntry {
    Address(IpAddr),
    /// Four octets, `None` for `*`.
    Pattern([Option<u8>; 4]),
}

impl FirewallEntry {
    pub fn matches(&self, ip: IpAddr) -> bool {
        match (self, ip) {
            (FirewallEntry::Address(addr), ip) => *addr == canonical(ip),
            (FirewallEntry::Pattern(octets), ip) => match canonical(ip) {
                IpAddr::V4(v4) => octets
                    .iter()
                    .zip(v4.octets())
                    .all(|(want, got)| want.map_or(true, |w| w == got)),
                IpAddr::V6(_) => false,
            },
        }
    }
}

/// IPv4-mapped IPv6 addresses are compared as IPv4.
fn canonical(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(ip, IpAddr::V4),
        v4 => v4,
    }
}

impl FromStr for FirewallEntry {
    type Err = FirewallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !s.contains('*') {
            return s
                .parse::<IpAddr>()
                .map(|ip| FirewallEntry::Address(canonical(ip)))
                .map_err(|_| FirewallError::InvalidEntry(s.to_string()));
        }
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 4 {
            return Err(FirewallError::InvalidEntry(s.to_string()));
        }
        let mut octets = [None; 4];
        for (slot, part) in octets.iter_mut().zip(&parts) {
            *slot = match *part {
                "*" => None,
                p => Some(
                    p.parse::<u8>()
                        .map_err(|_| FirewallError::InvalidEntry(s.to_string()))?,
                ),
            };
        }
        if octets.iter().all(Option::is_some) {
            let [a, b, c, d] = octets.map(|o| o.unwrap_or(0));
            return Ok(FirewallEntry::Address(IpAddr::V4(Ipv4Addr::new(a, b, c, d))));
        }
        Ok(FirewallEntry::Pattern(octets))
    }
}

impl fmt::Display for FirewallEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FirewallEntry::Address(ip) => write!(f, "{}", ip),
            FirewallEntry::Pattern(octets) => {
                for (i, octet) in octets.iter().enumerate() {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    match octet {
                        Some(o) => write!(f, "{}", o)?,
                        None => f.write_str("*")?,
                    }
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Firewall {
    entries: Vec<FirewallEntry>,
}

impl Firewall {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. Returns false if it was already listed.
    pub fn add(&mut self, entry: &str) -> Result<bool, FirewallError> {
        let entry: FirewallEntry = entry.parse()?;
        if self.entries.contains(&entry) {
            return Ok(false);
        }
        info!("firewall: added {}", entry);
        self.entries.push(entry);
        Ok(true)
    }

    pub fn remove(&mut self, entry: &str) -> Result<bool, FirewallError> {
        let entry: FirewallEntry = entry.parse()?;
        let before = self.entries.len();
        self.entries.retain(|e| *e != entry);
        let removed = self.entries.len() != before;
        if removed {
            info!("firewall: removed {}", entry);
        }
        Ok(removed)
    }

    /// True if `entry` is listed verbatim (not merely covered by a pattern).
    pub fn contains(&self, entry: &str) -> bool {
        entry
            .parse::<FirewallEntry>()
            .map(|e| self.entries.contains(&e))
            .unwrap_or(false)
    }

    /// Entries whose text contains `needle`.
    pub fn search(&self, needle: &str) -> Vec<&FirewallEntry> {
        self.entries
            .iter()
            .filter(|e| e.to_string().contains(needle))
            .collect()
    }

    pub fn is_blocked(&self, ip: IpAddr) -> bool {
        self.entries.iter().any(|e| e.matches(ip))
    }

    pub fn entries(&self) -> &[FirewallEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn parse(text: &str) -> Self {
        let mut firewall = Self::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.parse::<FirewallEntry>() {
                Ok(entry) if !firewall.entries.contains(&entry) => firewall.entries.push(entry),
                Ok(_) => {}
                Err(e) => warn!("firewall.cfg line {}: {}", line_no + 1, e),
            }
        }
        firewall
    }

    pub fn to_text(&self) -> String {
        self.entries.iter().map(|e| format!("{}\n", e)).collect()
    }

    /// Load from `path`; a missing file is an empty firewall.
    pub async fn load(path: &Path) -> std::io::Result<Self> {
        match fs::read_to_string(path).await {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e),
        }
    }

    pub async fn save(&self, path: &Path) -> std::io::Result<()> {
        let tmp = path.with_extension("cfg.tmp");
        write_synced(&tmp, self.to_text().as_bytes()).await?;
        fs::rename(&tmp, path).await?;
        sync_parent(path).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn patterns_match_by_octet() {
        let mut fw = Firewall::new();
        fw.add("10.0.*.*").unwrap();
        fw.add("192.168.1.20").unwrap();
        assert!(fw.is_blocked(ip("10.0.44.3")));
        assert!(!fw.is_blocked(ip("10.1.44.3")));
        assert!(fw.is_blocked(ip("192.168.1.20")));
        assert!(fw.is_blocked(ip("::ffff:192.168.1.20")));
        assert!(!fw.is_blocked(ip("192.168.1.21")));
    }

    #[test]
    fn add_is_idempotent_and_remove_reports() {
        let mut fw = Firewall::new();
        assert_eq!(fw.add("1.2.3.*"), Ok(true));
        assert_eq!(fw.add(" 1.2.3.* "), Ok(false));
        assert!(fw.contains("1.2.3.*"));
        assert!(!fw.contains("1.2.3.4"));
        assert_eq!(fw.remove("1.2.3.*"), Ok(true));
        assert_eq!(fw.remove("1.2.3.*"), Ok(false));
        assert!(fw.add("1.2.*").is_err());
        assert!(fw.add("1.2.3.300").is_err());
    }

    #[test]
    fn search_matches_substrings() {
        let mut fw = Firewall::new();
        fw.add("10.0.0.1").unwrap();
        fw.add("10.0.0.2").unwrap();
        fw.add("172.16.*.*").unwrap();
        assert_eq!(fw.search("10.0").len(), 2);
        assert_eq!(fw.search("*").len(), 1);
    }

    #[test]
    fn file_format_skips_comments_and_bad_lines() {
        let fw = Firewall::parse("# banned\n10.0.*.*\n\nnot-an-ip\n10.0.*.*\n8.8.8.8\n");
        assert_eq!(fw.len(), 2);
        assert_eq!(fw.to_text(), "10.0.*.*\n8.8.8.8\n");
    }

    #[tokio::test]
    async fn save_replaces_the_file_in_one_step() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("firewall.cfg");
        let mut fw = Firewall::new();
        fw.add("10.0.*.*").unwrap();
        fw.save(&path).await.unwrap();
        fw.add("8.8.8.8").unwrap();
        fw.save(&path).await.unwrap();

        assert!(!path.with_extension("cfg.tmp").exists());
        let loaded = Firewall::load(&path).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.is_blocked(ip("8.8.8.8")));
    }
}
