use std::{
    env,
    net::{SocketAddr, ToSocketAddrs},
    str::FromStr,
};

use crate::{CollectiveErr, Result};

pub const RANK_VAR: &str = "RANK";
pub const WORLD_SIZE_VAR: &str = "WORLD_SIZE";
pub const LOCAL_RANK_VAR: &str = "LOCAL_RANK";
pub const PEERS_VAR: &str = "PEERS";

/// Where this process sits in the training job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldConfig {
    pub rank: usize,
    pub size: usize,
    pub local_rank: usize,
    /// The listening address of every rank, indexed by rank.
    pub peers: Vec<SocketAddr>,
}

impl WorldConfig {
    /// A world with a single participant, no networking involved.
    pub fn solo() -> Self {
        Self {
            rank: 0,
            size: 1,
            local_rank: 0,
            peers: Vec::new(),
        }
    }

    /// Reads the world from the `RANK`, `WORLD_SIZE`, `LOCAL_RANK` and `PEERS` environment
    /// variables. When none are set the world has a single rank.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Same as `from_env` but resolving variables with `lookup`.
    ///
    /// # Arguments
    /// * `lookup` - Returns the value of a variable, if set.
    ///
    /// # Returns
    /// The parsed world or a `CollectiveErr::Config` describing the first invalid variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rank = parse_var(&lookup, RANK_VAR)?.unwrap_or(0);
        let size = parse_var(&lookup, WORLD_SIZE_VAR)?.unwrap_or(1);
        let local_rank = parse_var(&lookup, LOCAL_RANK_VAR)?.unwrap_or(rank);

        let peers = match lookup(PEERS_VAR) {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(resolve_peer)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let config = Self {
            rank,
            size,
            local_rank,
            peers,
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants between rank, size and peers.
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(CollectiveErr::Config("world size must be at least 1".into()));
        }

        if self.rank >= self.size {
            return Err(CollectiveErr::Config(format!(
                "rank {} is out of range for a world of size {}",
                self.rank, self.size
            )));
        }

        if self.size > 1 && self.peers.len() != self.size {
            return Err(CollectiveErr::Config(format!(
                "{PEERS_VAR} lists {} addresses but the world has {} ranks",
                self.peers.len(),
                self.size
            )));
        }

        Ok(())
    }

    /// The rank this process receives from.
    pub fn left(&self) -> usize {
        (self.rank + self.size - 1) % self.size
    }

    /// The rank this process sends to.
    pub fn right(&self) -> usize {
        (self.rank + 1) % self.size
    }
}

/// Turns a `host:port` entry into an address, looking the host up when it is not an IP literal.
/// IPv6 literals must be bracketed, as in `[::1]:29500`.
fn resolve_peer(entry: &str) -> Result<SocketAddr> {
    if let Ok(addr) = entry.parse() {
        return Ok(addr);
    }

    let invalid = |detail: String| {
        CollectiveErr::Config(format!("invalid peer address {entry:?}: {detail}"))
    };

    // Every rank resolves the same list, so taking the first answer keeps them consistent.
    entry
        .to_socket_addrs()
        .map_err(|e| invalid(e.to_string()))?
        .next()
        .ok_or_else(|| invalid("the host has no address".into()))
}

fn parse_var<F, T>(lookup: &F, var: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };

    raw.trim()
        .parse()
        .map(Some)
        .map_err(|e| CollectiveErr::Config(format!("invalid {var}={raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        move |var| vars.get(var).cloned()
    }

    #[test]
    fn empty_environment_is_a_single_rank() {
        let config = WorldConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, WorldConfig::solo());
    }

    #[test]
    fn full_environment_is_parsed() {
        let config = WorldConfig::from_lookup(lookup(&[
            (RANK_VAR, "2"),
            (WORLD_SIZE_VAR, "3"),
            (LOCAL_RANK_VAR, "0"),
            (PEERS_VAR, "127.0.0.1:9000, 127.0.0.1:9001,127.0.0.1:9002"),
        ]))
        .unwrap();

        assert_eq!(config.rank, 2);
        assert_eq!(config.size, 3);
        assert_eq!(config.local_rank, 0);
        assert_eq!(config.peers[1], "127.0.0.1:9001".parse().unwrap());
        assert_eq!(config.left(), 1);
        assert_eq!(config.right(), 0);
    }

    #[test]
    fn local_rank_defaults_to_rank() {
        let config = WorldConfig::from_lookup(lookup(&[
            (RANK_VAR, "1"),
            (WORLD_SIZE_VAR, "2"),
            (PEERS_VAR, "127.0.0.1:9000,127.0.0.1:9001"),
        ]))
        .unwrap();

        assert_eq!(config.local_rank, 1);
    }

    #[test]
    fn rank_out_of_range_is_rejected() {
        let err = WorldConfig::from_lookup(lookup(&[(RANK_VAR, "1")])).unwrap_err();
        assert!(matches!(err, CollectiveErr::Config(_)));
    }

    #[test]
    fn missing_peers_are_rejected() {
        let err = WorldConfig::from_lookup(lookup(&[
            (RANK_VAR, "0"),
            (WORLD_SIZE_VAR, "2"),
            (PEERS_VAR, "127.0.0.1:9000"),
        ]))
        .unwrap_err();

        assert!(matches!(err, CollectiveErr::Config(_)));
    }

    #[test]
    fn garbage_is_rejected() {
        let err = WorldConfig::from_lookup(lookup(&[(WORLD_SIZE_VAR, "two")])).unwrap_err();
        assert!(matches!(err, CollectiveErr::Config(_)));
    }

    #[test]
    fn hostnames_are_resolved() {
        let config = WorldConfig::from_lookup(lookup(&[
            (RANK_VAR, "0"),
            (WORLD_SIZE_VAR, "2"),
            (PEERS_VAR, "localhost:29500,localhost:29501"),
        ]))
        .unwrap();

        assert!(config.peers.iter().all(|peer| peer.ip().is_loopback()));
        assert_eq!(config.peers[0].port(), 29500);
        assert_eq!(config.peers[1].port(), 29501);
    }

    #[test]
    fn bracketed_ipv6_is_parsed() {
        let config = WorldConfig::from_lookup(lookup(&[
            (RANK_VAR, "1"),
            (WORLD_SIZE_VAR, "2"),
            (PEERS_VAR, "[::1]:29500,[::1]:29501"),
        ]))
        .unwrap();

        assert_eq!(config.peers[1], "[::1]:29501".parse().unwrap());
    }

    #[test]
    fn entry_without_port_is_rejected() {
        let err = WorldConfig::from_lookup(lookup(&[
            (RANK_VAR, "0"),
            (WORLD_SIZE_VAR, "2"),
            (PEERS_VAR, "localhost,localhost:29501"),
        ]))
        .unwrap_err();

        assert!(matches!(err, CollectiveErr::Config(_)));
    }
}
