//! Persistent registry of gossip peer base URLs.

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::atomic::write_json_atomic;
use crate::error::StoreError;

#[derive(Debug, Default, Serialize, Deserialize)]
struct PeerFile {
    peers: Vec<String>,
}

/// Normalized, sorted, persistent set of peer base URLs.
pub struct PeerRegistry {
    path: PathBuf,
    peers: RwLock<Vec<String>>,
}

impl PeerRegistry {
    /// Open the registry at `path`. A missing file is an empty registry;
    /// a persisted entry that fails normalization is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let peers = match fs::read(&path) {
            Ok(data) => {
                let file: PeerFile = serde_json::from_slice(&data)?;
                let mut peers = Vec::with_capacity(file.peers.len());
                for raw in &file.peers {
                    let normalized = normalize_peer(raw)?;
                    if !peers.contains(&normalized) {
                        peers.push(normalized);
                    }
                }
                peers.sort();
                peers
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            peers: RwLock::new(peers),
        })
    }

    /// Add a peer. Duplicates are silently absorbed; returns the
    /// normalized form.
    pub fn add(&self, raw: &str) -> Result<String, StoreError> {
        let normalized = normalize_peer(raw)?;
        let mut peers = self.peers.write().expect("peer lock poisoned");
        if !peers.contains(&normalized) {
            peers.push(normalized.clone());
            peers.sort();
            write_json_atomic(&self.path, &PeerFile { peers: peers.clone() }, None)?;
        }
        Ok(normalized)
    }

    /// Remove a peer if present; returns the normalized form either way.
    pub fn remove(&self, raw: &str) -> Result<String, StoreError> {
        let normalized = normalize_peer(raw)?;
        let mut peers = self.peers.write().expect("peer lock poisoned");
        let before = peers.len();
        peers.retain(|p| p != &normalized);
        if peers.len() != before {
            write_json_atomic(&self.path, &PeerFile { peers: peers.clone() }, None)?;
        }
        Ok(normalized)
    }

    /// All configured peers, sorted.
    pub fn list(&self) -> Vec<String> {
        self.peers.read().expect("peer lock poisoned").clone()
    }
}

/// Normalize a peer address into a canonical base URL.
///
/// Rules: trim; prepend `http://` when no scheme is given; scheme must be
/// http or https; host is required; query and fragment are rejected; a
/// trailing slash (or bare `/` path) is stripped.
pub fn normalize_peer(raw: &str) -> Result<String, StoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StoreError::InvalidPeerUrl(
            "peer address cannot be empty".to_string(),
        ));
    }

    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    let url = Url::parse(&with_scheme).map_err(|e| StoreError::InvalidPeerUrl(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(StoreError::InvalidPeerUrl(
            "scheme must be http or https".to_string(),
        ));
    }
    let host = match url.host() {
        Some(Host::Ipv6(ip)) => format!("[{ip}]"),
        Some(host) => host.to_string(),
        None => {
            return Err(StoreError::InvalidPeerUrl("host is required".to_string()));
        }
    };
    if url.query().is_some() || url.fragment().is_some() {
        return Err(StoreError::InvalidPeerUrl(
            "query or fragment not allowed".to_string(),
        ));
    }

    let mut normalized = format!("{}://{host}", url.scheme());
    if let Some(port) = url.port() {
        let _ = write!(normalized, ":{port}");
    }
    let path = url.path().trim_end_matches('/');
    if !path.is_empty() {
        normalized.push_str(path);
    }
    Ok(normalized)
}
