//! Shared helpers for keel integration tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use keel_engine::{EngineError, VcsBackend};
use keel_store::Store;

/// Open (or reopen) a store rooted at `dir/<name>`, with its identity kept
/// under `dir/ids/<name>` so parallel tests never share key material.
pub fn open_node(dir: &Path, name: &str) -> Arc<Store> {
    Arc::new(
        Store::open_with_identity_root(dir.join(name), dir.join("ids").join(name))
            .expect("open store"),
    )
}

/// Serve a store's gossip API on an ephemeral port; returns the base URL.
pub async fn serve_node(store: Arc<Store>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, keel_sync::router(store)).await.ok();
    });
    format!("http://{addr}")
}

/// Scriptable VCS backend: fixed branch, adjustable rev map, recorded
/// pushes.
pub struct ScriptedVcs {
    branch: String,
    revs: Mutex<HashMap<String, String>>,
    pushes: Mutex<Vec<Vec<String>>>,
}

impl ScriptedVcs {
    pub fn new(branch: &str, head_oid: &str) -> Self {
        let mut revs = HashMap::new();
        revs.insert(branch.to_string(), head_oid.to_string());
        Self {
            branch: branch.to_string(),
            revs: Mutex::new(revs),
            pushes: Mutex::new(Vec::new()),
        }
    }

    pub fn set_rev(&self, rev: &str, oid: &str) {
        self.revs
            .lock()
            .unwrap()
            .insert(rev.to_string(), oid.to_string());
    }

    /// Argument vectors of every executed push, in order.
    pub fn pushes(&self) -> Vec<Vec<String>> {
        self.pushes.lock().unwrap().clone()
    }
}

impl VcsBackend for ScriptedVcs {
    fn current_branch(&self) -> Option<String> {
        Some(self.branch.clone())
    }

    fn upstream(&self) -> Option<String> {
        None
    }

    fn rev_parse(&self, rev: &str) -> Option<String> {
        self.revs.lock().unwrap().get(rev).cloned()
    }

    fn push(&self, args: &[String]) -> Result<(), EngineError> {
        self.pushes.lock().unwrap().push(args.to_vec());
        Ok(())
    }
}
