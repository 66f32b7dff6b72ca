//! Resolution of a push intent from argument vectors and repository state.
//!
//! Mirrors the disambiguation a porcelain push performs: positionals name
//! the remote and refspec, an upstream of the form `remote/branch`
//! overrides the target, a `src:dst` refspec splits accordingly, and bare
//! names expand to `refs/heads/<name>`.

use crate::backend::VcsBackend;
use crate::error::EngineError;

/// A fully resolved push: what moves where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushIntent {
    pub remote: String,
    pub source_ref: String,
    pub target_ref: String,
    /// Branch component of the target, empty for non-branch refs.
    pub target_branch: String,
    /// Object id the source currently resolves to.
    pub new_oid: String,
    /// Remote-tracking tip of the target branch; empty when unknown.
    pub old_oid: String,
}

/// Resolve the intent of `push <git_args>` against the backend's view of
/// the repository.
pub fn resolve_push_intent(
    backend: &dyn VcsBackend,
    git_args: &[String],
) -> Result<PushIntent, EngineError> {
    let current_branch = backend
        .current_branch()
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty() && b != "HEAD")
        .ok_or(EngineError::DetachedHead)?;

    let upstream = backend.upstream().unwrap_or_default();
    let (upstream_remote, upstream_branch) = parse_upstream(&upstream);

    let positionals = extract_push_positionals(git_args);
    let mut remote = if upstream_remote.is_empty() {
        "origin".to_string()
    } else {
        upstream_remote
    };
    if let Some(first) = positionals.first() {
        remote = first.trim().to_string();
    }
    if remote.is_empty() {
        return Err(EngineError::NoRemote);
    }

    let refspec = positionals.get(1).map(|s| s.trim()).unwrap_or("");

    let mut source_spec = current_branch.clone();
    let mut target_spec = current_branch.clone();
    if !refspec.is_empty() {
        if let Some((src, dst)) = refspec.split_once(':') {
            let src = src.trim();
            let dst = dst.trim();
            source_spec = if src.is_empty() {
                current_branch.clone()
            } else {
                src.to_string()
            };
            target_spec = if dst.is_empty() {
                source_spec.clone()
            } else {
                dst.to_string()
            };
        } else {
            source_spec = refspec.to_string();
            target_spec = refspec.to_string();
        }
    } else if !upstream_branch.is_empty() {
        target_spec = upstream_branch;
    }

    let source_ref = normalize_source_ref(&source_spec, &current_branch);
    let (target_ref, target_branch) = normalize_target_ref(&target_spec, &current_branch);
    if target_ref.is_empty() {
        return Err(EngineError::UnresolvedTarget);
    }

    let new_oid = backend
        .rev_parse(&source_ref)
        .map(|oid| oid.trim().to_string())
        .filter(|oid| !oid.is_empty())
        .ok_or_else(|| EngineError::UnresolvedSource(source_ref.clone()))?;

    let old_oid = if target_branch.is_empty() {
        String::new()
    } else {
        backend
            .rev_parse(&format!("refs/remotes/{remote}/{target_branch}"))
            .map(|oid| oid.trim().to_string())
            .unwrap_or_default()
    };

    Ok(PushIntent {
        remote,
        source_ref,
        target_ref,
        target_branch,
        new_oid,
        old_oid,
    })
}

/// Split an upstream spec into `(remote, branch)`.
fn parse_upstream(upstream: &str) -> (String, String) {
    let upstream = upstream.trim();
    if upstream.is_empty() {
        return (String::new(), String::new());
    }

    if let Some(trimmed) = upstream.strip_prefix("refs/remotes/") {
        return match trimmed.split_once('/') {
            Some((remote, branch)) => (remote.to_string(), branch.to_string()),
            None => (trimmed.to_string(), String::new()),
        };
    }

    match upstream.split_once('/') {
        Some((remote, branch)) => (remote.to_string(), branch.to_string()),
        None => (String::new(), upstream.to_string()),
    }
}

fn normalize_source_ref(spec: &str, current_branch: &str) -> String {
    let spec = spec.trim();
    if spec.is_empty() || spec == "HEAD" {
        current_branch.to_string()
    } else {
        spec.to_string()
    }
}

/// Expand a target spec into `(full ref, branch name)`. Non-branch refs
/// yield an empty branch component.
fn normalize_target_ref(spec: &str, current_branch: &str) -> (String, String) {
    let mut spec = spec.trim();
    if spec.is_empty() || spec == "HEAD" {
        spec = current_branch;
    }
    if spec.is_empty() {
        return (String::new(), String::new());
    }
    if let Some(branch) = spec.strip_prefix("refs/heads/") {
        return (spec.to_string(), branch.to_string());
    }
    if spec.starts_with("refs/") {
        return (spec.to_string(), String::new());
    }
    if let Some(branch) = spec.strip_prefix("heads/") {
        return (format!("refs/heads/{branch}"), branch.to_string());
    }
    (format!("refs/heads/{spec}"), spec.to_string())
}

/// Pick the positional arguments out of a push argument vector, skipping
/// flags and the values of flags that take one.
fn extract_push_positionals(args: &[String]) -> Vec<String> {
    const LONG_WITH_VALUE: &[&str] = &[
        "--repo",
        "--receive-pack",
        "--exec",
        "--upload-pack",
        "--push-option",
    ];
    const SHORT_WITH_VALUE: &[&str] = &["-c", "-o"];

    let mut positionals = Vec::new();
    let mut expect_value = false;
    let mut iter = args.iter().enumerate();
    while let Some((i, arg)) = iter.next() {
        if expect_value {
            expect_value = false;
            continue;
        }
        if arg == "--" {
            positionals.extend(args[i + 1..].iter().cloned());
            break;
        }
        if let Some(rest) = arg.strip_prefix("--") {
            if !rest.contains('=') && LONG_WITH_VALUE.contains(&arg.as_str()) {
                expect_value = true;
            }
            continue;
        }
        if arg.starts_with('-') && arg != "-" {
            if SHORT_WITH_VALUE.contains(&arg.as_str()) {
                expect_value = true;
            }
            continue;
        }
        positionals.push(arg.clone());
    }
    positionals
}
