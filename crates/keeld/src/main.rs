//! `keeld` — the keel gossip daemon and its operator tooling.
//!
//! The daemon serves the gossip HTTP API, periodically syncs every
//! registered peer, and processes the pending-push queue. The remaining
//! subcommands are one-shot operator actions against the same store.

mod config;
mod daemon;
mod git;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{ArgAction, Parser, Subcommand};
use keel_consensus::{ConsensusEngine, ProposeRefInput};
use keel_engine::PushOrchestrator;
use keel_store::Store;
use keel_types::VoteDecision;
use tracing_subscriber::EnvFilter;

use config::CliConfig;
use daemon::DaemonConfig;
use git::GitCli;

#[derive(Parser)]
#[command(name = "keeld", version, about = "keel decentralized metadata daemon")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Repository root (default: discovered from the working directory).
    #[arg(short, long, global = true)]
    repo: Option<PathBuf>,

    /// Verbose logging (-v for debug, -vv for trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync daemon and gossip loop.
    Start {
        /// Listen address for the gossip HTTP API.
        #[arg(short, long)]
        listen: Option<String>,

        /// Seconds between gossip passes.
        #[arg(short, long)]
        interval: Option<u64>,

        /// Max operations per sync response.
        #[arg(long)]
        limit: Option<usize>,

        /// Max anti-entropy rounds per peer.
        #[arg(long)]
        rounds: Option<usize>,
    },

    /// Sync the op log with peers now, then process pending pushes.
    Sync {
        /// Sync only this peer URL instead of the whole registry.
        #[arg(long)]
        peer: Option<String>,

        /// Max operations per sync response.
        #[arg(long, default_value = "256")]
        limit: usize,

        /// Max anti-entropy rounds per peer.
        #[arg(long, default_value = "6")]
        rounds: usize,
    },

    /// Manage gossip peers.
    Peer {
        #[command(subcommand)]
        action: PeerCommands,
    },

    /// Show this node's identity.
    Identity,

    /// Inspect or append signed operations.
    Op {
        #[command(subcommand)]
        action: OpCommands,
    },

    /// Proposal / vote / certification workflow.
    Consensus {
        #[command(subcommand)]
        action: ConsensusCommands,
    },

    /// Inspect or drive the pending-push queue.
    Pending {
        #[command(subcommand)]
        action: PendingCommands,
    },
}

#[derive(Subcommand)]
enum PeerCommands {
    /// Add a gossip peer URL.
    Add { url: String },
    /// Remove a gossip peer URL.
    Remove { url: String },
    /// List configured peers.
    List,
}

#[derive(Subcommand)]
enum OpCommands {
    /// List recent operations.
    List {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Append a signed local operation.
    Append {
        /// Operation type tag.
        #[arg(long = "type")]
        op_type: String,
        /// Payload JSON document.
        #[arg(long, default_value = "{}")]
        data: String,
    },
}

#[derive(Subcommand)]
enum ConsensusCommands {
    /// Propose a ref update.
    Propose {
        /// Ref being proposed (default: current branch ref).
        #[arg(long = "ref")]
        ref_name: Option<String>,
        /// Current/old object id (default: the ref's current tip).
        #[arg(long)]
        old: Option<String>,
        /// Proposed new object id (default: HEAD).
        #[arg(long)]
        new: Option<String>,
        /// Membership epoch.
        #[arg(long, default_value = "0")]
        epoch: u64,
        /// Proposal TTL in seconds.
        #[arg(long, default_value = "86400")]
        ttl: u64,
        /// Explicit proposal id.
        #[arg(long)]
        id: Option<String>,
    },
    /// Vote on a proposal.
    Vote {
        #[arg(long)]
        proposal: String,
        /// Decision: "yes" or "no".
        #[arg(long)]
        decision: String,
    },
    /// Certify a proposal.
    Certify {
        #[arg(long)]
        proposal: String,
        /// Certify even without quorum (recorded as uncertified).
        #[arg(long)]
        force: bool,
    },
    /// Show a proposal's derived status.
    Status {
        #[arg(long)]
        proposal: String,
    },
    /// List known proposals, newest first.
    List {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum PendingCommands {
    /// Show the pending-push queue.
    List,
    /// Try to advance every pending push now.
    Process,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;
    init_tracing(cli.verbose, &config.log.level);

    let repo_root = resolve_repo_root(cli.repo.as_deref(), &config)?;
    let store = Arc::new(open_store(&repo_root, &config)?);
    let backend = Arc::new(GitCli::new(&repo_root));
    let orchestrator = Arc::new(PushOrchestrator::new(store.clone(), backend.clone()));

    match cli.command {
        Commands::Start {
            listen,
            interval,
            limit,
            rounds,
        } => {
            let daemon_config = DaemonConfig {
                listen_addr: listen.unwrap_or(config.daemon.listen_addr.clone()),
                gossip_interval: interval
                    .map(Duration::from_secs)
                    .unwrap_or(config.gossip_interval()),
                sync_limit: limit.unwrap_or(config.daemon.sync_limit),
                max_sync_rounds: rounds.unwrap_or(config.daemon.max_sync_rounds),
                http_timeout: config.http_timeout(),
            };
            let identity = store.public_identity();
            println!(
                "node={} listen={} interval={}s",
                identity.node_id,
                daemon_config.listen_addr,
                daemon_config.gossip_interval.as_secs()
            );
            daemon::run(store, orchestrator, daemon_config, daemon::shutdown_signal()).await
        }

        Commands::Sync {
            peer,
            limit,
            rounds,
        } => cmd_sync(&store, &orchestrator, peer, limit, rounds, config.http_timeout()).await,

        Commands::Peer { action } => cmd_peer(&store, action),
        Commands::Identity => {
            let identity = store.public_identity();
            println!("node_id={}", identity.node_id);
            println!("public_key={}", identity.public_key);
            Ok(())
        }
        Commands::Op { action } => cmd_op(&store, action),
        Commands::Consensus { action } => cmd_consensus(&store, &backend, action),
        Commands::Pending { action } => cmd_pending(&store, &orchestrator, action),
    }
}

fn init_tracing(verbosity: u8, config_level: &str) {
    let mut filter = EnvFilter::from_default_env();
    if std::env::var("RUST_LOG").is_err() {
        let level = match verbosity {
            0 => config_level,
            1 => "debug",
            _ => "trace",
        };
        if let Ok(directive) = level.parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn resolve_repo_root(flag: Option<&std::path::Path>, config: &CliConfig) -> anyhow::Result<PathBuf> {
    if let Some(root) = flag {
        return Ok(root.to_path_buf());
    }
    if let Some(root) = &config.node.repo_root {
        return Ok(root.clone());
    }
    let cwd = std::env::current_dir()?;
    Ok(GitCli::discover_root(&cwd).unwrap_or(cwd))
}

fn open_store(repo_root: &std::path::Path, config: &CliConfig) -> anyhow::Result<Store> {
    let store = match &config.node.identity_dir {
        Some(identity_dir) => Store::open_with_identity_root(repo_root, identity_dir)?,
        None => Store::open(repo_root)?,
    };
    Ok(store)
}

async fn cmd_sync(
    store: &Arc<Store>,
    orchestrator: &Arc<PushOrchestrator>,
    peer: Option<String>,
    limit: usize,
    rounds: usize,
    timeout: Duration,
) -> anyhow::Result<()> {
    let peers = match peer {
        Some(peer) => vec![peer],
        None => store.peers().list(),
    };
    if peers.is_empty() {
        bail!("no peers configured (use `keeld peer add <url>` or pass --peer)");
    }

    let mut first_error: Option<anyhow::Error> = None;
    for peer in peers {
        match keel_sync::sync_peer(store, &peer, limit, rounds, timeout).await {
            Ok(stats) => println!(
                "peer={} rounds={} sent={} pulled={} accepted={} rejected={} dropped={}",
                stats.peer,
                stats.rounds,
                stats.sent,
                stats.pulled,
                stats.accepted,
                stats.rejected,
                stats.dropped
            ),
            Err(e) => {
                eprintln!("peer={peer} sync failed: {e}");
                if first_error.is_none() {
                    first_error = Some(e.into());
                }
            }
        }
    }

    let report = orchestrator.process_pending(None);
    if report.checked > 0 {
        println!(
            "pending pushes: checked={} executed={} pending={} failed={}",
            report.checked, report.executed, report.pending, report.failed
        );
    }
    if let Some(e) = first_error {
        return Err(e);
    }
    if let Some(e) = report.first_error {
        return Err(e.into());
    }
    Ok(())
}

fn cmd_peer(store: &Arc<Store>, action: PeerCommands) -> anyhow::Result<()> {
    match action {
        PeerCommands::Add { url } => {
            let peer = store.peers().add(&url)?;
            println!("added peer {peer}");
        }
        PeerCommands::Remove { url } => {
            let peer = store.peers().remove(&url)?;
            println!("removed peer {peer}");
        }
        PeerCommands::List => {
            let peers = store.peers().list();
            if peers.is_empty() {
                println!("no peers configured");
            }
            for peer in peers {
                println!("{peer}");
            }
        }
    }
    Ok(())
}

fn cmd_op(store: &Arc<Store>, action: OpCommands) -> anyhow::Result<()> {
    match action {
        OpCommands::List { limit } => {
            let ops = store.oplog().ops(limit);
            if ops.is_empty() {
                println!("no operations found");
            }
            for op in ops {
                println!(
                    "{} seq={} type={} id={} ts={}",
                    op.author, op.seq, op.op_type, op.id, op.timestamp
                );
            }
        }
        OpCommands::Append { op_type, data } => {
            let op = store.oplog().append_local_json(&op_type, &data)?;
            println!(
                "appended op id={} type={} author={} seq={}",
                op.id, op.op_type, op.author, op.seq
            );
        }
    }
    Ok(())
}

fn cmd_consensus(
    store: &Arc<Store>,
    backend: &Arc<GitCli>,
    action: ConsensusCommands,
) -> anyhow::Result<()> {
    let engine = ConsensusEngine::new(store.clone());
    match action {
        ConsensusCommands::Propose {
            ref_name,
            old,
            new,
            epoch,
            ttl,
            id,
        } => {
            use keel_engine::VcsBackend;

            let ref_name = ref_name
                .or_else(|| backend.head_ref())
                .context("could not determine ref; pass --ref explicitly")?;
            let new_oid = new
                .or_else(|| backend.rev_parse("HEAD"))
                .context("could not determine new OID; pass --new explicitly")?;
            let old_oid = old
                .or_else(|| backend.rev_parse(&ref_name))
                .unwrap_or_default();

            let (op, payload) = engine.propose_ref_update(ProposeRefInput {
                proposal_id: id,
                ref_name,
                old_oid,
                new_oid,
                epoch,
                ttl: Duration::from_secs(ttl),
            })?;
            println!(
                "proposal={} ref={} old={} new={} epoch={} op={}",
                payload.proposal_id,
                payload.ref_name,
                payload.old_oid,
                payload.new_oid,
                payload.epoch,
                op.id
            );
        }

        ConsensusCommands::Vote { proposal, decision } => {
            let decision = match decision.as_str() {
                "yes" => VoteDecision::Yes,
                "no" => VoteDecision::No,
                other => bail!("invalid decision {other:?} (expected \"yes\" or \"no\")"),
            };
            let (op, payload) = engine.cast_vote(&proposal, decision)?;
            println!(
                "proposal={} vote={} epoch={} op={}",
                payload.proposal_id,
                payload.decision.as_str(),
                payload.epoch,
                op.id
            );
        }

        ConsensusCommands::Certify { proposal, force } => {
            let (op, cert) = engine.certify(&proposal, force)?;
            println!(
                "proposal={} certified={} yes={}/{} required={} op={}",
                cert.proposal_id,
                cert.certified,
                cert.yes_voters.len(),
                cert.total_voters,
                cert.required_yes,
                op.id
            );
        }

        ConsensusCommands::Status { proposal } => {
            let status = engine.status(&proposal)?;
            println!(
                "proposal={} ref={} old={} new={} epoch={} quorum={} certified={} expired={}",
                status.proposal.proposal_id,
                status.proposal.ref_name,
                status.proposal.old_oid,
                status.proposal.new_oid,
                status.proposal.epoch,
                status.has_quorum,
                status.certified,
                status.expired
            );
            println!(
                "threshold={:.2} voters={} yes={} no={} required_yes={}",
                status.threshold,
                status.members.len(),
                status.yes_voters.len(),
                status.no_voters.len(),
                status.required_yes
            );
        }

        ConsensusCommands::List { limit } => {
            let proposals = engine.proposal_summaries(limit);
            if proposals.is_empty() {
                println!("no proposals found");
            }
            for proposal in proposals {
                let status = engine.status(&proposal.proposal_id)?;
                println!(
                    "{} ref={} new={} epoch={} quorum={} certified={} yes={}/{}",
                    proposal.proposal_id,
                    proposal.ref_name,
                    proposal.new_oid,
                    proposal.epoch,
                    status.has_quorum,
                    status.certified,
                    status.yes_voters.len(),
                    status.members.len()
                );
            }
        }
    }
    Ok(())
}

fn cmd_pending(
    store: &Arc<Store>,
    orchestrator: &Arc<PushOrchestrator>,
    action: PendingCommands,
) -> anyhow::Result<()> {
    match action {
        PendingCommands::List => {
            let pushes = store.pending().list()?;
            if pushes.is_empty() {
                println!("no pending pushes");
            }
            for push in pushes {
                println!(
                    "proposal={} status={} remote={} target={} new={} attempts={}",
                    push.proposal_id,
                    push.status.as_str(),
                    push.remote,
                    push.target_ref,
                    push.new_oid,
                    push.attempts
                );
                if let Some(err) = &push.last_error {
                    println!("  last_error={err}");
                }
            }
        }
        PendingCommands::Process => {
            let report = orchestrator.process_pending(None);
            println!(
                "pending pushes processed: checked={} executed={} pending={} failed={}",
                report.checked, report.executed, report.pending, report.failed
            );
            if let Some(e) = report.first_error {
                return Err(e.into());
            }
        }
    }
    Ok(())
}
