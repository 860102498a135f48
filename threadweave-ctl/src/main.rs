use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use threadweave_client::{
    api::{Comment, CommentOrder, Connection, PostId},
    prelude::*,
    CommentNode, CommentTree, TreeConfig,
};

#[derive(structopt::StructOpt)]
struct Opt {
    /// Post the thread belongs to; events about other posts are skipped
    #[structopt(short, long)]
    post: Option<String>,

    /// Depth from which comments can no longer be replied to
    #[structopt(long, default_value = "5")]
    max_depth: u32,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Replay an event log on top of a seed page and print the resulting thread
    Replay {
        #[structopt(flatten)]
        input: Input,

        /// Display order: newest, oldest or top
        #[structopt(short, long, default_value = "newest", parse(try_from_str = parse_order))]
        order: CommentOrder,
    },

    /// Replay an event log on top of a seed page and check the resulting thread
    Check {
        #[structopt(flatten)]
        input: Input,
    },
}

#[derive(structopt::StructOpt)]
struct Input {
    /// JSON file holding the first page of root comments
    #[structopt(long, parse(from_os_str))]
    seed: PathBuf,

    /// File holding one push event payload per line
    #[structopt(long, parse(from_os_str))]
    events: Option<PathBuf>,
}

fn parse_order(s: &str) -> anyhow::Result<CommentOrder> {
    match s {
        "newest" => Ok(CommentOrder::Newest),
        "oldest" => Ok(CommentOrder::Oldest),
        "top" => Ok(CommentOrder::Top),
        _ => Err(anyhow::anyhow!("unknown order {s:?}, expected newest, oldest or top")),
    }
}

fn load(config: TreeConfig, input: &Input) -> anyhow::Result<CommentTree> {
    let seed = std::fs::read_to_string(&input.seed)
        .with_context(|| format!("reading seed file {:?}", input.seed))?;
    let seed: Connection<Comment> = serde_json::from_str(&seed)
        .with_context(|| format!("parsing seed file {:?}", input.seed))?;
    let mut tree = CommentTree::new(config);
    tree.seed_connection(seed.map(CommentNode::from));
    if let Some(events) = &input.events {
        replay(&mut tree, events)?;
    }
    Ok(tree)
}

fn replay(tree: &mut CommentTree, events: &Path) -> anyhow::Result<()> {
    let events = std::fs::read_to_string(events)
        .with_context(|| format!("reading event log {events:?}"))?;
    let mut outcomes = BTreeMap::new();
    for line in events.lines() {
        let outcome = tree.apply_payload(line);
        *outcomes.entry(format!("{outcome:?}")).or_insert(0usize) += 1;
    }
    tracing::info!(?outcomes, "replayed event log");
    Ok(())
}

fn print_thread(tree: &CommentTree, order: CommentOrder) {
    let mut pending = order
        .view(tree.roots())
        .into_iter()
        .rev()
        .collect::<Vec<Arc<CommentNode>>>();
    while let Some(n) = pending.pop() {
        let indent = "  ".repeat(n.depth as usize);
        let first_line = n.content.lines().next().unwrap_or("");
        let edited = if n.is_edited { " (edited)" } else { "" };
        let reply = if tree.can_reply(&n.id) { "" } else { " [no reply]" };
        println!(
            "{indent}{} by {} [{:+}]{edited}{reply}: {first_line}",
            n.id, n.author.username, n.vote_count
        );
        if !n.replies.exhausted {
            println!(
                "{indent}  … {} more replies",
                n.replies.total_count.saturating_sub(n.children.len())
            );
        }
        pending.extend(order.view(&n.children).into_iter().rev());
    }
    println!(
        "{} comments, {} waiting on a missing parent",
        tree.total_count(),
        tree.orphans().len()
    );
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opt = <Opt as structopt::StructOpt>::from_args();
    let config = TreeConfig {
        post_id: opt.post.map(PostId::new),
        max_reply_depth: opt.max_depth,
        ..TreeConfig::default()
    };

    match opt.cmd {
        Command::Replay { input, order } => {
            let tree = load(config, &input)?;
            print_thread(&tree, order);
        }
        Command::Check { input } => {
            let tree = load(config, &input)?;
            let violations = tree.check_invariants();
            for v in &violations {
                println!("{v:?}");
            }
            if !violations.is_empty() {
                anyhow::bail!("found {} invariant violations", violations.len());
            }
            println!("thread is consistent ({} comments)", tree.total_count());
        }
    }

    Ok(())
}
