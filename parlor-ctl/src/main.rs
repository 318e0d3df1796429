use std::{sync::Arc, time::Duration};

use anyhow::Context;
use parlor_client::{
    api::{CommentId, Identity, ThreadId},
    Gateways, RealtimeMerge, Submitted, SyncConfig, ThreadSync,
};
use parlor_mock_server::MockServer;

#[derive(structopt::StructOpt)]
struct Opt {
    /// Longest accepted comment, in characters
    #[structopt(long)]
    max_content_len: Option<usize>,

    /// Give up on backend writes after this many milliseconds
    #[structopt(long)]
    commit_timeout_ms: Option<u64>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Run a conversation between two users against an in-memory backend
    Simulate,

    /// Post one comment on a demo thread and print the resulting tree
    Post {
        /// Comment content
        content: String,

        /// Id of the comment to reply to, the demo thread holds comments 1 and 2
        #[structopt(long)]
        parent: Option<i64>,
    },
}

struct Demo {
    server: Arc<MockServer>,
    thread: ThreadId,
    op: Identity,
}

fn demo() -> anyhow::Result<Demo> {
    let server = Arc::new(MockServer::new());
    let op = Identity::new("op");
    let thread = server.create_thread(&op, "Welcome").id;
    server
        .post_as(&op, thread, None, "Say hi below")
        .context("seeding demo thread")?;
    server
        .post_as(&op, thread, Some(CommentId(1)), "Replies nest")
        .context("seeding demo thread")?;
    Ok(Demo { server, thread, op })
}

impl Demo {
    fn sync_as(&self, who: Identity, config: SyncConfig) -> anyhow::Result<ThreadSync> {
        let thread = self.server.fetch_thread(self.thread)?;
        ThreadSync::new(
            &thread,
            who,
            config,
            Gateways::from_backend(self.server.clone()),
        )
        .context("loading demo thread")
    }
}

fn print_tree(sync: &ThreadSync) -> anyhow::Result<()> {
    let forest = sync.with_tree(|t| t.to_forest());
    let json = serde_json::to_string_pretty(&forest).context("serializing comment tree")?;
    println!("{json}");
    Ok(())
}

fn report(what: &str, res: Result<Submitted, parlor_client::SubmitError>) {
    match res {
        Ok(Submitted::Committed(c)) => println!("{what}: committed as {:?}", c.id),
        Ok(s) => println!("{what}: {s:?}"),
        Err(err) => println!("{what}: failed, {err}"),
    }
}

async fn simulate(config: SyncConfig) -> anyhow::Result<()> {
    let demo = demo()?;
    let alice = demo.sync_as(Identity::new("alice"), config.clone())?;
    let op = demo.sync_as(demo.op.clone(), config)?;
    let alice_feed = RealtimeMerge::start(&alice, demo.server.clone()).await?;
    let op_feed = RealtimeMerge::start(&op, demo.server.clone()).await?;

    report("alice comments", alice.submit_root_comment("Hi everyone").await);
    report("op replies", op.submit_reply(CommentId(3), "Welcome alice").await);
    report(
        "alice replies deeper",
        alice.submit_nested_reply(CommentId(4), "Thanks").await,
    );
    demo.server.fail_next_commit("backend went away");
    report("alice comments again", alice.submit_root_comment("Anyone?").await);

    // let the feeds catch up
    tokio::time::sleep(Duration::from_millis(50)).await;
    alice_feed.stop().await;
    op_feed.stop().await;
    alice.settle().await;
    op.settle().await;

    for n in demo.server.notifications() {
        println!(
            "notification: {:?} about {:?} ({:?})",
            n.recipient, n.comment, n.kind
        );
    }
    println!("alice sees:");
    print_tree(&alice)?;
    println!("op sees:");
    print_tree(&op)
}

async fn post(config: SyncConfig, content: String, parent: Option<i64>) -> anyhow::Result<()> {
    let demo = demo()?;
    let sync = demo.sync_as(local_user(), config)?;
    let res = match parent {
        None => sync.submit_root_comment(&content).await,
        Some(p) => sync.submit_reply(CommentId(p), &content).await,
    };
    sync.settle().await;
    match res? {
        Submitted::Committed(c) => tracing::info!(id = ?c.id, "comment posted"),
        s => tracing::warn!(?s, "comment not posted"),
    }
    print_tree(&sync)
}

/// Identity posting from this machine, named after the logged-in user
fn local_user() -> Identity {
    Identity::new(whoami::username())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opt = <Opt as structopt::StructOpt>::from_args();
    let mut config = SyncConfig::from_env().context("reading configuration from environment")?;
    if let Some(len) = opt.max_content_len {
        config.max_content_len = len;
    }
    if let Some(ms) = opt.commit_timeout_ms {
        config.commit_timeout = Some(Duration::from_millis(ms));
    }

    match opt.cmd {
        Command::Simulate => simulate(config).await,
        Command::Post { content, parent } => post(config, content, parent).await,
    }
}
