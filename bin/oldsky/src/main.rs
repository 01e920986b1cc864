//! # oldsky
//!
//! Terminal front-end: loads settings, wires the XRPC and session-file
//! plugins into an `AppContext`, and prints pages and threads in the
//! old-forum layout.

mod render;

use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use osky_app::{AppContext, ExpandOutcome};
use osky_config::Settings;
use osky_core::{FeedType, Post, ProtocolClient};
use osky_session_file::FileSessionStore;
use osky_xrpc::XrpcClient;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "oldsky")]
#[command(about = "Read Bluesky like it's 2008")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the front page
    Feed {
        /// following | discovery
        #[arg(default_value = "following")]
        feed: FeedType,
        /// Page to show; earlier pages are loaded on the way
        #[arg(short, long, default_value_t = 1)]
        page: u32,
    },
    /// Show a post's comment tree
    Thread {
        /// at:// uri of the post
        uri: String,
        /// Fetch and show the replies of these comments too
        #[arg(long)]
        expand: Vec<String>,
        /// Extra pages of replies to reveal at every level
        #[arg(long, default_value_t = 0)]
        more: u32,
    },
    /// Publish a top-level post
    Post { text: Vec<String> },
    /// Like or un-like a post
    Like { uri: String },
    /// Repost or un-repost a post
    Repost { uri: String },
    /// Reply to a post
    Comment { uri: String, text: Vec<String> },
    /// Show the signed-in account
    Whoami,
    /// Forget the stored session
    Logout,
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if settings.log.json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load().context("loading settings")?;
    init_tracing(&settings);

    // 1. Plugins
    let client = Arc::new(XrpcClient::new(&settings.service_url, settings.request_timeout())?);
    let store = Arc::new(FileSessionStore::new(settings.session_file()));

    // 2. Session-scoped context
    let ctx = AppContext::new(
        client.clone(),
        store,
        settings.feed.clone(),
        settings.thread.clone(),
    );

    if let Command::Logout = cli.command {
        if ctx.auth().resume().await? {
            ctx.logout().await;
        }
        println!("signed out");
        return Ok(());
    }

    sign_in(&ctx, &settings).await?;
    info!(service = %settings.service_url, "oldsky ready");

    let now = Utc::now();
    match cli.command {
        Command::Feed { feed, page } => {
            match ctx.auth().profile().await {
                Ok(profile) => println!("{}", render::render_header(&profile)),
                Err(e) => warn!(error = %e, "no profile header"),
            }
            if ctx.feed().feed_type().await != feed {
                ctx.set_feed_type(feed).await?;
            } else if ctx.feed().page_count().await == 0 {
                ctx.load_page(1).await?;
            }
            for n in 2..=page {
                ctx.load_page(n).await?;
            }
            let current = ctx.feed().current().await.ok_or_else(|| anyhow!("no page loaded"))?;
            let number = ctx.feed().current_page().await;
            print!(
                "{}",
                render::render_page(&current, number, settings.feed.page_size, ctx.interactions(), now)
            );
        }
        Command::Thread { uri, expand, more } => {
            let cancel = CancellationToken::new();
            let sweep = ctx.open_thread(&uri, cancel.clone()).await?;
            let outcome = tokio::select! {
                joined = sweep => joined.unwrap_or(ExpandOutcome::Cancelled),
                _ = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                    ExpandOutcome::Cancelled
                }
            };
            info!(?outcome, "reply sweep done");

            for target in &expand {
                if let Err(e) = ctx.threads().show_replies(target, &cancel).await {
                    warn!(uri = %target, error = %e, "could not expand replies");
                }
            }
            for _ in 0..more {
                ctx.threads().load_more_replies().await;
            }
            let snapshot = ctx.threads().snapshot().await;
            print!("{}", render::render_thread(&snapshot, ctx.interactions(), now));
        }
        Command::Whoami => {
            let profile = ctx.auth().profile().await?;
            println!("{}", render::render_header(&profile));
            if let Some(bio) = profile.description.as_deref().filter(|d| !d.trim().is_empty()) {
                println!("\n{bio}");
            }
        }
        Command::Post { text } => {
            let created = ctx.auth().create_post(&text.join(" ")).await?;
            println!("posted {}", created.uri);
        }
        Command::Like { uri } => {
            let post = fetch_post(client.as_ref(), &uri).await?;
            let state = ctx.toggle_like(&post).await?;
            println!("{} ({} likes, {:?})", if state.is_liked { "liked" } else { "not liked" }, state.like_count, state.like_status);
        }
        Command::Repost { uri } => {
            let post = fetch_post(client.as_ref(), &uri).await?;
            let state = ctx.toggle_repost(&post).await?;
            println!(
                "{} ({} reposts, {:?})",
                if state.is_reposted { "reposted" } else { "not reposted" },
                state.repost_count,
                state.repost_status
            );
        }
        Command::Comment { uri, text } => {
            let post = fetch_post(client.as_ref(), &uri).await?;
            ctx.interactions().toggle_comment_box(&post.uri);
            let state = ctx.post_comment(&post, &text.join(" ")).await?;
            println!("comment posted ({} comments)", state.comment_count);
        }
        Command::Logout => {}
    }
    Ok(())
}

/// Resumes the stored session, falling back to the configured credentials.
async fn sign_in(ctx: &AppContext, settings: &Settings) -> anyhow::Result<()> {
    if ctx.resume().await? {
        return Ok(());
    }
    let (Some(identifier), Some(password)) = (&settings.identifier, &settings.password) else {
        bail!("not signed in: set OLDSKY__IDENTIFIER and OLDSKY__PASSWORD (an app password)");
    };
    ctx.login(identifier, password).await?;
    Ok(())
}

async fn fetch_post(client: &dyn ProtocolClient, uri: &str) -> anyhow::Result<Post> {
    client
        .get_posts(vec![uri.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("post {uri} not found"))
}
