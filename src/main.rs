mod attendance;
mod model;
mod twitter;

use crate::attendance::{Register, Schedule};
use crate::twitter::collect::{CollectOptions, Collector};
use crate::twitter::endpoint::{Endpoint, Search, UserTimeline};
use crate::twitter::{Authentication, BearerTransport, Transport};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use futures::{pin_mut, TryStreamExt};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

#[derive(Parser, Debug)]
#[clap(version, about = "Rate-limit-aware tweet retrieval and hashtag attendance counting")]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Retrieve tweets and print them to stdout
    Collect(CollectArgs),
    /// Tally hashtag-tagged tweets per lecture session for each user
    Attendance(AttendanceArgs),
}

#[derive(clap::Args, Debug)]
struct CollectArgs {
    /// Path to the authentication details file
    #[clap(short, long, default_value = "./auth.json")]
    auth: PathBuf,
    /// Search for tweets matching this keyword
    #[clap(short, long, conflicts_with = "user")]
    keyword: Option<String>,
    /// Read this user's timeline instead of searching
    #[clap(short, long)]
    user: Option<String>,
    /// Stop after this many tweets (zero or negative fetches everything)
    #[clap(short, long, default_value_t = -1, allow_hyphen_values = true)]
    total: i64,
    /// Also yield retweets
    #[clap(long)]
    include_retweets: bool,
    /// Print only the tweet text instead of one JSON object per line
    #[clap(long)]
    text_only: bool,
}

#[derive(clap::Args, Debug)]
struct AttendanceArgs {
    /// Path to the authentication details file
    #[clap(short, long, default_value = "./auth.json")]
    auth: PathBuf,
    /// Username(s) to tally (comma seperated)
    #[clap(short, long)]
    users: Option<String>,
    /// File containing list of usernames to tally (one per line)
    #[clap(short, long)]
    list: Option<PathBuf>,
    /// Hashtag that marks an attendance tweet
    #[clap(long)]
    hashtag: String,
    /// Path to the session schedule file (one `start..end` line per session)
    #[clap(short, long)]
    schedule: PathBuf,
    /// Tweets to scan per user
    #[clap(short, long, default_value_t = 500, allow_hyphen_values = true)]
    total: i64,
    /// Continue even if a user fails to tally
    #[clap(long)]
    continue_on_error: bool,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    if let Err(e) = main2().await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

async fn main2() -> anyhow::Result<()> {
    let args: Args = Args::parse();
    match args.command {
        Command::Collect(args) => collect(args).await,
        Command::Attendance(args) => tally(args).await,
    }
}

async fn load_transport(path: &Path) -> anyhow::Result<Arc<dyn Transport>> {
    let auth = fs::read_to_string(path)
        .await
        .context("Unable to read auth file")?;
    let auth =
        serde_json::from_str::<Authentication>(&auth).context("Unable to deserialize auth file")?;
    Ok(Arc::new(BearerTransport::new(&auth)?))
}

async fn collect(args: CollectArgs) -> anyhow::Result<()> {
    let transport = load_transport(&args.auth).await?;
    let endpoint: Arc<dyn Endpoint> = match (&args.keyword, &args.user) {
        (Some(keyword), None) => Arc::new(Search::new(keyword.clone())),
        (None, Some(user)) => Arc::new(UserTimeline::new(user.clone())),
        _ => bail!("Provide exactly one of --keyword or --user"),
    };
    let collector = Collector::new(transport, endpoint);
    let options = CollectOptions {
        total: args.total,
        include_retweets: args.include_retweets,
    };
    if args.text_only {
        let stream = collector.texts(options);
        pin_mut!(stream);
        while let Some(text) = stream.try_next().await? {
            println!("{}", text);
        }
    } else {
        let stream = collector.tweets(options);
        pin_mut!(stream);
        while let Some(tweet) = stream.try_next().await? {
            println!("{}", serde_json::to_string(&tweet)?);
        }
    }
    Ok(())
}

async fn tally(args: AttendanceArgs) -> anyhow::Result<()> {
    let transport = load_transport(&args.auth).await?;
    let schedule_text = fs::read_to_string(&args.schedule)
        .await
        .context("Unable to read schedule file")?;
    let schedule = Schedule::parse(&schedule_text)?;
    let usernames = parse_usernames(&args).await?;
    let options = CollectOptions {
        total: args.total,
        include_retweets: false,
    };
    for account in usernames {
        let result =
            tally_account(&account, transport.clone(), &args.hashtag, &schedule, options).await;
        if let Err(e) = result {
            if args.continue_on_error {
                log::warn!("Error tallying tweets for: {}, ignoring...", account);
            } else {
                return Err(e);
            }
        }
    }
    Ok(())
}

async fn parse_usernames(args: &AttendanceArgs) -> anyhow::Result<Vec<String>> {
    let mut account_names = BTreeSet::new();
    if let Some(users) = &args.users {
        users.split(',').for_each(|s| {
            account_names.insert(s.to_string());
        });
    }
    if let Some(list) = &args.list {
        let list = fs::read_to_string(list)
            .await
            .context("Unable to read users list")?;
        list.lines().for_each(|l| {
            account_names.insert(l.to_string());
        });
    }
    if account_names.is_empty() {
        bail!("No usernames provided")
    }
    Ok(account_names.into_iter().collect())
}

async fn tally_account(
    username: &str,
    transport: Arc<dyn Transport>,
    hashtag: &str,
    schedule: &Schedule,
    options: CollectOptions,
) -> anyhow::Result<()> {
    let mut register = Register::new(hashtag, schedule.clone());
    let collector = Collector::new(transport, Arc::new(UserTimeline::new(username)));
    let stream = collector.tweets(options);
    pin_mut!(stream);
    let mut scanned = 0u64;
    while let Some(tweet) = stream.try_next().await? {
        register.record(&tweet)?;
        scanned += 1;
    }
    log::info!("Scanned {} tweets for {}", scanned, username);
    let per_session = register
        .counts()
        .iter()
        .enumerate()
        .map(|(i, c)| format!("session {}: {}", i + 1, c))
        .collect::<Vec<_>>()
        .join(", ");
    println!(
        "{}: {} tagged tweets ({})",
        username,
        register.tagged(),
        per_session
    );
    Ok(())
}
