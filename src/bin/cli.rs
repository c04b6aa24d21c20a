//! CLI client: votes, shows the live tally and runs the reveal

use clap::{Parser, Subcommand};
use revealpoll::common::Config;
use revealpoll::coordinator::{PollEvent, RejectReason};
use revealpoll::reveal::{Countdown, CountdownEvent, Step};
use revealpoll::{SubmitOutcome, VoteCoordinator, VoteOption};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "revealpoll")]
#[command(about = "Vote in a reveal poll and watch the tally")]
#[command(version)]
struct Cli {
    /// Config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Shared store URL
    #[arg(long)]
    server: Option<String>,

    /// Directory holding this client's vote flag and cached tally
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Ignore the shared store and count locally
    #[arg(long)]
    local_only: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cast this client's vote
    Vote {
        /// Option to vote for (a or b)
        option: VoteOption,
    },

    /// Show the current tally
    Tally,

    /// Print every tally change until interrupted
    Watch,

    /// Show this client's choice, count down, and reveal
    Reveal,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(server) = cli.server {
        config.client.server_url = Some(server);
    }
    if let Some(state_dir) = cli.state_dir {
        config.client.state_dir = state_dir;
    }
    if cli.local_only {
        config.client.server_url = None;
    }
    config.validate()?;

    let coordinator = VoteCoordinator::from_config(&config.client)?;
    let mode = coordinator.init().await?;
    let tally = coordinator.tally().unwrap_or_default();

    match cli.command {
        Commands::Vote { option } => match coordinator.submit(option).await? {
            SubmitOutcome::Accepted {
                tally, recorded, ..
            } => {
                println!("Vote for {} counted ({})", option, mode);
                if !recorded {
                    println!("  Shared store did not confirm; counted locally");
                }
                println!("  A: {}", tally.option_a);
                println!("  B: {}", tally.option_b);
            }
            SubmitOutcome::Rejected(RejectReason::AlreadyVoted { last_vote }) => {
                match last_vote {
                    Some(last) => println!("You already voted ({}). Thanks!", last),
                    None => println!("You already voted. Thanks!"),
                }
            }
            SubmitOutcome::Rejected(RejectReason::VoteInFlight) => {
                println!("A vote from this client is still being recorded");
            }
        },

        Commands::Tally => {
            println!("Tally ({}):", mode);
            println!("  A: {}", tally.option_a);
            println!("  B: {}", tally.option_b);
            println!("  Voted here: {}", coordinator.has_voted_already());
            if let Some(last) = coordinator.last_vote() {
                println!("  Your vote: {}", last);
            }
        }

        Commands::Watch => {
            println!("Watching tally ({}), Ctrl-C to stop", mode);
            println!("  A: {}  B: {}", tally.option_a, tally.option_b);
            let _handle = coordinator.subscribe(|event| match event {
                PollEvent::TallyChanged(t) => println!("  A: {}  B: {}", t.option_a, t.option_b),
                PollEvent::VoteAccepted(option) => println!("  Vote accepted: {}", option),
            });
            if !coordinator.is_live() {
                println!("  (no live updates in {} mode)", mode);
            }
            tokio::signal::ctrl_c().await?;
        }

        Commands::Reveal => {
            let Some(Step::Choice) = Step::Vote.next(&tally) else {
                anyhow::bail!("nobody has voted yet");
            };
            match coordinator.last_vote() {
                Some(choice) => println!("Your guess: {}", choice),
                None => println!("You did not vote from this client"),
            }

            let countdown = Countdown::from_config(&config.reveal);
            let reveal = countdown
                .run(|event| {
                    if let CountdownEvent::Tick(secs) = event {
                        println!("{:02}", secs);
                    }
                })
                .await;

            match &reveal.name {
                Some(name) => println!("It's {}! Welcome, {}!", reveal.result, name),
                None => println!("It's {}!", reveal.result),
            }
        }
    }

    Ok(())
}
