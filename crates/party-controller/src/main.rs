//! Party Console
//!
//! Developer console for the party controller. Runs the local player's
//! actor on an in-process loopback hub next to a few simulated players who
//! host public parties, then reads commands from stdin (`help` lists them).
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Start the loopback hub and the simulated players
//! 3. Spawn the local `PartyActor` (it hosts a party immediately)
//! 4. Print notifications on a background task
//! 5. Read commands until `quit` or end of input

use anyhow::Context;
use party_controller::config::Config;
use party_controller::console::ConsoleCommand;
use party_controller::notify::{PartyEvent, Subscription};
use party_controller::provider::loopback::LoopbackHub;
use party_controller::session::MemberId;
use party_controller::{PartyActor, PartyHandle};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LOCAL_ID: MemberId = MemberId(1);

const SIMULATED_PLAYERS: [(u64, &str); 3] = [(2, "Rook"), (3, "Wren"), (4, "Moth")];

/// How long to wait for a simulated player's party before inviting.
const INVITE_DELAY: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "party=info,party_controller=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env().context("failed to load configuration")?;
    info!(
        game_tag = %config.game_tag,
        max_members = config.max_members,
        min_start_members = config.min_start_members,
        local_name = %config.local_name,
        "Configuration loaded"
    );

    let hub = LoopbackHub::new();
    let shutdown = CancellationToken::new();

    let mut tasks = Vec::new();
    let mut bots = Vec::new();
    for (id, name) in SIMULATED_PLAYERS {
        let (peer, events) = hub.connect(MemberId(id), name);
        let bot_config = Config {
            local_name: name.to_string(),
            ..config.clone()
        };
        let (handle, task) = PartyActor::spawn(
            bot_config,
            MemberId(id),
            peer.services(),
            events,
            shutdown.child_token(),
        );
        bots.push(handle);
        tasks.push(task);
    }

    let (peer, events) = hub.connect(LOCAL_ID, config.local_name.clone());
    let (handle, task) = PartyActor::spawn(
        config,
        LOCAL_ID,
        peer.services(),
        events,
        shutdown.child_token(),
    );
    tasks.push(task);

    let printer = tokio::spawn(print_events(handle.subscribe()));

    if let Some(inviter) = bots.first().cloned() {
        let hub = hub.clone();
        tokio::spawn(async move {
            tokio::time::sleep(INVITE_DELAY).await;
            match inviter.info().await {
                Ok(info) => {
                    if let Err(e) = hub.invite(inviter.local_id(), LOCAL_ID, info.id) {
                        warn!(target: "party.console", error = %e, "Simulated invite failed");
                    }
                }
                Err(e) => warn!(target: "party.console", error = %e, "Simulated player has no party"),
            }
        });
    }

    println!("party console ready, type 'help' for commands");
    run_console(&handle).await;

    info!(target: "party.console", "Shutting down");
    shutdown.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            error!(target: "party.console", error = %e, "Actor task failed");
        }
    }
    printer.abort();
    Ok(())
}

async fn run_console(handle: &PartyHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(target: "party.console", error = %e, "Failed to read stdin");
                break;
            }
        };

        let command = match ConsoleCommand::parse(&line) {
            Ok(Some(ConsoleCommand::Quit)) => break,
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        // Errors are also published as notifications; the printer shows them.
        if let Ok(output) = command.execute(handle).await {
            if !output.is_empty() {
                println!("{output}");
            }
        }
    }
}

async fn print_events(mut subscription: Subscription) {
    while let Some(event) = subscription.recv().await {
        match event {
            PartyEvent::SessionUpdated(session) => {
                println!(
                    "[party {}] {} of {} members, owner {}",
                    session.id,
                    session.member_count(),
                    session.max_members,
                    session.owner_name()
                );
            }
            PartyEvent::Notification { text, invite, .. } => match invite {
                Some(session) => println!("* {text} (join {})", session.id),
                None => println!("* {text}"),
            },
            PartyEvent::ChatMessageReceived { sender, text } => {
                println!("<{}> {text}", sender.name);
            }
            PartyEvent::UnknownCommand {
                name,
                args,
                from_owner,
            } => {
                println!(
                    "? command {name} {} (from owner: {from_owner})",
                    args.join(" ")
                );
            }
        }
    }
}
