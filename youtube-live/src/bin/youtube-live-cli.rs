use clap::{Parser, Subcommand};
use eyre::WrapErr;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use youtube_live::events::{ChatEnded, ChatMessage, SuperChat};
use youtube_live::{BotCommand, Credentials, LiveEvent, YouTubeLive};

/// Watch YouTube live streams and their chat from the terminal.
#[derive(Parser, Debug)]
#[command(name = "youtube-live-cli", version, about, long_about = None)]
struct Cli {
    /// File with client_id, client_secret, refresh_token and additional_scopes.
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Where the sign-in callback server listens.
    #[arg(long, default_value = "127.0.0.1:0")]
    listen_addr: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in through the browser and print the refresh token.
    Login,
    /// Report whether a channel is live.
    Live {
        /// Channel handle, with or without the leading `@`.
        handle: String,
        /// Keep checking every few seconds.
        #[arg(long)]
        watch: bool,
    },
    /// Print a live stream's chat until it ends.
    Chat {
        handle: String,
        /// Post this message once attached.
        #[arg(long)]
        say: Option<String>,
        /// Find the broadcast through search rather than the channel's uploads.
        #[arg(long)]
        search: bool,
    },
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(std::io::stdout().is_terminal())
        .init();

    let cli = Cli::parse();
    let credentials = Credentials::from_env_file(&cli.env_file)
        .wrap_err_with(|| format!("load credentials from {}", cli.env_file.display()))?;
    let yt = YouTubeLive::from_credentials(credentials)
        .listen_addr(cli.listen_addr)
        .on_new_refresh_token(|token| {
            eprintln!("==> new refresh token, keep it in your env file as refresh_token={token}");
        })
        .build()?;

    match cli.command {
        Command::Login => {
            yt.login().await?;
            let refresh_token = yt
                .refresh_token()
                .await
                .ok_or_else(|| eyre::eyre!("sign-in did not produce a refresh token"))?;
            println!("refresh_token={refresh_token}");
        }
        Command::Live { handle, watch } => {
            let channel_id = yt.channel_id_from_handle(&handle).await?;
            loop {
                let live = yt.is_live(&channel_id).await?;
                println!("{handle} is live? {live}");
                if !watch {
                    break;
                }
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
        Command::Chat {
            handle,
            say,
            search,
        } => {
            let channel_id = yt.channel_id_from_handle(&handle).await?;
            let broadcast_id = if search {
                yt.current_broadcast_id_via_search(&channel_id).await?
            } else {
                yt.current_broadcast_id_from_channel_id(&channel_id).await?
            };
            eprintln!("==> {handle} is live on https://youtu.be/{broadcast_id}");
            chat(&yt, &broadcast_id, say).await?;
        }
    }

    Ok(())
}

async fn chat(yt: &YouTubeLive, broadcast_id: &str, say: Option<String>) -> eyre::Result<()> {
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let mut attachment = yt.attach(&cancel, broadcast_id).await?;
    if let Some(message) = say {
        attachment
            .commands
            .send(BotCommand::send(message))
            .await
            .wrap_err("queue chat message")?;
    }

    while let Some(event) = attachment.events.recv().await {
        match event {
            LiveEvent::ChatMessage(ChatMessage {
                message,
                display_name,
                timestamp,
                ..
            }) => println!("[{timestamp}] {display_name}: {message}"),
            LiveEvent::SuperChat(SuperChat {
                message,
                amount,
                currency,
                display_name,
                timestamp,
                ..
            }) => println!(
                "[{timestamp}] Super Chat from {display_name}: {} ({amount:.2} {currency})",
                message.unwrap_or_default()
            ),
            LiveEvent::ChatEnded(ChatEnded { timestamp, .. }) => {
                println!("[{timestamp}] live chat has ended");
            }
            LiveEvent::Error(e) => eprintln!("[{}] {}", e.timestamp, e.error),
            other => println!("{}", other.id()),
        }
    }

    attachment.supervisor.await.wrap_err("join chat session")?;
    Ok(())
}
