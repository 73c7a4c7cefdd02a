//! Carries out [`BotCommand`]s against an attached chat.

use crate::background::deliver;
use crate::events::{BotCommand, ErrorEvent, LiveEvent};
use crate::transport::ChatTransport;
use eyre::WrapErr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Runs commands one at a time, in the order they were sent.
///
/// A command that fails is reported on `events` and the handler moves on to the next one.
/// Stops when every command sender is gone or `scope` is cancelled, abandoning a write that
/// is still in flight.
pub(crate) async fn handle_commands<T: ChatTransport>(
    transport: Arc<T>,
    live_chat_id: String,
    mut commands: mpsc::Receiver<BotCommand>,
    events: mpsc::Sender<LiveEvent>,
    scope: CancellationToken,
) {
    loop {
        let command = tokio::select! {
            _ = scope.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => command,
                None => {
                    tracing::debug!(live_chat_id, "command channel closed");
                    break;
                }
            },
        };

        let result = tokio::select! {
            _ = scope.cancelled() => break,
            result = execute(&*transport, &live_chat_id, &command) => result,
        };

        match result {
            Ok(()) => tracing::debug!(live_chat_id, ?command, "command done"),
            Err(e) => {
                tracing::warn!(live_chat_id, ?command, error = %e, "command failed");
                if !deliver(&events, &scope, LiveEvent::Error(ErrorEvent::now(e))).await {
                    break;
                }
            }
        }
    }
}

async fn execute<T: ChatTransport>(
    transport: &T,
    live_chat_id: &str,
    command: &BotCommand,
) -> eyre::Result<()> {
    match command {
        BotCommand::SendMessage { message } => transport
            .insert_message(live_chat_id, message)
            .await
            .wrap_err("send chat message"),
        BotCommand::DeleteMessage { message_id } => transport
            .delete_message(message_id)
            .await
            .wrap_err_with(|| format!("delete chat message {message_id}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::fake::ScriptedChat;
    use crate::error::Error;

    fn start(
        chat: &Arc<ScriptedChat>,
    ) -> (
        mpsc::Sender<BotCommand>,
        mpsc::Receiver<LiveEvent>,
        CancellationToken,
        tokio::task::JoinHandle<()>,
    ) {
        let (command_tx, command_rx) = mpsc::channel(100);
        let (event_tx, event_rx) = mpsc::channel(100);
        let scope = CancellationToken::new();
        let handler = tokio::spawn(handle_commands(
            Arc::clone(chat),
            "chat-1".into(),
            command_rx,
            event_tx,
            scope.clone(),
        ));
        (command_tx, event_rx, scope, handler)
    }

    #[tokio::test]
    async fn commands_run_in_order() {
        let chat = Arc::new(ScriptedChat::new(Vec::new()));
        let (commands, mut events, _scope, handler) = start(&chat);

        commands.send(BotCommand::send("hello")).await.unwrap();
        commands.send(BotCommand::delete("LCC.1")).await.unwrap();
        commands.send(BotCommand::send("bye")).await.unwrap();
        drop(commands);
        handler.await.unwrap();

        assert_eq!(
            chat.writes(),
            ["insert chat-1: hello", "delete LCC.1", "insert chat-1: bye"]
        );
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn failures_become_error_events() {
        let chat = Arc::new(ScriptedChat::new(Vec::new()).failing_writes_to("LCC.gone"));
        let (commands, mut events, _scope, handler) = start(&chat);

        commands.send(BotCommand::delete("LCC.gone")).await.unwrap();
        commands.send(BotCommand::send("still working")).await.unwrap();
        drop(commands);
        handler.await.unwrap();

        let Some(LiveEvent::Error(event)) = events.recv().await else {
            panic!("expected an error event");
        };
        assert!(matches!(event.error, Error::Api(ref api) if api.code == 403));
        assert!(events.recv().await.is_none());
        assert_eq!(chat.writes(), ["delete LCC.gone", "insert chat-1: still working"]);
    }

    #[tokio::test]
    async fn cancellation_stops_the_handler() {
        let chat = Arc::new(ScriptedChat::new(Vec::new()));
        let (commands, _events, scope, handler) = start(&chat);

        scope.cancel();
        handler.await.unwrap();
        assert!(commands.send(BotCommand::send("too late")).await.is_err());
        assert!(chat.writes().is_empty());
    }
}
