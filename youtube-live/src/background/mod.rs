//! The tasks that keep an attached chat session running.
//!
//! An attachment is a poller that turns chat pages into [`LiveEvent`]s and a command handler
//! that performs [`BotCommand`]s, both living under one cancellation scope derived from the
//! caller's token. When the poller stops (the chat ended, the service refused to continue,
//! or the consumer went away) it cancels the scope, which takes the command handler down with
//! it. Cancelling the caller's token stops both.

use crate::broadcast;
use crate::error::Result;
use crate::events::{BotCommand, LiveEvent};
use crate::transport::{BroadcastQuery, ChatTransport};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(crate) mod chat;
pub(crate) mod commands;

/// Room for this many undelivered events or unprocessed commands before senders wait.
pub(crate) const CHANNEL_CAPACITY: usize = 100;

/// A running chat session.
#[derive(Debug)]
pub struct Attachment {
    pub live_chat_id: String,
    /// Closes once the session is over; [`LiveEvent::ChatEnded`] is the last event of a chat
    /// that ended on its own.
    pub events: mpsc::Receiver<LiveEvent>,
    pub commands: mpsc::Sender<BotCommand>,
    /// Finishes once both tasks have stopped.
    pub supervisor: JoinHandle<()>,
}

/// Attaches to the chat of `broadcast_id`.
///
/// Fails up front if the broadcast does not exist or has no active chat.
pub async fn attach<Q, T>(
    query: &Q,
    transport: Arc<T>,
    cancel: &CancellationToken,
    broadcast_id: &str,
) -> Result<Attachment>
where
    Q: BroadcastQuery,
    T: ChatTransport,
{
    let live_chat_id = broadcast::live_chat_id(query, broadcast_id).await?;
    tracing::info!(broadcast_id, live_chat_id, "attaching to live chat");
    Ok(spawn_attachment(transport, cancel, live_chat_id))
}

pub(crate) fn spawn_attachment<T: ChatTransport>(
    transport: Arc<T>,
    cancel: &CancellationToken,
    live_chat_id: String,
) -> Attachment {
    let scope = cancel.child_token();
    let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (command_tx, command_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let poller = tokio::spawn(chat::poll_chat(
        Arc::clone(&transport),
        live_chat_id.clone(),
        event_tx.clone(),
        scope.clone(),
    ));
    let handler = tokio::spawn(commands::handle_commands(
        transport,
        live_chat_id.clone(),
        command_rx,
        event_tx,
        scope.clone(),
    ));

    let supervisor = tokio::spawn({
        let live_chat_id = live_chat_id.clone();
        async move {
            scope.cancelled().await;
            let (poller, handler) = tokio::join!(poller, handler);
            for (task, result) in [("poller", poller), ("command handler", handler)] {
                if let Err(e) = result {
                    tracing::error!(live_chat_id, task, error = %e, "chat task failed");
                }
            }
            tracing::debug!(live_chat_id, "chat session detached");
        }
    });

    Attachment {
        live_chat_id,
        events: event_rx,
        commands: command_tx,
        supervisor,
    }
}

/// Hands `event` to the consumer, giving up if `scope` is cancelled first.
///
/// Returns `false` if the event was not delivered.
pub(crate) async fn deliver(
    events: &mpsc::Sender<LiveEvent>,
    scope: &CancellationToken,
    event: LiveEvent,
) -> bool {
    tokio::select! {
        biased;
        _ = scope.cancelled() => {
            tracing::debug!("session cancelled, dropping event");
            false
        }
        sent = events.send(event) => sent.is_ok(),
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! A chat that plays back scripted pages.

    use crate::transport::ChatTransport;
    use crate::youtube_api::{ApiError, ApiErrorItem, LiveChatMessageListResponse};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    pub(crate) struct ScriptedChat {
        pages: Mutex<VecDeque<eyre::Result<LiveChatMessageListResponse>>>,
        page_tokens: Mutex<Vec<Option<String>>>,
        writes: Mutex<Vec<String>>,
        fail_writes_to: Option<&'static str>,
    }

    impl ScriptedChat {
        /// Once `pages` runs out, every poll returns an empty page.
        pub(crate) fn new(pages: Vec<eyre::Result<LiveChatMessageListResponse>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                page_tokens: Mutex::default(),
                writes: Mutex::default(),
                fail_writes_to: None,
            }
        }

        /// Writes that mention `target` fail with a quota error.
        pub(crate) fn failing_writes_to(mut self, target: &'static str) -> Self {
            self.fail_writes_to = Some(target);
            self
        }

        /// The cursor passed to each poll so far.
        pub(crate) fn page_tokens(&self) -> Vec<Option<String>> {
            self.page_tokens.lock().unwrap().clone()
        }

        pub(crate) fn writes(&self) -> Vec<String> {
            self.writes.lock().unwrap().clone()
        }

        fn write(&self, description: String) -> eyre::Result<()> {
            let fails = self
                .fail_writes_to
                .is_some_and(|target| description.contains(target));
            self.writes.lock().unwrap().push(description);
            if fails {
                return Err(quota_exceeded());
            }
            Ok(())
        }
    }

    impl ChatTransport for ScriptedChat {
        async fn list_messages(
            &self,
            _live_chat_id: &str,
            page_token: Option<&str>,
        ) -> eyre::Result<LiveChatMessageListResponse> {
            self.page_tokens
                .lock()
                .unwrap()
                .push(page_token.map(String::from));
            let next = self.pages.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(LiveChatMessageListResponse::default()))
        }

        async fn insert_message(&self, live_chat_id: &str, message: &str) -> eyre::Result<()> {
            self.write(format!("insert {live_chat_id}: {message}"))
        }

        async fn delete_message(&self, message_id: &str) -> eyre::Result<()> {
            self.write(format!("delete {message_id}"))
        }
    }

    pub(crate) fn quota_exceeded() -> eyre::Report {
        eyre::Report::new(ApiError {
            code: 403,
            message: "The request cannot be completed because you have exceeded your quota."
                .into(),
            status: Some("PERMISSION_DENIED".into()),
            errors: vec![ApiErrorItem {
                reason: "quotaExceeded".into(),
                domain: "youtube.quota".into(),
                message: String::new(),
            }],
        })
    }

    /// A chat item of `kind` authored by Ferris, carrying `details` under `details_key`.
    pub(crate) fn message(
        id: &str,
        kind: &str,
        details_key: &str,
        details: serde_json::Value,
    ) -> serde_json::Value {
        json!({
            "kind": "youtube#liveChatMessage",
            "id": id,
            "snippet": {
                "type": kind,
                "liveChatId": "chat-1",
                "authorChannelId": "UCferris",
                "publishedAt": "2025-03-01T12:00:00Z",
                "hasDisplayContent": true,
                details_key: details
            },
            "authorDetails": {
                "channelId": "UCferris",
                "displayName": "Ferris",
                "isChatOwner": true
            }
        })
    }

    pub(crate) fn text(id: &str, text: &str) -> serde_json::Value {
        let mut item = message(
            id,
            "textMessageEvent",
            "textMessageDetails",
            json!({ "messageText": text }),
        );
        item["snippet"]["displayMessage"] = json!(text);
        item
    }

    pub(crate) fn chat_ended(id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "snippet": {
                "type": "chatEndedEvent",
                "liveChatId": "chat-1",
                "publishedAt": "2025-03-01T13:00:00Z",
                "hasDisplayContent": false
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{self, ScriptedChat};
    use super::*;
    use crate::error::Error;
    use crate::youtube_api::{
        ChannelListResponse, LiveChatMessageListResponse, PlaylistItemListResponse,
        SearchListResponse, VideoListResponse,
    };
    use serde_json::json;
    use std::time::Duration;

    /// Knows about one broadcast, `v1`, with chat `chat-1`, and one without a chat, `v2`.
    struct OneBroadcast;

    impl BroadcastQuery for OneBroadcast {
        async fn channels_by_handle(&self, _: &str) -> eyre::Result<ChannelListResponse> {
            Ok(ChannelListResponse::default())
        }

        async fn channels_by_id(&self, _: &str) -> eyre::Result<ChannelListResponse> {
            Ok(ChannelListResponse::default())
        }

        async fn playlist_items(&self, _: &str, _: u32) -> eyre::Result<PlaylistItemListResponse> {
            Ok(PlaylistItemListResponse::default())
        }

        async fn videos(&self, video_ids: &[String]) -> eyre::Result<VideoListResponse> {
            let items = match video_ids {
                [id] if id == "v1" => json!([{"id": "v1", "liveStreamingDetails": {"activeLiveChatId": "chat-1"}}]),
                [id] if id == "v2" => json!([{"id": "v2", "liveStreamingDetails": {}}]),
                _ => json!([]),
            };
            Ok(serde_json::from_value(json!({ "items": items }))?)
        }

        async fn search_live(&self, _: &str) -> eyre::Result<SearchListResponse> {
            Ok(SearchListResponse::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn chat_end_tears_everything_down() {
        let chat = Arc::new(ScriptedChat::new(vec![Ok(LiveChatMessageListResponse {
            items: vec![fake::text("1", "hi"), fake::chat_ended("2")],
            ..Default::default()
        })]));
        let cancel = CancellationToken::new();
        let mut attachment = attach(&OneBroadcast, Arc::clone(&chat), &cancel, "v1")
            .await
            .unwrap();
        assert_eq!(attachment.live_chat_id, "chat-1");

        assert!(matches!(attachment.events.recv().await, Some(LiveEvent::ChatMessage(_))));
        assert!(matches!(attachment.events.recv().await, Some(LiveEvent::ChatEnded(_))));
        assert!(attachment.events.recv().await.is_none());

        attachment.supervisor.await.unwrap();
        assert!(attachment.commands.is_closed());
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn quota_error_ends_the_session() {
        let chat = Arc::new(ScriptedChat::new(vec![Err(fake::quota_exceeded())]));
        let cancel = CancellationToken::new();
        let mut attachment = attach(&OneBroadcast, chat, &cancel, "v1").await.unwrap();

        let Some(LiveEvent::Error(error)) = attachment.events.recv().await else {
            panic!("expected an error first");
        };
        assert!(matches!(error.error, Error::Api(ref api) if api.reason() == Some("quotaExceeded")));
        assert!(matches!(attachment.events.recv().await, Some(LiveEvent::ChatEnded(_))));
        assert!(attachment.events.recv().await.is_none());
        attachment.supervisor.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn caller_cancellation_stops_both_tasks() {
        let chat = Arc::new(ScriptedChat::new(Vec::new()));
        let cancel = CancellationToken::new();
        let mut attachment = attach(&OneBroadcast, Arc::clone(&chat), &cancel, "v1")
            .await
            .unwrap();

        attachment
            .commands
            .send(BotCommand::send("hello"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(7)).await;
        cancel.cancel();

        attachment.supervisor.await.unwrap();
        assert!(attachment.events.recv().await.is_none());
        assert_eq!(chat.writes(), ["insert chat-1: hello"]);
        // immediately, then after 3s and 6s
        assert_eq!(chat.page_tokens().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_commands_leaves_the_poller_running() {
        let page = |id: &str, text: &str| {
            Ok(LiveChatMessageListResponse {
                items: vec![fake::text(id, text)],
                ..Default::default()
            })
        };
        let chat = Arc::new(ScriptedChat::new(vec![
            page("1", "one"),
            page("2", "two"),
            page("3", "three"),
        ]));
        let cancel = CancellationToken::new();
        let Attachment {
            mut events,
            commands,
            supervisor,
            ..
        } = attach(&OneBroadcast, Arc::clone(&chat), &cancel, "v1")
            .await
            .unwrap();
        drop(commands);

        for expected in ["one", "two", "three"] {
            let Some(LiveEvent::ChatMessage(message)) = events.recv().await else {
                panic!("expected {expected:?}");
            };
            assert_eq!(message.message, expected);
        }
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(chat.page_tokens().len() > 3);
        assert!(!supervisor.is_finished());
        assert!(!cancel.is_cancelled());

        cancel.cancel();
        supervisor.await.unwrap();
        assert!(events.recv().await.is_none());
        assert!(chat.writes().is_empty());
    }

    #[tokio::test]
    async fn missing_chat_fails_up_front() {
        let chat = Arc::new(ScriptedChat::new(Vec::new()));
        let cancel = CancellationToken::new();

        let err = attach(&OneBroadcast, Arc::clone(&chat), &cancel, "v2")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChatDisabled(ref id) if id == "v2"), "{err:?}");

        let err = attach(&OneBroadcast, Arc::clone(&chat), &cancel, "v3")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BroadcastNotFound(_)), "{err:?}");
        assert!(chat.page_tokens().is_empty());
    }
}
