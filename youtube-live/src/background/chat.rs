//! Polls a live chat and turns its messages into [`LiveEvent`]s.

use crate::background::deliver;
use crate::error::Error;
use crate::events::{
    AuthorDetails, BanType, ChatEnded, ChatMessage, ErrorEvent, LiveEvent, MemberMilestone,
    MembershipGift, MembershipGiftReceived, SuperChat, SuperSticker, UserBanned,
};
use crate::transport::ChatTransport;
use crate::youtube_api::{ApiError, LiveChatMessage, LiveChatMessageDetails};
use jiff::Timestamp;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Used until the service suggests an interval of its own.
pub(crate) const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub(crate) enum TranslateError {
    #[error("unsupported message type {kind:?} (message {id})")]
    UnsupportedMessageType { kind: String, id: String },
    #[error("malformed chat message")]
    MalformedMessage(#[from] serde_json::Error),
}

fn micros_to_amount(micros: u64) -> f64 {
    micros as f64 / 1_000_000.0
}

/// Turns one raw chat item into an event.
pub(crate) fn translate(
    item: serde_json::Value,
    next_page_token: Option<&str>,
) -> Result<LiveEvent, TranslateError> {
    let kind = item
        .pointer("/snippet/type")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();
    let message = LiveChatMessage::from_value(item)?;

    let author = message.author_details.unwrap_or_default();
    let display_name = author.display_name.clone();
    let author_details = AuthorDetails::from(&author);
    let timestamp = message.snippet.published_at;
    let display_message = message.snippet.display_message;
    let next_page_token = next_page_token.map(String::from);

    let event = match message.snippet.details {
        LiveChatMessageDetails::TextMessage {
            text_message_details,
        } => LiveEvent::ChatMessage(ChatMessage {
            message: text_message_details.message_text,
            display_name,
            author: author_details,
            timestamp,
            next_page_token,
        }),
        LiveChatMessageDetails::SuperChat { super_chat_details } => LiveEvent::SuperChat(SuperChat {
            message: super_chat_details.user_comment,
            amount: micros_to_amount(super_chat_details.amount_micros),
            currency: super_chat_details.currency,
            display_name,
            author: author_details,
            timestamp,
            next_page_token,
        }),
        LiveChatMessageDetails::SuperSticker {
            super_sticker_details,
        } => LiveEvent::SuperSticker(SuperSticker {
            sticker_id: super_sticker_details.super_sticker_metadata.sticker_id,
            amount: micros_to_amount(super_sticker_details.amount_micros),
            currency: super_sticker_details.currency,
            display_name,
            author: author_details,
            timestamp,
            next_page_token,
        }),
        LiveChatMessageDetails::MemberMilestone {
            member_milestone_chat_details,
        } => LiveEvent::MemberMilestone(MemberMilestone {
            display_name,
            author: author_details,
            level: member_milestone_chat_details
                .member_level_name
                .to_lowercase(),
            months: member_milestone_chat_details.member_month,
            timestamp,
            next_page_token,
        }),
        LiveChatMessageDetails::MembershipGifting {
            membership_gifting_details,
        } => LiveEvent::MembershipGift(MembershipGift {
            display_name,
            author: author_details,
            total: membership_gifting_details.gift_memberships_count,
            tier: membership_gifting_details.gift_memberships_level_name,
            timestamp,
            next_page_token,
        }),
        LiveChatMessageDetails::GiftMembershipReceived {
            gift_membership_received_details,
        } => LiveEvent::MembershipGiftReceived(MembershipGiftReceived {
            display_text: display_message.unwrap_or_default(),
            level: gift_membership_received_details.member_level_name,
            gifter_id: gift_membership_received_details.gifter_channel_id,
            timestamp,
        }),
        LiveChatMessageDetails::UserBanned {
            user_banned_details,
        } => {
            let ban_type = BanType::from_provider(&user_banned_details.ban_type);
            let duration = match ban_type {
                BanType::Temporary => user_banned_details
                    .ban_duration_seconds
                    .map(Duration::from_secs),
                BanType::Permanent | BanType::Unknown => None,
            };
            LiveEvent::UserBanned(UserBanned {
                banned_user_id: user_banned_details.banned_user_details.channel_id,
                banned_user_display_name: user_banned_details.banned_user_details.display_name,
                ban_type,
                duration,
                moderator_id: message.snippet.author_channel_id,
                moderator_display_name: display_name,
                timestamp,
                next_page_token,
            })
        }
        LiveChatMessageDetails::ChatEnded => LiveEvent::ChatEnded(ChatEnded {
            timestamp,
            next_page_token,
        }),
        LiveChatMessageDetails::Unsupported => {
            tracing::warn!(
                kind,
                message_id = message.id,
                display = ?display_message,
                "unsupported message type"
            );
            return Err(TranslateError::UnsupportedMessageType {
                kind,
                id: message.id,
            });
        }
    };
    Ok(event)
}

/// A structured refusal from the service means the chat is not coming back.
fn is_session_ending(error: &eyre::Report) -> bool {
    error.downcast_ref::<ApiError>().is_some()
        || matches!(error.downcast_ref::<Error>(), Some(Error::Api(_)))
}

/// Polls `live_chat_id` until the chat ends, the consumer goes away, or `scope` is cancelled.
///
/// The first poll happens right away; after that the poller waits the interval the service
/// suggested on the previous page. On exit it cancels `scope` so the rest of the attachment
/// shuts down with it.
pub(crate) async fn poll_chat<T: ChatTransport>(
    transport: Arc<T>,
    live_chat_id: String,
    events: mpsc::Sender<LiveEvent>,
    scope: CancellationToken,
) {
    let mut page_token: Option<String> = None;
    let mut interval = DEFAULT_POLL_INTERVAL;
    let mut first_poll = true;

    'poll: loop {
        if !first_poll {
            tokio::select! {
                _ = scope.cancelled() => break 'poll,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        first_poll = false;

        let page = tokio::select! {
            _ = scope.cancelled() => break 'poll,
            page = transport.list_messages(&live_chat_id, page_token.as_deref()) => page,
        };

        let page = match page {
            Ok(page) => page,
            Err(e) if is_session_ending(&e) => {
                tracing::warn!(live_chat_id, error = %e, "live chat poll refused, ending session");
                deliver(&events, &scope, LiveEvent::Error(ErrorEvent::now(e))).await;
                let ended = ChatEnded {
                    timestamp: Timestamp::now(),
                    next_page_token: page_token.clone(),
                };
                deliver(&events, &scope, LiveEvent::ChatEnded(ended)).await;
                break 'poll;
            }
            Err(e) => {
                tracing::debug!(live_chat_id, error = %e, "live chat poll failed");
                if !deliver(&events, &scope, LiveEvent::Error(ErrorEvent::now(e))).await {
                    break 'poll;
                }
                continue 'poll;
            }
        };

        if let Some(next) = page.next_page_token {
            page_token = Some(next);
        }
        if let Some(millis) = page.polling_interval_millis.filter(|ms| *ms > 0) {
            interval = Duration::from_millis(millis);
        }

        for item in page.items {
            let event = match translate(item, page_token.as_deref()) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(live_chat_id, error = %e, "failed to parse chat message");
                    continue;
                }
            };
            let ended = event.is_chat_ended();
            if !deliver(&events, &scope, event).await {
                break 'poll;
            }
            if ended {
                tracing::info!(live_chat_id, "live chat ended");
                break 'poll;
            }
        }
    }

    scope.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::fake::{self, ScriptedChat};
    use crate::youtube_api::LiveChatMessageListResponse;
    use serde_json::json;
    use tracing_test::traced_test;

    fn kinds(events: &[LiveEvent]) -> Vec<&'static str> {
        events
            .iter()
            .map(|e| match e {
                LiveEvent::ChatMessage(_) => "chat",
                LiveEvent::SuperChat(_) => "superchat",
                LiveEvent::SuperSticker(_) => "sticker",
                LiveEvent::MemberMilestone(_) => "milestone",
                LiveEvent::MembershipGift(_) => "gift",
                LiveEvent::MembershipGiftReceived(_) => "giftreceived",
                LiveEvent::UserBanned(_) => "ban",
                LiveEvent::ChatEnded(_) => "end",
                LiveEvent::StreamEnd => "stream-end",
                LiveEvent::Error(_) => "error",
            })
            .collect()
    }

    async fn run(chat: ScriptedChat) -> (Vec<LiveEvent>, Arc<ScriptedChat>) {
        let chat = Arc::new(chat);
        let (tx, mut rx) = mpsc::channel(100);
        let scope = CancellationToken::new();
        let poller = tokio::spawn(poll_chat(Arc::clone(&chat), "chat-1".into(), tx, scope.clone()));

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        poller.await.unwrap();
        assert!(scope.is_cancelled());
        (events, chat)
    }

    #[test]
    fn super_chat_amount() {
        let event = translate(
            fake::message(
                "sc",
                "superChatEvent",
                "superChatDetails",
                json!({"amountMicros": "2500000", "currency": "USD", "amountDisplayString": "$2.50", "tier": 1}),
            ),
            Some("page-2"),
        )
        .unwrap();
        let LiveEvent::SuperChat(sc) = event else {
            panic!("expected super chat, got {event:?}");
        };
        assert_eq!(sc.amount, 2.50);
        assert_eq!(sc.currency, "USD");
        assert_eq!(sc.message, None);
        assert_eq!(sc.display_name, "Ferris");
        assert_eq!(sc.next_page_token.as_deref(), Some("page-2"));
    }

    #[test]
    fn super_sticker() {
        let event = translate(
            fake::message(
                "st",
                "superStickerEvent",
                "superStickerDetails",
                json!({
                    "amountMicros": "1000000",
                    "currency": "EUR",
                    "superStickerMetadata": {"stickerId": "crab_dance", "altText": "dancing crab", "language": "en"}
                }),
            ),
            None,
        )
        .unwrap();
        let LiveEvent::SuperSticker(st) = event else {
            panic!("expected super sticker, got {event:?}");
        };
        assert_eq!(st.sticker_id, "crab_dance");
        assert_eq!(st.amount, 1.0);
    }

    #[test]
    fn temporary_ban() {
        let event = translate(
            fake::message(
                "ban",
                "userBannedEvent",
                "userBannedDetails",
                json!({
                    "bannedUserDetails": {"channelId": "UCspam", "displayName": "spammer"},
                    "banType": "TEMPORARY",
                    "banDurationSeconds": "600"
                }),
            ),
            None,
        )
        .unwrap();
        let LiveEvent::UserBanned(ban) = event else {
            panic!("expected ban, got {event:?}");
        };
        assert_eq!(ban.ban_type.as_str(), "temporary");
        assert_eq!(ban.duration, Some(Duration::from_secs(10 * 60)));
        assert_eq!(ban.banned_user_id, "UCspam");
        assert_eq!(ban.moderator_id, "UCferris");
        assert_eq!(ban.moderator_display_name, "Ferris");
    }

    #[test]
    fn permanent_ban_has_no_duration() {
        let event = translate(
            fake::message(
                "ban",
                "userBannedEvent",
                "userBannedDetails",
                json!({
                    "bannedUserDetails": {"channelId": "UCspam"},
                    "banType": "permanent",
                    "banDurationSeconds": "600"
                }),
            ),
            None,
        )
        .unwrap();
        let LiveEvent::UserBanned(ban) = event else {
            panic!("expected ban, got {event:?}");
        };
        assert_eq!(ban.ban_type, BanType::Permanent);
        assert_eq!(ban.duration, None);
    }

    #[test]
    fn milestone_level_is_lowercased() {
        let event = translate(
            fake::message(
                "ms",
                "memberMilestoneChatEvent",
                "memberMilestoneChatDetails",
                json!({"memberLevelName": "Crab Club", "memberMonth": 0}),
            ),
            None,
        )
        .unwrap();
        let LiveEvent::MemberMilestone(ms) = event else {
            panic!("expected milestone, got {event:?}");
        };
        assert_eq!(ms.level, "crab club");
        assert_eq!(ms.months, 0);
    }

    #[test]
    fn gifts() {
        let event = translate(
            fake::message(
                "g",
                "membershipGiftingEvent",
                "membershipGiftingDetails",
                json!({"giftMembershipsCount": 5, "giftMembershipsLevelName": "Crab Club"}),
            ),
            None,
        )
        .unwrap();
        let LiveEvent::MembershipGift(gift) = event else {
            panic!("expected gift, got {event:?}");
        };
        assert_eq!((gift.total, gift.tier.as_str()), (5, "Crab Club"));

        let mut received = fake::message(
            "gr",
            "giftMembershipReceivedEvent",
            "giftMembershipReceivedDetails",
            json!({"memberLevelName": "Crab Club", "gifterChannelId": "UCgifter", "associatedMembershipGiftingMessageId": "g"}),
        );
        received["snippet"]["displayMessage"] = json!("Ferris received a gift membership");
        let LiveEvent::MembershipGiftReceived(r) = translate(received, None).unwrap() else {
            panic!("expected gift received");
        };
        assert_eq!(r.display_text, "Ferris received a gift membership");
        assert_eq!(r.gifter_id, "UCgifter");
    }

    #[test]
    fn known_kind_without_details_is_malformed() {
        let mut item = fake::text("t", "hello");
        item["snippet"]
            .as_object_mut()
            .unwrap()
            .remove("textMessageDetails");
        assert!(matches!(
            translate(item, None),
            Err(TranslateError::MalformedMessage(_))
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn unsupported_items_are_skipped_in_order() {
        let page = LiveChatMessageListResponse {
            items: vec![
                fake::text("1", "first"),
                fake::message("2", "pollEvent", "pollDetails", json!({})),
                fake::text("3", "third"),
                fake::chat_ended("4"),
            ],
            next_page_token: Some("t1".into()),
            ..Default::default()
        };
        let (events, _) = run(ScriptedChat::new(vec![Ok(page)])).await;

        assert_eq!(kinds(&events), ["chat", "chat", "end"]);
        let texts: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                LiveEvent::ChatMessage(m) => Some(m.message.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, ["first", "third"]);
        assert!(logs_contain("pollEvent"));
    }

    #[tokio::test(start_paused = true)]
    async fn structured_error_ends_the_session() {
        let chat = ScriptedChat::new(vec![Err(fake::quota_exceeded())]);
        let (events, chat) = run(chat).await;

        assert_eq!(kinds(&events), ["error", "end"]);
        let LiveEvent::Error(error) = &events[0] else {
            unreachable!()
        };
        assert!(matches!(error.error, Error::Api(ref api) if api.code == 403));
        assert_eq!(chat.page_tokens(), [None]);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_keep_polling() {
        let start = tokio::time::Instant::now();
        let chat = ScriptedChat::new(vec![
            Err(eyre::eyre!("connection reset")),
            Ok(LiveChatMessageListResponse {
                items: vec![fake::text("1", "still here")],
                next_page_token: Some("t1".into()),
                polling_interval_millis: Some(5000),
                ..Default::default()
            }),
            Ok(LiveChatMessageListResponse {
                items: vec![fake::chat_ended("2")],
                ..Default::default()
            }),
        ]);
        let (events, chat) = run(chat).await;

        assert_eq!(kinds(&events), ["error", "chat", "end"]);
        assert_eq!(chat.page_tokens(), [None, None, Some("t1".to_string())]);
        // default interval after the error, then the suggested one
        assert!(start.elapsed() >= Duration::from_secs(3 + 5));
    }

    #[tokio::test(start_paused = true)]
    async fn cursor_is_kept_when_omitted() {
        let chat = ScriptedChat::new(vec![
            Ok(LiveChatMessageListResponse {
                next_page_token: Some("a".into()),
                ..Default::default()
            }),
            Ok(LiveChatMessageListResponse::default()),
            Ok(LiveChatMessageListResponse {
                items: vec![fake::chat_ended("x")],
                polling_interval_millis: Some(0),
                ..Default::default()
            }),
        ]);
        let (events, chat) = run(chat).await;

        assert_eq!(kinds(&events), ["end"]);
        assert_eq!(
            chat.page_tokens(),
            [None, Some("a".to_string()), Some("a".to_string())]
        );
        let LiveEvent::ChatEnded(ended) = &events[0] else {
            unreachable!()
        };
        assert_eq!(ended.next_page_token.as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_polling() {
        let chat = Arc::new(ScriptedChat::new(Vec::new()));
        let (tx, mut rx) = mpsc::channel(100);
        let scope = CancellationToken::new();
        let poller = tokio::spawn(poll_chat(Arc::clone(&chat), "chat-1".into(), tx, scope.clone()));

        tokio::time::sleep(Duration::from_secs(10)).await;
        scope.cancel();
        poller.await.unwrap();
        assert!(rx.recv().await.is_none());
        assert!(!chat.page_tokens().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_delivery_is_abandoned_on_cancel() {
        let chat = Arc::new(ScriptedChat::new(vec![Ok(LiveChatMessageListResponse {
            items: vec![fake::text("1", "a"), fake::text("2", "b")],
            ..Default::default()
        })]));
        // room for one event; nobody reads
        let (tx, mut rx) = mpsc::channel(1);
        let scope = CancellationToken::new();
        let poller = tokio::spawn(poll_chat(chat, "chat-1".into(), tx, scope.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!poller.is_finished());
        scope.cancel();
        poller.await.unwrap();

        assert!(matches!(rx.recv().await, Some(LiveEvent::ChatMessage(_))));
        assert!(rx.recv().await.is_none());
    }
}
