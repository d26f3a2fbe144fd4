use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;

use super::shutdown;
use crate::auto_reply::{self, MessageRouter};
use crate::channels::{self, Channel, InboundMessage};
use crate::config::{Config, RuntimeConfig};
use crate::providers;
use crate::sessions;

/// Build every component from `config` and serve until a shutdown signal.
pub async fn run(config: &Config) -> Result<()> {
    config.validate()?;

    let api_key = config.api_key.as_deref();
    let provider: Arc<dyn providers::Provider> = Arc::from(providers::create_provider(
        config.provider_name(),
        api_key,
        config.default_model.as_deref(),
        config.default_temperature,
    )?);
    tracing::info!(provider = provider.name(), model = provider.model(), "provider ready");

    let sessions = sessions::create_session_store(provider);
    let pending = sessions::create_pending_action_store();
    let channel = channels::create_channel(config).await?;
    let router = auto_reply::create_router(sessions, pending, channel.bot_username());

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    tokio::spawn(async move {
        if let Err(e) = shutdown::wait_for_signal().await {
            tracing::error!(error = %e, "failed to listen for shutdown signals");
        }
        let _ = shutdown_tx.send(true);
    });

    tracing::info!("Bot started. Press Ctrl+C to stop.");
    serve(channel, router, &config.runtime, shutdown_rx).await
}

/// Pump messages from `channel` through `router` with bounded concurrency.
///
/// Each message is handled on its own task; at most `max_workers` run at once.
/// After shutdown, in-flight tasks get `shutdown_grace_secs` to finish before
/// they are aborted.
pub async fn serve(
    channel: Arc<dyn Channel>,
    router: Arc<MessageRouter>,
    runtime: &RuntimeConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<InboundMessage>(runtime.queue_capacity.max(1));

    let listener = {
        let channel = Arc::clone(&channel);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { channel.listen(tx, shutdown).await })
    };

    let semaphore = Arc::new(Semaphore::new(runtime.max_workers.max(1)));
    let mut workers = JoinSet::new();

    loop {
        while let Some(finished) = workers.try_join_next() {
            log_worker_exit(finished);
        }

        let permit = tokio::select! {
            permit = Arc::clone(&semaphore).acquire_owned() => {
                permit.context("worker semaphore closed")?
            }
            () = shutdown::requested(&mut shutdown) => break,
        };

        let message = tokio::select! {
            message = rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
            () = shutdown::requested(&mut shutdown) => break,
        };

        let channel = Arc::clone(&channel);
        let router = Arc::clone(&router);
        workers.spawn(async move {
            process_message(channel.as_ref(), &router, message).await;
            drop(permit);
        });
    }

    drop(rx);
    drain(&mut workers, Duration::from_secs(runtime.shutdown_grace_secs)).await;

    match listener.await {
        Ok(result) => result.context("channel listener failed"),
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(anyhow::anyhow!("channel listener panicked: {e}")),
    }
}

async fn process_message(channel: &dyn Channel, router: &MessageRouter, message: InboundMessage) {
    let chat_id = message.chat_id;
    match router.handle(&message).await {
        Ok(Some(reply)) => {
            if let Err(e) = channel.send(&reply).await {
                tracing::error!(%chat_id, channel = channel.name(), error = %e, "failed to send reply");
            }
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!(%chat_id, error = format!("{e:#}"), "an error occurred while handling update");
        }
    }
}

async fn drain(workers: &mut JoinSet<()>, grace: Duration) {
    if workers.is_empty() {
        return;
    }
    tracing::info!(in_flight = workers.len(), "waiting for in-flight messages");

    let finished = tokio::time::timeout(grace, async {
        while let Some(result) = workers.join_next().await {
            log_worker_exit(result);
        }
    })
    .await;

    if finished.is_err() {
        tracing::warn!(
            remaining = workers.len(),
            grace_secs = grace.as_secs(),
            "shutdown grace period elapsed, aborting workers"
        );
        workers.abort_all();
        while workers.join_next().await.is_some() {}
    }
}

fn log_worker_exit(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            tracing::error!(error = %e, "message worker panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{ChatKind, OutboundReply};
    use crate::sessions::conversation::tests::ScriptedProvider;
    use crate::sessions::{ChatId, InMemoryPendingActionStore, InMemorySessionStore, SessionStore};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::Ordering;

    /// Channel double that replays a fixed set of messages and records replies.
    struct MockChannel {
        inbound: Mutex<Vec<InboundMessage>>,
        sent: Mutex<Vec<OutboundReply>>,
        fail_send: bool,
    }

    impl MockChannel {
        fn new(inbound: Vec<InboundMessage>) -> Arc<Self> {
            Arc::new(Self {
                inbound: Mutex::new(inbound),
                sent: Mutex::new(Vec::new()),
                fail_send: false,
            })
        }
    }

    #[async_trait]
    impl Channel for MockChannel {
        fn name(&self) -> &str {
            "mock"
        }

        fn bot_username(&self) -> &str {
            "persona_bot"
        }

        async fn send(&self, reply: &OutboundReply) -> Result<()> {
            if self.fail_send {
                anyhow::bail!("network down");
            }
            self.sent.lock().push(reply.clone());
            Ok(())
        }

        async fn listen(
            &self,
            tx: mpsc::Sender<InboundMessage>,
            mut shutdown: watch::Receiver<bool>,
        ) -> Result<()> {
            let messages: Vec<InboundMessage> = self.inbound.lock().drain(..).collect();
            for message in messages {
                if tx.send(message).await.is_err() {
                    return Ok(());
                }
            }
            shutdown::requested(&mut shutdown).await;
            Ok(())
        }
    }

    fn private(chat: i64, text: &str) -> InboundMessage {
        InboundMessage {
            message_id: chat * 10,
            chat_id: ChatId(chat),
            chat_kind: ChatKind::Private,
            text: text.to_string(),
            reply_to: None,
            entities: Vec::new(),
        }
    }

    fn router(provider: Arc<ScriptedProvider>) -> Arc<MessageRouter> {
        Arc::new(MessageRouter::new(
            Arc::new(InMemorySessionStore::new(provider)),
            Arc::new(InMemoryPendingActionStore::new()),
            "persona_bot",
        ))
    }

    fn runtime() -> RuntimeConfig {
        RuntimeConfig {
            max_workers: 4,
            shutdown_grace_secs: 1,
            queue_capacity: 8,
        }
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn replies_to_every_chat_then_stops_on_shutdown() {
        let channel = MockChannel::new(vec![private(1, "/start"), private(2, "hi"), private(3, "yo")]);
        let router = router(ScriptedProvider::answering("hello"));
        let (shutdown_tx, shutdown_rx) = shutdown::channel();

        let dyn_channel: Arc<dyn Channel> = channel.clone();
        let runtime = runtime();
        let server = tokio::spawn(async move { serve(dyn_channel, router, &runtime, shutdown_rx).await });

        wait_until(|| channel.sent.lock().len() == 3).await;
        shutdown_tx.send(true).unwrap();
        server.await.unwrap().unwrap();

        let mut chats: Vec<i64> = channel.sent.lock().iter().map(|r| r.chat_id.0).collect();
        chats.sort_unstable();
        assert_eq!(chats, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn handler_errors_send_nothing_and_keep_serving() {
        let provider = ScriptedProvider::answering("unused");
        provider.fail.store(true, Ordering::SeqCst);
        let channel = MockChannel::new(vec![private(1, "hello"), private(2, "/start")]);
        let (shutdown_tx, shutdown_rx) = shutdown::channel();

        let dyn_channel: Arc<dyn Channel> = channel.clone();
        let router = router(provider.clone());
        let runtime = runtime();
        let server = tokio::spawn(async move { serve(dyn_channel, router, &runtime, shutdown_rx).await });

        wait_until(|| channel.sent.lock().len() == 1).await;
        wait_until(|| provider.requests.lock().len() == 1).await;
        shutdown_tx.send(true).unwrap();
        server.await.unwrap().unwrap();

        let sent = channel.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id, ChatId(2));
    }

    #[tokio::test]
    async fn send_failures_do_not_stop_the_loop() {
        let channel = Arc::new(MockChannel {
            inbound: Mutex::new(vec![private(1, "/start"), private(2, "/start")]),
            sent: Mutex::new(Vec::new()),
            fail_send: true,
        });
        let provider = ScriptedProvider::answering("unused");
        let sessions = Arc::new(InMemorySessionStore::new(provider));
        let router = Arc::new(MessageRouter::new(
            sessions.clone(),
            Arc::new(InMemoryPendingActionStore::new()),
            "persona_bot",
        ));
        let (shutdown_tx, shutdown_rx) = shutdown::channel();

        let dyn_channel: Arc<dyn Channel> = channel.clone();
        let runtime = runtime();
        let server = tokio::spawn(async move { serve(dyn_channel, router, &runtime, shutdown_rx).await });

        let store = Arc::clone(&sessions);
        tokio::time::timeout(Duration::from_secs(5), async move {
            loop {
                if store.len().await.unwrap() == 2 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("both commands should be handled");

        shutdown_tx.send(true).unwrap();
        server.await.unwrap().unwrap();
        assert!(channel.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn shutdown_before_any_message_returns_cleanly() {
        let channel = MockChannel::new(Vec::new());
        let (shutdown_tx, shutdown_rx) = shutdown::channel();
        shutdown_tx.send(true).unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            serve(channel, router(ScriptedProvider::answering("x")), &runtime(), shutdown_rx),
        )
        .await
        .expect("serve should return promptly");
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn listener_failure_is_reported() {
        struct BrokenChannel;

        #[async_trait]
        impl Channel for BrokenChannel {
            fn name(&self) -> &str {
                "broken"
            }
            fn bot_username(&self) -> &str {
                "persona_bot"
            }
            async fn send(&self, _reply: &OutboundReply) -> Result<()> {
                Ok(())
            }
            async fn listen(
                &self,
                _tx: mpsc::Sender<InboundMessage>,
                _shutdown: watch::Receiver<bool>,
            ) -> Result<()> {
                anyhow::bail!("webhook still set")
            }
        }

        let (_shutdown_tx, shutdown_rx) = shutdown::channel();
        let err = serve(
            Arc::new(BrokenChannel),
            router(ScriptedProvider::answering("x")),
            &runtime(),
            shutdown_rx,
        )
        .await
        .unwrap_err();
        assert!(format!("{err:#}").contains("webhook still set"));
    }
}
