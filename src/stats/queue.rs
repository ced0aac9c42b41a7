use anyhow::{anyhow, Context};
use async_nats::jetstream::consumer::pull;
use async_nats::jetstream::consumer::AckPolicy;
use async_nats::jetstream::{self, stream};
use bytes::Bytes;
use futures_util::StreamExt;
use std::time::Duration;
use tracing::{debug, info};

const RETENTION: Duration = Duration::from_secs(5 * 60 * 60);

#[derive(Clone)]
pub struct StatsQueue {
    context: jetstream::Context,
    stream_name: String,
    subject: String,
}

impl StatsQueue {
    pub async fn connect(url: &str, topic: &str) -> Result<Self, anyhow::Error> {
        let client = async_nats::connect(url)
            .await
            .with_context(|| format!("cannot connect to queue broker {url}"))?;

        Ok(StatsQueue {
            context: jetstream::new(client),
            stream_name: topic.to_string(),
            subject: format!("{topic}.records"),
        })
    }

    fn stream_config(&self) -> stream::Config {
        stream::Config {
            name: self.stream_name.clone(),
            subjects: vec![self.subject.clone()],
            max_age: RETENTION,
            retention: stream::RetentionPolicy::Limits,
            discard: stream::DiscardPolicy::Old,
            num_replicas: 1,
            ..Default::default()
        }
    }

    /// Creates the topic if it does not exist yet.
    pub async fn ensure_topic(&self) -> Result<(), anyhow::Error> {
        self.context
            .get_or_create_stream(self.stream_config())
            .await
            .map_err(|e| anyhow!("cannot ensure stream {}: {e}", self.stream_name))?;

        info!(stream = %self.stream_name, "queue topic ready");
        Ok(())
    }

    /// Publishes a batch, acked message by message.
    pub async fn publish_batch(&self, payloads: Vec<Vec<u8>>) -> Result<usize, anyhow::Error> {
        let count = payloads.len();

        for payload in payloads {
            let ack = self
                .context
                .publish(self.subject.clone(), Bytes::from(payload))
                .await
                .map_err(|e| anyhow!("cannot publish stats record: {e}"))?;
            ack.await
                .map_err(|e| anyhow!("queue did not ack stats record: {e}"))?;
        }

        debug!(count, "stats records published");
        Ok(count)
    }

    /// Messages currently retained on the topic.
    pub async fn pending_messages(&self) -> Result<u64, anyhow::Error> {
        let mut stream = self
            .context
            .get_or_create_stream(self.stream_config())
            .await
            .map_err(|e| anyhow!("cannot open stream {}: {e}", self.stream_name))?;

        let info = stream
            .info()
            .await
            .map_err(|e| anyhow!("cannot read stream info: {e}"))?;

        Ok(info.state.messages)
    }

    /// Durable batch consumer; the durable name plays the consumer-group
    /// role, and explicit acks play the committed offsets.
    pub async fn consumer(&self, group: &str) -> Result<StatsConsumer, anyhow::Error> {
        let stream = self
            .context
            .get_or_create_stream(self.stream_config())
            .await
            .map_err(|e| anyhow!("cannot open stream {}: {e}", self.stream_name))?;

        let consumer = stream
            .get_or_create_consumer(
                group,
                pull::Config {
                    durable_name: Some(group.to_string()),
                    ack_policy: AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| anyhow!("cannot create consumer {group}: {e}"))?;

        Ok(StatsConsumer { consumer })
    }
}

pub struct StatsConsumer {
    consumer: jetstream::consumer::Consumer<pull::Config>,
}

impl StatsConsumer {
    /// Fetches up to `batch` messages, waiting at most `wait` for the
    /// first. Unacked messages are redelivered after the ack window.
    pub async fn fetch(
        &self,
        batch: usize,
        wait: Duration,
    ) -> Result<Vec<jetstream::Message>, anyhow::Error> {
        let mut messages = self
            .consumer
            .fetch()
            .max_messages(batch)
            .expires(wait)
            .messages()
            .await
            .map_err(|e| anyhow!("cannot fetch from queue: {e}"))?;

        let mut out = Vec::with_capacity(batch);
        while let Some(message) = messages.next().await {
            out.push(message.map_err(|e| anyhow!("broken queue message: {e}"))?);
        }

        Ok(out)
    }
}

/// Acks one consumed message; the equivalent of committing its offset.
pub async fn ack(message: &jetstream::Message) -> Result<(), anyhow::Error> {
    message
        .ack()
        .await
        .map_err(|e| anyhow!("cannot ack queue message: {e}"))
}
