//! MQTT listener for schema topics.

use crate::config::{parse_broker_url, qos_from_level, BackoffConfig, SchemaListenerConfig};
use crate::topics::{classify, SchemaEvent, TopicFilter};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How long `disconnect` waits for the event loop to flush.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Doubling reconnect delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Option<Duration>,
}

impl Backoff {
    /// Create a backoff starting at `config.initial`.
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            current: None,
        }
    }

    /// Delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let next = match self.current {
            None => self.config.initial,
            Some(current) => current.saturating_mul(2).min(self.config.max),
        };
        self.current = Some(next);
        next
    }

    /// Start over after a successful connection.
    pub fn reset(&mut self) {
        self.current = None;
    }
}

/// MQTT listener delivering schema events.
pub struct SchemaListener {
    client: AsyncClient,
    eventloop: EventLoop,
    config: SchemaListenerConfig,
    filter: TopicFilter,
    qos: QoS,
}

impl SchemaListener {
    /// Create a new listener. No connection is made until `start`.
    ///
    /// # Errors
    ///
    /// Returns error if the broker URL, client ID or QoS is invalid.
    pub fn new(config: SchemaListenerConfig) -> Result<Self, ListenerError> {
        let address = parse_broker_url(&config.broker_url)?;
        let qos = qos_from_level(config.qos)?;

        if config.client_id.is_empty() {
            return Err(ListenerError::InvalidClientId);
        }

        let mut mqtt_options = MqttOptions::new(&config.client_id, address.host, address.port);
        mqtt_options
            .set_keep_alive(config.keep_alive)
            .set_clean_session(config.clean_session);

        if config.has_credentials() {
            mqtt_options.set_credentials(&config.username, &config.password);
        }

        if address.tls {
            mqtt_options.set_transport(Transport::tls_with_default_config());
        }

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);
        eventloop
            .network_options
            .set_connection_timeout(config.connection_timeout.as_secs());

        let filter = TopicFilter::new(config.topic.clone());

        Ok(Self {
            client,
            eventloop,
            config,
            filter,
            qos,
        })
    }

    /// The topic filter this listener subscribes to.
    #[must_use]
    pub fn filter(&self) -> &TopicFilter {
        &self.filter
    }

    /// Queue the subscription to the schema topic.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be queued.
    pub async fn subscribe(&self) -> Result<(), ListenerError> {
        tracing::info!(
            broker = %self.config.broker_url,
            topic = %self.config.topic,
            qos = self.config.qos,
            "Subscribing to schema topic"
        );

        self.client
            .subscribe(self.filter.filter(), self.qos)
            .await
            .map_err(|e| ListenerError::Subscribe(e.to_string()))
    }

    /// Start the event loop.
    ///
    /// Returns a handle for shutdown and a channel of schema events.
    #[must_use]
    pub fn start(self) -> (ListenerHandle, mpsc::Receiver<SchemaEvent>) {
        let (tx, rx) = mpsc::channel(100);
        let connected = Arc::new(AtomicBool::new(false));
        let stopping = Arc::new(AtomicBool::new(false));

        let worker = EventLoopWorker {
            eventloop: self.eventloop,
            client: self.client.clone(),
            filter: self.filter.clone(),
            qos: self.qos,
            automatic_reconnect: self.config.automatic_reconnect,
            backoff: Backoff::new(self.config.backoff),
            connected: Arc::clone(&connected),
            stopping: Arc::clone(&stopping),
            tx,
        };
        let task = tokio::spawn(worker.run());

        let handle = ListenerHandle {
            client: self.client,
            topic: self.config.topic,
            connected,
            stopping,
            task,
        };

        (handle, rx)
    }
}

struct EventLoopWorker {
    eventloop: EventLoop,
    client: AsyncClient,
    filter: TopicFilter,
    qos: QoS,
    automatic_reconnect: bool,
    backoff: Backoff,
    connected: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
    tx: mpsc::Sender<SchemaEvent>,
}

impl EventLoopWorker {
    async fn run(mut self) {
        let mut first_connect = true;
        let mut outage_reported = false;

        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                    tracing::info!(
                        session_present = connack.session_present,
                        "Connected to MQTT broker"
                    );
                    self.connected.store(true, Ordering::SeqCst);
                    self.backoff.reset();
                    outage_reported = false;

                    // A clean session forgets subscriptions across reconnects.
                    if !first_connect && !connack.session_present {
                        if let Err(e) = self.client.try_subscribe(self.filter.filter(), self.qos) {
                            tracing::error!(error = %e, "Failed to resubscribe after reconnect");
                        }
                    }
                    first_connect = false;

                    if self.tx.send(SchemaEvent::Connected).await.is_err() {
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    tracing::info!(topic = %self.filter.filter(), "Subscription acknowledged");
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let payload_len = publish.payload.len();
                    tracing::debug!(topic = %publish.topic, payload_len, "Received MQTT message");

                    match classify(&self.filter, &publish.topic, &publish.payload) {
                        Ok(event) => {
                            log_event(&event, payload_len);
                            if self.tx.send(event).await.is_err() {
                                tracing::warn!("Event receiver dropped, stopping listener");
                                break;
                            }
                        }
                        Err(err) => {
                            tracing::warn!(
                                error = %err,
                                topic = %publish.topic,
                                payload_len,
                                "Ignoring MQTT message"
                            );
                        }
                    }
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) if self.stopping.load(Ordering::SeqCst) => {
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    self.connected.store(false, Ordering::SeqCst);
                    if self.stopping.load(Ordering::SeqCst) {
                        break;
                    }

                    if !outage_reported {
                        outage_reported = true;
                        tracing::warn!(error = %e, "MQTT connection lost");
                        let event = SchemaEvent::Disconnected {
                            reason: e.to_string(),
                        };
                        if self.tx.send(event).await.is_err() {
                            break;
                        }
                    }

                    if !self.automatic_reconnect {
                        tracing::info!("Automatic reconnect disabled, stopping listener");
                        break;
                    }

                    let delay = self.backoff.next_delay();
                    tracing::debug!(
                        error = %e,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Retrying MQTT connection"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        self.connected.store(false, Ordering::SeqCst);
    }
}

fn log_event(event: &SchemaEvent, payload_len: usize) {
    match event {
        SchemaEvent::Received {
            schema_name,
            content,
        } => {
            tracing::info!(schema = %schema_name, payload_len, "Received schema update");
            tracing::debug!(schema = %schema_name, content, "Schema content");
        }
        SchemaEvent::Deleted { schema_name } => {
            tracing::info!(schema = %schema_name, "Received delete signal for schema");
        }
        SchemaEvent::Connected | SchemaEvent::Disconnected { .. } => {}
    }
}

/// Handle to a running listener.
pub struct ListenerHandle {
    client: AsyncClient,
    topic: String,
    connected: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Whether the broker connection is currently up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    /// Unsubscribe, disconnect and stop the event loop.
    pub async fn disconnect(mut self) {
        self.stopping.store(true, Ordering::SeqCst);

        if self.connected.load(Ordering::SeqCst) {
            if let Err(e) = self.client.unsubscribe(&self.topic).await {
                tracing::warn!(error = %e, "Failed to unsubscribe");
            }
            if let Err(e) = self.client.disconnect().await {
                tracing::error!(error = %e, "Error disconnecting from MQTT broker");
            }
        }

        if tokio::time::timeout(DISCONNECT_GRACE, &mut self.task)
            .await
            .is_err()
        {
            self.task.abort();
        }

        self.connected.store(false, Ordering::SeqCst);
        tracing::info!("Disconnected from MQTT broker");
    }
}

/// Errors that can occur with the listener.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListenerError {
    /// Invalid broker URL
    #[error("invalid MQTT URL: {0}")]
    InvalidUrl(String),
    /// QoS outside 0..=2
    #[error("invalid MQTT QoS level: {0}")]
    InvalidQos(u8),
    /// Empty client ID
    #[error("MQTT client ID must not be empty")]
    InvalidClientId,
    /// Subscription failed
    #[error("subscription error: {0}")]
    Subscribe(String),
}
