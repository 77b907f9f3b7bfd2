use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use metrics::counter;
use tokio::sync::{watch, Notify};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use field_mapper::{map_payload, ChannelSpec, ChannelState, SwitchSpec, CHANNELS, SWITCHES};
use pandapwr_client::PandaPwrClient;
use types::{DeviceEndpoint, DevicePayload, Outlet, SwitchState};

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub poll_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
        }
    }
}

/// Last-known value of one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelValue {
    pub spec: &'static ChannelSpec,
    pub state: ChannelState,
    /// False whenever the most recent poll failed.
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchValue {
    pub spec: &'static SwitchSpec,
    /// `None` until the first poll or command.
    pub is_on: Option<bool>,
    pub available: bool,
}

/// Everything the host sees of one device after a poll.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub channels: Vec<ChannelValue>,
    pub switches: Vec<SwitchValue>,
    pub available: bool,
    pub polled_at_ms: Option<u64>,
}

impl DeviceSnapshot {
    /// State before the first poll: every value unknown and unavailable.
    pub fn initial() -> Self {
        Self {
            channels: CHANNELS
                .iter()
                .map(|spec| ChannelValue {
                    spec,
                    state: ChannelState::Unknown,
                    available: false,
                })
                .collect(),
            switches: SWITCHES
                .iter()
                .map(|spec| SwitchValue {
                    spec,
                    is_on: None,
                    available: false,
                })
                .collect(),
            available: false,
            polled_at_ms: None,
        }
    }

    /// Maps a poll result. An empty payload marks the whole device unavailable.
    pub fn from_payload(payload: &DevicePayload, polled_at_ms: u64) -> Self {
        let available = !payload.is_empty();
        Self {
            channels: map_payload(payload)
                .into_iter()
                .map(|(spec, state)| ChannelValue {
                    spec,
                    state,
                    available,
                })
                .collect(),
            switches: SWITCHES
                .iter()
                .map(|spec| SwitchValue {
                    spec,
                    is_on: Some(spec.is_on(payload)),
                    available,
                })
                .collect(),
            available,
            polled_at_ms: Some(polled_at_ms),
        }
    }

    pub fn channel(&self, key: &str) -> Option<&ChannelValue> {
        self.channels.iter().find(|value| value.spec.key == key)
    }

    pub fn switch(&self, key: &str) -> Option<&SwitchValue> {
        self.switches.iter().find(|value| value.spec.key == key)
    }

    fn set_switch(&mut self, outlet: Outlet, is_on: bool) {
        if let Some(value) = self
            .switches
            .iter_mut()
            .find(|value| value.spec.outlet == outlet)
        {
            value.is_on = Some(is_on);
        }
    }
}

/// Shared handle to one device: its client, published state and refresh signal.
#[derive(Debug, Clone)]
pub struct DeviceChannels {
    client: Arc<PandaPwrClient>,
    state: Arc<watch::Sender<DeviceSnapshot>>,
    refresh: Arc<Notify>,
}

impl DeviceChannels {
    pub fn new(client: PandaPwrClient) -> Self {
        let (state, _) = watch::channel(DeviceSnapshot::initial());
        Self {
            client: Arc::new(client),
            state: Arc::new(state),
            refresh: Arc::new(Notify::new()),
        }
    }

    pub fn endpoint(&self) -> &DeviceEndpoint {
        self.client.endpoint()
    }

    /// Fetches, maps and publishes one reading. Returns the resulting availability.
    pub async fn poll(&self) -> bool {
        let payload = self.client.get_data().await;
        let snapshot = DeviceSnapshot::from_payload(&payload, unix_ms());
        let available = snapshot.available;

        let outcome = if available { "ok" } else { "failed" };
        counter!("pandapwr_polls_total", "outcome" => outcome).increment(1);
        if available {
            debug!(ip = %self.endpoint(), fields = payload.len(), "poll succeeded");
        } else {
            warn!(ip = %self.endpoint(), "poll returned no data, channels unavailable");
        }

        self.state.send_replace(snapshot);
        available
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceSnapshot> {
        self.state.subscribe()
    }

    /// Asks the poll loop to poll now instead of waiting for the next tick.
    pub fn request_refresh(&self) {
        self.refresh.notify_one();
    }

    /// Sends a switch command and records the requested state without waiting for a poll.
    ///
    /// The switch shows the requested state even when the device rejected the
    /// command; the next poll corrects it. A poll already in flight when the
    /// command is sent publishes its older payload last, briefly restoring the
    /// previous state until the following poll.
    pub async fn set_switch(&self, outlet: Outlet, state: SwitchState) -> bool {
        let accepted = self.client.set_outlet(outlet, state).await;
        let outcome = if accepted { "ok" } else { "failed" };
        counter!("pandapwr_commands_total", "outlet" => outlet.form_key(), "outcome" => outcome)
            .increment(1);
        if !accepted {
            warn!(ip = %self.endpoint(), %outlet, value = state.as_u8(), "switch command rejected");
        }

        self.state
            .send_modify(|snapshot| snapshot.set_switch(outlet, state.is_on()));
        accepted
    }
}

/// Poll loop for one device.
pub struct PollerActor {
    channels: DeviceChannels,
    shutdown: watch::Receiver<bool>,
    config: PollerConfig,
}

impl PollerActor {
    pub fn new(channels: DeviceChannels, shutdown: watch::Receiver<bool>, config: PollerConfig) -> Self {
        Self {
            channels,
            shutdown,
            config,
        }
    }

    pub async fn run(mut self) {
        let refresh = self.channels.refresh.clone();
        let mut iteration = 0u64;

        loop {
            if *self.shutdown.borrow() {
                info!(ip = %self.channels.endpoint(), "poller shutdown requested");
                break;
            }

            tokio::select! {
                _ = sleep(self.config.poll_interval) => {},
                _ = refresh.notified() => {
                    debug!(ip = %self.channels.endpoint(), "refresh requested");
                },
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        info!(ip = %self.channels.endpoint(), "shutdown sender dropped, poller exiting");
                        break;
                    }
                    continue;
                }
            }

            let cycle_start = Instant::now();
            let available = self.channels.poll().await;
            iteration = iteration.wrapping_add(1);
            info!(
                ip = %self.channels.endpoint(),
                iteration,
                available,
                elapsed_ms = cycle_start.elapsed().as_millis(),
                "poll cycle complete"
            );
        }
    }
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
