//! Interface operational state.
//!
//! [`InterfaceStateUpdater`] keeps one [`InterfaceState`] per dataplane
//! interface and publishes every change, keyed by the interface's logical
//! name. It is fed by dataplane notifications (link events and counters),
//! by interface dumps, and by explicit deletions from the configurator.

use super::InterfaceRegistry;
use crate::{debug_log, info_log};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use vpp_dataplane::types::{
    CombinedCounterKind, CombinedCounters, DataplaneNotification, InterfaceDetails, InterfaceEvent,
    SimpleCounterKind, SimpleCounters,
};
use vpp_dataplane::SwIfIndex;
use vpp_types::MacAddress;

const SOURCE: &str = "InterfaceStateUpdater";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceStatus {
    Up,
    #[default]
    Down,
    Deleted,
}

impl InterfaceStatus {
    fn from_flag(up: bool) -> Self {
        if up {
            InterfaceStatus::Up
        } else {
            InterfaceStatus::Down
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Duplex {
    #[default]
    Unknown,
    Half,
    Full,
}

impl Duplex {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Duplex::Half,
            2 => Duplex::Full,
            _ => Duplex::Unknown,
        }
    }
}

/// Decodes the dataplane link-speed flags into bits per second.
pub fn link_speed_bps(flags: u8) -> u64 {
    match flags {
        1 => 10_000_000,
        2 => 100_000_000,
        4 => 1_000_000_000,
        8 => 10_000_000_000,
        16 => 40_000_000_000,
        32 => 100_000_000_000,
        _ => 0,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceStatistics {
    pub in_packets: u64,
    pub in_bytes: u64,
    pub out_packets: u64,
    pub out_bytes: u64,
    pub drop_packets: u64,
    pub punt_packets: u64,
    pub ipv4_packets: u64,
    pub ipv6_packets: u64,
    pub in_nobuf_packets: u64,
    pub in_miss_packets: u64,
    pub in_error_packets: u64,
    pub out_error_packets: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceState {
    pub name: String,
    pub internal_name: String,
    pub sw_if_index: SwIfIndex,
    pub admin_status: InterfaceStatus,
    pub oper_status: InterfaceStatus,
    pub phys_address: Option<MacAddress>,
    pub mtu: u32,
    /// Bits per second.
    pub speed: u64,
    pub duplex: Duplex,
    pub statistics: InterfaceStatistics,
    pub last_change: DateTime<Utc>,
}

impl InterfaceState {
    fn new(name: String, sw_if_index: SwIfIndex) -> Self {
        InterfaceState {
            name,
            internal_name: String::new(),
            sw_if_index,
            admin_status: InterfaceStatus::Down,
            oper_status: InterfaceStatus::Down,
            phys_address: None,
            mtu: 0,
            speed: 0,
            duplex: Duplex::Unknown,
            statistics: InterfaceStatistics::default(),
            last_change: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NotificationKind {
    UpDown,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceNotification {
    pub kind: NotificationKind,
    pub state: InterfaceState,
}

/// Receives interface state changes.
pub trait StatePublisher: Send + Sync {
    fn publish(&self, notification: InterfaceNotification);
}

/// Publisher that only logs the state.
#[derive(Debug, Default)]
pub struct LogStatePublisher;

impl StatePublisher for LogStatePublisher {
    fn publish(&self, notification: InterfaceNotification) {
        let state = &notification.state;
        info_log!(
            SOURCE,
            interface = %state.name,
            sw_if_index = state.sw_if_index,
            admin = ?state.admin_status,
            oper = ?state.oper_status,
            kind = ?notification.kind,
            "interface state"
        );
    }
}

pub struct InterfaceStateUpdater {
    registry: Arc<InterfaceRegistry>,
    publisher: Arc<dyn StatePublisher>,
    states: Mutex<HashMap<SwIfIndex, InterfaceState>>,
}

impl std::fmt::Debug for InterfaceStateUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfaceStateUpdater")
            .field("registry", &self.registry.title())
            .field("states_count", &self.lock().len())
            .finish()
    }
}

impl InterfaceStateUpdater {
    pub fn new(registry: Arc<InterfaceRegistry>, publisher: Arc<dyn StatePublisher>) -> Self {
        InterfaceStateUpdater {
            registry,
            publisher,
            states: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SwIfIndex, InterfaceState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `update` to the state of `sw_if_index` and returns a copy to
    /// publish. Unregistered handles are ignored.
    fn update<F>(&self, sw_if_index: SwIfIndex, update: F) -> Option<InterfaceState>
    where
        F: FnOnce(&mut InterfaceState),
    {
        let name = self.registry.name_of(sw_if_index)?;
        let mut states = self.lock();
        let state = states
            .entry(sw_if_index)
            .or_insert_with(|| InterfaceState::new(name.clone(), sw_if_index));
        state.name = name;
        update(state);
        Some(state.clone())
    }

    fn publish(&self, kind: NotificationKind, state: InterfaceState) {
        self.publisher.publish(InterfaceNotification { kind, state });
    }

    pub fn handle(&self, notification: DataplaneNotification) {
        match notification {
            DataplaneNotification::InterfaceEvent(event) => self.link_event(&event),
            DataplaneNotification::SimpleCounters(counters) => self.simple_counters(&counters),
            DataplaneNotification::CombinedCounters(counters) => self.combined_counters(&counters),
            DataplaneNotification::InterfaceDetails(details) => self.update_details(&details),
        }
    }

    pub fn link_event(&self, event: &InterfaceEvent) {
        if event.deleted {
            self.mark_deleted(event.sw_if_index);
            return;
        }
        let now = Utc::now();
        let updated = self.update(event.sw_if_index, |state| {
            state.admin_status = InterfaceStatus::from_flag(event.admin_up);
            state.oper_status = InterfaceStatus::from_flag(event.link_up);
            state.last_change = now;
        });
        match updated {
            Some(state) => self.publish(NotificationKind::UpDown, state),
            None => debug_log!(SOURCE, sw_if_index = event.sw_if_index, "link event for unknown interface"),
        }
    }

    pub fn update_details(&self, details: &InterfaceDetails) {
        let meta = &details.meta;
        let updated = self.update(meta.sw_if_index, |state| {
            state.internal_name = meta.internal_name.clone();
            state.admin_status = InterfaceStatus::from_flag(meta.admin_up);
            state.oper_status = InterfaceStatus::from_flag(meta.link_up);
            state.phys_address = meta.l2_address;
            state.mtu = meta.link_mtu;
            state.speed = link_speed_bps(meta.link_speed);
            state.duplex = Duplex::from_raw(meta.link_duplex);
        });
        if let Some(state) = updated {
            self.publish(NotificationKind::Unknown, state);
        }
    }

    pub fn simple_counters(&self, counters: &SimpleCounters) {
        for (offset, value) in counters.data.iter().enumerate() {
            let sw_if_index = counters.first_sw_if_index + offset as SwIfIndex;
            self.update(sw_if_index, |state| {
                let stats = &mut state.statistics;
                match counters.kind {
                    SimpleCounterKind::Drop => stats.drop_packets = *value,
                    SimpleCounterKind::Punt => stats.punt_packets = *value,
                    SimpleCounterKind::Ipv4 => stats.ipv4_packets = *value,
                    SimpleCounterKind::Ipv6 => stats.ipv6_packets = *value,
                    SimpleCounterKind::RxNoBuf => stats.in_nobuf_packets = *value,
                    SimpleCounterKind::RxMiss => stats.in_miss_packets = *value,
                    SimpleCounterKind::RxError => stats.in_error_packets = *value,
                    SimpleCounterKind::TxError => stats.out_error_packets = *value,
                    SimpleCounterKind::Mpls => {}
                }
            });
        }
    }

    /// Applies packet/byte counters. A tx batch closes a counter round and
    /// publishes every known state.
    pub fn combined_counters(&self, counters: &CombinedCounters) {
        for (offset, value) in counters.data.iter().enumerate() {
            let sw_if_index = counters.first_sw_if_index + offset as SwIfIndex;
            self.update(sw_if_index, |state| {
                let stats = &mut state.statistics;
                match counters.kind {
                    CombinedCounterKind::Rx => {
                        stats.in_packets = value.packets;
                        stats.in_bytes = value.bytes;
                    }
                    CombinedCounterKind::Tx => {
                        stats.out_packets = value.packets;
                        stats.out_bytes = value.bytes;
                    }
                }
            });
        }
        if counters.kind == CombinedCounterKind::Tx {
            for state in self.states() {
                self.publish(NotificationKind::Unknown, state);
            }
        }
    }

    /// Publishes a final `Deleted` state and forgets the interface.
    pub fn mark_deleted(&self, sw_if_index: SwIfIndex) {
        let removed = self.lock().remove(&sw_if_index);
        if let Some(mut state) = removed {
            state.admin_status = InterfaceStatus::Deleted;
            state.oper_status = InterfaceStatus::Deleted;
            state.last_change = Utc::now();
            self.publish(NotificationKind::UpDown, state);
        }
    }

    pub fn state(&self, sw_if_index: SwIfIndex) -> Option<InterfaceState> {
        self.lock().get(&sw_if_index).cloned()
    }

    /// All states, ordered by handle.
    pub fn states(&self) -> Vec<InterfaceState> {
        let mut states: Vec<InterfaceState> = self.lock().values().cloned().collect();
        states.sort_by_key(|state| state.sw_if_index);
        states
    }

    /// Consumes dataplane notifications until `shutdown` fires or every
    /// sender is gone.
    pub async fn run(
        self: Arc<Self>,
        mut notifications: mpsc::Receiver<DataplaneNotification>,
        shutdown: CancellationToken,
    ) {
        info_log!(SOURCE, "interface state watcher started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = notifications.recv() => match received {
                    Some(notification) => self.handle(notification),
                    None => break,
                },
            }
        }
        info_log!(SOURCE, "interface state watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vpp_dataplane::model::{Interface, InterfaceLink};
    use vpp_dataplane::types::{InterfaceMeta, PacketsBytes};

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<InterfaceNotification>>,
    }

    impl StatePublisher for RecordingPublisher {
        fn publish(&self, notification: InterfaceNotification) {
            self.published.lock().unwrap().push(notification);
        }
    }

    fn setup() -> (Arc<InterfaceStateUpdater>, Arc<RecordingPublisher>) {
        let registry = Arc::new(InterfaceRegistry::new("interfaces"));
        registry.register("tap1", 1, Interface::new("tap1", InterfaceLink::Loopback));
        registry.register("tap2", 2, Interface::new("tap2", InterfaceLink::Loopback));
        let publisher = Arc::new(RecordingPublisher::default());
        let updater = Arc::new(InterfaceStateUpdater::new(registry, publisher.clone()));
        (updater, publisher)
    }

    fn event(sw_if_index: SwIfIndex, up: bool, deleted: bool) -> InterfaceEvent {
        InterfaceEvent {
            sw_if_index,
            admin_up: up,
            link_up: up,
            deleted,
        }
    }

    #[test]
    fn test_speed_decoding() {
        assert_eq!(link_speed_bps(1), 10_000_000);
        assert_eq!(link_speed_bps(8), 10_000_000_000);
        assert_eq!(link_speed_bps(32), 100_000_000_000);
        assert_eq!(link_speed_bps(3), 0);
        assert_eq!(Duplex::from_raw(2), Duplex::Full);
    }

    #[test]
    fn test_link_event_publishes_by_name() {
        let (updater, publisher) = setup();
        updater.link_event(&event(1, true, false));

        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].kind, NotificationKind::UpDown);
        assert_eq!(published[0].state.name, "tap1");
        assert_eq!(published[0].state.oper_status, InterfaceStatus::Up);
    }

    #[test]
    fn test_unknown_handle_is_ignored() {
        let (updater, publisher) = setup();
        updater.link_event(&event(42, true, false));
        assert!(publisher.published.lock().unwrap().is_empty());
        assert!(updater.state(42).is_none());
    }

    #[test]
    fn test_details_fill_state() {
        let (updater, publisher) = setup();
        let details = InterfaceDetails {
            interface: Interface::new("tap2", InterfaceLink::Loopback),
            meta: InterfaceMeta {
                sw_if_index: 2,
                internal_name: "tap1".to_string(),
                admin_up: true,
                link_up: false,
                link_speed: 4,
                link_duplex: 2,
                link_mtu: 1500,
                ..Default::default()
            },
        };
        updater.handle(DataplaneNotification::InterfaceDetails(Box::new(details)));

        let state = updater.state(2).unwrap();
        assert_eq!(state.admin_status, InterfaceStatus::Up);
        assert_eq!(state.oper_status, InterfaceStatus::Down);
        assert_eq!(state.speed, 1_000_000_000);
        assert_eq!(state.duplex, Duplex::Full);
        assert_eq!(state.mtu, 1500);
        assert_eq!(publisher.published.lock().unwrap()[0].kind, NotificationKind::Unknown);
    }

    #[test]
    fn test_counters() {
        let (updater, publisher) = setup();
        updater.simple_counters(&SimpleCounters {
            kind: SimpleCounterKind::Drop,
            first_sw_if_index: 1,
            data: vec![5, 7, 9],
        });
        updater.combined_counters(&CombinedCounters {
            kind: CombinedCounterKind::Rx,
            first_sw_if_index: 1,
            data: vec![PacketsBytes { packets: 10, bytes: 1000 }],
        });
        assert!(publisher.published.lock().unwrap().is_empty());

        updater.combined_counters(&CombinedCounters {
            kind: CombinedCounterKind::Tx,
            first_sw_if_index: 2,
            data: vec![PacketsBytes { packets: 3, bytes: 300 }],
        });

        let tap1 = updater.state(1).unwrap();
        assert_eq!(tap1.statistics.drop_packets, 5);
        assert_eq!(tap1.statistics.in_packets, 10);
        let tap2 = updater.state(2).unwrap();
        assert_eq!(tap2.statistics.drop_packets, 7);
        assert_eq!(tap2.statistics.out_bytes, 300);
        assert_eq!(publisher.published.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_delete_publishes_deleted_state() {
        let (updater, publisher) = setup();
        updater.link_event(&event(1, true, false));
        updater.link_event(&event(1, false, true));

        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), 2);
        assert_eq!(published[1].state.admin_status, InterfaceStatus::Deleted);
        assert!(updater.state(1).is_none());
    }

    #[tokio::test]
    async fn test_run_until_cancelled() {
        let (updater, publisher) = setup();
        let (tx, rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(updater.clone().run(rx, shutdown.clone()));

        tx.send(DataplaneNotification::InterfaceEvent(event(2, true, false)))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        shutdown.cancel();
        task.await.unwrap();

        assert_eq!(publisher.published.lock().unwrap().len(), 1);
        assert_eq!(updater.state(2).unwrap().admin_status, InterfaceStatus::Up);
    }
}
