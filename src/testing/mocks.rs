//! Mock implementations for testing
//!
//! Provides a recording transport and a recording control API so the bridge
//! can be exercised without a broker or a Wallpaper Engine installation.
//! Both are cheap to clone; clones share their recorded history.

use crate::control::{
    ControlError, ControlResult, CurrentWallpaper, DesktopControl, PlaybackControl,
    ProfileControl, WallpaperEntry, WallpaperLibrary,
};
use crate::error::BridgeError;
use crate::transport::{mqtt::ConnectionState, Transport, TransportEvent};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// One recorded publish
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl PublishedMessage {
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Mock transport for testing
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    published: Arc<Mutex<Vec<PublishedMessage>>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    event_sender: Arc<Mutex<Option<mpsc::Sender<TransportEvent>>>>,
    connected: Arc<AtomicBool>,
    fail_connect: Arc<AtomicBool>,
    fail_publish: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connect_failure(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_publish_failure(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn published_messages(&self) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .map(|published| published.clone())
            .unwrap_or_default()
    }

    /// Payloads published to one topic, oldest first
    pub fn published_to(&self, topic: &str) -> Vec<String> {
        self.published_messages()
            .into_iter()
            .filter(|message| message.topic == topic)
            .map(|message| message.payload_text())
            .collect()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .map(|subscriptions| subscriptions.clone())
            .unwrap_or_default()
    }

    pub fn clear_history(&self) {
        if let Ok(mut published) = self.published.lock() {
            published.clear();
        }
        if let Ok(mut subscriptions) = self.subscriptions.lock() {
            subscriptions.clear();
        }
    }

    /// Deliver an event as if it came from the broker
    pub async fn inject(&self, event: TransportEvent) -> bool {
        let sender = self
            .event_sender
            .lock()
            .ok()
            .and_then(|sender| sender.clone());
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = BridgeError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(BridgeError::internal("Mock connection failure"));
        }
        self.connected.store(true, Ordering::SeqCst);
        self.inject(TransportEvent::Connected).await;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), Self::Error> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(BridgeError::internal("Mock publish failure"));
        }
        if let Ok(mut published) = self.published.lock() {
            published.push(PublishedMessage {
                topic: topic.to_string(),
                payload,
                retain,
            });
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), Self::Error> {
        if let Ok(mut subscriptions) = self.subscriptions.lock() {
            subscriptions.push(topic.to_string());
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        if self.is_connected() {
            Some(ConnectionState::Connected)
        } else {
            Some(ConnectionState::Disconnected("Mock disconnection".to_string()))
        }
    }

    fn is_permanently_disconnected(&self) -> bool {
        false
    }

    fn set_event_sender(&self, sender: mpsc::Sender<TransportEvent>) {
        if let Ok(mut event_sender) = self.event_sender.lock() {
            *event_sender = Some(sender);
        }
    }
}

/// A control API call as seen by [`MockControl`]
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCall {
    ShowIcons,
    HideIcons,
    Mute,
    Unmute,
    Play,
    Pause,
    Stop,
    ListWallpapers,
    CurrentWallpaper,
    OpenWallpaper { id: String, monitor: Option<u32> },
    ApplyProperties(Map<String, Value>),
    ListProfiles,
    OpenProfile(String),
}

impl ControlCall {
    /// Method name, as accepted by [`MockControl::fail_on`]
    pub fn method(&self) -> &'static str {
        match self {
            ControlCall::ShowIcons => "show_icons",
            ControlCall::HideIcons => "hide_icons",
            ControlCall::Mute => "mute",
            ControlCall::Unmute => "unmute",
            ControlCall::Play => "play",
            ControlCall::Pause => "pause",
            ControlCall::Stop => "stop",
            ControlCall::ListWallpapers => "list_wallpapers",
            ControlCall::CurrentWallpaper => "current_wallpaper",
            ControlCall::OpenWallpaper { .. } => "open_wallpaper",
            ControlCall::ApplyProperties(_) => "apply_properties",
            ControlCall::ListProfiles => "list_profiles",
            ControlCall::OpenProfile(_) => "open_profile",
        }
    }
}

#[derive(Debug, Default)]
struct MockControlState {
    calls: Vec<ControlCall>,
    wallpapers: Vec<WallpaperEntry>,
    profiles: Vec<String>,
    current: Option<CurrentWallpaper>,
    failing: HashSet<&'static str>,
}

/// Mock control API for testing
///
/// Every call is recorded, including calls configured to fail.
#[derive(Debug, Clone, Default)]
pub struct MockControl {
    state: Arc<Mutex<MockControlState>>,
}

impl MockControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_wallpapers(&self, wallpapers: Vec<WallpaperEntry>) {
        if let Ok(mut state) = self.state.lock() {
            state.wallpapers = wallpapers;
        }
    }

    pub fn set_profiles(&self, profiles: Vec<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.profiles = profiles;
        }
    }

    pub fn set_current(&self, current: CurrentWallpaper) {
        if let Ok(mut state) = self.state.lock() {
            state.current = Some(current);
        }
    }

    /// Make every later call of `method` fail
    pub fn fail_on(&self, method: &'static str) {
        if let Ok(mut state) = self.state.lock() {
            state.failing.insert(method);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.failing.clear();
        }
    }

    pub fn calls(&self) -> Vec<ControlCall> {
        self.state
            .lock()
            .map(|state| state.calls.clone())
            .unwrap_or_default()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.calls.clear();
        }
    }

    fn record(&self, call: ControlCall) -> ControlResult<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ControlError::Other("mock state poisoned".to_string()))?;
        let method = call.method();
        state.calls.push(call);
        if state.failing.contains(method) {
            return Err(ControlError::Other(format!("mock {method} failure")));
        }
        Ok(())
    }

    fn read<R>(&self, call: ControlCall, read: impl FnOnce(&MockControlState) -> R) -> ControlResult<R> {
        self.record(call)?;
        let state = self
            .state
            .lock()
            .map_err(|_| ControlError::Other("mock state poisoned".to_string()))?;
        Ok(read(&state))
    }
}

#[async_trait]
impl DesktopControl for MockControl {
    async fn show_icons(&self) -> ControlResult<()> {
        self.record(ControlCall::ShowIcons)
    }

    async fn hide_icons(&self) -> ControlResult<()> {
        self.record(ControlCall::HideIcons)
    }
}

#[async_trait]
impl PlaybackControl for MockControl {
    async fn mute(&self) -> ControlResult<()> {
        self.record(ControlCall::Mute)
    }

    async fn unmute(&self) -> ControlResult<()> {
        self.record(ControlCall::Unmute)
    }

    async fn play(&self) -> ControlResult<()> {
        self.record(ControlCall::Play)
    }

    async fn pause(&self) -> ControlResult<()> {
        self.record(ControlCall::Pause)
    }

    async fn stop(&self) -> ControlResult<()> {
        self.record(ControlCall::Stop)
    }
}

#[async_trait]
impl WallpaperLibrary for MockControl {
    async fn list_wallpapers(&self) -> ControlResult<Vec<WallpaperEntry>> {
        self.read(ControlCall::ListWallpapers, |state| state.wallpapers.clone())
    }

    async fn current_wallpaper(&self) -> ControlResult<CurrentWallpaper> {
        self.read(ControlCall::CurrentWallpaper, |state| state.current.clone())?
            .ok_or(ControlError::NoActiveWallpaper)
    }

    async fn open_wallpaper(
        &self,
        entry: &WallpaperEntry,
        monitor: Option<u32>,
    ) -> ControlResult<()> {
        self.record(ControlCall::OpenWallpaper {
            id: entry.id.clone(),
            monitor,
        })
    }

    async fn apply_properties(&self, properties: &Map<String, Value>) -> ControlResult<()> {
        self.record(ControlCall::ApplyProperties(properties.clone()))
    }
}

#[async_trait]
impl ProfileControl for MockControl {
    async fn list_profiles(&self) -> ControlResult<Vec<String>> {
        self.read(ControlCall::ListProfiles, |state| state.profiles.clone())
    }

    async fn open_profile(&self, name: &str) -> ControlResult<()> {
        self.record(ControlCall::OpenProfile(name.to_string()))
    }
}
