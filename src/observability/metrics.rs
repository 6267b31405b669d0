//! Thread-safe metrics collection system
//!
//! Atomic counters and mutex-protected collections for the command
//! dispatcher, refresh passes, the MQTT transport and the process lifecycle.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Refresh durations kept for percentile calculation
const MAX_REFRESH_SAMPLES: usize = 500;

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics and mutexes
pub struct MetricsCollector {
    commands_received: AtomicU64,
    commands_applied: AtomicU64,
    commands_dropped: AtomicU64,
    control_failures: AtomicU64,
    command_counts: Mutex<HashMap<String, u64>>,

    refresh_passes: AtomicU64,
    refresh_step_failures: AtomicU64,
    refresh_times: Mutex<Vec<u64>>, // in milliseconds
    last_refresh: AtomicU64,

    mqtt_connected: AtomicBool,
    connections_established: AtomicU64,
    connections_lost: AtomicU64,
    messages_published: AtomicU64,
    publish_failures: AtomicU64,
    messages_received: AtomicU64,
    connection_start_time: AtomicU64,

    bridge_state: Mutex<String>,
    uptime_start: AtomicU64,
    state_transitions: AtomicU64,
    restarts: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let now = current_timestamp();

        Self {
            commands_received: AtomicU64::new(0),
            commands_applied: AtomicU64::new(0),
            commands_dropped: AtomicU64::new(0),
            control_failures: AtomicU64::new(0),
            command_counts: Mutex::new(HashMap::new()),
            refresh_passes: AtomicU64::new(0),
            refresh_step_failures: AtomicU64::new(0),
            refresh_times: Mutex::new(Vec::new()),
            last_refresh: AtomicU64::new(0),
            mqtt_connected: AtomicBool::new(false),
            connections_established: AtomicU64::new(0),
            connections_lost: AtomicU64::new(0),
            messages_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            connection_start_time: AtomicU64::new(0),
            bridge_state: Mutex::new("initializing".to_string()),
            uptime_start: AtomicU64::new(now),
            state_transitions: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
        }
    }

    // Command dispatcher
    pub fn command_received(&self, entity: &str) {
        self.commands_received.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut counts) = self.command_counts.lock() {
            *counts.entry(entity.to_string()).or_insert(0) += 1;
        }
    }

    pub fn command_applied(&self) {
        self.commands_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_dropped(&self) {
        self.commands_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn control_failed(&self) {
        self.control_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Refresh loop
    pub fn refresh_completed(&self, duration: Duration, failed_steps: usize) {
        self.refresh_passes.fetch_add(1, Ordering::Relaxed);
        self.refresh_step_failures
            .fetch_add(failed_steps as u64, Ordering::Relaxed);
        self.last_refresh
            .store(current_timestamp(), Ordering::Relaxed);

        if let Ok(mut times) = self.refresh_times.lock() {
            times.push(duration.as_millis() as u64);
            if times.len() > MAX_REFRESH_SAMPLES {
                let excess = times.len() - MAX_REFRESH_SAMPLES;
                times.drain(..excess);
            }
        }
    }

    // MQTT transport
    pub fn mqtt_connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connected.store(true, Ordering::Relaxed);
        self.connection_start_time
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn mqtt_connection_lost(&self) {
        self.connections_lost.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connected.store(false, Ordering::Relaxed);
    }

    pub fn mqtt_disconnected(&self) {
        self.mqtt_connected.store(false, Ordering::Relaxed);
    }

    pub fn mqtt_message_published(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_mqtt_connected(&self) -> bool {
        self.mqtt_connected.load(Ordering::Relaxed)
    }

    // Lifecycle
    pub fn set_bridge_state(&self, state: &str) {
        if let Ok(mut current_state) = self.bridge_state.lock() {
            if *current_state != state {
                self.state_transitions.fetch_add(1, Ordering::Relaxed);
                *current_state = state.to_string();
            }
        }
    }

    pub fn bridge_restarted(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
    }

    /// Reset all metrics (useful for testing)
    pub fn reset(&self) {
        let now = current_timestamp();
        for counter in [
            &self.commands_received,
            &self.commands_applied,
            &self.commands_dropped,
            &self.control_failures,
            &self.refresh_passes,
            &self.refresh_step_failures,
            &self.last_refresh,
            &self.connections_established,
            &self.connections_lost,
            &self.messages_published,
            &self.publish_failures,
            &self.messages_received,
            &self.connection_start_time,
            &self.state_transitions,
            &self.restarts,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.mqtt_connected.store(false, Ordering::Relaxed);
        self.uptime_start.store(now, Ordering::Relaxed);

        if let Ok(mut counts) = self.command_counts.lock() {
            counts.clear();
        }
        if let Ok(mut times) = self.refresh_times.lock() {
            times.clear();
        }
        if let Ok(mut state) = self.bridge_state.lock() {
            *state = "initializing".to_string();
        }
    }

    /// Average and percentiles of recent refresh passes (pure function)
    fn calculate_refresh_time_statistics(&self) -> (f64, f64, f64) {
        let Ok(times) = self.refresh_times.lock() else {
            return (0.0, 0.0, 0.0);
        };
        if times.is_empty() {
            return (0.0, 0.0, 0.0);
        }

        let mut sorted_times = times.clone();
        sorted_times.sort_unstable();
        let avg = sorted_times.iter().sum::<u64>() as f64 / sorted_times.len() as f64;
        (
            avg,
            percentile(&sorted_times, 50.0),
            percentile(&sorted_times, 95.0),
        )
    }

    fn calculate_connection_duration(&self, now: u64) -> u64 {
        if self.mqtt_connected.load(Ordering::Relaxed) {
            now.saturating_sub(self.connection_start_time.load(Ordering::Relaxed))
        } else {
            0
        }
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg, p50, p95) = self.calculate_refresh_time_statistics();

        MetricsSnapshot {
            commands: CommandMetrics {
                received: self.commands_received.load(Ordering::Relaxed),
                applied: self.commands_applied.load(Ordering::Relaxed),
                dropped: self.commands_dropped.load(Ordering::Relaxed),
                control_failures: self.control_failures.load(Ordering::Relaxed),
                by_entity: self
                    .command_counts
                    .lock()
                    .map(|counts| counts.clone())
                    .unwrap_or_default(),
            },
            refresh: RefreshMetrics {
                passes: self.refresh_passes.load(Ordering::Relaxed),
                step_failures: self.refresh_step_failures.load(Ordering::Relaxed),
                avg_duration_ms: avg,
                duration_p50_ms: p50,
                duration_p95_ms: p95,
                last_refresh: self.last_refresh.load(Ordering::Relaxed),
            },
            mqtt: MqttMetrics {
                connected: self.mqtt_connected.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                connections_lost: self.connections_lost.load(Ordering::Relaxed),
                messages_published: self.messages_published.load(Ordering::Relaxed),
                publish_failures: self.publish_failures.load(Ordering::Relaxed),
                messages_received: self.messages_received.load(Ordering::Relaxed),
                connection_duration_seconds: self.calculate_connection_duration(now),
            },
            lifecycle: LifecycleMetrics {
                current_state: self
                    .bridge_state
                    .lock()
                    .map(|state| state.clone())
                    .unwrap_or_else(|_| "unknown".to_string()),
                uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
                state_transitions: self.state_transitions.load(Ordering::Relaxed),
                restarts: self.restarts.load(Ordering::Relaxed),
            },
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub commands: CommandMetrics,
    pub refresh: RefreshMetrics,
    pub mqtt: MqttMetrics,
    pub lifecycle: LifecycleMetrics,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct CommandMetrics {
    pub received: u64,
    pub applied: u64,
    pub dropped: u64,
    pub control_failures: u64,
    pub by_entity: HashMap<String, u64>,
}

#[derive(Debug, Serialize)]
pub struct RefreshMetrics {
    pub passes: u64,
    pub step_failures: u64,
    pub avg_duration_ms: f64,
    pub duration_p50_ms: f64,
    pub duration_p95_ms: f64,
    pub last_refresh: u64,
}

#[derive(Debug, Serialize)]
pub struct MqttMetrics {
    pub connected: bool,
    pub connections_established: u64,
    pub connections_lost: u64,
    pub messages_published: u64,
    pub publish_failures: u64,
    pub messages_received: u64,
    pub connection_duration_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct LifecycleMetrics {
    pub current_state: String,
    pub uptime_seconds: u64,
    pub state_transitions: u64,
    pub restarts: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let len = sorted_data.len();
    let index = (percentile / 100.0) * (len - 1) as f64;

    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower_value = sorted_data[index.floor() as usize] as f64;
        let upper_value = sorted_data[index.ceil() as usize] as f64;
        lower_value + (upper_value - lower_value) * index.fract()
    }
}
