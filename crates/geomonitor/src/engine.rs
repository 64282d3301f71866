//! The monitoring engine
//!
//! In-process stand-in for the platform geofence daemon: it owns the set of
//! monitored regions, evaluates submitted position fixes against them, and
//! fans resulting events out to every open service handle's queue. The
//! [`crate::RegionStore`] and [`crate::GeomonitorService`] are both clients
//! of this engine; each call into it is one synchronous request/response.

use super::error::{GeoError, GeoResult};
use super::region::{now_epoch, EventType, GeoLocation, MonitoringMode, Region, Shape};
use super::service::Event;
use log::{debug, warn};
use std::collections::{HashMap, VecDeque};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Query replies are bounded: an unbounded result set from a background
/// geofence daemon is a resource-exhaustion risk.
pub const MAX_SEARCH_RESULTS: usize = 64;

/// Upper bound on simultaneously monitored regions per application
pub const MAX_MONITORED_REGIONS: usize = 512;

/// Per-service-handle event queue, signaled through a condvar for blocking
/// consumers and through a self-pipe byte for `select()` loops.
pub(crate) struct EventQueue {
    pub(crate) id: u64,
    pub(crate) events: Mutex<VecDeque<Event>>,
    pub(crate) cond: Condvar,
    write_fd: RawFd,
}

impl EventQueue {
    fn push(&self, event: Event) {
        self.events.lock().unwrap().push_back(event);
        self.cond.notify_one();
        let byte = [1u8];
        // Non-blocking pipe; a full pipe only drops the wakeup byte, the
        // event itself stays queued
        let rc = unsafe { libc::write(self.write_fd, byte.as_ptr() as *const libc::c_void, 1) };
        if rc < 0 {
            warn!("event queue {} wakeup write failed", self.id);
        }
    }

    pub(crate) fn wake(&self) {
        self.cond.notify_all();
    }
}

struct Monitored {
    region: Region,
    /// Whether the last evaluated fix fell inside the region
    inside: bool,
}

struct EngineState {
    regions: HashMap<String, Monitored>,
    queues: Vec<Arc<EventQueue>>,
    /// Open service handles of this application; TRANSIENT regions live
    /// only while this is non-zero
    open_handles: usize,
    next_queue_id: u64,
    last_position: Option<GeoLocation>,
}

/// The region-monitoring authority for one application
pub struct GeomonitorEngine {
    state: Mutex<EngineState>,
    services_enabled: AtomicBool,
}

impl GeomonitorEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(EngineState {
                regions: HashMap::new(),
                queues: Vec::new(),
                open_handles: 0,
                next_queue_id: 0,
                last_position: None,
            }),
            services_enabled: AtomicBool::new(true),
        })
    }

    pub(crate) fn services_enabled(&self) -> bool {
        self.services_enabled.load(Ordering::SeqCst)
    }

    // ---- region registration (requests from the store) ----------------

    pub(crate) fn add(&self, region: &Region) -> GeoResult<()> {
        if matches!(region.shape(), Shape::None) {
            return Err(GeoError::InvalidRegionShape);
        }
        let mut state = self.state.lock().unwrap();
        purge_expired(&mut state);

        if state.regions.contains_key(region.name()) {
            return Err(GeoError::RegionAlreadyAdded);
        }
        if state.regions.len() >= MAX_MONITORED_REGIONS {
            return Err(GeoError::RegionLimitExceeded);
        }
        if region.monitoring_mode() == MonitoringMode::Transient && state.open_handles == 0 {
            return Err(GeoError::NotificationsReceiverNotAdded);
        }

        debug!("monitoring region {}", region);
        state.regions.insert(
            region.name().to_string(),
            Monitored {
                region: region.clone(),
                inside: false,
            },
        );
        Ok(())
    }

    pub(crate) fn remove(&self, name: &str) -> GeoResult<()> {
        let mut state = self.state.lock().unwrap();
        purge_expired(&mut state);
        if state.regions.remove(name).is_none() {
            return Err(GeoError::RegionNotFound);
        }
        debug!("stopped monitoring region {}", name);
        Ok(())
    }

    pub(crate) fn remove_all(&self) {
        let mut state = self.state.lock().unwrap();
        state.regions.clear();
    }

    // ---- queries -------------------------------------------------------

    pub(crate) fn find(&self, name: &str) -> GeoResult<Region> {
        let mut state = self.state.lock().unwrap();
        purge_expired(&mut state);
        state
            .regions
            .get(name)
            .map(|m| m.region.clone())
            .ok_or(GeoError::RegionNotFound)
    }

    pub(crate) fn find_all(&self) -> Vec<String> {
        let mut state = self.state.lock().unwrap();
        purge_expired(&mut state);
        let mut names: Vec<String> = state.regions.keys().cloned().collect();
        names.sort();
        names.truncate(MAX_SEARCH_RESULTS);
        names
    }

    /// Regions whose circle comes within `radius` meters of the point,
    /// nearest center first, capped at [`MAX_SEARCH_RESULTS`].
    pub(crate) fn search_by_location(
        &self,
        latitude: f64,
        longitude: f64,
        radius: f64,
    ) -> GeoResult<Vec<String>> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(GeoError::InvalidRadius);
        }
        GeoLocation::new(latitude, longitude, 0.0, 0)?;

        let mut state = self.state.lock().unwrap();
        purge_expired(&mut state);
        let mut hits: Vec<(f64, String)> = state
            .regions
            .values()
            .filter_map(|m| {
                let dist = m.region.center_distance(latitude, longitude)?;
                let reach = match m.region.shape() {
                    Shape::Circle { radius: r, .. } => r,
                    Shape::None => 0.0,
                };
                if dist <= radius + reach {
                    Some((dist, m.region.name().to_string()))
                } else {
                    None
                }
            })
            .collect();
        hits.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(MAX_SEARCH_RESULTS);
        Ok(hits.into_iter().map(|(_, name)| name).collect())
    }

    /// Like [`Self::search_by_location`], centered on the last submitted fix.
    pub(crate) fn search_nearby(&self, radius: f64) -> GeoResult<Vec<String>> {
        let last = {
            let state = self.state.lock().unwrap();
            state.last_position
        };
        match last {
            Some(fix) => self.search_by_location(fix.latitude, fix.longitude, radius),
            None => Err(GeoError::InvalidLocation),
        }
    }

    /// Region names matching a mask; `*` matches any run of characters.
    pub(crate) fn search_by_name(&self, mask: &str) -> Vec<String> {
        let mut state = self.state.lock().unwrap();
        purge_expired(&mut state);
        let mut names: Vec<String> = state
            .regions
            .keys()
            .filter(|name| glob_match(mask, name))
            .cloned()
            .collect();
        names.sort();
        names.truncate(MAX_SEARCH_RESULTS);
        names
    }

    // ---- position evaluation (the platform positioning side) -----------

    /// Feed a position fix into the engine. Enter/exit transitions are
    /// detected per region and delivered to every open service handle.
    pub fn submit_position(&self, fix: GeoLocation) -> GeoResult<()> {
        if !fix.valid {
            return Err(GeoError::InvalidLocation);
        }
        let mut state = self.state.lock().unwrap();
        state.last_position = Some(fix);
        purge_expired(&mut state);

        let mut fired: Vec<(String, EventType, Region)> = Vec::new();
        for monitored in state.regions.values_mut() {
            let inside_now = monitored.region.contains(fix.latitude, fix.longitude);
            let event = match (monitored.inside, inside_now) {
                (false, true) => Some(EventType::Enter),
                (true, false) => Some(EventType::Exit),
                _ => None,
            };
            monitored.inside = inside_now;
            if let Some(event) = event {
                fired.push((
                    monitored.region.name().to_string(),
                    event,
                    monitored.region.clone(),
                ));
            }
        }

        for (name, event, region) in fired {
            debug!("region {} fired {:?}", name, event);
            deliver(&state.queues, event, region.clone(), fix);
            if region.stop_monitoring_event() == event {
                state.regions.remove(&name);
            }
        }
        Ok(())
    }

    /// Toggle the availability of the underlying location services.
    /// Disabling delivers an out-of-service event for every monitored
    /// region and wakes blocked waiters so they observe the outage.
    pub fn set_location_services(&self, enabled: bool) {
        self.services_enabled.store(enabled, Ordering::SeqCst);
        if enabled {
            return;
        }
        let mut state = self.state.lock().unwrap();
        let snapshots: Vec<Region> = state.regions.values().map(|m| m.region.clone()).collect();
        for region in snapshots {
            deliver(
                &state.queues,
                EventType::OutOfService,
                region.clone(),
                GeoLocation::invalid(),
            );
            if region.stop_monitoring_event() == EventType::OutOfService {
                state.regions.remove(region.name());
            }
        }
        for queue in &state.queues {
            queue.wake();
        }
    }

    // ---- service handle lifecycle --------------------------------------

    pub(crate) fn attach_queue(&self, write_fd: RawFd) -> Arc<EventQueue> {
        let mut state = self.state.lock().unwrap();
        state.next_queue_id += 1;
        let queue = Arc::new(EventQueue {
            id: state.next_queue_id,
            events: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
            write_fd,
        });
        state.queues.push(queue.clone());
        state.open_handles += 1;
        queue
    }

    /// Detach a service handle's queue. The last handle closing removes
    /// every TRANSIENT region of this application.
    pub(crate) fn detach_queue(&self, id: u64) {
        let mut state = self.state.lock().unwrap();
        state.queues.retain(|q| q.id != id);
        state.open_handles = state.open_handles.saturating_sub(1);
        if state.open_handles == 0 {
            let before = state.regions.len();
            state
                .regions
                .retain(|_, m| m.region.monitoring_mode() == MonitoringMode::Persistent);
            let dropped = before - state.regions.len();
            if dropped > 0 {
                debug!("last handle closed, dropped {} transient regions", dropped);
            }
        }
    }

    pub(crate) fn open_handles(&self) -> usize {
        self.state.lock().unwrap().open_handles
    }
}

fn deliver(queues: &[Arc<EventQueue>], event: EventType, region: Region, fix: GeoLocation) {
    for queue in queues {
        queue.push(Event {
            event_type: event,
            region: region.clone(),
            location: fix,
        });
    }
}

fn purge_expired(state: &mut EngineState) {
    let now = now_epoch();
    state.regions.retain(|_, m| !m.region.expired_at(now));
}

/// Minimal glob: `*` matches any run of characters, everything else is
/// literal.
fn glob_match(mask: &str, name: &str) -> bool {
    fn inner(mask: &[char], name: &[char]) -> bool {
        match mask.split_first() {
            None => name.is_empty(),
            Some((&'*', rest)) => (0..=name.len()).any(|skip| inner(rest, &name[skip..])),
            Some((&c, rest)) => name
                .split_first()
                .map_or(false, |(&n, tail)| n == c && inner(rest, tail)),
        }
    }
    let mask: Vec<char> = mask.chars().collect();
    let name: Vec<char> = name.chars().collect();
    inner(&mask, &name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_masks() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("Home*", "Home Office"));
        assert!(glob_match("*Office", "Home Office"));
        assert!(glob_match("H*e", "Home"));
        assert!(!glob_match("Home", "Home Office"));
        assert!(glob_match("Home", "Home"));
        assert!(!glob_match("", "Home"));
    }
}
