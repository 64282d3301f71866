//! Geomonitor service handles and event consumption
//!
//! A [`GeomonitorService`] is one open connection to the monitoring engine.
//! Events can be consumed two ways: a dedicated thread blocking in
//! [`GeomonitorService::wait_event`], or an external `select()`/`poll()`
//! loop watching [`GeomonitorService::fd`] and draining with
//! [`GeomonitorService::try_event`]. Applications may hold several handles
//! at once; the engine counts them, and TRANSIENT regions survive only
//! while at least one is open.

use super::engine::{EventQueue, GeomonitorEngine};
use super::error::{GeoError, GeoResult};
use super::region::{EventType, GeoLocation, Region};
use log::debug;
use std::os::unix::io::RawFd;
use std::sync::Arc;

/// One delivered monitoring event. The region and location are owned
/// snapshots; dropping the event releases both.
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub region: Region,
    pub location: GeoLocation,
}

/// An open service handle on the monitoring engine
pub struct GeomonitorService {
    engine: Arc<GeomonitorEngine>,
    queue: Arc<EventQueue>,
    read_fd: RawFd,
    write_fd: RawFd,
    shut: bool,
}

impl GeomonitorService {
    /// Open a handle, blocking until the engine acknowledges the
    /// registration. The handle owns a self-pipe whose read end is exposed
    /// through [`Self::fd`].
    pub fn open(engine: Arc<GeomonitorEngine>) -> GeoResult<Self> {
        let mut fds = [0 as libc::c_int; 2];
        let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) };
        if rc < 0 {
            return Err(GeoError::ServiceUnavailable);
        }
        let queue = engine.attach_queue(fds[1]);
        debug!("opened geomonitor service handle {}", queue.id);
        Ok(Self {
            engine,
            queue,
            read_fd: fds[0],
            write_fd: fds[1],
            shut: false,
        })
    }

    /// Pollable descriptor: becomes readable whenever an event is queued.
    pub fn fd(&self) -> RawFd {
        self.read_fd
    }

    /// Block the calling thread until one event is available.
    ///
    /// Queued events are drained before the outage check, so events
    /// delivered right before a location-services outage (including the
    /// out-of-service markers) are still observable; once the queue is
    /// empty and services are off this fails `LocationServicesDisabled`
    /// instead of blocking forever.
    pub fn wait_event(&self) -> GeoResult<Event> {
        let mut events = self.queue.events.lock().unwrap();
        loop {
            if let Some(event) = events.pop_front() {
                self.drain_wakeup_byte();
                return Ok(event);
            }
            if !self.engine.services_enabled() {
                return Err(GeoError::LocationServicesDisabled);
            }
            events = self.queue.cond.wait(events).unwrap();
        }
    }

    /// Drain one already-signaled event without blocking.
    pub fn try_event(&self) -> Option<Event> {
        let event = self.queue.events.lock().unwrap().pop_front();
        if event.is_some() {
            self.drain_wakeup_byte();
        }
        event
    }

    fn drain_wakeup_byte(&self) {
        let mut byte = [0u8];
        // Non-blocking read; a missing byte (dropped on a full pipe) is fine
        unsafe {
            libc::read(self.read_fd, byte.as_mut_ptr() as *mut libc::c_void, 1);
        }
    }

    /// Close the handle. The last open handle of the application takes all
    /// TRANSIENT regions down with it.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if self.shut {
            return;
        }
        self.shut = true;
        debug!("shutting down geomonitor service handle {}", self.queue.id);
        self.engine.detach_queue(self.queue.id);
        unsafe {
            libc::close(self.write_fd);
            libc::close(self.read_fd);
        }
    }
}

impl Drop for GeomonitorService {
    fn drop(&mut self) {
        self.close();
    }
}
