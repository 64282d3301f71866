//! GATT server registry
//!
//! Owns the set of registered services, routes connection lifecycle and
//! attribute access events to the correct callback set, and mediates
//! responses back to specific peers. Real radio I/O lives behind the
//! [`Transport`] seam.
//!
//! Response primitives may be called synchronously from inside the
//! triggering callback or later from an unrelated thread; pending request
//! state is correlated by `(instance, addr, device, handle)` with at most
//! one outstanding request per key. Late or duplicate responses are
//! rejected, never allowed to corrupt state.

use super::error::{AttErrorCode, SrvError, SrvResult};
use super::table::{AccessTarget, ServiceTable};
use super::types::{
    AttrDecl, AttrValue, Attribute, BdAddr, ConnId, ConnectionParams, DeviceType, InstanceId,
    Permissions, Properties,
};
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, ThreadId};

/// Per-service callback set; exactly one binding is active per instance.
///
/// The `*_alert` methods are fire-and-forget notices; the `*_request`
/// methods park a pending request that the application must complete with
/// [`GattServer::send_read_rsp`] / [`GattServer::send_write_rsp`], either
/// from inside the callback or from another thread.
pub trait ServiceEvents: Send + Sync {
    fn connected(
        &self,
        _instance: InstanceId,
        _addr: BdAddr,
        _device: DeviceType,
        _params: ConnectionParams,
    ) {
    }

    /// Parameter renegotiation completed on an LE link
    fn updated(
        &self,
        _instance: InstanceId,
        _addr: BdAddr,
        _device: DeviceType,
        _params: ConnectionParams,
    ) {
    }

    fn disconnected(&self, _instance: InstanceId, _addr: BdAddr, _device: DeviceType) {}

    /// A write with no response completed against a buffer-backed entry
    fn write_alert(
        &self,
        _instance: InstanceId,
        _addr: BdAddr,
        _device: DeviceType,
        _handle: u16,
        _value: &[u8],
    ) {
    }

    /// A write request is parked until `send_write_rsp` completes it
    fn write_request(
        &self,
        _instance: InstanceId,
        _addr: BdAddr,
        _device: DeviceType,
        _handle: u16,
        _value: &[u8],
    ) {
    }

    /// A read completed against a volatile entry
    fn read_alert(&self, _instance: InstanceId, _addr: BdAddr, _device: DeviceType, _handle: u16) {}

    /// A read request is parked until `send_read_rsp` completes it
    fn read_request(
        &self,
        _instance: InstanceId,
        _addr: BdAddr,
        _device: DeviceType,
        _handle: u16,
    ) {
    }
}

/// Boundary to the platform Bluetooth stack.
///
/// The registry never holds a lock across a call into this trait.
pub trait Transport: Send + Sync {
    fn deliver_read_response(
        &self,
        addr: BdAddr,
        device: DeviceType,
        handle: u16,
        code: AttErrorCode,
        value: &[u8],
    ) -> SrvResult<()>;

    fn deliver_write_response(
        &self,
        addr: BdAddr,
        device: DeviceType,
        handle: u16,
        code: AttErrorCode,
    ) -> SrvResult<()>;

    fn notify(&self, addr: BdAddr, device: DeviceType, handle: u16, value: &[u8]) -> SrvResult<()>;

    fn indicate(&self, addr: BdAddr, device: DeviceType, handle: u16, value: &[u8])
        -> SrvResult<()>;

    fn request_conn_update(
        &self,
        addr: BdAddr,
        device: DeviceType,
        params: ConnectionParams,
    ) -> SrvResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Read,
    Write,
}

struct Registration {
    table: RwLock<ServiceTable>,
    handler: Arc<dyn ServiceEvents>,
}

/// The GATT server registry
pub struct GattServer {
    transport: Arc<dyn Transport>,
    services: RwLock<BTreeMap<InstanceId, Arc<Registration>>>,
    next_instance: Mutex<u32>,
    /// Connected peers and their negotiated parameters
    peers: RwLock<HashMap<(BdAddr, DeviceType), ConnectionParams>>,
    /// Connections opted into unsolicited pushes
    keepalive: Mutex<HashSet<ConnId>>,
    /// At most one outstanding request per (connection, handle)
    pending: Mutex<HashMap<(ConnId, u16), PendingKind>>,
    /// Threads currently executing a callback dispatch
    dispatching: Mutex<HashSet<ThreadId>>,
}

/// Marks the current thread as dispatching for the guard's lifetime so the
/// push primitives can detect same-thread reentrancy.
struct DispatchGuard<'a> {
    server: &'a GattServer,
    tid: ThreadId,
    added: bool,
}

impl<'a> DispatchGuard<'a> {
    fn enter(server: &'a GattServer) -> Self {
        let tid = thread::current().id();
        let added = server.dispatching.lock().unwrap().insert(tid);
        Self { server, tid, added }
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        if self.added {
            self.server.dispatching.lock().unwrap().remove(&self.tid);
        }
    }
}

impl GattServer {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            services: RwLock::new(BTreeMap::new()),
            next_instance: Mutex::new(0),
            peers: RwLock::new(HashMap::new()),
            keepalive: Mutex::new(HashSet::new()),
            pending: Mutex::new(HashMap::new()),
            dispatching: Mutex::new(HashSet::new()),
        }
    }

    /// Register a service table with its callback binding.
    ///
    /// The table is re-validated here even if the caller already ran
    /// [`ServiceTable::validate`]. When the table requests start handle 0
    /// the registry assigns the next free range; explicit ranges that
    /// overlap an existing registration fail with `Busy`.
    pub fn register_service(
        &self,
        entries: Vec<Attribute>,
        handler: Arc<dyn ServiceEvents>,
    ) -> SrvResult<InstanceId> {
        let mut table = ServiceTable::build(entries)?;

        let mut services = self.services.write().unwrap();

        let span = u32::from(table.end_handle() - table.start_handle()) + 1;
        let requested = table.requested_start();
        let base = if requested == 0 {
            // Watermark allocation over the shared process handle space
            services
                .values()
                .map(|reg| u32::from(reg.table.read().unwrap().end_handle()) + 1)
                .max()
                .unwrap_or(u32::from(super::constants::ATT_HANDLE_MIN))
        } else {
            let end = u32::from(requested) + span - 1;
            for reg in services.values() {
                let other = reg.table.read().unwrap();
                if u32::from(requested) <= u32::from(other.end_handle())
                    && end >= u32::from(other.start_handle())
                {
                    return Err(SrvError::Busy);
                }
            }
            u32::from(requested)
        };

        if base + span - 1 > u32::from(super::constants::ATT_HANDLE_MAX) {
            return Err(SrvError::NoMemory("handle space exhausted".into()));
        }
        table.set_base(base as u16);

        let instance = {
            let mut next = self.next_instance.lock().unwrap();
            *next += 1;
            InstanceId(*next)
        };

        debug!(
            "registered service instance {} at handles 0x{:04x}..0x{:04x}",
            instance,
            table.start_handle(),
            table.end_handle()
        );
        services.insert(
            instance,
            Arc::new(Registration {
                table: RwLock::new(table),
                handler,
            }),
        );
        Ok(instance)
    }

    /// Deregister a service and free its state. In-flight peer requests
    /// referencing the instance are discarded; later calls with the stale
    /// id fail `NoDevice`.
    pub fn deregister_service(&self, instance: InstanceId) -> SrvResult<()> {
        let removed = self.services.write().unwrap().remove(&instance);
        if removed.is_none() {
            return Err(SrvError::NoDevice);
        }
        self.pending
            .lock()
            .unwrap()
            .retain(|(conn, _), _| conn.instance != instance);
        self.keepalive
            .lock()
            .unwrap()
            .retain(|conn| conn.instance != instance);
        debug!("deregistered service instance {}", instance);
        Ok(())
    }

    /// The absolute handle range assigned to a registered service
    pub fn get_service_handles(&self, instance: InstanceId) -> SrvResult<(u16, u16)> {
        let services = self.services.read().unwrap();
        let reg = services.get(&instance).ok_or(SrvError::NoDevice)?;
        let table = reg.table.read().unwrap();
        Ok((table.start_handle(), table.end_handle()))
    }

    fn registration(&self, instance: InstanceId) -> SrvResult<Arc<Registration>> {
        self.services
            .read()
            .unwrap()
            .get(&instance)
            .cloned()
            .ok_or(SrvError::NoDevice)
    }

    fn handlers(&self) -> Vec<(InstanceId, Arc<Registration>)> {
        self.services
            .read()
            .unwrap()
            .iter()
            .map(|(id, reg)| (*id, reg.clone()))
            .collect()
    }

    fn owner_of(&self, handle: u16) -> Option<(InstanceId, Arc<Registration>)> {
        self.services
            .read()
            .unwrap()
            .iter()
            .find(|(_, reg)| reg.table.read().unwrap().contains(handle))
            .map(|(id, reg)| (*id, reg.clone()))
    }

    fn check_peer(&self, addr: BdAddr, device: DeviceType) -> SrvResult<()> {
        if self.peers.read().unwrap().contains_key(&(addr, device)) {
            Ok(())
        } else {
            Err(SrvError::InvalidArgs(format!("peer {} not connected", addr)))
        }
    }

    // ---- stack-side entry points -------------------------------------

    /// A peer connected; every registered instance sees the event.
    pub fn peer_connected(&self, addr: BdAddr, device: DeviceType, params: ConnectionParams) {
        self.peers.write().unwrap().insert((addr, device), params);
        debug!("peer {} connected", addr);
        let _guard = DispatchGuard::enter(self);
        for (instance, reg) in self.handlers() {
            reg.handler.connected(instance, addr, device, params);
        }
    }

    /// Connection parameters were renegotiated on an LE link.
    pub fn peer_conn_updated(&self, addr: BdAddr, device: DeviceType, params: ConnectionParams) {
        self.peers.write().unwrap().insert((addr, device), params);
        let _guard = DispatchGuard::enter(self);
        for (instance, reg) in self.handlers() {
            reg.handler.updated(instance, addr, device, params);
        }
    }

    /// A peer disconnected; per-connection state (keep-alive opt-ins and
    /// pending requests) is dropped before the callbacks fire, so a late
    /// response for this connection is discarded rather than misdelivered.
    pub fn peer_disconnected(&self, addr: BdAddr, device: DeviceType) {
        self.peers.write().unwrap().remove(&(addr, device));
        self.keepalive
            .lock()
            .unwrap()
            .retain(|conn| !(conn.addr == addr && conn.device == device));
        self.pending
            .lock()
            .unwrap()
            .retain(|(conn, _), _| !(conn.addr == addr && conn.device == device));
        debug!("peer {} disconnected", addr);
        let _guard = DispatchGuard::enter(self);
        for (instance, reg) in self.handlers() {
            reg.handler.disconnected(instance, addr, device);
        }
    }

    /// A peer read the given handle.
    pub fn peer_read(&self, addr: BdAddr, device: DeviceType, handle: u16) -> SrvResult<()> {
        self.check_peer(addr, device)?;

        let (instance, reg) = match self.owner_of(handle) {
            Some(found) => found,
            None => {
                return self.transport.deliver_read_response(
                    addr,
                    device,
                    handle,
                    AttErrorCode::InvalidHandle,
                    &[],
                )
            }
        };

        // Resolve under the table lock, answer after releasing it
        enum ReadAction {
            Deliver(AttErrorCode, Vec<u8>),
            DeliverThenAlert(Vec<u8>),
            Park,
        }
        let action = {
            let table = reg.table.read().unwrap();
            match table.resolve(handle) {
                None => ReadAction::Deliver(AttErrorCode::InvalidHandle, Vec::new()),
                Some((entry, AccessTarget::Declaration)) => {
                    ReadAction::Deliver(AttErrorCode::NoError, table.declaration_payload(entry))
                }
                Some((entry, AccessTarget::Value)) => {
                    if !entry_permissions(entry).can_read() {
                        ReadAction::Deliver(AttErrorCode::ReadNotPermitted, Vec::new())
                    } else {
                        match &entry.value {
                            AttrValue::Static(data) => {
                                ReadAction::Deliver(AttErrorCode::NoError, data.clone())
                            }
                            AttrValue::Volatile { data, .. } => {
                                ReadAction::DeliverThenAlert(data.clone())
                            }
                            AttrValue::Dynamic { .. } => ReadAction::Park,
                            AttrValue::None => {
                                ReadAction::Deliver(AttErrorCode::ReadNotPermitted, Vec::new())
                            }
                        }
                    }
                }
            }
        };

        let conn = ConnId {
            instance,
            addr,
            device,
        };
        match action {
            ReadAction::Deliver(code, value) => {
                self.transport
                    .deliver_read_response(addr, device, handle, code, &value)
            }
            ReadAction::DeliverThenAlert(value) => {
                self.transport.deliver_read_response(
                    addr,
                    device,
                    handle,
                    AttErrorCode::NoError,
                    &value,
                )?;
                let _guard = DispatchGuard::enter(self);
                reg.handler.read_alert(instance, addr, device, handle);
                Ok(())
            }
            ReadAction::Park => {
                self.park(conn, handle, PendingKind::Read)?;
                let _guard = DispatchGuard::enter(self);
                reg.handler.read_request(instance, addr, device, handle);
                Ok(())
            }
        }
    }

    /// A peer wrote the given handle. `with_response` reflects the ATT
    /// operation the peer used: a write request blocks the peer until
    /// `send_write_rsp`, a write command completes immediately.
    pub fn peer_write(
        &self,
        addr: BdAddr,
        device: DeviceType,
        handle: u16,
        data: &[u8],
        with_response: bool,
    ) -> SrvResult<()> {
        self.check_peer(addr, device)?;

        let (instance, reg) = match self.owner_of(handle) {
            Some(found) => found,
            None => {
                if with_response {
                    return self.transport.deliver_write_response(
                        addr,
                        device,
                        handle,
                        AttErrorCode::InvalidHandle,
                    );
                }
                warn!("write command for unknown handle 0x{:04x} dropped", handle);
                return Ok(());
            }
        };

        enum WriteAction {
            Reject(AttErrorCode),
            Drop(&'static str),
            Alert,
            StoreThenAlert,
            Park,
            StoreThenPark,
        }
        let action = {
            let table = reg.table.read().unwrap();
            match table.resolve(handle) {
                None => WriteAction::Reject(AttErrorCode::InvalidHandle),
                Some((_, AccessTarget::Declaration)) => {
                    WriteAction::Reject(AttErrorCode::WriteNotPermitted)
                }
                Some((entry, AccessTarget::Value)) => {
                    let perms = entry_permissions(entry);
                    let props = entry_properties(entry);
                    if !perms.can_write() {
                        WriteAction::Reject(AttErrorCode::WriteNotPermitted)
                    } else if with_response {
                        match (props_allow_write(props, entry), &entry.value) {
                            (false, _) => WriteAction::Reject(AttErrorCode::WriteNotPermitted),
                            (true, AttrValue::Volatile { max_len, .. }) => {
                                if data.len() > *max_len {
                                    WriteAction::Reject(AttErrorCode::InvalidAttributeValueLength)
                                } else {
                                    WriteAction::StoreThenPark
                                }
                            }
                            (true, AttrValue::Dynamic { max_len }) => {
                                if data.len() > *max_len {
                                    WriteAction::Reject(AttErrorCode::InvalidAttributeValueLength)
                                } else {
                                    WriteAction::Park
                                }
                            }
                            // Static data is set once at creation
                            (true, _) => WriteAction::Reject(AttErrorCode::WriteNotPermitted),
                        }
                    } else {
                        match (props_allow_write_noresp(props, entry), &entry.value) {
                            (false, _) => WriteAction::Drop("write command not permitted"),
                            (true, AttrValue::Volatile { max_len, .. }) => {
                                if data.len() > *max_len {
                                    WriteAction::Drop("write command exceeds max length")
                                } else {
                                    WriteAction::StoreThenAlert
                                }
                            }
                            (true, AttrValue::Dynamic { .. }) => WriteAction::Alert,
                            (true, _) => WriteAction::Drop("write command on static data"),
                        }
                    }
                }
            }
        };

        let conn = ConnId {
            instance,
            addr,
            device,
        };
        match action {
            WriteAction::Reject(code) => {
                if with_response {
                    self.transport
                        .deliver_write_response(addr, device, handle, code)
                } else {
                    warn!(
                        "write command for handle 0x{:04x} rejected: {:?}",
                        handle, code
                    );
                    Ok(())
                }
            }
            WriteAction::Drop(reason) => {
                warn!(
                    "write command for handle 0x{:04x} ({}) dropped: {}",
                    handle,
                    hex::encode(data),
                    reason
                );
                Ok(())
            }
            WriteAction::Alert => {
                let _guard = DispatchGuard::enter(self);
                reg.handler.write_alert(instance, addr, device, handle, data);
                Ok(())
            }
            WriteAction::StoreThenAlert => {
                self.store_volatile(&reg, handle, data);
                let _guard = DispatchGuard::enter(self);
                reg.handler.write_alert(instance, addr, device, handle, data);
                Ok(())
            }
            WriteAction::Park => {
                self.park(conn, handle, PendingKind::Write)?;
                let _guard = DispatchGuard::enter(self);
                reg.handler
                    .write_request(instance, addr, device, handle, data);
                Ok(())
            }
            WriteAction::StoreThenPark => {
                self.store_volatile(&reg, handle, data);
                self.park(conn, handle, PendingKind::Write)?;
                let _guard = DispatchGuard::enter(self);
                reg.handler
                    .write_request(instance, addr, device, handle, data);
                Ok(())
            }
        }
    }

    fn store_volatile(&self, reg: &Registration, handle: u16, data: &[u8]) {
        let mut table = reg.table.write().unwrap();
        match table.store_volatile(handle, data) {
            Ok(_) => {}
            Err(max_len) => {
                // Length was checked while resolving; gets here only if the
                // table changed in between, which keeps the old value
                warn!(
                    "volatile write of {} bytes exceeds max {} for handle 0x{:04x}",
                    data.len(),
                    max_len,
                    handle
                );
            }
        }
    }

    fn park(&self, conn: ConnId, handle: u16, kind: PendingKind) -> SrvResult<()> {
        let mut pending = self.pending.lock().unwrap();
        if pending.contains_key(&(conn, handle)) {
            return Err(SrvError::Busy);
        }
        pending.insert((conn, handle), kind);
        Ok(())
    }

    fn complete(&self, conn: ConnId, handle: u16, kind: PendingKind) -> SrvResult<()> {
        let mut pending = self.pending.lock().unwrap();
        match pending.get(&(conn, handle)) {
            Some(found) if *found == kind => {
                pending.remove(&(conn, handle));
                Ok(())
            }
            _ => Err(SrvError::InvalidArgs(format!(
                "no pending {:?} request for handle 0x{:04x}",
                kind, handle
            ))),
        }
    }

    // ---- application-side response and push primitives ----------------

    /// Complete a pending read request. Safe to call from inside the
    /// triggering callback or from another thread; a second completion for
    /// the same request fails rather than double-responding.
    pub fn send_read_rsp(
        &self,
        instance: InstanceId,
        addr: BdAddr,
        device: DeviceType,
        handle: u16,
        code: AttErrorCode,
        value: &[u8],
    ) -> SrvResult<()> {
        self.registration(instance)?;
        let conn = ConnId {
            instance,
            addr,
            device,
        };
        self.complete(conn, handle, PendingKind::Read)?;
        self.transport
            .deliver_read_response(addr, device, handle, code, value)
    }

    /// Complete a pending write request.
    pub fn send_write_rsp(
        &self,
        instance: InstanceId,
        addr: BdAddr,
        device: DeviceType,
        handle: u16,
        code: AttErrorCode,
    ) -> SrvResult<()> {
        self.registration(instance)?;
        let conn = ConnId {
            instance,
            addr,
            device,
        };
        self.complete(conn, handle, PendingKind::Write)?;
        self.transport
            .deliver_write_response(addr, device, handle, code)
    }

    /// Push an unsolicited notification. Requires an active keep-alive for
    /// the connection; pushing without one could race connection teardown.
    pub fn send_notification(
        &self,
        instance: InstanceId,
        addr: BdAddr,
        device: DeviceType,
        handle: u16,
        value: &[u8],
    ) -> SrvResult<()> {
        self.push(instance, addr, device, handle, value, Properties::NOTIFY)?;
        self.transport.notify(addr, device, handle, value)
    }

    /// Push an unsolicited indication (peer-acknowledged).
    pub fn send_indication(
        &self,
        instance: InstanceId,
        addr: BdAddr,
        device: DeviceType,
        handle: u16,
        value: &[u8],
    ) -> SrvResult<()> {
        self.push(instance, addr, device, handle, value, Properties::INDICATE)?;
        self.transport.indicate(addr, device, handle, value)
    }

    fn push(
        &self,
        instance: InstanceId,
        addr: BdAddr,
        device: DeviceType,
        handle: u16,
        value: &[u8],
        required: Properties,
    ) -> SrvResult<()> {
        // Pushing from inside a callback on the dispatching thread would
        // deadlock against the in-flight dispatch; the caller must hand off
        // to another thread instead
        if self
            .dispatching
            .lock()
            .unwrap()
            .contains(&thread::current().id())
        {
            return Err(SrvError::Deadlock);
        }

        let reg = self.registration(instance)?;
        let conn = ConnId {
            instance,
            addr,
            device,
        };
        if !self.keepalive.lock().unwrap().contains(&conn) {
            return Err(SrvError::NotConnected);
        }
        self.check_peer(addr, device)?;

        let table = reg.table.read().unwrap();
        match table.resolve(handle) {
            Some((entry, AccessTarget::Value)) => {
                if !entry_properties(entry).contains(required) {
                    return Err(SrvError::InvalidArgs(format!(
                        "handle 0x{:04x} does not declare {:?}",
                        handle, required
                    )));
                }
            }
            _ => {
                return Err(SrvError::InvalidArgs(format!(
                    "handle 0x{:04x} is not a pushable value ({})",
                    handle,
                    hex::encode(value)
                )))
            }
        }
        Ok(())
    }

    /// Opt a connection in or out of unsolicited pushes.
    ///
    /// Enabling an already-enabled connection fails `Busy`; disabling an
    /// already-disabled one fails `NotConnected`.
    pub fn set_keepalive(
        &self,
        instance: InstanceId,
        addr: BdAddr,
        device: DeviceType,
        enabled: bool,
    ) -> SrvResult<()> {
        self.registration(instance)?;
        let conn = ConnId {
            instance,
            addr,
            device,
        };
        let mut keepalive = self.keepalive.lock().unwrap();
        if enabled {
            if !self.peers.read().unwrap().contains_key(&(addr, device)) {
                return Err(SrvError::NotConnected);
            }
            if !keepalive.insert(conn) {
                return Err(SrvError::Busy);
            }
        } else if !keepalive.remove(&conn) {
            return Err(SrvError::NotConnected);
        }
        Ok(())
    }

    /// Request new connection parameters on an LE link. BR/EDR links have
    /// no equivalent link-layer procedure and fail `NotSupported`.
    pub fn update_connection(
        &self,
        instance: InstanceId,
        addr: BdAddr,
        device: DeviceType,
        params: ConnectionParams,
    ) -> SrvResult<()> {
        self.registration(instance)?;
        if device == DeviceType::Classic {
            return Err(SrvError::NotSupported);
        }
        self.check_peer(addr, device)?;
        self.transport.request_conn_update(addr, device, params)
    }
}

fn entry_permissions(entry: &Attribute) -> Permissions {
    match &entry.decl {
        AttrDecl::Characteristic { permissions, .. } | AttrDecl::Descriptor { permissions, .. } => {
            *permissions
        }
        // Declarations themselves are open for read, closed for write
        _ => Permissions::READABLE,
    }
}

fn entry_properties(entry: &Attribute) -> Properties {
    match &entry.decl {
        AttrDecl::Characteristic { properties, .. } => *properties,
        _ => Properties::empty(),
    }
}

fn props_allow_write(props: Properties, entry: &Attribute) -> bool {
    match entry.decl {
        // Descriptor write access is governed by permissions alone
        AttrDecl::Descriptor { .. } => true,
        _ => props.contains(Properties::WRITE),
    }
}

fn props_allow_write_noresp(props: Properties, entry: &Attribute) -> bool {
    match entry.decl {
        AttrDecl::Descriptor { .. } => false,
        _ => props.contains(Properties::WRITE_NORESP),
    }
}
