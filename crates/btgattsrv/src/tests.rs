//! Unit tests for the GATT server registry

use crate::error::{AttErrorCode, SrvError};
use crate::server::{GattServer, ServiceEvents, Transport};
use crate::table::ServiceTable;
use crate::types::*;
use crate::uuid::Uuid;
use std::sync::{Arc, Mutex};

/// Transport mock recording everything the registry pushes toward peers
#[derive(Default)]
struct MockTransport {
    read_responses: Mutex<Vec<(u16, AttErrorCode, Vec<u8>)>>,
    write_responses: Mutex<Vec<(u16, AttErrorCode)>>,
    notifications: Mutex<Vec<(u16, Vec<u8>)>>,
    indications: Mutex<Vec<(u16, Vec<u8>)>>,
    conn_updates: Mutex<Vec<ConnectionParams>>,
}

impl Transport for MockTransport {
    fn deliver_read_response(
        &self,
        _addr: BdAddr,
        _device: DeviceType,
        handle: u16,
        code: AttErrorCode,
        value: &[u8],
    ) -> crate::SrvResult<()> {
        self.read_responses
            .lock()
            .unwrap()
            .push((handle, code, value.to_vec()));
        Ok(())
    }

    fn deliver_write_response(
        &self,
        _addr: BdAddr,
        _device: DeviceType,
        handle: u16,
        code: AttErrorCode,
    ) -> crate::SrvResult<()> {
        self.write_responses.lock().unwrap().push((handle, code));
        Ok(())
    }

    fn notify(
        &self,
        _addr: BdAddr,
        _device: DeviceType,
        handle: u16,
        value: &[u8],
    ) -> crate::SrvResult<()> {
        self.notifications
            .lock()
            .unwrap()
            .push((handle, value.to_vec()));
        Ok(())
    }

    fn indicate(
        &self,
        _addr: BdAddr,
        _device: DeviceType,
        handle: u16,
        value: &[u8],
    ) -> crate::SrvResult<()> {
        self.indications
            .lock()
            .unwrap()
            .push((handle, value.to_vec()));
        Ok(())
    }

    fn request_conn_update(
        &self,
        _addr: BdAddr,
        _device: DeviceType,
        params: ConnectionParams,
    ) -> crate::SrvResult<()> {
        self.conn_updates.lock().unwrap().push(params);
        Ok(())
    }
}

/// Handler recording which callbacks fired
#[derive(Default)]
struct RecordingHandler {
    connected: Mutex<Vec<BdAddr>>,
    disconnected: Mutex<Vec<BdAddr>>,
    read_requests: Mutex<Vec<u16>>,
    read_alerts: Mutex<Vec<u16>>,
    write_requests: Mutex<Vec<(u16, Vec<u8>)>>,
    write_alerts: Mutex<Vec<(u16, Vec<u8>)>>,
}

impl ServiceEvents for RecordingHandler {
    fn connected(
        &self,
        _instance: InstanceId,
        addr: BdAddr,
        _device: DeviceType,
        _params: ConnectionParams,
    ) {
        self.connected.lock().unwrap().push(addr);
    }

    fn disconnected(&self, _instance: InstanceId, addr: BdAddr, _device: DeviceType) {
        self.disconnected.lock().unwrap().push(addr);
    }

    fn read_request(&self, _instance: InstanceId, _addr: BdAddr, _device: DeviceType, handle: u16) {
        self.read_requests.lock().unwrap().push(handle);
    }

    fn read_alert(&self, _instance: InstanceId, _addr: BdAddr, _device: DeviceType, handle: u16) {
        self.read_alerts.lock().unwrap().push(handle);
    }

    fn write_request(
        &self,
        _instance: InstanceId,
        _addr: BdAddr,
        _device: DeviceType,
        handle: u16,
        value: &[u8],
    ) {
        self.write_requests
            .lock()
            .unwrap()
            .push((handle, value.to_vec()));
    }

    fn write_alert(
        &self,
        _instance: InstanceId,
        _addr: BdAddr,
        _device: DeviceType,
        handle: u16,
        value: &[u8],
    ) {
        self.write_alerts
            .lock()
            .unwrap()
            .push((handle, value.to_vec()));
    }
}

fn peer() -> BdAddr {
    BdAddr::new([0x55, 0x44, 0x33, 0x22, 0x11, 0x00])
}

fn params() -> ConnectionParams {
    ConnectionParams {
        interval: 0x0008,
        latency: 0,
        supervision_timeout: 0x00C8,
    }
}

fn service_entry(handle: u16, attr_count: u16) -> Attribute {
    Attribute {
        uuid: Uuid::from_u16(0x180D),
        handle,
        decl: AttrDecl::Service {
            attr_count,
            start_handle: 0,
            handle_range: 0,
            secondary: false,
            sdp_export: false,
        },
        value: AttrValue::None,
    }
}

fn characteristic_entry(handle: u16, value_handle: u16, props: Properties, value: AttrValue) -> Attribute {
    Attribute {
        uuid: Uuid::from_u16(0x2A37),
        handle,
        decl: AttrDecl::Characteristic {
            properties: props,
            permissions: Permissions::READABLE | Permissions::WRITABLE,
            key_size: 0,
            value_handle,
        },
        value,
    }
}

fn descriptor_entry(handle: u16) -> Attribute {
    Attribute {
        uuid: Uuid::from_u16(0x2902),
        handle,
        decl: AttrDecl::Descriptor {
            permissions: Permissions::READABLE,
            key_size: 0,
        },
        value: AttrValue::Static(vec![0, 0]),
    }
}

fn simple_table(value: AttrValue, props: Properties) -> Vec<Attribute> {
    vec![
        service_entry(0, 3),
        characteristic_entry(1, 2, props, value),
        descriptor_entry(3),
    ]
}

// ---- table validation ------------------------------------------------

#[test]
fn validator_accepts_well_formed_table() {
    let entries = simple_table(AttrValue::Static(vec![0xAB]), Properties::READ);
    assert!(ServiceTable::validate(&entries).is_ok());
}

#[test]
fn validator_rejects_duplicate_handles() {
    let mut entries = simple_table(AttrValue::Static(vec![0xAB]), Properties::READ);
    entries[2].handle = 1;
    let err = ServiceTable::validate(&entries).unwrap_err();
    match err {
        SrvError::TableInvalid(msg) => assert!(msg.contains("ascending"), "{}", msg),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn validator_rejects_value_handle_collision() {
    // Value handle 3 collides with the descriptor entry
    let entries = vec![
        service_entry(0, 3),
        characteristic_entry(1, 3, Properties::READ, AttrValue::Static(vec![1])),
        descriptor_entry(3),
    ];
    let err = ServiceTable::validate(&entries).unwrap_err();
    match err {
        SrvError::TableInvalid(msg) => assert!(msg.contains("collides"), "{}", msg),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn validator_rejects_value_handle_before_declaration() {
    let entries = vec![
        service_entry(0, 2),
        characteristic_entry(2, 1, Properties::READ, AttrValue::Static(vec![1])),
    ];
    let err = ServiceTable::validate(&entries).unwrap_err();
    match err {
        SrvError::TableInvalid(msg) => assert!(msg.contains("not greater"), "{}", msg),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn validator_rejects_table_not_starting_with_service() {
    let entries = vec![characteristic_entry(
        0,
        1,
        Properties::READ,
        AttrValue::Static(vec![1]),
    )];
    assert!(matches!(
        ServiceTable::validate(&entries),
        Err(SrvError::TableInvalid(_))
    ));
}

// cnt mismatched to 2 for a three-entry service
#[test]
fn validator_diagnoses_count_mismatch() {
    let entries = vec![
        service_entry(0, 2),
        characteristic_entry(
            1,
            2,
            Properties::READ | Properties::WRITE,
            AttrValue::Static(vec![0xAB]),
        ),
        descriptor_entry(3),
    ];
    let err = ServiceTable::validate(&entries).unwrap_err();
    match err {
        SrvError::TableInvalid(msg) => {
            assert!(msg.contains("count mismatch"), "{}", msg);
            assert!(!msg.is_empty());
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn validator_rejects_volatile_seed_exceeding_max() {
    let entries = vec![
        service_entry(0, 2),
        characteristic_entry(
            1,
            2,
            Properties::READ,
            AttrValue::Volatile {
                data: vec![1, 2, 3, 4],
                max_len: 2,
            },
        ),
    ];
    assert!(matches!(
        ServiceTable::validate(&entries),
        Err(SrvError::TableInvalid(_))
    ));
}

#[test]
fn validator_rejects_service_with_value_data() {
    let mut entries = simple_table(AttrValue::Static(vec![0xAB]), Properties::READ);
    entries[0].value = AttrValue::Static(vec![1]);
    assert!(matches!(
        ServiceTable::validate(&entries),
        Err(SrvError::TableInvalid(_))
    ));
}

#[test]
fn validator_rejects_bad_key_size() {
    let mut entries = simple_table(AttrValue::Static(vec![0xAB]), Properties::READ);
    if let AttrDecl::Characteristic { ref mut key_size, .. } = entries[1].decl {
        *key_size = 5;
    }
    assert!(matches!(
        ServiceTable::validate(&entries),
        Err(SrvError::TableInvalid(_))
    ));
}

// ---- registration and handle allocation ------------------------------

#[test]
fn register_assigns_ascending_handle_ranges() {
    let server = GattServer::new(Arc::new(MockTransport::default()));
    let handler = Arc::new(RecordingHandler::default());

    let a = server
        .register_service(
            simple_table(AttrValue::Static(vec![1]), Properties::READ),
            handler.clone(),
        )
        .unwrap();
    let b = server
        .register_service(
            simple_table(AttrValue::Static(vec![2]), Properties::READ),
            handler,
        )
        .unwrap();

    let (a_start, a_end) = server.get_service_handles(a).unwrap();
    let (b_start, b_end) = server.get_service_handles(b).unwrap();
    assert_eq!(a_start, 0x0001);
    assert_eq!(a_end, 0x0004);
    assert_eq!(b_start, a_end + 1);
    assert_eq!(b_end - b_start, 3);
}

#[test]
fn register_rejects_overlapping_explicit_range() {
    let server = GattServer::new(Arc::new(MockTransport::default()));
    let handler = Arc::new(RecordingHandler::default());

    let mut first = simple_table(AttrValue::Static(vec![1]), Properties::READ);
    if let AttrDecl::Service { ref mut start_handle, .. } = first[0].decl {
        *start_handle = 0x0010;
    }
    server.register_service(first, handler.clone()).unwrap();

    let mut second = simple_table(AttrValue::Static(vec![2]), Properties::READ);
    if let AttrDecl::Service { ref mut start_handle, .. } = second[0].decl {
        *start_handle = 0x0012;
    }
    assert!(matches!(
        server.register_service(second, handler),
        Err(SrvError::Busy)
    ));
}

#[test]
fn register_rejects_invalid_table() {
    let server = GattServer::new(Arc::new(MockTransport::default()));
    let entries = vec![service_entry(0, 5)];
    assert!(matches!(
        server.register_service(entries, Arc::new(RecordingHandler::default())),
        Err(SrvError::TableInvalid(_))
    ));
}

#[test]
fn stale_instance_fails_nodev() {
    let server = GattServer::new(Arc::new(MockTransport::default()));
    let instance = server
        .register_service(
            simple_table(AttrValue::Static(vec![1]), Properties::READ),
            Arc::new(RecordingHandler::default()),
        )
        .unwrap();
    server.deregister_service(instance).unwrap();

    assert!(matches!(
        server.deregister_service(instance),
        Err(SrvError::NoDevice)
    ));
    assert!(matches!(
        server.get_service_handles(instance),
        Err(SrvError::NoDevice)
    ));
    assert!(matches!(
        server.set_keepalive(instance, peer(), DeviceType::LowEnergy, true),
        Err(SrvError::NoDevice)
    ));
}

// ---- static reads served through the send path -----------------------

#[test]
fn static_read_returns_seeded_value() {
    let transport = Arc::new(MockTransport::default());
    let server = GattServer::new(transport.clone());
    let handler = Arc::new(RecordingHandler::default());

    server
        .register_service(
            simple_table(
                AttrValue::Static(vec![0xAB]),
                Properties::READ | Properties::WRITE,
            ),
            handler.clone(),
        )
        .unwrap();
    server.peer_connected(peer(), DeviceType::LowEnergy, params());
    assert_eq!(handler.connected.lock().unwrap().len(), 1);

    // Value handle is relative 2, absolute base + 2
    server.peer_read(peer(), DeviceType::LowEnergy, 0x0003).unwrap();

    let responses = transport.read_responses.lock().unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0], (0x0003, AttErrorCode::NoError, vec![0xAB]));
}

#[test]
fn declaration_read_serves_serialized_declaration() {
    let transport = Arc::new(MockTransport::default());
    let server = GattServer::new(transport.clone());

    server
        .register_service(
            simple_table(AttrValue::Static(vec![0xAB]), Properties::READ),
            Arc::new(RecordingHandler::default()),
        )
        .unwrap();
    server.peer_connected(peer(), DeviceType::LowEnergy, params());

    // Characteristic declaration at absolute handle 2
    server.peer_read(peer(), DeviceType::LowEnergy, 0x0002).unwrap();

    let responses = transport.read_responses.lock().unwrap();
    let (handle, code, payload) = &responses[0];
    assert_eq!(*handle, 0x0002);
    assert_eq!(*code, AttErrorCode::NoError);
    // props byte + LE value handle + LE uuid16
    assert_eq!(payload, &vec![0x02, 0x03, 0x00, 0x37, 0x2A]);
}

#[test]
fn read_of_unknown_handle_yields_invalid_handle() {
    let transport = Arc::new(MockTransport::default());
    let server = GattServer::new(transport.clone());
    server.peer_connected(peer(), DeviceType::LowEnergy, params());

    server.peer_read(peer(), DeviceType::LowEnergy, 0x1234).unwrap();

    let responses = transport.read_responses.lock().unwrap();
    assert_eq!(responses[0].1, AttErrorCode::InvalidHandle);
}

// ---- dynamic request/response correlation ----------------------------

#[test]
fn dynamic_read_parks_until_responded() {
    let transport = Arc::new(MockTransport::default());
    let server = GattServer::new(transport.clone());
    let handler = Arc::new(RecordingHandler::default());

    let instance = server
        .register_service(
            simple_table(AttrValue::Dynamic { max_len: 16 }, Properties::READ),
            handler.clone(),
        )
        .unwrap();
    server.peer_connected(peer(), DeviceType::LowEnergy, params());

    server.peer_read(peer(), DeviceType::LowEnergy, 0x0003).unwrap();
    assert_eq!(handler.read_requests.lock().unwrap().as_slice(), &[0x0003]);
    assert!(transport.read_responses.lock().unwrap().is_empty());

    server
        .send_read_rsp(
            instance,
            peer(),
            DeviceType::LowEnergy,
            0x0003,
            AttErrorCode::NoError,
            &[0xCD],
        )
        .unwrap();
    assert_eq!(
        transport.read_responses.lock().unwrap()[0],
        (0x0003, AttErrorCode::NoError, vec![0xCD])
    );

    // Duplicate completion for the same request must fail, not respond twice
    let dup = server.send_read_rsp(
        instance,
        peer(),
        DeviceType::LowEnergy,
        0x0003,
        AttErrorCode::NoError,
        &[0xCD],
    );
    assert!(matches!(dup, Err(SrvError::InvalidArgs(_))));
    assert_eq!(transport.read_responses.lock().unwrap().len(), 1);
}

#[test]
fn second_request_while_pending_is_rejected() {
    let server = GattServer::new(Arc::new(MockTransport::default()));
    let handler = Arc::new(RecordingHandler::default());

    server
        .register_service(
            simple_table(AttrValue::Dynamic { max_len: 16 }, Properties::READ),
            handler,
        )
        .unwrap();
    server.peer_connected(peer(), DeviceType::LowEnergy, params());

    server.peer_read(peer(), DeviceType::LowEnergy, 0x0003).unwrap();
    assert!(matches!(
        server.peer_read(peer(), DeviceType::LowEnergy, 0x0003),
        Err(SrvError::Busy)
    ));
}

#[test]
fn response_after_disconnect_is_discarded() {
    let transport = Arc::new(MockTransport::default());
    let server = GattServer::new(transport.clone());
    let handler = Arc::new(RecordingHandler::default());

    let instance = server
        .register_service(
            simple_table(AttrValue::Dynamic { max_len: 16 }, Properties::READ),
            handler,
        )
        .unwrap();
    server.peer_connected(peer(), DeviceType::LowEnergy, params());
    server.peer_read(peer(), DeviceType::LowEnergy, 0x0003).unwrap();
    server.peer_disconnected(peer(), DeviceType::LowEnergy);

    let late = server.send_read_rsp(
        instance,
        peer(),
        DeviceType::LowEnergy,
        0x0003,
        AttErrorCode::NoError,
        &[0xEE],
    );
    assert!(matches!(late, Err(SrvError::InvalidArgs(_))));
    assert!(transport.read_responses.lock().unwrap().is_empty());
}

#[test]
fn write_request_completes_through_send_write_rsp() {
    let transport = Arc::new(MockTransport::default());
    let server = GattServer::new(transport.clone());
    let handler = Arc::new(RecordingHandler::default());

    let instance = server
        .register_service(
            simple_table(
                AttrValue::Dynamic { max_len: 16 },
                Properties::READ | Properties::WRITE,
            ),
            handler.clone(),
        )
        .unwrap();
    server.peer_connected(peer(), DeviceType::LowEnergy, params());

    server
        .peer_write(peer(), DeviceType::LowEnergy, 0x0003, &[0x01, 0x02], true)
        .unwrap();
    assert_eq!(
        handler.write_requests.lock().unwrap()[0],
        (0x0003, vec![0x01, 0x02])
    );

    server
        .send_write_rsp(
            instance,
            peer(),
            DeviceType::LowEnergy,
            0x0003,
            AttErrorCode::NoError,
        )
        .unwrap();
    assert_eq!(
        transport.write_responses.lock().unwrap()[0],
        (0x0003, AttErrorCode::NoError)
    );

    let dup = server.send_write_rsp(
        instance,
        peer(),
        DeviceType::LowEnergy,
        0x0003,
        AttErrorCode::NoError,
    );
    assert!(matches!(dup, Err(SrvError::InvalidArgs(_))));
}

#[test]
fn write_command_on_noresp_characteristic_fires_alert_only() {
    let transport = Arc::new(MockTransport::default());
    let server = GattServer::new(transport.clone());
    let handler = Arc::new(RecordingHandler::default());

    server
        .register_service(
            simple_table(
                AttrValue::Volatile {
                    data: vec![0x00],
                    max_len: 4,
                },
                Properties::READ | Properties::WRITE_NORESP,
            ),
            handler.clone(),
        )
        .unwrap();
    server.peer_connected(peer(), DeviceType::LowEnergy, params());

    server
        .peer_write(peer(), DeviceType::LowEnergy, 0x0003, &[0x7F], false)
        .unwrap();
    assert_eq!(handler.write_alerts.lock().unwrap()[0], (0x0003, vec![0x7F]));
    assert!(handler.write_requests.lock().unwrap().is_empty());
    assert!(transport.write_responses.lock().unwrap().is_empty());

    // The volatile buffer now carries the written value
    server.peer_read(peer(), DeviceType::LowEnergy, 0x0003).unwrap();
    assert_eq!(
        transport.read_responses.lock().unwrap()[0],
        (0x0003, AttErrorCode::NoError, vec![0x7F])
    );
    // Volatile reads raise the read alert
    assert_eq!(handler.read_alerts.lock().unwrap().as_slice(), &[0x0003]);
}

#[test]
fn write_without_permission_is_rejected_with_protocol_error() {
    let transport = Arc::new(MockTransport::default());
    let server = GattServer::new(transport.clone());

    let mut entries = simple_table(
        AttrValue::Dynamic { max_len: 4 },
        Properties::READ | Properties::WRITE,
    );
    if let AttrDecl::Characteristic { ref mut permissions, .. } = entries[1].decl {
        *permissions = Permissions::READABLE;
    }
    server
        .register_service(entries, Arc::new(RecordingHandler::default()))
        .unwrap();
    server.peer_connected(peer(), DeviceType::LowEnergy, params());

    server
        .peer_write(peer(), DeviceType::LowEnergy, 0x0003, &[0x01], true)
        .unwrap();
    assert_eq!(
        transport.write_responses.lock().unwrap()[0],
        (0x0003, AttErrorCode::WriteNotPermitted)
    );
}

// ---- keep-alive gating -----------------------------------------------

#[test]
fn notification_requires_keepalive() {
    let transport = Arc::new(MockTransport::default());
    let server = GattServer::new(transport.clone());

    let instance = server
        .register_service(
            simple_table(
                AttrValue::Dynamic { max_len: 4 },
                Properties::READ | Properties::NOTIFY,
            ),
            Arc::new(RecordingHandler::default()),
        )
        .unwrap();
    server.peer_connected(peer(), DeviceType::LowEnergy, params());

    let before = server.send_notification(
        instance,
        peer(),
        DeviceType::LowEnergy,
        0x0003,
        &[0x01],
    );
    assert!(matches!(before, Err(SrvError::NotConnected)));

    server
        .set_keepalive(instance, peer(), DeviceType::LowEnergy, true)
        .unwrap();
    server
        .send_notification(instance, peer(), DeviceType::LowEnergy, 0x0003, &[0x01])
        .unwrap();
    assert_eq!(
        transport.notifications.lock().unwrap()[0],
        (0x0003, vec![0x01])
    );

    server
        .set_keepalive(instance, peer(), DeviceType::LowEnergy, false)
        .unwrap();
    let after = server.send_notification(
        instance,
        peer(),
        DeviceType::LowEnergy,
        0x0003,
        &[0x02],
    );
    assert!(matches!(after, Err(SrvError::NotConnected)));
}

#[test]
fn keepalive_toggling_is_idempotency_checked() {
    let server = GattServer::new(Arc::new(MockTransport::default()));
    let instance = server
        .register_service(
            simple_table(AttrValue::Static(vec![1]), Properties::READ),
            Arc::new(RecordingHandler::default()),
        )
        .unwrap();
    server.peer_connected(peer(), DeviceType::LowEnergy, params());

    server
        .set_keepalive(instance, peer(), DeviceType::LowEnergy, true)
        .unwrap();
    assert!(matches!(
        server.set_keepalive(instance, peer(), DeviceType::LowEnergy, true),
        Err(SrvError::Busy)
    ));
    server
        .set_keepalive(instance, peer(), DeviceType::LowEnergy, false)
        .unwrap();
    assert!(matches!(
        server.set_keepalive(instance, peer(), DeviceType::LowEnergy, false),
        Err(SrvError::NotConnected)
    ));
}

#[test]
fn indication_requires_indicate_property() {
    let server = GattServer::new(Arc::new(MockTransport::default()));
    let instance = server
        .register_service(
            simple_table(
                AttrValue::Dynamic { max_len: 4 },
                Properties::READ | Properties::NOTIFY,
            ),
            Arc::new(RecordingHandler::default()),
        )
        .unwrap();
    server.peer_connected(peer(), DeviceType::LowEnergy, params());
    server
        .set_keepalive(instance, peer(), DeviceType::LowEnergy, true)
        .unwrap();

    assert!(matches!(
        server.send_indication(instance, peer(), DeviceType::LowEnergy, 0x0003, &[1]),
        Err(SrvError::InvalidArgs(_))
    ));
}

// ---- reentrancy and link-type guards ---------------------------------

struct PushingHandler {
    server: Mutex<Option<Arc<GattServer>>>,
    result: Mutex<Option<crate::SrvResult<()>>>,
}

impl ServiceEvents for PushingHandler {
    fn read_request(&self, instance: InstanceId, addr: BdAddr, device: DeviceType, handle: u16) {
        let server = self.server.lock().unwrap().clone().unwrap();
        // Pushing from inside the dispatch must be refused, not deadlock
        let pushed = server.send_notification(instance, addr, device, handle, &[0x00]);
        *self.result.lock().unwrap() = Some(pushed);
        let _ = server.send_read_rsp(instance, addr, device, handle, AttErrorCode::NoError, &[0x01]);
    }
}

#[test]
fn push_from_callback_fails_deadlock() {
    let transport = Arc::new(MockTransport::default());
    let server = Arc::new(GattServer::new(transport.clone()));
    let handler = Arc::new(PushingHandler {
        server: Mutex::new(Some(server.clone())),
        result: Mutex::new(None),
    });

    let instance = server
        .register_service(
            simple_table(
                AttrValue::Dynamic { max_len: 4 },
                Properties::READ | Properties::NOTIFY,
            ),
            handler.clone(),
        )
        .unwrap();
    server.peer_connected(peer(), DeviceType::LowEnergy, params());
    server
        .set_keepalive(instance, peer(), DeviceType::LowEnergy, true)
        .unwrap();

    server.peer_read(peer(), DeviceType::LowEnergy, 0x0003).unwrap();

    let pushed = handler.result.lock().unwrap().take().unwrap();
    assert!(matches!(pushed, Err(SrvError::Deadlock)));
    // The synchronous response path from inside the callback still works
    assert_eq!(
        transport.read_responses.lock().unwrap()[0],
        (0x0003, AttErrorCode::NoError, vec![0x01])
    );
    assert!(transport.notifications.lock().unwrap().is_empty());

    // The same push succeeds once made from outside the dispatch
    server
        .send_notification(instance, peer(), DeviceType::LowEnergy, 0x0003, &[0x00])
        .unwrap();
    assert_eq!(transport.notifications.lock().unwrap().len(), 1);
}

#[test]
fn update_connection_rejected_on_classic_link() {
    let transport = Arc::new(MockTransport::default());
    let server = GattServer::new(transport.clone());
    let instance = server
        .register_service(
            simple_table(AttrValue::Static(vec![1]), Properties::READ),
            Arc::new(RecordingHandler::default()),
        )
        .unwrap();
    server.peer_connected(peer(), DeviceType::Classic, params());

    assert!(matches!(
        server.update_connection(instance, peer(), DeviceType::Classic, params()),
        Err(SrvError::NotSupported)
    ));

    server.peer_connected(peer(), DeviceType::LowEnergy, params());
    server
        .update_connection(instance, peer(), DeviceType::LowEnergy, params())
        .unwrap();
    assert_eq!(transport.conn_updates.lock().unwrap().len(), 1);
}

#[test]
fn cross_thread_response_completes_pending_request() {
    let transport = Arc::new(MockTransport::default());
    let server = Arc::new(GattServer::new(transport.clone()));
    let handler = Arc::new(RecordingHandler::default());

    let instance = server
        .register_service(
            simple_table(AttrValue::Dynamic { max_len: 8 }, Properties::READ),
            handler,
        )
        .unwrap();
    server.peer_connected(peer(), DeviceType::LowEnergy, params());
    server.peer_read(peer(), DeviceType::LowEnergy, 0x0003).unwrap();

    let worker = {
        let server = server.clone();
        std::thread::spawn(move || {
            server.send_read_rsp(
                instance,
                peer(),
                DeviceType::LowEnergy,
                0x0003,
                AttErrorCode::NoError,
                &[0x42],
            )
        })
    };
    worker.join().unwrap().unwrap();
    assert_eq!(
        transport.read_responses.lock().unwrap()[0],
        (0x0003, AttErrorCode::NoError, vec![0x42])
    );
}
