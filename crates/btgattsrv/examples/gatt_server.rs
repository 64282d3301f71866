//! Example demonstrating a simple GATT attribute server
//!
//! Registers a heart-rate-style service with a static value and drives a
//! simulated peer through the stack-side entry points.

use btgattsrv::{
    AttErrorCode, AttrDecl, AttrValue, Attribute, BdAddr, ConnectionParams, DeviceType, GattServer,
    Permissions, Properties, ServiceEvents, SrvResult, Transport, Uuid,
};
use std::sync::Arc;

/// Transport stub printing what a real stack would put on the air
struct PrintTransport;

impl Transport for PrintTransport {
    fn deliver_read_response(
        &self,
        addr: BdAddr,
        _device: DeviceType,
        handle: u16,
        code: AttErrorCode,
        value: &[u8],
    ) -> SrvResult<()> {
        println!(
            "-> {} read rsp handle=0x{:04x} code={:?} value={}",
            addr,
            handle,
            code,
            hex::encode(value)
        );
        Ok(())
    }

    fn deliver_write_response(
        &self,
        addr: BdAddr,
        _device: DeviceType,
        handle: u16,
        code: AttErrorCode,
    ) -> SrvResult<()> {
        println!("-> {} write rsp handle=0x{:04x} code={:?}", addr, handle, code);
        Ok(())
    }

    fn notify(&self, addr: BdAddr, _device: DeviceType, handle: u16, value: &[u8]) -> SrvResult<()> {
        println!("-> {} notify handle=0x{:04x} value={}", addr, handle, hex::encode(value));
        Ok(())
    }

    fn indicate(
        &self,
        addr: BdAddr,
        _device: DeviceType,
        handle: u16,
        value: &[u8],
    ) -> SrvResult<()> {
        println!("-> {} indicate handle=0x{:04x} value={}", addr, handle, hex::encode(value));
        Ok(())
    }

    fn request_conn_update(
        &self,
        addr: BdAddr,
        _device: DeviceType,
        params: ConnectionParams,
    ) -> SrvResult<()> {
        println!("-> {} conn update interval={}", addr, params.interval);
        Ok(())
    }
}

struct LoggingHandler;

impl ServiceEvents for LoggingHandler {
    fn connected(
        &self,
        instance: btgattsrv::InstanceId,
        addr: BdAddr,
        _device: DeviceType,
        params: ConnectionParams,
    ) {
        println!("<- instance {} connected to {} (interval {})", instance, addr, params.interval);
    }

    fn disconnected(&self, instance: btgattsrv::InstanceId, addr: BdAddr, _device: DeviceType) {
        println!("<- instance {} disconnected from {}", instance, addr);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = GattServer::new(Arc::new(PrintTransport));

    // Heart Rate service: one readable characteristic with a static value
    let entries = vec![
        Attribute {
            uuid: Uuid::from_u16(0x180D),
            handle: 0,
            decl: AttrDecl::Service {
                attr_count: 2,
                start_handle: 0,
                handle_range: 0,
                secondary: false,
                sdp_export: false,
            },
            value: AttrValue::None,
        },
        Attribute {
            uuid: Uuid::from_u16(0x2A38), // Body Sensor Location
            handle: 1,
            decl: AttrDecl::Characteristic {
                properties: Properties::READ,
                permissions: Permissions::READABLE,
                key_size: 0,
                value_handle: 2,
            },
            value: AttrValue::Static(vec![0x01]), // chest
        },
    ];

    let instance = server.register_service(entries, Arc::new(LoggingHandler))?;
    let (start, end) = server.get_service_handles(instance)?;
    println!("registered instance {} at 0x{:04x}..0x{:04x}", instance, start, end);

    // Simulate a peer connecting and reading the characteristic value
    let peer = BdAddr::new([0x55, 0x44, 0x33, 0x22, 0x11, 0x00]);
    let params = ConnectionParams {
        interval: 0x0008,
        latency: 0,
        supervision_timeout: 0x00C8,
    };
    server.peer_connected(peer, DeviceType::LowEnergy, params);
    server.peer_read(peer, DeviceType::LowEnergy, end)?;
    server.peer_disconnected(peer, DeviceType::LowEnergy);

    server.deregister_service(instance)?;
    Ok(())
}
