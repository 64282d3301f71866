//! Geofence example
//!
//! Builds a small region set, opens a service handle, and feeds a short
//! walk through the engine, printing every fired event.

use geomonitor::{
    EventType, GeoLocation, GeomonitorEngine, GeomonitorService, MonitoringMode, Region,
    RegionStore,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let engine = GeomonitorEngine::new();
    let service = GeomonitorService::open(engine.clone())?;
    let store = RegionStore::new(engine.clone());

    let mut home = Region::new("Home")?;
    home.set_circle_shape(45.342102, -75.770581, 200.0)?;
    home.set_monitoring_mode(MonitoringMode::Persistent);
    store.add(&home)?;

    let mut office = Region::new("Office")?;
    office.set_circle_shape(45.347600, -75.757000, 150.0)?;
    office.set_monitoring_mode(MonitoringMode::Transient);
    office.set_stop_monitoring_event(EventType::Exit);
    store.add(&office)?;

    println!("Monitored regions: {:?}", store.find_all());
    println!("Pollable event fd: {}", service.fd());

    // A short walk: home, toward the office, inside it, then away again.
    let walk = [
        (45.342102, -75.770581),
        (45.345000, -75.764000),
        (45.347600, -75.757000),
        (45.355000, -75.740000),
    ];

    for (i, (lat, lon)) in walk.iter().enumerate() {
        let fix = GeoLocation::new(*lat, *lon, 10.0, 1_700_000_000 + i as u64 * 60)?;
        engine.submit_position(fix)?;
        while let Some(event) = service.try_event() {
            println!(
                "{:?} {} at ({:.6}, {:.6})",
                event.event_type,
                event.region.name(),
                event.location.latitude,
                event.location.longitude
            );
        }
    }

    // The office region removed itself on exit; home is persistent.
    println!("Still monitored: {:?}", store.find_all());

    service.shutdown();
    Ok(())
}
