//! WiFi provisioning portal firmware binary.
//!
//! On ESP32 (`--features esp32`) this drives the real radio and system clock.
//! On the host it serves the same portal on localhost over a simulated radio,
//! which is handy for working on the pages:
//!
//! ```bash
//! cargo run --bin portal
//! ```

use log::{error, info, warn};
use std::net::IpAddr;
use std::process;
use wifi_portal_esp32::time::RtcClock;
use wifi_portal_esp32::{
    HttpServer, PortalConfig, ProvisioningController, RadioController, RadioDriver, RadioTiming,
    SntpClient, TimeSync,
};

#[cfg(feature = "esp32")]
fn main() {
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use wifi_portal_esp32::time::SystemRtc;
    use wifi_portal_esp32::wifi::EspRadio;

    // Link ESP-IDF patches (must be first!)
    esp_idf_sys::link_patches();

    // Initialize ESP-IDF logger for log crate integration
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("=== WiFi setup portal starting ===");

    let peripherals = match Peripherals::take() {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to take peripherals: {}", e);
            process::exit(1);
        }
    };
    let sysloop = match EspSystemEventLoop::take() {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to take system event loop: {}", e);
            process::exit(1);
        }
    };
    let radio = match EspRadio::new(peripherals.modem, sysloop) {
        Ok(r) => r,
        Err(e) => {
            error!("WiFi driver initialization failed: {}", e);
            process::exit(1);
        }
    };

    run(
        PortalConfig::default(),
        radio,
        SystemRtc::new(),
        RadioTiming::default(),
    )
}

#[cfg(not(feature = "esp32"))]
fn main() {
    use std::net::Ipv4Addr;
    use wifi_portal_esp32::{MemoryRtc, SimulatedRadio};

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("=== WiFi setup portal starting (simulated radio) ===");

    let defaults = PortalConfig {
        port: 8080,
        ..PortalConfig::default()
    };
    let config = match defaults.with_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    // Join "HomeNetwork" with "password123" to see the success page
    let radio = SimulatedRadio::new()
        .with_network("HomeNetwork", "password123")
        .with_network("CoffeeShop", "")
        .with_network("Neighbor 5G", "hunter2hunter2")
        .with_association_delay(2)
        .with_ap_ip(Ipv4Addr::LOCALHOST);

    run(config, radio, MemoryRtc::new(), RadioTiming::immediate())
}

/// Bring the portal up and serve it forever.
///
/// Access point or listener failure is fatal: without them nobody can reach
/// the portal.
fn run<D, C>(config: PortalConfig, driver: D, clock: C, timing: RadioTiming) -> !
where
    D: RadioDriver,
    C: RtcClock,
{
    let access_point = match config.access_point() {
        Ok(ap) => ap,
        Err(e) => {
            error!("Invalid access point configuration: {}", e);
            process::exit(1);
        }
    };

    let mut radio = RadioController::new(driver, timing);
    if let Err(e) = radio.shutdown() {
        warn!("Failed to reset WiFi interfaces: {}", e);
    }

    let ip = match radio.activate_access_point(&access_point) {
        Ok(ip) => ip,
        Err(e) => {
            error!("Access point failed to start: {}", e);
            process::exit(1);
        }
    };

    let server = match HttpServer::bind(IpAddr::V4(ip), config.port) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to bind {}:{}: {}", ip, config.port, e);
            process::exit(1);
        }
    };

    info!("========================================");
    info!("  WiFi network: {}", access_point.ssid());
    if access_point.is_open() {
        info!("  Password:     (open network)");
    } else {
        info!("  Password:     {}", access_point.password());
    }
    info!("  Setup page:   http://{}:{}/", ip, config.port);
    info!("========================================");

    let time_sync = TimeSync::new(
        clock,
        SntpClient::new(),
        config.ntp_servers.clone(),
        config.ntp_timeout,
    );
    let mut controller = ProvisioningController::new(
        radio,
        time_sync,
        access_point,
        config.connect_timeout,
        config.utc_offset_secs,
    );

    server.serve(&mut controller)
}
