//! Provisioning flow behind the HTTP routes.
//!
//! [`ProvisioningController`] owns the radio and the time sync service and
//! turns each request into radio operations and a rendered page:
//!
//! - `GET /` serves the setup page, or runs a connect attempt when the query
//!   carries an `ssid`
//! - `GET /scan` lists visible networks as JSON
//! - `POST /configure` runs a connect attempt from the form body
//!
//! The setup access point keeps serving while the station joins, since the
//! browser waiting for the result is connected through it. A successful
//! attempt syncs the RTC from NTP and shows the station address with the
//! device's local time; the access point is retired only after that page has
//! been delivered. A failed attempt re-renders the setup page with the SSID
//! still selected.

mod pages;

pub use pages::{escape_html, setup_page, success_page};

use crate::config::{AccessPointConfig, ConnectionAttempt};
use crate::http::{Handler, HandlerResult, HttpRequest, HttpResponse, StatusCode};
use crate::time::{CalendarTime, RtcClock, TimeSource, TimeSync};
use crate::wifi::{RadioController, RadioDriver};
use log::{error, info, warn};
use serde::Serialize;
use std::time::Duration;

#[derive(Serialize)]
struct ScanResponse {
    networks: Vec<String>,
}

/// Request handler for the setup portal.
pub struct ProvisioningController<D: RadioDriver, C: RtcClock, S: TimeSource> {
    radio: RadioController<D>,
    time_sync: TimeSync<C, S>,
    access_point: AccessPointConfig,
    connect_timeout: Duration,
    utc_offset_secs: i64,
    // Set when a join succeeded and the access point should go after the reply
    retire_access_point: bool,
}

impl<D: RadioDriver, C: RtcClock, S: TimeSource> ProvisioningController<D, C, S> {
    /// `access_point` is re-activated if it is found down after a failed
    /// connect attempt.
    pub fn new(
        radio: RadioController<D>,
        time_sync: TimeSync<C, S>,
        access_point: AccessPointConfig,
        connect_timeout: Duration,
        utc_offset_secs: i64,
    ) -> Self {
        Self {
            radio,
            time_sync,
            access_point,
            connect_timeout,
            utc_offset_secs,
            retire_access_point: false,
        }
    }

    pub fn radio(&self) -> &RadioController<D> {
        &self.radio
    }

    pub fn time_sync(&self) -> &TimeSync<C, S> {
        &self.time_sync
    }

    fn connect(&mut self, ssid: &str, passphrase: &str) -> HttpResponse {
        let attempt = match ConnectionAttempt::new(ssid, passphrase, self.connect_timeout) {
            Ok(attempt) => attempt,
            Err(e) => {
                warn!("Rejected credentials for '{}': {}", ssid, e);
                return failure_page(ssid, &format!("Cannot connect to {}: {}.", ssid, e));
            }
        };

        match self.radio.connect_station(&attempt) {
            Ok(ip) => {
                info!("Provisioned onto '{}' at {}", ssid, ip);
                self.retire_access_point = true;
                let local_time = self.sync_time();
                HttpResponse::html(StatusCode::Ok, success_page(ip, local_time.as_ref()))
            }
            Err(e) => {
                warn!("Failed to join '{}': {}", ssid, e);
                self.restore_access_point();
                failure_page(
                    ssid,
                    &format!(
                        "Failed to connect to {}. Check the password and try again.",
                        ssid
                    ),
                )
            }
        }
    }

    fn sync_time(&mut self) -> Option<CalendarTime> {
        if self.time_sync.sync().is_none() {
            warn!("Continuing with unsynchronized RTC");
        }
        match self.time_sync.local_time(self.utc_offset_secs) {
            Ok(time) => Some(time),
            Err(e) => {
                warn!("Cannot read RTC: {}", e);
                None
            }
        }
    }

    fn restore_access_point(&mut self) {
        if self.radio.driver().ap_active() {
            return;
        }
        if let Err(e) = self.radio.activate_access_point(&self.access_point) {
            error!("Could not restore the setup access point: {}", e);
        }
    }
}

fn failure_page(ssid: &str, message: &str) -> HttpResponse {
    HttpResponse::html(
        StatusCode::InternalServerError,
        setup_page(Some(message), ssid),
    )
}

impl<D: RadioDriver, C: RtcClock, S: TimeSource> Handler for ProvisioningController<D, C, S> {
    fn index(&mut self, request: &HttpRequest) -> HandlerResult {
        let ssid = request.query_param("ssid").map(str::trim).unwrap_or("");
        if ssid.is_empty() {
            return Ok(HttpResponse::html(StatusCode::Ok, setup_page(None, "")));
        }

        let passphrase = request.query_param("password").unwrap_or("");
        Ok(self.connect(ssid, passphrase))
    }

    fn scan(&mut self, _request: &HttpRequest) -> HandlerResult {
        let networks = self.radio.scan().into_iter().collect();
        Ok(HttpResponse::json(&ScanResponse { networks })?)
    }

    fn configure(&mut self, request: &HttpRequest) -> HandlerResult {
        let form = request.form();
        let ssid = form.get("ssid").map(|s| s.trim()).unwrap_or("");
        if ssid.is_empty() {
            return Ok(HttpResponse::html(
                StatusCode::BadRequest,
                setup_page(Some("Select a network to connect to."), ""),
            ));
        }

        let passphrase = form.get("password").map(String::as_str).unwrap_or("");
        Ok(self.connect(ssid, passphrase))
    }

    fn after_response(&mut self) {
        if std::mem::take(&mut self.retire_access_point) {
            if let Err(e) = self.radio.retire_access_point() {
                error!("Could not take the setup access point down: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::handle_connection;
    use crate::time::{MemoryRtc, SntpError};
    use crate::wifi::{RadioEvent, RadioMode, RadioTiming, SimulatedRadio, SIMULATED_STATION_IP};
    use std::io::{self, Cursor, Read, Write};

    /// 2024-06-10 06:13:20 UTC
    const NETWORK_TIME: i64 = 1_718_000_000;

    /// Answers every query with the same time, or fails every query.
    struct FixedSource(Option<i64>);

    impl TimeSource for FixedSource {
        fn query(&mut self, host: &str, _timeout: Duration) -> Result<i64, SntpError> {
            self.0.ok_or_else(|| SntpError::Resolve(host.to_string()))
        }
    }

    type TestController = ProvisioningController<SimulatedRadio, MemoryRtc, FixedSource>;

    fn access_point() -> AccessPointConfig {
        AccessPointConfig::secured("ESP32_Setup", "12345678").unwrap()
    }

    fn controller_with(radio: SimulatedRadio, network_time: Option<i64>) -> TestController {
        let mut radio = RadioController::new(radio, RadioTiming::immediate());
        radio.activate_access_point(&access_point()).unwrap();

        let time_sync = TimeSync::new(
            MemoryRtc::frozen_at(0),
            FixedSource(network_time),
            vec!["pool.ntp.org".into(), "ntp.aliyun.com".into()],
            Duration::from_millis(10),
        );

        ProvisioningController::new(
            radio,
            time_sync,
            access_point(),
            Duration::from_secs(30),
            8 * 3600,
        )
    }

    fn controller() -> TestController {
        controller_with(
            SimulatedRadio::new().with_network("Home", "secret12"),
            Some(NETWORK_TIME),
        )
    }

    struct MockStream {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn exchange(controller: &mut TestController, request: &str) -> String {
        let mut stream = MockStream {
            input: Cursor::new(request.as_bytes().to_vec()),
            output: Vec::new(),
        };
        handle_connection(&mut stream, controller);
        String::from_utf8_lossy(&stream.output).into_owned()
    }

    fn post_configure(controller: &mut TestController, body: &str) -> String {
        exchange(
            controller,
            &format!(
                "POST /configure HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            ),
        )
    }

    // ==================== Setup Page Tests ====================

    #[test]
    fn test_index_serves_setup_page() {
        let mut controller = controller();
        let response = exchange(&mut controller, "GET / HTTP/1.1\r\n\r\n");

        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Content-Type: text/html; charset=utf-8\r\n"));
        assert!(response.contains("fetch('/scan')"));
        assert!(response.contains("const preselected = \"\";"));
        assert_eq!(controller.radio().mode(), RadioMode::AccessPoint);
    }

    #[test]
    fn test_index_blank_ssid_is_setup_page() {
        let mut controller = controller();
        let response = exchange(&mut controller, "GET /?ssid=+++ HTTP/1.1\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(controller.radio().driver().associated_ssid().is_none());
    }

    // ==================== Scan Tests ====================

    #[test]
    fn test_scan_sorted_and_deduplicated() {
        let radio = SimulatedRadio::new()
            .with_network("B", "")
            .with_network("A", "")
            .with_network("B", "");
        let mut controller = controller_with(radio, None);

        let response = exchange(&mut controller, "GET /scan HTTP/1.1\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Content-Type: application/json\r\n"));
        assert!(response.ends_with("\r\n\r\n{\"networks\":[\"A\",\"B\"]}"));

        // Station scoped to the scan only
        assert!(!controller.radio().driver().station_active());
        assert_eq!(controller.radio().mode(), RadioMode::AccessPoint);
    }

    #[test]
    fn test_scan_failure_is_empty_list() {
        let radio = SimulatedRadio::new().with_network("A", "").failing_scan();
        let mut controller = controller_with(radio, None);

        let response = exchange(&mut controller, "GET /scan HTTP/1.1\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with("{\"networks\":[]}"));
    }

    // ==================== Configure Tests ====================

    #[test]
    fn test_configure_without_length_411() {
        let mut controller = controller();
        let response = exchange(
            &mut controller,
            "POST /configure HTTP/1.1\r\n\r\nssid=Home&password=secret12",
        );
        assert!(response.starts_with("HTTP/1.1 411 Length Required\r\n"));
        assert!(controller.radio().driver().associated_ssid().is_none());
    }

    #[test]
    fn test_configure_success() {
        let mut controller = controller();
        let response = post_configure(&mut controller, "ssid=Home&password=secret12");

        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains(&SIMULATED_STATION_IP.to_string()));
        // 06:13:20 UTC shown at UTC+8
        assert!(response.contains(">2024-06-10 14:13:20</strong>"));

        assert_eq!(controller.radio().mode(), RadioMode::Station);
        assert_eq!(controller.radio().driver().associated_ssid(), Some("Home"));
        assert_eq!(controller.time_sync().clock().timestamp(), NETWORK_TIME);
    }

    #[test]
    fn test_configure_reply_travels_over_access_point() {
        let mut controller = controller();
        let response = post_configure(&mut controller, "ssid=Home&password=secret12");
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));

        // Response written while the client's access point is still up
        assert!(controller.radio().driver().ap_active());
        assert!(!controller
            .radio()
            .driver()
            .events()
            .contains(&RadioEvent::ApDisabled));

        controller.after_response();
        assert!(!controller.radio().driver().ap_active());
        assert_eq!(
            controller.radio().driver().events().last(),
            Some(&RadioEvent::ApDisabled)
        );
        assert_eq!(controller.radio().driver().associated_ssid(), Some("Home"));

        // Nothing left to retire
        controller.after_response();
        assert_eq!(
            controller
                .radio()
                .driver()
                .events()
                .iter()
                .filter(|e| **e == RadioEvent::ApDisabled)
                .count(),
            1
        );
    }

    #[test]
    fn test_access_point_retired_once_reply_delivered() {
        use crate::http::HttpServer;
        use std::net::{IpAddr, Ipv4Addr, TcpStream};

        let server = HttpServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).unwrap();
        let addr = server.local_addr().unwrap();

        let client = std::thread::spawn(move || {
            let body = "ssid=Home&password=secret12";
            let mut stream = TcpStream::connect(addr).unwrap();
            write!(
                stream,
                "POST /configure HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            )
            .unwrap();
            let mut response = String::new();
            stream.read_to_string(&mut response).unwrap();
            response
        });

        let mut controller = controller();
        server.serve_one(&mut controller).unwrap();

        let response = client.join().unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains(&SIMULATED_STATION_IP.to_string()));
        assert!(!controller.radio().driver().ap_active());
        assert_eq!(controller.radio().mode(), RadioMode::Station);
    }

    #[test]
    fn test_configure_success_without_network_time() {
        let radio = SimulatedRadio::new().with_network("Home", "secret12");
        let mut controller = controller_with(radio, None);

        let response = post_configure(&mut controller, "ssid=Home&password=secret12");
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains(&SIMULATED_STATION_IP.to_string()));
        // RTC at 1970 is outside the RTC range
        assert!(response.contains(">unavailable</strong>"));
        assert_eq!(controller.time_sync().clock().writes(), 0);
    }

    #[test]
    fn test_configure_timeout_preselects_ssid() {
        let mut controller = controller();
        let response = post_configure(&mut controller, "ssid=Home&password=wrongpass");

        assert!(response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(response.contains("const preselected = \"Home\";"));
        assert!(response.contains("Failed to connect to Home"));

        // Portal never went away, ready for a retry
        assert_eq!(controller.radio().mode(), RadioMode::AccessPoint);
        assert!(controller.radio().driver().ap_active());
        assert!(!controller.radio().driver().station_active());
        assert!(!controller
            .radio()
            .driver()
            .events()
            .contains(&RadioEvent::ApDisabled));
        assert_eq!(controller.time_sync().clock().writes(), 0);

        controller.after_response();
        assert!(controller.radio().driver().ap_active());
    }

    #[test]
    fn test_configure_short_password_preselects_ssid() {
        let mut controller = controller();
        let response = post_configure(&mut controller, "ssid=Home&password=wrong");

        assert!(response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(response.contains("const preselected = \"Home\";"));
        // Never reached the radio
        assert!(!controller
            .radio()
            .driver()
            .events()
            .iter()
            .any(|e| matches!(e, RadioEvent::StationConnect(_))));
    }

    #[test]
    fn test_configure_empty_ssid_400() {
        let mut controller = controller();
        for body in ["ssid=&password=secret12", "password=secret12", "ssid=%20%20"] {
            let response = post_configure(&mut controller, body);
            assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{}", body);
            assert!(response.contains("<div id=\"error-message\">"));
            assert!(response.contains("const preselected = \"\";"));
        }
    }

    #[test]
    fn test_configure_decodes_form() {
        let radio = SimulatedRadio::new().with_network("My Home", "p@ss word");
        let mut controller = controller_with(radio, Some(NETWORK_TIME));

        let response = post_configure(&mut controller, "ssid=My+Home&password=p%40ss+word");
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert_eq!(controller.radio().driver().associated_ssid(), Some("My Home"));
    }

    #[test]
    fn test_configure_escapes_ssid_in_banner() {
        let mut controller = controller();
        let response = post_configure(
            &mut controller,
            "ssid=%3Cscript%3E&password=whatever1",
        );
        assert!(response.starts_with("HTTP/1.1 500"));
        assert!(response.contains("Failed to connect to &lt;script&gt;."));
        assert!(response.contains("const preselected = \"<script>\";"));
        assert!(!response.contains("<script>."));
    }

    #[test]
    fn test_index_query_connect() {
        let mut controller = controller();
        let response = exchange(
            &mut controller,
            "GET /?ssid=Home&password=secret12 HTTP/1.1\r\n\r\n",
        );
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains(&SIMULATED_STATION_IP.to_string()));
    }

    #[test]
    fn test_retry_after_failure() {
        let mut controller = controller();
        let first = post_configure(&mut controller, "ssid=Home&password=wrongpass");
        assert!(first.starts_with("HTTP/1.1 500"));

        controller.after_response();

        let second = post_configure(&mut controller, "ssid=Home&password=secret12");
        assert!(second.starts_with("HTTP/1.1 200 OK\r\n"));
        assert_eq!(controller.radio().mode(), RadioMode::Station);
    }

    #[test]
    fn test_unknown_route_404() {
        let mut controller = controller();
        let response = exchange(&mut controller, "GET /generate_204 HTTP/1.1\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(response.ends_with("\r\n\r\n"));
    }
}
