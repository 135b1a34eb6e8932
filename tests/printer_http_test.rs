//! ePOS-Print transport against a local mock printer.

use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;

use amal_kitchen_lib::error::PrintError;
use amal_kitchen_lib::order::Order;
use amal_kitchen_lib::print::print_kitchen_ticket;
use amal_kitchen_lib::printers::{send_request, HttpTransport, PrinterEndpoint};
use amal_kitchen_lib::settings::PrinterSettings;

const SERVICE_PATH: &str = "/cgi-bin/epos/service.cgi";
const OK_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><response success="true" code="" status="251658262" xmlns="http://www.epson-pos.com/schemas/2011/03/epos-print"/></s:Body></s:Envelope>"#;

fn endpoint(server: &MockServer, timeout_ms: u64) -> PrinterEndpoint {
    PrinterEndpoint {
        address: server.base_url(),
        device_id: "local_printer".into(),
        timeout_ms,
    }
}

async fn send(endpoint: &PrinterEndpoint) -> Result<(), PrintError> {
    let transport = HttpTransport::for_endpoint(endpoint)?;
    send_request(&transport, endpoint, "<epos-print/>".to_string()).await
}

#[tokio::test]
async fn accepted_request_carries_soap_headers_and_device_query() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(SERVICE_PATH)
                .query_param("devid", "local_printer")
                .query_param("timeout", "2000")
                .header("content-type", "text/xml; charset=utf-8")
                .header("soapaction", "\"\"")
                .body("<epos-print/>");
            then.status(200).body(OK_BODY);
        })
        .await;

    send(&endpoint(&server, 2000)).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn server_error_is_rejected_with_status() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(SERVICE_PATH);
            then.status(500).body("Internal Server Error");
        })
        .await;

    let err = send(&endpoint(&server, 2000)).await.unwrap_err();
    assert!(matches!(err, PrintError::Rejected { status: 500 }));
    assert_eq!(err.category(), "printer_rejected");
}

#[tokio::test]
async fn schema_error_marker_means_not_configured_even_on_200() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(SERVICE_PATH);
            then.status(200)
                .body("<soap:Fault><faultstring>SchemaError</faultstring></soap:Fault>");
        })
        .await;

    let err = send(&endpoint(&server, 2000)).await.unwrap_err();
    assert!(matches!(err, PrintError::NotConfigured { ref marker } if marker == "SchemaError"));
    assert!(err.to_string().contains("ePOS-Print"));
}

#[tokio::test]
async fn device_failure_reports_code() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(SERVICE_PATH);
            then.status(200)
                .body(r#"<response success="false" code="EPTR_COVER_OPEN" status="0"/>"#);
        })
        .await;

    let err = send(&endpoint(&server, 2000)).await.unwrap_err();
    assert!(matches!(err, PrintError::Device { ref code } if code == "EPTR_COVER_OPEN"));
    assert!(err.is_transient());
}

#[tokio::test]
async fn slow_printer_times_out_as_unreachable() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(SERVICE_PATH);
            then.status(200).body(OK_BODY).delay(Duration::from_secs(3));
        })
        .await;

    let started = std::time::Instant::now();
    let err = send(&endpoint(&server, 200)).await.unwrap_err();
    assert!(matches!(err, PrintError::Unreachable { .. }));
    assert_eq!(err.category(), "printer_unreachable");
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn closed_port_is_unreachable() {
    let endpoint = PrinterEndpoint {
        address: "http://127.0.0.1:9".into(),
        device_id: "local_printer".into(),
        timeout_ms: 1000,
    };
    let err = send(&endpoint).await.unwrap_err();
    assert!(matches!(err, PrintError::Unreachable { .. }));
}

#[tokio::test]
async fn kitchen_ticket_posts_one_raster_image() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(SERVICE_PATH)
                .body_contains("<image width=\"576\"")
                .body_contains("color=\"color_1\" mode=\"mono\"")
                .body_contains("<cut type=\"feed\"/>");
            then.status(200).body(OK_BODY);
        })
        .await;

    let order = Order::from_row(&json!({
        "id": "b7e4",
        "order_number": 1042,
        "customer_name": "سارة علي",
        "customer_phone": "+966509876543",
        "customer_area": "الدمام",
        "items": [{ "name": "كبة مثلجة", "quantity": 5, "price": 30 }],
        "created_at": "2026-03-06T14:05:00Z"
    }))
    .unwrap();
    let settings = PrinterSettings {
        ip: server.base_url(),
        timeout_ms: 5000,
        ..PrinterSettings::default()
    };

    let transport = HttpTransport::for_endpoint(&PrinterEndpoint::from_settings(&settings)).unwrap();

    print_kitchen_ticket(&order, &settings, &transport).await.unwrap();
    mock.assert_hits_async(1).await;
}
