use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bridge::model::{Attribute, AttributeSet};
use bridge::orion::{MAX_SUBSCRIPTION_PAGES, SUBSCRIPTION_PAGE_SIZE};
use bridge::{
    BrokerConfig, EntityConfig, Error, Location, OrionClient, Published, Publisher, Registrar,
    Registration, SubscriptionRequest,
};
use chrono::{TimeZone, Utc};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::{json, Number};

const ENTITY_ID: &str = "WeatherObserved:Natal";
const ENTITY_TYPE: &str = "WeatherObserved";
const ATTRS_PATH: &str = "/v2/entities/WeatherObserved:Natal/attrs";
const NOTIFY_URL: &str = "http://quantumleap:8668/v2/notify";

fn broker(server: &ServerGuard) -> BrokerConfig {
    BrokerConfig::new(server.url(), "openmeteo_service", "/weather")
}

fn entity() -> EntityConfig {
    EntityConfig::new(ENTITY_ID, ENTITY_TYPE)
}

fn natal() -> Location {
    Location {
        name: "Natal".to_string(),
        latitude: -5.795,
        longitude: -35.195,
    }
}

fn sample_attrs() -> AttributeSet {
    let mut attrs = AttributeSet::new();
    attrs.insert(
        "temperature",
        Attribute::number(Number::from_f64(27.4).unwrap()).with_unit("celsius"),
    );
    attrs.insert("humidity", Attribute::number(Number::from(68)).with_unit("percent"));
    attrs.insert("weatherCode", Attribute::number(Number::from(3)));
    attrs
}

fn publisher(config: BrokerConfig) -> Publisher {
    Publisher::new(OrionClient::new(config).unwrap())
}

fn registrar(config: BrokerConfig) -> Registrar {
    Registrar::new(OrionClient::new(config).unwrap())
}

#[tokio::test]
async fn test_publish_updates_existing_entity() {
    let mut server = Server::new_async().await;
    let patch = server
        .mock("PATCH", ATTRS_PATH)
        .match_header("fiware-service", "openmeteo_service")
        .match_header("fiware-servicepath", "/weather")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(serde_json::to_value(sample_attrs()).unwrap()))
        .with_status(204)
        .expect(2)
        .create_async()
        .await;
    let post = server
        .mock("POST", "/v2/entities")
        .expect(0)
        .create_async()
        .await;

    let publisher = publisher(broker(&server));
    let attrs = sample_attrs();

    assert_eq!(publisher.publish(&entity(), &attrs).await.unwrap(), Published::Updated);
    assert_eq!(publisher.publish(&entity(), &attrs).await.unwrap(), Published::Updated);

    patch.assert_async().await;
    post.assert_async().await;
}

#[tokio::test]
async fn test_publish_creates_after_not_found() {
    let mut server = Server::new_async().await;
    let patch = server
        .mock("PATCH", ATTRS_PATH)
        .with_status(404)
        .with_body(r#"{"error":"NotFound","description":"The requested entity has not been found. Check type and id"}"#)
        .expect(1)
        .create_async()
        .await;
    let post = server
        .mock("POST", "/v2/entities")
        .match_header("fiware-service", "openmeteo_service")
        .match_header("fiware-servicepath", "/weather")
        .match_body(Matcher::Json(json!({
            "id": ENTITY_ID,
            "type": ENTITY_TYPE,
            "temperature": {
                "value": 27.4,
                "type": "Number",
                "metadata": {"unit": {"value": "celsius", "type": "Text"}}
            },
            "humidity": {
                "value": 68,
                "type": "Number",
                "metadata": {"unit": {"value": "percent", "type": "Text"}}
            },
            "weatherCode": {"value": 3, "type": "Number"}
        })))
        .with_status(201)
        .expect(1)
        .create_async()
        .await;

    let result = publisher(broker(&server))
        .publish(&entity(), &sample_attrs())
        .await
        .unwrap();

    assert_eq!(result, Published::Created);
    patch.assert_async().await;
    post.assert_async().await;
}

#[tokio::test]
async fn test_publish_create_failure_is_error() {
    let mut server = Server::new_async().await;
    let _patch = server
        .mock("PATCH", ATTRS_PATH)
        .with_status(404)
        .create_async()
        .await;
    let post = server
        .mock("POST", "/v2/entities")
        .with_status(422)
        .with_body(r#"{"error":"Unprocessable","description":"Already Exists"}"#)
        .expect(1)
        .create_async()
        .await;

    let err = publisher(broker(&server))
        .publish(&entity(), &sample_attrs())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Http { status, .. } if status.as_u16() == 422));
    post.assert_async().await;
}

#[tokio::test]
async fn test_publish_other_status_does_not_create() {
    let mut server = Server::new_async().await;
    let _patch = server
        .mock("PATCH", ATTRS_PATH)
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;
    let post = server
        .mock("POST", "/v2/entities")
        .expect(0)
        .create_async()
        .await;

    let err = publisher(broker(&server))
        .publish(&entity(), &sample_attrs())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Http { status, ref body } if status.as_u16() == 500 && body == "internal error"));
    post.assert_async().await;
}

#[tokio::test]
async fn test_publish_current_fails_closed() {
    let mut server = Server::new_async().await;
    let patch = server
        .mock("PATCH", Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let post = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let current = json!({
        "relative_humidity_2m": 68,
        "weather_code": 3,
        "wind_speed_120m": 5.1
    });

    let err = publisher(broker(&server))
        .publish_current(&entity(), &current, &natal(), Utc::now())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Data(_)));
    patch.assert_async().await;
    post.assert_async().await;
}

#[tokio::test]
async fn test_publish_current_sends_full_attribute_set() {
    let mut server = Server::new_async().await;
    let patch = server
        .mock("PATCH", ATTRS_PATH)
        .match_body(Matcher::Json(json!({
            "temperature": {
                "value": 27.4,
                "type": "Number",
                "metadata": {"unit": {"value": "celsius", "type": "Text"}}
            },
            "humidity": {
                "value": 68,
                "type": "Number",
                "metadata": {"unit": {"value": "percent", "type": "Text"}}
            },
            "weatherCode": {"value": 3, "type": "Number"},
            "windSpeed120": {
                "value": 5.1,
                "type": "Number",
                "metadata": {"unit": {"value": "m/s", "type": "Text"}}
            },
            "location": {"value": "-5.795,-35.195", "type": "geo:point"},
            "dateObserved": {"value": "2025-06-01T12:00:00Z", "type": "DateTime"}
        })))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let current = json!({
        "time": "2025-06-01T09:00",
        "interval": 900,
        "temperature_2m": 27.4,
        "relative_humidity_2m": 68,
        "weather_code": 3,
        "wind_speed_120m": 5.1
    });
    let observed_at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

    let result = publisher(broker(&server))
        .publish_current(&entity(), &current, &natal(), observed_at)
        .await
        .unwrap();

    assert_eq!(result, Published::Updated);
    patch.assert_async().await;
}

#[tokio::test]
async fn test_publish_times_out_on_silent_broker() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(stream);
        }
    });

    let config = BrokerConfig::new(format!("http://{}", addr), "openmeteo_service", "/weather")
        .with_timeout(Duration::from_millis(200));

    let err = publisher(config)
        .publish(&entity(), &sample_attrs())
        .await
        .unwrap_err();

    assert!(err.is_timeout(), "expected timeout, got {:?}", err);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_publish_connection_refused() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = BrokerConfig::new(format!("http://{}", addr), "openmeteo_service", "/weather");
    let err = publisher(config)
        .publish(&entity(), &sample_attrs())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Transport(_)));
    assert!(!err.is_timeout());
}

fn list_mock(server: &mut ServerGuard, body: serde_json::Value) -> mockito::Mock {
    server
        .mock("GET", "/v2/subscriptions")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("limit".into(), "1000".into()),
            Matcher::UrlEncoded("offset".into(), "0".into()),
        ]))
        .match_header("fiware-service", "openmeteo_service")
        .match_header("fiware-servicepath", "/weather")
        .match_header("content-type", Matcher::Missing)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .expect(1)
}

#[tokio::test]
async fn test_subscription_already_exists() {
    let mut server = Server::new_async().await;
    let list = list_mock(
        &mut server,
        json!([
            {
                "id": "57458eb60962ef754e7c0998",
                "status": "active",
                "subject": {
                    "entities": [{"id": ENTITY_ID, "type": ENTITY_TYPE}],
                    "condition": {"attrs": ["temperature"]}
                },
                "notification": {
                    "http": {"url": NOTIFY_URL},
                    "attrs": ["temperature"],
                    "attrsFormat": "normalized"
                }
            }
        ]),
    )
    .create_async()
    .await;
    let post = server
        .mock("POST", "/v2/subscriptions")
        .expect(0)
        .create_async()
        .await;

    let request = SubscriptionRequest::new(entity(), NOTIFY_URL);
    let result = registrar(broker(&server))
        .ensure_subscription(&request)
        .await
        .unwrap();

    assert_eq!(
        result,
        Registration::AlreadyExists {
            id: Some("57458eb60962ef754e7c0998".to_string())
        }
    );
    list.assert_async().await;
    post.assert_async().await;
}

#[tokio::test]
async fn test_subscription_created_when_list_empty() {
    let mut server = Server::new_async().await;
    let list = list_mock(&mut server, json!([])).create_async().await;
    let post = server
        .mock("POST", "/v2/subscriptions")
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(json!({
            "subject": {"entities": [{"id": ENTITY_ID, "type": ENTITY_TYPE}]},
            "notification": {"http": {"url": NOTIFY_URL}, "attrsFormat": "normalized"},
            "throttling": 1
        })))
        .with_status(201)
        .with_header("location", "/v2/subscriptions/5a1b2c3d4e5f")
        .expect(1)
        .create_async()
        .await;

    let request = SubscriptionRequest::new(entity(), NOTIFY_URL);
    let result = registrar(broker(&server))
        .ensure_subscription(&request)
        .await
        .unwrap();

    assert_eq!(
        result,
        Registration::Created {
            id: Some("5a1b2c3d4e5f".to_string())
        }
    );
    list.assert_async().await;
    post.assert_async().await;
}

#[tokio::test]
async fn test_subscription_conflict_on_create() {
    let mut server = Server::new_async().await;
    let _list = list_mock(&mut server, json!([])).create_async().await;
    let _post = server
        .mock("POST", "/v2/subscriptions")
        .with_status(409)
        .with_body(r#"{"error":"Conflict","description":"Already Exists"}"#)
        .create_async()
        .await;

    let request = SubscriptionRequest::new(entity(), NOTIFY_URL);
    let err = registrar(broker(&server))
        .ensure_subscription(&request)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Conflict { .. }));
}

#[tokio::test]
async fn test_subscription_list_failure_skips_create() {
    let mut server = Server::new_async().await;
    let _list = server
        .mock("GET", "/v2/subscriptions")
        .match_query(Matcher::Any)
        .with_status(503)
        .create_async()
        .await;
    let post = server
        .mock("POST", "/v2/subscriptions")
        .expect(0)
        .create_async()
        .await;

    let request = SubscriptionRequest::new(entity(), NOTIFY_URL);
    let err = registrar(broker(&server))
        .ensure_subscription(&request)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Http { status, .. } if status.as_u16() == 503));
    post.assert_async().await;
}

fn filler_page(count: usize) -> serde_json::Value {
    let records: Vec<serde_json::Value> = (0..count)
        .map(|i| {
            json!({
                "id": format!("filler-{}", i),
                "subject": {"entities": [{"id": format!("WeatherObserved:Station{}", i), "type": ENTITY_TYPE}]},
                "notification": {"http": {"url": NOTIFY_URL}}
            })
        })
        .collect();
    serde_json::Value::Array(records)
}

#[tokio::test]
async fn test_subscription_found_on_second_page() {
    let mut server = Server::new_async().await;
    let first = list_mock(&mut server, filler_page(SUBSCRIPTION_PAGE_SIZE))
        .create_async()
        .await;
    let second = server
        .mock("GET", "/v2/subscriptions")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("limit".into(), "1000".into()),
            Matcher::UrlEncoded("offset".into(), "1000".into()),
        ]))
        .with_status(200)
        .with_body(
            json!([{
                "id": "on-page-two",
                "subject": {"entities": [{"id": ENTITY_ID, "type": ENTITY_TYPE}]},
                "notification": {"http": {"url": NOTIFY_URL}}
            }])
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let post = server
        .mock("POST", "/v2/subscriptions")
        .expect(0)
        .create_async()
        .await;

    let request = SubscriptionRequest::new(entity(), NOTIFY_URL);
    let result = registrar(broker(&server))
        .ensure_subscription(&request)
        .await
        .unwrap();

    assert_eq!(
        result,
        Registration::AlreadyExists {
            id: Some("on-page-two".to_string())
        }
    );
    first.assert_async().await;
    second.assert_async().await;
    post.assert_async().await;
}

#[tokio::test]
async fn test_subscription_listing_stops_when_offset_ignored() {
    let mut server = Server::new_async().await;
    let pages = server
        .mock("GET", "/v2/subscriptions")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(filler_page(SUBSCRIPTION_PAGE_SIZE).to_string())
        .expect(MAX_SUBSCRIPTION_PAGES)
        .create_async()
        .await;
    let post = server
        .mock("POST", "/v2/subscriptions")
        .expect(0)
        .create_async()
        .await;

    let request = SubscriptionRequest::new(entity(), NOTIFY_URL);
    let err = registrar(broker(&server))
        .ensure_subscription(&request)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Data(_)));
    pages.assert_async().await;
    post.assert_async().await;
}

#[tokio::test]
async fn test_subscription_already_exists_body_without_409() {
    let mut server = Server::new_async().await;
    let _list = list_mock(&mut server, json!([])).create_async().await;
    let _post = server
        .mock("POST", "/v2/subscriptions")
        .with_status(400)
        .with_body(r#"{"error":"BadRequest","description":"Already Exists"}"#)
        .create_async()
        .await;

    let request = SubscriptionRequest::new(entity(), NOTIFY_URL);
    let err = registrar(broker(&server))
        .ensure_subscription(&request)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Conflict { status, .. } if status.as_u16() == 400));
}

#[tokio::test]
async fn test_publish_empty_attribute_set_sends_nothing() {
    let mut server = Server::new_async().await;
    let any = server
        .mock("PATCH", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let err = publisher(broker(&server))
        .publish(&entity(), &AttributeSet::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Data(_)));
    any.assert_async().await;
}
