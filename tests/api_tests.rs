use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, test, web};
use dtmfrx::{
    AppConfig, AppState, DtmfReceiver, EdgeDetect, EdgeEvent, MockGpioBackend, PropertyRegistry,
};
use serde_json::Value;

fn sample_config() -> AppConfig {
    AppConfig::from_json(
        r#"
        {
            "http": {
                "host": "localhost:8080",
                "path": "/sys",
                "timeout": 30
            },
            "receiver": {
                "chip": "/dev/gpiochip0",
                "edge": "rising",
                "detected": 73,
                "data": [86, 75, 76, 77],
                "power_down": 87,
                "led": 51,
                "debounce_ms": 20,
                "history_capacity": 8
            }
        }
        "#,
    )
    .expect("valid sample config")
}

struct Fixture {
    config: AppConfig,
    backend: Arc<MockGpioBackend>,
    state: AppState<MockGpioBackend>,
    receiver: DtmfReceiver<MockGpioBackend>,
}

fn fixture() -> Fixture {
    let config = sample_config();
    let backend = Arc::new(MockGpioBackend::default());
    let registry = Arc::new(PropertyRegistry::new());
    let receiver = DtmfReceiver::start(&config.receiver, backend.clone(), &registry)
        .expect("receiver starts");

    Fixture {
        config,
        backend,
        state: AppState { registry },
        receiver,
    }
}

fn press(backend: &MockGpioBackend, bits: [bool; 4], at_secs: u64) {
    for (line, bit) in [86, 75, 76, 77].into_iter().zip(bits) {
        backend.set_input(line, bit);
    }
    backend.fire_edge(EdgeEvent {
        line: 73,
        edge: EdgeDetect::Rising,
        timestamp: Duration::from_secs(at_secs),
    });
}

macro_rules! init_app {
    ($fx:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($fx.state.clone()))
                .service($fx.state.api_scope(&$fx.config.http.path)),
        )
        .await
    };
}

#[actix_rt::test]
async fn list_groups_returns_mounted_group() {
    let fx = fixture();
    let app = init_app!(fx);

    let req = test::TestRequest::get().uri("/sys/dtmf").to_request();
    let groups: Vec<String> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(groups, vec!["gpio73".to_string()]);
}

#[actix_rt::test]
async fn group_lists_every_endpoint() {
    let fx = fixture();
    let app = init_app!(fx);

    let req = test::TestRequest::get().uri("/sys/dtmf/gpio73").to_request();
    let values: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(values["numberPresses"], "0");
    assert_eq!(values["ledOn"], "0");
    assert_eq!(values["isDebounce"], "1");
    assert_eq!(values["isDTMFpd"], "0");
    assert_eq!(values["diffTime"], "0.000000000");
    assert_eq!(values["DTMFdigit"], "invalid");
    assert_eq!(values.as_object().unwrap().len(), 12);
}

#[actix_rt::test]
async fn press_is_visible_through_attributes() {
    let fx = fixture();
    let app = init_app!(fx);
    press(&fx.backend, [true, false, false, false], 10);

    for (attr, expected) in [
        ("numberPresses", "1\n"),
        ("ledOn", "1\n"),
        ("DTMFdata1", "1\n"),
        ("DTMFdata2", "0\n"),
        ("DTMFdata3", "0\n"),
        ("DTMFdata4", "0\n"),
        ("DTMFdigit", "1\n"),
        ("lastTime", "00:00:10.000000000\n"),
    ] {
        let req = test::TestRequest::get()
            .uri(&format!("/sys/dtmf/gpio73/{attr}"))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, expected, "attribute {attr}");
    }
}

#[actix_rt::test]
async fn write_press_count_then_read_back() {
    let fx = fixture();
    let app = init_app!(fx);

    let req = test::TestRequest::post()
        .uri("/sys/dtmf/gpio73/numberPresses")
        .set_payload("42")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::get()
        .uri("/sys/dtmf/gpio73/numberPresses")
        .to_request();
    assert_eq!(test::call_and_read_body(&app, req).await, "42\n");

    press(&fx.backend, [false, true, false, false], 20);
    let req = test::TestRequest::get()
        .uri("/sys/dtmf/gpio73/numberPresses")
        .to_request();
    assert_eq!(test::call_and_read_body(&app, req).await, "43\n");
}

#[actix_rt::test]
async fn malformed_write_succeeds_without_effect() {
    let fx = fixture();
    let app = init_app!(fx);

    let req = test::TestRequest::post()
        .uri("/sys/dtmf/gpio73/isDebounce")
        .set_payload("abc")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::get()
        .uri("/sys/dtmf/gpio73/isDebounce")
        .to_request();
    assert_eq!(test::call_and_read_body(&app, req).await, "1\n");
}

#[actix_rt::test]
async fn write_to_read_only_returns_403() {
    let fx = fixture();
    let app = init_app!(fx);

    let req = test::TestRequest::post()
        .uri("/sys/dtmf/gpio73/ledOn")
        .set_payload("1")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
}

#[actix_rt::test]
async fn unknown_group_or_attribute_returns_404() {
    let fx = fixture();
    let app = init_app!(fx);

    let req = test::TestRequest::get()
        .uri("/sys/dtmf/gpio99/ledOn")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::get()
        .uri("/sys/dtmf/gpio73/bogus")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_rt::test]
async fn wrong_method_returns_405() {
    let fx = fixture();
    let app = init_app!(fx);

    let req = test::TestRequest::put()
        .uri("/sys/dtmf/gpio73/numberPresses")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 405);

    let req = test::TestRequest::post().uri("/sys/dtmf/gpio73").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 405);
}

#[actix_rt::test]
async fn history_returns_latest_presses() {
    let fx = fixture();
    let app = init_app!(fx);
    press(&fx.backend, [true, false, false, false], 1);
    press(&fx.backend, [false, true, false, true], 2);
    press(&fx.backend, [true, true, false, true], 3);

    let req = test::TestRequest::get()
        .uri("/sys/dtmf/gpio73/history?limit=2")
        .to_request();
    let history: Value = test::call_and_read_body_json(&app, req).await;
    let history = history.as_array().unwrap();

    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["digit"], "0");
    assert_eq!(history[1]["digit"], "*");
    assert_eq!(history[1]["code"], 11);
    assert_eq!(history[1]["press_count"], 3);
    assert_eq!(history[1]["timestamp_ms"], 3000);
}

#[actix_rt::test]
async fn stopped_receiver_is_unmounted() {
    let fx = fixture();
    let app = init_app!(fx);
    fx.receiver.stop();

    let req = test::TestRequest::get()
        .uri("/sys/dtmf/gpio73/numberPresses")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::get().uri("/sys/dtmf").to_request();
    let groups: Vec<String> = test::call_and_read_body_json(&app, req).await;
    assert!(groups.is_empty());
}
