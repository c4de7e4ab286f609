use async_trait::async_trait;
use domain::{
    CompareValue, Condition, DataSource, Operator, PackMember, PlcConfig, PlcFamily,
    SinkSelector, TagData, TagPack, TagSelection, TriggerConfig, TriggerStatus,
};
use plcgw_driver::DriverRegistry;
use plcgw_driver::sim::{SimDevice, SimFactory};
use plcgw_sink::{
    DestinationClass, DetachedDestination, Destination, EventMessage, SinkError, SinkHub,
};
use plcgw_supervisor::{ReconnectPolicy, Supervisor, SupervisorSettings};
use plcgw_telemetry::{GatewayMetrics, MemoryEventLog};
use plcgw_trigger::{EngineSettings, TriggerEngine, TriggerError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

struct Recorder {
    sent: Mutex<Vec<EventMessage>>,
    delay: Option<Duration>,
}

impl Recorder {
    fn new(delay: Option<Duration>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            delay,
        }
    }

    fn messages(&self) -> Vec<EventMessage> {
        self.sent.lock().expect("lock").clone()
    }

    fn payloads(&self) -> Vec<serde_json::Value> {
        self.messages()
            .iter()
            .map(|message| serde_json::from_slice(&message.payload).expect("json payload"))
            .collect()
    }
}

#[async_trait]
impl Destination for Recorder {
    async fn send(&self, message: &EventMessage) -> Result<(), SinkError> {
        if let Some(delay) = self.delay {
            sleep(delay).await;
        }
        self.sent.lock().expect("lock").push(message.clone());
        Ok(())
    }
}

struct Harness {
    device: SimDevice,
    supervisor: Supervisor,
    hub: SinkHub,
    engine: TriggerEngine,
    metrics: Arc<GatewayMetrics>,
    recorder: Arc<Recorder>,
}

fn plc() -> PlcConfig {
    let mut config = PlcConfig::new("p1", "10.0.0.1", PlcFamily::S7 { rack: 0, slot: 1 });
    config.poll_rate_ms = Some(250);
    config.timeout_ms = 100;
    config.tags = ["T1", "Ack", "Count", "Mode"]
        .iter()
        .map(|tag| TagSelection::new(*tag))
        .collect();
    config
}

async fn harness(dispatch_timeout: Duration, recorder_delay: Option<Duration>) -> Harness {
    let factory = Arc::new(SimFactory::new());
    let device = factory.device("10.0.0.1");
    device.set_tag("T1", TagData::Int(0));
    device.set_tag("Ack", TagData::Int(0));
    device.set_tag("Count", TagData::Int(7));
    device.set_tag("Mode", TagData::String("AUTO".to_string()));

    let metrics = Arc::new(GatewayMetrics::new());
    let log = Arc::new(MemoryEventLog::new(200));
    let supervisor = Supervisor::new(
        DriverRegistry::new().with_all(factory.clone()),
        SupervisorSettings {
            failure_threshold: 3,
            reconnect: ReconnectPolicy::disabled(),
            event_capacity: 256,
        },
        log.clone(),
        metrics.clone(),
    );
    supervisor.add_plc(plc()).expect("add plc");

    let hub = SinkHub::new();
    let recorder = Arc::new(Recorder::new(recorder_delay));
    hub.register(DestinationClass::Mqtt, "plant", recorder.clone());

    let engine = TriggerEngine::new(
        Arc::new(supervisor.clone()),
        Arc::new(hub.clone()),
        EngineSettings {
            dispatch_timeout,
            transition_capacity: 256,
        },
        log,
        metrics.clone(),
    );
    engine.start();
    supervisor.connect("p1").await.expect("connect");

    Harness {
        device,
        supervisor,
        hub,
        engine,
        metrics,
        recorder,
    }
}

async fn default_harness() -> Harness {
    harness(Duration::from_secs(1), None).await
}

fn trigger(name: &str, tag: &str, condition: Condition) -> TriggerConfig {
    let mut config = TriggerConfig::new(name, "p1", tag, condition);
    config.kafka = SinkSelector::None;
    config
}

fn eq_one() -> Condition {
    Condition::new(Operator::Eq, Some(CompareValue::Int(1)))
}

async fn settle() {
    sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn fires_on_edge_with_payload_and_ack() {
    let h = default_harness().await;
    let mut config = trigger("t1", "T1", eq_one());
    config.ack_tag = Some("Ack".to_string());
    config.selector = "line1/start".to_string();
    config.data = vec![DataSource::Tag {
        plc: None,
        tag: "Count".to_string(),
        alias: None,
    }];
    h.engine.add_trigger(config).expect("add trigger");
    settle().await;
    assert_eq!(
        h.engine.get_trigger_status("t1").expect("status").status,
        TriggerStatus::Armed
    );
    assert!(h.recorder.messages().is_empty());

    h.device.set_tag("T1", TagData::Int(1));
    sleep(Duration::from_millis(250)).await;

    let status = h.engine.get_trigger_status("t1").expect("status");
    assert_eq!(status.fire_count, 1);
    assert_eq!(status.status, TriggerStatus::Armed);
    assert!(status.last_fire_ms.is_some());
    assert_eq!(status.last_error, None);

    let messages = h.recorder.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].key, "line1/start");
    let payload = &h.recorder.payloads()[0];
    assert_eq!(payload["trigger"], "t1");
    assert_eq!(payload["plc"], "p1");
    assert_eq!(payload["tag"], "T1");
    assert_eq!(payload["value"], 1);
    assert_eq!(payload["sequence"], 1);
    assert_eq!(payload["test"], false);
    assert_eq!(payload["selector"], "line1/start");
    assert_eq!(payload["data"][0]["key"], "Count");
    assert_eq!(payload["data"][0]["value"], 7);
    assert!(payload["eventId"].as_str().is_some_and(|id| !id.is_empty()));

    assert!(h.device.writes().contains(&("Ack".to_string(), TagData::Int(1))));
    assert_eq!(h.metrics.snapshot().trigger_fires, 1);
    assert_eq!(h.metrics.snapshot().dispatch_success, 1);

    // 条件保持为真不再触发
    sleep(Duration::from_millis(500)).await;
    assert_eq!(h.engine.get_trigger_status("t1").expect("status").fire_count, 1);
}

#[tokio::test(start_paused = true)]
async fn alternating_tag_fires_once_within_debounce() {
    let h = default_harness().await;
    let mut config = trigger("t1", "T1", eq_one());
    config.debounce_ms = 500;
    h.engine.add_trigger(config).expect("add trigger");

    let toggler = {
        let device = h.device.clone();
        tokio::spawn(async move {
            let mut on = false;
            loop {
                sleep(Duration::from_millis(200)).await;
                on = !on;
                device.set_tag("T1", TagData::Int(i64::from(on)));
            }
        })
    };

    sleep(Duration::from_millis(650)).await;
    assert_eq!(h.engine.get_trigger_status("t1").expect("status").fire_count, 1);
    toggler.abort();
}

#[tokio::test(start_paused = true)]
async fn debounce_suppresses_edge_after_rearm() {
    let h = default_harness().await;
    let mut config = trigger("t1", "T1", eq_one());
    config.debounce_ms = 600;
    h.engine.add_trigger(config).expect("add trigger");
    settle().await;

    h.device.set_tag("T1", TagData::Int(1));
    sleep(Duration::from_millis(250)).await;
    let status = h.engine.get_trigger_status("t1").expect("status");
    assert_eq!(status.fire_count, 1);
    assert_eq!(status.status, TriggerStatus::Cooldown);

    // PLC 移除使触发器进入 Error 并提前结束冷却
    h.supervisor.remove_plc("p1").await.expect("remove plc");
    settle().await;
    assert_eq!(
        h.engine.get_trigger_status("t1").expect("status").status,
        TriggerStatus::Error
    );

    h.supervisor.add_plc(plc()).expect("add plc");
    h.supervisor.connect("p1").await.expect("connect");
    settle().await;
    assert_eq!(
        h.engine.get_trigger_status("t1").expect("status").status,
        TriggerStatus::Armed
    );

    h.device.set_tag("T1", TagData::Int(0));
    sleep(Duration::from_millis(250)).await;
    h.device.set_tag("T1", TagData::Int(1));
    sleep(Duration::from_millis(250)).await;
    let status = h.engine.get_trigger_status("t1").expect("status");
    assert_eq!(status.fire_count, 1);
    assert_eq!(status.status, TriggerStatus::Armed);
    assert_eq!(h.metrics.snapshot().fires_suppressed, 1);

    h.device.set_tag("T1", TagData::Int(0));
    sleep(Duration::from_millis(250)).await;
    h.device.set_tag("T1", TagData::Int(1));
    sleep(Duration::from_millis(250)).await;
    assert_eq!(h.engine.get_trigger_status("t1").expect("status").fire_count, 2);
}

#[tokio::test(start_paused = true)]
async fn unavailable_kafka_writes_negative_ack_and_rearms() {
    let h = default_harness().await;
    h.hub.register(
        DestinationClass::Kafka,
        "lake",
        Arc::new(DetachedDestination::new("kafka transport not linked")),
    );
    let mut config = trigger("t1", "T1", eq_one());
    config.mqtt = SinkSelector::None;
    config.kafka = SinkSelector::All;
    config.ack_tag = Some("Ack".to_string());
    config.cooldown_ms = 1000;
    h.engine.add_trigger(config).expect("add trigger");
    settle().await;

    h.device.set_tag("T1", TagData::Int(1));
    sleep(Duration::from_millis(250)).await;
    let status = h.engine.get_trigger_status("t1").expect("status");
    assert_eq!(status.status, TriggerStatus::Cooldown);
    assert_eq!(status.fire_count, 1);
    assert!(
        status
            .last_error
            .as_deref()
            .is_some_and(|error| error.contains("kafka:lake"))
    );
    assert!(h.device.writes().contains(&("Ack".to_string(), TagData::Int(-1))));
    assert!(h.recorder.messages().is_empty());

    sleep(Duration::from_millis(1000)).await;
    let status = h.engine.get_trigger_status("t1").expect("status");
    assert_eq!(status.status, TriggerStatus::Armed);
    assert!(status.last_error.is_some());
    assert_eq!(status.fire_count, 1);
    assert_eq!(h.metrics.snapshot().dispatch_failure, 1);
}

#[tokio::test(start_paused = true)]
async fn edge_during_cooldown_fires_when_cooldown_ends() {
    let h = default_harness().await;
    let mut config = trigger("t1", "T1", eq_one());
    config.cooldown_ms = 1000;
    h.engine.add_trigger(config).expect("add trigger");
    settle().await;

    h.device.set_tag("T1", TagData::Int(1));
    sleep(Duration::from_millis(250)).await;
    let status = h.engine.get_trigger_status("t1").expect("status");
    assert_eq!(status.fire_count, 1);
    assert_eq!(status.status, TriggerStatus::Cooldown);

    // 冷却期内回落再升高
    h.device.set_tag("T1", TagData::Int(0));
    sleep(Duration::from_millis(300)).await;
    h.device.set_tag("T1", TagData::Int(1));
    sleep(Duration::from_millis(300)).await;
    let status = h.engine.get_trigger_status("t1").expect("status");
    assert_eq!(status.fire_count, 1);
    assert_eq!(status.status, TriggerStatus::Cooldown);

    sleep(Duration::from_millis(500)).await;
    let status = h.engine.get_trigger_status("t1").expect("status");
    assert_eq!(status.fire_count, 2);
    assert_eq!(status.status, TriggerStatus::Cooldown);
    assert_eq!(h.recorder.messages().len(), 2);

    // 持续为真只在边沿触发
    sleep(Duration::from_secs(2)).await;
    let status = h.engine.get_trigger_status("t1").expect("status");
    assert_eq!(status.fire_count, 2);
    assert_eq!(status.status, TriggerStatus::Armed);
}

#[tokio::test(start_paused = true)]
async fn large_integer_thresholds_compare_exactly() {
    let h = default_harness().await;
    let big = 9_007_199_254_740_993_i64;
    h.engine
        .add_trigger(trigger(
            "big",
            "Count",
            Condition::new(Operator::Eq, Some(CompareValue::Int(big))),
        ))
        .expect("add trigger");
    settle().await;

    h.device.set_tag("Count", TagData::Int(big - 1));
    sleep(Duration::from_millis(250)).await;
    let status = h.engine.get_trigger_status("big").expect("status");
    assert_eq!(status.fire_count, 0);
    assert_eq!(status.last_value, Some(TagData::Int(big - 1)));

    h.device.set_tag("Count", TagData::Int(big));
    sleep(Duration::from_millis(250)).await;
    assert_eq!(h.engine.get_trigger_status("big").expect("status").fire_count, 1);
}

#[tokio::test(start_paused = true)]
async fn fatal_ack_failure_holds_error_until_cooldown() {
    let h = default_harness().await;
    h.device.set_read_only("Ack");
    let mut config = trigger("t1", "T1", eq_one());
    config.ack_tag = Some("Ack".to_string());
    config.ack_failure_fatal = true;
    config.cooldown_ms = 1000;
    h.engine.add_trigger(config).expect("add trigger");
    settle().await;

    h.device.set_tag("T1", TagData::Int(1));
    sleep(Duration::from_millis(250)).await;
    let status = h.engine.get_trigger_status("t1").expect("status");
    assert_eq!(status.status, TriggerStatus::Error);
    assert!(
        status
            .last_error
            .as_deref()
            .is_some_and(|error| error.contains("ack write Ack failed"))
    );
    assert_eq!(h.recorder.messages().len(), 1);
    assert_eq!(h.metrics.snapshot().ack_failures, 1);

    sleep(Duration::from_millis(500)).await;
    assert_eq!(
        h.engine.get_trigger_status("t1").expect("status").status,
        TriggerStatus::Error
    );

    sleep(Duration::from_millis(500)).await;
    let status = h.engine.get_trigger_status("t1").expect("status");
    assert_eq!(status.status, TriggerStatus::Armed);
    assert_eq!(status.fire_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_fire_leaves_status_and_debounce_untouched() {
    let h = default_harness().await;
    let mut config = trigger("t1", "T1", eq_one());
    config.ack_tag = Some("Ack".to_string());
    config.debounce_ms = 5000;
    h.engine.add_trigger(config).expect("add trigger");
    settle().await;

    let report = h.engine.test_fire_trigger("t1").await.expect("test fire");
    assert!(report.is_success());
    assert_eq!(report.delivered, vec!["mqtt:plant".to_string()]);
    assert_eq!(report.ack, Some(1));

    let status = h.engine.get_trigger_status("t1").expect("status");
    assert_eq!(status.status, TriggerStatus::Armed);
    assert_eq!(status.fire_count, 1);
    assert!(status.last_fire_ms.is_some());
    let payload = &h.recorder.payloads()[0];
    assert_eq!(payload["test"], true);
    assert_eq!(payload["value"], 0);

    // 测试触发不占用去抖窗口
    h.device.set_tag("T1", TagData::Int(1));
    sleep(Duration::from_millis(250)).await;
    let status = h.engine.get_trigger_status("t1").expect("status");
    assert_eq!(status.fire_count, 2);
    assert_eq!(h.recorder.payloads()[1]["sequence"], 2);
}

#[tokio::test(start_paused = true)]
async fn remove_then_add_resets_history() {
    let h = default_harness().await;
    h.engine
        .add_trigger(trigger("t1", "T1", eq_one()))
        .expect("add trigger");
    settle().await;
    h.device.set_tag("T1", TagData::Int(1));
    sleep(Duration::from_millis(250)).await;
    assert_eq!(h.engine.get_trigger_status("t1").expect("status").fire_count, 1);

    h.engine.remove_trigger("t1").await.expect("remove");
    assert!(matches!(
        h.engine.get_trigger_status("t1"),
        Err(TriggerError::UnknownTrigger(_))
    ));

    h.engine
        .add_trigger(trigger("t1", "T1", eq_one()))
        .expect("add again");
    let status = h.engine.get_trigger_status("t1").expect("status");
    assert_eq!(status.status, TriggerStatus::Armed);
    assert_eq!(status.fire_count, 0);
    assert_eq!(status.last_fire_ms, None);

    // 首次观测只建立基线
    settle().await;
    let status = h.engine.get_trigger_status("t1").expect("status");
    assert_eq!(status.status, TriggerStatus::Armed);
    assert_eq!(status.fire_count, 0);
}

#[tokio::test(start_paused = true)]
async fn source_errors_rearm_when_data_returns() {
    let h = default_harness().await;
    h.engine
        .add_trigger(trigger("t1", "T1", eq_one()))
        .expect("add trigger");
    settle().await;

    h.supervisor.disconnect("p1").await.expect("disconnect");
    settle().await;
    let status = h.engine.get_trigger_status("t1").expect("status");
    assert_eq!(status.status, TriggerStatus::Error);
    assert_eq!(status.last_error.as_deref(), Some("plc p1 is disconnected"));

    h.supervisor.connect("p1").await.expect("connect");
    settle().await;
    let status = h.engine.get_trigger_status("t1").expect("status");
    assert_eq!(status.status, TriggerStatus::Armed);
    assert_eq!(status.last_error, None);

    h.device.set_tag_error("T1", "bad crc");
    sleep(Duration::from_millis(250)).await;
    let status = h.engine.get_trigger_status("t1").expect("status");
    assert_eq!(status.status, TriggerStatus::Error);
    assert!(
        status
            .last_error
            .as_deref()
            .is_some_and(|error| error.contains("bad crc"))
    );
}

#[tokio::test(start_paused = true)]
async fn disconnected_plc_values_are_not_published_as_current() {
    let h = default_harness().await;
    let mut config = trigger("t1", "T1", eq_one());
    config.data = vec![DataSource::Tag {
        plc: None,
        tag: "Count".to_string(),
        alias: None,
    }];
    h.engine.add_trigger(config).expect("add trigger");
    settle().await;

    h.supervisor.disconnect("p1").await.expect("disconnect");
    settle().await;
    h.engine.test_fire_trigger("t1").await.expect("test fire");

    let payload = &h.recorder.payloads()[0];
    assert!(payload["value"].is_null());
    assert_eq!(payload["data"][0]["key"], "Count");
    assert!(payload["data"][0]["value"].is_null());
    assert_eq!(payload["data"][0]["error"], "plc p1 is disconnected");
}

#[tokio::test(start_paused = true)]
async fn mismatched_condition_type_is_an_error() {
    let h = default_harness().await;
    h.engine
        .add_trigger(trigger(
            "mode",
            "Mode",
            Condition::new(Operator::Gt, Some(CompareValue::Int(5))),
        ))
        .expect("add trigger");
    settle().await;
    let status = h.engine.get_trigger_status("mode").expect("status");
    assert_eq!(status.status, TriggerStatus::Error);
    assert!(
        status
            .last_error
            .as_deref()
            .is_some_and(|error| error.contains("cannot compare"))
    );

    h.device.set_tag("Mode", TagData::Int(3));
    sleep(Duration::from_millis(250)).await;
    let status = h.engine.get_trigger_status("mode").expect("status");
    assert_eq!(status.status, TriggerStatus::Armed);
    assert_eq!(status.last_error, None);
}

#[tokio::test(start_paused = true)]
async fn changed_operator_fires_on_every_change() {
    let h = default_harness().await;
    h.engine
        .add_trigger(trigger("count", "Count", Condition::new(Operator::Changed, None)))
        .expect("add trigger");
    settle().await;

    h.device.set_tag("Count", TagData::Int(8));
    sleep(Duration::from_millis(250)).await;
    h.device.set_tag("Count", TagData::Int(9));
    sleep(Duration::from_millis(250)).await;
    sleep(Duration::from_millis(250)).await;

    let status = h.engine.get_trigger_status("count").expect("status");
    assert_eq!(status.fire_count, 2);
    assert_eq!(status.last_value, Some(TagData::Int(9)));
}

#[tokio::test(start_paused = true)]
async fn transitions_follow_the_state_graph() {
    let h = default_harness().await;
    let mut transitions = h.engine.subscribe();
    h.engine
        .add_trigger(trigger("t1", "T1", eq_one()))
        .expect("add trigger");
    settle().await;
    h.device.set_tag("T1", TagData::Int(1));
    sleep(Duration::from_millis(250)).await;
    h.engine.stop_trigger("t1").await.expect("stop");
    h.engine.start_trigger("t1").await.expect("start");
    settle().await;

    let mut seen = Vec::new();
    while let Ok(transition) = transitions.try_recv() {
        assert!(
            transition.from.can_transition_to(transition.to),
            "illegal {:?}",
            transition
        );
        seen.push((transition.from, transition.to));
    }
    for expected in [
        (TriggerStatus::Armed, TriggerStatus::Firing),
        (TriggerStatus::Firing, TriggerStatus::Cooldown),
        (TriggerStatus::Cooldown, TriggerStatus::Armed),
        (TriggerStatus::Armed, TriggerStatus::Disabled),
        (TriggerStatus::Disabled, TriggerStatus::Armed),
    ] {
        assert!(seen.contains(&expected), "missing {:?} in {:?}", expected, seen);
    }
}

#[tokio::test(start_paused = true)]
async fn stopped_trigger_ignores_edges() {
    let h = default_harness().await;
    h.engine
        .add_trigger(trigger("t1", "T1", eq_one()))
        .expect("add trigger");
    settle().await;

    h.engine.stop_trigger("t1").await.expect("stop");
    assert!(!h.engine.get_trigger("t1").expect("config").enabled);
    h.device.set_tag("T1", TagData::Int(1));
    sleep(Duration::from_millis(250)).await;
    let status = h.engine.get_trigger_status("t1").expect("status");
    assert_eq!(status.status, TriggerStatus::Disabled);
    assert_eq!(status.fire_count, 0);

    // 重新布防后以当前值为基线
    h.engine.start_trigger("t1").await.expect("start");
    settle().await;
    assert_eq!(h.engine.get_trigger_status("t1").expect("status").fire_count, 0);

    h.device.set_tag("T1", TagData::Int(0));
    sleep(Duration::from_millis(250)).await;
    h.device.set_tag("T1", TagData::Int(1));
    sleep(Duration::from_millis(250)).await;
    assert_eq!(h.engine.get_trigger_status("t1").expect("status").fire_count, 1);
}

#[tokio::test(start_paused = true)]
async fn update_keeps_history_unless_source_changes() {
    let h = default_harness().await;
    h.engine
        .add_trigger(trigger("t1", "T1", eq_one()))
        .expect("add trigger");
    settle().await;
    h.device.set_tag("T1", TagData::Int(1));
    sleep(Duration::from_millis(250)).await;

    let mut tuned = trigger("t1", "T1", eq_one());
    tuned.debounce_ms = 100;
    h.engine.update_trigger("t1", tuned).await.expect("update");
    assert_eq!(h.engine.get_trigger_status("t1").expect("status").fire_count, 1);
    assert_eq!(h.engine.get_trigger("t1").expect("config").debounce_ms, 100);

    let moved = trigger("t1", "Count", Condition::new(Operator::Gt, Some(CompareValue::Int(100))));
    h.engine.update_trigger("t1", moved).await.expect("update");
    let status = h.engine.get_trigger_status("t1").expect("status");
    assert_eq!(status.fire_count, 0);
    assert_eq!(status.last_fire_ms, None);

    let renamed = trigger("t2", "Count", Condition::new(Operator::Gt, Some(CompareValue::Int(100))));
    h.engine.update_trigger("t1", renamed).await.expect("rename");
    assert!(!h.engine.contains("t1"));
    assert!(h.engine.contains("t2"));
}

#[tokio::test(start_paused = true)]
async fn packs_expand_in_order() {
    let h = default_harness().await;
    h.engine
        .set_pack(TagPack {
            name: "line".to_string(),
            members: vec![
                PackMember {
                    plc: "p1".to_string(),
                    tag: "Count".to_string(),
                    alias: Some("count".to_string()),
                },
                PackMember {
                    plc: "p1".to_string(),
                    tag: "T1".to_string(),
                    alias: None,
                },
            ],
        })
        .expect("set pack");
    let mut config = trigger("t1", "T1", eq_one());
    config.data = vec![
        DataSource::Tag {
            plc: None,
            tag: "Mode".to_string(),
            alias: None,
        },
        DataSource::Pack {
            pack: "line".to_string(),
        },
    ];
    h.engine.add_trigger(config).expect("add trigger");
    settle().await;

    h.engine.test_fire_trigger("t1").await.expect("test fire");
    let payload = &h.recorder.payloads()[0];
    let keys: Vec<&str> = payload["data"]
        .as_array()
        .expect("data array")
        .iter()
        .filter_map(|entry| entry["key"].as_str())
        .collect();
    assert_eq!(keys, vec!["Mode", "count", "T1"]);
    assert_eq!(payload["data"][0]["value"], "AUTO");

    assert!(matches!(
        h.engine.remove_pack("line"),
        Err(TriggerError::InvalidConfig(_))
    ));
    assert!(matches!(
        h.engine.set_pack(TagPack {
            name: "remote".to_string(),
            members: vec![PackMember {
                plc: "p9".to_string(),
                tag: "X".to_string(),
                alias: None,
            }],
        }),
        Err(TriggerError::UnknownPlc(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn slow_destination_times_out() {
    let h = harness(Duration::from_secs(1), Some(Duration::from_secs(2))).await;
    let mut config = trigger("t1", "T1", eq_one());
    config.ack_tag = Some("Ack".to_string());
    h.engine.add_trigger(config).expect("add trigger");
    settle().await;

    let report = h.engine.test_fire_trigger("t1").await.expect("test fire");
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].contains("timeout"));
    assert_eq!(report.ack, Some(-1));
    assert!(
        h.engine
            .get_trigger_status("t1")
            .expect("status")
            .last_error
            .is_some()
    );
}

#[tokio::test(start_paused = true)]
async fn add_rejects_bad_references() {
    let h = default_harness().await;

    let missing_plc = TriggerConfig::new("t1", "p9", "T1", eq_one());
    assert!(matches!(
        h.engine.add_trigger(missing_plc),
        Err(TriggerError::UnknownPlc(_))
    ));

    let mut missing_pack = trigger("t1", "T1", eq_one());
    missing_pack.data = vec![DataSource::Pack {
        pack: "nope".to_string(),
    }];
    assert!(matches!(
        h.engine.add_trigger(missing_pack),
        Err(TriggerError::UnknownPack(_))
    ));

    let mut missing_sink = trigger("t1", "T1", eq_one());
    missing_sink.mqtt = SinkSelector::Named("nope".to_string());
    assert!(matches!(
        h.engine.add_trigger(missing_sink),
        Err(TriggerError::UnknownDestination(_))
    ));

    let no_value = trigger("t1", "T1", Condition::new(Operator::Gt, None));
    assert!(matches!(
        h.engine.add_trigger(no_value),
        Err(TriggerError::InvalidConfig(_))
    ));

    h.engine
        .add_trigger(trigger("t1", "T1", eq_one()))
        .expect("add trigger");
    assert!(matches!(
        h.engine.add_trigger(trigger("t1", "T1", eq_one())),
        Err(TriggerError::AlreadyExists(_))
    ));
    assert!(matches!(
        h.engine.remove_trigger("t9").await,
        Err(TriggerError::UnknownTrigger(_))
    ));

    h.engine.shutdown().await;
}
