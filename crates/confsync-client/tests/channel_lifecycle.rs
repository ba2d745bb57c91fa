//! Channel lifecycle tests against the in-memory transport.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use confsync_client::{
    ChannelManager, ChannelState, ClientConfig, ConfigurationClient, ConfigurationUpdate, Error,
    MemoryTransport, Notification, ReconnectPolicy, Subscription,
};
use confsync_core::DocumentRegistry;
use confsync_proto::{ConfigurationVariables, PageFilter, CONFIGURATION_SUBSCRIPTION};
use serde_json::{json, Value};

const WAIT: Duration = Duration::from_secs(2);

fn fast_config() -> ClientConfig {
    ClientConfig::new().with_reconnect(
        ReconnectPolicy::new(Duration::from_millis(5), Duration::from_millis(20)).without_jitter(),
    )
}

fn client(transport: &MemoryTransport, config: ClientConfig) -> ConfigurationClient {
    ConfigurationClient::new(Arc::new(transport.clone()), config).unwrap()
}

fn variables() -> ConfigurationVariables {
    ConfigurationVariables::uniform(PageFilter::new(1, 10))
}

fn applications_payload(ids: &[&str]) -> Value {
    let rows: Vec<Value> = ids.iter().map(|id| json!({"id": id, "name": id})).collect();
    json!({
        "configuration": {
            "applications": {
                "page": 1,
                "page_size": 10,
                "total_count": ids.len(),
                "applications": rows,
            }
        }
    })
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn next<U>(sub: &mut Subscription<U>) -> Notification<U> {
    within(sub.recv()).await.expect("subscription ended")
}

async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT, future)
        .await
        .expect("timed out waiting for notification")
}

fn snapshot(notification: Notification<Arc<ConfigurationUpdate>>) -> (u64, Arc<ConfigurationUpdate>) {
    match notification {
        Notification::Snapshot { sequence, update } => (sequence, update),
        other => panic!("expected snapshot, got {:?}", other),
    }
}

#[tokio::test]
async fn test_identical_subscriptions_share_one_upstream() {
    let transport = MemoryTransport::new();
    let client = client(&transport, fast_config());

    let mut first = client.watch(&variables()).unwrap();
    let mut second = client.watch(&variables()).unwrap();
    wait_until(|| transport.open_count() == 1).await;

    assert_eq!(transport.push(CONFIGURATION_SUBSCRIPTION, applications_payload(&["a"])), 1);

    let (seq_a, update_a) = snapshot(next(&mut first).await);
    let (seq_b, update_b) = snapshot(next(&mut second).await);
    assert_eq!((seq_a, seq_b), (1, 1));
    assert_eq!(update_a, update_b);
    assert_eq!(update_a.applications.as_ref().unwrap().changes.added, vec!["a"]);

    assert_eq!(transport.total_opens(), 1);
    assert_eq!(client.manager().channel_count(), 1);
}

#[tokio::test]
async fn test_only_last_unsubscribe_closes_upstream() {
    let transport = MemoryTransport::new();
    let client = client(&transport, fast_config());

    let first = client.watch(&variables()).unwrap();
    let second = client.watch(&variables()).unwrap();
    wait_until(|| transport.open_count() == 1).await;

    client.unwatch(first.handle()).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(client.manager().listener_count(second.channel()), 1);

    client.unwatch(second.handle()).unwrap();
    wait_until(|| transport.open_count() == 0).await;
    assert_eq!(client.manager().channel_count(), 0);

    assert!(matches!(client.unwatch(second.handle()), Err(Error::NotSubscribed)));
}

#[tokio::test]
async fn test_missing_page_size_opens_nothing() {
    let transport = MemoryTransport::new();
    let client = client(&transport, fast_config());

    let mut vars = variables().to_variables();
    vars.insert("applicationSelector".to_string(), json!({"page": "1"}));

    let err = client
        .manager()
        .subscribe(CONFIGURATION_SUBSCRIPTION, vars)
        .unwrap_err();
    match err {
        Error::InvalidVariables { field, .. } => assert!(field.starts_with("applicationSelector")),
        other => panic!("expected InvalidVariables, got {:?}", other),
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.total_opens(), 0);
    assert_eq!(client.manager().channel_count(), 0);
}

#[tokio::test]
async fn test_disconnect_suspends_then_resumes_with_same_variables() {
    let transport = MemoryTransport::new();
    let client = client(&transport, fast_config());
    let vars = variables();

    let mut sub = client.watch(&vars).unwrap();
    wait_until(|| transport.open_count() == 1).await;
    transport.push(CONFIGURATION_SUBSCRIPTION, applications_payload(&["a"]));
    assert_eq!(snapshot(next(&mut sub).await).0, 1);

    assert_eq!(transport.disconnect(), 1);
    assert!(matches!(next(&mut sub).await, Notification::Suspended { .. }));
    assert_eq!(next(&mut sub).await, Notification::Resumed);

    let requests = transport.open_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].variables, vars.to_variables());
    assert_eq!(transport.total_opens(), 2);
    assert_eq!(
        client.manager().channel_state(sub.channel()),
        Some(ChannelState::Active)
    );

    transport.push(CONFIGURATION_SUBSCRIPTION, applications_payload(&["a", "b"]));
    let (sequence, update) = snapshot(next(&mut sub).await);
    assert_eq!(sequence, 2);
    assert_eq!(update.applications.as_ref().unwrap().changes.added, vec!["b"]);
}

#[tokio::test]
async fn test_listener_joining_during_outage_sees_suspended_first() {
    let transport = MemoryTransport::new();
    let client = client(&transport, fast_config());

    let mut first = client.watch(&variables()).unwrap();
    wait_until(|| transport.open_count() == 1).await;

    transport.fail_next_opens(1000);
    transport.disconnect();
    assert!(matches!(next(&mut first).await, Notification::Suspended { .. }));

    let mut late = client.watch(&variables()).unwrap();
    assert_eq!(late.channel(), first.channel());
    match next(&mut late).await {
        Notification::Suspended { reason } => assert!(!reason.is_empty()),
        other => panic!("expected suspended, got {:?}", other),
    }

    transport.fail_next_opens(0);
    assert_eq!(next(&mut first).await, Notification::Resumed);
    assert_eq!(next(&mut late).await, Notification::Resumed);
    assert_eq!(client.manager().stats().suspensions(), 1);
}

#[tokio::test]
async fn test_explicit_null_selector_fields_share_channel_and_cache() {
    let transport = MemoryTransport::new();
    let client = client(&transport, fast_config());

    let mut sub = client.watch(&variables()).unwrap();

    let mut vars = variables().to_variables();
    vars["applicationSelector"]
        .as_object_mut()
        .unwrap()
        .insert("order".to_string(), Value::Null);
    let spelled_out = client
        .manager()
        .subscribe(CONFIGURATION_SUBSCRIPTION, vars)
        .unwrap();

    assert_eq!(spelled_out.channel(), sub.channel());
    assert_eq!(client.manager().channel_count(), 1);
    assert_eq!(client.manager().listener_count(sub.channel()), 2);

    wait_until(|| transport.open_count() == 1).await;
    transport.push(CONFIGURATION_SUBSCRIPTION, applications_payload(&["a"]));
    snapshot(next(&mut sub).await);

    assert_eq!(transport.total_opens(), 1);
    assert_eq!(transport.open_requests()[0].variables, variables().to_variables());
    let key = client.application_key(&variables());
    assert_eq!(client.applications().ids(&key), vec!["a"]);
}

#[tokio::test]
async fn test_exhausted_reconnect_policy_closes_channel() {
    let transport = MemoryTransport::new();
    let config = ClientConfig::new().with_reconnect(
        ReconnectPolicy::new(Duration::from_millis(1), Duration::from_millis(5))
            .without_jitter()
            .with_max_attempts(2),
    );
    let client = client(&transport, config);

    let mut sub = client.watch(&variables()).unwrap();
    wait_until(|| transport.open_count() == 1).await;

    transport.fail_next_opens(10);
    transport.disconnect();

    assert!(matches!(next(&mut sub).await, Notification::Suspended { .. }));
    assert!(next(&mut sub).await.is_closed());
    assert_eq!(within(sub.recv()).await, None);
    assert_eq!(
        client.manager().channel_state(sub.channel()),
        Some(ChannelState::Closed)
    );
    assert_eq!(client.manager().stats().open_failures(), 2);

    // A new subscriber gets a fresh channel.
    transport.fail_next_opens(0);
    let _fresh = client.watch(&variables()).unwrap();
    wait_until(|| transport.open_count() == 1).await;
}

#[tokio::test]
async fn test_full_listener_queue_drops_newest() {
    let transport = MemoryTransport::new();
    let client = client(&transport, fast_config().with_listener_queue_capacity(2));

    let mut sub = client.watch(&variables()).unwrap();
    wait_until(|| transport.open_count() == 1).await;

    for n in 0..5 {
        let id = format!("app-{}", n);
        transport.push(CONFIGURATION_SUBSCRIPTION, applications_payload(&[id.as_str()]));
    }
    wait_until(|| client.manager().stats().payloads() == 5).await;

    assert_eq!(snapshot(next(&mut sub).await).0, 1);
    assert_eq!(snapshot(next(&mut sub).await).0, 2);
    assert!(sub.try_recv().is_none());
    assert_eq!(client.manager().stats().dropped(), 3);

    // The store still reflects the latest snapshot.
    let key = client.application_key(&variables());
    assert_eq!(client.applications().ids(&key), vec!["app-4"]);
}

#[tokio::test]
async fn test_rejected_payload_keeps_channel_active() {
    let transport = MemoryTransport::new();
    let client = client(&transport, fast_config());

    let mut sub = client.watch(&variables()).unwrap();
    wait_until(|| transport.open_count() == 1).await;

    transport.push(CONFIGURATION_SUBSCRIPTION, json!("not a payload"));
    transport.push(CONFIGURATION_SUBSCRIPTION, applications_payload(&["a"]));

    assert_eq!(snapshot(next(&mut sub).await).0, 1);
    assert_eq!(client.manager().stats().rejected_payloads(), 1);
    assert_eq!(
        client.manager().channel_state(sub.channel()),
        Some(ChannelState::Active)
    );
}

#[tokio::test]
async fn test_null_sub_result_keeps_cached_rows() {
    let transport = MemoryTransport::new();
    let client = client(&transport, fast_config());
    let key = client.application_key(&variables());

    let mut sub = client.watch(&variables()).unwrap();
    wait_until(|| transport.open_count() == 1).await;

    transport.push(CONFIGURATION_SUBSCRIPTION, applications_payload(&["a", "b"]));
    snapshot(next(&mut sub).await);

    transport.push(
        CONFIGURATION_SUBSCRIPTION,
        json!({"configuration": {"applications": null}}),
    );
    let (_, update) = snapshot(next(&mut sub).await);

    assert!(update.applications.is_none());
    assert_eq!(client.applications().ids(&key), vec!["a", "b"]);
}

#[tokio::test]
async fn test_shutdown_closes_every_channel() {
    let transport = MemoryTransport::new();
    let client = client(&transport, fast_config());

    let mut first = client.watch(&variables()).unwrap();
    let mut second = client
        .watch(&variables().with_filters(PageFilter::new(2, 10)))
        .unwrap();
    wait_until(|| transport.open_count() == 2).await;

    client.shutdown();

    assert!(next(&mut first).await.is_closed());
    assert!(next(&mut second).await.is_closed());
    wait_until(|| transport.open_count() == 0).await;
    assert!(matches!(client.watch(&variables()), Err(Error::Shutdown)));
}

#[tokio::test]
async fn test_raw_manager_forwards_payloads() {
    let transport = MemoryTransport::new();
    let manager = ChannelManager::raw(
        Arc::new(DocumentRegistry::with_defaults()),
        Arc::new(transport.clone()),
        fast_config(),
    )
    .unwrap();

    let mut sub = manager
        .subscribe(CONFIGURATION_SUBSCRIPTION, variables().to_variables())
        .unwrap();
    wait_until(|| transport.open_count() == 1).await;

    transport.push(CONFIGURATION_SUBSCRIPTION, json!({"anything": true}));
    match next(&mut sub).await {
        Notification::Snapshot { sequence, update } => {
            assert_eq!(sequence, 1);
            assert_eq!(*update, json!({"anything": true}));
        }
        other => panic!("expected snapshot, got {:?}", other),
    }
}
