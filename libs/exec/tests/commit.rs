//! End-to-end commit scenarios against the mock management API.
//!
//! These tests drive the full engine: handle construction, the ordered
//! create/stop/reconfigure/refresh/start pass, cache updates, and event
//! publication.

use std::collections::BTreeMap;
use std::sync::Arc;

use gantry_events::ContainerEventKind;
use gantry_exec::{
    migration, CommitEngine, CommitError, Container, ContainerCache, EventSink, FolderRef,
    Handle, MockGuest, MockVmService, Placement, PowerState, RecordingSink, Session, TargetState,
    Vm, VmConfig, VmService, VmSpec,
};
use gantry_id::ContainerId;
use rstest::rstest;

struct Harness {
    engine: CommitEngine,
    cache: Arc<ContainerCache>,
    service: Arc<MockVmService>,
    events: Arc<RecordingSink>,
    guest: Arc<MockGuest>,
    session: Session,
}

fn harness() -> Harness {
    harness_with(Arc::new(MockVmService::new()), Arc::new(MockGuest::new()))
}

fn harness_with(service: Arc<MockVmService>, guest: Arc<MockGuest>) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let cache = Arc::new(ContainerCache::new());
    let events = Arc::new(RecordingSink::new());
    let engine = CommitEngine::new(
        Arc::clone(&cache),
        Arc::clone(&events) as Arc<dyn EventSink>,
        Arc::clone(&guest) as Arc<dyn gantry_exec::GuestOps>,
    );
    let session = Session::new(
        Arc::clone(&service) as Arc<dyn VmService>,
        Placement::Folder(FolderRef::new("/dc/vm")),
    );
    Harness {
        engine,
        cache,
        service,
        events,
        guest,
        session,
    }
}

fn spec(name: &str) -> VmSpec {
    VmSpec::new(name, 1, 512)
}

/// Registers a container in the cache the way a prior successful commit (or
/// discovery) would have: VM exists on the remote side, snapshots cached.
async fn seeded_container(h: &Harness, power: PowerState) -> Arc<Container> {
    let vm_id = h
        .service
        .create_vm(&spec("ctr-seed"), &FolderRef::new("/dc/vm"))
        .await
        .unwrap();
    if power == PowerState::PoweredOn {
        h.service.power_on(vm_id).await.unwrap();
    }
    let (runtime, config) = h.service.fetch_state(vm_id).await.unwrap();

    let container = Arc::new(Container::new(
        ContainerId::new(),
        Vm::new(Arc::clone(&h.service) as Arc<dyn VmService>, vm_id),
        Some(runtime),
        Some(config),
    ));
    h.cache.put(Arc::clone(&container)).await;
    container
}

// Scenario A: empty cache, spec present, target Running, no remote ref.
#[tokio::test]
async fn creation_with_running_target_creates_and_starts() {
    let h = harness();
    let id = ContainerId::new();
    let mut handle = Handle::create(id, spec("ctr-web"));
    handle.set_target_state(TargetState::Running);

    h.engine.commit(Some(&h.session), &mut handle).await.unwrap();

    assert_eq!(h.cache.len().await, 1);
    let container = h.cache.get(&id).await.unwrap();
    assert_eq!(
        h.service.power_state(container.vm().id()).await,
        Some(PowerState::PoweredOn)
    );
    assert_eq!(
        h.events.kinds(),
        vec![ContainerEventKind::Created, ContainerEventKind::Started]
    );
    // The spec was consumed by creation; no reconfigure ran.
    assert!(handle.spec().is_none());
    assert_eq!(h.service.counts().await.reconfigures, 0);
}

// Scenario B: powered-on container, new spec, target Stopped.
#[tokio::test]
async fn stop_then_reconfigure_uses_cached_change_version() {
    let h = harness();
    let container = seeded_container(&h, PowerState::PoweredOn).await;
    let cached_version = container.config().await.unwrap().change_version;

    let mut handle = Handle::from_container(&container).await;
    handle.set_spec(spec("ctr-seed-v2"));
    handle.set_target_state(TargetState::Stopped);

    h.engine.commit(None, &mut handle).await.unwrap();

    assert_eq!(h.events.kinds(), vec![ContainerEventKind::Stopped]);
    let reconfigures = h.service.reconfigures().await;
    assert_eq!(reconfigures.len(), 1);
    assert_eq!(
        reconfigures[0].change_version.as_deref(),
        Some(cached_version.as_str())
    );
    // The cache saw the refreshed runtime even though no start ran.
    assert_eq!(
        container.runtime().await.unwrap().power_state,
        PowerState::PoweredOff
    );
}

// Scenario C: two commits race on the same container with the same cached tag.
#[tokio::test]
async fn racing_commits_surface_concurrent_access_to_exactly_one() {
    let h = harness();
    let container = seeded_container(&h, PowerState::PoweredOff).await;

    let mut first = Handle::from_container(&container).await;
    first.set_spec(spec("ctr-a"));
    let mut second = Handle::from_container(&container).await;
    second.set_spec(spec("ctr-b"));

    let (r1, r2) = tokio::join!(
        h.engine.commit(None, &mut first),
        h.engine.commit(None, &mut second)
    );

    let (winner, loser) = if r1.is_ok() { (r1, r2) } else { (r2, r1) };
    assert!(winner.is_ok());
    let err = loser.unwrap_err();
    assert!(err.is_concurrent_access(), "got {err:?}");
}

#[tokio::test]
async fn repeated_stop_issues_at_most_one_power_off() {
    let h = harness();
    let container = seeded_container(&h, PowerState::PoweredOn).await;

    let mut first = Handle::from_container(&container).await;
    first.set_target_state(TargetState::Stopped);
    h.engine.commit(None, &mut first).await.unwrap();

    // The refreshed cache now reports powered-off; the second stop must not
    // error and must not issue another task.
    let mut second = Handle::from_container(&container).await;
    second.set_target_state(TargetState::Stopped);
    h.engine.commit(None, &mut second).await.unwrap();

    assert_eq!(h.service.counts().await.power_offs, 1);
    assert_eq!(h.events.kinds(), vec![ContainerEventKind::Stopped]);
}

#[tokio::test]
async fn stale_change_version_is_concurrent_access_not_generic() {
    let h = harness();
    let container = seeded_container(&h, PowerState::PoweredOff).await;

    // Somebody else writes first, advancing the remote tag past the cache.
    let mut external = spec("ctr-external");
    external.change_version = Some(container.config().await.unwrap().change_version);
    h.service
        .reconfigure(container.vm().id(), &external)
        .await
        .unwrap();

    let mut handle = Handle::from_container(&container).await;
    handle.set_spec(spec("ctr-mine"));

    let err = h.engine.commit(None, &mut handle).await.unwrap_err();
    assert!(matches!(err, CommitError::ConcurrentAccess { .. }));
}

#[tokio::test]
async fn migrated_config_is_withheld_from_reconfigure() {
    let h = harness();

    // A VM whose persisted config predates the current schema.
    let vm_id = h
        .service
        .create_vm(&spec("ctr-old"), &FolderRef::new("/dc/vm"))
        .await
        .unwrap();
    let (runtime, current) = h.service.fetch_state(vm_id).await.unwrap();
    let mut extra_config = BTreeMap::new();
    extra_config.insert("gantry.session".to_string(), "abc".to_string());
    let legacy = VmConfig {
        schema_version: 1,
        extra_config,
        ..current
    };

    let container = Arc::new(Container::new(
        ContainerId::new(),
        Vm::new(Arc::clone(&h.service) as Arc<dyn VmService>, vm_id),
        Some(runtime),
        Some(legacy),
    ));
    h.cache.put(Arc::clone(&container)).await;

    let mut handle = Handle::from_container(&container).await;
    assert!(handle.migrated());
    assert_eq!(
        handle.config().unwrap().schema_version,
        migration::DATA_VERSION
    );

    let mut extra = BTreeMap::new();
    extra.insert("guestinfo.gantry.session".to_string(), "def".to_string());
    handle.set_spec(spec("ctr-old").with_extra_config(extra));

    h.engine.commit(None, &mut handle).await.unwrap();

    let reconfigures = h.service.reconfigures().await;
    assert_eq!(reconfigures.len(), 1);
    assert!(reconfigures[0].extra_config.is_none());
}

#[tokio::test]
async fn converged_handle_recommit_is_a_no_op() {
    let h = harness();
    let container = seeded_container(&h, PowerState::PoweredOn).await;
    let before = h.service.counts().await;

    let mut handle = Handle::from_container(&container).await;
    handle.set_target_state(TargetState::Running);

    h.engine.commit(None, &mut handle).await.unwrap();

    assert_eq!(h.service.counts().await, before);
    assert!(h.events.events().is_empty());
}

#[rstest]
#[case(PowerState::PoweredOn, TargetState::Running)]
#[case(PowerState::PoweredOff, TargetState::Stopped)]
#[tokio::test]
async fn duplicate_power_operation_is_dropped(
    #[case] power: PowerState,
    #[case] target: TargetState,
) {
    let h = harness();
    let container = seeded_container(&h, power).await;
    let before = h.service.counts().await;

    let mut handle = Handle::from_container(&container).await;
    handle.set_target_state(target);

    h.engine.commit(None, &mut handle).await.unwrap();

    assert_eq!(h.service.counts().await, before);
    assert!(h.events.events().is_empty());
}

#[tokio::test]
async fn stop_with_unknown_runtime_still_stops_and_refreshes() {
    let h = harness();
    let vm_id = h
        .service
        .create_vm(&spec("ctr-stale"), &FolderRef::new("/dc/vm"))
        .await
        .unwrap();
    h.service.power_on(vm_id).await.unwrap();
    let (_, config) = h.service.fetch_state(vm_id).await.unwrap();

    // Cache entry with no runtime snapshot at all.
    let container = Arc::new(Container::new(
        ContainerId::new(),
        Vm::new(Arc::clone(&h.service) as Arc<dyn VmService>, vm_id),
        None,
        Some(config),
    ));
    h.cache.put(Arc::clone(&container)).await;

    let mut handle = Handle::from_container(&container).await;
    handle.set_target_state(TargetState::Stopped);

    h.engine.commit(None, &mut handle).await.unwrap();

    assert_eq!(h.service.power_state(vm_id).await, Some(PowerState::PoweredOff));
    assert_eq!(h.events.kinds(), vec![ContainerEventKind::Stopped]);
    assert_eq!(
        container.runtime().await.unwrap().power_state,
        PowerState::PoweredOff
    );
}

#[tokio::test]
async fn reload_request_reaches_running_guest() {
    let h = harness();
    let container = seeded_container(&h, PowerState::PoweredOn).await;

    let mut handle = Handle::from_container(&container).await;
    handle.set_spec(spec("ctr-seed-v2"));
    handle.request_reload();

    h.engine.commit(None, &mut handle).await.unwrap();

    let reloads = h.guest.reloads().await;
    assert_eq!(reloads, vec![(container.vm().id(), "reload".to_string())]);
}

#[tokio::test]
async fn reload_is_skipped_for_stopped_container() {
    let h = harness();
    let container = seeded_container(&h, PowerState::PoweredOff).await;

    let mut handle = Handle::from_container(&container).await;
    handle.set_spec(spec("ctr-seed-v2"));
    handle.request_reload();

    h.engine.commit(None, &mut handle).await.unwrap();

    assert!(h.guest.reloads().await.is_empty());
    assert_eq!(h.service.counts().await.reconfigures, 1);
}

#[tokio::test]
async fn failed_reload_does_not_fail_the_commit() {
    let h = harness_with(Arc::new(MockVmService::new()), Arc::new(MockGuest::failing()));
    let container = seeded_container(&h, PowerState::PoweredOn).await;

    let mut handle = Handle::from_container(&container).await;
    handle.set_spec(spec("ctr-seed-v2"));
    handle.request_reload();

    h.engine.commit(None, &mut handle).await.unwrap();
    assert_eq!(h.service.counts().await.reconfigures, 1);
}

#[tokio::test]
async fn created_event_survives_a_failed_start() {
    let h = harness_with(
        Arc::new(MockVmService::failing_power()),
        Arc::new(MockGuest::new()),
    );
    let id = ContainerId::new();
    let mut handle = Handle::create(id, spec("ctr-web"));
    handle.set_target_state(TargetState::Running);

    let err = h
        .engine
        .commit(Some(&h.session), &mut handle)
        .await
        .unwrap_err();

    assert!(matches!(err, CommitError::Task(_)));
    // Creation took effect and must stay visible: cache entry and event stand.
    assert_eq!(h.cache.len().await, 1);
    assert_eq!(h.events.kinds(), vec![ContainerEventKind::Created]);
}

#[tokio::test]
async fn reconfigure_is_skipped_when_runtime_unknown() {
    let h = harness();
    let vm_id = h
        .service
        .create_vm(&spec("ctr-stale"), &FolderRef::new("/dc/vm"))
        .await
        .unwrap();

    // Neither runtime nor config is known; the engine must not guess.
    let container = Arc::new(Container::new(
        ContainerId::new(),
        Vm::new(Arc::clone(&h.service) as Arc<dyn VmService>, vm_id),
        None,
        None,
    ));
    h.cache.put(Arc::clone(&container)).await;

    let mut handle = Handle::from_container(&container).await;
    handle.set_spec(spec("ctr-stale-v2"));

    h.engine.commit(None, &mut handle).await.unwrap();
    assert_eq!(h.service.counts().await.reconfigures, 0);
    // The pending spec was not consumed; a later commit may retry it.
    assert!(handle.spec().is_some());
}
