//! End-to-end reader behavior over a fault-injecting store.

use proptest::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tlreader_core::{
    type_names, EntityFilters, EntitySet, HealthStatus, ProbeOutcome, ReadContext, ReadOutput,
    ReadRequest, ReaderError, ReaderState, RetrievalSpec, TimelineEntity, TimelineReader,
    CONNECTION_DOWN_MESSAGE,
};
use tlreader_storage::StorageError;
use tlreader_testkit::generators::entities_strategy;
use tlreader_testkit::prelude::*;

const LONG: Duration = Duration::from_secs(3600);

type CountingReader = TimelineReader<FaultyConnector, CountingFactory>;

fn started(fixture: &TimelineFixture) -> (CountingReader, Arc<FaultPlan>) {
    let connector = fixture.faulty_connector();
    let plan = connector.plan();
    let reader =
        TimelineReader::with_factory(fixture.config(LONG), connector, CountingFactory::new())
            .unwrap();
    reader.start().unwrap();
    assert!(wait_for_probes(
        &reader.monitor().unwrap(),
        1,
        Duration::from_secs(5)
    ));
    (reader, plan)
}

fn containers(fixture: &TimelineFixture) -> ReadContext {
    ReadContext::builder(fixture.cluster())
        .app_id("app_1")
        .entity_type("YARN_CONTAINER")
        .build()
}

#[test]
fn returns_exactly_the_stored_entities() {
    let fixture = TimelineFixture::new();
    let a = TimelineEntity::new("YARN_CONTAINER", "container_1").with_created_time(10);
    let b = TimelineEntity::new("YARN_CONTAINER", "container_2").with_created_time(20);
    fixture.put_entity("app_1", &a);
    fixture.put_entity("app_1", &b);
    fixture.put_entity("app_2", &TimelineEntity::new("YARN_CONTAINER", "container_3"));

    let (reader, _plan) = started(&fixture);
    let set = reader
        .get_entities(
            &containers(&fixture),
            &EntityFilters::new(),
            &RetrievalSpec::new(),
        )
        .unwrap();
    assert_eq!(set, EntitySet::from_iter([a, b]));
}

#[test]
fn down_verdict_rejects_every_read_without_dispatch() {
    let fixture = TimelineFixture::new();
    fixture.put_entity("app_1", &TimelineEntity::new("YARN_CONTAINER", "c"));
    let (reader, plan) = started(&fixture);
    let monitor = reader.monitor().unwrap();

    plan.set_offline(true);
    assert_eq!(monitor.run_probe_cycle(), ProbeOutcome::Down);
    let reads_before = plan.read_count();

    let single = ReadContext::builder(fixture.cluster())
        .app_id("app_1")
        .entity_type("YARN_CONTAINER")
        .entity_id("c")
        .build();
    let retrieval = RetrievalSpec::all();
    let filters = EntityFilters::new();

    let results = [
        reader.get_entity(&single, &retrieval).map(|_| ()),
        reader
            .get_entities(&containers(&fixture), &filters, &retrieval)
            .map(|_| ()),
        reader.get_entity_types(&single).map(|_| ()),
        reader
            .read(ReadRequest::EntityTypes { context: &single })
            .map(|_| ()),
    ];
    for result in results {
        let err = result.unwrap_err();
        assert!(err.is_unavailable(), "unexpected error {err:?}");
        assert!(err.is_retryable());
    }

    assert_eq!(reader.dispatcher().factory().calls(), 0);
    assert_eq!(plan.read_count(), reads_before);
}

#[test]
fn recovers_after_outage() {
    let fixture = TimelineFixture::new();
    fixture.put_entity("app_1", &TimelineEntity::new("YARN_CONTAINER", "c"));
    let (reader, plan) = started(&fixture);
    let monitor = reader.monitor().unwrap();

    plan.set_offline(true);
    monitor.run_probe_cycle();
    assert_eq!(
        reader.get_health_status().status,
        HealthStatus::ConnectionFailure
    );

    plan.heal();
    assert_eq!(monitor.run_probe_cycle(), ProbeOutcome::Up);
    assert_eq!(reader.get_health_status().status, HealthStatus::Running);
    let types = reader
        .get_entity_types(&ReadContext::builder(fixture.cluster()).app_id("app_1").build())
        .unwrap();
    assert!(types.contains("YARN_CONTAINER"));
}

#[test]
fn health_never_fails() {
    let fixture = TimelineFixture::new();
    let connector = fixture.faulty_connector();
    let plan = connector.plan();
    let reader = TimelineReader::new(fixture.config(LONG), connector).unwrap();

    let created = reader.get_health_status();
    assert_eq!(created.status, HealthStatus::ConnectionFailure);

    reader.start().unwrap();
    let monitor = reader.monitor().unwrap();
    assert!(wait_for_probes(&monitor, 1, Duration::from_secs(5)));
    let running = reader.get_health_status();
    assert_eq!(running.status, HealthStatus::Running);
    assert_eq!(running.message, "");

    plan.set_offline(true);
    monitor.run_probe_cycle();
    let down = reader.get_health_status();
    assert_eq!(down.status, HealthStatus::ConnectionFailure);
    assert_eq!(down.message, CONNECTION_DOWN_MESSAGE);

    let json = serde_json::to_value(&down).unwrap();
    assert_eq!(json["status"], "CONNECTION_FAILURE");

    reader.stop().unwrap();
    assert_eq!(
        reader.get_health_status().status,
        HealthStatus::ConnectionFailure
    );
}

#[test]
fn probe_connection_uses_stricter_config() {
    let fixture = TimelineFixture::new();
    let connector = fixture.faulty_connector();
    let plan = connector.plan();
    let config = fixture.config(Duration::from_secs(5));
    let main = config.storage.clone();
    let reader = TimelineReader::new(config, connector).unwrap();
    reader.init().unwrap();

    let opened = plan.opened_configs();
    assert_eq!(opened.len(), 2);
    assert_eq!(opened[0], main);
    assert_eq!(opened[1].rpc_timeout, Duration::from_secs(5));
    assert_eq!(opened[1].scanner_timeout, Duration::from_secs(5));
    assert_eq!(opened[1].retries, 3);
    assert_eq!(opened[1].retry_pause, Duration::from_secs(1));
    assert!(opened[1].retries < opened[0].retries);
}

#[test]
fn slow_backend_times_out_the_probe() {
    let fixture = TimelineFixture::new();
    let connector = fixture.faulty_connector();
    let plan = connector.plan();
    let config = fixture
        .config(LONG)
        .with_probe_timeout(Duration::from_millis(20));
    let reader = TimelineReader::new(config, connector).unwrap();
    reader.start().unwrap();
    let monitor = reader.monitor().unwrap();
    assert!(wait_for_probes(&monitor, 1, Duration::from_secs(5)));

    // Slower than the probe timeout, well within the main connection's
    plan.set_latency(Duration::from_millis(40));
    assert_eq!(monitor.run_probe_cycle(), ProbeOutcome::Down);
    let error = monitor.stats().last_error.unwrap();
    assert!(error.contains("timed out"), "{error}");
}

#[test]
fn stop_closes_probe_then_main_connection() {
    let fixture = TimelineFixture::new();
    let connector = fixture.faulty_connector();
    let plan = connector.plan();
    let reader = TimelineReader::new(fixture.config(LONG), connector).unwrap();
    reader.start().unwrap();
    reader.stop().unwrap();
    assert_eq!(plan.close_count(), 2);

    reader.stop().unwrap();
    drop(reader);
    assert_eq!(plan.close_count(), 2);
}

#[test]
fn health_answers_while_stop_waits_on_slow_storage() {
    let fixture = TimelineFixture::new();
    let connector = fixture.faulty_connector();
    let plan = connector.plan();
    let config = fixture
        .config(LONG)
        .with_probe_timeout(Duration::from_secs(5));
    let reader = Arc::new(TimelineReader::new(config, connector).unwrap());
    reader.start().unwrap();
    let monitor = reader.monitor().unwrap();
    assert!(wait_for_probes(&monitor, 1, Duration::from_secs(5)));

    plan.set_latency(Duration::from_millis(800));
    let cycle = {
        let monitor = Arc::clone(&monitor);
        thread::spawn(move || monitor.run_probe_cycle())
    };
    let deadline = Instant::now() + Duration::from_secs(5);
    while !monitor.is_probing() {
        assert!(Instant::now() < deadline, "probe never started");
        thread::sleep(Duration::from_millis(1));
    }

    let stopper = {
        let reader = Arc::clone(&reader);
        thread::spawn(move || reader.stop())
    };
    while reader.state() != ReaderState::Stopped {
        assert!(Instant::now() < deadline, "reader never stopped");
        thread::sleep(Duration::from_millis(1));
    }

    let asked = Instant::now();
    let report = reader.get_health_status();
    assert!(asked.elapsed() < Duration::from_millis(200));
    assert_eq!(report.status, HealthStatus::ConnectionFailure);
    assert!(matches!(
        reader.get_entity_types(&containers(&fixture)),
        Err(ReaderError::IllegalState { .. })
    ));
    assert!(!stopper.is_finished());

    stopper.join().unwrap().unwrap();
    assert_eq!(cycle.join().unwrap(), ProbeOutcome::Up);
    assert_eq!(plan.close_count(), 2);
}

#[test]
fn init_fails_when_backend_is_unreachable() {
    let fixture = TimelineFixture::new();
    let connector = fixture.faulty_connector();
    connector.plan().set_offline(true);
    let reader = TimelineReader::new(fixture.config(LONG), connector).unwrap();
    assert!(matches!(
        reader.start(),
        Err(ReaderError::Io(StorageError::Unreachable(_)))
    ));
    assert_eq!(reader.state(), ReaderState::Created);
}

#[test]
fn read_failures_past_the_gate_are_io() {
    let fixture = TimelineFixture::new();
    let (reader, plan) = started(&fixture);
    plan.fail_next(1);
    let err = reader
        .get_entities(
            &containers(&fixture),
            &EntityFilters::new(),
            &RetrievalSpec::new(),
        )
        .unwrap_err();
    assert!(matches!(err, ReaderError::Io(StorageError::Io(_))));
    assert!(reader.monitor().unwrap().is_storage_up());
}

#[test]
fn invalid_requests_never_reach_storage() {
    let fixture = TimelineFixture::new();
    let (reader, plan) = started(&fixture);
    let reads_before = plan.read_count();

    let no_app = ReadContext::builder(fixture.cluster())
        .entity_type("YARN_CONTAINER")
        .build();
    assert!(matches!(
        reader.get_entities(&no_app, &EntityFilters::new(), &RetrievalSpec::new()),
        Err(ReaderError::InvalidRequest(_))
    ));
    let flow_activity = ReadContext::builder(fixture.cluster())
        .entity_type(type_names::FLOW_ACTIVITY)
        .entity_id("x")
        .build();
    assert!(matches!(
        reader.get_entity(&flow_activity, &RetrievalSpec::new()),
        Err(ReaderError::InvalidRequest(_))
    ));
    assert_eq!(plan.read_count(), reads_before);
}

#[test]
fn flow_hierarchy_reads() {
    let fixture = TimelineFixture::new();
    for run in [100u64, 200] {
        fixture.put_flow_run(
            "alice",
            "etl",
            run,
            &TimelineEntity::new(type_names::FLOW_RUN, run.to_string()).with_metric("maps", 1, 4),
        );
        fixture.put_application(
            "alice",
            "etl",
            run,
            &TimelineEntity::new(type_names::APPLICATION, format!("app_{run}")),
        );
    }
    fixture.put_flow_activity(
        86_400_000 * 3,
        "alice",
        "etl",
        &TimelineEntity::new(type_names::FLOW_ACTIVITY, "alice@etl"),
    );
    let (reader, _plan) = started(&fixture);

    let runs = ReadContext::builder(fixture.cluster())
        .user_id("alice")
        .flow_name("etl")
        .entity_type(type_names::FLOW_RUN)
        .build();
    match reader
        .read(ReadRequest::Entities {
            context: &runs,
            filters: &EntityFilters::new(),
            retrieval: &RetrievalSpec::all(),
        })
        .unwrap()
    {
        ReadOutput::Entities(set) => {
            assert_eq!(set.ids(), vec!["200", "100"]);
            assert!(set.iter().all(|run| run.latest_metric("maps") == Some(4)));
        }
        other => panic!("unexpected output {other:?}"),
    }

    let app = ReadContext::builder(fixture.cluster())
        .user_id("alice")
        .flow_name("etl")
        .flow_run_id(100)
        .entity_type(type_names::APPLICATION)
        .app_id("app_100")
        .build();
    assert_eq!(
        reader.get_entity(&app, &RetrievalSpec::new()).unwrap().id,
        "app_100"
    );

    let activity = ReadContext::builder(fixture.cluster())
        .entity_type(type_names::FLOW_ACTIVITY)
        .build();
    let set = reader
        .get_entities(&activity, &EntityFilters::new(), &RetrievalSpec::new())
        .unwrap();
    assert_eq!(set.ids(), vec!["alice@etl"]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn collection_reads_return_what_was_stored(
        entities in entities_strategy("YARN_CONTAINER", 12)
    ) {
        let fixture = TimelineFixture::new();
        for entity in &entities {
            fixture.put_entity("app_1", entity);
        }
        let reader = TimelineReader::new(fixture.config(LONG), fixture.connector()).unwrap();
        reader.start().unwrap();

        let set = reader
            .get_entities(&containers(&fixture), &EntityFilters::new(), &RetrievalSpec::new())
            .unwrap();
        prop_assert_eq!(set, entities.into_iter().collect::<EntitySet>());
    }
}
