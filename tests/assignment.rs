use std::{collections::HashMap, sync::Arc};

use abassign::{
    read_segment, Client, ClientConfig, ConfigurationStore, Context, Decision, Event, EventSink,
    ExperimentKey, FileConfigurationSource, Reason, Subject, WalConfig, WalEventSink,
};

const EXPERIMENTS: &str = "tests/data/experiments.json";

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn context(pairs: &[(&str, &str)]) -> Context {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn client() -> Client<'static> {
    let store = ConfigurationStore::load_once(&FileConfigurationSource::new(EXPERIMENTS));
    Client::new_with_configuration_store(ClientConfig::new(), Arc::new(store))
}

#[test]
fn assigns_running_experiment_deterministically() {
    init();

    let client = client();
    let key = ExperimentKey::new("exp1").unwrap();
    let subject = Subject::from_user_id("user123").unwrap();
    let ctx = context(&[("country", "US"), ("app_ver", "42")]);

    let first = client.assign(&key, &subject, &ctx);
    assert_eq!(first.decision, Decision::Assigned);
    assert!(first.treatment == "A" || first.treatment == "B");
    assert!(first.reasons.is_empty());
    assert_eq!(first.config_version, client.configuration_store().version());

    for _ in 0..10 {
        assert_eq!(client.assign(&key, &subject, &ctx), first);
    }
}

#[test]
fn explains_control_decisions() {
    init();

    let client = client();
    let subject = Subject::from_user_id("user123").unwrap();
    let ctx = context(&[("country", "US"), ("app_ver", "42")]);

    let paused = client.assign(&ExperimentKey::new("paused-checkout").unwrap(), &subject, &ctx);
    assert_eq!(paused.treatment, "control");
    assert_eq!(paused.decision, Decision::Fallback);
    assert_eq!(paused.reasons, vec![Reason::NotRunningOrMissing]);

    let missing = client.assign(&ExperimentKey::new("nope").unwrap(), &subject, &ctx);
    assert_eq!(missing.decision, Decision::Fallback);

    let ended = client.assign(&ExperimentKey::new("ended-banner").unwrap(), &subject, &ctx);
    assert_eq!(ended.decision, Decision::Ineligible);
    assert_eq!(ended.reasons, vec![Reason::OutOfWindow]);

    let onboarding = ExperimentKey::new("targeted-onboarding").unwrap();
    let foreign = client.assign(
        &onboarding,
        &subject,
        &context(&[("country", "FR"), ("app_ver", "42")]),
    );
    assert_eq!(foreign.decision, Decision::Ineligible);
    assert_eq!(foreign.reasons, vec![Reason::CountryTargeting]);

    let outdated = client.assign(
        &onboarding,
        &subject,
        &context(&[("country", "CA"), ("app_ver", "41")]),
    );
    assert_eq!(outdated.decision, Decision::Ineligible);
    assert_eq!(outdated.reasons, vec![Reason::MinAppVersion]);
}

#[test]
fn traffic_gate_admits_about_half_of_subjects() {
    init();

    let client = client();
    let key = ExperimentKey::new("targeted-onboarding").unwrap();
    let ctx = context(&[("country", "US"), ("app_ver", "50")]);

    let mut decisions: HashMap<Decision, usize> = HashMap::new();
    for i in 0..10_000 {
        let subject = Subject::from_user_id(&format!("user-{i}")).unwrap();
        let decision = client.assign(&key, &subject, &ctx);
        if decision.decision == Decision::Assigned {
            assert!(["control", "short", "guided"].contains(&decision.treatment.as_str()));
        }
        *decisions.entry(decision.decision).or_default() += 1;
    }

    let assigned = decisions.get(&Decision::Assigned).copied().unwrap_or(0);
    let gated = decisions.get(&Decision::TrafficGate).copied().unwrap_or(0);
    assert_eq!(assigned + gated, 10_000);
    assert!((4_500..=5_500).contains(&assigned), "assigned {assigned}");
}

#[test]
fn exposures_land_in_event_log() {
    init();

    let dir = tempfile::tempdir().unwrap();
    let wal = Arc::new(WalEventSink::open(WalConfig::new(dir.path())).unwrap());
    let store = ConfigurationStore::load_once(&FileConfigurationSource::new(EXPERIMENTS));
    let client = Client::new_with_configuration_store(
        ClientConfig::new().event_sink({
            let wal = Arc::clone(&wal);
            move |event: Event| wal.append(event)
        }),
        Arc::new(store),
    );

    let key = ExperimentKey::new("exp1").unwrap();
    let subject = Subject::from_user_id("user123").unwrap();
    let ctx = context(&[("country", "US")]);
    let decision = client.assign_and_log(&key, &subject, &ctx);
    drop(client);
    wal.flush().unwrap();

    let segments = wal.segments().unwrap();
    assert_eq!(segments.len(), 1);
    let events = read_segment(&segments[0]).unwrap();
    match &events[..] {
        [Event::Exposure(exposure)] => {
            assert_eq!(exposure.experiment, "exp1");
            assert_eq!(exposure.treatment, decision.treatment);
            assert_eq!(exposure.subject, "user:user123");
            assert_eq!(exposure.ctx, ctx);
        }
        other => panic!("unexpected events: {other:?}"),
    }
}
