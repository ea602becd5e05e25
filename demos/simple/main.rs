use std::{collections::HashMap, sync::Arc};

use abassign::{
    ClientConfig, ConfigurationStore, Event, EventSink, ExperimentKey, FileConfigurationSource,
    Settings, Subject, WalEventSink,
};

pub fn main() -> abassign::Result<()> {
    env_logger::init();

    let settings = Settings::from_env()?;
    let source = FileConfigurationSource::new(&settings.config_path);

    let wal = Arc::new(WalEventSink::open(settings.wal_config())?);
    let sink = {
        let wal = Arc::clone(&wal);
        move |event: Event| wal.append(event)
    };

    // Without a poll interval the configuration is read once and never refreshed.
    let (client, poller) = match settings.poller_config() {
        Some(poller_config) => {
            let client = ClientConfig::new().event_sink(sink).to_client();
            let poller = client.start_poller_thread(source, poller_config)?;
            // Block waiting for the first load. A failed load keeps the empty configuration (every
            // assignment falls back to control) while the poller keeps retrying.
            if let Err(err) = poller.wait_for_configuration() {
                log::warn!(target: "abassign", "serving empty configuration: {err}");
            }
            (client, Some(poller))
        }
        None => {
            let store = Arc::new(ConfigurationStore::load_once(&source));
            let client = abassign::Client::new_with_configuration_store(
                ClientConfig::new().event_sink(sink),
                store,
            );
            (client, None)
        }
    };

    let experiment = ExperimentKey::new("exp1")?;
    let subject = Subject::from_user_id("user123")?;
    let context = HashMap::from([
        ("country".to_owned(), "US".to_owned()),
        ("app_ver".to_owned(), "42".to_owned()),
    ]);

    let decision = client.assign_and_log(&experiment, &subject, &context);
    let decision = serde_json::to_string_pretty(&decision)
        .map_err(|err| abassign::Error::Serialization(Arc::new(err)))?;
    println!("Decision: {decision}");

    if let Some(poller) = poller {
        poller.shutdown()?;
    }
    drop(client);
    wal.close()?;

    Ok(())
}
