//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use confsync_client::{
    ClientConfig, ConfigurationClient, ConfigurationUpdate, MemoryTransport, Notification,
    Subscription,
};
use confsync_core::DocumentRegistry;
use confsync_proto::{
    ConfigurationPayload, ConfigurationVariables, PageFilter, CONFIGURATION_SUBSCRIPTION,
};

use crate::error::CliError;
use crate::formatter::Formatter;

/// How long replay waits for the channel to react.
const REPLAY_WAIT: Duration = Duration::from_secs(5);

/// Print the built-in operation descriptor.
pub fn document(formatter: &dyn Formatter) -> Result<String, CliError> {
    let registry = DocumentRegistry::with_defaults();
    let descriptor = registry.get(CONFIGURATION_SUBSCRIPTION)?;
    Ok(formatter.format_descriptor(&descriptor))
}

/// Validate a variables file against the operation schema.
pub fn validate(path: &Path, formatter: &dyn Formatter) -> Result<String, CliError> {
    let variables = read_variables(path)?;
    let registry = DocumentRegistry::with_defaults();
    registry.validate(CONFIGURATION_SUBSCRIPTION, &variables)?;
    let decoded = ConfigurationVariables::from_variables(&variables)?;
    Ok(formatter.format_variables(&decoded))
}

/// Push recorded payloads through an in-memory channel and format each update.
pub async fn replay(
    payloads: &Path,
    variables: Option<&Path>,
    config: ClientConfig,
    formatter: &dyn Formatter,
) -> Result<String, CliError> {
    let variables = match variables {
        Some(path) => ConfigurationVariables::from_variables(&read_variables(path)?)?,
        None => ConfigurationVariables::uniform(PageFilter::default()),
    };

    let transport = MemoryTransport::new();
    let client = ConfigurationClient::new(Arc::new(transport.clone()), config)?;
    let updates = replay_updates(payloads, &variables, &client, &transport).await;
    client.shutdown();

    let mut output: Vec<String> = updates?
        .iter()
        .enumerate()
        .map(|(i, update)| formatter.format_update(i + 1, update))
        .collect();
    output.push(formatter.format_summary(client.manager().stats()));
    Ok(output.join("\n"))
}

/// Updates produced by each decodable payload line, in file order.
///
/// Blank lines and `#` comments are skipped. Lines that are valid JSON but
/// not a configuration payload are logged and skipped.
async fn replay_updates(
    payloads: &Path,
    variables: &ConfigurationVariables,
    client: &ConfigurationClient,
    transport: &MemoryTransport,
) -> Result<Vec<Arc<ConfigurationUpdate>>, CliError> {
    let content = read(payloads)?;
    let mut subscription = client.watch(variables)?;
    wait_for_upstream(transport).await?;

    let mut updates = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let payload: Value = serde_json::from_str(line).map_err(|source| CliError::Json {
            path: payloads.to_path_buf(),
            line: number + 1,
            source,
        })?;
        if let Err(e) = ConfigurationPayload::from_value(payload.clone()) {
            tracing::warn!(line = number + 1, error = %e, "skipping payload");
            continue;
        }

        transport.push(CONFIGURATION_SUBSCRIPTION, payload);
        updates.push(next_update(&mut subscription).await?);
    }

    Ok(updates)
}

async fn wait_for_upstream(transport: &MemoryTransport) -> Result<(), CliError> {
    let opened = tokio::time::timeout(REPLAY_WAIT, async {
        while transport.open_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    opened.map_err(|_| CliError::Stalled("upstream did not open".to_string()))
}

async fn next_update(
    subscription: &mut Subscription<Arc<ConfigurationUpdate>>,
) -> Result<Arc<ConfigurationUpdate>, CliError> {
    loop {
        let notification = tokio::time::timeout(REPLAY_WAIT, subscription.recv())
            .await
            .map_err(|_| CliError::Stalled("no snapshot for payload".to_string()))?;

        match notification {
            Some(Notification::Snapshot { update, .. }) => return Ok(update),
            Some(Notification::Closed { reason }) | Some(Notification::Suspended { reason }) => {
                return Err(CliError::Stalled(reason));
            }
            Some(Notification::Resumed) => continue,
            None => return Err(CliError::Stalled("channel ended".to_string())),
        }
    }
}

fn read(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn read_variables(path: &Path) -> Result<Map<String, Value>, CliError> {
    let content = read(path)?;
    let value: Value = serde_json::from_str(&content).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        line: source.line(),
        source,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(CliError::NotAnObject(path.to_path_buf())),
    }
}
