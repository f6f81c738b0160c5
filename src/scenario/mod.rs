//! Scripted membership changes.
//!
//! A scenario starts a [`Ring`] with a set of servers and then applies a list of steps,
//! collecting the [`RebalanceReport`] of every pass. This is what the `ringbound` binary
//! runs; see `conf/scenario.json` for an example.
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{event, instrument, Level};

use crate::{
    config::Config,
    error::Result,
    ring::{RebalanceReport, Ring, Server},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    AddServers(Vec<String>),
    RemoveServer(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScenarioConfig {
    #[serde(default)]
    pub ring: Config,
    pub initial_servers: Vec<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl ScenarioConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let stringified_json = std::fs::read_to_string(path)?;
        let mut scenario: ScenarioConfig = serde_json::from_str(&stringified_json)?;
        scenario.ring = scenario.ring.with_defaults()?;
        Ok(scenario)
    }
}

/// Output of [`run`]: the report of the initial distribution followed by one report per step
#[derive(Debug, Serialize)]
pub struct ScenarioOutcome {
    pub initial: RebalanceReport,
    pub steps: Vec<(Step, RebalanceReport)>,
}

#[instrument(level = "info", skip(scenario), fields(steps = scenario.steps.len()))]
pub fn run(scenario: &ScenarioConfig) -> Result<ScenarioOutcome> {
    let servers = scenario
        .initial_servers
        .iter()
        .map(|name| Server::new(name.as_str()))
        .collect();
    let mut ring = Ring::new(servers, scenario.ring.clone())?;
    let initial = ring.last_report();

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for step in scenario.steps.iter() {
        event!(Level::INFO, "Applying step {:?}", step);
        let report = match step {
            Step::AddServers(names) => {
                ring.add_servers(names.iter().map(|name| Server::new(name.as_str())).collect())?
            }
            Step::RemoveServer(name) => ring.remove_server(name),
        };
        steps.push((step.clone(), report));
    }

    Ok(ScenarioOutcome { initial, steps })
}
