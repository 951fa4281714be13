//! Logs namespaces and pods as they come and go
//!
//! Set `RESYNC_SECONDS` to change how long the controller waits before a resync.
use std::time::Duration;

use anyhow::Context as _;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use kontroller::{Context, Controller, Handler, ResourceObject, Snapshot, Trigger, DEFAULT_RESYNC_INTERVAL};
use kontroller_demos::KubeSource;
use kube::Client;
use tracing::{info, warn};

struct NamespaceWatcher;

impl Handler for NamespaceWatcher {
    fn process_objects(&self, _ctx: &Context, snapshot: &Snapshot<'_>, trigger: Trigger) -> bool {
        match trigger.kind() {
            Some(kind) => {
                for obj in snapshot.objects(kind) {
                    info!(object = %obj, "loaded");
                }
            }
            None => info!(
                namespaces = snapshot.count("Namespace"),
                pods = snapshot.count("Pod"),
                "found {} objects",
                snapshot.len()
            ),
        }
        false
    }

    fn added_object(&self, _ctx: &Context, obj: &ResourceObject) {
        info!(object = %obj, created = ?obj.creation_timestamp, "added");
    }

    fn modified_object(&self, _ctx: &Context, old: Option<&ResourceObject>, new: &ResourceObject) {
        let old = old.map(ToString::to_string).unwrap_or_default();
        info!(%old, new = %new, created = ?new.creation_timestamp, "modified");
    }

    fn deleted_object(&self, _ctx: &Context, obj: &ResourceObject) {
        info!(object = %obj, created = ?obj.creation_timestamp, "deleted");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let resync = match std::env::var("RESYNC_SECONDS") {
        Ok(secs) => Duration::from_secs(secs.parse().context("RESYNC_SECONDS must be a whole number")?),
        Err(_) => DEFAULT_RESYNC_INTERVAL,
    };
    info!(?resync, "started namespace watcher");

    let client = Client::try_default().await?;
    let mut controller = Controller::new(NamespaceWatcher);
    controller
        .add_watch(KubeSource::all::<Namespace>(client.clone()))
        .add_watch(KubeSource::all::<Pod>(client));

    let shutdown = controller.shutdown_token();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for ctrl-c");
            return;
        }
        shutdown.cancel();
    });
    controller.run(resync).await?;
    Ok(())
}
