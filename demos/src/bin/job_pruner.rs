//! Deletes jobs older than a deadline, together with the pods they control
//!
//! Configured through the environment:
//! - `DEADLINE_HOURS`: maximum job age, 24 by default
use std::time::Duration;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use k8s_openapi::api::{batch::v1::Job, core::v1::Pod};
use kontroller::{Context, Controller, Handler, ResourceObject, Snapshot, Trigger};
use kontroller_demos::KubeSource;
use kube::{
    api::{Api, DeleteParams, ListParams},
    Client, ResourceExt,
};
use tracing::{info, warn};

const RESYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

struct JobPruner {
    client: Client,
    deadline: chrono::Duration,
}

fn expired(job: &ResourceObject, deadline: chrono::Duration, now: DateTime<Utc>) -> bool {
    job.age(now).is_some_and(|age| age > deadline)
}

impl Handler for JobPruner {
    fn process_objects(&self, ctx: &Context, snapshot: &Snapshot<'_>, trigger: Trigger) -> bool {
        if trigger.is_booting() {
            for job in snapshot.objects("Job") {
                info!(job = %job, "loaded");
            }
            return false;
        }

        info!(jobs = snapshot.count("Job"), "processing jobs");
        let now = Utc::now();
        let mut busy = false;
        for job in snapshot.objects("Job").filter(|job| expired(job, self.deadline, now)) {
            info!(job = %job, created = ?job.creation_timestamp, "expired");
            let client = self.client.clone();
            ctx.delete_object(job.clone(), move |job| delete_job_and_pods(client, job));
            busy = true;
        }
        busy
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

/// Treat an already deleted object as a successful deletion
fn ignore_not_found<T>(res: Result<T, kube::Error>) -> Result<(), kube::Error> {
    match res {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            info!(reason = %ae.reason, message = %ae.message, "already gone");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

async fn delete_job_and_pods(client: Client, job: ResourceObject) -> Result<(), kube::Error> {
    let pods: Api<Pod> = Api::namespaced(client.clone(), &job.namespace);
    let selector = format!("controller-uid={}", job.uid);
    for pod in pods.list(&ListParams::default().labels(&selector)).await? {
        let name = pod.name_any();
        info!(namespace = %job.namespace, %name, "deleting pod");
        ignore_not_found(pods.delete(&name, &DeleteParams::default()).await)?;
    }

    let jobs: Api<Job> = Api::namespaced(client, &job.namespace);
    info!(namespace = %job.namespace, name = %job.name, "deleting job");
    ignore_not_found(jobs.delete(&job.name, &DeleteParams::default()).await)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let deadline_hours = match std::env::var("DEADLINE_HOURS") {
        Ok(hours) => hours.parse::<i64>().context("DEADLINE_HOURS must be a whole number")?,
        Err(_) => 24,
    };
    info!(deadline_hours, "started job pruner");

    let client = Client::try_default().await?;
    let mut controller = Controller::new(JobPruner {
        client: client.clone(),
        deadline: chrono::Duration::hours(deadline_hours),
    });
    controller.add_watch(KubeSource::all::<Job>(client));

    let shutdown = controller.shutdown_token();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for ctrl-c");
            return;
        }
        shutdown.cancel();
    });
    controller.run(RESYNC_INTERVAL).await?;
    Ok(())
}
