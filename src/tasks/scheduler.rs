use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use tokio_cron_scheduler::{Job, JobScheduler};

/// Invoked on every cron tick; resolves once that refresh has been handled.
pub type RefreshCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

pub async fn configure_refresh_jobs(
    cron_specs: &[String],
    callback: RefreshCallback,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;
    for spec in cron_specs {
        let label = spec.clone();
        let refresh = callback.clone();
        let job = Job::new_async(spec.as_str(), move |_id, _l| {
            let refresh = refresh.clone();
            let cron_label = label.clone();
            Box::pin(async move {
                tracing::debug!(target: "scheduler", cron = %cron_label, "scheduled refresh triggered");
                refresh().await;
            })
        })
        .with_context(|| format!("invalid refresh cron expression `{spec}`"))?;
        scheduler.add(job).await?;
        tracing::info!(target: "scheduler", cron = %spec, "refresh job registered");
    }
    if cron_specs.is_empty() {
        tracing::info!(target: "scheduler", "no refresh schedule configured; refresh manually");
    }
    scheduler.start().await?;
    Ok(scheduler)
}
