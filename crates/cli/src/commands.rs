// crates/cli/src/commands.rs
//! One function per subcommand.

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{bail, Context};
use stemsmith_core::paths;
use stemsmith_core::{
    CancelError, ClientConfig, DownloadTrigger, EndpointStore, Orchestrator, StemsmithClient,
    UploadFile,
};
use stemsmith_types::{JobConfig, JobHandle, JobPhase, JobView, ModelProfile};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::args::{
    DownloadArgs, EndpointArgs, EndpointCmd, HealthArgs, JobIdArgs, StatusArgs, SubmitArgs,
};
use crate::render;

pub fn endpoint_store() -> EndpointStore {
    match paths::preferences_path() {
        Some(path) => EndpointStore::file(path),
        None => {
            tracing::warn!("no config directory, endpoint will not be remembered");
            EndpointStore::in_memory(None)
        }
    }
}

pub fn connect(explicit: Option<&str>) -> anyhow::Result<StemsmithClient> {
    let client = StemsmithClient::connect(ClientConfig::from_env(), endpoint_store(), explicit)
        .context("connecting to the stemsmith service")?;
    tracing::debug!(endpoint = %client.endpoint(), session_id = %client.orchestrator().session_id(), "client ready");
    Ok(client)
}

/// Exit code for a settled job.
fn exit_for(view: &JobView) -> ExitCode {
    if view.phase() == JobPhase::Completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn job_config(model: Option<&str>, stems: &[String]) -> anyhow::Result<JobConfig> {
    let model = match model {
        Some(key) => ModelProfile::from_str(key)?,
        None => ModelProfile::default(),
    };
    Ok(JobConfig::new(model).with_stems(stems.iter().cloned())?)
}

pub async fn submit(client: &StemsmithClient, args: SubmitArgs) -> anyhow::Result<ExitCode> {
    let config = job_config(args.model.as_deref(), &args.stems)?;
    let file = UploadFile::from_path(&args.file).await?;
    let orch = client.orchestrator();

    let events = orch.subscribe();
    let handle = orch.submit(Some(file), Some(&config)).await?;
    println!("{}", handle.id);

    if !args.watch && args.download_dir.is_none() {
        return Ok(ExitCode::SUCCESS);
    }
    let view = watch(orch, events, &handle.id, args.cancel_on_interrupt).await?;
    let Some(view) = view else {
        return Ok(ExitCode::SUCCESS);
    };
    print!("{}", render::describe(&view));

    if let Some(dir) = args.download_dir {
        if view.can_download() {
            save(orch, &handle.id, dir).await?;
        }
    }
    Ok(exit_for(&view))
}

pub async fn status(client: &StemsmithClient, args: StatusArgs) -> anyhow::Result<ExitCode> {
    let orch = client.orchestrator();
    let mut events = orch.subscribe();
    orch.track(JobHandle::new(args.job_id.clone()));

    let view = if args.watch {
        match watch(orch, events, &args.job_id, false).await? {
            Some(view) => view,
            None => return Ok(ExitCode::SUCCESS),
        }
    } else {
        first_report(orch, &mut events, &args.job_id).await?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print!("{}", render::describe(&view));
    }
    Ok(if view.is_settled() {
        exit_for(&view)
    } else {
        ExitCode::SUCCESS
    })
}

pub async fn cancel(client: &StemsmithClient, args: JobIdArgs) -> anyhow::Result<ExitCode> {
    let orch = client.orchestrator();
    orch.track(JobHandle::new(args.job_id.clone()));
    match orch.request_cancel(&args.job_id).await {
        Ok(()) => {
            println!("cancellation requested for job {}", args.job_id);
            Ok(ExitCode::SUCCESS)
        }
        Err(CancelError::AlreadyTerminal { id, phase }) => {
            println!("job {id} already {phase}");
            Ok(ExitCode::SUCCESS)
        }
        Err(e @ CancelError::Gone(_)) => {
            println!("{e}");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn download(client: &StemsmithClient, args: DownloadArgs) -> anyhow::Result<ExitCode> {
    let orch = client.orchestrator();
    let mut events = orch.subscribe();
    orch.track(JobHandle::new(args.job_id.clone()));
    first_report(orch, &mut events, &args.job_id).await?;

    let dir = args.out.unwrap_or_else(paths::default_download_dir);
    save(orch, &args.job_id, dir).await?;
    Ok(ExitCode::SUCCESS)
}

pub async fn health(client: &StemsmithClient, args: HealthArgs) -> anyhow::Result<ExitCode> {
    let endpoint = client.endpoint();
    if !args.watch {
        let status = client.check_health().await;
        println!("{}", render::health_line(&endpoint, status));
        return Ok(if status == stemsmith_types::HealthStatus::Ok {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let mut rx = client.start_health();
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *rx.borrow_and_update();
                println!("{}", render::health_line(&endpoint, status));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub fn endpoint(client: &StemsmithClient, args: EndpointArgs) -> anyhow::Result<ExitCode> {
    match args.cmd.unwrap_or(EndpointCmd::Show) {
        EndpointCmd::Show => println!("{}", client.endpoint()),
        EndpointCmd::Set { url } => {
            client.set_endpoint(&url)?;
            println!("endpoint set to {}", client.endpoint());
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub fn profiles() -> ExitCode {
    print!("{}", render::profiles());
    ExitCode::SUCCESS
}

async fn save(orch: &Orchestrator, job_id: &str, dir: PathBuf) -> anyhow::Result<()> {
    let trigger = DownloadTrigger::to_dir(dir);
    let saved = orch.download(job_id, &trigger).await?;
    println!("saved {} ({} bytes)", saved.path.display(), saved.bytes);
    Ok(())
}

/// Wait until the job has a snapshot or a poll error to report.
async fn first_report(
    orch: &Orchestrator,
    events: &mut broadcast::Receiver<JobView>,
    job_id: &str,
) -> anyhow::Result<JobView> {
    loop {
        match orch.view(job_id) {
            Some(view) if view.snapshot.is_some() || view.last_error.is_some() => {
                if view.snapshot.is_none() {
                    if let Some(err) = &view.last_error {
                        bail!("job {job_id}: {err}");
                    }
                }
                return Ok(view);
            }
            Some(_) => {}
            None => bail!("job {job_id} is not tracked"),
        }
        match events.recv().await {
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => bail!("tracking ended before job {job_id} reported"),
        }
    }
}

/// Follow a job with a progress bar until it settles. Returns `None` when
/// the user detached with Ctrl-C.
async fn watch(
    orch: &Orchestrator,
    mut events: broadcast::Receiver<JobView>,
    job_id: &str,
    cancel_on_interrupt: bool,
) -> anyhow::Result<Option<JobView>> {
    let bar = render::job_bar(job_id);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    let result = loop {
        let Some(view) = orch.view(job_id) else {
            break Err(anyhow::anyhow!("job {job_id} is not tracked"));
        };
        render::update_bar(&bar, &view);
        if view.is_terminal() {
            break Ok(Some(view));
        }
        if view.gone {
            break Err(anyhow::anyhow!("job {job_id} is no longer known to the service"));
        }

        tokio::select! {
            event = events.recv() => match event {
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break Ok(orch.view(job_id)),
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if !cancel_on_interrupt {
                    bar.println(format!("detached, job {job_id} keeps running"));
                    break Ok(None);
                }
                bar.println(format!("cancelling job {job_id}"));
                if let Err(e) = orch.request_cancel(job_id).await {
                    bar.println(format!("cancel failed: {e}"));
                }
            }
        }
    };
    bar.finish_and_clear();
    result
}
