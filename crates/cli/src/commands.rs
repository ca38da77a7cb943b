//! Subcommand handlers.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use edgecast_core::confirm::PollSchedule;
use edgecast_core::profile::Profile;
use edgecast_core::settings::ConnectionSettings;
use edgecast_core::types::Approval;
use edgecast_device::api::DeviceApi;
use edgecast_device::gateway::DeviceGateway;
use edgecast_pipeline::orchestrator::{DeployOptions, Orchestrator};
use edgecast_pipeline::reconciler::OutputReconciler;
use edgecast_pipeline::steps::StepEvent;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::cli::{AlertAction, Commands};

pub async fn run(
    command: Commands,
    settings: ConnectionSettings,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    match command {
        Commands::Devices { fleet } => {
            let api = device_api(&settings)?;
            if fleet {
                print_json(&api.fleet_overview().await?)
            } else {
                print_json(&api.list_devices().await?)
            }
        }

        Commands::Status { device } => {
            let api = device_api(&settings)?;
            let snapshot = api.snapshot(&device).await?;
            let shadows: Vec<Value> = snapshot
                .shadows
                .names()
                .filter_map(|name| snapshot.shadows.get(name))
                .map(|s| json!({ "name": s.name, "version": s.version, "entries": s.entries.len() }))
                .collect();
            print_json(&json!({
                "state": snapshot.state,
                "shadows": shadows,
                "alerts": snapshot.alerts,
            }))
        }

        Commands::Deploy {
            device,
            profile,
            bypass,
            device_ip,
            ports_in_use,
        } => {
            let mut loaded = read_profile(&profile)?;
            let orchestrator = Orchestrator::connect(settings)?;

            let (tx, mut rx) = broadcast::channel::<StepEvent>(64);
            let printer = tokio::spawn(async move {
                print_progress(&mut rx, &mut std::io::stdout()).await;
            });

            let options = DeployOptions {
                bypass_device_errors: bypass,
                device_ip,
                ports_in_use: ports_in_use.into_iter().collect::<HashSet<u16>>(),
                cancel,
                progress: Some(tx),
                ..DeployOptions::default()
            };
            let report = orchestrator.deploy(&device, &mut loaded, options).await;
            // The sender lives in the options, dropped with the run.
            let _ = printer.await;

            write_profile(&profile, &loaded)?;
            report
                .outcome
                .with_context(|| format!("deployment to {device} failed"))
        }

        Commands::Toggle {
            device,
            output,
            state,
        } => {
            let reconciler = reconciler(&settings)?;
            let confirmed = reconciler
                .toggle(&device, output, state.enabled(), &cancel)
                .await?;
            if !confirmed {
                tracing::warn!(device_id = %device, output, "Device has not reported the new state yet");
            }
            print_json(&json!({ "output": output, "enabled": state.enabled(), "confirmed": confirmed }))
        }

        Commands::Restart { device } => {
            let reconciler = reconciler(&settings)?;
            let report = reconciler.bulk_restart(&device, &cancel).await?;
            print_json(&json!({
                "disabled": report.disabled,
                "reenabled": report.reenabled,
                "confirmed": report.confirmed,
            }))
        }

        Commands::Command {
            device,
            name,
            params,
        } => {
            let parameters = params
                .map(|raw| serde_json::from_str::<Value>(&raw))
                .transpose()
                .context("--params is not valid JSON")?;
            let api = device_api(&settings)?;
            print_json(&api.send_command(&device, &name, parameters).await?)
        }

        Commands::Alerts { action } => {
            let api = device_api(&settings)?;
            match action {
                AlertAction::List { device } => print_json(&api.list_alerts(&device).await?),
                AlertAction::Mute { device, alert } => {
                    api.set_alert_muted(&device, &alert, true).await?;
                    Ok(())
                }
                AlertAction::Unmute { device, alert } => {
                    api.set_alert_muted(&device, &alert, false).await?;
                    Ok(())
                }
                AlertAction::Delete { device, alert, yes } => {
                    api.delete_alert(&device, &alert, approval(yes)).await?;
                    Ok(())
                }
            }
        }

        Commands::RemoveDownstream {
            profile,
            intent,
            yes,
        } => {
            let mut loaded = read_profile(&profile)?;
            let orchestrator = Orchestrator::connect(settings)?;
            orchestrator
                .remove_downstream(&mut loaded, &intent, approval(yes))
                .await?;
            write_profile(&profile, &loaded)
        }
    }
}

/// Print step events until every sender is gone. Events dropped because
/// the printer fell behind are reported and skipped; printing goes on.
async fn print_progress<W: Write>(rx: &mut broadcast::Receiver<StepEvent>, out: &mut W) -> usize {
    let mut printed = 0;
    loop {
        match rx.recv().await {
            Ok(event) => {
                if writeln!(out, "{}", progress_line(&event)).is_err() {
                    break;
                }
                printed += 1;
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Progress printer fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
    printed
}

fn progress_line(event: &StepEvent) -> String {
    format!(
        "{:<22} {:<10} {}",
        event.step.as_str(),
        format!("{:?}", event.status).to_lowercase(),
        event.message.as_deref().unwrap_or_default()
    )
}

fn approval(yes: bool) -> Approval {
    if yes {
        Approval::Confirmed
    } else {
        Approval::Declined
    }
}

fn device_api(settings: &ConnectionSettings) -> anyhow::Result<DeviceApi> {
    Ok(DeviceApi::new(&settings.device, settings.request_timeout)?)
}

fn reconciler(settings: &ConnectionSettings) -> anyhow::Result<OutputReconciler> {
    let device: Arc<dyn DeviceGateway> = Arc::new(device_api(settings)?);
    Ok(OutputReconciler::new(device, PollSchedule::default()))
}

fn read_profile(path: &Path) -> anyhow::Result<Profile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading profile {}", path.display()))?;
    let profile: Profile = serde_json::from_str(&raw)
        .with_context(|| format!("parsing profile {}", path.display()))?;
    profile.validate()?;
    Ok(profile)
}

fn write_profile(path: &Path, profile: &Profile) -> anyhow::Result<()> {
    let raw = serde_json::to_string_pretty(profile)?;
    std::fs::write(path, raw + "\n")
        .with_context(|| format!("writing profile {}", path.display()))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
