//! Applies a profile to a device and its downstream platforms.
//!
//! A deployment walks a fixed sequence of steps:
//!
//! ```text
//! Init -> FetchState -> WriteEncoders -> AwaitEncoders -> VerifyEncoders
//!      -> WriteOutputs -> AwaitOutputs -> VerifyOutputs
//!      -> ConfigureDownstream -> Done
//! ```
//!
//! with `Failed` reachable from every step. Shadow writes are never
//! retried; each is followed by a confirmation poll that re-reads the
//! device until the change is visible. Under bypass a failure between
//! `FetchState` and `VerifyOutputs` is downgraded to a warning and the
//! downstream platforms are configured with the provisional ports.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use edgecast_core::confirm::{confirm, PollSchedule};
use edgecast_core::ports::PortAllocator;
use edgecast_core::profile::{OutputIntent, Profile, TargetKind};
use edgecast_core::settings::ConnectionSettings;
use edgecast_core::types::{Approval, EntryId, ShadowVersion};
use edgecast_device::api::DeviceApi;
use edgecast_device::gateway::DeviceGateway;
use edgecast_device::shadow::{ShadowSet, ShadowWrite, ENCODERS, INPUTS, OUTPUTS};
use edgecast_registry::entity::{StreamPayload, UpsertOutcome};
use edgecast_registry::{transport_for, ChannelRegistry, IngestRegistry, Registry};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::downstream::{build_payload, Registries};
use crate::encoders::{first_input_id, merge_encoders, resolve_encoders, EncoderIds};
use crate::error::DeployError;
use crate::lease::{DeviceLease, DeviceLeases};
use crate::outputs::{
    match_outputs, merge_outputs, plan_outputs, retained_ports, CallMode, MatchedOutput,
    OutputPlan,
};
use crate::steps::{Step, StepEvent, StepLog};

// ---------------------------------------------------------------------------
// Options and report
// ---------------------------------------------------------------------------

/// Per-run knobs.
#[derive(Clone, Default)]
pub struct DeployOptions {
    /// Downgrade device-configuration failures to warnings and still
    /// configure the downstream platforms.
    pub bypass_device_errors: bool,
    /// Address platforms should pull from, instead of the one the device
    /// reports.
    pub device_ip: Option<String>,
    pub encoder_schedule: PollSchedule,
    pub output_schedule: PollSchedule,
    /// Ports held by other profiles; never allocated.
    pub ports_in_use: HashSet<u16>,
    pub cancel: CancellationToken,
    /// Live copy of the step log.
    pub progress: Option<broadcast::Sender<StepEvent>>,
}

/// What happened on one downstream platform for one intent.
#[derive(Debug, Clone, Serialize)]
pub struct DownstreamResult {
    pub intent_id: String,
    pub target: TargetKind,
    pub label: String,
    pub remote_id: Option<String>,
    pub stream_url: Option<String>,
    pub created: bool,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct DeployReport {
    pub device_id: String,
    pub events: Vec<StepEvent>,
    /// Provisional port per platform intent.
    pub ports: BTreeMap<String, u16>,
    pub encoders: Option<EncoderIds>,
    /// Verified output entry per intent.
    pub outputs: BTreeMap<String, MatchedOutput>,
    pub downstream: Vec<DownstreamResult>,
    /// Device configuration failed and was bypassed.
    pub bypassed: bool,
    pub outcome: Result<(), DeployError>,
}

impl DeployReport {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn final_step(&self) -> Step {
        if self.succeeded() {
            Step::Done
        } else {
            Step::Failed
        }
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Mutable state of one deployment as it moves through the steps.
struct Run {
    device_id: String,
    step: Step,
    log: StepLog,
    device_ip: Option<String>,
    ports: BTreeMap<String, u16>,
    encoders: Option<EncoderIds>,
    outputs: BTreeMap<String, MatchedOutput>,
    downstream: Vec<DownstreamResult>,
    bypassed: bool,
}

impl Run {
    fn new(device_id: &str, options: &DeployOptions) -> Self {
        Self {
            device_id: device_id.to_string(),
            step: Step::Init,
            log: StepLog::new(device_id, options.progress.clone()),
            device_ip: options.device_ip.clone(),
            ports: BTreeMap::new(),
            encoders: None,
            outputs: BTreeMap::new(),
            downstream: Vec::new(),
            bypassed: false,
        }
    }

    fn enter(&mut self, step: Step) {
        self.step = step;
        self.log.started(step);
    }

    /// Record `error` against the current step and hand it back.
    fn fail(&mut self, error: DeployError) -> DeployError {
        self.log.failed(self.step, error.to_string());
        error
    }

    fn into_report(self, outcome: Result<(), DeployError>) -> DeployReport {
        DeployReport {
            device_id: self.device_id,
            events: self.log.into_events(),
            ports: self.ports,
            encoders: self.encoders,
            outputs: self.outputs,
            downstream: self.downstream,
            bypassed: self.bypassed,
            outcome,
        }
    }
}

/// The profile's encoders as of `set`, once the device reports the write
/// made against `target_version`.
fn applied_encoders(
    set: &ShadowSet,
    target_version: ShadowVersion,
    profile: &Profile,
    before: &HashSet<EntryId>,
) -> Option<EncoderIds> {
    let shadow = set.get_or_empty(ENCODERS);
    if !shadow.reflects_write(target_version) {
        return None;
    }
    resolve_encoders(&shadow, profile, before)
}

/// Output entries matched to `plans` as of `set`, once the device reports
/// the write made against `target_version`.
fn applied_outputs(
    set: &ShadowSet,
    target_version: ShadowVersion,
    plans: &[OutputPlan],
    before: &HashSet<EntryId>,
) -> BTreeMap<String, MatchedOutput> {
    let shadow = set.get_or_empty(OUTPUTS);
    if !shadow.reflects_write(target_version) {
        return BTreeMap::new();
    }
    match_outputs(&shadow, plans, before)
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<(), DeployError> {
    if cancel.is_cancelled() {
        Err(DeployError::Cancelled)
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    settings: Arc<ConnectionSettings>,
    device: Arc<dyn DeviceGateway>,
    registries: Registries,
    allocator: PortAllocator,
    leases: DeviceLeases,
}

impl Orchestrator {
    /// Build an orchestrator over explicit clients. `settings` is captured
    /// as-is; later edits by the operator do not reach running deployments.
    pub fn new(
        settings: Arc<ConnectionSettings>,
        device: Arc<dyn DeviceGateway>,
        registries: Registries,
    ) -> Self {
        Self {
            allocator: PortAllocator::new(settings.port_range),
            settings,
            device,
            registries,
            leases: DeviceLeases::new(),
        }
    }

    /// Build the HTTP clients described by `settings`.
    pub fn connect(settings: ConnectionSettings) -> Result<Self, DeployError> {
        let settings = Arc::new(settings);
        let device = DeviceApi::new(&settings.device, settings.request_timeout)?;
        let transport = transport_for(&settings)
            .map_err(|e| DeployError::Transport(e.to_string()))?;

        let mut registries = Registries::default();
        if let Some(channel) = &settings.channel {
            let client = ChannelRegistry::new(channel, Arc::clone(&transport))?;
            registries.channel = Some(Arc::new(client) as Arc<dyn Registry>);
        }
        if let Some(ingest) = &settings.ingest {
            let client = IngestRegistry::new(ingest, Arc::clone(&transport))?;
            registries.ingest = Some(Arc::new(client) as Arc<dyn Registry>);
        }

        Ok(Self::new(settings, Arc::new(device), registries))
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn device(&self) -> Arc<dyn DeviceGateway> {
        Arc::clone(&self.device)
    }

    /// Apply `profile` to `device_id`.
    ///
    /// Deployment state learned along the way (output entry ids, remote
    /// ids, stream URLs) is written back into `profile`. The report is
    /// returned whatever the outcome; `report.outcome` carries the error
    /// that stopped the run.
    pub async fn deploy(
        &self,
        device_id: &str,
        profile: &mut Profile,
        options: DeployOptions,
    ) -> DeployReport {
        tracing::info!(device_id = %device_id, profile = %profile.name, bypass = options.bypass_device_errors, "Deployment starting");

        let mut run = Run::new(device_id, &options);
        let outcome = self.execute(&mut run, profile, &options).await;

        match &outcome {
            Ok(()) => run.log.completed(Step::Done, "deployment complete"),
            Err(e) => run.log.failed(Step::Failed, e.to_string()),
        }
        run.into_report(outcome)
    }

    async fn execute(
        &self,
        run: &mut Run,
        profile: &mut Profile,
        options: &DeployOptions,
    ) -> Result<(), DeployError> {
        let _lease = self.init(run, profile, options).map_err(|e| run.fail(e))?;

        let ports = match self.configure_device(run, profile, options).await {
            Ok(()) => run
                .outputs
                .iter()
                .map(|(intent_id, matched)| (intent_id.clone(), matched.port))
                .collect(),
            Err(DeployError::Cancelled) => return Err(run.fail(DeployError::Cancelled)),
            Err(e) if options.bypass_device_errors => {
                run.log
                    .warning(run.step, format!("{e}; continuing with provisional ports"));
                run.bypassed = true;
                run.ports.clone()
            }
            Err(e) => return Err(run.fail(e)),
        };

        self.configure_downstream(run, profile, &ports, options).await
    }

    // ---- Init ----

    fn init(
        &self,
        run: &mut Run,
        profile: &Profile,
        options: &DeployOptions,
    ) -> Result<DeviceLease, DeployError> {
        run.enter(Step::Init);
        ensure_not_cancelled(&options.cancel)?;
        profile.validate()?;

        for intent in profile.outputs.iter().filter(|o| o.target.is_platform()) {
            if self.registries.for_target(intent.target).is_none() {
                return Err(DeployError::Validation(format!(
                    "Output \"{}\" targets the {} registry, which is not configured",
                    intent.name, intent.target
                )));
            }
        }

        let lease = self.leases.acquire(&run.device_id)?;

        let platform_ids: Vec<&str> = profile
            .outputs
            .iter()
            .filter(|o| o.target.is_platform())
            .map(|o| o.id.as_str())
            .collect();
        run.ports = self.allocator.allocate(platform_ids, &options.ports_in_use)?;

        run.log.completed(
            Step::Init,
            format!("{} listener port(s) allocated", run.ports.len()),
        );
        Ok(lease)
    }

    // ---- Device configuration ----

    async fn configure_device(
        &self,
        run: &mut Run,
        profile: &mut Profile,
        options: &DeployOptions,
    ) -> Result<(), DeployError> {
        let device_id = run.device_id.clone();
        let cancel = &options.cancel;

        // FetchState
        run.enter(Step::FetchState);
        ensure_not_cancelled(cancel)?;
        let (shadows, state) = tokio::join!(
            self.device.read_shadows(&device_id),
            self.device.device_state(&device_id),
        );
        let shadows = shadows?;
        match state {
            Ok(state) => {
                if run.device_ip.is_none() {
                    run.device_ip = state.ip_address;
                }
            }
            Err(e) if run.device_ip.is_some() => {
                tracing::warn!(device_id = %device_id, error = %e, "Device state unavailable, using operator IP");
            }
            Err(e) => return Err(e.into()),
        }

        let input_id = first_input_id(&shadows.get_or_empty(INPUTS)).ok_or_else(|| {
            DeployError::NotFound {
                entity: "input",
                name: device_id.clone(),
            }
        })?;
        let encoders = shadows.get_or_empty(ENCODERS);
        run.log.completed(
            Step::FetchState,
            format!(
                "input {input_id}, Encoders v{}, Outputs v{}",
                encoders.version,
                shadows.get_or_empty(OUTPUTS).version
            ),
        );

        // WriteEncoders
        run.enter(Step::WriteEncoders);
        ensure_not_cancelled(cancel)?;
        let before: HashSet<EntryId> = encoders.ids().into_iter().collect();
        let state = merge_encoders(&encoders, profile, input_id);
        let written = ShadowWrite::replace(&encoders, state);
        self.device.write_shadow(&device_id, &written).await?;
        run.log.completed(
            Step::WriteEncoders,
            format!("written against Encoders v{}", encoders.version),
        );

        // AwaitEncoders
        run.enter(Step::AwaitEncoders);
        let confirmation = {
            let profile: &Profile = profile;
            confirm(
                || self.device.read_shadows(&device_id),
                |set: &ShadowSet| {
                    applied_encoders(set, written.target_version, profile, &before).is_some()
                },
                &options.encoder_schedule,
                cancel,
            )
            .await
        };
        if confirmation.cancelled {
            return Err(DeployError::Cancelled);
        }
        self.log_confirmation(run, confirmation.ok, confirmation.waits);

        // VerifyEncoders
        run.enter(Step::VerifyEncoders);
        let latest = match confirmation.observed {
            Some(set) => set,
            None => self.device.read_shadows(&device_id).await?,
        };
        let encoder_ids = applied_encoders(&latest, written.target_version, profile, &before)
            .ok_or_else(|| DeployError::NotFound {
                entity: "encoder",
                name: profile.video_encoder_name(),
            })?;
        run.encoders = Some(encoder_ids);
        run.log.completed(
            Step::VerifyEncoders,
            format!("video {}, audio {}", encoder_ids.video, encoder_ids.audio),
        );

        // WriteOutputs
        run.enter(Step::WriteOutputs);
        ensure_not_cancelled(cancel)?;
        let outputs = latest.get_or_empty(OUTPUTS);
        let plans = plan_outputs(profile, &run.ports)?;
        let retained = retained_ports(&outputs, profile, &plans);
        if let Some(plan) = plans
            .iter()
            .find(|p| p.mode == CallMode::Listener && retained.contains(&p.port))
        {
            return Err(DeployError::Validation(format!(
                "Port {} is already used by another output on the device",
                plan.port
            )));
        }
        let before: HashSet<EntryId> = outputs.ids().into_iter().collect();
        let state = merge_outputs(&outputs, profile, &plans, encoder_ids);
        let written = ShadowWrite::replace(&outputs, state);
        self.device.write_shadow(&device_id, &written).await?;
        run.log.completed(
            Step::WriteOutputs,
            format!(
                "{} output(s) written against Outputs v{}",
                plans.len(),
                outputs.version
            ),
        );

        // AwaitOutputs
        run.enter(Step::AwaitOutputs);
        let confirmation = confirm(
            || self.device.read_shadows(&device_id),
            |set: &ShadowSet| {
                applied_outputs(set, written.target_version, &plans, &before).len() == plans.len()
            },
            &options.output_schedule,
            cancel,
        )
        .await;
        if confirmation.cancelled {
            return Err(DeployError::Cancelled);
        }
        self.log_confirmation(run, confirmation.ok, confirmation.waits);

        // VerifyOutputs
        run.enter(Step::VerifyOutputs);
        let latest = match confirmation.observed {
            Some(set) => set,
            None => self.device.read_shadows(&device_id).await?,
        };
        let matched = applied_outputs(&latest, written.target_version, &plans, &before);
        for (intent_id, output) in &matched {
            if let Some(intent) = profile.intent_mut(intent_id) {
                intent.device_output_id = Some(output.id);
            }
        }
        run.outputs = matched;
        if let Some(missing) = plans.iter().find(|p| !run.outputs.contains_key(&p.intent_id)) {
            return Err(DeployError::NotFound {
                entity: "output",
                name: missing.entry_name.clone(),
            });
        }
        run.log.completed(
            Step::VerifyOutputs,
            format!("{} output(s) confirmed", run.outputs.len()),
        );

        Ok(())
    }

    fn log_confirmation(&self, run: &mut Run, ok: bool, waits: usize) {
        if ok {
            run.log
                .completed(run.step, format!("confirmed after {waits} wait(s)"));
        } else {
            run.log
                .warning(run.step, format!("not confirmed after {waits} wait(s)"));
        }
    }

    // ---- Downstream ----

    /// Upsert every platform intent on its registry. Platforms are
    /// independent: one failing does not stop the others, but fails the run.
    async fn configure_downstream(
        &self,
        run: &mut Run,
        profile: &mut Profile,
        ports: &BTreeMap<String, u16>,
        options: &DeployOptions,
    ) -> Result<(), DeployError> {
        run.enter(Step::ConfigureDownstream);

        let intents: Vec<OutputIntent> = profile
            .outputs
            .iter()
            .filter(|o| o.target.is_platform())
            .cloned()
            .collect();
        if intents.is_empty() {
            run.log
                .skipped(Step::ConfigureDownstream, "no platform outputs");
            return Ok(());
        }

        let mut first_error = None;
        for intent in &intents {
            if options.cancel.is_cancelled() {
                return Err(run.fail(DeployError::Cancelled));
            }

            let label = crate::downstream::label_for(profile, intent);
            let result = self
                .upsert_intent(profile, intent, run.device_ip.as_deref(), ports)
                .await;

            match result {
                Ok((payload, outcome)) => {
                    if let Some(target) = profile.intent_mut(&intent.id) {
                        target.remote_id = Some(outcome.entity.id.clone());
                        target.stream_url = Some(payload.stream_url.clone());
                    }
                    run.log.completed(
                        Step::ConfigureDownstream,
                        format!(
                            "{} \"{label}\" {} ({})",
                            intent.target,
                            if outcome.created { "created" } else { "updated" },
                            outcome.entity.id
                        ),
                    );
                    run.downstream.push(DownstreamResult {
                        intent_id: intent.id.clone(),
                        target: intent.target,
                        label,
                        remote_id: Some(outcome.entity.id),
                        stream_url: Some(payload.stream_url),
                        created: outcome.created,
                        error: None,
                    });
                }
                Err(e) => {
                    run.log.failed(
                        Step::ConfigureDownstream,
                        format!("{} \"{label}\": {e}", intent.target),
                    );
                    run.downstream.push(DownstreamResult {
                        intent_id: intent.id.clone(),
                        target: intent.target,
                        label,
                        remote_id: None,
                        stream_url: None,
                        created: false,
                        error: Some(e.to_string()),
                    });
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn upsert_intent(
        &self,
        profile: &Profile,
        intent: &OutputIntent,
        device_ip: Option<&str>,
        ports: &BTreeMap<String, u16>,
    ) -> Result<(StreamPayload, UpsertOutcome), DeployError> {
        let registry = self.registries.for_target(intent.target).ok_or_else(|| {
            DeployError::Validation(format!("{} registry is not configured", intent.target))
        })?;
        let device_ip = device_ip.ok_or_else(|| {
            DeployError::Validation(
                "Device IP is unknown; the device reported none and no override was given"
                    .into(),
            )
        })?;
        let port = ports
            .get(&intent.id)
            .copied()
            .ok_or_else(|| DeployError::NotFound {
                entity: "output port",
                name: intent.name.clone(),
            })?;

        let payload = build_payload(profile, intent, device_ip, port);
        let outcome = registry.upsert(&payload).await?;
        Ok((payload, outcome))
    }

    /// Delete the downstream entity behind `intent_id` and forget its ids.
    /// Refused unless the operator confirmed.
    pub async fn remove_downstream(
        &self,
        profile: &mut Profile,
        intent_id: &str,
        approval: Approval,
    ) -> Result<(), DeployError> {
        if !approval.is_confirmed() {
            return Err(DeployError::Validation(
                "Removing a downstream entity requires confirmation".into(),
            ));
        }

        let intent = profile
            .intent_mut(intent_id)
            .ok_or_else(|| DeployError::NotFound {
                entity: "output intent",
                name: intent_id.to_string(),
            })?;
        let remote_id = intent
            .remote_id
            .clone()
            .ok_or_else(|| DeployError::NotFound {
                entity: "downstream entity",
                name: intent.name.clone(),
            })?;
        let registry = self.registries.for_target(intent.target).ok_or_else(|| {
            DeployError::Validation(format!("{} registry is not configured", intent.target))
        })?;

        registry.delete(&remote_id).await?;
        tracing::info!(intent = %intent.name, remote_id = %remote_id, target = %intent.target, "Downstream entity removed");
        intent.clear_downstream();
        Ok(())
    }
}
