//! Supervisor - lifecycle management for all mock server instances.
//!
//! Owns the instance registry, the port allocator and the health monitor. Every
//! operation on one mock API runs under that API's async lock, so start, stop,
//! restart and release for the same id never interleave.

use super::health::{HealthOutcome, HealthProbe, HttpHealthProbe};
use super::types::{RestartReason, RestoreFailure, RestoreReport, SupervisorError};
use crate::config::{Config, SupervisorConfig};
use crate::instance::{
    InstanceLauncher, InstanceSnapshot, InstanceState, MockServerInstance, StopOutcome,
    TaskLauncher,
};
use crate::metrics;
use crate::mock_api::{MockApiConfig, MockApiStatus};
use crate::ports::{PortAllocator, PortError};
use crate::repository::{MockApiRepository, RequestLogSink};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Default, Clone, Copy)]
struct RestartHistory {
    total: u32,
    /// Automatic restarts since the last healthy check or operator restart
    consecutive: u32,
}

/// Manages the lifecycle of every mock server instance.
pub struct Supervisor {
    config: SupervisorConfig,
    ports: Arc<PortAllocator>,
    repository: Arc<dyn MockApiRepository>,
    launcher: Arc<dyn InstanceLauncher>,
    probe: Arc<dyn HealthProbe>,
    /// Latest instance per api id, including stopped and errored ones
    instances: RwLock<HashMap<String, Arc<MockServerInstance>>>,
    op_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    restarts: Mutex<HashMap<String, RestartHistory>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    shutting_down: AtomicBool,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        ports: Arc<PortAllocator>,
        repository: Arc<dyn MockApiRepository>,
        launcher: Arc<dyn InstanceLauncher>,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        Self {
            config,
            ports,
            repository,
            launcher,
            probe,
            instances: RwLock::new(HashMap::new()),
            op_locks: Mutex::new(HashMap::new()),
            restarts: Mutex::new(HashMap::new()),
            monitor: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Wire up the in-process launcher and HTTP health probe from `config`.
    pub fn from_config(
        config: &Config,
        repository: Arc<dyn MockApiRepository>,
        log_sink: Arc<dyn RequestLogSink>,
    ) -> anyhow::Result<Self> {
        let probe = HttpHealthProbe::new(
            config.instances.probe_host.clone(),
            config.supervisor.health_check_timeout(),
        )?;
        Ok(Self::new(
            config.supervisor.clone(),
            Arc::new(PortAllocator::from_config(&config.ports)),
            repository,
            Arc::new(TaskLauncher::new(
                config.instances.bind_host.clone(),
                log_sink,
            )),
            Arc::new(probe),
        ))
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn ports(&self) -> &PortAllocator {
        &self.ports
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Start serving `api_id`.
    ///
    /// Fails with `AlreadyRunning` if an instance is starting or running, unless
    /// `force` is set, in which case the existing instance is stopped first.
    pub async fn start(
        &self,
        api_id: &str,
        force: bool,
    ) -> Result<InstanceSnapshot, SupervisorError> {
        let lock = self.op_lock(api_id);
        let _guard = lock.lock().await;
        self.start_locked(api_id, force).await
    }

    /// Stop `api_id`. Stopping an API with no live instance only logs a warning.
    pub async fn stop(&self, api_id: &str, graceful: bool) -> Result<(), SupervisorError> {
        let lock = self.op_lock(api_id);
        let _guard = lock.lock().await;
        self.stop_locked(api_id, graceful, true).await
    }

    /// Operator restart: stop then force start. Resets the automatic restart budget.
    pub async fn restart(&self, api_id: &str) -> Result<InstanceSnapshot, SupervisorError> {
        let lock = self.op_lock(api_id);
        let _guard = lock.lock().await;
        self.restart_locked(api_id, RestartReason::Operator).await
    }

    /// Free the port held by a stopped mock API and forget its instance.
    pub async fn release(&self, api_id: &str) -> Result<(), SupervisorError> {
        let lock = self.op_lock(api_id);
        let _guard = lock.lock().await;

        if let Some(instance) = self.instance(api_id) {
            if matches!(
                instance.state(),
                InstanceState::Starting | InstanceState::Running | InstanceState::Stopping
            ) {
                return Err(SupervisorError::StillRunning(api_id.to_string()));
            }
            if instance.state() == InstanceState::Error {
                self.stop_instance(&instance, false).await;
            }
        }

        if self.ports.allocation(api_id).is_none() {
            return Err(PortError::AllocationNotFound(api_id.to_string()).into());
        }

        self.ports.deallocate(api_id);
        self.instances.write().remove(api_id);
        self.restarts.lock().remove(api_id);
        self.forget_op_lock(api_id, &lock);
        self.refresh_gauges();
        Ok(())
    }

    /// Stop every instance concurrently, then halt monitoring.
    ///
    /// Persisted statuses are left as they are so the same set comes back on boot.
    pub async fn shutdown_all(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);

        let ids: Vec<String> = self.instances.read().keys().cloned().collect();
        info!("Shutting down {} mock instances", ids.len());

        let stops = ids.iter().map(|api_id| async move {
            let lock = self.op_lock(api_id);
            let _guard = lock.lock().await;
            if let Err(e) = self.stop_locked(api_id, true, false).await {
                warn!(api_id = %api_id, "Failed to stop instance during shutdown: {}", e);
            }
        });
        join_all(stops).await;

        if let Some(monitor) = self.monitor.lock().take() {
            monitor.abort();
        }
        info!("All mock instances stopped");
    }

    /// Start every mock API whose persisted status is active.
    ///
    /// Known port assignments are reconciled into the allocator first. A failure
    /// is logged and that API reverted to inactive; the rest still start.
    pub async fn restore_active(&self) -> Result<RestoreReport, SupervisorError> {
        let assignments = self.repository.list_port_assignments().await?;
        self.ports.reconcile(assignments);
        self.refresh_gauges();

        let active = self.repository.list_active_mock_apis().await?;
        if active.is_empty() {
            info!("No active mock APIs to restore");
            return Ok(RestoreReport::default());
        }
        info!("Restoring {} active mock APIs", active.len());

        let results = join_all(active.into_iter().map(|api_id| async move {
            let result = self.start(&api_id, false).await;
            (api_id, result)
        }))
        .await;

        let mut report = RestoreReport::default();
        for (api_id, result) in results {
            match result {
                Ok(snapshot) => {
                    info!(api_id = %api_id, port = snapshot.port, "Restored mock API");
                    report.restored.push(api_id);
                }
                Err(e) => {
                    error!(api_id = %api_id, "Failed to restore mock API: {}", e);
                    if let Err(persist) = self
                        .repository
                        .set_status(&api_id, MockApiStatus::Inactive)
                        .await
                    {
                        warn!(api_id = %api_id, "Failed to mark mock API inactive: {:#}", persist);
                    }
                    report.failed.push(RestoreFailure {
                        api_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            restored = report.restored.len(),
            failed = report.failed.len(),
            "Restore complete"
        );
        Ok(report)
    }

    pub fn status(&self, api_id: &str) -> Option<InstanceSnapshot> {
        self.instance(api_id).map(|instance| instance.snapshot())
    }

    /// Snapshots of every known instance, ordered by port.
    pub fn list(&self) -> Vec<InstanceSnapshot> {
        let mut snapshots: Vec<InstanceSnapshot> = self
            .instances
            .read()
            .values()
            .map(|instance| instance.snapshot())
            .collect();
        snapshots.sort_by_key(|s| s.port);
        snapshots
    }

    // ------------------------------------------------------------------
    // Health monitoring
    // ------------------------------------------------------------------

    /// Spawn the periodic health monitor. Replaces a previously started one.
    pub fn start_monitoring(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let period = self.config.health_check_interval();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(supervisor) = weak.upgrade() else {
                    break;
                };
                supervisor.check_all().await;
            }
        });

        info!(interval_ms = period.as_millis() as u64, "Health monitor started");
        if let Some(previous) = self.monitor.lock().replace(handle) {
            previous.abort();
        }
    }

    /// One monitoring pass over every running instance.
    pub async fn check_all(self: &Arc<Self>) {
        let running: Vec<Arc<MockServerInstance>> = self
            .instances
            .read()
            .values()
            .filter(|instance| instance.state() == InstanceState::Running)
            .cloned()
            .collect();

        let checks = running.into_iter().map(|instance| async move {
            let outcome = self.probe_instance(&instance).await;
            (instance, outcome)
        });

        for (instance, outcome) in join_all(checks).await {
            self.apply_health_outcome(instance, outcome);
        }
    }

    async fn probe_instance(&self, instance: &MockServerInstance) -> HealthOutcome {
        if instance.has_exited() {
            return HealthOutcome::Exited;
        }
        let limit = self.config.health_check_timeout();
        match timeout(limit, self.probe.check(instance.port())).await {
            Ok(Ok(())) => HealthOutcome::Healthy,
            Ok(Err(e)) => HealthOutcome::Unhealthy(format!("{e:#}")),
            Err(_) => HealthOutcome::Unhealthy(format!(
                "health check timed out after {}ms",
                limit.as_millis()
            )),
        }
    }

    fn apply_health_outcome(self: &Arc<Self>, instance: Arc<MockServerInstance>, outcome: HealthOutcome) {
        // Skip instances an operator stopped while the probe was in flight
        if instance.state() != InstanceState::Running {
            return;
        }

        match outcome {
            HealthOutcome::Healthy => {
                instance.record_health_success();
                if let Some(history) = self.restarts.lock().get_mut(instance.api_id()) {
                    history.consecutive = 0;
                }
            }
            HealthOutcome::Exited => {
                error!(
                    api_id = %instance.api_id(),
                    port = instance.port(),
                    "Mock server exited unexpectedly"
                );
                instance.fail("server task exited unexpectedly");
                self.refresh_gauges();
                self.schedule_restart(instance, RestartReason::Exited);
            }
            HealthOutcome::Unhealthy(reason) => {
                metrics::record_health_check_failure(instance.api_id());
                let failures = instance.record_health_failure(reason.clone());
                warn!(
                    api_id = %instance.api_id(),
                    port = instance.port(),
                    failures,
                    "Health check failed: {}",
                    reason
                );
                if failures >= self.config.failure_threshold {
                    instance.fail(format!("{failures} consecutive failed health checks"));
                    self.refresh_gauges();
                    self.schedule_restart(instance, RestartReason::HealthCheck);
                }
            }
        }
    }

    /// Queue an automatic restart for an errored instance, within the restart budget.
    fn schedule_restart(self: &Arc<Self>, instance: Arc<MockServerInstance>, reason: RestartReason) {
        if self.shutting_down.load(Ordering::SeqCst) || !instance.claim_restart() {
            return;
        }

        let api_id = instance.api_id().to_string();
        let consecutive = self
            .restarts
            .lock()
            .get(&api_id)
            .map(|history| history.consecutive)
            .unwrap_or(0);

        if consecutive >= self.config.max_consecutive_restarts {
            error!(
                api_id = %api_id,
                "Giving up after {} consecutive automatic restarts; instance stays in error",
                consecutive
            );
            return;
        }

        let backoff = self.config.restart_backoff(consecutive + 1);
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            if !backoff.is_zero() {
                debug!(api_id = %api_id, backoff_ms = backoff.as_millis() as u64, "Waiting before restart");
                sleep(backoff).await;
            }

            let lock = supervisor.op_lock(&api_id);
            let _guard = lock.lock().await;

            let current = supervisor.instance(&api_id);
            let superseded = match current {
                Some(ref current) => {
                    !Arc::ptr_eq(current, &instance) || current.state() != InstanceState::Error
                }
                None => true,
            };
            if superseded || supervisor.shutting_down.load(Ordering::SeqCst) {
                debug!(api_id = %api_id, "Automatic restart no longer needed");
                return;
            }

            match supervisor.restart_locked(&api_id, reason).await {
                Ok(snapshot) => info!(
                    api_id = %api_id,
                    port = snapshot.port,
                    restart_count = snapshot.restart_count,
                    "Automatic restart succeeded"
                ),
                Err(e) => {
                    error!(api_id = %api_id, "Automatic restart failed: {}", e);
                    // A relaunch that got as far as an instance leaves it in error;
                    // retry it against the remaining budget
                    if let Some(failed) = supervisor.instance(&api_id) {
                        if failed.state() == InstanceState::Error {
                            supervisor.schedule_restart(failed, reason);
                        }
                    }
                }
            }
        });
    }

    // ------------------------------------------------------------------
    // Internals (caller holds the api's op lock)
    // ------------------------------------------------------------------

    async fn start_locked(
        &self,
        api_id: &str,
        force: bool,
    ) -> Result<InstanceSnapshot, SupervisorError> {
        if let Some(existing) = self.instance(api_id) {
            match existing.state() {
                state if state.is_live() => {
                    if !force {
                        return Err(SupervisorError::AlreadyRunning(api_id.to_string()));
                    }
                    info!(api_id, port = existing.port(), "Force start: stopping existing instance");
                    self.stop_instance(&existing, true).await;
                }
                // An errored server may still hold its listener
                InstanceState::Error => {
                    info!(api_id, port = existing.port(), "Clearing errored instance before start");
                    self.stop_instance(&existing, false).await;
                }
                _ => {}
            }
        }

        let (config, port) = match self.prepare_start(api_id).await {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(api_id, "Cannot start mock server: {}", e);
                if !matches!(e, SupervisorError::NotFound(_)) {
                    self.roll_back_start(api_id).await;
                }
                return Err(e);
            }
        };

        let restart_count = self
            .restarts
            .lock()
            .get(api_id)
            .map(|history| history.total)
            .unwrap_or(0);

        let instance = Arc::new(MockServerInstance::new(api_id, port, restart_count));
        self.instances
            .write()
            .insert(api_id.to_string(), Arc::clone(&instance));
        info!(api_id, port, "Starting mock server");

        match self.bring_up(&instance, Arc::new(config)).await {
            Ok(()) => {
                self.refresh_gauges();
                info!(api_id, port, "Mock server running");
                Ok(instance.snapshot())
            }
            Err(e) => {
                error!(api_id, port, "Failed to start mock server: {}", e);
                instance.fail(e.to_string());
                if let Some(server) = instance.take_server() {
                    server.shutdown(Duration::ZERO).await;
                }
                self.roll_back_start(api_id).await;
                Err(e)
            }
        }
    }

    /// Load and validate the configuration, then obtain a port.
    async fn prepare_start(&self, api_id: &str) -> Result<(MockApiConfig, u16), SupervisorError> {
        let config = self
            .repository
            .find_mock_api_with_endpoints_and_scenarios(api_id)
            .await?
            .ok_or_else(|| SupervisorError::NotFound(api_id.to_string()))?;
        config
            .validate()
            .map_err(|source| SupervisorError::InvalidConfig {
                api_id: api_id.to_string(),
                source,
            })?;

        let port = self.obtain_port(api_id).await?;
        Ok((config, port))
    }

    /// Undo a failed start: the port (if any) goes inactive, the status inactive.
    async fn roll_back_start(&self, api_id: &str) {
        if self.ports.allocation(api_id).is_some() {
            if let Err(e) = self.ports.mark_inactive(api_id) {
                warn!(api_id, "Failed to mark port inactive: {}", e);
            }
        }
        if let Err(e) = self
            .repository
            .set_status(api_id, MockApiStatus::Inactive)
            .await
        {
            warn!(api_id, "Failed to mark mock API inactive: {:#}", e);
        }
        self.refresh_gauges();
    }

    /// Launch, wait for health, then commit port and status.
    async fn bring_up(
        &self,
        instance: &MockServerInstance,
        config: Arc<MockApiConfig>,
    ) -> Result<(), SupervisorError> {
        let api_id = instance.api_id();
        let port = instance.port();

        let server = self
            .launcher
            .launch(config, port)
            .await
            .map_err(|source| SupervisorError::Launch {
                api_id: api_id.to_string(),
                source,
            })?;
        instance.attach_server(server);

        self.wait_until_healthy(instance).await?;

        instance
            .transition(InstanceState::Running)
            .map_err(|source| SupervisorError::Launch {
                api_id: api_id.to_string(),
                source,
            })?;
        instance.record_health_success();
        self.ports.mark_active(api_id)?;
        self.repository
            .set_status(api_id, MockApiStatus::Active)
            .await?;
        Ok(())
    }

    /// Poll the health route until it answers or the startup timeout passes.
    async fn wait_until_healthy(&self, instance: &MockServerInstance) -> Result<(), SupervisorError> {
        let startup_timeout = self.config.startup_timeout();
        let deadline = Instant::now() + startup_timeout;
        let poll = self.config.startup_poll_interval();

        loop {
            if instance.has_exited() {
                return Err(SupervisorError::ExitedDuringStartup(
                    instance.api_id().to_string(),
                ));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let limit = remaining.min(self.config.health_check_timeout());
            match timeout(limit, self.probe.check(instance.port())).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => debug!(api_id = %instance.api_id(), "Not ready yet: {:#}", e),
                Err(_) => debug!(api_id = %instance.api_id(), "Readiness probe timed out"),
            }

            if Instant::now() + poll >= deadline {
                return Err(SupervisorError::StartupTimeout {
                    api_id: instance.api_id().to_string(),
                    timeout_ms: startup_timeout.as_millis() as u64,
                });
            }
            sleep(poll).await;
        }
    }

    async fn stop_locked(
        &self,
        api_id: &str,
        graceful: bool,
        persist_status: bool,
    ) -> Result<(), SupervisorError> {
        let Some(instance) = self.instance(api_id) else {
            warn!(api_id, "Stop requested but no instance exists");
            return Ok(());
        };

        if matches!(
            instance.state(),
            InstanceState::Stopping | InstanceState::Stopped
        ) {
            warn!(api_id, state = %instance.state(), "Stop requested but instance is not running");
            return Ok(());
        }

        self.stop_instance(&instance, graceful).await;

        if let Err(e) = self.ports.mark_inactive(api_id) {
            warn!(api_id, "Failed to mark port inactive: {}", e);
        }
        if persist_status {
            self.repository
                .set_status(api_id, MockApiStatus::Inactive)
                .await?;
        }
        self.refresh_gauges();
        Ok(())
    }

    /// Drive an instance through `stopping` to `stopped`.
    async fn stop_instance(&self, instance: &MockServerInstance, graceful: bool) {
        if instance.transition(InstanceState::Stopping).is_err() {
            return;
        }

        let grace = if graceful {
            self.config.stop_grace()
        } else {
            Duration::ZERO
        };

        if let Some(server) = instance.take_server() {
            if server.shutdown(grace).await == StopOutcome::Forced && graceful {
                warn!(
                    api_id = %instance.api_id(),
                    "Connections did not drain within {}ms, aborted",
                    grace.as_millis()
                );
            }
        }

        if let Err(e) = instance.transition(InstanceState::Stopped) {
            warn!(api_id = %instance.api_id(), "Failed to mark instance stopped: {}", e);
        }
        info!(api_id = %instance.api_id(), port = instance.port(), "Mock server stopped");
    }

    async fn restart_locked(
        &self,
        api_id: &str,
        reason: RestartReason,
    ) -> Result<InstanceSnapshot, SupervisorError> {
        let total = {
            let mut restarts = self.restarts.lock();
            let history = restarts.entry(api_id.to_string()).or_default();
            history.total += 1;
            if reason.is_automatic() {
                history.consecutive += 1;
            } else {
                history.consecutive = 0;
            }
            history.total
        };
        metrics::record_restart(api_id, reason.as_str());
        info!(api_id, reason = reason.as_str(), restart_count = total, "Restarting mock server");

        self.stop_locked(api_id, true, false).await?;
        self.start_locked(api_id, true).await
    }

    /// Reuse the allocator's port, else the persisted one, else a fresh one.
    async fn obtain_port(&self, api_id: &str) -> Result<u16, SupervisorError> {
        if let Some(allocation) = self.ports.allocation(api_id) {
            return Ok(allocation.port);
        }

        let persisted = self.repository.find_port_assignment(api_id).await?;
        let port = match persisted {
            Some(port) => match self.ports.allocate(api_id, Some(port)) {
                Ok(port) => port,
                Err(PortError::PortUnavailable(_)) => {
                    warn!(api_id, port, "Persisted port unavailable, allocating a new one");
                    self.ports.allocate(api_id, None)?
                }
                Err(e) => return Err(e.into()),
            },
            None => self.ports.allocate(api_id, None)?,
        };

        if persisted != Some(port) {
            if let Err(e) = self.repository.save_port_assignment(api_id, port).await {
                self.ports.deallocate(api_id);
                return Err(e.into());
            }
        }
        self.refresh_gauges();
        Ok(port)
    }

    fn instance(&self, api_id: &str) -> Option<Arc<MockServerInstance>> {
        self.instances.read().get(api_id).cloned()
    }

    fn op_lock(&self, api_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.op_locks
                .lock()
                .entry(api_id.to_string())
                .or_default(),
        )
    }

    /// Remove the api's lock entry unless another caller is queued on it.
    fn forget_op_lock(&self, api_id: &str, held: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.op_locks.lock();
        // One reference in the map, one held by the caller
        if Arc::strong_count(held) <= 2 {
            locks.remove(api_id);
        }
    }

    #[cfg(test)]
    pub(super) fn op_lock_count(&self) -> usize {
        self.op_locks.lock().len()
    }

    fn refresh_gauges(&self) {
        let running = self
            .instances
            .read()
            .values()
            .filter(|instance| instance.state() == InstanceState::Running)
            .count();
        metrics::set_instances_running(running);
        metrics::set_ports_allocated(self.ports.allocated_count());
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.get_mut().take() {
            monitor.abort();
        }
    }
}
