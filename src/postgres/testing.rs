//! Scripted runtime and pinger used by the lifecycle tests.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::postgres::error::{PingError, RuntimeError};
use crate::postgres::readiness::Pinger;
use crate::postgres::runtime::{ContainerRuntime, ContainerSpec, HealthStatus};

pub(crate) const FAKE_ID: &str = "fake-container-1";

/// One observed call, in order, across runtime and pinger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    ImageExists(String),
    PullImage(String),
    Create(String),
    Start(String),
    Inspect(String),
    Ping,
    Stop(String),
    Remove(String),
}

type Log = Arc<Mutex<Vec<Call>>>;

fn take(slot: &Mutex<Option<RuntimeError>>) -> Option<RuntimeError> {
    slot.lock().unwrap().take()
}

pub(crate) struct FakeRuntime {
    log: Log,
    image_present: bool,
    image_inspect_error: Mutex<Option<RuntimeError>>,
    pull_error: Mutex<Option<RuntimeError>>,
    pull_delay: Duration,
    create_error: Mutex<Option<RuntimeError>>,
    start_error: Mutex<Option<RuntimeError>>,
    inspect_error: Mutex<Option<RuntimeError>>,
    stop_error: Mutex<Option<RuntimeError>>,
    remove_error: Mutex<Option<RuntimeError>>,
    health: Mutex<VecDeque<HealthStatus>>,
    health_after: HealthStatus,
    last_spec: Mutex<Option<ContainerSpec>>,
    removed: Mutex<HashSet<String>>,
}

impl FakeRuntime {
    pub(crate) fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            image_present: true,
            image_inspect_error: Mutex::new(None),
            pull_error: Mutex::new(None),
            pull_delay: Duration::ZERO,
            create_error: Mutex::new(None),
            start_error: Mutex::new(None),
            inspect_error: Mutex::new(None),
            stop_error: Mutex::new(None),
            remove_error: Mutex::new(None),
            health: Mutex::new(VecDeque::new()),
            health_after: HealthStatus::Healthy,
            last_spec: Mutex::new(None),
            removed: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn without_image(mut self) -> Self {
        self.image_present = false;
        self
    }

    pub(crate) fn fail_image_inspect(self, e: RuntimeError) -> Self {
        *self.image_inspect_error.lock().unwrap() = Some(e);
        self
    }

    pub(crate) fn fail_pull(self, e: RuntimeError) -> Self {
        *self.pull_error.lock().unwrap() = Some(e);
        self
    }

    /// Make pulls take `delay` (of tokio time) before completing.
    pub(crate) fn with_pull_delay(mut self, delay: Duration) -> Self {
        self.pull_delay = delay;
        self
    }

    pub(crate) fn fail_create(self, e: RuntimeError) -> Self {
        *self.create_error.lock().unwrap() = Some(e);
        self
    }

    pub(crate) fn fail_start(self, e: RuntimeError) -> Self {
        *self.start_error.lock().unwrap() = Some(e);
        self
    }

    pub(crate) fn fail_inspect(self, e: RuntimeError) -> Self {
        *self.inspect_error.lock().unwrap() = Some(e);
        self
    }

    pub(crate) fn fail_stop(self, e: RuntimeError) -> Self {
        *self.stop_error.lock().unwrap() = Some(e);
        self
    }

    pub(crate) fn fail_remove(self, e: RuntimeError) -> Self {
        *self.remove_error.lock().unwrap() = Some(e);
        self
    }

    /// Report these statuses in order, then `after` forever.
    pub(crate) fn with_health(
        mut self,
        script: impl IntoIterator<Item = HealthStatus>,
        after: HealthStatus,
    ) -> Self {
        *self.health.lock().unwrap() = script.into_iter().collect();
        self.health_after = after;
        self
    }

    /// A pinger that records into the same call log.
    pub(crate) fn pinger(&self) -> FakePinger {
        FakePinger {
            log: Arc::clone(&self.log),
            failures_left: Mutex::new(0),
            always_fail: false,
            reject: false,
        }
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().clone()
    }

    pub(crate) fn last_spec(&self) -> Option<ContainerSpec> {
        self.last_spec.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.log.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        self.record(Call::ImageExists(image.to_string()));
        match take(&self.image_inspect_error) {
            Some(e) => Err(e),
            None => Ok(self.image_present),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        self.record(Call::PullImage(image.to_string()));
        if !self.pull_delay.is_zero() {
            tokio::time::sleep(self.pull_delay).await;
        }
        take(&self.pull_error).map_or(Ok(()), Err)
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        self.record(Call::Create(spec.image.clone()));
        *self.last_spec.lock().unwrap() = Some(spec.clone());
        match take(&self.create_error) {
            Some(e) => Err(e),
            None => Ok(FAKE_ID.to_string()),
        }
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.record(Call::Start(id.to_string()));
        take(&self.start_error).map_or(Ok(()), Err)
    }

    async fn inspect_health(&self, id: &str) -> Result<HealthStatus, RuntimeError> {
        self.record(Call::Inspect(id.to_string()));
        if self.removed.lock().unwrap().contains(id) {
            return Err(RuntimeError::NotFound(format!("No such container: {}", id)));
        }
        if let Some(e) = take(&self.inspect_error) {
            return Err(e);
        }
        Ok(self
            .health
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.health_after))
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.record(Call::Stop(id.to_string()));
        take(&self.stop_error).map_or(Ok(()), Err)
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.record(Call::Remove(id.to_string()));
        if let Some(e) = take(&self.remove_error) {
            return Err(e);
        }
        self.removed.lock().unwrap().insert(id.to_string());
        Ok(())
    }
}

pub(crate) struct FakePinger {
    log: Log,
    failures_left: Mutex<u32>,
    always_fail: bool,
    reject: bool,
}

impl FakePinger {
    pub(crate) fn fail_first(self, n: u32) -> Self {
        *self.failures_left.lock().unwrap() = n;
        self
    }

    pub(crate) fn never_succeeds(mut self) -> Self {
        self.always_fail = true;
        self
    }

    /// Fail every ping with a non-retryable error.
    pub(crate) fn rejecting(mut self) -> Self {
        self.reject = true;
        self
    }
}

#[async_trait]
impl Pinger for FakePinger {
    async fn ping(&self, _conn_str: &str) -> Result<(), PingError> {
        self.log.lock().unwrap().push(Call::Ping);
        if self.reject {
            return Err(PingError::Invalid("sslmode=require needs TLS".to_string()));
        }
        if self.always_fail {
            return Err(PingError::Unreachable("connection refused".to_string()));
        }
        let mut left = self.failures_left.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            return Err(PingError::Unreachable(
                "the database system is starting up".to_string(),
            ));
        }
        Ok(())
    }
}
