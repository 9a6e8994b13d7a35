//! Scripted handlers and collaborators for pipeline tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use batch_ops_core::error::{BatchError, BatchResult};
use batch_ops_core::models::{
    BatchElement, BatchElementUpdateRequest, BatchOperation, ElementProcessingStatus,
};
use batch_ops_core::orchestration::TaskContext;
use batch_ops_core::registry::{
    BatchOperationHandler, CommandInvocationReceipt, CommandInvoker, DeviceCommandInvocationRequest,
};
use parking_lot::Mutex;

/// Succeeds for every device except the ones told to panic, fail or hang
#[derive(Default)]
pub struct CountingHandler {
    calls: AtomicUsize,
    devices: Mutex<Vec<String>>,
    panic_on: HashSet<String>,
    fail_on: HashSet<String>,
    hang_on: HashSet<String>,
}

impl CountingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn panicking_on(mut self, device_token: &str) -> Self {
        self.panic_on.insert(device_token.to_string());
        self
    }

    pub fn failing_on(mut self, device_token: &str) -> Self {
        self.fail_on.insert(device_token.to_string());
        self
    }

    pub fn hanging_on(mut self, device_token: &str) -> Self {
        self.hang_on.insert(device_token.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn devices(&self) -> Vec<String> {
        let mut devices = self.devices.lock().clone();
        devices.sort();
        devices
    }
}

#[async_trait]
impl BatchOperationHandler for CountingHandler {
    fn name(&self) -> &str {
        "counting"
    }

    async fn process(
        &self,
        _ctx: &TaskContext,
        _operation: &BatchOperation,
        element: &BatchElement,
        update: &mut BatchElementUpdateRequest,
    ) -> BatchResult<ElementProcessingStatus> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.devices.lock().push(element.device_token.clone());

        let device = element.device_token.as_str();
        if self.panic_on.contains(device) {
            panic!("handler panicked for {device}");
        }
        if self.fail_on.contains(device) {
            return Err(BatchError::handler("Counting", format!("{device} rejected the command")));
        }
        if self.hang_on.contains(device) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }

        update
            .metadata
            .insert("handledBy".to_string(), "counting".to_string());
        Ok(ElementProcessingStatus::Succeeded)
    }
}

/// Counts lifecycle hook calls and records their order; `initialize` fails
/// when asked to
#[derive(Default)]
pub struct LifecycleHandler {
    pub initialized: AtomicUsize,
    pub started: AtomicUsize,
    pub stopped: AtomicUsize,
    pub fail_initialize: bool,
    pub hook_calls: Mutex<Vec<&'static str>>,
}

impl LifecycleHandler {
    pub fn events(&self) -> Vec<&'static str> {
        self.hook_calls.lock().clone()
    }
}

#[async_trait]
impl BatchOperationHandler for LifecycleHandler {
    fn name(&self) -> &str {
        "lifecycle"
    }

    async fn initialize(&self, _ctx: &TaskContext) -> BatchResult<()> {
        self.hook_calls.lock().push("initialize");
        self.initialized.fetch_add(1, Ordering::SeqCst);
        if self.fail_initialize {
            return Err(BatchError::handler("Lifecycle", "initialization refused"));
        }
        Ok(())
    }

    async fn start(&self, _ctx: &TaskContext) -> BatchResult<()> {
        self.hook_calls.lock().push("start");
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self, _ctx: &TaskContext) -> BatchResult<()> {
        self.hook_calls.lock().push("stop");
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn process(
        &self,
        _ctx: &TaskContext,
        _operation: &BatchOperation,
        _element: &BatchElement,
        _update: &mut BatchElementUpdateRequest,
    ) -> BatchResult<ElementProcessingStatus> {
        Ok(ElementProcessingStatus::Succeeded)
    }
}

/// Command invoker that records every request it receives
#[derive(Default)]
pub struct RecordingInvoker {
    requests: Mutex<Vec<DeviceCommandInvocationRequest>>,
}

impl RecordingInvoker {
    pub fn requests(&self) -> Vec<DeviceCommandInvocationRequest> {
        let mut requests = self.requests.lock().clone();
        requests.sort_by(|a, b| a.target_id.cmp(&b.target_id));
        requests
    }
}

#[async_trait]
impl CommandInvoker for RecordingInvoker {
    async fn invoke_command(
        &self,
        _ctx: &TaskContext,
        request: DeviceCommandInvocationRequest,
    ) -> BatchResult<CommandInvocationReceipt> {
        let invocation_id = format!("inv-{}", request.target_id);
        self.requests.lock().push(request);
        Ok(CommandInvocationReceipt { invocation_id })
    }
}
