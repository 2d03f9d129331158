//! Test harness wiring the engines against the in-memory store and mock
//! CRM dependencies. No database or network is involved; every test gets
//! a fresh, isolated store.

use std::sync::Arc;

use automation_core::domains::deployments::DeploymentTracker;
use automation_core::domains::email::{Dispatcher, EmailCatalog, ScheduleEngine};
use automation_core::kernel::test_dependencies::{MockContactResolver, MockEmailSender};
use automation_core::kernel::{Deps, DispatchSettings, RateLimiter};
use automation_core::store::MemoryStore;

pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub resolver: Arc<MockContactResolver>,
    pub sender: Arc<MockEmailSender>,
    pub rate_limiter: Arc<RateLimiter>,
    pub settings: DispatchSettings,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_mocks(MockContactResolver::new(), MockEmailSender::new())
    }

    pub fn with_mocks(resolver: MockContactResolver, sender: MockEmailSender) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            resolver: Arc::new(resolver),
            sender: Arc::new(sender),
            rate_limiter: Arc::new(RateLimiter::new()),
            settings: DispatchSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: DispatchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn deps(&self) -> Deps {
        Deps::new(
            self.store.clone(),
            self.store.clone(),
            self.resolver.clone(),
            self.sender.clone(),
            self.rate_limiter.clone(),
            self.settings,
        )
    }

    pub fn tracker(&self) -> DeploymentTracker {
        DeploymentTracker::new(self.store.clone())
    }

    pub fn catalog(&self) -> EmailCatalog {
        EmailCatalog::new(self.store.clone())
    }

    pub fn engine(&self) -> ScheduleEngine {
        ScheduleEngine::from_deps(&self.deps())
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.store.clone(),
            self.resolver.clone(),
            self.sender.clone(),
            self.settings,
        )
    }
}
