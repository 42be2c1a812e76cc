//! In-process billing provider for development and tests.

use super::{
    BillingProvider, BillingProviderError, CheckoutRequest, CheckoutSession, ProviderSubscription,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct MockBillingProvider {
    subscriptions: Arc<Mutex<HashMap<String, ProviderSubscription>>>,
    checkouts: Arc<Mutex<Vec<CheckoutRequest>>>,
    lookups: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl MockBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_subscription(&self, subscription: ProviderSubscription) {
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(subscription.id.clone(), subscription);
    }

    /// Makes every call fail with a network error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn checkout_requests(&self) -> Vec<CheckoutRequest> {
        self.checkouts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn check_failing(&self) -> Result<(), BillingProviderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BillingProviderError::Network(
                "mock billing provider failure".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    fn is_configured(&self) -> bool {
        true
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, BillingProviderError> {
        self.check_failing()?;
        let mut checkouts = self.checkouts.lock().unwrap_or_else(|e| e.into_inner());
        checkouts.push(request.clone());
        let id = format!("cs_mock_{}", checkouts.len());
        Ok(CheckoutSession {
            url: format!("https://checkout.mock/{}", id),
            id,
        })
    }

    async fn fetch_subscription(
        &self,
        external_subscription_id: &str,
    ) -> Result<ProviderSubscription, BillingProviderError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(external_subscription_id)
            .cloned()
            .ok_or_else(|| BillingProviderError::Api {
                status: 404,
                message: format!("No such subscription: {}", external_subscription_id),
            })
    }
}
