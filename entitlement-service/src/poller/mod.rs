//! Post-checkout wait.
//!
//! After the billing provider redirects back, the subscription may not be
//! active yet because the webhook is delivered asynchronously. The poller
//! re-reads entitlements on a fixed interval until the subscription is
//! active or the attempt budget runs out. The wait is always bounded.

pub mod source;

use crate::services::EntitlementView;
use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub use source::{EntitlementSource, HttpEntitlementSource, StoreEntitlementSource};

/// Query parameter the checkout success URL carries.
pub const CHECKOUT_RETURN_PARAM: &str = "subscription";
pub const CHECKOUT_RETURN_VALUE: &str = "success";

/// Whether `url` (absolute, or a path with query) is the checkout success
/// return.
pub fn is_post_checkout_return(url: &str) -> bool {
    let parsed = Url::parse(url).or_else(|_| {
        Url::parse("http://localhost").and_then(|base| base.join(url))
    });
    match parsed {
        Ok(url) => url
            .query_pairs()
            .any(|(k, v)| k == CHECKOUT_RETURN_PARAM && v == CHECKOUT_RETURN_VALUE),
        Err(_) => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Idle,
    /// `attempt` is 1-based and names the fetch about to run.
    Polling { attempt: u32 },
    Resolved(Box<EntitlementView>),
    Exhausted { attempts: u32 },
    /// Torn down by the owner; `attempts` fetches completed.
    Cancelled { attempts: u32 },
}

impl PollState {
    pub fn start(self) -> PollState {
        match self {
            PollState::Idle => PollState::Polling { attempt: 1 },
            other => other,
        }
    }

    /// Transition after one fetch. `observed` is `None` when the fetch failed,
    /// which counts the same as "not active yet".
    pub fn after_attempt(self, observed: Option<EntitlementView>, policy: &PollPolicy) -> PollState {
        let PollState::Polling { attempt } = self else {
            return self;
        };
        match observed {
            Some(view) if view.usage.is_active() => PollState::Resolved(Box::new(view)),
            _ if attempt < policy.max_attempts => PollState::Polling {
                attempt: attempt + 1,
            },
            _ => PollState::Exhausted { attempts: attempt },
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PollState::Resolved(_) | PollState::Exhausted { .. } | PollState::Cancelled { .. }
        )
    }
}

/// Timer abstraction so tests do not wait on the wall clock.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

pub struct CheckoutPoller<S, T = TokioSleeper> {
    source: S,
    sleeper: T,
    policy: PollPolicy,
}

impl<S: EntitlementSource> CheckoutPoller<S, TokioSleeper> {
    pub fn new(source: S) -> Self {
        Self::with_sleeper(source, TokioSleeper, PollPolicy::default())
    }
}

impl<S: EntitlementSource, T: Sleeper> CheckoutPoller<S, T> {
    pub fn with_sleeper(source: S, sleeper: T, policy: PollPolicy) -> Self {
        Self {
            source,
            sleeper,
            policy,
        }
    }

    /// Drives the state machine to a terminal state. Cancelling `cancel`
    /// drops any pending fetch or sleep and issues no further fetches.
    pub async fn run(&self, cancel: &CancellationToken) -> PollState {
        let mut state = PollState::Idle.start();

        while let PollState::Polling { attempt } = state {
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return PollState::Cancelled { attempts: attempt - 1 };
                }
                fetched = self.source.fetch() => fetched,
            };

            let observed = match fetched {
                Ok(view) => Some(view),
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "Entitlement fetch failed");
                    None
                }
            };
            state = state.after_attempt(observed, &self.policy);

            if let PollState::Polling { .. } = state {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return PollState::Cancelled { attempts: attempt };
                    }
                    _ = self.sleeper.sleep(self.policy.interval) => {}
                }
            }
        }

        match &state {
            PollState::Resolved(_) => tracing::info!("Subscription active after checkout"),
            PollState::Exhausted { attempts } => {
                tracing::warn!(attempts, "Subscription still inactive after checkout, giving up")
            }
            _ => {}
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SubscriptionStatus, TierId};
    use crate::services::UsageStats;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn view(status: Option<SubscriptionStatus>) -> EntitlementView {
        EntitlementView {
            usage: UsageStats {
                tier: Some(TierId::Pro),
                tier_name: Some("Pro".to_string()),
                status,
                generations_used: 0,
                generations_limit: 100,
                clients_limit: 5,
                period_end: None,
            },
            client_count: 0,
            can_add_client: status == Some(SubscriptionStatus::Active),
            can_generate: status == Some(SubscriptionStatus::Active),
        }
    }

    /// Becomes active on the given fetch number, or never.
    struct ScriptedSource {
        fetches: AtomicU32,
        active_on: Option<u32>,
        fail_first: u32,
    }

    impl ScriptedSource {
        fn new(active_on: Option<u32>) -> Self {
            Self {
                fetches: AtomicU32::new(0),
                active_on,
                fail_first: 0,
            }
        }
    }

    #[async_trait]
    impl EntitlementSource for ScriptedSource {
        async fn fetch(&self) -> anyhow::Result<EntitlementView> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_first {
                anyhow::bail!("connection refused");
            }
            if self.active_on.is_some_and(|on| n >= on) {
                Ok(view(Some(SubscriptionStatus::Active)))
            } else {
                Ok(view(None))
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSleeper {
        sleeps: Arc<Mutex<Vec<Duration>>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    #[test]
    fn detects_checkout_return_marker() {
        assert!(is_post_checkout_return("/?subscription=success"));
        assert!(is_post_checkout_return("https://app.example.com/?tab=1&subscription=success"));
        assert!(!is_post_checkout_return("/pricing?canceled=true"));
        assert!(!is_post_checkout_return("/?subscription=pending"));
    }

    #[test]
    fn transitions_follow_attempt_budget() {
        let policy = PollPolicy {
            max_attempts: 2,
            interval: Duration::from_millis(1),
        };
        let state = PollState::Idle.start();
        assert_eq!(state, PollState::Polling { attempt: 1 });

        let state = state.after_attempt(Some(view(None)), &policy);
        assert_eq!(state, PollState::Polling { attempt: 2 });

        let state = state.after_attempt(None, &policy);
        assert_eq!(state, PollState::Exhausted { attempts: 2 });
        assert!(state.is_terminal());

        let resolved = PollState::Polling { attempt: 1 }
            .after_attempt(Some(view(Some(SubscriptionStatus::Active))), &policy);
        assert!(matches!(resolved, PollState::Resolved(_)));
    }

    #[test]
    fn past_due_does_not_resolve() {
        let state = PollState::Polling { attempt: 1 }
            .after_attempt(Some(view(Some(SubscriptionStatus::PastDue))), &PollPolicy::default());
        assert_eq!(state, PollState::Polling { attempt: 2 });
    }

    #[tokio::test]
    async fn exhausts_after_exactly_ten_fetches() {
        let sleeper = RecordingSleeper::default();
        let poller = CheckoutPoller::with_sleeper(
            ScriptedSource::new(None),
            sleeper.clone(),
            PollPolicy::default(),
        );

        let state = poller.run(&CancellationToken::new()).await;

        assert_eq!(state, PollState::Exhausted { attempts: 10 });
        assert_eq!(poller.source.fetches.load(Ordering::SeqCst), 10);
        let sleeps = sleeper.sleeps.lock().unwrap();
        assert_eq!(sleeps.len(), 9);
        assert!(sleeps.iter().all(|d| *d == Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn resolves_when_subscription_turns_active() {
        let poller = CheckoutPoller::with_sleeper(
            ScriptedSource::new(Some(3)),
            RecordingSleeper::default(),
            PollPolicy::default(),
        );

        let state = poller.run(&CancellationToken::new()).await;

        assert!(matches!(state, PollState::Resolved(_)));
        assert_eq!(poller.source.fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fetch_errors_count_as_inactive() {
        let mut source = ScriptedSource::new(Some(1));
        source.fail_first = 2;
        let poller =
            CheckoutPoller::with_sleeper(source, RecordingSleeper::default(), PollPolicy::default());

        let state = poller.run(&CancellationToken::new()).await;

        assert!(matches!(state, PollState::Resolved(_)));
        assert_eq!(poller.source.fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancelled_before_start_never_fetches() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let poller = CheckoutPoller::with_sleeper(
            ScriptedSource::new(None),
            RecordingSleeper::default(),
            PollPolicy::default(),
        );

        let state = poller.run(&cancel).await;

        assert_eq!(state, PollState::Cancelled { attempts: 0 });
        assert_eq!(poller.source.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_mid_wait_stops_polling() {
        let poller = Arc::new(CheckoutPoller::with_sleeper(
            ScriptedSource::new(None),
            TokioSleeper,
            PollPolicy::default(),
        ));
        let cancel = CancellationToken::new();

        let task = {
            let poller = poller.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { poller.run(&cancel).await })
        };

        // Two fetches complete, the third wait is pending.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        cancel.cancel();
        let state = task.await.unwrap();

        assert_eq!(state, PollState::Cancelled { attempts: 2 });
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(poller.source.fetches.load(Ordering::SeqCst), 2);
    }
}
