//! MX validation of list addresses
//!
//! Every distinct domain is resolved once per request with a bounded number
//! of lookups in flight. A timeout or resolver error counts as "no MX".

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use serde::Serialize;
use tracing::debug;

use crate::config::MxSettings;
use crate::models::email::domain_of;

/// MX record lookup (testable)
#[async_trait]
pub trait MxResolver: Send + Sync {
    /// Whether `domain` publishes at least one MX record.
    async fn has_mx(&self, domain: &str) -> bool;
}

/// Resolver backed by hickory, using the system configuration when readable
pub struct HickoryMx {
    resolver: TokioResolver,
}

impl HickoryMx {
    pub fn new() -> Self {
        let resolver = TokioResolver::builder_tokio()
            .map(|b| b.build())
            .unwrap_or_else(|_| {
                TokioResolver::builder_with_config(
                    ResolverConfig::default(),
                    TokioConnectionProvider::default(),
                )
                .build()
            });

        Self { resolver }
    }
}

impl Default for HickoryMx {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MxResolver for HickoryMx {
    async fn has_mx(&self, domain: &str) -> bool {
        match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => lookup.iter().next().is_some(),
            Err(e) => {
                debug!(domain, error = %e, "MX lookup failed");
                false
            }
        }
    }
}

/// One address and whether its domain accepts mail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MxCheck {
    pub email: String,
    pub domain: String,
    pub has_mx: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MxReport {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub details: Vec<MxCheck>,
}

/// Distinct domains of `emails`, sorted; addresses without a domain are skipped.
pub fn unique_domains<S: AsRef<str>>(emails: &[S]) -> Vec<String> {
    emails
        .iter()
        .filter_map(|email| domain_of(email.as_ref()))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Resolve each domain once, at most `settings.concurrency` at a time.
pub async fn check_domains(
    resolver: &dyn MxResolver,
    domains: Vec<String>,
    settings: &MxSettings,
) -> HashMap<String, bool> {
    let timeout = settings.lookup_timeout;

    stream::iter(domains)
        .map(|domain| async move {
            let has_mx = match tokio::time::timeout(timeout, resolver.has_mx(&domain)).await {
                Ok(found) => found,
                Err(_) => {
                    debug!(%domain, "MX lookup timed out");
                    false
                }
            };
            (domain, has_mx)
        })
        .buffer_unordered(settings.concurrency.max(1))
        .collect()
        .await
}

/// Validate every address of a list against its domain's MX records.
pub async fn validate<S: AsRef<str>>(
    resolver: &dyn MxResolver,
    emails: &[S],
    settings: &MxSettings,
) -> MxReport {
    let results = check_domains(resolver, unique_domains(emails), settings).await;

    let details: Vec<MxCheck> = emails
        .iter()
        .map(|email| {
            let email = email.as_ref();
            let domain = domain_of(email).unwrap_or_default();
            MxCheck {
                email: email.to_string(),
                domain: domain.to_string(),
                has_mx: results.get(domain).copied().unwrap_or(false),
            }
        })
        .collect();

    let valid = details.iter().filter(|d| d.has_mx).count();

    MxReport {
        total: details.len(),
        valid,
        invalid: details.len() - valid,
        details,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    /// Answers from a fixed table; counts lookups per domain
    #[derive(Default)]
    struct MockMx {
        with_mx: Vec<&'static str>,
        hang: Vec<&'static str>,
        calls: Mutex<HashMap<String, usize>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl MxResolver for MockMx {
        async fn has_mx(&self, domain: &str) -> bool {
            *self
                .calls
                .lock()
                .unwrap()
                .entry(domain.to_string())
                .or_default() += 1;

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if self.hang.contains(&domain) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            } else {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.with_mx.contains(&domain)
        }
    }

    #[test]
    fn unique_domains_deduplicates() {
        let emails = ["a@x.com", "b@x.com", "c@y.org", "broken@"];
        assert_eq!(unique_domains(&emails), ["x.com", "y.org"]);
    }

    #[tokio::test(start_paused = true)]
    async fn each_domain_resolved_once() {
        let mock = MockMx {
            with_mx: vec!["x.com"],
            ..Default::default()
        };
        let emails = ["a@x.com", "b@x.com", "c@x.com", "d@nomx.net"];

        let report = validate(&mock, &emails, &MxSettings::default()).await;

        assert_eq!(report.total, 4);
        assert_eq!(report.valid, 3);
        assert_eq!(report.invalid, 1);
        assert_eq!(report.details[3].domain, "nomx.net");
        assert!(!report.details[3].has_mx);

        let calls = mock.calls.lock().unwrap();
        assert_eq!(calls.get("x.com"), Some(&1));
        assert_eq!(calls.get("nomx.net"), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_invalid() {
        let mock = MockMx {
            with_mx: vec!["slow.com", "fast.com"],
            hang: vec!["slow.com"],
            ..Default::default()
        };
        let emails = ["a@slow.com", "b@fast.com"];

        let report = validate(&mock, &emails, &MxSettings::default()).await;

        assert!(!report.details[0].has_mx);
        assert!(report.details[1].has_mx);
    }

    #[tokio::test(start_paused = true)]
    async fn fan_out_is_bounded() {
        let mock = MockMx::default();
        let domains: Vec<String> = (0..40).map(|i| format!("d{i}.com")).collect();

        let results = check_domains(&mock, domains, &MxSettings::default()).await;

        assert_eq!(results.len(), 40);
        assert!(mock.max_in_flight.load(Ordering::SeqCst) <= 10);
    }

    #[tokio::test]
    async fn address_without_domain_is_invalid() {
        let mock = MockMx::default();
        let report = validate(&mock, &["nobody"], &MxSettings::default()).await;
        assert_eq!(report.invalid, 1);
        assert_eq!(report.details[0].domain, "");
    }
}
