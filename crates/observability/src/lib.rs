use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Default)]
pub struct AppMetrics {
    requests_total: AtomicU64,
    registrations_total: AtomicU64,
    logins_total: AtomicU64,
    emails_sent_total: AtomicU64,
    email_failures_total: AtomicU64,
    itineraries_generated_total: AtomicU64,
    generation_failures_total: AtomicU64,
    total_latency_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub registrations_total: u64,
    pub logins_total: u64,
    pub emails_sent_total: u64,
    pub email_failures_total: u64,
    pub itineraries_generated_total: u64,
    pub generation_failures_total: u64,
    pub avg_latency_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_registration(&self) {
        self.registrations_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_login(&self) {
        self.logins_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_email_sent(&self) {
        self.emails_sent_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_email_failure(&self) {
        self.email_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_itinerary_generated(&self) {
        self.itineraries_generated_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_generation_failure(&self) {
        self.generation_failures_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            requests_total: requests,
            registrations_total: self.registrations_total.load(Ordering::Relaxed),
            logins_total: self.logins_total.load(Ordering::Relaxed),
            emails_sent_total: self.emails_sent_total.load(Ordering::Relaxed),
            email_failures_total: self.email_failures_total.load(Ordering::Relaxed),
            itineraries_generated_total: self.itineraries_generated_total.load(Ordering::Relaxed),
            generation_failures_total: self.generation_failures_total.load(Ordering::Relaxed),
            avg_latency_millis: if requests == 0 {
                0.0
            } else {
                latency as f64 / requests as f64
            },
        }
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,safarai_api=info,safarai_planner=info,tower_http=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .init();
    });
}
