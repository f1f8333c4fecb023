use sqsdr::memory::MemoryQueueService;
use sqsdr::PollerConfig;
use std::sync::Arc;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Poller settings that do not wait on empty queues.
pub fn quick() -> PollerConfig {
    PollerConfig {
        wait_time_seconds: 0,
        ..PollerConfig::default()
    }
}

/// A fresh service with one queue per name, returning their urls in order.
pub fn service_with(names: &[&str]) -> (Arc<MemoryQueueService>, Vec<String>) {
    init_logging();
    let service = Arc::new(MemoryQueueService::new());
    let urls = names.iter().map(|name| service.add_queue(name)).collect();
    (service, urls)
}

pub fn sorted_bodies(service: &MemoryQueueService, queue_url: &str) -> Vec<String> {
    let mut bodies: Vec<String> = service
        .visible_bodies(queue_url)
        .into_iter()
        .flatten()
        .collect();
    bodies.sort();
    bodies
}
