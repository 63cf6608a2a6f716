use once_cell::sync::Lazy;
use prometheus::{register_int_gauge_vec, IntGaugeVec};

static INSTANCES: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "registry_instances",
        "Registered instances per service, including DOWN ones",
        &["service"]
    )
    .expect("Failed to register registry instances metric")
});

pub fn set_instances(service: &str, count: usize) {
    INSTANCES
        .with_label_values(&[service])
        .set(i64::try_from(count).unwrap_or(i64::MAX));
}
