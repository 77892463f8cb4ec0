use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub parcels_created_total: IntCounter,
    pub status_transitions_total: IntCounterVec,
    pub rejected_transitions_total: IntCounter,
    pub tracking_id_collisions_total: IntCounter,
    pub agent_assignments_total: IntCounter,
    pub notifications_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let parcels_created_total =
            IntCounter::new("parcels_created_total", "Total parcels booked")
                .expect("valid parcels_created_total metric");

        let status_transitions_total = IntCounterVec::new(
            Opts::new(
                "parcel_status_transitions_total",
                "Applied parcel status transitions by target status",
            ),
            &["status"],
        )
        .expect("valid parcel_status_transitions_total metric");

        let rejected_transitions_total = IntCounter::new(
            "parcel_rejected_transitions_total",
            "Status changes refused by the transition table",
        )
        .expect("valid parcel_rejected_transitions_total metric");

        let tracking_id_collisions_total = IntCounter::new(
            "tracking_id_collisions_total",
            "Generated tracking ids that were already taken",
        )
        .expect("valid tracking_id_collisions_total metric");

        let agent_assignments_total =
            IntCounter::new("agent_assignments_total", "Agents bound to parcels")
                .expect("valid agent_assignments_total metric");

        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Notifications by delivery outcome"),
            &["outcome"],
        )
        .expect("valid notifications_total metric");

        registry
            .register(Box::new(parcels_created_total.clone()))
            .expect("register parcels_created_total");
        registry
            .register(Box::new(status_transitions_total.clone()))
            .expect("register parcel_status_transitions_total");
        registry
            .register(Box::new(rejected_transitions_total.clone()))
            .expect("register parcel_rejected_transitions_total");
        registry
            .register(Box::new(tracking_id_collisions_total.clone()))
            .expect("register tracking_id_collisions_total");
        registry
            .register(Box::new(agent_assignments_total.clone()))
            .expect("register agent_assignments_total");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");

        Self {
            registry,
            parcels_created_total,
            status_transitions_total,
            rejected_transitions_total,
            tracking_id_collisions_total,
            agent_assignments_total,
            notifications_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
