use isolarcloud_rs::model::{DayEnergySummary, OverviewSummary, PowerFlowSnapshot, StationDetails};
use isolarcloud_rs::{Bridge, Notification, RequestKind};
use prometheus::{Encoder, Gauge, GaugeVec, TextEncoder};

lazy_static! {
    static ref NODE_POWER_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("node_power_watts", "current power of a power-flow node (in W)"),
        &["node"],
    )
    .unwrap();
    static ref FLOW_EDGE_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("power_flow_edge", "1 while energy flows from `from` to `to`"),
        &["from", "to"],
    )
    .unwrap();
    static ref STORAGE_CHARGE_GAUGE: Gauge = register_gauge!(opts!(
        "storage_charge_level_percent",
        "battery state of charge (in %)"
    ))
    .unwrap();
    static ref DAY_ENERGY_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("day_energy_watt_hours", "energy of the current day per meter (in Wh)"),
        &["meter"],
    )
    .unwrap();
    static ref OVERVIEW_GAUGE: GaugeVec = register_gauge_vec!(
        opts!("energy_total_watt_hours", "plant energy yield per period (in Wh)"),
        &["period"],
    )
    .unwrap();
    static ref PEAK_POWER_GAUGE: Gauge = register_gauge!(opts!(
        "plant_peak_power_kw",
        "installed peak power of the plant (in kW)"
    ))
    .unwrap();
}

fn record_power_flow(snapshot: &PowerFlowSnapshot) {
    let nodes = [
        ("PV", snapshot.pv.current_power_watts),
        ("STORAGE", snapshot.storage.current_power_watts),
        ("LOAD", snapshot.load.current_power_watts),
        ("GRID", snapshot.grid.current_power_watts),
    ];
    for (node, watts) in nodes {
        NODE_POWER_GAUGE.with_label_values(&[node]).set(watts);
    }

    STORAGE_CHARGE_GAUGE.set(snapshot.storage.charge_level_percent);

    /* edges disappear when the flow stops */
    FLOW_EDGE_GAUGE.reset();
    for edge in &snapshot.connections {
        FLOW_EDGE_GAUGE
            .with_label_values(&[edge.from.as_str(), edge.to.as_str()])
            .set(1.0);
    }
}

fn record_day_energy(summary: &DayEnergySummary) {
    for reading in &summary.meters {
        DAY_ENERGY_GAUGE
            .with_label_values(&[&format!("{:?}", reading.name)])
            .set(reading.value_watt_hours);
    }
}

fn record_overview(summary: &OverviewSummary) {
    OVERVIEW_GAUGE.with_label_values(&["day"]).set(summary.last_day);
    OVERVIEW_GAUGE.with_label_values(&["month"]).set(summary.last_month);
    OVERVIEW_GAUGE.with_label_values(&["year"]).set(summary.last_year);
}

fn record_station_details(details: &StationDetails) {
    PEAK_POWER_GAUGE.set(details.peak_power_kw);
}

/// Feed a successful notification into the Prometheus registry.
pub fn record(notification: &Notification) {
    match notification {
        Notification::PowerFlow(snapshot) => record_power_flow(snapshot),
        Notification::DayEnergy(summary) => record_day_energy(summary),
        Notification::Overview(summary) => record_overview(summary),
        Notification::StationDetails(details) => record_station_details(details),
        Notification::Error { .. } => {}
    }
}

/// Refresh every metric the configuration allows, collecting failure messages.
pub async fn collect(bridge: &Bridge) -> Result<(), String> {
    let settings = match bridge.client() {
        Some(client) => client.settings(),
        None => return Err(String::from("not configured")),
    };

    let mut kinds = vec![RequestKind::CurrentPower, RequestKind::DayEnergy];
    if settings.plant_id.is_some() {
        kinds.push(RequestKind::Overview);
    }
    if settings.serial_number.is_some() {
        kinds.push(RequestKind::Details);
    }

    let mut failures = Vec::new();
    for kind in kinds {
        match bridge.handle(kind).await {
            Some(Notification::Error { message }) => failures.push(message),
            Some(notification) => record(&notification),
            None => log::warn!("No data returned for {:?}, keeping previous values", kind),
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(failures.join("; "))
    }
}

/// Read metrics from Prometheus exporter registry.
pub fn read() -> Result<String, String> {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| e.to_string())?;
    String::from_utf8(buffer).map_err(|e| e.to_string())
}
