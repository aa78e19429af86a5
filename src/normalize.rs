//! Mapping of raw vendor records into the crate's model. Everything here is a
//! pure function of its input.

use crate::model::{
    DayEnergySummary, DirectedEdge, Meter, MeterReading, Node, NodeId, NodeStatus,
    OverviewSummary, PowerFlowSnapshot, PowerUnit, RawPoints, StationDetails, StorageNode, Watts,
};
use crate::settings::PointMap;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde_json::Value;

pub const UNKNOWN_ADDRESS: &str = "Unknown address";

/// Battery status codes reported by the storage device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
enum StorageStatusCode {
    Idle = 0,
    Charging = 1,
    Discharging = 2,
}

/// Non-negative power readings that drive edge inference.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PowerInputs {
    pub charging: Watts,
    pub discharging: Watts,
    pub pv: Watts,
    pub feed_in: Watts,
    pub purchased: Watts,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    pub connections: Vec<DirectedEdge>,
    pub storage: Watts,
    pub grid: Watts,
}

/// Derive the directed edges of the power-flow graph.
///
/// Charging wins over discharging if both are reported. PV feeding the load
/// is independent of the storage branch. Grid direction follows the sign of
/// feed-in minus purchased; magnitudes are always returned unsigned.
pub fn infer_flow(inputs: PowerInputs) -> Flow {
    let mut connections = Vec::new();

    let storage = if inputs.charging > 0.0 {
        connections.push(DirectedEdge::new(NodeId::Pv, NodeId::Storage));
        inputs.charging
    } else if inputs.discharging > 0.0 {
        connections.push(DirectedEdge::new(NodeId::Storage, NodeId::Load));
        inputs.discharging
    } else {
        0.0
    };

    if inputs.pv > 0.0 {
        connections.push(DirectedEdge::new(NodeId::Pv, NodeId::Load));
    }

    let net = inputs.feed_in - inputs.purchased;
    let grid = if net > 0.0 {
        connections.push(DirectedEdge::new(NodeId::Load, NodeId::Grid));
        net
    } else if net < 0.0 {
        connections.push(DirectedEdge::new(NodeId::Grid, NodeId::Load));
        -net
    } else {
        0.0
    };

    Flow {
        connections,
        storage,
        grid,
    }
}

/// Label a raw storage status code, keeping unrecognised codes verbatim.
pub fn storage_status(code: &str) -> NodeStatus {
    /* codes may arrive float-formatted, e.g. "1.0"; from_f64 alone would truncate 1.5 */
    match code
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|c| c.fract() == 0.0)
        .and_then(StorageStatusCode::from_f64)
    {
        Some(StorageStatusCode::Idle) => NodeStatus::Idle,
        Some(StorageStatusCode::Charging) => NodeStatus::Charging,
        Some(StorageStatusCode::Discharging) => NodeStatus::Discharging,
        None => NodeStatus::Unknown(code.trim().to_string()),
    }
}

fn activity(power: Watts) -> NodeStatus {
    if power > 0.0 {
        NodeStatus::Active
    } else {
        NodeStatus::Idle
    }
}

fn node(power: Watts) -> Node {
    Node {
        current_power_watts: power,
        status: activity(power),
    }
}

pub fn to_power_flow(raw: &RawPoints, points: &PointMap) -> PowerFlowSnapshot {
    let inputs = PowerInputs {
        charging: raw.magnitude(&points.battery_charging_power),
        discharging: raw.magnitude(&points.battery_discharging_power),
        pv: raw.magnitude(&points.pv_power),
        feed_in: raw.magnitude(&points.feed_in_power),
        purchased: raw.magnitude(&points.purchased_power),
    };
    let flow = infer_flow(inputs);

    let reported = points
        .battery_status
        .as_deref()
        .and_then(|id| raw.text(id))
        .map(|code| storage_status(&code));

    let storage_status = reported.unwrap_or(if inputs.charging > 0.0 {
        NodeStatus::Charging
    } else if inputs.discharging > 0.0 {
        NodeStatus::Discharging
    } else {
        NodeStatus::Idle
    });

    /* vendor reports state of charge as a 0..1 fraction */
    let charge_level_percent = (raw.magnitude(&points.battery_level) * 100.0).clamp(0.0, 100.0);

    PowerFlowSnapshot {
        pv: node(inputs.pv),
        storage: StorageNode {
            current_power_watts: flow.storage,
            status: storage_status,
            charge_level_percent,
        },
        load: node(raw.magnitude(&points.load_power)),
        grid: node(flow.grid),
        connections: flow.connections,
        unit: PowerUnit::Watts,
    }
}

pub fn to_day_energy(raw: &RawPoints, points: &PointMap) -> DayEnergySummary {
    let meters = Meter::ALL
        .iter()
        .map(|meter| {
            let id = match meter {
                Meter::Production => &points.daily_production,
                Meter::Consumption => &points.daily_consumption,
                Meter::FeedIn => &points.daily_feed_in,
                Meter::Purchased => &points.daily_purchased,
                Meter::SelfConsumption => &points.daily_self_consumption,
            };
            MeterReading {
                name: *meter,
                value_watt_hours: raw.magnitude(id),
            }
        })
        .collect();

    DayEnergySummary { meters }
}

pub fn to_overview(raw: &RawPoints, points: &PointMap) -> OverviewSummary {
    OverviewSummary {
        last_day: raw.magnitude(&points.overview_day),
        last_month: raw.magnitude(&points.overview_month),
        last_year: raw.magnitude(&points.overview_year),
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Map a station detail record. Capacity is reported in watts.
pub fn to_station_details(record: &Value) -> StationDetails {
    let address = record
        .get("ps_location")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_ADDRESS)
        .to_string();

    let peak_power_kw = number(record.get("design_capacity"))
        .filter(|c| c.is_finite() && *c > 0.0)
        .map(|c| c / 1000.0)
        .unwrap_or(0.0);

    StationDetails {
        address,
        peak_power_kw,
    }
}
