use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

pub type Watts = f64;
pub type WattHours = f64;
pub type KiloWatts = f64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationDetails {
    pub address: String,
    pub peak_power_kw: KiloWatts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeId {
    Pv,
    Storage,
    Load,
    Grid,
}

impl NodeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeId::Pv => "PV",
            NodeId::Storage => "STORAGE",
            NodeId::Load => "LOAD",
            NodeId::Grid => "GRID",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DirectedEdge {
    pub from: NodeId,
    pub to: NodeId,
}

impl DirectedEdge {
    pub fn new(from: NodeId, to: NodeId) -> Self {
        DirectedEdge { from, to }
    }
}

/// Status label of a power-flow node. Serialized as its display string so an
/// unknown vendor code survives as `Unknown(<code>)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeStatus {
    Active,
    Idle,
    Charging,
    Discharging,
    Unknown(String),
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Active => write!(f, "Active"),
            NodeStatus::Idle => write!(f, "Idle"),
            NodeStatus::Charging => write!(f, "Charging"),
            NodeStatus::Discharging => write!(f, "Discharging"),
            NodeStatus::Unknown(code) => write!(f, "Unknown({})", code),
        }
    }
}

impl Serialize for NodeStatus {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub current_power_watts: Watts,
    pub status: NodeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageNode {
    pub current_power_watts: Watts,
    pub status: NodeStatus,
    pub charge_level_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PowerUnit {
    #[serde(rename = "W")]
    Watts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerFlowSnapshot {
    #[serde(rename = "PV")]
    pub pv: Node,
    #[serde(rename = "STORAGE")]
    pub storage: StorageNode,
    #[serde(rename = "LOAD")]
    pub load: Node,
    #[serde(rename = "GRID")]
    pub grid: Node,
    pub connections: Vec<DirectedEdge>,
    pub unit: PowerUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Meter {
    Production,
    Consumption,
    FeedIn,
    Purchased,
    SelfConsumption,
}

impl Meter {
    /// Output order of a `DayEnergySummary`.
    pub const ALL: [Meter; 5] = [
        Meter::Production,
        Meter::Consumption,
        Meter::FeedIn,
        Meter::Purchased,
        Meter::SelfConsumption,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterReading {
    pub name: Meter,
    pub value_watt_hours: WattHours,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayEnergySummary {
    pub meters: Vec<MeterReading>,
}

impl DayEnergySummary {
    pub fn get(&self, meter: Meter) -> Option<WattHours> {
        self.meters
            .iter()
            .find(|reading| reading.name == meter)
            .map(|reading| reading.value_watt_hours)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewSummary {
    pub last_day: WattHours,
    pub last_month: WattHours,
    pub last_year: WattHours,
}

/// `device_point` object of one device in a real-time response. Keys are the
/// vendor point keys (`p<id>`), values are usually numeric strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPoints(pub HashMap<String, Value>);

impl RawPoints {
    pub fn new(points: HashMap<String, Value>) -> Self {
        RawPoints(points)
    }

    /// Value of point `id`, accepting both the bare id and its `p`-prefixed key.
    pub fn get(&self, id: &str) -> Option<&Value> {
        self.0
            .get(&format!("p{}", id))
            .or_else(|| self.0.get(id))
    }

    /// Point `id` as a non-negative number; missing, null or unparseable is 0.
    pub fn magnitude(&self, id: &str) -> f64 {
        let value = match self.get(id) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };

        match value {
            Some(v) if v.is_finite() && v > 0.0 => v,
            _ => 0.0,
        }
    }

    /// Point `id` as raw text, for status codes.
    pub fn text(&self, id: &str) -> Option<String> {
        match self.get(id)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
