#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate prometheus;
#[macro_use]
extern crate rocket;

use isolarcloud_rs::{Bridge, Error, Notification, RequestKind, Settings};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{Build, Rocket, State};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

mod metrics;

/// Shared state of the HTTP handlers.
pub struct StateData {
    bridge: Bridge,
    /// When `/metrics` last collected successfully.
    last_refresh: Mutex<Option<Instant>>,
}

/// A collection is stale once `interval` has passed, or if none happened yet.
fn is_stale(last: Option<Instant>, now: Instant, interval: Duration) -> bool {
    match last {
        Some(at) => now.saturating_duration_since(at) >= interval,
        None => true,
    }
}

impl StateData {
    fn new(bridge: Bridge) -> Self {
        StateData {
            bridge,
            last_refresh: Mutex::new(None),
        }
    }

    fn last_refresh(&self) -> MutexGuard<'_, Option<Instant>> {
        self.last_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The refresh interval follows the bridge's current configuration.
    fn refresh_due(&self) -> bool {
        match self.bridge.client() {
            Some(client) => is_stale(
                *self.last_refresh(),
                Instant::now(),
                Duration::from_secs(client.settings().interval),
            ),
            None => true,
        }
    }

    fn mark_refreshed(&self) {
        *self.last_refresh() = Some(Instant::now());
    }
}

#[derive(Responder)]
enum Reply {
    #[response(status = 200)]
    Delivered(Json<Notification>),
    #[response(status = 502)]
    Failed(Json<Notification>),
    #[response(status = 204)]
    Empty(()),
}

async fn respond(state: &StateData, kind: RequestKind) -> Reply {
    match state.bridge.handle(kind).await {
        Some(notification) if notification.is_error() => Reply::Failed(Json(notification)),
        Some(notification) => {
            metrics::record(&notification);
            Reply::Delivered(Json(notification))
        }
        None => Reply::Empty(()),
    }
}

#[get("/details")]
async fn details_route(state: &State<StateData>) -> Reply {
    respond(state, RequestKind::Details).await
}

#[get("/power-flow")]
async fn power_flow_route(state: &State<StateData>) -> Reply {
    respond(state, RequestKind::CurrentPower).await
}

#[get("/day-energy")]
async fn day_energy_route(state: &State<StateData>) -> Reply {
    respond(state, RequestKind::DayEnergy).await
}

#[get("/overview")]
async fn overview_route(state: &State<StateData>) -> Reply {
    respond(state, RequestKind::Overview).await
}

#[get("/metrics")]
async fn metrics_route(state: &State<StateData>) -> Result<String, Status> {
    if state.refresh_due() {
        metrics::collect(&state.bridge).await.map_err(|e| {
            log::error!("metric collection failed: {}", e);
            Status::BadGateway
        })?;
        state.mark_refreshed();
    } else {
        log::debug!("metrics refreshed within interval, serving cached values");
    }

    metrics::read().map_err(|e| {
        log::error!("unable to encode metrics: {}", e);
        Status::InternalServerError
    })
}

#[get("/points")]
async fn points_route(state: &State<StateData>) -> Result<String, Status> {
    let client = state.bridge.client().ok_or(Status::ServiceUnavailable)?;

    match client.raw_points().await {
        Ok(points) => {
            let sorted: BTreeMap<_, _> = points.0.into_iter().collect();
            Ok(format!("{:#?}", sorted))
        }
        Err(Error::EmptyResult(reason)) => Ok(reason),
        Err(e) => {
            log::error!("point dump failed: {}", e);
            Err(Status::BadGateway)
        }
    }
}

#[launch]
fn rocket() -> Rocket<Build> {
    env_logger::init();

    let bridge = match Settings::load().and_then(Bridge::with_settings) {
        Ok(bridge) => bridge,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    let state = StateData::new(bridge);

    rocket::build().manage(state).mount(
        "/",
        routes![
            details_route,
            power_flow_route,
            day_energy_route,
            overview_route,
            metrics_route,
            points_route
        ],
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn first_collection_is_due() {
        assert!(is_stale(None, Instant::now(), Duration::from_secs(60)));
    }

    #[test]
    fn collection_within_interval_is_fresh() {
        let at = Instant::now();
        let interval = Duration::from_secs(60);

        assert!(!is_stale(Some(at), at + Duration::from_secs(59), interval));
        assert!(is_stale(Some(at), at + Duration::from_secs(60), interval));
    }

    #[test]
    fn unconfigured_state_is_always_due() {
        let state = StateData::new(Bridge::new());
        state.mark_refreshed();
        assert!(state.refresh_due());
    }
}
