//! Request/notification surface towards the view layer.

use crate::api::{Client, Error};
use crate::model::{DayEnergySummary, OverviewSummary, PowerFlowSnapshot, StationDetails};
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestKind {
    Configure,
    Details,
    CurrentPower,
    Overview,
    DayEnergy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub kind: RequestKind,
    #[serde(default)]
    pub config: Option<Settings>,
}

impl Request {
    pub fn new(kind: RequestKind) -> Self {
        Request { kind, config: None }
    }

    pub fn configure(settings: Settings) -> Self {
        Request {
            kind: RequestKind::Configure,
            config: Some(settings),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "notification", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    StationDetails(StationDetails),
    PowerFlow(PowerFlowSnapshot),
    Overview(OverviewSummary),
    DayEnergy(DayEnergySummary),
    Error { message: String },
}

impl Notification {
    pub fn error(error: &Error) -> Self {
        Notification::Error {
            message: error.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Notification::Error { .. })
    }
}

/// Turns view-layer requests into notifications over one shared client.
#[derive(Clone, Default)]
pub struct Bridge {
    client: Option<Arc<Client>>,
}

impl Bridge {
    /// Unconfigured bridge; data requests fail until a configuration arrives.
    pub fn new() -> Self {
        Bridge::default()
    }

    pub fn with_settings(settings: Settings) -> Result<Self, Error> {
        Ok(Bridge {
            client: Some(Arc::new(Client::new(settings)?)),
        })
    }

    pub fn client(&self) -> Option<&Arc<Client>> {
        self.client.as_ref()
    }

    /// Install `settings`. The current session, and with it the cached token,
    /// survives when the account is unchanged.
    pub fn configure(&mut self, settings: Settings) -> Result<(), Error> {
        let client = match &self.client {
            Some(current) if current.settings().same_account(&settings) => {
                Client::with_session(settings, current.session().clone())?
            }
            _ => {
                log::info!("configured for account {}", settings.username);
                Client::new(settings)?
            }
        };
        self.client = Some(Arc::new(client));
        Ok(())
    }

    /// Answer one data request. `None` means the vendor had no data this
    /// cycle and nothing is sent to the view layer.
    pub async fn handle(&self, kind: RequestKind) -> Option<Notification> {
        let client = match &self.client {
            Some(client) => client,
            None => {
                return Some(Notification::error(&Error::ConfigError(String::from(
                    "no configuration received yet",
                ))))
            }
        };

        let result = match kind {
            RequestKind::Configure => return None,
            RequestKind::Details => client
                .station_details()
                .await
                .map(Notification::StationDetails),
            RequestKind::CurrentPower => client.power_flow().await.map(Notification::PowerFlow),
            RequestKind::Overview => client.overview().await.map(Notification::Overview),
            RequestKind::DayEnergy => client.day_energy().await.map(Notification::DayEnergy),
        };

        match result {
            Ok(notification) => Some(notification),
            Err(Error::EmptyResult(reason)) => {
                log::debug!("{:?}: {}, nothing to send", kind, reason);
                None
            }
            Err(e) => {
                log::error!("{:?} request failed: {}", kind, e);
                Some(Notification::error(&e))
            }
        }
    }

    /// Apply any configuration carried by `request`, then answer it.
    pub async fn receive(&mut self, request: Request) -> Option<Notification> {
        if let Err(e) = self.apply(&request) {
            return Some(Notification::error(&e));
        }
        self.handle(request.kind).await
    }

    fn apply(&mut self, request: &Request) -> Result<(), Error> {
        match (&request.config, request.kind) {
            (Some(settings), _) => self.configure(settings.clone()),
            (None, RequestKind::Configure) => Err(Error::ConfigError(String::from(
                "configure request carries no configuration",
            ))),
            (None, _) => Ok(()),
        }
    }

    /// Serve requests until the sending side closes. Data requests run
    /// concurrently and share the session; configuration is applied in
    /// arrival order.
    pub async fn run(
        mut self,
        mut requests: mpsc::Receiver<Request>,
        notifications: mpsc::Sender<Notification>,
    ) {
        while let Some(request) = requests.recv().await {
            if let Err(e) = self.apply(&request) {
                if notifications.send(Notification::error(&e)).await.is_err() {
                    break;
                }
                continue;
            }

            if request.kind == RequestKind::Configure {
                continue;
            }

            let bridge = self.clone();
            let notifications = notifications.clone();
            tokio::spawn(async move {
                if let Some(notification) = bridge.handle(request.kind).await {
                    if notifications.send(notification).await.is_err() {
                        log::warn!("view layer closed, dropping {:?} notification", request.kind);
                    }
                }
            });
        }
        log::debug!("request channel closed, bridge stopped");
    }
}
