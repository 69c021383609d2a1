// Sensorhub Daemon - Client protocol
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! JSON-lines protocol spoken on the client socket.
//!
//! Every line from the client is one [`Request`]; the daemon answers each
//! with exactly one [`Response`], in order. Sensor events are interleaved
//! as `{"type": "event", ...}` lines whenever they arrive.
//!
//! ```text
//! > {"cmd": "register", "sensor": 3, "event": "raw_data"}
//! < {"type": "ok"}
//! > {"cmd": "start", "sensor": 3}
//! < {"type": "ok"}
//! < {"type": "event", "event": {...}}
//! ```

use sensorhub::{
    ClientId, Event, EventKind, EventType, HubError, SensorHub, SensorId, SensorInfo,
    SensorOption, SensorProperties,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Command sent by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
    ListSensors,
    GetProperties { sensor: SensorId },
    Register { sensor: SensorId, event: EventKind },
    Unregister { sensor: SensorId, event: EventKind },
    Start { sensor: SensorId },
    Stop { sensor: SensorId },
    SetInterval { sensor: SensorId, interval_ms: u32 },
    SetBatch {
        sensor: SensorId,
        interval_ms: u32,
        latency_ms: u32,
    },
    UnsetBatch { sensor: SensorId },
    SetOption { sensor: SensorId, option: SensorOption },
    GetData {
        sensor: SensorId,
        #[serde(default)]
        event: EventKind,
    },
    SetDisplay { on: bool },
}

/// Line sent to a client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Ok,
    Error { code: &'static str, message: String },
    Sensors { sensors: Vec<SensorInfo> },
    Properties { properties: SensorProperties },
    Data { event: Event },
    Event { event: Event },
}

impl Response {
    pub fn error(err: &HubError) -> Self {
        Response::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        !matches!(self, Response::Error { .. })
    }
}

/// Parse one request line
pub fn decode(line: &str) -> Result<Request> {
    Ok(serde_json::from_str(line.trim())?)
}

/// Serialize one response line, without the trailing newline
pub fn encode(response: &Response) -> Result<String> {
    Ok(serde_json::to_string(response)?)
}

/// Run one request on behalf of a client
pub fn handle(hub: &SensorHub, client: ClientId, request: Request) -> Response {
    match execute(hub, client, request) {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(client, error = %e, "request failed");
            Response::error(&e)
        }
    }
}

fn execute(hub: &SensorHub, client: ClientId, request: Request) -> sensorhub::Result<Response> {
    match request {
        Request::ListSensors => Ok(Response::Sensors {
            sensors: hub.list_sensors(client)?,
        }),
        Request::GetProperties { sensor } => Ok(Response::Properties {
            properties: hub.get_properties(client, sensor)?,
        }),
        Request::Register { sensor, event } => {
            let event_type = event_type(hub, sensor, event)?;
            hub.register_event(client, sensor, event_type)?;
            Ok(Response::Ok)
        }
        Request::Unregister { sensor, event } => {
            let event_type = event_type(hub, sensor, event)?;
            hub.unregister_event(client, sensor, event_type)?;
            Ok(Response::Ok)
        }
        Request::Start { sensor } => {
            hub.start_sensor(client, sensor)?;
            Ok(Response::Ok)
        }
        Request::Stop { sensor } => {
            hub.stop_sensor(client, sensor)?;
            Ok(Response::Ok)
        }
        Request::SetInterval {
            sensor,
            interval_ms,
        } => {
            hub.set_interval(client, sensor, interval_ms)?;
            Ok(Response::Ok)
        }
        Request::SetBatch {
            sensor,
            interval_ms,
            latency_ms,
        } => {
            hub.set_batch(client, sensor, interval_ms, latency_ms)?;
            Ok(Response::Ok)
        }
        Request::UnsetBatch { sensor } => {
            hub.unset_batch(client, sensor)?;
            Ok(Response::Ok)
        }
        Request::SetOption { sensor, option } => {
            hub.set_option(client, sensor, option)?;
            Ok(Response::Ok)
        }
        Request::GetData { sensor, event } => {
            let event_type = event_type(hub, sensor, event)?;
            Ok(Response::Data {
                event: hub.get_data(client, sensor, event_type)?,
            })
        }
        Request::SetDisplay { on } => {
            hub.set_display_state(on);
            Ok(Response::Ok)
        }
    }
}

fn event_type(hub: &SensorHub, sensor: SensorId, kind: EventKind) -> sensorhub::Result<EventType> {
    let node = hub.registry().get(sensor)?;
    Ok(EventType::new(node.sensor_type(), kind))
}
