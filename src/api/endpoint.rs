pub type Endpoint = str;

pub const LOGIN: &Endpoint = "/openapi/login";
pub const STATION_DETAIL: &Endpoint = "/openapi/getPowerStationDetail";
pub const DEVICE_REAL_TIME_DATA: &Endpoint = "/openapi/getDeviceRealTimeData";
