// velo_models/src/codec.rs

//! 遥测帧解码器。
//!
//! 设备固件与客户端独立演进，因此解码器对未知字段和缺失字段是宽松的：
//! 只拷贝当前种类已识别的字段，缺失的字段保持 `None`。
//! 身份和类型则严格校验，身份决定分发目标，类型错误会污染数值显示。

use serde_json::{Map, Value};

use crate::device_models::{
    DeviceIdentity, GpsData, GpsRecord, IMEI_FIELD, LoginData, LoginRecord, MergedNetworkData,
    SensorData, StatusData, StatusRecord, TelemetryRecord, VELO_ID_FIELD,
};
use crate::enums::TelemetryKind;
use crate::error::DecodeError;

/// 出现任意一个即表示状态负载为合并格式的网络字段。
pub const MERGED_NETWORK_KEYS: [&str; 11] = [
    "networkStatus",
    "rsrp",
    "mcc",
    "mnc",
    "cid",
    "band",
    "areaCode",
    "op",
    "modem",
    "fw",
    "iccid",
];

const EXPECTED_NUMBER: &str = "有限数值";
const EXPECTED_STRING: &str = "字符串";
const EXPECTED_OBJECT: &str = "对象";

/// 按消息种类把原始帧解码为强类型记录。
///
/// # Errors
/// * `MalformedIdentity` - 帧不是对象，或 `imei` / `veloId` 缺失、为空、不是字符串。
/// * `TypeMismatch` - 已识别字段存在但类型不符，或负载容器不是对象。
pub fn decode(kind: TelemetryKind, raw: &Value) -> Result<TelemetryRecord, DecodeError> {
    let frame = raw
        .as_object()
        .ok_or(DecodeError::MalformedIdentity { field: IMEI_FIELD })?;
    let identity = decode_identity(frame)?;
    let data = DataFields::from_frame(frame, kind.data_field())?;

    let record = match kind {
        TelemetryKind::Login => TelemetryRecord::Login(LoginRecord {
            identity,
            login_data: decode_login(&data)?,
        }),
        TelemetryKind::Status => TelemetryRecord::Status(StatusRecord {
            identity,
            status_data: decode_status(&data)?,
        }),
        TelemetryKind::Gps => TelemetryRecord::Gps(GpsRecord {
            identity,
            gps_data: decode_gps(&data)?,
        }),
    };
    Ok(record)
}

fn decode_identity(frame: &Map<String, Value>) -> Result<DeviceIdentity, DecodeError> {
    let imei = identity_field(frame, IMEI_FIELD)?;
    let velo_id = identity_field(frame, VELO_ID_FIELD)?;
    DeviceIdentity::new(imei, velo_id)
}

fn identity_field<'a>(frame: &'a Map<String, Value>, field: &'static str) -> Result<&'a str, DecodeError> {
    match frame.get(field) {
        Some(Value::String(value)) if !value.is_empty() => Ok(value),
        _ => Err(DecodeError::MalformedIdentity { field }),
    }
}

fn decode_login(data: &DataFields<'_>) -> Result<LoginData, DecodeError> {
    Ok(LoginData {
        network_status: data.string("networkStatus")?,
        rsrp: data.number("rsrp")?,
        mcc: data.string("mcc")?,
        mnc: data.string("mnc")?,
        cid: data.string("cid")?,
        band: data.string("band")?,
        area_code: data.string("areaCode")?,
        op: data.string("op")?,
        modem: data.string("modem")?,
        fw: data.string("fw")?,
        iccid: data.string("iccid")?,
    })
}

fn decode_status(data: &DataFields<'_>) -> Result<StatusData, DecodeError> {
    let sensors = SensorData {
        speed: data.number("speed")?,
        gear: data.number("gear")?,
        aku_voltage: data.number("aku_voltage")?,
        temperature: data.number("temperature")?,
        humidity: data.number("humidity")?,
        comp_x: data.number("comp_x")?,
        comp_y: data.number("comp_y")?,
        comp_z: data.number("comp_z")?,
    };

    if !data.has_any(&MERGED_NETWORK_KEYS) {
        return Ok(StatusData::Sensor(sensors));
    }

    let network = MergedNetworkData {
        network_status: data.string("networkStatus")?,
        rsrp: data.number("rsrp")?,
        mcc: data.number("mcc")?,
        mnc: data.number("mnc")?,
        cid: data.number("cid")?,
        band: data.number("band")?,
        area_code: data.number("areaCode")?,
        op: data.number("op")?,
        modem: data.string("modem")?,
        fw: data.string("fw")?,
        iccid: data.string("iccid")?,
    };
    Ok(StatusData::Merged { sensors, network })
}

fn decode_gps(data: &DataFields<'_>) -> Result<GpsData, DecodeError> {
    Ok(GpsData {
        latitude: data.number("latitude")?,
        longitude: data.number("longitude")?,
        altitude: data.number("altitude")?,
        accuracy: data.number("accuracy")?,
        speed: data.number("speed")?,
        speed_accuracy: data.number("speedAccuracy")?,
        heading: data.number("heading")?,
        pdop: data.number("pdop")?,
        hdop: data.number("hdop")?,
        vdop: data.number("vdop")?,
        tdop: data.number("tdop")?,
        meas_id: data.number("measId")?,
    })
}

/// 负载容器 (`loginData` / `statusData` / `gpsData`) 的只读视图。
///
/// 容器缺失等价于所有字段都未上报；JSON `null` 也视为未上报。
struct DataFields<'a> {
    fields: Option<&'a Map<String, Value>>,
}

impl<'a> DataFields<'a> {
    fn from_frame(frame: &'a Map<String, Value>, container: &'static str) -> Result<Self, DecodeError> {
        match frame.get(container) {
            None | Some(Value::Null) => Ok(Self { fields: None }),
            Some(Value::Object(fields)) => Ok(Self { fields: Some(fields) }),
            Some(_) => Err(DecodeError::TypeMismatch { field: container, expected: EXPECTED_OBJECT }),
        }
    }

    fn get(&self, field: &str) -> Option<&'a Value> {
        self.fields
            .and_then(|fields| fields.get(field))
            .filter(|value| !value.is_null())
    }

    fn has_any(&self, keys: &[&str]) -> bool {
        keys.iter().any(|key| self.get(key).is_some())
    }

    fn number(&self, field: &'static str) -> Result<Option<f64>, DecodeError> {
        match self.get(field) {
            None => Ok(None),
            Some(Value::Number(number)) => number
                .as_f64()
                .filter(|value| value.is_finite())
                .map(Some)
                .ok_or(DecodeError::TypeMismatch { field, expected: EXPECTED_NUMBER }),
            Some(_) => Err(DecodeError::TypeMismatch { field, expected: EXPECTED_NUMBER }),
        }
    }

    fn string(&self, field: &'static str) -> Result<Option<String>, DecodeError> {
        match self.get(field) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(_) => Err(DecodeError::TypeMismatch { field, expected: EXPECTED_STRING }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expect_status(record: TelemetryRecord) -> StatusRecord {
        match record {
            TelemetryRecord::Status(status) => status,
            other => panic!("期望 StatusRecord，实际得到: {:?}", other),
        }
    }

    #[test]
    fn test_status_frame_keeps_only_reported_fields() {
        let raw = json!({ "imei": "123", "veloId": "v1", "statusData": { "speed": 42 } });
        let status = expect_status(decode(TelemetryKind::Status, &raw).expect("合法帧应解码成功"));

        assert_eq!(status.identity, DeviceIdentity::new("123", "v1").unwrap());
        let sensors = status.status_data.sensors();
        assert_eq!(sensors.speed, Some(42.0));
        // 断言：未上报的字段保持 None，不会被默认成 0
        assert_eq!(sensors.gear, None);
        assert_eq!(sensors.aku_voltage, None);
        assert_eq!(sensors.comp_z, None);
        assert!(status.status_data.network().is_none(), "无网络字段时应为纯传感器格式");
    }

    #[test]
    fn test_missing_identity_fields_are_rejected() {
        let missing_imei = json!({ "veloId": "v1", "statusData": { "speed": 5 } });
        assert_eq!(
            decode(TelemetryKind::Status, &missing_imei),
            Err(DecodeError::MalformedIdentity { field: "imei" })
        );

        let missing_velo_id = json!({ "imei": "123", "gpsData": {} });
        assert_eq!(
            decode(TelemetryKind::Gps, &missing_velo_id),
            Err(DecodeError::MalformedIdentity { field: "veloId" })
        );

        let empty_imei = json!({ "imei": "", "veloId": "v1" });
        assert!(matches!(
            decode(TelemetryKind::Login, &empty_imei),
            Err(DecodeError::MalformedIdentity { .. })
        ));

        let numeric_imei = json!({ "imei": 123, "veloId": "v1" });
        assert!(matches!(
            decode(TelemetryKind::Login, &numeric_imei),
            Err(DecodeError::MalformedIdentity { field: "imei" })
        ));

        assert!(matches!(
            decode(TelemetryKind::Status, &json!("not an object")),
            Err(DecodeError::MalformedIdentity { .. })
        ));
    }

    #[test]
    fn test_identity_is_preserved_for_every_kind() {
        for kind in TelemetryKind::ALL {
            let raw = json!({ "imei": "356938035643809", "veloId": "velo-7" });
            let record = decode(kind, &raw).expect("只有身份的帧也应解码成功");
            assert_eq!(record.kind(), kind);
            assert_eq!(record.identity().imei(), "356938035643809");
            assert_eq!(record.identity().velo_id(), "velo-7");
        }
    }

    #[test]
    fn test_non_numeric_value_reports_field_name() {
        let raw = json!({ "imei": "123", "veloId": "v1", "statusData": { "speed": "fast" } });
        assert_eq!(
            decode(TelemetryKind::Status, &raw),
            Err(DecodeError::TypeMismatch { field: "speed", expected: EXPECTED_NUMBER })
        );

        let raw = json!({ "imei": "123", "veloId": "v1", "gpsData": { "latitude": 46.05, "hdop": [1] } });
        let err = decode(TelemetryKind::Gps, &raw).expect_err("数组不是数值，应解码失败");
        assert_eq!(err.field(), "hdop");
    }

    #[test]
    fn test_login_fields_are_strings_except_rsrp() {
        let raw = json!({
            "imei": "123",
            "veloId": "v1",
            "loginData": { "networkStatus": "registered", "rsrp": -97, "mcc": "293", "band": "20", "firmwareChannel": "beta" }
        });
        let record = decode(TelemetryKind::Login, &raw).expect("合法登录帧应解码成功");
        let TelemetryRecord::Login(login) = record else {
            panic!("期望 LoginRecord");
        };
        assert_eq!(login.login_data.network_status.as_deref(), Some("registered"));
        assert_eq!(login.login_data.rsrp, Some(-97.0));
        assert_eq!(login.login_data.mcc.as_deref(), Some("293"));
        assert_eq!(login.login_data.iccid, None);

        let numeric_mcc = json!({ "imei": "123", "veloId": "v1", "loginData": { "mcc": 293 } });
        assert_eq!(
            decode(TelemetryKind::Login, &numeric_mcc),
            Err(DecodeError::TypeMismatch { field: "mcc", expected: EXPECTED_STRING })
        );
    }

    #[test]
    fn test_status_with_network_fields_decodes_as_merged() {
        let raw = json!({
            "imei": "123",
            "veloId": "v1",
            "statusData": { "speed": 12.5, "aku_voltage": 3.9, "rsrp": -101, "mcc": 293, "fw": "1.4.2" }
        });
        let status = expect_status(decode(TelemetryKind::Status, &raw).expect("合并格式应解码成功"));
        let StatusData::Merged { sensors, network } = &status.status_data else {
            panic!("含网络字段的状态负载应解码为合并格式");
        };
        assert_eq!(sensors.speed, Some(12.5));
        assert_eq!(sensors.aku_voltage, Some(3.9));
        assert_eq!(network.rsrp, Some(-101.0));
        assert_eq!(network.mcc, Some(293.0));
        assert_eq!(network.fw.as_deref(), Some("1.4.2"));
        assert_eq!(network.band, None);
    }

    #[test]
    fn test_null_and_missing_container_mean_absent() {
        let raw = json!({ "imei": "123", "veloId": "v1", "statusData": { "speed": null, "rsrp": null } });
        let status = expect_status(decode(TelemetryKind::Status, &raw).expect("null 字段应视为未上报"));
        assert_eq!(status.status_data, StatusData::Sensor(SensorData::default()));

        let raw = json!({ "imei": "123", "veloId": "v1" });
        let status = expect_status(decode(TelemetryKind::Status, &raw).expect("缺少容器应视为全部未上报"));
        assert_eq!(status.status_data.sensors(), &SensorData::default());

        let raw = json!({ "imei": "123", "veloId": "v1", "statusData": 7 });
        assert_eq!(
            decode(TelemetryKind::Status, &raw),
            Err(DecodeError::TypeMismatch { field: "statusData", expected: EXPECTED_OBJECT })
        );
    }
}
