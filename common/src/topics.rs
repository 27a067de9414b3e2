pub const TOPIC_OPTIMIZER_STATUS: &str = "hvac/optimizer/status";
pub const TOPIC_OPTIMIZER_CYCLE: &str = "hvac/optimizer/cycle";

/// Per-device decision topic, e.g. `hvac/optimizer/device/192.168.1.20/decision`.
/// Topic wildcards and separators in the id are replaced with `_`.
pub fn device_decision_topic(device_id: &str) -> String {
    let segment: String = device_id
        .chars()
        .map(|c| if matches!(c, '/' | '+' | '#') { '_' } else { c })
        .collect();
    format!("hvac/optimizer/device/{segment}/decision")
}
