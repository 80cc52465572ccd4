use crate::types::AnnouncementRecord;

/// Emit a published announcement as a single JSON line to stdout.
pub fn report_announcement(record: &AnnouncementRecord) {
    if let Ok(json) = serde_json::to_string(record) {
        println!("{json}");
    }
}
