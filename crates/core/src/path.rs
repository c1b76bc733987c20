//! Request path construction.

/// Prefix of every bulk API path, relative to the REST endpoint.
pub const BULK_PREFIX: &str = "/bulk/v1";

/// Join resource segments under the bulk API prefix.
///
/// `bulk_path(&["activities", "export", "EXP1", "status.json"])`
/// yields `/bulk/v1/activities/export/EXP1/status.json`.
pub fn bulk_path(segments: &[&str]) -> String {
    let mut path = String::from(BULK_PREFIX);
    for segment in segments {
        let segment = segment.trim_matches('/');
        if segment.is_empty() {
            continue;
        }
        path.push('/');
        path.push_str(segment);
    }
    path
}
