use crate::types::Timestamp;

fn stem(ts: &Timestamp) -> String {
    format!(
        "cip_image_{:04}{:02}{:02}_{:02}{:02}{:02}_{:03}",
        ts.year, ts.month, ts.day, ts.hour, ts.minute, ts.second, ts.milliseconds
    )
}

/// File name for the combined raster of one event.
pub fn combined_image_name(ts: &Timestamp) -> String {
    format!("{}.png", stem(ts))
}

/// File name for particle number `sequence` of one event.
pub fn particle_image_name(ts: &Timestamp, sequence: usize) -> String {
    format!("{}_{:04}.png", stem(ts), sequence)
}
