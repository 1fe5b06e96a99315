use regex::Regex;

/// Shared utility functions for the river flow service
///
/// Split a gauge station name into river, location and region for display.
///
/// Names follow the USGS convention `RIVER <marker> PLACE, ST`, where the marker is
/// one of NEAR/NR/AT/ABOVE/AB/BELOW/BL. The location keeps its marker. Names without
/// a marker come back whole as the river part.
///
/// # Examples
///
/// ```
/// use river_flow_service::utils::split_station_name;
///
/// assert_eq!(
///     split_station_name("COLORADO RIVER NEAR KREMMLING, CO"),
///     ("COLORADO RIVER".to_string(), "NEAR KREMMLING".to_string(), "CO".to_string())
/// );
/// assert_eq!(
///     split_station_name("ARKANSAS RIVER BL GRANITE"),
///     ("ARKANSAS RIVER".to_string(), "BL GRANITE".to_string(), String::new())
/// );
/// ```
pub fn split_station_name(name: &str) -> (String, String, String) {
    let trimmed = name.trim();

    let (body, region) = match Regex::new(r",\s*([A-Za-z]{2})\.?$").ok().and_then(|re| re.captures(trimmed)) {
        Some(caps) => {
            let start = caps.get(0).map_or(trimmed.len(), |m| m.start());
            let region = caps.get(1).map_or("", |m| m.as_str()).to_ascii_uppercase();
            (trimmed[..start].trim_end(), region)
        }
        None => (trimmed, String::new()),
    };

    let marker = Regex::new(r"(?i)\s+(NEAR|NR|AT|ABOVE|AB|BELOW|BL)\s+").ok();
    match marker.as_ref().and_then(|re| re.find(body)) {
        Some(m) if m.start() > 0 => (
            body[..m.start()].trim().to_string(),
            body[m.start()..].trim().to_string(),
            region,
        ),
        _ => (body.to_string(), String::new(), region),
    }
}
