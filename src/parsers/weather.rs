/// OpenWeatherMap current-weather parser; only the daily high and low are kept.
use serde::Deserialize;

use crate::fetch_error::FetchError;
use crate::models::WeatherSnapshot;

#[derive(Deserialize)]
struct WeatherResponse {
    main: MainWeather,
}

#[derive(Deserialize)]
struct MainWeather {
    temp_max: f64,
    temp_min: f64,
}

pub fn parse_weather(text: &str) -> Result<WeatherSnapshot, FetchError> {
    if text.trim().is_empty() {
        return Err(FetchError::NoData);
    }

    let response: WeatherResponse = serde_json::from_str(text)?;
    Ok(WeatherSnapshot {
        high_temperature_f: response.main.temp_max,
        low_temperature_f: response.main.temp_min,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_weather() {
        let text = r#"{"coord": {"lon": -106.2, "lat": 38.56}, "main": {"temp": 51.3, "temp_min": 38.1, "temp_max": 58.6, "humidity": 30}, "name": "Buena Vista"}"#;
        let weather = parse_weather(text).unwrap();
        assert_eq!(weather.high_temperature_f, 58.6);
        assert_eq!(weather.low_temperature_f, 38.1);
    }

    #[test]
    fn test_missing_main_is_decoding_error() {
        assert!(matches!(parse_weather(r#"{"cod": 401}"#), Err(FetchError::DecodingError(_))));
    }
}
