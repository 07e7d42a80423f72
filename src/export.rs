use chrono::SecondsFormat;
use std::path::Path;

use crate::{error::AppError, models::Relay};

const CSV_HEADER: &str = "URL,Host,IsAlive,Latitude,Longitude,Country,City,LastChecked";

/// Write relays to `path`: CSV when it ends in `.csv`, pretty JSON otherwise
pub async fn export_relays(relays: &[Relay], path: &Path) -> Result<(), AppError> {
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    let contents = if is_csv {
        render_csv(relays)
    } else {
        serde_json::to_string_pretty(relays)?
    };

    tokio::fs::write(path, contents).await.map_err(|e| {
        AppError::IoError(format!("cannot write {}: {}", path.display(), e))
    })?;

    tracing::info!(
        "Exported {} relays to {} as {}",
        relays.len(),
        path.display(),
        if is_csv { "CSV" } else { "JSON" }
    );
    Ok(())
}

fn render_csv(relays: &[Relay]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');

    for relay in relays {
        let row = [
            csv_field(&relay.url),
            csv_field(&relay.host),
            relay.is_alive.to_string(),
            relay.latitude.map(|v| format!("{:.6}", v)).unwrap_or_default(),
            relay.longitude.map(|v| format!("{:.6}", v)).unwrap_or_default(),
            csv_field(relay.country.as_deref().unwrap_or_default()),
            csv_field(relay.city.as_deref().unwrap_or_default()),
            relay
                .last_checked
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }

    out
}

/// Quote a field if it contains a delimiter, a quote or a line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn relay(url: &str, city: Option<&str>) -> Relay {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        Relay {
            id: 1,
            url: url.to_string(),
            host: url.trim_start_matches("wss://").to_string(),
            is_alive: true,
            last_checked: Some(created),
            latitude: city.map(|_| 37.4056),
            longitude: city.map(|_| -122.0775),
            country: city.map(|_| "US".to_string()),
            city: city.map(str::to_string),
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_render_csv() {
        let csv = render_csv(&[
            relay("wss://a.example", Some("Mountain View, CA")),
            relay("wss://b.example", None),
        ]);

        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(
            lines[1],
            "wss://a.example,a.example,true,37.405600,-122.077500,US,\"Mountain View, CA\",2024-03-01T12:00:00Z"
        );
        assert_eq!(lines[2], "wss://b.example,b.example,true,,,,,2024-03-01T12:00:00Z");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_csv_field_escaping() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[tokio::test]
    async fn test_export_picks_format_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let relays = vec![relay("wss://a.example", Some("Berlin"))];

        let csv_path = dir.path().join("relays.CSV");
        export_relays(&relays, &csv_path).await.unwrap();
        let csv = std::fs::read_to_string(&csv_path).unwrap();
        assert!(csv.starts_with(CSV_HEADER));

        let json_path = dir.path().join("relays.json");
        export_relays(&relays, &json_path).await.unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(json[0]["url"], "wss://a.example");
        assert_eq!(json[0]["city"], "Berlin");
    }

    #[tokio::test]
    async fn test_export_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("relays.json");
        assert!(matches!(
            export_relays(&[], &path).await,
            Err(AppError::IoError(_))
        ));
    }
}
