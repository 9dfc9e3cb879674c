//! Shared export helpers for CLI and API parity.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::models::{Booking, Client, Trip};

/// One consistent snapshot of every exportable table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub clients: Vec<Client>,
    pub trips: Vec<Trip>,
    pub bookings: Vec<Booking>,
}

/// Render the full bundle as pretty-printed JSON.
pub fn render_json_export(bundle: &ExportBundle) -> serde_json::Result<String> {
    serde_json::to_string_pretty(bundle)
}

/// Render the client roster as CSV.
#[must_use]
pub fn render_clients_csv(clients: &[Client]) -> String {
    let mut output = String::from("id,name,email,phone,dob,created_at,updated_at\n");

    for client in clients {
        let _ = writeln!(
            output,
            "{},{},{},{},{},{},{}",
            client.id,
            csv_field(&client.name),
            csv_field(client.email.as_deref().unwrap_or_default()),
            csv_field(client.phone.as_deref().unwrap_or_default()),
            client.dob.map(|d| d.to_string()).unwrap_or_default(),
            client.created_at,
            client.updated_at,
        );
    }

    output
}

/// Render the trip list as CSV.
#[must_use]
pub fn render_trips_csv(trips: &[Trip]) -> String {
    let mut output = String::from("id,name,created_at,updated_at\n");

    for trip in trips {
        let _ = writeln!(
            output,
            "{},{},{},{}",
            trip.id,
            csv_field(&trip.name),
            trip.created_at,
            trip.updated_at,
        );
    }

    output
}

/// Quote a CSV field when it contains a comma, quote, or newline.
fn csv_field(value: &str) -> String {
    if value.contains(['"', ',', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClientDraft;

    fn bundle_with(clients: Vec<Client>, trips: Vec<Trip>) -> ExportBundle {
        ExportBundle {
            clients,
            trips,
            bookings: Vec::new(),
        }
    }

    #[test]
    fn render_clients_csv_quotes_awkward_fields() {
        let client = Client::from_draft(&ClientDraft {
            name: "Smith, \"Ali\" Alice".to_string(),
            email: Some("alice@example.com".to_string()),
            phone: None,
            dob: None,
        });

        let rendered = render_clients_csv(&[client]);
        let mut lines = rendered.lines();
        assert_eq!(
            lines.next(),
            Some("id,name,email,phone,dob,created_at,updated_at")
        );
        let row = lines.next().unwrap();
        assert!(row.contains("\"Smith, \"\"Ali\"\" Alice\""));
        assert!(row.contains("alice@example.com"));
    }

    #[test]
    fn render_trips_csv_includes_header_and_rows() {
        let trip = Trip::new("Iceland 2026");
        let rendered = render_trips_csv(&[trip.clone()]);

        assert!(rendered.starts_with("id,name,created_at,updated_at\n"));
        assert!(rendered.contains(&trip.id.as_str()));
        assert!(rendered.contains("Iceland 2026"));
    }

    #[test]
    fn render_json_export_keeps_table_keys() {
        let bundle = bundle_with(
            vec![Client::from_draft(&ClientDraft {
                name: "Alice Smith".to_string(),
                ..ClientDraft::default()
            })],
            vec![Trip::new("Iceland 2026")],
        );

        let rendered = render_json_export(&bundle).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["clients"].as_array().unwrap().len(), 1);
        assert_eq!(value["trips"][0]["name"], "Iceland 2026");
        assert!(value["bookings"].as_array().unwrap().is_empty());
    }
}
