use crate::DiagnosticSummary;

const RULE_WIDTH: usize = 80;

pub fn format_report(results: &DiagnosticSummary) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut lines = vec![format!("\n{rule}"), "📋 DIAGNOSTIC REPORT".to_string(), rule.clone()];

    for (name, record) in &results.servers {
        lines.push(format!("\n🔹 {name} (port {})", record.port));
        lines.push(format!("   URL: {}", record.url));
        lines.push(format!(
            "   Port open: {}",
            if record.port_open { "✅ Yes" } else { "❌ No" }
        ));
        if let Some(error) = &record.port_error {
            lines.push(format!("   Error: {error}"));
        }
        if !record.endpoints.is_empty() {
            lines.push("   Endpoints tested:".to_string());
            for endpoint in record.endpoints.values() {
                let icon = if endpoint.ok { "✅" } else { "❌" };
                lines.push(format!("      {icon} {}", endpoint.url));
                if let Some(status) = endpoint.status_code {
                    lines.push(format!("         Status: {status}"));
                }
                if let Some(error) = &endpoint.error {
                    lines.push(format!("         Error: {error}"));
                }
            }
        }
        if let Some(note) = &record.note {
            lines.push(format!("   Note: {note}"));
        }
        lines.push(format!("   Overall status: {}", record.overall_status.label()));
    }

    lines.push(format!("\n{rule}"));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EndpointResult, HealthRecord, OverallStatus};
    use indexmap::IndexMap;

    fn record(status: OverallStatus) -> HealthRecord {
        let mut endpoints = IndexMap::new();
        if status != OverallStatus::PortClosed {
            endpoints.insert(
                "health".to_string(),
                EndpointResult {
                    url: "http://localhost:8003/health".to_string(),
                    ok: status == OverallStatus::Healthy,
                    error: (status != OverallStatus::Healthy)
                        .then(|| "HTTP 500 (expected 200)".to_string()),
                    status_code: Some(if status == OverallStatus::Healthy { 200 } else { 500 }),
                },
            );
        }
        HealthRecord {
            url: "http://localhost:8003".to_string(),
            port: 8003,
            host: "localhost".to_string(),
            port_open: status != OverallStatus::PortClosed,
            port_error: (status == OverallStatus::PortClosed)
                .then(|| "Port 8003 is not accepting connections: refused".to_string()),
            endpoints,
            overall_status: status,
            note: None,
        }
    }

    #[test]
    fn report_is_framed_and_lists_each_server() {
        let mut summary = DiagnosticSummary::single("Concept Tutor", record(OverallStatus::Healthy));
        summary
            .servers
            .insert("Code Reviewer".to_string(), record(OverallStatus::PortClosed));
        let text = format_report(&summary);

        let rule = "=".repeat(80);
        assert!(text.starts_with(&format!("\n{rule}\n📋 DIAGNOSTIC REPORT\n{rule}")));
        assert!(text.ends_with(&format!("\n\n{rule}")));
        assert!(text.contains("🔹 Concept Tutor (port 8003)"));
        assert!(text.contains("      ✅ http://localhost:8003/health\n         Status: 200"));
        assert!(text.contains("   Overall status: ✅ Healthy"));
        assert!(text.contains("   Port open: ❌ No"));
        assert!(text.contains("   Error: Port 8003 is not accepting connections"));
        assert!(text.contains("   Overall status: ❌ Port closed"));
    }

    #[test]
    fn failing_endpoints_show_their_error() {
        let summary = DiagnosticSummary::single(
            "Soft Skills Coach",
            record(OverallStatus::PortOpenButNoEndpoint),
        );
        let text = format_report(&summary);
        assert!(text.contains("❌ http://localhost:8003/health"));
        assert!(text.contains("Error: HTTP 500 (expected 200)"));
        assert!(text.contains("Port open but no HTTP endpoint"));
        assert_eq!(summary.summary.port_open_but_no_endpoint, 1);
    }

    #[test]
    fn notes_are_rendered() {
        let mut tool = record(OverallStatus::Healthy);
        tool.note = Some(crate::TOOL_SERVER_NOTE.to_string());
        let text = format_report(&DiagnosticSummary::single("Tool Server", tool));
        assert!(text.contains("Note: Tool server requires Accept: text/event-stream"));
    }
}
