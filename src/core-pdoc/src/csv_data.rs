//! CSV ingestion, validation and export.

use std::collections::BTreeMap;

use regex::Regex;

use data_model_pdoc::models::{ClientRecord, DuplicateAnalysis, ExportRow};

use crate::errors::Error;

/// Columns mapped onto named `ClientRecord` fields. Everything else lands in
/// the extras map, `full_data` included.
const KNOWN_COLUMNS: [&str; 12] = [
    "email",
    "phone",
    "first_name",
    "last_name",
    "product",
    "price",
    "special_offer",
    "meeting_date",
    "goals",
    "recommendations",
    "onboarding_steps",
    "onboarding_tips",
];

const REQUIRED_COLUMNS: [&str; 3] = ["email", "phone", "first_name"];

/// Outcome of a structural CSV validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Parses a headered CSV into normalized client records.
///
/// Every value is trimmed, emails are lowercased, and rows without an email
/// are dropped. Unknown columns are preserved verbatim in the extras map.
pub fn parse_csv_string(content: &str) -> Result<Vec<ClientRecord>, Error> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();

    let mut clients = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: BTreeMap<&str, &str> = headers.iter().zip(record.iter()).collect();

        let email = row.get("email").copied().unwrap_or_default();
        if email.is_empty() {
            continue;
        }

        let mut client = ClientRecord::new(email.to_lowercase());
        client.phone = row.get("phone").copied().unwrap_or_default().to_string();
        client.first_name = row.get("first_name").copied().unwrap_or_default().to_string();
        client.last_name = row.get("last_name").copied().unwrap_or_default().to_string();

        let optional = |name: &str| row.get(name).copied().filter(|v| !v.is_empty()).map(str::to_string);
        client.product = optional("product");
        client.price = optional("price");
        client.special_offer = optional("special_offer");
        client.meeting_date = optional("meeting_date");
        client.goals = optional("goals");
        client.recommendations = optional("recommendations");
        client.onboarding_steps = optional("onboarding_steps");
        client.onboarding_tips = optional("onboarding_tips");

        for (name, value) in &row {
            if !KNOWN_COLUMNS.contains(name) {
                client.extra.insert((*name).to_string(), (*value).to_string());
            }
        }

        clients.push(client);
    }

    Ok(clients)
}

/// Checks the CSV for the required columns and well-formed emails.
///
/// Reported line numbers are 1-based file lines (header is line 1).
pub fn validate_csv(content: &str) -> Result<Validation, Error> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();
    let mut errors = Vec::new();

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|required| !headers.iter().any(|h| h == *required))
        .collect();
    if !missing.is_empty() {
        errors.push(format!("Missing columns: {}", missing.join(", ")));
    }

    let email_index = headers.iter().position(|h| h == "email");

    let mut row_count = 0usize;
    let mut invalid_email_lines = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        row_count += 1;
        let email = email_index.and_then(|i| record.get(i)).unwrap_or_default();
        if !is_valid_email(email) {
            // +2: line 1 is the header, data starts on line 2
            invalid_email_lines.push(index + 2);
        }
    }

    if row_count == 0 {
        errors.push("CSV file is empty".to_string());
    }

    if !invalid_email_lines.is_empty() {
        let lines: Vec<String> = invalid_email_lines.iter().map(usize::to_string).collect();
        errors.push(format!("Invalid emails on lines: {}", lines.join(", ")));
    }

    Ok(Validation {
        valid: errors.is_empty(),
        errors,
    })
}

pub fn is_valid_email(email: &str) -> bool {
    // Matches the historically accepted shape: something@something.tld
    let re = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid");
    re.is_match(email)
}

/// Groups records by lowercased email to surface duplicate rows.
pub fn analyze_duplicates(clients: &[ClientRecord]) -> DuplicateAnalysis {
    let mut groups: BTreeMap<String, Vec<ClientRecord>> = BTreeMap::new();
    for client in clients {
        groups.entry(client.email.to_lowercase()).or_default().push(client.clone());
    }

    let unique_count = groups.values().filter(|group| group.len() == 1).count();
    let duplicates: BTreeMap<String, Vec<ClientRecord>> =
        groups.into_iter().filter(|(_, group)| group.len() > 1).collect();

    DuplicateAnalysis {
        duplicates,
        unique_count,
        total_count: clients.len(),
    }
}

/// Renders export rows as CSV with a header line. An empty input produces an
/// empty string, matching the download contract.
pub fn export_csv(rows: &[ExportRow]) -> Result<String, Error> {
    if rows.is_empty() {
        tracing::warn!("Export requested with no rows; producing an empty CSV");
        return Ok(String::new());
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer.into_inner().expect("writing to an in-memory buffer cannot fail");
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn test_parse_normalizes_and_keeps_extras() {
        let csv = indoc! {"
            email,phone,first_name,last_name,product,campaign
             Ada@Example.com ,+33612345678,Ada,Lovelace,Coaching,spring
        "};

        let clients = parse_csv_string(csv).unwrap();
        assert_eq!(clients.len(), 1);

        let client = &clients[0];
        assert_eq!(client.email, "ada@example.com");
        assert_eq!(client.phone, "+33612345678");
        assert_eq!(client.first_name, "Ada");
        assert_eq!(client.product.as_deref(), Some("Coaching"));
        assert_eq!(client.extra.get("campaign").map(String::as_str), Some("spring"));
        // Known columns never leak into extras.
        assert!(!client.extra.contains_key("product"));
    }

    #[test]
    fn test_parse_skips_rows_without_email() {
        let csv = indoc! {"
            email,phone,first_name
            ada@example.com,111,Ada
            ,222,Ghost
            grace@example.com,333,Grace
        "};

        let clients = parse_csv_string(csv).unwrap();
        let emails: Vec<&str> = clients.iter().map(|c| c.email.as_str()).collect();
        assert_eq!(emails, vec!["ada@example.com", "grace@example.com"]);
    }

    #[test]
    fn test_parse_tolerates_short_rows() {
        let csv = "email,phone,first_name\nada@example.com,111\n";
        let clients = parse_csv_string(csv).unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].first_name, "");
    }

    #[test]
    fn test_parse_keeps_full_data_blob() {
        let csv = indoc! {r#"
            email,phone,first_name,full_data
            ada@example.com,111,Ada,"{""theme"":""dark""}"
        "#};

        let clients = parse_csv_string(csv).unwrap();
        assert_eq!(clients[0].full_data(), Some(r#"{"theme":"dark"}"#));
    }

    #[test]
    fn test_validate_reports_missing_columns() {
        let csv = "email,last_name\nada@example.com,Lovelace\n";
        let validation = validate_csv(csv).unwrap();
        assert!(!validation.valid);
        assert_eq!(validation.errors, vec!["Missing columns: phone, first_name".to_string()]);
    }

    #[test]
    fn test_validate_reports_invalid_email_lines() {
        let csv = indoc! {"
            email,phone,first_name
            ada@example.com,111,Ada
            not-an-email,222,Bob
            grace@example.com,333,Grace
            also bad,444,Eve
        "};

        let validation = validate_csv(csv).unwrap();
        assert!(!validation.valid);
        assert_eq!(validation.errors, vec!["Invalid emails on lines: 3, 5".to_string()]);
    }

    #[test]
    fn test_validate_empty_file() {
        let validation = validate_csv("email,phone,first_name\n").unwrap();
        assert!(!validation.valid);
        assert!(validation.errors.contains(&"CSV file is empty".to_string()));
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("ada@example.com"));
        assert!(is_valid_email("a.b+c@sub.domain.org"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("spaces in@example.com"));
        assert!(!is_valid_email("nodot@example"));
    }

    #[test]
    fn test_analyze_duplicates_groups_by_email() {
        let csv = indoc! {"
            email,phone,first_name
            ada@example.com,111,Ada
            ADA@example.com,112,Ada
            grace@example.com,333,Grace
        "};
        let clients = parse_csv_string(csv).unwrap();

        let analysis = analyze_duplicates(&clients);
        assert_eq!(analysis.total_count, 3);
        assert_eq!(analysis.unique_count, 1);
        assert_eq!(analysis.duplicates.len(), 1);
        assert_eq!(analysis.duplicates.get("ada@example.com").map(Vec::len), Some(2));
    }

    #[test]
    fn test_export_csv_columns_and_content() {
        let rows = vec![ExportRow {
            email: "ada@example.com".to_string(),
            phone: "111".to_string(),
            full_data: r#"{"k":"v"}"#.to_string(),
            meeting_report_link: "https://x/report.html".to_string(),
            sales_page_link: "https://x/sales.html".to_string(),
            onboarding_link: String::new(),
        }];

        let csv = export_csv(&rows).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("email,phone,full_data,meeting_report_link,sales_page_link,onboarding_link")
        );
        let data = lines.next().unwrap();
        assert!(data.starts_with("ada@example.com,111,"));
        assert!(data.contains("https://x/report.html"));
    }

    #[test]
    fn test_export_csv_empty_input() {
        assert_eq!(export_csv(&[]).unwrap(), "");
    }

    #[test]
    fn test_export_then_reparse_roundtrip() {
        // The export is itself a loadable upload: the full_data column feeds
        // the next generation run.
        let rows = vec![ExportRow {
            email: "ada@example.com".to_string(),
            phone: "111".to_string(),
            full_data: r#"{"theme":"dark"}"#.to_string(),
            meeting_report_link: String::new(),
            sales_page_link: String::new(),
            onboarding_link: String::new(),
        }];
        let csv = export_csv(&rows).unwrap();

        let clients = parse_csv_string(&csv).unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].full_data(), Some(r#"{"theme":"dark"}"#));
    }
}
