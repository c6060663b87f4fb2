//! `{{TOKEN}}` template loading, variable preparation and substitution.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;
use serde_json::Value;

use data_model_pdoc::models::{ClientRecord, DocumentKind};

use crate::errors::Error;

/// All document templates, loaded once at startup and kept for the process
/// lifetime.
pub struct TemplateStore {
    templates: BTreeMap<DocumentKind, String>,
}

/// A personalized document ready for publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub kind: DocumentKind,
    pub filename: String,
    pub content: String,
}

/// Outcome of substituting one template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub html: String,
    /// Total `{{TOKEN}}` occurrences replaced.
    pub replaced: usize,
    /// Tokens left in the output because no variable matched them.
    pub unreplaced: Vec<String>,
}

impl TemplateStore {
    /// Reads `<dir>/<kind>/template.html` for every document kind.
    pub fn load(dir: &Path) -> Result<Self, Error> {
        let mut templates = BTreeMap::new();
        for kind in DocumentKind::ALL {
            let path = dir.join(kind.as_str()).join("template.html");
            let content =
                std::fs::read_to_string(&path).map_err(|source| Error::TemplateLoad { path: path.clone(), source })?;
            tracing::debug!(kind = %kind, path = %path.display(), size = content.len(), "Loaded template");
            templates.insert(kind, content);
        }
        Ok(TemplateStore { templates })
    }

    /// Builds a store from in-memory templates.
    pub fn from_templates(sales: &str, meeting_report: &str, onboarding: &str) -> Self {
        let mut templates = BTreeMap::new();
        templates.insert(DocumentKind::Sales, sales.to_string());
        templates.insert(DocumentKind::MeetingReport, meeting_report.to_string());
        templates.insert(DocumentKind::Onboarding, onboarding.to_string());
        TemplateStore { templates }
    }

    /// Renders one personalized document for the client.
    pub fn render(&self, client: &ClientRecord, kind: DocumentKind) -> Result<RenderedDocument, Error> {
        let template = self
            .templates
            .get(&kind)
            .ok_or_else(|| Error::UnknownTemplate(kind.to_string()))?;

        let variables = prepare_variables(client, kind, Utc::now());
        let substitution = substitute(template, &variables);

        if !substitution.unreplaced.is_empty() {
            tracing::warn!(
                client_email = %client.email,
                kind = %kind,
                tokens = ?substitution.unreplaced,
                "Template tokens left unreplaced"
            );
        }
        tracing::debug!(
            client_email = %client.email,
            kind = %kind,
            replaced = substitution.replaced,
            size = substitution.html.len(),
            "Rendered document"
        );

        Ok(RenderedDocument {
            kind,
            filename: generate_filename(client, kind),
            content: substitution.html,
        })
    }
}

/// Builds the substitution map for one (client, kind) pair.
///
/// Sources, in order: identity variables, the flattened `full_data` JSON
/// blob (later sources overwrite earlier ones), kind-prefixed CSV columns,
/// then legacy fallback columns that only fill holes.
pub fn prepare_variables(client: &ClientRecord, kind: DocumentKind, generated_on: DateTime<Utc>) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    vars.insert("FIRST_NAME".to_string(), client.first_name.clone());
    vars.insert("LAST_NAME".to_string(), client.last_name.clone());
    vars.insert("EMAIL".to_string(), client.email.clone());
    vars.insert("PHONE".to_string(), client.phone.clone());
    vars.insert("GENERATION_DATE".to_string(), generated_on.format("%d/%m/%Y").to_string());

    if let Some(raw) = client.full_data() {
        match serde_json::from_str::<Value>(raw) {
            Ok(data) => {
                flatten_json(&data, "", &mut vars);

                // Some exports nest a second stringified blob under the same
                // column name; unwrap that one level too.
                if let Some(nested) = data.get("full_data").and_then(Value::as_str) {
                    match serde_json::from_str::<Value>(nested) {
                        Ok(inner) => flatten_json(&inner, "", &mut vars),
                        Err(e) => {
                            tracing::warn!(client_email = %client.email, error = %e, "Ignoring unparseable nested full_data")
                        }
                    }
                }
            }
            Err(e) => tracing::warn!(client_email = %client.email, error = %e, "Ignoring unparseable full_data blob"),
        }
    }

    let prefix = kind.column_prefix();
    for (name, value) in client.columns() {
        if let Some(stripped) = name.strip_prefix(prefix) {
            if !stripped.is_empty() {
                add_variable(&mut vars, stripped, value);
            }
        }
    }

    match kind {
        DocumentKind::Sales => {
            fill_hole(&mut vars, "PRODUCT", &client.product);
            fill_hole(&mut vars, "PRICE", &client.price);
            fill_hole(&mut vars, "SPECIAL_OFFER", &client.special_offer);
            // Commonly referenced by sales templates even when the upload
            // carries no matching column.
            vars.entry("RECOMMENDED_PLAN".to_string())
                .or_insert_with(|| "Recommended Plan".to_string());
            vars.entry("FAQ_QUESTION_1".to_string())
                .or_insert_with(|| "How can this program help me?".to_string());
        }
        DocumentKind::MeetingReport => {
            fill_hole(&mut vars, "MEETING_DATE", &client.meeting_date);
            fill_hole(&mut vars, "GOALS", &client.goals);
            fill_hole(&mut vars, "RECOMMENDATIONS", &client.recommendations);
        }
        DocumentKind::Onboarding => {
            fill_hole(&mut vars, "STEPS", &client.onboarding_steps);
            fill_hole(&mut vars, "TIPS", &client.onboarding_tips);
        }
    }

    vars
}

/// Recursively flattens a JSON object into uppercased, underscore-joined
/// variable names. Objects are inserted whole (as JSON) and also expanded.
fn flatten_json(value: &Value, prefix: &str, vars: &mut BTreeMap<String, String>) {
    let Some(object) = value.as_object() else {
        return;
    };
    for (key, value) in object {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}_{}", prefix, key)
        };
        match value {
            Value::Object(_) => {
                add_variable(vars, &full_key, &value.to_string());
                flatten_json(value, &full_key, vars);
            }
            Value::Null => {}
            Value::String(s) => add_variable(vars, &full_key, s),
            other => add_variable(vars, &full_key, &other.to_string()),
        }
    }
}

fn add_variable(vars: &mut BTreeMap<String, String>, key: &str, value: &str) {
    vars.insert(key.to_uppercase(), value.to_string());
}

/// Legacy columns only apply when nothing else supplied the variable.
fn fill_hole(vars: &mut BTreeMap<String, String>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        vars.entry(key.to_string()).or_insert_with(|| v.clone());
    }
}

/// Replaces every `{{KEY}}` occurrence and reports what was left over.
pub fn substitute(template: &str, variables: &BTreeMap<String, String>) -> Substitution {
    let mut html = template.to_string();
    let mut replaced = 0;

    for (key, value) in variables {
        let token = format!("{{{{{}}}}}", key);
        let occurrences = html.matches(&token).count();
        if occurrences > 0 {
            html = html.replace(&token, value);
            replaced += occurrences;
        }
    }

    let token_pattern = Regex::new(r"\{\{[^}]+\}\}").expect("token pattern is valid");
    let mut unreplaced: Vec<String> = token_pattern.find_iter(&html).map(|m| m.as_str().to_string()).collect();
    unreplaced.sort();
    unreplaced.dedup();

    Substitution {
        html,
        replaced,
        unreplaced,
    }
}

/// Unique filename: `<first>_<las>_<kind>_<millis>_<rand4>.html`.
///
/// The timestamp+random suffix keeps concurrent generations for the same
/// client from colliding; the publisher still renames on the rare conflict.
pub fn generate_filename(client: &ClientRecord, kind: DocumentKind) -> String {
    let first = sanitize_name(&client.first_name);
    let last: String = sanitize_name(&client.last_name).chars().take(3).collect();
    let timestamp = Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("{}_{}_{}_{}_{:04}.html", first, last, kind.as_str(), timestamp, suffix)
}

fn sanitize_name(name: &str) -> String {
    name.to_lowercase().chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn test_client() -> ClientRecord {
        let mut client = ClientRecord::new("ada@example.com");
        client.phone = "+33612345678".to_string();
        client.first_name = "Ada".to_string();
        client.last_name = "Lovelace".to_string();
        client
    }

    fn fixed_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 5, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_base_variables() {
        let vars = prepare_variables(&test_client(), DocumentKind::Sales, fixed_date());
        assert_eq!(vars.get("FIRST_NAME").map(String::as_str), Some("Ada"));
        assert_eq!(vars.get("EMAIL").map(String::as_str), Some("ada@example.com"));
        assert_eq!(vars.get("GENERATION_DATE").map(String::as_str), Some("05/08/2026"));
    }

    #[test]
    fn test_full_data_flattening_nested() {
        let mut client = test_client();
        client.extra.insert(
            "full_data".to_string(),
            r#"{"theme":"dark","plan":{"name":"Premium","price":49}}"#.to_string(),
        );

        let vars = prepare_variables(&client, DocumentKind::Sales, fixed_date());
        assert_eq!(vars.get("THEME").map(String::as_str), Some("dark"));
        assert_eq!(vars.get("PLAN_NAME").map(String::as_str), Some("Premium"));
        assert_eq!(vars.get("PLAN_PRICE").map(String::as_str), Some("49"));
        // The object itself is available whole, as JSON.
        assert_eq!(vars.get("PLAN").map(String::as_str), Some(r#"{"name":"Premium","price":49}"#));
    }

    #[test]
    fn test_full_data_double_nesting() {
        let mut client = test_client();
        client.extra.insert(
            "full_data".to_string(),
            r#"{"outer":"yes","full_data":"{\"inner_key\":\"found\"}"}"#.to_string(),
        );

        let vars = prepare_variables(&client, DocumentKind::Sales, fixed_date());
        assert_eq!(vars.get("OUTER").map(String::as_str), Some("yes"));
        assert_eq!(vars.get("INNER_KEY").map(String::as_str), Some("found"));
    }

    #[test]
    fn test_invalid_full_data_is_ignored() {
        let mut client = test_client();
        client.extra.insert("full_data".to_string(), "not json at all".to_string());

        let vars = prepare_variables(&client, DocumentKind::Sales, fixed_date());
        // Base variables still come through.
        assert_eq!(vars.get("FIRST_NAME").map(String::as_str), Some("Ada"));
    }

    #[test]
    fn test_kind_prefixed_columns() {
        let mut client = test_client();
        client.extra.insert("sales_headline".to_string(), "Buy now".to_string());
        client.extra.insert("report_summary".to_string(), "Went well".to_string());

        let sales = prepare_variables(&client, DocumentKind::Sales, fixed_date());
        assert_eq!(sales.get("HEADLINE").map(String::as_str), Some("Buy now"));
        assert!(sales.get("SUMMARY").is_none());

        let report = prepare_variables(&client, DocumentKind::MeetingReport, fixed_date());
        assert_eq!(report.get("SUMMARY").map(String::as_str), Some("Went well"));
        assert!(report.get("HEADLINE").is_none());
    }

    #[test]
    fn test_legacy_fallbacks_fill_holes_only() {
        let mut client = test_client();
        client.product = Some("Legacy Coaching".to_string());
        client.price = Some("199".to_string());
        client.extra.insert("sales_product".to_string(), "Prefixed Coaching".to_string());

        let vars = prepare_variables(&client, DocumentKind::Sales, fixed_date());
        // The prefixed column wins; the legacy column only fills holes.
        assert_eq!(vars.get("PRODUCT").map(String::as_str), Some("Prefixed Coaching"));
        assert_eq!(vars.get("PRICE").map(String::as_str), Some("199"));
        assert_eq!(vars.get("RECOMMENDED_PLAN").map(String::as_str), Some("Recommended Plan"));
    }

    #[test]
    fn test_meeting_report_and_onboarding_fallbacks() {
        let mut client = test_client();
        client.meeting_date = Some("2026-07-01".to_string());
        client.goals = Some("Ship it".to_string());
        client.onboarding_steps = Some("1. Sign in".to_string());

        let report = prepare_variables(&client, DocumentKind::MeetingReport, fixed_date());
        assert_eq!(report.get("MEETING_DATE").map(String::as_str), Some("2026-07-01"));
        assert_eq!(report.get("GOALS").map(String::as_str), Some("Ship it"));

        let onboarding = prepare_variables(&client, DocumentKind::Onboarding, fixed_date());
        assert_eq!(onboarding.get("STEPS").map(String::as_str), Some("1. Sign in"));
        assert!(onboarding.get("TIPS").is_none());
    }

    #[test]
    fn test_substitute_counts_and_leftovers() {
        let mut vars = BTreeMap::new();
        vars.insert("NAME".to_string(), "Ada".to_string());

        let result = substitute("<p>{{NAME}} and {{NAME}} but {{MISSING}}</p>", &vars);
        assert_eq!(result.html, "<p>Ada and Ada but {{MISSING}}</p>");
        assert_eq!(result.replaced, 2);
        assert_eq!(result.unreplaced, vec!["{{MISSING}}".to_string()]);
    }

    #[test]
    fn test_substitute_empty_value() {
        let mut vars = BTreeMap::new();
        vars.insert("GONE".to_string(), String::new());

        let result = substitute("a{{GONE}}b", &vars);
        assert_eq!(result.html, "ab");
        assert!(result.unreplaced.is_empty());
    }

    #[test]
    fn test_generate_filename_shape() {
        let client = test_client();
        let filename = generate_filename(&client, DocumentKind::MeetingReport);

        let pattern = Regex::new(r"^ada_lov_meeting-report_\d+_\d{4}\.html$").unwrap();
        assert!(pattern.is_match(&filename), "unexpected filename: {}", filename);
    }

    #[test]
    fn test_generate_filename_sanitizes_names() {
        let mut client = test_client();
        client.first_name = "Marie-Hélène".to_string();
        client.last_name = "O'Neil".to_string();

        let filename = generate_filename(&client, DocumentKind::Sales);
        assert!(filename.starts_with("marieh"), "unexpected filename: {}", filename);
        assert!(filename.contains("_one_sales_"), "unexpected filename: {}", filename);
    }

    #[test]
    fn test_render_replaces_tokens() {
        let store = TemplateStore::from_templates(
            "<html><body>Hello {{FIRST_NAME}}, buy {{PRODUCT}}</body></html>",
            "<html><body>Report for {{FIRST_NAME}}</body></html>",
            "<html><body>Welcome {{FIRST_NAME}}</body></html>",
        );
        let mut client = test_client();
        client.product = Some("Coaching".to_string());

        let doc = store.render(&client, DocumentKind::Sales).unwrap();
        assert_eq!(doc.kind, DocumentKind::Sales);
        assert_eq!(doc.content, "<html><body>Hello Ada, buy Coaching</body></html>");
        assert!(doc.filename.ends_with(".html"));
    }
}
