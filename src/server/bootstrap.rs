// Bootstrap document rendering: runtime configuration injection into the entry file.

use serde_json::{Map, Value};

use crate::config::{RUNTIME_CONFIG_GLOBAL, RUNTIME_CONFIG_PLACEHOLDER};

/// Build the runtime configuration served to the client.
///
/// Host keys override bundle keys, and `version` always comes from the bundle.
pub fn merge_runtime_config(
    bundle_config: Map<String, Value>,
    host_config: &Map<String, Value>,
) -> Map<String, Value> {
    let version = bundle_config.get("version").cloned();
    let mut merged = bundle_config;
    for (key, value) in host_config {
        merged.insert(key.clone(), value.clone());
    }
    if let Some(version) = version {
        merged.insert("version".to_string(), version);
    }
    merged
}

/// The `<script>` tag carrying the percent-encoded JSON configuration.
pub fn runtime_config_script(config: &Map<String, Value>) -> String {
    let json = Value::Object(config.clone()).to_string();
    format!(
        "<script type=\"text/javascript\">{} = JSON.parse(decodeURIComponent(\"{}\"));</script>",
        RUNTIME_CONFIG_GLOBAL,
        urlencoding::encode(&json)
    )
}

/// Place the configuration script into the entry document.
///
/// The placeholder wins; otherwise the script goes right before `</head>`,
/// and documents without a head get it prepended.
pub fn inject_runtime_config(document: &str, config: &Map<String, Value>) -> String {
    let script = runtime_config_script(config);

    if document.contains(RUNTIME_CONFIG_PLACEHOLDER) {
        return document.replacen(RUNTIME_CONFIG_PLACEHOLDER, &script, 1);
    }

    if let Some(pos) = find_ascii_case_insensitive(document, "</head>") {
        let mut out = String::with_capacity(document.len() + script.len());
        out.push_str(&document[..pos]);
        out.push_str(&script);
        out.push_str(&document[pos..]);
        return out;
    }

    format!("{script}{document}")
}

/// Recover the configuration embedded by [`inject_runtime_config`].
pub fn extract_runtime_config(document: &str) -> Option<Map<String, Value>> {
    let marker = format!("{RUNTIME_CONFIG_GLOBAL} = JSON.parse(decodeURIComponent(\"");
    let start = document.find(&marker)? + marker.len();
    let len = document[start..].find('"')?;
    let decoded = urlencoding::decode(&document[start..start + len]).ok()?;
    match serde_json::from_str(&decoded).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(version: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("version".to_string(), json!(version));
        map
    }

    #[test]
    fn test_inject_replaces_placeholder() {
        let doc = "<html><head><!-- runtime-config --></head><body></body></html>";
        let out = inject_runtime_config(doc, &config("1.0"));
        assert!(!out.contains(RUNTIME_CONFIG_PLACEHOLDER));
        assert!(out.starts_with("<html><head><script"));
        assert_eq!(extract_runtime_config(&out).unwrap()["version"], "1.0");
    }

    #[test]
    fn test_inject_before_head_close() {
        let doc = "<HTML><HEAD><title>t</title></HEAD><body>x</body></HTML>";
        let out = inject_runtime_config(doc, &config("2.0"));
        let script_at = out.find("<script").unwrap();
        assert!(script_at < out.find("</HEAD>").unwrap());
        assert!(script_at > out.find("</title>").unwrap());
    }

    #[test]
    fn test_inject_without_head_prepends() {
        let out = inject_runtime_config("<p>bare</p>", &config("3.0"));
        assert!(out.starts_with("<script"));
        assert!(out.ends_with("<p>bare</p>"));
    }

    #[test]
    fn test_encoded_payload_has_no_raw_quotes() {
        let mut cfg = config("1.0");
        cfg.insert("note".to_string(), json!("say \"hi\" </script>"));
        let out = inject_runtime_config("<head></head>", &cfg);
        let extracted = extract_runtime_config(&out).unwrap();
        assert_eq!(extracted["note"], "say \"hi\" </script>");
    }

    #[test]
    fn test_merge_host_keys_cannot_override_version() {
        let mut host = Map::new();
        host.insert("version".to_string(), json!("spoofed"));
        host.insert("rootUrl".to_string(), json!("http://127.0.0.1"));
        let mut bundle = config("1.1");
        bundle.insert("rootUrl".to_string(), json!("http://example.invalid"));
        let merged = merge_runtime_config(bundle, &host);
        assert_eq!(merged["version"], "1.1");
        assert_eq!(merged["rootUrl"], "http://127.0.0.1");
    }
}
