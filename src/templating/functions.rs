//! Template functions available to configuration templates.
//!
//! Tera functions take named arguments only:
//!
//! ```text
//! {{ envar(name="ProgramFiles") }}\Contoso\Widget\widget.exe
//! {{ regval(hive="HKLM", key="SOFTWARE\Contoso\Widget", value="InstallDir") }}
//! {% if version_lt(a=remote.instance.latestVersion, b="2.0.0") %}true{% else %}false{% endif %}
//! {{ inival(path="C:\Widget\widget.ini", section="General", key="Version") }}
//! {{ log(level="info", message="evaluating custom expression") }}
//! ```
//!
//! Lookups that find nothing render an empty string instead of failing, so a
//! template can test for presence with `!= ""`.

use crate::models::{RegistryHive, RegistryView};
use crate::platform::RegistryReader;
use crate::version::parse_version;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tera::{Error, Function, Result, Value};
use tracing::{debug, error, info, trace, warn};

fn string_arg<'a>(args: &'a HashMap<String, Value>, function: &str, name: &str) -> Result<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::msg(format!("{function}() requires a string argument '{name}'")))
}

/// `envar(name)` - value of an environment variable, empty if unset.
pub fn envar(args: &HashMap<String, Value>) -> Result<Value> {
    let name = string_arg(args, "envar", "name")?;
    Ok(Value::String(std::env::var(name).unwrap_or_default()))
}

/// `version_lt(a, b)` - whether version `a` is lower than version `b`.
pub fn version_lt(args: &HashMap<String, Value>) -> Result<Value> {
    let a = string_arg(args, "version_lt", "a")?;
    let b = string_arg(args, "version_lt", "b")?;

    let a = parse_version(a).map_err(|e| Error::msg(format!("version_lt(): {e}")))?;
    let b = parse_version(b).map_err(|e| Error::msg(format!("version_lt(): {e}")))?;

    Ok(Value::Bool(a < b))
}

/// `log(level, message)` - emit a log record, renders nothing.
pub fn log(args: &HashMap<String, Value>) -> Result<Value> {
    let message = string_arg(args, "log", "message")?;
    let level = args.get("level").and_then(Value::as_str).unwrap_or("info");

    match level.to_ascii_lowercase().as_str() {
        "trace" => trace!(target: "template", "{}", message),
        "debug" => debug!(target: "template", "{}", message),
        "warn" | "warning" => warn!(target: "template", "{}", message),
        "error" => error!(target: "template", "{}", message),
        _ => info!(target: "template", "{}", message),
    }

    Ok(Value::String(String::new()))
}

/// `inival(path, section, key)` - value from an INI file, empty if absent.
pub fn inival(args: &HashMap<String, Value>) -> Result<Value> {
    let path = string_arg(args, "inival", "path")?;
    let section = string_arg(args, "inival", "section")?;
    let key = string_arg(args, "inival", "key")?;

    let value = std::fs::read_to_string(Path::new(path))
        .ok()
        .and_then(|content| lookup_ini(&content, section, key))
        .unwrap_or_default();

    Ok(Value::String(value))
}

/// Find `key` in `[section]`, both compared case-insensitively.
fn lookup_ini(content: &str, section: &str, key: &str) -> Option<String> {
    let mut in_section = false;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = name.trim().eq_ignore_ascii_case(section);
            continue;
        }

        if in_section {
            if let Some((k, v)) = line.split_once('=') {
                if k.trim().eq_ignore_ascii_case(key) {
                    return Some(v.trim().trim_matches('"').to_string());
                }
            }
        }
    }

    None
}

/// `regval(hive, key, value, view?)` bound to a registry capability.
pub struct RegistryValueFunction {
    registry: Arc<dyn RegistryReader>,
}

impl RegistryValueFunction {
    /// Create the function on top of `registry`.
    pub fn new(registry: Arc<dyn RegistryReader>) -> Self {
        Self {
            registry,
        }
    }
}

impl Function for RegistryValueFunction {
    fn call(&self, args: &HashMap<String, Value>) -> Result<Value> {
        let hive_name = string_arg(args, "regval", "hive")?;
        let key = string_arg(args, "regval", "key")?;
        let value = string_arg(args, "regval", "value")?;

        let hive = RegistryHive::parse(hive_name)
            .ok_or_else(|| Error::msg(format!("regval(): unknown hive '{hive_name}'")))?;
        let view = match args.get("view") {
            Some(view) => serde_json::from_value::<RegistryView>(view.clone())
                .map_err(|e| Error::msg(format!("regval(): invalid view: {e}")))?,
            None => RegistryView::Default,
        };

        match self.registry.read_string(hive, view, key, value) {
            Ok(data) => Ok(Value::String(data)),
            Err(e) => {
                debug!("regval() lookup failed: {}", e);
                Ok(Value::String(String::new()))
            }
        }
    }

    fn is_safe(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use serial_test::serial;
    use tempfile::TempDir;

    fn args(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[test]
    fn test_version_lt() {
        let result = version_lt(&args(&[("a", json!("1.2.3.4")), ("b", json!("1.2.3"))])).unwrap();
        assert_eq!(result, json!(true));
        let result = version_lt(&args(&[("a", json!("2.0.0")), ("b", json!("1.0.0"))])).unwrap();
        assert_eq!(result, json!(false));
    }

    #[test]
    fn test_version_lt_rejects_garbage() {
        assert!(version_lt(&args(&[("a", json!("x")), ("b", json!("1.0.0"))])).is_err());
    }

    #[test]
    fn test_missing_argument() {
        let err = envar(&HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("'name'"));
    }

    #[test]
    fn test_envar_unset_is_empty() {
        let result =
            envar(&args(&[("name", json!("SETUP_UPDATER_SURELY_UNSET_VARIABLE"))])).unwrap();
        assert_eq!(result, json!(""));
    }

    #[test]
    #[serial]
    fn test_envar_reads_variable() {
        // SAFETY: serialized with every other test touching the environment
        unsafe { std::env::set_var("SETUP_UPDATER_TEST_VARIABLE", "C:\\Widget") };
        let result = envar(&args(&[("name", json!("SETUP_UPDATER_TEST_VARIABLE"))])).unwrap();
        unsafe { std::env::remove_var("SETUP_UPDATER_TEST_VARIABLE") };
        assert_eq!(result, json!("C:\\Widget"));
    }

    #[test]
    fn test_log_renders_empty() {
        let result = log(&args(&[("level", json!("warn")), ("message", json!("hi"))])).unwrap();
        assert_eq!(result, json!(""));
    }

    #[test]
    fn test_lookup_ini() {
        let content = "; comment\n[General]\nVersion = \"1.4.0\"\n[Other]\nVersion=9\n";
        assert_eq!(lookup_ini(content, "general", "version").as_deref(), Some("1.4.0"));
        assert_eq!(lookup_ini(content, "Other", "Version").as_deref(), Some("9"));
        assert_eq!(lookup_ini(content, "Missing", "Version"), None);
    }

    #[test]
    fn test_inival_reads_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("widget.ini");
        std::fs::write(&path, "[General]\nVersion=2.1.0\n").unwrap();

        let result = inival(&args(&[
            ("path", json!(path.to_string_lossy())),
            ("section", json!("General")),
            ("key", json!("Version")),
        ]))
        .unwrap();
        assert_eq!(result, json!("2.1.0"));
    }
}
