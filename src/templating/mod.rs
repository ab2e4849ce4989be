//! Template rendering for configuration values.
//!
//! Paths, download locations and custom detection expressions in the configuration
//! are Tera templates. [`TemplateRenderer`] wraps a Tera instance with the
//! [`functions`] registered and exposes a single pure operation,
//! `render(template, data) -> String`.
//!
//! # Examples
//!
//! ```rust
//! use setup_updater::platform::Platform;
//! use setup_updater::templating::TemplateRenderer;
//! use serde_json::json;
//!
//! let renderer = TemplateRenderer::new(&Platform::system());
//! let rendered = renderer.render("{{ dir }}\\widget.exe", &json!({"dir": "C:\\Widget"})).unwrap();
//! assert_eq!(rendered, "C:\\Widget\\widget.exe");
//! ```

pub mod functions;

use crate::core::UpdaterError;
use crate::platform::Platform;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use tera::{Context, Tera};

/// Renders configuration templates with the updater's template functions.
#[derive(Clone)]
pub struct TemplateRenderer {
    // render_str needs &mut, the instance is shared between tasks
    tera: Arc<Mutex<Tera>>,
}

impl std::fmt::Debug for TemplateRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRenderer").finish_non_exhaustive()
    }
}

impl TemplateRenderer {
    /// Create a renderer whose `regval` function reads from the platform registry.
    #[must_use]
    pub fn new(platform: &Platform) -> Self {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.register_function("envar", functions::envar);
        tera.register_function("version_lt", functions::version_lt);
        tera.register_function("inival", functions::inival);
        tera.register_function("log", functions::log);
        tera.register_function(
            "regval",
            functions::RegistryValueFunction::new(Arc::clone(&platform.registry)),
        );

        Self {
            tera: Arc::new(Mutex::new(tera)),
        }
    }

    /// Render `template` with `data` as context.
    ///
    /// # Arguments
    ///
    /// * `template` - Tera template source
    /// * `data` - Context object, `null` is treated as an empty object
    ///
    /// # Errors
    ///
    /// [`UpdaterError::Template`] if `data` is not an object or rendering fails.
    pub fn render(&self, template: &str, data: &Value) -> Result<String, UpdaterError> {
        let context = match data {
            Value::Null => Context::new(),
            other => Context::from_value(other.clone())?,
        };

        let mut tera = self.tera.lock().map_err(|_| UpdaterError::Template {
            reason: "template engine lock poisoned".to_string(),
        })?;

        Ok(tera.render_str(template, &context)?)
    }

    /// Render a template whose data comes from an optional configuration map.
    ///
    /// # Errors
    ///
    /// See [`TemplateRenderer::render`].
    pub fn render_with(
        &self,
        template: &str,
        data: Option<&Map<String, Value>>,
    ) -> Result<String, UpdaterError> {
        let data = data.map_or(Value::Null, |map| Value::Object(map.clone()));
        self.render(template, &data)
    }
}
