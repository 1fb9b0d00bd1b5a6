//! Minijinja template rendering for alert messages.
//!
//! Templates come from configuration as plain strings, so a fresh
//! [`minijinja::Environment`] is built per render call.

use serde::Serialize;

use crate::traits::NotifyError;

/// Values an alert template can reference.
#[derive(Debug, Clone, Serialize)]
pub struct AlertContext {
    pub region: String,
    pub sector: String,
    pub crowd_index: u8,
    /// Minutes.
    pub queue_time: f64,
    pub visitor_count: u64,
    pub timestamp: String,
    /// Isolation score of the observation, in (0, 1].
    pub score: f64,
}

/// Renders alert templates using minijinja.
#[derive(Debug, Default)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("round", round_filter);
        env.add_filter("minutes", minutes_filter);
        env
    }

    /// Render a template string with the given context.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if the template is invalid or
    /// rendering fails.
    pub fn render<S: Serialize>(&self, template_str: &str, ctx: &S) -> Result<String, NotifyError> {
        Self::build_env()
            .render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Check template syntax without rendering.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        Self::build_env()
            .template_from_str(template_str)
            .map(|_| ())
            .map_err(|e| NotifyError::Template(e.to_string()))
    }
}

/// Round a float to N decimal places (default 0).
fn round_filter(value: f64, decimals: Option<u32>) -> String {
    let n = decimals.unwrap_or(0);
    format!("{:.prec$}", value, prec = n as usize)
}

/// Format minutes without a trailing `.0` for whole values.
fn minutes_filter(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
