#![forbid(unsafe_code)]

//! Per-connector configuration.
//!
//! Options are plain data with chaining setters. [`ConnectOptions::validate`]
//! runs when a connector is created, so a removed or malformed option fails
//! immediately instead of at first render.

use crate::error::{ConnectError, Result};

/// Name of the only supported store key.
pub const DEFAULT_STORE_KEY: &str = "store";

fn default_display_name(wrapped: &str) -> String {
    format!("ConnectAdvanced({wrapped})")
}

/// Configuration recognized by [`connect_advanced`](crate::connect_advanced).
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    get_display_name: fn(&str) -> String,
    method_name: String,
    should_handle_state_changes: bool,
    pure: bool,
    forward_ref: bool,
    // Removed options, kept only so their use can be rejected.
    render_count_prop: Option<String>,
    with_ref: bool,
    store_key: String,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            get_display_name: default_display_name,
            method_name: "connectAdvanced".to_string(),
            should_handle_state_changes: true,
            pure: true,
            forward_ref: false,
            render_count_prop: None,
            with_ref: false,
            store_key: DEFAULT_STORE_KEY.to_string(),
        }
    }
}

impl ConnectOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the connector's display name from the wrapped component name.
    #[must_use]
    pub fn get_display_name(mut self, f: fn(&str) -> String) -> Self {
        self.get_display_name = f;
        self
    }

    /// Name shown in error messages.
    #[must_use]
    pub fn method_name(mut self, name: impl Into<String>) -> Self {
        self.method_name = name.into();
        self
    }

    /// When false, instances never subscribe: the connector becomes a static
    /// props-to-props mapper.
    #[must_use]
    pub fn should_handle_state_changes(mut self, enabled: bool) -> Self {
        self.should_handle_state_changes = enabled;
        self
    }

    /// When true, an own-props update that is pointer-identical to the
    /// previous one skips the selector run and the render.
    #[must_use]
    pub fn pure(mut self, enabled: bool) -> Self {
        self.pure = enabled;
        self
    }

    /// Hand the caller's forwarded ref through to the wrapped component.
    #[must_use]
    pub fn forward_ref(mut self, enabled: bool) -> Self {
        self.forward_ref = enabled;
        self
    }

    /// Removed. Setting it makes [`validate`](Self::validate) fail.
    #[must_use]
    pub fn render_count_prop(mut self, prop: impl Into<String>) -> Self {
        self.render_count_prop = Some(prop.into());
        self
    }

    /// Removed. Setting it makes [`validate`](Self::validate) fail.
    #[must_use]
    pub fn with_ref(mut self, enabled: bool) -> Self {
        self.with_ref = enabled;
        self
    }

    /// Removed. Any key other than `"store"` makes
    /// [`validate`](Self::validate) fail.
    #[must_use]
    pub fn store_key(mut self, key: impl Into<String>) -> Self {
        self.store_key = key.into();
        self
    }

    #[must_use]
    pub fn display_name_for(&self, wrapped: &str) -> String {
        (self.get_display_name)(wrapped)
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method_name
    }

    #[must_use]
    pub fn handles_state_changes(&self) -> bool {
        self.should_handle_state_changes
    }

    #[must_use]
    pub fn is_pure(&self) -> bool {
        self.pure
    }

    #[must_use]
    pub fn forwards_ref(&self) -> bool {
        self.forward_ref
    }

    /// Reject removed options and malformed values.
    pub fn validate(&self) -> Result<()> {
        if self.render_count_prop.is_some() {
            return Err(ConnectError::RemovedOption {
                option: "render_count_prop",
                hint: "render counting belongs to the host's profiling tools",
            });
        }
        if self.with_ref {
            return Err(ConnectError::RemovedOption {
                option: "with_ref",
                hint: "use forward_ref to reach the wrapped component",
            });
        }
        if self.store_key != DEFAULT_STORE_KEY {
            return Err(ConnectError::RemovedOption {
                option: "store_key",
                hint: "pass a custom store through a Provider context or an explicit per-instance store",
            });
        }
        if self.method_name.trim().is_empty() {
            return Err(ConnectError::invalid("method_name must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let options = ConnectOptions::default();
        assert!(options.validate().is_ok());
        assert!(options.handles_state_changes());
        assert!(options.is_pure());
        assert!(!options.forwards_ref());
        assert_eq!(options.method(), "connectAdvanced");
        assert_eq!(options.display_name_for("Todo"), "ConnectAdvanced(Todo)");
    }

    #[test]
    fn removed_options_are_rejected() {
        let cases = [
            ConnectOptions::new().render_count_prop("renders"),
            ConnectOptions::new().with_ref(true),
            ConnectOptions::new().store_key("otherStore"),
        ];
        for options in cases {
            let err = options.validate().unwrap_err();
            assert!(matches!(err, ConnectError::RemovedOption { .. }), "{err}");
        }
    }

    #[test]
    fn empty_method_name_is_invalid() {
        let err = ConnectOptions::new().method_name("  ").validate().unwrap_err();
        assert!(matches!(err, ConnectError::InvalidOption { .. }));
    }

    #[test]
    fn custom_display_name() {
        let options = ConnectOptions::new().get_display_name(|name| format!("Connect({name})"));
        assert_eq!(options.display_name_for("Greeting"), "Connect(Greeting)");
    }
}
