use log::{debug, info, warn, LevelFilter};

/// Logging handle injected into components, tagged with the component name.
#[derive(Debug, Clone, Copy)]
pub struct LogManager {
    component: &'static str,
    max_level: LevelFilter,
}

impl LogManager {
    pub fn new(component: &'static str) -> Self {
        Self {
            component,
            max_level: LevelFilter::Trace,
        }
    }

    /// A manager that drops every message.
    pub fn silent(component: &'static str) -> Self {
        Self {
            component,
            max_level: LevelFilter::Off,
        }
    }

    /// Same level policy, different component tag.
    pub fn scoped(&self, component: &'static str) -> Self {
        Self { component, ..*self }
    }

    pub fn with_max_level(self, max_level: LevelFilter) -> Self {
        Self { max_level, ..self }
    }

    pub fn component(&self) -> &'static str {
        self.component
    }

    pub fn record(&self, message: &str) {
        if self.max_level >= LevelFilter::Info {
            info!(target: self.component, "{}", message);
        }
    }

    pub fn warn(&self, message: &str) {
        if self.max_level >= LevelFilter::Warn {
            warn!(target: self.component, "{}", message);
        }
    }

    pub fn debug(&self, message: &str) {
        if self.max_level >= LevelFilter::Debug {
            debug!(target: self.component, "{}", message);
        }
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new("saft")
    }
}
