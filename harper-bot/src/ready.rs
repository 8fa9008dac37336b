//! Startup readiness tracking.

use std::collections::BTreeMap;

/// Which modules have finished starting up.
#[derive(Debug, Default)]
pub struct Ready {
    modules: BTreeMap<String, bool>,
}

impl Ready {
    /// Every named module starts out not ready.
    pub fn new<'a>(modules: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            modules: modules.into_iter().map(|m| (m.to_string(), false)).collect(),
        }
    }

    /// Mark one module ready.
    pub fn ready_up(&mut self, module: &str) {
        if let Some(flag) = self.modules.get_mut(module)
            && !*flag
        {
            *flag = true;
            tracing::info!("{module} module ready");
        }
    }

    pub fn is_ready(&self, module: &str) -> bool {
        self.modules.get(module).copied().unwrap_or(false)
    }

    /// True once every module reported in.
    pub fn all_ready(&self) -> bool {
        self.modules.values().all(|r| *r)
    }
}
