use crate::config::{InjectConfig, LoginConfig};
use crate::js_templates::{SUPPRESS_DIALOGS, login_autofill};
use crate::Result;
use std::fs;
use std::path::Path;

/// Scripts evaluated in every tab before the page's own scripts run.
#[derive(Debug, Clone, Default)]
pub struct ScriptSet {
    scripts: Vec<String>,
}

impl ScriptSet {
    /// Reads `*.js` files from the configured directory, sorted by name,
    /// followed by the inline scripts.
    pub fn load(config: &InjectConfig) -> Result<Self> {
        let mut scripts = vec![SUPPRESS_DIALOGS.to_string()];

        if let Some(ref dir) = config.scripts_dir {
            scripts.extend(read_script_dir(dir)?);
        }

        scripts.extend(
            config
                .scripts
                .iter()
                .filter(|s| !s.trim().is_empty())
                .cloned(),
        );

        tracing::debug!("loaded {} injected scripts", scripts.len());
        Ok(Self { scripts })
    }

    pub fn with_login(mut self, login: Option<LoginAuto>) -> Self {
        if let Some(login) = login {
            self.scripts.push(login.script);
        }
        self
    }

    pub fn scripts(&self) -> &[String] {
        &self.scripts
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

fn read_script_dir(dir: &Path) -> Result<Vec<String>> {
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "js"))
        .collect();
    paths.sort();

    let mut scripts = Vec::with_capacity(paths.len());
    for path in paths {
        scripts.push(fs::read_to_string(&path)?);
    }
    Ok(scripts)
}

/// Login form auto-fill built once per crawl.
#[derive(Debug, Clone)]
pub struct LoginAuto {
    script: String,
}

impl LoginAuto {
    pub fn init(config: &LoginConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }

        match (&config.username, &config.password) {
            (Some(username), Some(password)) => Some(Self {
                script: login_autofill(username, password),
            }),
            _ => {
                tracing::warn!("login enabled without username and password, skipping");
                None
            }
        }
    }

    pub fn script(&self) -> &str {
        &self.script
    }
}
