//! 应用启动：白名单应用名，spawn 后立即脱离
//!
//! 仅允许配置中的应用名；平台差异通过 open / xdg-open / cmd start 处理。

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::tools::Tool;

/// 应用启动工具：仅允许白名单内应用
pub struct AppLaunchTool {
    allowed_apps: HashSet<String>,
}

impl AppLaunchTool {
    pub fn new(allowed_apps: Vec<String>) -> Self {
        Self {
            allowed_apps: allowed_apps.into_iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    fn is_allowed(&self, app: &str) -> Result<(), String> {
        let name = app.trim().to_lowercase();
        if name.is_empty() {
            return Err("Empty application name".to_string());
        }
        if self.allowed_apps.contains(&name) {
            Ok(())
        } else {
            Err(format!("Application '{}' not in allowlist", app))
        }
    }
}

#[async_trait]
impl Tool for AppLaunchTool {
    fn name(&self) -> &str {
        "app_launch"
    }

    fn description(&self) -> &str {
        "Launch a whitelisted local application by name."
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let app = args
            .get("app_name")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();
        self.is_allowed(app)?;

        tracing::info!(app = %app, "launching application");

        let mut cmd = if cfg!(target_os = "macos") {
            let mut c = Command::new("open");
            c.args(["-a", app]);
            c
        } else if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", "start", "", app]);
            c
        } else {
            let mut c = Command::new("xdg-open");
            c.arg(app);
            c
        };

        cmd.spawn()
            .map_err(|e| format!("Failed to launch '{}': {}", app, e))?;

        Ok(serde_json::json!({ "launched": app }))
    }
}
