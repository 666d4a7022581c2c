//! LSP Client Core (spec §4.10) and Dependency Resolver (spec §4.11).

use std::time::Duration;

use serde_json::json;

use crate::config::Settings;
use crate::error::Result;

pub mod client;
pub mod codec;
pub mod dependency;

pub use client::LspClient;
pub use dependency::{DependencyResolver, ResolvedDependencies};

const LSP_INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Spawns and initializes the bundled language server when `settings.lsp_command`
/// is configured, resolving `initializationOptions` via the Dependency Resolver.
/// Returns `Ok(None)` when no LSP command is configured — callers then serve
/// without code-intelligence tools.
pub async fn connect(settings: &Settings) -> Result<Option<LspClient>> {
    let Some(command) = &settings.lsp_command else {
        return Ok(None);
    };

    let workspace_root = settings
        .cjpm_workspace
        .clone()
        .unwrap_or_else(|| settings.docs_repo_dir());

    let resolved = DependencyResolver::new().resolve(&workspace_root)?;
    let initialization_options = json!({ "multiModuleOption": resolved.modules });

    let extra_env: Vec<(String, String)> = if resolved.native_search_path.is_empty() {
        Vec::new()
    } else {
        vec![("PATH".to_string(), prepend_path(&resolved.native_search_path))]
    };

    let root_uri = format!("file://{}", workspace_root.display());

    let client = LspClient::start(
        &command.display().to_string(),
        &[],
        &workspace_root,
        &extra_env,
        &root_uri,
        initialization_options,
        LSP_INIT_TIMEOUT,
    )
    .await?;

    Ok(Some(client))
}

fn prepend_path(extra: &str) -> String {
    match std::env::var("PATH") {
        Ok(existing) => format!("{extra}:{existing}"),
        Err(_) => extra.to_string(),
    }
}
