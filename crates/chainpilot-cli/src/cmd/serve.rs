use std::path::Path;
use std::sync::Arc;

use super::load_config;
use chainpilot_core::engine::Engine;
use chainpilot_core::config::WarnLevel;

pub fn run(root: &Path, config_path: &Path, port: Option<u16>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    for w in config.validate() {
        match w.level {
            WarnLevel::Warning => tracing::warn!("{}", w.message),
            WarnLevel::Error => anyhow::bail!("invalid config: {}", w.message),
        }
    }
    let port = port.unwrap_or(config.server.port);
    let root = root.to_path_buf();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        // Built inside the runtime so the reconcile worker starts.
        let engine = Arc::new(Engine::from_config(config, &root)?);
        let resumed = engine.resume_outstanding().await?;

        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        let actual_port = listener.local_addr()?.port();
        println!("chainpilot API → http://localhost:{actual_port}");
        if resumed > 0 {
            println!("Resumed reconciliation for {resumed} sequence(s)");
        }

        tokio::select! {
            res = chainpilot_server::serve_on(engine, listener) => res,
            _ = tokio::signal::ctrl_c() => Ok(()),
        }
    })
}
