//! Audit plugin: logs every action, counts them, and replaces the header
//! with a step indicator

use std::sync::Arc;

use async_trait::async_trait;

use pageflow_core::{
    middleware_fn, reducer, Action, DefaultHeader, ErrorEvent, EventKind, Framework,
    FrameworkEvent, InteractiveCli, Middleware, PageInfo, Plugin, Reducer, Renderer,
    HEADER_RENDERER,
};

use crate::pages::STEPS;
use crate::release::{Release, ReleaseAction};

pub struct AuditPlugin;

struct StepHeader;

impl Renderer<Release> for StepHeader {
    fn render(&self, cli: &InteractiveCli, page: &PageInfo, state: &Release) -> anyhow::Result<()> {
        let step = page
            .metadata
            .as_ref()
            .and_then(|m| m.get("step"))
            .and_then(serde_json::Value::as_u64);
        if let Some(step) = step {
            cli.write_line(&format!("release wizard · step {step}/{STEPS}"))?;
        }
        DefaultHeader.render(cli, page, state)
    }
}

#[async_trait]
impl Plugin<Release, ReleaseAction> for AuditPlugin {
    fn name(&self) -> &str {
        "audit"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn reducers(&self) -> Vec<(String, Reducer<Release, ReleaseAction>)> {
        vec![(
            "audit".to_string(),
            reducer(|state: &Release, _action: &ReleaseAction| Release {
                actions_seen: state.actions_seen + 1,
                ..state.clone()
            }),
        )]
    }

    fn middleware(&self) -> Vec<Arc<dyn Middleware<Release, ReleaseAction>>> {
        vec![middleware_fn("audit-log", |action: &ReleaseAction, state: &Release, next| {
            tracing::info!(action = action.kind(), page_actions = state.actions_seen, "Release action");
            next.run(action, state)
        })]
    }

    fn renderers(&self) -> Vec<(String, Arc<dyn Renderer<Release>>)> {
        vec![(HEADER_RENDERER.to_string(), Arc::new(StepHeader))]
    }

    async fn on_install(&self, framework: &Framework<Release, ReleaseAction>) -> anyhow::Result<()> {
        framework.events().on(EventKind::Error, |event| {
            if let FrameworkEvent::Error(ErrorEvent {
                source,
                message,
                page_id,
            }) = event
            {
                tracing::warn!(?source, page = ?page_id, "{message}");
            }
        });
        tracing::debug!("Audit plugin installed");
        Ok(())
    }
}
