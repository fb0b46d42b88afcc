//! The `chainstream` action node.
//!
//! For every input item, in order:
//! 1. Builds the request for the configured resource/operation.
//! 2. Sends it through the authenticated API client.
//! 3. Emits the response items, paired to the input item.
//!
//! A failing item aborts the run unless `continue_on_fail` is set, in which
//! case an `{ "error": … }` record is emitted for it and the loop continues.

use async_trait::async_trait;
use nodes::{
    return_json_array, ExecutableNode, ExecutionContext, NodeError, NodeOutput, Parameters,
};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::client::{api_request, load_chains};
use crate::dispatch::Dispatcher;
use crate::models::ChainOption;
use crate::ChainstreamError;

pub const NODE_TYPE: &str = "chainstream";

const DEFAULT_RESOURCE: &str = "token";

/// Request/response node over the Chainstream REST API.
#[derive(Debug, Clone, Default)]
pub struct ChainstreamNode {
    dispatcher: Dispatcher,
}

impl ChainstreamNode {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Options for the chain picker.
    pub async fn get_chains(&self, ctx: &ExecutionContext) -> Result<Vec<ChainOption>, ChainstreamError> {
        load_chains(ctx).await
    }

    async fn run_item(
        &self,
        resource: &str,
        operation: &str,
        item: usize,
        ctx: &ExecutionContext,
    ) -> Result<Vec<Value>, ChainstreamError> {
        let spec = self
            .dispatcher
            .build_request(resource, operation, ctx.parameters.as_ref(), item)?;
        let response = api_request(ctx, &spec, None).await?;
        Ok(return_json_array(response))
    }
}

/// Read a selector parameter (resource/operation) once, at item 0.
fn selector(params: &dyn Parameters, name: &str) -> Option<String> {
    params
        .get(name, 0)
        .ok()
        .and_then(|v| v.as_str().map(str::trim).map(str::to_string))
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl ExecutableNode for ChainstreamNode {
    #[instrument(skip(self, items, ctx), fields(node = %ctx.node_name, items = items.len()))]
    async fn execute(
        &self,
        items: Vec<Value>,
        ctx: &ExecutionContext,
    ) -> Result<Vec<NodeOutput>, NodeError> {
        let params = ctx.parameters.as_ref();
        let resource = selector(params, "resource").unwrap_or_else(|| DEFAULT_RESOURCE.to_string());
        let operation = selector(params, "operation")
            .ok_or_else(|| NodeError::Fatal("the 'operation' parameter is required".to_string()))?;

        // Misconfiguration is fatal regardless of continue_on_fail.
        self.dispatcher
            .lookup(&resource, &operation)
            .map_err(|e| NodeError::Fatal(e.to_string()))?;

        let mut outputs = Vec::new();
        for item in 0..items.len() {
            match self.run_item(&resource, &operation, item, ctx).await {
                Ok(values) => {
                    outputs.extend(values.into_iter().map(|v| NodeOutput::new(v, item)));
                }
                Err(err) if ctx.continue_on_fail => {
                    warn!("item {} failed, continuing: {}", item, err);
                    outputs.push(NodeOutput::error(err.to_string(), item));
                }
                Err(err) => {
                    error!("item {} failed: {}", item, err);
                    return Err(NodeError::Item {
                        item,
                        message: err.to_string(),
                    });
                }
            }
        }

        info!("{}/{} produced {} items", resource, operation, outputs.len());
        Ok(outputs)
    }
}
