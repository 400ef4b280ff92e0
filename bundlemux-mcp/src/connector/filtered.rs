//! Permission- and namespace-aware connector decorator
//!
//! Wraps a base connector with the bundle entry's allow-lists and the
//! shared namespace resolver. Catalog results are filtered then renamed;
//! targeted operations are reverse-resolved then checked before they are
//! forwarded with the upstream's original names.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use bundlemux_api_types::McpPermissions;
use bundlemux_core::namespace::HASH_ALGORITHM;
use bundlemux_core::{NamespaceResolver, PermissionFilter};

use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{
    GetPromptParams, GetPromptResult, ListPromptsResult, ListResourceTemplatesResult,
    ListResourcesResult, ListToolsResult, ReadResourceParams, ReadResourceResult,
    ServerCapabilities, ToolCallParams, ToolCallResult,
};

use super::{ConnectionState, ConnectorEvent, UpstreamConnector};

/// A base connector decorated with namespace rewriting and allow-list
/// filtering. Sessions hold one of these per attached upstream; the base
/// connector underneath may be shared through the pool.
pub struct FilteredConnector {
    inner: Arc<dyn UpstreamConnector>,
    namespace: String,
    permissions: Option<McpPermissions>,
    resolver: Arc<NamespaceResolver>,
    filter: PermissionFilter,
}

impl FilteredConnector {
    pub fn new(
        inner: Arc<dyn UpstreamConnector>,
        namespace: impl Into<String>,
        permissions: Option<McpPermissions>,
        resolver: Arc<NamespaceResolver>,
    ) -> Self {
        Self {
            inner,
            namespace: namespace.into(),
            permissions,
            resolver,
            filter: PermissionFilter::new(),
        }
    }

    /// The base connector underneath the decoration.
    pub fn inner(&self) -> &Arc<dyn UpstreamConnector> {
        &self.inner
    }

    fn permissions(&self) -> Option<&McpPermissions> {
        self.permissions.as_ref()
    }

    /// Reverse-resolve a public tool/prompt name into the upstream's
    /// original. A foreign namespace means the session routed this call to
    /// the wrong connector, which is a client error.
    fn reverse_name(&self, public: &str) -> GatewayResult<String> {
        let (namespace, original) = self
            .resolver
            .extract_from_name(public)
            .map_err(|_| GatewayError::unknown_capability(public))?;
        if namespace != self.namespace {
            return Err(GatewayError::unknown_capability(public));
        }
        Ok(original)
    }

    fn reverse_uri(&self, public: &str) -> GatewayResult<String> {
        let (namespace, original) = self.resolver.extract_from_uri(public);
        match namespace {
            Some(namespace) if namespace == self.namespace => Ok(original),
            _ => Err(GatewayError::unknown_capability(public)),
        }
    }
}

#[async_trait]
impl UpstreamConnector for FilteredConnector {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    fn capabilities(&self) -> Option<ServerCapabilities> {
        self.inner.capabilities()
    }

    async fn connect(&self) -> GatewayResult<()> {
        self.inner.connect().await
    }

    async fn disconnect(&self) -> GatewayResult<()> {
        self.inner.disconnect().await
    }

    async fn reconnect(&self) -> GatewayResult<()> {
        self.inner.reconnect().await
    }

    fn subscribe(&self, subscriber_id: &str, sender: mpsc::UnboundedSender<ConnectorEvent>) {
        self.inner.subscribe(subscriber_id, sender);
    }

    fn unsubscribe(&self, subscriber_id: &str) {
        self.inner.unsubscribe(subscriber_id);
    }

    async fn list_tools(&self, cancel: CancellationToken) -> GatewayResult<ListToolsResult> {
        let mut result = self.inner.list_tools(cancel).await?;

        result.tools.retain(|tool| {
            self.filter
                .is_tool_allowed(self.permissions(), &tool.name)
        });

        for tool in &mut result.tools {
            let renamed = self.resolver.rename_name(&self.namespace, &tool.name);
            if renamed.hashed {
                tool.metadata
                    .insert("originalName".to_string(), json!(tool.name));
                tool.metadata
                    .insert("namespace".to_string(), json!(self.namespace));
                tool.metadata
                    .insert("algorithm".to_string(), json!(HASH_ALGORITHM));
            }
            tool.name = renamed.public;
        }

        Ok(result)
    }

    async fn call_tool(
        &self,
        mut params: ToolCallParams,
        cancel: CancellationToken,
    ) -> GatewayResult<ToolCallResult> {
        let original = self.reverse_name(&params.name)?;
        if !self.filter.is_tool_allowed(self.permissions(), &original) {
            return Err(GatewayError::permission_denied(&params.name));
        }
        params.name = original;
        self.inner.call_tool(params, cancel).await
    }

    async fn list_resources(
        &self,
        cancel: CancellationToken,
    ) -> GatewayResult<ListResourcesResult> {
        let mut result = self.inner.list_resources(cancel).await?;

        result.resources.retain(|resource| {
            self.filter
                .is_resource_allowed(self.permissions(), &resource.uri)
        });

        for resource in &mut result.resources {
            resource.uri = self.resolver.rename_uri(&self.namespace, &resource.uri);
        }

        Ok(result)
    }

    async fn read_resource(
        &self,
        mut params: ReadResourceParams,
        cancel: CancellationToken,
    ) -> GatewayResult<ReadResourceResult> {
        let original = self.reverse_uri(&params.uri)?;
        if !self
            .filter
            .is_resource_allowed(self.permissions(), &original)
        {
            return Err(GatewayError::permission_denied(&params.uri));
        }
        params.uri = original;
        self.inner.read_resource(params, cancel).await
    }

    async fn list_resource_templates(
        &self,
        cancel: CancellationToken,
    ) -> GatewayResult<ListResourceTemplatesResult> {
        let mut result = self.inner.list_resource_templates(cancel).await?;

        result.resource_templates.retain(|template| {
            self.filter
                .is_resource_allowed(self.permissions(), &template.uri_template)
        });

        for template in &mut result.resource_templates {
            template.uri_template = self
                .resolver
                .rename_uri(&self.namespace, &template.uri_template);
        }

        Ok(result)
    }

    async fn list_prompts(&self, cancel: CancellationToken) -> GatewayResult<ListPromptsResult> {
        let mut result = self.inner.list_prompts(cancel).await?;

        result.prompts.retain(|prompt| {
            self.filter
                .is_prompt_allowed(self.permissions(), &prompt.name)
        });

        for prompt in &mut result.prompts {
            let renamed = self.resolver.rename_name(&self.namespace, &prompt.name);
            if renamed.hashed {
                prompt
                    .metadata
                    .insert("originalName".to_string(), json!(prompt.name));
                prompt
                    .metadata
                    .insert("namespace".to_string(), json!(self.namespace));
                prompt
                    .metadata
                    .insert("algorithm".to_string(), json!(HASH_ALGORITHM));
            }
            prompt.name = renamed.public;
        }

        Ok(result)
    }

    async fn get_prompt(
        &self,
        mut params: GetPromptParams,
        cancel: CancellationToken,
    ) -> GatewayResult<GetPromptResult> {
        let original = self.reverse_name(&params.name)?;
        if !self.filter.is_prompt_allowed(self.permissions(), &original) {
            return Err(GatewayError::permission_denied(&params.name));
        }
        params.name = original;
        self.inner.get_prompt(params, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::mock::MockConnector;
    use crate::protocol::Tool;
    use bundlemux_core::HashMode;

    fn resolver() -> Arc<NamespaceResolver> {
        Arc::new(NamespaceResolver::default())
    }

    fn tool(name: &str) -> Tool {
        Tool {
            name: name.to_string(),
            description: None,
            input_schema: json!({"type": "object"}),
            metadata: Default::default(),
        }
    }

    fn permissions(tools: &[&str]) -> McpPermissions {
        McpPermissions {
            allowed_tools: tools.iter().map(|p| p.to_string()).collect(),
            allowed_resources: vec!["*".to_string()],
            allowed_prompts: vec!["*".to_string()],
        }
    }

    #[tokio::test]
    async fn test_list_tools_filters_and_renames() {
        let base = Arc::new(
            MockConnector::new("fs").with_tools(vec![tool("read_file"), tool("write_file")]),
        );
        base.connect().await.unwrap();

        let filtered = FilteredConnector::new(
            base,
            "fs",
            Some(permissions(&["^read_.*$"])),
            resolver(),
        );

        let result = filtered
            .list_tools(CancellationToken::new())
            .await
            .unwrap();
        let names: Vec<&str> = result.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["fs__read_file"]);
    }

    #[tokio::test]
    async fn test_call_tool_reverses_and_forwards_original_name() {
        let base = Arc::new(MockConnector::new("notion").with_tools(vec![tool("search")]));
        base.connect().await.unwrap();
        let base_handle = base.clone();

        let filtered = FilteredConnector::new(
            base,
            "notion",
            Some(permissions(&["*"])),
            resolver(),
        );

        filtered
            .call_tool(
                ToolCallParams {
                    name: "notion__search".to_string(),
                    arguments: Some(json!({"q": "meeting notes"})),
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(base_handle.tool_calls(), vec!["search".to_string()]);
    }

    #[tokio::test]
    async fn test_call_tool_permission_denied() {
        let base = Arc::new(MockConnector::new("fs").with_tools(vec![tool("write_file")]));
        base.connect().await.unwrap();

        let filtered = FilteredConnector::new(
            base,
            "fs",
            Some(permissions(&["^read_.*$"])),
            resolver(),
        );

        let result = filtered
            .call_tool(
                ToolCallParams {
                    name: "fs__write_file".to_string(),
                    arguments: None,
                },
                CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(GatewayError::PermissionDenied { .. })));
    }

    #[tokio::test]
    async fn test_call_tool_foreign_namespace_is_unknown() {
        let base = Arc::new(MockConnector::new("fs").with_tools(vec![tool("read_file")]));
        base.connect().await.unwrap();

        let filtered =
            FilteredConnector::new(base, "fs", Some(permissions(&["*"])), resolver());

        let result = filtered
            .call_tool(
                ToolCallParams {
                    name: "github__read_file".to_string(),
                    arguments: None,
                },
                CancellationToken::new(),
            )
            .await;
        assert!(matches!(
            result,
            Err(GatewayError::UnknownCapability { .. })
        ));
    }

    #[tokio::test]
    async fn test_hashed_rename_records_metadata() {
        let shared_resolver = Arc::new(NamespaceResolver::new(HashMode::Always, 64));
        let base = Arc::new(MockConnector::new("github").with_tools(vec![tool("search")]));
        base.connect().await.unwrap();
        let base_handle = base.clone();

        let filtered = FilteredConnector::new(
            base,
            "github",
            Some(permissions(&["*"])),
            shared_resolver.clone(),
        );

        let result = filtered
            .list_tools(CancellationToken::new())
            .await
            .unwrap();
        let renamed = &result.tools[0];
        assert_eq!(renamed.name.len(), 12);
        assert_eq!(renamed.metadata["originalName"], json!("search"));
        assert_eq!(renamed.metadata["namespace"], json!("github"));
        assert_eq!(renamed.metadata["algorithm"], json!(HASH_ALGORITHM));

        // The hashed public name routes back to the original
        filtered
            .call_tool(
                ToolCallParams {
                    name: renamed.name.clone(),
                    arguments: None,
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(base_handle.tool_calls(), vec!["search".to_string()]);
    }
}
