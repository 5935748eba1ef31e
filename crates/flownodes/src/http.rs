use async_trait::async_trait;
use flowcore::{
    lookup_path, FlowRequest, GraphError, Id, Node, NodeError, NodeKind, NodeSpec, RunContext,
    VarMap,
};
use flowruntime::{NodeFactory, NodeMetadata};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::sync::Arc;

/// Outgoing request after placeholder substitution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub query: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Transport used by request nodes.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NodeError>;
}

/// [`HttpClient`] over a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NodeError> {
        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|_| NodeError::Configuration(format!("Unsupported method: {}", request.method)))?;

        let mut builder = self.client.request(method, &request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("HTTP request failed: {}", e)))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("Failed to read response: {}", e)))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Request template as written in the flow document. Every string may hold
/// `{{ path }}` placeholders resolved against the var map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestTemplate {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub query: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl RequestTemplate {
    pub fn render(&self, vars: &VarMap) -> Result<HttpRequest, NodeError> {
        let pairs = |items: &[(String, String)]| {
            items
                .iter()
                .map(|(k, v)| Ok((render(k, vars)?, render(v, vars)?)))
                .collect::<Result<Vec<_>, NodeError>>()
        };
        Ok(HttpRequest {
            method: self.method.clone(),
            url: render(&self.url, vars)?,
            headers: pairs(&self.headers)?,
            query: pairs(&self.query)?,
            body: self.body.as_deref().map(|b| render(b, vars)).transpose()?,
        })
    }
}

/// Substitute `{{ path }}` placeholders. Strings are inserted raw, other
/// values as compact JSON.
pub fn render(template: &str, vars: &VarMap) -> Result<String, NodeError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let close = after.find("}}").ok_or_else(|| NodeError::InvalidInput {
            field: template.to_string(),
            reason: "unclosed placeholder".to_string(),
        })?;
        let path = after[..close].trim();
        let value = lookup_path(vars, path).ok_or_else(|| NodeError::MissingVariable(path.to_string()))?;
        match value {
            Json::String(s) => out.push_str(s),
            other => out.push_str(&other.to_string()),
        }
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Sends one HTTP request and stores `{request, response}` under its name.
pub struct RequestNode {
    id: Id,
    name: String,
    template: RequestTemplate,
    client: Arc<dyn HttpClient>,
}

impl RequestNode {
    pub fn new(
        id: Id,
        name: impl Into<String>,
        template: RequestTemplate,
        client: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            template,
            client,
        }
    }
}

#[async_trait]
impl Node for RequestNode {
    fn id(&self) -> Id {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Request
    }

    async fn run(&self, ctx: &RunContext, req: &FlowRequest) -> Result<Vec<Id>, NodeError> {
        let request = {
            let vars = req.vars.read().await;
            self.template.render(&vars)?
        };
        tracing::debug!("{} {} {}", self.name, request.method, request.url);

        let response = tokio::select! {
            response = self.client.send(request.clone()) => response?,
            _ = ctx.done() => {
                ctx.check()?;
                return Err(NodeError::Canceled);
            }
        };

        let body = serde_json::from_str::<Json>(&response.body)
            .unwrap_or_else(|_| Json::String(response.body.clone()));
        let headers: serde_json::Map<String, Json> = response
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), Json::String(v.clone())))
            .collect();
        let record = serde_json::json!({
            "request": request,
            "response": {
                "status": response.status,
                "headers": headers,
                "body": body,
            },
        });
        req.write_var(self.name.clone(), record).await;

        Ok(req.edges.all_targets(self.id))
    }
}

pub struct RequestNodeFactory {
    client: Arc<dyn HttpClient>,
}

impl RequestNodeFactory {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }
}

impl NodeFactory for RequestNodeFactory {
    fn create(&self, spec: &NodeSpec) -> Result<Arc<dyn Node>, GraphError> {
        let template: RequestTemplate = serde_json::from_value(Json::Object(spec.config.clone()))
            .map_err(|e| GraphError::InvalidConfig {
                node: spec.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(Arc::new(RequestNode::new(
            spec.id,
            spec.name.clone(),
            template,
            self.client.clone(),
        )))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Request
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Make HTTP requests".to_string(),
            category: "http".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn render_substitutes_paths() {
        let vars = VarMap::from([
            ("env".to_string(), json!({"host": "api.test", "port": 8080})),
            ("login".to_string(), json!({"response": {"body": {"token": "t0k"}}})),
        ]);
        assert_eq!(
            render("https://{{ env.host }}:{{env.port}}/me", &vars).unwrap(),
            "https://api.test:8080/me"
        );
        assert_eq!(
            render("Bearer {{ login.response.body.token }}", &vars).unwrap(),
            "Bearer t0k"
        );
        assert_eq!(render("plain", &vars).unwrap(), "plain");
    }

    #[test]
    fn render_reports_missing_and_unclosed() {
        let vars = VarMap::new();
        assert_eq!(
            render("{{ nope }}", &vars).unwrap_err(),
            NodeError::MissingVariable("nope".to_string())
        );
        assert!(matches!(
            render("{{ open", &vars).unwrap_err(),
            NodeError::InvalidInput { .. }
        ));
    }
}
